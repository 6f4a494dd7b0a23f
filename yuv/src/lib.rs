//! YUV-to-RGB conversion for decoded pictures

mod bt601;

pub use bt601::yuv420_to_rgba;
