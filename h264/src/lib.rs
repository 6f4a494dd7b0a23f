//! Pure-rust H.264 (baseline) macroblock reconstruction engine

#[macro_use]
extern crate bitflags;

pub mod decoder;
mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
    ChromaPattern, CodedBlockPattern, InterPartition, Intra16x16Mode, Intra4x4Mode,
    Intra4x4ModeSelect, IntraChromaMode, MacroblockLayer, MotionVector, PcmSamples, Prediction,
    QuarterPel, Residual, ResidualBlock, SubMacroblock, SubMacroblockMode,
};
