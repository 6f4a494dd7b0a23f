//! H.264 macroblock reconstruction.

mod conceal;
mod cpu;
mod macroblock;
mod neighbour;
mod picture;
mod state;
mod types;

pub use macroblock::{DecodeState, MacroblockStorage};
pub use neighbour::{
    is_available, neighbour_block, resolve_neighbours, MbNeighbours, NeighbourBlock, NeighbourDir,
    NeighbourKind,
};
pub use picture::Image;
pub use state::H264State;
pub use types::{DecoderOption, SliceParameters, SliceType};
