//! Macroblock and sub-block neighbour resolution
//!
//! Every prediction step needs to know where a block's causal neighbours
//! live: in the current macroblock, in one of the four neighbouring
//! macroblocks (left A, above B, above-right C, above-left D), or nowhere.
//! Macroblock-level neighbours are resolved once per picture from the raster
//! address and stored as plain indices into the picture's macroblock array;
//! sub-block neighbours are constant table lookups.

use crate::decoder::macroblock::MacroblockStorage;

/// Where a neighbouring sub-block lives relative to the current macroblock.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NeighbourKind {
    /// Within the current macroblock.
    Current,

    /// In the macroblock to the left.
    A,

    /// In the macroblock above.
    B,

    /// In the macroblock above and to the right.
    C,

    /// In the macroblock above and to the left.
    D,

    /// No causal neighbour exists at reconstruction time.
    Unavailable,
}

/// Descriptor of a sub-block neighbour: which macroblock it belongs to, and
/// the block index within that macroblock.
///
/// Block indices cover all 24 blocks of a macroblock: luma 4x4 blocks
/// `0..16` in raster order, Cb `16..20`, Cr `20..24`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NeighbourBlock {
    pub mb: NeighbourKind,
    pub block: u8,
}

/// The four neighbour directions of a block.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NeighbourDir {
    Left,
    Above,
    AboveRight,
    AboveLeft,
}

/// Resolved macroblock-level neighbours as indices into the picture's
/// macroblock array. These are position-derived relations, never ownership.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MbNeighbours {
    pub a: Option<usize>,
    pub b: Option<usize>,
    pub c: Option<usize>,
    pub d: Option<usize>,
}

impl MbNeighbours {
    /// Look up the macroblock index a sub-block descriptor refers to.
    /// `Current` is answered with `current`.
    pub fn index_of(&self, kind: NeighbourKind, current: usize) -> Option<usize> {
        match kind {
            NeighbourKind::Current => Some(current),
            NeighbourKind::A => self.a,
            NeighbourKind::B => self.b,
            NeighbourKind::C => self.c,
            NeighbourKind::D => self.d,
            NeighbourKind::Unavailable => None,
        }
    }
}

const fn cur(block: u8) -> NeighbourBlock {
    NeighbourBlock {
        mb: NeighbourKind::Current,
        block,
    }
}

const fn mb_a(block: u8) -> NeighbourBlock {
    NeighbourBlock {
        mb: NeighbourKind::A,
        block,
    }
}

const fn mb_b(block: u8) -> NeighbourBlock {
    NeighbourBlock {
        mb: NeighbourKind::B,
        block,
    }
}

const fn mb_c(block: u8) -> NeighbourBlock {
    NeighbourBlock {
        mb: NeighbourKind::C,
        block,
    }
}

const fn mb_d(block: u8) -> NeighbourBlock {
    NeighbourBlock {
        mb: NeighbourKind::D,
        block,
    }
}

const NONE: NeighbourBlock = NeighbourBlock {
    mb: NeighbourKind::Unavailable,
    block: 0,
};

/// Left neighbour of each of the 24 blocks.
const N_LEFT: [NeighbourBlock; 24] = [
    mb_a(3),
    cur(0),
    cur(1),
    cur(2),
    mb_a(7),
    cur(4),
    cur(5),
    cur(6),
    mb_a(11),
    cur(8),
    cur(9),
    cur(10),
    mb_a(15),
    cur(12),
    cur(13),
    cur(14),
    mb_a(17),
    cur(16),
    mb_a(19),
    cur(18),
    mb_a(21),
    cur(20),
    mb_a(23),
    cur(22),
];

/// Above neighbour of each of the 24 blocks.
const N_ABOVE: [NeighbourBlock; 24] = [
    mb_b(12),
    mb_b(13),
    mb_b(14),
    mb_b(15),
    cur(0),
    cur(1),
    cur(2),
    cur(3),
    cur(4),
    cur(5),
    cur(6),
    cur(7),
    cur(8),
    cur(9),
    cur(10),
    cur(11),
    mb_b(18),
    mb_b(19),
    cur(16),
    cur(17),
    mb_b(22),
    mb_b(23),
    cur(20),
    cur(21),
];

/// Above-right neighbour of each of the 24 blocks.
///
/// Five luma positions (raster indices 5, 7, 11, 13 and 15) have no causal
/// above-right block at reconstruction time and are marked unavailable.
const N_ABOVE_RIGHT: [NeighbourBlock; 24] = [
    mb_b(13),
    mb_b(14),
    mb_b(15),
    mb_c(12),
    cur(1),
    NONE,
    cur(3),
    NONE,
    cur(5),
    cur(6),
    cur(7),
    NONE,
    cur(9),
    NONE,
    cur(11),
    NONE,
    mb_b(19),
    mb_c(18),
    cur(17),
    NONE,
    mb_b(23),
    mb_c(22),
    cur(21),
    NONE,
];

/// Above-left neighbour of each of the 24 blocks.
const N_ABOVE_LEFT: [NeighbourBlock; 24] = [
    mb_d(15),
    mb_b(12),
    mb_b(13),
    mb_b(14),
    mb_a(3),
    cur(0),
    cur(1),
    cur(2),
    mb_a(7),
    cur(4),
    cur(5),
    cur(6),
    mb_a(11),
    cur(8),
    cur(9),
    cur(10),
    mb_d(19),
    mb_b(18),
    mb_a(17),
    cur(16),
    mb_d(23),
    mb_b(22),
    mb_a(21),
    cur(20),
];

/// Look up the neighbour of a sub-block in the given direction.
///
/// Constant table lookup with no failure mode for the 24 valid block
/// indices.
pub fn neighbour_block(block: usize, dir: NeighbourDir) -> NeighbourBlock {
    match dir {
        NeighbourDir::Left => N_LEFT[block],
        NeighbourDir::Above => N_ABOVE[block],
        NeighbourDir::AboveRight => N_ABOVE_RIGHT[block],
        NeighbourDir::AboveLeft => N_ABOVE_LEFT[block],
    }
}

/// Resolve the macroblock-level neighbours of the macroblock at the given
/// raster address. Neighbours beyond the picture edges are `None`.
pub fn resolve_neighbours(width_in_mbs: usize, addr: usize) -> MbNeighbours {
    let col = addr % width_in_mbs;
    let row = addr / width_in_mbs;

    let a = if col > 0 { Some(addr - 1) } else { None };
    let b = if row > 0 { Some(addr - width_in_mbs) } else { None };
    let c = if row > 0 && col + 1 < width_in_mbs {
        Some(addr - width_in_mbs + 1)
    } else {
        None
    };
    let d = if row > 0 && col > 0 {
        Some(addr - width_in_mbs - 1)
    } else {
        None
    };

    MbNeighbours { a, b, c, d }
}

/// The single availability predicate used by every downstream component.
///
/// A neighbour is available only when it exists *and* belongs to the same
/// slice as the current macroblock; raster adjacency across a slice boundary
/// does not make a neighbour available. This is deliberately more than a
/// null check.
pub fn is_available(mbs: &[MacroblockStorage], slice_id: u32, neighbour: Option<usize>) -> bool {
    match neighbour {
        Some(index) => mbs
            .get(index)
            .map_or(false, |mb| mb.slice_id == Some(slice_id)),
        None => false,
    }
}
