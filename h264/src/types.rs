//! Parsed H.264 macroblock-layer types
//!
//! Everything in this module is the *output* of an entropy decoder (CAVLC or
//! otherwise) and the *input* of the reconstruction engine. Syntax elements
//! arrive already range-checked by the parser except where noted (motion
//! vector range, neighbour availability), which this crate validates itself.

use std::ops::Add;

/// Quarter-pixel motion vector component.
///
/// Luma motion vectors are coded in quarter-sample units. On the
/// half-resolution chroma planes the same unit corresponds to an eighth of a
/// chroma sample.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct QuarterPel(i16);

impl QuarterPel {
    /// Horizontal component limit, in quarter-sample units.
    ///
    /// ITU-T Recommendation H.264 (05/2003) table A-1: vectors decode to the
    /// range `[-2048, 2047]` horizontally.
    pub const RANGE_HOR: i16 = 2048;

    /// Vertical component limit, in quarter-sample units, for the levels this
    /// engine targets.
    pub const RANGE_VER: i16 = 512;

    /// Construct a quarter-pel from a value already in quarter-sample units.
    pub const fn from_unit(unit: i16) -> Self {
        QuarterPel(unit)
    }

    pub const fn zero() -> Self {
        QuarterPel(0)
    }

    /// Retrieve the raw quarter-sample unit count.
    pub const fn into_unit(self) -> i16 {
        self.0
    }

    /// Split into a whole luma-sample offset and a quarter-sample fractional
    /// position in `0..=3`.
    pub fn into_whole_and_fractional(self) -> (i32, u8) {
        ((self.0 as i32) >> 2, (self.0 & 3) as u8)
    }

    /// Split into a whole chroma-sample offset and an eighth-sample
    /// fractional position in `0..=7`, for use on the half-resolution
    /// chroma planes.
    pub fn into_chroma_whole_and_fractional(self) -> (i32, u8) {
        ((self.0 as i32) >> 3, (self.0 & 7) as u8)
    }

    /// Determine if this component lies within `[-limit, limit - 1]`.
    pub fn is_within(self, limit: i16) -> bool {
        self.0 >= -limit && self.0 < limit
    }
}

impl Add for QuarterPel {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        QuarterPel(self.0.wrapping_add(rhs.0))
    }
}

/// A motion vector consisting of X and Y components.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MotionVector(QuarterPel, QuarterPel);

impl MotionVector {
    pub const fn zero() -> Self {
        MotionVector(QuarterPel::zero(), QuarterPel::zero())
    }

    /// Construct a vector from raw quarter-sample units.
    pub const fn from_units(x: i16, y: i16) -> Self {
        MotionVector(QuarterPel::from_unit(x), QuarterPel::from_unit(y))
    }

    pub fn is_zero(self) -> bool {
        self == Self::zero()
    }

    pub fn x(self) -> QuarterPel {
        self.0
    }

    pub fn y(self) -> QuarterPel {
        self.1
    }

    /// Determine if both components lie within the decoded vector range.
    pub fn is_within_range(self) -> bool {
        self.0.is_within(QuarterPel::RANGE_HOR) && self.1.is_within(QuarterPel::RANGE_VER)
    }
}

impl From<(QuarterPel, QuarterPel)> for MotionVector {
    fn from(components: (QuarterPel, QuarterPel)) -> Self {
        Self(components.0, components.1)
    }
}

impl From<MotionVector> for (QuarterPel, QuarterPel) {
    fn from(mv: MotionVector) -> Self {
        (mv.0, mv.1)
    }
}

impl Add for MotionVector {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        MotionVector(self.0 + rhs.0, self.1 + rhs.1)
    }
}

/// ITU-T Recommendation H.264 (05/2003) 7.3.5 "Macroblock layer"
///
/// One macroblock's worth of parsed syntax, produced by the entropy decoder
/// and consumed entirely within a single reconstruction call.
pub struct MacroblockLayer {
    /// The prediction half of the macroblock: partitioning, motion data or
    /// intra modes, or raw I_PCM samples.
    pub prediction: Prediction,

    /// The blocks within the macroblock that carry coded coefficients.
    pub coded_block_pattern: CodedBlockPattern,

    /// ITU-T Recommendation H.264 (05/2003) 7.4.5 `mb_qp_delta`
    pub qp_delta: i32,

    /// Dequantizer input for every coded block.
    pub residual: Residual,
}

/// Prediction parameters of a macroblock, discriminated by macroblock type.
///
/// The macroblock type number of the bitstream is resolved by the parser into
/// this sum type, which makes illegal parameter combinations (such as
/// sub-partition modes on a 16x16 macroblock) unrepresentable.
pub enum Prediction {
    /// P_Skip: no coded data; motion is inferred from the neighbours and the
    /// residual is empty.
    Skip,

    /// One partition covering the whole macroblock.
    Inter16x16(InterPartition),

    /// Two 16x8 partitions, top then bottom.
    Inter16x8([InterPartition; 2]),

    /// Two 8x16 partitions, left then right.
    Inter8x16([InterPartition; 2]),

    /// Four 8x8 sub-macroblocks in raster order, each further partitioned by
    /// its own sub-macroblock mode.
    Inter8x8([SubMacroblock; 4]),

    /// Intra prediction with per-4x4-block modes.
    Intra4x4 {
        /// Mode selection for the sixteen 4x4 luma blocks in raster order.
        modes: [Intra4x4ModeSelect; 16],
        chroma_mode: IntraChromaMode,
    },

    /// Intra prediction over the full luma macroblock.
    Intra16x16 {
        mode: Intra16x16Mode,
        chroma_mode: IntraChromaMode,
    },

    /// I_PCM: raw samples coded directly in the bitstream.
    Pcm(Box<PcmSamples>),
}

impl Prediction {
    /// Determine if this is an inter-predicted macroblock.
    pub fn is_inter(&self) -> bool {
        matches!(
            self,
            Self::Skip
                | Self::Inter16x16(_)
                | Self::Inter16x8(_)
                | Self::Inter8x16(_)
                | Self::Inter8x8(_)
        )
    }

    /// Determine if this is an intra-predicted macroblock (I_PCM included).
    pub fn is_intra(&self) -> bool {
        !self.is_inter()
    }
}

/// Motion data of one inter partition.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct InterPartition {
    /// ITU-T Recommendation H.264 (05/2003) 7.4.5.1 `ref_idx_l0`
    pub ref_idx: u8,

    /// ITU-T Recommendation H.264 (05/2003) 7.4.5.1 `mvd_l0`
    pub mvd: MotionVector,
}

/// ITU-T Recommendation H.264 (05/2003) 7.4.5.2 `sub_mb_type`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SubMacroblockMode {
    One8x8,
    Two8x4,
    Two4x8,
    Four4x4,
}

impl SubMacroblockMode {
    /// The number of sub-partitions this mode divides an 8x8 region into.
    pub fn partition_count(self) -> usize {
        match self {
            Self::One8x8 => 1,
            Self::Two8x4 | Self::Two4x8 => 2,
            Self::Four4x4 => 4,
        }
    }

    /// Sub-partition width and height in luma samples.
    pub fn partition_size(self) -> (usize, usize) {
        match self {
            Self::One8x8 => (8, 8),
            Self::Two8x4 => (8, 4),
            Self::Two4x8 => (4, 8),
            Self::Four4x4 => (4, 4),
        }
    }
}

/// One 8x8 sub-macroblock of a P_8x8 macroblock.
#[derive(Copy, Clone, Debug)]
pub struct SubMacroblock {
    pub mode: SubMacroblockMode,

    /// Reference index shared by every sub-partition of this 8x8 region.
    pub ref_idx: u8,

    /// Motion vector differences for up to four sub-partitions; only the
    /// first `mode.partition_count()` entries are meaningful.
    pub mvd: [MotionVector; 4],
}

/// Per-block intra 4x4 mode selection as parsed from the bitstream.
///
/// ITU-T Recommendation H.264 (05/2003) 7.4.5.1
/// `prev_intra4x4_pred_mode_flag`, `rem_intra4x4_pred_mode`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Intra4x4ModeSelect {
    /// Use the most probable mode derived from the neighbouring blocks.
    MostProbable,

    /// Use the remainder mode `0..=7`, skipping over the most probable mode.
    Remainder(u8),
}

/// ITU-T Recommendation H.264 (05/2003) 8.3.1 — the nine 4x4 luma modes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Intra4x4Mode {
    Vertical,
    Horizontal,
    Dc,
    DiagonalDownLeft,
    DiagonalDownRight,
    VerticalRight,
    HorizontalDown,
    VerticalLeft,
    HorizontalUp,
}

impl Intra4x4Mode {
    /// The mode number as coded in the bitstream.
    pub fn number(self) -> u8 {
        match self {
            Self::Vertical => 0,
            Self::Horizontal => 1,
            Self::Dc => 2,
            Self::DiagonalDownLeft => 3,
            Self::DiagonalDownRight => 4,
            Self::VerticalRight => 5,
            Self::HorizontalDown => 6,
            Self::VerticalLeft => 7,
            Self::HorizontalUp => 8,
        }
    }

    /// Resolve a coded mode number; `None` for numbers outside `0..=8`.
    pub fn from_number(number: u8) -> Option<Self> {
        Some(match number {
            0 => Self::Vertical,
            1 => Self::Horizontal,
            2 => Self::Dc,
            3 => Self::DiagonalDownLeft,
            4 => Self::DiagonalDownRight,
            5 => Self::VerticalRight,
            6 => Self::HorizontalDown,
            7 => Self::VerticalLeft,
            8 => Self::HorizontalUp,
            _ => return None,
        })
    }
}

/// ITU-T Recommendation H.264 (05/2003) 8.3.3 — the four 16x16 luma modes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Intra16x16Mode {
    Vertical,
    Horizontal,
    Dc,
    Plane,
}

/// ITU-T Recommendation H.264 (05/2003) 8.3.4 — the four chroma modes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IntraChromaMode {
    Dc,
    Horizontal,
    Vertical,
    Plane,
}

/// Raw I_PCM sample payload: one full macroblock of unpredicted samples.
pub struct PcmSamples {
    pub luma: [u8; 256],
    pub chroma_b: [u8; 64],
    pub chroma_r: [u8; 64],
}

/// ITU-T Recommendation H.264 (05/2003) 7.4.5 `coded_block_pattern`
///
/// Which residual blocks of a macroblock carry coded coefficients.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CodedBlockPattern {
    /// One bit per 8x8 luma quadrant, raster order.
    pub codes_luma: [bool; 4],

    /// Chroma coefficient coverage, shared by both components.
    pub chroma: ChromaPattern,
}

impl CodedBlockPattern {
    /// Determine if the 4x4 luma block with the given raster index lies in a
    /// coded 8x8 quadrant.
    pub fn codes_luma_block(&self, block: usize) -> bool {
        let x = block % 4;
        let y = block / 4;
        self.codes_luma[(y / 2) * 2 + x / 2]
    }
}

/// The three chroma halves of the coded block pattern.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChromaPattern {
    /// No chroma coefficients.
    None,

    /// DC coefficients only.
    DcOnly,

    /// DC and AC coefficients.
    Full,
}

impl Default for ChromaPattern {
    fn default() -> Self {
        Self::None
    }
}

/// One 4x4 block of quantized coefficients in zig-zag scan order, plus the
/// total-coefficient count the entropy decoder derived for it.
///
/// The count is carried through to `MacroblockStorage` where the CAVLC
/// context derivation of *subsequent* macroblocks (an external collaborator)
/// reads it back; a zero count marks the block as the copy-through fast path.
#[derive(Copy, Clone, Debug)]
pub struct ResidualBlock {
    pub levels: [i32; 16],
    pub total_coeff: u8,
}

impl ResidualBlock {
    /// An uncoded, all-zero block.
    pub const EMPTY: ResidualBlock = ResidualBlock {
        levels: [0; 16],
        total_coeff: 0,
    };

    /// Determine if this block carries no coefficients.
    pub fn is_empty(&self) -> bool {
        self.total_coeff == 0
    }
}

impl Default for ResidualBlock {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// All residual data of one macroblock.
///
/// Blocks whose coded-block-pattern bit is unset are present but empty.
#[derive(Default)]
pub struct Residual {
    /// The sixteen DC coefficients of an Intra_16x16 macroblock, zig-zag
    /// scanned over the 4x4 DC array. Unused for other macroblock types.
    pub luma_dc: ResidualBlock,

    /// Luma 4x4 blocks in raster order. AC-only for Intra_16x16 macroblocks.
    pub luma: [ResidualBlock; 16],

    /// Per-component 2x2 chroma DC coefficients in raster order (Cb, Cr).
    pub chroma_dc: [[i32; 4]; 2],

    /// Chroma AC 4x4 blocks: Cb in `0..4`, Cr in `4..8`, raster order each.
    pub chroma: [ResidualBlock; 8],
}

#[cfg(test)]
mod tests {
    use crate::types::{CodedBlockPattern, MotionVector, QuarterPel};

    #[test]
    fn quarterpel_whole_and_fractional() {
        assert_eq!(QuarterPel::from_unit(9).into_whole_and_fractional(), (2, 1));
        assert_eq!(QuarterPel::from_unit(8).into_whole_and_fractional(), (2, 0));
        assert_eq!(
            QuarterPel::from_unit(-1).into_whole_and_fractional(),
            (-1, 3)
        );
        assert_eq!(
            QuarterPel::from_unit(-8).into_whole_and_fractional(),
            (-2, 0)
        );
    }

    #[test]
    fn quarterpel_chroma_grid() {
        // One quarter luma sample is one eighth chroma sample.
        assert_eq!(
            QuarterPel::from_unit(9).into_chroma_whole_and_fractional(),
            (1, 1)
        );
        assert_eq!(
            QuarterPel::from_unit(-3).into_chroma_whole_and_fractional(),
            (-1, 5)
        );
    }

    #[test]
    fn motion_vector_range() {
        assert!(MotionVector::from_units(2047, 511).is_within_range());
        assert!(MotionVector::from_units(-2048, -512).is_within_range());
        assert!(!MotionVector::from_units(2048, 0).is_within_range());
        assert!(!MotionVector::from_units(0, 512).is_within_range());
    }

    #[test]
    fn coded_block_pattern_quadrants() {
        let cbp = CodedBlockPattern {
            codes_luma: [false, true, false, false],
            ..Default::default()
        };

        // Quadrant 1 covers raster blocks 2, 3, 6 and 7.
        for block in &[2usize, 3, 6, 7] {
            assert!(cbp.codes_luma_block(*block));
        }
        for block in &[0usize, 1, 4, 5, 8, 11, 12, 15] {
            assert!(!cbp.codes_luma_block(*block));
        }
    }
}
