//! Decoder types

bitflags! {
    /// Options which influence reconstruction behaviour.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct DecoderOption : u8 {
        /// Conceal lost intra-picture content by freezing the newest
        /// reference picture instead of filling with mid-gray.
        const INTRA_FREEZE_CONCEALMENT = 0b1;
    }
}

/// The slice types this engine distinguishes.
///
/// The slice type steers error concealment (reference copy versus spatial
/// synthesis) and validates which macroblock types may appear.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SliceType {
    I,
    P,
}

/// Per-slice parameters established by the (external) slice header parser.
#[derive(Copy, Clone, Debug)]
pub struct SliceParameters {
    /// Identifier used for the cross-slice neighbour availability check.
    pub slice_id: u32,

    pub slice_type: SliceType,

    /// ITU-T Recommendation H.264 (05/2003) 7.4.3 `slice_qp_delta`, already
    /// resolved against `pic_init_qp` by the slice header parser.
    pub qp: u8,

    /// ITU-T Recommendation H.264 (05/2003) 7.4.2.2
    /// `chroma_qp_index_offset`, range `[-12, 12]`.
    pub chroma_qp_index_offset: i32,
}
