//! Error handling

use thiserror::Error;

/// Type alias for decoder `Result`s.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors that can be yielded by the reconstruction engine.
///
/// Every variant is scoped to a single macroblock: a returned error marks the
/// current macroblock as failed and propagates to the caller, which may hand
/// the picture to error concealment. Nothing here is fatal to the process.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An intra prediction mode was selected whose required neighbouring
    /// samples are not available for prediction. This mirrors a stream
    /// conformance violation and is not recoverable for the macroblock.
    #[error("intra prediction neighbour unavailable")]
    IntraNeighbourUnavailable,

    /// A decoded motion vector fell outside the permitted quarter-pel range.
    #[error("motion vector out of range")]
    MotionVectorOutOfRange,

    /// A reference index selected a picture not present in the decoded
    /// picture buffer.
    #[error("reference picture unavailable")]
    ReferencePictureUnavailable,

    /// The macroblock address does not name a macroblock of this picture.
    #[error("macroblock address out of range")]
    BadMacroblockAddress,

    /// The parsed macroblock syntax is semantically invalid (e.g. an intra
    /// mode remainder outside its coded range, or a macroblock submitted
    /// before any slice was started).
    #[error("invalid macroblock semantics")]
    InvalidSemantics,
}
