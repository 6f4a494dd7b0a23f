//! Inter sample prediction
//!
//! Composes motion data with fractional-sample interpolation to produce the
//! predicted macroblock from the reference pictures. Luma partitions are
//! interpolated at quarter-sample resolution; the matching chroma regions at
//! eighth-sample resolution on the half-resolution planes.

use crate::decoder::cpu::interpolate::{interpolate_chroma, interpolate_luma};
use crate::decoder::macroblock::MacroblockBuffer;
use crate::decoder::picture::Image;
use crate::error::{Error, Result};
use crate::types::MotionVector;

/// One resolved partition of a macroblock: origin and size in luma samples
/// relative to the macroblock origin, plus its final motion vector and
/// reference index.
#[derive(Copy, Clone, Debug)]
pub struct PartitionPrediction {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub mv: MotionVector,
    pub ref_idx: usize,
}

/// Produce the full predicted macroblock for the given partitions.
///
/// `mb_pos` is the macroblock origin in luma samples. Partitions must tile
/// the macroblock; each one is interpolated independently from its reference
/// picture. A reference index beyond the decoded picture buffer is a hard
/// failure for the macroblock. No state outside `buffer` is touched.
pub fn predict_inter(
    partitions: &[PartitionPrediction],
    dpb: &[Image],
    mb_pos: (usize, usize),
    buffer: &mut MacroblockBuffer,
) -> Result<()> {
    for p in partitions {
        let reference = dpb
            .get(p.ref_idx)
            .ok_or(Error::ReferencePictureUnavailable)?;

        let (x_whole, x_frac) = p.mv.x().into_whole_and_fractional();
        let (y_whole, y_frac) = p.mv.y().into_whole_and_fractional();

        interpolate_luma(
            reference.as_luma(),
            reference.width(),
            reference.height(),
            (mb_pos.0 + p.x) as i32 + x_whole,
            (mb_pos.1 + p.y) as i32 + y_whole,
            x_frac,
            y_frac,
            p.width,
            p.height,
            &mut buffer.luma[p.x + p.y * 16..],
            16,
        );

        let (cx_whole, cx_frac) = p.mv.x().into_chroma_whole_and_fractional();
        let (cy_whole, cy_frac) = p.mv.y().into_chroma_whole_and_fractional();
        let cx = ((mb_pos.0 + p.x) / 2) as i32 + cx_whole;
        let cy = ((mb_pos.1 + p.y) / 2) as i32 + cy_whole;
        let c_width = p.width / 2;
        let c_height = p.height / 2;
        let c_offset = p.x / 2 + (p.y / 2) * 8;

        interpolate_chroma(
            reference.as_chroma_b(),
            reference.width() / 2,
            reference.height() / 2,
            cx,
            cy,
            cx_frac,
            cy_frac,
            c_width,
            c_height,
            &mut buffer.chroma_b[c_offset..],
            8,
        );
        interpolate_chroma(
            reference.as_chroma_r(),
            reference.width() / 2,
            reference.height() / 2,
            cx,
            cy,
            cx_frac,
            cy_frac,
            c_width,
            c_height,
            &mut buffer.chroma_r[c_offset..],
            8,
        );
    }

    Ok(())
}
