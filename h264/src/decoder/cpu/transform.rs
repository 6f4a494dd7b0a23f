//! Dequantization and inverse transforms
//!
//! Coefficient blocks arrive in zig-zag scan order from the entropy decoder.
//! Dequantization applies the QP-dependent level scale, the 4x4 inverse
//! integer transform reconstructs residual samples, and the result is added
//! to the prediction with a clip to `[0, 255]`. Intra_16x16 luma DC and
//! chroma DC coefficients take their own transform paths.

use crate::decoder::cpu::clip_u8;
use crate::types::ResidualBlock;

/// ITU-T Recommendation H.264 (05/2003) table 8-15: chroma QP as a function
/// of the (offset-adjusted) luma QP. Normative; must match bit-exactly.
pub const QP_C: [u8; 52] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28, 29, 29, 30, 31, 32, 32, 33, 34, 34, 35, 35, 36, 36, 37, 37, 37, 38, 38, 38, 39,
    39, 39, 39,
];

/// Derive the chroma quantization parameter from the luma QP and the
/// per-picture chroma QP index offset.
pub fn chroma_qp(luma_qp: u8, chroma_qp_index_offset: i32) -> u8 {
    let index = (luma_qp as i32 + chroma_qp_index_offset).max(0).min(51);
    QP_C[index as usize]
}

/// Dequantizer scale per `qp % 6`, one entry per coefficient position
/// group. Normative.
const LEVEL_SCALE: [[i32; 3]; 6] = [
    [10, 13, 16],
    [11, 14, 18],
    [13, 16, 20],
    [14, 18, 23],
    [16, 20, 25],
    [18, 23, 29],
];

/// Which of the three level-scale entries applies to each raster position
/// of a 4x4 block.
const SCALE_GROUP: [usize; 16] = [0, 1, 0, 1, 1, 2, 1, 2, 0, 1, 0, 1, 1, 2, 1, 2];

/// Zig-zag scan position to raster position.
const ZIGZAG_4X4: [usize; 16] = [0, 1, 4, 8, 5, 2, 3, 6, 9, 12, 13, 10, 7, 11, 14, 15];

/// Dequantize a 4x4 coefficient block: zig-zag order in, raster order out.
fn dequantize(levels: &[i32; 16], qp: u8) -> [i32; 16] {
    let shift = (qp / 6) as u32;
    let scale = &LEVEL_SCALE[(qp % 6) as usize];

    let mut data = [0i32; 16];
    for (scan, &level) in levels.iter().enumerate() {
        let raster = ZIGZAG_4X4[scan];
        data[raster] = (level * scale[SCALE_GROUP[raster]]) << shift;
    }
    data
}

/// In-place 4x4 inverse integer transform (butterfly form), without the
/// final rounding shift.
fn inverse_transform(data: &mut [i32; 16]) {
    // Horizontal.
    for row in 0..4 {
        let d = &mut data[row * 4..row * 4 + 4];
        let e0 = d[0] + d[2];
        let e1 = d[0] - d[2];
        let e2 = (d[1] >> 1) - d[3];
        let e3 = d[1] + (d[3] >> 1);
        d[0] = e0 + e3;
        d[1] = e1 + e2;
        d[2] = e1 - e2;
        d[3] = e0 - e3;
    }

    // Vertical.
    for col in 0..4 {
        let d0 = data[col];
        let d1 = data[col + 4];
        let d2 = data[col + 8];
        let d3 = data[col + 12];
        let e0 = d0 + d2;
        let e1 = d0 - d2;
        let e2 = (d1 >> 1) - d3;
        let e3 = d1 + (d3 >> 1);
        data[col] = e0 + e3;
        data[col + 4] = e1 + e2;
        data[col + 8] = e1 - e2;
        data[col + 12] = e0 - e3;
    }
}

/// Dequantize and inverse-transform one 4x4 block, then add the residual
/// into the prediction samples at `dest` (row-major with `stride`), clipping
/// to `[0, 255]`.
///
/// `dc` replaces the block's DC coefficient with an already-dequantized
/// value from one of the separate DC transform paths (`Some` for Intra_16x16
/// luma and for chroma). A block with no coefficients and no DC contribution
/// is copy-through: the prediction samples are left untouched, which is
/// equivalent to running the general path on all-zero input.
pub fn transform_add(
    block: &ResidualBlock,
    qp: u8,
    dc: Option<i32>,
    dest: &mut [u8],
    stride: usize,
) {
    if block.is_empty() && dc.unwrap_or(0) == 0 {
        return;
    }

    let mut data = dequantize(&block.levels, qp);
    if let Some(dc) = dc {
        data[0] = dc;
    }

    inverse_transform(&mut data);

    for row in 0..4 {
        for col in 0..4 {
            let residual = (data[row * 4 + col] + 32) >> 6;
            let sample = &mut dest[col + row * stride];
            *sample = clip_u8(*sample as i32 + residual);
        }
    }
}

/// Inverse Hadamard transform and scaling of the sixteen Intra_16x16 luma
/// DC coefficients (zig-zag order in). Yields the dequantized DC value of
/// each 4x4 luma block, in raster block order.
pub fn luma_dc_transform(block: &ResidualBlock, qp: u8) -> [i32; 16] {
    let mut data = [0i32; 16];
    for (scan, &level) in block.levels.iter().enumerate() {
        data[ZIGZAG_4X4[scan]] = level;
    }

    // Horizontal Hadamard butterfly.
    for row in 0..4 {
        let d = &mut data[row * 4..row * 4 + 4];
        let e0 = d[0] + d[2];
        let e1 = d[0] - d[2];
        let e2 = d[1] - d[3];
        let e3 = d[1] + d[3];
        d[0] = e0 + e3;
        d[1] = e1 + e2;
        d[2] = e1 - e2;
        d[3] = e0 - e3;
    }

    // Vertical Hadamard butterfly.
    for col in 0..4 {
        let d0 = data[col];
        let d1 = data[col + 4];
        let d2 = data[col + 8];
        let d3 = data[col + 12];
        let e0 = d0 + d2;
        let e1 = d0 - d2;
        let e2 = d1 - d3;
        let e3 = d1 + d3;
        data[col] = e0 + e3;
        data[col + 4] = e1 + e2;
        data[col + 8] = e1 - e2;
        data[col + 12] = e0 - e3;
    }

    let scale = LEVEL_SCALE[(qp % 6) as usize][0];
    let shift = qp / 6;
    for value in data.iter_mut() {
        *value = if qp >= 36 {
            (*value * scale) << (shift - 6)
        } else {
            (*value * scale + (1 << (5 - shift))) >> (6 - shift)
        };
    }

    data
}

/// Inverse 2x2 Hadamard transform and scaling of one chroma component's DC
/// coefficients (raster order in). Yields the dequantized DC value of each
/// chroma 4x4 block, in raster block order.
pub fn chroma_dc_transform(dc: &[i32; 4], qp: u8) -> [i32; 4] {
    let f0 = dc[0] + dc[1] + dc[2] + dc[3];
    let f1 = dc[0] - dc[1] + dc[2] - dc[3];
    let f2 = dc[0] + dc[1] - dc[2] - dc[3];
    let f3 = dc[0] - dc[1] - dc[2] + dc[3];

    let scale = LEVEL_SCALE[(qp % 6) as usize][0];
    let shift = (qp / 6) as u32;

    let mut out = [f0, f1, f2, f3];
    for value in out.iter_mut() {
        *value = ((*value * scale) << shift) >> 5;
    }
    out
}
