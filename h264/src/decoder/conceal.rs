//! Error concealment
//!
//! When macroblocks are missing or failed to decode, concealment synthesizes
//! replacement content so that the output picture is always fully populated.
//! Whole-picture loss copies a reference picture (P) or fills mid-gray (I);
//! partial loss sweeps outward from the first correctly decoded macroblock,
//! copying zero-motion reference content where a reference is usable and
//! otherwise deriving DC and low-frequency AC terms from the edge samples of
//! neighbouring macroblocks that already hold content.

use crate::decoder::cpu::clip_u8;
use crate::decoder::macroblock::{DecodeState, MacroblockStorage};
use crate::decoder::picture::Image;
use crate::decoder::types::{DecoderOption, SliceType};

/// QP forced onto concealed macroblocks so the external deblocking filter
/// still smooths their edges.
const CONCEALED_QP: u8 = 40;

/// Conceal every macroblock of the picture that holds no content.
///
/// Yields `true` when the whole picture had to be concealed, in which case
/// deblocking is disabled for the entire picture.
pub fn conceal_picture(
    image: &mut Image,
    mbs: &mut [MacroblockStorage],
    width_in_mbs: usize,
    height_in_mbs: usize,
    slice_type: SliceType,
    options: DecoderOption,
    dpb: &[Image],
) -> bool {
    let use_reference = matches!(slice_type, SliceType::P)
        || options.contains(DecoderOption::INTRA_FREEZE_CONCEALMENT);
    let reference = dpb.first().filter(|r| {
        r.width_in_mbs() == image.width_in_mbs() && r.height_in_mbs() == image.height_in_mbs()
    });

    let first_decoded = mbs
        .iter()
        .position(|mb| matches!(mb.state, DecodeState::Decoded));

    let anchor = match first_decoded {
        Some(anchor) => anchor,
        None => {
            // Nothing decoded: one-shot deterministic fill of the whole
            // picture, with deblocking disabled throughout.
            match reference {
                Some(reference) if use_reference => {
                    image.copy_from(reference);
                }
                _ => image.fill(128),
            }

            for mb in mbs.iter_mut() {
                mark_concealed(mb);
                mb.disable_deblocking = true;
            }
            return true;
        }
    };

    let anchor_col = anchor % width_in_mbs;
    let anchor_row = anchor / width_in_mbs;

    let conceal = |col: usize, row: usize, image: &mut Image, mbs: &mut [MacroblockStorage]| {
        conceal_macroblock(
            image,
            mbs,
            col,
            row,
            width_in_mbs,
            height_in_mbs,
            use_reference,
            reference,
        );
    };

    // The anchor row: leftward from the anchor, then the remainder.
    for col in (0..anchor_col).rev() {
        conceal(col, anchor_row, image, mbs);
    }
    for col in anchor_col + 1..width_in_mbs {
        conceal(col, anchor_row, image, mbs);
    }

    // All rows above, bottom-to-top, then all rows below, top-to-bottom.
    for row in (0..anchor_row).rev() {
        for col in 0..width_in_mbs {
            conceal(col, row, image, mbs);
        }
    }
    for row in anchor_row + 1..height_in_mbs {
        for col in 0..width_in_mbs {
            conceal(col, row, image, mbs);
        }
    }

    false
}

fn mark_concealed(mb: &mut MacroblockStorage) {
    mb.state = DecodeState::Concealed;
    mb.written = true;
    mb.is_intra = true;
    mb.qp = CONCEALED_QP;
    mb.total_coeff = [0; 24];
}

#[allow(clippy::too_many_arguments)]
fn conceal_macroblock(
    image: &mut Image,
    mbs: &mut [MacroblockStorage],
    col: usize,
    row: usize,
    width_in_mbs: usize,
    height_in_mbs: usize,
    use_reference: bool,
    reference: Option<&Image>,
) {
    let addr = col + row * width_in_mbs;
    if !matches!(mbs[addr].state, DecodeState::NotAttempted) {
        return;
    }

    match reference {
        Some(reference) if use_reference => {
            // Zero-motion copy from the lowest-indexed reference, the
            // static P_Skip treatment.
            copy_reference_macroblock(image, reference, col, row);
        }
        _ => {
            // Which of the four spatial neighbours already hold content
            // (decoded or previously concealed).
            let has = [
                col > 0 && holds_content(mbs, addr - 1),
                row > 0 && holds_content(mbs, addr - width_in_mbs),
                col + 1 < width_in_mbs && holds_content(mbs, addr + 1),
                row + 1 < height_in_mbs && holds_content(mbs, addr + width_in_mbs),
            ];

            let luma_stride = image.luma_samples_per_row();
            conceal_plane(image.as_luma_mut(), luma_stride, (col * 16, row * 16), 16, has);

            let chroma_stride = image.chroma_samples_per_row();
            conceal_plane(
                image.as_chroma_b_mut(),
                chroma_stride,
                (col * 8, row * 8),
                8,
                has,
            );
            conceal_plane(
                image.as_chroma_r_mut(),
                chroma_stride,
                (col * 8, row * 8),
                8,
                has,
            );
        }
    }

    mark_concealed(&mut mbs[addr]);
}

fn holds_content(mbs: &[MacroblockStorage], addr: usize) -> bool {
    !matches!(mbs[addr].state, DecodeState::NotAttempted)
}

fn copy_reference_macroblock(image: &mut Image, reference: &Image, col: usize, row: usize) {
    let luma_stride = image.luma_samples_per_row();
    for y in 0..16 {
        let offset = col * 16 + (row * 16 + y) * luma_stride;
        image.as_luma_mut()[offset..offset + 16]
            .copy_from_slice(&reference.as_luma()[offset..offset + 16]);
    }

    let chroma_stride = image.chroma_samples_per_row();
    for y in 0..8 {
        let offset = col * 8 + (row * 8 + y) * chroma_stride;
        image.as_chroma_b_mut()[offset..offset + 8]
            .copy_from_slice(&reference.as_chroma_b()[offset..offset + 8]);
        image.as_chroma_r_mut()[offset..offset + 8]
            .copy_from_slice(&reference.as_chroma_r()[offset..offset + 8]);
    }
}

/// Sum of one neighbouring edge: the `len` samples of the neighbour's row or
/// column directly adjacent to the concealed region.
fn edge_sum(plane: &[u8], origin: usize, step: usize, len: usize) -> i32 {
    let mut sum = 0;
    for i in 0..len {
        sum += plane[origin + i * step] as i32;
    }
    sum
}

/// Conceal one `size` x `size` region of a plane from the edge samples of
/// the neighbours flagged in `has` (left, above, right, below).
///
/// The DC term is the combined edge sum divided by the total edge sample
/// count: shifts for one, two or four neighbours, and the fixed-point
/// multiply-by-21 approximation for the non-power-of-two three-neighbour
/// case. The lowest horizontal and vertical AC terms are derived from
/// opposing edge means and applied through a simplified 4-point inverse
/// transform over 4x4 constant cells.
fn conceal_plane(plane: &mut [u8], stride: usize, origin: (usize, usize), size: usize, has: [bool; 4]) {
    let (x0, y0) = origin;
    let shift = if size == 16 { 4 } else { 3 };

    let mut sum = 0i32;
    let mut count = 0u32;
    let mut means = [0i32; 4];

    if has[0] {
        let s = edge_sum(plane, (x0 - 1) + y0 * stride, stride, size);
        means[0] = s >> shift;
        sum += s;
        count += 1;
    }
    if has[1] {
        let s = edge_sum(plane, x0 + (y0 - 1) * stride, 1, size);
        means[1] = s >> shift;
        sum += s;
        count += 1;
    }
    if has[2] {
        let s = edge_sum(plane, (x0 + size) + y0 * stride, stride, size);
        means[2] = s >> shift;
        sum += s;
        count += 1;
    }
    if has[3] {
        let s = edge_sum(plane, x0 + (y0 + size) * stride, 1, size);
        means[3] = s >> shift;
        sum += s;
        count += 1;
    }

    let dc = match count {
        0 => 128,
        1 => sum >> shift,
        2 => sum >> (shift + 1),
        // 3 * 2^shift samples: approximate the division with the fixed
        // multiply-shift form rather than true division.
        3 => (sum * 21) >> (shift + 6),
        _ => sum >> (shift + 2),
    };

    // Lowest-frequency AC terms, present only when both opposing edges
    // exist.
    let ach = if has[0] && has[2] {
        (means[0] - means[2]) >> 1
    } else {
        0
    };
    let acv = if has[1] && has[3] {
        (means[1] - means[3]) >> 1
    } else {
        0
    };

    // One-dimensional inverse transform of (dc, ac, 0, 0), evaluated over
    // 4x4 constant cells.
    let h_term = [ach, ach >> 1, -(ach >> 1), -ach];
    let v_term = [acv, acv >> 1, -(acv >> 1), -acv];

    let cell = size / 4;
    for cy in 0..4 {
        for cx in 0..4 {
            let value = clip_u8(dc + h_term[cx] + v_term[cy]);
            for y in 0..cell {
                let base = x0 + cx * cell + (y0 + cy * cell + y) * stride;
                for x in 0..cell {
                    plane[base + x] = value;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::decoder::conceal::conceal_picture;
    use crate::decoder::macroblock::{DecodeState, MacroblockStorage};
    use crate::decoder::picture::Image;
    use crate::decoder::types::{DecoderOption, SliceType};

    fn storage(count: usize) -> Vec<MacroblockStorage> {
        (0..count).map(|_| MacroblockStorage::default()).collect()
    }

    #[test]
    fn total_loss_intra_fills_gray() {
        let mut image = Image::new(3, 2).unwrap();
        let mut mbs = storage(6);

        let whole = conceal_picture(
            &mut image,
            &mut mbs,
            3,
            2,
            SliceType::I,
            DecoderOption::empty(),
            &[],
        );

        assert!(whole);
        assert!(image.as_luma().iter().all(|&s| s == 128));
        assert!(image.as_chroma_b().iter().all(|&s| s == 128));
        assert!(image.as_chroma_r().iter().all(|&s| s == 128));
        for mb in &mbs {
            assert_eq!(mb.state, DecodeState::Concealed);
            assert!(mb.disable_deblocking);
            assert!(mb.is_intra);
            assert_eq!(mb.qp, 40);
        }
    }

    #[test]
    fn total_loss_inter_copies_reference() {
        let mut image = Image::new(3, 2).unwrap();
        let mut mbs = storage(6);

        let mut reference = Image::new(3, 2).unwrap();
        for (i, sample) in reference.as_luma_mut().iter_mut().enumerate() {
            *sample = (i % 201) as u8;
        }
        for (i, sample) in reference.as_chroma_b_mut().iter_mut().enumerate() {
            *sample = (i % 77) as u8;
        }

        let whole = conceal_picture(
            &mut image,
            &mut mbs,
            3,
            2,
            SliceType::P,
            DecoderOption::empty(),
            std::slice::from_ref(&reference),
        );

        assert!(whole);
        assert_eq!(image.as_luma(), reference.as_luma());
        assert_eq!(image.as_chroma_b(), reference.as_chroma_b());
        assert_eq!(image.as_chroma_r(), reference.as_chroma_r());
        assert!(mbs.iter().all(|mb| mb.disable_deblocking));
    }

    #[test]
    fn total_loss_intra_freeze_uses_reference() {
        let mut image = Image::new(2, 2).unwrap();
        let mut mbs = storage(4);

        let mut reference = Image::new(2, 2).unwrap();
        reference.fill(55);

        conceal_picture(
            &mut image,
            &mut mbs,
            2,
            2,
            SliceType::I,
            DecoderOption::INTRA_FREEZE_CONCEALMENT,
            std::slice::from_ref(&reference),
        );

        assert!(image.as_luma().iter().all(|&s| s == 55));
    }

    #[test]
    fn partial_loss_spreads_from_anchor() {
        // 3x3 picture with one decoded macroblock in the middle; spatial
        // concealment must flood its flat content everywhere.
        let mut image = Image::new(3, 3).unwrap();
        let mut mbs = storage(9);

        let luma_stride = image.luma_samples_per_row();
        for y in 16..32 {
            for x in 16..32 {
                image.as_luma_mut()[x + y * luma_stride] = 200;
            }
        }
        let chroma_stride = image.chroma_samples_per_row();
        for y in 8..16 {
            for x in 8..16 {
                image.as_chroma_b_mut()[x + y * chroma_stride] = 100;
                image.as_chroma_r_mut()[x + y * chroma_stride] = 100;
            }
        }
        mbs[4].state = DecodeState::Decoded;
        mbs[4].written = true;

        let whole = conceal_picture(
            &mut image,
            &mut mbs,
            3,
            3,
            SliceType::I,
            DecoderOption::empty(),
            &[],
        );

        assert!(!whole);
        assert!(image.as_luma().iter().all(|&s| s == 200));
        assert!(image.as_chroma_b().iter().all(|&s| s == 100));
        assert!(image.as_chroma_r().iter().all(|&s| s == 100));
        // The decoded macroblock keeps its own state; the rest are
        // concealed without a picture-wide deblocking disable.
        assert_eq!(mbs[4].state, DecodeState::Decoded);
        assert!(mbs.iter().enumerate().all(|(i, mb)| i == 4
            || (mb.state == DecodeState::Concealed && !mb.disable_deblocking)));
    }

    #[test]
    fn three_neighbour_fixed_point_divisor() {
        // Craft a hole whose left, above and below neighbours hold flat
        // content while the right one stays empty: the 21 >> 10 fixed-point
        // form gives 94, not the exact mean 96 — the documented bias.
        let mut image = Image::new(3, 3).unwrap();
        let mut mbs = storage(9);

        for (i, mb) in mbs.iter_mut().enumerate() {
            if i != 4 && i != 5 {
                mb.state = DecodeState::Decoded;
                mb.written = true;
            }
        }
        image.fill(96);

        conceal_picture(
            &mut image,
            &mut mbs,
            3,
            3,
            SliceType::I,
            DecoderOption::empty(),
            &[],
        );

        // Centre macroblock (addr 4, luma origin 16,16) saw three
        // neighbours when it was concealed.
        let luma_stride = image.luma_samples_per_row();
        assert_eq!(image.as_luma()[16 + 16 * luma_stride], 94);
        assert_eq!(image.as_luma()[31 + 31 * luma_stride], 94);
    }
}
