//! Intra sample prediction
//!
//! Intra prediction reads already-reconstructed samples of the block's left
//! and above neighbours, which is why macroblocks and their 4x4 sub-blocks
//! are processed in strict raster order. Each mode has a normative
//! availability requirement; an unmet requirement mirrors a stream
//! conformance violation and fails the macroblock.

use crate::decoder::cpu::clip_u8;
use crate::error::{Error, Result};
use crate::types::{Intra16x16Mode, Intra4x4Mode, Intra4x4ModeSelect, IntraChromaMode};

/// Neighbouring samples of one 4x4 block.
///
/// `above` holds p[0..8, -1]: the four samples directly above and the four
/// above-right ones. When the above row is available but the above-right
/// block is not, the caller replicates the last above sample into the upper
/// half, which is the normative substitution.
pub struct BlockNeighbours {
    pub above: [u8; 8],
    pub left: [u8; 4],
    pub above_left: u8,
    pub has_above: bool,
    pub has_left: bool,
    pub has_above_left: bool,
}

impl BlockNeighbours {
    /// p[i, -1] with p[-1, -1] answered at index -1.
    fn above_or_corner(&self, i: i32) -> i32 {
        if i < 0 {
            self.above_left as i32
        } else {
            self.above[i as usize] as i32
        }
    }

    /// p[-1, i] with p[-1, -1] answered at index -1.
    fn left_or_corner(&self, i: i32) -> i32 {
        if i < 0 {
            self.above_left as i32
        } else {
            self.left[i as usize] as i32
        }
    }
}

fn require(available: bool) -> Result<()> {
    if available {
        Ok(())
    } else {
        Err(Error::IntraNeighbourUnavailable)
    }
}

/// Derive the final 4x4 mode of a block from its parsed mode selection and
/// the modes of its left and above neighbour blocks.
///
/// A neighbour that is unavailable or not Intra_4x4 coded contributes DC;
/// the most probable mode is the smaller-numbered of the two. A remainder
/// selection skips over the most probable mode.
pub fn derive_4x4_mode(
    select: Intra4x4ModeSelect,
    mode_a: Option<Intra4x4Mode>,
    mode_b: Option<Intra4x4Mode>,
) -> Result<Intra4x4Mode> {
    let a = mode_a.map_or(Intra4x4Mode::Dc.number(), Intra4x4Mode::number);
    let b = mode_b.map_or(Intra4x4Mode::Dc.number(), Intra4x4Mode::number);
    let most_probable = a.min(b);

    let number = match select {
        Intra4x4ModeSelect::MostProbable => most_probable,
        Intra4x4ModeSelect::Remainder(rem) => {
            if rem > 7 {
                return Err(Error::InvalidSemantics);
            }
            if rem < most_probable {
                rem
            } else {
                rem + 1
            }
        }
    };

    Intra4x4Mode::from_number(number).ok_or(Error::InvalidSemantics)
}

/// Predict one 4x4 block. The result is written row-major into `out`.
pub fn predict_4x4(mode: Intra4x4Mode, n: &BlockNeighbours, out: &mut [u8; 16]) -> Result<()> {
    match mode {
        Intra4x4Mode::Vertical => {
            require(n.has_above)?;
            for y in 0..4 {
                for x in 0..4 {
                    out[x + y * 4] = n.above[x];
                }
            }
        }

        Intra4x4Mode::Horizontal => {
            require(n.has_left)?;
            for y in 0..4 {
                for x in 0..4 {
                    out[x + y * 4] = n.left[y];
                }
            }
        }

        Intra4x4Mode::Dc => {
            let dc = match (n.has_above, n.has_left) {
                (true, true) => {
                    let above: u32 = n.above[..4].iter().map(|&s| s as u32).sum();
                    let left: u32 = n.left.iter().map(|&s| s as u32).sum();
                    ((above + left + 4) >> 3) as u8
                }
                (true, false) => {
                    let above: u32 = n.above[..4].iter().map(|&s| s as u32).sum();
                    ((above + 2) >> 2) as u8
                }
                (false, true) => {
                    let left: u32 = n.left.iter().map(|&s| s as u32).sum();
                    ((left + 2) >> 2) as u8
                }
                (false, false) => 128,
            };
            for sample in out.iter_mut() {
                *sample = dc;
            }
        }

        Intra4x4Mode::DiagonalDownLeft => {
            require(n.has_above)?;
            for y in 0..4i32 {
                for x in 0..4i32 {
                    let value = if x == 3 && y == 3 {
                        (n.above_or_corner(6) + 3 * n.above_or_corner(7) + 2) >> 2
                    } else {
                        (n.above_or_corner(x + y)
                            + 2 * n.above_or_corner(x + y + 1)
                            + n.above_or_corner(x + y + 2)
                            + 2)
                            >> 2
                    };
                    out[(x + y * 4) as usize] = value as u8;
                }
            }
        }

        Intra4x4Mode::DiagonalDownRight => {
            require(n.has_above && n.has_left && n.has_above_left)?;
            for y in 0..4i32 {
                for x in 0..4i32 {
                    let value = if x > y {
                        (n.above_or_corner(x - y - 2)
                            + 2 * n.above_or_corner(x - y - 1)
                            + n.above_or_corner(x - y)
                            + 2)
                            >> 2
                    } else if x < y {
                        (n.left_or_corner(y - x - 2)
                            + 2 * n.left_or_corner(y - x - 1)
                            + n.left_or_corner(y - x)
                            + 2)
                            >> 2
                    } else {
                        (n.above_or_corner(0)
                            + 2 * n.above_left as i32
                            + n.left_or_corner(0)
                            + 2)
                            >> 2
                    };
                    out[(x + y * 4) as usize] = value as u8;
                }
            }
        }

        Intra4x4Mode::VerticalRight => {
            require(n.has_above && n.has_left && n.has_above_left)?;
            for y in 0..4i32 {
                for x in 0..4i32 {
                    let z = 2 * x - y;
                    let value = if z >= 0 && z % 2 == 0 {
                        (n.above_or_corner(x - (y >> 1) - 1)
                            + n.above_or_corner(x - (y >> 1))
                            + 1)
                            >> 1
                    } else if z >= 0 {
                        (n.above_or_corner(x - (y >> 1) - 2)
                            + 2 * n.above_or_corner(x - (y >> 1) - 1)
                            + n.above_or_corner(x - (y >> 1))
                            + 2)
                            >> 2
                    } else if z == -1 {
                        (n.left_or_corner(0)
                            + 2 * n.above_left as i32
                            + n.above_or_corner(0)
                            + 2)
                            >> 2
                    } else {
                        (n.left_or_corner(y - 2 * x - 1)
                            + 2 * n.left_or_corner(y - 2 * x - 2)
                            + n.left_or_corner(y - 2 * x - 3)
                            + 2)
                            >> 2
                    };
                    out[(x + y * 4) as usize] = value as u8;
                }
            }
        }

        Intra4x4Mode::HorizontalDown => {
            require(n.has_above && n.has_left && n.has_above_left)?;
            for y in 0..4i32 {
                for x in 0..4i32 {
                    let z = 2 * y - x;
                    let value = if z >= 0 && z % 2 == 0 {
                        (n.left_or_corner(y - (x >> 1) - 1)
                            + n.left_or_corner(y - (x >> 1))
                            + 1)
                            >> 1
                    } else if z >= 0 {
                        (n.left_or_corner(y - (x >> 1) - 2)
                            + 2 * n.left_or_corner(y - (x >> 1) - 1)
                            + n.left_or_corner(y - (x >> 1))
                            + 2)
                            >> 2
                    } else if z == -1 {
                        (n.left_or_corner(0)
                            + 2 * n.above_left as i32
                            + n.above_or_corner(0)
                            + 2)
                            >> 2
                    } else {
                        (n.above_or_corner(x - 2 * y - 1)
                            + 2 * n.above_or_corner(x - 2 * y - 2)
                            + n.above_or_corner(x - 2 * y - 3)
                            + 2)
                            >> 2
                    };
                    out[(x + y * 4) as usize] = value as u8;
                }
            }
        }

        Intra4x4Mode::VerticalLeft => {
            require(n.has_above)?;
            for y in 0..4i32 {
                for x in 0..4i32 {
                    let base = x + (y >> 1);
                    let value = if y % 2 == 0 {
                        (n.above_or_corner(base) + n.above_or_corner(base + 1) + 1) >> 1
                    } else {
                        (n.above_or_corner(base)
                            + 2 * n.above_or_corner(base + 1)
                            + n.above_or_corner(base + 2)
                            + 2)
                            >> 2
                    };
                    out[(x + y * 4) as usize] = value as u8;
                }
            }
        }

        Intra4x4Mode::HorizontalUp => {
            require(n.has_left)?;
            for y in 0..4i32 {
                for x in 0..4i32 {
                    let z = x + 2 * y;
                    let base = y + (x >> 1);
                    let value = if z > 5 {
                        n.left[3] as i32
                    } else if z == 5 {
                        (n.left[2] as i32 + 3 * n.left[3] as i32 + 2) >> 2
                    } else if z % 2 == 0 {
                        (n.left_or_corner(base) + n.left_or_corner(base + 1) + 1) >> 1
                    } else {
                        (n.left_or_corner(base)
                            + 2 * n.left_or_corner(base + 1)
                            + n.left_or_corner(base + 2)
                            + 2)
                            >> 2
                    };
                    out[(x + y * 4) as usize] = value as u8;
                }
            }
        }
    }

    Ok(())
}

/// Neighbouring samples of a full luma macroblock.
pub struct MbNeighbourSamples {
    pub above: [u8; 16],
    pub left: [u8; 16],
    pub above_left: u8,
    pub has_above: bool,
    pub has_left: bool,
    pub has_above_left: bool,
}

/// Predict a full 16x16 luma macroblock. The result is written row-major
/// into `out`.
pub fn predict_16x16(
    mode: Intra16x16Mode,
    n: &MbNeighbourSamples,
    out: &mut [u8; 256],
) -> Result<()> {
    match mode {
        Intra16x16Mode::Vertical => {
            require(n.has_above)?;
            for y in 0..16 {
                for x in 0..16 {
                    out[x + y * 16] = n.above[x];
                }
            }
        }

        Intra16x16Mode::Horizontal => {
            require(n.has_left)?;
            for y in 0..16 {
                for x in 0..16 {
                    out[x + y * 16] = n.left[y];
                }
            }
        }

        Intra16x16Mode::Dc => {
            let dc = match (n.has_above, n.has_left) {
                (true, true) => {
                    let above: u32 = n.above.iter().map(|&s| s as u32).sum();
                    let left: u32 = n.left.iter().map(|&s| s as u32).sum();
                    ((above + left + 16) >> 5) as u8
                }
                (true, false) => {
                    let above: u32 = n.above.iter().map(|&s| s as u32).sum();
                    ((above + 8) >> 4) as u8
                }
                (false, true) => {
                    let left: u32 = n.left.iter().map(|&s| s as u32).sum();
                    ((left + 8) >> 4) as u8
                }
                (false, false) => 128,
            };
            for sample in out.iter_mut() {
                *sample = dc;
            }
        }

        Intra16x16Mode::Plane => {
            require(n.has_above && n.has_left && n.has_above_left)?;

            let above = |i: i32| -> i32 {
                if i < 0 {
                    n.above_left as i32
                } else {
                    n.above[i as usize] as i32
                }
            };
            let left = |i: i32| -> i32 {
                if i < 0 {
                    n.above_left as i32
                } else {
                    n.left[i as usize] as i32
                }
            };

            let mut h = 0;
            let mut v = 0;
            for i in 0..8 {
                h += (i + 1) * (above(8 + i) - above(6 - i));
                v += (i + 1) * (left(8 + i) - left(6 - i));
            }

            let a = 16 * (left(15) + above(15));
            let b = (5 * h + 32) >> 6;
            let c = (5 * v + 32) >> 6;

            for y in 0..16i32 {
                for x in 0..16i32 {
                    out[(x + y * 16) as usize] =
                        clip_u8((a + b * (x - 7) + c * (y - 7) + 16) >> 5);
                }
            }
        }
    }

    Ok(())
}

/// Neighbouring samples of one 8x8 chroma component block.
pub struct ChromaNeighbourSamples {
    pub above: [u8; 8],
    pub left: [u8; 8],
    pub above_left: u8,
    pub has_above: bool,
    pub has_left: bool,
    pub has_above_left: bool,
}

/// DC prediction of one 4x4 chroma sub-block from optional 4-sample
/// neighbour sums, with the normative per-position preference order.
fn chroma_dc_value(primary: Option<u32>, secondary: Option<u32>, both: bool) -> u8 {
    match (primary, secondary) {
        (Some(p), Some(s)) if both => ((p + s + 4) >> 3) as u8,
        (Some(p), _) => ((p + 2) >> 2) as u8,
        (None, Some(s)) => ((s + 2) >> 2) as u8,
        (None, None) => 128,
    }
}

/// Predict one 8x8 chroma component block. The result is written row-major
/// into `out`.
pub fn predict_chroma(
    mode: IntraChromaMode,
    n: &ChromaNeighbourSamples,
    out: &mut [u8; 64],
) -> Result<()> {
    match mode {
        IntraChromaMode::Dc => {
            // Each 4x4 quadrant has its own neighbour preference: corner
            // quadrants use both sides, the top-right prefers above, the
            // bottom-left prefers left.
            let sum_above = |range: std::ops::Range<usize>| -> Option<u32> {
                if n.has_above {
                    Some(n.above[range].iter().map(|&s| s as u32).sum())
                } else {
                    None
                }
            };
            let sum_left = |range: std::ops::Range<usize>| -> Option<u32> {
                if n.has_left {
                    Some(n.left[range].iter().map(|&s| s as u32).sum())
                } else {
                    None
                }
            };

            let quadrants = [
                chroma_dc_value(sum_above(0..4), sum_left(0..4), true),
                chroma_dc_value(sum_above(4..8), sum_left(0..4), false),
                chroma_dc_value(sum_left(4..8), sum_above(0..4), false),
                chroma_dc_value(sum_above(4..8), sum_left(4..8), true),
            ];

            for y in 0..8 {
                for x in 0..8 {
                    out[x + y * 8] = quadrants[(y / 4) * 2 + x / 4];
                }
            }
        }

        IntraChromaMode::Horizontal => {
            require(n.has_left)?;
            for y in 0..8 {
                for x in 0..8 {
                    out[x + y * 8] = n.left[y];
                }
            }
        }

        IntraChromaMode::Vertical => {
            require(n.has_above)?;
            for y in 0..8 {
                for x in 0..8 {
                    out[x + y * 8] = n.above[x];
                }
            }
        }

        IntraChromaMode::Plane => {
            require(n.has_above && n.has_left && n.has_above_left)?;

            let above = |i: i32| -> i32 {
                if i < 0 {
                    n.above_left as i32
                } else {
                    n.above[i as usize] as i32
                }
            };
            let left = |i: i32| -> i32 {
                if i < 0 {
                    n.above_left as i32
                } else {
                    n.left[i as usize] as i32
                }
            };

            let mut h = 0;
            let mut v = 0;
            for i in 0..4 {
                h += (i + 1) * (above(4 + i) - above(2 - i));
                v += (i + 1) * (left(4 + i) - left(2 - i));
            }

            let a = 16 * (left(7) + above(7));
            let b = (17 * h + 16) >> 5;
            let c = (17 * v + 16) >> 5;

            for y in 0..8i32 {
                for x in 0..8i32 {
                    out[(x + y * 8) as usize] =
                        clip_u8((a + b * (x - 3) + c * (y - 3) + 16) >> 5);
                }
            }
        }
    }

    Ok(())
}
