//! Reconstruction primitives implemented on the CPU

pub(crate) mod inter;
pub(crate) mod interpolate;
pub(crate) mod intra;
pub(crate) mod mv_pred;
pub(crate) mod transform;

use lazy_static::lazy_static;

lazy_static! {
    /// Sample clipping table covering the intermediate range of the
    /// interpolation filters, indexed by `value + 512`.
    static ref CLIP: [u8; 1536] = {
        let mut table = [0u8; 1536];
        for (i, entry) in table.iter_mut().enumerate() {
            let value = i as i32 - 512;
            *entry = if value < 0 {
                0
            } else if value > 255 {
                255
            } else {
                value as u8
            };
        }
        table
    };
}

/// Clip a filter intermediate to the 8-bit sample range through the
/// precomputed table. The input must lie in `[-512, 1023]`, which every
/// interpolation filter sum satisfies.
#[inline]
pub(crate) fn clip(value: i32) -> u8 {
    CLIP[(value + 512) as usize]
}

/// Clip an arbitrary value to the 8-bit sample range. Used where the input
/// range is unbounded (residual addition).
#[inline]
pub(crate) fn clip_u8(value: i32) -> u8 {
    value.max(0).min(255) as u8
}

#[cfg(test)]
mod tests {
    use crate::decoder::cpu::{clip, clip_u8};

    #[test]
    fn clip_table_matches_clamp() {
        for value in -512..1024 {
            assert_eq!(clip(value), clip_u8(value));
        }
    }
}
