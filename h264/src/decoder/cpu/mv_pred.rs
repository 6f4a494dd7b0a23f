//! Motion vector prediction
//!
//! Each inter partition's motion vector is predicted from up to three causal
//! neighbour partitions (left A, above B, above-right C, with above-left D
//! standing in when C is unavailable) and combined with the parsed motion
//! vector difference. The decoded vector is range-validated; violations fail
//! the macroblock, they do not panic.

use crate::error::{Error, Result};
use crate::types::MotionVector;

/// Motion data of one neighbouring partition.
///
/// An unavailable or intra-coded neighbour is represented by the
/// conventional substitution: a zero vector with the non-matching sentinel
/// reference index `-1`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NeighbourMotion {
    pub mv: MotionVector,
    pub ref_idx: i8,
}

impl NeighbourMotion {
    /// The substitution value for neighbours without motion data.
    pub const fn absent() -> Self {
        Self {
            mv: MotionVector::zero(),
            ref_idx: -1,
        }
    }

    fn is_zero_with_ref_zero(self) -> bool {
        self.ref_idx == 0 && self.mv.is_zero()
    }
}

fn median3(a: i16, b: i16, c: i16) -> i16 {
    a.max(b).min(a.min(b).max(c))
}

/// Component-wise median of three motion vectors.
pub fn median(a: MotionVector, b: MotionVector, c: MotionVector) -> MotionVector {
    let x = median3(
        a.x().into_unit(),
        b.x().into_unit(),
        c.x().into_unit(),
    );
    let y = median3(
        a.y().into_unit(),
        b.y().into_unit(),
        c.y().into_unit(),
    );
    MotionVector::from_units(x, y)
}

/// Produce the predicted motion vector for a partition with the given
/// reference index.
///
/// `a`, `b` and `c` are the left, above and above-right (or substituted
/// above-left) neighbours; `None` marks a neighbour whose macroblock is
/// unavailable. If the above, above-right and above-left macroblocks are all
/// unavailable but the left one is not, the prediction is the left vector.
/// Otherwise, when exactly one neighbour shares the partition's reference
/// index its vector is used directly; in every other case the component-wise
/// median applies, with absent neighbours contributing the zero-vector
/// substitution.
pub fn predict(
    a: Option<NeighbourMotion>,
    b: Option<NeighbourMotion>,
    c: Option<NeighbourMotion>,
    ref_idx: u8,
) -> MotionVector {
    if b.is_none() && c.is_none() {
        if let Some(a) = a {
            return a.mv;
        }
    }

    let a = a.unwrap_or_else(NeighbourMotion::absent);
    let b = b.unwrap_or_else(NeighbourMotion::absent);
    let c = c.unwrap_or_else(NeighbourMotion::absent);

    let candidates = [a, b, c];
    let mut matching = candidates
        .iter()
        .filter(|n| n.ref_idx == ref_idx as i8);
    if let (Some(only), None) = (matching.next(), matching.next()) {
        return only.mv;
    }

    median(a.mv, b.mv, c.mv)
}

/// Predictor for a 16x8 partition (`index` 0 = top, 1 = bottom).
///
/// The top partition takes the above neighbour's vector directly when its
/// reference index matches; the bottom takes the left neighbour's. The
/// general rule applies otherwise.
pub fn predict_16x8(
    index: usize,
    a: Option<NeighbourMotion>,
    b: Option<NeighbourMotion>,
    c: Option<NeighbourMotion>,
    ref_idx: u8,
) -> MotionVector {
    let shortcut = if index == 0 { b } else { a };
    if let Some(n) = shortcut {
        if n.ref_idx == ref_idx as i8 {
            return n.mv;
        }
    }

    predict(a, b, c, ref_idx)
}

/// Predictor for an 8x16 partition (`index` 0 = left, 1 = right).
///
/// The left partition takes the left neighbour's vector directly when its
/// reference index matches; the right takes the above-right neighbour's.
pub fn predict_8x16(
    index: usize,
    a: Option<NeighbourMotion>,
    b: Option<NeighbourMotion>,
    c: Option<NeighbourMotion>,
    ref_idx: u8,
) -> MotionVector {
    let shortcut = if index == 0 { a } else { c };
    if let Some(n) = shortcut {
        if n.ref_idx == ref_idx as i8 {
            return n.mv;
        }
    }

    predict(a, b, c, ref_idx)
}

/// The inferred motion vector of a P_Skip macroblock.
///
/// Zero whenever the left or above neighbour is unavailable, or either of
/// them is at rest on reference 0; the 16x16 predictor applies otherwise.
pub fn skip_vector(
    a: Option<NeighbourMotion>,
    b: Option<NeighbourMotion>,
    c: Option<NeighbourMotion>,
) -> MotionVector {
    match (a, b) {
        (Some(a), Some(b)) => {
            if a.is_zero_with_ref_zero() || b.is_zero_with_ref_zero() {
                MotionVector::zero()
            } else {
                predict(Some(a), Some(b), c, 0)
            }
        }
        _ => MotionVector::zero(),
    }
}

/// Combine a predictor with the parsed motion vector difference and
/// validate the decoded range.
pub fn resolve(predictor: MotionVector, mvd: MotionVector) -> Result<MotionVector> {
    let mv = predictor + mvd;
    if mv.is_within_range() {
        Ok(mv)
    } else {
        Err(Error::MotionVectorOutOfRange)
    }
}

#[cfg(test)]
mod tests {
    use crate::decoder::cpu::mv_pred::{
        median, predict, predict_16x8, predict_8x16, resolve, skip_vector, NeighbourMotion,
    };
    use crate::error::Error;
    use crate::types::MotionVector;

    fn motion(x: i16, y: i16, ref_idx: i8) -> NeighbourMotion {
        NeighbourMotion {
            mv: MotionVector::from_units(x, y),
            ref_idx,
        }
    }

    #[test]
    fn component_wise_median() {
        assert_eq!(
            median(
                MotionVector::from_units(1, 9),
                MotionVector::from_units(5, -3),
                MotionVector::from_units(3, 4),
            ),
            MotionVector::from_units(3, 4)
        );
        assert_eq!(
            median(
                MotionVector::from_units(-4, 0),
                MotionVector::from_units(-4, 0),
                MotionVector::from_units(8, 2),
            ),
            MotionVector::from_units(-4, 0)
        );
    }

    #[test]
    fn single_reference_match_wins_over_median() {
        // Exactly one neighbour on the target reference: its vector is the
        // predictor even though the median would differ.
        let predicted = predict(
            Some(motion(4, 0, 0)),
            Some(motion(0, 4, 1)),
            Some(motion(8, 8, 1)),
            0,
        );
        assert_eq!(predicted, MotionVector::from_units(4, 0));
    }

    #[test]
    fn multiple_matches_fall_back_to_median() {
        let predicted = predict(
            Some(motion(4, 0, 0)),
            Some(motion(0, 4, 0)),
            Some(motion(8, 8, 1)),
            0,
        );
        assert_eq!(predicted, MotionVector::from_units(4, 4));
    }

    #[test]
    fn absent_neighbours_substitute_zero() {
        // No reference match anywhere: median over (a, 0, 0).
        let predicted = predict(Some(motion(6, -2, 1)), None, Some(motion(2, 2, 1)), 0);
        assert_eq!(predicted, MotionVector::from_units(2, 0));
    }

    #[test]
    fn lone_left_neighbour_is_used_directly() {
        // Above row fully unavailable: the left vector is the predictor
        // regardless of its reference index.
        let predicted = predict(Some(motion(6, -2, 1)), None, None, 0);
        assert_eq!(predicted, MotionVector::from_units(6, -2));
    }

    #[test]
    fn directional_shortcuts() {
        let a = Some(motion(1, 1, 0));
        let b = Some(motion(2, 2, 1));
        let c = Some(motion(3, 3, 1));

        // Top 16x8 prefers B when B matches.
        assert_eq!(predict_16x8(0, a, b, c, 1), MotionVector::from_units(2, 2));
        // Bottom 16x8 prefers A when A matches.
        assert_eq!(predict_16x8(1, a, b, c, 0), MotionVector::from_units(1, 1));
        // B does not match ref 0: general rule, exactly one match (A).
        assert_eq!(predict_16x8(0, a, b, c, 0), MotionVector::from_units(1, 1));

        // Left 8x16 prefers A; right prefers C.
        assert_eq!(predict_8x16(0, a, b, c, 0), MotionVector::from_units(1, 1));
        assert_eq!(predict_8x16(1, a, b, c, 1), MotionVector::from_units(3, 3));
    }

    #[test]
    fn skip_vector_rules() {
        // Unavailable neighbour forces zero.
        assert_eq!(
            skip_vector(None, Some(motion(4, 4, 0)), None),
            MotionVector::zero()
        );
        // A resting reference-0 neighbour forces zero.
        assert_eq!(
            skip_vector(Some(motion(0, 0, 0)), Some(motion(4, 4, 0)), None),
            MotionVector::zero()
        );
        // Otherwise the 16x16 predictor applies.
        assert_eq!(
            skip_vector(
                Some(motion(4, 0, 0)),
                Some(motion(0, 4, 1)),
                Some(motion(8, 8, 1)),
            ),
            MotionVector::from_units(4, 0)
        );
    }

    #[test]
    fn range_validation() {
        let ok = resolve(
            MotionVector::from_units(2000, 500),
            MotionVector::from_units(47, 11),
        );
        assert_eq!(ok, Ok(MotionVector::from_units(2047, 511)));

        let err = resolve(
            MotionVector::from_units(2000, 0),
            MotionVector::from_units(48, 0),
        );
        assert_eq!(err, Err(Error::MotionVectorOutOfRange));
    }
}
