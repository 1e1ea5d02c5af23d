//! Motion vector and merge-candidate syntax (§7.3.8.6/§7.3.8.9).
//!
//! Grounded in `hevc_cabac.c`'s `hls_prediction_unit`/`ff_hevc_hls_mvd_coding`.
//! Candidate-list construction (spatial/temporal merge candidates) is a
//! neighbour-lookup problem over reconstructed picture state rather than a
//! CABAC-syntax one, and is left to the picture-reconstruction driver; this
//! module owns only the bitstream-facing syntax elements.

use crate::h265::cabac::contexts::ContextElement;
use crate::h265::cabac::CabacEngine;

/// `mvd_coding()` (§7.3.8.9): one signed motion vector difference component
/// pair, decoded with the abs-greater-than-0/1 context flags plus an
/// Exp-Golomb-like bypass remainder and sign bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionVectorDifference {
    pub x: i32,
    pub y: i32,
}

pub fn decode_mvd(cabac: &mut CabacEngine) -> MotionVectorDifference {
    MotionVectorDifference {
        x: decode_mvd_component(cabac),
        y: decode_mvd_component(cabac),
    }
}

fn decode_mvd_component(cabac: &mut CabacEngine) -> i32 {
    let greater0 = cabac.decode_bin(ContextElement::AbsMvdGreater0Flag, 0);
    if !greater0 {
        return 0;
    }
    let greater1 = cabac.decode_bin(ContextElement::AbsMvdGreater1Flag, 0);

    let mut abs_value: u32 = 1;
    if greater1 {
        // Exp-Golomb order-1 remainder (`abs_mvd_minus2`), bypass-coded.
        abs_value += 1 + decode_eg1_bypass(cabac);
    }

    if cabac.decode_bypass() {
        -(abs_value as i32)
    } else {
        abs_value as i32
    }
}

/// Exp-Golomb order-k bypass decode (used for `abs_mvd_minus2`, k = 1).
fn decode_eg1_bypass(cabac: &mut CabacEngine) -> u32 {
    let mut leading_ones = 0u32;
    while cabac.decode_bypass() {
        leading_ones += 1;
        if leading_ones > 31 {
            break;
        }
    }
    let suffix_bits = leading_ones + 1;
    let suffix = cabac.decode_bypass_bits(suffix_bits);
    ((1u32 << leading_ones) - 1) * 2 + suffix
}

/// `merge_idx` (§7.3.8.6): unary-coded up to `MaxNumMergeCand - 1`, first bin
/// context-coded, remainder bypass.
pub fn decode_merge_idx(cabac: &mut CabacEngine, max_num_merge_cand: u32) -> u32 {
    if max_num_merge_cand <= 1 {
        return 0;
    }
    if !cabac.decode_bin(ContextElement::MergeIdx, 0) {
        return 0;
    }
    let mut idx = 1;
    while idx < max_num_merge_cand - 1 && cabac.decode_bypass() {
        idx += 1;
    }
    idx
}

pub fn decode_mvp_flag(cabac: &mut CabacEngine) -> bool {
    cabac.decode_bin(ContextElement::MvpLxFlag, 0)
}

/// `merge_flag` (§7.3.8.6).
pub fn decode_merge_flag(cabac: &mut CabacEngine) -> bool {
    cabac.decode_bin(ContextElement::MergeFlag, 0)
}

/// The syntax elements `prediction_unit()` (§7.3.8.6) decodes for one
/// inter-predicted PU once `skip_flag`/`merge_flag` have already routed
/// control here: either a `merge_idx`, or an MVD plus `mvp_lX_flag` for
/// each active prediction list. Reference-index and `inter_pred_idc`
/// decoding (which list(s) are used) is left to the caller, since that
/// depends on slice type and PU geometry this module doesn't track.
#[derive(Debug, Clone, Copy)]
pub enum PredictionUnitMotion {
    Merge { merge_idx: u32 },
    Explicit { mvd: MotionVectorDifference, mvp_flag: bool },
}

pub fn decode_prediction_unit_motion(
    cabac: &mut CabacEngine,
    max_num_merge_cand: u32,
) -> PredictionUnitMotion {
    if decode_merge_flag(cabac) {
        PredictionUnitMotion::Merge {
            merge_idx: decode_merge_idx(cabac, max_num_merge_cand),
        }
    } else {
        PredictionUnitMotion::Explicit {
            mvd: decode_mvd(cabac),
            mvp_flag: decode_mvp_flag(cabac),
        }
    }
}

/// A motion vector in quarter-pel units, as stored in a picture's MV field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionVector {
    pub x: i32,
    pub y: i32,
}

/// §8.5.3.2.8's `tb`/`td` POC-distance scaling factor, applied to both
/// spatial candidates crossing a prediction-list boundary and the temporal
/// (collocated) candidate: `distScaleFactor = Clip3(-4096, 4095, (tb *
/// ((16384 + (|td| >> 1)) / td) + 32) >> 6)`.
pub fn distance_scale_factor(tb: i32, td: i32) -> i32 {
    if td == 0 {
        return 4096;
    }
    let tx = (16384 + (td.abs() >> 1)) / td;
    let scale = (tb * tx + 32) >> 6;
    scale.clamp(-4096, 4095)
}

/// Applies a `distScaleFactor` to one motion-vector component, §8.5.3.2.8:
/// `Clip3(-32768, 32767, Sign(scale * mv) * ((Abs(scale * mv) + 127) >> 8))`.
pub fn scale_mv_component(scale_factor: i32, component: i32) -> i32 {
    let product = scale_factor * component;
    let magnitude = (product.abs() + 127) >> 8;
    let signed = if product < 0 { -magnitude } else { magnitude };
    signed.clamp(-32768, 32767)
}

pub fn scale_motion_vector(scale_factor: i32, mv: MotionVector) -> MotionVector {
    MotionVector {
        x: scale_mv_component(scale_factor, mv.x),
        y: scale_mv_component(scale_factor, mv.y),
    }
}

/// One candidate considered by spatial/temporal merge-list construction
/// (§8.5.3.2.2-§8.5.3.2.7): a motion vector plus which way it points and
/// whether its reference is long-term (long-term refs are never scaled by
/// POC distance, §8.5.3.2.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeCandidate {
    pub mv_l0: Option<MotionVector>,
    pub mv_l1: Option<MotionVector>,
    pub ref_idx_l0: Option<u8>,
    pub ref_idx_l1: Option<u8>,
    pub is_long_term_l0: bool,
    pub is_long_term_l1: bool,
}

impl MergeCandidate {
    /// Two candidates are duplicates for the pairwise-removal rule in
    /// §8.5.3.2.2 if every list's MV and reference index match.
    fn is_duplicate_of(&self, other: &MergeCandidate) -> bool {
        self.mv_l0 == other.mv_l0
            && self.mv_l1 == other.mv_l1
            && self.ref_idx_l0 == other.ref_idx_l0
            && self.ref_idx_l1 == other.ref_idx_l1
    }
}

/// Builds the merge candidate list (§8.5.3.2.1): spatial candidates in the
/// prescribed {A1, B1, B0, A0, B2} order (B2 only used when the list has
/// fewer than four entries already), each gated by the caller's
/// availability/MER check; an optional temporal candidate (already scaled
/// by the caller via [`scale_motion_vector`], since that needs POC
/// information this module doesn't carry); combined bi-predictive
/// candidates for B slices; then zero-MV padding up to
/// `max_num_merge_cand`.
pub fn build_merge_candidate_list(
    spatial: [Option<MergeCandidate>; 5],
    temporal: Option<MergeCandidate>,
    is_b_slice: bool,
    num_ref_idx_l0_active: u8,
    num_ref_idx_l1_active: u8,
    max_num_merge_cand: u32,
) -> Vec<MergeCandidate> {
    let mut list: Vec<MergeCandidate> = Vec::with_capacity(max_num_merge_cand as usize);

    // A1, B1, B0, A0 unconditionally; B2 only if the list still has room
    // for a fifth spatial candidate (§8.5.3.2.2's explicit "four" cap).
    for (i, candidate) in spatial.iter().enumerate() {
        if i == 4 && list.len() >= 4 {
            continue;
        }
        if let Some(c) = candidate {
            if !list.iter().any(|existing| existing.is_duplicate_of(c)) {
                list.push(*c);
            }
        }
        if list.len() as u32 >= max_num_merge_cand {
            return list;
        }
    }

    if let Some(c) = temporal {
        if list.len() < max_num_merge_cand as usize {
            list.push(c);
        }
    }

    // Combined bi-predictive candidates (§8.5.3.2.4), B slices only: pair
    // candidate k's L0 with candidate l's L1 in the prescribed combination
    // order, skipping a pairing whose two halves would be identical.
    if is_b_slice && list.len() >= 2 && (list.len() as u32) < max_num_merge_cand {
        const COMBINATIONS: [(usize, usize); 12] = [
            (0, 1), (1, 0), (0, 2), (2, 0), (1, 2), (2, 1),
            (0, 3), (3, 0), (1, 3), (3, 1), (2, 3), (3, 2),
        ];
        let original_count = list.len();
        let mut combo_idx = 0;
        while (list.len() as u32) < max_num_merge_cand
            && combo_idx < original_count * (original_count - 1)
            && combo_idx < COMBINATIONS.len()
        {
            let (l0_idx, l1_idx) = COMBINATIONS[combo_idx];
            combo_idx += 1;
            if l0_idx >= original_count || l1_idx >= original_count {
                continue;
            }
            if let (Some(mv_l0), Some(mv_l1)) = (list[l0_idx].mv_l0, list[l1_idx].mv_l1) {
                let combined = MergeCandidate {
                    mv_l0: Some(mv_l0),
                    mv_l1: Some(mv_l1),
                    ref_idx_l0: list[l0_idx].ref_idx_l0,
                    ref_idx_l1: list[l1_idx].ref_idx_l1,
                    is_long_term_l0: list[l0_idx].is_long_term_l0,
                    is_long_term_l1: list[l1_idx].is_long_term_l1,
                };
                if combined.ref_idx_l0 != combined.ref_idx_l1 || mv_l0 != mv_l1 {
                    list.push(combined);
                }
            }
        }
    }

    // Zero-MV padding (§8.5.3.2.5): additional candidates referencing
    // ref_idx 0/1/2.. cycling, with L1 omitted for P slices.
    let mut zero_ref_idx = 0u8;
    while (list.len() as u32) < max_num_merge_cand {
        let ref_idx = zero_ref_idx
            % num_ref_idx_l0_active.max(1)
                .max(if is_b_slice { num_ref_idx_l1_active.max(1) } else { 1 });
        list.push(MergeCandidate {
            mv_l0: Some(MotionVector::default()),
            mv_l1: if is_b_slice { Some(MotionVector::default()) } else { None },
            ref_idx_l0: Some(ref_idx),
            ref_idx_l1: if is_b_slice { Some(ref_idx) } else { None },
            is_long_term_l0: false,
            is_long_term_l1: false,
        });
        zero_ref_idx += 1;
    }

    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_mvd_short_circuits_both_components() {
        let data = [0u8; 8];
        let mut cabac = CabacEngine::new(&data, 26, crate::h265::slice::SliceType::I, false);
        let mvd = decode_mvd(&mut cabac);
        assert_eq!(mvd, MotionVectorDifference::default());
    }

    #[test]
    fn merge_idx_zero_when_only_one_candidate() {
        let data = [0xFFu8; 8];
        let mut cabac = CabacEngine::new(&data, 26, crate::h265::slice::SliceType::I, false);
        assert_eq!(decode_merge_idx(&mut cabac, 1), 0);
    }

    #[test]
    fn distance_scale_factor_is_unity_for_equal_distances() {
        assert_eq!(distance_scale_factor(4, 4), 1 << 6);
    }

    #[test]
    fn distance_scale_factor_clamps_to_range() {
        assert!(distance_scale_factor(4096, 1) <= 4095);
        assert!(distance_scale_factor(-4096, 1) >= -4096);
    }

    #[test]
    fn merge_list_pads_with_zero_mv_to_reach_target_size() {
        let list = build_merge_candidate_list([None; 5], None, false, 1, 1, 3);
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(|c| c.mv_l0 == Some(MotionVector::default())));
    }

    #[test]
    fn merge_list_skips_duplicate_spatial_candidates() {
        let cand = MergeCandidate {
            mv_l0: Some(MotionVector { x: 4, y: -2 }),
            mv_l1: None,
            ref_idx_l0: Some(0),
            ref_idx_l1: None,
            is_long_term_l0: false,
            is_long_term_l1: false,
        };
        let spatial = [Some(cand), Some(cand), None, None, None];
        let list = build_merge_candidate_list(spatial, None, false, 1, 1, 5);
        assert_eq!(list.iter().filter(|c| **c == cand).count(), 1);
    }
}
