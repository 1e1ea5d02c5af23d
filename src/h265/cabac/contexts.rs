//! CABAC context element catalogue and probability-state initialisation.
//!
//! Element names, per-element bin counts, and the per-(init-type, element,
//! bin) `init_value` seeds are transcribed verbatim from the normative
//! `init_values[3][HEVC_CONTEXTS]` table and the `CABAC_ELEMS` catalogue in
//! `libavcodec/hevc/cabac.c` (§9.3.2.2's context-initialisation process).
//! `HEVC_CONTEXTS` is 199 (`libavcodec/hevcdec.h`); the catalogue below only
//! assigns 179 of those to named, context-coded syntax elements (every
//! `CABAC_ELEMS` entry with a non-zero bin count — the rest are bypass- or
//! terminate-coded and never index into this table), the same as the
//! reference decoder's own array, whose tail slots past the last named
//! element are allocated but never read or written by `get_cabac`.

/// One CABAC-coded syntax element category, with its bin count (context
/// index range `[ctx_offset, ctx_offset + bins)` within the flat context
/// array `CabacEngine` owns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ContextElement {
    SaoMergeFlag = 0,
    SaoTypeIdx,
    SplitCodingUnitFlag,
    CuTransquantBypassFlag,
    SkipFlag,
    CuQpDeltaAbs,
    PredModeFlag,
    PartMode,
    PrevIntraLumaPredFlag,
    IntraChromaPredMode,
    MergeFlag,
    MergeIdx,
    InterPredIdc,
    RefIdxL0,
    RefIdxL1,
    AbsMvdGreater0Flag,
    AbsMvdGreater1Flag,
    MvpLxFlag,
    NoResidualDataFlag,
    SplitTransformFlag,
    CbfLuma,
    CbfCbCr,
    TransformSkipFlag,
    ExplicitRdpcmFlag,
    ExplicitRdpcmDirFlag,
    LastSignificantCoeffXPrefix,
    LastSignificantCoeffYPrefix,
    SignificantCoeffGroupFlag,
    SignificantCoeffFlag,
    CoeffAbsLevelGreater1Flag,
    CoeffAbsLevelGreater2Flag,
    Log2ResScaleAbs,
    ResScaleSignFlag,
    CuChromaQpOffsetFlag,
    CuChromaQpOffsetIdx,
}

pub const ELEMENT_COUNT: usize = 34;

/// Bin count per element, indexed by [`ContextElement`] discriminant.
/// Mirrors the `NUM_BINS` argument of each `CABAC_ELEMS` entry that is
/// actually context-coded (bypass-only elements like `mpm_idx` or
/// `coeff_sign_flag`, and the terminate-coded `end_of_slice_segment_flag`,
/// carry no context state and so have no entry here).
pub const BIN_COUNTS: [usize; ELEMENT_COUNT] = [
    1,  // SaoMergeFlag
    1,  // SaoTypeIdx
    3,  // SplitCodingUnitFlag
    1,  // CuTransquantBypassFlag
    3,  // SkipFlag
    3,  // CuQpDeltaAbs
    1,  // PredModeFlag
    4,  // PartMode
    1,  // PrevIntraLumaPredFlag
    2,  // IntraChromaPredMode
    1,  // MergeFlag
    1,  // MergeIdx
    5,  // InterPredIdc
    2,  // RefIdxL0
    2,  // RefIdxL1
    2,  // AbsMvdGreater0Flag
    2,  // AbsMvdGreater1Flag
    1,  // MvpLxFlag
    1,  // NoResidualDataFlag
    3,  // SplitTransformFlag
    2,  // CbfLuma
    5,  // CbfCbCr
    2,  // TransformSkipFlag
    2,  // ExplicitRdpcmFlag
    2,  // ExplicitRdpcmDirFlag
    18, // LastSignificantCoeffXPrefix
    18, // LastSignificantCoeffYPrefix
    4,  // SignificantCoeffGroupFlag
    44, // SignificantCoeffFlag
    24, // CoeffAbsLevelGreater1Flag
    6,  // CoeffAbsLevelGreater2Flag
    8,  // Log2ResScaleAbs
    2,  // ResScaleSignFlag
    1,  // CuChromaQpOffsetFlag
    1,  // CuChromaQpOffsetIdx
];

/// Number of context variables actually assigned to a named element
/// (matches the sum of `CABAC_ELEMS`'s non-zero bin counts: 179).
pub const NAMED_CONTEXTS: usize = {
    let mut sum = 0;
    let mut i = 0;
    while i < ELEMENT_COUNT {
        sum += BIN_COUNTS[i];
        i += 1
    }
    sum
};

/// Total size of the context array, fixed at the spec's `HEVC_CONTEXTS`
/// (§3: `state[199]`), including the unnamed tail slots the reference
/// decoder's own table allocates past [`NAMED_CONTEXTS`] but never indexes.
pub const TOTAL_CONTEXTS: usize = 199;

/// Base offset of an element's first context within the flat context array.
pub fn context_offset(element: ContextElement) -> usize {
    let idx = element as usize;
    BIN_COUNTS[..idx].iter().sum()
}

/// All elements in discriminant order, for iterating the full context array
/// without relying on a `usize -> enum` transmute.
pub const ALL_ELEMENTS: [ContextElement; ELEMENT_COUNT] = [
    ContextElement::SaoMergeFlag,
    ContextElement::SaoTypeIdx,
    ContextElement::SplitCodingUnitFlag,
    ContextElement::CuTransquantBypassFlag,
    ContextElement::SkipFlag,
    ContextElement::CuQpDeltaAbs,
    ContextElement::PredModeFlag,
    ContextElement::PartMode,
    ContextElement::PrevIntraLumaPredFlag,
    ContextElement::IntraChromaPredMode,
    ContextElement::MergeFlag,
    ContextElement::MergeIdx,
    ContextElement::InterPredIdc,
    ContextElement::RefIdxL0,
    ContextElement::RefIdxL1,
    ContextElement::AbsMvdGreater0Flag,
    ContextElement::AbsMvdGreater1Flag,
    ContextElement::MvpLxFlag,
    ContextElement::NoResidualDataFlag,
    ContextElement::SplitTransformFlag,
    ContextElement::CbfLuma,
    ContextElement::CbfCbCr,
    ContextElement::TransformSkipFlag,
    ContextElement::ExplicitRdpcmFlag,
    ContextElement::ExplicitRdpcmDirFlag,
    ContextElement::LastSignificantCoeffXPrefix,
    ContextElement::LastSignificantCoeffYPrefix,
    ContextElement::SignificantCoeffGroupFlag,
    ContextElement::SignificantCoeffFlag,
    ContextElement::CoeffAbsLevelGreater1Flag,
    ContextElement::CoeffAbsLevelGreater2Flag,
    ContextElement::Log2ResScaleAbs,
    ContextElement::ResScaleSignFlag,
    ContextElement::CuChromaQpOffsetFlag,
    ContextElement::CuChromaQpOffsetIdx,
];

/// `CNU` in the reference table: "context not used" by Main-profile I/P/B
/// decoding paths, but still a normative 154 (the neutral, 0.5-probability
/// seed) rather than a don't-care.
const CNU: u8 = 154;

/// `init_values[init_type][ctxIdx]`, transcribed verbatim from
/// `libavcodec/hevc/cabac.c`'s `init_values` table, one row per `initType`
/// (0 = I slice; 1 = P slice, or B slice with `cabac_init_flag`; 2 = B
/// slice, or P slice with `cabac_init_flag` — §9.3.2.2's Table 9-5). The
/// slots past [`NAMED_CONTEXTS`] aren't part of that table (no named
/// element reaches them); [`init_value`] seeds them with `CNU` like every
/// other not-yet-adapted context.
const INIT_VALUES: [[u8; NAMED_CONTEXTS]; 3] = [
    [
        // sao_merge_flag
        153, // sao_type_idx
        200, // split_coding_unit_flag
        139, 141, 157, // cu_transquant_bypass_flag
        154, // skip_flag
        CNU, CNU, CNU, // cu_qp_delta
        154, 154, 154, // pred_mode
        CNU, // part_mode
        184, CNU, CNU, CNU, // prev_intra_luma_pred_mode
        184, // intra_chroma_pred_mode
        63, 139, // merge_flag
        CNU, // merge_idx
        CNU, // inter_pred_idc
        CNU, CNU, CNU, CNU, CNU, // ref_idx_l0
        CNU, CNU, // ref_idx_l1
        CNU, CNU, // abs_mvd_greater0_flag
        CNU, CNU, // abs_mvd_greater1_flag
        CNU, CNU, // mvp_lx_flag
        CNU, // no_residual_data_flag
        CNU, // split_transform_flag
        153, 138, 138, // cbf_luma
        111, 141, // cbf_cb, cbf_cr
        94, 138, 182, 154, 154, // transform_skip_flag
        139, 139, // explicit_rdpcm_flag
        139, 139, // explicit_rdpcm_dir_flag
        139, 139, // last_significant_coeff_x_prefix
        110, 110, 124, 125, 140, 153, 125, 127, 140, 109, 111, 143, 127, 111, 79, 108, 123, 63,
        // last_significant_coeff_y_prefix
        110, 110, 124, 125, 140, 153, 125, 127, 140, 109, 111, 143, 127, 111, 79, 108, 123, 63,
        // significant_coeff_group_flag
        91, 171, 134, 141, // significant_coeff_flag
        111, 111, 125, 110, 110, 94, 124, 108, 124, 107, 125, 141, 179, 153, 125, 107, 125, 141,
        179, 153, 125, 107, 125, 141, 179, 153, 125, 140, 139, 182, 182, 152, 136, 152, 136, 153,
        136, 139, 111, 136, 139, 111, 141, 111, // coeff_abs_level_greater1_flag
        140, 92, 137, 138, 140, 152, 138, 139, 153, 74, 149, 92, 139, 107, 122, 152, 140, 179, 166,
        182, 140, 227, 122, 197, // coeff_abs_level_greater2_flag
        138, 153, 136, 167, 152, 152, // log2_res_scale_abs
        154, 154, 154, 154, 154, 154, 154, 154, // res_scale_sign_flag
        154, 154, // cu_chroma_qp_offset_flag
        154, // cu_chroma_qp_offset_idx
        154,
    ],
    [
        // sao_merge_flag
        153, // sao_type_idx
        185, // split_coding_unit_flag
        107, 139, 126, // cu_transquant_bypass_flag
        154, // skip_flag
        197, 185, 201, // cu_qp_delta
        154, 154, 154, // pred_mode
        149, // part_mode
        154, 139, 154, 154, // prev_intra_luma_pred_mode
        154, // intra_chroma_pred_mode
        152, 139, // merge_flag
        110, // merge_idx
        122, // inter_pred_idc
        95, 79, 63, 31, 31, // ref_idx_l0
        153, 153, // ref_idx_l1
        153, 153, // abs_mvd_greater0_flag
        140, 198, // abs_mvd_greater1_flag
        140, 198, // mvp_lx_flag
        168, // no_residual_data_flag
        79, // split_transform_flag
        124, 138, 94, // cbf_luma
        153, 111, // cbf_cb, cbf_cr
        149, 107, 167, 154, 154, // transform_skip_flag
        139, 139, // explicit_rdpcm_flag
        139, 139, // explicit_rdpcm_dir_flag
        139, 139, // last_significant_coeff_x_prefix
        125, 110, 94, 110, 95, 79, 125, 111, 110, 78, 110, 111, 111, 95, 94, 108, 123, 108,
        // last_significant_coeff_y_prefix
        125, 110, 94, 110, 95, 79, 125, 111, 110, 78, 110, 111, 111, 95, 94, 108, 123, 108,
        // significant_coeff_group_flag
        121, 140, 61, 154, // significant_coeff_flag
        155, 154, 139, 153, 139, 123, 123, 63, 153, 166, 183, 140, 136, 153, 154, 166, 183, 140,
        136, 153, 154, 166, 183, 140, 136, 153, 154, 170, 153, 123, 123, 107, 121, 107, 121, 167,
        151, 183, 140, 151, 183, 140, 140, 140, // coeff_abs_level_greater1_flag
        154, 196, 196, 167, 154, 152, 167, 182, 182, 134, 149, 136, 153, 121, 136, 137, 169, 194,
        166, 167, 154, 167, 137, 182, // coeff_abs_level_greater2_flag
        107, 167, 91, 122, 107, 167, // log2_res_scale_abs
        154, 154, 154, 154, 154, 154, 154, 154, // res_scale_sign_flag
        154, 154, // cu_chroma_qp_offset_flag
        154, // cu_chroma_qp_offset_idx
        154,
    ],
    [
        // sao_merge_flag
        153, // sao_type_idx
        160, // split_coding_unit_flag
        107, 139, 126, // cu_transquant_bypass_flag
        154, // skip_flag
        197, 185, 201, // cu_qp_delta
        154, 154, 154, // pred_mode
        134, // part_mode
        154, 139, 154, 154, // prev_intra_luma_pred_mode
        183, // intra_chroma_pred_mode
        152, 139, // merge_flag
        154, // merge_idx
        137, // inter_pred_idc
        95, 79, 63, 31, 31, // ref_idx_l0
        153, 153, // ref_idx_l1
        153, 153, // abs_mvd_greater0_flag
        169, 198, // abs_mvd_greater1_flag
        169, 198, // mvp_lx_flag
        168, // no_residual_data_flag
        79, // split_transform_flag
        224, 167, 122, // cbf_luma
        153, 111, // cbf_cb, cbf_cr
        149, 92, 167, 154, 154, // transform_skip_flag
        139, 139, // explicit_rdpcm_flag
        139, 139, // explicit_rdpcm_dir_flag
        139, 139, // last_significant_coeff_x_prefix
        125, 110, 124, 110, 95, 94, 125, 111, 111, 79, 125, 126, 111, 111, 79, 108, 123, 93,
        // last_significant_coeff_y_prefix
        125, 110, 124, 110, 95, 94, 125, 111, 111, 79, 125, 126, 111, 111, 79, 108, 123, 93,
        // significant_coeff_group_flag
        121, 140, 61, 154, // significant_coeff_flag
        170, 154, 139, 153, 139, 123, 123, 63, 124, 166, 183, 140, 136, 153, 154, 166, 183, 140,
        136, 153, 154, 166, 183, 140, 136, 153, 154, 170, 153, 138, 138, 122, 121, 122, 121, 167,
        151, 183, 140, 151, 183, 140, 140, 140, // coeff_abs_level_greater1_flag
        154, 196, 167, 167, 154, 152, 167, 182, 182, 134, 149, 136, 153, 121, 136, 122, 169, 208,
        166, 167, 154, 152, 167, 182, // coeff_abs_level_greater2_flag
        107, 167, 91, 107, 107, 167, // log2_res_scale_abs
        154, 154, 154, 154, 154, 154, 154, 154, // res_scale_sign_flag
        154, 154, // cu_chroma_qp_offset_flag
        154, // cu_chroma_qp_offset_idx
        154,
    ],
];

/// `init_values[init_type][ctx_idx]` for `ctx_idx` in `0..TOTAL_CONTEXTS`:
/// the named-element rows above, padded with the neutral `CNU` seed for
/// the unnamed tail slots.
pub fn init_value(init_type: usize, ctx_idx: usize) -> u8 {
    debug_assert!(init_type < 3);
    INIT_VALUES[init_type].get(ctx_idx).copied().unwrap_or(CNU)
}

/// Derives the `initType` row of [`init_value`] from the slice type and
/// `cabac_init_flag` (§9.3.2.2, Table 9-5): I slices always use row 0; P
/// and B slices swap between rows 1 and 2 depending on `cabac_init_flag`
/// (`init_type = 2 - slice_type`, XORed with 3 when `cabac_init_flag` is
/// set on a non-I slice, mirroring `cabac.c`'s `init_type` derivation).
pub fn init_type_for_slice(slice_type: crate::h265::slice::SliceType, cabac_init_flag: bool) -> usize {
    use crate::h265::slice::SliceType;

    let mut init_type = 2 - slice_type as i32;
    if cabac_init_flag && slice_type != SliceType::I {
        init_type ^= 3;
    }
    init_type as usize
}

/// §9.3.2.2: derives `(pStateIdx, valMps)` from an 8-bit `init_value` and
/// `SliceQpY`.
pub fn derive_context_state(init_value: u8, slice_qp_y: i32) -> (u8, bool) {
    let qp = slice_qp_y.clamp(0, 51);
    let slope = (init_value as i32 >> 4) * 5 - 45;
    let offset = ((init_value as i32 & 15) << 3) - 16;

    let mut pre_ctx_state = (2 * (((slope * qp) >> 4) + offset)) - 127;
    pre_ctx_state = pre_ctx_state.clamp(1, 126);

    if pre_ctx_state <= 63 {
        let p_state_idx = (63 - pre_ctx_state) as u8;
        (p_state_idx, false)
    } else {
        let p_state_idx = (pre_ctx_state - 64) as u8;
        (p_state_idx, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_contexts_matches_sum_of_bin_counts() {
        assert_eq!(NAMED_CONTEXTS, BIN_COUNTS.iter().sum());
    }

    #[test]
    fn total_contexts_is_199_per_spec() {
        assert_eq!(TOTAL_CONTEXTS, 199);
        assert!(NAMED_CONTEXTS < TOTAL_CONTEXTS);
    }

    #[test]
    fn context_offsets_are_monotonic() {
        let a = context_offset(ContextElement::SaoMergeFlag);
        let b = context_offset(ContextElement::SaoTypeIdx);
        let c = context_offset(ContextElement::SplitCodingUnitFlag);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn last_element_stays_within_named_contexts() {
        let last = *ALL_ELEMENTS.last().unwrap();
        let end = context_offset(last) + BIN_COUNTS[last as usize];
        assert_eq!(end, NAMED_CONTEXTS);
    }

    #[test]
    fn init_value_padding_past_named_contexts_is_neutral() {
        for init_type in 0..3 {
            assert_eq!(init_value(init_type, NAMED_CONTEXTS), CNU);
            assert_eq!(init_value(init_type, TOTAL_CONTEXTS - 1), CNU);
        }
    }

    #[test]
    fn init_type_matches_table_9_5() {
        use crate::h265::slice::SliceType;

        // I slice: always row 0, regardless of cabac_init_flag.
        assert_eq!(init_type_for_slice(SliceType::I, false), 0);
        assert_eq!(init_type_for_slice(SliceType::I, true), 0);
        // P slice: row 1, or row 2 with cabac_init_flag.
        assert_eq!(init_type_for_slice(SliceType::P, false), 1);
        assert_eq!(init_type_for_slice(SliceType::P, true), 2);
        // B slice: row 2, or row 1 with cabac_init_flag.
        assert_eq!(init_type_for_slice(SliceType::B, false), 2);
        assert_eq!(init_type_for_slice(SliceType::B, true), 1);
    }

    #[test]
    fn derive_context_state_stays_in_range() {
        for qp in 0..=51 {
            let (state, _mps) = derive_context_state(154, qp);
            assert!(state <= 62);
        }
    }
}
