//! Reference picture set resolution: turns a slice's `short_term_ref_pic_set`
//! (plus SPS long-term info) into the POC lists the spec calls
//! `PocStCurrBefore`/`PocStCurrAfter`/`PocStFoll`/`PocLtCurr`/`PocLtFoll`
//! (§8.3.2), and then into `RefPicList0`/`RefPicList1` (§8.3.4).
//!
//! Grounded in `ff_hevc_frame_rps`/`ff_hevc_frame_nb_refs`/`init_slice_rpl`
//! in `libavcodec/hevc/refs.c`.

use crate::error::{DecoderError, Result};
use crate::h265::rps::ShortTermReferencePictureSet;
use crate::h265::slice::LongTermRefPicEntry;
use crate::h265::sps::LongTermRefPicSps;

/// The five reference-picture-set categories the spec computes per picture.
#[derive(Debug, Clone, Default)]
pub struct RefPicSetPocs {
    pub st_curr_before: Vec<i32>,
    pub st_curr_after: Vec<i32>,
    pub st_foll: Vec<i32>,
    pub lt_curr: Vec<i32>,
    pub lt_foll: Vec<i32>,
}

impl RefPicSetPocs {
    pub fn nb_refs(&self) -> usize {
        self.st_curr_before.len() + self.st_curr_after.len() + self.lt_curr.len()
    }

    /// `RefPicSetStCurrBefore ++ RefPicSetStCurrAfter ++ RefPicSetLtCurr`,
    /// the pictures usable for prediction of the current picture (as
    /// opposed to merely kept around for a future one).
    pub fn curr_pocs(&self) -> impl Iterator<Item = i32> + '_ {
        self.st_curr_before
            .iter()
            .chain(self.st_curr_after.iter())
            .chain(self.lt_curr.iter())
            .copied()
    }

    pub fn all_pocs(&self) -> impl Iterator<Item = i32> + '_ {
        self.st_curr_before
            .iter()
            .chain(self.st_curr_after.iter())
            .chain(self.st_foll.iter())
            .chain(self.lt_curr.iter())
            .chain(self.lt_foll.iter())
            .copied()
    }
}

/// Resolves the long-term RPS POC partition (§8.3.2 steps for the
/// long-term part, POC reconstruction per the `DeltaPocMsbCycleLt`
/// accumulation of §7.4.7.1) into `PocLtCurr`/`PocLtFoll`.
///
/// When an entry's `delta_poc_msb_present_flag` is unset only the low
/// `log2_max_pic_order_cnt_lsb_minus4 + 4` bits of its POC are known; the
/// full POC is left as that truncated value; the caller (`RpsTracker`'s
/// DPB lookup) resolves it against the DPB's currently-held POCs by
/// matching low bits rather than an exact value, the same ambiguity
/// `generate_missing_ref`'s caller in `refs.c` has to tolerate.
pub fn compute_long_term_pocs(
    long_term_ref_pics: &[LongTermRefPicEntry],
    sps_long_term: &[LongTermRefPicSps],
    current_poc: i32,
    slice_pic_order_cnt_lsb: i32,
    max_poc_lsb: i32,
) -> (Vec<i32>, Vec<i32>) {
    let mut lt_curr = Vec::new();
    let mut lt_foll = Vec::new();

    for entry in long_term_ref_pics {
        let poc_lsb_lt = match entry.lt_idx_sps {
            Some(idx) => sps_long_term
                .get(idx as usize)
                .map(|sps_entry| sps_entry.poc_lsb as i32)
                .unwrap_or(entry.poc_lsb_lt as i32),
            None => entry.poc_lsb_lt as i32,
        };

        let poc = if entry.delta_poc_msb_present_flag {
            current_poc - entry.delta_poc_msb_cycle_lt as i32 * max_poc_lsb - slice_pic_order_cnt_lsb
                + poc_lsb_lt
        } else {
            poc_lsb_lt
        };

        if entry.used_by_curr_pic_lt_flag {
            lt_curr.push(poc);
        } else {
            lt_foll.push(poc);
        }
    }

    (lt_curr, lt_foll)
}

/// Computes the short-term RPS POC partition (§8.3.2 steps for the
/// short-term part) given the resolved `ShortTermReferencePictureSet` for
/// the current picture and its POC. Long-term categories are always empty
/// here; call [`compute_long_term_pocs`] separately and merge the result
/// in, since long-term resolution needs slice/SPS state this function
/// doesn't take.
pub fn compute_rps_pocs(strps: &ShortTermReferencePictureSet, current_poc: i32) -> RefPicSetPocs {
    let mut st_curr_before = Vec::new();
    let mut st_curr_after = Vec::new();
    let mut st_foll = Vec::new();

    let mut poc = current_poc;
    for i in 0..strps.num_negative_pics() as usize {
        poc -= strps.delta_poc_s0_minus1()[i] as i32 + 1;
        if strps.used_by_curr_pic_s0_flag()[i] {
            st_curr_before.push(poc);
        } else {
            st_foll.push(poc);
        }
        poc = current_poc - (strps.delta_poc_s0_minus1().iter().take(i + 1).map(|&d| d as i32 + 1).sum::<i32>());
    }

    let mut poc = current_poc;
    for i in 0..strps.num_positive_pics() as usize {
        poc = current_poc + strps.delta_poc_s1_minus1().iter().take(i + 1).map(|&d| d as i32 + 1).sum::<i32>();
        if strps.used_by_curr_pic_s1_flag()[i] {
            st_curr_after.push(poc);
        } else {
            st_foll.push(poc);
        }
    }

    RefPicSetPocs {
        st_curr_before,
        st_curr_after,
        st_foll,
        lt_curr: Vec::new(),
        lt_foll: Vec::new(),
    }
}

/// Builds `RefPicList0`/`RefPicList1` (§8.3.4) from the POC lists by looking
/// each POC up in the DPB's set of currently-held POCs. A POC present in
/// `rps.curr_pocs()` but absent from `available_pocs` is a missing
/// reference (§"Missing reference" in the design, surfaced rather than
/// silently substituted, matching `generate_missing_ref`'s caller contract
/// in refs.c: the substitution itself is a DSP/display concern, not core).
pub fn build_ref_pic_lists(
    rps: &RefPicSetPocs,
    num_ref_idx_l0_active: usize,
    num_ref_idx_l1_active: usize,
    available_pocs: impl Fn(i32) -> bool,
) -> Result<(Vec<i32>, Vec<i32>)> {
    let temp_l0: Vec<i32> = rps
        .st_curr_before
        .iter()
        .chain(rps.st_curr_after.iter())
        .chain(rps.lt_curr.iter())
        .copied()
        .collect();
    let temp_l1: Vec<i32> = rps
        .st_curr_after
        .iter()
        .chain(rps.st_curr_before.iter())
        .chain(rps.lt_curr.iter())
        .copied()
        .collect();

    let cycle = |temp: &[i32], num_active: usize| -> Result<Vec<i32>> {
        if temp.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::with_capacity(num_active);
        for i in 0..num_active {
            let poc = temp[i % temp.len()];
            if !available_pocs(poc) {
                return Err(DecoderError::MissingReference { poc });
            }
            out.push(poc);
        }
        Ok(out)
    };

    let l0 = cycle(&temp_l0, num_ref_idx_l0_active)?;
    let l1 = cycle(&temp_l1, num_ref_idx_l1_active)?;
    Ok((l0, l1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h265::rps::{NonInterRefPicSetPrediction, ShortTermReferencePictureSetValue};

    fn make_strps(num_neg: u8, num_pos: u8) -> ShortTermReferencePictureSet {
        let mut delta_s0 = [0u16; 16];
        let mut used_s0 = [false; 16];
        for i in 0..num_neg as usize {
            delta_s0[i] = i as u16;
            used_s0[i] = true;
        }
        ShortTermReferencePictureSet {
            inter_ref_pic_set_prediction_flag: None,
            value: ShortTermReferencePictureSetValue::NonInterRefPicSetPrediction(
                NonInterRefPicSetPrediction {
                    num_negative_pics: num_neg,
                    num_positive_pics: num_pos,
                    delta_poc_s0_minus1: delta_s0,
                    used_by_curr_pic_s0_flag: used_s0,
                    delta_poc_s1_minus1: [0; 16],
                    used_by_curr_pic_s1_flag: [false; 16],
                },
            ),
        }
    }

    #[test]
    fn single_negative_ref_lands_in_curr_before() {
        let strps = make_strps(1, 0);
        let rps = compute_rps_pocs(&strps, 10);
        assert_eq!(rps.st_curr_before, vec![9]);
        assert!(rps.st_curr_after.is_empty());
    }

    #[test]
    fn missing_reference_is_reported() {
        let strps = make_strps(1, 0);
        let rps = compute_rps_pocs(&strps, 10);
        let result = build_ref_pic_lists(&rps, 1, 0, |_| false);
        assert!(matches!(result, Err(DecoderError::MissingReference { poc: 9 })));
    }

    #[test]
    fn long_term_entry_with_explicit_msb_resolves_full_poc() {
        let entries = [LongTermRefPicEntry {
            lt_idx_sps: None,
            poc_lsb_lt: 2,
            used_by_curr_pic_lt_flag: true,
            delta_poc_msb_present_flag: true,
            delta_poc_msb_cycle_lt: 1,
        }];
        let (lt_curr, lt_foll) = compute_long_term_pocs(&entries, &[], 20, 4, 16);
        // poc = 20 - 1*16 - 4 + 2 = 2
        assert_eq!(lt_curr, vec![2]);
        assert!(lt_foll.is_empty());
    }

    #[test]
    fn long_term_entry_inherits_sps_poc_lsb_and_used_flag() {
        let sps_entries = [crate::h265::sps::LongTermRefPicSps {
            poc_lsb: 5,
            used_by_curr_pic: false,
        }];
        let entries = [LongTermRefPicEntry {
            lt_idx_sps: Some(0),
            poc_lsb_lt: 0,
            used_by_curr_pic_lt_flag: false,
            delta_poc_msb_present_flag: false,
            delta_poc_msb_cycle_lt: 0,
        }];
        let (lt_curr, lt_foll) = compute_long_term_pocs(&entries, &sps_entries, 20, 4, 16);
        assert!(lt_curr.is_empty());
        assert_eq!(lt_foll, vec![5]);
    }
}
