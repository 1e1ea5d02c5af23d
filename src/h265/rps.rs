use std::io::{self, Read};

use bitstream_io::{BigEndian, BitReader};
use bitstream_io::BitRead as _;

use crate::base::{read_exp_golomb_ue_count_bits};

/// See _7.3.7 Short-term reference picture set syntax_ in the spec.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShortTermReferencePictureSet {
    /// `Some(true)` specifies that this candidate short-term RPS is predicted from another candidate short-term RPS.
    ///
    /// `None` for the first `ShortTermReferencePictureSet`, `Some` for the rest.
    pub inter_ref_pic_set_prediction_flag: Option<bool>,
    pub value: ShortTermReferencePictureSetValue,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ShortTermReferencePictureSetValue {
    InterRefPicSetPrediction(InterRefPicSetPrediction),
    NonInterRefPicSetPrediction(NonInterRefPicSetPrediction),
}

/// For `inter_ref_pic_set_prediction_flag == true`,
/// i.e. when the current `ShortTermReferencePictureSet` is predicted from another.
/// > the stRpsIdx-th candidate short-term RPS is predicted from another candidate short-term RPS
///
/// The signalled delta fields are kept alongside `derived`, the fully
/// resolved `DeltaPocS0`/`DeltaPocS1`/`UsedByCurrPicS0`/`UsedByCurrPicS1`
/// arrays computed from them per _7.4.8_, so every accessor on
/// [`ShortTermReferencePictureSet`] can read `derived` uniformly instead of
/// re-deriving on every call.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InterRefPicSetPrediction {
    /// `Some` for an RPS in a slice header.
    pub delta_idx_minus1: Option<u32>,
    pub delta_rps_sign: u32,
    pub abs_delta_rps_minus1: u16,
    /// `NumDeltaPocs[RefRpsIdx]`.
    pub rps_idx_num_delta_pocs: u8,
    /// `used_by_curr_pic_flag[j]`, `j` in `0..=NumDeltaPocs[RefRpsIdx]`.
    pub used_by_curr_pic_flag: Vec<bool>,
    /// `use_delta_flag[j]`; inferred `true` when `used_by_curr_pic_flag[j]` is set.
    pub use_delta_flag: Vec<bool>,
    pub derived: NonInterRefPicSetPrediction,
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NonInterRefPicSetPrediction {
    pub num_negative_pics: u8,
    pub num_positive_pics: u8,
    pub delta_poc_s0_minus1: [u16; 16],
    pub used_by_curr_pic_s0_flag: [bool; 16],
    pub delta_poc_s1_minus1: [u16; 16],
    pub used_by_curr_pic_s1_flag: [bool; 16],
}

impl ShortTermReferencePictureSet {
    pub fn as_inter_ref_pic_set_prediction(&self) -> Option<&InterRefPicSetPrediction> {
        match &self.value {
            ShortTermReferencePictureSetValue::InterRefPicSetPrediction(value) => Some(value),
            ShortTermReferencePictureSetValue::NonInterRefPicSetPrediction(_) => None,
        }
    }

    pub fn as_non_inter_ref_pic_set_prediction(&self) -> Option<&NonInterRefPicSetPrediction> {
        match &self.value {
            ShortTermReferencePictureSetValue::InterRefPicSetPrediction(_) => None,
            ShortTermReferencePictureSetValue::NonInterRefPicSetPrediction(value) => Some(value),
        }
    }

    /// `NumDeltaPocs[RefRpsIdx]`.
    ///
    /// Returns `Some` for an `InterRefPicSetPrediction` signalled in a slice segment header, otherwise `None`.
    pub fn rps_idx_num_delta_pocs(&self) -> Option<u8> {
        match &self.value {
            ShortTermReferencePictureSetValue::InterRefPicSetPrediction(value) => {
                Some(value.rps_idx_num_delta_pocs)
            }
            ShortTermReferencePictureSetValue::NonInterRefPicSetPrediction(_) => None,
        }
    }

    fn derived(&self) -> &NonInterRefPicSetPrediction {
        match &self.value {
            ShortTermReferencePictureSetValue::InterRefPicSetPrediction(value) => &value.derived,
            ShortTermReferencePictureSetValue::NonInterRefPicSetPrediction(value) => value,
        }
    }

    /// Calculates the variable `NumDeltaPocs[stRpsIdx]` as defined in _7.4.8 Short-term reference picture set semantics_ of the spec.
    /// ```
    /// NumDeltaPocs[stRpsIdx] = NumNegativePics[stRpsIdx] + NumPositivePics[stRpsIdx]
    /// ```
    pub fn num_delta_pocs(&self) -> u8 {
        self.num_negative_pics() + self.num_positive_pics()
    }

    pub fn num_negative_pics(&self) -> u8 {
        self.derived().num_negative_pics
    }
    pub fn num_positive_pics(&self) -> u8 {
        self.derived().num_positive_pics
    }

    pub fn delta_poc_s0_minus1(&self) -> [u16; 16] {
        self.derived().delta_poc_s0_minus1
    }
    pub fn used_by_curr_pic_s0_flag(&self) -> [bool; 16] {
        self.derived().used_by_curr_pic_s0_flag
    }
    pub fn delta_poc_s1_minus1(&self) -> [u16; 16] {
        self.derived().delta_poc_s1_minus1
    }
    pub fn used_by_curr_pic_s1_flag(&self) -> [bool; 16] {
        self.derived().used_by_curr_pic_s1_flag
    }

    pub fn bitmask_used_by_curr_pic_s0_flag(&self) -> u16 {
        // Convert the `used_by_curr_pic_s0_flag` array to a bitmask.
        self.used_by_curr_pic_s0_flag()
            .iter()
            .enumerate()
            .fold(0, |acc, (i, &flag)| acc | ((flag as u16) << i))
    }
    pub fn bitmask_used_by_curr_pic_s1_flag(&self) -> u16 {
        self.used_by_curr_pic_s1_flag()
            .iter()
            .enumerate()
            .fold(0, |acc, (i, &flag)| acc | ((flag as u16) << i))
    }

    /// Number of pictures in this short-term RPS marked `used_by_curr_pic`,
    /// the short-term contribution to `NumPicTotalCurr` (_7.4.7.2_).
    pub fn num_pics_used_by_curr(&self) -> u8 {
        let derived = self.derived();
        let s0 = derived.used_by_curr_pic_s0_flag[..derived.num_negative_pics as usize]
            .iter()
            .filter(|&&used| used)
            .count();
        let s1 = derived.used_by_curr_pic_s1_flag[..derived.num_positive_pics as usize]
            .iter()
            .filter(|&&used| used)
            .count();
        (s0 + s1) as u8
    }

    /// * `st_rps_index`: `stRpsIdx`; the index of the current `ShortTermReferencePictureSet`.
    /// * `reference_candidates`: the already-resolved RPS list `RefRpsIdx` may
    ///   index into: the SPS-internal prefix `short_term_ref_pic_sets[..st_rps_index]`
    ///   while parsing the SPS's own list, or the SPS's full list while
    ///   parsing a slice segment header's `st_ref_pic_set()`.
    pub fn from_bit_reader<R: Read>(
        bit_reader: &mut BitReader<R, BigEndian>,
        st_rps_index: usize,
        num_short_term_ref_pic_sets: usize,
        reference_candidates: &[ShortTermReferencePictureSet],
        bit_count: &mut u32,
    ) -> Result<Self, io::Error> {
        let inter_ref_pic_set_prediction_flag = if st_rps_index != 0 {
            *bit_count += 1;
            Some(bit_reader.read_bit()?)
        } else {
            None
        };

        let value = if inter_ref_pic_set_prediction_flag.unwrap_or(false) {
            // A `st_ref_pic_set()` syntax structure directly signalled in the slice headers of a current picture
            // has an index equal to `num_short_term_ref_pic_sets`.
            let delta_idx_minus1 = if st_rps_index == num_short_term_ref_pic_sets {
                Some(read_exp_golomb_ue_count_bits(bit_reader, bit_count)?)
            } else {
                None
            };

            *bit_count += 1;
            let delta_rps_sign: u32 = if bit_reader.read_bit()? { 1 } else { 0 };
            let abs_delta_rps_minus1: u16 =
                read_exp_golomb_ue_count_bits(bit_reader, bit_count)? as _;

            // refRpsIdx = stRpsIdx - (delta_idx_minus1 + 1)
            let ref_rps_idx = st_rps_index - (delta_idx_minus1.unwrap_or(0) as usize + 1);
            let ref_rps = &reference_candidates[ref_rps_idx];
            let rps_idx_num_delta_pocs = ref_rps.num_delta_pocs();

            let mut used_by_curr_pic_flag = Vec::with_capacity(rps_idx_num_delta_pocs as usize + 1);
            let mut use_delta_flag = Vec::with_capacity(rps_idx_num_delta_pocs as usize + 1);
            for _ in 0..=rps_idx_num_delta_pocs {
                *bit_count += 1;
                let used = bit_reader.read_bit()?;
                let delta = if used {
                    true
                } else {
                    *bit_count += 1;
                    bit_reader.read_bit()?
                };
                used_by_curr_pic_flag.push(used);
                use_delta_flag.push(delta);
            }

            let derived = derive_inter_ref_pic_set(
                ref_rps,
                delta_rps_sign,
                abs_delta_rps_minus1,
                &used_by_curr_pic_flag,
                &use_delta_flag,
            );

            ShortTermReferencePictureSetValue::InterRefPicSetPrediction(InterRefPicSetPrediction {
                delta_idx_minus1,
                delta_rps_sign,
                abs_delta_rps_minus1,
                rps_idx_num_delta_pocs,
                used_by_curr_pic_flag,
                use_delta_flag,
                derived,
            })
        } else {
            let num_negative_pics: u8 = read_exp_golomb_ue_count_bits(bit_reader, bit_count)? as _;
            let num_positive_pics: u8 = read_exp_golomb_ue_count_bits(bit_reader, bit_count)? as _;

            let mut delta_poc_s0_minus1 = [0u16; 16];
            let mut used_by_curr_pic_s0_flag = [false; 16];
            for i in 0..num_negative_pics {
                delta_poc_s0_minus1[i as usize] =
                    read_exp_golomb_ue_count_bits(bit_reader, bit_count)? as _;
                *bit_count += 1;
                used_by_curr_pic_s0_flag[i as usize] = bit_reader.read_bit()?;
            }
            let mut delta_poc_s1_minus1 = [0u16; 16];
            let mut used_by_curr_pic_s1_flag = [false; 16];
            for i in 0..num_positive_pics {
                delta_poc_s1_minus1[i as usize] =
                    read_exp_golomb_ue_count_bits(bit_reader, bit_count)? as _;
                *bit_count += 1;
                used_by_curr_pic_s1_flag[i as usize] = bit_reader.read_bit()?;
            }

            ShortTermReferencePictureSetValue::NonInterRefPicSetPrediction(
                NonInterRefPicSetPrediction {
                    num_negative_pics,
                    num_positive_pics,
                    delta_poc_s0_minus1,
                    used_by_curr_pic_s0_flag,
                    delta_poc_s1_minus1,
                    used_by_curr_pic_s1_flag,
                },
            )
        };

        Ok(Self {
            inter_ref_pic_set_prediction_flag,
            value,
        })
    }
}

/// _7.4.8 Short-term reference picture set semantics_, the `DeltaPocS0`/
/// `DeltaPocS1`/`UsedByCurrPicS0`/`UsedByCurrPicS1` derivation process for
/// `inter_ref_pic_set_prediction_flag == 1`.
fn derive_inter_ref_pic_set(
    ref_rps: &ShortTermReferencePictureSet,
    delta_rps_sign: u32,
    abs_delta_rps_minus1: u16,
    used_by_curr_pic_flag: &[bool],
    use_delta_flag: &[bool],
) -> NonInterRefPicSetPrediction {
    let delta_rps = (1 - 2 * delta_rps_sign as i32) * (abs_delta_rps_minus1 as i32 + 1);

    let ref_num_negative = ref_rps.num_negative_pics() as usize;
    let ref_num_positive = ref_rps.num_positive_pics() as usize;
    let ref_num_delta = ref_num_negative + ref_num_positive;
    let ref_delta_s0 = ref_rps.delta_poc_s0_minus1();
    let ref_used_s0 = ref_rps.used_by_curr_pic_s0_flag();
    let ref_delta_s1 = ref_rps.delta_poc_s1_minus1();
    let ref_used_s1 = ref_rps.used_by_curr_pic_s1_flag();

    // Accumulated absolute POC deltas of the referenced RPS, negative for S0
    // and positive for S1, reconstructed from the minus-1 magnitude encoding.
    let ref_poc_s0 = |j: usize| -(ref_delta_s0[j] as i32 + 1);
    let ref_poc_s1 = |j: usize| ref_delta_s1[j] as i32 + 1;

    let mut delta_poc_s0_minus1 = [0u16; 16];
    let mut used_by_curr_pic_s0_flag = [false; 16];
    let mut i = 0usize;

    for j in (0..ref_num_positive).rev() {
        let d_poc = ref_poc_s1(j) + delta_rps;
        if d_poc < 0 && use_delta_flag[ref_num_negative + j] {
            delta_poc_s0_minus1[i] = (-d_poc - 1) as u16;
            used_by_curr_pic_s0_flag[i] = used_by_curr_pic_flag[ref_num_negative + j];
            i += 1;
        }
    }
    if delta_rps < 0 && use_delta_flag[ref_num_delta] {
        delta_poc_s0_minus1[i] = (-delta_rps - 1) as u16;
        used_by_curr_pic_s0_flag[i] = used_by_curr_pic_flag[ref_num_delta];
        i += 1;
    }
    for j in 0..ref_num_negative {
        let d_poc = ref_poc_s0(j) + delta_rps;
        if d_poc < 0 && use_delta_flag[j] {
            delta_poc_s0_minus1[i] = (-d_poc - 1) as u16;
            used_by_curr_pic_s0_flag[i] = used_by_curr_pic_flag[j];
            i += 1;
        }
    }
    let num_negative_pics = i as u8;

    let mut delta_poc_s1_minus1 = [0u16; 16];
    let mut used_by_curr_pic_s1_flag = [false; 16];
    let mut i = 0usize;

    for j in (0..ref_num_negative).rev() {
        let d_poc = ref_poc_s0(j) + delta_rps;
        if d_poc > 0 && use_delta_flag[j] {
            delta_poc_s1_minus1[i] = (d_poc - 1) as u16;
            used_by_curr_pic_s1_flag[i] = used_by_curr_pic_flag[j];
            i += 1;
        }
    }
    if delta_rps > 0 && use_delta_flag[ref_num_delta] {
        delta_poc_s1_minus1[i] = (delta_rps - 1) as u16;
        used_by_curr_pic_s1_flag[i] = used_by_curr_pic_flag[ref_num_delta];
        i += 1;
    }
    for j in 0..ref_num_positive {
        let d_poc = ref_poc_s1(j) + delta_rps;
        if d_poc > 0 && use_delta_flag[ref_num_negative + j] {
            delta_poc_s1_minus1[i] = (d_poc - 1) as u16;
            used_by_curr_pic_s1_flag[i] = used_by_curr_pic_flag[ref_num_negative + j];
            i += 1;
        }
    }
    let num_positive_pics = i as u8;

    let _ = ref_used_s0;
    let _ = ref_used_s1;

    NonInterRefPicSetPrediction {
        num_negative_pics,
        num_positive_pics,
        delta_poc_s0_minus1,
        used_by_curr_pic_s0_flag,
        delta_poc_s1_minus1,
        used_by_curr_pic_s1_flag,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn num_delta_pocs_sums_negative_and_positive() {
        let strps = make_strps(2, 1);
        assert_eq!(strps.num_delta_pocs(), 3);
    }

    #[test]
    fn inter_prediction_shifts_negative_refs_by_delta_rps() {
        // Reference RPS: one negative POC delta of -1 (delta_poc_s0_minus1 = 0), used.
        let ref_rps = make_strps(1, 0);
        // delta_rps_sign = 0, abs_delta_rps_minus1 = 0 -> deltaRps = +1.
        let used_by_curr_pic_flag = vec![true, true];
        let use_delta_flag = vec![true, true];
        let derived = derive_inter_ref_pic_set(&ref_rps, 0, 0, &used_by_curr_pic_flag, &use_delta_flag);
        // ref_poc_s0(0) = -1, + deltaRps(1) = 0, not < 0 so not in S0.
        assert_eq!(derived.num_negative_pics, 0);
        // 0 is also not > 0, so not in S1 either; only the deltaRps-itself term
        // can land here, and deltaRps=+1 > 0 contributes to S1.
        assert_eq!(derived.num_positive_pics, 1);
        assert_eq!(derived.delta_poc_s1_minus1[0], 0);
    }
}
