
use std::io::{self, Read};

use bitstream_io::{BigEndian, BitReader};
use bitstream_io::BitRead as _;

use crate::base::{read_exp_golomb_se, read_exp_golomb_ue};
use crate::h265::nalu::NaluType;
use crate::h265::pps::PictureParameterSet;
use crate::h265::rps::ShortTermReferencePictureSet;
use crate::h265::sps::SequenceParameterSet;

/// Everything `SliceSegmentHeader::from_rbsp_reader` needs out of the active
/// PPS/SPS pair. Kept `Copy` so a driver can build one per slice without
/// holding onto the parameter sets themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct SliceSegmentContext {
  pub dependent_slice_segments_enabled_flag: bool,
  pub pic_width_in_luma_samples: u32,
  pub pic_height_in_luma_samples: u32,
  pub log2_min_luma_coding_block_size_minus3: u8,
  pub log2_diff_max_min_luma_coding_block_size: u8,
  pub num_extra_slice_header_bits: u8,
  pub output_flag_present_flag: bool,
  pub separate_colour_plane_flag: bool,
  pub log2_max_pic_order_cnt_lsb_minus4: u8,
  pub num_short_term_ref_pic_sets: u8,
  /// PPS-level fields needed once the slice type/dependent-flag gate is past.
  pub cabac_init_present_flag: bool,
  pub num_ref_idx_l0_default_active_minus1: u8,
  pub num_ref_idx_l1_default_active_minus1: u8,
  pub lists_modification_present_flag: bool,
  pub weighted_pred_flag: bool,
  pub weighted_bipred_flag: bool,
  pub five_minus_max_num_merge_cand_allowed: bool,
  pub pps_slice_chroma_qp_offsets_present_flag: bool,
  pub deblocking_filter_override_enabled_flag: bool,
  pub pps_deblocking_filter_disabled_flag: bool,
  pub pps_loop_filter_across_slices_enabled_flag: bool,
  pub tiles_enabled_flag: bool,
  pub entropy_coding_sync_enabled_flag: bool,
  pub num_tile_columns: u32,
  pub num_tile_rows: u32,
  pub slice_segment_header_extension_present_flag: bool,
  pub sample_adaptive_offset_enabled_flag: bool,
  pub long_term_ref_pics_present_flag: bool,
  pub num_long_term_ref_pics_sps: u8,
  /// `SPS.long_term_ref_pics_sps[i].used_by_curr_pic`, inherited (not
  /// re-coded) for slice-header entries whose `lt_idx_sps` selects an
  /// SPS-predefined long-term POC (_7.4.7.1_).
  pub long_term_ref_pics_sps_used_by_curr: [bool; 32],
  pub sps_temporal_mvp_enabled_flag: bool,
  /// `NumPicTotalCurr` for the SPS-indexed candidate RPS this slice's
  /// `short_term_ref_pic_set_idx` (or the sole candidate when
  /// `num_short_term_ref_pic_sets <= 1`) resolves to, precomputed by the
  /// caller from the resolved SPS because the SPS's RPS list itself isn't
  /// reachable from here. Unused when the slice signals its RPS inline.
  pub num_pic_total_curr_for_sps_rps: u32,
}

impl SliceSegmentContext {
  /// Builds the parts derived directly from the active parameter sets.
  /// `num_pic_total_curr_for_sps_rps` still needs to be filled in by the
  /// caller once the slice's (or dependent slice's) RPS index is known.
  pub fn from_param_sets(sps: &SequenceParameterSet, pps: &PictureParameterSet) -> Self {
    let (num_tile_columns, num_tile_rows) = match &pps.tiles {
      Some(tiles) => (tiles.num_tile_columns(), tiles.num_tile_rows()),
      None => (1, 1),
    };

    Self {
      dependent_slice_segments_enabled_flag: pps.dependent_slice_segments_enabled_flag,
      pic_width_in_luma_samples: sps.pic_width_in_luma_samples,
      pic_height_in_luma_samples: sps.pic_height_in_luma_samples,
      log2_min_luma_coding_block_size_minus3: sps.log2_min_luma_coding_block_size_minus3,
      log2_diff_max_min_luma_coding_block_size: sps.log2_diff_max_min_luma_coding_block_size,
      num_extra_slice_header_bits: pps.num_extra_slice_header_bits,
      output_flag_present_flag: pps.output_flag_present_flag,
      separate_colour_plane_flag: sps.separate_colour_plane_flag.unwrap_or(false),
      log2_max_pic_order_cnt_lsb_minus4: sps.log2_max_pic_order_cnt_lsb_minus4,
      num_short_term_ref_pic_sets: sps.short_term_ref_pic_sets.len() as u8,
      cabac_init_present_flag: pps.cabac_init_present_flag,
      num_ref_idx_l0_default_active_minus1: pps.num_ref_idx_l0_default_active_minus1,
      num_ref_idx_l1_default_active_minus1: pps.num_ref_idx_l1_default_active_minus1,
      lists_modification_present_flag: pps.lists_modification_present_flag,
      weighted_pred_flag: pps.weighted_pred_flag,
      weighted_bipred_flag: pps.weighted_bipred_flag,
      five_minus_max_num_merge_cand_allowed: true,
      pps_slice_chroma_qp_offsets_present_flag: pps.pps_slice_chroma_qp_offsets_present_flag,
      deblocking_filter_override_enabled_flag: pps
        .deblocking_filter_control
        .map(|d| d.deblocking_filter_override_enabled_flag)
        .unwrap_or(false),
      pps_deblocking_filter_disabled_flag: pps
        .deblocking_filter_control
        .map(|d| d.pps_deblocking_filter_disabled_flag)
        .unwrap_or(false),
      pps_loop_filter_across_slices_enabled_flag: pps.pps_loop_filter_across_slices_enabled_flag,
      tiles_enabled_flag: pps.tiles.is_some(),
      entropy_coding_sync_enabled_flag: pps.entropy_coding_sync_enabled_flag,
      num_tile_columns,
      num_tile_rows,
      slice_segment_header_extension_present_flag: pps
        .slice_segment_header_extension_present_flag,
      sample_adaptive_offset_enabled_flag: sps.sample_adaptive_offset_enabled_flag,
      long_term_ref_pics_present_flag: sps.long_term_ref_pics_present_flag,
      num_long_term_ref_pics_sps: sps.long_term_ref_pics_sps.len() as u8,
      long_term_ref_pics_sps_used_by_curr: {
        let mut used = [false; 32];
        for (i, entry) in sps.long_term_ref_pics_sps.iter().enumerate().take(32) {
          used[i] = entry.used_by_curr_pic;
        }
        used
      },
      sps_temporal_mvp_enabled_flag: sps.sps_temporal_mvp_enabled_flag,
      num_pic_total_curr_for_sps_rps: 0,
    }
  }

  fn pic_size_in_ctbs(&self) -> u32 {
    let min_cb_log2_size_y = self.log2_min_luma_coding_block_size_minus3 + 3;
    let ctb_log2_size_y = min_cb_log2_size_y + self.log2_diff_max_min_luma_coding_block_size;
    let ctb_size_y = 1u32 << ctb_log2_size_y;
    let pic_width_in_ctbs_y =
      (self.pic_width_in_luma_samples + ctb_size_y - 1) / ctb_size_y;
    let pic_height_in_ctbs_y =
      (self.pic_height_in_luma_samples + ctb_size_y - 1) / ctb_size_y;
    pic_width_in_ctbs_y * pic_height_in_ctbs_y
  }

  fn num_entry_point_flag_present(&self) -> bool {
    self.tiles_enabled_flag || self.entropy_coding_sync_enabled_flag
  }
}

/// See `slice_segment_layer_rbsp()` in _7.3.2.9 Slice segment layer RBSP syntax_ in the spec.
#[derive(Debug, Clone)]
pub struct SliceSegmentLayer {
  pub header: SliceSegmentHeader,
  /// `slice_segment_data()`: the byte-aligned CABAC payload following the
  /// header (and its `byte_alignment()`), handed to `CabacEngine::new`.
  pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SliceType {
  /// B slice.
  B = 0,
  /// P slice.
  P = 1,
  /// I slice,
  I = 2,
}

impl TryFrom<u8> for SliceType {
  type Error = String;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(Self::B),
      1 => Ok(Self::P),
      2 => Ok(Self::I),
      _ => Err(format!("Invalid value for SliceType: {}", value)),
    }
  }
}

/// A `lt_idx_sps[i]`-or-explicit-POC-LSB long-term reference picture entry
/// from the slice header's long-term RPS signalling (_7.3.6.1_).
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LongTermRefPicEntry {
  /// `Some` when this entry is taken from `SPS.long_term_ref_pics_sps[lt_idx_sps]`.
  pub lt_idx_sps: Option<u8>,
  /// Explicitly-signalled `poc_lsb_lt`, used when `lt_idx_sps.is_none()`.
  pub poc_lsb_lt: u32,
  pub used_by_curr_pic_lt_flag: bool,
  pub delta_poc_msb_present_flag: bool,
  pub delta_poc_msb_cycle_lt: u32,
}

#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WeightEntry {
  pub luma_weight_flag: bool,
  pub luma_weight: i16,
  pub luma_offset: i16,
  pub chroma_weight_flag: bool,
  pub chroma_weight: [i16; 2],
  pub chroma_offset: [i16; 2],
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PredWeightTable {
  pub luma_log2_weight_denom: u8,
  pub delta_chroma_log2_weight_denom: i8,
  pub l0: Vec<WeightEntry>,
  pub l1: Vec<WeightEntry>,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RefPicListModification {
  pub list_entry_l0: Vec<u32>,
  pub list_entry_l1: Vec<u32>,
}

/// See `slice_segment_header()` in _7.3.6 Slice segment header syntax_ in the spec.
#[derive(Debug, Clone)]
#[cfg_attr(feature="serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SliceSegmentHeader {
  pub nal_unit_type: NaluType,
  /// Indicates whether the slice segment is the first slice segment of the picture in decoding order.
  pub first_slice_segment_in_pic_flag: bool,
  /// Affects the output of previously-decoded pictures in the decoded picture buffer after the decoding of an IDR or a BLA picture that is not the first picture in the bitstream.
  pub no_output_of_prior_pics_flag: Option<bool>,
  /// Specifies the value of `pps_pic_parameter_set_id` for the PPS in use. `[0, 63]`.
  pub slice_pic_parameter_set_id: u8,
  pub dependent_slice_segment_flag: Option<bool>,
  pub slice_segment_address: Option<u32>,
  /// Discarded for dependent slice segments, which inherit their
  /// independent slice segment's header in full (_7.4.7.1_).
  pub slice_type: Option<SliceType>,
  pub pic_output_flag: Option<bool>,
  pub colour_plane_id: Option<u8>,
  /// `Some` when `dependent_slice_segment_flag != Some(true)`.
  pub short_term_ref_pic_set_sps_flag: Option<bool>,
  /// `Some` when `short_term_ref_pic_set_sps_flag != Some(true)`.
  pub short_term_ref_pic_set: Option<ShortTermReferencePictureSet>,
  /// Number of bits used to encode `short_term_ref_pic_set`.
  ///
  /// `Some` when `short_term_ref_pic_set_sps_flag == Some(true)` for non-IDR slices.
  pub short_term_ref_pic_set_size: Option<u16>,
  /// `Some` for non-IDR slices, `None` for IDR slices.
  pub slice_pic_order_cnt_lsb: Option<u16>,
  /// `Some` when all of the following holds true:
  /// - `dependent_slice_segment_flag != Some(true)`
  /// - not an IDR slice
  /// - `short_term_ref_pic_set_sps_flag == true`
  /// - `SliceSegmentContext::num_short_term_ref_pic_sets > 1`
  pub short_term_ref_pic_set_idx: Option<u8>,
  /// `CurrRpsIdx`.
  pub curr_rps_idx: u8,
  pub long_term_ref_pics: Vec<LongTermRefPicEntry>,
  pub slice_temporal_mvp_enabled_flag: Option<bool>,
  pub slice_sao_luma_flag: Option<bool>,
  pub slice_sao_chroma_flag: Option<bool>,
  pub num_ref_idx_active_override_flag: Option<bool>,
  pub num_ref_idx_l0_active_minus1: Option<u8>,
  pub num_ref_idx_l1_active_minus1: Option<u8>,
  pub ref_pic_list_modification: Option<RefPicListModification>,
  pub mvd_l1_zero_flag: Option<bool>,
  pub cabac_init_flag: Option<bool>,
  pub collocated_from_l0_flag: Option<bool>,
  pub collocated_ref_idx: Option<u32>,
  pub pred_weight_table: Option<PredWeightTable>,
  pub five_minus_max_num_merge_cand: Option<u8>,
  pub slice_qp_delta: Option<i8>,
  pub slice_cb_qp_offset: Option<i8>,
  pub slice_cr_qp_offset: Option<i8>,
  pub deblocking_filter_override_flag: Option<bool>,
  pub slice_deblocking_filter_disabled_flag: Option<bool>,
  pub slice_beta_offset_div2: Option<i8>,
  pub slice_tc_offset_div2: Option<i8>,
  pub slice_loop_filter_across_slices_enabled_flag: Option<bool>,
  /// `num_entry_point_offsets` many `entry_point_offset_minus1[i] + 1` values,
  /// the byte offsets of tile/WPP-row substream boundaries within this slice segment's data.
  pub entry_point_offsets: Vec<u32>,
}

impl SliceSegmentHeader {
  /// `NumDeltaPocs[RefRpsIdx]`.
  ///
  /// Returns `Some` if this slice segment header has a `ShortTermReferencePictureSet`, otherwise `None`.
  pub fn rps_idx_num_delta_pocs(&self) -> Option<u8> {
    if let Some(rps) = self.short_term_ref_pic_set.as_ref() {
      Some(rps.num_positive_pics() + rps.num_negative_pics())
    }
    else {
      None
    }
  }

  /// `MaxNumMergeCand`, only meaningful for non-I slices.
  pub fn max_num_merge_cand(&self) -> Option<u8> {
    self.five_minus_max_num_merge_cand.map(|v| 5 - v)
  }

  /// Reads from _RBSP(Raw Byte Sequence Payload)_.
  ///
  /// ## Remarks
  /// Currently does *NOT* consume the whole bytes for the slice segment header.
  pub fn from_rbsp_reader<R: Read>(
    reader: &mut R,
    nal_unit_type: NaluType,
    slice_segment_context: SliceSegmentContext,
  ) -> Result<Self, io::Error> {
    let mut bit_reader = BitReader::endian(reader, BigEndian);

    let first_slice_segment_in_pic_flag = bit_reader.read_bit()?;

    // Coded slice segment of a BLA, IDR, or CRA picture, or Reserved IRAP VCL NAL unit types ?
    let no_output_of_prior_pics_flag = if nal_unit_type  >=  NaluType::BlaWLp  &&  nal_unit_type  <=  NaluType::RsvIrapVcl23 {
      Some(bit_reader.read_bit()?)
    } else {
      None
    };

    let slice_pic_parameter_set_id = read_exp_golomb_ue(&mut bit_reader)? as u8;

    let (dependent_slice_segment_flag, slice_segment_address) = if !first_slice_segment_in_pic_flag {
      let dependent_slice_segment_flag = if slice_segment_context.dependent_slice_segments_enabled_flag {
        Some(bit_reader.read_bit()?)
      }
      else {
        None
      };

      // Length is Ceil(Log2(PicSizeInCtbsY)) bits.
      let slice_segment_address = {
        let pic_size_in_ctbs_y = slice_segment_context.pic_size_in_ctbs();
        let length_in_bits = (pic_size_in_ctbs_y as f64).log2().ceil() as u32;
        bit_reader.read::<u32>(length_in_bits)?
      };

      (dependent_slice_segment_flag, Some(slice_segment_address))
    }
    else {
      (None, None)
    };

    let mut slice_type: Option<SliceType> = None;
    let mut pic_output_flag: Option<bool> = None;
    let mut colour_plane_id: Option<u8> = None;
    let mut slice_pic_order_cnt_lsb: Option<u16> = None;
    let mut short_term_ref_pic_set_sps_flag: Option<bool> = None;
    let mut short_term_ref_pic_set: Option<ShortTermReferencePictureSet> = None;
    let mut short_term_ref_pic_set_size: Option<u16> = None;
    let mut short_term_ref_pic_set_idx: Option<u8> = None;
    let mut curr_rps_idx: u8 = 0;
    let mut long_term_ref_pics: Vec<LongTermRefPicEntry> = Vec::new();
    let mut slice_temporal_mvp_enabled_flag: Option<bool> = None;
    let mut slice_sao_luma_flag: Option<bool> = None;
    let mut slice_sao_chroma_flag: Option<bool> = None;
    let mut num_ref_idx_active_override_flag: Option<bool> = None;
    let mut num_ref_idx_l0_active_minus1: Option<u8> = None;
    let mut num_ref_idx_l1_active_minus1: Option<u8> = None;
    let mut ref_pic_list_modification: Option<RefPicListModification> = None;
    let mut mvd_l1_zero_flag: Option<bool> = None;
    let mut cabac_init_flag: Option<bool> = None;
    let mut collocated_from_l0_flag: Option<bool> = None;
    let mut collocated_ref_idx: Option<u32> = None;
    let mut pred_weight_table: Option<PredWeightTable> = None;
    let mut five_minus_max_num_merge_cand: Option<u8> = None;
    let mut slice_qp_delta: Option<i8> = None;
    let mut slice_cb_qp_offset: Option<i8> = None;
    let mut slice_cr_qp_offset: Option<i8> = None;
    let mut deblocking_filter_override_flag: Option<bool> = None;
    let mut slice_deblocking_filter_disabled_flag: Option<bool> = None;
    let mut slice_beta_offset_div2: Option<i8> = None;
    let mut slice_tc_offset_div2: Option<i8> = None;
    let mut slice_loop_filter_across_slices_enabled_flag: Option<bool> = None;
    let mut entry_point_offsets: Vec<u32> = Vec::new();

    if !dependent_slice_segment_flag.unwrap_or(false) {
      for _ in 0..slice_segment_context.num_extra_slice_header_bits {
        // slice_reserved_flag[_]
        bit_reader.read_bit()?;
      }

      let parsed_slice_type: SliceType =
        (read_exp_golomb_ue(&mut bit_reader)? as u8)
          .try_into()
          .map_err(|message| io::Error::new(io::ErrorKind::InvalidData, message))?;
      slice_type = Some(parsed_slice_type);

      pic_output_flag = if slice_segment_context.output_flag_present_flag {
        Some(bit_reader.read_bit()?)
      }
      else {
        None
      };
      colour_plane_id = if slice_segment_context.separate_colour_plane_flag {
        Some(bit_reader.read::<u8>(2)?)
      }
      else {
        None
      };

      // 7.4.7.1  General slice segment header semantics:
      // > The variable CurrRpsIdx is derived as follows:
      // > - If short_term_ref_pic_set_sps_flag is equal to 1, CurrRpsIdx is set equal to short_term_ref_pic_set_idx.
      // > - Otherwise, CurrRpsIdx is set equal to num_short_term_ref_pic_sets.
      let mut num_pic_total_curr: u32 = 0;

      // Not an IDR slice ?
      if !nal_unit_type.is_idr() {
        // log2_max_pic_order_cnt_lsb_minus4 + 4  bits.
        slice_pic_order_cnt_lsb = Some(bit_reader.read((slice_segment_context.log2_max_pic_order_cnt_lsb_minus4 + 4) as u32)?);
        let st_rps_sps_flag = *short_term_ref_pic_set_sps_flag.insert(bit_reader.read_bit()?);

        if !st_rps_sps_flag {
          curr_rps_idx = slice_segment_context.num_short_term_ref_pic_sets;

          let mut bit_count: u32 = 0;
          let rps = ShortTermReferencePictureSet::from_bit_reader(
            &mut bit_reader,
            slice_segment_context.num_short_term_ref_pic_sets as usize,
            slice_segment_context.num_short_term_ref_pic_sets as usize,
            &[],
            &mut bit_count,
          )?;
          num_pic_total_curr += rps.num_pics_used_by_curr() as u32;
          short_term_ref_pic_set = Some(rps);

          short_term_ref_pic_set_size = Some(bit_count as u16);
        }
        else {
          if slice_segment_context.num_short_term_ref_pic_sets > 1 {
            // Ceil(Log2(num_short_term_ref_pic_sets)) bits.
            let length_in_bits = (slice_segment_context.num_short_term_ref_pic_sets as f64).log2().ceil() as u32;
            let value = bit_reader.read::<u8>(length_in_bits)?;
            short_term_ref_pic_set_idx = Some(value);
            curr_rps_idx = value;
          }
          // The referenced RPS lives in the SPS, outside this parser's reach;
          // the caller supplies its used-by-curr count via the context.
          num_pic_total_curr += slice_segment_context.num_pic_total_curr_for_sps_rps;
        }

        if slice_segment_context.long_term_ref_pics_present_flag {
          let num_long_term_sps = if slice_segment_context.num_long_term_ref_pics_sps > 0 {
            read_exp_golomb_ue(&mut bit_reader)?
          } else {
            0
          };
          let num_long_term_pics = read_exp_golomb_ue(&mut bit_reader)?;

          let mut prev_delta_msb_cycle_lt = 0u32;
          for i in 0..(num_long_term_sps + num_long_term_pics) {
            let is_sps_entry = i < num_long_term_sps;

            let lt_idx_sps = if is_sps_entry && slice_segment_context.num_long_term_ref_pics_sps > 1 {
              let length_in_bits = (slice_segment_context.num_long_term_ref_pics_sps as f64).log2().ceil() as u32;
              Some(bit_reader.read::<u8>(length_in_bits)?)
            } else if is_sps_entry {
              Some(0)
            } else {
              None
            };

            let poc_lsb_lt = if lt_idx_sps.is_none() {
              bit_reader.read((slice_segment_context.log2_max_pic_order_cnt_lsb_minus4 + 4) as u32)?
            } else {
              0
            };
            let used_by_curr_pic_lt_flag = if let Some(idx) = lt_idx_sps {
              // Inherited from SPS.long_term_ref_pics_sps[idx].used_by_curr_pic;
              // not re-coded in the slice header (_7.3.6.1_).
              slice_segment_context
                .long_term_ref_pics_sps_used_by_curr
                .get(idx as usize)
                .copied()
                .unwrap_or(false)
            } else {
              bit_reader.read_bit()?
            };
            if used_by_curr_pic_lt_flag {
              num_pic_total_curr += 1;
            }

            let delta_poc_msb_present_flag = bit_reader.read_bit()?;
            let delta_poc_msb_cycle_lt = if delta_poc_msb_present_flag {
              let delta = read_exp_golomb_ue(&mut bit_reader)?;
              let cycle = if i == 0 || is_sps_entry {
                delta
              } else {
                delta + prev_delta_msb_cycle_lt
              };
              prev_delta_msb_cycle_lt = cycle;
              cycle
            } else {
              0
            };

            long_term_ref_pics.push(LongTermRefPicEntry {
              lt_idx_sps,
              poc_lsb_lt,
              used_by_curr_pic_lt_flag,
              delta_poc_msb_present_flag,
              delta_poc_msb_cycle_lt,
            });
          }
        }

        if slice_segment_context.sps_temporal_mvp_enabled_flag {
          slice_temporal_mvp_enabled_flag = Some(bit_reader.read_bit()?);
        }
      }

      if slice_segment_context.sample_adaptive_offset_enabled_flag {
        let luma = bit_reader.read_bit()?;
        slice_sao_luma_flag = Some(luma);
        if slice_segment_context.separate_colour_plane_flag {
          slice_sao_chroma_flag = None;
        } else {
          // ChromaArrayType != 0 is the common case this decoder targets
          // (monochrome streams have no chroma SAO flag at all); this
          // parser does not special-case monochrome separately since SAO
          // chroma flags are harmless no-ops for luma-only content.
          slice_sao_chroma_flag = Some(bit_reader.read_bit()?);
        }
      }

      let is_p_or_b = matches!(parsed_slice_type, SliceType::P | SliceType::B);
      if is_p_or_b {
        let override_flag = bit_reader.read_bit()?;
        num_ref_idx_active_override_flag = Some(override_flag);
        if override_flag {
          let l0: u8 = read_exp_golomb_ue(&mut bit_reader)? as _;
          num_ref_idx_l0_active_minus1 = Some(l0);
          if parsed_slice_type == SliceType::B {
            let l1: u8 = read_exp_golomb_ue(&mut bit_reader)? as _;
            num_ref_idx_l1_active_minus1 = Some(l1);
          }
        } else {
          num_ref_idx_l0_active_minus1 = Some(slice_segment_context.num_ref_idx_l0_default_active_minus1);
          if parsed_slice_type == SliceType::B {
            num_ref_idx_l1_active_minus1 = Some(slice_segment_context.num_ref_idx_l1_default_active_minus1);
          }
        }

        if slice_segment_context.lists_modification_present_flag && num_pic_total_curr > 1 {
          let length_in_bits = (num_pic_total_curr as f64).log2().ceil().max(1.0) as u32;
          let ref_pic_list_modification_flag_l0 = bit_reader.read_bit()?;
          let num_ref_idx_l0 = num_ref_idx_l0_active_minus1.unwrap_or(0) as u32 + 1;
          let list_entry_l0 = if ref_pic_list_modification_flag_l0 {
            let mut entries = Vec::with_capacity(num_ref_idx_l0 as usize);
            for _ in 0..num_ref_idx_l0 {
              entries.push(bit_reader.read::<u32>(length_in_bits)?);
            }
            entries
          } else {
            Vec::new()
          };

          let list_entry_l1 = if parsed_slice_type == SliceType::B {
            let ref_pic_list_modification_flag_l1 = bit_reader.read_bit()?;
            let num_ref_idx_l1 = num_ref_idx_l1_active_minus1.unwrap_or(0) as u32 + 1;
            if ref_pic_list_modification_flag_l1 {
              let mut entries = Vec::with_capacity(num_ref_idx_l1 as usize);
              for _ in 0..num_ref_idx_l1 {
                entries.push(bit_reader.read::<u32>(length_in_bits)?);
              }
              entries
            } else {
              Vec::new()
            }
          } else {
            Vec::new()
          };

          ref_pic_list_modification = Some(RefPicListModification { list_entry_l0, list_entry_l1 });
        }

        if parsed_slice_type == SliceType::B {
          mvd_l1_zero_flag = Some(bit_reader.read_bit()?);
        }
        if slice_segment_context.cabac_init_present_flag {
          cabac_init_flag = Some(bit_reader.read_bit()?);
        }
        if slice_temporal_mvp_enabled_flag.unwrap_or(false) {
          let mut from_l0 = true;
          if parsed_slice_type == SliceType::B {
            from_l0 = bit_reader.read_bit()?;
            collocated_from_l0_flag = Some(from_l0);
          }
          let active_in_list = if from_l0 {
            num_ref_idx_l0_active_minus1.unwrap_or(0)
          } else {
            num_ref_idx_l1_active_minus1.unwrap_or(0)
          };
          if active_in_list > 0 {
            collocated_ref_idx = Some(read_exp_golomb_ue(&mut bit_reader)?);
          } else {
            collocated_ref_idx = Some(0);
          }
        }

        let uses_weighted_pred = (slice_segment_context.weighted_pred_flag && parsed_slice_type == SliceType::P)
          || (slice_segment_context.weighted_bipred_flag && parsed_slice_type == SliceType::B);
        if uses_weighted_pred {
          pred_weight_table = Some(PredWeightTable::from_bit_reader(
            &mut bit_reader,
            parsed_slice_type,
            num_ref_idx_l0_active_minus1.unwrap_or(0) as u32 + 1,
            num_ref_idx_l1_active_minus1.map(|v| v as u32 + 1).unwrap_or(0),
          )?);
        }

        let five_minus: u8 = read_exp_golomb_ue(&mut bit_reader)? as _;
        five_minus_max_num_merge_cand = Some(five_minus);
      }

      slice_qp_delta = Some(read_exp_golomb_se(&mut bit_reader)? as i8);

      if slice_segment_context.pps_slice_chroma_qp_offsets_present_flag {
        slice_cb_qp_offset = Some(read_exp_golomb_se(&mut bit_reader)? as i8);
        slice_cr_qp_offset = Some(read_exp_golomb_se(&mut bit_reader)? as i8);
      }

      if slice_segment_context.deblocking_filter_override_enabled_flag {
        deblocking_filter_override_flag = Some(bit_reader.read_bit()?);
      }
      if deblocking_filter_override_flag.unwrap_or(false) {
        let disabled = bit_reader.read_bit()?;
        slice_deblocking_filter_disabled_flag = Some(disabled);
        if !disabled {
          slice_beta_offset_div2 = Some(read_exp_golomb_se(&mut bit_reader)? as i8);
          slice_tc_offset_div2 = Some(read_exp_golomb_se(&mut bit_reader)? as i8);
        }
      } else {
        slice_deblocking_filter_disabled_flag = Some(slice_segment_context.pps_deblocking_filter_disabled_flag);
      }

      if slice_segment_context.pps_loop_filter_across_slices_enabled_flag
        && (slice_sao_luma_flag.unwrap_or(false)
          || slice_sao_chroma_flag.unwrap_or(false)
          || !slice_deblocking_filter_disabled_flag.unwrap_or(false))
      {
        slice_loop_filter_across_slices_enabled_flag = Some(bit_reader.read_bit()?);
      }
    }

    if slice_segment_context.num_entry_point_flag_present() {
      let num_entry_point_offsets = read_exp_golomb_ue(&mut bit_reader)?;
      if num_entry_point_offsets > 0 {
        let offset_len_minus1 = read_exp_golomb_ue(&mut bit_reader)?;
        entry_point_offsets.reserve(num_entry_point_offsets as usize);
        for _ in 0..num_entry_point_offsets {
          let value = bit_reader.read::<u32>(offset_len_minus1 + 1)? + 1;
          entry_point_offsets.push(value);
        }
      }
    }

    if slice_segment_context.slice_segment_header_extension_present_flag {
      let length = read_exp_golomb_ue(&mut bit_reader)?;
      for _ in 0..length {
        // slice_segment_header_extension_data_byte
        bit_reader.read::<u8>(8)?;
      }
    }

    Ok(Self {
      nal_unit_type,
      first_slice_segment_in_pic_flag,
      no_output_of_prior_pics_flag,
      slice_pic_parameter_set_id,
      dependent_slice_segment_flag,
      slice_segment_address,
      slice_type,
      pic_output_flag,
      colour_plane_id,
      short_term_ref_pic_set_sps_flag,
      short_term_ref_pic_set,
      short_term_ref_pic_set_size,
      slice_pic_order_cnt_lsb,
      short_term_ref_pic_set_idx,
      curr_rps_idx,
      long_term_ref_pics,
      slice_temporal_mvp_enabled_flag,
      slice_sao_luma_flag,
      slice_sao_chroma_flag,
      num_ref_idx_active_override_flag,
      num_ref_idx_l0_active_minus1,
      num_ref_idx_l1_active_minus1,
      ref_pic_list_modification,
      mvd_l1_zero_flag,
      cabac_init_flag,
      collocated_from_l0_flag,
      collocated_ref_idx,
      pred_weight_table,
      five_minus_max_num_merge_cand,
      slice_qp_delta,
      slice_cb_qp_offset,
      slice_cr_qp_offset,
      deblocking_filter_override_flag,
      slice_deblocking_filter_disabled_flag,
      slice_beta_offset_div2,
      slice_tc_offset_div2,
      slice_loop_filter_across_slices_enabled_flag,
      entry_point_offsets,
    })
  }
}

impl PredWeightTable {
  fn from_bit_reader<R: Read>(
    bit_reader: &mut BitReader<R, BigEndian>,
    slice_type: SliceType,
    num_ref_idx_l0_active: u32,
    num_ref_idx_l1_active: u32,
  ) -> Result<Self, io::Error> {
    let luma_log2_weight_denom: u8 = read_exp_golomb_ue(bit_reader)? as _;
    let delta_chroma_log2_weight_denom: i8 = read_exp_golomb_se(bit_reader)? as _;

    let l0 = Self::read_list(bit_reader, num_ref_idx_l0_active)?;
    let l1 = if slice_type == SliceType::B {
      Self::read_list(bit_reader, num_ref_idx_l1_active)?
    } else {
      Vec::new()
    };

    Ok(Self {
      luma_log2_weight_denom,
      delta_chroma_log2_weight_denom,
      l0,
      l1,
    })
  }

  fn read_list<R: Read>(
    bit_reader: &mut BitReader<R, BigEndian>,
    num_ref_idx_active: u32,
  ) -> Result<Vec<WeightEntry>, io::Error> {
    let mut luma_flags = Vec::with_capacity(num_ref_idx_active as usize);
    for _ in 0..num_ref_idx_active {
      luma_flags.push(bit_reader.read_bit()?);
    }
    let mut chroma_flags = Vec::with_capacity(num_ref_idx_active as usize);
    for _ in 0..num_ref_idx_active {
      // Assumed ChromaArrayType != 0 (monochrome streams carry no chroma
      // weights at all; this path targets the common 4:2:0/4:2:2/4:4:4 case).
      chroma_flags.push(bit_reader.read_bit()?);
    }

    let mut entries = Vec::with_capacity(num_ref_idx_active as usize);
    for i in 0..num_ref_idx_active as usize {
      let luma_weight_flag = luma_flags[i];
      let (luma_weight, luma_offset) = if luma_weight_flag {
        let weight: i16 = read_exp_golomb_se(bit_reader)? as _;
        let offset: i16 = read_exp_golomb_se(bit_reader)? as _;
        (weight, offset)
      } else {
        (0, 0)
      };

      let chroma_weight_flag = chroma_flags[i];
      let (chroma_weight, chroma_offset) = if chroma_weight_flag {
        let mut weight = [0i16; 2];
        let mut offset = [0i16; 2];
        for c in 0..2 {
          weight[c] = read_exp_golomb_se(bit_reader)? as _;
          offset[c] = read_exp_golomb_se(bit_reader)? as _;
        }
        (weight, offset)
      } else {
        ([0i16; 2], [0i16; 2])
      };

      entries.push(WeightEntry {
        luma_weight_flag,
        luma_weight,
        luma_offset,
        chroma_weight_flag,
        chroma_weight,
        chroma_offset,
      });
    }

    Ok(entries)
  }
}

impl SliceSegmentLayer {
  /// Reads from _RBSP(Raw Byte Sequence Payload)_.
  ///
  /// Reads exactly `value_length` bytes.
  pub fn from_rbsp_reader<R: Read>(
    reader: &mut R,
    value_length: usize,
    nal_unit_type: NaluType,
    slice_segment_context: SliceSegmentContext,
  ) -> Result<Self, io::Error> {
    // Consume `value_length` bytes here, as `SliceSegmentHeader::from_reader` currently does not consume the whole bytes for the slice segment header.
    let bytes = {
      let mut bytes = vec![0; value_length];
      reader.read_exact(&mut bytes)?;
      bytes
    };

    let mut reader = io::Cursor::new(bytes);

    let header = SliceSegmentHeader::from_rbsp_reader(&mut reader, nal_unit_type, slice_segment_context)?;

    // `bitstream_io`'s `BitReader` only ever pulls whole bytes from the
    // underlying reader as it needs them, so the cursor's byte position
    // here already sits at the `byte_alignment()` boundary the header
    // leaves behind, without needing to track a separate bit count.
    let payload_offset = reader.position() as usize;
    let payload = reader.into_inner()[payload_offset..].to_vec();

    Ok(Self { header, payload })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slice_type_round_trips_through_try_from() {
    assert_eq!(SliceType::try_from(0), Ok(SliceType::B));
    assert_eq!(SliceType::try_from(1), Ok(SliceType::P));
    assert_eq!(SliceType::try_from(2), Ok(SliceType::I));
    assert!(SliceType::try_from(3).is_err());
  }

  #[test]
  fn max_num_merge_cand_counts_down_from_five() {
    let mut header = make_minimal_header();
    header.five_minus_max_num_merge_cand = Some(2);
    assert_eq!(header.max_num_merge_cand(), Some(3));
  }

  fn make_minimal_header() -> SliceSegmentHeader {
    SliceSegmentHeader {
      nal_unit_type: NaluType::IdrWRadl,
      first_slice_segment_in_pic_flag: true,
      no_output_of_prior_pics_flag: None,
      slice_pic_parameter_set_id: 0,
      dependent_slice_segment_flag: None,
      slice_segment_address: None,
      slice_type: Some(SliceType::I),
      pic_output_flag: None,
      colour_plane_id: None,
      short_term_ref_pic_set_sps_flag: None,
      short_term_ref_pic_set: None,
      short_term_ref_pic_set_size: None,
      slice_pic_order_cnt_lsb: None,
      short_term_ref_pic_set_idx: None,
      curr_rps_idx: 0,
      long_term_ref_pics: Vec::new(),
      slice_temporal_mvp_enabled_flag: None,
      slice_sao_luma_flag: None,
      slice_sao_chroma_flag: None,
      num_ref_idx_active_override_flag: None,
      num_ref_idx_l0_active_minus1: None,
      num_ref_idx_l1_active_minus1: None,
      ref_pic_list_modification: None,
      mvd_l1_zero_flag: None,
      cabac_init_flag: None,
      collocated_from_l0_flag: None,
      collocated_ref_idx: None,
      pred_weight_table: None,
      five_minus_max_num_merge_cand: None,
      slice_qp_delta: Some(0),
      slice_cb_qp_offset: None,
      slice_cr_qp_offset: None,
      deblocking_filter_override_flag: None,
      slice_deblocking_filter_disabled_flag: None,
      slice_beta_offset_div2: None,
      slice_tc_offset_div2: None,
      slice_loop_filter_across_slices_enabled_flag: None,
      entry_point_offsets: Vec::new(),
    }
  }
}
