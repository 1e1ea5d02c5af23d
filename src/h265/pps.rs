//! PPS(Picture Parameter Set)

use std::io::{self, Read};

use bitstream_io::BitRead as _;
use bitstream_io::{BigEndian, BitReader};

use crate::base::{read_exp_golomb_se, read_exp_golomb_ue};
use crate::h265::scaling_list::ScalingListData;

#[derive(Debug, Clone, PartialEq)]
pub struct PictureParameterSet {
    /// From the NAL unit header.
    pub nuh_temporal_id_plus1: u8,
    pub pps_pic_parameter_set_id: u8,
    pub pps_seq_parameter_set_id: u8,
    /// Specifies the presence of `dependent_slice_segment_flag` in the slice segment headers for coded pictures referring to the PPS.
    pub dependent_slice_segments_enabled_flag: bool,
    pub output_flag_present_flag: bool,
    pub sign_data_hiding_enabled_flag: bool,
    pub cabac_init_present_flag: bool,
    pub num_extra_slice_header_bits: u8,
    pub num_ref_idx_l0_default_active_minus1: u8,
    pub num_ref_idx_l1_default_active_minus1: u8,
    pub init_qp_minus26: i8,
    pub constrained_intra_pred_flag: bool,
    pub transform_skip_enabled_flag: bool,
    pub cu_qp_delta_enabled_flag: bool,
    /// `Some` means `cu_qp_delta_enabled_flag == true`.
    pub diff_cu_qp_delta_depth: Option<u8>,
    pub pps_cb_qp_offset: i8,
    pub pps_cr_qp_offset: i8,
    pub pps_slice_chroma_qp_offsets_present_flag: bool,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_flag: bool,
    pub transquant_bypass_enabled_flag: bool,
    pub entropy_coding_sync_enabled_flag: bool,
    /// `Some` means `tiles_enabled_flag == true`.
    pub tiles: Option<Tiles>,
    pub pps_loop_filter_across_slices_enabled_flag: bool,
    /// `Some` means `deblocking_filter_control_present_flag == true`.
    pub deblocking_filter_control: Option<DeblockingFilterControl>,
    pub pps_scaling_list_data_present_flag: bool,
    /// `Some` means `pps_scaling_list_data_present_flag == true`.
    pub scaling_list_data: Option<ScalingListData>,
    pub lists_modification_present_flag: bool,
    pub log2_parallel_merge_level_minus2: u8,
    pub slice_segment_header_extension_present_flag: bool,
    pub pps_extension_present_flag: bool,
    /// `Some` means `pps_extension_present_flag && pps_range_extension_flag`.
    pub range_extension: Option<PpsRangeExtension>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tiles {
    pub num_tile_columns_minus1: u8,
    pub num_tile_rows_minus1: u8,
    pub uniform_spacing_flag: bool,
    /// `len() == num_tile_columns_minus1` when `!uniform_spacing_flag`, empty otherwise.
    pub column_width_minus1: Vec<u32>,
    /// `len() == num_tile_rows_minus1` when `!uniform_spacing_flag`, empty otherwise.
    pub row_height_minus1: Vec<u32>,
    pub loop_filter_across_tiles_enabled_flag: bool,
}

impl Tiles {
    pub fn num_tile_columns(&self) -> u32 {
        self.num_tile_columns_minus1 as u32 + 1
    }

    pub fn num_tile_rows(&self) -> u32 {
        self.num_tile_rows_minus1 as u32 + 1
    }

    /// Column boundaries in CTB units, `uniform_spacing_flag`-aware, per
    /// the `colWidth[i]` derivation in §6.5.1.
    pub fn column_widths_ctbs(&self, pic_width_in_ctbs: u32) -> Vec<u32> {
        distribute_uniform_or_explicit(
            pic_width_in_ctbs,
            self.num_tile_columns(),
            self.uniform_spacing_flag,
            &self.column_width_minus1,
        )
    }

    pub fn row_heights_ctbs(&self, pic_height_in_ctbs: u32) -> Vec<u32> {
        distribute_uniform_or_explicit(
            pic_height_in_ctbs,
            self.num_tile_rows(),
            self.uniform_spacing_flag,
            &self.row_height_minus1,
        )
    }
}

/// Shared by `column_widths_ctbs`/`row_heights_ctbs`: either the uniform
/// `((i + 1) * picSizeInCtbs) / numTiles - (i * picSizeInCtbs) / numTiles`
/// split, or the explicit `*_minus1` sizes with the remainder as the last
/// tile's size.
fn distribute_uniform_or_explicit(
    pic_size_in_ctbs: u32,
    num_tiles: u32,
    uniform_spacing_flag: bool,
    explicit_minus1: &[u32],
) -> Vec<u32> {
    if uniform_spacing_flag {
        (0..num_tiles)
            .map(|i| {
                ((i + 1) * pic_size_in_ctbs) / num_tiles - (i * pic_size_in_ctbs) / num_tiles
            })
            .collect()
    } else {
        let mut sizes: Vec<u32> = explicit_minus1.iter().map(|&m| m + 1).collect();
        let used: u32 = sizes.iter().sum();
        sizes.push(pic_size_in_ctbs.saturating_sub(used));
        sizes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeblockingFilterControl {
    /// Specifies that slices referring to the PPS may override the
    /// deblocking parameters signalled here (`deblocking_filter_override_flag`
    /// becomes present in the slice header).
    pub deblocking_filter_override_enabled_flag: bool,
    /// Specifies that the deblocking filter is disabled for pictures referring to the PPS unless overriden by information present in the slice header.
    pub pps_deblocking_filter_disabled_flag: bool,
    /// Specifies the default deblocking parameter offset for Î² that is applied for slices referring to the PPS, unless overriden by information present in the slice header.
    ///
    /// `Some` means `pps_deblocking_filter_disabled_flag == false`.
    pub pps_beta_offset_div2: Option<i8>,
    /// Specifies the default deblocking parameter offset for tC that is applied for slices referring to the PPS, unless overriden by information present in the slice header.
    ///
    /// `Some` means `pps_deblocking_filter_disabled_flag == false`.
    pub pps_tc_offset_div2: Option<i8>,
}

/// `pps_range_extension()` (§7.3.2.3.1), the only PPS extension this
/// decoder parses beyond the base syntax: multilayer/3D/SCC extensions are
/// multi-layer-profile territory, an explicit Non-goal (spec.md §1), and
/// are left unparsed (the bits after them are simply not consumed, the
/// same "doesn't read to the end" contract `SliceSegmentHeader` already
/// has for its caller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PpsRangeExtension {
    /// `Some` means `cu_qp_delta_enabled_flag == true`.
    pub log2_max_transform_skip_block_size_minus2: u8,
    pub cross_component_prediction_enabled_flag: bool,
    pub chroma_qp_offset_list_enabled_flag: bool,
    /// `Some` means `chroma_qp_offset_list_enabled_flag == true`.
    pub diff_cu_chroma_qp_offset_depth: Option<u8>,
    pub cb_qp_offset_list: Vec<i8>,
    pub cr_qp_offset_list: Vec<i8>,
    pub log2_sao_offset_scale_luma: u8,
    pub log2_sao_offset_scale_chroma: u8,
}

impl Default for Tiles {
    fn default() -> Self {
        Self {
            num_tile_columns_minus1: 0,
            num_tile_rows_minus1: 0,
            uniform_spacing_flag: true,
            column_width_minus1: Vec::new(),
            row_height_minus1: Vec::new(),
            loop_filter_across_tiles_enabled_flag: true,
        }
    }
}

impl PictureParameterSet {
    pub fn from_rbsp_reader<R: Read>(
        reader: &mut R,
        nuh_temporal_id_plus1: u8,
    ) -> Result<Self, io::Error> {
        // See `pic_parameter_set_rbsp()` in _7.3.2.3 Picture parameter set RBSP syntax_.
        let mut bit_reader = BitReader::endian(reader, BigEndian);

        let pps_pic_parameter_set_id: u8 = read_exp_golomb_ue(&mut bit_reader)? as _;
        let pps_seq_parameter_set_id: u8 = read_exp_golomb_ue(&mut bit_reader)? as _;
        let dependent_slice_segments_enabled_flag = bit_reader.read_bit()?;

        let output_flag_present_flag = bit_reader.read_bit()?;

        let num_extra_slice_header_bits: u8 = bit_reader.read(3)?;
        let sign_data_hiding_enabled_flag = bit_reader.read_bit()?;
        let cabac_init_present_flag = bit_reader.read_bit()?;

        let num_ref_idx_l0_default_active_minus1: u8 = read_exp_golomb_ue(&mut bit_reader)? as _;
        let num_ref_idx_l1_default_active_minus1: u8 = read_exp_golomb_ue(&mut bit_reader)? as _;

        let init_qp_minus26: i8 = read_exp_golomb_se(&mut bit_reader)? as _;

        let constrained_intra_pred_flag = bit_reader.read_bit()?;
        let transform_skip_enabled_flag = bit_reader.read_bit()?;

        let cu_qp_delta_enabled_flag = bit_reader.read_bit()?;
        let diff_cu_qp_delta_depth: Option<u8> = if cu_qp_delta_enabled_flag {
            let diff_cu_qp_delta_depth: u8 = read_exp_golomb_ue(&mut bit_reader)? as _;
            Some(diff_cu_qp_delta_depth)
        } else {
            None
        };

        let pps_cb_qp_offset: i8 = read_exp_golomb_se(&mut bit_reader)? as _;
        let pps_cr_qp_offset: i8 = read_exp_golomb_se(&mut bit_reader)? as _;

        let pps_slice_chroma_qp_offsets_present_flag = bit_reader.read_bit()?;
        let weighted_pred_flag = bit_reader.read_bit()?;
        let weighted_bipred_flag = bit_reader.read_bit()?;
        let transquant_bypass_enabled_flag = bit_reader.read_bit()?;
        let tiles_enabled_flag = bit_reader.read_bit()?;
        let entropy_coding_sync_enabled_flag = bit_reader.read_bit()?;

        let tiles: Option<Tiles> = if tiles_enabled_flag {
            let num_tile_columns_minus1: u8 = read_exp_golomb_ue(&mut bit_reader)? as _;
            let num_tile_rows_minus1: u8 = read_exp_golomb_ue(&mut bit_reader)? as _;
            let uniform_spacing_flag = bit_reader.read_bit()?;

            let (column_width_minus1, row_height_minus1) = if !uniform_spacing_flag {
                let mut columns = Vec::with_capacity(num_tile_columns_minus1 as usize);
                for _ in 0..num_tile_columns_minus1 {
                    columns.push(read_exp_golomb_ue(&mut bit_reader)?);
                }
                let mut rows = Vec::with_capacity(num_tile_rows_minus1 as usize);
                for _ in 0..num_tile_rows_minus1 {
                    rows.push(read_exp_golomb_ue(&mut bit_reader)?);
                }
                (columns, rows)
            } else {
                (Vec::new(), Vec::new())
            };

            let loop_filter_across_tiles_enabled_flag = bit_reader.read_bit()?;

            Some(Tiles {
                num_tile_columns_minus1,
                num_tile_rows_minus1,
                uniform_spacing_flag,
                column_width_minus1,
                row_height_minus1,
                loop_filter_across_tiles_enabled_flag,
            })
        } else {
            None
        };

        let pps_loop_filter_across_slices_enabled_flag = bit_reader.read_bit()?;

        let deblocking_filter_control_present_flag = bit_reader.read_bit()?;
        let deblocking_filter_control = if deblocking_filter_control_present_flag {
            let deblocking_filter_override_enabled_flag = bit_reader.read_bit()?;

            let pps_deblocking_filter_disabled_flag = bit_reader.read_bit()?;
            let pps_deblocking_filter_params = if !pps_deblocking_filter_disabled_flag {
                let pps_beta_offset_div2: i8 = read_exp_golomb_se(&mut bit_reader)? as _;
                let pps_tc_offset_div2: i8 = read_exp_golomb_se(&mut bit_reader)? as _;
                Some((pps_beta_offset_div2, pps_tc_offset_div2))
            } else {
                None
            };

            Some(DeblockingFilterControl {
                deblocking_filter_override_enabled_flag,
                pps_deblocking_filter_disabled_flag,
                pps_beta_offset_div2: pps_deblocking_filter_params.map(|x| x.0),
                pps_tc_offset_div2: pps_deblocking_filter_params.map(|x| x.1),
            })
        } else {
            None
        };

        let pps_scaling_list_data_present_flag = bit_reader.read_bit()?;
        let scaling_list_data = if pps_scaling_list_data_present_flag {
            Some(ScalingListData::from_bit_reader(&mut bit_reader)?)
        } else {
            None
        };

        let lists_modification_present_flag = bit_reader.read_bit()?;
        let log2_parallel_merge_level_minus2: u8 = read_exp_golomb_ue(&mut bit_reader)? as _;

        let slice_segment_header_extension_present_flag = bit_reader.read_bit()?;
        let pps_extension_present_flag = bit_reader.read_bit()?;

        let range_extension = if pps_extension_present_flag {
            let pps_range_extension_flag = bit_reader.read_bit()?;
            // multilayer/3d/scc extensions are multi-layer territory (Non-goal);
            // their presence is noted but not parsed further.
            let _pps_multilayer_extension_flag = bit_reader.read_bit()?;
            let _pps_3d_extension_flag = bit_reader.read_bit()?;
            let _pps_scc_extension_flag = bit_reader.read_bit()?;
            let _pps_extension_4bits: u8 = bit_reader.read(4)?;

            if pps_range_extension_flag {
                Some(PpsRangeExtension::from_bit_reader(
                    &mut bit_reader,
                    cu_qp_delta_enabled_flag,
                )?)
            } else {
                None
            }
        } else {
            None
        };

        Ok(Self {
            nuh_temporal_id_plus1,
            pps_pic_parameter_set_id,
            pps_seq_parameter_set_id,
            dependent_slice_segments_enabled_flag,
            output_flag_present_flag,
            sign_data_hiding_enabled_flag,
            cabac_init_present_flag,
            num_extra_slice_header_bits,
            num_ref_idx_l0_default_active_minus1,
            num_ref_idx_l1_default_active_minus1,
            init_qp_minus26,
            constrained_intra_pred_flag,
            transform_skip_enabled_flag,
            cu_qp_delta_enabled_flag,
            diff_cu_qp_delta_depth,
            pps_cb_qp_offset,
            pps_cr_qp_offset,
            pps_slice_chroma_qp_offsets_present_flag,
            weighted_pred_flag,
            weighted_bipred_flag,
            transquant_bypass_enabled_flag,
            entropy_coding_sync_enabled_flag,
            tiles,
            pps_loop_filter_across_slices_enabled_flag,
            deblocking_filter_control,
            pps_scaling_list_data_present_flag,
            scaling_list_data,
            lists_modification_present_flag,
            log2_parallel_merge_level_minus2,
            slice_segment_header_extension_present_flag,
            pps_extension_present_flag,
            range_extension,
        })
    }
}

impl PpsRangeExtension {
    fn from_bit_reader<R: Read>(
        bit_reader: &mut BitReader<R, BigEndian>,
        cu_qp_delta_enabled_flag: bool,
    ) -> Result<Self, io::Error> {
        let log2_max_transform_skip_block_size_minus2: u8 =
            read_exp_golomb_ue(bit_reader)? as _;
        let cross_component_prediction_enabled_flag = bit_reader.read_bit()?;
        let chroma_qp_offset_list_enabled_flag = bit_reader.read_bit()?;

        let (diff_cu_chroma_qp_offset_depth, cb_qp_offset_list, cr_qp_offset_list) =
            if chroma_qp_offset_list_enabled_flag {
                let diff_cu_chroma_qp_offset_depth: u8 = read_exp_golomb_ue(bit_reader)? as _;
                let chroma_qp_offset_list_len_minus1 = read_exp_golomb_ue(bit_reader)?;
                let mut cb = Vec::with_capacity(chroma_qp_offset_list_len_minus1 as usize + 1);
                let mut cr = Vec::with_capacity(chroma_qp_offset_list_len_minus1 as usize + 1);
                for _ in 0..=chroma_qp_offset_list_len_minus1 {
                    cb.push(read_exp_golomb_se(bit_reader)? as i8);
                    cr.push(read_exp_golomb_se(bit_reader)? as i8);
                }
                (Some(diff_cu_chroma_qp_offset_depth), cb, cr)
            } else {
                (None, Vec::new(), Vec::new())
            };
        let _ = cu_qp_delta_enabled_flag;

        let log2_sao_offset_scale_luma: u8 = read_exp_golomb_ue(bit_reader)? as _;
        let log2_sao_offset_scale_chroma: u8 = read_exp_golomb_ue(bit_reader)? as _;

        Ok(Self {
            log2_max_transform_skip_block_size_minus2,
            cross_component_prediction_enabled_flag,
            chroma_qp_offset_list_enabled_flag,
            diff_cu_chroma_qp_offset_depth,
            cb_qp_offset_list,
            cr_qp_offset_list,
            log2_sao_offset_scale_luma,
            log2_sao_offset_scale_chroma,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_tile_columns_cover_the_whole_picture() {
        let tiles = Tiles {
            num_tile_columns_minus1: 2,
            num_tile_rows_minus1: 0,
            uniform_spacing_flag: true,
            column_width_minus1: Vec::new(),
            row_height_minus1: Vec::new(),
            loop_filter_across_tiles_enabled_flag: true,
        };
        let widths = tiles.column_widths_ctbs(10);
        assert_eq!(widths.iter().sum::<u32>(), 10);
        assert_eq!(widths.len(), 3);
    }

    #[test]
    fn explicit_tile_columns_put_the_remainder_in_the_last_tile() {
        let tiles = Tiles {
            num_tile_columns_minus1: 1,
            num_tile_rows_minus1: 0,
            uniform_spacing_flag: false,
            column_width_minus1: vec![2],
            row_height_minus1: Vec::new(),
            loop_filter_across_tiles_enabled_flag: true,
        };
        let widths = tiles.column_widths_ctbs(10);
        assert_eq!(widths, vec![3, 7]);
    }
}
