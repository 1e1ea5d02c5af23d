//! Hypothetical reference decoder parameters, shared by the VPS and by the
//! SPS's VUI (_Annex E.2.2 HRD parameters syntax_).

use std::io::{self, Read};

use bitstream_io::BitRead as _;
use bitstream_io::{BigEndian, BitReader};

use crate::base::read_exp_golomb_ue;

#[derive(Debug, Clone)]
pub struct HrdParameters {
    /// `Some` means `nal_hrd_parameters_present_flag == true` or
    /// `vcl_hrd_parameters_present_flag == true` was signalled under
    /// `commonInfPresentFlag`.
    pub common: Option<CommonHrdParameters>,
    pub sub_layers: Vec<SubLayerHrdInfo>,
}

#[derive(Debug, Clone, Copy)]
pub struct CommonHrdParameters {
    pub nal_hrd_parameters_present_flag: bool,
    pub vcl_hrd_parameters_present_flag: bool,
    /// `Some` means `sub_pic_hrd_params_present_flag == true`.
    pub sub_pic_hrd_params: Option<SubPicHrdParams>,
    pub bit_rate_scale: u8,
    pub cpb_size_scale: u8,
    /// `Some` means `sub_pic_hrd_params_present_flag == true`.
    pub cpb_size_du_scale: Option<u8>,
    pub initial_cpb_removal_delay_length_minus1: u8,
    pub au_cpb_removal_delay_length_minus1: u8,
    pub dpb_output_delay_length_minus1: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct SubPicHrdParams {
    pub tick_divisor_minus2: u8,
    pub du_cpb_removal_delay_increment_length_minus1: u8,
    pub sub_pic_cpb_params_in_pic_timing_sei_flag: bool,
    pub dpb_output_delay_du_length_minus1: u8,
}

/// Per sub-layer `fixed_pic_rate_general_flag`/`low_delay_hrd_flag`/`cpb_cnt_minus1`
/// plus the `nal`/`vcl` `sub_layer_hrd_parameters()` tables gated by
/// [`CommonHrdParameters::nal_hrd_parameters_present_flag`]/`vcl_hrd_parameters_present_flag`.
#[derive(Debug, Clone)]
pub struct SubLayerHrdInfo {
    pub fixed_pic_rate_general_flag: bool,
    pub fixed_pic_rate_within_cvs_flag: bool,
    /// `Some` means `fixed_pic_rate_within_cvs_flag == true`.
    pub elemental_duration_in_tc_minus1: Option<u32>,
    /// `Some` means `fixed_pic_rate_within_cvs_flag == false`.
    pub low_delay_hrd_flag: Option<bool>,
    pub cpb_cnt_minus1: u8,
    pub nal_hrd: Vec<CpbEntry>,
    pub vcl_hrd: Vec<CpbEntry>,
}

#[derive(Debug, Clone, Copy)]
pub struct CpbEntry {
    pub bit_rate_value_minus1: u32,
    pub cpb_size_value_minus1: u32,
    /// `Some` means `sub_pic_hrd_params_present_flag == true`.
    pub cpb_size_du_value_minus1: Option<u32>,
    /// `Some` means `sub_pic_hrd_params_present_flag == true`.
    pub bit_rate_du_value_minus1: Option<u32>,
    pub cbr_flag: bool,
}

impl HrdParameters {
    pub fn from_bit_reader<R: Read>(
        bit_reader: &mut BitReader<R, BigEndian>,
        common_inf_present_flag: bool,
        max_num_sub_layers_minus1: u8,
    ) -> Result<Self, io::Error> {
        let common = if common_inf_present_flag {
            let nal_hrd_parameters_present_flag = bit_reader.read_bit()?;
            let vcl_hrd_parameters_present_flag = bit_reader.read_bit()?;

            if nal_hrd_parameters_present_flag || vcl_hrd_parameters_present_flag {
                let sub_pic_hrd_params_present_flag = bit_reader.read_bit()?;
                let sub_pic_hrd_params = if sub_pic_hrd_params_present_flag {
                    let tick_divisor_minus2: u8 = bit_reader.read(8)?;
                    let du_cpb_removal_delay_increment_length_minus1: u8 = bit_reader.read(5)?;
                    let sub_pic_cpb_params_in_pic_timing_sei_flag = bit_reader.read_bit()?;
                    let dpb_output_delay_du_length_minus1: u8 = bit_reader.read(5)?;
                    Some(SubPicHrdParams {
                        tick_divisor_minus2,
                        du_cpb_removal_delay_increment_length_minus1,
                        sub_pic_cpb_params_in_pic_timing_sei_flag,
                        dpb_output_delay_du_length_minus1,
                    })
                } else {
                    None
                };

                let bit_rate_scale: u8 = bit_reader.read(4)?;
                let cpb_size_scale: u8 = bit_reader.read(4)?;
                let cpb_size_du_scale = if sub_pic_hrd_params_present_flag {
                    Some(bit_reader.read(4)?)
                } else {
                    None
                };
                let initial_cpb_removal_delay_length_minus1: u8 = bit_reader.read(5)?;
                let au_cpb_removal_delay_length_minus1: u8 = bit_reader.read(5)?;
                let dpb_output_delay_length_minus1: u8 = bit_reader.read(5)?;

                Some(CommonHrdParameters {
                    nal_hrd_parameters_present_flag,
                    vcl_hrd_parameters_present_flag,
                    sub_pic_hrd_params,
                    bit_rate_scale,
                    cpb_size_scale,
                    cpb_size_du_scale,
                    initial_cpb_removal_delay_length_minus1,
                    au_cpb_removal_delay_length_minus1,
                    dpb_output_delay_length_minus1,
                })
            } else {
                None
            }
        } else {
            None
        };

        let sub_pic_hrd_params_present = common
            .as_ref()
            .map(|c| c.sub_pic_hrd_params.is_some())
            .unwrap_or(false);
        let nal_hrd_present = common
            .as_ref()
            .map(|c| c.nal_hrd_parameters_present_flag)
            .unwrap_or(false);
        let vcl_hrd_present = common
            .as_ref()
            .map(|c| c.vcl_hrd_parameters_present_flag)
            .unwrap_or(false);

        let mut sub_layers = Vec::with_capacity(max_num_sub_layers_minus1 as usize + 1);
        for _ in 0..=max_num_sub_layers_minus1 {
            let fixed_pic_rate_general_flag = bit_reader.read_bit()?;
            let fixed_pic_rate_within_cvs_flag = if fixed_pic_rate_general_flag {
                true
            } else {
                bit_reader.read_bit()?
            };

            let (elemental_duration_in_tc_minus1, low_delay_hrd_flag) =
                if fixed_pic_rate_within_cvs_flag {
                    (Some(read_exp_golomb_ue(bit_reader)?), None)
                } else {
                    (None, Some(bit_reader.read_bit()?))
                };

            let cpb_cnt_minus1: u8 = if low_delay_hrd_flag == Some(true) {
                0
            } else {
                read_exp_golomb_ue(bit_reader)? as _
            };

            let nal_hrd = if nal_hrd_present {
                read_sub_layer_hrd_parameters(bit_reader, cpb_cnt_minus1, sub_pic_hrd_params_present)?
            } else {
                Vec::new()
            };
            let vcl_hrd = if vcl_hrd_present {
                read_sub_layer_hrd_parameters(bit_reader, cpb_cnt_minus1, sub_pic_hrd_params_present)?
            } else {
                Vec::new()
            };

            sub_layers.push(SubLayerHrdInfo {
                fixed_pic_rate_general_flag,
                fixed_pic_rate_within_cvs_flag,
                elemental_duration_in_tc_minus1,
                low_delay_hrd_flag,
                cpb_cnt_minus1,
                nal_hrd,
                vcl_hrd,
            });
        }

        Ok(Self { common, sub_layers })
    }
}

fn read_sub_layer_hrd_parameters<R: Read>(
    bit_reader: &mut BitReader<R, BigEndian>,
    cpb_cnt_minus1: u8,
    sub_pic_hrd_params_present_flag: bool,
) -> Result<Vec<CpbEntry>, io::Error> {
    let mut entries = Vec::with_capacity(cpb_cnt_minus1 as usize + 1);
    for _ in 0..=cpb_cnt_minus1 {
        let bit_rate_value_minus1 = read_exp_golomb_ue(bit_reader)?;
        let cpb_size_value_minus1 = read_exp_golomb_ue(bit_reader)?;
        let (cpb_size_du_value_minus1, bit_rate_du_value_minus1) = if sub_pic_hrd_params_present_flag
        {
            (
                Some(read_exp_golomb_ue(bit_reader)?),
                Some(read_exp_golomb_ue(bit_reader)?),
            )
        } else {
            (None, None)
        };
        let cbr_flag = bit_reader.read_bit()?;
        entries.push(CpbEntry {
            bit_rate_value_minus1,
            cpb_size_value_minus1,
            cpb_size_du_value_minus1,
            bit_rate_du_value_minus1,
            cbr_flag,
        });
    }
    Ok(entries)
}
