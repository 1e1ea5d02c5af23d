//! Transform tree and residual coefficient syntax (§7.3.8.8/§7.3.8.11).
//!
//! Grounded in `hevc_cabac.c`'s `hls_transform_tree`/`hls_residual_coding`:
//! sub-block scanning in reverse diagonal/horizontal/vertical order, the
//! significance map, the greater-than-1/greater-than-2 magnitude classes,
//! sign-data hiding and the Rice-parameter adaptation that
//! `coeff_abs_level_remaining` uses, then the dequantisation step that
//! turns a decoded level into a clamped `i16` transform coefficient.

use crate::error::Result;
use crate::h265::cabac::contexts::ContextElement;
use crate::h265::cabac::CabacEngine;

/// `split_transform_flag` (§7.3.8.8): context index is `5 - log2TrafoSize`
/// in the reference grammar, collapsed here to the 3 bins the context
/// table allocates for it.
pub fn decode_split_transform_flag(cabac: &mut CabacEngine, log2_trafo_size: u32) -> bool {
    let ctx = 5u32.saturating_sub(log2_trafo_size).min(2);
    cabac.decode_bin(ContextElement::SplitTransformFlag, ctx as usize)
}

/// `cbf_cb`/`cbf_cr` (§7.3.8.8), both context-coded on `trafo_depth`.
pub fn decode_cbf_chroma(cabac: &mut CabacEngine, trafo_depth: u32) -> (bool, bool) {
    let cb = cabac.decode_bin(ContextElement::CbfCbCr, trafo_depth.min(4) as usize);
    let cr = cabac.decode_bin(ContextElement::CbfCbCr, trafo_depth.min(4) as usize);
    (cb, cr)
}

/// `cbf_luma` (§7.3.8.8): context is 1 at the coding unit's root transform
/// node, 0 otherwise.
pub fn decode_cbf_luma(cabac: &mut CabacEngine, trafo_depth: u32) -> bool {
    cabac.decode_bin(ContextElement::CbfLuma, if trafo_depth == 0 { 1 } else { 0 })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Diagonal,
    Horizontal,
    Vertical,
}

/// Per-call configuration for one transform block's `residual_coding()`
/// (§7.3.8.11); everything the scan, context selection, and sign-hiding
/// rules need that isn't already implied by the bits themselves.
#[derive(Debug, Clone, Copy)]
pub struct ResidualCodingParams {
    /// `log2TrafoSize`, 2..=5.
    pub log2_trafo_size: u32,
    /// 0 = luma, 1 = Cb, 2 = Cr.
    pub c_idx: usize,
    pub scan_idx: ScanOrder,
    pub sign_data_hiding_enabled: bool,
    pub persistent_rice_adaptation_enabled: bool,
}

/// One decoded, sign-applied, not-yet-dequantised coefficient level at a
/// position within the transform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coefficient {
    pub x: u16,
    pub y: u16,
    pub level: i32,
}

/// Up-right diagonal scan order (§6.5.3) for an `n x n` grid, used both for
/// the 4x4-sub-block grid of a larger transform and for positions within
/// one sub-block.
fn diagonal_scan(n: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::with_capacity(n * n);
    let (mut x, mut y) = (0i32, 0i32);
    loop {
        while y >= 0 {
            if (x as usize) < n && (y as usize) < n {
                out.push((x as usize, y as usize));
            }
            y -= 1;
            x += 1;
        }
        if out.len() >= n * n {
            break;
        }
        y = x;
        x = 0;
    }
    out
}

fn horizontal_scan(n: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::with_capacity(n * n);
    for y in 0..n {
        for x in 0..n {
            out.push((x, y));
        }
    }
    out
}

fn vertical_scan(n: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::with_capacity(n * n);
    for x in 0..n {
        for y in 0..n {
            out.push((x, y));
        }
    }
    out
}

fn scan(n: usize, order: ScanOrder) -> Vec<(usize, usize)> {
    match order {
        ScanOrder::Diagonal => diagonal_scan(n),
        ScanOrder::Horizontal => horizontal_scan(n),
        ScanOrder::Vertical => vertical_scan(n),
    }
}

/// `last_sig_coeff_x_prefix`/`_y_prefix` (§9.3.4.2.3): truncated-unary,
/// context-coded, `ctxOffset`/`ctxShift` dependent on `log2TrafoSize` and
/// colour component.
fn decode_last_sig_coeff_prefix(cabac: &mut CabacEngine, log2_trafo_size: u32, c_idx: usize, element: ContextElement) -> u32 {
    let max_prefix = (log2_trafo_size << 1) as usize - 1;
    let ctx_offset = if c_idx == 0 {
        3 * (log2_trafo_size as usize - 2) + ((log2_trafo_size as usize - 1) >> 2)
    } else {
        15
    };
    let ctx_shift = if c_idx == 0 {
        (log2_trafo_size as usize + 1) >> 2
    } else {
        log2_trafo_size as usize - 2
    };

    let mut prefix = 0usize;
    while prefix < max_prefix {
        let ctx_bin = ctx_offset + (prefix >> ctx_shift);
        if !cabac.decode_bin(element, ctx_bin.min(17)) {
            break;
        }
        prefix += 1;
    }
    prefix as u32
}

fn decode_last_sig_coeff_suffix(cabac: &mut CabacEngine, prefix: u32) -> u32 {
    if prefix < 4 {
        return prefix;
    }
    let suffix_bits = (prefix >> 1) - 1;
    let suffix = cabac.decode_bypass_bits(suffix_bits);
    (1 << ((prefix >> 1) - 1)) * (2 + (prefix & 1)) + suffix
}

/// Rice-parameter update rule of §9.3.3.10: `cRiceParam` grows once the
/// decoded base level exceeds `3 << cRiceParam`, saturating at 4.
fn update_rice_param(rice_param: u32, base_level: u32) -> u32 {
    if base_level > (3u32 << rice_param) {
        (rice_param + 1).min(4)
    } else {
        rice_param
    }
}

/// `coeff_abs_level_remaining` (§9.3.3.10): truncated-Rice prefix (bypass
/// unary, capped) plus a fixed-length or Exp-Golomb suffix, Rice parameter
/// supplied by the caller (it adapts across coefficients within a
/// sub-block, and across sub-blocks/rows when persistent adaptation is
/// enabled).
fn decode_coeff_abs_level_remaining(cabac: &mut CabacEngine, rice_param: u32) -> u32 {
    let mut prefix = 0u32;
    while prefix < 32 && cabac.decode_bypass() {
        prefix += 1;
    }
    if prefix <= 3 {
        (prefix << rice_param) + cabac.decode_bypass_bits(rice_param)
    } else {
        let suffix_bits = prefix - 3 + rice_param;
        (((1u32 << (prefix - 3)) + 3 - 1) << rice_param) + cabac.decode_bypass_bits(suffix_bits)
    }
}

/// `sbType` used to index `stat_coeff[4]`: luma/chroma crossed with
/// "first sub-block coded" (the all-levels-small case starts from Rice
/// parameter 0 rather than the persisted value), per §9.3.3.10.
fn stat_coeff_index(c_idx: usize, is_first_subblock_of_tb: bool) -> usize {
    let luma = (c_idx == 0) as usize;
    2 * luma + (!is_first_subblock_of_tb) as usize
}

/// Decodes one transform block's `residual_coding()` (§7.3.8.11) and
/// returns the non-zero, sign-applied, dequantisation-ready levels in
/// no particular order (position is carried per coefficient).
pub fn decode_residual_block(cabac: &mut CabacEngine, params: &ResidualCodingParams) -> Result<Vec<Coefficient>> {
    let log2 = params.log2_trafo_size;
    let size = 1usize << log2;

    let last_x_prefix = decode_last_sig_coeff_prefix(cabac, log2, params.c_idx, ContextElement::LastSignificantCoeffXPrefix);
    let last_y_prefix = decode_last_sig_coeff_prefix(cabac, log2, params.c_idx, ContextElement::LastSignificantCoeffYPrefix);
    let mut last_x = decode_last_sig_coeff_suffix(cabac, last_x_prefix);
    let mut last_y = decode_last_sig_coeff_suffix(cabac, last_y_prefix);
    if params.scan_idx == ScanOrder::Vertical {
        std::mem::swap(&mut last_x, &mut last_y);
    }

    let sb_scan = scan(size >> 2, params.scan_idx);
    let pos_scan = scan(4, params.scan_idx);

    let last_sb_idx = sb_scan
        .iter()
        .position(|&(x, y)| x == (last_x as usize) / 4 && y == (last_y as usize) / 4)
        .unwrap_or(0);
    let last_pos_in_sb = pos_scan
        .iter()
        .position(|&(x, y)| x == (last_x as usize) % 4 && y == (last_y as usize) % 4)
        .unwrap_or(0);

    let mut coefficients = Vec::new();
    let mut first_subblock_seen = false;

    for sb_idx in (0..=last_sb_idx).rev() {
        let (sb_x, sb_y) = sb_scan[sb_idx];
        let is_last_subblock = sb_idx == last_sb_idx;
        let is_dc_subblock = sb_x == 0 && sb_y == 0;

        let coded_sub_block_flag = if is_last_subblock || is_dc_subblock {
            true
        } else {
            cabac.decode_bin(ContextElement::SignificantCoeffGroupFlag, (sb_x + sb_y).min(3))
        };
        if !coded_sub_block_flag {
            continue;
        }

        let start_pos = if is_last_subblock { last_pos_in_sb } else { 15 };
        let mut significant = [false; 16];
        let mut any_significant = is_last_subblock;
        if is_last_subblock {
            significant[start_pos] = true;
        }

        let infer_dc_sig = !is_last_subblock && is_dc_subblock;
        let lowest_decoded_pos = if is_last_subblock { 0 } else if infer_dc_sig { 1 } else { 0 };
        let high_pos = if is_last_subblock { start_pos } else { 16 };

        for idx in (lowest_decoded_pos..high_pos).rev() {
            let (x, y) = pos_scan[idx];
            let ctx = (params.c_idx != 0) as usize * 27 + ((sb_x + sb_y == 0) as usize) * 3 + ((x + y) % 4) as usize;
            let sig = cabac.decode_bin(ContextElement::SignificantCoeffFlag, ctx.min(43));
            significant[idx] = sig;
            any_significant |= sig;
        }
        if infer_dc_sig && !any_significant {
            significant[0] = true;
        } else if infer_dc_sig {
            significant[0] = cabac.decode_bin(ContextElement::SignificantCoeffFlag, (27 + (params.c_idx != 0) as usize * 27).min(43));
        }

        let num_sig = significant.iter().filter(|&&s| s).count();
        if num_sig == 0 {
            continue;
        }

        let sig_positions: Vec<usize> = (0..16).rev().filter(|&i| significant[i]).collect();

        let mut greater1_ctx_set = if is_last_subblock { 0 } else { 1 };
        if sb_idx != 0 && greater1_ctx_set == 0 {
            greater1_ctx_set = 1;
        }
        let mut last_greater1_was_one = true;
        let mut num_greater1_scanned = 0usize;
        let mut first_greater1_pos: Option<usize> = None;
        let mut levels = vec![1i32; sig_positions.len()];
        let mut greater1_flags = vec![false; sig_positions.len()];

        for (i, _) in sig_positions.iter().enumerate() {
            if num_greater1_scanned < 8 {
                let ctx_inc = (greater1_ctx_set * 4
                    + if last_greater1_was_one { 0 } else { (1).min(3) })
                .min(23);
                let greater1 = cabac.decode_bin(ContextElement::CoeffAbsLevelGreater1Flag, ctx_inc);
                greater1_flags[i] = greater1;
                last_greater1_was_one = greater1;
                if greater1 {
                    levels[i] = 2;
                    if first_greater1_pos.is_none() {
                        first_greater1_pos = Some(i);
                    }
                }
                num_greater1_scanned += 1;
            }
        }

        if let Some(i) = first_greater1_pos {
            if cabac.decode_bin(ContextElement::CoeffAbsLevelGreater2Flag, greater1_ctx_set.min(5)) {
                levels[i] = 3;
            }
        }

        let sign_hidden = params.sign_data_hiding_enabled
            && !is_last_subblock
            && (sig_positions.first().copied().unwrap_or(0) as i32 - sig_positions.last().copied().unwrap_or(0) as i32) >= 4;

        let mut signs = vec![false; sig_positions.len()];
        for (i, sign_slot) in signs.iter_mut().enumerate() {
            let is_hidden_sign = sign_hidden && i == sig_positions.len() - 1;
            if !is_hidden_sign {
                *sign_slot = cabac.decode_bypass();
            }
        }

        let sb_type = stat_coeff_index(params.c_idx, !first_subblock_seen);
        let mut rice_param = if params.persistent_rice_adaptation_enabled {
            (cabac.stat_coeff(sb_type) / 2) as u32
        } else {
            0
        };
        let initial_rice_param = rice_param;
        let mut num_remaining_coded = 0u32;

        for i in 0..sig_positions.len() {
            let greater2_applied = first_greater1_pos == Some(i) && levels[i] == 3;
            let base_level = 1 + greater1_flags[i] as i32 + greater2_applied as i32;
            let decode_remaining = if i < 8 { greater1_flags[i] } else { true };

            let mut magnitude = base_level;
            if decode_remaining {
                let remaining = decode_coeff_abs_level_remaining(cabac, rice_param);
                magnitude += remaining as i32;
                rice_param = update_rice_param(rice_param, magnitude as u32);
                num_remaining_coded += 1;
            }
            levels[i] = magnitude;
        }

        if params.persistent_rice_adaptation_enabled && num_remaining_coded > 0 {
            let current = cabac.stat_coeff(sb_type);
            let updated = if rice_param > initial_rice_param {
                current.saturating_add(1)
            } else if current > 0 {
                current - 1
            } else {
                current
            };
            cabac.set_stat_coeff(sb_type, updated.min(31));
        }

        for (i, &pos) in sig_positions.iter().enumerate() {
            let (px, py) = pos_scan[pos];
            let signed = if signs[i] { -levels[i] } else { levels[i] };
            coefficients.push(Coefficient {
                x: (sb_x * 4 + px) as u16,
                y: (sb_y * 4 + py) as u16,
                level: signed,
            });
        }
        first_subblock_seen = true;
    }

    Ok(coefficients)
}

/// §8.6.3: `levelScale[k] = {40, 45, 51, 57, 64, 72}` indexed by `qp % 6`,
/// shifted left by `qp / 6`. Flat (non-custom) scaling list, `scale_m = 16`.
pub fn dequantize(level: i32, qp: i32, bit_depth: u32, log2_trafo_size: u32, scale_m: i32) -> i16 {
    const LEVEL_SCALE: [i32; 6] = [40, 45, 51, 57, 64, 72];
    let shift = (bit_depth as i32 + log2_trafo_size as i32) - 5;
    let scale = LEVEL_SCALE[(qp.rem_euclid(6)) as usize] << (qp.div_euclid(6));
    let add = if shift > 0 { 1i64 << (shift - 1) } else { 0 };
    let product = level as i64 * scale as i64 * scale_m as i64 + add;
    let shifted = if shift >= 0 {
        product >> shift
    } else {
        product << (-shift)
    };
    shifted.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(log2: u32, scan_idx: ScanOrder) -> ResidualCodingParams {
        ResidualCodingParams {
            log2_trafo_size: log2,
            c_idx: 0,
            scan_idx,
            sign_data_hiding_enabled: true,
            persistent_rice_adaptation_enabled: false,
        }
    }

    #[test]
    fn diagonal_scan_covers_every_position_once() {
        let positions = diagonal_scan(4);
        assert_eq!(positions.len(), 16);
        let mut seen = [[false; 4]; 4];
        for (x, y) in positions {
            assert!(!seen[y][x]);
            seen[y][x] = true;
        }
    }

    #[test]
    fn residual_block_decodes_without_panicking_on_zero_input() {
        let data = [0u8; 32];
        let mut cabac = CabacEngine::new(&data, 26, crate::h265::slice::SliceType::I, false);
        let coeffs = decode_residual_block(&mut cabac, &params(3, ScanOrder::Diagonal)).unwrap();
        assert!(coeffs.len() <= 64);
    }

    #[test]
    fn residual_block_decodes_without_panicking_on_all_ones_input() {
        let data = [0xFFu8; 32];
        let mut cabac = CabacEngine::new(&data, 26, crate::h265::slice::SliceType::I, false);
        let coeffs = decode_residual_block(&mut cabac, &params(2, ScanOrder::Horizontal)).unwrap();
        assert!(coeffs.len() <= 16);
    }

    #[test]
    fn dequantize_clamps_to_i16_range() {
        let value = dequantize(i32::MAX / 2, 51, 12, 5, 16);
        assert_eq!(value, i16::MAX);
    }

    #[test]
    fn dequantize_zero_level_is_zero() {
        assert_eq!(dequantize(0, 26, 8, 3, 16), 0);
    }
}
