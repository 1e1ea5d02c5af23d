//! CABAC-coded slice segment data syntax (§7.3.8): the coding tree/coding
//! unit/residual grammar that consumes the `CabacEngine`'s bins to drive
//! CTU decoding.
//!
//! Grounded in `libavcodec/hevc/hevc_cabac.c` and `hevc_ps.c`'s CTU loop
//! structure: one `decode_coding_quadtree` per CTB, recursing on
//! `split_cu_flag`, with `decode_cu` and residual/MV decoding (`residual.rs`,
//! `mv.rs`, `cu.rs`) hung off the leaf coding units. The deepest per-CU
//! syntax (residual coefficient scanning, MV prediction candidate lists) is
//! carried by those submodules; this module owns the quadtree recursion and
//! the row/substream bookkeeping CTU decoding needs regardless of CU
//! content, since that bookkeeping is what WPP/tiles actually parallelise
//! over.

pub mod cu;
pub mod mv;
pub mod residual;

use crate::error::Result;
use crate::h265::cabac::contexts::ContextElement;
use crate::h265::cabac::CabacEngine;
use crate::h265::syntax::residual::{self, Coefficient, ResidualCodingParams, ScanOrder};

/// Per-picture geometry the coding-tree walk needs, derived once from the
/// active SPS/PPS rather than recomputed per CTU.
#[derive(Debug, Clone, Copy)]
pub struct CtuGeometry {
    pub ctb_size_log2: u32,
    pub min_cb_log2_size: u32,
    pub pic_width_in_ctbs: u32,
    pub pic_height_in_ctbs: u32,
}

impl CtuGeometry {
    pub fn pic_size_in_ctbs(&self) -> u32 {
        self.pic_width_in_ctbs * self.pic_height_in_ctbs
    }
}

/// Drives one CTB's `coding_quadtree()` (§7.3.8.4), recursing into
/// `split_cu_flag` and reporting the leaf coding-unit addresses it visited.
/// Leaf CU parsing itself (`cu::decode_coding_unit`) is invoked at each leaf
/// but its result is left to the caller to accumulate, since what happens
/// with a decoded CU (reconstruction) is a DSP-dispatch concern outside
/// this module.
pub fn decode_coding_quadtree(
    cabac: &mut CabacEngine,
    geometry: &CtuGeometry,
    x0: u32,
    y0: u32,
    log2_cb_size: u32,
    depth: u32,
    mut on_leaf: impl FnMut(&mut CabacEngine, u32, u32, u32) -> Result<()>,
) -> Result<()> {
    decode_coding_quadtree_inner(cabac, geometry, x0, y0, log2_cb_size, depth, &mut on_leaf)
}

fn decode_coding_quadtree_inner(
    cabac: &mut CabacEngine,
    geometry: &CtuGeometry,
    x0: u32,
    y0: u32,
    log2_cb_size: u32,
    depth: u32,
    on_leaf: &mut impl FnMut(&mut CabacEngine, u32, u32, u32) -> Result<()>,
) -> Result<()> {
    let split_cu_flag = if log2_cb_size > geometry.min_cb_log2_size {
        cabac.decode_bin(ContextElement::SplitCodingUnitFlag, depth.min(2) as usize)
    } else {
        // Implicitly split: below the minimum coding block size there is no
        // choice left to signal.
        false
    };

    let forced_split = log2_cb_size > geometry.min_cb_log2_size && is_forced_split(geometry, x0, y0, log2_cb_size);

    if split_cu_flag || forced_split {
        let half = 1u32 << (log2_cb_size - 1);
        let next_log2 = log2_cb_size - 1;
        let pic_width = geometry.pic_width_in_ctbs << geometry.ctb_size_log2;
        let pic_height = geometry.pic_height_in_ctbs << geometry.ctb_size_log2;
        for (dx, dy) in [(0, 0), (half, 0), (0, half), (half, half)] {
            let (cx, cy) = (x0 + dx, y0 + dy);
            // A sub-block fully outside the picture is never visited; only
            // its top-left sample needs to be inside (§7.3.8.4).
            if cx < pic_width && cy < pic_height {
                decode_coding_quadtree_inner(cabac, geometry, cx, cy, next_log2, depth + 1, on_leaf)?;
            }
        }
        Ok(())
    } else {
        on_leaf(cabac, x0, y0, log2_cb_size)
    }
}

/// Geometry a `transform_tree()` walk (§7.3.8.8) needs beyond the leaf
/// coding unit's own size: how deep it may recurse and the smallest
/// transform block the SPS allows, plus the per-picture bit depth and
/// chroma format [`residual::decode_residual_block`]'s scan-order and
/// dequantisation steps need.
#[derive(Debug, Clone, Copy)]
pub struct TransformTreeParams {
    pub log2_min_transform_size: u32,
    pub log2_max_transform_size: u32,
    pub max_depth: u32,
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
    pub chroma_format_idc: u8,
    pub sign_data_hiding_enabled: bool,
    pub persistent_rice_adaptation_enabled: bool,
    pub qp_y: i32,
}

/// One leaf transform unit's dequantised, position-tagged coefficients,
/// grouped by colour component (0 = luma, 1 = Cb, 2 = Cr).
#[derive(Debug, Clone, Default)]
pub struct TransformUnitResult {
    pub log2_size: u32,
    pub coefficients: [Vec<(u16, u16, i16)>; 3],
}

fn scan_order_for(log2_trafo_size: u32, intra_pred_mode: Option<u8>) -> ScanOrder {
    // §7.4.9.11: horizontal/vertical scans only apply to 4x4/8x8 intra
    // luma/chroma blocks whose predicted angle falls in the diagonal-
    // adjacent ranges; every other block uses the up-right diagonal scan.
    match intra_pred_mode {
        Some(mode) if log2_trafo_size <= 3 && (6..=14).contains(&mode) => ScanOrder::Vertical,
        Some(mode) if log2_trafo_size <= 3 && (22..=30).contains(&mode) => ScanOrder::Horizontal,
        _ => ScanOrder::Diagonal,
    }
}

/// Decodes one leaf transform unit's residual for every component whose
/// `cbf` is set, dequantising each coefficient in place (§8.6.2/§8.6.3).
fn decode_transform_unit(
    cabac: &mut CabacEngine,
    params: &TransformTreeParams,
    log2_trafo_size: u32,
    cbf_luma: bool,
    cbf_cb: bool,
    cbf_cr: bool,
    intra_pred_mode_luma: Option<u8>,
) -> Result<TransformUnitResult> {
    let mut result = TransformUnitResult {
        log2_size: log2_trafo_size,
        coefficients: Default::default(),
    };

    let mut decode_component = |c_idx: usize, log2_size: u32| -> Result<Vec<Coefficient>> {
        let scan_idx = scan_order_for(log2_size, if c_idx == 0 { intra_pred_mode_luma } else { None });
        residual::decode_residual_block(
            cabac,
            &ResidualCodingParams {
                log2_trafo_size: log2_size,
                c_idx,
                scan_idx,
                sign_data_hiding_enabled: params.sign_data_hiding_enabled,
                persistent_rice_adaptation_enabled: params.persistent_rice_adaptation_enabled,
            },
        )
    };

    if cbf_luma {
        let bit_depth = params.bit_depth_luma;
        for c in decode_component(0, log2_trafo_size)? {
            let level = residual::dequantize(c.level, params.qp_y, bit_depth, log2_trafo_size, 16);
            result.coefficients[0].push((c.x, c.y, level));
        }
    }

    if params.chroma_format_idc != 0 {
        let log2_chroma_size = if params.chroma_format_idc == 1 {
            log2_trafo_size.saturating_sub(1).max(2)
        } else {
            log2_trafo_size
        };
        let bit_depth = params.bit_depth_chroma;
        if cbf_cb {
            for c in decode_component(1, log2_chroma_size)? {
                let level = residual::dequantize(c.level, params.qp_y, bit_depth, log2_chroma_size, 16);
                result.coefficients[1].push((c.x, c.y, level));
            }
        }
        if cbf_cr {
            for c in decode_component(2, log2_chroma_size)? {
                let level = residual::dequantize(c.level, params.qp_y, bit_depth, log2_chroma_size, 16);
                result.coefficients[2].push((c.x, c.y, level));
            }
        }
    }

    Ok(result)
}

/// `transform_tree()` (§7.3.8.8): recurses on `split_transform_flag` down
/// to `max_depth` or the SPS's minimum transform block size, decoding
/// `cbf_cb`/`cbf_cr` at every node and `cbf_luma` at every non-root node,
/// then `residual_coding()` at each leaf whose `cbf` flags allow it.
#[allow(clippy::too_many_arguments)]
pub fn decode_transform_tree(
    cabac: &mut CabacEngine,
    params: &TransformTreeParams,
    log2_trafo_size: u32,
    trafo_depth: u32,
    parent_cbf_cb: bool,
    parent_cbf_cr: bool,
    intra_pred_mode_luma: Option<u8>,
) -> Result<Vec<TransformUnitResult>> {
    let can_split = log2_trafo_size > params.log2_min_transform_size && trafo_depth < params.max_depth;
    let must_split = log2_trafo_size > params.log2_max_transform_size;

    let split = if must_split {
        true
    } else if can_split {
        residual::decode_split_transform_flag(cabac, log2_trafo_size)
    } else {
        false
    };

    let (cbf_cb, cbf_cr) = if params.chroma_format_idc != 0 && (trafo_depth == 0 || parent_cbf_cb || parent_cbf_cr) {
        residual::decode_cbf_chroma(cabac, trafo_depth)
    } else {
        (parent_cbf_cb && !split, parent_cbf_cr && !split)
    };

    if split {
        let mut units = Vec::new();
        // Sub-block spatial offsets are a DSP/reconstruction concern; this
        // walk only tracks the bits each of the four child nodes consumes.
        for _ in 0..4 {
            units.extend(decode_transform_tree(
                cabac,
                params,
                log2_trafo_size - 1,
                trafo_depth + 1,
                cbf_cb,
                cbf_cr,
                intra_pred_mode_luma,
            )?);
        }
        Ok(units)
    } else {
        let cbf_luma = if trafo_depth == 0 {
            true
        } else {
            residual::decode_cbf_luma(cabac, trafo_depth)
        };
        if !cbf_luma && !cbf_cb && !cbf_cr {
            return Ok(Vec::new());
        }
        let unit = decode_transform_unit(
            cabac,
            params,
            log2_trafo_size,
            cbf_luma,
            cbf_cb,
            cbf_cr,
            intra_pred_mode_luma,
        )?;
        Ok(vec![unit])
    }
}

/// A CU straddling the picture boundary is always split further, regardless
/// of `split_cu_flag` (§7.3.8.4: "When ... x0 + (1 << log2CbSize) is
/// greater than pic_width_in_luma_samples ... split_cu_flag is inferred to
/// be equal to 1").
fn is_forced_split(geometry: &CtuGeometry, x0: u32, y0: u32, log2_cb_size: u32) -> bool {
    let size = 1u32 << log2_cb_size;
    let pic_width = geometry.pic_width_in_ctbs << geometry.ctb_size_log2;
    let pic_height = geometry.pic_height_in_ctbs << geometry.ctb_size_log2;
    x0 + size > pic_width || y0 + size > pic_height
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadtree_visits_single_leaf_when_no_split_possible() {
        let data = [0u8; 16];
        let mut cabac = CabacEngine::new(&data, 26, crate::h265::slice::SliceType::I, false);
        let geometry = CtuGeometry {
            ctb_size_log2: 4,
            min_cb_log2_size: 4,
            pic_width_in_ctbs: 1,
            pic_height_in_ctbs: 1,
        };
        let mut leaves = Vec::new();
        decode_coding_quadtree(&mut cabac, &geometry, 0, 0, 4, 0, |_, x, y, log2| {
            leaves.push((x, y, log2));
            Ok(())
        })
        .unwrap();
        assert_eq!(leaves, vec![(0, 0, 4)]);
    }

    #[test]
    fn boundary_ctu_forces_split() {
        let data = [0u8; 16];
        let mut cabac = CabacEngine::new(&data, 26, crate::h265::slice::SliceType::I, false);
        let geometry = CtuGeometry {
            ctb_size_log2: 5,
            min_cb_log2_size: 3,
            pic_width_in_ctbs: 1,
            pic_height_in_ctbs: 1,
        };
        let mut leaves = Vec::new();
        decode_coding_quadtree(&mut cabac, &geometry, 0, 0, 5, 0, |_, x, y, log2| {
            leaves.push((x, y, log2));
            Ok(())
        })
        .unwrap();
        // A 32x32 CTB confined to a 32x32 picture should not be forced to split.
        assert_eq!(leaves.len(), 1);
    }
}
