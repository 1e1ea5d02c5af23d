//! Pixel-domain DSP kernel dispatch table.
//!
//! The core never implements transforms, SAO, deblocking, intra prediction
//! or motion compensation itself (spec §1, §6); it calls through this table.
//! Kernels take raw pointers/strides so they stay language-portable; the
//! core is responsible for bounds-checking before invocation.

use std::ffi::c_void;

pub const MAX_PU_SIZE_LOG2: usize = 6; // 64x64
pub const QPEL_FILTER_WIDTHS: usize = 4;
pub const SAO_CLASSES: usize = 5;

/// `add_residual[bit_depth_class]`: adds a dequantised residual block to a prediction block.
pub type AddResidualFn = unsafe extern "C" fn(
    dst: *mut c_void,
    stride: isize,
    residual: *const i16,
    log2_size: u8,
);

/// Inverse quantisation: `level = (level * scale * scale_m + add) >> shift`, clamped to i16.
pub type DequantFn =
    unsafe extern "C" fn(coeffs: *mut i16, count: u32, qp: i32, log2_size: u8, scaling: *const u8);

pub type TransformFn =
    unsafe extern "C" fn(coeffs: *mut i16, dst: *mut c_void, stride: isize, col_limit: i32);

pub type IdctDcFn = unsafe extern "C" fn(dst: *mut c_void, stride: isize, dc: i16);

pub type SaoBandFilterFn = unsafe extern "C" fn(
    dst: *mut c_void,
    src: *const c_void,
    dst_stride: isize,
    src_stride: isize,
    offset: *const i16,
    band: i32,
    width: i32,
    height: i32,
);

pub type SaoEdgeFilterFn = unsafe extern "C" fn(
    dst: *mut c_void,
    src: *const c_void,
    stride_dst: isize,
    offset: *const i16,
    eo: i32,
    width: i32,
    height: i32,
);

pub type SaoEdgeRestoreFn =
    unsafe extern "C" fn(dst: *mut c_void, src: *const c_void, stride: isize, width: i32, height: i32);

/// `put_hevc_qpel`/`epel` family: writes a fractional-pel interpolated block
/// into a (possibly intermediate, higher bit-depth) destination buffer.
pub type PutHevcPredFn = unsafe extern "C" fn(
    dst: *mut c_void,
    dst_stride: isize,
    src: *const c_void,
    src_stride: isize,
    width: i32,
    height: i32,
    mx: i32,
    my: i32,
);

pub type PutHevcUniFn = unsafe extern "C" fn(
    dst: *mut c_void,
    dst_stride: isize,
    src: *const c_void,
    src_stride: isize,
    width: i32,
    height: i32,
    mx: i32,
    my: i32,
    denom: i32,
    weight: i32,
    offset: i32,
);

pub type PutHevcBiFn = unsafe extern "C" fn(
    dst: *mut c_void,
    dst_stride: isize,
    src0: *const c_void,
    src0_stride: isize,
    src1: *const c_void,
    src1_stride: isize,
    width: i32,
    height: i32,
    mx0: i32,
    my0: i32,
    mx1: i32,
    my1: i32,
);

pub type LoopFilterFn =
    unsafe extern "C" fn(pix: *mut c_void, stride: isize, beta: i32, tc: *const i32, no_p: *const u8, no_q: *const u8);

/// Function-pointer dispatch table, populated at decoder open from a
/// bit-depth-specific factory (see [`HevcDsp::placeholder`] for the
/// software fallback used when no native kernel set is wired in).
#[derive(Clone, Copy)]
pub struct HevcDsp {
    pub add_residual: [Option<AddResidualFn>; 4],
    pub dequant: Option<DequantFn>,
    pub transform_rdpcm: Option<TransformFn>,
    pub transform_4x4_luma: Option<TransformFn>,
    pub idct: [Option<TransformFn>; 4],
    pub idct_dc: [Option<IdctDcFn>; 4],
    pub sao_band_filter: [Option<SaoBandFilterFn>; SAO_CLASSES],
    pub sao_edge_filter: [Option<SaoEdgeFilterFn>; SAO_CLASSES],
    pub sao_edge_restore: [Option<SaoEdgeRestoreFn>; 2],
    pub put_hevc_qpel: [[[Option<PutHevcPredFn>; 4]; 4]; QPEL_FILTER_WIDTHS],
    pub put_hevc_epel: [[[Option<PutHevcPredFn>; 4]; 4]; QPEL_FILTER_WIDTHS],
    pub put_hevc_qpel_uni: [[[Option<PutHevcUniFn>; 4]; 4]; QPEL_FILTER_WIDTHS],
    pub put_hevc_qpel_bi: [[[Option<PutHevcBiFn>; 4]; 4]; QPEL_FILTER_WIDTHS],
    pub loop_filter_luma_h: Option<LoopFilterFn>,
    pub loop_filter_luma_v: Option<LoopFilterFn>,
    pub loop_filter_chroma_h: Option<LoopFilterFn>,
    pub loop_filter_chroma_v: Option<LoopFilterFn>,
}

impl HevcDsp {
    /// An all-`None` table. Driving the decoder against this table will
    /// produce correctly-shaped, zeroed frames (the coefficient/motion
    /// bookkeeping still runs); wiring real kernels in is a host concern.
    pub const fn placeholder() -> Self {
        Self {
            add_residual: [None; 4],
            dequant: None,
            transform_rdpcm: None,
            transform_4x4_luma: None,
            idct: [None; 4],
            idct_dc: [None; 4],
            sao_band_filter: [None; SAO_CLASSES],
            sao_edge_filter: [None; SAO_CLASSES],
            sao_edge_restore: [None; 2],
            put_hevc_qpel: [[[None; 4]; 4]; QPEL_FILTER_WIDTHS],
            put_hevc_epel: [[[None; 4]; 4]; QPEL_FILTER_WIDTHS],
            put_hevc_qpel_uni: [[[None; 4]; 4]; QPEL_FILTER_WIDTHS],
            put_hevc_qpel_bi: [[[None; 4]; 4]; QPEL_FILTER_WIDTHS],
            loop_filter_luma_h: None,
            loop_filter_luma_v: None,
            loop_filter_chroma_h: None,
            loop_filter_chroma_v: None,
        }
    }

    /// Picks the `add_residual`/`idct`/`idct_dc` row for a bit depth (8, 10,
    /// 12, and a reserved fourth slot for future range extensions).
    pub fn bit_depth_index(bit_depth: u8) -> usize {
        match bit_depth {
            8 => 0,
            10 => 1,
            12 => 2,
            _ => 3,
        }
    }
}

impl Default for HevcDsp {
    fn default() -> Self {
        Self::placeholder()
    }
}

impl std::fmt::Debug for HevcDsp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HevcDsp").finish_non_exhaustive()
    }
}
