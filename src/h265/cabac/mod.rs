//! CABAC (Context-Adaptive Binary Arithmetic Coding) engine (§9.3).
//!
//! Structure (range/offset renormalization, regular/bypass/terminate
//! decoding) follows `cabac.c`'s `ff_hevc_cabac_init`/`get_cabac`/
//! `get_cabac_bypass`/`get_cabac_terminate`; context probability-state
//! initialisation is in [`contexts`].

pub mod contexts;
pub mod wpp;

use crate::h265::slice::SliceType;
use contexts::TOTAL_CONTEXTS;

/// `rangeTabLps[pStateIdx][qRangeIdx]`, Table 9-46 of the HEVC
/// specification (identical to H.264's CABAC LPS-range table): the
/// arithmetic coder's range contribution for the least-probable symbol,
/// indexed by a context's 6-bit probability state and the current range's
/// top two bits. `pStateIdx` only ever reaches 62 in practice (§9.3.2.2
/// clamps `pStateIdx` to `[0, 62]` and the MPS transition in
/// [`CabacEngine::next_state`] saturates at 62); row 63 is never indexed
/// but kept so the table's shape matches the reference's fixed-size array.
const RANGE_TAB_LPS: [[u32; 4]; 64] = [
    [128, 176, 208, 240],
    [128, 167, 197, 227],
    [128, 158, 187, 216],
    [123, 150, 178, 205],
    [116, 142, 169, 195],
    [111, 135, 160, 185],
    [105, 128, 152, 175],
    [100, 122, 144, 166],
    [95, 116, 137, 158],
    [90, 110, 130, 150],
    [85, 104, 123, 142],
    [81, 99, 117, 135],
    [77, 94, 111, 128],
    [73, 89, 105, 122],
    [69, 85, 100, 116],
    [66, 80, 95, 110],
    [62, 76, 90, 104],
    [59, 72, 86, 99],
    [56, 69, 81, 94],
    [53, 65, 77, 89],
    [51, 62, 73, 85],
    [48, 59, 69, 80],
    [46, 56, 66, 76],
    [43, 53, 63, 72],
    [41, 50, 59, 69],
    [39, 48, 56, 65],
    [37, 45, 54, 62],
    [35, 43, 51, 59],
    [33, 41, 48, 56],
    [32, 39, 46, 53],
    [30, 37, 43, 50],
    [28, 35, 41, 48],
    [27, 33, 39, 45],
    [26, 31, 37, 43],
    [24, 30, 35, 41],
    [23, 28, 33, 39],
    [22, 27, 32, 37],
    [21, 26, 30, 35],
    [20, 24, 29, 33],
    [19, 23, 27, 31],
    [18, 22, 26, 30],
    [17, 21, 25, 28],
    [16, 20, 23, 27],
    [15, 19, 22, 25],
    [14, 18, 21, 24],
    [14, 17, 20, 23],
    [13, 16, 19, 22],
    [12, 15, 18, 21],
    [12, 14, 17, 20],
    [11, 14, 16, 19],
    [11, 13, 15, 18],
    [10, 12, 15, 17],
    [10, 12, 14, 16],
    [9, 11, 13, 15],
    [9, 11, 12, 14],
    [8, 10, 12, 13],
    [8, 9, 11, 12],
    [7, 9, 10, 12],
    [7, 8, 10, 11],
    [6, 8, 9, 10],
    [6, 7, 9, 9],
    [6, 7, 8, 8],
    [5, 6, 7, 7],
    [2, 2, 2, 2],
];

/// A CABAC probability state: 6-bit state index plus the most-probable-symbol bit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextState {
    p_state_idx: u8,
    val_mps: bool,
}

/// The full CABAC engine: arithmetic decoder registers plus every context
/// variable, snapshot-able at CTB-row boundaries for WPP (see [`wpp`]).
#[derive(Debug, Clone)]
pub struct CabacEngine<'a> {
    data: &'a [u8],
    byte_pos: usize,
    ivl_curr_range: u32,
    ivl_offset: u32,
    bits_needed: i32,
    contexts: [ContextState; TOTAL_CONTEXTS],
    /// `stat_coeff[4]` (§9.3.3.10, `persistent_rice_adaptation_enabled_flag`):
    /// the Rice-parameter adaptation state carried across sub-blocks (and,
    /// with WPP, across CTB rows via [`wpp::CommonCabacState`]) indexed by
    /// `sbType = (cIdx == 0 ? 2 : 0) + (baseLevel <= 3 ? 0 : ...)`'s
    /// 4-way split in the residual-coding process.
    stat_coeff: [u8; 4],
}

impl<'a> CabacEngine<'a> {
    /// §9.3.2.4/§9.3.2.5: initialises the arithmetic decoding engine from
    /// the first bytes of a byte-aligned slice segment data payload, and
    /// every context variable from `slice_qp_y` and the slice's `initType`
    /// (derived from `slice_type`/`cabac_init_flag`, Table 9-5) via
    /// [`contexts::init_value`]/[`contexts::derive_context_state`].
    pub fn new(data: &'a [u8], slice_qp_y: i32, slice_type: SliceType, cabac_init_flag: bool) -> Self {
        let init_type = contexts::init_type_for_slice(slice_type, cabac_init_flag);

        let mut contexts = [ContextState::default(); TOTAL_CONTEXTS];
        for (idx, ctx) in contexts.iter_mut().enumerate() {
            let seed = contexts::init_value(init_type, idx);
            let (p_state_idx, val_mps) = contexts::derive_context_state(seed, slice_qp_y);
            *ctx = ContextState { p_state_idx, val_mps };
        }

        let mut engine = Self {
            data,
            byte_pos: 0,
            ivl_curr_range: 510,
            ivl_offset: 0,
            bits_needed: 8,
            contexts,
            stat_coeff: [0; 4],
        };
        engine.ivl_offset = (engine.next_byte() as u32) << 8 | engine.next_byte() as u32;
        engine.bits_needed = -8;
        engine
    }

    fn next_byte(&mut self) -> u8 {
        let byte = self.data.get(self.byte_pos).copied().unwrap_or(0xFF);
        self.byte_pos += 1;
        byte
    }

    fn context_index(&self, element: contexts::ContextElement, bin: usize) -> usize {
        contexts::context_offset(element) + bin
    }

    fn lps_range(p_state_idx: u8, q_range_idx: u32) -> u32 {
        RANGE_TAB_LPS[p_state_idx as usize][q_range_idx as usize]
    }

    /// `transIdxMps`/`transIdxLps` (Table 9-47): the probability-state
    /// transition on a correctly- or incorrectly-predicted bin.
    fn next_state(p_state_idx: u8, val_mps: bool, is_lps: bool) -> (u8, bool) {
        const TRANS_IDX_LPS: [u8; 64] = [
            0, 0, 1, 2, 2, 4, 4, 5, 6, 7, 8, 9, 9, 11, 11, 12, 13, 13, 15, 15, 16, 16, 18, 18, 19,
            19, 21, 21, 23, 22, 23, 24, 24, 25, 26, 26, 27, 27, 28, 29, 29, 30, 30, 30, 31, 32, 32,
            33, 33, 33, 34, 34, 35, 35, 35, 36, 36, 36, 37, 37, 37, 38, 38, 63,
        ];
        if is_lps {
            let new_state = TRANS_IDX_LPS[p_state_idx as usize];
            let new_mps = if p_state_idx == 0 { !val_mps } else { val_mps };
            (new_state, new_mps)
        } else {
            let new_state = (p_state_idx + 1).min(62);
            (new_state, val_mps)
        }
    }

    fn renormalize(&mut self) {
        while self.ivl_curr_range < 256 {
            self.ivl_curr_range <<= 1;
            self.ivl_offset <<= 1;
            self.bits_needed += 1;
            if self.bits_needed == 0 {
                self.bits_needed = -8;
                self.ivl_offset |= self.next_byte() as u32;
            }
        }
    }

    /// Decodes a context-coded (regular) bin, §9.3.4.3.2.
    pub fn decode_bin(&mut self, element: contexts::ContextElement, bin: usize) -> bool {
        let idx = self.context_index(element, bin);
        let ctx = self.contexts[idx];

        let q_range_idx = (self.ivl_curr_range >> 6) & 0b11;
        let ivl_lps_range = Self::lps_range(ctx.p_state_idx, q_range_idx);
        self.ivl_curr_range -= ivl_lps_range;

        let bin_val;
        let scaled_range = self.ivl_curr_range << 7;
        if self.ivl_offset >= scaled_range {
            bin_val = !ctx.val_mps;
            self.ivl_offset -= scaled_range;
            self.ivl_curr_range = ivl_lps_range;
        } else {
            bin_val = ctx.val_mps;
        }

        let (p_state_idx, val_mps) = Self::next_state(ctx.p_state_idx, ctx.val_mps, bin_val != ctx.val_mps);
        self.contexts[idx] = ContextState { p_state_idx, val_mps };

        self.renormalize();
        bin_val
    }

    /// Decodes a bypass-coded bin, §9.3.4.3.4.
    pub fn decode_bypass(&mut self) -> bool {
        self.ivl_offset <<= 1;
        self.bits_needed += 1;
        if self.bits_needed >= 0 {
            self.bits_needed = -8;
            self.ivl_offset |= self.next_byte() as u32;
        }

        let scaled_range = self.ivl_curr_range << 7;
        if self.ivl_offset >= scaled_range {
            self.ivl_offset -= scaled_range;
            true
        } else {
            false
        }
    }

    pub fn decode_bypass_bits(&mut self, n: u32) -> u32 {
        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | self.decode_bypass() as u32;
        }
        value
    }

    /// Snapshot for crossing a WPP row boundary (see [`wpp`]).
    pub fn snapshot_contexts(&self) -> wpp::CommonCabacState {
        wpp::CommonCabacState::capture_with_stat_coeff(&self.contexts, self.stat_coeff)
    }

    /// Re-seeds this engine's context table (and, when persistent Rice
    /// adaptation is in use, `stat_coeff`) from a snapshot captured after
    /// the second CTU of the row above, as the next row's first CTU does
    /// before resetting its own arithmetic decoder registers at its
    /// byte-aligned entry point.
    pub fn load_contexts(&mut self, snapshot: &wpp::CommonCabacState) {
        self.contexts = *snapshot.contexts();
        self.stat_coeff = snapshot.stat_coeff();
    }

    pub fn stat_coeff(&self, sb_type: usize) -> u8 {
        self.stat_coeff[sb_type]
    }

    pub fn set_stat_coeff(&mut self, sb_type: usize, value: u8) {
        self.stat_coeff[sb_type] = value;
    }

    /// Decodes the terminating bin, §9.3.4.3.5 (`end_of_slice_segment_flag`,
    /// `end_of_subset_one_bit`, `pcm_flag`).
    pub fn decode_terminate(&mut self) -> bool {
        self.ivl_curr_range -= 2;
        let scaled_range = self.ivl_curr_range << 7;
        if self.ivl_offset >= scaled_range {
            true
        } else {
            self.renormalize();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contexts::ContextElement;

    #[test]
    fn engine_initializes_without_panicking_on_short_input() {
        let data = [0u8; 4];
        let mut engine = CabacEngine::new(&data, 26, SliceType::I, false);
        let _ = engine.decode_bin(ContextElement::SkipFlag, 0);
        let _ = engine.decode_bypass();
        let _ = engine.decode_terminate();
    }

    #[test]
    fn bypass_bits_consumes_requested_width() {
        let data = [0xAAu8; 8];
        let mut engine = CabacEngine::new(&data, 26, SliceType::I, false);
        let _ = engine.decode_bypass_bits(5);
    }

    #[test]
    fn lps_range_table_matches_spec_bounds() {
        // pStateIdx=0 is the least-adapted state: its LPS range is the
        // largest in the table (Table 9-46's first row tops out at 240).
        assert_eq!(RANGE_TAB_LPS[0], [128, 176, 208, 240]);
        // The terminal row collapses to the minimum representable range.
        assert_eq!(RANGE_TAB_LPS[63], [2, 2, 2, 2]);
        for row in RANGE_TAB_LPS {
            for &v in &row {
                assert!(v >= 2 && v <= 240);
            }
        }
    }

    #[test]
    fn init_type_selects_a_different_seed_table() {
        let data = [0u8; 8];
        let i_engine = CabacEngine::new(&data, 26, SliceType::I, false);
        let p_engine = CabacEngine::new(&data, 26, SliceType::P, false);
        // sao_type_idx's seed differs between I (200) and P (185) rows.
        assert_ne!(
            i_engine.contexts[contexts::context_offset(ContextElement::SaoTypeIdx)].p_state_idx,
            p_engine.contexts[contexts::context_offset(ContextElement::SaoTypeIdx)].p_state_idx
        );
    }
}
