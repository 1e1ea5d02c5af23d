//! Wavefront Parallel Processing CABAC state hand-off.
//!
//! When `entropy_coding_sync_enabled_flag` is set (PPS), the CABAC context
//! state after decoding the second CTU of each CTB row is the state the
//! *next* row's first CTU synchronizes its own table against (spec's WPP
//! description, §"Wavefront Parallel Processing" in the design). This is
//! the minimal snapshot crossing a row-worker boundary: just the context
//! probability table, not the arithmetic decoder registers (those reset
//! per row at the row's own byte-aligned entry point).

use super::contexts::TOTAL_CONTEXTS;
use super::ContextState;

/// A snapshot of every context variable's probability state, taken after
/// the second CTU of a row and consumed by the row below it.
#[derive(Debug, Clone, Copy)]
pub struct CommonCabacState {
    contexts: [ContextState; TOTAL_CONTEXTS],
    stat_coeff: [u8; 4],
}

impl CommonCabacState {
    pub fn capture(contexts: &[ContextState; TOTAL_CONTEXTS]) -> Self {
        Self {
            contexts: *contexts,
            stat_coeff: [0; 4],
        }
    }

    pub fn capture_with_stat_coeff(
        contexts: &[ContextState; TOTAL_CONTEXTS],
        stat_coeff: [u8; 4],
    ) -> Self {
        Self {
            contexts: *contexts,
            stat_coeff,
        }
    }

    pub fn contexts(&self) -> &[ContextState; TOTAL_CONTEXTS] {
        &self.contexts
    }

    pub fn stat_coeff(&self) -> [u8; 4] {
        self.stat_coeff
    }
}
