//! Decoded Picture Buffer: allocation, reference marking, and output
//! bumping.
//!
//! Grounded in `libavcodec/hevc/refs.c`: `ff_hevc_set_new_ref` (alloc +
//! install as the picture being decoded), `unref_missing_refs`/
//! `ff_hevc_clear_refs` (drop pictures no longer referenced by any RPS
//! category), and the bumping loop in `ff_hevc_output_frames` (emit the
//! lowest-POC `OUTPUT_PENDING` picture once capacity or reorder limits are
//! exceeded).

use crate::error::{DecoderError, Result};
use crate::h265::frame::{FrameFlags, HevcFrame};
use crate::h265::rps_tracker::RefPicSetPocs;

pub const MAX_DPB_SIZE: usize = 32;

#[derive(Debug, Default)]
pub struct Dpb {
    frames: Vec<HevcFrame>,
    sequence: u64,
}

impl Dpb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_by_poc(&self, poc: i32) -> Option<&HevcFrame> {
        self.frames
            .iter()
            .find(|f| f.poc == poc && f.sequence == self.sequence)
    }

    pub fn contains_poc(&self, poc: i32) -> bool {
        self.frame_by_poc(poc).is_some()
    }

    /// `ff_hevc_flush_dpb`: drop every held picture and bump the CVS
    /// sequence counter, as done at an IDR with
    /// `no_output_of_prior_pics_flag == true`.
    pub fn flush(&mut self) {
        self.frames.clear();
        self.sequence += 1;
    }

    /// Allocates a slot for the picture currently being decoded
    /// (`ff_hevc_set_new_ref`). Errors if the DPB is already at capacity
    /// with no slot bumpable.
    pub fn alloc_frame(&mut self, frame: HevcFrame) -> Result<()> {
        if self.frames.len() >= MAX_DPB_SIZE {
            return Err(DecoderError::OutOfMemory(format!(
                "DPB at capacity ({MAX_DPB_SIZE})"
            )));
        }
        self.frames.push(frame);
        Ok(())
    }

    /// `ff_hevc_clear_refs` + `unref_missing_refs`: unmark every reference
    /// not present in the current picture's RPS, and drop any frame that
    /// ends up neither a reference nor output-pending.
    pub fn update_refs(&mut self, rps: &RefPicSetPocs) {
        let kept: Vec<i32> = rps.all_pocs().collect();

        for frame in &mut self.frames {
            if !kept.contains(&frame.poc) {
                frame.unref();
            }
        }

        self.frames
            .retain(|f| f.is_reference() || f.is_output_pending());
    }

    pub fn mark_short_term(&mut self, poc: i32) {
        if let Some(frame) = self.frames.iter_mut().find(|f| f.poc == poc) {
            frame.mark_short_term();
        }
    }

    pub fn mark_long_term(&mut self, poc: i32) {
        if let Some(frame) = self.frames.iter_mut().find(|f| f.poc == poc) {
            frame.mark_long_term();
        }
    }

    /// Bumps (marks no longer output-pending and returns, lowest POC first)
    /// pictures until the DPB has at least `target_free_slots` beyond
    /// `max_dec_pic_buffering`, or `max_num_reorder_pics` worth of pending
    /// output pictures remain, whichever the caller is enforcing.
    pub fn bump_ready_frames(&mut self, max_num_reorder_pics: usize) -> Vec<i32> {
        let mut pending: Vec<usize> = self
            .frames
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_output_pending())
            .map(|(i, _)| i)
            .collect();
        pending.sort_by_key(|&i| self.frames[i].poc);

        let mut bumped = Vec::new();
        while pending.len() > max_num_reorder_pics {
            let idx = pending.remove(0);
            self.frames[idx].flags.remove(FrameFlags::OUTPUT_PENDING);
            bumped.push(self.frames[idx].poc);
        }

        self.frames
            .retain(|f| f.is_reference() || f.is_output_pending());

        bumped
    }

    /// Drains every remaining output-pending picture, lowest POC first
    /// (end-of-stream flush).
    pub fn drain_output(&mut self) -> Vec<i32> {
        let mut pending: Vec<i32> = self
            .frames
            .iter()
            .filter(|f| f.is_output_pending())
            .map(|f| f.poc)
            .collect();
        pending.sort_unstable();

        for frame in &mut self.frames {
            frame.flags.remove(FrameFlags::OUTPUT_PENDING);
        }
        self.frames.retain(|f| f.is_reference());

        pending
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(poc: i32) -> HevcFrame {
        HevcFrame {
            poc,
            flags: FrameFlags::OUTPUT_PENDING,
            sequence: 0,
            sps_id: 0,
            pps_id: 0,
        }
    }

    #[test]
    fn bumping_respects_reorder_window() {
        let mut dpb = Dpb::new();
        for poc in [0, 4, 2, 1, 3] {
            dpb.alloc_frame(frame(poc)).unwrap();
        }
        let bumped = dpb.bump_ready_frames(2);
        assert_eq!(bumped, vec![0, 1, 2]);
    }

    #[test]
    fn drain_output_empties_pending_queue_in_poc_order() {
        let mut dpb = Dpb::new();
        for poc in [5, 1, 3] {
            dpb.alloc_frame(frame(poc)).unwrap();
        }
        assert_eq!(dpb.drain_output(), vec![1, 3, 5]);
        assert!(dpb.is_empty());
    }

    #[test]
    fn alloc_fails_when_full() {
        let mut dpb = Dpb::new();
        for poc in 0..MAX_DPB_SIZE as i32 {
            let mut f = frame(poc);
            f.mark_short_term();
            dpb.alloc_frame(f).unwrap();
        }
        assert!(dpb.alloc_frame(frame(999)).is_err());
    }
}
