//! DPB picture slot.
//!
//! Grounded in `libavcodec/hevc/refs.c`'s `HEVCFrame` (flags bitset, POC,
//! sequence/reference bookkeeping) but holding only the core's concerns —
//! no pixel buffers, since pixel storage/DSP is out of scope (spec §6).

use crate::h265::pps::PictureParameterSet;
use crate::h265::sps::SequenceParameterSet;

bitflags::bitflags! {
    /// Per-picture DPB state, mirroring `HEVC_FRAME_FLAG_*` in refs.c.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u8 {
        const OUTPUT_PENDING = 0b0000_0001;
        const SHORT_REF      = 0b0000_0010;
        const LONG_REF       = 0b0000_0100;
        const BUMPING        = 0b0000_1000;
        const CORRUPT        = 0b0001_0000;
        const UNAVAILABLE    = 0b0010_0000;
    }
}

/// A decoded (or in-flight) picture tracked by the [`crate::h265::dpb::Dpb`].
#[derive(Debug, Clone)]
pub struct HevcFrame {
    pub poc: i32,
    pub flags: FrameFlags,
    /// Sequence number of the CVS this picture belongs to; used to detect
    /// POC wraparound/reset across an IDR.
    pub sequence: u64,
    pub sps_id: u8,
    pub pps_id: u8,
}

impl HevcFrame {
    pub fn new(poc: i32, sequence: u64, sps: &SequenceParameterSet, pps: &PictureParameterSet) -> Self {
        Self {
            poc,
            flags: FrameFlags::OUTPUT_PENDING,
            sequence,
            sps_id: sps.sps_seq_parameter_set_id,
            pps_id: pps.pps_pic_parameter_set_id,
        }
    }

    pub fn is_output_pending(&self) -> bool {
        self.flags.contains(FrameFlags::OUTPUT_PENDING)
    }

    pub fn is_reference(&self) -> bool {
        self.flags
            .intersects(FrameFlags::SHORT_REF | FrameFlags::LONG_REF)
    }

    pub fn mark_short_term(&mut self) {
        self.flags.remove(FrameFlags::LONG_REF);
        self.flags.insert(FrameFlags::SHORT_REF);
    }

    pub fn mark_long_term(&mut self) {
        self.flags.remove(FrameFlags::SHORT_REF);
        self.flags.insert(FrameFlags::LONG_REF);
    }

    pub fn unref(&mut self) {
        self.flags.remove(FrameFlags::SHORT_REF | FrameFlags::LONG_REF);
    }
}
