//! Active parameter-set storage.
//!
//! VPS/SPS/PPS are signalled out of band from slice data and referenced by
//! id; a decoder instance keeps the most recently parsed set for each id
//! around until it is replaced (spec §7.4.2.1/.2.2/.2.3: ids are reused
//! across a sequence, so installing a new set for an id simply replaces the
//! old one rather than erroring).

use crate::error::{DecoderError, Result};
use crate::h265::pps::PictureParameterSet;
use crate::h265::sps::SequenceParameterSet;
use crate::h265::vps::VideoParameterSet;

pub const MAX_VPS_COUNT: usize = 16;
pub const MAX_SPS_COUNT: usize = 32;
pub const MAX_PPS_COUNT: usize = 256;

/// Holds the VPS/SPS/PPS slots a decoder has seen so far, indexed by id.
#[derive(Debug, Default)]
pub struct ParamSetStore {
    vps: [Option<VideoParameterSet>; MAX_VPS_COUNT],
    sps: [Option<SequenceParameterSet>; MAX_SPS_COUNT],
    pps: Vec<Option<PictureParameterSet>>,
}

/// The VPS/SPS/PPS triple active for a given slice, resolved via
/// `slice_pic_parameter_set_id` -> `pps_seq_parameter_set_id` ->
/// `sps_video_parameter_set_id`.
pub struct ActiveParamSets<'a> {
    pub vps: &'a VideoParameterSet,
    pub sps: &'a SequenceParameterSet,
    pub pps: &'a PictureParameterSet,
}

impl ParamSetStore {
    pub fn new() -> Self {
        Self {
            vps: Default::default(),
            sps: Default::default(),
            pps: vec![None; MAX_PPS_COUNT],
        }
    }

    pub fn install_vps(&mut self, vps: VideoParameterSet) -> Result<()> {
        let id = vps.vps_video_parameter_set_id as usize;
        if id >= MAX_VPS_COUNT {
            return Err(DecoderError::invalid(format!(
                "vps_video_parameter_set_id {id} out of range"
            )));
        }
        tracing::debug!(id, "installing VPS");
        self.vps[id] = Some(vps);
        Ok(())
    }

    pub fn install_sps(&mut self, sps: SequenceParameterSet) -> Result<()> {
        let id = sps.sps_seq_parameter_set_id as usize;
        if id >= MAX_SPS_COUNT {
            return Err(DecoderError::invalid(format!(
                "sps_seq_parameter_set_id {id} out of range"
            )));
        }
        tracing::debug!(id, "installing SPS");
        self.sps[id] = Some(sps);
        Ok(())
    }

    pub fn install_pps(&mut self, pps: PictureParameterSet) -> Result<()> {
        let id = pps.pps_pic_parameter_set_id as usize;
        if id >= MAX_PPS_COUNT {
            return Err(DecoderError::invalid(format!(
                "pps_pic_parameter_set_id {id} out of range"
            )));
        }
        tracing::debug!(id, "installing PPS");
        self.pps[id] = Some(pps);
        Ok(())
    }

    pub fn sps(&self, id: u8) -> Option<&SequenceParameterSet> {
        self.sps.get(id as usize)?.as_ref()
    }

    pub fn pps(&self, id: u8) -> Option<&PictureParameterSet> {
        self.pps.get(id as usize)?.as_ref()
    }

    pub fn vps(&self, id: u8) -> Option<&VideoParameterSet> {
        self.vps.get(id as usize)?.as_ref()
    }

    /// Resolves the active VPS/SPS/PPS triple for `slice_pic_parameter_set_id`.
    pub fn resolve(&self, slice_pic_parameter_set_id: u8) -> Result<ActiveParamSets<'_>> {
        let pps = self.pps(slice_pic_parameter_set_id).ok_or_else(|| {
            DecoderError::invalid(format!(
                "no PPS installed for id {slice_pic_parameter_set_id}"
            ))
        })?;
        let sps = self.sps(pps.pps_seq_parameter_set_id).ok_or_else(|| {
            DecoderError::invalid(format!("no SPS installed for id {}", pps.pps_seq_parameter_set_id))
        })?;
        let vps = self.vps(sps.sps_video_parameter_set_id).ok_or_else(|| {
            DecoderError::invalid(format!("no VPS installed for id {}", sps.sps_video_parameter_set_id))
        })?;
        Ok(ActiveParamSets { vps, sps, pps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_fails_cleanly_without_installed_sets() {
        let store = ParamSetStore::new();
        assert!(store.resolve(0).is_err());
    }
}
