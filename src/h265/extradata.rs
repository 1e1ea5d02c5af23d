//! `HEVCDecoderConfigurationRecord` (ISO/IEC 14496-15, the `hvcC` box) and
//! Annex-B/hvcC framing auto-detection.
//!
//! The core itself doesn't demux containers (spec Non-goals), but a host
//! handing it `hvcC` extradata plus length-prefixed samples needs the
//! `lengthSizeMinusOne` field and the parameter sets carried in the record
//! before the first sample can be parsed.

use std::io::{self, Read};

use crate::error::{DecoderError, Result};
use crate::h265::pps::PictureParameterSet;
use crate::h265::sps::SequenceParameterSet;
use crate::h265::vps::VideoParameterSet;

/// A single `nalArray` entry of an `HEVCDecoderConfigurationRecord`.
#[derive(Debug, Clone)]
pub struct NalArrayEntry {
    pub nal_unit_type: u8,
    pub nal_units: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct HevcDecoderConfigurationRecord {
    pub configuration_version: u8,
    pub general_profile_idc: u8,
    pub general_level_idc: u8,
    /// `lengthSizeMinusOne + 1` is the byte size of the NAL length prefix
    /// used in the sample data this extradata accompanies.
    pub length_size_minus_one: u8,
    pub nal_arrays: Vec<NalArrayEntry>,
}

impl HevcDecoderConfigurationRecord {
    /// Parses a full `hvcC` box payload (not including the box header).
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut fixed = [0u8; 23];
        reader.read_exact(&mut fixed)?;

        let configuration_version = fixed[0];
        if configuration_version != 1 {
            return Err(DecoderError::unsupported(format!(
                "hvcC configurationVersion {configuration_version}"
            )));
        }
        let general_profile_idc = fixed[1] & 0b0001_1111;
        let general_level_idc = fixed[12];
        let length_size_minus_one = fixed[21] & 0b0000_0011;
        let num_of_arrays = fixed[22];

        let mut nal_arrays = Vec::with_capacity(num_of_arrays as usize);
        for _ in 0..num_of_arrays {
            let mut array_header = [0u8; 3];
            reader.read_exact(&mut array_header)?;
            let nal_unit_type = array_header[0] & 0b0011_1111;
            let num_nalus = u16::from_be_bytes([array_header[1], array_header[2]]);

            let mut nal_units = Vec::with_capacity(num_nalus as usize);
            for _ in 0..num_nalus {
                let mut len_buf = [0u8; 2];
                reader.read_exact(&mut len_buf)?;
                let len = u16::from_be_bytes(len_buf) as usize;
                let mut nalu = vec![0u8; len];
                reader.read_exact(&mut nalu)?;
                nal_units.push(nalu);
            }

            nal_arrays.push(NalArrayEntry {
                nal_unit_type,
                nal_units,
            });
        }

        Ok(Self {
            configuration_version,
            general_profile_idc,
            general_level_idc,
            length_size_minus_one,
            nal_arrays,
        })
    }

    pub fn vps_units(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.nal_units_of_type(32)
    }

    pub fn sps_units(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.nal_units_of_type(33)
    }

    pub fn pps_units(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.nal_units_of_type(34)
    }

    fn nal_units_of_type(&self, nal_unit_type: u8) -> impl Iterator<Item = &Vec<u8>> {
        self.nal_arrays
            .iter()
            .filter(move |array| array.nal_unit_type == nal_unit_type)
            .flat_map(|array| array.nal_units.iter())
    }

    /// Parses the embedded parameter sets, skipping their 2-byte NAL unit
    /// header (the array entries store NAL unit bytes including the header).
    pub fn parse_parameter_sets(
        &self,
    ) -> Result<(
        Vec<VideoParameterSet>,
        Vec<SequenceParameterSet>,
        Vec<PictureParameterSet>,
    )> {
        let vps = self
            .vps_units()
            .map(|bytes| {
                let mut reader = io::Cursor::new(&bytes[2..]);
                VideoParameterSet::from_rbsp_reader(&mut reader).map_err(DecoderError::from)
            })
            .collect::<Result<Vec<_>>>()?;

        let sps = self
            .sps_units()
            .map(|bytes| {
                let mut reader = io::Cursor::new(&bytes[2..]);
                SequenceParameterSet::from_rbsp_reader(&mut reader).map_err(DecoderError::from)
            })
            .collect::<Result<Vec<_>>>()?;

        let pps = self
            .pps_units()
            .map(|bytes| {
                let mut reader = io::Cursor::new(&bytes[2..]);
                // `nuh_temporal_id_plus1` of a parameter-set NAL is always 1.
                PictureParameterSet::from_rbsp_reader(&mut reader, 1).map_err(DecoderError::from)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((vps, sps, pps))
    }
}

/// Detects whether `data` looks like Annex-B (leads with a 3- or 4-byte
/// start code) as opposed to length-prefixed (hvcC) framing.
pub fn looks_like_annex_b(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 1]) || data.starts_with(&[0, 0, 0, 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_annex_b_start_codes() {
        assert!(looks_like_annex_b(&[0, 0, 1, 0x40]));
        assert!(looks_like_annex_b(&[0, 0, 0, 1, 0x40]));
        assert!(!looks_like_annex_b(&[0, 0, 0, 12, 0x40]));
    }

    #[test]
    fn rejects_unsupported_configuration_version() {
        let mut bytes = vec![2u8; 23];
        bytes.push(0); // numOfArrays
        let mut reader = io::Cursor::new(bytes);
        assert!(HevcDecoderConfigurationRecord::from_reader(&mut reader).is_err());
    }
}
