
use std::io::{self, Read, Write};

use bitstream_io::{BigEndian, BitReader, BitWriter};
use bitstream_io::{BitRead as _, BitWrite as _};

use crate::h265::vps::VideoParameterSet;
use crate::h265::sps::SequenceParameterSet;
use crate::h265::pps::PictureParameterSet;
use crate::h265::slice::{SliceSegmentContext, SliceSegmentLayer};

#[derive(Debug, Clone)]
pub struct Nalu {
  pub header: NaluHeader,
  pub value: NaluValue,
}

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature="serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NaluHeader {
  /// Specifies the type of RBSP data structure contained in the NAL unit as specified in _Table 7-1_ in the spec.
  pub nal_unit_type: NaluType,
  /// Specifies the identifier of the layer to which a VCL NAL unit belongs or the identifier of a layer to which a non-VCL NAL unit applies.
  pub nuh_layer_id: u8,
  /// Specifies a temporal identifier for the NAL unit.
  pub nuh_temporal_id_plus1: u8,
}

/// See _7.4.2.2 NAL unit header semantics_ in the spec. Covers the full
/// `nal_unit_type` range (0..=63): VCL types 0..=31, non-VCL 32..=63.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature="serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum NaluType {
  TrailN = 0,
  TrailR = 1,
  TsaN = 2,
  TsaR = 3,
  StsaN = 4,
  StsaR = 5,
  RadlN = 6,
  RadlR = 7,
  RaslN = 8,
  RaslR = 9,
  RsvVclN10 = 10,
  RsvVclR11 = 11,
  RsvVclN12 = 12,
  RsvVclR13 = 13,
  RsvVclN14 = 14,
  RsvVclR15 = 15,
  /// `BLA_W_LP`. _Coded slice segment of a BLA picture_.
  ///
  /// A BLA(Broken Link Access) picture is an _IRAP picture_ for which each _VCL NAL unit_ has `nal_unit_type` equal to `BLA_W_LP`, `BLA_W_RADL`, or `BLA_N_LP`.
  BlaWLp = 16,
  BlaWRadl = 17,
  BlaNLp = 18,
  /// `IDR_W_RADL`. _Coded slice segment of an IDR picture_.
  ///
  /// An IDR(Instantaneous Decoding Refresh) picture is an _IRAP picture_ for which each _VCL NAL unit_ has `nal_unit_type` equal to `IDR_W_RADL` or `IDR_N_LP`.
  IdrWRadl = 19,
  IdrNLp = 20,
  /// `CRA_NUT`. _Coded slice segment of a CRA picture_.
  CraNut = 21,
  RsvIrapVcl22 = 22,
  RsvIrapVcl23 = 23,
  RsvVcl24 = 24,
  RsvVcl25 = 25,
  RsvVcl26 = 26,
  RsvVcl27 = 27,
  RsvVcl28 = 28,
  RsvVcl29 = 29,
  RsvVcl30 = 30,
  RsvVcl31 = 31,
  /// `VPS_NUT`. _Video parameter set_.
  VpsNut = 32,
  /// `SPS_NUT`. _Sequence parameter set_.
  SpsNut = 33,
  /// `PPS_NUT`. _Picture parameter set_.
  PpsNut = 34,
  /// `AUD_NUT`. _Access unit delimiter_.
  AudNut = 35,
  /// `EOS_NUT`. _End of sequence_.
  EosNut = 36,
  /// `EOB_NUT`. _End of bitstream_.
  EobNut = 37,
  /// `FD_NUT`. _Filler data_.
  FdNut = 38,
  /// `PREFIX_SEI_NUT`. _Supplemental enhancement information_.
  SeiPrefix = 39,
  /// `SUFFIX_SEI_NUT`. _Supplemental enhancement information_.
  SeiSuffix = 40,
  RsvNvcl41 = 41,
  RsvNvcl42 = 42,
  RsvNvcl43 = 43,
  RsvNvcl44 = 44,
  RsvNvcl45 = 45,
  RsvNvcl46 = 46,
  RsvNvcl47 = 47,
  /// Any unspecified or otherwise unhandled value in `0..=63`. The core
  /// splits and tags such NALs but never interprets their payload.
  UnspecN(u8),
}

#[derive(Debug, Clone)]
pub enum NaluValue {
  CodedSliceSegment(SliceSegmentLayer),
  AudNut(AccessUnitDelimiter),
  VpsNut(VideoParameterSet),
  SpsNut(SequenceParameterSet),
  PpsNut(PictureParameterSet),
  /// EOS, EOB, FD, SEI, and reserved/unspecified NALs: split out but not
  /// interpreted (spec §1 scope).
  Opaque,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NaluValueContext {
  pub slice_segment_context: Option<SliceSegmentContext>,
}

/// See `access_unit_delimiter_rbsp()` in _7.3.2.5 Access unit delimiter RBSP syntax_ in the spec.
#[derive(Debug, Clone, Copy)]
pub struct AccessUnitDelimiter {
  pub pic_type: PicType,
}

/// Indicates the `slice_type` values that may be present in all slices of the _coded pictures_ in the access unit contained in the _access unit delimiter_ NAL unit.
///
/// See _7.4.3.5 Access unit delimiter RBSP semantics_ in the spec.
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum PicType {
  I = 0,
  PI = 1,
  BPI = 2,
}

impl NaluType {
  pub fn as_u8(&self) -> u8 {
    match *self {
      Self::TrailN => 0, Self::TrailR => 1, Self::TsaN => 2, Self::TsaR => 3,
      Self::StsaN => 4, Self::StsaR => 5, Self::RadlN => 6, Self::RadlR => 7,
      Self::RaslN => 8, Self::RaslR => 9, Self::RsvVclN10 => 10, Self::RsvVclR11 => 11,
      Self::RsvVclN12 => 12, Self::RsvVclR13 => 13, Self::RsvVclN14 => 14, Self::RsvVclR15 => 15,
      Self::BlaWLp => 16, Self::BlaWRadl => 17, Self::BlaNLp => 18, Self::IdrWRadl => 19,
      Self::IdrNLp => 20, Self::CraNut => 21, Self::RsvIrapVcl22 => 22, Self::RsvIrapVcl23 => 23,
      Self::RsvVcl24 => 24, Self::RsvVcl25 => 25, Self::RsvVcl26 => 26, Self::RsvVcl27 => 27,
      Self::RsvVcl28 => 28, Self::RsvVcl29 => 29, Self::RsvVcl30 => 30, Self::RsvVcl31 => 31,
      Self::VpsNut => 32, Self::SpsNut => 33, Self::PpsNut => 34, Self::AudNut => 35,
      Self::EosNut => 36, Self::EobNut => 37, Self::FdNut => 38, Self::SeiPrefix => 39,
      Self::SeiSuffix => 40, Self::RsvNvcl41 => 41, Self::RsvNvcl42 => 42, Self::RsvNvcl43 => 43,
      Self::RsvNvcl44 => 44, Self::RsvNvcl45 => 45, Self::RsvNvcl46 => 46, Self::RsvNvcl47 => 47,
      Self::UnspecN(v) => v,
    }
  }

  /// IRAP(Intra Random Access Point) type ?
  pub fn is_irap(&self) -> bool {
    matches!(self.as_u8(), 16..=23)
  }

  /// RADL(Random Access Decodable Leading) type ?
  pub fn is_radl(&self) -> bool {
    matches!(self, Self::RadlN | Self::RadlR)
  }

  /// RASL(Random Access Skipped Leading) type ?
  pub fn is_rasl(&self) -> bool {
    matches!(self, Self::RaslN | Self::RaslR)
  }

  /// BLA(Broken Link Access) type ?
  pub fn is_bla(&self) -> bool {
    matches!(self, Self::BlaWLp | Self::BlaWRadl | Self::BlaNLp)
  }

  /// IDR(Instantaneous Decoding Refresh) type ?
  pub fn is_idr(&self) -> bool {
    matches!(self, Self::IdrWRadl | Self::IdrNLp)
  }

  pub fn is_cra(&self) -> bool {
    matches!(self, Self::CraNut)
  }

  pub fn is_reference(&self) -> bool {
    let v = self.as_u8();
    if v < 16 {
      v & 1 == 1
    }
    else {
      v <= 31
    }
  }

  pub fn is_coded_slice_segment(&self) -> bool {
    self.as_u8() <= 31
  }
}

impl Nalu {
  pub fn from_bytes(bytes: &[u8], nalue_value_context: NaluValueContext) -> Result<Self, io::Error> {
    let mut reader = io::Cursor::new(bytes);
    Self::from_reader(&mut reader, bytes.len(), nalue_value_context)
  }

  pub fn from_reader<R: Read>(reader: &mut R, length: usize, nalue_value_context: NaluValueContext) -> Result<Self, io::Error> {
    let header = NaluHeader::from_reader(reader)?;

    let value_length = length - 2;
    let value = NaluValue::from_ebsp_reader(reader, header, value_length, nalue_value_context)?;

    Ok(Self {
      header,
      value,
    })
  }
}

impl NaluHeader {
  /// Reads exactly 2 bytes.
  pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self, io::Error> {
    let mut bit_reader = BitReader::endian(reader, BigEndian);

    let forbidden_zero_bit = bit_reader.read_bit()?;
    if forbidden_zero_bit {
      return Err(io::Error::new(io::ErrorKind::InvalidData, "forbidden_zero_bit must be 0"));
    }
    let nal_unit_type: u8 = bit_reader.read(6)?;
    let nuh_layer_id: u8 = bit_reader.read(6)?;
    let nuh_temporal_id_plus1: u8 = bit_reader.read(3)?;

    if nuh_temporal_id_plus1 == 0 {
      return Err(io::Error::new(io::ErrorKind::InvalidData, "nuh_temporal_id_plus1 must not be 0"));
    }

    Ok(Self {
      nal_unit_type: nal_unit_type.into(),
      nuh_layer_id,
      nuh_temporal_id_plus1,
    })
  }

  pub fn to_writer<W: Write>(&self, writer: &mut W) -> Result<(), io::Error> {
    let mut bit_writer = BitWriter::endian(writer, BigEndian);

    bit_writer.write_bit(false)?; // `forbidden_zero_bit`
    bit_writer.write(6, self.nal_unit_type.as_u8())?;
    bit_writer.write(6, self.nuh_layer_id)?;
    bit_writer.write(3, self.nuh_temporal_id_plus1)?;
    Ok(())
  }
}

impl From<u8> for NaluType {
  fn from(value: u8) -> Self {
    match value {
      0 => Self::TrailN, 1 => Self::TrailR, 2 => Self::TsaN, 3 => Self::TsaR,
      4 => Self::StsaN, 5 => Self::StsaR, 6 => Self::RadlN, 7 => Self::RadlR,
      8 => Self::RaslN, 9 => Self::RaslR, 10 => Self::RsvVclN10, 11 => Self::RsvVclR11,
      12 => Self::RsvVclN12, 13 => Self::RsvVclR13, 14 => Self::RsvVclN14, 15 => Self::RsvVclR15,
      16 => Self::BlaWLp, 17 => Self::BlaWRadl, 18 => Self::BlaNLp, 19 => Self::IdrWRadl,
      20 => Self::IdrNLp, 21 => Self::CraNut, 22 => Self::RsvIrapVcl22, 23 => Self::RsvIrapVcl23,
      24 => Self::RsvVcl24, 25 => Self::RsvVcl25, 26 => Self::RsvVcl26, 27 => Self::RsvVcl27,
      28 => Self::RsvVcl28, 29 => Self::RsvVcl29, 30 => Self::RsvVcl30, 31 => Self::RsvVcl31,
      32 => Self::VpsNut, 33 => Self::SpsNut, 34 => Self::PpsNut, 35 => Self::AudNut,
      36 => Self::EosNut, 37 => Self::EobNut, 38 => Self::FdNut, 39 => Self::SeiPrefix,
      40 => Self::SeiSuffix, 41 => Self::RsvNvcl41, 42 => Self::RsvNvcl42, 43 => Self::RsvNvcl43,
      44 => Self::RsvNvcl44, 45 => Self::RsvNvcl45, 46 => Self::RsvNvcl46, 47 => Self::RsvNvcl47,
      v => Self::UnspecN(v),
    }
  }
}

impl NaluValue {
  pub fn as_coded_slice_segment(&self) -> Option<&SliceSegmentLayer> {
    match self {
      Self::CodedSliceSegment(value) => Some(value),
      _ => None,
    }
  }

  pub fn as_vps_nut(&self) -> Option<&VideoParameterSet> {
    match self {
      Self::VpsNut(value) => Some(value),
      _ => None,
    }
  }

  pub fn as_sps_nut(&self) -> Option<&SequenceParameterSet> {
    match self {
      Self::SpsNut(value) => Some(value),
      _ => None,
    }
  }

  pub fn as_pps_nut(&self) -> Option<&PictureParameterSet> {
    match self {
      Self::PpsNut(value) => Some(value),
      _ => None,
    }
  }

  /// Reads from _EBSP(Encapsulated Byte Sequence Payload)_.
  ///
  /// Reads exactly `value_length` bytes.
  pub fn from_ebsp_reader<R: Read>(
    reader: &mut R,
    nalu_header: NaluHeader,
    value_length: usize,
    nalu_value_context: NaluValueContext,
  ) -> Result<Self, io::Error> {
    let ebsp = {
      let mut ebsp = vec![0u8; value_length];
      reader.read_exact(&mut ebsp)?;
      ebsp
    };

    let rbsp = crate::base::ebsp_to_rbsp(&ebsp);
    let rbsp_length = rbsp.len();

    let mut rbsp_reader = io::Cursor::new(rbsp);
    let rbsp_reader = &mut rbsp_reader;

    if nalu_header.nal_unit_type.is_coded_slice_segment() {
      let value = SliceSegmentLayer::from_rbsp_reader(
        rbsp_reader,
        rbsp_length,
        nalu_header.nal_unit_type,
        nalu_value_context.slice_segment_context
          .expect("SliceSegmentContext is required for coded slice segments"),
      )?;

      return Ok(Self::CodedSliceSegment(value));
    }

    match nalu_header.nal_unit_type {
      NaluType::VpsNut => {
        let value = VideoParameterSet::from_rbsp_reader(rbsp_reader)?;
        Ok(Self::VpsNut(value))
      },
      NaluType::SpsNut => {
        let value = SequenceParameterSet::from_rbsp_reader(rbsp_reader)?;
        Ok(Self::SpsNut(value))
      },
      NaluType::PpsNut => {
        let value = PictureParameterSet::from_rbsp_reader(rbsp_reader, nalu_header.nuh_temporal_id_plus1)?;
        Ok(Self::PpsNut(value))
      },
      NaluType::AudNut => {
        let value = AccessUnitDelimiter::from_rbsp_reader(rbsp_reader)?;
        Ok(Self::AudNut(value))
      },
      // EOS/EOB/FD/SEI/reserved/unspecified: split but not interpreted.
      _ => Ok(Self::Opaque),
    }
  }
}

impl From<u8> for PicType {
  fn from(value: u8) -> Self {
    match value {
      0 => Self::I,
      1 => Self::PI,
      _ => Self::BPI,
    }
  }
}

impl AccessUnitDelimiter {
  /// Reads exactly 1 byte.
  pub fn from_rbsp_reader<R: Read>(reader: &mut R) -> Result<Self, io::Error> {
    let mut bit_reader = BitReader::endian(reader, BigEndian);

    let pic_type: u8 = bit_reader.read(3)?;

    // `rbsp_trailing_bits()`

    Ok(Self {
      pic_type: pic_type.into(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_header_fields() {
    // forbidden_zero=0, nal_unit_type=32 (VPS), layer_id=0, temporal_id_plus1=1
    let bytes = [0b0100_0000u8, 0b0000_0001];
    let mut reader = io::Cursor::new(bytes);
    let header = NaluHeader::from_reader(&mut reader).unwrap();
    assert_eq!(header.nal_unit_type, NaluType::VpsNut);
    assert_eq!(header.nuh_layer_id, 0);
    assert_eq!(header.nuh_temporal_id_plus1, 1);
  }

  #[test]
  fn rejects_zero_temporal_id_plus1() {
    let bytes = [0b0100_0000u8, 0b0000_0000];
    let mut reader = io::Cursor::new(bytes);
    assert!(NaluHeader::from_reader(&mut reader).is_err());
  }

  #[test]
  fn irap_classification_matches_type_range() {
    assert!(NaluType::IdrWRadl.is_irap());
    assert!(NaluType::CraNut.is_irap());
    assert!(!NaluType::TrailR.is_irap());
  }

  #[test]
  fn unspecified_range_round_trips() {
    let t: NaluType = 50u8.into();
    assert_eq!(t.as_u8(), 50);
    assert!(!t.is_coded_slice_segment());
  }
}
