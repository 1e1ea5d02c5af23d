//! HEVC (H.265) bitstream core: NAL splitting, parameter-set/slice-header
//! parsing, CABAC entropy decoding, RPS tracking, and DPB management.

pub mod bitreader;
pub mod bytestream;
pub mod cabac;
pub mod dpb;
pub mod driver;
pub mod extradata;
pub mod frame;
pub mod hrd;
pub mod nal_splitter;
pub mod nalu;
pub mod nalu_ref;
pub mod param_sets;
pub mod poc;
pub mod pps;
pub mod progress;
pub mod ptl;
pub mod rps;
pub mod rps_tracker;
pub mod scaling_list;
pub mod slice;
pub mod sps;
pub mod syntax;
pub mod vps;

#[cfg(test)]
mod tests {
  use super::*;

  use std::io;

  use nalu::NaluValueContext;
  use slice::SliceSegmentContext;

  use bytestream::{LengthPrefixedByteStreamNaluReader, LengthPrefixedByteStreamNaluRefReader};

  /// Builds a minimal length-prefixed (4-byte length) stream holding a
  /// single access-unit-delimiter NAL unit, so the reader round-trip can be
  /// exercised without an external bitstream fixture.
  fn sample_length_prefixed_aud_stream() -> Vec<u8> {
    // NAL unit header: forbidden_zero=0, nal_unit_type=35 (AUD_NUT),
    // nuh_layer_id=0, nuh_temporal_id_plus1=1; payload: pic_type=2 (BPI).
    let nal_unit = [0b0100_0110u8, 0b0000_0001, 0b0100_0000];
    let mut stream = Vec::new();
    stream.extend_from_slice(&(nal_unit.len() as u32).to_be_bytes());
    stream.extend_from_slice(&nal_unit);
    stream
  }

  #[test]
  fn read_nalus() {
    let bytes = sample_length_prefixed_aud_stream();
    let nalu_value_context = make_nalu_value_context();

    let reader = io::Cursor::new(bytes);
    let mut reader =
      LengthPrefixedByteStreamNaluReader::with_length_size_minus_one(3, reader, nalu_value_context);

    let nalus = reader.read_contents_until_eof().unwrap();
    assert_eq!(nalus.len(), 1);
  }

  #[test]
  fn read_nalu_refs() {
    let bytes = sample_length_prefixed_aud_stream();
    let nalu_value_context = make_nalu_value_context();

    let reader = io::Cursor::new(bytes);
    let mut reader =
      LengthPrefixedByteStreamNaluRefReader::with_length_size_minus_one(3, reader, nalu_value_context);

    let nalu_refs = reader.read_contents_until_eof().unwrap();
    assert_eq!(nalu_refs.len(), 1);
  }

  fn make_nalu_value_context() -> NaluValueContext {
    NaluValueContext {
      slice_segment_context: Some(SliceSegmentContext {
        dependent_slice_segments_enabled_flag: true,
        pic_width_in_luma_samples: 3840,
        pic_height_in_luma_samples: 2160,
        log2_min_luma_coding_block_size_minus3: 0,
        log2_diff_max_min_luma_coding_block_size: 3,
        num_extra_slice_header_bits: 0,
        output_flag_present_flag: false,
        separate_colour_plane_flag: false,
        log2_max_pic_order_cnt_lsb_minus4: 4,
        num_short_term_ref_pic_sets: 3,
        ..Default::default()
      }),
    }
  }
}
