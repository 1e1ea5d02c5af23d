//! Core HEVC (H.265) bitstream decoder.
//!
//! The external surface (§6) is intentionally narrow: hand the decoder
//! extradata and packets, pull decoded-picture metadata back out in display
//! order. Pixel reconstruction is an external collaborator (the `HevcDsp`
//! table in [`dsp`]) — `Frame` here carries everything a host needs to
//! locate and caption a picture without this crate owning its samples.

pub mod base;
pub mod config;
pub mod dsp;
pub mod error;
pub mod h265;

pub use config::{DecoderConfig, StdCompliance};
pub use error::{DecoderError, Result};

use std::collections::{HashMap, VecDeque};

use h265::driver::{DecodedPicture, Driver};
use h265::extradata::{looks_like_annex_b, HevcDecoderConfigurationRecord};
use h265::nal_splitter;
use h265::nalu::{Nalu, NaluValue, NaluValueContext};
use h265::slice::SliceSegmentContext;
use h265::sps::SequenceParameterSet;

/// How NAL units inside a pushed packet are delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    AnnexB,
    LengthPrefixed { length_size: u8 },
}

/// A decoded picture's display crop rectangle, in luma samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropRect {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// Decoded-picture metadata handed back by [`Decoder::pull_frame`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub poc: i32,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    /// Set when this picture (or a reference it depends on) failed to
    /// decode and `DecoderConfig::output_corrupt` let it through anyway.
    pub corrupt: bool,
    pub width: u32,
    pub height: u32,
    pub crop: CropRect,
    pub bit_depth_luma: u8,
    pub bit_depth_chroma: u8,
}

#[derive(Debug, Clone, Copy)]
struct PictureMeta {
    pts: Option<i64>,
    dts: Option<i64>,
    width: u32,
    height: u32,
    crop: CropRect,
    bit_depth_luma: u8,
    bit_depth_chroma: u8,
}

/// A single open decode session (§6). Not `Clone`/`Send` by design: the
/// DPB and in-flight CABAC state are sequential per the concurrency model
/// (§5) — a host wanting parallel streams opens one `Decoder` per stream.
#[derive(Debug)]
pub struct Decoder {
    driver: Driver,
    framing: Framing,
    slice_segment_context: Option<SliceSegmentContext>,
    last_sps: Option<SequenceParameterSet>,
    last_pps: Option<h265::pps::PictureParameterSet>,
    pending: VecDeque<Frame>,
    picture_meta: HashMap<i32, PictureMeta>,
    closed: bool,
}

impl Decoder {
    /// Parses `hvcC` extradata when present (installing its embedded
    /// VPS/SPS/PPS and recording the NAL length size used by subsequent
    /// packets), or treats an empty/Annex-B-looking extradata as a
    /// bare Annex-B stream (§6: "Annex-B streams are auto-detected").
    pub fn open(extradata: &[u8], config: DecoderConfig) -> Result<Self> {
        let mut decoder = Self {
            driver: Driver::new(config),
            framing: Framing::AnnexB,
            slice_segment_context: None,
            last_sps: None,
            last_pps: None,
            pending: VecDeque::new(),
            picture_meta: HashMap::new(),
            closed: false,
        };

        if extradata.is_empty() || looks_like_annex_b(extradata) {
            decoder.framing = Framing::AnnexB;
            return Ok(decoder);
        }

        let mut reader = std::io::Cursor::new(extradata);
        let record = HevcDecoderConfigurationRecord::from_reader(&mut reader)?;
        decoder.framing = Framing::LengthPrefixed {
            length_size: record.length_size_minus_one + 1,
        };

        let (vpss, spss, ppss) = record.parse_parameter_sets()?;
        for vps in vpss {
            decoder
                .driver
                .handle_nalu(&synthetic_param_set_nalu(NaluValue::VpsNut(vps)))?;
        }
        for sps in spss {
            decoder.last_sps = Some(sps.clone());
            decoder.refresh_slice_segment_context();
            decoder
                .driver
                .handle_nalu(&synthetic_param_set_nalu(NaluValue::SpsNut(sps)))?;
        }
        for pps in ppss {
            decoder.last_pps = Some(pps.clone());
            decoder.refresh_slice_segment_context();
            decoder
                .driver
                .handle_nalu(&synthetic_param_set_nalu(NaluValue::PpsNut(pps)))?;
        }

        Ok(decoder)
    }

    fn refresh_slice_segment_context(&mut self) {
        if let (Some(sps), Some(pps)) = (&self.last_sps, &self.last_pps) {
            self.slice_segment_context = Some(SliceSegmentContext::from_param_sets(sps, pps));
        }
    }

    /// Splits `data` into NAL units per the framing established at `open`,
    /// and feeds each one through the driver, collecting any pictures the
    /// DPB bumps along the way into the output queue.
    pub fn push_packet(&mut self, data: &[u8], pts: Option<i64>, dts: Option<i64>) -> Result<()> {
        if self.closed {
            return Err(DecoderError::Cancelled);
        }

        let ranges: Vec<(usize, usize)> = match self.framing {
            Framing::AnnexB => nal_splitter::split_annex_b(data)
                .into_iter()
                .map(|r| (r.start, r.end))
                .collect(),
            Framing::LengthPrefixed { length_size } => split_length_prefixed(data, length_size as usize),
        };

        for (start, end) in ranges {
            let bytes = &data[start..end];
            let ctx = NaluValueContext {
                slice_segment_context: self.slice_segment_context,
            };
            let nalu = match Nalu::from_bytes(bytes, ctx) {
                Ok(nalu) => nalu,
                Err(err) => {
                    tracing::warn!(error = %err, "dropping unparsable NAL unit");
                    continue;
                }
            };
            // (`Nalu::from_bytes` reports `io::Error`; a malformed NAL is a
            // per-NAL parse failure, not one that should abort the stream.)
            self.ingest_nalu(&nalu, pts, dts)?;
        }

        Ok(())
    }

    fn ingest_nalu(&mut self, nalu: &Nalu, pts: Option<i64>, dts: Option<i64>) -> Result<()> {
        let starts_new_picture = matches!(
            &nalu.value,
            NaluValue::CodedSliceSegment(layer) if layer.header.first_slice_segment_in_pic_flag
        );

        match &nalu.value {
            NaluValue::SpsNut(sps) => {
                self.last_sps = Some(sps.clone());
                self.refresh_slice_segment_context();
            }
            NaluValue::PpsNut(pps) => {
                self.last_pps = Some(pps.clone());
                self.refresh_slice_segment_context();
            }
            _ => {}
        }

        let bumped = self.driver.handle_nalu(nalu)?;

        if starts_new_picture {
            if let Some(poc) = self.driver.current_poc() {
                let sps = self.driver.current_frame_sps().cloned();
                self.picture_meta.entry(poc).or_insert_with(|| {
                    let (width, height, crop, bit_depth_luma, bit_depth_chroma) = sps
                        .map(|sps| picture_geometry(&sps, self.driver.config().apply_default_display_window))
                        .unwrap_or((0, 0, CropRect::default(), 8, 8));
                    PictureMeta {
                        pts,
                        dts,
                        width,
                        height,
                        crop,
                        bit_depth_luma,
                        bit_depth_chroma,
                    }
                });
            }
        }

        for decoded in bumped {
            self.pending.push_back(self.build_frame(decoded));
        }

        Ok(())
    }

    fn build_frame(&mut self, decoded: DecodedPicture) -> Frame {
        let meta = self.picture_meta.remove(&decoded.poc).unwrap_or(PictureMeta {
            pts: None,
            dts: None,
            width: 0,
            height: 0,
            crop: CropRect::default(),
            bit_depth_luma: 8,
            bit_depth_chroma: 8,
        });

        Frame {
            poc: decoded.poc,
            pts: meta.pts,
            dts: meta.dts,
            corrupt: decoded.corrupt,
            width: meta.width,
            height: meta.height,
            crop: meta.crop,
            bit_depth_luma: meta.bit_depth_luma,
            bit_depth_chroma: meta.bit_depth_chroma,
        }
    }

    /// Returns the next frame in display order, if the DPB has bumped one.
    pub fn pull_frame(&mut self) -> Option<Frame> {
        self.pending.pop_front()
    }

    /// End of stream: finalises any in-flight picture and drains the DPB.
    pub fn flush(&mut self) -> Result<()> {
        let drained = self.driver.flush()?;
        for decoded in drained {
            self.pending.push_back(self.build_frame(decoded));
        }
        Ok(())
    }

    /// Never fails (§7: "the decoder never aborts the process; `close()`
    /// always succeeds"); subsequent `push_packet` calls return `Cancelled`.
    pub fn close(&mut self) {
        self.closed = true;
        self.pending.clear();
    }
}

/// Wraps an already-parsed parameter set as a `Nalu` so it can be fed
/// through [`Driver::handle_nalu`] the same way a freshly-parsed extradata
/// or in-band parameter set NAL would be. The header fields (layer/temporal
/// id) don't affect parameter-set installation, so placeholder values are
/// fine here.
fn synthetic_param_set_nalu(value: NaluValue) -> Nalu {
    use h265::nalu::{NaluHeader, NaluType};

    let nal_unit_type = match &value {
        NaluValue::VpsNut(_) => NaluType::VpsNut,
        NaluValue::SpsNut(_) => NaluType::SpsNut,
        NaluValue::PpsNut(_) => NaluType::PpsNut,
        _ => NaluType::UnspecN(63),
    };

    Nalu {
        header: NaluHeader {
            nal_unit_type,
            nuh_layer_id: 0,
            nuh_temporal_id_plus1: 1,
        },
        value,
    }
}

fn split_length_prefixed(data: &[u8], length_size: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut offset = 0usize;
    while offset + length_size <= data.len() {
        let mut len = 0usize;
        for i in 0..length_size {
            len = (len << 8) | data[offset + i] as usize;
        }
        offset += length_size;
        if offset + len > data.len() {
            break;
        }
        out.push((offset, offset + len));
        offset += len;
    }
    out
}

/// Derives a picture's output width/height/crop/bit depth from its SPS.
/// The conformance window (§7.4.3.2.1) always applies; the VUI default
/// display window (§E.2.1) additionally applies only when
/// `apply_default_display_window` is set, since it's meant for display
/// cropping rather than the bitstream's own notion of picture size.
fn picture_geometry(
    sps: &SequenceParameterSet,
    apply_default_display_window: bool,
) -> (u32, u32, CropRect, u8, u8) {
    let (sub_width_c, sub_height_c) = match sps.chroma_format_idc {
        1 => (2, 2),
        2 => (2, 1),
        _ => (1, 1),
    };

    let mut crop = CropRect::default();
    if let Some(w) = &sps.conformance_window {
        crop.left += w.conf_win_left_offset * sub_width_c;
        crop.right += w.conf_win_right_offset * sub_width_c;
        crop.top += w.conf_win_top_offset * sub_height_c;
        crop.bottom += w.conf_win_bottom_offset * sub_height_c;
    }

    if apply_default_display_window {
        if let Some(def_disp_win) = sps.vui.as_ref().and_then(|vui| vui.def_disp_win.as_ref()) {
            crop.left += def_disp_win.def_disp_win_left_offset as u32 * sub_width_c;
            crop.right += def_disp_win.def_disp_win_right_offset as u32 * sub_width_c;
            crop.top += def_disp_win.def_disp_win_top_offset as u32 * sub_height_c;
            crop.bottom += def_disp_win.def_disp_win_bottom_offset as u32 * sub_height_c;
        }
    }

    (
        sps.pic_width_in_luma_samples,
        sps.pic_height_in_luma_samples,
        crop,
        sps.bit_depth_luma_minus8 + 8,
        sps.bit_depth_chroma_minus8 + 8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_with_empty_extradata_defaults_to_annex_b() {
        let decoder = Decoder::open(&[], DecoderConfig::default()).unwrap();
        assert_eq!(decoder.framing, Framing::AnnexB);
    }

    #[test]
    fn pull_frame_on_fresh_decoder_is_empty() {
        let mut decoder = Decoder::open(&[], DecoderConfig::default()).unwrap();
        assert!(decoder.pull_frame().is_none());
    }

    #[test]
    fn close_is_idempotent_and_push_after_close_is_cancelled() {
        let mut decoder = Decoder::open(&[], DecoderConfig::default()).unwrap();
        decoder.close();
        decoder.close();
        let err = decoder.push_packet(&[0, 0, 1, 0x40, 0x01], None, None).unwrap_err();
        assert!(matches!(err, DecoderError::Cancelled));
    }

    #[test]
    fn split_length_prefixed_walks_consecutive_units() {
        let data = [0, 0, 0, 2, 0xAA, 0xBB, 0, 0, 0, 1, 0xCC];
        let ranges = split_length_prefixed(&data, 4);
        assert_eq!(ranges, vec![(4, 6), (10, 11)]);
    }
}
