//! Annex-B byte stream scanning: start-code search plus escape removal.
//!
//! Complements `bytestream.rs`'s length-prefixed (`hvcC`-framed) reader with
//! the other framing the spec names (§6: "Annex-B or length-prefixed (hvcC)
//! framing"). Splits on `0x000001`/`0x00000001` start codes; RBSP
//! unescaping itself is delegated to `crate::base::ebsp_to_rbsp`, same as
//! the length-prefixed path.

/// One delimited NAL unit (header + EBSP) found in an Annex-B stream,
/// as a byte range into the original buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnexBNalUnitRange {
    pub start: usize,
    pub end: usize,
}

/// Scans `data` for start-code-delimited NAL units. Leading bytes before
/// the first start code (if any) are ignored, matching Annex-B's own
/// leading_zero_8bits/zero_byte allowance.
pub fn split_annex_b(data: &[u8]) -> Vec<AnnexBNalUnitRange> {
    let starts = find_start_codes(data);
    let mut ranges = Vec::with_capacity(starts.len());

    for (i, &(sc_pos, sc_len)) in starts.iter().enumerate() {
        let unit_start = sc_pos + sc_len;
        let unit_end = starts
            .get(i + 1)
            .map(|&(next_pos, _)| trim_trailing_zero_byte(data, next_pos))
            .unwrap_or(data.len());

        if unit_end > unit_start {
            ranges.push(AnnexBNalUnitRange {
                start: unit_start,
                end: unit_end,
            });
        }
    }

    ranges
}

/// A `zero_byte` (single `0x00`) may precede a 4-byte start code; trim it
/// from the end of the previous NAL unit rather than treating it as payload.
fn trim_trailing_zero_byte(data: &[u8], next_start_code_pos: usize) -> usize {
    if next_start_code_pos > 0 && data[next_start_code_pos - 1] == 0 {
        next_start_code_pos - 1
    } else {
        next_start_code_pos
    }
}

/// Returns `(position, length)` of each `0x000001`/`0x00000001` start code.
fn find_start_codes(data: &[u8]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            out.push((i, 3));
            i += 3;
        } else {
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_two_consecutive_start_codes() {
        let data = [0, 0, 1, 0x40, 0x01, 0, 0, 1, 0x42, 0x01, 0x02];
        let ranges = split_annex_b(&data);
        assert_eq!(ranges.len(), 2);
        assert_eq!(&data[ranges[0].start..ranges[0].end], &[0x40, 0x01]);
        assert_eq!(&data[ranges[1].start..ranges[1].end], &[0x42, 0x01, 0x02]);
    }

    #[test]
    fn trims_zero_byte_before_four_byte_start_code() {
        let data = [0, 0, 1, 0x40, 0x01, 0, 0, 0, 1, 0x42];
        let ranges = split_annex_b(&data);
        assert_eq!(&data[ranges[0].start..ranges[0].end], &[0x40, 0x01]);
    }

    #[test]
    fn empty_input_yields_no_units() {
        assert!(split_annex_b(&[]).is_empty());
    }
}
