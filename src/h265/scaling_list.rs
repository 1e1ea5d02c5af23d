//! Scaling list data (§7.3.4 `scaling_list_data()`), shared by the SPS and
//! the PPS.

use std::io::{self, Read};

use bitstream_io::BitRead as _;
use bitstream_io::{BigEndian, BitReader};

use crate::base::read_exp_golomb_se;

/// _Table 7-5/7-6 – Default values of ScalingList[1..3][0..2/3..5][...]_,
/// the 8x8 intra/inter default matrices every `sizeId >= 1` list not
/// explicitly signalled (or predicted with `scaling_list_pred_matrix_id_delta
/// == 0`) is inferred from. `sizeId == 0` (4x4) has no distinct default
/// table: every coefficient defaults to 16.
const DEFAULT_SCALING_LIST_INTRA: [u8; 64] = [
    16, 16, 16, 16, 17, 18, 21, 24, 16, 16, 16, 16, 17, 19, 22, 25, 16, 16, 17, 18, 20, 22, 25, 29,
    16, 16, 18, 21, 24, 27, 31, 36, 17, 17, 20, 24, 30, 35, 41, 47, 18, 19, 22, 27, 35, 44, 54, 65,
    21, 22, 25, 31, 41, 54, 70, 88, 24, 25, 29, 36, 47, 65, 88, 115,
];

const DEFAULT_SCALING_LIST_INTER: [u8; 64] = [
    16, 16, 16, 16, 17, 18, 20, 24, 16, 16, 16, 17, 18, 20, 24, 25, 16, 16, 17, 18, 20, 24, 25, 28,
    16, 17, 18, 20, 24, 25, 28, 33, 17, 18, 20, 24, 25, 28, 33, 41, 18, 20, 24, 25, 28, 33, 41, 54,
    20, 24, 25, 28, 33, 41, 54, 71, 24, 25, 28, 33, 41, 54, 71, 91,
];

const DEFAULT_DC_COEF: i32 = 16;

fn num_matrices(size_id: usize) -> usize {
    if size_id == 3 {
        2
    } else {
        6
    }
}

/// `matrixId` step between `3` and `6` is 3 when `sizeId == 3`, mapping the
/// two decoded slots back to `matrixId` values `0` and `3`.
fn matrix_id_for_slot(size_id: usize, slot: usize) -> usize {
    if size_id == 3 {
        slot * 3
    } else {
        slot
    }
}

fn num_coefficients(size_id: usize) -> usize {
    (1usize << (4 + (size_id << 1))).min(64)
}

fn default_list(size_id: usize, matrix_id: usize) -> &'static [u8; 64] {
    let is_intra = if size_id == 3 { matrix_id == 0 } else { matrix_id < 3 };
    if is_intra {
        &DEFAULT_SCALING_LIST_INTRA
    } else {
        &DEFAULT_SCALING_LIST_INTER
    }
}

/// _6.5.3 Up-right diagonal scan order array initialization process_,
/// specialized to a square `block_size x block_size` block. Returns
/// `scan[i] = rasterIndex`, i.e. the raster-order position that the
/// `i`-th coefficient in scan order belongs at.
fn up_right_diagonal_scan(block_size: usize) -> Vec<usize> {
    let mut scan = Vec::with_capacity(block_size * block_size);
    let (mut x, mut y) = (0i32, 0i32);
    loop {
        while y >= 0 {
            if (x as usize) < block_size && (y as usize) < block_size {
                scan.push(y as usize * block_size + x as usize);
            }
            y -= 1;
            x += 1;
        }
        y = x;
        x = 0;
        if scan.len() >= block_size * block_size {
            break;
        }
    }
    scan
}

/// `sizeId == 0` lists use a 4x4 scan, every larger `sizeId` a clamped-to-8x8 scan (§7.3.4).
fn scan_block_size(size_id: usize) -> usize {
    if size_id == 0 {
        4
    } else {
        8
    }
}

/// Reorders `coefficients`, given in up-right diagonal scan order as coded
/// in the bitstream, into raster order for storage.
fn scan_to_raster(size_id: usize, coefficients: &[u8]) -> Vec<u8> {
    let scan = up_right_diagonal_scan(scan_block_size(size_id));
    let mut raster = vec![0u8; coefficients.len()];
    for (scan_pos, &value) in coefficients.iter().enumerate() {
        raster[scan[scan_pos]] = value;
    }
    raster
}

#[derive(Debug, Clone)]
pub struct ScalingListEntry {
    pub pred_mode_flag: bool,
    /// `Some` means `!pred_mode_flag`.
    pub pred_matrix_id_delta: Option<u8>,
    /// `Some` for `size_id > 1` when `pred_mode_flag` is set.
    pub dc_coef_minus8: Option<i8>,
    /// Fully resolved `ScalingList[sizeId][matrixId][...]`, `num_coefficients(size_id)` entries long.
    pub coefficients: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ScalingListData {
    /// Indexed `[size_id][matrix_slot]`; `matrix_slot` is `matrixId` for
    /// `size_id != 3` and `matrixId / 3` for `size_id == 3`.
    pub entries: [Vec<ScalingListEntry>; 4],
}

impl ScalingListData {
    pub fn from_bit_reader<R: Read>(
        bit_reader: &mut BitReader<R, BigEndian>,
    ) -> Result<Self, io::Error> {
        let mut entries: [Vec<ScalingListEntry>; 4] =
            [Vec::new(), Vec::new(), Vec::new(), Vec::new()];

        for size_id in 0..4 {
            let slots = num_matrices(size_id);
            let coef_num = num_coefficients(size_id);
            let mut per_size: Vec<ScalingListEntry> = Vec::with_capacity(slots);

            for slot in 0..slots {
                let matrix_id = matrix_id_for_slot(size_id, slot);
                let pred_mode_flag = bit_reader.read_bit()?;

                if !pred_mode_flag {
                    let pred_matrix_id_delta: u8 = read_exp_golomb_ue_as_u8(bit_reader)?;

                    let coefficients = if pred_matrix_id_delta == 0 {
                        if size_id == 0 {
                            vec![16u8; coef_num]
                        } else {
                            // The default tables are listed in raster order already (they
                            // fill the whole block uniformly along diagonals of increasing
                            // distance from DC), so no scan conversion is needed here.
                            default_list(size_id, matrix_id)[..coef_num].to_vec()
                        }
                    } else {
                        // Already in raster order: it was converted (or was itself a
                        // raster-order default) when the referenced slot was decoded.
                        let ref_slot = slot - pred_matrix_id_delta as usize;
                        per_size[ref_slot].coefficients.clone()
                    };
                    let dc_coef_minus8 = if pred_matrix_id_delta == 0 {
                        if size_id > 1 {
                            Some((DEFAULT_DC_COEF - 8) as i8)
                        } else {
                            None
                        }
                    } else if size_id > 1 {
                        per_size[slot - pred_matrix_id_delta as usize].dc_coef_minus8
                    } else {
                        None
                    };

                    per_size.push(ScalingListEntry {
                        pred_mode_flag,
                        pred_matrix_id_delta: Some(pred_matrix_id_delta),
                        dc_coef_minus8,
                        coefficients,
                    });
                } else {
                    let mut next_coef: i32 = 8;
                    let dc_coef_minus8 = if size_id > 1 {
                        let dc: i8 = read_exp_golomb_se(bit_reader)? as _;
                        next_coef = dc as i32 + 8;
                        Some(dc)
                    } else {
                        None
                    };

                    let mut coefficients = Vec::with_capacity(coef_num);
                    for _ in 0..coef_num {
                        let delta = read_exp_golomb_se(bit_reader)?;
                        next_coef = (next_coef + delta + 256).rem_euclid(256);
                        coefficients.push(next_coef as u8);
                    }
                    let coefficients = scan_to_raster(size_id, &coefficients);

                    per_size.push(ScalingListEntry {
                        pred_mode_flag,
                        pred_matrix_id_delta: None,
                        dc_coef_minus8,
                        coefficients,
                    });
                }
            }

            entries[size_id] = per_size;
        }

        Ok(Self { entries })
    }
}

fn read_exp_golomb_ue_as_u8<R: bitstream_io::BitRead>(reader: &mut R) -> Result<u8, io::Error> {
    Ok(crate::base::read_exp_golomb_ue(reader)? as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_coefficients_clamps_at_64() {
        assert_eq!(num_coefficients(0), 16);
        assert_eq!(num_coefficients(1), 64);
        assert_eq!(num_coefficients(2), 64);
        assert_eq!(num_coefficients(3), 64);
    }

    #[test]
    fn size_id_three_has_two_matrix_slots() {
        assert_eq!(num_matrices(3), 2);
        assert_eq!(matrix_id_for_slot(3, 0), 0);
        assert_eq!(matrix_id_for_slot(3, 1), 3);
    }

    #[test]
    fn diagonal_scan_covers_every_raster_position_once() {
        let scan = up_right_diagonal_scan(4);
        assert_eq!(scan.len(), 16);
        let mut seen = scan.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..16).collect::<Vec<_>>());
        // First two positions along the scan are always (0,0) then (1,0).
        assert_eq!(scan[0], 0);
        assert_eq!(scan[1], 1);
    }

    #[test]
    fn scan_to_raster_is_the_inverse_permutation_of_the_scan() {
        let scan = up_right_diagonal_scan(4);
        let coded: Vec<u8> = (0..16).collect();
        let raster = scan_to_raster(0, &coded);
        for (scan_pos, &raster_pos) in scan.iter().enumerate() {
            assert_eq!(raster[raster_pos], scan_pos as u8);
        }
    }
}
