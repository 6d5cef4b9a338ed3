//! Striped Smith-Waterman fill kernels.
//!
//! One kernel per lane width (8-bit and 16-bit words in a 128-bit vector),
//! both following the same column-wise scheme under saturating unsigned
//! arithmetic:
//!
//! 1. E for the current column opens from the previous column's stored H or
//!    extends its stored E.
//! 2. The tentative H adds the profile entry to the wrapped diagonal (the
//!    previous column's last striped row, lanes shifted up by one, with the
//!    row "-1" seed inserted into lane 0), then takes the max with E and the
//!    running F.
//! 3. The running F for the next striped row opens from the freshly stored H
//!    or extends, and wraps across stripe boundaries in the lazy-F fix-up
//!    loop until no lane can still improve.
//!
//! E, F and H are all stored per cell (quartet layout, see
//! [`crate::alignment::matrix`]) because the backtrace re-reads them.
//! Gap-barrier rows have their E and F contributions forced to the floor via
//! the profile's per-striped-row lane masks, so no gap score ever
//! materialises where gaps are forbidden.
//!
//! Stored values sit `bias` above the caller's score domain exactly when the
//! caller seeds the wrapped diagonal with `init_h = bias` (semi-global); with
//! `init_h = 0` the stored domain is the score domain and the zero floor is
//! the local-alignment restart base. Saturation is flagged when any H lane
//! reaches `max_lane - bias`: the transient of the diagonal add would have
//! clipped there.

#![allow(unsafe_op_in_unsafe_fn)]

use crate::alignment::matrix::{StripedMatrix, MAT_E, MAT_F, MAT_H};
use crate::alignment::profile::{LaneWidth, QueryProfile};
use crate::compute::simd_abstraction::portable_intrinsics::*;
use crate::compute::simd_abstraction::types::__m128i;
use crate::metrics::AlignMetrics;
use crate::scoring::Scoring;

/// Outcome of one DP fill, in the stored (lane) score domain.
pub struct FillResult {
    /// A lane would have exceeded the representable range.
    pub saturated: bool,
    /// Per-column maximum stored H, index 0 being the staged initial column.
    pub col_max: Vec<i64>,
    /// Stored H at the final read row, per column.
    pub last_row: Vec<i64>,
}

#[repr(align(16))]
struct Aligned16([u8; 16]);

/// Fill the matrix for `rf` using `prof`, dispatching on the profile's lane
/// width. `init_h` seeds lane 0 of the wrapped diagonal (the conceptual row
/// above the matrix): `bias` for semi-global fills, `0` for local fills.
pub fn fill(
    prof: &QueryProfile,
    rf: &[u8],
    init_h: i64,
    scoring: &Scoring,
    mat: &mut StripedMatrix,
    metrics: &mut AlignMetrics,
) -> FillResult {
    assert!(!rf.is_empty(), "empty reference window");
    log::trace!(
        "striped fill: qlen={} ref={} lane={:?} bias={}",
        prof.qlen(),
        rf.len(),
        prof.lane(),
        prof.bias
    );
    match prof.lane() {
        LaneWidth::Lane8 => unsafe { fill_u8(prof, rf, init_h, scoring, mat, metrics) },
        LaneWidth::Lane16 => unsafe { fill_u16(prof, rf, init_h, scoring, mat, metrics) },
    }
}

unsafe fn fill_u8(
    prof: &QueryProfile,
    rf: &[u8],
    init_h: i64,
    scoring: &Scoring,
    mat: &mut StripedMatrix,
    metrics: &mut AlignMetrics,
) -> FillResult {
    debug_assert!(init_h >= 0 && init_h <= LaneWidth::Lane8.max_lane());
    let qlen = prof.qlen();
    let s = prof.nvecrow();
    mat.init(qlen, rf.len() + 1, 16);
    mat.init_masks();

    let colstride = mat.colstride();
    let rowstride = mat.rowstride();
    let base = mat.buf_mut_ptr();

    let vzero = _mm_setzero_si128();
    let vbias = _mm_set1_epi8(prof.bias as u8 as i8);
    let vrdgapo = _mm_set1_epi8(clamp_u8(scoring.read_gap_open) as i8);
    let vrdgape = _mm_set1_epi8(clamp_u8(scoring.read_gap_extend) as i8);
    let vrfgapo = _mm_set1_epi8(clamp_u8(scoring.ref_gap_open) as i8);
    let vrfgape = _mm_set1_epi8(clamp_u8(scoring.ref_gap_extend) as i8);

    // Seed for lane 0 of the wrapped diagonal.
    let mut seed = Aligned16([0u8; 16]);
    seed.0[0] = init_h as u8;
    let vinit = _mm_load_si128(seed.0.as_ptr() as *const __m128i);

    // Staged initial column: everything at the floor.
    for v in 0..s {
        let cell = base.add(v * rowstride);
        _mm_store_si128(cell.add(MAT_E), vzero);
        _mm_store_si128(cell.add(MAT_F), vzero);
        _mm_store_si128(cell.add(MAT_H), vzero);
    }

    let row_mask = prof.row_mask();
    let gap_mask = prof.gap_mask();

    let mut vsat = vzero;
    let mut col_max = Vec::with_capacity(rf.len() + 1);
    let mut last_row = Vec::with_capacity(rf.len() + 1);
    col_max.push(0);
    last_row.push(0);
    let mut tmp = Aligned16([0u8; 16]);

    for (j0, &refc) in rf.iter().enumerate() {
        let j = j0 + 1;
        metrics.col += 1;
        let pcol = prof.col(refc);
        let prev = base.add((j - 1) * colstride);
        let cur = base.add(j * colstride);

        let mut vh_diag = _mm_load_si128(prev.add((s - 1) * rowstride + MAT_H));
        vh_diag = _mm_slli_si128_var(vh_diag, 1);
        vh_diag = _mm_or_si128(vh_diag, vinit);

        let mut vf = vzero;
        let mut vcolmax = vzero;

        for v in 0..s {
            metrics.inner += 1;
            metrics.cell += 16;
            let prev_cell = prev.add(v * rowstride);
            let cell = cur.add(v * rowstride);

            let vh_prev = _mm_load_si128(prev_cell.add(MAT_H));
            let ve_prev = _mm_load_si128(prev_cell.add(MAT_E));

            // E: open from the previous column's H or extend its E.
            let mut ve = _mm_max_epu8(
                _mm_subs_epu8(vh_prev, vrdgapo),
                _mm_subs_epu8(ve_prev, vrdgape),
            );
            ve = _mm_and_si128(ve, gap_mask[v]);

            // F entering this striped row.
            let vf_row = _mm_and_si128(vf, gap_mask[v]);

            // H: diagonal plus profile entry, then E and F.
            let mut vh = _mm_adds_epu8(vh_diag, pcol[v]);
            vh = _mm_subs_epu8(vh, vbias);
            vh = _mm_max_epu8(vh, ve);
            vh = _mm_max_epu8(vh, vf_row);
            vh = _mm_and_si128(vh, row_mask[v]);

            _mm_store_si128(cell.add(MAT_H), vh);
            _mm_store_si128(cell.add(MAT_E), ve);
            _mm_store_si128(cell.add(MAT_F), vf_row);
            vcolmax = _mm_max_epu8(vcolmax, vh);

            // F for the next striped row.
            vf = _mm_max_epu8(
                _mm_subs_epu8(vh, vrfgapo),
                _mm_subs_epu8(vf_row, vrfgape),
            );

            vh_diag = vh_prev;
        }

        // Lazy-F fix-up: wrap F across the stripe boundary and re-max until
        // no lane of F still beats H minus the open cost.
        'fixup: for _ in 0..16 {
            vf = _mm_slli_si128_var(vf, 1);
            for v in 0..s {
                metrics.fixup += 1;
                let cell = cur.add(v * rowstride);
                let vf_row = _mm_and_si128(vf, gap_mask[v]);
                let vh = _mm_load_si128(cell.add(MAT_H));

                // The wrapped F is a genuine gap run ending at this row, so
                // the stored F picks it up even when H is unaffected.
                let vf_store = _mm_max_epu8(_mm_load_si128(cell.add(MAT_F)), vf_row);
                _mm_store_si128(cell.add(MAT_F), vf_store);

                let vcmp = _mm_subs_epu8(vf_row, _mm_subs_epu8(vh, vrfgapo));
                if _mm_movemask_epi8(_mm_cmpeq_epi8(vcmp, vzero)) == 0xffff {
                    break 'fixup;
                }

                let vh = _mm_max_epu8(vh, vf_row);
                _mm_store_si128(cell.add(MAT_H), vh);
                vcolmax = _mm_max_epu8(vcolmax, vh);
                vf = _mm_subs_epu8(vf_row, vrfgape);
            }
        }

        vsat = _mm_max_epu8(vsat, vcolmax);
        _mm_store_si128(tmp.0.as_mut_ptr() as *mut __m128i, vcolmax);
        col_max.push(tmp.0.iter().copied().max().unwrap() as i64);

        let vlast = _mm_load_si128(cur.add(prof.last_iter * rowstride + MAT_H));
        _mm_store_si128(tmp.0.as_mut_ptr() as *mut __m128i, vlast);
        last_row.push(tmp.0[prof.last_word] as i64);
    }

    _mm_store_si128(tmp.0.as_mut_ptr() as *mut __m128i, vsat);
    let hmax = tmp.0.iter().copied().max().unwrap() as i64;
    FillResult {
        saturated: hmax >= LaneWidth::Lane8.max_lane() - prof.bias,
        col_max,
        last_row,
    }
}

unsafe fn fill_u16(
    prof: &QueryProfile,
    rf: &[u8],
    init_h: i64,
    scoring: &Scoring,
    mat: &mut StripedMatrix,
    metrics: &mut AlignMetrics,
) -> FillResult {
    debug_assert!(init_h >= 0 && init_h <= LaneWidth::Lane16.max_lane());
    let qlen = prof.qlen();
    let s = prof.nvecrow();
    mat.init(qlen, rf.len() + 1, 8);
    mat.init_masks();

    let colstride = mat.colstride();
    let rowstride = mat.rowstride();
    let base = mat.buf_mut_ptr();

    let vzero = _mm_setzero_si128();
    let vbias = _mm_set1_epi16(prof.bias as u16 as i16);
    let vrdgapo = _mm_set1_epi16(clamp_u16(scoring.read_gap_open) as i16);
    let vrdgape = _mm_set1_epi16(clamp_u16(scoring.read_gap_extend) as i16);
    let vrfgapo = _mm_set1_epi16(clamp_u16(scoring.ref_gap_open) as i16);
    let vrfgape = _mm_set1_epi16(clamp_u16(scoring.ref_gap_extend) as i16);

    let mut seed = Aligned16([0u8; 16]);
    seed.0[..2].copy_from_slice(&(init_h as u16).to_le_bytes());
    let vinit = _mm_load_si128(seed.0.as_ptr() as *const __m128i);

    for v in 0..s {
        let cell = base.add(v * rowstride);
        _mm_store_si128(cell.add(MAT_E), vzero);
        _mm_store_si128(cell.add(MAT_F), vzero);
        _mm_store_si128(cell.add(MAT_H), vzero);
    }

    let row_mask = prof.row_mask();
    let gap_mask = prof.gap_mask();

    let mut vsat = vzero;
    let mut col_max = Vec::with_capacity(rf.len() + 1);
    let mut last_row = Vec::with_capacity(rf.len() + 1);
    col_max.push(0);
    last_row.push(0);
    let mut tmp = AlignedWords([0u16; 8]);

    for (j0, &refc) in rf.iter().enumerate() {
        let j = j0 + 1;
        metrics.col += 1;
        let pcol = prof.col(refc);
        let prev = base.add((j - 1) * colstride);
        let cur = base.add(j * colstride);

        let mut vh_diag = _mm_load_si128(prev.add((s - 1) * rowstride + MAT_H));
        vh_diag = _mm_slli_si128_var(vh_diag, 2);
        vh_diag = _mm_or_si128(vh_diag, vinit);

        let mut vf = vzero;
        let mut vcolmax = vzero;

        for v in 0..s {
            metrics.inner += 1;
            metrics.cell += 8;
            let prev_cell = prev.add(v * rowstride);
            let cell = cur.add(v * rowstride);

            let vh_prev = _mm_load_si128(prev_cell.add(MAT_H));
            let ve_prev = _mm_load_si128(prev_cell.add(MAT_E));

            let mut ve = _mm_max_epu16(
                _mm_subs_epu16(vh_prev, vrdgapo),
                _mm_subs_epu16(ve_prev, vrdgape),
            );
            ve = _mm_and_si128(ve, gap_mask[v]);

            let vf_row = _mm_and_si128(vf, gap_mask[v]);

            let mut vh = _mm_adds_epu16(vh_diag, pcol[v]);
            vh = _mm_subs_epu16(vh, vbias);
            vh = _mm_max_epu16(vh, ve);
            vh = _mm_max_epu16(vh, vf_row);
            vh = _mm_and_si128(vh, row_mask[v]);

            _mm_store_si128(cell.add(MAT_H), vh);
            _mm_store_si128(cell.add(MAT_E), ve);
            _mm_store_si128(cell.add(MAT_F), vf_row);
            vcolmax = _mm_max_epu16(vcolmax, vh);

            vf = _mm_max_epu16(
                _mm_subs_epu16(vh, vrfgapo),
                _mm_subs_epu16(vf_row, vrfgape),
            );

            vh_diag = vh_prev;
        }

        'fixup: for _ in 0..8 {
            vf = _mm_slli_si128_var(vf, 2);
            for v in 0..s {
                metrics.fixup += 1;
                let cell = cur.add(v * rowstride);
                let vf_row = _mm_and_si128(vf, gap_mask[v]);
                let vh = _mm_load_si128(cell.add(MAT_H));

                let vf_store = _mm_max_epu16(_mm_load_si128(cell.add(MAT_F)), vf_row);
                _mm_store_si128(cell.add(MAT_F), vf_store);

                let vcmp = _mm_subs_epu16(vf_row, _mm_subs_epu16(vh, vrfgapo));
                if _mm_movemask_epi8(_mm_cmpeq_epi8(vcmp, vzero)) == 0xffff {
                    break 'fixup;
                }

                let vh = _mm_max_epu16(vh, vf_row);
                _mm_store_si128(cell.add(MAT_H), vh);
                vcolmax = _mm_max_epu16(vcolmax, vh);
                vf = _mm_subs_epu16(vf_row, vrfgape);
            }
        }

        vsat = _mm_max_epu16(vsat, vcolmax);
        _mm_store_si128(tmp.0.as_mut_ptr() as *mut __m128i, vcolmax);
        col_max.push(tmp.0.iter().copied().max().unwrap() as i64);

        let vlast = _mm_load_si128(cur.add(prof.last_iter * rowstride + MAT_H));
        _mm_store_si128(tmp.0.as_mut_ptr() as *mut __m128i, vlast);
        last_row.push(tmp.0[prof.last_word] as i64);
    }

    _mm_store_si128(tmp.0.as_mut_ptr() as *mut __m128i, vsat);
    let hmax = tmp.0.iter().copied().max().unwrap() as i64;
    FillResult {
        saturated: hmax >= LaneWidth::Lane16.max_lane() - prof.bias,
        col_max,
        last_row,
    }
}

#[repr(align(16))]
struct AlignedWords([u16; 8]);

#[inline]
fn clamp_u8(cost: i32) -> u8 {
    cost.clamp(0, u8::MAX as i32) as u8
}

#[inline]
fn clamp_u16(cost: i32) -> u16 {
    cost.clamp(0, u16::MAX as i32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::Read;
    use crate::scoring::CostModel;

    fn scoring() -> Scoring {
        Scoring {
            match_bonus: 1,
            mismatch: CostModel::Constant(3),
            n_penalty: CostModel::Constant(1),
            read_gap_open: 2,
            read_gap_extend: 1,
            ref_gap_open: 2,
            ref_gap_extend: 1,
            gap_barrier: 0,
            ..Scoring::default()
        }
    }

    #[test]
    fn test_exact_match_fill_both_lanes() {
        let sc = scoring();
        let read = Read::from_ascii(b"ACGTACGT", b"IIIIIIII");
        let rf = crate::read::encode_seq(b"ACGTACGT");
        for lane in [LaneWidth::Lane8, LaneWidth::Lane16] {
            let prof = QueryProfile::build(&read, &sc, lane).unwrap();
            let mut mat = StripedMatrix::new();
            let mut met = AlignMetrics::new();
            let res = fill(&prof, &rf, prof.bias, &sc, &mut mat, &mut met);
            assert!(!res.saturated);
            // stored last-row value at the final column is bias + 8 matches
            assert_eq!(res.last_row[8], prof.bias + 8);
            assert_eq!(met.col, 8);
        }
    }

    #[test]
    fn test_h_stored_recurrence_holds() {
        // score fidelity at every cell: H = max(E, F, diag + score), subject
        // to the floor
        let sc = scoring();
        let read = Read::from_ascii(b"ACGTAACG", b"IIIIIIII");
        let rf = crate::read::encode_seq(b"ACGTTACGA");
        let prof = QueryProfile::build(&read, &sc, LaneWidth::Lane8).unwrap();
        let mut mat = StripedMatrix::new();
        let mut met = AlignMetrics::new();
        fill(&prof, &rf, prof.bias, &sc, &mut mat, &mut met);
        let bias = prof.bias;
        for row in 0..read.len() {
            for col in 1..mat.ncol() {
                let h = mat.helt(row, col);
                let e = mat.eelt(row, col);
                let f = mat.felt(row, col);
                let diag_stored = if row == 0 {
                    bias
                } else {
                    mat.helt(row - 1, col - 1)
                };
                let ds = sc.score(read.seq[row], rf[col - 1], read.qual[row] - 33);
                let via_diag = (diag_stored + ds).max(0);
                let expect = via_diag.max(e).max(f);
                assert_eq!(h, expect, "cell ({row},{col})");
            }
        }
    }
}
