//! Backtrace engine: per-cell predecessor analysis and the random-path
//! walker.
//!
//! Repeated backtraces from one filled matrix must yield distinct optimal
//! alignments without re-running the DP. Two mechanisms cooperate:
//!
//! - Each analysed cell memoises its *residual* predecessor mask (the legal
//!   predecessors not yet consumed). A cell whose residual runs out is a dead
//!   end, while a cell whose mask was empty from the start is a legal
//!   alignment origin; the two are kept apart by the mask's initialised bit.
//! - Every cell of a committed alignment gets its reported-through flag set,
//!   so later walks refuse to re-emit any part of it.
//!
//! When a cell offers several predecessors, one is drawn uniformly at random
//! and removed from the residual.

use crate::alignment::matrix::{CellType, MaskSlot, StripedMatrix};
use crate::metrics::AlignMetrics;
use crate::read::{Read, BASE_N};
use crate::scoring::Scoring;
use rand::Rng;

/// Predecessor-mask bit positions for an H cell.
const H_REF_OPEN: u16 = 1 << 0;
const H_READ_OPEN: u16 = 1 << 1;
const H_REF_EXTEND: u16 = 1 << 2;
const H_READ_EXTEND: u16 = 1 << 3;
const H_DIAG: u16 = 1 << 4;

/// Predecessor-mask bits for E and F cells.
const EF_OPEN: u16 = 1 << 0;
const EF_EXTEND: u16 = 1 << 1;

/// Number of set bits for each 5-bit mask value.
const ALTS5: [u8; 32] = [
    0, 1, 1, 2, 1, 2, 2, 3, 1, 2, 2, 3, 2, 3, 3, 4, 1, 2, 2, 3, 2, 3, 3, 4, 2, 3, 3, 4, 3, 4, 4,
    5,
];

/// Lowest set bit for each non-zero 5-bit mask value.
const FIRSTS5: [u16; 32] = [
    0, 0, 1, 0, 2, 0, 1, 0, 3, 0, 1, 0, 2, 0, 1, 0, 4, 0, 1, 0, 2, 0, 1, 0, 3, 0, 1, 0, 2, 0, 1,
    0,
];

/// Draw one set bit of `mask` uniformly at random.
fn rand_from_mask<R: Rng>(rng: &mut R, mask: u16) -> u16 {
    debug_assert!(mask > 0 && mask < 32);
    if ALTS5[mask as usize] == 1 {
        return FIRSTS5[mask as usize];
    }
    // Bounded rejection keeps the common case to a couple of draws.
    for _ in 0..8 {
        let bit = rng.gen_range(0..5u16);
        if mask & (1 << bit) != 0 {
            return bit;
        }
    }
    // Exact fallback: pick the r-th set bit.
    let mut r = rng.gen_range(0..ALTS5[mask as usize]);
    for bit in 0..5 {
        if mask & (1 << bit) != 0 {
            if r == 0 {
                return bit;
            }
            r -= 1;
        }
    }
    unreachable!("mask had no set bits");
}

/// One step of a backtrace: which edge leaves the current cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// H to H via the diagonal: a match or mismatch.
    Diag,
    /// A length-one gap in the reference, opened from the H cell above.
    RefOpen,
    /// A length-one gap in the read, opened from the H cell to the left.
    ReadOpen,
    /// Continue a reference gap through the F matrix.
    RefGapExtend,
    /// Continue a read gap through the E matrix.
    ReadGapExtend,
}

/// Result of analysing one cell.
#[derive(Debug, Clone, Copy)]
pub struct CellAnalysis {
    /// No predecessor remains.
    pub empty: bool,
    /// The chosen outgoing edge, when one exists.
    pub transition: Option<Transition>,
    /// More than one predecessor was available and one was drawn at random.
    pub branched: bool,
    /// Whether the walk may pass through (or legally end at) this cell.
    pub can_move_through: bool,
    /// The cell belongs to an already-committed alignment.
    pub reported_through: bool,
}

impl StripedMatrix {
    /// Analyse the cell at (`row`, `col`) in matrix `ct`: determine which
    /// predecessors could have produced its score, intersect with the
    /// memoised residual, pick one (at random when several remain), and
    /// write the reduced residual back.
    ///
    /// `offset_score` converts stored lane values to actual scores;
    /// `floor_score` is the actual-score floor below which a predecessor is
    /// unreachable. `read_qual` is the raw Phred+33 byte.
    #[allow(clippy::too_many_arguments)]
    pub fn analyze_cell<R: Rng>(
        &mut self,
        row: usize,
        col: usize,
        ct: CellType,
        ref_base: u8,
        read_base: u8,
        read_qual: u8,
        scoring: &Scoring,
        offset_score: i64,
        floor_score: i64,
        rng: &mut R,
    ) -> CellAnalysis {
        let mut out = CellAnalysis {
            empty: false,
            transition: None,
            branched: false,
            can_move_through: true,
            reported_through: self.reported_through(row, col),
        };
        if out.reported_through {
            out.can_move_through = false;
            return out;
        }
        if row == 0 {
            // Top row: always a terminal with no predecessor.
            return out;
        }
        let row_from_end = self.nrow() - row - 1;
        let gaps_allowed = row >= scoring.gap_barrier && row_from_end >= scoring.gap_barrier;

        match ct {
            CellType::E => {
                debug_assert!(gaps_allowed && col > 0);
                let sc_cur = self.eelt(row, col) + offset_score;
                let mut mask = 0u16;
                let sc_h_left = self.helt(row, col - 1) + offset_score;
                if sc_h_left > floor_score && sc_h_left - scoring.read_gap_open as i64 == sc_cur {
                    mask |= EF_OPEN;
                }
                let sc_e_left = self.eelt(row, col - 1) + offset_score;
                if sc_e_left > floor_score && sc_e_left - scoring.read_gap_extend as i64 == sc_cur
                {
                    mask |= EF_EXTEND;
                }
                let orig_mask = mask;
                if let MaskSlot::Residual(m) = self.e_mask(row, col) {
                    mask = m;
                }
                match mask {
                    3 => {
                        out.branched = true;
                        if rng.gen::<bool>() {
                            out.transition = Some(Transition::ReadOpen);
                            self.e_mask_set(row, col, EF_EXTEND);
                        } else {
                            out.transition = Some(Transition::ReadGapExtend);
                            self.e_mask_set(row, col, EF_OPEN);
                        }
                    }
                    2 => {
                        out.transition = Some(Transition::ReadGapExtend);
                        self.e_mask_set(row, col, 0);
                    }
                    1 => {
                        out.transition = Some(Transition::ReadOpen);
                        self.e_mask_set(row, col, 0);
                    }
                    _ => {
                        out.empty = true;
                        out.can_move_through = orig_mask == 0;
                    }
                }
            }
            CellType::F => {
                debug_assert!(gaps_allowed);
                let sc_cur = self.felt(row, col) + offset_score;
                let mut mask = 0u16;
                let sc_h_up = self.helt(row - 1, col) + offset_score;
                if sc_h_up > floor_score && sc_h_up - scoring.ref_gap_open as i64 == sc_cur {
                    mask |= EF_OPEN;
                }
                let sc_f_up = self.felt(row - 1, col) + offset_score;
                if sc_f_up > floor_score && sc_f_up - scoring.ref_gap_extend as i64 == sc_cur {
                    mask |= EF_EXTEND;
                }
                let orig_mask = mask;
                if let MaskSlot::Residual(m) = self.f_mask(row, col) {
                    mask = m;
                }
                match mask {
                    3 => {
                        out.branched = true;
                        if rng.gen::<bool>() {
                            out.transition = Some(Transition::RefOpen);
                            self.f_mask_set(row, col, EF_EXTEND);
                        } else {
                            out.transition = Some(Transition::RefGapExtend);
                            self.f_mask_set(row, col, EF_OPEN);
                        }
                    }
                    2 => {
                        out.transition = Some(Transition::RefGapExtend);
                        self.f_mask_set(row, col, 0);
                    }
                    1 => {
                        out.transition = Some(Transition::RefOpen);
                        self.f_mask_set(row, col, 0);
                    }
                    _ => {
                        out.empty = true;
                        out.can_move_through = orig_mask == 0;
                    }
                }
            }
            CellType::H => {
                let sc_cur = self.helt(row, col) + offset_score;
                let sc_h_up = self.helt(row - 1, col) + offset_score;
                let sc_f_up = self.felt(row - 1, col) + offset_score;
                let sc_h_left = if col > 0 {
                    self.helt(row, col - 1) + offset_score
                } else {
                    floor_score
                };
                let sc_e_left = if col > 0 {
                    self.eelt(row, col - 1) + offset_score
                } else {
                    floor_score
                };
                let sc_h_upleft = if col > 0 {
                    self.helt(row - 1, col - 1) + offset_score
                } else {
                    floor_score
                };
                let sc_diag = scoring.score(read_base, ref_base, read_qual - 33);

                let mut mask = 0u16;
                if gaps_allowed {
                    if sc_h_up > floor_score && sc_cur == sc_h_up - scoring.ref_gap_open as i64 {
                        mask |= H_REF_OPEN;
                    }
                    if sc_h_left > floor_score
                        && sc_cur == sc_h_left - scoring.read_gap_open as i64
                    {
                        mask |= H_READ_OPEN;
                    }
                    if sc_f_up > floor_score && sc_cur == sc_f_up - scoring.ref_gap_extend as i64 {
                        mask |= H_REF_EXTEND;
                    }
                    if sc_e_left > floor_score
                        && sc_cur == sc_e_left - scoring.read_gap_extend as i64
                    {
                        mask |= H_READ_EXTEND;
                    }
                }
                if sc_h_upleft > floor_score && sc_cur == sc_h_upleft + sc_diag {
                    mask |= H_DIAG;
                }
                let orig_mask = mask;
                if let MaskSlot::Residual(m) = self.h_mask(row, col) {
                    mask = m;
                }
                debug_assert!(gaps_allowed || mask == H_DIAG || mask == 0);

                let opts = ALTS5[mask as usize];
                if opts == 0 {
                    out.empty = true;
                    out.can_move_through = orig_mask == 0;
                } else {
                    let select = if opts == 1 {
                        let s = FIRSTS5[mask as usize];
                        self.h_mask_set(row, col, 0);
                        s
                    } else {
                        let s = rand_from_mask(rng, mask);
                        self.h_mask_set(row, col, mask & !(1 << s));
                        out.branched = true;
                        s
                    };
                    out.transition = Some(match 1 << select {
                        H_REF_OPEN => Transition::RefOpen,
                        H_READ_OPEN => Transition::ReadOpen,
                        H_REF_EXTEND => Transition::RefGapExtend,
                        H_READ_EXTEND => Transition::ReadGapExtend,
                        _ => Transition::Diag,
                    });
                }
            }
        }
        debug_assert!(!out.empty || !out.can_move_through || matches!(ct, CellType::H));
        out
    }
}

/// One edit of an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlnOp {
    /// Read base pairs a reference base and agrees.
    Match,
    /// Read base pairs a reference base and disagrees (or either is N).
    Mismatch,
    /// Gap in the read: a reference base is skipped.
    ReadGap,
    /// Gap in the reference: a read base is inserted.
    RefGap,
}

/// One positioned edit. `ref_pos` is a 0-based offset into the reference
/// window, `read_pos` a 0-based read row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub op: AlnOp,
    pub ref_pos: usize,
    pub read_pos: usize,
}

/// One sampled optimal alignment. Edits run from origin to terminal.
#[derive(Debug, Clone)]
pub struct Backtrace {
    pub edits: Vec<Edit>,
    /// Actual (offset-corrected) score at the terminal cell.
    pub score: i64,
    /// Matrix coordinates where the walk ended (alignment origin).
    pub start_cell: (usize, usize),
    /// Matrix coordinates of the caller-chosen terminal.
    pub end_cell: (usize, usize),
}

#[inline]
fn diag_edit(read_base: u8, ref_base: u8, row: usize, col: usize) -> Edit {
    let op = if read_base == ref_base && read_base < BASE_N {
        AlnOp::Match
    } else {
        AlnOp::Mismatch
    };
    Edit {
        op,
        ref_pos: col - 1,
        read_pos: row,
    }
}

/// Walk one random optimal backtrace from `terminal` (an H cell), mutating
/// the matrix's residual masks as choices are consumed. On success every
/// visited cell is marked reported-through; a failed walk commits nothing and
/// returns `None`.
#[allow(clippy::too_many_arguments)]
pub fn backtrace_from<R: Rng>(
    mat: &mut StripedMatrix,
    read: &Read,
    rf: &[u8],
    scoring: &Scoring,
    terminal: (usize, usize),
    offset_score: i64,
    floor_score: i64,
    rng: &mut R,
    metrics: &mut AlignMetrics,
) -> Option<Backtrace> {
    let (mut row, mut col) = terminal;
    assert!(
        row < mat.nrow() && col >= 1 && col < mat.ncol(),
        "terminal cell out of range"
    );
    metrics.bt += 1;

    let score = mat.helt(row, col) + offset_score;
    let mut ct = CellType::H;
    let mut edits: Vec<Edit> = Vec::new();
    // Rollback is trivial: reported-through is only written after the whole
    // alignment commits.
    let mut visited: Vec<(usize, usize)> = Vec::new();

    loop {
        metrics.btcell += 1;
        let read_base = read.seq[row];
        let read_qual = read.qual[row];
        let ref_base = rf[col - 1];
        let res = mat.analyze_cell(
            row,
            col,
            ct,
            ref_base,
            read_base,
            read_qual,
            scoring,
            offset_score,
            floor_score,
            rng,
        );
        if res.reported_through {
            metrics.btfail += 1;
            return None;
        }
        visited.push((row, col));

        match res.transition {
            Some(t) => match t {
                Transition::Diag => {
                    edits.push(diag_edit(read_base, ref_base, row, col));
                    row -= 1;
                    col -= 1;
                    ct = CellType::H;
                }
                Transition::RefOpen => {
                    edits.push(Edit {
                        op: AlnOp::RefGap,
                        ref_pos: col - 1,
                        read_pos: row,
                    });
                    row -= 1;
                    ct = CellType::H;
                }
                Transition::ReadOpen => {
                    edits.push(Edit {
                        op: AlnOp::ReadGap,
                        ref_pos: col - 1,
                        read_pos: row,
                    });
                    col -= 1;
                    ct = CellType::H;
                }
                Transition::RefGapExtend => {
                    edits.push(Edit {
                        op: AlnOp::RefGap,
                        ref_pos: col - 1,
                        read_pos: row,
                    });
                    row -= 1;
                    ct = CellType::F;
                }
                Transition::ReadGapExtend => {
                    edits.push(Edit {
                        op: AlnOp::ReadGap,
                        ref_pos: col - 1,
                        read_pos: row,
                    });
                    col -= 1;
                    ct = CellType::E;
                }
            },
            None if row == 0 && !res.empty => {
                // Top-row origin: the cell itself aligns read position 0.
                if matches!(ct, CellType::H) {
                    edits.push(diag_edit(read_base, ref_base, row, col));
                }
                break;
            }
            None if res.can_move_through => {
                // Originally-empty mask: a legal alignment origin. The cell's
                // own diagonal score is part of the alignment.
                if matches!(ct, CellType::H) {
                    edits.push(diag_edit(read_base, ref_base, row, col));
                }
                break;
            }
            None => {
                // Residual exhausted by earlier walks: dead end.
                metrics.btfail += 1;
                return None;
            }
        }
    }

    for &(r, c) in &visited {
        mat.set_reported_through(r, c);
    }
    metrics.btsucc += 1;
    edits.reverse();
    let start_cell = *visited.last().unwrap();
    Some(Backtrace {
        edits,
        score,
        start_cell,
        end_cell: terminal,
    })
}
