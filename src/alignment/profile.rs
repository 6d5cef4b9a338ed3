//! Striped query profile.
//!
//! For each reference character `c` in the 5-letter alphabet and each striped
//! vector index `v`, the profile holds one vector whose lane `l` carries the
//! bias-shifted score of aligning `c` against read position `l * S + v`,
//! where `S = ceil(len / wperv)` is the stripe stride. Padding lanes past the
//! end of the read hold zero.
//!
//! The profile also carries the two per-striped-row lane masks the kernel
//! needs: which lanes hold real read rows at all, and which lanes sit outside
//! the gap barrier and may take part in gapped transitions.

use crate::alignment::AlignError;
use crate::compute::simd_abstraction::portable_intrinsics::_mm_load_si128;
use crate::compute::simd_abstraction::types::__m128i;
use crate::read::Read;
use crate::scoring::Scoring;

/// Number of reference characters the profile is built over (A, C, G, T, N).
pub const ALPHABET: usize = 5;

/// Lane width of the DP matrix words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneWidth {
    /// 8-bit words, 16 per vector.
    Lane8,
    /// 16-bit words, 8 per vector.
    Lane16,
}

impl LaneWidth {
    /// Words per 128-bit vector at this lane width.
    #[inline]
    pub fn words_per_vec(self) -> usize {
        match self {
            LaneWidth::Lane8 => 16,
            LaneWidth::Lane16 => 8,
        }
    }

    /// Largest representable lane value.
    #[inline]
    pub fn max_lane(self) -> i64 {
        match self {
            LaneWidth::Lane8 => u8::MAX as i64,
            LaneWidth::Lane16 => u16::MAX as i64,
        }
    }
}

#[repr(align(16))]
struct AlignedLanes([u8; 16]);

/// Per-read, per-scoring striped score lookup plus derived per-read bounds.
pub struct QueryProfile {
    lane: LaneWidth,
    qlen: usize,
    nvecrow: usize,
    /// Additive shift making every profile entry non-negative.
    pub bias: i64,
    /// Largest penalty magnitude across the read.
    pub max_penalty: i64,
    /// Largest bonus across the read.
    pub max_bonus: i64,
    /// Striped vector index holding the final read row.
    pub last_iter: usize,
    /// Lane within that vector holding the final read row.
    pub last_word: usize,
    profile: Vec<__m128i>,
    row_mask: Vec<__m128i>,
    gap_mask: Vec<__m128i>,
}

impl QueryProfile {
    /// Build the striped profile for `read` under `scoring` at the given lane
    /// width.
    pub fn build(read: &Read, scoring: &Scoring, lane: LaneWidth) -> Result<Self, AlignError> {
        if read.is_empty() {
            return Err(AlignError::EmptyRead);
        }
        let qlen = read.len();
        let wperv = lane.words_per_vec();
        let nvecrow = qlen.div_ceil(wperv);
        let lane_bytes = 16 / wperv;

        // Entry extrema decide the bias and the per-lane safety margin.
        let mut min_sc = 0i64;
        let mut max_sc = 0i64;
        for r in 0..qlen {
            let qual = read.qual[r] - 33;
            for c in 0..ALPHABET as u8 {
                let s = scoring.score(read.seq[r], c, qual);
                min_sc = min_sc.min(s);
                max_sc = max_sc.max(s);
            }
        }
        let bias = (-min_sc).max(0);
        let max_bonus = max_sc.max(0);
        if bias + max_bonus >= lane.max_lane() {
            return Err(AlignError::ScoreOverflow {
                bias,
                max_bonus,
                lane_max: lane.max_lane(),
            });
        }

        let mut profile = Vec::with_capacity(ALPHABET * nvecrow);
        for c in 0..ALPHABET as u8 {
            for v in 0..nvecrow {
                let mut w = AlignedLanes([0u8; 16]);
                for l in 0..wperv {
                    let r = l * nvecrow + v;
                    if r >= qlen {
                        continue;
                    }
                    let entry = scoring.score(read.seq[r], c, read.qual[r] - 33) + bias;
                    debug_assert!(entry >= 0 && entry <= lane.max_lane());
                    match lane {
                        LaneWidth::Lane8 => w.0[l] = entry as u8,
                        LaneWidth::Lane16 => {
                            w.0[l * 2..l * 2 + 2].copy_from_slice(&(entry as u16).to_le_bytes())
                        }
                    }
                }
                profile.push(unsafe { _mm_load_si128(w.0.as_ptr() as *const __m128i) });
            }
        }

        // Lane masks: all-ones where the lane's read row exists / may gap.
        let gapbar = scoring.gap_barrier;
        let build_mask = |allow: &dyn Fn(usize) -> bool| -> Vec<__m128i> {
            (0..nvecrow)
                .map(|v| {
                    let mut w = AlignedLanes([0u8; 16]);
                    for (byte, slot) in w.0.iter_mut().enumerate() {
                        let r = (byte / lane_bytes) * nvecrow + v;
                        if r < qlen && allow(r) {
                            *slot = 0xff;
                        }
                    }
                    unsafe { _mm_load_si128(w.0.as_ptr() as *const __m128i) }
                })
                .collect()
        };
        let row_mask = build_mask(&|_| true);
        let gap_mask = build_mask(&|r| r >= gapbar && r + gapbar < qlen);

        Ok(QueryProfile {
            lane,
            qlen,
            nvecrow,
            bias,
            max_penalty: -min_sc,
            max_bonus,
            last_iter: (qlen - 1) % nvecrow,
            last_word: (qlen - 1) / nvecrow,
            profile,
            row_mask,
            gap_mask,
        })
    }

    /// Lane width the profile was built for.
    #[inline]
    pub fn lane(&self) -> LaneWidth {
        self.lane
    }

    /// Read length.
    #[inline]
    pub fn qlen(&self) -> usize {
        self.qlen
    }

    /// Stripe stride (striped vector rows).
    #[inline]
    pub fn nvecrow(&self) -> usize {
        self.nvecrow
    }

    /// Profile column for a reference character: `nvecrow` vectors.
    #[inline]
    pub fn col(&self, refc: u8) -> &[__m128i] {
        debug_assert!((refc as usize) < ALPHABET);
        let base = refc as usize * self.nvecrow;
        &self.profile[base..base + self.nvecrow]
    }

    /// Per-striped-row validity masks (lanes holding real read rows).
    #[inline]
    pub fn row_mask(&self) -> &[__m128i] {
        &self.row_mask
    }

    /// Per-striped-row gap-permission masks (valid lanes outside the gap
    /// barrier).
    #[inline]
    pub fn gap_mask(&self) -> &[__m128i] {
        &self.gap_mask
    }
}
