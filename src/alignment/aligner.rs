//! Per-worker alignment driver.
//!
//! Owns the non-shareable working set of one worker: the scoring scheme, the
//! reusable striped matrix, the per-read query profiles, and the metrics
//! counters. The intended flow is
//!
//! ```text
//! init_read -> align (per reference window) -> backtrace (zero or more)
//! ```
//!
//! The profile is reused across reference windows; the matrix buffer is
//! reused across reads; masks are reset by every fill. An 8-bit fill that
//! saturates is retried at 16-bit lanes when the lane width is left on auto.

use crate::alignment::backtrace::{self, Backtrace};
use crate::alignment::kernel::{self, FillResult};
use crate::alignment::matrix::StripedMatrix;
use crate::alignment::profile::{LaneWidth, QueryProfile};
use crate::alignment::AlignError;
use crate::metrics::AlignMetrics;
use crate::read::Read;
use crate::scoring::Scoring;
use rand::Rng;

/// Lane-width selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaneChoice {
    /// Start at 8-bit lanes, escalate to 16-bit on saturation.
    #[default]
    Auto,
    /// Always 8-bit lanes; saturation is reported, not retried.
    Lane8,
    /// Always 16-bit lanes.
    Lane16,
}

/// Driver configuration beyond the scoring scheme.
#[derive(Debug, Clone, Copy)]
pub struct AlignConfig {
    pub lane: LaneChoice,
    /// Local alignment (best cell anywhere) instead of semi-global (best
    /// end-of-read cell).
    pub local: bool,
}

impl Default for AlignConfig {
    fn default() -> Self {
        AlignConfig {
            lane: LaneChoice::Auto,
            local: false,
        }
    }
}

/// Result of a successful DP fill.
#[derive(Debug, Clone)]
pub struct DpResult {
    /// Best harvested score, offset-corrected.
    pub best_score: i64,
    /// The final fill still saturated (only possible with a pinned lane
    /// width, or scores beyond 16-bit range).
    pub saturated: bool,
    /// Matrix coordinates of the best cell; column `c` faces reference
    /// offset `c - 1`.
    pub best_cell: (usize, usize),
    /// Offset-corrected per-column maxima; floored columns report the floor.
    pub column_maxes: Option<Vec<i64>>,
}

/// Outcome of aligning the current read against one reference window.
#[derive(Debug, Clone)]
pub enum AlignOutcome {
    /// The read was rejected by the N filter before any DP ran.
    Filtered,
    /// The DP ran but no cell reached the minimum score.
    NoAlignment { best_score: i64 },
    Aligned(DpResult),
}

#[derive(Debug, Clone, Copy)]
struct FillState {
    lane: LaneWidth,
    offset: i64,
    floor: i64,
    best_cell: (usize, usize),
}

/// A single worker's aligner: profile, matrix, masks and counters.
pub struct SwAligner {
    scoring: Scoring,
    config: AlignConfig,
    mat: StripedMatrix,
    /// Per-worker counters; fold into a shared instance under the caller's
    /// lock.
    pub metrics: AlignMetrics,
    read: Option<Read>,
    filtered: bool,
    prof8: Option<QueryProfile>,
    prof16: Option<QueryProfile>,
    rf: Vec<u8>,
    state: Option<FillState>,
}

impl SwAligner {
    /// Build a driver. Aborts on unusable scoring parameters.
    pub fn new(scoring: Scoring, config: AlignConfig) -> Self {
        scoring.validate();
        SwAligner {
            scoring,
            config,
            mat: StripedMatrix::new(),
            metrics: AlignMetrics::new(),
            read: None,
            filtered: false,
            prof8: None,
            prof16: None,
            rf: Vec::new(),
            state: None,
        }
    }

    #[inline]
    pub fn scoring(&self) -> &Scoring {
        &self.scoring
    }

    /// Take on a new read: run the N filter and, if it passes, build the
    /// query profile at the configured starting lane width. Returns whether
    /// the read passed the filter.
    pub fn init_read(&mut self, read: Read) -> Result<bool, AlignError> {
        self.state = None;
        self.read = None;
        self.prof8 = None;
        self.prof16 = None;
        self.rf.clear();

        self.filtered = !self.scoring.n_filter(&read.seq);
        if !self.filtered {
            match self.config.lane {
                LaneChoice::Lane16 => {
                    self.prof16 = Some(QueryProfile::build(&read, &self.scoring, LaneWidth::Lane16)?);
                }
                LaneChoice::Lane8 => {
                    self.prof8 = Some(QueryProfile::build(&read, &self.scoring, LaneWidth::Lane8)?);
                }
                LaneChoice::Auto => {
                    match QueryProfile::build(&read, &self.scoring, LaneWidth::Lane8) {
                        Ok(p) => self.prof8 = Some(p),
                        Err(AlignError::ScoreOverflow { .. }) => {
                            log::debug!("profile exceeds 8-bit lanes, starting at 16-bit");
                            self.prof16 =
                                Some(QueryProfile::build(&read, &self.scoring, LaneWidth::Lane16)?);
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        self.read = Some(read);
        Ok(!self.filtered)
    }

    /// Fill the matrix for one reference window (encoded `0..=4`) and harvest
    /// the best score. Requires a prior `init_read`.
    pub fn align(&mut self, rf: &[u8]) -> AlignOutcome {
        assert!(self.read.is_some(), "init_read must precede align");
        if self.filtered {
            return AlignOutcome::Filtered;
        }
        assert!(!rf.is_empty(), "empty reference window");
        assert!(rf.iter().all(|&b| b <= 4), "reference codes must be 0..=4");
        self.rf.clear();
        self.rf.extend_from_slice(rf);

        self.metrics.dp += 1;
        let read_len = self.read.as_ref().unwrap().len();
        let mut lane = if self.prof8.is_some() {
            LaneWidth::Lane8
        } else {
            LaneWidth::Lane16
        };
        if lane == LaneWidth::Lane8
            && self.config.lane == LaneChoice::Auto
            && !self.config.local
            && !self.seed_fits(self.prof8.as_ref().unwrap(), read_len)
        {
            // The semi-global seed alone would blow the 8-bit range; the
            // fill could only saturate, so go straight to 16-bit lanes.
            log::debug!("semi-global seed exceeds 8-bit headroom, starting at 16-bit lanes");
            self.metrics.dpsat += 1;
            lane = LaneWidth::Lane16;
        }
        let (mut res, mut init_h) = self.fill_at(lane);
        if res.saturated {
            self.metrics.dpsat += 1;
            if lane == LaneWidth::Lane8 && self.config.lane == LaneChoice::Auto {
                log::debug!("8-bit fill saturated, escalating to 16-bit lanes");
                lane = LaneWidth::Lane16;
                (res, init_h) = self.fill_at(lane);
                if res.saturated {
                    self.metrics.dpsat += 1;
                }
            }
        }

        let offset = -init_h;
        let floor = self.scoring.floor_score(read_len).max(-init_h);

        // Solution-cell harvest.
        let (best_stored, best_cell) = if self.config.local {
            let mut best = 0i64;
            let mut best_col = 1usize;
            for (c, &m) in res.col_max.iter().enumerate().skip(1) {
                self.metrics.gathcell += 1;
                if m > best {
                    best = m;
                    best_col = c;
                }
            }
            let mut best_row = 0usize;
            for row in 0..read_len {
                self.metrics.gathcell += 1;
                if self.mat.helt(row, best_col) == best {
                    self.metrics.gathsol += 1;
                    best_row = row;
                    break;
                }
            }
            (best, (best_row, best_col))
        } else {
            let mut best = 0i64;
            let mut best_col = 1usize;
            for (c, &m) in res.last_row.iter().enumerate().skip(1) {
                self.metrics.gathcell += 1;
                if m > best {
                    best = m;
                    best_col = c;
                }
            }
            self.metrics.gathsol += 1;
            (best, (read_len - 1, best_col))
        };

        let best_score = best_stored + offset;
        self.state = Some(FillState {
            lane,
            offset,
            floor,
            best_cell,
        });

        if best_score < self.scoring.min_score(read_len) {
            self.metrics.dpfail += 1;
            return AlignOutcome::NoAlignment { best_score };
        }
        self.metrics.dpsucc += 1;
        AlignOutcome::Aligned(DpResult {
            best_score,
            saturated: res.saturated,
            best_cell,
            column_maxes: Some(res.col_max.iter().map(|&m| m + offset).collect()),
        })
    }

    /// Draw one random optimal backtrace from the best cell of the last fill.
    pub fn backtrace<R: Rng>(&mut self, rng: &mut R) -> Option<Backtrace> {
        let cell = self
            .state
            .as_ref()
            .expect("align must precede backtrace")
            .best_cell;
        self.backtrace_from(cell, rng)
    }

    /// Draw one random optimal backtrace from a caller-chosen terminal H
    /// cell of the last fill.
    pub fn backtrace_from<R: Rng>(
        &mut self,
        terminal: (usize, usize),
        rng: &mut R,
    ) -> Option<Backtrace> {
        let st = *self.state.as_ref().expect("align must precede backtrace");
        backtrace::backtrace_from(
            &mut self.mat,
            self.read.as_ref().unwrap(),
            &self.rf,
            &self.scoring,
            terminal,
            st.offset,
            st.floor,
            rng,
            &mut self.metrics,
        )
    }

    /// Stored-domain view of the last fill's matrix, for inspection.
    #[inline]
    pub fn matrix(&self) -> &StripedMatrix {
        &self.mat
    }

    /// Lane width the last fill ran at.
    pub fn last_lane(&self) -> Option<LaneWidth> {
        self.state.as_ref().map(|s| s.lane)
    }

    /// Semi-global seed for the conceptual row above the matrix. At least the
    /// profile bias, and when the lane has the headroom, large enough that a
    /// floor-clamped restart (worth at most `-seed + all-match gain`) can
    /// never reach the minimum score.
    fn semi_seed(&self, prof: &QueryProfile, read_len: usize) -> i64 {
        let gain = read_len as i64 * self.scoring.match_bonus as i64;
        let want = prof.bias.max(gain - self.scoring.min_score(read_len) + 1);
        if want + gain < prof.lane().max_lane() - prof.bias {
            want
        } else {
            prof.bias
        }
    }

    /// Whether genuine semi-global paths fit this profile's lane range on top
    /// of the restart-proof seed.
    fn seed_fits(&self, prof: &QueryProfile, read_len: usize) -> bool {
        let gain = read_len as i64 * self.scoring.match_bonus as i64;
        let want = prof.bias.max(gain - self.scoring.min_score(read_len) + 1);
        want + gain < prof.lane().max_lane() - prof.bias
    }

    fn fill_at(&mut self, lane: LaneWidth) -> (FillResult, i64) {
        let read = self.read.as_ref().unwrap();
        if lane == LaneWidth::Lane16 && self.prof16.is_none() {
            // Escalation path; 16-bit lanes accommodate any scoring the
            // 8-bit profile accepted.
            self.prof16 = Some(
                QueryProfile::build(read, &self.scoring, LaneWidth::Lane16)
                    .expect("16-bit profile must fit where 8-bit did"),
            );
        }
        let read_len = read.len();
        let prof = match lane {
            LaneWidth::Lane8 => self.prof8.as_ref().unwrap(),
            LaneWidth::Lane16 => self.prof16.as_ref().unwrap(),
        };
        let init_h = if self.config.local {
            0
        } else {
            self.semi_seed(prof, read_len)
        };
        let res = kernel::fill(
            prof,
            &self.rf,
            init_h,
            &self.scoring,
            &mut self.mat,
            &mut self.metrics,
        );
        (res, init_h)
    }
}
