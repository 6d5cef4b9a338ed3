//! DP and backtrace counters.
//!
//! Each worker owns one `AlignMetrics` and bumps it lock-free from the hot
//! path; a harness periodically folds workers into a global instance under a
//! mutex it supplies itself. The counter type deliberately carries no lock.

/// Monotonic counters for the striped DP kernel and the backtrace engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AlignMetrics {
    /// DP fills attempted
    pub dp: u64,
    /// DP fills that saturated a lane
    pub dpsat: u64,
    /// DP fills that missed the minimum score
    pub dpfail: u64,
    /// DP fills that produced a valid best score
    pub dpsucc: u64,
    /// DP columns filled
    pub col: u64,
    /// DP cells computed
    pub cell: u64,
    /// DP inner-loop iterations (striped rows)
    pub inner: u64,
    /// Lazy-F fix-up iterations
    pub fixup: u64,
    /// Cells examined while harvesting solution cells
    pub gathcell: u64,
    /// Solution cells found while harvesting
    pub gathsol: u64,
    /// Backtraces attempted
    pub bt: u64,
    /// Backtraces that failed
    pub btfail: u64,
    /// Backtraces that succeeded
    pub btsucc: u64,
    /// Backtrace cells traversed
    pub btcell: u64,
}

impl AlignMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fold another instance into this one, counter-wise. The caller is
    /// responsible for mutual exclusion around the destination.
    pub fn merge(&mut self, other: &AlignMetrics) {
        self.dp += other.dp;
        self.dpsat += other.dpsat;
        self.dpfail += other.dpfail;
        self.dpsucc += other.dpsucc;
        self.col += other.col;
        self.cell += other.cell;
        self.inner += other.inner;
        self.fixup += other.fixup;
        self.gathcell += other.gathcell;
        self.gathsol += other.gathsol;
        self.bt += other.bt;
        self.btfail += other.btfail;
        self.btsucc += other.btsucc;
        self.btcell += other.btcell;
    }
}
