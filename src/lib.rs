//! SIMD-striped Smith-Waterman alignment core.
//!
//! Performs gapped local and semi-global alignment of a short nucleotide read
//! (with per-base qualities) against a reference window, producing the
//! optimal score and, on request, randomly-sampled optimal backtraces that
//! stay distinct across repeated draws from the same filled matrix.
//!
//! The crate is the innermost layer of a short-read aligner: no I/O, no
//! seeding, no output formatting. A caller typically does
//!
//! ```
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use striped_sw::{AlignConfig, AlignOutcome, Read, Scoring, SwAligner};
//!
//! let scoring = Scoring {
//!     match_bonus: 1,
//!     gap_barrier: 0,
//!     ..Scoring::default()
//! };
//! let mut aligner = SwAligner::new(scoring, AlignConfig::default());
//! let read = Read::from_ascii(b"ACGTACGT", b"IIIIIIII");
//! assert!(aligner.init_read(read).unwrap());
//!
//! let window = striped_sw::read::encode_seq(b"ACGTACGT");
//! let outcome = aligner.align(&window);
//! let AlignOutcome::Aligned(dp) = outcome else { panic!() };
//! assert_eq!(dp.best_score, 8);
//!
//! let mut rng = StdRng::seed_from_u64(1);
//! let bt = aligner.backtrace(&mut rng).unwrap();
//! assert_eq!(bt.edits.len(), 8);
//! ```

pub mod alignment;
pub mod compute;
pub mod metrics;
pub mod read;
pub mod scoring;

pub use alignment::aligner::{AlignConfig, AlignOutcome, DpResult, LaneChoice, SwAligner};
pub use alignment::backtrace::{AlnOp, Backtrace, Edit, Transition};
pub use alignment::matrix::{CellType, MaskSlot, StripedMatrix};
pub use alignment::profile::{LaneWidth, QueryProfile};
pub use alignment::AlignError;
pub use metrics::AlignMetrics;
pub use read::Read;
pub use scoring::{CostModel, Scoring};
