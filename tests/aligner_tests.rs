// End-to-end driver scenarios: filtering, fills, score harvest, lane
// escalation, and the per-worker metrics contract.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::Mutex;
use striped_sw::{
    AlignConfig, AlignMetrics, AlignOutcome, AlnOp, CostModel, LaneChoice, LaneWidth, Read,
    Scoring, SwAligner,
};

fn quals(len: usize) -> Vec<u8> {
    vec![b'I'; len]
}

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn encode(s: &[u8]) -> Vec<u8> {
    striped_sw::read::encode_seq(s)
}

fn aligned(outcome: AlignOutcome) -> striped_sw::DpResult {
    match outcome {
        AlignOutcome::Aligned(dp) => dp,
        other => panic!("expected an alignment, got {other:?}"),
    }
}

#[test]
fn test_exact_match_read() {
    // all penalties well above the match bonus; the only optimal alignment
    // is the full-length exact match
    let sc = Scoring {
        match_bonus: 1,
        mismatch: CostModel::Constant(30),
        n_penalty: CostModel::Constant(30),
        read_gap_open: 30,
        read_gap_extend: 30,
        ref_gap_open: 30,
        ref_gap_extend: 30,
        gap_barrier: 0,
        ..Scoring::default()
    };
    let mut al = SwAligner::new(sc, AlignConfig::default());
    assert!(al
        .init_read(Read::from_ascii(b"ACGTACGT", &quals(8)))
        .unwrap());
    let dp = aligned(al.align(&encode(b"ACGTACGT")));
    assert_eq!(dp.best_score, 8);
    assert!(!dp.saturated);
    assert_eq!(dp.best_cell, (7, 8));

    let mut rng = StdRng::seed_from_u64(1);
    let bt = al.backtrace(&mut rng).unwrap();
    assert_eq!(bt.score, 8);
    assert_eq!(bt.edits.len(), 8);
    assert!(bt.edits.iter().all(|e| e.op == AlnOp::Match));
    assert_eq!(bt.start_cell, (0, 1));
    assert_eq!(bt.end_cell, (7, 8));

    assert_eq!(al.metrics.dp, 1);
    assert_eq!(al.metrics.dpsucc, 1);
    assert_eq!(al.metrics.col, 8);
    assert_eq!(al.metrics.bt, 1);
    assert_eq!(al.metrics.btsucc, 1);
    assert_eq!(al.metrics.btcell, 8);
}

#[test]
fn test_single_mismatch() {
    let sc = Scoring {
        match_bonus: 1,
        mismatch: CostModel::Constant(4),
        n_penalty: CostModel::Constant(1),
        gap_barrier: 4,
        ..Scoring::default()
    };
    let mut al = SwAligner::new(sc, AlignConfig::default());
    al.init_read(Read::from_ascii(b"ACGTACGT", &quals(8)))
        .unwrap();
    let dp = aligned(al.align(&encode(b"ACGAACGT")));
    assert_eq!(dp.best_score, 7 - 4);

    let mut rng = StdRng::seed_from_u64(3);
    let bt = al.backtrace(&mut rng).unwrap();
    assert_eq!(bt.score, 3);
    assert_eq!(bt.edits.len(), 8);
    let mismatches: Vec<_> = bt
        .edits
        .iter()
        .filter(|e| e.op == AlnOp::Mismatch)
        .collect();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].read_pos, 3);
    assert_eq!(mismatches[0].ref_pos, 3);
}

#[test]
fn test_single_read_gap() {
    // the reference carries one extra base; a single read gap recovers the
    // full match run: 8 * 2 - open(2) = 14
    let sc = Scoring {
        match_bonus: 2,
        mismatch: CostModel::Constant(6),
        n_penalty: CostModel::Constant(1),
        read_gap_open: 2,
        read_gap_extend: 1,
        ref_gap_open: 2,
        ref_gap_extend: 1,
        gap_barrier: 1,
        ..Scoring::default()
    };
    let mut al = SwAligner::new(sc, AlignConfig::default());
    al.init_read(Read::from_ascii(b"ACGTACGT", &quals(8)))
        .unwrap();
    let dp = aligned(al.align(&encode(b"ACGTTACGT")));
    assert_eq!(dp.best_score, 14);

    let mut rng = StdRng::seed_from_u64(5);
    let bt = al.backtrace(&mut rng).unwrap();
    assert_eq!(bt.score, 14);
    let gaps: Vec<_> = bt.edits.iter().filter(|e| e.op == AlnOp::ReadGap).collect();
    let matches = bt.edits.iter().filter(|e| e.op == AlnOp::Match).count();
    assert_eq!(gaps.len(), 1, "exactly one read gap, got {:?}", bt.edits);
    assert_eq!(matches, 8);
}

#[test]
fn test_gap_barrier_blocks_end_gaps() {
    // same sequences as the read-gap scenario, but the barrier covers the
    // rows the gap would need, so the gapped alignment is unreachable
    let sc = Scoring {
        match_bonus: 2,
        mismatch: CostModel::Constant(6),
        n_penalty: CostModel::Constant(1),
        read_gap_open: 2,
        read_gap_extend: 1,
        ref_gap_open: 2,
        ref_gap_extend: 1,
        gap_barrier: 4,
        min_score_const: -100.0,
        ..Scoring::default()
    };
    let mut al = SwAligner::new(sc, AlignConfig::default());
    al.init_read(Read::from_ascii(b"ACGTACGT", &quals(8)))
        .unwrap();
    let dp = aligned(al.align(&encode(b"ACGTTACGT")));
    // best gap-free path: read against ref[1..], 5 matches and 3 mismatches
    assert_eq!(dp.best_score, -8);

    let mut rng = StdRng::seed_from_u64(2);
    let bt = al.backtrace(&mut rng).unwrap();
    assert_eq!(bt.score, -8);
    assert!(bt
        .edits
        .iter()
        .all(|e| matches!(e.op, AlnOp::Match | AlnOp::Mismatch)));

    // with the default minimum score the same fill is a miss
    let sc2 = Scoring {
        min_score_const: 0.0,
        ..al.scoring().clone()
    };
    let mut al2 = SwAligner::new(sc2, AlignConfig::default());
    al2.init_read(Read::from_ascii(b"ACGTACGT", &quals(8)))
        .unwrap();
    match al2.align(&encode(b"ACGTTACGT")) {
        AlignOutcome::NoAlignment { best_score } => assert_eq!(best_score, -8),
        other => panic!("expected NoAlignment, got {other:?}"),
    }
    assert_eq!(al2.metrics.dpfail, 1);
}

#[test]
fn test_saturation_escalates_to_16bit() {
    init_logs();
    let sc = Scoring {
        match_bonus: 1,
        gap_barrier: 4,
        ..Scoring::default()
    };
    let seq = vec![b'A'; 512];
    let mut al = SwAligner::new(sc.clone(), AlignConfig::default());
    al.init_read(Read::from_ascii(&seq, &quals(512))).unwrap();
    let dp = aligned(al.align(&encode(&seq)));
    assert_eq!(dp.best_score, 512);
    assert!(!dp.saturated);
    assert_eq!(al.last_lane(), Some(LaneWidth::Lane16));
    assert!(al.metrics.dpsat >= 1);
}

#[test]
fn test_saturation_reported_on_pinned_8bit() {
    let sc = Scoring {
        match_bonus: 1,
        gap_barrier: 4,
        ..Scoring::default()
    };
    let seq = vec![b'A'; 512];
    let mut al = SwAligner::new(
        sc.clone(),
        AlignConfig {
            lane: LaneChoice::Lane8,
            ..AlignConfig::default()
        },
    );
    al.init_read(Read::from_ascii(&seq, &quals(512))).unwrap();
    let dp = aligned(al.align(&encode(&seq)));
    assert!(dp.saturated);
    assert_eq!(al.metrics.dpsat, 1);

    // the caller's retry at 16-bit lanes gets the real score
    let mut al16 = SwAligner::new(
        sc,
        AlignConfig {
            lane: LaneChoice::Lane16,
            ..AlignConfig::default()
        },
    );
    al16.init_read(Read::from_ascii(&seq, &quals(512))).unwrap();
    let dp = aligned(al16.align(&encode(&seq)));
    assert_eq!(dp.best_score, 512);
    assert!(!dp.saturated);
}

#[test]
fn test_n_filter_gates_alignment() {
    let sc = Scoring {
        match_bonus: 1,
        n_ceil_const: 1.0,
        n_ceil_linear: 0.1,
        gap_barrier: 4,
        ..Scoring::default()
    };
    let mut al = SwAligner::new(sc, AlignConfig::default());

    // one N in ten bases passes
    assert!(al
        .init_read(Read::from_ascii(b"ACGTNACGTA", &quals(10)))
        .unwrap());
    assert!(matches!(
        al.align(&encode(b"ACGTAACGTA")),
        AlignOutcome::Aligned(_)
    ));

    // three Ns exceed the ceiling of two; no DP runs
    let dp_before = al.metrics.dp;
    assert!(!al
        .init_read(Read::from_ascii(b"NCGTNACGTN", &quals(10)))
        .unwrap());
    assert!(matches!(
        al.align(&encode(b"ACGTAACGTA")),
        AlignOutcome::Filtered
    ));
    assert_eq!(al.metrics.dp, dp_before);
}

#[test]
fn test_local_mode_picks_best_cell_anywhere() {
    // a perfect 4-base island inside otherwise hostile sequence; local
    // harvest finds it, and the backtrace stops at the island edge
    let sc = Scoring {
        match_bonus: 2,
        mismatch: CostModel::Constant(6),
        n_penalty: CostModel::Constant(6),
        read_gap_open: 10,
        read_gap_extend: 6,
        ref_gap_open: 10,
        ref_gap_extend: 6,
        gap_barrier: 0,
        ..Scoring::default()
    };
    let mut al = SwAligner::new(
        sc,
        AlignConfig {
            local: true,
            ..AlignConfig::default()
        },
    );
    al.init_read(Read::from_ascii(b"TTTTACGTTTTT", &quals(12)))
        .unwrap();
    let dp = aligned(al.align(&encode(b"GGGGACGTGGGG")));
    assert_eq!(dp.best_score, 8);
    // rows 3..=7 hold TACGT; the island ACGT ends at row 7, ref offset 7
    assert_eq!(dp.best_cell, (7, 8));

    let mut rng = StdRng::seed_from_u64(11);
    let bt = al.backtrace(&mut rng).unwrap();
    assert_eq!(bt.score, 8);
    assert_eq!(bt.edits.len(), 4);
    assert!(bt.edits.iter().all(|e| e.op == AlnOp::Match));
    assert_eq!(bt.edits[0].read_pos, 4);
    assert_eq!(bt.edits[0].ref_pos, 4);
}

#[test]
fn test_profile_reuse_across_windows() {
    let sc = Scoring {
        match_bonus: 1,
        mismatch: CostModel::Constant(4),
        gap_barrier: 4,
        ..Scoring::default()
    };
    let mut al = SwAligner::new(sc, AlignConfig::default());
    al.init_read(Read::from_ascii(b"ACGTACGT", &quals(8)))
        .unwrap();
    let first = aligned(al.align(&encode(b"ACGTACGT"))).best_score;
    let second = aligned(al.align(&encode(b"TTACGTACGTTT"))).best_score;
    let third = aligned(al.align(&encode(b"ACGTACGT"))).best_score;
    assert_eq!(first, 8);
    assert_eq!(second, 8);
    assert_eq!(third, first);
    assert_eq!(al.metrics.dp, 3);
}

#[test]
fn test_metrics_merge_across_workers() {
    // per-worker counters fold into a shared instance under an external
    // mutex, the contract the threading harness relies on
    let sc = Scoring {
        match_bonus: 1,
        mismatch: CostModel::Constant(4),
        gap_barrier: 4,
        ..Scoring::default()
    };
    let global = Mutex::new(AlignMetrics::new());
    let reads_per_worker = 5usize;
    (0..4u64).into_par_iter().for_each(|worker| {
        let mut al = SwAligner::new(sc.clone(), AlignConfig::default());
        let mut rng = StdRng::seed_from_u64(worker);
        for _ in 0..reads_per_worker {
            al.init_read(Read::from_ascii(b"ACGTACGT", &quals(8)))
                .unwrap();
            let _ = aligned(al.align(&encode(b"ACGTACGT")));
            let _ = al.backtrace(&mut rng);
        }
        global.lock().unwrap().merge(&al.metrics);
    });
    let g = global.lock().unwrap();
    assert_eq!(g.dp, 20);
    assert_eq!(g.dpsucc, 20);
    assert_eq!(g.bt, 20);
    assert_eq!(g.btsucc, 20);
    assert_eq!(g.col, 20 * 8);
}
