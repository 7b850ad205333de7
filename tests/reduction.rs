use lwe_bkw_core::error::ReduceError;
use lwe_bkw_core::reduce::run_reduction_pass;
use lwe_bkw_core::sample::Sample;
use lwe_bkw_core::step::{BkwStepParameters, CodingType, Selection, SmoothLmsParameters, Sorting, StepPhase};
use lwe_bkw_core::storage::{CategoryPair, SampleSink, VecCategoryPairSource};

#[derive(Default)]
struct VecSink {
    samples: Vec<Sample>,
}

impl SampleSink for VecSink {
    fn write(&mut self, sample: &Sample) -> Result<(), ReduceError> {
        self.samples.push(sample.clone());
        Ok(())
    }

    fn finish(self) -> Result<u64, ReduceError> {
        Ok(self.samples.len() as u64)
    }
}

/// Scenario 5 (spec.md §8): LF1 over one category of 3 samples produces
/// exactly 2 outputs, `s0 - s1` and `s0 - s2`, both with the reduced
/// prefix zeroed out.
#[test]
fn lf1_single_category_reduces_prefix_to_zero() {
    let q = 101u32;
    let step = BkwStepParameters { sorting: Sorting::PlainBkw, start_index: 0, num_positions: 2, selection: Selection::Lf1 };

    let s0 = Sample::new(vec![10, 20, 3], 0, 50);
    let s1 = Sample::new(vec![10, 20, 7], 1, 60);
    let s2 = Sample::new(vec![10, 20, 9], 2, 70);
    let cell = vec![s0.clone(), s1.clone(), s2.clone()];

    let mut source = VecCategoryPairSource::new(vec![CategoryPair::Single(cell)]);
    let mut sink = VecSink::default();
    let stats = run_reduction_pass(&mut source, &mut sink, q, &step, 1_000_000).unwrap();

    assert_eq!(stats.samples_emitted, 2);
    assert_eq!(sink.samples.len(), 2);
    for out in &sink.samples {
        assert_eq!(out.a[0], 0);
        assert_eq!(out.a[1], 0);
    }
    let sub = |a: i64, b: i64| (a - b).rem_euclid(q as i64) as u16;
    assert_eq!(sink.samples[0].a[2], sub(3, 7));
    assert_eq!(sink.samples[1].a[2], sub(3, 9));
}

/// Scenario 6 (spec.md §8): with `unnatural_selection_ts = 5`, a reduced
/// prefix of `(3, 1)` is accepted (both components are below the
/// threshold, near zero) but `(7, 2)` is rejected (7 falls in the
/// "too large to be a good reduction" band `[ts, q/2]`).
#[test]
fn unnatural_selection_rejects_a_large_reduced_prefix_but_keeps_a_small_one() {
    let q = 101u32;
    let step = BkwStepParameters {
        sorting: Sorting::SmoothLms(SmoothLmsParameters {
            p: 10,
            p1: 10,
            p2: 10,
            phase: StepPhase::First,
            meta_skipped: 0,
            unnatural_selection_ts: 5,
            unnatural_selection_start_index: 0,
        }),
        start_index: 0,
        num_positions: 2,
        selection: Selection::Lf1,
    };

    // accepted case: difference (3, 1).
    let accepted = {
        let s0 = Sample::new(vec![3, 1], 0, 0);
        let s1 = Sample::new(vec![0, 0], 0, 0);
        let mut source = VecCategoryPairSource::new(vec![CategoryPair::Single(vec![s0, s1])]);
        let mut sink = VecSink::default();
        let stats = run_reduction_pass(&mut source, &mut sink, q, &step, 1_000_000).unwrap();
        (stats.samples_emitted, stats.samples_dropped_unnatural_selection)
    };
    assert_eq!(accepted, (1, 0));

    // rejected case: difference (7, 2); 7 is in [ts=5, q/2=50].
    let rejected = {
        let s0 = Sample::new(vec![7, 2], 0, 0);
        let s1 = Sample::new(vec![0, 0], 0, 0);
        let mut source = VecCategoryPairSource::new(vec![CategoryPair::Single(vec![s0, s1])]);
        let mut sink = VecSink::default();
        let stats = run_reduction_pass(&mut source, &mut sink, q, &step, 1_000_000).unwrap();
        (stats.samples_emitted, stats.samples_dropped_unnatural_selection)
    };
    assert_eq!(rejected, (0, 1));
}

/// LF2 over two categories produces every pairwise addition across them
/// in addition to every pairwise difference within each.
#[test]
fn lf2_cross_category_combination_covers_every_pair() {
    let q = 101u32;
    let step = BkwStepParameters { sorting: Sorting::PlainBkw, start_index: 0, num_positions: 1, selection: Selection::Lf2 };
    let b1 = vec![Sample::new(vec![1], 0, 10), Sample::new(vec![2], 0, 20)];
    let b2 = vec![Sample::new(vec![3], 0, 30), Sample::new(vec![4], 0, 40)];

    let mut source = VecCategoryPairSource::new(vec![CategoryPair::Pair(b1, b2)]);
    let mut sink = VecSink::default();
    let stats = run_reduction_pass(&mut source, &mut sink, q, &step, 1_000_000).unwrap();
    // within b1: 1 diff; within b2: 1 diff; across: 2*2 = 4 sums.
    assert_eq!(stats.samples_emitted, 1 + 1 + 4);
}

/// Coded BKW's bucket key is a codeword's first coordinate; pairing a
/// category with its own additive inverse must stay inside the reduction
/// pass's cap without panicking even when the coded-BKW step's syndrome
/// table is freshly generated in-process.
#[test]
fn coded_bkw_step_runs_end_to_end_through_the_reduction_pass() {
    let q = 101u32;
    let step = BkwStepParameters {
        sorting: Sorting::CodedBkw { coding: CodingType::Block21 },
        start_index: 0,
        num_positions: 2,
        selection: Selection::Lf1,
    };
    let cell = vec![Sample::new(vec![1, 2], 0, 0), Sample::new(vec![3, 4], 0, 0)];
    let mut source = VecCategoryPairSource::new(vec![CategoryPair::Single(cell)]);
    let mut sink = VecSink::default();
    let stats = run_reduction_pass(&mut source, &mut sink, q, &step, 1_000_000).unwrap();
    assert_eq!(stats.samples_emitted, 1);
}

/// A smooth-LMS `Middle`-phase step with `meta_skipped = 1` sub-sorts each
/// delivered category into a meta-grid over its trailing position before
/// combining (spec.md §4.4 step 1). A `Middle`-phase step reads one
/// position past `num_positions` (the coordinate handed off as the next
/// step's `prev_p1`), unlike `Last`; samples whose window up to and
/// including that extra position agree land in the same meta-cell and get
/// combined there. Two samples built to agree on that whole window but
/// differ on a position the step doesn't touch should reduce to a single
/// output with the shared window zeroed and the untouched position intact.
#[test]
fn smooth_lms_middle_phase_meta_sort_combines_within_a_cell() {
    let q = 101u32;
    let step = BkwStepParameters {
        sorting: Sorting::SmoothLms(SmoothLmsParameters {
            p: 10,
            p1: 10,
            p2: 10,
            phase: StepPhase::Middle { prev_p1: 50 },
            meta_skipped: 1,
            unnatural_selection_ts: 0,
            unnatural_selection_start_index: 0,
        }),
        start_index: 0,
        num_positions: 2,
        selection: Selection::Lf1,
    };
    // a[0..3] (this step's 2 own positions plus the 1 handed off to the
    // next step) agree between the two samples, so both land in the same
    // meta-grid cell no matter which bucket that window maps to; a[3] is
    // outside the step's window and differs, so the combined sample isn't
    // an all-zero column and survives.
    let s0 = Sample::new(vec![10, 20, 30, 99], 0, 50);
    let s1 = Sample::new(vec![10, 20, 30, 13], 0, 5);
    let mut source = VecCategoryPairSource::new(vec![CategoryPair::Single(vec![s0, s1])]);
    let mut sink = VecSink::default();
    let stats = run_reduction_pass(&mut source, &mut sink, q, &step, 1_000_000).unwrap();

    assert_eq!(stats.samples_emitted, 1);
    assert_eq!(sink.samples.len(), 1);
    let out = &sink.samples[0];
    assert_eq!(&out.a[..3], &[0, 0, 0]);
    assert_eq!(out.a[3], (99u16 as i64 - 13).rem_euclid(q as i64) as u16);
    assert_eq!(out.sum_with_error, (50u16 as i64 - 5).rem_euclid(q as i64) as u16);
}
