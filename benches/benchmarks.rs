use lwe_bkw_core::{
    cache::TableManager,
    error::ReduceError,
    index::{
        category_index, position_values_to_category_index_plain_bkw,
        position_values_to_category_index_smooth_lms,
    },
    random::custom_thread_rng,
    reduce::{additive_inverse, run_reduction_pass},
    sample::Sample,
    step::{BkwStepParameters, CodingType, Selection, Sorting, SmoothLmsParameters, StepPhase},
    storage::{CategoryPair, SampleSink, VecCategoryPairSource},
};
use std::hint::black_box;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::Rng;

const Q: u32 = 1601;

fn plain_bkw_step() -> BkwStepParameters {
    BkwStepParameters { sorting: Sorting::PlainBkw, start_index: 0, num_positions: 2, selection: Selection::Lf1 }
}

fn lms_step() -> BkwStepParameters {
    BkwStepParameters { sorting: Sorting::Lms { p: 40 }, start_index: 0, num_positions: 4, selection: Selection::Lf1 }
}

fn smooth_lms_step() -> BkwStepParameters {
    BkwStepParameters {
        sorting: Sorting::SmoothLms(SmoothLmsParameters {
            p: 40,
            p1: 30,
            p2: 0,
            phase: StepPhase::First,
            meta_skipped: 0,
            unnatural_selection_ts: 0,
            unnatural_selection_start_index: 0,
        }),
        start_index: 0,
        num_positions: 4,
        selection: Selection::Lf1,
    }
}

fn coded_bkw_step() -> BkwStepParameters {
    BkwStepParameters {
        sorting: Sorting::CodedBkw { coding: CodingType::Block21 },
        start_index: 0,
        num_positions: 2,
        selection: Selection::Lf1,
    }
}

/// A column of random samples sharing nothing in particular — enough to
/// drive the combine loop at a representative cell size without a real
/// sorted sample store on disk.
fn random_cell(n: usize, size: usize) -> Vec<Sample> {
    let mut rng = custom_thread_rng();
    (0..size)
        .map(|_| {
            let a: Vec<u16> = (0..n).map(|_| rng.gen_range(0..Q as u16)).collect();
            let e: i16 = rng.gen_range(-5..=5);
            let b: u16 = rng.gen_range(0..Q as u16);
            Sample::new(a, e, b)
        })
        .collect()
}

pub fn index_mapping_benchmarks(c: &mut Criterion) {
    c.bench_function("plain_bkw_category_index", |b| {
        b.iter(|| black_box(position_values_to_category_index_plain_bkw(Q, 733, 1200)))
    });

    c.bench_function("lms_category_index", |b| {
        let mut tables = TableManager::new();
        let step = lms_step();
        // warm the cache once; the benchmark measures steady-state lookups,
        // not the one-time recursive table build.
        category_index(Q, 20, &[5, 17, 23, 2], &step, &mut tables).unwrap();
        b.iter(|| black_box(category_index(Q, 20, &[5, 17, 23, 2], &step, &mut tables).unwrap()))
    });

    c.bench_function("smooth_lms_category_index", |b| {
        let step = smooth_lms_step();
        b.iter(|| black_box(position_values_to_category_index_smooth_lms(Q, 20, &[5, 17, 23, 2, 9], &step).unwrap()))
    });

    c.bench_function("coded_bkw_category_index", |b| {
        let mut tables = TableManager::new();
        let step = coded_bkw_step();
        // the [2,1] syndrome table is generated once and reused by the cache.
        category_index(Q, 20, &[5, 17], &step, &mut tables).unwrap();
        b.iter(|| black_box(category_index(Q, 20, &[5, 17], &step, &mut tables).unwrap()))
    });

    c.bench_function("additive_inverse", |b| {
        b.iter(|| black_box(additive_inverse(Q as u64 * Q as u64, 12345)))
    });
}

/// An in-memory sink that counts writes instead of touching disk, so the
/// benchmark measures the combine loop, not filesystem I/O.
#[derive(Default)]
struct CountingSink {
    count: u64,
}

impl SampleSink for CountingSink {
    fn write(&mut self, _sample: &Sample) -> Result<(), ReduceError> {
        self.count += 1;
        Ok(())
    }

    fn finish(self) -> Result<u64, ReduceError> {
        Ok(self.count)
    }
}

pub fn reduction_pass_benchmarks(c: &mut Criterion) {
    let n = 20;
    let step = plain_bkw_step();

    c.bench_function("lf1_combine_single_category", |b| {
        b.iter_batched(
            || vec![CategoryPair::Single(random_cell(n, 64))],
            |pairs| {
                let mut source = VecCategoryPairSource::new(pairs);
                let mut sink = CountingSink::default();
                black_box(run_reduction_pass(&mut source, &mut sink, Q, &step, 1_000_000).unwrap())
            },
            BatchSize::SmallInput,
        )
    });

    let lf2_step = BkwStepParameters { selection: Selection::Lf2, ..plain_bkw_step() };
    c.bench_function("lf2_combine_category_pair", |b| {
        b.iter_batched(
            || vec![CategoryPair::Pair(random_cell(n, 64), random_cell(n, 64))],
            |pairs| {
                let mut source = VecCategoryPairSource::new(pairs);
                let mut sink = CountingSink::default();
                black_box(run_reduction_pass(&mut source, &mut sink, Q, &lf2_step, 1_000_000).unwrap())
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, index_mapping_benchmarks, reduction_pass_benchmarks);
criterion_main!(benches);
