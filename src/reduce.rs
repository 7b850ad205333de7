//! Reduction pass (C4): consumes sorted category pairs and combines
//! reducible samples pairwise, with optional smooth-LMS meta-category
//! sub-sorting and unnatural-selection filtering.

use crate::error::ReduceError;
use crate::index::smooth_lms_position_values_and_buckets;
use crate::sample::Sample;
use crate::step::{BkwStepParameters, Selection, Sorting};
use crate::storage::{CategoryPair, CategoryPairSource, SampleSink};

/// The additive-inverse of a 1-D category index in a space of size `c`:
/// `inv(0) = 0`, `inv(i) = c - i` for odd `c`; `inv(i) = c - i - 1` for
/// even `c` (there is no fixed point).
pub fn additive_inverse(c: u64, i: u64) -> u64 {
    if c % 2 == 0 {
        c - i - 1
    } else if i == 0 {
        0
    } else {
        c - i
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReductionStats {
    pub samples_emitted: u64,
    pub samples_dropped_zero: u64,
    pub samples_dropped_unnatural_selection: u64,
}

/// A trivial wrapper around modular add/subtract; named to match the
/// "precomputed sum/difference tables" the algorithm description refers
/// to, though for a runtime-sized `q` a direct computation is both
/// simpler and just as fast as a materialized table.
struct SumDiffTables {
    q: u32,
}

impl SumDiffTables {
    fn try_new(q: u32) -> Result<Self, ReduceError> {
        if q == 0 {
            return Err(ReduceError::SumDiffTableCreation);
        }
        Ok(Self { q })
    }

    #[inline]
    fn add(&self, a: u16, b: u16) -> u16 {
        ((a as u32 + b as u32) % self.q) as u16
    }

    #[inline]
    fn sub(&self, a: u16, b: u16) -> u16 {
        ((a as u32 + self.q - b as u32) % self.q) as u16
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CombineOp {
    Add,
    Sub,
}

fn combine_samples(op: CombineOp, tables: &SumDiffTables, s1: &Sample, s2: &Sample) -> Sample {
    let a: Vec<u16> = s1
        .a
        .iter()
        .zip(&s2.a)
        .map(|(&x, &y)| match op {
            CombineOp::Add => tables.add(x, y),
            CombineOp::Sub => tables.sub(x, y),
        })
        .collect();
    let error = s1.error_term().combine(s2.error_term(), |x, y| match op {
        CombineOp::Add => x + y,
        CombineOp::Sub => x - y,
    });
    let sum_with_error = match op {
        CombineOp::Add => tables.add(s1.sum_with_error, s2.sum_with_error),
        CombineOp::Sub => tables.sub(s1.sum_with_error, s2.sum_with_error),
    };
    Sample::new(a, error.into_raw(), sum_with_error)
}

/// LF1 within one cell: `k-1` differences, all against the first sample.
fn combine_cell_lf1(cell: &[Sample], tables: &SumDiffTables) -> Vec<Sample> {
    if cell.len() < 2 {
        return Vec::new();
    }
    cell[1..].iter().map(|s| combine_samples(CombineOp::Sub, tables, &cell[0], s)).collect()
}

/// LF2 within one cell: every pairwise difference.
fn combine_cell_lf2(cell: &[Sample], tables: &SumDiffTables) -> Vec<Sample> {
    let mut out = Vec::new();
    for i in 0..cell.len() {
        for j in (i + 1)..cell.len() {
            out.push(combine_samples(CombineOp::Sub, tables, &cell[i], &cell[j]));
        }
    }
    out
}

/// LF1 across two cells: `|b2|` additions, anchored at `b1[0]`.
fn combine_cross_lf1(b1: &[Sample], b2: &[Sample], tables: &SumDiffTables) -> Vec<Sample> {
    if b1.is_empty() || b2.is_empty() {
        return Vec::new();
    }
    b2.iter().map(|s| combine_samples(CombineOp::Add, tables, &b1[0], s)).collect()
}

/// LF2 across two cells: every pairwise addition.
fn combine_cross_lf2(b1: &[Sample], b2: &[Sample], tables: &SumDiffTables) -> Vec<Sample> {
    let mut out = Vec::with_capacity(b1.len() * b2.len());
    for s1 in b1 {
        for s2 in b2 {
            out.push(combine_samples(CombineOp::Add, tables, s1, s2));
        }
    }
    out
}

fn combine_single_cell(cell: &[Sample], selection: Selection, tables: &SumDiffTables) -> Vec<Sample> {
    match selection {
        Selection::Lf1 => combine_cell_lf1(cell, tables),
        Selection::Lf2 => combine_cell_lf2(cell, tables),
    }
}

fn combine_cell_pair(b1: &[Sample], b2: &[Sample], selection: Selection, tables: &SumDiffTables) -> Vec<Sample> {
    let mut out = combine_single_cell(b1, selection, tables);
    out.extend(combine_single_cell(b2, selection, tables));
    out.extend(match selection {
        Selection::Lf1 => combine_cross_lf1(b1, b2, tables),
        Selection::Lf2 => combine_cross_lf2(b1, b2, tables),
    });
    out
}

/// Splits a category's samples into a meta-category grid over its
/// trailing `meta_skipped` (1 or 2) positions, using the same bucket
/// function ([`crate::index::position_smooth_lms_map`]) the category
/// index itself is built from. Cell `i` (or `(mid, last)` when
/// `meta_skipped == 2`, flattened row-major) holds every sample whose
/// trailing position bucket(s) equal `i`.
struct MetaGrid {
    c_last: u64,
    c_mid: Option<u64>,
    cells: Vec<Vec<Sample>>,
}

fn build_meta_grid(
    samples: Vec<Sample>,
    q: u32,
    step: &BkwStepParameters,
) -> Result<MetaGrid, ReduceError> {
    let Sorting::SmoothLms(params) = &step.sorting else {
        return Err(ReduceError::UnsupportedMetaSkipped(0));
    };
    let meta_skipped = params.meta_skipped;
    if meta_skipped == 0 || meta_skipped > 2 {
        return Err(ReduceError::UnsupportedMetaSkipped(meta_skipped));
    }
    // A first or middle step consumes one extra raw position beyond
    // `num_positions` (a p1-bucketed coordinate carried forward as the next
    // step's `prev_p1`); only the last step (no next step to hand off to)
    // consumes exactly `num_positions`. See the matching branches in
    // `smooth_lms_position_values_and_buckets`, which read `pn[ni]` for
    // both `First` and `Middle`.
    let start = step.start_index;
    let ni = step.num_positions;
    let width = ni + usize::from(!matches!(params.phase, crate::step::StepPhase::Last { .. }));
    let probe_pn = vec![0u32; width];
    let (_, c) = smooth_lms_position_values_and_buckets(q, &probe_pn, step)?;
    let tail = &c[c.len() - meta_skipped as usize..];
    let c_last = tail[tail.len() - 1];
    let c_mid = if meta_skipped == 2 { Some(tail[0]) } else { None };
    let grid_size = c_last * c_mid.unwrap_or(1);
    let mut cells: Vec<Vec<Sample>> = (0..grid_size).map(|_| Vec::new()).collect();

    for sample in samples {
        let pn: Vec<u32> = sample.a[start..start + width].iter().map(|&v| v as u32).collect();
        let (t, _) = smooth_lms_position_values_and_buckets(q, &pn, step)?;
        let tail_t = &t[t.len() - meta_skipped as usize..];
        let last = tail_t[tail_t.len() - 1].min(c_last - 1);
        let cell_index = match c_mid {
            Some(_) => tail_t[0] * c_last + last,
            None => last,
        };
        cells[cell_index.min(grid_size - 1) as usize].push(sample);
    }
    Ok(MetaGrid { c_last, c_mid, cells })
}

fn drop_zero_columns(samples: Vec<Sample>, stats: &mut ReductionStats) -> Vec<Sample> {
    samples
        .into_iter()
        .filter(|s| {
            if s.is_zero_column() {
                stats.samples_dropped_zero += 1;
                false
            } else {
                true
            }
        })
        .collect()
}

fn passes_unnatural_selection(sample: &Sample, step: &BkwStepParameters, q: u32) -> bool {
    let Sorting::SmoothLms(params) = &step.sorting else { return true };
    let ts = params.unnatural_selection_ts;
    if ts == 0 {
        return true;
    }
    let start = params.unnatural_selection_start_index;
    let end = (start + step.num_positions).min(sample.a.len());
    let half = q / 2;
    for &d in &sample.a[start..end] {
        let d = d as u32;
        if (ts as u32..=half).contains(&d) || ((half + 1)..=(q - ts)).contains(&d) {
            return false;
        }
    }
    true
}

/// Runs the full reduction pass, streaming category pairs from `source`
/// and writing surviving samples to `sink`, up to `ceil(4 * max_num_samples
/// / 3)` accepted outputs.
pub fn run_reduction_pass(
    source: &mut impl CategoryPairSource,
    sink: &mut impl SampleSink,
    q: u32,
    step: &BkwStepParameters,
    max_num_samples: u64,
) -> Result<ReductionStats, ReduceError> {
    step.validate()?;
    let tables = SumDiffTables::try_new(q)?;
    let quadrupled = max_num_samples.saturating_mul(4);
    let cap = if quadrupled % 3 == 0 { quadrupled / 3 } else { quadrupled / 3 + 1 };
    let meta_skipped = match &step.sorting {
        Sorting::SmoothLms(params) => params.meta_skipped,
        _ => 0,
    };
    let mut stats = ReductionStats::default();

    loop {
        if stats.samples_emitted >= cap {
            break;
        }
        let pair = source.next_adjacent_pair()?;
        let combined = match pair {
            CategoryPair::End => break,
            CategoryPair::Single(b) => {
                if meta_skipped > 0 {
                    combine_meta(b, None, q, step, &tables)?
                } else {
                    combine_single_cell(&b, step.selection, &tables)
                }
            }
            CategoryPair::Pair(b1, b2) => {
                if meta_skipped > 0 {
                    combine_meta(b1, Some(b2), q, step, &tables)?
                } else {
                    combine_cell_pair(&b1, &b2, step.selection, &tables)
                }
            }
        };

        let survivors = drop_zero_columns(combined, &mut stats);
        for sample in survivors {
            if !passes_unnatural_selection(&sample, step, q) {
                stats.samples_dropped_unnatural_selection += 1;
                continue;
            }
            if stats.samples_emitted >= cap {
                break;
            }
            sink.write(&sample)?;
            stats.samples_emitted += 1;
        }
    }
    Ok(stats)
}

fn combine_meta(
    b1: Vec<Sample>,
    b2: Option<Vec<Sample>>,
    q: u32,
    step: &BkwStepParameters,
    tables: &SumDiffTables,
) -> Result<Vec<Sample>, ReduceError> {
    let grid1 = build_meta_grid(b1, q, step)?;
    let grid2 = b2.map(|b| build_meta_grid(b, q, step)).transpose()?;
    let mut out = Vec::new();
    let c_last = grid1.c_last;
    let c_mid = grid1.c_mid.unwrap_or(1);
    for mid in 0..c_mid {
        for last in 0..c_last {
            let idx = mid * c_last + last;
            let inv_last = additive_inverse(c_last, last);
            let inv_mid = if grid1.c_mid.is_some() { additive_inverse(c_mid, mid) } else { 0 };
            let inv_idx = inv_mid * c_last + inv_last;
            if inv_idx < idx {
                continue;
            }
            let cell_a = &grid1.cells[idx as usize];
            match &grid2 {
                None => {
                    if inv_idx == idx {
                        out.extend(combine_single_cell(cell_a, step.selection, tables));
                    } else {
                        let cell_b = &grid1.cells[inv_idx as usize];
                        out.extend(combine_cell_pair(cell_a, cell_b, step.selection, tables));
                    }
                }
                Some(grid2) => {
                    let cell_b = &grid2.cells[inv_idx as usize];
                    out.extend(combine_cell_pair(cell_a, cell_b, step.selection, tables));
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additive_inverse_matches_odd_and_even_definitions() {
        assert_eq!(additive_inverse(5, 0), 0);
        assert_eq!(additive_inverse(5, 2), 3);
        assert_eq!(additive_inverse(4, 0), 3);
        assert_eq!(additive_inverse(4, 1), 2);
    }

    #[test]
    fn lf1_single_category_produces_k_minus_one_outputs() {
        let tables = SumDiffTables::try_new(101).unwrap();
        let cell = vec![Sample::new(vec![1, 2], 0, 10), Sample::new(vec![3, 4], 0, 20), Sample::new(vec![5, 6], 0, 30)];
        let out = combine_cell_lf1(&cell, &tables);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].a, vec![99, 99]);
    }

    #[test]
    fn lf2_single_category_produces_all_pairs() {
        let tables = SumDiffTables::try_new(101).unwrap();
        let cell = vec![Sample::new(vec![1], 0, 0), Sample::new(vec![2], 0, 0), Sample::new(vec![3], 0, 0)];
        let out = combine_cell_lf2(&cell, &tables);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn zero_column_samples_are_dropped() {
        let mut stats = ReductionStats::default();
        let samples = vec![Sample::new(vec![0, 0], 0, 0), Sample::new(vec![1, 0], 0, 0)];
        let survivors = drop_zero_columns(samples, &mut stats);
        assert_eq!(survivors.len(), 1);
        assert_eq!(stats.samples_dropped_zero, 1);
    }

    #[test]
    fn error_contagion_survives_combination() {
        let tables = SumDiffTables::try_new(101).unwrap();
        let known = Sample::new(vec![1], 3, 0);
        let unknown = Sample::new(vec![2], crate::sample::UNKNOWN_ERROR, 0);
        let combined = combine_samples(CombineOp::Sub, &tables, &known, &unknown);
        assert_eq!(combined.error, crate::sample::UNKNOWN_ERROR);
    }
}
