//! Category-index mapping (C3): turns the raw position values of a BKW
//! step into the index of the category a sample belongs to, for each of
//! the four sorting strategies, plus the inverse mapping used by plain BKW
//! diagnostics and by the singleton-detection logic shared by LMS.

use crate::cache::TableManager;
use crate::error::{ConfigError, InvariantViolation};
use crate::step::{BkwStepParameters, Sorting, StepPhase};

/// Plain BKW with exactly 2 (or 3, with the 3rd position suppressed into a
/// meta-category) positions. The closed form below avoids building a
/// `q x q` lookup table; see [`category_index_to_position_values_plain_bkw`]
/// for the inverse.
pub fn position_values_to_category_index_plain_bkw(q: u32, p1: u32, p2: u32) -> u64 {
    let q = q as u64;
    let (p1, p2) = (p1 as u64, p2 as u64);
    if p1 == 0 && p2 == 0 {
        return 0;
    }
    if p1 == 0 {
        return if p2 <= (q - 1) / 2 { 2 * p2 - 1 } else { 2 * (q - p2) };
    }
    if p1 <= (q - 1) / 2 {
        (2 * p1 - 1) * q + 2 * p2
    } else if p2 == 0 {
        (2 * q - 1 - 2 * p1) * q + 1
    } else {
        (2 * q - 1 - 2 * p1) * q + 2 * (q - p2) + 1
    }
}

pub fn category_index_to_position_values_plain_bkw(q: u32, category_index: u64) -> (u32, u32) {
    let q64 = q as u64;
    if category_index == 0 {
        return (0, 0);
    }
    if category_index < q64 {
        return if category_index % 2 == 1 {
            (0, ((category_index + 1) / 2) as u32)
        } else {
            (0, (q64 - category_index / 2) as u32)
        };
    }
    let box_ = (category_index - q64) / (2 * q64) + 1;
    let inner_index = category_index - (2 * box_ - 1) * q64;
    if inner_index % 2 == 0 {
        (box_ as u32, (inner_index / 2) as u32)
    } else {
        let p1 = q64 - box_;
        let p2 = (q64 - (inner_index + 1) / 2 + 1) % q64;
        (p1 as u32, p2 as u32)
    }
}

/// Maps one position value into an LMS bucket `0..c`, `c = q/p + 1`.
fn position_lms_map(pi: u32, q: u32, p: u16) -> u64 {
    let p = p as u64;
    let c = q as u64 / p + 1;
    let mut bucket = (pi as u64 + p / 2) / p;
    if bucket == c {
        bucket -= c;
    }
    bucket
}

/// Builds the LMS category-index table for `num_positions` positions, each
/// ranging over `0..c`. Generalizes the original's hand-unrolled
/// level-1..level-6 ladder into one recursive function; depth is still
/// capped at [`crate::step::MAX_LMS_POSITIONS`] since the table is
/// `c^num_positions` entries.
pub fn build_lms_table(c: u64, num_positions: usize) -> Vec<u64> {
    assert!(num_positions >= 1);
    if num_positions == 1 {
        let mut table = vec![0u64; c as usize];
        for p1 in 1..=(c / 2) {
            table[p1 as usize] = 2 * p1 - 1;
        }
        for p1 in (c / 2 + 1)..c {
            table[p1 as usize] = 2 * (c - p1);
        }
        return table;
    }
    let prev = build_lms_table(c, num_positions - 1);
    let prev_len = prev.len() as u64;
    let mut table = vec![0u64; (prev_len * c) as usize];

    // trivial: last position value is 0
    for pos in 0..prev_len {
        table[pos as usize] = prev[pos as usize];
    }
    // small values of the newest position: p_new*2 < c
    for p_new in 1..c {
        if p_new * 2 >= c {
            break;
        }
        for pos in 0..prev_len {
            let cur = pos + p_new * prev_len;
            table[cur as usize] = (2 * p_new - 1) * prev_len + 2 * prev[pos as usize];
        }
    }
    // exact-half value, only when c is even
    let q_half = c / 2;
    if q_half * 2 == c {
        for pos in 0..prev_len {
            let cur = pos + q_half * prev_len;
            table[cur as usize] = (2 * q_half - 1) * prev_len + prev[pos as usize];
        }
    }
    // large values of the newest position
    for p_new in (c / 2 + 1)..c {
        for pos in 0..prev_len {
            let pos_inverted = invert_mixed_radix(pos, c, num_positions - 1);
            let cur = pos + p_new * prev_len;
            table[cur as usize] = (2 * (c - p_new) - 1) * prev_len + 1 + 2 * prev[pos_inverted as usize];
        }
    }
    table
}

/// `pos` is a mixed-radix index over `depth` digits each in base `c`;
/// returns the index obtained by replacing each digit `t` with
/// `(c - t) % c`, matching the `(c - p1)%c + ((c - p2)%c)*c + ...` pattern
/// repeated at every LMS table level.
fn invert_mixed_radix(mut pos: u64, c: u64, depth: usize) -> u64 {
    let mut digits = Vec::with_capacity(depth);
    for _ in 0..depth {
        digits.push(pos % c);
        pos /= c;
    }
    let mut inverted = 0u64;
    for &digit in digits.iter().rev() {
        inverted = inverted * c + (c - digit) % c;
    }
    inverted
}

/// Category index for LMS sorting, given the position values `pn` (length
/// `num_positions`), using the process-wide table cached in `tables`.
pub fn position_values_to_category_index_lms(
    q: u32,
    p: u16,
    pn: &[u32],
    tables: &mut TableManager,
) -> Result<u64, ConfigError> {
    let num_positions = pn.len();
    let c = q as u64 / p as u64 + 1;
    let table = tables.lms_table(c, num_positions);
    let mapped: Vec<u64> = pn.iter().map(|&v| position_lms_map(v, q, p)).collect();
    let mut index = mapped[num_positions - 1];
    for &t in mapped[..num_positions - 1].iter().rev() {
        index = c * index + t;
    }
    Ok(table[index as usize])
}

/// Whether `category_index` is one of the LMS singleton categories: the
/// ones reachable only by samples whose position values are all either
/// `0` or `q/2` (so there is nothing to pair them against). When `c` is
/// odd there is exactly one such category (index `0`); when `c` is even
/// there are `2^num_positions` of them.
pub fn is_lms_singleton(
    step: &BkwStepParameters,
    q: u32,
    category_index: u64,
    tables: &mut TableManager,
) -> Result<bool, ConfigError> {
    if category_index == 0 {
        return Ok(true);
    }
    let Sorting::Lms { p } = &step.sorting else {
        return Err(ConfigError::RangeError("is_lms_singleton called on a non-LMS step".to_string()));
    };
    let c = q as u64 / *p as u64 + 1;
    if c % 2 == 1 {
        return Ok(false);
    }
    let num_positions = step.num_positions;
    for bits in 0u32..(1 << num_positions) {
        let pn: Vec<u32> = (0..num_positions)
            .map(|j| if (bits >> j) & 1 == 0 { 0 } else { q / 2 })
            .collect();
        let idx = position_values_to_category_index_lms(q, *p, &pn, tables)?;
        if idx == category_index {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Maps one position value into a smooth-LMS bucket, where `q_` is either
/// `ceil(q/2)` (first encounter of a fresh position range) or the previous
/// step's `p1` (for positions reduced by an earlier step).
pub fn position_smooth_lms_map(pn: u32, q: u32, q_: u32, p: u16, c: u64) -> u64 {
    let (q, q_, p) = (q as i64, q_ as i64, p as i64);
    let pn = pn as i64;
    let c = c as i64;
    let value = if c % 2 == 1 {
        let delta = p * (c / 2 + 1) - q_;
        if pn < q_ {
            (pn + delta) / p
        } else {
            (c - (((q - pn) + delta) / p)).rem_euclid(c)
        }
    } else {
        let delta = p * (c / 2) - q_;
        if pn < q_ {
            (pn + delta) / p
        } else {
            c - 1 - (((q - pn) + delta) / p)
        }
    };
    value as u64
}

/// Direct port of the generalized recursive category formula used by
/// smooth LMS, already generic over the number of positions `n` in the
/// original (no per-depth unrolling needed here).
fn position_values_to_category_generalized(t: &[u64], c: &[u64]) -> u64 {
    let n = t.len();
    debug_assert_eq!(n, c.len());
    let cn = c[n - 1];
    if cn % 2 == 1 {
        if n == 1 {
            return if t[0] == 0 {
                0
            } else if 2 * t[0] < c[0] {
                2 * t[0] - 1
            } else {
                2 * (c[0] - t[0])
            };
        }
        if t[n - 1] == 0 {
            return position_values_to_category_generalized(&t[..n - 1], &c[..n - 1]);
        }
        if 2 * t[n - 1] < cn {
            let mut index = 2 * t[n - 1] - 1;
            for &ci in &c[..n - 1] {
                index *= ci;
            }
            index + 2 * position_values_to_category_generalized(&t[..n - 1], &c[..n - 1])
        } else {
            let mut index = 2 * (cn - t[n - 1]) - 1;
            let nt: Vec<u64> = (0..n - 1)
                .map(|i| if c[i] % 2 == 1 { (c[i] - t[i]) % c[i] } else { c[i] - t[i] - 1 })
                .collect();
            for &ci in &c[..n - 1] {
                index *= ci;
            }
            index + 1 + 2 * position_values_to_category_generalized(&nt, &c[..n - 1])
        }
    } else if n == 1 {
        if 2 * t[0] < c[0] {
            2 * t[0]
        } else {
            2 * (c[0] - t[0]) - 1
        }
    } else if t[n - 1] < cn / 2 {
        let mut index = 2 * t[n - 1];
        for &ci in &c[..n - 1] {
            index *= ci;
        }
        index + 2 * position_values_to_category_generalized(&t[..n - 1], &c[..n - 1])
    } else {
        let mut index = 2 * (cn - t[n - 1] - 1);
        let nt: Vec<u64> = (0..n - 1)
            .map(|i| if c[i] % 2 == 1 { (c[i] - t[i]) % c[i] } else { c[i] - t[i] - 1 })
            .collect();
        for &ci in &c[..n - 1] {
            index *= ci;
        }
        index + 1 + 2 * position_values_to_category_generalized(&nt, &c[..n - 1])
    }
}

fn ceil_div(a: u64, b: u64) -> u64 {
    if a % b == 0 {
        a / b
    } else {
        a / b + 1
    }
}

/// Computes the full per-position bucket values `t` and bucket counts `c`
/// for a smooth-LMS step, before any meta-category truncation. Shared by
/// [`position_values_to_category_index_smooth_lms`] (which drops the
/// trailing `meta_skipped` entries before folding them into a single
/// index) and the reduction pass's meta-category sub-sort (which uses
/// exactly those dropped entries to build its grid).
pub fn smooth_lms_position_values_and_buckets(
    q: u32,
    pn: &[u32],
    step: &BkwStepParameters,
) -> Result<(Vec<u64>, Vec<u64>), ConfigError> {
    let Sorting::SmoothLms(params) = &step.sorting else {
        return Err(ConfigError::RangeError("expected a smooth LMS step".to_string()));
    };
    let ni = step.num_positions;
    let q_ = if q % 2 == 1 { (q + 1) / 2 } else { q / 2 };
    match params.phase {
        StepPhase::First => {
            let mut t = Vec::with_capacity(ni + 1);
            let mut c = Vec::with_capacity(ni + 1);
            for i in 0..ni {
                let ci = ceil_div(2 * q_ as u64 - 1, params.p as u64);
                t.push(position_smooth_lms_map(pn[i], q, q_, params.p, ci));
                c.push(ci);
            }
            let c_last = ceil_div(2 * q_ as u64 - 1, params.p1 as u64);
            t.push(position_smooth_lms_map(pn[ni], q, q_, params.p1, c_last));
            c.push(c_last);
            Ok((t, c))
        }
        StepPhase::Last { prev_p1 } => {
            let q_prev = prev_p1 as u32;
            let c0 = ceil_div(2 * q_prev as u64 - 1, params.p2 as u64);
            let mut t = vec![position_smooth_lms_map(pn[0], q, q_prev, params.p2, c0)];
            let mut c = vec![c0];
            for i in 1..ni {
                let ci = ceil_div(2 * q_ as u64 - 1, params.p as u64);
                t.push(position_smooth_lms_map(pn[i], q, q_, params.p, ci));
                c.push(ci);
            }
            Ok((t, c))
        }
        StepPhase::Middle { prev_p1 } => {
            let q_prev = prev_p1 as u32;
            let c0 = ceil_div(2 * q_prev as u64 - 1, params.p2 as u64);
            let mut t = vec![position_smooth_lms_map(pn[0], q, q_prev, params.p2, c0)];
            let mut c = vec![c0];
            for i in 1..ni {
                let ci = ceil_div(2 * q_ as u64 - 1, params.p as u64);
                t.push(position_smooth_lms_map(pn[i], q, q_, params.p, ci));
                c.push(ci);
            }
            let c_last = ceil_div(2 * q_ as u64 - 1, params.p1 as u64);
            t.push(position_smooth_lms_map(pn[ni], q, q_, params.p1, c_last));
            c.push(c_last);
            Ok((t, c))
        }
    }
}

/// Category index for smooth LMS, dispatching on the step's phase the way
/// the original differentiates first/middle/last steps.
pub fn position_values_to_category_index_smooth_lms(
    q: u32,
    _n: usize,
    pn: &[u32],
    step: &BkwStepParameters,
) -> Result<u64, ConfigError> {
    let Sorting::SmoothLms(params) = &step.sorting else {
        return Err(ConfigError::RangeError("expected a smooth LMS step".to_string()));
    };
    let (t, c) = smooth_lms_position_values_and_buckets(q, pn, step)?;
    let meta_skipped = params.meta_skipped as usize;
    let keep = t.len() - meta_skipped;
    Ok(position_values_to_category_generalized(&t[..keep], &c[..keep]))
}

/// Category index for coded BKW: nearest-codeword decoding under the
/// block code named by `step`, via the cached syndrome table.
pub fn position_values_to_category_index_coded_bkw(
    q: u32,
    pn: &[u32],
    step: &BkwStepParameters,
    tables: &mut TableManager,
) -> Result<u64, ConfigError> {
    let Sorting::CodedBkw { coding } = &step.sorting else {
        return Err(ConfigError::RangeError("expected a coded BKW step".to_string()));
    };
    let table = tables.syndrome_table(q, *coding)?;
    Ok(table.nearest_codeword_category(q, pn))
}

/// The public entry point: dispatches on `step.sorting` the way the
/// original's `position_values_2_category_index` does, given the raw
/// position values for this step's positions. For most sortings `pn` has
/// exactly `step.num_positions` entries; smooth LMS is the exception — a
/// `First` or `Middle` phase step additionally reads one trailing position
/// past `num_positions` (the coordinate bucketed for handoff to the next
/// step's `prev_p1`), so `pn` must carry `num_positions + 1` entries for
/// those two phases and exactly `num_positions` for `Last`.
pub fn category_index(
    q: u32,
    n: usize,
    pn: &[u32],
    step: &BkwStepParameters,
    tables: &mut TableManager,
) -> Result<u64, ConfigError> {
    step.validate()?;
    match &step.sorting {
        Sorting::PlainBkw => Ok(position_values_to_category_index_plain_bkw(q, pn[0], pn[1])),
        Sorting::Lms { p } => position_values_to_category_index_lms(q, *p, pn, tables),
        Sorting::SmoothLms(_) => position_values_to_category_index_smooth_lms(q, n, pn, step),
        Sorting::CodedBkw { .. } => position_values_to_category_index_coded_bkw(q, pn, step, tables),
    }
}

pub fn check_category_bound(index: u64, num_categories: u64) -> Result<(), InvariantViolation> {
    if index >= num_categories {
        Err(InvariantViolation::CategoryOutOfRange { index, num_categories })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_bkw_zero_maps_to_zero() {
        assert_eq!(position_values_to_category_index_plain_bkw(101, 0, 0), 0);
    }

    #[test]
    fn plain_bkw_round_trips_through_inverse() {
        let q = 101;
        for p1 in 0..q {
            for p2 in 0..q {
                let cat = position_values_to_category_index_plain_bkw(q, p1, p2);
                let (r1, r2) = category_index_to_position_values_plain_bkw(q, cat);
                assert_eq!((p1, p2), (r1, r2), "mismatch at p1={p1} p2={p2}");
            }
        }
    }

    #[test]
    fn lms_table_covers_every_bucket_exactly_once_per_level() {
        let c = 9u64; // odd, small
        let table = build_lms_table(c, 1);
        let mut seen = table.clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), c as usize, "level 1 table should be a bijection on 0..c");
    }

    #[test]
    fn lms_two_levels_is_bijective() {
        let c = 5u64;
        let table = build_lms_table(c, 2);
        let mut seen = table.clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), (c * c) as usize);
    }

    #[test]
    fn smooth_lms_generalized_single_position_matches_plain_odd_case() {
        // for n=1, c odd, the generalized formula matches the plain BKW
        // single-position formula up to the renamed variables.
        let c = vec![9u64];
        for t0 in 0..9u64 {
            let t = vec![t0];
            let got = position_values_to_category_generalized(&t, &c);
            let expected = if t0 == 0 {
                0
            } else if 2 * t0 < 9 {
                2 * t0 - 1
            } else {
                2 * (9 - t0)
            };
            assert_eq!(got, expected);
        }
    }
}
