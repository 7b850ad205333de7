//! Step parameters (C1): the sorting strategy and position range for a
//! single BKW reduction step, and the category count it induces.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The four block codes coded BKW can sort samples by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodingType {
    Block21,
    Block31,
    Block41,
    Concatenated2121,
}

impl CodingType {
    pub fn label(self) -> &'static str {
        match self {
            CodingType::Block21 => "[2,1] block code",
            CodingType::Block31 => "[3,1] block code",
            CodingType::Block41 => "[4,1] block code",
            CodingType::Concatenated2121 => "concatenated [2,1][2,1] block code",
        }
    }

    pub fn block_length(self) -> usize {
        match self {
            CodingType::Block21 => 2,
            CodingType::Block31 => 3,
            CodingType::Block41 => 4,
            CodingType::Concatenated2121 => 4,
        }
    }

    pub fn from_label(s: &str) -> Result<Self, ConfigError> {
        for ct in [
            CodingType::Block21,
            CodingType::Block31,
            CodingType::Block41,
            CodingType::Concatenated2121,
        ] {
            if ct.label() == s {
                return Ok(ct);
            }
        }
        Err(ConfigError::UnknownSorting(s.to_string()))
    }
}

/// Where a step falls within a smooth-LMS chain: the per-step formula
/// differs for the first, last, and middle steps (the original tags this
/// with `prev_p1 == -1` for "first" and a `startIndex + numPositions == n`
/// check for "last").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepPhase {
    First,
    Middle { prev_p1: u16 },
    Last { prev_p1: u16 },
}

/// Parameters specific to smooth LMS.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SmoothLmsParameters {
    pub p: u16,
    pub p1: u16,
    pub p2: u16,
    pub phase: StepPhase,
    /// Number of trailing positions (0, 1, or 2) folded into a single
    /// meta-category sub-sort during the reduction pass.
    pub meta_skipped: u8,
    /// Unnatural-selection threshold; `0` disables the filter.
    pub unnatural_selection_ts: u16,
    pub unnatural_selection_start_index: usize,
}

/// The sorting strategy a step uses to assign samples to categories.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Sorting {
    PlainBkw,
    Lms { p: u16 },
    SmoothLms(SmoothLmsParameters),
    CodedBkw { coding: CodingType },
}

impl Sorting {
    pub fn name(&self) -> &'static str {
        match self {
            Sorting::PlainBkw => "plainBKW",
            Sorting::Lms { .. } => "LMS",
            Sorting::SmoothLms(_) => "smoothLMS",
            Sorting::CodedBkw { .. } => "codedBKW",
        }
    }
}

/// Sample-combination discipline: LF1 pairs every sample in a cell against
/// one anchor (`k-1` pairings); LF2 pairs every sample against every other
/// (`k(k-1)/2` pairings).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    Lf1,
    Lf2,
}

pub const MAX_LMS_POSITIONS: usize = 6;
pub const MAX_SMOOTH_LMS_POSITIONS: usize = 10;
pub const MAX_CODED_BKW_POSITIONS: usize = 4;

/// A single BKW step: which positions of the sample it consumes
/// (`start_index..start_index+num_positions`) and how it sorts them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BkwStepParameters {
    pub sorting: Sorting,
    pub start_index: usize,
    pub num_positions: usize,
    pub selection: Selection,
}

impl BkwStepParameters {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.sorting {
            Sorting::PlainBkw => {
                if self.num_positions != 2 && self.num_positions != 3 {
                    return Err(ConfigError::RangeError(
                        "plain BKW supports only 2 or 3 positions".to_string(),
                    ));
                }
            }
            Sorting::Lms { p } => {
                if !(2..=MAX_LMS_POSITIONS).contains(&self.num_positions) {
                    return Err(ConfigError::RangeError(format!(
                        "LMS supports 2..={} positions",
                        MAX_LMS_POSITIONS
                    )));
                }
                if *p == 0 {
                    return Err(ConfigError::RangeError("LMS p must be > 0".to_string()));
                }
            }
            Sorting::SmoothLms(params) => {
                if !(2..=MAX_SMOOTH_LMS_POSITIONS).contains(&self.num_positions) {
                    return Err(ConfigError::RangeError(format!(
                        "smooth LMS supports 2..={} positions",
                        MAX_SMOOTH_LMS_POSITIONS
                    )));
                }
                if params.meta_skipped > 2 {
                    return Err(ConfigError::RangeError(
                        "smooth LMS supports skipping at most 2 trailing positions".to_string(),
                    ));
                }
            }
            Sorting::CodedBkw { coding } => {
                let expected = coding.block_length();
                if self.num_positions != expected
                    || self.num_positions > MAX_CODED_BKW_POSITIONS
                {
                    return Err(ConfigError::RangeError(format!(
                        "coded BKW with {} requires exactly {} positions",
                        coding.label(),
                        expected
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Selection {
    pub fn label(self) -> &'static str {
        match self {
            Selection::Lf1 => "LF1",
            Selection::Lf2 => "LF2",
        }
    }
}

impl fmt::Display for BkwStepParameters {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.sorting {
            Sorting::PlainBkw => write!(
                f,
                "{} [{} positions, start index={}, selection={}]",
                self.sorting.name(),
                self.num_positions,
                self.start_index,
                self.selection.label()
            ),
            Sorting::Lms { p } => write!(
                f,
                "{} [{} positions, start index={}, p={}, selection={}]",
                self.sorting.name(),
                self.num_positions,
                self.start_index,
                p,
                self.selection.label()
            ),
            Sorting::SmoothLms(params) => {
                let prev_p1 = match params.phase {
                    StepPhase::First => -1i32,
                    StepPhase::Middle { prev_p1 } | StepPhase::Last { prev_p1 } => prev_p1 as i32,
                };
                write!(
                    f,
                    "{} [{} positions, start index={}, p={}, p1={}, p2={}, prev_p1={}, meta_skipped={}, unnatural_selection={}, unnatural_selection_start_index={}, selection={}]",
                    self.sorting.name(),
                    self.num_positions,
                    self.start_index,
                    params.p,
                    params.p1,
                    params.p2,
                    prev_p1,
                    params.meta_skipped,
                    params.unnatural_selection_ts,
                    params.unnatural_selection_start_index,
                    self.selection.label()
                )
            }
            Sorting::CodedBkw { coding } => write!(
                f,
                "{} [{} positions, start index={}, code={}, selection={}]",
                self.sorting.name(),
                self.num_positions,
                self.start_index,
                coding.label(),
                self.selection.label()
            ),
        }
    }
}

/// Splits the bracketed field list of a step descriptor (`"<name> [<k>=<v>,
/// ...]"`) into the sorting name and a map from field key to raw text,
/// except the leading `"<N> positions"` field (which carries no `=`), whose
/// value is returned separately.
fn split_descriptor(text: &str) -> Result<(&str, usize, std::collections::HashMap<&str, &str>), ConfigError> {
    let malformed = || ConfigError::MalformedDescriptor(text.to_string());
    let (name, rest) = text.split_once(" [").ok_or_else(malformed)?;
    let rest = rest.strip_suffix(']').ok_or_else(malformed)?;
    let mut fields = rest.split(", ");
    let num_positions: usize = fields
        .next()
        .and_then(|f| f.strip_suffix(" positions"))
        .ok_or_else(malformed)?
        .parse()
        .map_err(|_| malformed())?;
    let mut kv = std::collections::HashMap::new();
    for field in fields {
        let (k, v) = field.split_once('=').ok_or_else(malformed)?;
        kv.insert(k, v);
    }
    Ok((name, num_positions, kv))
}

fn field<'a>(
    kv: &std::collections::HashMap<&'a str, &'a str>,
    key: &str,
    text: &str,
) -> Result<&'a str, ConfigError> {
    kv.get(key)
        .copied()
        .ok_or_else(|| ConfigError::MalformedDescriptor(format!("{}: missing field '{}'", text, key)))
}

fn parse_field<T: std::str::FromStr>(
    kv: &std::collections::HashMap<&str, &str>,
    key: &str,
    text: &str,
) -> Result<T, ConfigError> {
    field(kv, key, text)?
        .parse()
        .map_err(|_| ConfigError::MalformedDescriptor(format!("{}: bad value for '{}'", text, key)))
}

impl BkwStepParameters {
    /// Parses a step descriptor written by [`Display`](fmt::Display),
    /// rejecting unknown sorting names and out-of-range `num_positions` via
    /// [`BkwStepParameters::validate`]. `n` (the LWE dimension) disambiguates
    /// a smooth-LMS step's phase: the textual descriptor records only
    /// `prev_p1` (`-1` for the first step), so whether a non-first step is
    /// `Middle` or `Last` is re-derived from `start_index + num_positions
    /// == n`, exactly as the original determines it from context rather
    /// than storing it.
    pub fn parse(text: &str, n: usize) -> Result<Self, ConfigError> {
        let (name, num_positions, kv) = split_descriptor(text)?;
        let start_index: usize = parse_field(&kv, "start index", text)?;
        let selection = match field(&kv, "selection", text)? {
            "LF1" => Selection::Lf1,
            "LF2" => Selection::Lf2,
            other => {
                return Err(ConfigError::MalformedDescriptor(format!(
                    "{}: unknown selection '{}'",
                    text, other
                )))
            }
        };
        let sorting = match name {
            "plainBKW" => Sorting::PlainBkw,
            "LMS" => Sorting::Lms { p: parse_field(&kv, "p", text)? },
            "smoothLMS" => {
                let p = parse_field(&kv, "p", text)?;
                let p1 = parse_field(&kv, "p1", text)?;
                let p2 = parse_field(&kv, "p2", text)?;
                let prev_p1: i32 = parse_field(&kv, "prev_p1", text)?;
                let meta_skipped = parse_field(&kv, "meta_skipped", text)?;
                let unnatural_selection_ts = parse_field(&kv, "unnatural_selection", text)?;
                let unnatural_selection_start_index =
                    parse_field(&kv, "unnatural_selection_start_index", text)?;
                let phase = if prev_p1 < 0 {
                    StepPhase::First
                } else if start_index + num_positions == n {
                    StepPhase::Last { prev_p1: prev_p1 as u16 }
                } else {
                    StepPhase::Middle { prev_p1: prev_p1 as u16 }
                };
                Sorting::SmoothLms(SmoothLmsParameters {
                    p,
                    p1,
                    p2,
                    phase,
                    meta_skipped,
                    unnatural_selection_ts,
                    unnatural_selection_start_index,
                })
            }
            "codedBKW" => Sorting::CodedBkw { coding: CodingType::from_label(field(&kv, "code", text)?)? },
            other => return Err(ConfigError::UnknownSorting(other.to_string())),
        };
        let step = BkwStepParameters { sorting, start_index, num_positions, selection };
        step.validate()?;
        Ok(step)
    }
}

fn ceil_div(a: u64, b: u64) -> u64 {
    if a % b == 0 {
        a / b
    } else {
        a / b + 1
    }
}

/// The number of distinct categories a step can produce, for a given `q`
/// and `n` (the LWE dimension, needed to detect the last smooth-LMS step).
pub fn num_categories(q: u32, n: usize, step: &BkwStepParameters) -> Result<u64, ConfigError> {
    step.validate()?;
    let q = q as u64;
    match &step.sorting {
        Sorting::PlainBkw => Ok(q * q),
        Sorting::Lms { p } => {
            let c = q / (*p as u64) + 1;
            Ok(c.pow(step.num_positions as u32))
        }
        Sorting::SmoothLms(params) => {
            if q % 2 == 0 {
                return Err(ConfigError::RangeError(
                    "smooth LMS requires an odd modulus".to_string(),
                ));
            }
            let p = params.p as u64;
            let p1 = params.p1 as u64;
            let p2 = params.p2 as u64;
            let q_mid = (q + 1) / 2;
            let c = ceil_div(2 * q_mid - 1, p);
            let c1 = ceil_div(2 * q_mid - 1, p1);
            let meta_skipped = params.meta_skipped as usize;
            match params.phase {
                StepPhase::First => {
                    let last_position = step.num_positions.min(step.num_positions + 1 - meta_skipped);
                    let mut total = c.pow(last_position as u32);
                    if meta_skipped == 0 {
                        total *= c1;
                    }
                    Ok(total)
                }
                StepPhase::Last { prev_p1 } => {
                    let q_prev = prev_p1 as u64;
                    let c2 = ceil_div(2 * q_prev - 1, p2);
                    Ok(c2 * c.pow((step.num_positions - meta_skipped - 1) as u32))
                }
                StepPhase::Middle { prev_p1 } => {
                    let q_prev = prev_p1 as u64;
                    let c2 = ceil_div(2 * q_prev - 1, p2);
                    let last_position = step.num_positions.min(step.num_positions + 1 - meta_skipped);
                    let mut total = c2 * c.pow((last_position - 1) as u32);
                    if meta_skipped == 0 {
                        total *= c1;
                    }
                    Ok(total)
                }
            }
        }
        Sorting::CodedBkw { coding } => match coding {
            CodingType::Block21 | CodingType::Block31 | CodingType::Block41 => Ok(q),
            CodingType::Concatenated2121 => Ok(q * q),
        },
    }
}

/// Whether `category_index` is a singleton category (contains at most the
/// samples whose categorized value equals the all-zero representative),
/// used by the reduction pass to skip expensive adjacency pairing.
pub fn is_singleton(
    step: &BkwStepParameters,
    q: u32,
    category_index: u64,
    num_categories: u64,
    tables: &mut crate::cache::TableManager,
) -> Result<bool, ConfigError> {
    match &step.sorting {
        Sorting::PlainBkw => Ok(category_index == 0),
        Sorting::Lms { .. } => crate::index::is_lms_singleton(step, q, category_index, tables),
        Sorting::SmoothLms(_) => Ok(num_categories % 2 == 1 && category_index == 0),
        Sorting::CodedBkw { .. } => Ok(category_index == 0),
    }
}
