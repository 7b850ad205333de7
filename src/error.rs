use std::io;
use thiserror::Error;

/// Invalid or unsupported configuration: bad CLI arguments, an unsupported
/// `(q, sorting)` combination, or a malformed step descriptor.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error parsing JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("error reading or writing file: {0}")]
    IOError(#[from] io::Error),
    #[error("argument outside of valid range: {0}")]
    RangeError(String),
    #[error("broken argument dependency: {0}")]
    DependencyError(String),
    #[error("unsupported sorting method '{0}'")]
    UnknownSorting(String),
    #[error("unsupported coding type for q={0}: no generator row on file")]
    UnsupportedModulus(u32),
    #[error("malformed step descriptor: {0}")]
    MalformedDescriptor(String),
}

/// An invariant the caller is responsible for upholding was violated. These
/// indicate a programming error upstream of this crate rather than bad
/// input data, so callers that hit one should treat it as a bug report.
#[derive(Error, Debug)]
pub enum InvariantViolation {
    #[error("category index {index} is out of range (num_categories={num_categories})")]
    CategoryOutOfRange { index: u64, num_categories: u64 },
    #[error("table not loaded for the requested shape")]
    TableNotLoaded,
    #[error("sample hash mismatch: recomputed hash differs from stored hash")]
    HashMismatch,
    #[error("expected {expected} positions, got {actual}")]
    PositionCountMismatch { expected: usize, actual: usize },
}

/// Errors surfaced by the reduction pass and secret-reduction pass.
#[derive(Error, Debug)]
pub enum ReduceError {
    #[error("I/O error: {0}")]
    IOError(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error("destination folder already exists")]
    DestinationExists,
    #[error("malformed sample info: {0}")]
    MalformedSampleInfo(String),
    #[error("unexpected sorting at source folder")]
    UnexpectedSorting,
    #[error("storage reader initialization failed")]
    StorageReaderInit,
    #[error("could not create sum/diff tables")]
    SumDiffTableCreation,
    #[error("unsupported number of skipped meta positions: {0}")]
    UnsupportedMetaSkipped(u8),
}

impl ReduceError {
    /// Maps a reduction outcome to the exit-code contract of the reduction
    /// pass: 0 success, 1 malformed sample info, 2 unexpected sorting,
    /// 3 storage reader init failed, 6 sum/diff table creation failed,
    /// 7 unsupported meta_skipped, 100 destination already existed.
    pub fn exit_code(&self) -> u8 {
        match self {
            ReduceError::MalformedSampleInfo(_) => 1,
            ReduceError::UnexpectedSorting => 2,
            ReduceError::StorageReaderInit => 3,
            ReduceError::SumDiffTableCreation => 6,
            ReduceError::UnsupportedMetaSkipped(_) => 7,
            ReduceError::DestinationExists => 100,
            _ => 255,
        }
    }
}
