//! CLI driver: wires the validated argument structs in [`crate::settings`]
//! to the library's reduction, secret-reduction, and table-pregeneration
//! entry points, and maps outcomes to the process exit-code contract.

use std::fmt;

use crate::error::ReduceError;
use crate::lwe::LweInstance;
use crate::parallel::{self, TableJob};
use crate::reduce::run_reduction_pass;
use crate::secret_reduce::run_secret_reduction_pass;
use crate::settings::{Cli, Command, PregenTablesArgs, ReduceArgs, ReduceSecretArgs};
use crate::step::{num_categories, BkwStepParameters};
use crate::storage::{FileCategoryPairSource, FileSampleSink, SampleSink};

/// An error surfaced at the CLI boundary: either one of the reduction
/// pass's own errors (which carry a specific exit code) or any other
/// failure encountered while assembling its inputs.
#[derive(Debug)]
enum CliError {
    Reduce(ReduceError),
    Other(anyhow::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CliError::Reduce(err) => write!(f, "{}", err),
            CliError::Other(err) => write!(f, "{:#}", err),
        }
    }
}

impl From<ReduceError> for CliError {
    fn from(err: ReduceError) -> Self {
        CliError::Reduce(err)
    }
}

impl From<crate::error::ConfigError> for CliError {
    fn from(err: crate::error::ConfigError) -> Self {
        CliError::Other(err.into())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Other(err.into())
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        CliError::Other(err)
    }
}

impl CliError {
    /// The exit-code contract of the reduction pass for a `Reduce`/
    /// `ReduceSecret` error; any other CLI-boundary failure (bad table
    /// pregeneration input, an unreadable step-descriptor file) exits 1.
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Reduce(err) => err.exit_code() as i32,
            CliError::Other(_) => 1,
        }
    }
}

/// Runs the parsed CLI invocation, prints a final status line, and returns
/// the process exit code.
pub fn run(cli: Cli) -> i32 {
    let result = match cli.command {
        Command::Reduce(args) => run_reduce(args),
        Command::ReduceSecret(args) => run_reduce_secret(args),
        Command::PregenTables(args) => run_pregen_tables(args),
    };
    match result {
        Ok(()) => 0,
        Err(CliError::Reduce(ReduceError::DestinationExists)) => {
            eprintln!("destination already exists; nothing to do");
            ReduceError::DestinationExists.exit_code() as i32
        }
        Err(err) => {
            eprintln!("error: {}", err);
            err.exit_code()
        }
    }
}

/// Resolves a step-descriptor argument: the literal text, or (when prefixed
/// with `@`) the contents of the file at the given path.
fn resolve_step_text(raw: &str) -> Result<String, CliError> {
    match raw.strip_prefix('@') {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => Ok(raw.to_string()),
    }
}

fn run_reduce(args: ReduceArgs) -> Result<(), CliError> {
    let lwe = LweInstance::load(args.source.join("lwe_instance.json"))?;
    let step_text = resolve_step_text(&args.step)?;
    let step = BkwStepParameters::parse(step_text.trim(), lwe.n)?;
    let categories = num_categories(lwe.q, lwe.n, &step)?;

    if args.verbose >= 1 {
        eprintln!(
            "reducing {} -> {} ({} categories, q={}, n={})",
            args.source.display(),
            args.destination.display(),
            categories,
            lwe.q,
            lwe.n
        );
    }

    if let Some(table_dir) = &args.table_dir {
        std::fs::create_dir_all(table_dir)?;
    }

    let mut source = FileCategoryPairSource::open(&args.source, lwe.n, categories)?;
    let mut sink = FileSampleSink::create(&args.destination, &lwe, &step)?;
    let stats = run_reduction_pass(&mut source, &mut sink, lwe.q, &step, args.max_samples)?;
    let emitted = sink.finish()?;

    if args.verbose >= 1 {
        eprintln!(
            "emitted {} samples ({} dropped as zero columns, {} dropped by unnatural selection)",
            emitted, stats.samples_dropped_zero, stats.samples_dropped_unnatural_selection
        );
    }
    Ok(())
}

fn run_reduce_secret(args: ReduceSecretArgs) -> Result<(), CliError> {
    let lwe_path = args.source.join("lwe_instance.json");
    let samples_path = args.source.join("samples.bin");
    let lwe = LweInstance::load(&lwe_path)?;
    let lsb_secret = std::fs::read(&args.lsb_secret)?;

    if args.verbose >= 1 {
        eprintln!("reducing secret for n={}, q={} -> {}", lwe.n, lwe.q, args.destination.display());
    }

    let stats = run_secret_reduction_pass(&lwe, &samples_path, &args.destination, &lsb_secret)?;

    if args.verbose >= 1 {
        eprintln!("transformed {} samples", stats.samples_transformed);
    }
    Ok(())
}

fn run_pregen_tables(args: PregenTablesArgs) -> Result<(), CliError> {
    let codings = args.resolve_codings()?;
    let jobs: Vec<TableJob> =
        args.q.iter().flat_map(|&q| codings.iter().map(move |&coding| TableJob { q, coding })).collect();
    let total = jobs.len();
    let results = parallel::pregenerate_tables(jobs, args.output.clone(), args.threads, args.verbose)?;
    let failures: Vec<&str> =
        results.iter().filter_map(|r| r.outcome.as_ref().err().map(String::as_str)).collect();
    if !failures.is_empty() {
        return Err(anyhow::anyhow!("{} of {} table(s) failed to generate", failures.len(), total).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_step_text_reads_from_file_when_prefixed() {
        let path = std::env::temp_dir().join(format!("lwe_bkw_core_step_text_{}.txt", std::process::id()));
        std::fs::write(&path, "plainBKW [2 positions, start index=0, selection=LF1]").unwrap();
        let text = resolve_step_text(&format!("@{}", path.display())).unwrap();
        assert!(text.starts_with("plainBKW"));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn resolve_step_text_passes_through_literal_descriptors() {
        let text = resolve_step_text("plainBKW [2 positions, start index=0, selection=LF1]").unwrap();
        assert_eq!(text, "plainBKW [2 positions, start index=0, selection=LF1]");
    }

    #[test]
    fn cli_error_maps_destination_exists_to_its_exit_code() {
        let err: CliError = ReduceError::DestinationExists.into();
        assert_eq!(err.exit_code(), 100);
    }
}
