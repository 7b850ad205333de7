//! Parallel table pregeneration: the same rayon-pool-plus-crossbeam-channel
//! layering the original trial loop used to fan independent units of work
//! out across a thread pool and stream results back to a single collecting
//! thread, rebuilt around independent syndrome-table generation jobs
//! instead of independent decoding trials.

use std::path::PathBuf;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded as channel, Sender};
use rayon::prelude::*;

use crate::step::CodingType;
use crate::syndrome::SyndromeTable;

/// One `(q, coding)` pair whose syndrome-decoding table should be generated
/// and persisted.
#[derive(Clone, Copy, Debug)]
pub struct TableJob {
    pub q: u32,
    pub coding: CodingType,
}

impl TableJob {
    pub fn label(&self) -> String {
        format!("q={}, {}", self.q, self.coding.label())
    }
}

#[derive(Clone, Debug)]
pub struct TableJobResult {
    pub job: TableJob,
    pub outcome: Result<PathBuf, String>,
}

fn generate_and_save(job: TableJob, dir: &std::path::Path) -> Result<PathBuf, String> {
    let table = SyndromeTable::generate(job.q, job.coding).map_err(|e| e.to_string())?;
    let path = dir.join(SyndromeTable::file_name(job.q, job.coding));
    table.save(&path).map_err(|e| e.to_string())?;
    Ok(path)
}

/// Runs every job in `jobs` across a dedicated rayon pool, sending one
/// [`TableJobResult`] over `tx_progress` per completed job as it finishes
/// (order not guaranteed to match `jobs`).
fn run_pregeneration(
    jobs: Vec<TableJob>,
    dir: PathBuf,
    threads: Option<usize>,
    tx_progress: Sender<TableJobResult>,
) -> Result<()> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    let pool = builder.build().context("building rayon thread pool")?;
    pool.install(|| {
        jobs.into_par_iter().for_each_with(tx_progress, |tx, job| {
            let outcome = generate_and_save(job, &dir);
            tx.send(TableJobResult { job, outcome }).ok();
        });
    });
    Ok(())
}

/// Generates every job in `jobs`, reporting each completion at `verbose >=
/// 1`, and returns every result once all jobs have finished.
pub fn pregenerate_tables(
    jobs: Vec<TableJob>,
    dir: PathBuf,
    threads: Option<usize>,
    verbose: u8,
) -> Result<Vec<TableJobResult>> {
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let total = jobs.len();
    let (tx, rx) = channel();
    let dir_for_thread = dir.clone();
    rayon::spawn(move || {
        run_pregeneration(jobs, dir_for_thread, threads, tx).expect("table-generation pool should build");
    });
    let mut results = Vec::with_capacity(total);
    for result in rx {
        if verbose >= 1 {
            match &result.outcome {
                Ok(path) => eprintln!("generated {} -> {}", result.job.label(), path.display()),
                Err(message) => eprintln!("failed {}: {}", result.job.label(), message),
            }
        }
        results.push(result);
    }
    Ok(results)
}
