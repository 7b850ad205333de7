//! CLI argument definitions (C-ambient): the `clap`-derived `Cli`/subcommand
//! shape the original decoder used for its single trial command, split over
//! the three driver operations this crate exposes instead of one.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::error::ConfigError;
use crate::step::CodingType;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Runs one BKW reduction step against a pre-sorted source directory.
    Reduce(ReduceArgs),
    /// Halves a secret and rewrites every sample to stay valid under it.
    ReduceSecret(ReduceSecretArgs),
    /// Generates and persists syndrome-decoding tables for coded BKW.
    PregenTables(PregenTablesArgs),
}

#[derive(ClapArgs, Debug)]
pub struct ReduceArgs {
    /// Directory holding cat_<idx>.bin files and lwe_instance.json.
    #[arg(long)]
    pub source: PathBuf,
    /// Directory to create holding the reduced sample store.
    #[arg(long)]
    pub destination: PathBuf,
    /// Step descriptor text, or `@<path>` to read it from a file.
    #[arg(long)]
    pub step: String,
    /// Maximum number of samples to emit.
    #[arg(long, default_value_t = 1_000_000)]
    pub max_samples: u64,
    /// Directory to load/persist syndrome-decoding tables from; generated
    /// in memory and discarded when omitted.
    #[arg(long)]
    pub table_dir: Option<PathBuf>,
    #[arg(short, long, action = clap::ArgAction::Count, help = "Print progress [repeat for more]")]
    pub verbose: u8,
}

#[derive(ClapArgs, Debug)]
pub struct ReduceSecretArgs {
    /// Directory holding samples.bin and lwe_instance.json.
    #[arg(long)]
    pub source: PathBuf,
    /// Directory to create holding the rewritten sample store.
    #[arg(long)]
    pub destination: PathBuf,
    /// Path to a file holding one 0/1 byte per secret coordinate (the known
    /// least-significant bit of each `s[i]`).
    #[arg(long)]
    pub lsb_secret: PathBuf,
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(ClapArgs, Debug)]
pub struct PregenTablesArgs {
    /// Moduli to generate tables for.
    #[arg(long, value_delimiter = ',', required = true)]
    pub q: Vec<u32>,
    /// Block codes to generate tables for (21, 31, 41, 2121); all four when
    /// omitted.
    #[arg(long, value_delimiter = ',')]
    pub coding: Vec<String>,
    #[arg(long)]
    pub output: PathBuf,
    /// Worker thread count [default: one per core].
    #[arg(long)]
    pub threads: Option<usize>,
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl PregenTablesArgs {
    pub fn resolve_codings(&self) -> Result<Vec<CodingType>, ConfigError> {
        if self.coding.is_empty() {
            return Ok(vec![
                CodingType::Block21,
                CodingType::Block31,
                CodingType::Block41,
                CodingType::Concatenated2121,
            ]);
        }
        self.coding
            .iter()
            .map(|label| match label.as_str() {
                "21" => Ok(CodingType::Block21),
                "31" => Ok(CodingType::Block31),
                "41" => Ok(CodingType::Block41),
                "2121" => Ok(CodingType::Concatenated2121),
                other => Err(ConfigError::UnknownSorting(other.to_string())),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_codings_defaults_to_all_four() {
        let args = PregenTablesArgs { q: vec![101], coding: vec![], output: PathBuf::new(), threads: None, verbose: 0 };
        assert_eq!(args.resolve_codings().unwrap().len(), 4);
    }

    #[test]
    fn resolve_codings_rejects_unknown_label() {
        let args = PregenTablesArgs {
            q: vec![101],
            coding: vec!["99".to_string()],
            output: PathBuf::new(),
            threads: None,
            verbose: 0,
        };
        assert!(args.resolve_codings().is_err());
    }
}
