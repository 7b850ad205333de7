//! Minimal LWE instance descriptor: the narrow contract this crate needs
//! from instance loading/persistence, not a full parameter-search module.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// `(n, q, alpha, s)` for a single LWE instance, as read from
/// `lwe_instance.json` alongside a sample store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LweInstance {
    /// Modulus.
    pub q: u32,
    /// Secret/sample dimension.
    pub n: usize,
    /// Error-distribution parameter (relative standard deviation).
    pub alpha: f64,
    /// The secret vector, length `n`, each entry in `0..q`.
    pub s: Vec<u16>,
}

impl LweInstance {
    pub fn new(q: u32, n: usize, alpha: f64, s: Vec<u16>) -> Result<Self, ConfigError> {
        if s.len() != n {
            return Err(ConfigError::RangeError(format!(
                "secret length {} does not match n={}",
                s.len(),
                n
            )));
        }
        if q < 2 {
            return Err(ConfigError::RangeError("q must be >= 2".to_string()));
        }
        Ok(Self { q, n, alpha, s })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let instance: Self = serde_json::from_str(&text)?;
        Ok(instance)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}
