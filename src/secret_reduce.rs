//! Secret reduction (C5): given the known LSBs of the secret, halve the
//! secret and rewrite every persisted sample so it stays valid under the
//! reduced secret `s' = (s - lsb) / 2`. A direct port of
//! `transform_sample`/`reduce_secret`/`transition_reduce_secret` from
//! `original_source/src/transition_reduce_secret.c`.

use crate::error::ReduceError;
use crate::lwe::LweInstance;
use crate::sample::Sample;
use crate::storage::{read_one_sample, read_sample_stream, FileSampleSink, SampleSink};

/// A 250 MiB read buffer's worth of samples for a given record size,
/// mirroring `READ_BUFFER_CAPACITY_IN_SAMPLES` in `original_source/`.
pub fn read_buffer_capacity_in_samples(n: usize) -> usize {
    const READ_BUFFER_BYTES: usize = 250 * 1024 * 1024;
    let record_size = n * 2 + std::mem::size_of::<crate::sample::SampleRecordTrailer>();
    (READ_BUFFER_BYTES / record_size).max(1)
}

/// Halves every coordinate of the secret given its known LSBs: `s[i] <=
/// q/2` takes the direct half, the mirrored coordinates take the
/// reflected half so the result always lands back in `[0, q)`.
pub fn reduce_secret(lwe: &LweInstance, lsb_secret: &[u8]) -> Result<LweInstance, ReduceError> {
    if lsb_secret.len() != lwe.n {
        return Err(ReduceError::MalformedSampleInfo(format!(
            "lsb_secret length {} does not match n={}",
            lsb_secret.len(),
            lwe.n
        )));
    }
    let q = lwe.q;
    let half = q / 2;
    let mut s = lwe.s.clone();
    for (si, &lsb) in s.iter_mut().zip(lsb_secret) {
        let lsb = lsb as u32;
        let value = *si as u32;
        *si = if value <= half {
            (value - lsb) / 2
        } else {
            let inner = (q - value + lsb) / 2;
            (q - inner) % q
        } as u16;
    }
    LweInstance::new(q, lwe.n, lwe.alpha, s).map_err(ReduceError::Config)
}

/// Rewrites one sample for the reduced secret: `a' = 2a mod q`, `b' = (b -
/// <a, lsb'>) mod q`, where `lsb'[i]` lifts the raw 0/1 LSB through the
/// signed convention `lsb[i] == 0 => 0`, `lsb[i] <= q/2 => +1`, else `-1`
/// (the `else` branch is unreachable for genuine 0/1 LSBs but is kept for
/// fidelity with the original's general `u8` input). `error` is untouched.
pub fn transform_sample(q: u32, lsb_secret: &[u8], sample: &Sample) -> Sample {
    let qi = q as i64;
    let mut subt: i64 = 0;
    for (&ai, &lsb) in sample.a.iter().zip(lsb_secret) {
        let sgn: i64 = if lsb == 0 {
            0
        } else if (lsb as i64) <= qi / 2 {
            1
        } else {
            qi - 1
        };
        subt += ai as i64 * sgn;
    }
    subt = subt.rem_euclid(qi);
    let a: Vec<u16> = sample.a.iter().map(|&ai| ((2 * ai as i64) % qi) as u16).collect();
    let sum_with_error = (sample.sum_with_error as i64 - subt).rem_euclid(qi) as u16;
    let mut transformed = Sample::new(a, sample.error, sum_with_error);
    transformed.refresh_hash();
    transformed
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SecretReductionStats {
    pub samples_transformed: u64,
}

/// Streams every sample out of `src_lwe`/`src_samples`, rewrites it under
/// the reduced secret, and writes the result (plus a descriptor for the
/// reduced `LweInstance`) to `dst_dir`. Non-retryable: on any I/O error the
/// destination directory is removed before the error propagates, since the
/// reduction pass's own re-entry guard (destination-exists check) would
/// otherwise treat a half-written directory as already complete.
pub fn run_secret_reduction_pass(
    src_lwe: &LweInstance,
    src_samples_path: impl AsRef<std::path::Path>,
    dst_dir: impl AsRef<std::path::Path>,
    lsb_secret: &[u8],
) -> Result<SecretReductionStats, ReduceError> {
    let reduced_lwe = reduce_secret(src_lwe, lsb_secret)?;
    let mut sink = FileSampleSink::create_plain(dst_dir.as_ref(), &reduced_lwe)?;
    let result = (|| -> Result<SecretReductionStats, ReduceError> {
        let mut reader = read_sample_stream(src_samples_path)?;
        let mut stats = SecretReductionStats::default();
        while let Some(sample) = read_one_sample(&mut reader, src_lwe.n)? {
            let transformed = transform_sample(src_lwe.q, lsb_secret, &sample);
            sink.write(&transformed)?;
            stats.samples_transformed += 1;
        }
        Ok(stats)
    })();
    match result {
        Ok(stats) => {
            sink.finish()?;
            Ok(stats)
        }
        Err(err) => {
            sink.discard()?;
            Err(err)
        }
    }
}
