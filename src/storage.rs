//! Storage adapter (C6): the narrow reader/writer contracts the reduction
//! pass consumes. Only sufficient to run the pass end-to-end against a
//! directory already sorted into one file per category; the full
//! storage-folder sorting pass itself is out of scope.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::ReduceError;
use crate::lwe::LweInstance;
use crate::sample::{Sample, SampleRecordTrailer};
use crate::step::BkwStepParameters;

/// One delivery from a [`CategoryPairSource`]: either the stream has ended,
/// a lone (unpaired, boundary) category was delivered, or a category and
/// its additive-inverse partner were delivered together.
pub enum CategoryPair {
    End,
    Single(Vec<Sample>),
    Pair(Vec<Sample>, Vec<Sample>),
}

pub trait CategoryPairSource {
    fn next_adjacent_pair(&mut self) -> Result<CategoryPair, ReduceError>;
}

pub trait SampleSink {
    fn write(&mut self, sample: &Sample) -> Result<(), ReduceError>;
    fn finish(self) -> Result<u64, ReduceError>;
}

/// In-memory test double: yields the pairs it was constructed with, in
/// order, then [`CategoryPair::End`].
pub struct VecCategoryPairSource {
    pairs: std::vec::IntoIter<CategoryPair>,
}

impl VecCategoryPairSource {
    pub fn new(pairs: Vec<CategoryPair>) -> Self {
        Self { pairs: pairs.into_iter() }
    }
}

impl CategoryPairSource for VecCategoryPairSource {
    fn next_adjacent_pair(&mut self) -> Result<CategoryPair, ReduceError> {
        Ok(self.pairs.next().unwrap_or(CategoryPair::End))
    }
}

/// Reads a sorted source directory one category file at a time
/// (`cat_<idx>.bin`), pairing index `i` with its additive-inverse index
/// the same way the reduction pass pairs meta-grid cells, walking `i` from
/// `0` up to (but not past) its own inverse so no pair is delivered twice.
pub struct FileCategoryPairSource {
    dir: PathBuf,
    n: usize,
    num_categories: u64,
    next_index: u64,
}

impl FileCategoryPairSource {
    pub fn open(dir: impl AsRef<Path>, n: usize, num_categories: u64) -> Result<Self, ReduceError> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(ReduceError::StorageReaderInit);
        }
        Ok(Self { dir, n, num_categories, next_index: 0 })
    }

    fn category_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("cat_{}.bin", index))
    }

    fn read_category(&self, index: u64) -> Result<Vec<Sample>, ReduceError> {
        let path = self.category_path(index);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&path)?;
        read_samples(&bytes, self.n)
    }

    fn additive_inverse(&self, index: u64) -> u64 {
        crate::reduce::additive_inverse(self.num_categories, index)
    }
}

impl CategoryPairSource for FileCategoryPairSource {
    fn next_adjacent_pair(&mut self) -> Result<CategoryPair, ReduceError> {
        if self.next_index >= self.num_categories {
            return Ok(CategoryPair::End);
        }
        let i = self.next_index;
        let inv = self.additive_inverse(i);
        self.next_index += 1;
        if inv == i {
            return Ok(CategoryPair::Single(self.read_category(i)?));
        }
        if inv < i {
            // already delivered as the partner of an earlier index.
            return self.next_adjacent_pair();
        }
        let b1 = self.read_category(i)?;
        let b2 = self.read_category(inv)?;
        Ok(CategoryPair::Pair(b1, b2))
    }
}

fn record_size(n: usize) -> usize {
    n * 2 + std::mem::size_of::<SampleRecordTrailer>()
}

/// Reads fixed-width records laid out per spec.md §3/§6: `a[n]: u16`
/// (little-endian) followed by `hash: u64, error: i16, sumWithError: u16`.
fn read_samples(bytes: &[u8], n: usize) -> Result<Vec<Sample>, ReduceError> {
    let size = record_size(n);
    if size == 0 || bytes.len() % size != 0 {
        return Err(ReduceError::MalformedSampleInfo(format!(
            "sample file length {} is not a multiple of the record size {}",
            bytes.len(),
            size
        )));
    }
    let a_bytes = n * 2;
    let trailer_size = std::mem::size_of::<SampleRecordTrailer>();
    let mut samples = Vec::with_capacity(bytes.len() / size);
    for chunk in bytes.chunks_exact(size) {
        let mut a = Vec::with_capacity(n);
        for pair in chunk[..a_bytes].chunks_exact(2) {
            a.push(u16::from_le_bytes([pair[0], pair[1]]));
        }
        let trailer: SampleRecordTrailer = *bytemuck::from_bytes(&chunk[a_bytes..a_bytes + trailer_size]);
        samples.push(Sample {
            a,
            hash: trailer.hash,
            error: trailer.error,
            sum_with_error: trailer.sum_with_error,
        });
    }
    Ok(samples)
}

/// Writes one record per spec.md §3/§6: `a` first, then the
/// `hash`/`error`/`sumWithError` trailer.
fn write_sample(writer: &mut impl Write, sample: &Sample) -> Result<(), ReduceError> {
    for &v in &sample.a {
        writer.write_all(&v.to_le_bytes())?;
    }
    let trailer = SampleRecordTrailer::from_sample(sample);
    writer.write_all(bytemuck::bytes_of(&trailer))?;
    Ok(())
}

/// Writes samples to `<dir>/samples.bin`, plus the LWE instance descriptor
/// and step-descriptor text line on open, as spec.md §6 requires. Refuses
/// to open over an already-existing directory (the pass's re-entry guard).
pub struct FileSampleSink {
    dir: PathBuf,
    writer: BufWriter<File>,
    count: u64,
}

impl FileSampleSink {
    pub fn create(
        dir: impl AsRef<Path>,
        lwe: &LweInstance,
        step: &BkwStepParameters,
    ) -> Result<Self, ReduceError> {
        Self::create_impl(dir, lwe, Some(&step.to_string()))
    }

    /// Opens a destination store with no step descriptor, for passes (such
    /// as secret reduction) that are not a sorted-category BKW step.
    pub fn create_plain(dir: impl AsRef<Path>, lwe: &LweInstance) -> Result<Self, ReduceError> {
        Self::create_impl(dir, lwe, None)
    }

    fn create_impl(
        dir: impl AsRef<Path>,
        lwe: &LweInstance,
        step_descriptor: Option<&str>,
    ) -> Result<Self, ReduceError> {
        let dir = dir.as_ref().to_path_buf();
        if dir.exists() {
            return Err(ReduceError::DestinationExists);
        }
        fs::create_dir_all(&dir)?;
        lwe.save(&dir.join("lwe_instance.json")).map_err(ReduceError::Config)?;
        if let Some(descriptor) = step_descriptor {
            fs::write(dir.join("step.txt"), descriptor)?;
        }
        let file = OpenOptions::new().create(true).write(true).truncate(true).open(dir.join("samples.bin"))?;
        Ok(Self { dir, writer: BufWriter::new(file), count: 0 })
    }
}

impl SampleSink for FileSampleSink {
    fn write(&mut self, sample: &Sample) -> Result<(), ReduceError> {
        write_sample(&mut self.writer, sample)?;
        self.count += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<u64, ReduceError> {
        self.writer.flush()?;
        Ok(self.count)
    }
}

impl FileSampleSink {
    /// Removes the destination directory entirely; used to recover from a
    /// mid-pass I/O error so a partial directory doesn't look "already
    /// done" to a retried run.
    pub fn discard(self) -> Result<(), ReduceError> {
        let dir = self.dir.clone();
        drop(self);
        fs::remove_dir_all(dir)?;
        Ok(())
    }
}

/// Loads every sample from a plain (unsorted) sample file, for use by the
/// secret-reduction pass, which streams the whole store rather than
/// category-by-category.
pub fn read_sample_stream(path: impl AsRef<Path>) -> Result<BufReader<File>, ReduceError> {
    Ok(BufReader::new(File::open(path)?))
}

pub fn read_one_sample(reader: &mut impl Read, n: usize) -> Result<Option<Sample>, ReduceError> {
    let size = record_size(n);
    let mut buf = vec![0u8; size];
    let mut read_total = 0;
    while read_total < size {
        let read = reader.read(&mut buf[read_total..])?;
        if read == 0 {
            if read_total == 0 {
                return Ok(None);
            }
            return Err(ReduceError::MalformedSampleInfo("truncated sample record".to_string()));
        }
        read_total += read;
    }
    let samples = read_samples(&buf, n)?;
    Ok(samples.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Sample;

    #[test]
    fn write_then_read_round_trips() {
        let sample = Sample::new(vec![1, 2, 3], 4, 5);
        let mut buf = Vec::new();
        write_sample(&mut buf, &sample).unwrap();
        let back = read_samples(&buf, 3).unwrap();
        assert_eq!(back, vec![sample]);
    }

    #[test]
    fn vec_source_ends_after_its_pairs() {
        let mut src = VecCategoryPairSource::new(vec![CategoryPair::Single(vec![])]);
        assert!(matches!(src.next_adjacent_pair().unwrap(), CategoryPair::Single(_)));
        assert!(matches!(src.next_adjacent_pair().unwrap(), CategoryPair::End));
    }
}
