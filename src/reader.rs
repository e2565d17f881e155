// src/reader.rs
// Entry points: read one ISF file, or a whole capture of channel files

use std::path::Path;

use log::info;
use ndarray::Array2;

use crate::assembly::assemble_records;
use crate::consistency::{filter_consistent, MismatchPolicy};
use crate::discovery::{FileSetDiscovery, SiblingMatcher};
use crate::isf_tools::{Decoder, IsfDecoder, ParsedRecord, Result};

/// Configurable reader producing a `(1 + channels, NR_PT)` array: row 0 is
/// the time axis of the first channel file, the other rows are the channel
/// samples in file-name order.
///
/// ```no_run
/// use isf_reader::{IsfReader, MismatchPolicy};
///
/// let reader = IsfReader::new().mismatch_policy(MismatchPolicy::Reject);
/// let combined = reader.read("capture/tek0000CH1.isf").expect("Failed to read capture");
/// println!("{} channels, {} samples", combined.nrows() - 1, combined.ncols());
/// ```
#[derive(Debug)]
pub struct IsfReader<D: Decoder = IsfDecoder> {
    decoder: D,
    discovery: FileSetDiscovery,
    discover_siblings: bool,
    mismatch_policy: MismatchPolicy,
}

impl Default for IsfReader<IsfDecoder> {
    fn default() -> Self {
        IsfReader::with_decoder(IsfDecoder)
    }
}

impl IsfReader<IsfDecoder> {
    pub fn new() -> Self {
        IsfReader::default()
    }
}

impl<D: Decoder> IsfReader<D> {
    /// Reader using `decoder` for every channel file.
    pub fn with_decoder(decoder: D) -> Self {
        IsfReader {
            decoder,
            discovery: FileSetDiscovery::default(),
            discover_siblings: true,
            mismatch_policy: MismatchPolicy::default(),
        }
    }

    /// Whether [`read`](Self::read) looks for the other channel files of
    /// the capture. Enabled by default.
    pub fn discover_siblings(mut self, enabled: bool) -> Self {
        self.discover_siblings = enabled;
        self
    }

    pub fn sibling_matcher<M>(mut self, matcher: M) -> Self
    where
        M: SiblingMatcher + Send + Sync + 'static,
    {
        self.discovery = FileSetDiscovery::new(matcher);
        self
    }

    pub fn mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.mismatch_policy = policy;
        self
    }

    /// Read `path`, together with its sibling channel files unless sibling
    /// discovery is disabled.
    pub fn read<P: AsRef<Path>>(&self, path: P) -> Result<Array2<f64>> {
        self.read_set(path.as_ref(), self.discover_siblings)
    }

    /// Read exactly `path`, without looking at the rest of the directory.
    pub fn read_single<P: AsRef<Path>>(&self, path: P) -> Result<Array2<f64>> {
        self.read_set(path.as_ref(), false)
    }

    fn read_set(&self, path: &Path, siblings: bool) -> Result<Array2<f64>> {
        let files = self.discovery.discover(path, siblings)?;

        let records = files
            .iter()
            .map(|file| self.decoder.decode(file))
            .collect::<Result<Vec<ParsedRecord>>>()?;
        let records = filter_consistent(records, self.mismatch_policy)?;

        let combined = assemble_records(&records)?;
        info!(
            "read {}: {} channel(s) of {} samples",
            path.display(),
            combined.nrows() - 1,
            combined.ncols()
        );

        Ok(combined)
    }
}

/// Read a single `.isf` file into a `(2, NR_PT)` array of time and samples.
pub fn read_isf<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    IsfReader::new().read_single(path)
}

/// Read a `.isf` file and the other channel files of its capture into one
/// array, dropping channels sampled on a different time domain.
pub fn read_isf_files<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    IsfReader::new().read(path)
}
