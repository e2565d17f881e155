// src/lib.rs
// ISF Reader Library - Public API

//! # ISF Reader
//!
//! A Rust library for reading Tektronix ISF waveform files.
//!
//! Oscilloscopes write one `.isf` file per channel. This crate decodes each
//! file, finds the other channel files of the same capture, drops channels
//! that were sampled on a different time base, and returns everything as one
//! [`ndarray::Array2`]: row 0 is the time axis, rows 1.. are the channels.
//!
//! ## Features
//!
//! - Decode ISF preambles (long and abbreviated keywords) and binary curves
//! - Discover sibling channel files with a pluggable naming strategy
//! - Reconstruct the time axis from `XINCR`, `XZERO` and `NR_PT`
//! - Proper error handling
//!
//! ## Example
//!
//! ```no_run
//! use isf_reader::{read_isf, read_isf_files};
//!
//! // Just one channel
//! let single = read_isf("capture/tek0000CH1.isf").expect("Failed to read file");
//! println!("First sample: {} V at {} s", single[[1, 0]], single[[0, 0]]);
//!
//! // All channels of the capture
//! let combined = read_isf_files("capture/tek0000CH1.isf").expect("Failed to read capture");
//! println!("Channels: {}", combined.nrows() - 1);
//! ```

mod assembly;
mod consistency;
mod discovery;
mod isf_tools;
mod reader;

pub use assembly::{assemble, assemble_records, build_time_axis};
pub use consistency::{filter_consistent, MismatchPolicy};
pub use discovery::{FileSet, FileSetDiscovery, SiblingMatcher, TrimmedStemMatcher, ISF_EXTENSION};
pub use isf_tools::{
    BinaryFormat, ByteOrder, Decoder, IsfDecoder, IsfError, IsfHeader, ParsedRecord, Result,
    TimeDomain,
};
pub use reader::{read_isf, read_isf_files, IsfReader};
