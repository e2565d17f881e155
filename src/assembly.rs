// src/assembly.rs
// Time axis reconstruction and the combined time + channels array

use ndarray::{Array1, Array2, ArrayView1};

use crate::isf_tools::{IsfError, ParsedRecord, Result};

/// Timestamps of every sample of `reference`: `i * XINCR + XZERO` for
/// `i` in `0..NR_PT`.
pub fn build_time_axis(reference: &ParsedRecord) -> Array1<f64> {
    let domain = reference.time_domain();
    (0..domain.nr_pt)
        .map(|i| i as f64 * domain.xincr + domain.xzero)
        .collect()
}

/// Stack the time axis and each channel into one array of shape
/// `(1 + channels.len(), time.len())`. Row 0 is time, then the channels in
/// the order given.
pub fn assemble(time: &Array1<f64>, channels: &[&[f64]]) -> Result<Array2<f64>> {
    let width = time.len();
    for (idx, channel) in channels.iter().enumerate() {
        if channel.len() != width {
            return Err(IsfError::ShapeMismatch {
                row: idx + 1,
                expected: width,
                found: channel.len(),
            });
        }
    }

    let mut combined = Array2::zeros((channels.len() + 1, width));
    combined.row_mut(0).assign(time);
    for (mut row, channel) in combined.outer_iter_mut().skip(1).zip(channels) {
        row.assign(&ArrayView1::from(*channel));
    }

    Ok(combined)
}

/// Time axis of the first record followed by every record's samples.
///
/// The reference's `NR_PT` must match its decoded sample count before the
/// axis is allocated from it.
pub fn assemble_records(records: &[ParsedRecord]) -> Result<Array2<f64>> {
    let time = match records.first() {
        Some(reference) => {
            if reference.header.nr_pt != reference.data.len() as u64 {
                return Err(IsfError::ShapeMismatch {
                    row: 1,
                    expected: usize::try_from(reference.header.nr_pt).unwrap_or(usize::MAX),
                    found: reference.data.len(),
                });
            }
            build_time_axis(reference)
        }
        None => Array1::zeros(0),
    };
    let channels: Vec<&[f64]> = records.iter().map(|r| r.data.as_slice()).collect();
    assemble(&time, &channels)
}
