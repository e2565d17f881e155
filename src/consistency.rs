// src/consistency.rs
// Keep only channels that share the reference channel's time domain

use log::warn;

use crate::isf_tools::{IsfError, ParsedRecord, Result};

/// What to do with a channel whose time domain differs from the first one.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MismatchPolicy {
    /// Drop the channel and carry on with the rest.
    #[default]
    Exclude,
    /// Fail the whole read with [`IsfError::TimeDomainMismatch`].
    Reject,
}

/// Filter `records` down to those whose `XINCR`, `XZERO` and `NR_PT` equal
/// the first record's exactly. The first record is the reference and is
/// always kept. Order is preserved.
pub fn filter_consistent(records: Vec<ParsedRecord>, policy: MismatchPolicy) -> Result<Vec<ParsedRecord>> {
    let mut records = records.into_iter();
    let Some(reference) = records.next() else {
        return Ok(Vec::new());
    };
    let domain = reference.time_domain();

    let mut kept = vec![reference];
    for record in records {
        let found = record.time_domain();
        if found == domain {
            kept.push(record);
            continue;
        }

        match policy {
            MismatchPolicy::Exclude => {
                warn!(
                    "excluding {}: time domain {:?} differs from reference {:?}",
                    record.path.display(),
                    found,
                    domain
                );
            }
            MismatchPolicy::Reject => {
                return Err(IsfError::TimeDomainMismatch {
                    path: record.path,
                    reference: domain,
                    found,
                });
            }
        }
    }

    Ok(kept)
}
