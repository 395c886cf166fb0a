//! Repeats one join run `repeat` times, optionally serializing each
//! repetition's timings and result to a CSV file as one row, the way
//! the teacher's benchmark harnesses build a `DataPoint` template once
//! and `csv_writer.serialize` a filled-in copy per repetition.

use crate::error::Result;
use crate::measurement::data_point::DataPoint;
use std::path::Path;

/// One repetition's timings and join result.
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    pub generation_ns: u128,
    pub partition_ns: u128,
    pub build_probe_ns: u128,
    pub total_ns: u128,
    pub matches: u64,
    pub checksum: u64,
}

pub fn measure<F>(
    repeat: u32,
    csv_path: Option<&Path>,
    template: &DataPoint,
    mut run_once: F,
) -> Result<Vec<RunOutcome>>
where
    F: FnMut() -> Result<RunOutcome>,
{
    let mut writer = match csv_path {
        Some(path) => Some(csv::Writer::from_path(path)?),
        None => None,
    };

    let mut outcomes = Vec::with_capacity(repeat as usize);
    for _ in 0..repeat {
        let outcome = run_once()?;

        if let Some(w) = writer.as_mut() {
            let dp = DataPoint {
                generation_ns: Some(outcome.generation_ns),
                partition_ns: Some(outcome.partition_ns),
                build_probe_ns: Some(outcome.build_probe_ns),
                total_ns: Some(outcome.total_ns),
                matches: Some(outcome.matches),
                checksum: Some(outcome.checksum),
                ..template.clone()
            };
            w.serialize(dp)?;
        }

        outcomes.push(outcome);
    }

    if let Some(w) = writer.as_mut() {
        w.flush()?;
    }

    Ok(outcomes)
}
