//! Alignment of original rows onto a canonical sequence.

use crate::error::{PadError, Result};
use crate::granularity::Granularity;
use crate::sequence::GroupGrid;
use chrono::NaiveDateTime;

/// Result of aligning one group onto its canonical sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Alignment {
    /// Source row for each canonical step, `None` for synthetic rows
    pub source: Vec<Option<usize>>,
    /// Number of input rows outside the sequence bounds
    pub n_dropped: usize,
}

impl Alignment {
    /// Row origin flags: `true` where the row came from the input.
    pub fn origin(&self) -> Vec<bool> {
        self.source.iter().map(Option::is_some).collect()
    }

    pub fn n_synthetic(&self) -> usize {
        self.source.iter().filter(|s| s.is_none()).count()
    }
}

/// Align input rows onto `grid` by exact timestamp equality.
///
/// `rows` pairs an input row index with its timestamp and need not be sorted.
/// Rows before `grid.start` or after `grid.end` are dropped. A row inside
/// that span which falls between two steps, or a timestamp seen twice, is
/// an error.
pub fn align(
    rows: &[(usize, NaiveDateTime)],
    grid: &GroupGrid,
    granularity: &Granularity,
) -> Result<Alignment> {
    let sequence = &grid.sequence;
    let mut source = vec![None; sequence.len()];

    let mut sorted: Vec<(usize, NaiveDateTime)> = rows.to_vec();
    sorted.sort_by_key(|&(row, ts)| (ts, row));

    let mut n_dropped = 0;
    let mut step = 0;
    let mut previous: Option<NaiveDateTime> = None;

    for (row, ts) in sorted {
        if previous == Some(ts) {
            return Err(PadError::DuplicateTimestamp {
                timestamp: ts.to_string(),
            });
        }
        previous = Some(ts);

        if ts < grid.start || ts > grid.end {
            n_dropped += 1;
            continue;
        }

        while step < sequence.len() && sequence[step] < ts {
            step += 1;
        }

        if step < sequence.len() && sequence[step] == ts {
            source[step] = Some(row);
        } else {
            return Err(PadError::MisalignedTimestamp {
                timestamp: ts.to_string(),
                granularity: granularity.to_string(),
            });
        }
    }

    Ok(Alignment { source, n_dropped })
}
