//! Canonical timestamp sequence generation.

use crate::error::{PadError, Result};
use crate::granularity::Granularity;
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, TimeDelta};

/// Default ceiling on the number of steps in a canonical sequence.
pub const DEFAULT_MAX_STEPS: usize = 10_000_000;

/// Precision used to interpret a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Date,
    DateTime,
}

impl Precision {
    /// Date-time for sub-day granularities, date otherwise.
    pub fn for_granularity(granularity: &Granularity) -> Self {
        if granularity.unit.is_sub_day() {
            Precision::DateTime
        } else {
            Precision::Date
        }
    }
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

/// Parse a start or end bound.
///
/// With date precision a time-of-day component is dropped; with date-time
/// precision a bare date means midnight.
pub fn parse_bound(text: &str, precision: Precision) -> Result<NaiveDateTime> {
    let text = text.trim();
    let parsed = match precision {
        Precision::Date => parse_date(text)
            .or_else(|| parse_datetime(text).map(|dt| dt.date()))
            .and_then(|d| d.and_hms_opt(0, 0, 0)),
        Precision::DateTime => {
            parse_datetime(text).or_else(|| parse_date(text).and_then(|d| d.and_hms_opt(0, 0, 0)))
        }
    };
    parsed.ok_or_else(|| PadError::Parse(format!("invalid date or date-time bound '{}'", text)))
}

fn is_month_end(ts: NaiveDateTime) -> bool {
    ts.date()
        .succ_opt()
        .map(|next| next.month() != ts.month())
        .unwrap_or(true)
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

/// Months since year 0.
pub(crate) fn month_index(ts: NaiveDateTime) -> i64 {
    i64::from(ts.year()) * 12 + i64::from(ts.month0())
}

/// Day of the month a calendar series sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthDay {
    /// Last day of every month
    End,
    /// Fixed day, clamped to the last day of shorter months
    Day(u32),
}

impl MonthDay {
    /// Day of the month shared by all `timestamps`.
    ///
    /// `None` when they differ in time of day, or when some timestamp is
    /// neither on the common day nor a clamped month end before it.
    pub fn of_series(timestamps: &[NaiveDateTime]) -> Option<Self> {
        let first = timestamps.first()?;
        if timestamps.iter().any(|ts| ts.time() != first.time()) {
            return None;
        }
        if timestamps.iter().all(|&ts| is_month_end(ts)) {
            return Some(MonthDay::End);
        }
        let day = timestamps.iter().map(|ts| ts.day()).max()?;
        timestamps
            .iter()
            .all(|&ts| ts.day() == day || (ts.day() < day && is_month_end(ts)))
            .then_some(MonthDay::Day(day))
    }

    fn in_month(self, year: i32, month: u32) -> Option<NaiveDate> {
        let last = last_day_of_month(year, month)?;
        match self {
            MonthDay::End => Some(last),
            MonthDay::Day(day) => last.with_day(day.min(last.day())),
        }
    }
}

/// Reference point a grid is laid out from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridAnchor {
    /// A timestamp on the grid
    pub timestamp: NaiveDateTime,
    /// Day of the month for calendar steps
    pub month_day: MonthDay,
}

impl GridAnchor {
    /// Anchor on a single timestamp; a month end anchors on month ends.
    pub fn at(timestamp: NaiveDateTime) -> Self {
        let month_day = if is_month_end(timestamp) {
            MonthDay::End
        } else {
            MonthDay::Day(timestamp.day())
        };
        Self {
            timestamp,
            month_day,
        }
    }

    /// Anchor on a sorted series: its first timestamp, with the day of the
    /// month the whole series shares when it has one.
    pub fn for_series(timestamps: &[NaiveDateTime]) -> Option<Self> {
        let first = *timestamps.first()?;
        Some(match MonthDay::of_series(timestamps) {
            Some(month_day) => Self {
                timestamp: first,
                month_day,
            },
            None => Self::at(first),
        })
    }
}

/// Grid between two bounds, sized before anything is allocated.
#[derive(Debug, Clone, Copy)]
enum GridPlan {
    /// `steps` timestamps `step` microseconds apart, from `first`
    Fixed {
        first: NaiveDateTime,
        step: TimeDelta,
        steps: u64,
    },
    /// `steps` calendar periods of `period` months, every `every`th one
    /// from `first_period`, each placed like the anchor within its period
    Calendar {
        first_period: i64,
        period: i64,
        every: i64,
        month_offset: i64,
        steps: u64,
    },
}

impl GridPlan {
    fn new(
        start: NaiveDateTime,
        end: NaiveDateTime,
        granularity: &Granularity,
        anchor: &GridAnchor,
    ) -> Result<Self> {
        if let Some(period) = granularity.unit.months() {
            granularity.step_months().ok_or_else(|| granularity.too_large())?;
            let period = i64::from(period);
            let every = i64::from(granularity.count.max(1));
            let period_of = |ts: NaiveDateTime| month_index(ts).div_euclid(period);

            let anchor_period = period_of(anchor.timestamp);
            let (lo, hi) = (period_of(start), period_of(end));
            let first_period = lo + (anchor_period - lo).rem_euclid(every);
            let steps = if first_period > hi {
                0
            } else {
                ((hi - first_period) / every) as u64 + 1
            };

            return Ok(GridPlan::Calendar {
                first_period,
                period,
                every,
                month_offset: month_index(anchor.timestamp).rem_euclid(period),
                steps,
            });
        }

        let step = granularity
            .fixed_step_micros()
            .filter(|&micros| micros > 0)
            .ok_or_else(|| granularity.too_large())?;
        let offset = |ts: NaiveDateTime| {
            ts.signed_duration_since(anchor.timestamp)
                .num_microseconds()
                .ok_or_else(|| granularity.too_large())
        };
        let (lo, hi) = (offset(start)?, offset(end)?);

        // First step at or after start, last at or before end
        let first_k = lo.div_euclid(step) + i64::from(lo.rem_euclid(step) != 0);
        let last_k = hi.div_euclid(step);
        let steps = if first_k > last_k {
            0
        } else {
            (last_k - first_k) as u64 + 1
        };

        let first = first_k
            .checked_mul(step)
            .map(TimeDelta::microseconds)
            .and_then(|delta| anchor.timestamp.checked_add_signed(delta))
            .ok_or_else(|| granularity.too_large())?;

        Ok(GridPlan::Fixed {
            first,
            step: TimeDelta::microseconds(step),
            steps,
        })
    }

    fn steps(&self) -> u64 {
        match self {
            GridPlan::Fixed { steps, .. } | GridPlan::Calendar { steps, .. } => *steps,
        }
    }

    fn into_sequence(self, anchor: &GridAnchor) -> Vec<NaiveDateTime> {
        let mut sequence = Vec::with_capacity(self.steps() as usize);

        match self {
            GridPlan::Fixed { first, step, steps } => {
                let mut current = first;
                for _ in 0..steps {
                    sequence.push(current);
                    match current.checked_add_signed(step) {
                        Some(next) => current = next,
                        None => break,
                    }
                }
            }
            GridPlan::Calendar {
                first_period,
                period,
                every,
                month_offset,
                steps,
            } => {
                let time = anchor.timestamp.time();
                for k in 0..steps as i64 {
                    let index = (first_period + k * every) * period + month_offset;
                    let Ok(year) = i32::try_from(index.div_euclid(12)) else {
                        break;
                    };
                    let month = index.rem_euclid(12) as u32 + 1;
                    match anchor.month_day.in_month(year, month) {
                        Some(date) => sequence.push(date.and_time(time)),
                        None => break,
                    }
                }
            }
        }

        sequence
    }
}

/// Build the canonical sequence from `start` to `end`, anchored on `start`.
///
/// See [`build_anchored_sequence`].
pub fn build_sequence(
    start: NaiveDateTime,
    end: NaiveDateTime,
    granularity: &Granularity,
    max_steps: usize,
) -> Result<Vec<NaiveDateTime>> {
    build_anchored_sequence(start, end, granularity, &GridAnchor::at(start), max_steps)
}

/// Build the canonical sequence between `start` and `end` on the grid
/// through `anchor`.
///
/// Fixed units give every `anchor + k * step` inside `[start, end]`.
/// Calendar units give one timestamp per month, quarter or year (every
/// `count`th one counted from the anchor's), from the period containing
/// `start` to the period containing `end`. Each lands at the anchor's month
/// within the period, on its day of the month or month end, and at its time
/// of day. So a quarter-end anchor with bounds 2013-01-01 and 2015-07-01
/// yields 2013-03-31 through 2015-09-30.
///
/// The step count is checked against `max_steps` before allocating.
pub fn build_anchored_sequence(
    start: NaiveDateTime,
    end: NaiveDateTime,
    granularity: &Granularity,
    anchor: &GridAnchor,
    max_steps: usize,
) -> Result<Vec<NaiveDateTime>> {
    if start > end {
        return Err(PadError::Range {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    let plan = GridPlan::new(start, end, granularity, anchor)?;
    let steps = plan.steps();
    if steps > max_steps as u64 {
        return Err(PadError::SizeLimit {
            steps,
            limit: max_steps,
        });
    }

    Ok(plan.into_sequence(anchor))
}

/// Canonical sequence of one group and the span rows are kept from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupGrid {
    pub sequence: Vec<NaiveDateTime>,
    /// Earliest kept timestamp: the start bound or the first step
    pub start: NaiveDateTime,
    /// Latest kept timestamp: the end bound or the last step
    pub end: NaiveDateTime,
}

impl GroupGrid {
    /// Grid over `[start, end]`, widened to cover every step of `sequence`.
    pub fn covering(sequence: Vec<NaiveDateTime>, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        let start = sequence.first().map_or(start, |&first| first.min(start));
        let end = sequence.last().map_or(end, |&last| last.max(end));
        Self {
            sequence,
            start,
            end,
        }
    }
}

/// Resolve the bounds of one group and build its grid.
///
/// `timestamps` must be sorted; missing bounds default to its first and last
/// element, and the grid is anchored on the series itself. Returns `None`
/// when there is nothing to anchor on.
pub fn group_sequence(
    timestamps: &[NaiveDateTime],
    granularity: &Granularity,
    start: Option<&str>,
    end: Option<&str>,
    max_steps: usize,
) -> Result<Option<GroupGrid>> {
    let precision = Precision::for_granularity(granularity);
    let start = match start {
        Some(text) => Some(parse_bound(text, precision)?),
        None => timestamps.first().copied(),
    };
    let end = match end {
        Some(text) => Some(parse_bound(text, precision)?),
        None => timestamps.last().copied(),
    };

    let (Some(start), Some(end)) = (start, end) else {
        return Ok(None);
    };
    let anchor = GridAnchor::for_series(timestamps).unwrap_or_else(|| GridAnchor::at(start));
    let sequence = build_anchored_sequence(start, end, granularity, &anchor, max_steps)?;
    Ok(Some(GroupGrid::covering(sequence, start, end)))
}
