//! Padding of irregular time series onto a regular grid.

use crate::align::{align, Alignment};
use crate::columns::resolve_time_column;
use crate::error::{PadError, Result};
use crate::fill::{apply_directional_fill, apply_pad_value, FillDirection};
use crate::granularity::{resolve, GranularitySpec};
use crate::sequence::{group_sequence, parse_bound, Precision, DEFAULT_MAX_STEPS};
use crate::table::{Column, ColumnData, ColumnType, Group, Table, TimeTable, Value};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Options for [`pad_by_time`].
///
/// Token-valued options are kept as strings and validated when padding
/// starts, so an options struct can be loaded from configuration as is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PadOptions {
    /// Time column; inferred when it is the only date or date-time column
    pub time_column: Option<String>,
    /// `"auto"` or a phrase such as `"day"`, `"5 min"`, `"quarter"`
    pub granularity: String,
    /// Value for numeric columns on inserted rows
    #[serde(skip_serializing_if = "Value::is_missing")]
    pub pad_value: Value,
    /// One of `none`, `down`, `up`, `downup`, `updown`
    pub fill_direction: String,
    /// Explicit first timestamp of the grid
    pub start: Option<String>,
    /// Explicit last timestamp of the grid
    pub end: Option<String>,
    /// Ceiling on the number of grid steps per group
    pub max_steps: usize,
}

impl Default for PadOptions {
    fn default() -> Self {
        Self {
            time_column: None,
            granularity: "auto".to_string(),
            pad_value: Value::Missing,
            fill_direction: "none".to_string(),
            start: None,
            end: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl PadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from TOML, unspecified keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn time_column(mut self, column: impl Into<String>) -> Self {
        self.time_column = Some(column.into());
        self
    }

    pub fn granularity(mut self, granularity: impl Into<String>) -> Self {
        self.granularity = granularity.into();
        self
    }

    pub fn pad_value(mut self, value: impl Into<Value>) -> Self {
        self.pad_value = value.into();
        self
    }

    pub fn fill_direction(mut self, direction: impl Into<String>) -> Self {
        self.fill_direction = direction.into();
        self
    }

    pub fn start(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }
}

/// Validated, call-scoped view of [`PadOptions`] and the input table.
struct PadContext<'a> {
    table: &'a TimeTable,
    keys: &'a [String],
    time_column: String,
    time_type: ColumnType,
    /// Time column as date-times, computed once for all groups
    timestamps: Vec<Option<NaiveDateTime>>,
    granularity: GranularitySpec,
    direction: FillDirection,
    pad_value: &'a Value,
    start: Option<&'a str>,
    end: Option<&'a str>,
    max_steps: usize,
}

impl<'a> PadContext<'a> {
    fn new(input: &'a Table, options: &'a PadOptions) -> Result<Self> {
        let direction: FillDirection = options.fill_direction.parse()?;
        let (time_column, time_type) =
            resolve_time_column(input, options.time_column.as_deref())?;
        let granularity: GranularitySpec = options.granularity.parse()?;

        if let GranularitySpec::Fixed(g) = granularity {
            if g.unit.is_sub_day() && time_type == ColumnType::Date {
                return Err(PadError::InvalidOption {
                    option: "granularity".to_string(),
                    value: options.granularity.clone(),
                    reason: format!("finer than the date-only column '{}'", time_column),
                });
            }
        }

        // Bounds are re-parsed per group at the group's precision; this
        // surfaces syntax errors before any padding work
        for bound in [&options.start, &options.end].into_iter().flatten() {
            parse_bound(bound, Precision::DateTime)?;
        }

        let timestamps = input
            .table()
            .column(&time_column)
            .and_then(|c| c.data.timestamps())
            .ok_or_else(|| PadError::ColumnNotFound(time_column.clone()))?;

        Ok(Self {
            table: input.table(),
            keys: input.keys(),
            time_column,
            time_type,
            timestamps,
            granularity,
            direction,
            pad_value: &options.pad_value,
            start: options.start.as_deref(),
            end: options.end.as_deref(),
            max_steps: options.max_steps,
        })
    }

    /// Columns padding and filling never touch.
    fn excluded(&self) -> Vec<&str> {
        std::iter::once(self.time_column.as_str())
            .chain(self.keys.iter().map(String::as_str))
            .collect()
    }

    fn pad_group(&self, group: &Group) -> Result<TimeTable> {
        let rows: Vec<(usize, NaiveDateTime)> = group
            .rows
            .iter()
            .filter_map(|&row| self.timestamps.get(row).copied().flatten().map(|ts| (row, ts)))
            .collect();

        let n_missing_time = group.rows.len() - rows.len();
        if n_missing_time > 0 {
            tracing::warn!(
                column = %self.time_column,
                rows = n_missing_time,
                "dropping rows with a missing timestamp"
            );
        }

        let mut timestamps: Vec<NaiveDateTime> = rows.iter().map(|&(_, ts)| ts).collect();
        timestamps.sort();

        let granularity = resolve(self.granularity, &timestamps)?;
        if granularity.unit.is_sub_day() && self.time_type == ColumnType::Date {
            return Err(PadError::InvalidOption {
                option: "granularity".to_string(),
                value: granularity.to_string(),
                reason: format!("finer than the date-only column '{}'", self.time_column),
            });
        }

        let grid = group_sequence(
            &timestamps,
            &granularity,
            self.start,
            self.end,
            self.max_steps,
        )?;
        let alignment = match &grid {
            Some(grid) => align(&rows, grid, &granularity)?,
            None => Alignment {
                source: Vec::new(),
                n_dropped: rows.len(),
            },
        };
        let sequence = grid.map(|grid| grid.sequence).unwrap_or_default();

        let n_steps = sequence.len();
        let columns = self
            .table
            .columns()
            .iter()
            .map(|column| {
                let data = if column.name == self.time_column {
                    time_column_data(&sequence, self.time_type)
                } else if let Some(pos) = self.keys.iter().position(|k| *k == column.name) {
                    let key = group.key.get(pos).cloned().unwrap_or_default();
                    column.data.repeat_like(&column.name, &key, n_steps)?
                } else {
                    column.data.take(&alignment.source)
                };
                Ok(Column::new(column.name.clone(), data))
            })
            .collect::<Result<Vec<Column>>>()?;

        let mut padded = TimeTable::new(columns)?;
        let excluded = self.excluded();
        apply_pad_value(&mut padded, &alignment.origin(), self.pad_value, &excluded)?;
        apply_directional_fill(&mut padded, self.direction, &excluded);

        tracing::debug!(
            granularity = %granularity,
            rows_in = group.rows.len(),
            rows_out = n_steps,
            synthetic = alignment.n_synthetic(),
            dropped = alignment.n_dropped,
            "padded group"
        );

        Ok(padded)
    }
}

fn time_column_data(sequence: &[NaiveDateTime], time_type: ColumnType) -> ColumnData {
    match time_type {
        ColumnType::Date => ColumnData::Date(sequence.iter().map(|ts| Some(ts.date())).collect()),
        _ => ColumnData::DateTime(sequence.iter().map(|&ts| Some(ts)).collect()),
    }
}

/// Pad a table so its time column forms a regular, gap-free sequence.
///
/// Each group is padded independently over its own date range (or the
/// explicit `start`/`end` bounds). Inserted rows get the pad value in every
/// numeric column and stay missing elsewhere; the optional fill direction
/// then propagates known values into all remaining gaps. Group keys are
/// copied onto inserted rows and the grouping of the input is preserved.
///
/// # Errors
/// * `InvalidOption` for an unknown fill direction, before anything else
/// * `AmbiguousColumn` when the time column is omitted and not unique
/// * `Parse` / `Inference` when the granularity cannot be resolved
/// * `Range` / `SizeLimit` when start is after end or the grid is too large
/// * `MisalignedTimestamp` / `DuplicateTimestamp` for rows that do not fit the grid
pub fn pad_by_time(input: &Table, options: &PadOptions) -> Result<Table> {
    let ctx = PadContext::new(input, options)?;
    let span = tracing::debug_span!("pad_by_time", time_column = %ctx.time_column);
    let _guard = span.enter();

    if ctx.table.is_empty() {
        return Ok(input.clone());
    }

    let groups = input.groups();

    #[cfg(feature = "parallel")]
    let parts: Vec<TimeTable> = groups
        .par_iter()
        .map(|group| span.in_scope(|| ctx.pad_group(group)))
        .collect::<Result<Vec<_>>>()?;

    #[cfg(not(feature = "parallel"))]
    let parts: Vec<TimeTable> = groups
        .iter()
        .map(|group| ctx.pad_group(group))
        .collect::<Result<Vec<_>>>()?;

    let padded = TimeTable::concat(ctx.table, parts)?;
    input.rewrap(padded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, day)
    }

    fn quarterly() -> Table {
        Table::Plain(
            TimeTable::new(vec![
                Column::date("date", vec![d(2014, 3, 31), d(2014, 6, 30), d(2014, 12, 31)]),
                Column::numeric("value", vec![Some(1.0), Some(2.0), Some(4.0)]),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_default_options() {
        let options = PadOptions::default();
        assert_eq!(options.granularity, "auto");
        assert_eq!(options.fill_direction, "none");
        assert!(options.pad_value.is_missing());
        assert_eq!(options.max_steps, 10_000_000);
    }

    #[test]
    fn test_options_from_toml() {
        let options = PadOptions::from_toml_str(
            r#"
            time_column = "date"
            granularity = "quarter"
            pad_value = 0
            fill_direction = "down"
            start = "2013-01-01"
            "#,
        )
        .unwrap();
        assert_eq!(options.time_column.as_deref(), Some("date"));
        assert_eq!(options.granularity, "quarter");
        assert_eq!(options.pad_value, Value::Numeric(0.0));
        assert_eq!(options.fill_direction, "down");
        assert_eq!(options.start.as_deref(), Some("2013-01-01"));
        assert_eq!(options.end, None);
        assert_eq!(options.max_steps, DEFAULT_MAX_STEPS);
    }

    #[test]
    fn test_options_from_toml_rejects_garbage() {
        let result = PadOptions::from_toml_str("granularity = [");
        assert!(matches!(result, Err(PadError::Config(_))));
    }

    #[test]
    fn test_fill_direction_checked_first() {
        // Also has no time column, but the option error wins
        let table = Table::Plain(
            TimeTable::new(vec![Column::numeric("value", vec![Some(1.0)])]).unwrap(),
        );
        let options = PadOptions::new().fill_direction("sideways");
        assert!(matches!(
            pad_by_time(&table, &options),
            Err(PadError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_sub_day_granularity_on_date_column() {
        let options = PadOptions::new().granularity("hour");
        assert!(matches!(
            pad_by_time(&quarterly(), &options),
            Err(PadError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_bad_bound_rejected_up_front() {
        let options = PadOptions::new().granularity("quarter").start("last year");
        assert!(matches!(
            pad_by_time(&quarterly(), &options),
            Err(PadError::Parse(_))
        ));
    }

    #[test]
    fn test_pad_quarterly() {
        let padded = pad_by_time(&quarterly(), &PadOptions::new().granularity("quarter")).unwrap();
        let table = padded.table();
        assert_eq!(table.n_rows(), 4);
        assert_eq!(table.value(2, "date"), Value::from(d(2014, 9, 30)));
        assert_eq!(table.value(2, "value"), Value::Missing);
    }

    #[test]
    fn test_empty_table_passes_through() {
        let table = Table::Plain(
            TimeTable::new(vec![
                Column::date("date", vec![]),
                Column::numeric("value", vec![]),
            ])
            .unwrap(),
        );
        let padded = pad_by_time(&table, &PadOptions::default()).unwrap();
        assert_eq!(padded, table);
    }
}
