//! Calendar features derived from a time column (the "time series signature").

use crate::columns::resolve_time_column;
use crate::error::Result;
use crate::table::{Column, ColumnData, Table};
use chrono::{Datelike, NaiveDateTime, Timelike};

const MONTH_LABELS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const WEEKDAY_LABELS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Names of the generated columns, in output order.
pub const SIGNATURE_COLUMNS: [&str; 26] = [
    "index_num", "diff", "year", "year_iso", "half", "quarter", "month", "month_lbl", "mday",
    "hour", "minute", "second", "hour12", "am_pm", "wday", "wday_lbl", "qday", "yday", "mweek",
    "week", "week_iso", "week2", "week3", "week4", "mday7", "is_month_end",
];

/// Calendar features of a single timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    /// Seconds since the Unix epoch
    pub index_num: f64,
    pub year: i32,
    pub year_iso: i32,
    /// 1 for January-June, 2 otherwise
    pub half: u32,
    pub quarter: u32,
    pub month: u32,
    pub month_lbl: &'static str,
    pub mday: u32,
    pub hour: u32,
    pub minute: u32,
    /// Seconds including the fractional part
    pub second: f64,
    /// 1-12
    pub hour12: u32,
    /// 1 = am, 2 = pm
    pub am_pm: u32,
    /// 1 = Sunday ... 7 = Saturday
    pub wday: u32,
    pub wday_lbl: &'static str,
    /// Day of the quarter, starting at 1
    pub qday: u32,
    pub yday: u32,
    /// Week of the month, weeks starting on Sunday
    pub mweek: u32,
    pub week: u32,
    pub week_iso: u32,
    pub week2: u32,
    pub week3: u32,
    pub week4: u32,
    pub mday7: u32,
    pub is_month_end: bool,
}

impl Signature {
    pub fn new(ts: NaiveDateTime) -> Self {
        let date = ts.date();
        let month = date.month();
        let mday = date.day();
        let yday = date.ordinal();
        let hour = ts.hour();
        let wday = date.weekday().num_days_from_sunday() + 1;
        let iso = date.iso_week();

        let quarter = (month - 1) / 3 + 1;
        let quarter_start_month = (quarter - 1) * 3 + 1;
        let qday = date
            .with_day(1)
            .and_then(|d| d.with_month(quarter_start_month))
            .map(|start| (date - start).num_days() as u32 + 1)
            .unwrap_or(1);

        // Weekday (1 = Sunday) of the first of the month
        let first_wday = date
            .with_day(1)
            .map(|d| d.weekday().num_days_from_sunday() + 1)
            .unwrap_or(1);
        let week = (yday - 1) / 7 + 1;

        let is_month_end = date
            .succ_opt()
            .map(|next| next.month() != month)
            .unwrap_or(true);

        Self {
            index_num: ts.and_utc().timestamp_micros() as f64 / 1e6,
            year: date.year(),
            year_iso: iso.year(),
            half: if month <= 6 { 1 } else { 2 },
            quarter,
            month,
            month_lbl: MONTH_LABELS[(month - 1) as usize],
            mday,
            hour,
            minute: ts.minute(),
            second: ts.second() as f64 + ts.nanosecond() as f64 / 1e9,
            hour12: if hour % 12 == 0 { 12 } else { hour % 12 },
            am_pm: if hour < 12 { 1 } else { 2 },
            wday,
            wday_lbl: WEEKDAY_LABELS[(wday - 1) as usize],
            qday,
            yday,
            mweek: (mday + first_wday - 2) / 7 + 1,
            week,
            week_iso: iso.week(),
            week2: week % 2,
            week3: week % 3,
            week4: week % 4,
            mday7: (mday - 1) / 7 + 1,
            is_month_end,
        }
    }
}

/// Column builders for the signature of a sequence of timestamps.
struct SignatureColumns {
    numeric: Vec<(&'static str, Vec<Option<f64>>)>,
    month_lbl: Vec<Option<String>>,
    wday_lbl: Vec<Option<String>>,
    is_month_end: Vec<Option<bool>>,
}

impl SignatureColumns {
    fn with_capacity(n: usize) -> Self {
        let numeric = SIGNATURE_COLUMNS
            .iter()
            .filter(|name| !matches!(**name, "month_lbl" | "wday_lbl" | "is_month_end"))
            .map(|&name| (name, Vec::with_capacity(n)))
            .collect();
        Self {
            numeric,
            month_lbl: Vec::with_capacity(n),
            wday_lbl: Vec::with_capacity(n),
            is_month_end: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, signature: Option<&Signature>, diff: Option<f64>) {
        for (name, values) in self.numeric.iter_mut() {
            let value = match (*name, signature) {
                ("diff", _) => diff,
                (_, None) => None,
                (name, Some(s)) => Some(match name {
                    "index_num" => s.index_num,
                    "year" => s.year as f64,
                    "year_iso" => s.year_iso as f64,
                    "half" => s.half as f64,
                    "quarter" => s.quarter as f64,
                    "month" => s.month as f64,
                    "mday" => s.mday as f64,
                    "hour" => s.hour as f64,
                    "minute" => s.minute as f64,
                    "second" => s.second,
                    "hour12" => s.hour12 as f64,
                    "am_pm" => s.am_pm as f64,
                    "wday" => s.wday as f64,
                    "qday" => s.qday as f64,
                    "yday" => s.yday as f64,
                    "mweek" => s.mweek as f64,
                    "week" => s.week as f64,
                    "week_iso" => s.week_iso as f64,
                    "week2" => s.week2 as f64,
                    "week3" => s.week3 as f64,
                    "week4" => s.week4 as f64,
                    _ => s.mday7 as f64,
                }),
            };
            values.push(value);
        }
        self.month_lbl.push(signature.map(|s| s.month_lbl.to_string()));
        self.wday_lbl.push(signature.map(|s| s.wday_lbl.to_string()));
        self.is_month_end.push(signature.map(|s| s.is_month_end));
    }

    fn into_columns(self) -> Vec<Column> {
        // Numeric builders are stored in output order
        let mut numeric = self.numeric.into_iter().map(|(_, values)| values);
        let mut month_lbl = Some(self.month_lbl);
        let mut wday_lbl = Some(self.wday_lbl);
        let mut is_month_end = Some(self.is_month_end);

        SIGNATURE_COLUMNS
            .iter()
            .map(|&name| {
                let data = match name {
                    "month_lbl" => ColumnData::Text(month_lbl.take().unwrap_or_default()),
                    "wday_lbl" => ColumnData::Text(wday_lbl.take().unwrap_or_default()),
                    "is_month_end" => {
                        ColumnData::Boolean(is_month_end.take().unwrap_or_default())
                    }
                    _ => ColumnData::Numeric(numeric.next().unwrap_or_default()),
                };
                Column::new(name, data)
            })
            .collect()
    }
}

/// Signature columns for `timestamps`, one row per input element.
///
/// `diff` is measured against the previous element; callers that need it per
/// group pass each group separately or use [`augment_timeseries_signature`].
pub fn timeseries_signature(timestamps: &[Option<NaiveDateTime>]) -> Vec<Column> {
    let mut columns = SignatureColumns::with_capacity(timestamps.len());
    let mut previous: Option<NaiveDateTime> = None;

    for ts in timestamps {
        let signature = ts.map(Signature::new);
        columns.push(signature.as_ref(), seconds_between(previous, *ts));
        previous = *ts;
    }

    columns.into_columns()
}

fn seconds_between(previous: Option<NaiveDateTime>, current: Option<NaiveDateTime>) -> Option<f64> {
    let (previous, current) = (previous?, current?);
    current
        .signed_duration_since(previous)
        .num_microseconds()
        .map(|micros| micros as f64 / 1e6)
}

/// Append the time series signature of the time column to a table.
///
/// Rows keep their order. For grouped tables `diff` is computed within each
/// group, so the first row of every group has a missing `diff`.
pub fn augment_timeseries_signature(input: &Table, time_column: Option<&str>) -> Result<Table> {
    let (time_column, _) = resolve_time_column(input, time_column)?;
    let table = input.table();
    let timestamps = table
        .column(&time_column)
        .and_then(|c| c.data.timestamps())
        .unwrap_or_default();

    let mut columns = timeseries_signature(&timestamps);

    // Recompute diff within groups, in input row order
    let mut diff = vec![None; table.n_rows()];
    for group in input.groups() {
        let mut previous = None;
        for &row in &group.rows {
            diff[row] = seconds_between(previous, timestamps[row]);
            previous = timestamps[row];
        }
    }
    if let Some(column) = columns.iter_mut().find(|c| c.name == "diff") {
        column.data = ColumnData::Numeric(diff);
    }

    tracing::debug!(
        time_column = %time_column,
        rows = table.n_rows(),
        features = columns.len(),
        "augmented time series signature"
    );

    let augmented = table.clone().with_columns(columns)?;
    input.rewrap(augmented)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PadError;
    use crate::table::{TimeTable, Value};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_signature_fields() {
        // Saturday
        let s = Signature::new(at(2016, 1, 2, 15, 30, 45));
        assert_eq!(s.year, 2016);
        assert_eq!(s.year_iso, 2015);
        assert_eq!(s.week_iso, 53);
        assert_eq!(s.half, 1);
        assert_eq!(s.quarter, 1);
        assert_eq!(s.month_lbl, "January");
        assert_eq!(s.mday, 2);
        assert_eq!(s.hour12, 3);
        assert_eq!(s.am_pm, 2);
        assert_eq!(s.wday, 7);
        assert_eq!(s.wday_lbl, "Saturday");
        assert_eq!(s.qday, 2);
        assert_eq!(s.yday, 2);
        assert_eq!(s.week, 1);
        assert_eq!(s.mweek, 1);
        assert_eq!(s.mday7, 1);
        assert!(!s.is_month_end);
        assert_relative_eq!(s.second, 45.0);
        assert_relative_eq!(s.index_num, 1_451_748_645.0);
    }

    #[test]
    fn test_signature_quarter_and_month_week() {
        // Sunday, second quarter
        let s = Signature::new(at(2021, 5, 2, 0, 0, 0));
        assert_eq!(s.quarter, 2);
        assert_eq!(s.qday, 32);
        assert_eq!(s.hour12, 12);
        assert_eq!(s.am_pm, 1);
        assert_eq!(s.wday, 1);
        // May 1 2021 is a Saturday, so May 2 starts the second calendar week
        assert_eq!(s.mweek, 2);
        assert_eq!(s.mday7, 1);

        let end = Signature::new(at(2020, 2, 29, 12, 0, 0));
        assert!(end.is_month_end);
        assert_eq!(end.half, 1);
        assert_eq!(end.am_pm, 2);
        assert_eq!(end.hour12, 12);
    }

    #[test]
    fn test_timeseries_signature_columns() {
        let ts = vec![Some(at(2020, 1, 1, 0, 0, 0)), None, Some(at(2020, 1, 1, 0, 0, 30))];
        let columns = timeseries_signature(&ts);
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, SIGNATURE_COLUMNS.to_vec());

        let month_lbl = columns.iter().find(|c| c.name == "month_lbl").unwrap();
        assert_eq!(month_lbl.data.get(1), Value::Missing);
        assert_eq!(month_lbl.data.get(2), Value::from("January"));

        let diff = columns.iter().find(|c| c.name == "diff").unwrap();
        assert_eq!(diff.data, ColumnData::Numeric(vec![None, None, None]));
    }

    #[test]
    fn test_augment_grouped_diff() {
        let table = TimeTable::new(vec![
            Column::text("id", vec![Some("a"), Some("b"), Some("a"), Some("b")]),
            Column::datetime(
                "ts",
                vec![
                    Some(at(2020, 1, 1, 0, 0, 0)),
                    Some(at(2020, 1, 1, 0, 0, 0)),
                    Some(at(2020, 1, 1, 1, 0, 0)),
                    Some(at(2020, 1, 1, 0, 0, 10)),
                ],
            ),
        ])
        .unwrap();
        let grouped = Table::grouped(table, &["id"]).unwrap();
        let augmented = augment_timeseries_signature(&grouped, None).unwrap();

        assert_eq!(augmented.keys(), ["id".to_string()]);
        let out = augmented.table();
        assert_eq!(out.n_rows(), 4);
        assert_eq!(out.columns().len(), 2 + SIGNATURE_COLUMNS.len());
        assert_eq!(
            out.column("diff").unwrap().data,
            ColumnData::Numeric(vec![None, None, Some(3600.0), Some(10.0)])
        );
        assert_eq!(out.value(2, "hour"), Value::from(1.0));
    }

    #[test]
    fn test_augment_rejects_name_collision() {
        let table = Table::Plain(
            TimeTable::new(vec![
                Column::datetime("ts", vec![Some(at(2020, 1, 1, 0, 0, 0))]),
                Column::numeric("year", vec![Some(1.0)]),
            ])
            .unwrap(),
        );
        assert!(matches!(
            augment_timeseries_signature(&table, Some("ts")),
            Err(PadError::InvalidInput(_))
        ));
    }
}
