//! Pad value substitution and directional fill.

use crate::error::{PadError, Result};
use crate::table::{ColumnData, TimeTable, Value};
use std::fmt;
use std::str::FromStr;

/// Direction in which known values are propagated into missing cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillDirection {
    #[default]
    None,
    /// Last observation carried forward
    Down,
    /// Next observation carried backward
    Up,
    /// Down, then up for whatever is still missing
    DownUp,
    /// Up, then down for whatever is still missing
    UpDown,
}

impl FromStr for FillDirection {
    type Err = PadError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "down" => Ok(Self::Down),
            "up" => Ok(Self::Up),
            "downup" => Ok(Self::DownUp),
            "updown" => Ok(Self::UpDown),
            _ => Err(PadError::InvalidOption {
                option: "fill_direction".to_string(),
                value: s.to_string(),
                reason: "expected one of none, down, up, downup, updown".to_string(),
            }),
        }
    }
}

impl fmt::Display for FillDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FillDirection::None => "none",
            FillDirection::Down => "down",
            FillDirection::Up => "up",
            FillDirection::DownUp => "downup",
            FillDirection::UpDown => "updown",
        };
        f.write_str(name)
    }
}

/// Fill missing values with the last observed value (forward fill / LOCF).
pub fn fill_down<T: Clone>(values: &mut [Option<T>]) {
    let mut last_value: Option<T> = None;

    for v in values.iter_mut() {
        match v {
            Some(x) => last_value = Some(x.clone()),
            None => *v = last_value.clone(),
        }
    }
}

/// Fill missing values with the next observed value (backward fill / NOCB).
pub fn fill_up<T: Clone>(values: &mut [Option<T>]) {
    let mut next_value: Option<T> = None;

    for v in values.iter_mut().rev() {
        match v {
            Some(x) => next_value = Some(x.clone()),
            None => *v = next_value.clone(),
        }
    }
}

fn fill_column<T: Clone>(values: &mut [Option<T>], direction: FillDirection) {
    match direction {
        FillDirection::None => {}
        FillDirection::Down => fill_down(values),
        FillDirection::Up => fill_up(values),
        FillDirection::DownUp => {
            fill_down(values);
            fill_up(values);
        }
        FillDirection::UpDown => {
            fill_up(values);
            fill_down(values);
        }
    }
}

impl ColumnData {
    /// Propagate known values into missing cells.
    pub fn fill(&mut self, direction: FillDirection) {
        match self {
            ColumnData::Numeric(v) => fill_column(v, direction),
            ColumnData::Text(v) => fill_column(v, direction),
            ColumnData::Boolean(v) => fill_column(v, direction),
            ColumnData::Date(v) => fill_column(v, direction),
            ColumnData::DateTime(v) => fill_column(v, direction),
        }
    }
}

/// Set every numeric column to `pad_value` on synthetic rows.
///
/// `origin[i]` is `true` for rows that came from the input; those are never
/// touched. Non-numeric columns and columns listed in `excluded` are left
/// as they are. A missing `pad_value` is a no-op.
pub fn apply_pad_value(
    table: &mut TimeTable,
    origin: &[bool],
    pad_value: &Value,
    excluded: &[&str],
) -> Result<()> {
    if pad_value.is_missing() {
        return Ok(());
    }

    for column in table.columns_mut() {
        if excluded.contains(&column.name.as_str()) {
            continue;
        }
        let ColumnData::Numeric(values) = &mut column.data else {
            continue;
        };
        let Some(pad) = pad_value.as_f64() else {
            return Err(PadError::TypeMismatch {
                column: column.name.clone(),
                expected: "numeric pad value".to_string(),
                found: pad_value
                    .column_type()
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
            });
        };

        for (value, &original) in values.iter_mut().zip(origin) {
            if !original {
                *value = Some(pad);
            }
        }
    }

    Ok(())
}

/// Apply a directional fill to every column not listed in `excluded`.
pub fn apply_directional_fill(table: &mut TimeTable, direction: FillDirection, excluded: &[&str]) {
    if direction == FillDirection::None {
        return;
    }

    for column in table.columns_mut() {
        if !excluded.contains(&column.name.as_str()) {
            column.data.fill(direction);
        }
    }
}
