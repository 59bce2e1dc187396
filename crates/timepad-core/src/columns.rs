//! Time column resolution.

use crate::error::{PadError, Result};
use crate::table::{ColumnType, Table};

/// Outcome of searching a table for its time column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeColumnResolution {
    /// Exactly one date or date-time column
    Found(String),
    /// Several candidates
    Ambiguous(Vec<String>),
    /// No candidate at all
    Absent,
}

/// Find the time-like columns of a table, ignoring group key columns.
pub fn detect_time_column(table: &Table) -> TimeColumnResolution {
    let keys = table.keys();
    let mut candidates: Vec<String> = table
        .table()
        .columns()
        .iter()
        .filter(|c| c.column_type().is_time_like() && !keys.contains(&c.name))
        .map(|c| c.name.clone())
        .collect();

    match candidates.len() {
        0 => TimeColumnResolution::Absent,
        1 => TimeColumnResolution::Found(candidates.remove(0)),
        _ => TimeColumnResolution::Ambiguous(candidates),
    }
}

/// Resolve the time column to use, either the one requested or the sole
/// time-like column of the table.
///
/// Returns the column name and its type.
pub fn resolve_time_column(table: &Table, requested: Option<&str>) -> Result<(String, ColumnType)> {
    let name = match requested {
        Some(name) => name.to_string(),
        None => match detect_time_column(table) {
            TimeColumnResolution::Found(name) => {
                tracing::info!(column = %name, "using time column '{}'", name);
                name
            }
            TimeColumnResolution::Ambiguous(candidates) => {
                return Err(PadError::AmbiguousColumn { candidates })
            }
            TimeColumnResolution::Absent => {
                return Err(PadError::AmbiguousColumn { candidates: vec![] })
            }
        },
    };

    let column = table
        .table()
        .column(&name)
        .ok_or_else(|| PadError::ColumnNotFound(name.clone()))?;

    let column_type = column.column_type();
    if !column_type.is_time_like() {
        return Err(PadError::TypeMismatch {
            column: name,
            expected: "date or date-time".to_string(),
            found: column_type.to_string(),
        });
    }

    if table.keys().contains(&name) {
        return Err(PadError::InvalidInput(format!(
            "time column '{}' cannot also be a group key",
            name
        )));
    }

    Ok((name, column_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, TimeTable};
    use chrono::NaiveDate;

    fn table_with(columns: Vec<Column>) -> Table {
        Table::Plain(TimeTable::new(columns).unwrap())
    }

    fn day(n: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(2021, 1, n)
    }

    #[test]
    fn test_detect_single_date_column() {
        let table = table_with(vec![
            Column::date("order_date", vec![day(1), day(2)]),
            Column::numeric("sales", vec![Some(1.0), Some(2.0)]),
        ]);
        assert_eq!(
            detect_time_column(&table),
            TimeColumnResolution::Found("order_date".into())
        );
        assert_eq!(
            resolve_time_column(&table, None).unwrap(),
            ("order_date".to_string(), ColumnType::Date)
        );
    }

    #[test]
    fn test_detect_ambiguous() {
        let table = table_with(vec![
            Column::date("order_date", vec![day(1)]),
            Column::date("ship_date", vec![day(2)]),
        ]);
        assert_eq!(
            resolve_time_column(&table, None),
            Err(PadError::AmbiguousColumn {
                candidates: vec!["order_date".into(), "ship_date".into()]
            })
        );
        // An explicit choice resolves the ambiguity
        assert_eq!(
            resolve_time_column(&table, Some("ship_date")).unwrap().0,
            "ship_date"
        );
    }

    #[test]
    fn test_detect_absent() {
        let table = table_with(vec![Column::numeric("sales", vec![Some(1.0)])]);
        assert_eq!(detect_time_column(&table), TimeColumnResolution::Absent);
        assert!(matches!(
            resolve_time_column(&table, None),
            Err(PadError::AmbiguousColumn { .. })
        ));
    }

    #[test]
    fn test_requested_column_checks() {
        let table = table_with(vec![
            Column::date("date", vec![day(1)]),
            Column::numeric("sales", vec![Some(1.0)]),
        ]);
        assert_eq!(
            resolve_time_column(&table, Some("when")),
            Err(PadError::ColumnNotFound("when".into()))
        );
        assert!(matches!(
            resolve_time_column(&table, Some("sales")),
            Err(PadError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_group_keys_are_not_candidates() {
        let table = Table::grouped(
            TimeTable::new(vec![
                Column::date("cohort", vec![day(1), day(1)]),
                Column::date("date", vec![day(1), day(2)]),
            ])
            .unwrap(),
            &["cohort"],
        )
        .unwrap();
        assert_eq!(
            detect_time_column(&table),
            TimeColumnResolution::Found("date".into())
        );
    }
}
