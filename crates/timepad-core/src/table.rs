//! In-memory tables keyed by a timestamp column.
//!
//! Data is stored column-wise. Each column carries its type as the variant of
//! [`ColumnData`], fixed when the column is built, so downstream stages never
//! have to guess whether a column is numeric.

use crate::error::{PadError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single scalar cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Missing,
    Boolean(bool),
    Numeric(f64),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Type of the value, `None` for the missing sentinel.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Missing => None,
            Value::Boolean(_) => Some(ColumnType::Boolean),
            Value::Numeric(_) => Some(ColumnType::Numeric),
            Value::DateTime(_) => Some(ColumnType::DateTime),
            Value::Date(_) => Some(ColumnType::Date),
            Value::Text(_) => Some(ColumnType::Text),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Numeric(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "NA"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Numeric(v) => write!(f, "{v}"),
            Value::DateTime(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Numeric(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Numeric(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Missing)
    }
}

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Numeric,
    Text,
    Boolean,
    /// Date-only precision
    Date,
    /// Date-time precision
    DateTime,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Numeric)
    }

    pub fn is_time_like(self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::DateTime)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "date-time",
        };
        f.write_str(name)
    }
}

/// Typed column storage, `None` marks a missing cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    Boolean(Vec<Option<bool>>),
    Date(Vec<Option<NaiveDate>>),
    DateTime(Vec<Option<NaiveDateTime>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
            ColumnData::Date(v) => v.len(),
            ColumnData::DateTime(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Numeric(_) => ColumnType::Numeric,
            ColumnData::Text(_) => ColumnType::Text,
            ColumnData::Boolean(_) => ColumnType::Boolean,
            ColumnData::Date(_) => ColumnType::Date,
            ColumnData::DateTime(_) => ColumnType::DateTime,
        }
    }

    /// Value at `row`, `Value::Missing` when out of range or missing.
    pub fn get(&self, row: usize) -> Value {
        match self {
            ColumnData::Numeric(v) => v.get(row).copied().flatten().into(),
            ColumnData::Text(v) => v.get(row).cloned().flatten().into(),
            ColumnData::Boolean(v) => v.get(row).copied().flatten().into(),
            ColumnData::Date(v) => v.get(row).copied().flatten().into(),
            ColumnData::DateTime(v) => v.get(row).copied().flatten().into(),
        }
    }

    pub fn is_missing(&self, row: usize) -> bool {
        self.get(row).is_missing()
    }

    /// Time values as date-times, dates map to midnight.
    pub fn timestamps(&self) -> Option<Vec<Option<NaiveDateTime>>> {
        match self {
            ColumnData::Date(v) => Some(
                v.iter()
                    .map(|d| d.and_then(|d| d.and_hms_opt(0, 0, 0)))
                    .collect(),
            ),
            ColumnData::DateTime(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Gather rows by index; `None` produces a missing cell.
    pub fn take(&self, indices: &[Option<usize>]) -> ColumnData {
        fn gather<T: Clone>(values: &[Option<T>], indices: &[Option<usize>]) -> Vec<Option<T>> {
            indices
                .iter()
                .map(|idx| idx.and_then(|i| values.get(i).cloned().flatten()))
                .collect()
        }

        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(gather(v, indices)),
            ColumnData::Text(v) => ColumnData::Text(gather(v, indices)),
            ColumnData::Boolean(v) => ColumnData::Boolean(gather(v, indices)),
            ColumnData::Date(v) => ColumnData::Date(gather(v, indices)),
            ColumnData::DateTime(v) => ColumnData::DateTime(gather(v, indices)),
        }
    }

    /// Column of `len` copies of `value`, typed like `self`.
    ///
    /// Fails if `value` is neither missing nor of this column's type.
    pub fn repeat_like(&self, column: &str, value: &Value, len: usize) -> Result<ColumnData> {
        let mismatch = || PadError::TypeMismatch {
            column: column.to_string(),
            expected: self.column_type().to_string(),
            found: value
                .column_type()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "missing".to_string()),
        };

        Ok(match (self, value) {
            (ColumnData::Numeric(_), Value::Numeric(v)) => ColumnData::Numeric(vec![Some(*v); len]),
            (ColumnData::Text(_), Value::Text(v)) => ColumnData::Text(vec![Some(v.clone()); len]),
            (ColumnData::Boolean(_), Value::Boolean(v)) => ColumnData::Boolean(vec![Some(*v); len]),
            (ColumnData::Date(_), Value::Date(v)) => ColumnData::Date(vec![Some(*v); len]),
            (ColumnData::DateTime(_), Value::DateTime(v)) => {
                ColumnData::DateTime(vec![Some(*v); len])
            }
            (ColumnData::Numeric(_), Value::Missing) => ColumnData::Numeric(vec![None; len]),
            (ColumnData::Text(_), Value::Missing) => ColumnData::Text(vec![None; len]),
            (ColumnData::Boolean(_), Value::Missing) => ColumnData::Boolean(vec![None; len]),
            (ColumnData::Date(_), Value::Missing) => ColumnData::Date(vec![None; len]),
            (ColumnData::DateTime(_), Value::Missing) => ColumnData::DateTime(vec![None; len]),
            _ => return Err(mismatch()),
        })
    }

    /// Append all rows of `other`, which must have the same type.
    fn extend_from(&mut self, other: &ColumnData) -> bool {
        match (self, other) {
            (ColumnData::Numeric(a), ColumnData::Numeric(b)) => a.extend_from_slice(b),
            (ColumnData::Text(a), ColumnData::Text(b)) => a.extend_from_slice(b),
            (ColumnData::Boolean(a), ColumnData::Boolean(b)) => a.extend_from_slice(b),
            (ColumnData::Date(a), ColumnData::Date(b)) => a.extend_from_slice(b),
            (ColumnData::DateTime(a), ColumnData::DateTime(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self::new(name, ColumnData::Numeric(values))
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<&str>>) -> Self {
        Self::new(
            name,
            ColumnData::Text(values.into_iter().map(|v| v.map(str::to_string)).collect()),
        )
    }

    pub fn boolean(name: impl Into<String>, values: Vec<Option<bool>>) -> Self {
        Self::new(name, ColumnData::Boolean(values))
    }

    pub fn date(name: impl Into<String>, values: Vec<Option<NaiveDate>>) -> Self {
        Self::new(name, ColumnData::Date(values))
    }

    pub fn datetime(name: impl Into<String>, values: Vec<Option<NaiveDateTime>>) -> Self {
        Self::new(name, ColumnData::DateTime(values))
    }

    pub fn column_type(&self) -> ColumnType {
        self.data.column_type()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Column-wise table with equal-length, uniquely named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeTable {
    columns: Vec<Column>,
    n_rows: usize,
}

impl TimeTable {
    /// Build a table, validating column lengths and names.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(Column::len).unwrap_or(0);

        for (i, column) in columns.iter().enumerate() {
            if column.len() != n_rows {
                return Err(PadError::InvalidInput(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.len(),
                    n_rows
                )));
            }
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(PadError::InvalidInput(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
        }

        Ok(Self { columns, n_rows })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    /// Value at (`row`, `column`).
    pub fn value(&self, row: usize, column: &str) -> Value {
        self.column(column)
            .map(|c| c.data.get(row))
            .unwrap_or(Value::Missing)
    }

    /// Append columns to the right.
    pub fn with_columns(self, extra: Vec<Column>) -> Result<Self> {
        let mut columns = self.columns;
        columns.extend(extra);
        Self::new(columns)
    }

    /// Select rows by index, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> TimeTable {
        let indices: Vec<Option<usize>> = rows.iter().map(|&r| Some(r)).collect();
        TimeTable {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.take(&indices)))
                .collect(),
            n_rows: rows.len(),
        }
    }

    /// Stack tables with identical schemas on top of each other.
    ///
    /// `template` supplies the schema when `parts` is empty.
    pub fn concat(template: &TimeTable, parts: Vec<TimeTable>) -> Result<TimeTable> {
        let mut iter = parts.into_iter();
        let Some(mut out) = iter.next() else {
            return Ok(template.select_rows(&[]));
        };

        for part in iter {
            if part.columns.len() != out.columns.len() {
                return Err(PadError::InvalidInput(
                    "cannot concatenate tables with different column counts".to_string(),
                ));
            }
            for (dst, src) in out.columns.iter_mut().zip(part.columns.iter()) {
                if dst.name != src.name || !dst.data.extend_from(&src.data) {
                    return Err(PadError::InvalidInput(format!(
                        "cannot concatenate column '{}' with column '{}'",
                        dst.name, src.name
                    )));
                }
            }
            out.n_rows += part.n_rows;
        }

        Ok(out)
    }
}

/// Hashable projection of a key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyAtom {
    Missing,
    Boolean(bool),
    Numeric(u64),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Text(String),
}

impl From<&Value> for KeyAtom {
    fn from(value: &Value) -> Self {
        match value {
            Value::Missing => KeyAtom::Missing,
            Value::Boolean(v) => KeyAtom::Boolean(*v),
            Value::Numeric(v) => KeyAtom::Numeric(v.to_bits()),
            Value::DateTime(v) => KeyAtom::DateTime(*v),
            Value::Date(v) => KeyAtom::Date(*v),
            Value::Text(v) => KeyAtom::Text(v.clone()),
        }
    }
}

/// One partition of a table: its key and the rows that carry it.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Key values, one per key column (empty for an ungrouped table)
    pub key: Vec<Value>,
    /// Row indices in input order
    pub rows: Vec<usize>,
}

/// A table partitioned by one or more key columns.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupedTable {
    keys: Vec<String>,
    table: TimeTable,
}

impl GroupedTable {
    pub fn new(table: TimeTable, keys: Vec<String>) -> Result<Self> {
        if keys.is_empty() {
            return Err(PadError::InvalidInput(
                "grouped table needs at least one key column".to_string(),
            ));
        }
        for key in &keys {
            if table.column(key).is_none() {
                return Err(PadError::ColumnNotFound(key.clone()));
            }
        }
        Ok(Self { keys, table })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn table(&self) -> &TimeTable {
        &self.table
    }

    pub fn into_table(self) -> TimeTable {
        self.table
    }

    /// Partition rows by key, groups ordered by first appearance.
    pub fn groups(&self) -> Vec<Group> {
        let key_columns: Vec<&Column> = self
            .keys
            .iter()
            .filter_map(|k| self.table.column(k))
            .collect();

        let mut index: HashMap<Vec<KeyAtom>, usize> = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();

        for row in 0..self.table.n_rows() {
            let key: Vec<Value> = key_columns.iter().map(|c| c.data.get(row)).collect();
            let atoms: Vec<KeyAtom> = key.iter().map(KeyAtom::from).collect();
            match index.get(&atoms) {
                Some(&g) => groups[g].rows.push(row),
                None => {
                    index.insert(atoms, groups.len());
                    groups.push(Group {
                        key,
                        rows: vec![row],
                    });
                }
            }
        }

        groups
    }
}

/// A plain or grouped table.
#[derive(Debug, Clone, PartialEq)]
pub enum Table {
    Plain(TimeTable),
    Grouped(GroupedTable),
}

impl Table {
    /// Group a table by the given key columns.
    pub fn grouped(table: TimeTable, keys: &[&str]) -> Result<Self> {
        let keys = keys.iter().map(|k| k.to_string()).collect();
        Ok(Table::Grouped(GroupedTable::new(table, keys)?))
    }

    pub fn table(&self) -> &TimeTable {
        match self {
            Table::Plain(t) => t,
            Table::Grouped(g) => g.table(),
        }
    }

    /// Key column names, empty for a plain table.
    pub fn keys(&self) -> &[String] {
        match self {
            Table::Plain(_) => &[],
            Table::Grouped(g) => g.keys(),
        }
    }

    /// Groups of the table; a plain table is a single implicit group.
    pub fn groups(&self) -> Vec<Group> {
        match self {
            Table::Plain(t) => vec![Group {
                key: vec![],
                rows: (0..t.n_rows()).collect(),
            }],
            Table::Grouped(g) => g.groups(),
        }
    }

    /// Wrap `table` with the same grouping metadata as `self`.
    pub(crate) fn rewrap(&self, table: TimeTable) -> Result<Table> {
        match self {
            Table::Plain(_) => Ok(Table::Plain(table)),
            Table::Grouped(g) => Ok(Table::Grouped(GroupedTable::new(
                table,
                g.keys().to_vec(),
            )?)),
        }
    }
}

impl From<TimeTable> for Table {
    fn from(table: TimeTable) -> Self {
        Table::Plain(table)
    }
}
