//! Time-aware padding and calendar features for in-memory tables.
//!
//! This crate pads irregular time series to a regular grid and derives
//! calendar features from a time column. Grouped tables are processed one
//! group at a time.

pub mod align;
pub mod columns;
pub mod error;
pub mod fill;
pub mod granularity;
pub mod pad;
pub mod sequence;
pub mod signature;
pub mod table;

// Re-exports for convenience
pub use align::{align, Alignment};
pub use columns::{detect_time_column, resolve_time_column, TimeColumnResolution};
pub use error::{PadError, Result};
pub use fill::{apply_directional_fill, apply_pad_value, fill_down, fill_up, FillDirection};
pub use granularity::{infer_granularity, Granularity, GranularitySpec, TimeUnit};
pub use pad::{pad_by_time, PadOptions};
pub use sequence::{
    build_anchored_sequence, build_sequence, group_sequence, parse_bound, GridAnchor, GroupGrid,
    MonthDay, Precision, DEFAULT_MAX_STEPS,
};
pub use signature::{
    augment_timeseries_signature, timeseries_signature, Signature, SIGNATURE_COLUMNS,
};
pub use table::{Column, ColumnData, ColumnType, Group, GroupedTable, Table, TimeTable, Value};
