//! Spreadsheet row normalization
//!
//! Platform sheets disagree on almost everything: column names, date
//! encodings, currency formatting. This module turns one raw sheet row into a
//! canonical row:
//! - `date`: heterogeneous date strings into `YYYY-MM-DD`
//! - `numeric`: currency-formatted cells into plain numbers
//! - `columns`: source column names into canonical fields
//! - `row`: the per-row dispatch tying the three together

mod columns;
mod date;
mod numeric;
mod row;

pub use columns::*;
pub use date::*;
pub use numeric::*;
pub use row::*;
