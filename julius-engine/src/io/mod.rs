//! CSV input and report output
//!
//! - `csv_source` - Load platform exports into [`RawTable`](crate::pipeline::types::RawTable)s
//! - `csv_sink` - Write the output tables and the JSON run report

pub mod csv_sink;
pub mod csv_source;

pub use csv_sink::{write_outputs, OutputFiles};
pub use csv_source::{load_input, load_table, InputPaths};
