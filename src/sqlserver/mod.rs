// ABOUTME: SQL Server implementation of the change source
// ABOUTME: Native CDC functions over a tiberius connection

pub mod client;
pub mod values;

pub use client::{tiberius_config, validate_identifier, SqlServerSource, TdsClient};
pub use values::row_to_column_map;
