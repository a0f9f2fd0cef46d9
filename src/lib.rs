// ABOUTME: Library root for cdc-changeset
// ABOUTME: Assembles SQL Server CDC change sets with merged update pairs

pub mod changes;
pub mod commands;
pub mod config;
pub mod sqlserver;

pub use changes::{
    CdcError, ChangeRecord, ChangeSet, ChangeSetAssembler, ChangeSource, Lsn, Operation,
    RowFilter, UpdateMask,
};
pub use config::ConnectionConfig;
pub use sqlserver::SqlServerSource;
