// [libs/netmon-storage/src/errors.rs]
//! Error catalog for the persistence gateway.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("database configuration is invalid: {0}")]
    Configuration(String),

    #[error("query rejected by the database engine: {0}")]
    Query(#[from] libsql::Error),

    #[error("failed to map a row onto its domain type: {0}")]
    Mapping(String),

    #[error("transaction could not be committed: {0}")]
    Transaction(String),

    #[error("no credential profile with id {0}")]
    CredentialProfileNotFound(uuid::Uuid),

    #[error("no discovery profile with id {0}")]
    DiscoveryProfileNotFound(uuid::Uuid),

    #[error("no monitor with id {0}")]
    MonitorNotFound(uuid::Uuid),
}
