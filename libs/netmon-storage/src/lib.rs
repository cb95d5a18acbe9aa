// [libs/netmon-storage/src/lib.rs]
//! Persistence for credential, discovery, monitor and metric state,
//! behind the `PersistenceGateway` trait so the core never embeds SQL.

mod client;
mod errors;
mod gateway;
mod schema;

pub use client::StorageClient;
pub use errors::StorageError;
pub use gateway::{LibsqlGateway, PersistenceGateway};
