// [libs/netmon-storage/src/schema.rs]
//! Idempotent schema application: base tables, then tolerant column
//! additions (safe to re-run against an older database), then indexes.

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

const BASE_TABLES: &[(&str, &str)] = &[
    ("credential_profiles", r#"
        CREATE TABLE IF NOT EXISTS credential_profiles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            protocol TEXT NOT NULL,
            payload_ciphertext TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("discovery_profiles", r#"
        CREATE TABLE IF NOT EXISTS discovery_profiles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            target_ciphertext TEXT NOT NULL,
            port INTEGER NOT NULL,
            handshake_timeout_ms INTEGER NOT NULL,
            credential_profile_id TEXT NOT NULL,
            auto_provision INTEGER NOT NULL DEFAULT 0,
            auto_run INTEGER NOT NULL DEFAULT 0,
            last_run_status TEXT,
            devices_discovered INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("discovered_devices", r#"
        CREATE TABLE IF NOT EXISTS discovered_devices (
            id TEXT PRIMARY KEY,
            discovery_profile_id TEXT NOT NULL,
            ip TEXT NOT NULL,
            port INTEGER NOT NULL,
            status TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(discovery_profile_id, ip, port)
        );
    "#),
    ("monitors", r#"
        CREATE TABLE IF NOT EXISTS monitors (
            id TEXT PRIMARY KEY,
            ip TEXT NOT NULL,
            port INTEGER NOT NULL,
            plugin_id TEXT NOT NULL,
            credential_profile_id TEXT NOT NULL,
            discovery_profile_id TEXT NOT NULL,
            polling_interval_seconds INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("metrics", r#"
        CREATE TABLE IF NOT EXISTS metrics (
            monitor_id TEXT NOT NULL,
            timestamp DATETIME NOT NULL,
            name TEXT NOT NULL,
            value REAL NOT NULL,
            type TEXT NOT NULL DEFAULT 'gauge'
        );
    "#),
];

/// Columns added after a table's first release. Safe to re-run: SQLite's
/// "duplicate column name" error on an already-applied stratum is swallowed.
const EVOLUTIONARY_STRATA: &[(&str, &str)] = &[
    ("MONITOR_FAILURE_COUNT", "ALTER TABLE monitors ADD COLUMN consecutive_failures INTEGER NOT NULL DEFAULT 0"),
    ("DISCOVERY_LAST_RUN_AT", "ALTER TABLE discovery_profiles ADD COLUMN last_run_at DATETIME"),
];

const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_MONITORS_STATUS", "CREATE INDEX IF NOT EXISTS idx_monitors_status ON monitors(status);"),
    ("IDX_MONITORS_DISCOVERY", "CREATE INDEX IF NOT EXISTS idx_monitors_discovery_profile ON monitors(discovery_profile_id);"),
    ("IDX_DEVICES_PROFILE", "CREATE INDEX IF NOT EXISTS idx_devices_discovery_profile ON discovered_devices(discovery_profile_id);"),
    ("IDX_METRICS_MONITOR_TIME", "CREATE INDEX IF NOT EXISTS idx_metrics_monitor_timestamp ON metrics(monitor_id, timestamp);"),
];

#[instrument(skip(connection))]
pub async fn apply_schema(connection: &Connection) -> Result<()> {
    info!("applying storage schema");
    create_base_tables(connection).await?;
    apply_evolutionary_strata(connection).await?;
    create_indexes(connection).await?;
    Ok(())
}

async fn create_base_tables(db: &Connection) -> Result<()> {
    for (name, sql) in BASE_TABLES {
        debug!(table = *name, "creating base table");
        db.execute(sql, ()).await.with_context(|| format!("failed to create table {name}"))?;
    }
    Ok(())
}

async fn apply_evolutionary_strata(db: &Connection) -> Result<()> {
    for (name, sql) in EVOLUTIONARY_STRATA {
        match db.execute(sql, ()).await {
            Ok(_) => debug!(stratum = *name, "applied"),
            Err(e) => {
                let message = e.to_string();
                if message.contains("duplicate column name") {
                    debug!(stratum = *name, "already applied");
                } else {
                    warn!(stratum = *name, error = %message, "stratum application incomplete");
                }
            }
        }
    }
    Ok(())
}

async fn create_indexes(db: &Connection) -> Result<()> {
    for (name, sql) in ACCELERATION_INDEXES {
        debug!(index = *name, "creating index");
        db.execute(sql, ()).await.with_context(|| format!("failed to create index {name}"))?;
    }
    Ok(())
}
