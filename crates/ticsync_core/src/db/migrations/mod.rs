//! Ordered schema steps for the snapshot database.
//!
//! # Invariants
//! - Step versions start at 1 and increase by one.
//! - Pending steps run inside a single transaction together with the
//!   `user_version` bump, so a failed step leaves the schema untouched.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// `(schema version, SQL)` pairs in apply order.
const STEPS: [(u32, &str); 1] = [(1, include_str!("0001_kv_entries.sql"))];

/// Highest schema version this build can produce.
pub fn latest_version() -> u32 {
    STEPS.iter().map(|(version, _)| *version).max().unwrap_or(0)
}

/// Brings `conn` up to `latest_version()`; refuses databases from newer builds.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let found: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let target = latest_version();
    if found > target {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: found,
            latest_supported: target,
        });
    }

    let pending = STEPS
        .iter()
        .filter(|(version, _)| *version > found)
        .collect::<Vec<_>>();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (version, sql) in &pending {
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
    }
    tx.commit()?;
    info!(
        "event=db_migrate module=db status=ok from={} to={} steps={}",
        found,
        target,
        pending.len()
    );
    Ok(())
}
