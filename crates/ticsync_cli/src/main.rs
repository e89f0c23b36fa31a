//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `ticsync_core` linkage.
//! - Optionally summarize the snapshots stored in a SQLite file.
//! - Start file logging when `TICSYNC_LOG_DIR` is set.

use log::info;
use std::process::ExitCode;
use ticsync_core::{
    KeyValueStore, Recommendation, Record, Snapshot, SqliteKeyValueStore, StoreConfig, TicLog,
};

fn main() -> ExitCode {
    println!("ticsync_core version={}", ticsync_core::core_version());
    if let Ok(log_dir) = std::env::var("TICSYNC_LOG_DIR") {
        if let Err(err) = ticsync_core::init_logging(ticsync_core::default_log_level(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    let Some(path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    let storage = match SqliteKeyValueStore::open(&path) {
        Ok(storage) => storage,
        Err(err) => {
            eprintln!("cannot open `{path}`: {err}");
            return ExitCode::FAILURE;
        }
    };

    let ok = summarize::<TicLog>(&storage) & summarize::<Recommendation>(&storage);
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Prints one line for the snapshot of kind `R`; `false` on unreadable data.
fn summarize<R: Record>(storage: &SqliteKeyValueStore) -> bool {
    let key = StoreConfig::for_record::<R>().storage_key;
    let text = match storage.load(&key) {
        Ok(Some(text)) => text,
        Ok(None) => {
            println!("{} snapshot=missing", R::KIND);
            return true;
        }
        Err(err) => {
            eprintln!("{} load failed: {err}", R::KIND);
            return false;
        }
    };

    match Snapshot::<R>::decode(&text) {
        Ok(snapshot) => {
            info!(
                "event=cli_summary module=cli status=ok kind={} entities={}",
                R::KIND,
                snapshot.entities.len()
            );
            let last_sync = snapshot
                .last_sync
                .map(|at| at.to_rfc3339())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "{} entities={} queued={} last_sync={}",
                R::KIND,
                snapshot.entities.len(),
                snapshot.queue.len(),
                last_sync
            );
            true
        }
        Err(err) => {
            eprintln!("{} snapshot unreadable: {err}", R::KIND);
            false
        }
    }
}
