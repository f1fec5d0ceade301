//! Registry schema upgrades, tracked through SQLite's `user_version`.

use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Ordered schema steps. Entry `n` (1-based) brings `user_version` from
/// `n - 1` to `n`.
const MIGRATIONS: &[(i32, &str)] = &[
    (1, include_str!("schemas/schema_v1.sql")),
    (2, include_str!("schemas/schema_v2.sql")),
];

fn latest_version() -> i32 {
    MIGRATIONS.last().map_or(0, |(version, _)| *version)
}

fn user_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read registry user_version")
}

/// Apply every pending step in one transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let current = user_version(conn)?;
    let latest = latest_version();
    if current > latest {
        bail!("registry schema v{current} is newer than this build understands (v{latest})");
    }

    let pending: Vec<_> = MIGRATIONS
        .iter()
        .filter(|(version, _)| *version > current)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to begin registry migration")?;
    for (version, sql) in pending {
        tx.execute_batch(sql)
            .with_context(|| format!("registry migration to v{version} failed"))?;
    }
    tx.pragma_update(None, "user_version", latest)
        .context("failed to record registry user_version")?;
    tx.commit().context("failed to commit registry migration")
}
