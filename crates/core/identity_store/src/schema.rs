use rusqlite::Connection;

use crate::error::Result;

/// Apply the performance pragmas called out in `spec.md` §4.1: WAL journaling,
/// `synchronous=NORMAL` and an enlarged page cache.
pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", -8000)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS devices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid TEXT NOT NULL UNIQUE,
            auth_key TEXT NOT NULL UNIQUE,
            client_id TEXT UNIQUE,
            username TEXT,
            password TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS groups (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS device_groups (
            device_id INTEGER NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
            group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            UNIQUE(device_id, group_id)
        );

        CREATE TABLE IF NOT EXISTS device_status (
            device_id INTEGER PRIMARY KEY REFERENCES devices(id) ON DELETE CASCADE,
            status INTEGER NOT NULL,
            mode TEXT NOT NULL,
            last_active_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS bridge_remotes (
            broker_id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            token TEXT NOT NULL,
            enabled INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS bridge_shared_devices (
            broker_id TEXT NOT NULL REFERENCES bridge_remotes(broker_id) ON DELETE CASCADE,
            device_id INTEGER NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
            permission TEXT NOT NULL,
            UNIQUE(broker_id, device_id)
        );

        CREATE TABLE IF NOT EXISTS broker_identity (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            broker_id TEXT NOT NULL,
            bridge_token TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

pub fn timeseries_table_name(day_epoch_ms: i64) -> String {
    let days_since_epoch = day_epoch_ms / 86_400_000;
    // Days-since-epoch -> a monotonically increasing 8-digit tag; avoids a chrono
    // dependency in this crate for a value only ever compared/sorted, never parsed.
    format!("ts_{days_since_epoch:08}")
}

pub fn create_timeseries_table(conn: &Connection, table: &str) -> Result<()> {
    conn.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                device_uuid TEXT NOT NULL,
                data_key TEXT NOT NULL,
                value REAL NOT NULL,
                ts INTEGER NOT NULL
            )"
        ),
        [],
    )?;
    conn.execute(
        &format!("CREATE INDEX IF NOT EXISTS idx_{table}_uuid ON {table}(device_uuid, ts)"),
        [],
    )?;
    Ok(())
}
