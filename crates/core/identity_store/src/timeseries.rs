use rusqlite::params;

use crate::error::Result;
use crate::model::TimeseriesPage;
use crate::model::TimeseriesPoint;
use crate::schema;
use crate::store::IdentityStore;

impl IdentityStore {
    /// Append one data point, lazily creating the day-bucketed table it belongs
    /// to (`spec.md` §9, time-series storage note).
    pub fn insert_timeseries_point(
        &self,
        device_uuid: &str,
        data_key: &str,
        value: f64,
        timestamp: i64,
    ) -> Result<()> {
        let table = schema::timeseries_table_name(timestamp);
        let conn = self.conn.lock();
        schema::create_timeseries_table(&conn, &table)?;
        conn.execute(
            &format!("INSERT INTO {table} (device_uuid, data_key, value, ts) VALUES (?1, ?2, ?3, ?4)"),
            params![device_uuid, data_key, value, timestamp],
        )?;
        Ok(())
    }

    /// Paginated read across the day tables spanned by `[from, to]`.
    pub fn query_timeseries_data(
        &self,
        device_uuid: &str,
        data_key: &str,
        from: i64,
        to: i64,
        page: u32,
        page_size: u32,
    ) -> Result<TimeseriesPage> {
        let conn = self.conn.lock();
        let tables = existing_tables_in_range(&conn, from, to)?;

        let mut total: u64 = 0;
        for table in &tables {
            let count: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {table}
                     WHERE device_uuid = ?1 AND data_key = ?2 AND ts BETWEEN ?3 AND ?4"
                ),
                params![device_uuid, data_key, from, to],
                |row| row.get(0),
            )?;
            total += count as u64;
        }

        let page = page.max(1);
        let page_size = page_size.max(1);
        let offset = (page - 1) as i64 * page_size as i64;
        let mut remaining_offset = offset;
        let mut remaining_limit = page_size as i64;
        let mut data = Vec::new();

        for table in &tables {
            if remaining_limit <= 0 {
                break;
            }
            let mut stmt = conn.prepare(&format!(
                "SELECT device_uuid, data_key, value, ts FROM {table}
                 WHERE device_uuid = ?1 AND data_key = ?2 AND ts BETWEEN ?3 AND ?4
                 ORDER BY ts ASC
                 LIMIT ?5 OFFSET ?6"
            ))?;
            let rows = stmt.query_map(
                params![
                    device_uuid,
                    data_key,
                    from,
                    to,
                    remaining_limit,
                    remaining_offset.max(0)
                ],
                |row| {
                    Ok(TimeseriesPoint {
                        device_uuid: row.get(0)?,
                        data_key: row.get(1)?,
                        value: row.get(2)?,
                        timestamp: row.get(3)?,
                    })
                },
            )?;
            let mut fetched_from_table = 0i64;
            for row in rows {
                data.push(row?);
                fetched_from_table += 1;
            }
            remaining_limit -= fetched_from_table;
            remaining_offset = (remaining_offset - fetched_from_table).max(0);
        }

        let total_pages = if total == 0 {
            0
        } else {
            ((total as i64 + page_size as i64 - 1) / page_size as i64) as u32
        };

        Ok(TimeseriesPage {
            data,
            total,
            page,
            page_size,
            total_pages,
        })
    }

    /// Drop day tables older than `retain_days`, run periodically by the
    /// scheduler's housekeeping tick (`spec.md` §9).
    pub fn sweep_timeseries_retention(&self, retain_days: i64, now_ms: i64) -> Result<u64> {
        let conn = self.conn.lock();
        let cutoff_days = now_ms / 86_400_000 - retain_days;
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'ts_%'")?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        let mut dropped = 0u64;
        for name in names {
            let Some(day_tag) = name.strip_prefix("ts_") else {
                continue;
            };
            let Ok(day) = day_tag.parse::<i64>() else {
                continue;
            };
            if day < cutoff_days {
                conn.execute(&format!("DROP TABLE IF EXISTS {name}"), [])?;
                dropped += 1;
            }
        }
        Ok(dropped)
    }
}

fn existing_tables_in_range(
    conn: &rusqlite::Connection,
    from: i64,
    to: i64,
) -> Result<Vec<String>> {
    let from_day = from / 86_400_000;
    let to_day = to / 86_400_000;
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE 'ts_%'")?;
    let names: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let mut tables: Vec<String> = names
        .into_iter()
        .filter(|name| {
            name.strip_prefix("ts_")
                .and_then(|tag| tag.parse::<i64>().ok())
                .map(|day| day >= from_day && day <= to_day)
                .unwrap_or(false)
        })
        .collect();
    tables.sort();
    Ok(tables)
}
