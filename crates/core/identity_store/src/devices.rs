use rusqlite::params;
use rusqlite::OptionalExtension;

use crate::error::Result;
use crate::error::StoreError;
use crate::model::Device;
use crate::model::DeviceMode;
use crate::model::DeviceStatus;
use crate::model::Group;
use crate::store::now_ms;
use crate::store::IdentityStore;

impl IdentityStore {
    pub fn create_device(&self, uuid: &str, auth_key: &str) -> Result<Device> {
        let conn = self.conn.lock();
        let now = now_ms();
        let result = conn
            .prepare_cached(
                "INSERT INTO devices (uuid, auth_key, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
            )?
            .execute(params![uuid, auth_key, now]);
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::AlreadyExists {
                    what: format!("device uuid {uuid}"),
                })
            }
            Err(e) => return Err(e.into()),
        }
        let id = conn.last_insert_rowid();
        Ok(Device {
            id,
            uuid: uuid.to_string(),
            auth_key: auth_key.to_string(),
            client_id: None,
            username: None,
            password: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_device_by_uuid(&self, uuid: &str) -> Result<Option<Device>> {
        self.get_device_by("uuid", uuid)
    }

    pub fn get_device_by_auth_key(&self, auth_key: &str) -> Result<Option<Device>> {
        self.get_device_by("auth_key", auth_key)
    }

    pub fn get_device_by_client_id(&self, client_id: &str) -> Result<Option<Device>> {
        self.get_device_by("client_id", client_id)
    }

    pub fn get_device_by_id(&self, id: i64) -> Result<Option<Device>> {
        let conn = self.conn.lock();
        let device = conn
            .prepare_cached(
                "SELECT id, uuid, auth_key, client_id, username, password, created_at, updated_at
                 FROM devices WHERE id = ?1",
            )?
            .query_row(params![id], row_to_device)
            .optional()?;
        Ok(device)
    }

    fn get_device_by(&self, column: &'static str, value: &str) -> Result<Option<Device>> {
        let conn = self.conn.lock();
        let sql = match column {
            "uuid" => {
                "SELECT id, uuid, auth_key, client_id, username, password, created_at, updated_at
                 FROM devices WHERE uuid = ?1"
            }
            "auth_key" => {
                "SELECT id, uuid, auth_key, client_id, username, password, created_at, updated_at
                 FROM devices WHERE auth_key = ?1"
            }
            "client_id" => {
                "SELECT id, uuid, auth_key, client_id, username, password, created_at, updated_at
                 FROM devices WHERE client_id = ?1"
            }
            _ => unreachable!("internal column selector"),
        };
        let device = conn
            .prepare_cached(sql)?
            .query_row(params![value], row_to_device)
            .optional()?;
        Ok(device)
    }

    /// Rewrite the MQTT credential triple for a device, invalidating any prior
    /// one (`spec.md` §3 invariant).
    pub fn update_device_connection(
        &self,
        auth_key: &str,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let now = now_ms();
        let changed = conn
            .prepare_cached(
                "UPDATE devices SET client_id = ?1, username = ?2, password = ?3, updated_at = ?4
                 WHERE auth_key = ?5",
            )?
            .execute(params![client_id, username, password, now, auth_key])?;
        if changed == 0 {
            return Err(StoreError::DeviceNotFound);
        }
        Ok(())
    }

    pub fn get_all_devices(&self) -> Result<Vec<Device>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, uuid, auth_key, client_id, username, password, created_at, updated_at
             FROM devices ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_device)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    pub fn create_group(&self, name: &str) -> Result<Group> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached("INSERT INTO groups (name) VALUES (?1)")?
            .execute(params![name]);
        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::AlreadyExists {
                    what: format!("group {name}"),
                })
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Group {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    pub fn get_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached("SELECT id, name FROM groups WHERE name = ?1")?
            .query_row(params![name], |row| {
                Ok(Group {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .optional()
            .map_err(Into::into);
        result
    }

    pub fn add_device_to_group(&self, device_id: i64, group_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        let result = match conn
            .prepare_cached(
                "INSERT INTO device_groups (device_id, group_id) VALUES (?1, ?2)
                 ON CONFLICT DO NOTHING",
            )?
            .execute(params![device_id, group_id])
        {
            Ok(_) => Ok(()),
            Err(e) => Err(e.into()),
        };
        result
    }

    pub fn get_device_groups(&self, device_id: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT g.name FROM groups g
             JOIN device_groups dg ON dg.group_id = g.id
             WHERE dg.device_id = ?1",
        )?;
        let rows = stmt.query_map(params![device_id], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    pub fn get_group_devices(&self, group_name: &str) -> Result<Vec<Device>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT d.id, d.uuid, d.auth_key, d.client_id, d.username, d.password, d.created_at, d.updated_at
             FROM devices d
             JOIN device_groups dg ON dg.device_id = d.id
             JOIN groups g ON g.id = dg.group_id
             WHERE g.name = ?1",
        )?;
        let rows = stmt.query_map(params![group_name], row_to_device)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    pub fn is_device_in_group(&self, device_id: i64, group_name: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<i64> = conn
            .prepare_cached(
                "SELECT 1 FROM device_groups dg
                 JOIN groups g ON g.id = dg.group_id
                 WHERE dg.device_id = ?1 AND g.name = ?2",
            )?
            .query_row(params![device_id, group_name], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Upsert the online/mode projection for a device.
    pub fn update_device_online_status(
        &self,
        device_id: i64,
        online: bool,
        mode: DeviceMode,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let now = now_ms();
        conn.prepare_cached(
            "INSERT INTO device_status (device_id, status, mode, last_active_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(device_id) DO UPDATE SET
               status = excluded.status,
               mode = excluded.mode,
               last_active_at = excluded.last_active_at",
        )?
        .execute(params![device_id, online as i64, mode.as_str(), now])?;
        Ok(())
    }

    pub fn mark_device_offline(&self, device_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached("UPDATE device_status SET status = 0 WHERE device_id = ?1")?
            .execute(params![device_id])?;
        Ok(())
    }

    /// Demote HTTP-mode devices whose `lastActiveAt` is older than `max_age_ms`
    /// to offline (`spec.md` §3, DeviceStatus / §4.1).
    pub fn mark_inactive_http_devices_offline(&self, max_age_ms: i64) -> Result<u64> {
        let conn = self.conn.lock();
        let threshold = now_ms() - max_age_ms;
        let changed = conn
            .prepare_cached(
                "UPDATE device_status SET status = 0
                 WHERE mode = 'http' AND status = 1 AND last_active_at < ?1",
            )?
            .execute(params![threshold])?;
        Ok(changed as u64)
    }

    pub fn get_device_status(&self, device_id: i64) -> Result<Option<DeviceStatus>> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached(
                "SELECT device_id, status, mode, last_active_at FROM device_status WHERE device_id = ?1",
            )?
            .query_row(params![device_id], |row| {
                let mode_str: String = row.get(2)?;
                Ok(DeviceStatus {
                    device_id: row.get(0)?,
                    online: row.get::<_, i64>(1)? != 0,
                    mode: DeviceMode::parse(&mode_str).unwrap_or(DeviceMode::Mqtt),
                    last_active_at: row.get(3)?,
                })
            })
            .optional()
            .map_err(Into::into);
        result
    }
}

fn row_to_device(row: &rusqlite::Row) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get(0)?,
        uuid: row.get(1)?,
        auth_key: row.get(2)?,
        client_id: row.get(3)?,
        username: row.get(4)?,
        password: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
