use rusqlite::params;
use rusqlite::OptionalExtension;

use crate::error::Result;
use crate::error::StoreError;
use crate::model::BridgeSharedDevice;
use crate::model::PeerBroker;
use crate::model::SharePermission;
use crate::store::IdentityStore;

impl IdentityStore {
    pub fn add_remote(&self, broker_id: &str, url: &str, token: &str) -> Result<PeerBroker> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO bridge_remotes (broker_id, url, token, enabled) VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(broker_id) DO UPDATE SET url = excluded.url, token = excluded.token",
        )?
        .execute(params![broker_id, url, token])?;
        Ok(PeerBroker {
            broker_id: broker_id.to_string(),
            url: url.to_string(),
            token: token.to_string(),
            enabled: true,
        })
    }

    pub fn remove_remote(&self, broker_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn
            .prepare_cached("DELETE FROM bridge_remotes WHERE broker_id = ?1")?
            .execute(params![broker_id])?;
        if changed == 0 {
            return Err(StoreError::PeerNotFound {
                broker_id: broker_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn update_remote(&self, broker_id: &str, url: &str, token: &str) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn
            .prepare_cached(
                "UPDATE bridge_remotes SET url = ?1, token = ?2 WHERE broker_id = ?3",
            )?
            .execute(params![url, token, broker_id])?;
        if changed == 0 {
            return Err(StoreError::PeerNotFound {
                broker_id: broker_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn set_remote_enabled(&self, broker_id: &str, enabled: bool) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn
            .prepare_cached("UPDATE bridge_remotes SET enabled = ?1 WHERE broker_id = ?2")?
            .execute(params![enabled as i64, broker_id])?;
        if changed == 0 {
            return Err(StoreError::PeerNotFound {
                broker_id: broker_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn get_remote(&self, broker_id: &str) -> Result<Option<PeerBroker>> {
        let conn = self.conn.lock();
        let result = conn
            .prepare_cached(
                "SELECT broker_id, url, token, enabled FROM bridge_remotes WHERE broker_id = ?1",
            )?
            .query_row(params![broker_id], row_to_peer)
            .optional()
            .map_err(Into::into);
        result
    }

    pub fn get_all_remotes(&self) -> Result<Vec<PeerBroker>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT broker_id, url, token, enabled FROM bridge_remotes")?;
        let rows = stmt.query_map([], row_to_peer)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    pub fn share_device(
        &self,
        broker_id: &str,
        device_id: i64,
        permission: SharePermission,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO bridge_shared_devices (broker_id, device_id, permission)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(broker_id, device_id) DO UPDATE SET permission = excluded.permission",
        )?
        .execute(params![broker_id, device_id, permission.as_str()])?;
        Ok(())
    }

    pub fn unshare_device(&self, broker_id: &str, device_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "DELETE FROM bridge_shared_devices WHERE broker_id = ?1 AND device_id = ?2",
        )?
        .execute(params![broker_id, device_id])?;
        Ok(())
    }

    /// Look up the share permission for a device on a given peer, used by the
    /// `/bridge/share/*` ACL gate (`spec.md` §4.4, §4.7).
    pub fn get_share_permission(
        &self,
        broker_id: &str,
        device_id: i64,
    ) -> Result<Option<SharePermission>> {
        let conn = self.conn.lock();
        let perm: Option<String> = conn
            .prepare_cached(
                "SELECT permission FROM bridge_shared_devices
                 WHERE broker_id = ?1 AND device_id = ?2",
            )?
            .query_row(params![broker_id, device_id], |row| row.get(0))
            .optional()?;
        Ok(perm.and_then(|p| SharePermission::parse(&p)))
    }

    pub fn get_shared_devices_for_remote(
        &self,
        broker_id: &str,
    ) -> Result<Vec<BridgeSharedDevice>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT broker_id, device_id, permission FROM bridge_shared_devices
             WHERE broker_id = ?1",
        )?;
        let rows = stmt.query_map(params![broker_id], row_to_share)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }
}

fn row_to_peer(row: &rusqlite::Row) -> rusqlite::Result<PeerBroker> {
    Ok(PeerBroker {
        broker_id: row.get(0)?,
        url: row.get(1)?,
        token: row.get(2)?,
        enabled: row.get::<_, i64>(3)? != 0,
    })
}

fn row_to_share(row: &rusqlite::Row) -> rusqlite::Result<BridgeSharedDevice> {
    let permission: String = row.get(2)?;
    Ok(BridgeSharedDevice {
        broker_id: row.get(0)?,
        device_id: row.get(1)?,
        permission: SharePermission::parse(&permission).unwrap_or(SharePermission::Read),
    })
}
