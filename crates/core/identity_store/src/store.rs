use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::info;

use crate::error::Result;
use crate::model::BrokerIdentity;
use crate::schema;

/// The Identity Store: durable device, group, status, peer-broker and
/// timeseries state.
///
/// A single connection behind a mutex, following the reference stack's
/// synchronous-sqlite-behind-a-guard idiom: statement preparation and execution
/// are both serialized through this lock, which is the simplification `spec.md`
/// §5 explicitly allows ("implementer's discretion") given sqlite's single-writer
/// model. Statements are cached with `prepare_cached`, so repeated calls for the
/// same SQL reuse the compiled plan; `reinitialize` clears that cache.
pub struct IdentityStore {
    pub(crate) conn: Mutex<Connection>,
}

impl IdentityStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| crate::error::StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::apply_pragmas(&conn)?;
        schema::create_schema(&conn)?;
        let store = IdentityStore {
            conn: Mutex::new(conn),
        };
        store.bootstrap_if_empty()?;
        Ok(store)
    }

    /// Clear the cached prepared statements; used after schema changes or in
    /// tests that want to exercise the cold-cache path.
    pub fn reinitialize(&self) {
        self.conn.lock().flush_prepared_statement_cache();
    }

    /// On first start with an empty device table, auto-provision one device
    /// with a random uuid/authKey and log it (`spec.md` §4.1, Bootstrapping
    /// policy).
    fn bootstrap_if_empty(&self) -> Result<()> {
        let is_empty: bool = {
            let conn = self.conn.lock();
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))?;
            count == 0
        };
        if is_empty {
            let uuid = random_token(16);
            let auth_key = random_token(32);
            self.create_device(&uuid, &auth_key)?;
            info!(uuid, auth_key, "auto-provisioned first device");
        }
        Ok(())
    }

    /// Load the persisted broker identity (`brokerId`, `bridgeToken`), or
    /// generate and persist a fresh pair per `spec.md` §6 Startup invariants.
    pub fn load_or_init_broker_identity(&self) -> Result<BrokerIdentity> {
        let conn = self.conn.lock();
        let existing: Option<(String, String)> = conn
            .query_row(
                "SELECT broker_id, bridge_token FROM broker_identity WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();
        if let Some((broker_id, bridge_token)) = existing {
            return Ok(BrokerIdentity {
                broker_id,
                bridge_token,
            });
        }
        let broker_id = format!("broker-{}", random_token(16));
        let bridge_token = random_token(64);
        conn.execute(
            "INSERT INTO broker_identity (id, broker_id, bridge_token) VALUES (1, ?1, ?2)",
            rusqlite::params![broker_id, bridge_token],
        )?;
        Ok(BrokerIdentity {
            broker_id,
            bridge_token,
        })
    }
}

pub(crate) fn random_token(hex_chars: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    (0..hex_chars)
        .map(|_| HEX[fastrand::usize(0..HEX.len())] as char)
        .collect()
}

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
