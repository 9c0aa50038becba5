use identity_store::IdentityStore;
use identity_store::SharePermission;

/// Result of `checkBridgeDeviceAccess` (`spec.md` §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareAccess {
    All,
    ReadWrite,
    Read,
    None,
}

impl ShareAccess {
    pub fn allows_write(self) -> bool {
        matches!(self, ShareAccess::All | ShareAccess::ReadWrite)
    }
}

/// With zero share rows for `from_broker_id`, access is `All` (backward
/// compatible open policy). Otherwise the row for `(from_broker_id,
/// target_device_id)` governs, or `None` if no such row exists.
pub fn check_bridge_device_access(
    store: &IdentityStore,
    from_broker_id: &str,
    target_device_id: i64,
) -> identity_store::Result<ShareAccess> {
    let rows = store.get_shared_devices_for_remote(from_broker_id)?;
    if rows.is_empty() {
        return Ok(ShareAccess::All);
    }
    let matching = rows.iter().find(|row| row.device_id == target_device_id);
    Ok(match matching {
        None => ShareAccess::None,
        Some(row) => match row.permission {
            SharePermission::Read => ShareAccess::Read,
            SharePermission::ReadWrite => ShareAccess::ReadWrite,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rows_means_open_access() {
        let store = IdentityStore::open_in_memory().unwrap();
        let access = check_bridge_device_access(&store, "peer-a", 999).unwrap();
        assert_eq!(access, ShareAccess::All);
    }

    #[test]
    fn rows_present_but_no_match_denies() {
        let store = IdentityStore::open_in_memory().unwrap();
        let device = store.create_device("dev-x", "auth-x").unwrap();
        let other = store.create_device("dev-y", "auth-y").unwrap();
        store.add_remote("peer-a", "mqtt://peer-a", "tok").unwrap();
        store
            .share_device("peer-a", other.id, SharePermission::ReadWrite)
            .unwrap();

        let access = check_bridge_device_access(&store, "peer-a", device.id).unwrap();
        assert_eq!(access, ShareAccess::None);
    }

    #[test]
    fn read_permission_denies_writes_readwrite_allows() {
        let store = IdentityStore::open_in_memory().unwrap();
        let device = store.create_device("dev-x", "auth-x").unwrap();
        store.add_remote("peer-a", "mqtt://peer-a", "tok").unwrap();
        store
            .share_device("peer-a", device.id, SharePermission::Read)
            .unwrap();

        let access = check_bridge_device_access(&store, "peer-a", device.id).unwrap();
        assert_eq!(access, ShareAccess::Read);
        assert!(!access.allows_write());

        store
            .share_device("peer-a", device.id, SharePermission::ReadWrite)
            .unwrap();
        let access = check_bridge_device_access(&store, "peer-a", device.id).unwrap();
        assert!(access.allows_write());
    }
}
