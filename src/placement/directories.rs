//! Directory Planner
//!
//! Reconciles the requested data directories of a node against the ledger.
//! When no directories are requested the node's default directory is used,
//! unless devices are selected, in which case the default is given up.

use crate::domain::model::{DirectoryMap, OsdSlot, RemovedDirectoryMap};
use crate::error::Result;
use crate::ledger::IdentityLedger;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Result of directory planning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryPlan {
    /// Desired directories, carrying persisted identities forward
    pub directories: DirectoryMap,
    /// Persisted directories no longer desired
    pub removed: RemovedDirectoryMap,
}

/// Plans the data directories of one node
pub struct DirectoryPlanner<'a> {
    ledger: &'a IdentityLedger,
}

impl<'a> DirectoryPlanner<'a> {
    pub fn new(ledger: &'a IdentityLedger) -> Self {
        Self { ledger }
    }

    /// Compute desired and removed directories. The ledger is only read.
    pub async fn plan(
        &self,
        node_id: &str,
        default_path: &str,
        requested: &str,
        devices_selected: bool,
    ) -> Result<DirectoryPlan> {
        let persisted = self.ledger.load_dir_map(node_id).await?;
        let desired = desired_paths(default_path, requested, devices_selected);

        let directories: DirectoryMap = desired
            .iter()
            .map(|path| {
                let slot = persisted
                    .get(path)
                    .map_or(OsdSlot::Unassigned, |id| OsdSlot::Assigned(*id));
                (path.clone(), slot)
            })
            .collect();

        let removed: RemovedDirectoryMap = persisted
            .into_iter()
            .filter(|(path, _)| !desired.contains(path))
            .collect();

        for (path, id) in &removed {
            info!(node = node_id, path = %path, osd = %id, "directory no longer desired");
        }
        debug!(
            node = node_id,
            desired = directories.len(),
            removed = removed.len(),
            "planned directories"
        );

        Ok(DirectoryPlan {
            directories,
            removed,
        })
    }
}

/// Desired directory set for a pass
///
/// Explicit directories always win. Without them the default path is used
/// only when no devices are selected.
pub fn desired_paths(default_path: &str, requested: &str, devices_selected: bool) -> BTreeSet<String> {
    let explicit: BTreeSet<String> = requested
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    if !explicit.is_empty() {
        explicit
    } else if !devices_selected {
        BTreeSet::from([default_path.to_string()])
    } else {
        BTreeSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{OsdId, PersistedDirMap};
    use crate::error::Error;
    use crate::ledger::MemoryStore;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    const NODE: &str = "node6046";
    const DEFAULT_DIR: &str = "/var/lib/rook";

    async fn ledger_with(dirs: &[(&str, u32)]) -> IdentityLedger {
        let ledger = IdentityLedger::in_memory();
        let persisted: PersistedDirMap = dirs
            .iter()
            .map(|(p, id)| (p.to_string(), OsdId(*id)))
            .collect();
        if !persisted.is_empty() {
            ledger.save_dir_map(NODE, &persisted).await.unwrap();
        }
        ledger
    }

    async fn plan(ledger: &IdentityLedger, requested: &str, devices_selected: bool) -> DirectoryPlan {
        DirectoryPlanner::new(ledger)
            .plan(NODE, DEFAULT_DIR, requested, devices_selected)
            .await
            .unwrap()
    }

    fn dirs(entries: &[(&str, Option<u32>)]) -> DirectoryMap {
        entries
            .iter()
            .map(|(p, id)| (p.to_string(), id.map(OsdId).into()))
            .collect()
    }

    fn removed(entries: &[(&str, u32)]) -> RemovedDirectoryMap {
        entries
            .iter()
            .map(|(p, id)| (p.to_string(), OsdId(*id)))
            .collect()
    }

    #[test]
    fn test_desired_paths() {
        assert_eq!(desired_paths(DEFAULT_DIR, "", false).len(), 1);
        assert!(desired_paths(DEFAULT_DIR, "", true).is_empty());

        let paths = desired_paths(DEFAULT_DIR, " /a , ,/b,/a", true);
        assert_eq!(paths.into_iter().collect::<Vec<_>>(), vec!["/a", "/b"]);
    }

    #[tokio::test]
    async fn test_default_dir_when_nothing_selected() {
        let ledger = ledger_with(&[]).await;
        let result = plan(&ledger, "", false).await;
        assert_eq!(result.directories, dirs(&[(DEFAULT_DIR, None)]));
        assert!(result.removed.is_empty());
    }

    #[tokio::test]
    async fn test_default_dir_identity_retained_without_devices() {
        let ledger = ledger_with(&[(DEFAULT_DIR, 0)]).await;
        let result = plan(&ledger, "", false).await;
        assert_eq!(result.directories, dirs(&[(DEFAULT_DIR, Some(0))]));
        assert!(result.removed.is_empty());
    }

    #[tokio::test]
    async fn test_devices_selected_abandons_default_dir() {
        let ledger = ledger_with(&[]).await;
        let result = plan(&ledger, "", true).await;
        assert!(result.directories.is_empty());
        assert!(result.removed.is_empty());

        let ledger = ledger_with(&[(DEFAULT_DIR, 0)]).await;
        let result = plan(&ledger, "", true).await;
        assert!(result.directories.is_empty());
        assert_eq!(result.removed, removed(&[(DEFAULT_DIR, 0)]));
    }

    #[tokio::test]
    async fn test_explicit_dirs_win_over_default() {
        let ledger = ledger_with(&[]).await;
        let result = plan(&ledger, "/rook/dir1", false).await;
        assert_eq!(result.directories, dirs(&[("/rook/dir1", None)]));
        assert!(result.removed.is_empty());

        // explicit dirs replace a previously used default dir
        let ledger = ledger_with(&[(DEFAULT_DIR, 0)]).await;
        let result = plan(&ledger, "/rook/dir1", false).await;
        assert_eq!(result.directories, dirs(&[("/rook/dir1", None)]));
        assert_eq!(result.removed, removed(&[(DEFAULT_DIR, 0)]));
    }

    #[tokio::test]
    async fn test_new_dir_added_next_to_existing() {
        let ledger = ledger_with(&[("/rook/dir1", 1)]).await;
        let result = plan(&ledger, "/rook/dir1,/tmp/mydir", true).await;
        assert_eq!(
            result.directories,
            dirs(&[("/rook/dir1", Some(1)), ("/tmp/mydir", None)])
        );
        assert!(result.removed.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_dir_is_removed() {
        let ledger = ledger_with(&[("/rook/dir1", 1), ("/tmp/mydir", 23)]).await;
        let result = plan(&ledger, "/rook/dir1", false).await;
        assert_eq!(result.directories, dirs(&[("/rook/dir1", Some(1))]));
        assert_eq!(result.removed, removed(&[("/tmp/mydir", 23)]));
    }

    #[tokio::test]
    async fn test_default_dir_listed_explicitly_keeps_identity() {
        let ledger = ledger_with(&[(DEFAULT_DIR, 0), ("/rook/dir2", 2)]).await;
        let requested = format!("{},/rook/dir2", DEFAULT_DIR);
        let result = plan(&ledger, &requested, true).await;
        assert_eq!(
            result.directories,
            dirs(&[(DEFAULT_DIR, Some(0)), ("/rook/dir2", Some(2))])
        );
        assert!(result.removed.is_empty());
    }

    #[tokio::test]
    async fn test_planning_does_not_write_and_is_repeatable() {
        let ledger = ledger_with(&[("/rook/dir1", 1), ("/tmp/mydir", 23)]).await;
        let first = plan(&ledger, "/rook/dir1,/rook/dir3", true).await;
        let second = plan(&ledger, "/rook/dir1,/rook/dir3", true).await;
        assert_eq!(first, second);
        assert_eq!(ledger.load_dir_map(NODE).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_ledger_failure_propagates() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        let ledger = IdentityLedger::new(store);

        let result = DirectoryPlanner::new(&ledger)
            .plan(NODE, DEFAULT_DIR, "", false)
            .await;
        assert_matches!(result, Err(Error::LedgerUnavailable { .. }));
    }
}
