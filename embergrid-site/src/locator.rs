use dashmap::DashMap;
use embergrid_base::{PartitionId, SiteId};
use embergrid_coord::PartitionLocator;

/// The supervisor's authoritative partition-to-site directory (spec
/// §4.7 "per-process registry"). Backed by `DashMap` rather than a
/// `Mutex<HashMap>` since every partition executor and the coordinator
/// interface read it on the hot send path, and the directory itself
/// only ever changes at startup or on an explicit reconfiguration.
#[derive(Debug, Default)]
pub struct PartitionDirectory {
    sites: DashMap<PartitionId, SiteId>,
}

impl PartitionDirectory {
    pub fn new() -> Self {
        PartitionDirectory::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (PartitionId, SiteId)>) -> Self {
        let sites = DashMap::new();
        for (partition, site) in entries {
            sites.insert(partition, site);
        }
        PartitionDirectory { sites }
    }

    pub fn insert(&self, partition: PartitionId, site: SiteId) {
        self.sites.insert(partition, site);
    }

    pub fn remove(&self, partition: PartitionId) {
        self.sites.remove(&partition);
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

impl PartitionLocator for PartitionDirectory {
    fn site_of(&self, partition: PartitionId) -> Option<SiteId> {
        self.sites.get(&partition).map(|entry| *entry.value())
    }
}
