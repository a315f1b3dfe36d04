use std::collections::HashMap;

use embergrid_base::{PartitionId, Result, SiteId};
use embergrid_engine::BackendTarget;
use serde::Deserialize;

/// Everything a site process needs to stand up its `SiteSupervisor`
/// (spec §6's enumerated configuration knobs), read from a TOML file by
/// `embergrid-server`'s `main.rs`.
#[derive(Clone, Debug, Deserialize)]
pub struct SiteConfig {
    pub site: SiteSection,
    #[serde(default)]
    pub pools: PoolSection,
    #[serde(default)]
    pub gc: GcSection,
    #[serde(default)]
    pub engine: EngineSection,
    /// The cluster's static partition-to-site directory. Every site in
    /// a deployment loads the same table; only the partitions it's
    /// actually asked to host (`site.partitions`) get an executor.
    #[serde(default)]
    pub directory: Vec<DirectoryEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SiteSection {
    pub id: u32,
    /// Partition ids this process hosts an executor for.
    pub partitions: Vec<u16>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PoolSection {
    /// Idle-list cap shared by the transaction-state pools and, unless
    /// overridden, the procedure pools too.
    pub idle_cap: usize,
    /// Per-pool profiling is always collected (the counters are a few
    /// atomics, cheap enough to leave on); this only gates whether
    /// `SiteSupervisor::snapshot` surfaces them.
    pub profiling_enabled: bool,
    pub procedure_pool_default_size: usize,
}

impl Default for PoolSection {
    fn default() -> Self {
        PoolSection {
            idle_cap: 64,
            profiling_enabled: true,
            procedure_pool_default_size: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct GcSection {
    pub interval_secs: u64,
    pub max_cleaned_per_poll: usize,
}

impl Default for GcSection {
    fn default() -> Self {
        GcSection {
            interval_secs: 2,
            max_cleaned_per_poll: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct EngineSection {
    pub backend_target: BackendTargetConfig,
}

impl Default for EngineSection {
    fn default() -> Self {
        EngineSection {
            backend_target: BackendTargetConfig::InMemory,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendTargetConfig {
    InMemory,
    NativeJni,
    NativeIpc,
    PureSql,
}

impl From<BackendTargetConfig> for BackendTarget {
    fn from(cfg: BackendTargetConfig) -> BackendTarget {
        match cfg {
            BackendTargetConfig::InMemory => BackendTarget::InMemory,
            BackendTargetConfig::NativeJni => BackendTarget::NativeJni,
            BackendTargetConfig::NativeIpc => BackendTarget::NativeIpc,
            BackendTargetConfig::PureSql => BackendTarget::PureSql,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct DirectoryEntry {
    pub partition: u16,
    pub site: u32,
}

impl SiteConfig {
    pub fn from_toml_str(contents: &str) -> Result<SiteConfig> {
        toml::from_str(contents).map_err(|e| embergrid_base::err(format!("invalid site config: {e}")))
    }

    pub fn site_id(&self) -> SiteId {
        SiteId(self.site.id)
    }

    pub fn hosted_partitions(&self) -> Vec<PartitionId> {
        self.site.partitions.iter().map(|&p| PartitionId(p)).collect()
    }

    pub fn directory_map(&self) -> HashMap<PartitionId, SiteId> {
        self.directory
            .iter()
            .map(|entry| (PartitionId(entry.partition), SiteId(entry.site)))
            .collect()
    }
}
