//! Ties a process to a set of hosted partitions: reads `SiteConfig`,
//! stands up a `SiteSupervisor` owning one `PartitionExecutor` thread
//! per hosted partition plus the router thread that feeds them from
//! the network, and exposes the observability surface the
//! `embergrid-server` binary polls.

mod config;
mod locator;
mod pool_registry;
mod stats;
mod supervisor;

pub use config::{BackendTargetConfig, DirectoryEntry, EngineSection, GcSection, PoolSection, SiteConfig, SiteSection};
pub use locator::PartitionDirectory;
pub use pool_registry::{PoolRegistry, PoolStatsSource};
pub use stats::{ErrorCategory, SiteSnapshot, Stats, StatsSnapshot};
pub use supervisor::SiteSupervisor;
