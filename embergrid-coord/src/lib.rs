//! Packages fragment-task batches into a single cross-partition request
//! and routes responses back into executor state (spec §4.5). A
//! `CoordinatorRequest` always addresses exactly one destination site:
//! the partitions participating in one round of a transaction are
//! grouped by the site that hosts them, and one request is sent per
//! site, reusing the messenger's request/response sequence pairing
//! (`embergrid_net::wire::Node`) rather than re-inventing one.

mod interface;
mod locator;

#[cfg(test)]
mod test;

pub use interface::CoordinatorInterface;
pub use locator::PartitionLocator;
