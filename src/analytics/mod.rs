//! Analytics cache: one computed JSON payload per entity.

mod cache;
mod entry;

pub use cache::AnalyticsCache;
pub use entry::{AnalyticsEntry, AnalyticsStats, CacheLookup};
