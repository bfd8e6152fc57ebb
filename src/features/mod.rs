//! Feature engineering
//!
//! Converts cleaned match records into cached feature tables.

pub mod career;
pub mod head_to_head;
pub mod observation;
pub mod pipeline;
pub mod rates;
pub mod recency;
pub mod rolling;
pub mod store;
pub mod table;

pub use career::{CareerAggregator, CareerStatsRow};
pub use head_to_head::{HeadToHeadAggregator, HeadToHeadRow};
pub use observation::{normalize, PlayerObservation};
pub use pipeline::{AggregatorReport, FeaturePipeline, FeatureSets};
pub use recency::{RecencyAggregator, RecencyConfig, RecentStatsRow};
pub use rolling::{RollingAggregator, RollingConfig, RollingStatsRow};
pub use store::{CacheOutcome, FeatureStore};
pub use table::{FeatureRow, FeatureSet, FeatureTable};
