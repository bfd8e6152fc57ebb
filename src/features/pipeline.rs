//! Feature pipeline
//!
//! Normalizes the match set once, then builds the four feature sets through
//! the feature store as independent parallel tasks. Any failure aborts the
//! batch.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

use super::career::{CareerAggregator, CareerStatsRow};
use super::head_to_head::{HeadToHeadAggregator, HeadToHeadRow};
use super::observation::{normalize, player_names, PlayerObservation};
use super::recency::{RecencyAggregator, RecencyConfig, RecentStatsRow};
use super::rolling::{RollingAggregator, RollingConfig, RollingStatsRow};
use super::store::{CacheOutcome, FeatureStore};
use super::table::{FeatureRow, FeatureSet, FeatureTable};
use crate::{FeatureConfig, MatchRecord, PlayerId, Result, TennisError};

/// All four feature tables
#[derive(Debug, Clone)]
pub struct FeatureSets {
    pub head_to_head: FeatureTable<HeadToHeadRow>,
    pub career: FeatureTable<CareerStatsRow>,
    pub recent: FeatureTable<RecentStatsRow>,
    pub rolling: FeatureTable<RollingStatsRow>,
}

/// Outcome of one aggregator in a pipeline run
#[derive(Debug, Clone, Copy)]
pub struct AggregatorReport {
    pub set: FeatureSet,
    pub rows: usize,
    pub outcome: CacheOutcome,
}

impl AggregatorReport {
    fn from_table<R: FeatureRow>(set: FeatureSet, (table, outcome): &(FeatureTable<R>, CacheOutcome)) -> Self {
        AggregatorReport {
            set,
            rows: table.len(),
            outcome: *outcome,
        }
    }
}

/// Builds feature sets through a feature store
pub struct FeaturePipeline<'a> {
    store: &'a FeatureStore,
    config: FeatureConfig,
    fingerprint: Option<String>,
}

impl<'a> FeaturePipeline<'a> {
    pub fn new(store: &'a FeatureStore, config: &FeatureConfig) -> Self {
        FeaturePipeline {
            store,
            config: config.clone(),
            fingerprint: None,
        }
    }

    /// Rebuild stored tables that were computed from a different dataset
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Build (or load) all four feature sets
    pub fn build_all(
        &self,
        matches: &[MatchRecord],
        force: bool,
    ) -> Result<(FeatureSets, Vec<AggregatorReport>)> {
        self.config.validate()?;
        let observations = normalize(matches).map_err(|e| aggregation_error("normalizer", e))?;
        let names = player_names(matches);
        log::info!(
            "Normalized {} matches into {} player observations",
            matches.len(),
            observations.len()
        );

        let ((h2h, career), (recent, rolling)) = rayon::join(
            || {
                rayon::join(
                    || self.head_to_head(matches, force),
                    || self.career(&observations, &names, force),
                )
            },
            || {
                rayon::join(
                    || self.recent(&observations, force),
                    || self.rolling(&observations, force),
                )
            },
        );

        log_result(FeatureSet::HeadToHead, &h2h);
        log_result(FeatureSet::Career, &career);
        log_result(FeatureSet::Recent, &recent);
        log_result(FeatureSet::Rolling, &rolling);

        let (h2h, career, recent, rolling) = (h2h?, career?, recent?, rolling?);
        let reports = vec![
            AggregatorReport::from_table(FeatureSet::HeadToHead, &h2h),
            AggregatorReport::from_table(FeatureSet::Career, &career),
            AggregatorReport::from_table(FeatureSet::Recent, &recent),
            AggregatorReport::from_table(FeatureSet::Rolling, &rolling),
        ];

        Ok((
            FeatureSets {
                head_to_head: h2h.0,
                career: career.0,
                recent: recent.0,
                rolling: rolling.0,
            },
            reports,
        ))
    }

    /// Build (or load) a single feature set
    pub fn build_one(
        &self,
        set: FeatureSet,
        matches: &[MatchRecord],
        force: bool,
    ) -> Result<AggregatorReport> {
        self.config.validate()?;
        let observations = || normalize(matches).map_err(|e| aggregation_error("normalizer", e));

        match set {
            FeatureSet::HeadToHead => finish(set, self.head_to_head(matches, force)),
            FeatureSet::Career => {
                let names = player_names(matches);
                finish(set, self.career(&observations()?, &names, force))
            }
            FeatureSet::Recent => finish(set, self.recent(&observations()?, force)),
            FeatureSet::Rolling => finish(set, self.rolling(&observations()?, force)),
        }
    }

    fn head_to_head(
        &self,
        matches: &[MatchRecord],
        force: bool,
    ) -> Result<(FeatureTable<HeadToHeadRow>, CacheOutcome)> {
        self.run(FeatureSet::HeadToHead, force, || HeadToHeadAggregator::compute(matches))
    }

    fn career(
        &self,
        observations: &[PlayerObservation],
        names: &BTreeMap<PlayerId, String>,
        force: bool,
    ) -> Result<(FeatureTable<CareerStatsRow>, CacheOutcome)> {
        self.run(FeatureSet::Career, force, || {
            Ok(CareerAggregator::compute(observations, names))
        })
    }

    fn recent(
        &self,
        observations: &[PlayerObservation],
        force: bool,
    ) -> Result<(FeatureTable<RecentStatsRow>, CacheOutcome)> {
        let aggregator = RecencyAggregator::new(RecencyConfig::from(&self.config));
        self.run(FeatureSet::Recent, force, || Ok(aggregator.compute(observations)))
    }

    fn rolling(
        &self,
        observations: &[PlayerObservation],
        force: bool,
    ) -> Result<(FeatureTable<RollingStatsRow>, CacheOutcome)> {
        let aggregator = RollingAggregator::new(RollingConfig::from(&self.config));
        self.run(FeatureSet::Rolling, force, || Ok(aggregator.compute(observations)))
    }

    /// Run one aggregator through the store. Builder errors and panics are
    /// attributed to the aggregator; store errors pass through unchanged.
    fn run<R, F>(&self, set: FeatureSet, force: bool, builder: F) -> Result<(FeatureTable<R>, CacheOutcome)>
    where
        R: FeatureRow,
        F: FnOnce() -> Result<Vec<R>>,
    {
        let aggregator = set.aggregator();
        let attributed = || builder().map_err(|e| aggregation_error(aggregator, e));

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.store
                .get_or_build_checked(set.name(), self.fingerprint.as_deref(), attributed, force)
        }));

        match result {
            Ok(result) => result,
            Err(payload) => Err(TennisError::Aggregation {
                aggregator,
                message: format!("panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }
}

fn aggregation_error(aggregator: &'static str, error: TennisError) -> TennisError {
    match error {
        TennisError::Aggregation { .. } => error,
        other => TennisError::Aggregation {
            aggregator,
            message: other.to_string(),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn finish<R: FeatureRow>(
    set: FeatureSet,
    result: Result<(FeatureTable<R>, CacheOutcome)>,
) -> Result<AggregatorReport> {
    log_result(set, &result);
    result.map(|built| AggregatorReport::from_table(set, &built))
}

fn log_result<T>(set: FeatureSet, result: &Result<(FeatureTable<T>, CacheOutcome)>) {
    match result {
        Ok((table, CacheOutcome::Built)) => {
            log::info!("  {}: built {} rows", set.aggregator(), table.rows.len())
        }
        Ok((table, CacheOutcome::Loaded)) => {
            log::info!("  {}: loaded {} rows", set.aggregator(), table.rows.len())
        }
        Err(e) => log::error!("  {}: failed: {}", set.aggregator(), e),
    }
}
