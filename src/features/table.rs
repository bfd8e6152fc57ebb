//! Feature tables and the named feature sets

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

use crate::{PlayerId, TennisError};

/// A row of a feature table
pub trait FeatureRow: Serialize + DeserializeOwned + Clone + Send {
    /// Bumped whenever the row layout changes; stored tables with another
    /// version are rebuilt.
    const SCHEMA_VERSION: u32;

    /// Human-readable row key
    fn key(&self) -> String;

    /// Players this row belongs to
    fn players(&self) -> Vec<PlayerId>;

    /// Named numeric feature columns
    fn values(&self) -> Vec<(String, f32)>;
}

/// A named, versioned set of feature rows
#[derive(Debug, Clone)]
pub struct FeatureTable<R> {
    pub name: String,
    pub schema_version: u32,
    /// Identifies the match dataset the rows were computed from
    pub fingerprint: Option<String>,
    pub built_at: DateTime<Utc>,
    pub rows: Vec<R>,
}

impl<R: FeatureRow> FeatureTable<R> {
    pub fn new(name: &str, fingerprint: Option<String>, rows: Vec<R>) -> Self {
        FeatureTable {
            name: name.to_string(),
            schema_version: R::SCHEMA_VERSION,
            fingerprint,
            built_at: Utc::now(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows involving a player
    pub fn rows_for(&self, player: PlayerId) -> impl Iterator<Item = &R> {
        self.rows
            .iter()
            .filter(move |row| row.players().contains(&player))
    }
}

/// The feature sets produced by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureSet {
    HeadToHead,
    Career,
    Recent,
    Rolling,
}

impl FeatureSet {
    pub const ALL: [FeatureSet; 4] = [
        FeatureSet::HeadToHead,
        FeatureSet::Career,
        FeatureSet::Recent,
        FeatureSet::Rolling,
    ];

    /// Name the table is persisted under
    pub fn name(&self) -> &'static str {
        match self {
            FeatureSet::HeadToHead => "head_to_head",
            FeatureSet::Career => "career_stats",
            FeatureSet::Recent => "recent_stats",
            FeatureSet::Rolling => "rolling_stats",
        }
    }

    /// Name of the aggregator that computes this set
    pub fn aggregator(&self) -> &'static str {
        match self {
            FeatureSet::HeadToHead => "head-to-head",
            FeatureSet::Career => "career",
            FeatureSet::Recent => "recency",
            FeatureSet::Rolling => "rolling",
        }
    }

    pub fn from_name(name: &str) -> crate::Result<Self> {
        match name.to_lowercase().as_str() {
            "head_to_head" | "h2h" => Ok(FeatureSet::HeadToHead),
            "career_stats" | "career" => Ok(FeatureSet::Career),
            "recent_stats" | "recent" | "recency" => Ok(FeatureSet::Recent),
            "rolling_stats" | "rolling" => Ok(FeatureSet::Rolling),
            _ => Err(TennisError::UnknownFeatureSet(name.to_string())),
        }
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for FeatureSet {
    type Err = TennisError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        FeatureSet::from_name(s)
    }
}
