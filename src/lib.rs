//! Tennis match feature engineering
//!
//! Turns a cleaned history of ATP-style match records into head-to-head,
//! career, recent-form and rolling-window feature tables for a match outcome
//! classifier.

pub mod data;
pub mod features;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Unique identifier for a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub i64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player({})", self.0)
    }
}

/// Court surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Surface {
    Hard,
    Clay,
    Grass,
    Carpet,
    Unknown,
}

impl Surface {
    pub fn name(&self) -> &'static str {
        match self {
            Surface::Hard => "Hard",
            Surface::Clay => "Clay",
            Surface::Grass => "Grass",
            Surface::Carpet => "Carpet",
            Surface::Unknown => "Unknown",
        }
    }

    /// Parse a surface name, anything unrecognised maps to `Unknown`
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "hard" => Surface::Hard,
            "clay" => Surface::Clay,
            "grass" => Surface::Grass,
            "carpet" => Surface::Carpet,
            _ => Surface::Unknown,
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Tournament level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TourneyLevel {
    GrandSlam,
    Masters,
    Other,
}

impl TourneyLevel {
    /// Single-letter level code used by the source data
    pub fn code(&self) -> &'static str {
        match self {
            TourneyLevel::GrandSlam => "G",
            TourneyLevel::Masters => "M",
            TourneyLevel::Other => "O",
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "G" => TourneyLevel::GrandSlam,
            "M" => TourneyLevel::Masters,
            _ => TourneyLevel::Other,
        }
    }
}

impl fmt::Display for TourneyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TourneyLevel::GrandSlam => write!(f, "Grand Slam"),
            TourneyLevel::Masters => write!(f, "Masters"),
            TourneyLevel::Other => write!(f, "Other"),
        }
    }
}

/// Serve and return counters for one side of a match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServeStats {
    pub aces: u32,
    pub double_faults: u32,
    pub serve_points: u32,
    pub first_in: u32,
    pub first_won: u32,
    pub second_won: u32,
    pub service_games: u32,
    pub bp_saved: u32,
    pub bp_faced: u32,
}

/// Which side of a match a player was on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Winner,
    Loser,
}

impl Role {
    pub fn won(&self) -> bool {
        matches!(self, Role::Winner)
    }
}

/// A single cleaned match record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub tourney_id: String,
    pub tourney_name: String,
    pub date: NaiveDate,
    pub match_num: u32,
    pub surface: Surface,
    pub level: TourneyLevel,
    pub winner: PlayerId,
    pub loser: PlayerId,
    pub winner_name: Option<String>,
    pub loser_name: Option<String>,
    pub winner_stats: ServeStats,
    pub loser_stats: ServeStats,
}

impl MatchRecord {
    /// Player, name and counters for one side of the match
    pub fn side(&self, role: Role) -> (PlayerId, Option<&str>, &ServeStats) {
        match role {
            Role::Winner => (self.winner, self.winner_name.as_deref(), &self.winner_stats),
            Role::Loser => (self.loser, self.loser_name.as_deref(), &self.loser_stats),
        }
    }

    /// Role played by a player, or None if they did not take part
    pub fn role_of(&self, player: PlayerId) -> Option<Role> {
        if player == self.winner {
            Some(Role::Winner)
        } else if player == self.loser {
            Some(Role::Loser)
        } else {
            None
        }
    }

    /// Get the opponent for a given player
    pub fn opponent(&self, player: PlayerId) -> Option<PlayerId> {
        match self.role_of(player)? {
            Role::Winner => Some(self.loser),
            Role::Loser => Some(self.winner),
        }
    }

    /// Check the identifying fields every aggregator relies on
    pub fn validate(&self) -> Result<()> {
        if self.tourney_id.trim().is_empty() {
            return Err(TennisError::MissingField {
                field: "tourney_id",
                context: format!("match {} on {}", self.match_num, self.date),
            });
        }
        if self.winner == self.loser {
            return Err(TennisError::InvalidRecord(format!(
                "{} {} #{}: winner and loser are both {}",
                self.tourney_id, self.date, self.match_num, self.winner
            )));
        }
        Ok(())
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum TennisError {
    #[error("Missing required field `{field}` ({context})")]
    MissingField {
        field: &'static str,
        context: String,
    },

    #[error("Invalid match record: {0}")]
    InvalidRecord(String),

    #[error("Feature table `{name}` could not be read: {message}")]
    CacheRead { name: String, message: String },

    #[error("Feature table `{name}` could not be written: {source}")]
    CacheWrite {
        name: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Aggregator `{aggregator}` failed: {message}")]
    Aggregation {
        aggregator: &'static str,
        message: String,
    },

    #[error("Unknown feature set: {0}")]
    UnknownFeatureSet(String),

    #[error("Player not found with ID: {0}")]
    PlayerNotFound(PlayerId),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, TennisError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub features: FeatureConfig,
    pub data: DataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Matches in the recent-form window
    pub recent_matches: usize,
    /// Look-back limit for per-category recent form, in years
    pub max_years_gap: f64,
    /// Sample size below which recent-form rows are low confidence
    pub min_matches: usize,
    /// Rolling window sizes in days
    pub rolling_windows: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub database_path: String,
    pub feature_store_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            features: FeatureConfig::default(),
            data: DataConfig {
                database_path: "data/tennis.db".to_string(),
                feature_store_dir: "data/processed/features".to_string(),
            },
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        FeatureConfig {
            recent_matches: 15,
            max_years_gap: 2.0,
            min_matches: 5,
            rolling_windows: vec![10, 30, 90],
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.recent_matches == 0 {
            return Err(TennisError::Config(
                "features.recent_matches must be at least 1".to_string(),
            ));
        }
        if !(self.max_years_gap > 0.0) {
            return Err(TennisError::Config(format!(
                "features.max_years_gap must be positive, got {}",
                self.max_years_gap
            )));
        }
        if self.rolling_windows.is_empty() || self.rolling_windows.contains(&0) {
            return Err(TennisError::Config(
                "features.rolling_windows must be a non-empty list of positive day counts"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TennisError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| TennisError::Config(format!("Failed to parse config: {}", e)))?;
        config.features.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TennisError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_match(winner: i64, loser: i64) -> MatchRecord {
        MatchRecord {
            tourney_id: "2024-580".to_string(),
            tourney_name: "Australian Open".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            match_num: 1,
            surface: Surface::Hard,
            level: TourneyLevel::GrandSlam,
            winner: PlayerId(winner),
            loser: PlayerId(loser),
            winner_name: Some("Winner".to_string()),
            loser_name: None,
            winner_stats: ServeStats {
                aces: 10,
                ..ServeStats::default()
            },
            loser_stats: ServeStats::default(),
        }
    }

    #[test]
    fn test_side_and_role() {
        let record = make_match(1, 2);
        let (id, name, stats) = record.side(Role::Winner);
        assert_eq!(id, PlayerId(1));
        assert_eq!(name, Some("Winner"));
        assert_eq!(stats.aces, 10);

        assert_eq!(record.role_of(PlayerId(2)), Some(Role::Loser));
        assert_eq!(record.role_of(PlayerId(3)), None);
        assert_eq!(record.opponent(PlayerId(2)), Some(PlayerId(1)));
    }

    #[test]
    fn test_validate() {
        assert!(make_match(1, 2).validate().is_ok());
        assert!(matches!(
            make_match(1, 1).validate(),
            Err(TennisError::InvalidRecord(_))
        ));

        let mut record = make_match(1, 2);
        record.tourney_id = " ".to_string();
        assert!(matches!(
            record.validate(),
            Err(TennisError::MissingField { field: "tourney_id", .. })
        ));
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(Surface::from_name("clay"), Surface::Clay);
        assert_eq!(Surface::from_name(" Hard "), Surface::Hard);
        assert_eq!(Surface::from_name("None"), Surface::Unknown);
        assert_eq!(TourneyLevel::from_code("g"), TourneyLevel::GrandSlam);
        assert_eq!(TourneyLevel::from_code("A"), TourneyLevel::Other);
    }

    #[test]
    fn test_config_roundtrip_and_validation() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.features.rolling_windows, vec![10, 30, 90]);
        assert!(parsed.features.validate().is_ok());

        let mut bad = FeatureConfig::default();
        bad.recent_matches = 0;
        assert!(bad.validate().is_err());

        let mut bad = FeatureConfig::default();
        bad.max_years_gap = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = FeatureConfig::default();
        bad.rolling_windows = vec![30, 0];
        assert!(bad.validate().is_err());
    }
}
