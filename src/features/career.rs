//! Career statistics
//!
//! All-time win rates and serve/return rates per player.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::observation::PlayerObservation;
use super::rates::{ServeRates, ServeTotals, WinCounter};
use super::table::FeatureRow;
use crate::{PlayerId, Surface, TourneyLevel};

/// Running career totals for one player
#[derive(Debug, Clone, Default)]
pub struct CareerStatistics {
    pub overall: WinCounter,
    pub hard: WinCounter,
    pub clay: WinCounter,
    pub grass: WinCounter,
    pub carpet: WinCounter,
    pub grand_slam: WinCounter,
    pub masters: WinCounter,
    pub serve: ServeTotals,
}

impl CareerStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update statistics with one observation
    pub fn update(&mut self, obs: &PlayerObservation) {
        self.overall.record(obs.won);

        match obs.surface {
            Surface::Hard => self.hard.record(obs.won),
            Surface::Clay => self.clay.record(obs.won),
            Surface::Grass => self.grass.record(obs.won),
            Surface::Carpet => self.carpet.record(obs.won),
            Surface::Unknown => {}
        }

        match obs.level {
            TourneyLevel::GrandSlam => self.grand_slam.record(obs.won),
            TourneyLevel::Masters => self.masters.record(obs.won),
            TourneyLevel::Other => {}
        }

        self.serve.add(&obs.stats);
    }

    pub fn to_row(&self, player_id: PlayerId, player_name: Option<String>) -> CareerStatsRow {
        CareerStatsRow {
            player_id,
            player_name,
            matches_played: self.overall.matches,
            wins: self.overall.wins,
            losses: self.overall.matches - self.overall.wins,
            win_rate: self.overall.rate(),
            hard_win_rate: self.hard.rate(),
            clay_win_rate: self.clay.rate(),
            grass_win_rate: self.grass.rate(),
            carpet_win_rate: self.carpet.rate(),
            grand_slam_win_rate: self.grand_slam.rate(),
            masters_win_rate: self.masters.rate(),
            serve: self.serve.rates(),
        }
    }
}

/// One player's career feature row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareerStatsRow {
    pub player_id: PlayerId,
    pub player_name: Option<String>,
    pub matches_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: f32,
    pub hard_win_rate: f32,
    pub clay_win_rate: f32,
    pub grass_win_rate: f32,
    pub carpet_win_rate: f32,
    pub grand_slam_win_rate: f32,
    pub masters_win_rate: f32,
    pub serve: ServeRates,
}

impl FeatureRow for CareerStatsRow {
    const SCHEMA_VERSION: u32 = 1;

    fn key(&self) -> String {
        self.player_id.0.to_string()
    }

    fn players(&self) -> Vec<PlayerId> {
        vec![self.player_id]
    }

    fn values(&self) -> Vec<(String, f32)> {
        let mut values = vec![
            ("matches_played".to_string(), self.matches_played as f32),
            ("wins".to_string(), self.wins as f32),
            ("losses".to_string(), self.losses as f32),
            ("win_rate".to_string(), self.win_rate),
            ("hard_win_rate".to_string(), self.hard_win_rate),
            ("clay_win_rate".to_string(), self.clay_win_rate),
            ("grass_win_rate".to_string(), self.grass_win_rate),
            ("carpet_win_rate".to_string(), self.carpet_win_rate),
            ("grand_slam_win_rate".to_string(), self.grand_slam_win_rate),
            ("masters_win_rate".to_string(), self.masters_win_rate),
        ];
        values.extend(
            ServeRates::COLUMNS
                .iter()
                .map(|c| c.to_string())
                .zip(self.serve.to_vec()),
        );
        values
    }
}

/// Compute career statistics for all players
pub struct CareerAggregator {
    stats: BTreeMap<PlayerId, CareerStatistics>,
}

impl Default for CareerAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl CareerAggregator {
    pub fn new() -> Self {
        CareerAggregator {
            stats: BTreeMap::new(),
        }
    }

    pub fn process(&mut self, observations: &[PlayerObservation]) {
        for obs in observations {
            self.stats.entry(obs.player).or_default().update(obs);
        }
    }

    pub fn get(&self, player: PlayerId) -> Option<&CareerStatistics> {
        self.stats.get(&player)
    }

    /// Rows ordered by player ID
    pub fn rows(&self, names: &BTreeMap<PlayerId, String>) -> Vec<CareerStatsRow> {
        self.stats
            .iter()
            .map(|(&player, stats)| stats.to_row(player, names.get(&player).cloned()))
            .collect()
    }

    pub fn compute(
        observations: &[PlayerObservation],
        names: &BTreeMap<PlayerId, String>,
    ) -> Vec<CareerStatsRow> {
        let mut aggregator = Self::new();
        aggregator.process(observations);
        aggregator.rows(names)
    }
}
