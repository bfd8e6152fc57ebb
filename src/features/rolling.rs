//! Rolling calendar-window statistics
//!
//! For every date a player has matches on, aggregates that player's
//! matches in the trailing W days (date in (T - W, T]) for each window size.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::observation::{by_player, PlayerObservation};
use super::table::FeatureRow;
use crate::{FeatureConfig, PlayerId};

/// Rolling window configuration
#[derive(Debug, Clone)]
pub struct RollingConfig {
    /// Window sizes in days
    pub windows: Vec<u32>,
}

impl Default for RollingConfig {
    fn default() -> Self {
        RollingConfig {
            windows: vec![10, 30, 90],
        }
    }
}

impl From<&FeatureConfig> for RollingConfig {
    fn from(config: &FeatureConfig) -> Self {
        RollingConfig {
            windows: config.rolling_windows.clone(),
        }
    }
}

/// Per-match serve percentages; None where the denominator is zero
#[derive(Debug, Clone, Copy)]
struct MatchRates {
    first_serve_pct: Option<f64>,
    first_serve_won_pct: Option<f64>,
    second_serve_won_pct: Option<f64>,
    bp_saved_pct: Option<f64>,
}

impl MatchRates {
    fn from_observation(obs: &PlayerObservation) -> Self {
        let s = &obs.stats;
        let pct = |num: u32, den: u32| (den > 0).then(|| num as f64 / den as f64);
        MatchRates {
            first_serve_pct: pct(s.first_in, s.serve_points),
            first_serve_won_pct: pct(s.first_won, s.first_in),
            second_serve_won_pct: pct(s.second_won, s.serve_points.saturating_sub(s.first_in)),
            bp_saved_pct: pct(s.bp_saved, s.bp_faced),
        }
    }
}

/// Running mean that skips undefined values
#[derive(Debug, Clone, Copy, Default)]
struct RunningMean {
    sum: f64,
    count: u32,
}

impl RunningMean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn remove(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.count -= 1;
            self.sum = if self.count == 0 { 0.0 } else { self.sum - v };
        }
    }

    fn mean(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum / self.count as f64) as f32
        }
    }
}

/// Running sums over the observations currently inside a window
#[derive(Debug, Clone, Default)]
struct WindowSums {
    matches: u32,
    wins: u32,
    aces: u64,
    double_faults: u64,
    first_serve_pct: RunningMean,
    first_serve_won_pct: RunningMean,
    second_serve_won_pct: RunningMean,
    bp_saved_pct: RunningMean,
}

impl WindowSums {
    fn add(&mut self, obs: &PlayerObservation, rates: &MatchRates) {
        self.matches += 1;
        self.wins += obs.won as u32;
        self.aces += obs.stats.aces as u64;
        self.double_faults += obs.stats.double_faults as u64;
        self.first_serve_pct.add(rates.first_serve_pct);
        self.first_serve_won_pct.add(rates.first_serve_won_pct);
        self.second_serve_won_pct.add(rates.second_serve_won_pct);
        self.bp_saved_pct.add(rates.bp_saved_pct);
    }

    fn remove(&mut self, obs: &PlayerObservation, rates: &MatchRates) {
        self.matches -= 1;
        self.wins -= obs.won as u32;
        self.aces -= obs.stats.aces as u64;
        self.double_faults -= obs.stats.double_faults as u64;
        self.first_serve_pct.remove(rates.first_serve_pct);
        self.first_serve_won_pct.remove(rates.first_serve_won_pct);
        self.second_serve_won_pct.remove(rates.second_serve_won_pct);
        self.bp_saved_pct.remove(rates.bp_saved_pct);
    }

    fn snapshot(&self, days: u32) -> WindowStats {
        let per_match = |total: u64| {
            if self.matches == 0 {
                0.0
            } else {
                (total as f64 / self.matches as f64) as f32
            }
        };
        WindowStats {
            days,
            matches: self.matches,
            win_rate: per_match(self.wins as u64),
            mean_aces: per_match(self.aces),
            mean_double_faults: per_match(self.double_faults),
            mean_first_serve_pct: self.first_serve_pct.mean(),
            mean_first_serve_won_pct: self.first_serve_won_pct.mean(),
            mean_second_serve_won_pct: self.second_serve_won_pct.mean(),
            mean_bp_saved_pct: self.bp_saved_pct.mean(),
        }
    }
}

/// Aggregates for one trailing window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub days: u32,
    pub matches: u32,
    pub win_rate: f32,
    pub mean_aces: f32,
    pub mean_double_faults: f32,
    pub mean_first_serve_pct: f32,
    pub mean_first_serve_won_pct: f32,
    pub mean_second_serve_won_pct: f32,
    pub mean_bp_saved_pct: f32,
}

/// Rolling statistics for one player on one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingStatsRow {
    pub player_id: PlayerId,
    pub date: NaiveDate,
    /// One entry per configured window, in configuration order
    pub windows: Vec<WindowStats>,
}

impl RollingStatsRow {
    pub fn window(&self, days: u32) -> Option<&WindowStats> {
        self.windows.iter().find(|w| w.days == days)
    }
}

impl FeatureRow for RollingStatsRow {
    const SCHEMA_VERSION: u32 = 1;

    fn key(&self) -> String {
        format!("{}@{}", self.player_id.0, self.date)
    }

    fn players(&self) -> Vec<PlayerId> {
        vec![self.player_id]
    }

    fn values(&self) -> Vec<(String, f32)> {
        let mut values = Vec::with_capacity(self.windows.len() * 8);
        for w in &self.windows {
            let d = w.days;
            values.push((format!("matches_{}d", d), w.matches as f32));
            values.push((format!("win_rate_{}d", d), w.win_rate));
            values.push((format!("mean_aces_{}d", d), w.mean_aces));
            values.push((format!("mean_double_faults_{}d", d), w.mean_double_faults));
            values.push((format!("mean_first_serve_pct_{}d", d), w.mean_first_serve_pct));
            values.push((format!("mean_first_serve_won_pct_{}d", d), w.mean_first_serve_won_pct));
            values.push((format!("mean_second_serve_won_pct_{}d", d), w.mean_second_serve_won_pct));
            values.push((format!("mean_bp_saved_pct_{}d", d), w.mean_bp_saved_pct));
        }
        values
    }
}

/// Computes rolling statistics per player and date
pub struct RollingAggregator {
    config: RollingConfig,
}

impl RollingAggregator {
    pub fn new(config: RollingConfig) -> Self {
        RollingAggregator { config }
    }

    /// Slide one window over a date-sorted history, one result per distinct date
    fn slide(history: &[&PlayerObservation], rates: &[MatchRates], days: u32) -> Vec<WindowStats> {
        let mut out = Vec::new();
        let mut sums = WindowSums::default();
        let (mut left, mut right) = (0, 0);

        while right < history.len() {
            let current = history[right].date;
            while right < history.len() && history[right].date <= current {
                sums.add(history[right], &rates[right]);
                right += 1;
            }

            // No start date means the window reaches past the calendar
            if let Some(start) = current.checked_sub_days(Days::new(days as u64)) {
                while left < right && history[left].date <= start {
                    sums.remove(history[left], &rates[left]);
                    left += 1;
                }
            }

            out.push(sums.snapshot(days));
        }
        out
    }

    /// Rows for one player's date-sorted history
    pub fn player_rows(&self, player: PlayerId, history: &[&PlayerObservation]) -> Vec<RollingStatsRow> {
        let rates: Vec<MatchRates> = history.iter().map(|obs| MatchRates::from_observation(obs)).collect();

        let mut dates: Vec<NaiveDate> = history.iter().map(|obs| obs.date).collect();
        dates.dedup();

        let per_window: Vec<Vec<WindowStats>> = self
            .config
            .windows
            .iter()
            .map(|&days| Self::slide(history, &rates, days))
            .collect();

        dates
            .into_iter()
            .enumerate()
            .map(|(i, date)| RollingStatsRow {
                player_id: player,
                date,
                windows: per_window.iter().map(|stats| stats[i]).collect(),
            })
            .collect()
    }

    /// Rows ordered by player, then date
    pub fn compute(&self, observations: &[PlayerObservation]) -> Vec<RollingStatsRow> {
        by_player(observations)
            .into_iter()
            .flat_map(|(player, history)| self.player_rows(player, &history))
            .collect()
    }
}
