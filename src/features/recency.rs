//! Recent form statistics
//!
//! Win rates over each player's most recent matches, overall and per
//! surface / tournament level, plus serve rates over the recent window.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::observation::{by_player, PlayerObservation};
use super::rates::{ServeRates, ServeTotals, WinCounter};
use super::table::FeatureRow;
use crate::{FeatureConfig, PlayerId, Surface, TourneyLevel};

/// Recent form configuration
#[derive(Debug, Clone, Copy)]
pub struct RecencyConfig {
    /// Matches per window
    pub n_matches: usize,
    /// Category windows only look back this many years from the player's
    /// latest match
    pub max_years_gap: f64,
    /// Rows with fewer recent matches are low confidence
    pub min_matches: usize,
}

impl Default for RecencyConfig {
    fn default() -> Self {
        RecencyConfig {
            n_matches: 15,
            max_years_gap: 2.0,
            min_matches: 5,
        }
    }
}

impl From<&FeatureConfig> for RecencyConfig {
    fn from(config: &FeatureConfig) -> Self {
        RecencyConfig {
            n_matches: config.recent_matches,
            max_years_gap: config.max_years_gap,
            min_matches: config.min_matches,
        }
    }
}

impl RecencyConfig {
    /// Earliest date considered for category windows. A gap reaching past
    /// the start of the calendar covers the whole history.
    pub fn cutoff(&self, latest: NaiveDate) -> NaiveDate {
        let days = (self.max_years_gap * 365.25).round() as u64;
        latest
            .checked_sub_days(Days::new(days))
            .unwrap_or(NaiveDate::MIN)
    }
}

/// A slice of history the category windows are restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Surface(Surface),
    Level(TourneyLevel),
}

impl Category {
    pub const RECENT: [Category; 5] = [
        Category::Surface(Surface::Hard),
        Category::Surface(Surface::Clay),
        Category::Surface(Surface::Grass),
        Category::Level(TourneyLevel::GrandSlam),
        Category::Level(TourneyLevel::Masters),
    ];

    pub fn contains(&self, obs: &PlayerObservation) -> bool {
        match self {
            Category::Surface(surface) => obs.surface == *surface,
            Category::Level(level) => obs.level == *level,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Category::Surface(Surface::Hard) => "hard",
            Category::Surface(Surface::Clay) => "clay",
            Category::Surface(Surface::Grass) => "grass",
            Category::Surface(Surface::Carpet) => "carpet",
            Category::Surface(Surface::Unknown) => "unknown_surface",
            Category::Level(TourneyLevel::GrandSlam) => "grand_slam",
            Category::Level(TourneyLevel::Masters) => "masters",
            Category::Level(TourneyLevel::Other) => "other_level",
        }
    }
}

/// Win rate over a window and how many matches it actually covered
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowForm {
    pub win_rate: f32,
    pub matches: u32,
}

impl WindowForm {
    fn from_window(window: &[&PlayerObservation]) -> Self {
        let mut counter = WinCounter::default();
        for obs in window {
            counter.record(obs.won);
        }
        WindowForm {
            win_rate: counter.rate(),
            matches: counter.matches,
        }
    }
}

/// One player's recent form row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentStatsRow {
    pub player_id: PlayerId,
    pub total_matches: u32,
    pub recent: WindowForm,
    pub hard: WindowForm,
    pub clay: WindowForm,
    pub grass: WindowForm,
    pub grand_slam: WindowForm,
    pub masters: WindowForm,
    /// Serve rates over the overall recent window
    pub serve: ServeRates,
    /// Span between first and last match, in years (one decimal)
    pub years_active: f32,
    pub last_match_date: NaiveDate,
}

impl RecentStatsRow {
    pub fn category(&self, category: Category) -> Option<&WindowForm> {
        match category {
            Category::Surface(Surface::Hard) => Some(&self.hard),
            Category::Surface(Surface::Clay) => Some(&self.clay),
            Category::Surface(Surface::Grass) => Some(&self.grass),
            Category::Level(TourneyLevel::GrandSlam) => Some(&self.grand_slam),
            Category::Level(TourneyLevel::Masters) => Some(&self.masters),
            _ => None,
        }
    }

    /// Whether the overall window has enough matches to be trusted
    pub fn is_reliable(&self, min_matches: usize) -> bool {
        self.recent.matches as usize >= min_matches
    }
}

impl FeatureRow for RecentStatsRow {
    const SCHEMA_VERSION: u32 = 1;

    fn key(&self) -> String {
        self.player_id.0.to_string()
    }

    fn players(&self) -> Vec<PlayerId> {
        vec![self.player_id]
    }

    fn values(&self) -> Vec<(String, f32)> {
        let mut values = vec![
            ("total_matches".to_string(), self.total_matches as f32),
            ("recent_win_rate".to_string(), self.recent.win_rate),
            ("recent_matches".to_string(), self.recent.matches as f32),
        ];
        for category in Category::RECENT {
            if let Some(form) = self.category(category) {
                let name = category.column();
                values.push((format!("recent_{}_win_rate", name), form.win_rate));
                values.push((format!("recent_{}_matches", name), form.matches as f32));
            }
        }
        values.extend(
            ServeRates::COLUMNS
                .iter()
                .map(|c| format!("recent_{}", c))
                .zip(self.serve.to_vec()),
        );
        values.push(("years_active".to_string(), self.years_active));
        values
    }
}

/// Computes recent form per player
pub struct RecencyAggregator {
    config: RecencyConfig,
}

impl RecencyAggregator {
    pub fn new(config: RecencyConfig) -> Self {
        RecencyAggregator { config }
    }

    /// Last `n_matches` of a category, restricted to matches on or after the
    /// cutoff. `history` must be sorted by date.
    pub fn category_window<'a>(
        &self,
        history: &[&'a PlayerObservation],
        category: Category,
        cutoff: NaiveDate,
    ) -> Vec<&'a PlayerObservation> {
        let filtered: Vec<&PlayerObservation> = history
            .iter()
            .copied()
            .filter(|obs| category.contains(obs) && obs.date >= cutoff)
            .collect();
        let start = filtered.len().saturating_sub(self.config.n_matches);
        filtered[start..].to_vec()
    }

    /// Recent form row for one player's date-sorted history
    pub fn player_row(&self, player: PlayerId, history: &[&PlayerObservation]) -> Option<RecentStatsRow> {
        let first = history.first()?.date;
        let last = history.last()?.date;
        let cutoff = self.config.cutoff(last);

        let recent = &history[history.len().saturating_sub(self.config.n_matches)..];
        let form = |category| WindowForm::from_window(&self.category_window(history, category, cutoff));

        let days_active = (last - first).num_days() as f64;
        let years_active = ((days_active / 365.25) * 10.0).round() / 10.0;

        Some(RecentStatsRow {
            player_id: player,
            total_matches: history.len() as u32,
            recent: WindowForm::from_window(recent),
            hard: form(Category::Surface(Surface::Hard)),
            clay: form(Category::Surface(Surface::Clay)),
            grass: form(Category::Surface(Surface::Grass)),
            grand_slam: form(Category::Level(TourneyLevel::GrandSlam)),
            masters: form(Category::Level(TourneyLevel::Masters)),
            serve: ServeTotals::from_stats(recent.iter().map(|obs| &obs.stats)).rates(),
            years_active: years_active as f32,
            last_match_date: last,
        })
    }

    /// Rows ordered by player ID
    pub fn compute(&self, observations: &[PlayerObservation]) -> Vec<RecentStatsRow> {
        by_player(observations)
            .into_iter()
            .filter_map(|(player, history)| self.player_row(player, &history))
            .collect()
    }

    /// Rows whose overall window meets `min_matches`
    pub fn reliable<'a>(&self, rows: &'a [RecentStatsRow]) -> Vec<&'a RecentStatsRow> {
        rows.iter()
            .filter(|row| row.is_reliable(self.config.min_matches))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServeStats;
    use chrono::Duration;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn make_obs(player: i64, on: NaiveDate, surface: Surface, won: bool) -> PlayerObservation {
        PlayerObservation {
            player: PlayerId(player),
            date: on,
            surface,
            level: TourneyLevel::Other,
            won,
            stats: ServeStats {
                aces: 5,
                serve_points: 70,
                first_in: 42,
                first_won: 30,
                second_won: 14,
                service_games: 10,
                ..ServeStats::default()
            },
        }
    }

    fn at_level(mut obs: PlayerObservation, level: TourneyLevel) -> PlayerObservation {
        obs.level = level;
        obs
    }

    fn aggregator(n_matches: usize) -> RecencyAggregator {
        RecencyAggregator::new(RecencyConfig {
            n_matches,
            ..RecencyConfig::default()
        })
    }

    #[test]
    fn test_overall_window_takes_last_n() {
        let mut observations = Vec::new();
        // Five old losses followed by three wins
        for i in 0..5 {
            observations.push(make_obs(1, date(2015, 1, 1 + i), Surface::Hard, false));
        }
        for i in 0..3 {
            observations.push(make_obs(1, date(2024, 1, 1 + i), Surface::Hard, true));
        }

        let rows = aggregator(4).compute(&observations);
        let row = &rows[0];
        assert_eq!(row.total_matches, 8);
        assert_eq!(row.recent.matches, 4);
        assert!((row.recent.win_rate - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_category_filters_before_truncating() {
        let mut observations = Vec::new();
        // Hard wins too old for the two-year cutoff
        for i in 0..5 {
            observations.push(make_obs(1, date(2020, 3, 1 + i), Surface::Hard, true));
        }
        // Two hard losses inside the cutoff
        observations.push(make_obs(1, date(2023, 8, 1), Surface::Hard, false));
        observations.push(make_obs(1, date(2023, 8, 2), Surface::Hard, false));
        // The latest matches are all on clay
        for i in 0..3 {
            observations.push(make_obs(1, date(2024, 5, 1 + i), Surface::Clay, true));
        }

        let row = &aggregator(3).compute(&observations)[0];

        // Category window: filtered by surface and cutoff, then truncated
        assert_eq!(row.hard.matches, 2);
        assert_eq!(row.hard.win_rate, 0.0);
        assert_eq!(row.clay.matches, 3);
        assert_eq!(row.clay.win_rate, 1.0);
        assert_eq!(row.grass.matches, 0);
        assert_eq!(row.grass.win_rate, 0.0);
        // Overall window ignores the cutoff and categories
        assert_eq!(row.recent.matches, 3);
        assert_eq!(row.recent.win_rate, 1.0);
    }

    #[test]
    fn test_cutoff_is_per_player_and_inclusive() {
        let config = RecencyConfig::default();
        let latest = date(2024, 6, 30);
        let cutoff = config.cutoff(latest);
        assert_eq!(cutoff, latest - Duration::days(731));

        let observations = vec![
            make_obs(1, cutoff, Surface::Grass, true),
            make_obs(1, latest, Surface::Clay, false),
            // Another player whose history ends long before player 1's
            make_obs(2, date(2010, 6, 1), Surface::Grass, true),
            make_obs(2, date(2010, 7, 1), Surface::Grass, false),
        ];
        let rows = RecencyAggregator::new(config).compute(&observations);

        assert_eq!(rows[0].grass.matches, 1);
        assert_eq!(rows[1].grass.matches, 2);
        assert!((rows[1].grass.win_rate - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_counts_bounded() {
        let mut observations = Vec::new();
        for i in 0..40u32 {
            let surface = match i % 3 {
                0 => Surface::Hard,
                1 => Surface::Clay,
                _ => Surface::Grass,
            };
            let on = date(2023, 1, 1) + Duration::days(i as i64 * 9);
            observations.push(make_obs(1 + (i as i64 % 2), on, surface, i % 4 != 0));
        }
        let agg = aggregator(5);
        let rows = agg.compute(&observations);
        assert_eq!(rows.len(), 2);

        for row in &rows {
            let player_obs: Vec<_> = observations.iter().filter(|o| o.player == row.player_id).collect();
            assert!(row.recent.matches as usize <= 5);
            for category in Category::RECENT {
                let form = row.category(category).unwrap();
                let total = player_obs.iter().filter(|o| category.contains(o)).count();
                assert!(form.matches as usize <= 5);
                assert!(form.matches as usize <= total);
            }
        }
    }

    #[test]
    fn test_years_active_and_serve() {
        let observations = vec![
            make_obs(9, date(2020, 1, 1), Surface::Hard, true),
            make_obs(9, date(2023, 7, 1), Surface::Hard, true),
        ];
        let row = &aggregator(15).compute(&observations)[0];
        // 1277 days / 365.25 = 3.496...
        assert!((row.years_active - 3.5).abs() < 1e-6);
        assert_eq!(row.last_match_date, date(2023, 7, 1));
        assert!((row.serve.first_serve_pct - 0.6).abs() < 1e-6);
        assert!((row.serve.ace_rate - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_reliable_rows() {
        let mut observations = vec![make_obs(1, date(2024, 1, 1), Surface::Hard, true)];
        for i in 0..6 {
            observations.push(make_obs(2, date(2024, 1, 1 + i), Surface::Hard, true));
        }
        let agg = RecencyAggregator::new(RecencyConfig {
            n_matches: 10,
            min_matches: 5,
            ..RecencyConfig::default()
        });
        let rows = agg.compute(&observations);
        let reliable = agg.reliable(&rows);
        assert_eq!(reliable.len(), 1);
        assert_eq!(reliable[0].player_id, PlayerId(2));
        assert!(!rows[0].is_reliable(5));
    }

    #[test]
    fn test_level_windows_keep_newest_of_filtered() {
        let mut observations = Vec::new();
        // Six Masters matches on clay: three losses, then three wins
        for i in 0..6 {
            let obs = make_obs(1, date(2024, 1, 1 + i), Surface::Clay, i >= 3);
            observations.push(at_level(obs, TourneyLevel::Masters));
        }
        // Two Grand Slam wins on grass
        for i in 0..2 {
            let obs = make_obs(1, date(2024, 1, 10 + i), Surface::Grass, true);
            observations.push(at_level(obs, TourneyLevel::GrandSlam));
        }
        // The latest matches are hard-court losses at other events
        for i in 0..6 {
            observations.push(make_obs(1, date(2024, 1, 20 + i), Surface::Hard, false));
        }

        let row = &aggregator(3).compute(&observations)[0];

        assert_eq!(row.masters.matches, 3);
        assert_eq!(row.masters.win_rate, 1.0);
        assert_eq!(row.clay.matches, 3);
        assert_eq!(row.clay.win_rate, 1.0);
        assert_eq!(row.grand_slam.matches, 2);
        assert_eq!(row.grand_slam.win_rate, 1.0);
        assert_eq!(row.grass.matches, 2);
        assert_eq!(row.hard.matches, 3);
        assert_eq!(row.hard.win_rate, 0.0);
        assert_eq!(row.recent.matches, 3);
        assert_eq!(row.recent.win_rate, 0.0);
    }

    #[test]
    fn test_gap_past_calendar_start_covers_history() {
        let latest = date(2024, 6, 30);
        for gap in [1_000_000.0, f64::INFINITY] {
            let mut features = FeatureConfig::default();
            features.max_years_gap = gap;
            assert!(features.validate().is_ok());

            let config = RecencyConfig::from(&features);
            assert_eq!(config.cutoff(latest), NaiveDate::MIN);

            let observations = vec![
                make_obs(1, date(1975, 6, 1), Surface::Grass, true),
                make_obs(1, latest, Surface::Grass, false),
            ];
            let row = &RecencyAggregator::new(config).compute(&observations)[0];
            assert_eq!(row.grass.matches, 2);
            assert!((row.grass.win_rate - 0.5).abs() < 1e-6);
        }
    }
}
