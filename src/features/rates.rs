//! Ratio helpers shared by the aggregators
//!
//! Every rate here resolves a zero denominator to exactly 0.

use serde::{Deserialize, Serialize};

use crate::ServeStats;

/// `numerator / denominator`, or 0 when the denominator is zero
pub fn ratio(numerator: u64, denominator: u64) -> f32 {
    if denominator == 0 {
        0.0
    } else {
        (numerator as f64 / denominator as f64) as f32
    }
}

/// Wins over matches for one slice of a player's history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WinCounter {
    pub wins: u32,
    pub matches: u32,
}

impl WinCounter {
    pub fn record(&mut self, won: bool) {
        self.matches += 1;
        if won {
            self.wins += 1;
        }
    }

    pub fn rate(&self) -> f32 {
        ratio(self.wins as u64, self.matches as u64)
    }
}

/// Summed serve counters over a set of matches
#[derive(Debug, Clone, Copy, Default)]
pub struct ServeTotals {
    pub aces: u64,
    pub double_faults: u64,
    pub serve_points: u64,
    pub first_in: u64,
    pub first_won: u64,
    pub second_won: u64,
    pub service_games: u64,
    pub bp_saved: u64,
    pub bp_faced: u64,
}

impl ServeTotals {
    pub fn add(&mut self, stats: &ServeStats) {
        self.aces += stats.aces as u64;
        self.double_faults += stats.double_faults as u64;
        self.serve_points += stats.serve_points as u64;
        self.first_in += stats.first_in as u64;
        self.first_won += stats.first_won as u64;
        self.second_won += stats.second_won as u64;
        self.service_games += stats.service_games as u64;
        self.bp_saved += stats.bp_saved as u64;
        self.bp_faced += stats.bp_faced as u64;
    }

    pub fn from_stats<'a>(stats: impl IntoIterator<Item = &'a ServeStats>) -> Self {
        let mut totals = ServeTotals::default();
        for s in stats {
            totals.add(s);
        }
        totals
    }

    pub fn rates(&self) -> ServeRates {
        // Inconsistent source rows can report more first serves in than points
        let second_serve_points = self.serve_points.saturating_sub(self.first_in);
        ServeRates {
            first_serve_pct: ratio(self.first_in, self.serve_points),
            first_serve_won_pct: ratio(self.first_won, self.first_in),
            second_serve_won_pct: ratio(self.second_won, second_serve_points),
            ace_rate: ratio(self.aces, self.service_games),
            double_fault_rate: ratio(self.double_faults, self.service_games),
            break_points_per_game: ratio(self.bp_faced, self.service_games),
            break_point_save_pct: ratio(self.bp_saved, self.bp_faced),
        }
    }
}

/// Serve and return rates derived from [`ServeTotals`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ServeRates {
    pub first_serve_pct: f32,
    pub first_serve_won_pct: f32,
    pub second_serve_won_pct: f32,
    /// Aces per service game
    pub ace_rate: f32,
    /// Double faults per service game
    pub double_fault_rate: f32,
    /// Break points faced per service game
    pub break_points_per_game: f32,
    pub break_point_save_pct: f32,
}

impl ServeRates {
    pub const COLUMNS: [&'static str; 7] = [
        "first_serve_pct",
        "first_serve_won_pct",
        "second_serve_won_pct",
        "ace_rate",
        "double_fault_rate",
        "break_points_per_game",
        "break_point_save_pct",
    ];

    pub fn to_vec(&self) -> Vec<f32> {
        vec![
            self.first_serve_pct,
            self.first_serve_won_pct,
            self.second_serve_won_pct,
            self.ace_rate,
            self.double_fault_rate,
            self.break_points_per_game,
            self.break_point_save_pct,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_denominator_is_zero() {
        assert_eq!(ratio(5, 0), 0.0);
        assert_eq!(ratio(0, 0), 0.0);
        assert_eq!(WinCounter::default().rate(), 0.0);

        let rates = ServeTotals::default().rates();
        assert!(rates.to_vec().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_serve_rates() {
        let stats = ServeStats {
            aces: 6,
            double_faults: 3,
            serve_points: 80,
            first_in: 50,
            first_won: 40,
            second_won: 15,
            service_games: 12,
            bp_saved: 3,
            bp_faced: 4,
        };
        let rates = ServeTotals::from_stats([&stats, &stats]).rates();

        assert!((rates.first_serve_pct - 0.625).abs() < 1e-6);
        assert!((rates.first_serve_won_pct - 0.8).abs() < 1e-6);
        assert!((rates.second_serve_won_pct - 0.5).abs() < 1e-6);
        assert!((rates.ace_rate - 0.5).abs() < 1e-6);
        assert!((rates.double_fault_rate - 0.25).abs() < 1e-6);
        assert!((rates.break_points_per_game - 1.0 / 3.0).abs() < 1e-6);
        assert!((rates.break_point_save_pct - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_second_serve_without_second_serves() {
        // Every point was a first serve in: no second-serve denominator
        let stats = ServeStats {
            serve_points: 10,
            first_in: 12,
            second_won: 1,
            ..ServeStats::default()
        };
        let rates = ServeTotals::from_stats([&stats]).rates();
        assert_eq!(rates.second_serve_won_pct, 0.0);
    }

    #[test]
    fn test_win_counter() {
        let mut counter = WinCounter::default();
        counter.record(true);
        counter.record(false);
        counter.record(true);
        assert_eq!(counter.matches, 3);
        assert_eq!(counter.wins, 2);
        assert!((counter.rate() - 2.0 / 3.0).abs() < 1e-6);
    }
}
