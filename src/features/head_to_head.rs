//! Head-to-head records between pairs of players

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::observation::player_names;
use super::rates::ratio;
use super::table::FeatureRow;
use crate::{MatchRecord, PlayerId, Result};

/// Canonical key for a pair of players (smaller ID first)
pub fn canonical_pair(a: PlayerId, b: PlayerId) -> (PlayerId, PlayerId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Meetings between two players, keyed by the canonical pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadToHeadRow {
    /// The smaller player ID
    pub player1_id: PlayerId,
    pub player2_id: PlayerId,
    pub player1_name: Option<String>,
    pub player2_name: Option<String>,
    pub total_matches: u32,
    pub p1_wins: u32,
    pub p2_wins: u32,
    pub p1_win_pct: f32,
    pub p2_win_pct: f32,
}

impl HeadToHeadRow {
    /// (wins, losses, win pct) from one player's side of the pair
    pub fn perspective(&self, player: PlayerId) -> Option<(u32, u32, f32)> {
        if player == self.player1_id {
            Some((self.p1_wins, self.p2_wins, self.p1_win_pct))
        } else if player == self.player2_id {
            Some((self.p2_wins, self.p1_wins, self.p2_win_pct))
        } else {
            None
        }
    }
}

impl FeatureRow for HeadToHeadRow {
    const SCHEMA_VERSION: u32 = 1;

    fn key(&self) -> String {
        format!("{}-{}", self.player1_id.0, self.player2_id.0)
    }

    fn players(&self) -> Vec<PlayerId> {
        vec![self.player1_id, self.player2_id]
    }

    fn values(&self) -> Vec<(String, f32)> {
        vec![
            ("total_matches".to_string(), self.total_matches as f32),
            ("p1_wins".to_string(), self.p1_wins as f32),
            ("p2_wins".to_string(), self.p2_wins as f32),
            ("p1_win_pct".to_string(), self.p1_win_pct),
            ("p2_win_pct".to_string(), self.p2_win_pct),
        ]
    }
}

/// Computes head-to-head rows for every pair that has met
pub struct HeadToHeadAggregator {
    /// (p1 wins, p2 wins) per canonical pair
    pairs: BTreeMap<(PlayerId, PlayerId), (u32, u32)>,
}

impl Default for HeadToHeadAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadToHeadAggregator {
    pub fn new() -> Self {
        HeadToHeadAggregator {
            pairs: BTreeMap::new(),
        }
    }

    /// Record one match
    pub fn update(&mut self, record: &MatchRecord) -> Result<()> {
        record.validate()?;
        let key = canonical_pair(record.winner, record.loser);
        let entry = self.pairs.entry(key).or_insert((0, 0));
        if record.winner == key.0 {
            entry.0 += 1;
        } else {
            entry.1 += 1;
        }
        Ok(())
    }

    /// Rows ordered by canonical pair
    pub fn rows(&self, names: &BTreeMap<PlayerId, String>) -> Vec<HeadToHeadRow> {
        self.pairs
            .iter()
            .map(|(&(p1, p2), &(p1_wins, p2_wins))| {
                let total = p1_wins + p2_wins;
                HeadToHeadRow {
                    player1_id: p1,
                    player2_id: p2,
                    player1_name: names.get(&p1).cloned(),
                    player2_name: names.get(&p2).cloned(),
                    total_matches: total,
                    p1_wins,
                    p2_wins,
                    p1_win_pct: ratio(p1_wins as u64, total as u64),
                    p2_win_pct: ratio(p2_wins as u64, total as u64),
                }
            })
            .collect()
    }

    /// Build the full head-to-head table from a match list
    pub fn compute(matches: &[MatchRecord]) -> Result<Vec<HeadToHeadRow>> {
        let mut aggregator = Self::new();
        for record in matches {
            aggregator.update(record)?;
        }
        Ok(aggregator.rows(&player_names(matches)))
    }
}

/// Find the row for two players in either order
pub fn lookup(rows: &[HeadToHeadRow], a: PlayerId, b: PlayerId) -> Option<&HeadToHeadRow> {
    let key = canonical_pair(a, b);
    rows.binary_search_by(|row| (row.player1_id, row.player2_id).cmp(&key))
        .ok()
        .map(|idx| &rows[idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ServeStats, Surface, TennisError, TourneyLevel};
    use chrono::NaiveDate;

    fn make_match(winner: i64, loser: i64, match_num: u32) -> MatchRecord {
        MatchRecord {
            tourney_id: "2023-404".to_string(),
            tourney_name: "Indian Wells Masters".to_string(),
            date: NaiveDate::from_ymd_opt(2023, 3, 8).unwrap(),
            match_num,
            surface: Surface::Hard,
            level: TourneyLevel::Masters,
            winner: PlayerId(winner),
            loser: PlayerId(loser),
            winner_name: Some(format!("P{}", winner)),
            loser_name: Some(format!("P{}", loser)),
            winner_stats: ServeStats::default(),
            loser_stats: ServeStats::default(),
        }
    }

    #[test]
    fn test_pair_order_does_not_matter() {
        let rows = HeadToHeadAggregator::compute(&[
            make_match(20, 10, 1),
            make_match(10, 20, 2),
            make_match(20, 10, 3),
        ])
        .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.player1_id, PlayerId(10));
        assert_eq!(row.player2_id, PlayerId(20));
        assert_eq!(row.player1_name.as_deref(), Some("P10"));
        assert_eq!(row.total_matches, 3);
        assert_eq!(row.p1_wins, 1);
        assert_eq!(row.p2_wins, 2);
    }

    #[test]
    fn test_wins_and_pcts_sum() {
        let matches: Vec<_> = (0..17)
            .map(|i| {
                let (w, l) = match i % 5 {
                    0 => (1, 2),
                    1 => (2, 1),
                    2 => (3, 1),
                    3 => (2, 3),
                    _ => (1, 3),
                };
                make_match(w, l, i)
            })
            .collect();
        let rows = HeadToHeadAggregator::compute(&matches).unwrap();

        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert!(row.player1_id < row.player2_id);
            assert_eq!(row.p1_wins + row.p2_wins, row.total_matches);
            assert!((row.p1_win_pct + row.p2_win_pct - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_perspective_and_lookup() {
        let rows = HeadToHeadAggregator::compute(&[
            make_match(7, 3, 1),
            make_match(7, 3, 2),
            make_match(3, 7, 3),
            make_match(5, 9, 4),
        ])
        .unwrap();

        let row = lookup(&rows, PlayerId(7), PlayerId(3)).unwrap();
        assert_eq!(row.player1_id, PlayerId(3));
        assert_eq!(row.perspective(PlayerId(7)).map(|p| (p.0, p.1)), Some((2, 1)));
        assert_eq!(row.perspective(PlayerId(3)).map(|p| (p.0, p.1)), Some((1, 2)));
        assert!(row.perspective(PlayerId(5)).is_none());

        assert!(lookup(&rows, PlayerId(9), PlayerId(5)).is_some());
        assert!(lookup(&rows, PlayerId(3), PlayerId(5)).is_none());
    }

    #[test]
    fn test_self_match_fails() {
        assert!(matches!(
            HeadToHeadAggregator::compute(&[make_match(4, 4, 1)]),
            Err(TennisError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(HeadToHeadAggregator::compute(&[]).unwrap().is_empty());
    }
}
