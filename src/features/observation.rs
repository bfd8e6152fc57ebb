//! Role-neutral player observations
//!
//! Each match stores a winner side and a loser side. Aggregators work on
//! one observation per (match, player) instead, so they never need to know
//! which side a player was on.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{MatchRecord, PlayerId, Result, Role, ServeStats, Surface, TourneyLevel};

/// One player's view of one match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerObservation {
    pub player: PlayerId,
    pub date: NaiveDate,
    pub surface: Surface,
    pub level: TourneyLevel,
    pub won: bool,
    /// The player's own serve counters
    pub stats: ServeStats,
}

impl PlayerObservation {
    pub fn from_match(record: &MatchRecord, role: Role) -> Self {
        let (player, _, stats) = record.side(role);
        PlayerObservation {
            player,
            date: record.date,
            surface: record.surface,
            level: record.level,
            won: role.won(),
            stats: *stats,
        }
    }
}

/// Expand matches into two observations each, winner first
pub fn normalize(matches: &[MatchRecord]) -> Result<Vec<PlayerObservation>> {
    let mut observations = Vec::with_capacity(matches.len() * 2);
    for record in matches {
        record.validate()?;
        observations.push(PlayerObservation::from_match(record, Role::Winner));
        observations.push(PlayerObservation::from_match(record, Role::Loser));
    }
    Ok(observations)
}

/// Group observations by player, each history sorted by date.
///
/// The sort is stable, so observations sharing a date keep their input order.
pub fn by_player(observations: &[PlayerObservation]) -> BTreeMap<PlayerId, Vec<&PlayerObservation>> {
    let mut grouped: BTreeMap<PlayerId, Vec<&PlayerObservation>> = BTreeMap::new();
    for obs in observations {
        grouped.entry(obs.player).or_default().push(obs);
    }
    for history in grouped.values_mut() {
        history.sort_by_key(|obs| obs.date);
    }
    grouped
}

/// First known name for every player
pub fn player_names(matches: &[MatchRecord]) -> BTreeMap<PlayerId, String> {
    let mut names = BTreeMap::new();
    for record in matches {
        for role in [Role::Winner, Role::Loser] {
            if let (player, Some(name), _) = record.side(role) {
                names.entry(player).or_insert_with(|| name.to_string());
            }
        }
    }
    names
}
