//! SQLite database management for match data

use crate::{MatchRecord, PlayerId, Result, ServeStats, Surface, TourneyLevel};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const MATCH_COLUMNS: &str = "tourney_id, tourney_name, date, match_num, surface, tourney_level,
    winner_id, winner_name, loser_id, loser_name,
    w_ace, w_df, w_svpt, w_1st_in, w_1st_won, w_2nd_won, w_sv_gms, w_bp_saved, w_bp_faced,
    l_ace, l_df, l_svpt, l_1st_in, l_1st_won, l_2nd_won, l_sv_gms, l_bp_saved, l_bp_faced";

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tourney_id TEXT NOT NULL,
                tourney_name TEXT NOT NULL,
                date TEXT NOT NULL,
                match_num INTEGER NOT NULL,
                surface TEXT NOT NULL,
                tourney_level TEXT NOT NULL,
                winner_id INTEGER NOT NULL,
                winner_name TEXT,
                loser_id INTEGER NOT NULL,
                loser_name TEXT,
                w_ace INTEGER NOT NULL DEFAULT 0,
                w_df INTEGER NOT NULL DEFAULT 0,
                w_svpt INTEGER NOT NULL DEFAULT 0,
                w_1st_in INTEGER NOT NULL DEFAULT 0,
                w_1st_won INTEGER NOT NULL DEFAULT 0,
                w_2nd_won INTEGER NOT NULL DEFAULT 0,
                w_sv_gms INTEGER NOT NULL DEFAULT 0,
                w_bp_saved INTEGER NOT NULL DEFAULT 0,
                w_bp_faced INTEGER NOT NULL DEFAULT 0,
                l_ace INTEGER NOT NULL DEFAULT 0,
                l_df INTEGER NOT NULL DEFAULT 0,
                l_svpt INTEGER NOT NULL DEFAULT 0,
                l_1st_in INTEGER NOT NULL DEFAULT 0,
                l_1st_won INTEGER NOT NULL DEFAULT 0,
                l_2nd_won INTEGER NOT NULL DEFAULT 0,
                l_sv_gms INTEGER NOT NULL DEFAULT 0,
                l_bp_saved INTEGER NOT NULL DEFAULT 0,
                l_bp_faced INTEGER NOT NULL DEFAULT 0,
                UNIQUE(tourney_id, tourney_name, date, match_num, winner_id, loser_id)
            );

            CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(date);
            CREATE INDEX IF NOT EXISTS idx_matches_winner ON matches(winner_id);
            CREATE INDEX IF NOT EXISTS idx_matches_loser ON matches(loser_id);
            "#,
        )?;
        Ok(())
    }

    // ==================== Match Operations ====================

    /// Insert match records, skipping any already stored. Returns the number inserted.
    pub fn insert_matches(&mut self, records: &[MatchRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO matches ({}) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                    ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19,
                    ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)",
                MATCH_COLUMNS
            ))?;

            for record in records {
                let w = &record.winner_stats;
                let l = &record.loser_stats;
                inserted += stmt.execute(params![
                    record.tourney_id,
                    record.tourney_name,
                    record.date.format("%Y-%m-%d").to_string(),
                    record.match_num,
                    record.surface.name(),
                    record.level.code(),
                    record.winner.0,
                    record.winner_name,
                    record.loser.0,
                    record.loser_name,
                    w.aces,
                    w.double_faults,
                    w.serve_points,
                    w.first_in,
                    w.first_won,
                    w.second_won,
                    w.service_games,
                    w.bp_saved,
                    w.bp_faced,
                    l.aces,
                    l.double_faults,
                    l.serve_points,
                    l.first_in,
                    l.first_won,
                    l.second_won,
                    l.service_games,
                    l.bp_saved,
                    l.bp_faced,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Get all matches in chronological order
    pub fn get_all_matches(&self) -> Result<Vec<MatchRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM matches ORDER BY date, match_num, id",
            MATCH_COLUMNS
        ))?;
        let matches = stmt
            .query_map([], Self::row_to_match)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(matches)
    }

    /// Get matches involving a player, in chronological order
    pub fn get_player_matches(&self, player: PlayerId) -> Result<Vec<MatchRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM matches
             WHERE winner_id = ?1 OR loser_id = ?1
             ORDER BY date, match_num, id",
            MATCH_COLUMNS
        ))?;
        let matches = stmt
            .query_map(params![player.0], Self::row_to_match)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(matches)
    }

    /// Most recent name recorded for a player
    pub fn player_name(&self, player: PlayerId) -> Result<Option<String>> {
        let name: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM (
                    SELECT winner_name AS name, date, id FROM matches WHERE winner_id = ?1
                    UNION ALL
                    SELECT loser_name AS name, date, id FROM matches WHERE loser_id = ?1
                 ) WHERE name IS NOT NULL ORDER BY date DESC, id DESC LIMIT 1",
                params![player.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    fn row_to_match(row: &rusqlite::Row) -> rusqlite::Result<MatchRecord> {
        let date_str: String = row.get(2)?;
        let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let surface: String = row.get(4)?;
        let level: String = row.get(5)?;

        Ok(MatchRecord {
            tourney_id: row.get(0)?,
            tourney_name: row.get(1)?,
            date,
            match_num: row.get(3)?,
            surface: Surface::from_name(&surface),
            level: TourneyLevel::from_code(&level),
            winner: PlayerId(row.get(6)?),
            winner_name: row.get(7)?,
            loser: PlayerId(row.get(8)?),
            loser_name: row.get(9)?,
            winner_stats: Self::row_to_stats(row, 10)?,
            loser_stats: Self::row_to_stats(row, 19)?,
        })
    }

    fn row_to_stats(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<ServeStats> {
        Ok(ServeStats {
            aces: row.get(offset)?,
            double_faults: row.get(offset + 1)?,
            serve_points: row.get(offset + 2)?,
            first_in: row.get(offset + 3)?,
            first_won: row.get(offset + 4)?,
            second_won: row.get(offset + 5)?,
            service_games: row.get(offset + 6)?,
            bp_saved: row.get(offset + 7)?,
            bp_faced: row.get(offset + 8)?,
        })
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let match_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))?;

        let player_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM (
                SELECT winner_id FROM matches UNION SELECT loser_id FROM matches
             )",
            [],
            |row| row.get(0),
        )?;

        let (min_date, max_date, max_id): (Option<String>, Option<String>, Option<i64>) =
            self.conn.query_row(
                "SELECT MIN(date), MAX(date), MAX(id) FROM matches",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        Ok(DatabaseStats {
            match_count: match_count as usize,
            player_count: player_count as usize,
            earliest_match: min_date.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            latest_match: max_date.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            max_row_id: max_id.unwrap_or(0),
        })
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub match_count: usize,
    pub player_count: usize,
    pub earliest_match: Option<NaiveDate>,
    pub latest_match: Option<NaiveDate>,
    pub max_row_id: i64,
}

impl DatabaseStats {
    /// Identifies the stored match history; changes whenever matches are added
    pub fn fingerprint(&self) -> String {
        let latest = self
            .latest_match
            .map(|d| d.format("%Y%m%d").to_string())
            .unwrap_or_else(|| "none".to_string());
        format!("matches={};latest={};rowid={}", self.match_count, latest, self.max_row_id)
    }
}
