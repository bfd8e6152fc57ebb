//! Cleaning of raw match rows
//!
//! Raw rows use the source column names and every field is optional. Cleaning
//! fills and clips the serve counters, drops rows that cannot identify a
//! match, and removes duplicates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::{
    MatchRecord, PlayerId, Result, ServeStats, Surface, TennisError, TourneyLevel,
};

/// Tournament date as it appears in the source: `20240115` or `"20240115"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDate {
    Number(i64),
    Text(String),
}

impl RawDate {
    pub fn parse(&self) -> Option<NaiveDate> {
        let text = match self {
            RawDate::Number(n) => n.to_string(),
            RawDate::Text(s) => s.trim().to_string(),
        };
        NaiveDate::parse_from_str(&text, "%Y%m%d")
            .or_else(|_| NaiveDate::parse_from_str(&text, "%Y-%m-%d"))
            .ok()
    }
}

/// One uncleaned match row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMatch {
    pub tourney_id: Option<String>,
    pub tourney_name: Option<String>,
    pub surface: Option<String>,
    pub tourney_level: Option<String>,
    pub tourney_date: Option<RawDate>,
    pub match_num: Option<u32>,
    pub winner_id: Option<i64>,
    pub winner_name: Option<String>,
    pub loser_id: Option<i64>,
    pub loser_name: Option<String>,

    pub w_ace: Option<f64>,
    pub w_df: Option<f64>,
    pub w_svpt: Option<f64>,
    #[serde(rename = "w_1stIn")]
    pub w_first_in: Option<f64>,
    #[serde(rename = "w_1stWon")]
    pub w_first_won: Option<f64>,
    #[serde(rename = "w_2ndWon")]
    pub w_second_won: Option<f64>,
    #[serde(rename = "w_SvGms")]
    pub w_service_games: Option<f64>,
    #[serde(rename = "w_bpSaved")]
    pub w_bp_saved: Option<f64>,
    #[serde(rename = "w_bpFaced")]
    pub w_bp_faced: Option<f64>,

    pub l_ace: Option<f64>,
    pub l_df: Option<f64>,
    pub l_svpt: Option<f64>,
    #[serde(rename = "l_1stIn")]
    pub l_first_in: Option<f64>,
    #[serde(rename = "l_1stWon")]
    pub l_first_won: Option<f64>,
    #[serde(rename = "l_2ndWon")]
    pub l_second_won: Option<f64>,
    #[serde(rename = "l_SvGms")]
    pub l_service_games: Option<f64>,
    #[serde(rename = "l_bpSaved")]
    pub l_bp_saved: Option<f64>,
    #[serde(rename = "l_bpFaced")]
    pub l_bp_faced: Option<f64>,
}

/// Serve counter columns of a raw row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatColumn {
    WAce,
    WDf,
    WSvpt,
    WFirstIn,
    WFirstWon,
    WSecondWon,
    WServiceGames,
    WBpSaved,
    WBpFaced,
    LAce,
    LDf,
    LSvpt,
    LFirstIn,
    LFirstWon,
    LSecondWon,
    LServiceGames,
    LBpSaved,
    LBpFaced,
}

impl StatColumn {
    const ALL: [StatColumn; 18] = [
        StatColumn::WAce,
        StatColumn::WDf,
        StatColumn::WSvpt,
        StatColumn::WFirstIn,
        StatColumn::WFirstWon,
        StatColumn::WSecondWon,
        StatColumn::WServiceGames,
        StatColumn::WBpSaved,
        StatColumn::WBpFaced,
        StatColumn::LAce,
        StatColumn::LDf,
        StatColumn::LSvpt,
        StatColumn::LFirstIn,
        StatColumn::LFirstWon,
        StatColumn::LSecondWon,
        StatColumn::LServiceGames,
        StatColumn::LBpSaved,
        StatColumn::LBpFaced,
    ];

    /// Columns whose extreme values are replaced by the median
    fn clip_outliers(&self) -> bool {
        matches!(
            self,
            StatColumn::WAce
                | StatColumn::WDf
                | StatColumn::WSvpt
                | StatColumn::LAce
                | StatColumn::LDf
                | StatColumn::LSvpt
        )
    }

    fn slot<'a>(&self, raw: &'a mut RawMatch) -> &'a mut Option<f64> {
        match self {
            StatColumn::WAce => &mut raw.w_ace,
            StatColumn::WDf => &mut raw.w_df,
            StatColumn::WSvpt => &mut raw.w_svpt,
            StatColumn::WFirstIn => &mut raw.w_first_in,
            StatColumn::WFirstWon => &mut raw.w_first_won,
            StatColumn::WSecondWon => &mut raw.w_second_won,
            StatColumn::WServiceGames => &mut raw.w_service_games,
            StatColumn::WBpSaved => &mut raw.w_bp_saved,
            StatColumn::WBpFaced => &mut raw.w_bp_faced,
            StatColumn::LAce => &mut raw.l_ace,
            StatColumn::LDf => &mut raw.l_df,
            StatColumn::LSvpt => &mut raw.l_svpt,
            StatColumn::LFirstIn => &mut raw.l_first_in,
            StatColumn::LFirstWon => &mut raw.l_first_won,
            StatColumn::LSecondWon => &mut raw.l_second_won,
            StatColumn::LServiceGames => &mut raw.l_service_games,
            StatColumn::LBpSaved => &mut raw.l_bp_saved,
            StatColumn::LBpFaced => &mut raw.l_bp_faced,
        }
    }
}

/// Linear-interpolated quantile of sorted values
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

fn sorted_values(rows: &mut [RawMatch], column: StatColumn) -> Vec<f64> {
    let mut values: Vec<f64> = rows
        .iter_mut()
        .filter_map(|row| *column.slot(row))
        .filter(|v| v.is_finite())
        .collect();
    values.sort_by(f64::total_cmp);
    values
}

/// Fill, clip and de-outlier one serve counter column in place
fn clean_column(rows: &mut [RawMatch], column: StatColumn) {
    let median = quantile(&sorted_values(rows, column), 0.5).unwrap_or(0.0);
    for row in rows.iter_mut() {
        let slot = column.slot(row);
        let value = slot.filter(|v| v.is_finite()).unwrap_or(median);
        *slot = Some(value.max(0.0));
    }

    if column.clip_outliers() {
        let values = sorted_values(rows, column);
        if let (Some(upper), Some(median)) = (quantile(&values, 0.99), quantile(&values, 0.5)) {
            for row in rows.iter_mut() {
                let slot = column.slot(row);
                if slot.map_or(false, |v| v > upper) {
                    *slot = Some(median);
                }
            }
        }
    }
}

fn counter(value: Option<f64>) -> u32 {
    value.map_or(0, |v| v.round().max(0.0) as u32)
}

impl RawMatch {
    fn winner_stats(&self) -> ServeStats {
        ServeStats {
            aces: counter(self.w_ace),
            double_faults: counter(self.w_df),
            serve_points: counter(self.w_svpt),
            first_in: counter(self.w_first_in),
            first_won: counter(self.w_first_won),
            second_won: counter(self.w_second_won),
            service_games: counter(self.w_service_games),
            bp_saved: counter(self.w_bp_saved),
            bp_faced: counter(self.w_bp_faced),
        }
    }

    fn loser_stats(&self) -> ServeStats {
        ServeStats {
            aces: counter(self.l_ace),
            double_faults: counter(self.l_df),
            serve_points: counter(self.l_svpt),
            first_in: counter(self.l_first_in),
            first_won: counter(self.l_first_won),
            second_won: counter(self.l_second_won),
            service_games: counter(self.l_service_games),
            bp_saved: counter(self.l_bp_saved),
            bp_faced: counter(self.l_bp_faced),
        }
    }

    /// Convert into a match record, rejecting rows without identifying fields
    pub fn into_record(self, row: usize) -> Result<MatchRecord> {
        let missing = |field: &'static str| TennisError::MissingField {
            field,
            context: format!("row {}", row),
        };

        let tourney_id = self
            .tourney_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| missing("tourney_id"))?;
        let winner = self.winner_id.map(PlayerId).ok_or_else(|| missing("winner_id"))?;
        let loser = self.loser_id.map(PlayerId).ok_or_else(|| missing("loser_id"))?;
        let raw_date = self.tourney_date.as_ref().ok_or_else(|| missing("tourney_date"))?;
        let date = raw_date.parse().ok_or_else(|| {
            TennisError::Parse(format!("row {}: invalid tourney_date {:?}", row, raw_date))
        })?;

        let record = MatchRecord {
            tourney_id,
            tourney_name: self.tourney_name.clone().unwrap_or_else(|| "Unknown".to_string()),
            date,
            match_num: self.match_num.unwrap_or(0),
            surface: self.surface.as_deref().map_or(Surface::Unknown, Surface::from_name),
            level: self
                .tourney_level
                .as_deref()
                .map_or(TourneyLevel::Other, TourneyLevel::from_code),
            winner,
            loser,
            winner_stats: self.winner_stats(),
            loser_stats: self.loser_stats(),
            winner_name: self.winner_name,
            loser_name: self.loser_name,
        };
        record.validate()?;
        Ok(record)
    }
}

/// Row counts from a cleaning pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleaningSummary {
    pub initial_rows: usize,
    pub missing_fields: usize,
    pub invalid_dates: usize,
    pub invalid_records: usize,
    pub duplicates: usize,
    pub final_rows: usize,
}

impl CleaningSummary {
    pub fn rows_removed(&self) -> usize {
        self.initial_rows - self.final_rows
    }

    pub fn retained_pct(&self) -> f64 {
        if self.initial_rows == 0 {
            0.0
        } else {
            self.final_rows as f64 / self.initial_rows as f64 * 100.0
        }
    }
}

/// Clean raw rows into match records
pub fn clean_matches(mut rows: Vec<RawMatch>) -> (Vec<MatchRecord>, CleaningSummary) {
    let mut summary = CleaningSummary {
        initial_rows: rows.len(),
        ..CleaningSummary::default()
    };

    for column in StatColumn::ALL {
        clean_column(&mut rows, column);
    }

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        let record = match row.into_record(i) {
            Ok(record) => record,
            Err(e) => {
                log::debug!("Dropping {}", e);
                match e {
                    TennisError::MissingField { .. } => summary.missing_fields += 1,
                    TennisError::Parse(_) => summary.invalid_dates += 1,
                    _ => summary.invalid_records += 1,
                }
                continue;
            }
        };

        let key = (
            record.tourney_id.clone(),
            record.tourney_name.clone(),
            record.date,
            record.match_num,
            record.winner,
            record.loser,
        );
        if !seen.insert(key) {
            summary.duplicates += 1;
            continue;
        }
        records.push(record);
    }

    summary.final_rows = records.len();
    log::info!(
        "Cleaned {} rows: {} kept ({:.2}%), {} missing fields, {} invalid dates, {} invalid, {} duplicates",
        summary.initial_rows,
        summary.final_rows,
        summary.retained_pct(),
        summary.missing_fields,
        summary.invalid_dates,
        summary.invalid_records,
        summary.duplicates
    );
    (records, summary)
}

/// Read a JSON array of raw match rows
pub fn read_raw_matches<P: AsRef<Path>>(path: P) -> Result<Vec<RawMatch>> {
    let file = File::open(path.as_ref())?;
    let rows = serde_json::from_reader(BufReader::new(file))?;
    Ok(rows)
}
