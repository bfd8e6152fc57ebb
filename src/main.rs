//! Tennis feature engineering CLI
//!
//! Imports match data and builds the feature tables used by the match outcome model.

use clap::{Parser, Subcommand};
use tennis::{Config, Result};

#[derive(Parser)]
#[command(name = "tennis")]
#[command(about = "Feature engineering for tennis match prediction", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Data management commands
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Feature table commands
    Features {
        #[command(subcommand)]
        action: FeatureCommands,
    },
    /// Compare two players
    Matchup {
        /// First player ID
        player_a: i64,
        /// Second player ID
        player_b: i64,
    },
    /// Initialize a new project with default config
    Init,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Clean and import matches from a JSON file
    Import {
        /// JSON array of match rows
        file: String,
    },
    /// Show database status
    Status,
}

#[derive(Subcommand)]
enum FeatureCommands {
    /// Build feature tables, loading fresh ones from the store
    Build {
        /// Recompute even if a stored table is fresh
        #[arg(long)]
        force: bool,
        /// Only build one feature set (head_to_head, career_stats, recent_stats, rolling_stats)
        #[arg(long)]
        only: Option<String>,
    },
    /// List stored feature tables
    List,
    /// Print rows of a stored feature table
    Show {
        /// Feature set name
        set: String,
        /// Only rows for this player
        #[arg(long)]
        player: Option<i64>,
        /// Maximum rows to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    // Run command
    let result = match cli.command {
        Commands::Data { action } => match action {
            DataCommands::Import { file } => commands::data_import(&config, &file),
            DataCommands::Status => commands::data_status(&config),
        },
        Commands::Features { action } => match action {
            FeatureCommands::Build { force, only } => commands::features_build(&config, force, only),
            FeatureCommands::List => commands::features_list(&config),
            FeatureCommands::Show { set, player, limit } => {
                commands::features_show(&config, &set, player, limit)
            }
        },
        Commands::Matchup { player_a, player_b } => commands::matchup(&config, player_a, player_b),
        Commands::Init => commands::init(&cli.config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use tennis::data::cleaning::{clean_matches, read_raw_matches};
    use tennis::data::Database;
    use tennis::features::head_to_head::lookup;
    use tennis::features::{
        CacheOutcome, CareerStatsRow, FeaturePipeline, FeatureRow, FeatureSet, FeatureStore,
        FeatureTable, HeadToHeadRow, RecentStatsRow, RollingStatsRow,
    };
    use tennis::{PlayerId, TennisError};

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        if let Some(parent) = std::path::Path::new(&config.data.database_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::create_dir_all(&config.data.feature_store_dir)?;
        println!("Created {} directory", config.data.feature_store_dir);

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'tennis data import <matches.json>' to load match data");
        println!("  3. Run 'tennis features build' to compute feature tables");
        println!("  4. Run 'tennis matchup <ID> <ID>' to compare two players");

        Ok(())
    }

    pub fn data_import(config: &Config, file: &str) -> Result<()> {
        let mut db = Database::open(&config.data.database_path)?;

        println!("Reading matches from {}...", file);
        let raw = read_raw_matches(file)?;
        let (records, summary) = clean_matches(raw);

        println!("Cleaning Summary");
        println!("───────────────────────────────");
        println!("  Initial rows:    {}", summary.initial_rows);
        println!("  Missing fields:  {}", summary.missing_fields);
        println!("  Invalid dates:   {}", summary.invalid_dates);
        println!("  Invalid records: {}", summary.invalid_records);
        println!("  Duplicates:      {}", summary.duplicates);
        println!(
            "  Final rows:      {} ({:.2}% retained)",
            summary.final_rows,
            summary.retained_pct()
        );

        let inserted = db.insert_matches(&records)?;
        println!(
            "\nStored {} new matches ({} already present)",
            inserted,
            records.len() - inserted
        );
        Ok(())
    }

    pub fn data_status(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let stats = db.get_stats()?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:     {}", config.data.database_path);
        println!("  Players:  {}", stats.player_count);
        println!("  Matches:  {}", stats.match_count);
        if let (Some(earliest), Some(latest)) = (stats.earliest_match, stats.latest_match) {
            println!("  Range:    {} to {}", earliest, latest);
        }

        Ok(())
    }

    fn open_pipeline<'a>(
        config: &Config,
        store: &'a FeatureStore,
    ) -> Result<(FeaturePipeline<'a>, Vec<tennis::MatchRecord>)> {
        let db = Database::open(&config.data.database_path)?;
        let stats = db.get_stats()?;
        let matches = db.get_all_matches()?;
        log::info!("Loaded {} matches from {}", matches.len(), config.data.database_path);

        let pipeline = FeaturePipeline::new(store, &config.features).with_fingerprint(stats.fingerprint());
        Ok((pipeline, matches))
    }

    pub fn features_build(config: &Config, force: bool, only: Option<String>) -> Result<()> {
        let store = FeatureStore::open(&config.data.feature_store_dir)?;
        let (pipeline, matches) = open_pipeline(config, &store)?;

        let reports = match only {
            Some(name) => {
                let set = FeatureSet::from_name(&name)?;
                vec![pipeline.build_one(set, &matches, force)?]
            }
            None => pipeline.build_all(&matches, force)?.1,
        };

        println!("\nFeature Build");
        println!("───────────────────────────────────────────");
        println!("  {:<16} {:>10}  {}", "Set", "Rows", "Source");
        for report in &reports {
            let source = match report.outcome {
                CacheOutcome::Loaded => "cached",
                CacheOutcome::Built => "built",
            };
            println!("  {:<16} {:>10}  {}", report.set.name(), report.rows, source);
        }
        println!("\nStored in {}", config.data.feature_store_dir);
        Ok(())
    }

    pub fn features_list(config: &Config) -> Result<()> {
        let store = FeatureStore::open(&config.data.feature_store_dir)?;
        let tables = store.list()?;

        if tables.is_empty() {
            println!("No feature tables stored. Run 'tennis features build' first.");
            return Ok(());
        }

        println!("{:<16} {:>8} {:>10}  {}", "Name", "Version", "Rows", "Built");
        println!("{}", "─".repeat(64));
        for table in tables {
            println!(
                "{:<16} {:>8} {:>10}  {}",
                table.name, table.schema_version, table.row_count, table.built_at
            );
        }
        Ok(())
    }

    pub fn features_show(
        config: &Config,
        set: &str,
        player: Option<i64>,
        limit: usize,
    ) -> Result<()> {
        let store = FeatureStore::open(&config.data.feature_store_dir)?;
        let set = FeatureSet::from_name(set)?;
        let player = player.map(PlayerId);

        match set {
            FeatureSet::HeadToHead => show_table::<HeadToHeadRow>(&store, set, player, limit),
            FeatureSet::Career => show_table::<CareerStatsRow>(&store, set, player, limit),
            FeatureSet::Recent => show_table::<RecentStatsRow>(&store, set, player, limit),
            FeatureSet::Rolling => show_table::<RollingStatsRow>(&store, set, player, limit),
        }
    }

    fn show_table<R: FeatureRow>(
        store: &FeatureStore,
        set: FeatureSet,
        player: Option<PlayerId>,
        limit: usize,
    ) -> Result<()> {
        let table: FeatureTable<R> = match store.load(set.name())? {
            Some(table) => table,
            None => {
                println!("Feature table {} not built. Run 'tennis features build'.", set);
                return Ok(());
            }
        };

        let rows: Vec<&R> = match player {
            Some(player) => table.rows_for(player).collect(),
            None => table.rows.iter().collect(),
        };

        println!(
            "{} ({} of {} rows, built {})",
            table.name,
            rows.len().min(limit),
            rows.len(),
            table.built_at.format("%Y-%m-%d %H:%M:%S")
        );
        for row in rows.into_iter().take(limit) {
            println!("\n{}", row.key());
            for (column, value) in row.values() {
                println!("  {:<32} {:>10.4}", column, value);
            }
        }
        Ok(())
    }

    pub fn matchup(config: &Config, player_a: i64, player_b: i64) -> Result<()> {
        let (a, b) = (PlayerId(player_a), PlayerId(player_b));
        let store = FeatureStore::open(&config.data.feature_store_dir)?;
        let (pipeline, matches) = open_pipeline(config, &store)?;
        let (sets, _) = pipeline.build_all(&matches, false)?;

        let career_a = find_player(&sets.career.rows, a)?;
        let career_b = find_player(&sets.career.rows, b)?;

        let db = Database::open(&config.data.database_path)?;
        let name_a = db.player_name(a)?.unwrap_or_else(|| a.to_string());
        let name_b = db.player_name(b)?.unwrap_or_else(|| b.to_string());

        println!("\n{} vs {}", name_a, name_b);
        println!("═══════════════════════════════════════════");

        println!("\nHead to head");
        match lookup(&sets.head_to_head.rows, a, b) {
            Some(row) => {
                for (player, name) in [(a, &name_a), (b, &name_b)] {
                    if let Some((wins, losses, pct)) = row.perspective(player) {
                        println!("  {:<24} {}-{} ({:.1}%)", name, wins, losses, pct * 100.0);
                    }
                }
            }
            None => println!("  No previous meetings"),
        }

        let meetings: Vec<_> = db
            .get_player_matches(a)?
            .into_iter()
            .filter(|m| m.opponent(a) == Some(b))
            .collect();
        for meeting in meetings.iter().rev().take(5) {
            let winner = if meeting.winner == a { &name_a } else { &name_b };
            println!(
                "    {}  {:<24} {:<8} won by {}",
                meeting.date, meeting.tourney_name, meeting.surface.name(), winner
            );
        }

        println!("\n{:<24} {:>12} {:>12}", "Career", name_a, name_b);
        let career_lines: [(&str, fn(&CareerStatsRow) -> f32); 6] = [
            ("Win rate", |r| r.win_rate),
            ("Hard", |r| r.hard_win_rate),
            ("Clay", |r| r.clay_win_rate),
            ("Grass", |r| r.grass_win_rate),
            ("Grand Slam", |r| r.grand_slam_win_rate),
            ("Masters", |r| r.masters_win_rate),
        ];
        println!(
            "  {:<22} {:>12} {:>12}",
            "Matches", career_a.matches_played, career_b.matches_played
        );
        for (label, value) in career_lines {
            println!(
                "  {:<22} {:>11.1}% {:>11.1}%",
                label,
                value(career_a) * 100.0,
                value(career_b) * 100.0
            );
        }

        let recent_a = sets.recent.rows.iter().find(|r| r.player_id == a);
        let recent_b = sets.recent.rows.iter().find(|r| r.player_id == b);
        if let (Some(ra), Some(rb)) = (recent_a, recent_b) {
            println!("\n{:<24} {:>12} {:>12}", "Recent form", name_a, name_b);
            println!(
                "  {:<22} {:>11.1}% {:>11.1}%",
                format!("Last {} matches", config.features.recent_matches),
                ra.recent.win_rate * 100.0,
                rb.recent.win_rate * 100.0
            );
            println!(
                "  {:<22} {:>12} {:>12}",
                "Last match", ra.last_match_date, rb.last_match_date
            );
            for (player, row) in [(&name_a, ra), (&name_b, rb)] {
                if !row.is_reliable(config.features.min_matches) {
                    println!(
                        "  Note: {} has only {} recent matches",
                        player, row.recent.matches
                    );
                }
            }
        }

        Ok(())
    }

    fn find_player(rows: &[CareerStatsRow], player: PlayerId) -> Result<&CareerStatsRow> {
        rows.iter()
            .find(|r| r.player_id == player)
            .ok_or(TennisError::PlayerNotFound(player))
    }
}
