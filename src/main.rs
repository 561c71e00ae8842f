// src/main.rs
mod boxscore;
mod config;
mod fetch;
mod identity;
mod join;
mod odds;
mod pipeline;
mod records;
mod storage;
mod utils;

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::Parser;
use config::{AppConfig, DEFAULT_CONFIG_PATH};
use identity::MatchPolicy;
use pipeline::Pipeline;
use utils::error::ParseError;
use utils::AppError;

/// Command Line Interface for the MLB box-score and odds collector
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Last date to collect (YYYY-MM-DD, default: today)
    #[arg(long)]
    date: Option<String>,

    /// Number of days to collect, ending at --date (overrides config)
    #[arg(long)]
    days_back: Option<u32>,

    /// Process a single box-score URL instead of a date range
    #[arg(short, long)]
    game_url: Option<String>,

    /// Parse a saved box-score page instead of fetching
    #[arg(long, conflicts_with = "game_url")]
    html_file: Option<PathBuf>,

    /// Read odds from a saved API response instead of calling the API
    #[arg(long, requires = "html_file")]
    odds_file: Option<PathBuf>,

    /// Output directory for exported files (overrides config)
    #[arg(short, long)]
    output_dir: Option<String>,

    /// Debug mode - save raw pages and annotated HTML copies
    #[arg(short, long)]
    debug: bool,

    /// Only treat team names as equal after exact canonical match
    #[arg(long)]
    exact_team_match: bool,
}

fn parse_cli_date(text: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| ParseError::InvalidDate(text.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Parse CLI Arguments and set up logging (reads RUST_LOG env var)
    let args = Args::parse();
    utils::logging::setup_logging(args.debug);
    tracing::info!("Starting processing for args: {:?}", args);

    // 2. Load configuration and apply command-line overrides
    let mut config = AppConfig::load(&args.config)?;
    if let Some(dir) = &args.output_dir {
        config.export.output_dir = dir.clone();
    }
    if let Some(days) = args.days_back {
        config.pipeline.days_back = days;
    }
    if args.exact_team_match {
        config.teams.match_policy = MatchPolicy::Exact;
    }
    let date = args.date.as_deref().map(parse_cli_date).transpose()?;

    // 3. Initialize pipeline (storage, HTTP client, resolver)
    let pipeline = Pipeline::new(config.clone(), args.debug)?;

    // 4. Dispatch on mode
    let summary = if let Some(html_file) = &args.html_file {
        tracing::info!("Parsing saved page {}", html_file.display());
        pipeline.run_offline(html_file, args.odds_file.as_deref(), date)?
    } else if let Some(url) = &args.game_url {
        tracing::info!("Processing single game: {}", url);
        pipeline.run_single(url, date).await?
    } else {
        let end_date = date.unwrap_or_else(|| Local::now().date_naive());
        tracing::info!(
            "Processing {} day(s) ending {}",
            config.pipeline.days_back,
            end_date
        );
        pipeline.run_range(end_date, config.pipeline.days_back).await?
    };

    tracing::info!(
        "Done: {} of {} games parsed ({} failed), {} composite games, {} files written to {}",
        summary.games_parsed,
        summary.games_found,
        summary.games_failed,
        summary.composite_games,
        summary.files_written,
        config.export.output_dir
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_dates_are_validated() {
        assert_eq!(parse_cli_date("2023-07-15").unwrap(), NaiveDate::from_ymd_opt(2023, 7, 15).unwrap());
        assert!(matches!(parse_cli_date("07/15/2023"), Err(ParseError::InvalidDate(_))));
    }

    #[test]
    fn args_parse_offline_mode() {
        let args = Args::try_parse_from(["mlb_boxscore", "--html-file", "page.html", "--odds-file", "odds.json", "--exact-team-match"])
            .unwrap();
        assert_eq!(args.html_file, Some(PathBuf::from("page.html")));
        assert!(args.exact_team_match);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));

        assert!(Args::try_parse_from(["mlb_boxscore", "--odds-file", "odds.json"]).is_err());
    }
}
