// src/pipeline.rs
use std::fs;
use std::path::Path;

use chrono::{Days, NaiveDate};

use crate::boxscore::{parse_schedule, BoxScore, BoxScoreParser, GameSummary, NumericFields};
use crate::config::{AppConfig, ExportFormat};
use crate::fetch::{stamp_scraped_at, Fetcher};
use crate::identity::TeamResolver;
use crate::join::{dedup_odds, join_all};
use crate::odds::{normalize_odds, parse_events};
use crate::records::{GameInfoRecord, LineupRecord, OddsRecord, StatRecord};
use crate::storage::StorageManager;
use crate::utils::error::AppError;
use crate::utils::html_debug::{create_debug_html, BOX_SCORE_DEBUG_PATTERNS};

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub dates_processed: usize,
    pub games_found: usize,
    pub games_parsed: usize,
    pub games_failed: usize,
    pub batting_records: usize,
    pub pitching_records: usize,
    pub lineup_records: usize,
    pub odds_records: usize,
    pub composite_games: usize,
    pub files_written: usize,
}

// Per-category records accumulated over one run.
#[derive(Debug, Default)]
struct Collected {
    schedule: Vec<GameSummary>,
    batting: Vec<StatRecord>,
    pitching: Vec<StatRecord>,
    lineup: Vec<LineupRecord>,
    game_info: Vec<GameInfoRecord>,
    odds: Vec<OddsRecord>,
}

impl Collected {
    fn absorb(&mut self, box_score: BoxScore) {
        self.batting.extend(box_score.batting);
        self.pitching.extend(box_score.pitching);
        self.lineup.extend(box_score.lineup);
        self.game_info.push(box_score.game_info);
    }
}

/// Schedule -> box scores -> odds -> join -> export.
pub struct Pipeline {
    config: AppConfig,
    resolver: TeamResolver,
    numeric: NumericFields,
    storage: StorageManager,
    fetcher: Fetcher,
    debug: bool,
}

impl Pipeline {
    pub fn new(config: AppConfig, debug: bool) -> Result<Self, AppError> {
        let storage = StorageManager::new(&config.export.output_dir)?;
        let fetcher = Fetcher::new(&config.scraping, &config.odds_api)?;
        Ok(Self {
            resolver: config.resolver(),
            numeric: config.numeric_fields(),
            storage,
            fetcher,
            config,
            debug,
        })
    }

    fn parser(&self) -> BoxScoreParser<'_> {
        BoxScoreParser::new(&self.resolver, &self.numeric)
    }

    /// Processes every game from `days_back` days up to and including `end_date`.
    pub async fn run_range(&self, end_date: NaiveDate, days_back: u32) -> Result<RunSummary, AppError> {
        let mut summary = RunSummary::default();
        let mut collected = Collected::default();
        let run_date = iso(end_date);

        for offset in (0..days_back.max(1)).rev() {
            let Some(date) = end_date.checked_sub_days(Days::new(u64::from(offset))) else {
                continue;
            };
            self.process_date(date, &run_date, &mut collected, &mut summary).await;
            self.collect_odds(date, &mut collected).await;
            summary.dates_processed += 1;
        }

        if self.config.pipeline.fetch_upcoming_odds {
            for ahead in 1..=self.config.pipeline.days_forward {
                if let Some(date) = end_date.checked_add_days(Days::new(u64::from(ahead))) {
                    self.collect_odds(date, &mut collected).await;
                }
            }
        }

        self.finish(&run_date, collected, summary)
    }

    /// Processes one box-score URL.
    pub async fn run_single(&self, url: &str, fallback_date: Option<NaiveDate>) -> Result<RunSummary, AppError> {
        let mut summary = RunSummary {
            games_found: 1,
            ..RunSummary::default()
        };
        let mut collected = Collected::default();

        let html = self.fetcher.fetch_html(url).await?;
        let fallback = fallback_date.map(iso);
        let box_score = self.parser().parse(&html, Some(url), fallback.as_deref());
        let run_date = box_score
            .game_info
            .game_date
            .clone()
            .or(fallback)
            .unwrap_or_else(|| "undated".to_string());
        self.save_debug_artifacts(&run_date, url, &html);
        summary.games_parsed = 1;

        if let Some(date) = parse_iso(&run_date) {
            self.collect_odds(date, &mut collected).await;
        }
        collected.absorb(box_score);
        self.finish(&run_date, collected, summary)
    }

    /// Parses a saved box-score page and, optionally, a saved odds payload
    /// without touching the network.
    pub fn run_offline(
        &self,
        html_path: &Path,
        odds_path: Option<&Path>,
        fallback_date: Option<NaiveDate>,
    ) -> Result<RunSummary, AppError> {
        let mut summary = RunSummary {
            games_found: 1,
            ..RunSummary::default()
        };
        let mut collected = Collected::default();

        let html = fs::read_to_string(html_path)?;
        let name = html_path.to_string_lossy();
        let fallback = fallback_date.map(iso);
        let box_score = self.parser().parse(&html, Some(name.as_ref()), fallback.as_deref());
        let run_date = box_score
            .game_info
            .game_date
            .clone()
            .or(fallback)
            .unwrap_or_else(|| "undated".to_string());
        self.save_debug_artifacts(&run_date, &name, &html);
        summary.games_parsed = 1;

        if let (Some(path), Some(date)) = (odds_path, parse_iso(&run_date)) {
            let text = fs::read_to_string(path)?;
            let events = parse_events(&text)
                .map_err(|e| AppError::Processing(format!("Invalid odds file {}: {}", path.display(), e)))?;
            let mut odds = normalize_odds(&events, date, &self.resolver, self.config.odds_api.day_tolerance);
            stamp_scraped_at(&mut odds);
            collected.odds.extend(odds);
        }

        collected.absorb(box_score);
        self.finish(&run_date, collected, summary)
    }

    async fn process_date(&self, date: NaiveDate, run_date: &str, collected: &mut Collected, summary: &mut RunSummary) {
        let base = self.config.scraping.base_url.trim_end_matches('/');
        let url = format!(
            "{}/boxes/?year={}&month={}&day={}",
            base,
            date.format("%Y"),
            date.format("%-m"),
            date.format("%-d")
        );

        let html = match self.fetcher.fetch_html(&url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Could not fetch schedule for {}: {}", date, e);
                return;
            }
        };
        let games = {
            let document = scraper::Html::parse_document(&html);
            parse_schedule(&document, &iso(date), base)
        };
        summary.games_found += games.len();

        for game in &games {
            match self.fetcher.fetch_html(&game.url).await {
                Ok(page) => {
                    let box_score = self.parser().parse(&page, Some(game.url.as_str()), Some(game.date.as_str()));
                    if box_score.record_count() == 0 {
                        tracing::warn!("No player records parsed from {}", game.url);
                    }
                    self.save_debug_artifacts(run_date, &game.url, &page);
                    collected.absorb(box_score);
                    summary.games_parsed += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to fetch box score {}: {}", game.url, e);
                    summary.games_failed += 1;
                }
            }
        }
        collected.schedule.extend(games);
    }

    async fn collect_odds(&self, date: NaiveDate, collected: &mut Collected) {
        if !self.fetcher.has_odds_key() {
            tracing::warn!("No odds API key configured; skipping odds for {}", date);
            return;
        }
        match self.fetcher.fetch_odds(date).await {
            Ok(events) => {
                let mut odds = normalize_odds(&events, date, &self.resolver, self.config.odds_api.day_tolerance);
                stamp_scraped_at(&mut odds);
                collected.odds.extend(odds);
            }
            Err(e) => tracing::error!("Could not fetch odds for {}: {}", date, e),
        }
    }

    // Failures here never abort the run.
    fn save_debug_artifacts(&self, run_date: &str, source: &str, html: &str) {
        if !self.debug {
            return;
        }
        let stem = page_stem(source);
        match self.storage.save_raw_page(run_date, &format!("{}.html", stem), html) {
            Ok(raw_path) => {
                let annotated = raw_path.with_file_name(format!("{}_debug.html", stem));
                match create_debug_html(html, &annotated, BOX_SCORE_DEBUG_PATTERNS) {
                    Ok(count) => tracing::debug!("Annotated {} markers in {}", count, annotated.display()),
                    Err(e) => tracing::warn!("Could not write debug copy of {}: {}", source, e),
                }
            }
            Err(e) => tracing::warn!("Could not save raw page {}: {}", source, e),
        }
    }

    fn finish(&self, run_date: &str, collected: Collected, mut summary: RunSummary) -> Result<RunSummary, AppError> {
        let odds = dedup_odds(&collected.odds);
        let games = join_all(
            &collected.batting,
            &collected.pitching,
            &collected.lineup,
            &collected.game_info,
            &odds,
            &self.resolver,
        );

        let formats: Vec<ExportFormat> = self.config.export.formats.clone();
        let mut written = Vec::new();
        written.extend(self.storage.save_category(run_date, "scores", &collected.schedule, &formats)?);
        written.extend(self.storage.save_category(run_date, "batting", &collected.batting, &formats)?);
        written.extend(self.storage.save_category(run_date, "pitching", &collected.pitching, &formats)?);
        written.extend(self.storage.save_category(run_date, "lineup", &collected.lineup, &formats)?);
        written.extend(self.storage.save_category(run_date, "game_info", &collected.game_info, &formats)?);
        written.extend(self.storage.save_category(run_date, "odds", &odds, &formats)?);
        written.push(self.storage.save_games(run_date, &games)?);

        summary.batting_records = collected.batting.len();
        summary.pitching_records = collected.pitching.len();
        summary.lineup_records = collected.lineup.len();
        summary.odds_records = odds.len();
        summary.composite_games = games.len();
        summary.files_written = written.len();

        tracing::info!("Run {} complete: {:?}", run_date, summary);
        Ok(summary)
    }
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_iso(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

// "https://.../boxes/NYA/NYA202307150.shtml" -> "NYA202307150"
fn page_stem(source: &str) -> String {
    let last = source
        .trim_end_matches('/')
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(source);
    let stem = last.split('.').next().unwrap_or(last);
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "page".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body><div id="content">
      <div class="scorebox">
        <div><div><strong><a href="/teams/BOS/2023.shtml">Boston Red Sox</a></strong></div><div class="score">3</div></div>
        <div><div><strong><a href="/teams/NYY/2023.shtml">New York Yankees</a></strong></div><div class="score">5</div></div>
        <div class="scorebox_meta"><div>Saturday, July 15, 2023</div><div>Venue: Yankee Stadium III</div></div>
      </div>
      <div id="all_BostonRedSoxbatting"><!--
        <table class="sortable stats_table" id="BostonRedSoxbatting">
          <thead><tr><th data-stat="player">Batting</th><th data-stat="AB">AB</th></tr></thead>
          <tbody><tr><th data-stat="player"><a href="/players/d/deverra01.shtml">Rafael Devers</a> 3B</th><td data-stat="AB">4</td></tr></tbody>
        </table>
      --></div>
    </div></body></html>"#;

    const ODDS: &str = r#"[{"id": "evt1", "commence_time": "2023-07-15T23:05:00Z",
        "home_team": "New York Yankees", "away_team": "Boston Red Sox",
        "bookmakers": [{"key": "draftkings", "markets": [{"key": "h2h", "outcomes": [
            {"name": "New York Yankees", "price": 1.65}, {"name": "Boston Red Sox", "price": 2.3}]}]}]}]"#;

    #[test]
    fn offline_run_joins_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let page_path = dir.path().join("NYA202307150.shtml");
        let odds_path = dir.path().join("odds.json");
        fs::write(&page_path, PAGE).unwrap();
        fs::write(&odds_path, ODDS).unwrap();

        let mut config = AppConfig::default();
        config.export.output_dir = dir.path().join("out").to_string_lossy().into_owned();
        config.scraping.delay_between_requests_ms = 0;
        let pipeline = Pipeline::new(config, true).unwrap();

        let summary = pipeline.run_offline(&page_path, Some(odds_path.as_path()), None).unwrap();
        assert_eq!(summary.games_parsed, 1);
        assert_eq!(summary.batting_records, 1);
        assert_eq!(summary.odds_records, 1);
        assert_eq!(summary.composite_games, 1);

        let run_dir = dir.path().join("out").join("2023-07-15");
        assert!(run_dir.join("batting.csv").exists());
        assert!(run_dir.join("game_info.json").exists());
        assert!(run_dir.join("odds.csv").exists());
        assert!(run_dir.join("raw").join("NYA202307150_debug.html").exists());

        let games: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(run_dir.join("games.json")).unwrap()).unwrap();
        assert_eq!(games[0]["game_info"]["winner"], "New York Yankees");
        assert_eq!(games[0]["away_batting"][0]["subject"], "Rafael Devers");
        assert_eq!(games[0]["odds"]["lines"][0]["moneyline_home"], 1.65);
    }

    #[test]
    fn page_stems_are_file_safe() {
        assert_eq!(page_stem("https://x.com/boxes/NYA/NYA202307150.shtml"), "NYA202307150");
        assert_eq!(page_stem("/tmp/saved page.html"), "saved_page");
        assert_eq!(page_stem(""), "page");
    }
}
