// src/boxscore/mod.rs
pub mod game_info;
pub mod locator;
pub mod normalizer;
pub mod schedule;

use scraper::Html;

use crate::identity::TeamResolver;
use crate::records::{GameInfoRecord, LineupRecord, StatRecord, TableKind};

pub use game_info::{game_date_from_url, parse_game_info};
pub use locator::{locate_tables};
pub use normalizer::{validate_lineup, NumericFields, SchemaNormalizer};
pub use schedule::{parse_schedule, GameSummary};

/// Everything extracted from one box-score page.
#[derive(Debug, Clone, Default)]
pub struct BoxScore {
    pub batting: Vec<StatRecord>,
    pub pitching: Vec<StatRecord>,
    pub lineup: Vec<LineupRecord>,
    pub game_info: GameInfoRecord,
}

impl BoxScore {
    pub fn record_count(&self) -> usize {
        self.batting.len() + self.pitching.len() + self.lineup.len()
    }
}

/// Runs the locator and normalizer for every table kind, plus the game-info
/// parser, over one page.
pub struct BoxScoreParser<'a> {
    normalizer: SchemaNormalizer<'a>,
}

impl<'a> BoxScoreParser<'a> {
    pub fn new(resolver: &'a TeamResolver, numeric: &'a NumericFields) -> Self {
        Self {
            normalizer: SchemaNormalizer::new(resolver, numeric),
        }
    }

    /// Parses `html` and stamps a game date on every record: the page's own
    /// date, else the one in `url`, else `fallback_date`.
    pub fn parse(&self, html: &str, url: Option<&str>, fallback_date: Option<&str>) -> BoxScore {
        let document = Html::parse_document(html);

        let mut game_info = parse_game_info(&document, url);
        let game_date = game_info
            .game_date
            .clone()
            .or_else(|| url.and_then(game_date_from_url))
            .or_else(|| fallback_date.map(str::to_string));
        if game_date.is_none() {
            tracing::warn!("No game date for {}", url.unwrap_or("<inline page>"));
        }
        game_info.game_date = game_date.clone();

        let mut batting = self.extract(&document, TableKind::Batting);
        let mut pitching = self.extract(&document, TableKind::Pitching);
        let lineup_rows = self.extract(&document, TableKind::Lineup);

        for record in batting.iter_mut().chain(pitching.iter_mut()) {
            record.game_date = game_date.clone();
        }
        let lineup = lineup_rows
            .iter()
            .map(|row| LineupRecord {
                game_date: game_date.clone(),
                ..LineupRecord::from_stat_record(row)
            })
            .collect::<Vec<_>>();
        if !lineup.is_empty() {
            validate_lineup(&lineup);
        }

        tracing::info!(
            "Parsed {}: {} batting, {} pitching, {} lineup records",
            url.unwrap_or("<inline page>"),
            batting.len(),
            pitching.len(),
            lineup.len()
        );

        BoxScore {
            batting,
            pitching,
            lineup,
            game_info,
        }
    }

    fn extract(&self, document: &Html, kind: TableKind) -> Vec<StatRecord> {
        let tables = locate_tables(document, kind);
        if tables.is_empty() {
            tracing::warn!("No {} tables found", kind);
        }

        let mut records = Vec::new();
        for table in &tables {
            let (column_spec, rows) = self.normalizer.extract_records(table, kind);
            tracing::debug!(
                "{} table '{}' ({:?}): {} fields, {} rows",
                kind,
                table.identifier,
                table.origin,
                column_spec.fields().len(),
                rows.len()
            );
            records.extend(rows);
        }
        records
    }
}
