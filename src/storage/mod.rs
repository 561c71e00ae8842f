// src/storage/mod.rs
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::boxscore::GameSummary;
use crate::config::ExportFormat;
use crate::join::CompositeGameRecord;
use crate::odds::decimal_to_american;
use crate::records::{GameInfoRecord, LineupRecord, OddsRecord, StatRecord, StatValue};
use crate::utils::error::StorageError;

/// One flat export row; column order is insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatRow(Vec<(String, Value)>);

impl FlatRow {
    fn push(&mut self, column: &str, value: impl Into<Value>) {
        self.0.push((column.to_string(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for FlatRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, value) in &self.0 {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// A record that can be written as flat tabular rows.
pub trait ExportRow {
    /// Values of the key-column set used for deduplication, or `None` when
    /// the category is not deduplicated on export.
    fn dedup_key(&self) -> Option<Vec<String>>;

    fn rows(&self) -> Vec<FlatRow>;
}

fn opt_text(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

fn stat_value(value: Option<&StatValue>) -> Value {
    match value {
        None => Value::Null,
        Some(StatValue::Int(v)) => Value::from(*v),
        Some(StatValue::Float(v)) => serde_json::Number::from_f64(*v).map(Value::Number).unwrap_or(Value::Null),
        Some(StatValue::Text(s)) => Value::String(s.clone()),
    }
}

impl ExportRow for StatRecord {
    fn dedup_key(&self) -> Option<Vec<String>> {
        Some(vec![
            self.game_date.clone().unwrap_or_default(),
            self.team.clone(),
            self.subject.clone(),
            self.subject_id.clone().unwrap_or_default(),
        ])
    }

    fn rows(&self) -> Vec<FlatRow> {
        let mut row = FlatRow::default();
        row.push("game_date", opt_text(&self.game_date));
        row.push("team", self.team.as_str());
        row.push(self.kind.identity_field(), self.subject.as_str());
        row.push(self.kind.identity_id_field(), opt_text(&self.subject_id));
        for (field, value) in self.stats.iter() {
            row.push(field, stat_value(value));
        }
        vec![row]
    }
}

impl ExportRow for LineupRecord {
    fn dedup_key(&self) -> Option<Vec<String>> {
        Some(vec![
            self.game_date.clone().unwrap_or_default(),
            self.team.clone(),
            self.player.clone(),
            self.batting_order.map(|o| o.to_string()).unwrap_or_default(),
        ])
    }

    fn rows(&self) -> Vec<FlatRow> {
        let mut row = FlatRow::default();
        row.push("game_date", opt_text(&self.game_date));
        row.push("team", self.team.as_str());
        row.push("player", self.player.as_str());
        row.push("batting_order", self.batting_order.map(Value::from).unwrap_or(Value::Null));
        row.push("position", opt_text(&self.position));
        row.push("player_id", opt_text(&self.player_id));
        vec![row]
    }
}

impl ExportRow for GameInfoRecord {
    fn dedup_key(&self) -> Option<Vec<String>> {
        Some(vec![
            self.game_date.clone().unwrap_or_default(),
            self.home_team.clone().unwrap_or_default(),
            self.away_team.clone().unwrap_or_default(),
        ])
    }

    fn rows(&self) -> Vec<FlatRow> {
        let mut row = FlatRow::default();
        row.push("game_date", opt_text(&self.game_date));
        row.push("home_team", opt_text(&self.home_team));
        row.push("away_team", opt_text(&self.away_team));
        row.push("home_score", self.home_score.map(Value::from).unwrap_or(Value::Null));
        row.push("away_score", self.away_score.map(Value::from).unwrap_or(Value::Null));
        row.push("winner", opt_text(&self.winner));
        row.push("loser", opt_text(&self.loser));
        row.push("venue", opt_text(&self.venue));
        row.push("attendance", self.attendance.map(Value::from).unwrap_or(Value::Null));
        row.push("start_time", opt_text(&self.start_time));
        row.push("game_duration", opt_text(&self.game_duration));
        row.push("field_condition", opt_text(&self.field_condition));
        row.push("weather", opt_text(&self.weather));
        row.push("umpires", self.umpires.join(", "));
        row.push("winning_pitcher", opt_text(&self.winning_pitcher));
        row.push("losing_pitcher", opt_text(&self.losing_pitcher));
        row.push("save_pitcher", opt_text(&self.save_pitcher));
        row.push("url", opt_text(&self.url));
        vec![row]
    }
}

impl ExportRow for GameSummary {
    fn dedup_key(&self) -> Option<Vec<String>> {
        Some(vec![self.url.clone()])
    }

    fn rows(&self) -> Vec<FlatRow> {
        let mut row = FlatRow::default();
        row.push("date", self.date.as_str());
        row.push("away_team", self.away_team.as_str());
        row.push("home_team", self.home_team.as_str());
        row.push("away_score", self.away_score.map(Value::from).unwrap_or(Value::Null));
        row.push("home_score", self.home_score.map(Value::from).unwrap_or(Value::Null));
        row.push("url", self.url.as_str());
        vec![row]
    }
}

// One row per bookmaker; American moneylines ride along for readability.
impl ExportRow for OddsRecord {
    fn dedup_key(&self) -> Option<Vec<String>> {
        None
    }

    fn rows(&self) -> Vec<FlatRow> {
        let price = |v: Option<f64>| v.and_then(serde_json::Number::from_f64).map(Value::Number).unwrap_or(Value::Null);
        let american = |v: Option<f64>| v.and_then(decimal_to_american).map(Value::from).unwrap_or(Value::Null);

        self.lines
            .iter()
            .map(|line| {
                let mut row = FlatRow::default();
                row.push("game_date", self.game_date.as_str());
                row.push("home_team", self.home_team.as_str());
                row.push("away_team", self.away_team.as_str());
                row.push("external_game_id", opt_text(&self.external_game_id));
                row.push("commence_time", opt_text(&self.commence_time));
                row.push("bookmaker", line.bookmaker.as_str());
                row.push("moneyline_home", price(line.moneyline_home));
                row.push("moneyline_away", price(line.moneyline_away));
                row.push("moneyline_home_american", american(line.moneyline_home));
                row.push("moneyline_away_american", american(line.moneyline_away));
                row.push("spread_home", price(line.spread_home));
                row.push("spread_home_price", price(line.spread_home_price));
                row.push("spread_away", price(line.spread_away));
                row.push("spread_away_price", price(line.spread_away_price));
                row.push("total_over", price(line.total_over));
                row.push("total_over_price", price(line.total_over_price));
                row.push("total_under", price(line.total_under));
                row.push("total_under_price", price(line.total_under_price));
                row.push("source", self.source.as_str());
                row.push("scraped_at", opt_text(&self.scraped_at));
                row
            })
            .collect()
    }
}

/// Keeps the first record for each key-column set, in input order.
pub fn dedup_by_key<R: ExportRow + Clone>(records: &[R]) -> Vec<R> {
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    records
        .iter()
        .filter(|record| match record.dedup_key() {
            Some(key) => seen.insert(key),
            None => true,
        })
        .cloned()
        .collect()
}

/// Union of the rows' columns in first-seen order.
pub fn union_header(rows: &[FlatRow]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut header = Vec::new();
    for row in rows {
        for column in row.columns() {
            if seen.insert(column.to_string()) {
                header.push(column.to_string());
            }
        }
    }
    header
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    /// `<base_dir>/<run_date>/`, created on demand.
    pub fn run_dir(&self, run_date: &str) -> Result<PathBuf, StorageError> {
        let dir = self.base_dir.join(run_date);
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(StorageError::IoError)?;
        }
        Ok(dir)
    }

    /// Writes one category as `<category>.csv` and/or `<category>.json`
    /// after deduplicating on its key columns. Empty categories write nothing.
    pub fn save_category<R: ExportRow + Clone>(
        &self,
        run_date: &str,
        category: &str,
        records: &[R],
        formats: &[ExportFormat],
    ) -> Result<Vec<PathBuf>, StorageError> {
        if records.is_empty() {
            tracing::warn!("No {} records to save for {}", category, run_date);
            return Ok(Vec::new());
        }

        let unique = dedup_by_key(records);
        if unique.len() < records.len() {
            tracing::info!(
                "Dropped {} duplicate {} records",
                records.len() - unique.len(),
                category
            );
        }
        let rows: Vec<FlatRow> = unique.iter().flat_map(|record| record.rows()).collect();
        let dir = self.run_dir(run_date)?;
        let mut written = Vec::new();

        if formats.contains(&ExportFormat::Csv) {
            let path = dir.join(format!("{}.csv", category));
            let header = union_header(&rows);
            let mut writer = csv::Writer::from_path(&path)?;
            writer.write_record(&header)?;
            for row in &rows {
                writer.write_record(header.iter().map(|column| csv_cell(row.get(column))))?;
            }
            writer.flush().map_err(StorageError::IoError)?;
            tracing::info!("Saved {} {} rows to {}", rows.len(), category, path.display());
            written.push(path);
        }

        if formats.contains(&ExportFormat::Json) {
            let path = dir.join(format!("{}.json", category));
            let json = serde_json::to_string_pretty(&rows)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            fs::write(&path, json).map_err(StorageError::IoError)?;
            tracing::info!("Saved {} {} rows to {}", rows.len(), category, path.display());
            written.push(path);
        }

        Ok(written)
    }

    /// Saves the composite per-game records as `<run_date>/games.json`.
    pub fn save_games(&self, run_date: &str, games: &[CompositeGameRecord]) -> Result<PathBuf, StorageError> {
        let path = self.run_dir(run_date)?.join("games.json");
        let json = serde_json::to_string_pretty(games)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        fs::write(&path, json).map_err(StorageError::IoError)?;
        tracing::info!("Saved {} composite games to {}", games.len(), path.display());
        Ok(path)
    }

    /// Writes a downloaded page under `<run_date>/raw/` for offline re-runs.
    pub fn save_raw_page(&self, run_date: &str, name: &str, html: &str) -> Result<PathBuf, StorageError> {
        let dir = self.run_dir(run_date)?.join("raw");
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(StorageError::IoError)?;
        }
        let path = dir.join(name);
        fs::write(&path, html).map_err(StorageError::IoError)?;
        tracing::debug!("Saved raw page to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{StatLine, TableKind};

    fn batter(subject: &str, ab: i64, extra: Option<(&str, i64)>) -> StatRecord {
        let mut stats = StatLine::new();
        stats.insert("AB", Some(StatValue::Int(ab)));
        if let Some((field, value)) = extra {
            stats.insert(field, Some(StatValue::Int(value)));
        }
        stats.insert("AVG", None);
        StatRecord {
            kind: TableKind::Batting,
            game_date: Some("2023-07-15".into()),
            team: "New York Yankees".into(),
            subject: subject.into(),
            subject_id: None,
            stats,
        }
    }

    #[test]
    fn csv_header_is_union_in_first_seen_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let records = vec![
            batter("Aaron Judge", 4, None),
            batter("Aaron Judge", 9, None),
            batter("Gleyber Torres", 3, Some(("HR", 1))),
        ];

        let written = storage
            .save_category("2023-07-15", "batting", &records, &[ExportFormat::Csv, ExportFormat::Json])
            .unwrap();
        assert_eq!(written.len(), 2);

        let csv_text = fs::read_to_string(dir.path().join("2023-07-15").join("batting.csv")).unwrap();
        let lines: Vec<&str> = csv_text.lines().collect();
        assert_eq!(lines[0], "game_date,team,player,player_id,AB,AVG,HR");
        assert_eq!(lines.len(), 3, "duplicate key row dropped");
        assert_eq!(lines[1], "2023-07-15,New York Yankees,Aaron Judge,,4,,");
        assert_eq!(lines[2], "2023-07-15,New York Yankees,Gleyber Torres,,3,,1");

        let json: Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("2023-07-15").join("batting.json")).unwrap())
                .unwrap();
        assert_eq!(json[0]["AB"], Value::from(4));
        assert_eq!(json[0]["AVG"], Value::Null);
    }

    #[test]
    fn empty_categories_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path().join("nested")).unwrap();
        let written = storage
            .save_category::<LineupRecord>("2023-07-15", "lineup", &[], &[ExportFormat::Csv])
            .unwrap();
        assert!(written.is_empty());
        assert!(dir.path().join("nested").exists());
    }

    #[test]
    fn odds_expand_one_row_per_bookmaker() {
        use crate::records::BookmakerLine;
        let record = OddsRecord {
            external_game_id: Some("evt1".into()),
            commence_time: Some("2023-07-15T23:05:00Z".into()),
            game_date: "2023-07-15".into(),
            home_team: "New York Yankees".into(),
            away_team: "Boston Red Sox".into(),
            lines: vec![
                BookmakerLine { bookmaker: "a".into(), moneyline_home: Some(2.5), ..BookmakerLine::default() },
                BookmakerLine { bookmaker: "b".into(), moneyline_home: Some(1.5), ..BookmakerLine::default() },
            ],
            source: "test".into(),
            scraped_at: None,
        };
        let rows = record.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("moneyline_home_american"), Some(&Value::from(150)));
        assert_eq!(rows[1].get("moneyline_home_american"), Some(&Value::from(-200)));
        assert_eq!(record.dedup_key(), None);
    }
}
