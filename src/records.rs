// src/records.rs
//! Typed per-category records produced by the box-score parsers and the
//! odds normalizer, and consumed by the joiner and the export sink.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Which stat table a record or a located table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Batting,
    Pitching,
    Lineup,
}

impl TableKind {
    /// Name of the subject column that always leads the ColumnSpec.
    pub fn identity_field(self) -> &'static str {
        match self {
            TableKind::Batting | TableKind::Lineup => "player",
            TableKind::Pitching => "pitcher",
        }
    }

    /// Name of the subject's profile id column.
    pub fn identity_id_field(self) -> &'static str {
        match self {
            TableKind::Batting | TableKind::Lineup => "player_id",
            TableKind::Pitching => "pitcher_id",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TableKind::Batting => "batting",
            TableKind::Pitching => "pitching",
            TableKind::Lineup => "lineup",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl StatValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StatValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatValue::Int(v) => write!(f, "{}", v),
            StatValue::Float(v) => write!(f, "{}", v),
            StatValue::Text(s) => f.write_str(s),
        }
    }
}

/// Ordered field → value mapping for one row. Field order follows the
/// table's ColumnSpec. Serializes as a JSON object in that order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatLine(Vec<(String, Option<StatValue>)>);

impl StatLine {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Inserts or replaces a field, keeping first-insertion order.
    pub fn insert(&mut self, field: impl Into<String>, value: Option<StatValue>) {
        let field = field.into();
        match self.0.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.0.push((field, value)),
        }
    }

    /// Value of a field; `None` both for absent fields and null cells.
    pub fn get(&self, field: &str) -> Option<&StatValue> {
        self.0
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, value)| value.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&StatValue>)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_ref()))
    }
}

impl Serialize for StatLine {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, value) in &self.0 {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

struct StatLineVisitor;

impl<'de> Visitor<'de> for StatLineVisitor {
    type Value = StatLine;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of stat fields")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<StatLine, A::Error> {
        let mut line = StatLine::new();
        while let Some((field, value)) = access.next_entry::<String, Option<StatValue>>()? {
            line.insert(field, value);
        }
        Ok(line)
    }
}

impl<'de> Deserialize<'de> for StatLine {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(StatLineVisitor)
    }
}

/// One parsed batting or pitching row for one player in one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRecord {
    pub kind: TableKind,
    pub game_date: Option<String>,
    pub team: String,
    /// Player (batting) or pitcher (pitching) display name; never empty.
    pub subject: String,
    /// Stable profile id, e.g. `judgeaa01`.
    pub subject_id: Option<String>,
    pub stats: StatLine,
}

/// One starting-lineup slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupRecord {
    pub game_date: Option<String>,
    pub team: String,
    pub batting_order: Option<u8>,
    pub player: String,
    pub position: Option<String>,
    pub player_id: Option<String>,
}

/// Game-level information for one box score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameInfoRecord {
    pub game_date: Option<String>,
    pub home_team: Option<String>,
    pub away_team: Option<String>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub winner: Option<String>,
    pub loser: Option<String>,
    pub venue: Option<String>,
    pub attendance: Option<i64>,
    pub start_time: Option<String>,
    pub game_duration: Option<String>,
    pub field_condition: Option<String>,
    pub weather: Option<String>,
    pub umpires: Vec<String>,
    pub winning_pitcher: Option<String>,
    pub losing_pitcher: Option<String>,
    pub save_pitcher: Option<String>,
    pub url: Option<String>,
}

/// One bookmaker's prices for one game, as delivered (decimal odds).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookmakerLine {
    pub bookmaker: String,
    pub moneyline_home: Option<f64>,
    pub moneyline_away: Option<f64>,
    pub spread_home: Option<f64>,
    pub spread_home_price: Option<f64>,
    pub spread_away: Option<f64>,
    pub spread_away_price: Option<f64>,
    pub total_over: Option<f64>,
    pub total_over_price: Option<f64>,
    pub total_under: Option<f64>,
    pub total_under_price: Option<f64>,
}

/// Odds for one game from the odds API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsRecord {
    pub external_game_id: Option<String>,
    /// ISO-8601 UTC commence time exactly as supplied.
    pub commence_time: Option<String>,
    pub game_date: String,
    pub home_team: String,
    pub away_team: String,
    pub lines: Vec<BookmakerLine>,
    pub source: String,
    /// Stamped by the fetch layer, never by the joiner.
    pub scraped_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_line_serializes_as_ordered_object() {
        let mut line = StatLine::new();
        line.insert("H", Some(StatValue::Int(2)));
        line.insert("AB", Some(StatValue::Int(4)));
        line.insert("details", Some(StatValue::Text("HR".into())));
        line.insert("AVG", None);
        line.insert("H", Some(StatValue::Int(3)));

        let json = serde_json::to_string(&line).unwrap();
        assert_eq!(json, r#"{"H":3,"AB":4,"details":"HR","AVG":null}"#);

        let back: StatLine = serde_json::from_str(&json).unwrap();
        assert_eq!(back, line);
        assert_eq!(back.get("AVG"), None);
        assert!(back.iter().any(|(field, value)| field == "AVG" && value.is_none()));
    }
}
