// src/boxscore/normalizer.rs
//! Turns a located table into a ColumnSpec and uniform StatRecords.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::boxscore::locator::{clean_text, RawTable};
use crate::identity::{is_player_profile_href, player_id_from_href, TeamResolver};
use crate::records::{LineupRecord, StatLine, StatRecord, StatValue, TableKind};

// --- CSS Selectors (Lazy Static) ---
static TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("Failed to compile TABLE_SELECTOR"));
static THEAD_ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("thead tr").expect("Failed to compile THEAD_ROW_SELECTOR"));
static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("Failed to compile ROW_SELECTOR"));
static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("th, td").expect("Failed to compile CELL_SELECTOR"));
static TD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("Failed to compile TD_SELECTOR"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("Failed to compile LINK_SELECTOR"));
static ANY_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a").expect("Failed to compile ANY_LINK_SELECTOR"));
static COLGROUP_HEADER_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("th[scope=colgroup]").expect("Failed to compile COLGROUP_HEADER_SELECTOR")
});
static POSITION_SPAN_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.pos").expect("Failed to compile POSITION_SPAN_SELECTOR"));

static POSITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{1,3}$").expect("Failed to compile POSITION_RE"));
static PAREN_POSITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([A-Z0-9]{1,3})\)").expect("Failed to compile PAREN_POSITION_RE"));

/// Header attribute values that never name a statistic.
const NON_STAT_MARKERS: &[&str] = &["rank", "details"];
/// Header texts dropped when a table has no `data-stat` attributes.
const NON_STAT_TEXTS: &[&str] = &["rk", "#"];
/// Row classes for subtotal, spacer and repeated-header rows.
const SKIPPED_ROW_CLASSES: &[&str] = &["total_row", "spacer", "thead", "over_header"];
/// Subject names of summary rows.
const TOTALS_NAMES: &[&str] = &["Team Totals", "Team Total"];
/// Placeholder some tables use for an empty cell.
const EMPTY_PLACEHOLDER: &str = "--";
/// Team used when neither the table id nor its label names a team.
pub const UNKNOWN_TEAM: &str = "UNKNOWN";

/// Ordered canonical field names of one table. The subject (player or
/// pitcher) field is always first and no name appears twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    fields: Vec<String>,
}

impl ColumnSpec {
    /// A column spec holding only the identity field for `kind`.
    pub fn identity_only(kind: TableKind) -> Self {
        Self { fields: vec![kind.identity_field().to_string()] }
    }

    /// Appends `field` unless it is already present; returns whether it was added.
    pub fn push(&mut self, field: impl Into<String>) -> bool {
        let field = field.into();
        if self.fields.contains(&field) {
            return false;
        }
        self.fields.push(field);
        true
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Every field after the identity field.
    pub fn stat_fields(&self) -> &[String] {
        &self.fields[1..]
    }
}

// Where a stat field's cell is found in each body row.
#[derive(Debug, Clone)]
enum CellSource {
    Attr(String),
    Position(usize),
}

/// Stat fields coerced to numbers, per table kind. Names are compared
/// case-insensitively so text-derived headers ("ab") match "AB".
#[derive(Debug, Clone, Default)]
pub struct NumericFields {
    batting: HashSet<String>,
    pitching: HashSet<String>,
}

impl NumericFields {
    pub fn new<I, J>(batting: I, pitching: J) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        J: IntoIterator,
        J::Item: Into<String>,
    {
        Self {
            batting: batting.into_iter().map(|f| Into::<String>::into(f).to_lowercase()).collect(),
            pitching: pitching.into_iter().map(|f| Into::<String>::into(f).to_lowercase()).collect(),
        }
    }

    pub fn is_numeric(&self, kind: TableKind, field: &str) -> bool {
        match kind {
            TableKind::Batting => self.batting.contains(&field.to_lowercase()),
            TableKind::Pitching => self.pitching.contains(&field.to_lowercase()),
            TableKind::Lineup => field == "batting_order",
        }
    }
}

/// Coerces cell text to a number: integers first, then finite floats.
/// Anything else is `None`.
pub fn coerce_numeric(text: &str) -> Option<StatValue> {
    let text = text.trim();
    if let Ok(v) = text.parse::<i64>() {
        return Some(StatValue::Int(v));
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(StatValue::Float(v)),
        _ => None,
    }
}

/// Extracts records from located tables. Holds only shared references, so
/// one normalizer can serve any number of pages.
#[derive(Debug, Clone, Copy)]
pub struct SchemaNormalizer<'a> {
    resolver: &'a TeamResolver,
    numeric: &'a NumericFields,
}

impl<'a> SchemaNormalizer<'a> {
    pub fn new(resolver: &'a TeamResolver, numeric: &'a NumericFields) -> Self {
        Self { resolver, numeric }
    }

    /// Header-to-field mapping plus one StatRecord per player row. Tables
    /// without a header row or body rows produce no records; `game_date`
    /// is left for the caller.
    pub fn extract_records(&self, table: &RawTable, kind: TableKind) -> (ColumnSpec, Vec<StatRecord>) {
        let fragment = Html::parse_fragment(&table.html);
        // Heuristic lineup containers are not always tables.
        let root = fragment
            .select(&TABLE_SELECTOR)
            .next()
            .unwrap_or_else(|| fragment.root_element());

        match kind {
            TableKind::Lineup => self.extract_lineup(root, table),
            TableKind::Batting | TableKind::Pitching => self.extract_stats(root, table, kind),
        }
    }

    fn extract_stats(&self, root: ElementRef<'_>, table: &RawTable, kind: TableKind) -> (ColumnSpec, Vec<StatRecord>) {
        let team = self.team_for(table);

        let header_row = root
            .select(&THEAD_ROW_SELECTOR)
            .find(|row| !has_class(*row, "over_header"))
            .or_else(|| root.select(&ROW_SELECTOR).next());
        let Some(header_row) = header_row else {
            tracing::warn!("No header row in {} table '{}'", kind, table.identifier);
            return (ColumnSpec::identity_only(kind), Vec::new());
        };

        let (columns, sources) = header_columns(header_row, kind);
        if columns.stat_fields().is_empty() {
            tracing::warn!("No stat columns in {} table '{}'", kind, table.identifier);
            return (columns, Vec::new());
        }
        tracing::debug!("Columns for {} table '{}': {:?}", kind, table.identifier, columns.fields());

        let body_rows: Vec<ElementRef> = root
            .select(&ROW_SELECTOR)
            .filter(|row| row.id() != header_row.id() && !inside_thead(*row))
            .collect();
        if body_rows.is_empty() {
            tracing::warn!("No body rows in {} table '{}'", kind, table.identifier);
            return (columns, Vec::new());
        }

        let mut records = Vec::new();
        for row in body_rows {
            if is_skipped_row(row) {
                tracing::trace!("Skipping subtotal/spacer row in '{}'", table.identifier);
                continue;
            }
            let cells: Vec<ElementRef> = row.select(&CELL_SELECTOR).collect();
            let Some(subject_cell) = cells.first().copied() else {
                continue;
            };
            let subject = clean_text(subject_cell);
            if subject.is_empty() || TOTALS_NAMES.contains(&subject.as_str()) {
                tracing::debug!("Skipping totals or unnamed row: '{}'", subject);
                continue;
            }
            let subject_id = subject_cell
                .select(&LINK_SELECTOR)
                .next()
                .and_then(|a| player_id_from_href(a.value().attr("href")));
            if subject_id.is_none() {
                tracing::debug!("No profile link for '{}' in '{}'", subject, table.identifier);
            }

            let mut stats = StatLine::new();
            for (field, source) in columns.stat_fields().iter().zip(&sources) {
                let cell = match source {
                    CellSource::Attr(attr) => cells
                        .iter()
                        .find(|c| c.value().attr("data-stat") == Some(attr.as_str())),
                    CellSource::Position(i) => cells.get(*i),
                };
                let value = cell.and_then(|c| self.cell_value(kind, field, &clean_text(*c)));
                stats.insert(field.clone(), value);
            }

            records.push(StatRecord {
                kind,
                game_date: None,
                team: team.clone(),
                subject,
                subject_id,
                stats,
            });
        }

        tracing::info!("Parsed {} {} record(s) for {}", records.len(), kind, team);
        (columns, records)
    }

    fn extract_lineup(&self, root: ElementRef<'_>, table: &RawTable) -> (ColumnSpec, Vec<StatRecord>) {
        let mut columns = ColumnSpec::identity_only(TableKind::Lineup);
        columns.push("batting_order");
        columns.push("position");

        let team = self.lineup_team_for(table);
        let mut records = Vec::new();

        for row in root.select(&ROW_SELECTOR) {
            if is_skipped_row(row) {
                continue;
            }
            let tds: Vec<ElementRef> = row.select(&TD_SELECTOR).collect();
            if tds.len() < 2 {
                continue;
            }

            let (player, player_id) = lineup_player(&tds);
            if player.is_empty() || player.eq_ignore_ascii_case("player") {
                continue;
            }

            let mut stats = StatLine::new();
            stats.insert("batting_order", batting_order(tds[0]).map(|o| StatValue::Int(o as i64)));
            stats.insert("position", lineup_position(&tds).map(StatValue::Text));

            records.push(StatRecord {
                kind: TableKind::Lineup,
                game_date: None,
                team: team.clone(),
                subject: player,
                subject_id: player_id,
                stats,
            });
        }

        if records.is_empty() {
            tracing::warn!("No lineup rows in '{}'", table.identifier);
        } else {
            tracing::info!("Parsed {} lineup entries for {}", records.len(), team);
        }
        (columns, records)
    }

    fn cell_value(&self, kind: TableKind, field: &str, text: &str) -> Option<StatValue> {
        if text.is_empty() || text == EMPTY_PLACEHOLDER {
            return None;
        }
        if self.numeric.is_numeric(kind, field) {
            let value = coerce_numeric(text);
            if value.is_none() {
                tracing::debug!("Unparsable {} value for {}: '{}'", kind, field, text);
            }
            return value;
        }
        Some(StatValue::Text(text.to_string()))
    }

    fn team_for(&self, table: &RawTable) -> String {
        if let Some(team) = table.id.as_deref().and_then(|id| self.resolver.team_from_table_id(id)) {
            return team;
        }
        if let Some(label) = &table.label {
            return self.resolver.canonical_team(label);
        }
        tracing::warn!("Could not determine team for table '{}'", table.identifier);
        UNKNOWN_TEAM.to_string()
    }

    fn lineup_team_for(&self, table: &RawTable) -> String {
        if let Some(label) = &table.label {
            return self.resolver.canonical_team(label);
        }
        // Ids like `lineups_NYY` occasionally carry the abbreviation.
        let from_identifier = table
            .identifier
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|token| token.len() >= 2 && token.chars().all(|c| c.is_ascii_uppercase()))
            .find_map(|token| self.resolver.resolve(token).map(str::to_string));
        if let Some(team) = from_identifier {
            return team;
        }
        // First lineup on the page is the visitors'.
        let fallback = match table.position {
            0 => "Away Team".to_string(),
            1 => "Home Team".to_string(),
            n => format!("Team {}", n + 1),
        };
        tracing::warn!("No team label for lineup '{}'; using '{}'", table.identifier, fallback);
        fallback
    }
}

impl LineupRecord {
    /// Lineup view of a StatRecord produced from a lineup table.
    pub fn from_stat_record(record: &StatRecord) -> Self {
        let batting_order = match record.stats.get("batting_order") {
            Some(StatValue::Int(order)) => u8::try_from(*order).ok(),
            _ => None,
        };
        Self {
            game_date: record.game_date.clone(),
            team: record.team.clone(),
            batting_order,
            player: record.subject.clone(),
            position: record.stats.get("position").and_then(StatValue::as_text).map(str::to_string),
            player_id: record.subject_id.clone(),
        }
    }
}

/// Expected size of one side's lineup, starters plus substitutes.
const LINEUP_SIZE_RANGE: std::ops::RangeInclusive<usize> = 8..=12;

/// Sanity-checks parsed lineups team by team and logs what looks wrong:
/// unusual player counts, batting orders outside 1-9, missing dates or
/// teams. Returns `false` when anything was flagged; records are never
/// altered or dropped.
pub fn validate_lineup(records: &[LineupRecord]) -> bool {
    if records.is_empty() {
        tracing::warn!("Lineup is empty");
        return false;
    }

    let mut ok = true;
    let undated = records.iter().filter(|r| r.game_date.is_none()).count();
    if undated > 0 {
        tracing::warn!("{} lineup entries have no game date", undated);
        ok = false;
    }

    let mut teams: Vec<&str> = Vec::new();
    for record in records {
        if !teams.contains(&record.team.as_str()) {
            teams.push(record.team.as_str());
        }
    }
    tracing::debug!("Lineups found for {} team(s): {:?}", teams.len(), teams);

    for team in teams {
        if team.trim().is_empty() {
            tracing::warn!("Lineup entries without a team");
            ok = false;
            continue;
        }
        let players: Vec<&LineupRecord> = records.iter().filter(|r| r.team == team).collect();
        if !LINEUP_SIZE_RANGE.contains(&players.len()) {
            tracing::warn!("Unusual number of players for {}: {}", team, players.len());
            ok = false;
        }
        let mut orders: Vec<u8> = players.iter().filter_map(|r| r.batting_order).collect();
        orders.sort_unstable();
        if orders.iter().any(|o| !(1..=9).contains(o)) {
            tracing::warn!("Invalid batting order range for {}: {:?}", team, orders);
            ok = false;
        }
    }
    ok
}

fn header_columns(header_row: ElementRef<'_>, kind: TableKind) -> (ColumnSpec, Vec<CellSource>) {
    let mut columns = ColumnSpec::identity_only(kind);
    let mut sources = Vec::new();
    let mut identity_seen = false;

    for (i, cell) in header_row.select(&CELL_SELECTOR).enumerate() {
        let (field, source) = match cell.value().attr("data-stat") {
            Some(stat) => {
                let stat = stat.trim();
                if stat.is_empty() || NON_STAT_MARKERS.contains(&stat) {
                    continue;
                }
                (stat.to_string(), CellSource::Attr(stat.to_string()))
            }
            None => {
                let field = field_from_text(&clean_text(cell));
                if field.is_empty() || NON_STAT_TEXTS.contains(&field.as_str()) {
                    continue;
                }
                (field, CellSource::Position(i))
            }
        };

        // The first kept header names the subject column.
        if !identity_seen {
            identity_seen = true;
            continue;
        }
        if field == "player" || field == "pitcher" {
            continue;
        }
        if columns.push(field) {
            sources.push(source);
        }
    }

    (columns, sources)
}

/// "Pit. Count" -> "pit_count"
fn field_from_text(text: &str) -> String {
    text.trim().to_lowercase().replace('.', "").split_whitespace().collect::<Vec<_>>().join("_")
}

fn has_class(element: ElementRef<'_>, class: &str) -> bool {
    element
        .value()
        .attr("class")
        .map(|classes| classes.split_whitespace().any(|c| c == class))
        .unwrap_or(false)
}

fn is_skipped_row(row: ElementRef<'_>) -> bool {
    SKIPPED_ROW_CLASSES.iter().any(|class| has_class(row, class))
        || row.select(&COLGROUP_HEADER_SELECTOR).next().is_some()
}

fn inside_thead(row: ElementRef<'_>) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().name() == "thead")
}

/// "3." -> 3; only 1 through 9 are batting-order slots.
fn batting_order(td: ElementRef<'_>) -> Option<u8> {
    let text = clean_text(td);
    let order: u8 = text.trim_end_matches('.').parse().ok()?;
    (1..=9).contains(&order).then_some(order)
}

fn lineup_player(tds: &[ElementRef<'_>]) -> (String, Option<String>) {
    for td in tds {
        let profile = td
            .select(&LINK_SELECTOR)
            .find(|a| a.value().attr("href").map(is_player_profile_href).unwrap_or(false));
        if let Some(link) = profile {
            return (clean_text(link), player_id_from_href(link.value().attr("href")));
        }
    }
    let cell = tds[1];
    if let Some(link) = cell.select(&ANY_LINK_SELECTOR).next() {
        return (clean_text(link), None);
    }
    (clean_text(cell), None)
}

fn lineup_position(tds: &[ElementRef<'_>]) -> Option<String> {
    if let Some(td) = tds.get(2) {
        let text = clean_text(*td);
        if POSITION_RE.is_match(&text) && text.chars().any(|c| c.is_ascii_alphabetic()) {
            return Some(text);
        }
    }
    for td in tds {
        if let Some(span) = td.select(&POSITION_SPAN_SELECTOR).next() {
            let text = clean_text(span);
            if !text.is_empty() {
                return Some(text);
            }
        }
        let text = td.text().collect::<String>();
        if let Some(caps) = PAREN_POSITION_RE.captures(&text) {
            return Some(caps[1].to_string());
        }
    }
    None
}
