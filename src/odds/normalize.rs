// src/odds/normalize.rs
use chrono::{DateTime, NaiveDate, Utc};

use crate::identity::TeamResolver;
use crate::odds::models::{Bookmaker, OddsEvent, Outcome};
use crate::records::{BookmakerLine, OddsRecord};

pub const ODDS_SOURCE: &str = "the-odds-api";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Home,
    Away,
}

/// Converts odds-API events into OddsRecords for `target_date`.
///
/// Events whose `commence_time` is missing or unparsable, or whose UTC date
/// is more than `day_tolerance` days away from the target, are skipped. A
/// kept record's `game_date` is the target date so it keys against the box
/// score; the original timestamp stays in `commence_time`.
pub fn normalize_odds(
    events: &[OddsEvent],
    target_date: NaiveDate,
    resolver: &TeamResolver,
    day_tolerance: u32,
) -> Vec<OddsRecord> {
    let mut records = Vec::new();

    for event in events {
        let Some(commence) = event.commence_time.as_deref() else {
            tracing::debug!("Odds event {:?} has no commence_time, skipping", event.id);
            continue;
        };
        let commence_date = match DateTime::parse_from_rfc3339(commence) {
            Ok(dt) => dt.with_timezone(&Utc).date_naive(),
            Err(e) => {
                tracing::debug!("Unparsable commence_time '{}': {}", commence, e);
                continue;
            }
        };
        let distance = (commence_date - target_date).num_days().unsigned_abs();
        if distance > u64::from(day_tolerance) {
            continue;
        }

        let lines = event
            .bookmakers
            .iter()
            .map(|bookmaker| bookmaker_line(bookmaker, event, resolver))
            .collect();

        records.push(OddsRecord {
            external_game_id: event.id.clone(),
            commence_time: event.commence_time.clone(),
            game_date: target_date.format("%Y-%m-%d").to_string(),
            home_team: resolver.canonical_team(&event.home_team),
            away_team: resolver.canonical_team(&event.away_team),
            lines,
            source: ODDS_SOURCE.to_string(),
            scraped_at: None,
        });
    }

    tracing::info!(
        "Kept {} of {} odds events for {}",
        records.len(),
        events.len(),
        target_date
    );
    records
}

fn bookmaker_line(bookmaker: &Bookmaker, event: &OddsEvent, resolver: &TeamResolver) -> BookmakerLine {
    let mut line = BookmakerLine {
        bookmaker: bookmaker.title.clone().unwrap_or_else(|| bookmaker.key.clone()),
        ..BookmakerLine::default()
    };

    for market in &bookmaker.markets {
        match market.key.as_str() {
            "h2h" => {
                for outcome in &market.outcomes {
                    match side_of(outcome, event, resolver) {
                        Some(Side::Home) => line.moneyline_home = outcome.price,
                        Some(Side::Away) => line.moneyline_away = outcome.price,
                        None => tracing::debug!("Moneyline outcome '{}' matches neither team", outcome.name),
                    }
                }
            }
            "spreads" => {
                for outcome in &market.outcomes {
                    match side_of(outcome, event, resolver) {
                        Some(Side::Home) => {
                            line.spread_home = outcome.point;
                            line.spread_home_price = outcome.price;
                        }
                        Some(Side::Away) => {
                            line.spread_away = outcome.point;
                            line.spread_away_price = outcome.price;
                        }
                        None => tracing::debug!("Spread outcome '{}' matches neither team", outcome.name),
                    }
                }
            }
            "totals" => {
                for outcome in &market.outcomes {
                    if outcome.name.eq_ignore_ascii_case("over") {
                        line.total_over = outcome.point;
                        line.total_over_price = outcome.price;
                    } else if outcome.name.eq_ignore_ascii_case("under") {
                        line.total_under = outcome.point;
                        line.total_under_price = outcome.price;
                    }
                }
            }
            other => tracing::debug!("Ignoring odds market '{}'", other),
        }
    }
    line
}

// Exact name first; the resolver only breaks ties the API did not settle.
fn side_of(outcome: &Outcome, event: &OddsEvent, resolver: &TeamResolver) -> Option<Side> {
    if outcome.name == event.home_team {
        Some(Side::Home)
    } else if outcome.name == event.away_team {
        Some(Side::Away)
    } else if resolver.is_same_team(&outcome.name, &event.home_team) {
        Some(Side::Home)
    } else if resolver.is_same_team(&outcome.name, &event.away_team) {
        Some(Side::Away)
    } else {
        None
    }
}

/// Decimal price to American odds. Prices at or below 1.0 have no American
/// equivalent.
pub fn decimal_to_american(decimal: f64) -> Option<i64> {
    if !decimal.is_finite() || decimal <= 1.0 {
        return None;
    }
    let american = if decimal >= 2.0 {
        (decimal - 1.0) * 100.0
    } else {
        -100.0 / (decimal - 1.0)
    };
    Some(american.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odds::models::parse_events;

    const PAYLOAD: &str = r#"[
      {"id": "evt1", "sport_key": "baseball_mlb", "commence_time": "2023-07-15T23:05:00Z",
       "home_team": "New York Yankees", "away_team": "Boston Red Sox",
       "bookmakers": [
         {"key": "draftkings", "title": "DraftKings", "markets": [
           {"key": "h2h", "outcomes": [{"name": "Boston Red Sox", "price": 2.3}, {"name": "New York Yankees", "price": 1.65}]},
           {"key": "spreads", "outcomes": [{"name": "Boston Red Sox", "price": 1.5, "point": 1.5}, {"name": "New York Yankees", "price": 2.6, "point": -1.5}]},
           {"key": "totals", "outcomes": [{"name": "Over", "price": 1.91, "point": 8.5}, {"name": "Under", "price": 1.91, "point": 8.5}]}
         ]},
         {"key": "fanduel", "markets": [
           {"key": "h2h", "outcomes": [{"name": "NYY", "price": 1.7}, {"name": "Red Sox", "price": 2.2}]}
         ]}
       ]},
      {"id": "evt2", "commence_time": "2023-07-17T17:05:00Z", "home_team": "Chicago Cubs", "away_team": "St. Louis Cardinals", "bookmakers": []},
      {"id": "evt3", "commence_time": "not a time", "home_team": "Chicago Cubs", "away_team": "St. Louis Cardinals"}
    ]"#;

    fn target() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 7, 15).unwrap()
    }

    #[test]
    fn assigns_markets_to_sides() {
        let events = parse_events(PAYLOAD).unwrap();
        let records = normalize_odds(&events, target(), &TeamResolver::default(), 0);

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.external_game_id.as_deref(), Some("evt1"));
        assert_eq!(record.game_date, "2023-07-15");
        assert_eq!(record.home_team, "New York Yankees");
        assert_eq!(record.source, ODDS_SOURCE);
        assert_eq!(record.scraped_at, None);

        let dk = &record.lines[0];
        assert_eq!(dk.bookmaker, "DraftKings");
        assert_eq!(dk.moneyline_home, Some(1.65));
        assert_eq!(dk.moneyline_away, Some(2.3));
        assert_eq!(dk.spread_home, Some(-1.5));
        assert_eq!(dk.spread_away_price, Some(1.5));
        assert_eq!(dk.total_over, Some(8.5));
        assert_eq!(dk.total_under_price, Some(1.91));

        // Abbreviated outcome names fall back to the resolver.
        let fd = &record.lines[1];
        assert_eq!(fd.bookmaker, "fanduel");
        assert_eq!(fd.moneyline_home, Some(1.7));
        assert_eq!(fd.moneyline_away, Some(2.2));
    }

    #[test]
    fn day_tolerance_widens_the_window() {
        let events = parse_events(PAYLOAD).unwrap();
        let records = normalize_odds(&events, target(), &TeamResolver::default(), 2);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].game_date, "2023-07-15");
        assert_eq!(records[1].commence_time.as_deref(), Some("2023-07-17T17:05:00Z"));
    }

    #[test]
    fn single_event_objects_decode() {
        let events = parse_events(r#"{"id": "x", "home_team": "A", "away_team": "B"}"#).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].bookmakers.is_empty());
    }

    #[test]
    fn converts_decimal_prices() {
        assert_eq!(decimal_to_american(2.5), Some(150));
        assert_eq!(decimal_to_american(2.0), Some(100));
        assert_eq!(decimal_to_american(1.5), Some(-200));
        assert_eq!(decimal_to_american(1.91), Some(-110));
        assert_eq!(decimal_to_american(1.0), None);
        assert_eq!(decimal_to_american(0.5), None);
    }
}
