// src/join/mod.rs
//! Aligns per-category records into one composite record per game.
//!
//! Everything here is a pure function of its inputs: no clocks, counters or
//! shared state, so re-running a join over the same records gives the same
//! output.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::identity::TeamResolver;
use crate::records::{GameInfoRecord, LineupRecord, OddsRecord, StatRecord};

/// Written to both `winner` and `loser` when the final score is level.
pub const TIE_MARKER: &str = "Tie";

/// `(game_date, home, away)` with both teams canonicalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameKey {
    pub game_date: String,
    pub home_team: String,
    pub away_team: String,
}

impl GameKey {
    pub fn new(game_date: &str, home_team: &str, away_team: &str, resolver: &TeamResolver) -> Self {
        Self {
            game_date: game_date.trim().to_string(),
            home_team: resolver.canonical_team(home_team),
            away_team: resolver.canonical_team(away_team),
        }
    }

    /// Key of a game-info record; `None` when its date or either team is missing.
    pub fn from_game_info(info: &GameInfoRecord, resolver: &TeamResolver) -> Option<Self> {
        let date = info.game_date.as_deref()?;
        let home = info.home_team.as_deref()?;
        let away = info.away_team.as_deref()?;
        Some(Self::new(date, home, away, resolver))
    }

    fn matches(&self, date: Option<&str>, home: &str, away: &str, resolver: &TeamResolver) -> bool {
        date == Some(self.game_date.as_str())
            && resolver.is_same_team(home, &self.home_team)
            && resolver.is_same_team(away, &self.away_team)
    }
}

/// All data known about one game. Categories with no rows stay empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeGameRecord {
    pub key: GameKey,
    pub game_info: Option<GameInfoRecord>,
    pub home_batting: Vec<StatRecord>,
    pub away_batting: Vec<StatRecord>,
    pub home_pitching: Vec<StatRecord>,
    pub away_pitching: Vec<StatRecord>,
    pub home_lineup: Vec<LineupRecord>,
    pub away_lineup: Vec<LineupRecord>,
    pub odds: Option<OddsRecord>,
}

/// Fills `winner`/`loser` from the final score. Level scores put the tie
/// marker in both; a missing score leaves both unset.
pub fn derive_winner_loser(info: &mut GameInfoRecord) {
    let (Some(home_score), Some(away_score)) = (info.home_score, info.away_score) else {
        info.winner = None;
        info.loser = None;
        return;
    };
    let home = info.home_team.clone();
    let away = info.away_team.clone();
    let (winner, loser) = match home_score.cmp(&away_score) {
        std::cmp::Ordering::Greater => (home, away),
        std::cmp::Ordering::Less => (away, home),
        std::cmp::Ordering::Equal => (Some(TIE_MARKER.to_string()), Some(TIE_MARKER.to_string())),
    };
    info.winner = winner;
    info.loser = loser;
}

/// Keeps the last record for each `(external_game_id, commence_time)`, in
/// place of the first. Records missing either part are all kept.
pub fn dedup_odds(odds: &[OddsRecord]) -> Vec<OddsRecord> {
    let mut slot_by_key: HashMap<(&str, &str), usize> = HashMap::new();
    let mut kept: Vec<OddsRecord> = Vec::with_capacity(odds.len());

    for record in odds {
        let key = match (record.external_game_id.as_deref(), record.commence_time.as_deref()) {
            (Some(id), Some(commence)) => (id, commence),
            _ => {
                kept.push(record.clone());
                continue;
            }
        };
        match slot_by_key.get(&key) {
            Some(&slot) => kept[slot] = record.clone(),
            None => {
                slot_by_key.insert(key, kept.len());
                kept.push(record.clone());
            }
        }
    }

    if kept.len() < odds.len() {
        tracing::debug!("Odds dedup dropped {} records", odds.len() - kept.len());
    }
    kept
}

/// Assembles the composite record for `key` out of every category.
pub fn join_game(
    batting: &[StatRecord],
    pitching: &[StatRecord],
    lineup: &[LineupRecord],
    game_info: &[GameInfoRecord],
    odds: &[OddsRecord],
    key: &GameKey,
    resolver: &TeamResolver,
) -> CompositeGameRecord {
    let game_info = game_info
        .iter()
        .find(|info| {
            key.matches(
                info.game_date.as_deref(),
                info.home_team.as_deref().unwrap_or(""),
                info.away_team.as_deref().unwrap_or(""),
                resolver,
            )
        })
        .cloned()
        .map(|mut info| {
            derive_winner_loser(&mut info);
            info
        });

    let stats_for = |records: &[StatRecord], team: &str| -> Vec<StatRecord> {
        records
            .iter()
            .filter(|r| r.game_date.as_deref() == Some(key.game_date.as_str()) && resolver.is_same_team(&r.team, team))
            .cloned()
            .collect()
    };
    let lineup_for = |team: &str| -> Vec<LineupRecord> {
        lineup
            .iter()
            .filter(|r| r.game_date.as_deref() == Some(key.game_date.as_str()) && resolver.is_same_team(&r.team, team))
            .cloned()
            .collect()
    };

    let odds = pick_odds(odds, key, resolver);

    let composite = CompositeGameRecord {
        key: key.clone(),
        game_info,
        home_batting: stats_for(batting, key.home_team.as_str()),
        away_batting: stats_for(batting, key.away_team.as_str()),
        home_pitching: stats_for(pitching, key.home_team.as_str()),
        away_pitching: stats_for(pitching, key.away_team.as_str()),
        home_lineup: lineup_for(key.home_team.as_str()),
        away_lineup: lineup_for(key.away_team.as_str()),
        odds,
    };

    if composite.game_info.is_none() {
        tracing::warn!("No game info for {:?}", key);
    }
    tracing::debug!(
        "Joined {} {} @ {}: {}+{} batting, {}+{} pitching, odds: {}",
        key.game_date,
        key.away_team,
        key.home_team,
        composite.away_batting.len(),
        composite.home_batting.len(),
        composite.away_pitching.len(),
        composite.home_pitching.len(),
        composite.odds.is_some()
    );
    composite
}

// Most recently scraped match wins; among equal stamps, the later record.
fn pick_odds(odds: &[OddsRecord], key: &GameKey, resolver: &TeamResolver) -> Option<OddsRecord> {
    let candidates = dedup_odds(odds);
    candidates
        .into_iter()
        .filter(|o| key.matches(Some(o.game_date.as_str()), &o.home_team, &o.away_team, resolver))
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.scraped_at.cmp(&b.scraped_at).then(ia.cmp(ib)))
        .map(|(_, record)| record)
}

/// One composite record per distinct game-info key, in game-info order.
pub fn join_all(
    batting: &[StatRecord],
    pitching: &[StatRecord],
    lineup: &[LineupRecord],
    game_info: &[GameInfoRecord],
    odds: &[OddsRecord],
    resolver: &TeamResolver,
) -> Vec<CompositeGameRecord> {
    let mut keys: Vec<GameKey> = Vec::new();
    for info in game_info {
        match GameKey::from_game_info(info, resolver) {
            Some(key) if !keys.contains(&key) => keys.push(key),
            Some(_) => {}
            None => tracing::warn!("Game info without date or teams cannot be joined: {:?}", info.url),
        }
    }

    let games: Vec<CompositeGameRecord> = keys
        .iter()
        .map(|key| join_game(batting, pitching, lineup, game_info, odds, key, resolver))
        .collect();
    tracing::info!(
        "Joined {} games ({} with odds)",
        games.len(),
        games.iter().filter(|g| g.odds.is_some()).count()
    );
    games
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MatchPolicy;
    use crate::records::{BookmakerLine, StatLine, TableKind};

    fn info(home: &str, away: &str, home_score: Option<i64>, away_score: Option<i64>) -> GameInfoRecord {
        GameInfoRecord {
            game_date: Some("2023-07-15".into()),
            home_team: Some(home.into()),
            away_team: Some(away.into()),
            home_score,
            away_score,
            ..GameInfoRecord::default()
        }
    }

    fn stat(kind: TableKind, team: &str, subject: &str) -> StatRecord {
        StatRecord {
            kind,
            game_date: Some("2023-07-15".into()),
            team: team.into(),
            subject: subject.into(),
            subject_id: None,
            stats: StatLine::new(),
        }
    }

    fn odds(id: &str, book: &str, scraped_at: Option<&str>) -> OddsRecord {
        OddsRecord {
            external_game_id: Some(id.into()),
            commence_time: Some("2023-07-15T23:05:00Z".into()),
            game_date: "2023-07-15".into(),
            home_team: "New York Yankees".into(),
            away_team: "Boston Red Sox".into(),
            lines: vec![BookmakerLine { bookmaker: book.into(), ..BookmakerLine::default() }],
            source: "test".into(),
            scraped_at: scraped_at.map(str::to_string),
        }
    }

    #[test]
    fn winner_and_loser_from_scores() {
        let mut game = info("Red Sox", "Yankees", Some(5), Some(3));
        derive_winner_loser(&mut game);
        assert_eq!(game.winner.as_deref(), Some("Red Sox"));
        assert_eq!(game.loser.as_deref(), Some("Yankees"));

        let mut tie = info("Red Sox", "Yankees", Some(3), Some(3));
        derive_winner_loser(&mut tie);
        assert_eq!(tie.winner.as_deref(), Some(TIE_MARKER));
        assert_eq!(tie.loser.as_deref(), Some(TIE_MARKER));

        let mut unknown = info("Red Sox", "Yankees", Some(3), None);
        derive_winner_loser(&mut unknown);
        assert_eq!(unknown.winner, None);
        assert_eq!(unknown.loser, None);
    }

    #[test]
    fn dedup_keeps_last_per_key() {
        let mut no_key = odds("evt9", "c", None);
        no_key.commence_time = None;
        let input = vec![odds("evt1", "a", None), no_key.clone(), odds("evt1", "b", None), no_key];
        let kept = dedup_odds(&input);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].lines[0].bookmaker, "b");
        assert_eq!(kept.iter().filter(|o| o.commence_time.is_none()).count(), 2);
    }

    #[test]
    fn joins_all_categories_for_a_game() {
        let resolver = TeamResolver::default();
        let batting = vec![
            stat(TableKind::Batting, "New York Yankees", "Aaron Judge"),
            stat(TableKind::Batting, "Boston Red Sox", "Rafael Devers"),
            stat(TableKind::Batting, "Chicago Cubs", "Dansby Swanson"),
        ];
        let pitching = vec![stat(TableKind::Pitching, "New York Yankees", "Gerrit Cole")];
        let lineup = vec![LineupRecord {
            game_date: Some("2023-07-15".into()),
            team: "BOS".into(),
            batting_order: Some(1),
            player: "Jarren Duran".into(),
            position: Some("CF".into()),
            player_id: None,
        }];
        let games = vec![info("New York Yankees", "Boston Red Sox", Some(5), Some(3))];
        let odds = vec![odds("evt1", "early", Some("2023-07-15T10:00:00Z")), odds("evt1", "late", Some("2023-07-15T12:00:00Z"))];

        let joined = join_all(&batting, &pitching, &lineup, &games, &odds, &resolver);
        assert_eq!(joined.len(), 1);
        let game = &joined[0];
        assert_eq!(game.key.home_team, "New York Yankees");
        assert_eq!(game.home_batting.len(), 1);
        assert_eq!(game.away_batting[0].subject, "Rafael Devers");
        assert_eq!(game.home_pitching.len(), 1);
        assert!(game.away_pitching.is_empty());
        assert_eq!(game.away_lineup.len(), 1);
        assert_eq!(game.game_info.as_ref().and_then(|i| i.winner.as_deref()), Some("New York Yankees"));
        assert_eq!(game.odds.as_ref().map(|o| o.lines[0].bookmaker.as_str()), Some("late"));

        // Same inputs, same output.
        assert_eq!(join_all(&batting, &pitching, &lineup, &games, &odds, &resolver), joined);
    }

    #[test]
    fn odds_for_other_games_are_ignored() {
        let resolver = TeamResolver::new(&HashMap::new(), MatchPolicy::Exact);
        let key = GameKey::new("2023-07-15", "NYY", "BOS", &resolver);
        let mut other = odds("evt2", "x", None);
        other.home_team = "New York Mets".into();
        let composite = join_game(&[], &[], &[], &[], &[other], &key, &resolver);
        assert!(composite.odds.is_none());
        assert!(composite.game_info.is_none());
        assert!(composite.home_batting.is_empty());
    }
}
