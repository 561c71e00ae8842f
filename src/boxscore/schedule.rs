// src/boxscore/schedule.rs
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::boxscore::locator::clean_text;

static SUMMARY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.game_summary").expect("Failed to compile SUMMARY_SELECTOR"));
static TEAM_ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table.teams tr").expect("Failed to compile TEAM_ROW_SELECTOR"));
static TD_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("Failed to compile TD_SELECTOR"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("Failed to compile LINK_SELECTOR"));
static GAMELINK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("td.gamelink a[href]").expect("Failed to compile GAMELINK_SELECTOR")
});

/// One game listed on a daily scores page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSummary {
    pub date: String,
    pub away_team: String,
    pub home_team: String,
    pub away_score: Option<i64>,
    pub home_score: Option<i64>,
    /// Absolute box-score URL.
    pub url: String,
}

/// Reads every `div.game_summary` block of a daily scores page. The first
/// team row is the visitor, the second the home side.
pub fn parse_schedule(document: &Html, date: &str, base_url: &str) -> Vec<GameSummary> {
    let mut games = Vec::new();

    for (index, summary) in document.select(&SUMMARY_SELECTOR).enumerate() {
        let rows: Vec<ElementRef> = summary
            .select(&TEAM_ROW_SELECTOR)
            .filter(|row| row.select(&LINK_SELECTOR).next().is_some())
            .collect();
        let (away_row, home_row) = match rows.as_slice() {
            [away, home, ..] => (*away, *home),
            _ => {
                tracing::warn!("Game summary {} on {} does not list two teams, skipping", index, date);
                continue;
            }
        };

        let Some(href) = box_score_href(summary) else {
            tracing::warn!("Game summary {} on {} has no box-score link, skipping", index, date);
            continue;
        };

        let (away_team, away_score) = team_and_score(away_row);
        let (home_team, home_score) = team_and_score(home_row);
        if away_team.is_empty() || home_team.is_empty() {
            tracing::warn!("Game summary {} on {} has an unnamed team, skipping", index, date);
            continue;
        }

        games.push(GameSummary {
            date: date.to_string(),
            away_team,
            home_team,
            away_score,
            home_score,
            url: absolute_url(base_url, &href),
        });
    }

    tracing::info!("Found {} games on {}", games.len(), date);
    games
}

fn box_score_href(summary: ElementRef<'_>) -> Option<String> {
    summary
        .select(&GAMELINK_SELECTOR)
        .chain(summary.select(&LINK_SELECTOR))
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.contains("/boxes/") && href.ends_with(".shtml"))
        .map(str::to_string)
}

fn team_and_score(row: ElementRef<'_>) -> (String, Option<i64>) {
    let cells: Vec<ElementRef> = row.select(&TD_SELECTOR).collect();
    let team = cells
        .first()
        .and_then(|cell| cell.select(&LINK_SELECTOR).next())
        .map(clean_text)
        .unwrap_or_default();
    let score = cells
        .iter()
        .skip(1)
        .map(|cell| clean_text(*cell))
        .find_map(|text| text.parse::<i64>().ok());
    (team, score)
}

/// Joins a site-relative href onto `base_url`; absolute hrefs pass through.
pub fn absolute_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), href.trim_start_matches('/'))
    }
}
