// src/boxscore/game_info.rs
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::boxscore::locator::{clean_text, comment_texts};
use crate::records::GameInfoRecord;

// --- CSS Selectors (Lazy Static) ---
static SCOREBOX_TEAM_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.scorebox > div").expect("Failed to compile SCOREBOX_TEAM_SELECTOR")
});
static TEAM_NAME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("strong a, strong").expect("Failed to compile TEAM_NAME_SELECTOR"));
static SCORE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.score").expect("Failed to compile SCORE_SELECTOR"));
static META_LINE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.scorebox_meta > div, div.scorebox_meta > p")
        .expect("Failed to compile META_LINE_SELECTOR")
});
static LINESCORE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("table#linescore, table.linescore").expect("Failed to compile LINESCORE_SELECTOR")
});
static TFOOT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tfoot").expect("Failed to compile TFOOT_SELECTOR"));
static TEXT_BLOCK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div, p").expect("Failed to compile TEXT_BLOCK_SELECTOR"));

// --- Regex Patterns ---
static LONG_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z]+, [A-Za-z]+ \d{1,2}, \d{4})").expect("Failed to compile LONG_DATE_RE")
});
static URL_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{8})\d?\.shtml").expect("Failed to compile URL_DATE_RE"));
static WP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"WP:\s*([^(•*]+?)\s*\(").expect("Failed to compile WP_RE"));
static LP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"LP:\s*([^(•*]+?)\s*\(").expect("Failed to compile LP_RE"));
static SV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"SV:\s*([^(•*]+?)\s*\(").expect("Failed to compile SV_RE"));

// Labelled lines in the meta block and the commented "other info" box.
const START_TIME: &str = "Start Time:";
const DURATION_LABELS: &[&str] = &["Game Duration:", "Time of Game:"];
const ATTENDANCE: &str = "Attendance:";
const VENUE: &str = "Venue:";
const FIELD_CONDITION: &str = "Field Condition:";
const WEATHER: &str = "Weather:";
const UMPIRES: &str = "Umpires:";

/// Reads the score box, meta block and pitcher-of-record line of a
/// box-score page. Each piece is optional; missing pieces stay `None`.
pub fn parse_game_info(document: &Html, url: Option<&str>) -> GameInfoRecord {
    let mut info = GameInfoRecord {
        url: url.map(str::to_string),
        ..GameInfoRecord::default()
    };

    read_scorebox(document, &mut info);

    let meta_lines: Vec<String> = document.select(&META_LINE_SELECTOR).map(clean_text).collect();
    if meta_lines.is_empty() {
        tracing::warn!("No scorebox meta block found");
    }
    info.game_date = meta_lines.iter().find_map(|line| long_date_to_iso(line));
    for line in &meta_lines {
        apply_labelled_line(line, &mut info);
    }

    // Umpires, weather and field condition usually sit in a commented-out box.
    if info.umpires.is_empty() || info.weather.is_none() || info.field_condition.is_none() {
        for comment in comment_texts(document) {
            if !comment.contains(UMPIRES) && !comment.contains(WEATHER) {
                continue;
            }
            let fragment = Html::parse_fragment(&comment);
            for block in fragment.select(&TEXT_BLOCK_SELECTOR) {
                if has_block_children(block) {
                    continue;
                }
                apply_labelled_line(&clean_text(block), &mut info);
            }
        }
    }

    read_pitchers_of_record(document, &mut info);

    tracing::debug!("Extracted game info: {:?}", info);
    info
}

fn read_scorebox(document: &Html, info: &mut GameInfoRecord) {
    let sides: Vec<(String, Option<i64>)> = document
        .select(&SCOREBOX_TEAM_SELECTOR)
        .filter_map(|block| {
            let name = block.select(&TEAM_NAME_SELECTOR).next().map(clean_text)?;
            if name.is_empty() {
                return None;
            }
            let score = block.select(&SCORE_SELECTOR).next().and_then(|s| {
                let text = clean_text(s);
                let parsed = text.parse::<i64>().ok();
                if parsed.is_none() {
                    tracing::debug!("Unparsable score '{}' for {}", text, name);
                }
                parsed
            });
            Some((name, score))
        })
        .collect();

    match sides.as_slice() {
        [(away, away_score), (home, home_score), ..] => {
            info.away_team = Some(away.clone());
            info.away_score = *away_score;
            info.home_team = Some(home.clone());
            info.home_score = *home_score;
        }
        _ => tracing::warn!("Scorebox did not list two teams (found {})", sides.len()),
    }
}

fn apply_labelled_line(line: &str, info: &mut GameInfoRecord) {
    if let Some(value) = value_after(line, START_TIME) {
        info.start_time.get_or_insert(value);
    } else if let Some(value) = DURATION_LABELS.iter().find_map(|label| value_after(line, label)) {
        info.game_duration.get_or_insert(value);
    } else if let Some(value) = value_after(line, ATTENDANCE) {
        let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
        match digits.parse::<i64>() {
            Ok(attendance) => {
                info.attendance.get_or_insert(attendance);
            }
            Err(_) => tracing::debug!("Unparsable attendance '{}'", value),
        }
    } else if let Some(value) = value_after(line, VENUE) {
        info.venue.get_or_insert(value);
    } else if let Some(value) = value_after(line, FIELD_CONDITION) {
        info.field_condition.get_or_insert(value);
    } else if let Some(value) = value_after(line, WEATHER) {
        info.weather.get_or_insert(value);
    } else if let Some(value) = value_after(line, UMPIRES) {
        if info.umpires.is_empty() {
            info.umpires = value
                .trim_end_matches('.')
                .split(',')
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect();
        }
    }
}

fn value_after(line: &str, label: &str) -> Option<String> {
    let (_, rest) = line.split_once(label)?;
    let value = rest.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn has_block_children(element: ElementRef<'_>) -> bool {
    element.children().filter_map(ElementRef::wrap).any(|child| {
        let name = child.value().name();
        name == "div" || name == "p"
    })
}

fn read_pitchers_of_record(document: &Html, info: &mut GameInfoRecord) {
    let Some(line) = pitcher_line(document) else {
        tracing::warn!("Could not find the WP/LP/SV line");
        return;
    };
    info.winning_pitcher = first_capture(&WP_RE, &line);
    info.losing_pitcher = first_capture(&LP_RE, &line);
    info.save_pitcher = first_capture(&SV_RE, &line);
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|caps| caps[1].trim().to_string())
}

fn has_roles(text: &str) -> bool {
    text.contains("WP:") || text.contains("LP:") || text.contains("SV:")
}

// The line lives in the line-score footer or in the element right after it.
fn pitcher_line(document: &Html) -> Option<String> {
    let Some(linescore) = document.select(&LINESCORE_SELECTOR).next() else {
        tracing::warn!("Could not find linescore table to locate pitcher roles");
        return None;
    };
    if let Some(tfoot) = linescore.select(&TFOOT_SELECTOR).next() {
        let text = clean_text(tfoot);
        if has_roles(&text) {
            return Some(text);
        }
    }
    linescore
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .map(clean_text)
        .find(|text| has_roles(text))
}

/// "Saturday, July 15, 2023" anywhere in `text` -> "2023-07-15".
pub fn long_date_to_iso(text: &str) -> Option<String> {
    let raw = LONG_DATE_RE.captures(text)?.get(1)?.as_str();
    match NaiveDate::parse_from_str(raw, "%A, %B %d, %Y") {
        Ok(date) => Some(date.format("%Y-%m-%d").to_string()),
        Err(e) => {
            tracing::debug!("Could not parse game date '{}': {}", raw, e);
            None
        }
    }
}

/// Date encoded in a box-score URL such as `/boxes/NYA/NYA202307150.shtml`.
pub fn game_date_from_url(url: &str) -> Option<String> {
    let digits = URL_DATE_RE.captures(url)?.get(1)?.as_str();
    NaiveDate::parse_from_str(digits, "%Y%m%d")
        .ok()
        .map(|date| date.format("%Y-%m-%d").to_string())
}
