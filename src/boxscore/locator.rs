// src/boxscore/locator.rs
//! Finds batting, pitching and lineup tables on a box-score page.
//!
//! The source site ships most of its stat tables inside HTML comments and
//! only un-comments them client side, so every search runs in two phases:
//! the visible DOM first, then each comment re-parsed as a fragment. Lineups
//! get a third, content-based phase because their container ids have changed
//! across seasons.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{node::Node, ElementRef, Html, Selector};

use crate::identity::is_player_profile_href;
use crate::records::TableKind;

// --- CSS Selectors (Lazy Static) ---
static TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("Failed to compile TABLE_SELECTOR"));

static LINEUP_SECTION_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div#div_lineups, div#div_starting_lineups, div#starting_lineups, div#lineups")
        .expect("Failed to compile LINEUP_SECTION_SELECTOR")
});

// Preferred lineup tables inside a section; any table is the fallback.
static LINEUP_TABLE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "table.data_grid_box, table.lineup, table.lineups, \
         table#lineups_1, table#lineups_2, table#lineup_1, table#lineup_2",
    )
    .expect("Failed to compile LINEUP_TABLE_SELECTOR")
});

static DIV_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div").expect("Failed to compile DIV_SELECTOR"));

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("Failed to compile LINK_SELECTOR"));

static CAPTION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("caption").expect("Failed to compile CAPTION_SELECTOR"));

static HEADING_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2, h3, h4, h5").expect("Failed to compile HEADING_SELECTOR"));

// --- Id patterns ---
// `box-NYY-batting`, `NewYorkYankeesbatting`; never the `all_` wrapper divs.
static BATTING_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:box-[a-z0-9]+-|[a-z0-9.]+)batting$").expect("Failed to compile BATTING_ID_RE")
});
static PITCHING_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:box-[a-z0-9]+-|[a-z0-9.]+)pitching$").expect("Failed to compile PITCHING_ID_RE")
});

/// Minimum number of player-profile links for a container to be treated as
/// a lineup section by content (nine starters per side).
pub const LINEUP_MIN_PLAYER_LINKS: usize = 18;
const LINEUP_KEYWORDS: &[&str] = &["lineup", "starting", "batting order"];

/// Where a located table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOrigin {
    /// Present in the visible document.
    Dom,
    /// Re-parsed out of an HTML comment.
    Comment,
    /// Picked by the lineup content heuristic.
    Heuristic,
}

/// A located table. The markup is kept as an owned string so tables pulled
/// out of short-lived comment fragments outlive the fragment they came from.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub origin: TableOrigin,
    /// `id` and `class` attributes, space separated.
    pub identifier: String,
    pub id: Option<String>,
    /// Caption or nearest heading, used to name lineup teams.
    pub label: Option<String>,
    /// Zero-based position among the tables returned for this kind.
    pub position: usize,
    pub html: String,
}

/// Locates all tables of `kind` in document order. Never fails: a page
/// without matching tables yields an empty vector.
pub fn locate_tables(document: &Html, kind: TableKind) -> Vec<RawTable> {
    let mut found = search(document, kind, TableOrigin::Dom);
    if !found.is_empty() {
        tracing::debug!("Found {} {} table(s) in visible DOM", found.len(), kind);
        return renumber(found);
    }

    for comment in comment_texts(document) {
        if !comment_may_hold(&comment, kind) {
            continue;
        }
        let fragment = Html::parse_fragment(&comment);
        found.extend(search(&fragment, kind, TableOrigin::Comment));
    }
    if !found.is_empty() {
        tracing::debug!("Found {} {} table(s) inside HTML comments", found.len(), kind);
        return renumber(found);
    }

    if kind == TableKind::Lineup {
        found = lineup_by_content(document);
        if !found.is_empty() {
            tracing::info!("Found {} lineup table(s) by content analysis", found.len());
        }
    }

    renumber(found)
}

fn renumber(mut tables: Vec<RawTable>) -> Vec<RawTable> {
    for (i, table) in tables.iter_mut().enumerate() {
        table.position = i;
    }
    tables
}

fn search(root: &Html, kind: TableKind, origin: TableOrigin) -> Vec<RawTable> {
    match kind {
        TableKind::Batting => stat_tables(root, &BATTING_ID_RE, origin),
        TableKind::Pitching => stat_tables(root, &PITCHING_ID_RE, origin),
        TableKind::Lineup => lineup_sections(root, origin),
    }
}

// A table qualifies when its id or any one of its class tokens matches.
fn stat_tables(root: &Html, pattern: &Regex, origin: TableOrigin) -> Vec<RawTable> {
    root.select(&TABLE_SELECTOR)
        .filter(|table| {
            let element = table.value();
            element.attr("id").map(|id| pattern.is_match(id.trim())).unwrap_or(false)
                || element.classes().any(|class| pattern.is_match(class))
        })
        .map(|table| raw_table(table, origin))
        .collect()
}

fn lineup_sections(root: &Html, origin: TableOrigin) -> Vec<RawTable> {
    let mut tables = Vec::new();
    let mut seen = HashSet::new();
    for section in root.select(&LINEUP_SECTION_SELECTOR) {
        for table in lineup_tables_in(section) {
            // Nested section ids (div_lineups > lineups) would list a table twice.
            if seen.insert(table.id()) {
                tables.push(raw_table(table, origin));
            }
        }
    }
    tables
}

fn lineup_tables_in(section: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let preferred: Vec<ElementRef> = section.select(&LINEUP_TABLE_SELECTOR).collect();
    if !preferred.is_empty() {
        return preferred;
    }
    section.select(&TABLE_SELECTOR).collect()
}

fn lineup_by_content(document: &Html) -> Vec<RawTable> {
    let qualifying: Vec<ElementRef> = document
        .select(&DIV_SELECTOR)
        .filter(|div| looks_like_lineup_container(*div))
        .collect();
    let qualifying_ids: HashSet<_> = qualifying.iter().map(|div| div.id()).collect();

    // Outer wrappers (the page body, content divs) qualify too; keep only
    // the innermost containers.
    let innermost = qualifying.into_iter().filter(|div| {
        !div.descendants()
            .skip(1)
            .any(|node| qualifying_ids.contains(&node.id()))
    });

    let mut tables = Vec::new();
    for container in innermost {
        let inner: Vec<ElementRef> = container.select(&TABLE_SELECTOR).collect();
        if inner.is_empty() {
            tables.push(raw_table(container, TableOrigin::Heuristic));
        } else {
            tables.extend(inner.into_iter().map(|t| raw_table(t, TableOrigin::Heuristic)));
        }
    }
    tables
}

fn looks_like_lineup_container(div: ElementRef<'_>) -> bool {
    let player_links = div
        .select(&LINK_SELECTOR)
        .filter(|a| a.value().attr("href").map(is_player_profile_href).unwrap_or(false))
        .count();
    if player_links < LINEUP_MIN_PLAYER_LINKS {
        return false;
    }
    let text = div.text().collect::<String>().to_lowercase();
    LINEUP_KEYWORDS.iter().any(|keyword| text.contains(keyword))
}

/// Text of every comment node in document order.
pub fn comment_texts(document: &Html) -> Vec<String> {
    document
        .tree
        .root()
        .descendants()
        .filter_map(|node| match node.value() {
            Node::Comment(comment) => {
                let text: &str = &comment.comment;
                Some(text.to_string())
            }
            _ => None,
        })
        .collect()
}

// Cheap pre-check so only comments that can contain a match get re-parsed.
fn comment_may_hold(comment: &str, kind: TableKind) -> bool {
    let lower = comment.to_lowercase();
    if !lower.contains("<table") {
        return false;
    }
    match kind {
        TableKind::Batting => lower.contains("batting"),
        TableKind::Pitching => lower.contains("pitching"),
        TableKind::Lineup => lower.contains("lineup"),
    }
}

fn raw_table(element: ElementRef<'_>, origin: TableOrigin) -> RawTable {
    let id = element.value().attr("id").map(|s| s.trim().to_string());
    let classes = element.value().attr("class").unwrap_or("").trim();
    let identifier = format!("{} {}", id.as_deref().unwrap_or(""), classes)
        .trim()
        .to_string();

    RawTable {
        origin,
        identifier,
        id,
        label: table_label(element),
        position: 0,
        html: element.html(),
    }
}

/// Caption text, else the nearest preceding sibling heading, else the first
/// heading in the parent container.
fn table_label(element: ElementRef<'_>) -> Option<String> {
    if let Some(caption) = element.select(&CAPTION_SELECTOR).next() {
        let text = clean_text(caption);
        if !text.is_empty() && !text.eq_ignore_ascii_case("table") {
            return Some(text);
        }
    }

    for sibling in element.prev_siblings().filter_map(ElementRef::wrap) {
        if HEADING_SELECTOR.matches(&sibling) {
            let text = clean_text(sibling);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    let parent = element.parent().and_then(ElementRef::wrap)?;
    parent
        .select(&HEADING_SELECTOR)
        .map(clean_text)
        .find(|text| !text.is_empty())
}

/// Element text with runs of whitespace (including `&nbsp;`) collapsed.
pub fn clean_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATTING_TABLE: &str = r#"<table class="sortable stats_table" id="box-NYY-batting">
        <caption>New York Yankees</caption>
        <thead><tr><th data-stat="player">Batting</th><th data-stat="AB">AB</th></tr></thead>
        <tbody><tr><th data-stat="player"><a href="/players/j/judgeaa01.shtml">Aaron Judge</a> RF</th><td data-stat="AB">4</td></tr></tbody>
    </table>"#;

    fn page(body: &str) -> Html {
        Html::parse_document(&format!("<html><body><div id=\"content\">{}</div></body></html>", body))
    }

    #[test]
    fn finds_visible_tables() {
        let doc = page(BATTING_TABLE);
        let tables = locate_tables(&doc, TableKind::Batting);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].origin, TableOrigin::Dom);
        assert_eq!(tables[0].id.as_deref(), Some("box-NYY-batting"));
        assert_eq!(tables[0].identifier, "box-NYY-batting sortable stats_table");
        assert_eq!(tables[0].label.as_deref(), Some("New York Yankees"));
    }

    #[test]
    fn finds_tables_marked_only_by_class() {
        let doc = page(
            r#"<table class="stats_table box-BOS-pitching"><caption>Boston Red Sox</caption>
                 <tr><th>Pitching</th><th>IP</th></tr><tr><td>Chris Sale</td><td>6.0</td></tr></table>
               <table class="stats_table pitching"><tr><td>not a box table</td></tr></table>"#,
        );
        let tables = locate_tables(&doc, TableKind::Pitching);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].id, None);
        assert_eq!(tables[0].label.as_deref(), Some("Boston Red Sox"));
        assert!(locate_tables(&doc, TableKind::Batting).is_empty());
    }

    #[test]
    fn comment_embedded_tables_match_visible_ones() {
        let visible = page(BATTING_TABLE);
        let hidden = page(&format!("<div id=\"all_box-NYY-batting\"><!--{}--></div>", BATTING_TABLE));

        let a = locate_tables(&visible, TableKind::Batting);
        let b = locate_tables(&hidden, TableKind::Batting);
        assert_eq!(b.len(), 1);
        assert_eq!(b[0].origin, TableOrigin::Comment);
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(a[0].identifier, b[0].identifier);
        assert_eq!(a[0].html, b[0].html);
    }

    #[test]
    fn keeps_document_order_across_comments() {
        let doc = page(
            r#"<div id="all_NewYorkYankeespitching"><!-- <table id="NewYorkYankeespitching"><tr><td>x</td></tr></table> --></div>
               <div id="all_BostonRedSoxpitching"><!-- <table id="BostonRedSoxpitching"><tr><td>y</td></tr></table> --></div>"#,
        );
        let tables = locate_tables(&doc, TableKind::Pitching);
        let ids: Vec<_> = tables.iter().map(|t| t.id.clone().unwrap()).collect();
        assert_eq!(ids, vec!["NewYorkYankeespitching", "BostonRedSoxpitching"]);
        assert_eq!(tables[1].position, 1);
        // Batting search ignores pitching tables.
        assert!(locate_tables(&doc, TableKind::Batting).is_empty());
    }

    #[test]
    fn missing_tables_are_an_empty_result() {
        let doc = page("<p>No box score here</p><!-- just a note -->");
        assert!(locate_tables(&doc, TableKind::Batting).is_empty());
        assert!(locate_tables(&doc, TableKind::Lineup).is_empty());
        assert!(locate_tables(&Html::parse_document(""), TableKind::Pitching).is_empty());
    }

    #[test]
    fn finds_lineup_section_in_comment() {
        let doc = page(
            r#"<div id="all_lineups"><!--
                <div id="div_lineups">
                  <table class="data_grid_box" id="lineups_1"><caption>NYY</caption><tr><td>1.</td><td>A</td></tr></table>
                  <table class="data_grid_box" id="lineups_2"><caption>BOS</caption><tr><td>1.</td><td>B</td></tr></table>
                </div>
            --></div>"#,
        );
        let tables = locate_tables(&doc, TableKind::Lineup);
        assert_eq!(tables.len(), 2);
        assert!(tables.iter().all(|t| t.origin == TableOrigin::Comment));
        assert_eq!(tables[0].label.as_deref(), Some("NYY"));
        assert_eq!(tables[1].label.as_deref(), Some("BOS"));
    }

    #[test]
    fn falls_back_to_lineup_content_heuristic() {
        let mut rows = String::new();
        for i in 0..18 {
            rows.push_str(&format!(
                "<tr><td>{}.</td><td><a href=\"/players/x/player{:02}.shtml\">Player {}</a></td><td>SS</td></tr>",
                i % 9 + 1,
                i,
                i
            ));
        }
        let doc = page(&format!(
            "<div class=\"section_wrapper\"><h2>Starting Lineups</h2><div class=\"grid\"><table>{}</table></div></div>",
            rows
        ));

        let tables = locate_tables(&doc, TableKind::Lineup);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].origin, TableOrigin::Heuristic);
        assert!(tables[0].html.contains("player17"));
    }

    #[test]
    fn heuristic_requires_lineup_keywords() {
        let mut links = String::new();
        for i in 0..20 {
            links.push_str(&format!("<a href=\"/players/x/p{:02}.shtml\">P</a>", i));
        }
        let doc = page(&format!("<div><p>Leaders</p>{}</div>", links));
        assert!(locate_tables(&doc, TableKind::Lineup).is_empty());
    }
}
