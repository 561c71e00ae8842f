// src/utils/html_debug.rs
use std::fs::File;
use std::io::Write;
use std::path::Path;

use regex::Regex;

use crate::utils::error::StorageError;

/// Patterns highlighted in the annotated copy of a box-score page.
/// Comment openers are matched together with the table they hide so the
/// annotated page shows at a glance which stat tables were commented out.
pub const BOX_SCORE_DEBUG_PATTERNS: &[(&str, &str)] = &[
    (r#"(?i)<!--\s*<table[^>]*>"#, "comment-table"),
    (r#"(?i)<table[^>]*id="[^"]*batting[^"]*"[^>]*>"#, "batting"),
    (r#"(?i)<table[^>]*id="[^"]*pitching[^"]*"[^>]*>"#, "pitching"),
    (r#"(?i)<div[^>]*id="div_(?:starting_)?lineups"[^>]*>"#, "lineup"),
    (r#"<th[^>]*data-stat="[^"]*"[^>]*>"#, "header"),
    (r#"(?i)<tr[^>]*class="[^"]*(?:total_row|spacer)[^"]*"[^>]*>"#, "skipped-row"),
];

/// Saves an HTML page to a file with debug highlights.
///
/// Highlights are `(start, end, kind)` byte ranges into `html`; the matched
/// markup is escaped so it renders as visible text inside the highlight.
pub fn save_debug_html(
    html: &str,
    path: &Path,
    highlights: &[(usize, usize, &str)],
) -> Result<(), StorageError> {
    let mut file = File::create(path)?;

    let mut debug_html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<style>\n");
    debug_html.push_str(".highlight-comment-table { background-color: #FFFF00; }\n");
    debug_html.push_str(".highlight-batting { background-color: #90EE90; }\n");
    debug_html.push_str(".highlight-pitching { background-color: #ADD8E6; }\n");
    debug_html.push_str(".highlight-lineup { background-color: #FFA500; }\n");
    debug_html.push_str(".highlight-header { background-color: #E6E6FA; }\n");
    debug_html.push_str(".highlight-custom { background-color: #FFC0CB; }\n");
    debug_html.push_str("</style>\n</head>\n<body>\n");

    let mut sorted = highlights.to_vec();
    sorted.sort_by_key(|h| h.0);

    let mut last_pos = 0;
    for (start, end, kind) in sorted {
        // Overlapping matches are dropped; the earlier one wins.
        if start < last_pos || end > html.len() {
            continue;
        }
        debug_html.push_str(&html[last_pos..start]);

        let css_class = match kind {
            "comment-table" => "highlight-comment-table",
            "batting" => "highlight-batting",
            "pitching" => "highlight-pitching",
            "lineup" => "highlight-lineup",
            "header" => "highlight-header",
            _ => "highlight-custom",
        };
        debug_html.push_str(&format!(
            "<span class=\"{}\" title=\"Position: {}-{}, Type: {}\">",
            css_class, start, end, kind
        ));
        debug_html.push_str(&escape_markup(&html[start..end]));
        debug_html.push_str("</span>");

        last_pos = end;
    }
    if last_pos < html.len() {
        debug_html.push_str(&html[last_pos..]);
    }
    debug_html.push_str("\n</body>\n</html>");

    file.write_all(debug_html.as_bytes())?;

    tracing::info!("Saved debug HTML to {}", path.display());
    Ok(())
}

/// Creates a debug copy of `html` with every match of `patterns` highlighted.
/// Invalid patterns are skipped with a warning.
pub fn create_debug_html(
    html: &str,
    path: &Path,
    patterns: &[(&str, &str)],
) -> Result<usize, StorageError> {
    let highlights = find_highlights(html, patterns);
    save_debug_html(html, path, &highlights)?;
    Ok(highlights.len())
}

fn find_highlights<'p>(html: &str, patterns: &[(&str, &'p str)]) -> Vec<(usize, usize, &'p str)> {
    let mut highlights = Vec::new();
    for (pattern, kind) in patterns {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!("Skipping invalid debug pattern '{}': {}", pattern, e);
                continue;
            }
        };
        for mat in re.find_iter(html) {
            highlights.push((mat.start(), mat.end(), *kind));
        }
    }
    highlights
}

fn escape_markup(fragment: &str) -> String {
    fragment.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlights_comment_embedded_tables() {
        let html = r#"<div id="all_box-NYY-batting"><!-- <table id="box-NYY-batting"><thead><tr><th data-stat="player">Batting</th></tr></thead></table> --></div>"#;
        let highlights = find_highlights(html, BOX_SCORE_DEBUG_PATTERNS);
        let kinds: Vec<&str> = highlights.iter().map(|h| h.2).collect();
        assert!(kinds.contains(&"comment-table"));
        assert!(kinds.contains(&"batting"));
        assert!(kinds.contains(&"header"));
    }

    #[test]
    fn writes_annotated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotated.html");
        let html = r#"<table id="box-BOS-pitching"><tr class="total_row"><td>x</td></tr></table>"#;

        let count = create_debug_html(html, &path, BOX_SCORE_DEBUG_PATTERNS).unwrap();
        assert_eq!(count, 2);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("highlight-pitching"));
        assert!(written.contains("&lt;table id=\"box-BOS-pitching\"&gt;"));
    }
}
