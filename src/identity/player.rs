// src/identity/player.rs
use once_cell::sync::Lazy;
use regex::Regex;

// `/players/j/judgeaa01.shtml`, absolute or relative, query/fragment ignored.
static PLAYER_HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|/)players/[a-z]/(?P<id>[A-Za-z0-9_.'-]+?)(?:\.shtml|\.html?)?(?:[?#].*)?$")
        .expect("Failed to compile PLAYER_HREF_RE")
});

/// Whether `href` points at a player profile page.
pub fn is_player_profile_href(href: &str) -> bool {
    PLAYER_HREF_RE.is_match(href.trim())
}

/// Stable player id from a profile link: the last path segment with its
/// page extension stripped. `None` when the link is absent or not a
/// profile URL.
pub fn player_id_from_href(href: Option<&str>) -> Option<String> {
    let href = href?.trim();
    let id = PLAYER_HREF_RE.captures(href)?.name("id")?.as_str();
    if id.is_empty() {
        tracing::debug!("Profile link without an id segment: '{}'", href);
        return None;
    }
    Some(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_from_relative_and_absolute_links() {
        assert_eq!(player_id_from_href(Some("/players/j/judgeaa01.shtml")).as_deref(), Some("judgeaa01"));
        assert_eq!(
            player_id_from_href(Some("https://www.baseball-reference.com/players/c/colege01.shtml")).as_deref(),
            Some("colege01")
        );
        assert_eq!(player_id_from_href(Some("/players/d/devered01.shtml#batting")).as_deref(), Some("devered01"));
    }

    #[test]
    fn rejects_non_profile_links() {
        assert_eq!(player_id_from_href(None), None);
        assert_eq!(player_id_from_href(Some("")), None);
        assert_eq!(player_id_from_href(Some("/teams/NYY/2023.shtml")), None);
        assert_eq!(player_id_from_href(Some("/players/")), None);
        assert!(!is_player_profile_href("/boxes/NYA/NYA202307150.shtml"));
        assert!(is_player_profile_href("/players/k/martel01.shtml"));
    }
}
