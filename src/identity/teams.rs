// src/identity/teams.rs
use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// How strictly `is_same_team` compares two canonicalized names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Equal, or either name contains the other (case-insensitive).
    #[default]
    Containment,
    /// Equal after canonicalization only.
    Exact,
}

// (canonical full name, short display name, abbreviations)
const MLB_TEAMS: &[(&str, &str, &[&str])] = &[
    ("Arizona Diamondbacks", "Diamondbacks", &["ARI", "AZ"]),
    ("Atlanta Braves", "Braves", &["ATL"]),
    ("Baltimore Orioles", "Orioles", &["BAL"]),
    ("Boston Red Sox", "Red Sox", &["BOS"]),
    ("Chicago Cubs", "Cubs", &["CHC"]),
    ("Chicago White Sox", "White Sox", &["CHW", "CWS"]),
    ("Cincinnati Reds", "Reds", &["CIN"]),
    ("Cleveland Guardians", "Guardians", &["CLE"]),
    ("Colorado Rockies", "Rockies", &["COL"]),
    ("Detroit Tigers", "Tigers", &["DET"]),
    ("Houston Astros", "Astros", &["HOU"]),
    ("Kansas City Royals", "Royals", &["KCR", "KC"]),
    ("Los Angeles Angels", "Angels", &["LAA", "ANA"]),
    ("Los Angeles Dodgers", "Dodgers", &["LAD", "LA"]),
    ("Miami Marlins", "Marlins", &["MIA"]),
    ("Milwaukee Brewers", "Brewers", &["MIL"]),
    ("Minnesota Twins", "Twins", &["MIN"]),
    ("New York Mets", "Mets", &["NYM"]),
    ("New York Yankees", "Yankees", &["NYY"]),
    ("Oakland Athletics", "Athletics", &["OAK", "ATH"]),
    ("Philadelphia Phillies", "Phillies", &["PHI"]),
    ("Pittsburgh Pirates", "Pirates", &["PIT"]),
    ("San Diego Padres", "Padres", &["SDP", "SD"]),
    ("San Francisco Giants", "Giants", &["SFG", "SF"]),
    ("Seattle Mariners", "Mariners", &["SEA"]),
    ("St. Louis Cardinals", "Cardinals", &["STL"]),
    ("Tampa Bay Rays", "Rays", &["TBR", "TB"]),
    ("Texas Rangers", "Rangers", &["TEX"]),
    ("Toronto Blue Jays", "Blue Jays", &["TOR"]),
    ("Washington Nationals", "Nationals", &["WSN", "WSH", "WAS"]),
    // All-Star Game sides
    ("National League", "National League", &["NL"]),
    ("American League", "American League", &["AL"]),
];

// Stat table ids look like `box-NYY-batting` or `NewYorkYankeespitching`,
// sometimes behind an `all_` wrapper prefix.
static TABLE_ID_TEAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:all_)?(?:div_)?(?:box-)?(?P<team>[A-Za-z0-9.]+?)-?(?:batting|pitching)$")
        .expect("Failed to compile TABLE_ID_TEAM_RE")
});

/// Maps the many spellings of a team (site abbreviations, odds-API full
/// names, short display names, compact table-id forms, config overrides) to
/// one canonical string.
///
/// The lookup tables are fixed at construction; resolution never mutates
/// them, so a resolver can be shared freely across threads.
#[derive(Debug, Clone)]
pub struct TeamResolver {
    exact: HashMap<String, String>,
    folded: HashMap<String, String>,
    policy: MatchPolicy,
}

impl Default for TeamResolver {
    fn default() -> Self {
        Self::new(&HashMap::new(), MatchPolicy::default())
    }
}

impl TeamResolver {
    /// Builds the default MLB table and overlays `overrides`; an override
    /// wins over a default entry with the same key.
    pub fn new(overrides: &HashMap<String, String>, policy: MatchPolicy) -> Self {
        let mut resolver = Self {
            exact: HashMap::new(),
            folded: HashMap::new(),
            policy,
        };

        for (full, short, abbreviations) in MLB_TEAMS {
            resolver.add(full, full);
            resolver.add(short, full);
            resolver.folded.insert(compact(full), full.to_string());
            for abbr in *abbreviations {
                resolver.add(abbr, full);
            }
        }

        // Sorted so colliding case-folded override keys resolve the same way every run.
        let mut keys: Vec<&String> = overrides.keys().collect();
        keys.sort();
        for key in keys {
            let value = &overrides[key];
            tracing::debug!("Team override: '{}' -> '{}'", key, value);
            resolver.add(key.trim(), value.trim());
        }

        resolver
    }

    fn add(&mut self, key: &str, canonical: &str) {
        self.exact.insert(key.to_string(), canonical.to_string());
        self.folded.insert(key.to_lowercase(), canonical.to_string());
    }

    /// Looks a name up without logging: exact key first, then case-folded.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return None;
        }
        self.exact
            .get(trimmed)
            .or_else(|| self.folded.get(&trimmed.to_lowercase()))
            .map(String::as_str)
    }

    /// Canonical identity of `name`. Unmapped names come back trimmed and
    /// unchanged so they still flow through the pipeline.
    pub fn canonical_team(&self, name: &str) -> String {
        match self.resolve(name) {
            Some(canonical) => canonical.to_string(),
            None => {
                let trimmed = name.trim();
                if !trimmed.is_empty() {
                    tracing::warn!("No team mapping for '{}'; using it as-is", trimmed);
                }
                trimmed.to_string()
            }
        }
    }

    /// Whether two surface forms name the same team under the resolver's
    /// match policy. Empty names never match anything.
    pub fn is_same_team(&self, a: &str, b: &str) -> bool {
        let a = self.quiet_canonical(a).to_lowercase();
        let b = self.quiet_canonical(b).to_lowercase();
        if a.is_empty() || b.is_empty() {
            return false;
        }
        match self.policy {
            MatchPolicy::Exact => a == b,
            MatchPolicy::Containment => a == b || a.contains(&b) || b.contains(&a),
        }
    }

    fn quiet_canonical<'a>(&'a self, name: &'a str) -> &'a str {
        self.resolve(name).unwrap_or_else(|| name.trim())
    }

    /// Canonical team for a stat table identifier such as `box-NYY-batting`.
    pub fn team_from_table_id(&self, table_id: &str) -> Option<String> {
        let token = team_token_from_table_id(table_id)?;
        Some(self.canonical_team(&token))
    }
}

/// Raw team token embedded in a stat table id, before canonicalization.
pub fn team_token_from_table_id(table_id: &str) -> Option<String> {
    TABLE_ID_TEAM_RE
        .captures(table_id.trim())
        .and_then(|caps| caps.name("team"))
        .map(|m| m.as_str().to_string())
        .filter(|token| !token.is_empty())
}

// "St. Louis Cardinals" -> "stlouiscardinals"
fn compact(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> TeamResolver {
        TeamResolver::default()
    }

    #[test]
    fn canonicalizes_abbreviations_and_full_names() {
        let r = resolver();
        assert_eq!(r.canonical_team("NYY"), "New York Yankees");
        assert_eq!(r.canonical_team("new york yankees"), "New York Yankees");
        assert_eq!(r.canonical_team("Red Sox"), "Boston Red Sox");
        assert_eq!(r.canonical_team("  LAD "), "Los Angeles Dodgers");
        assert_eq!(r.canonical_team("StLouisCardinals"), "St. Louis Cardinals");
    }

    #[test]
    fn unmapped_team_is_trimmed_and_kept() {
        let r = resolver();
        assert_eq!(r.canonical_team("  Springfield Isotopes "), "Springfield Isotopes");
        assert_eq!(r.canonical_team(""), "");
    }

    #[test]
    fn same_team_is_case_and_direction_invariant() {
        let r = resolver();
        assert!(r.is_same_team("New York Yankees", "NYY"));
        assert!(r.is_same_team("NYY", "new york yankees"));
        assert!(r.is_same_team("Yankees", "NYY"));
        assert!(!r.is_same_team("Chicago Cubs", "Chicago White Sox"));
        assert!(!r.is_same_team("NYY", "NYM"));
    }

    #[test]
    fn containment_bridges_unmapped_partial_names() {
        let r = resolver();
        // Neither side is in the table; containment still pairs them.
        assert!(r.is_same_team("Isotopes", "Springfield Isotopes"));
        assert!(!r.is_same_team("", "Springfield Isotopes"));
    }

    #[test]
    fn exact_policy_rejects_containment() {
        let r = TeamResolver::new(&HashMap::new(), MatchPolicy::Exact);
        assert!(r.is_same_team("NYY", "New York Yankees"));
        assert!(!r.is_same_team("Isotopes", "Springfield Isotopes"));
    }

    #[test]
    fn overrides_take_precedence() {
        let mut overrides = HashMap::new();
        overrides.insert("ATH".to_string(), "Athletics".to_string());
        overrides.insert("Isotopes".to_string(), "Springfield Isotopes".to_string());
        let r = TeamResolver::new(&overrides, MatchPolicy::Containment);

        assert_eq!(r.canonical_team("ATH"), "Athletics");
        assert_eq!(r.canonical_team("isotopes"), "Springfield Isotopes");
        // Untouched defaults remain.
        assert_eq!(r.canonical_team("OAK"), "Oakland Athletics");
    }

    #[test]
    fn team_from_table_ids() {
        let r = resolver();
        assert_eq!(r.team_from_table_id("box-NYY-batting").as_deref(), Some("New York Yankees"));
        assert_eq!(
            r.team_from_table_id("ArizonaDiamondbackspitching").as_deref(),
            Some("Arizona Diamondbacks")
        );
        assert_eq!(r.team_from_table_id("all_BostonRedSoxbatting").as_deref(), Some("Boston Red Sox"));
        assert_eq!(r.team_from_table_id("lineups_1"), None);
    }
}
