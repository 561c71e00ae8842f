// src/config.rs
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::boxscore::NumericFields;
use crate::identity::{MatchPolicy, TeamResolver};
use crate::utils::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

const BATTING_NUMERIC: &[&str] = &[
    // counts
    "AB", "R", "H", "RBI", "BB", "SO", "PA", "HR", "2B", "3B", "SB", "CS", "HBP", "SF", "GDP", "IBB",
    "pitches", "strikes_total", "PO", "A",
    // rates and win-probability columns
    "AVG", "OBP", "SLG", "OPS", "batting_avg", "onbase_perc", "slugging_perc", "onbase_plus_slugging",
    "BAbip", "WPA", "aLI", "WPA+", "WPA-", "cWPA", "acLI", "RE24", "leverage_index_avg",
];

const PITCHING_NUMERIC: &[&str] = &[
    "H", "R", "ER", "BB", "SO", "HR", "BF", "Pit", "Str", "Ctct", "StS", "StL", "GB", "FB", "LD", "Unk",
    "GSc", "IR", "IS", "batters_faced", "pitches", "strikes_total", "inherited_runners", "inherited_score",
    "game_score",
    "IP", "ERA", "WPA", "aLI", "cWPA", "acLI", "RE24", "earned_run_avg", "leverage_index_avg",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scraping: ScrapingConfig,
    pub odds_api: OddsApiConfig,
    pub teams: TeamsConfig,
    pub numeric_fields: NumericFieldsConfig,
    pub export: ExportConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub base_url: String,
    pub delay_between_requests_ms: u64,
    pub max_retries: u32,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.baseball-reference.com".to_string(),
            delay_between_requests_ms: 2000,
            max_retries: 3,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                         Chrome/120.0 Safari/537.36"
                .to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OddsApiConfig {
    pub base_url: String,
    /// Without a key odds are not fetched.
    pub api_key: Option<String>,
    pub regions: String,
    pub markets: String,
    pub odds_format: String,
    pub date_format: String,
    /// How many days a commence date may sit from the game date.
    pub day_tolerance: u32,
}

impl Default for OddsApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.the-odds-api.com/v4/sports/baseball_mlb/odds/".to_string(),
            api_key: None,
            regions: "us".to_string(),
            markets: "h2h,spreads,totals".to_string(),
            odds_format: "decimal".to_string(),
            date_format: "iso".to_string(),
            day_tolerance: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamsConfig {
    /// Surface form -> canonical team name.
    pub overrides: HashMap<String, String>,
    pub match_policy: MatchPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericFieldsConfig {
    pub batting: Vec<String>,
    pub pitching: Vec<String>,
}

impl Default for NumericFieldsConfig {
    fn default() -> Self {
        Self {
            batting: BATTING_NUMERIC.iter().map(|s| s.to_string()).collect(),
            pitching: PITCHING_NUMERIC.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: String,
    pub formats: Vec<ExportFormat>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: "./output".to_string(),
            formats: vec![ExportFormat::Csv, ExportFormat::Json],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub days_back: u32,
    pub fetch_upcoming_odds: bool,
    pub days_forward: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            days_back: 1,
            fetch_upcoming_odds: false,
            days_forward: 2,
        }
    }
}

impl AppConfig {
    /// Parses a configuration from JSON text; absent sections take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads `path`, falling back to the defaults when the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn resolver(&self) -> TeamResolver {
        TeamResolver::new(&self.teams.overrides, self.teams.match_policy)
    }

    pub fn numeric_fields(&self) -> NumericFields {
        NumericFields::new(
            self.numeric_fields.batting.iter().cloned(),
            self.numeric_fields.pitching.iter().cloned(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::TableKind;

    #[test]
    fn empty_json_gives_defaults() {
        let config = AppConfig::from_json_str("{}").unwrap();
        assert_eq!(config.scraping.base_url, "https://www.baseball-reference.com");
        assert_eq!(config.scraping.max_retries, 3);
        assert_eq!(config.odds_api.markets, "h2h,spreads,totals");
        assert_eq!(config.odds_api.day_tolerance, 0);
        assert_eq!(config.teams.match_policy, MatchPolicy::Containment);
        assert!(config.export.formats.contains(&ExportFormat::Csv) && config.export.formats.contains(&ExportFormat::Json));
        assert_eq!(config.pipeline.days_back, 1);

        let numeric = config.numeric_fields();
        assert!(numeric.is_numeric(TableKind::Batting, "AB"));
        assert!(numeric.is_numeric(TableKind::Pitching, "IP"));
        assert!(!numeric.is_numeric(TableKind::Batting, "IP"));
    }

    #[test]
    fn partial_sections_and_overrides() {
        let config = AppConfig::from_json_str(
            r#"{
                "odds_api": {"api_key": "k", "day_tolerance": 1},
                "teams": {"overrides": {"Bronx Bombers": "New York Yankees"}, "match_policy": "exact"},
                "export": {"formats": ["json"]}
            }"#,
        )
        .unwrap();
        assert_eq!(config.odds_api.api_key.as_deref(), Some("k"));
        assert_eq!(config.odds_api.regions, "us");
        assert!(!config.export.formats.contains(&ExportFormat::Csv));

        let resolver = config.resolver();
        assert!(!resolver.is_same_team("New York", "New York Yankees"));
        assert_eq!(resolver.canonical_team("Bronx Bombers"), "New York Yankees");
    }

    #[test]
    fn missing_file_falls_back_and_bad_json_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(config.export.output_dir, "./output");

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(&bad), Err(ConfigError::Json(_))));
    }
}
