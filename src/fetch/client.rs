// src/fetch/client.rs
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use reqwest::{header, StatusCode};

use crate::config::{OddsApiConfig, ScrapingConfig};
use crate::odds::{parse_events, OddsEvent};
use crate::records::OddsRecord;
use crate::utils::error::FetchError;

/// Shared HTTP client plus the pacing and retry settings of one run.
pub struct Fetcher {
    client: reqwest::Client,
    scraping: ScrapingConfig,
    odds: OddsApiConfig,
}

/// Creates a reqwest client with the configured User-Agent and timeout.
pub fn build_client(scraping: &ScrapingConfig) -> Result<reqwest::Client, FetchError> {
    Ok(reqwest::Client::builder()
        .user_agent(scraping.user_agent.as_str())
        .timeout(Duration::from_secs(scraping.timeout_secs))
        .build()?)
}

impl Fetcher {
    pub fn new(scraping: &ScrapingConfig, odds: &OddsApiConfig) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(scraping)?,
            scraping: scraping.clone(),
            odds: odds.clone(),
        })
    }

    pub fn has_odds_key(&self) -> bool {
        self.odds.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// Downloads a page, waiting the configured delay before every attempt.
    /// 403/429 wait twice as long before the next attempt; 404 is final.
    pub async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let attempts = self.scraping.max_retries.max(1);
        let delay = Duration::from_millis(self.scraping.delay_between_requests_ms);

        for attempt in 1..=attempts {
            tokio::time::sleep(delay).await;
            tracing::info!("Fetching {} (attempt {}/{})", url, attempt, attempts);

            let response = match self
                .client
                .get(url)
                .header(header::ACCEPT, "text/html,application/xhtml+xml,*/*")
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Request to {} failed: {}", url, e);
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let body = response.text().await?;
                tracing::debug!("Downloaded {} bytes from {}", body.len(), url);
                return Ok(body);
            }
            match status {
                StatusCode::NOT_FOUND => {
                    tracing::warn!("Received 404 Not Found for URL: {}", url);
                    return Err(FetchError::NotFound(url.to_string()));
                }
                StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                    tracing::warn!("Received {} from {}; backing off", status, url);
                    tokio::time::sleep(delay * 2).await;
                }
                _ => tracing::error!("HTTP error status: {} for URL: {}", status, url),
            }
        }

        Err(FetchError::RetriesExhausted {
            url: url.to_string(),
            attempts,
        })
    }

    /// Calls the odds API for events commencing on `date` (UTC), widened by
    /// `day_tolerance` days either side. 401 is final.
    pub async fn fetch_odds(&self, date: NaiveDate) -> Result<Vec<OddsEvent>, FetchError> {
        let Some(api_key) = self.odds.api_key.as_deref() else {
            return Err(FetchError::Unauthorized);
        };
        let (from, to) = commence_window(date, self.odds.day_tolerance);
        let attempts = self.scraping.max_retries.max(1);
        let delay = Duration::from_millis(self.scraping.delay_between_requests_ms);

        for attempt in 1..=attempts {
            tokio::time::sleep(delay).await;
            tracing::info!("Fetching odds for {} (attempt {}/{})", date, attempt, attempts);

            let response = match self
                .client
                .get(&self.odds.base_url)
                .query(&[
                    ("apiKey", api_key),
                    ("regions", self.odds.regions.as_str()),
                    ("markets", self.odds.markets.as_str()),
                    ("oddsFormat", self.odds.odds_format.as_str()),
                    ("dateFormat", self.odds.date_format.as_str()),
                    ("commenceTimeFrom", from.as_str()),
                    ("commenceTimeTo", to.as_str()),
                ])
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Odds request failed: {}", e);
                    continue;
                }
            };

            let status = response.status();
            if let Some(remaining) = response.headers().get("x-requests-remaining") {
                tracing::debug!("Odds API requests remaining: {:?}", remaining);
            }
            if status.is_success() {
                let body = response.text().await?;
                return parse_events(&body).map_err(|e| FetchError::Decode(e.to_string()));
            }
            match status {
                StatusCode::UNAUTHORIZED => return Err(FetchError::Unauthorized),
                StatusCode::NOT_FOUND => return Err(FetchError::NotFound(self.odds.base_url.clone())),
                StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                    tracing::warn!("Odds API returned {}; backing off", status);
                    tokio::time::sleep(delay * 2).await;
                }
                _ => tracing::error!("Odds API HTTP error status: {}", status),
            }
        }

        Err(FetchError::RetriesExhausted {
            url: self.odds.base_url.clone(),
            attempts,
        })
    }
}

/// `commenceTimeFrom`/`commenceTimeTo` bounds covering whole UTC days.
pub fn commence_window(date: NaiveDate, day_tolerance: u32) -> (String, String) {
    let span = chrono::Days::new(u64::from(day_tolerance));
    let first = date.checked_sub_days(span).unwrap_or(date);
    let last = date.checked_add_days(span).unwrap_or(date);
    (
        format!("{}T00:00:00Z", first.format("%Y-%m-%d")),
        format!("{}T23:59:59Z", last.format("%Y-%m-%d")),
    )
}

/// Stamps the retrieval time on freshly normalized odds.
pub fn stamp_scraped_at(records: &mut [OddsRecord]) {
    let now = Utc::now().to_rfc3339();
    for record in records {
        record.scraped_at = Some(now.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_scraping() -> ScrapingConfig {
        ScrapingConfig {
            delay_between_requests_ms: 0,
            max_retries: 2,
            timeout_secs: 2,
            ..ScrapingConfig::default()
        }
    }

    #[test]
    fn window_covers_tolerance() {
        let date = NaiveDate::from_ymd_opt(2023, 7, 15).unwrap();
        assert_eq!(
            commence_window(date, 0),
            ("2023-07-15T00:00:00Z".to_string(), "2023-07-15T23:59:59Z".to_string())
        );
        assert_eq!(commence_window(date, 1).0, "2023-07-14T00:00:00Z");
        assert_eq!(commence_window(date, 1).1, "2023-07-16T23:59:59Z");
    }

    #[test]
    fn odds_without_key_are_refused() {
        let fetcher = Fetcher::new(&quick_scraping(), &OddsApiConfig::default()).unwrap();
        assert!(!fetcher.has_odds_key());
        let date = NaiveDate::from_ymd_opt(2023, 7, 15).unwrap();
        let result = tokio_test::block_on(fetcher.fetch_odds(date));
        assert!(matches!(result, Err(FetchError::Unauthorized)));
    }

    #[test]
    fn unreachable_host_exhausts_retries() {
        let fetcher = Fetcher::new(&quick_scraping(), &OddsApiConfig::default()).unwrap();
        let result = tokio_test::block_on(fetcher.fetch_html("http://127.0.0.1:9/boxes/x.shtml"));
        assert!(matches!(result, Err(FetchError::RetriesExhausted { attempts: 2, .. })));
    }

    #[test]
    fn stamps_every_record() {
        let mut records = vec![OddsRecord {
            external_game_id: None,
            commence_time: None,
            game_date: "2023-07-15".into(),
            home_team: "A".into(),
            away_team: "B".into(),
            lines: Vec::new(),
            source: "test".into(),
            scraped_at: None,
        }];
        stamp_scraped_at(&mut records);
        assert!(records[0].scraped_at.is_some());
    }
}
