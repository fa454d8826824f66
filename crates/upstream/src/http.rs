use crate::wire::{parse_recent_tracks, parse_track_duration};
use crate::{RecentTracksApi, UpstreamError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use trackwatch_core::{AccessMode, TrackSnapshot, UpstreamConfig};
use url::Url;

/// Provider error code for data that requires a logged-in session.
const ERROR_CODE_LOGIN_REQUIRED: i64 = 17;

pub struct HttpClient {
    http: reqwest::Client,
    username: String,
    direct_base: Url,
    mediated_base: Url,
    api_key: String,
    session_key: Option<String>,
}

impl HttpClient {
    pub fn from_config(username: &str, cfg: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .context("failed to build http client")?;

        Ok(Self {
            http,
            username: username.to_string(),
            direct_base: Url::parse(&cfg.direct_base_url)
                .with_context(|| format!("invalid direct base url {}", cfg.direct_base_url))?,
            mediated_base: Url::parse(&cfg.mediated_base_url)
                .with_context(|| format!("invalid mediated base url {}", cfg.mediated_base_url))?,
            api_key: cfg.api_key.clone(),
            session_key: cfg.session_key.clone(),
        })
    }

    /// The mediated endpoint holds its own provider credentials, so the
    /// api key is only attached on the direct path.
    fn request_url(&self, mode: AccessMode, method: &str, extra: &[(&str, String)]) -> Url {
        let mut url = match mode {
            AccessMode::Direct => self.direct_base.clone(),
            AccessMode::Mediated => self.mediated_base.clone(),
        };

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("method", method);
            pairs.append_pair("format", "json");
            if mode == AccessMode::Direct {
                pairs.append_pair("api_key", &self.api_key);
            }
            if let Some(sk) = &self.session_key {
                pairs.append_pair("sk", sk);
            }
            for (k, v) in extra {
                pairs.append_pair(k, v);
            }
        }

        url
    }

    async fn get_json(&self, url: Url) -> Result<serde_json::Value, UpstreamError> {
        debug!(url = %redacted(&url), "upstream request");
        let response = self.http.get(url).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(UpstreamError::VisibilityRestricted)
            }
            status if !status.is_success() => {
                return Err(UpstreamError::Network(format!("upstream status {status}")))
            }
            _ => {}
        }

        let value: serde_json::Value = response.json().await?;

        if let Some(code) = value.get("error").and_then(|v| v.as_i64()) {
            let message = value
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown upstream error");
            if code == ERROR_CODE_LOGIN_REQUIRED {
                return Err(UpstreamError::VisibilityRestricted);
            }
            return Err(UpstreamError::Network(format!(
                "upstream error {code}: {message}"
            )));
        }

        Ok(value)
    }
}

#[async_trait]
impl RecentTracksApi for HttpClient {
    async fn latest_snapshot(
        &self,
        mode: AccessMode,
    ) -> Result<Option<TrackSnapshot>, UpstreamError> {
        let url = self.request_url(
            mode,
            "user.getrecenttracks",
            &[
                ("user", self.username.clone()),
                ("limit", "1".to_string()),
            ],
        );
        let tracks = parse_recent_tracks(self.get_json(url).await?)?;
        Ok(tracks.into_iter().next())
    }

    async fn recent_history(
        &self,
        mode: AccessMode,
        limit: u32,
    ) -> Result<Vec<TrackSnapshot>, UpstreamError> {
        let url = self.request_url(
            mode,
            "user.getrecenttracks",
            &[
                ("user", self.username.clone()),
                ("limit", limit.to_string()),
            ],
        );
        parse_recent_tracks(self.get_json(url).await?)
    }

    async fn track_duration(
        &self,
        mode: AccessMode,
        artist_name: &str,
        track_name: &str,
    ) -> Result<Option<u64>, UpstreamError> {
        let url = self.request_url(
            mode,
            "track.getInfo",
            &[
                ("artist", artist_name.to_string()),
                ("track", track_name.to_string()),
            ],
        );
        parse_track_duration(self.get_json(url).await?)
    }
}

fn redacted(url: &Url) -> String {
    let mut shown = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            if k == "api_key" || k == "sk" {
                (k.into_owned(), "<redacted>".to_string())
            } else {
                (k.into_owned(), v.into_owned())
            }
        })
        .collect();
    shown.query_pairs_mut().clear().extend_pairs(pairs);
    shown.to_string()
}

#[cfg(test)]
mod tests {
    use super::HttpClient;
    use trackwatch_core::{AccessMode, UpstreamConfig};

    fn client() -> HttpClient {
        let cfg = UpstreamConfig {
            direct_base_url: "https://ws.example.com/2.0".to_string(),
            mediated_base_url: "https://proxy.example.com/api/listening".to_string(),
            api_key: "key123".to_string(),
            session_key: Some("sess456".to_string()),
            history_limit: 10,
            request_timeout_ms: 8_000,
        };
        HttpClient::from_config("alice", &cfg).unwrap()
    }

    #[test]
    fn direct_url_carries_api_key() {
        let url = client().request_url(
            AccessMode::Direct,
            "user.getrecenttracks",
            &[("user", "alice".to_string()), ("limit", "1".to_string())],
        );
        let s = url.to_string();
        assert!(s.starts_with("https://ws.example.com/2.0?"));
        assert!(s.contains("api_key=key123"));
        assert!(s.contains("sk=sess456"));
        assert!(s.contains("user=alice"));
        assert!(s.contains("format=json"));
    }

    #[test]
    fn mediated_url_omits_api_key() {
        let url = client().request_url(
            AccessMode::Mediated,
            "user.getrecenttracks",
            &[("user", "alice".to_string())],
        );
        let s = url.to_string();
        assert!(s.starts_with("https://proxy.example.com/api/listening?"));
        assert!(!s.contains("api_key"));
        assert!(s.contains("sk=sess456"));
    }
}
