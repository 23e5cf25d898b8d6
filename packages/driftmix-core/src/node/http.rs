//! Track resolution over the node's HTTP API.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::state::NodeConfig;
use crate::traits::TrackResolver;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Resolve request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Node returned HTTP {0} for loadtracks")]
    Status(u16),

    #[error("Track load failed: {0}")]
    Load(String),
}

pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

/// Resolves source ids against the node's `GET /loadtracks` endpoint.
pub struct NodeHttpClient {
    http: reqwest::Client,
    config: NodeConfig,
}

impl NodeHttpClient {
    pub fn new(http: reqwest::Client, config: NodeConfig) -> Self {
        Self { http, config }
    }

    fn loadtracks_url(&self) -> String {
        format!("{}/loadtracks", self.config.http_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TrackResolver for NodeHttpClient {
    async fn resolve(&self, source_id: &str) -> ResolveResult<Option<String>> {
        let response = self
            .http
            .get(self.loadtracks_url())
            .query(&[("identifier", source_id)])
            .header(
                reqwest::header::AUTHORIZATION,
                self.config.password.as_str(),
            )
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Status(status.as_u16()));
        }
        first_track(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadTracksResponse {
    load_type: LoadType,
    #[serde(default)]
    tracks: Vec<LoadedTrack>,
    exception: Option<LoadException>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum LoadType {
    TrackLoaded,
    PlaylistLoaded,
    SearchResult,
    NoMatches,
    LoadFailed,
}

#[derive(Debug, Deserialize)]
struct LoadedTrack {
    track: String,
}

#[derive(Debug, Deserialize)]
struct LoadException {
    message: String,
}

/// Direct loads, playlists and searches resolve to their first track; no
/// match is `None`; a failed load surfaces the node's message.
fn first_track(response: LoadTracksResponse) -> ResolveResult<Option<String>> {
    match response.load_type {
        LoadType::TrackLoaded | LoadType::PlaylistLoaded | LoadType::SearchResult => {
            Ok(response.tracks.into_iter().next().map(|t| t.track))
        }
        LoadType::NoMatches => Ok(None),
        LoadType::LoadFailed => {
            let message = response
                .exception
                .map(|e| e.message)
                .unwrap_or_else(|| "load failed".to_string());
            Err(ResolveError::Load(message))
        }
    }
}
