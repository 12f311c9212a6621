//! TVMaze episode guide
//!
//! Used only to put episode titles into library file names. TVMaze is free
//! and needs no API key; every failure here is non-fatal to the caller.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Something that can name an episode.
#[async_trait]
pub trait EpisodeTitleSource: Send + Sync + 'static {
    async fn episode_title(&self, show: &str, season: u32, episode: u32) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct TvMazeShow {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TvMazeEpisode {
    pub id: u32,
    pub name: String,
    pub season: u32,
    pub number: Option<u32>,
}

pub struct TvMazeClient {
    client: Client,
    base_url: String,
}

impl TvMazeClient {
    pub fn new() -> Self {
        Self::with_base_url("https://api.tvmaze.com")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Best single match for a show name
    pub async fn single_search(&self, query: &str) -> Result<Option<TvMazeShow>> {
        let url = format!("{}/singlesearch/shows", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await
            .context("Failed to search TVMaze")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!("TVMaze search failed with status: {}", response.status());
        }

        let show: TvMazeShow = response
            .json()
            .await
            .context("Failed to parse TVMaze show")?;
        Ok(Some(show))
    }

    /// One episode by season and number
    pub async fn episode_by_number(
        &self,
        tvmaze_id: u32,
        season: u32,
        number: u32,
    ) -> Result<Option<TvMazeEpisode>> {
        let url = format!("{}/shows/{}/episodebynumber", self.base_url, tvmaze_id);
        let response = self
            .client
            .get(&url)
            .query(&[("season", season), ("number", number)])
            .send()
            .await
            .context("Failed to fetch episode from TVMaze")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            anyhow::bail!(
                "TVMaze episode lookup failed with status: {}",
                response.status()
            );
        }

        let episode: TvMazeEpisode = response
            .json()
            .await
            .context("Failed to parse TVMaze episode")?;
        Ok(Some(episode))
    }
}

impl Default for TvMazeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EpisodeTitleSource for TvMazeClient {
    async fn episode_title(&self, show: &str, season: u32, episode: u32) -> Result<Option<String>> {
        let Some(found) = self.single_search(show).await? else {
            debug!(show = show, "TVMaze has no match");
            return Ok(None);
        };
        let title = self
            .episode_by_number(found.id, season, episode)
            .await?
            .map(|e| e.name)
            .filter(|n| !n.trim().is_empty());
        debug!(show = %found.name, season, episode, title = ?title, "TVMaze episode title");
        Ok(title)
    }
}
