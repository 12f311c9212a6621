//! Media-center library scans (Plex)
//!
//! After a download lands in the library the matching Plex section is asked
//! to rescan. Scans are fire-and-forget from the lifecycle's point of view.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::PlexConfig;
use crate::services::filename_parser::MediaKind;

/// The single "scan library" trigger the lifecycle needs.
#[async_trait]
pub trait LibraryScanner: Send + Sync + 'static {
    async fn scan(&self, kind: MediaKind) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct SectionsResponse {
    #[serde(rename = "MediaContainer")]
    media_container: SectionsContainer,
}

#[derive(Debug, Deserialize)]
struct SectionsContainer {
    #[serde(rename = "Directory", default)]
    directory: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct Section {
    key: String,
    title: String,
}

pub struct PlexScanner {
    client: Client,
    config: PlexConfig,
}

impl PlexScanner {
    pub fn new(config: PlexConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn section_title(&self, kind: MediaKind) -> Option<&str> {
        match kind {
            MediaKind::Movie => Some(&self.config.movies_section),
            MediaKind::Episode => Some(&self.config.tv_section),
            MediaKind::Unknown => None,
        }
    }

    async fn sections(&self) -> Result<Vec<Section>> {
        let url = format!("{}/library/sections", self.config.url);
        let response = self
            .client
            .get(&url)
            .header("X-Plex-Token", &self.config.token)
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to list Plex library sections")?;

        if !response.status().is_success() {
            anyhow::bail!("Plex sections request failed with status: {}", response.status());
        }

        let body: SectionsResponse = response
            .json()
            .await
            .context("Failed to parse Plex sections")?;
        Ok(body.media_container.directory)
    }
}

#[async_trait]
impl LibraryScanner for PlexScanner {
    async fn scan(&self, kind: MediaKind) -> Result<()> {
        let Some(wanted) = self.section_title(kind) else {
            return Ok(());
        };

        let sections = self.sections().await?;
        let Some(section) = sections.iter().find(|s| s.title == wanted) else {
            warn!(section = wanted, "Plex library section not found");
            return Ok(());
        };

        let url = format!("{}/library/sections/{}/refresh", self.config.url, section.key);
        let response = self
            .client
            .get(&url)
            .header("X-Plex-Token", &self.config.token)
            .send()
            .await
            .context("Failed to trigger Plex scan")?;

        if !response.status().is_success() {
            anyhow::bail!("Plex refresh failed with status: {}", response.status());
        }

        info!(section = %section.title, "Plex library scan triggered");
        Ok(())
    }
}
