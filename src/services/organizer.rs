//! File organizer: library destinations and moves
//!
//! Layout:
//! - Movies: `{movies}/{Title (Year)}/{Title (Year)}.ext`
//! - Episodes: `{tv}/{Title}/Season 01/{Title} - s01e02 - Episode Title.ext`

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::services::downloads::DownloadError;
use crate::services::filename_parser::{MediaKind, ParsedInfo};

/// Library roots per media kind.
#[derive(Debug, Clone)]
pub struct LibraryPaths {
    pub default: PathBuf,
    pub movies: PathBuf,
    pub tv: PathBuf,
}

impl LibraryPaths {
    /// Everything under one root.
    pub fn single(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            default: root.clone(),
            movies: root.clone(),
            tv: root,
        }
    }

    pub fn root_for(&self, kind: MediaKind) -> &Path {
        match kind {
            MediaKind::Movie => &self.movies,
            MediaKind::Episode => &self.tv,
            MediaKind::Unknown => &self.default,
        }
    }
}

/// Computes destinations and moves files into the library.
#[derive(Debug, Clone)]
pub struct Organizer {
    paths: LibraryPaths,
}

impl Organizer {
    pub fn new(paths: LibraryPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &LibraryPaths {
        &self.paths
    }

    /// Destination for a file described by `info`.
    pub fn destination(&self, info: &ParsedInfo, source: &Path) -> Result<PathBuf, DownloadError> {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| "mkv".to_string());
        let unparseable = || DownloadError::UnparseableMetadata(source.display().to_string());

        match info.kind {
            MediaKind::Movie => {
                let title = info.title.as_deref().ok_or_else(unparseable)?;
                let folder = match info.year {
                    Some(year) => format!("{} ({})", sanitize_for_filename(title), year),
                    None => sanitize_for_filename(title),
                };
                Ok(self
                    .paths
                    .root_for(MediaKind::Movie)
                    .join(&folder)
                    .join(format!("{}.{}", folder, ext)))
            }
            MediaKind::Episode => {
                let (Some(title), Some(season), Some(episode)) =
                    (info.title.as_deref(), info.season, info.episode)
                else {
                    return Err(unparseable());
                };
                let show = sanitize_for_filename(title);
                let episode_title = info
                    .episode_title
                    .as_ref()
                    .map(|t| format!(" - {}", sanitize_for_filename(t)))
                    .unwrap_or_default();
                let filename = format!(
                    "{} - s{:02}e{:02}{}.{}",
                    show, season, episode, episode_title, ext
                );
                Ok(self
                    .paths
                    .root_for(MediaKind::Episode)
                    .join(&show)
                    .join(format!("Season {:02}", season))
                    .join(filename))
            }
            MediaKind::Unknown => Err(unparseable()),
        }
    }

    /// Move `source` to `dest`, creating parent directories.
    ///
    /// Tries rename first (same filesystem) and falls back to copy+delete.
    pub async fn place(&self, source: &Path, dest: &Path) -> Result<(), DownloadError> {
        let fs_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| DownloadError::Filesystem { path, source }
        };

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(fs_err(parent))?;
        }

        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            warn!(dest = %dest.display(), "Destination exists, replacing");
        }

        match tokio::fs::rename(source, dest).await {
            Ok(()) => {}
            Err(e) => {
                debug!(source = %source.display(), error = %e, "Rename failed, copying instead");
                tokio::fs::copy(source, dest).await.map_err(fs_err(source))?;
                tokio::fs::remove_file(source).await.map_err(fs_err(source))?;
            }
        }

        info!(source = %source.display(), dest = %dest.display(), "Placed file in library");
        Ok(())
    }
}

/// Sanitize a string for use in a file or folder name
pub fn sanitize_for_filename(name: &str) -> String {
    sanitize_filename::sanitize(name).trim().to_string()
}
