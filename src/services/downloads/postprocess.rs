//! Completion handling: pick the files of a finished transfer and place them
//! in the library.
//!
//! A single release moves its largest media file. A season pack treats every
//! media file on its own: a file whose name cannot be resolved or whose move
//! fails is skipped and counted, and the pack only fails when nothing at all
//! could be placed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::DownloadError;
use super::types::{JobDescriptor, PackSummary};
use crate::services::filename_parser::{parse_release_name, MediaKind, ParsedInfo};
use crate::services::organizer::Organizer;
use crate::services::torrent::EngineFile;
use crate::services::tvmaze::EpisodeTitleSource;

/// Whether `path` carries one of the accepted `.ext` entries (case-insensitive).
pub fn is_media_file(path: &Path, allowed_extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let dotted = format!(".{}", ext.to_lowercase());
    allowed_extensions.iter().any(|a| *a == dotted)
}

/// What post-processing produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PostProcessReport {
    /// Present for season packs only.
    pub summary: Option<PackSummary>,
    pub placed: Vec<PathBuf>,
    /// Library section to rescan.
    pub kind: MediaKind,
}

pub struct PostProcessor {
    organizer: Organizer,
    titles: Option<Arc<dyn EpisodeTitleSource>>,
    allowed_extensions: Vec<String>,
}

impl PostProcessor {
    pub fn new(
        organizer: Organizer,
        titles: Option<Arc<dyn EpisodeTitleSource>>,
        allowed_extensions: Vec<String>,
    ) -> Self {
        Self {
            organizer,
            titles,
            allowed_extensions,
        }
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }

    /// Place the files of a completed job. `cancel` is checked between files.
    pub async fn run(
        &self,
        descriptor: &JobDescriptor,
        files: &[EngineFile],
        cancel: &CancellationToken,
    ) -> Result<PostProcessReport, DownloadError> {
        if descriptor.parsed_info.is_season_pack {
            self.run_pack(descriptor, files, cancel).await
        } else {
            self.run_single(descriptor, files, cancel).await
        }
    }

    async fn run_single(
        &self,
        descriptor: &JobDescriptor,
        files: &[EngineFile],
        cancel: &CancellationToken,
    ) -> Result<PostProcessReport, DownloadError> {
        let chosen = files
            .iter()
            .filter(|f| is_media_file(&f.path, &self.allowed_extensions))
            .max_by_key(|f| f.size)
            .ok_or_else(|| {
                DownloadError::Validation(format!("{} contains no media file", descriptor.name))
            })?;

        let info = self.resolve(&chosen.path, &descriptor.parsed_info).await;
        let dest = self.organizer.destination(&info, &chosen.path)?;
        if cancel.is_cancelled() {
            return Err(DownloadError::Interrupted);
        }
        self.organizer.place(&chosen.path, &dest).await?;

        Ok(PostProcessReport {
            summary: None,
            placed: vec![dest],
            kind: info.kind,
        })
    }

    async fn run_pack(
        &self,
        descriptor: &JobDescriptor,
        files: &[EngineFile],
        cancel: &CancellationToken,
    ) -> Result<PostProcessReport, DownloadError> {
        let mut media: Vec<&EngineFile> = files
            .iter()
            .filter(|f| is_media_file(&f.path, &self.allowed_extensions))
            .collect();
        media.sort_by(|a, b| a.path.cmp(&b.path));

        let mut summary = PackSummary::default();
        let mut placed = Vec::new();

        for file in media {
            if cancel.is_cancelled() {
                return Err(DownloadError::Interrupted);
            }
            match self.place_pack_member(file, &descriptor.parsed_info).await {
                Ok(dest) => {
                    summary.processed += 1;
                    placed.push(dest);
                }
                Err(e) => {
                    warn!(file = %file.path.display(), error = %e, "Skipping season pack file");
                    summary.skipped += 1;
                }
            }
        }

        if summary.processed == 0 {
            return Err(DownloadError::EmptyPack {
                skipped: summary.skipped,
            });
        }

        info!(
            name = %descriptor.name,
            processed = summary.processed,
            skipped = summary.skipped,
            "Season pack placed"
        );
        Ok(PostProcessReport {
            summary: Some(summary),
            placed,
            kind: MediaKind::Episode,
        })
    }

    async fn place_pack_member(
        &self,
        file: &EngineFile,
        pack: &ParsedInfo,
    ) -> Result<PathBuf, DownloadError> {
        let info = self.resolve(&file.path, pack).await;
        if !info.is_complete_episode() {
            return Err(DownloadError::UnparseableMetadata(file.path.display().to_string()));
        }
        let dest = self.organizer.destination(&info, &file.path)?;
        self.organizer.place(&file.path, &dest).await?;
        Ok(dest)
    }

    /// Metadata for one file: its own name first, gaps filled from the job.
    async fn resolve(&self, path: &Path, job_info: &ParsedInfo) -> ParsedInfo {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut info = parse_release_name(&file_name).fill_from(job_info);

        if let (Some(titles), true, None) =
            (&self.titles, info.is_complete_episode(), &info.episode_title)
        {
            if let (Some(show), Some(season), Some(episode)) =
                (info.title.as_deref(), info.season, info.episode)
            {
                match titles.episode_title(show, season, episode).await {
                    Ok(title) => info.episode_title = title,
                    Err(e) => debug!(show, season, episode, error = %e, "Episode title lookup failed"),
                }
            }
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::downloads::types::{OwnerId, Source};
    use crate::services::organizer::LibraryPaths;
    use anyhow::Result;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct FixedTitles;

    #[async_trait]
    impl EpisodeTitleSource for FixedTitles {
        async fn episode_title(&self, _show: &str, _season: u32, episode: u32) -> Result<Option<String>> {
            if episode == 2 {
                anyhow::bail!("service down");
            }
            Ok(Some(format!("Chapter {}", episode)))
        }
    }

    fn exts() -> Vec<String> {
        vec![".mkv".to_string(), ".mp4".to_string()]
    }

    fn write_files(dir: &Path, names: &[(&str, usize)]) -> Vec<EngineFile> {
        names
            .iter()
            .enumerate()
            .map(|(index, (name, size))| {
                let path = dir.join(name);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(&path, vec![0u8; *size]).unwrap();
                EngineFile {
                    index,
                    path,
                    size: *size as u64,
                }
            })
            .collect()
    }

    fn descriptor(name: &str) -> JobDescriptor {
        JobDescriptor::new(
            Source::Url { url: "https://example.org/x.torrent".into() },
            OwnerId::new("1"),
            name,
        )
    }

    #[test]
    fn media_extension_match_is_case_insensitive() {
        assert!(is_media_file(Path::new("a/B.MKV"), &exts()));
        assert!(!is_media_file(Path::new("readme.txt"), &exts()));
        assert!(!is_media_file(Path::new("noext"), &exts()));
    }

    #[tokio::test]
    async fn single_release_moves_largest_media_file() {
        let tmp = tempfile::tempdir().unwrap();
        let files = write_files(
            &tmp.path().join("dl"),
            &[
                ("Heat.1995/sample.mkv", 10),
                ("Heat.1995/Heat.1995.1080p.mkv", 100),
                ("Heat.1995/extras.nfo", 500),
            ],
        );
        let lib = tmp.path().join("lib");
        let processor = PostProcessor::new(Organizer::new(LibraryPaths::single(&lib)), None, exts());

        let report = processor
            .run(&descriptor("Heat.1995.1080p"), &files, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.summary, None);
        assert_eq!(report.kind, MediaKind::Movie);
        assert_eq!(report.placed, vec![lib.join("Heat (1995)/Heat (1995).mkv")]);
        assert!(files[0].path.exists());
    }

    #[tokio::test]
    async fn single_release_with_unknown_name_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let files = write_files(tmp.path(), &[("video.mkv", 10)]);
        let processor =
            PostProcessor::new(Organizer::new(LibraryPaths::single(tmp.path().join("lib"))), None, exts());

        let err = processor
            .run(&descriptor("video"), &files, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, DownloadError::UnparseableMetadata(_));
    }

    #[tokio::test]
    async fn pack_skips_bad_files_and_ignores_non_media() {
        let tmp = tempfile::tempdir().unwrap();
        let files = write_files(
            &tmp.path().join("dl/Fargo.S01"),
            &[
                ("Fargo.S01E01.mkv", 5),
                ("Fargo.S01E02.mkv", 5),
                ("bonus_garbage.mkv", 5),
                ("readme.txt", 5),
            ],
        );
        let lib = tmp.path().join("lib");
        let processor = PostProcessor::new(
            Organizer::new(LibraryPaths::single(&lib)),
            Some(Arc::new(FixedTitles)),
            exts(),
        );

        let report = processor
            .run(&descriptor("Fargo.S01.1080p"), &files, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.summary, Some(PackSummary { processed: 2, skipped: 1 }));
        assert!(lib.join("Fargo/Season 01/Fargo - s01e01 - Chapter 1.mkv").exists());
        // a failed title lookup still places the file
        assert!(lib.join("Fargo/Season 01/Fargo - s01e02.mkv").exists());
    }

    #[tokio::test]
    async fn pack_with_nothing_placed_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let files = write_files(tmp.path(), &[("junk.mkv", 5), ("notes.txt", 1)]);
        let processor =
            PostProcessor::new(Organizer::new(LibraryPaths::single(tmp.path().join("lib"))), None, exts());

        let err = processor
            .run(&descriptor("Fargo.S01"), &files, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_matches!(err, DownloadError::EmptyPack { skipped: 1 });
    }

    #[tokio::test]
    async fn cancelled_pack_is_interrupted() {
        let tmp = tempfile::tempdir().unwrap();
        let files = write_files(tmp.path(), &[("Fargo.S01E01.mkv", 5)]);
        let processor =
            PostProcessor::new(Organizer::new(LibraryPaths::single(tmp.path().join("lib"))), None, exts());
        let token = CancellationToken::new();
        token.cancel();

        let err = processor.run(&descriptor("Fargo.S01"), &files, &token).await.unwrap_err();
        assert_matches!(err, DownloadError::Interrupted);
        assert!(files[0].path.exists());
    }
}
