//! Filename parser for scene-style release names
//!
//! Parses names like:
//! - "Chicago Fire S14E08 1080p WEB h264-ETHEL" (episode)
//! - "Corner.Gas.6x12.720p.mkv" (episode, NxNN form)
//! - "The.Expanse.S02.COMPLETE.1080p" (season pack)
//! - "Inception.2010.1080p.BluRay.x264" (movie)
//!
//! Anything else is reported as [MediaKind::Unknown]; callers decide whether
//! that is fatal.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Extensions stripped before parsing. Not the accepted media set.
const KNOWN_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "m4v", "mov", "wmv", "ts", "webm", "torrent", "nfo", "txt", "srt",
];

static SXXEXX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.*?)\s*\bS(\d{1,2})\s?E(\d{1,3})\b").expect("valid regex"));
static NXNN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.*?)\s*\b(\d{1,2})x(\d{2,3})\b").expect("valid regex"));
static VERBOSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?)\s*\bSeason\s*(\d{1,2})\s*Episode\s*(\d{1,3})\b").expect("valid regex")
});
static SEASON_ONLY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.*?)\s*\b(?:S(\d{1,2})|Season\s*(\d{1,2}))\b").expect("valid regex")
});
static COMPLETE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(complete|collection)\b").expect("valid regex"));
static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("valid regex"));
static LEADING_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[[^\]]*\]\s*").expect("valid regex"));
static TRAILING_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\(?(19\d{2}|20\d{2})\)?\s*$").expect("valid regex"));
static COUNTRY_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\s+(US|UK|AU|NZ)\s*$").expect("valid regex"));
static QUALITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(2160p|1080p|720p|480p|4K|UHD|WEB-?DL|WEBRip|BluRay|HDTV|x264|x265|h264|h265|HEVC)\b")
        .expect("valid regex")
});
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// What a release name or file name describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    Episode,
    #[default]
    Unknown,
}

/// Structured metadata derived from a name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedInfo {
    pub kind: MediaKind,
    pub title: Option<String>,
    pub year: Option<u32>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Filled in later from an episode guide, never parsed from names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,
    #[serde(default)]
    pub is_season_pack: bool,
}

impl ParsedInfo {
    pub fn movie(title: impl Into<String>, year: Option<u32>) -> Self {
        Self {
            kind: MediaKind::Movie,
            title: Some(title.into()),
            year,
            ..Default::default()
        }
    }

    pub fn episode(title: impl Into<String>, season: u32, episode: u32) -> Self {
        Self {
            kind: MediaKind::Episode,
            title: Some(title.into()),
            season: Some(season),
            episode: Some(episode),
            ..Default::default()
        }
    }

    pub fn season_pack(title: impl Into<String>, season: u32) -> Self {
        Self {
            kind: MediaKind::Episode,
            title: Some(title.into()),
            season: Some(season),
            is_season_pack: true,
            ..Default::default()
        }
    }

    /// A single episode with both numbers known.
    pub fn is_complete_episode(&self) -> bool {
        self.kind == MediaKind::Episode && self.season.is_some() && self.episode.is_some()
    }

    /// Fill gaps in `self` from a coarser, job-level description.
    ///
    /// A file name often lacks the show title ("S01E03.mkv") while the job
    /// knows it; the reverse happens for obfuscated file names.
    pub fn fill_from(mut self, coarse: &ParsedInfo) -> Self {
        if self.kind == MediaKind::Unknown {
            if coarse.kind == MediaKind::Unknown {
                return self;
            }
            let mut merged = coarse.clone();
            merged.is_season_pack = false;
            return merged;
        }
        if self.kind != coarse.kind {
            return self;
        }
        if self.title.is_none() {
            self.title = coarse.title.clone();
        }
        if self.year.is_none() {
            self.year = coarse.year;
        }
        if self.season.is_none() {
            self.season = coarse.season;
        }
        if self.episode.is_none() && !coarse.is_season_pack {
            self.episode = coarse.episode;
        }
        self.is_season_pack = false;
        self
    }
}

/// Parse a release or file name.
pub fn parse_release_name(name: &str) -> ParsedInfo {
    let base = strip_known_extension(file_name_part(name));
    let cleaned = SPACE_RE
        .replace_all(&base.replace(['.', '_'], " "), " ")
        .trim()
        .to_string();
    let cleaned = LEADING_TAG_RE.replace(&cleaned, "").to_string();

    let result = parse_cleaned(&cleaned);

    debug!(
        name = name,
        kind = ?result.kind,
        title = ?result.title,
        season = ?result.season,
        episode = ?result.episode,
        year = ?result.year,
        season_pack = result.is_season_pack,
        "Parsed release name"
    );

    result
}

fn parse_cleaned(cleaned: &str) -> ParsedInfo {
    // Pattern 1: S01E01 format (most common)
    // Pattern 2: 1x01 format
    // Pattern 3: Season X Episode Y format
    for re in [&*SXXEXX_RE, &*NXNN_RE, &*VERBOSE_RE] {
        if let Some(caps) = re.captures(cleaned) {
            let season = caps.get(2).and_then(|m| m.as_str().parse().ok());
            let episode = caps.get(3).and_then(|m| m.as_str().parse().ok());
            let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            return ParsedInfo {
                kind: MediaKind::Episode,
                title: clean_title(prefix, true),
                year: trailing_year(prefix),
                season,
                episode,
                ..Default::default()
            };
        }
    }

    // Season packs: "S02" or "Season 2" without an episode number
    if let Some(caps) = SEASON_ONLY_RE.captures(cleaned) {
        let season = caps
            .get(2)
            .or_else(|| caps.get(3))
            .and_then(|m| m.as_str().parse().ok());
        let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        return ParsedInfo {
            kind: MediaKind::Episode,
            title: clean_title(prefix, true),
            year: trailing_year(prefix),
            season,
            is_season_pack: true,
            ..Default::default()
        };
    }

    if let Some(m) = COMPLETE_RE.find(cleaned) {
        return ParsedInfo {
            kind: MediaKind::Episode,
            title: clean_title(&cleaned[..m.start()], true),
            is_season_pack: true,
            ..Default::default()
        };
    }

    // Movies: the last year that has a title in front of it
    if let Some(m) = YEAR_RE
        .find_iter(cleaned)
        .filter(|m| !cleaned[..m.start()].trim().is_empty())
        .last()
        && let Some(title) = clean_title(&cleaned[..m.start()], false)
    {
        return ParsedInfo::movie(title, m.as_str().parse().ok());
    }

    ParsedInfo {
        kind: MediaKind::Unknown,
        title: clean_title(cleaned, true),
        ..Default::default()
    }
}

fn file_name_part(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn strip_known_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if KNOWN_EXTENSIONS.contains(&ext.to_lowercase().as_str()) => stem,
        _ => name,
    }
}

fn trailing_year(prefix: &str) -> Option<u32> {
    TRAILING_YEAR_RE
        .captures(prefix.trim())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Clean up a title fragment. Returns `None` when nothing meaningful is left.
fn clean_title(raw: &str, strip_year: bool) -> Option<String> {
    let mut cleaned = raw.trim().trim_end_matches(['-', '(', '[', ' ']).to_string();

    // Quality tags only show up here for unknown names; cut at the first one
    if let Some(m) = QUALITY_RE.find(&cleaned) {
        cleaned.truncate(m.start());
    }

    // Remove trailing year if present (we extract it separately)
    if strip_year {
        cleaned = TRAILING_YEAR_RE.replace(&cleaned, "").to_string();
    }

    // Remove common suffixes
    cleaned = COUNTRY_SUFFIX_RE.replace(&cleaned, "").to_string();

    cleaned = SPACE_RE.replace_all(&cleaned, " ").to_string();
    let cleaned = cleaned.trim().trim_end_matches(['-', '(', '[', ' ']).trim();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sxxexx() {
        let result = parse_release_name("Chicago Fire S14E08 1080p WEB h264-ETHEL");
        assert_eq!(result.kind, MediaKind::Episode);
        assert_eq!(result.title.as_deref(), Some("Chicago Fire"));
        assert_eq!(result.season, Some(14));
        assert_eq!(result.episode, Some(8));
        assert!(!result.is_season_pack);
    }

    #[test]
    fn test_parse_dotted_file_name() {
        let result = parse_release_name("/downloads/The.Expanse.S02E05.720p.HDTV.mkv");
        assert_eq!(result.title.as_deref(), Some("The Expanse"));
        assert_eq!((result.season, result.episode), (Some(2), Some(5)));
    }

    #[test]
    fn test_parse_nxnn() {
        let result = parse_release_name("Corner.Gas.6x12.720p.mkv");
        assert_eq!(result.title.as_deref(), Some("Corner Gas"));
        assert_eq!((result.season, result.episode), (Some(6), Some(12)));
    }

    #[test]
    fn test_parse_verbose() {
        let result = parse_release_name("Doctor Who Season 3 Episode 10 Blink");
        assert_eq!(result.title.as_deref(), Some("Doctor Who"));
        assert_eq!((result.season, result.episode), (Some(3), Some(10)));
    }

    #[test]
    fn test_bare_episode_file_has_no_title() {
        let result = parse_release_name("S01E03.mkv");
        assert_eq!(result.kind, MediaKind::Episode);
        assert_eq!(result.title, None);
        assert_eq!(result.episode, Some(3));
    }

    #[test]
    fn test_parse_season_pack() {
        let result = parse_release_name("The.Expanse.S02.COMPLETE.1080p.WEB-DL");
        assert!(result.is_season_pack);
        assert_eq!(result.title.as_deref(), Some("The Expanse"));
        assert_eq!(result.season, Some(2));
        assert_eq!(result.episode, None);

        let verbose = parse_release_name("Fargo Season 1 1080p");
        assert!(verbose.is_season_pack);
        assert_eq!(verbose.season, Some(1));
    }

    #[test]
    fn test_parse_movie() {
        let result = parse_release_name("Inception.2010.1080p.BluRay.x264.mkv");
        assert_eq!(result, ParsedInfo::movie("Inception", Some(2010)));
    }

    #[test]
    fn test_movie_uses_last_year() {
        let result = parse_release_name("Blade Runner 2049 (2017) 2160p");
        assert_eq!(result.title.as_deref(), Some("Blade Runner 2049"));
        assert_eq!(result.year, Some(2017));
    }

    #[test]
    fn test_unknown_name() {
        let result = parse_release_name("bonus_garbage.mkv");
        assert_eq!(result.kind, MediaKind::Unknown);
        assert_eq!(result.title.as_deref(), Some("bonus garbage"));
    }

    #[test]
    fn test_fill_from_pack_info() {
        let file = parse_release_name("S01E03.mkv");
        let pack = ParsedInfo::season_pack("Severance", 1);
        let merged = file.fill_from(&pack);
        assert_eq!(merged.title.as_deref(), Some("Severance"));
        assert_eq!(merged.episode, Some(3));
        assert!(!merged.is_season_pack);
    }

    #[test]
    fn test_fill_from_unknown_file() {
        let file = parse_release_name("a8f3c2.mkv");
        let job = ParsedInfo::movie("Heat", Some(1995));
        assert_eq!(file.fill_from(&job), job);
    }
}
