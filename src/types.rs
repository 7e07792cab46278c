//! Shared types used by the strategies, the engine and the tiering layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::TierError;

/// Milliseconds since the Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ================================================================================================
// ALGORITHM
// ================================================================================================

/// Compression algorithm family carried in every chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// LZ4 block codec
    Fast,
    /// Zstandard with optional shared dictionary
    Balanced,
    /// Brotli
    HighRatio,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Algorithm::Fast, Algorithm::Balanced, Algorithm::HighRatio];

    /// Tag written into the chunk envelope.
    pub fn tag(&self) -> &'static str {
        match self {
            Algorithm::Fast => "lz4",
            Algorithm::Balanced => "zstd",
            Algorithm::HighRatio => "brotli",
        }
    }

    /// Position in the engine's strategy table.
    #[inline]
    pub fn index(&self) -> usize {
        match self {
            Algorithm::Fast => 0,
            Algorithm::Balanced => 1,
            Algorithm::HighRatio => 2,
        }
    }

    /// Lower is faster.
    #[inline]
    pub fn speed_rank(&self) -> u8 {
        self.index() as u8
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Fast => write!(f, "fast"),
            Algorithm::Balanced => write!(f, "balanced"),
            Algorithm::HighRatio => write!(f, "high-ratio"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = TierError;

    /// Accepts both envelope tags and display names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lz4" | "fast" => Ok(Algorithm::Fast),
            "zstd" | "balanced" => Ok(Algorithm::Balanced),
            "brotli" | "high-ratio" => Ok(Algorithm::HighRatio),
            other => Err(TierError::UnknownAlgorithm {
                tag: other.to_string(),
            }),
        }
    }
}

// ================================================================================================
// CONTENT CLASSIFICATION
// ================================================================================================

/// Coarse content family derived from a MIME type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentClass {
    /// JSON, XML, YAML, CSV, TOML
    Structured,
    /// Prose, markdown, logs
    Text,
    /// Source code
    Code,
    /// Opaque binary
    Binary,
    /// Media and archives that are already compressed
    Precompressed,
    Unknown,
}

impl ContentClass {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "application/json" | "application/xml" | "text/xml" | "application/yaml"
            | "text/yaml" | "application/x-yaml" | "text/csv" | "application/toml"
            | "text/toml" => ContentClass::Structured,
            "application/javascript" | "text/javascript" | "application/typescript"
            | "text/x-python" | "text/x-rust" | "text/x-go" | "text/x-java" | "text/x-c"
            | "text/x-c++" | "text/x-shellscript" | "text/css" | "text/html" => ContentClass::Code,
            "application/zip" | "application/gzip" | "application/x-7z-compressed"
            | "application/x-rar-compressed" | "application/zstd" | "application/x-brotli" => {
                ContentClass::Precompressed
            }
            "application/octet-stream" | "application/wasm" | "application/pdf" => {
                ContentClass::Binary
            }
            m if m.starts_with("image/") || m.starts_with("video/") || m.starts_with("audio/") => {
                if m == "image/svg+xml" {
                    ContentClass::Structured
                } else if m == "image/bmp" || m == "audio/wav" || m == "image/tiff" {
                    ContentClass::Binary
                } else {
                    ContentClass::Precompressed
                }
            }
            m if m.ends_with("+json") || m.ends_with("+xml") => ContentClass::Structured,
            m if m.starts_with("text/") => ContentClass::Text,
            "" => ContentClass::Unknown,
            _ => ContentClass::Unknown,
        }
    }

    /// Structured, prose or source text.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            ContentClass::Structured | ContentClass::Text | ContentClass::Code
        )
    }

    /// Opaque or already-compressed bytes.
    pub fn is_binary(&self) -> bool {
        matches!(self, ContentClass::Binary | ContentClass::Precompressed)
    }
}

/// Best-effort MIME type from a path's extension.
pub fn mime_for_path(path: &str) -> &'static str {
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "json" | "jsonc" | "json5" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "csv" | "tsv" => "text/csv",
        "md" | "markdown" | "rst" | "adoc" => "text/markdown",
        "txt" => "text/plain",
        "log" => "text/x-log",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" | "cjs" | "jsx" => "application/javascript",
        "ts" | "tsx" => "application/typescript",
        "py" => "text/x-python",
        "rs" => "text/x-rust",
        "go" => "text/x-go",
        "java" | "kt" => "text/x-java",
        "c" | "h" => "text/x-c",
        "cc" | "cpp" | "hpp" => "text/x-c++",
        "sh" | "bash" | "zsh" => "text/x-shellscript",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "zst" => "application/zstd",
        "br" => "application/x-brotli",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Dictionary ecosystem implied by a path's extension.
pub fn ecosystem_for_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())?;
    match ext.as_str() {
        "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" => Some("javascript"),
        "py" => Some("python"),
        "rs" => Some("rust"),
        "go" => Some("go"),
        "java" | "kt" => Some("java"),
        "html" | "htm" | "css" | "json" => Some("web"),
        _ => None,
    }
}

// ================================================================================================
// HINTS
// ================================================================================================

/// Caller-supplied access signals, excluding the size and content type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessMetadata {
    /// Normalized hotness in [0, 1]
    pub access_frequency: f64,
    /// Explicit hot-path marker
    pub is_hot: bool,
    /// Selects a shared dictionary when dictionaries are enabled
    pub ecosystem: Option<String>,
}

/// Per-call signals used to pick and tune a strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompressionHints {
    pub mime_type: String,
    pub access_frequency: f64,
    pub file_size: u64,
    pub is_hot: bool,
    pub ecosystem: Option<String>,
}

impl Default for CompressionHints {
    fn default() -> Self {
        Self {
            mime_type: "application/octet-stream".to_string(),
            access_frequency: 0.0,
            file_size: 0,
            is_hot: false,
            ecosystem: None,
        }
    }
}

impl CompressionHints {
    pub fn new(mime_type: impl Into<String>, file_size: u64) -> Self {
        Self {
            mime_type: mime_type.into(),
            file_size,
            ..Default::default()
        }
    }

    /// Combine a MIME type and payload size with access metadata.
    pub fn from_metadata(mime_type: &str, file_size: u64, metadata: &AccessMetadata) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            access_frequency: metadata.access_frequency,
            file_size,
            is_hot: metadata.is_hot,
            ecosystem: metadata.ecosystem.clone(),
        }
    }

    pub fn with_frequency(mut self, access_frequency: f64) -> Self {
        self.access_frequency = access_frequency;
        self
    }

    pub fn hot(mut self, is_hot: bool) -> Self {
        self.is_hot = is_hot;
        self
    }

    pub fn with_ecosystem(mut self, ecosystem: impl Into<String>) -> Self {
        self.ecosystem = Some(ecosystem.into());
        self
    }

    /// Access frequency clamped to [0, 1]; NaN counts as cold.
    #[inline]
    pub fn frequency(&self) -> f64 {
        if self.access_frequency.is_nan() {
            0.0
        } else {
            self.access_frequency.clamp(0.0, 1.0)
        }
    }

    /// Hotness used for level selection. The explicit hot marker wins.
    #[inline]
    pub fn heat(&self) -> f64 {
        if self.is_hot {
            1.0
        } else {
            self.frequency()
        }
    }

    pub fn content_class(&self) -> ContentClass {
        ContentClass::from_mime(&self.mime_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_tags_round_trip() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.tag().parse::<Algorithm>().ok(), Some(algorithm));
            assert_eq!(
                algorithm.to_string().parse::<Algorithm>().ok(),
                Some(algorithm)
            );
        }
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let err = "unknown".parse::<Algorithm>().unwrap_err();
        assert!(matches!(err, TierError::UnknownAlgorithm { tag } if tag == "unknown"));
    }

    #[test]
    fn test_content_class_from_mime() {
        assert_eq!(
            ContentClass::from_mime("application/json; charset=utf-8"),
            ContentClass::Structured
        );
        assert_eq!(ContentClass::from_mime("text/markdown"), ContentClass::Text);
        assert_eq!(ContentClass::from_mime("text/x-rust"), ContentClass::Code);
        assert_eq!(
            ContentClass::from_mime("image/png"),
            ContentClass::Precompressed
        );
        assert_eq!(
            ContentClass::from_mime("application/octet-stream"),
            ContentClass::Binary
        );
        assert_eq!(ContentClass::from_mime(""), ContentClass::Unknown);
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path("docs/guide.md"), "text/markdown");
        assert_eq!(mime_for_path("src/lib.RS"), "text/x-rust");
        assert_eq!(mime_for_path("a.dir/noext"), "application/octet-stream");
        assert_eq!(mime_for_path("config.yml"), "application/yaml");
    }

    #[test]
    fn test_ecosystem_for_path() {
        assert_eq!(ecosystem_for_path("src/main.rs"), Some("rust"));
        assert_eq!(ecosystem_for_path("app/index.TSX"), Some("javascript"));
        assert_eq!(ecosystem_for_path("notes.md"), None);
        assert_eq!(ecosystem_for_path("Makefile"), None);
    }

    #[test]
    fn test_hot_marker_overrides_frequency() {
        let hints = CompressionHints::new("text/plain", 10)
            .with_frequency(0.05)
            .hot(true);
        assert_eq!(hints.heat(), 1.0);

        let nan = CompressionHints::new("text/plain", 10).with_frequency(f64::NAN);
        assert_eq!(nan.heat(), 0.0);
    }
}
