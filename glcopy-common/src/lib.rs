use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Container/streaming format of the content a player session is launched with.
///
/// The numeric values are part of the launch contract and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Dash,
    SmoothStreaming,
    Hls,
    Mp4,
    Mp3,
    Fmp4,
    Webm,
    Ts,
    Aac,
    M4a,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnsupportedContentType {
    #[error("unsupported content type: {0}")]
    Code(i32),
    #[error("unsupported content type: {0:?}")]
    Name(String),
}

impl ContentType {
    pub const ALL: [ContentType; 10] = [
        ContentType::Dash,
        ContentType::SmoothStreaming,
        ContentType::Hls,
        ContentType::Mp4,
        ContentType::Mp3,
        ContentType::Fmp4,
        ContentType::Webm,
        ContentType::Ts,
        ContentType::Aac,
        ContentType::M4a,
    ];

    pub fn code(self) -> i32 {
        match self {
            ContentType::Dash => 0,
            ContentType::SmoothStreaming => 1,
            ContentType::Hls => 2,
            ContentType::Mp4 => 3,
            ContentType::Mp3 => 4,
            ContentType::Fmp4 => 5,
            ContentType::Webm => 6,
            ContentType::Ts => 7,
            ContentType::Aac => 8,
            ContentType::M4a => 9,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ContentType::Dash => "dash",
            ContentType::SmoothStreaming => "smooth-streaming",
            ContentType::Hls => "hls",
            ContentType::Mp4 => "mp4",
            ContentType::Mp3 => "mp3",
            ContentType::Fmp4 => "fmp4",
            ContentType::Webm => "webm",
            ContentType::Ts => "ts",
            ContentType::Aac => "aac",
            ContentType::M4a => "m4a",
        }
    }

    /// Adaptive formats are served by dedicated renderer builders; the rest go
    /// through a single extractor-based builder.
    pub fn is_adaptive(self) -> bool {
        matches!(
            self,
            ContentType::Dash | ContentType::SmoothStreaming | ContentType::Hls
        )
    }
}

impl TryFrom<i32> for ContentType {
    type Error = UnsupportedContentType;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        ContentType::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .ok_or(UnsupportedContentType::Code(code))
    }
}

impl FromStr for ContentType {
    type Err = UnsupportedContentType;

    /// Accepts either the numeric code or the kebab-case name ("ss" is
    /// accepted for smooth streaming).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(code) = s.parse::<i32>() {
            return ContentType::try_from(code);
        }
        let lower = s.to_ascii_lowercase();
        if lower == "ss" {
            return Ok(ContentType::SmoothStreaming);
        }
        ContentType::ALL
            .into_iter()
            .find(|t| t.name() == lower)
            .ok_or_else(|| UnsupportedContentType::Name(s.to_string()))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a player session is started with: content location, how to read it,
/// and an optional identifier used for licence lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub uri: String,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

impl LaunchRequest {
    pub fn new(uri: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            uri: uri.into(),
            content_type,
            content_id: None,
        }
    }

    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
