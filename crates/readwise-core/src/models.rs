//! Read models returned by the backend.
//!
//! Field names follow the wire format exactly.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Book metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub file: String,
    #[serde(default)]
    pub has_chapters: bool,
}

/// Chapter listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub name: String,
    pub filename: String,
    pub order: i32,
    /// Present on chapters listed per language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Chapter {
    /// Title if the backend supplied one, else the file-derived name.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

/// `{content}` body used by chapter and source endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBody {
    pub content: String,
}

/// Result of re-splitting the source markdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResplitResult {
    pub success: bool,
    pub message: String,
    pub chapter_count: u32,
}

/// Models available for translation and summarization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub models: Vec<String>,
    pub default: String,
}

/// Book language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    En,
    Zh,
}

impl Lang {
    pub const ALL: [Lang; 2] = [Lang::En, Lang::Zh];

    pub fn code(&self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Zh => "zh",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Lang::En => "English",
            Lang::Zh => "Chinese",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Lang {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Lang::En),
            "zh" => Ok(Lang::Zh),
            other => Err(Error::InvalidInput(format!("Unsupported language: {other}"))),
        }
    }
}

/// Per-language flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangFlags {
    #[serde(default)]
    pub en: bool,
    #[serde(default)]
    pub zh: bool,
}

impl LangFlags {
    pub fn get(&self, lang: Lang) -> bool {
        match lang {
            Lang::En => self.en,
            Lang::Zh => self.zh,
        }
    }
}

/// Per-language saved translation percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zh: Option<u8>,
}

impl LangProgress {
    pub fn get(&self, lang: Lang) -> Option<u8> {
        match lang {
            Lang::En => self.en,
            Lang::Zh => self.zh,
        }
    }
}

/// Language information for a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLanguages {
    pub source_lang: Lang,
    #[serde(default)]
    pub available_langs: Vec<Lang>,
    #[serde(default)]
    pub has_translation: LangFlags,
    #[serde(default)]
    pub translation_progress: Option<LangProgress>,
}

/// LLM-generated chapter summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSummary {
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub conclusions: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub voice_script: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChapterSummary {
    /// Parsed `generated_at`. The backend writes naive local ISO timestamps.
    pub fn generated_time(&self) -> Option<NaiveDateTime> {
        parse_timestamp(self.generated_at.as_deref()?)
    }

    pub fn edited_time(&self) -> Option<NaiveDateTime> {
        parse_timestamp(self.edited_at.as_deref()?)
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

/// `GET .../summary` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryEnvelope {
    #[serde(default)]
    pub summary: Option<ChapterSummary>,
    #[serde(default)]
    pub has_mp3: bool,
}

/// `POST .../summary/mp3` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mp3Status {
    pub success: bool,
    #[serde(default)]
    pub has_mp3: bool,
}

/// Summary presence for one chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterSummaryStatus {
    pub filename: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub has_summary: bool,
    #[serde(default)]
    pub has_mp3: bool,
}

/// Summary presence across a book language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllSummariesStatus {
    #[serde(default)]
    pub chapters: Vec<ChapterSummaryStatus>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub with_summary: u32,
    #[serde(default)]
    pub with_mp3: u32,
}

impl AllSummariesStatus {
    /// Chapters that have a narration track, in listing order.
    pub fn mp3_chapters(&self) -> Vec<&ChapterSummaryStatus> {
        self.chapters.iter().filter(|c| c.has_mp3).collect()
    }
}

/// Frame type of a batch summary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchEventType {
    Progress,
    Error,
    Complete,
}

/// Step of a batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStep {
    Summary,
    Mp3,
}

impl BatchStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStep::Summary => "summary",
            BatchStep::Mp3 => "mp3",
        }
    }
}

/// Progress frame of `generate-all`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    #[serde(rename = "type")]
    pub kind: BatchEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<BatchStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_summaries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_mp3s: Option<u32>,
}

impl BatchProgress {
    /// Completed share of the batch, 0–100.
    pub fn percent(&self) -> u8 {
        match (self.kind, self.current, self.total) {
            (BatchEventType::Complete, _, _) => 100,
            (_, Some(current), Some(total)) if total > 0 => {
                ((current.min(total) as f64 / total as f64) * 100.0).round() as u8
            }
            _ => 0,
        }
    }
}

/// `{detail}` error body returned by the backend.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}
