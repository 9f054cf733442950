//! Chapter summary view state.

use std::sync::Arc;

use tracing::{debug, info};

use readwise_core::{ChapterSummary, Error, Lang, Result};

use crate::api::ApiClient;
use crate::audio::{AudioPlayer, AudioSlot, AudioSource};

/// Summary, voice script edits and narration for one chapter.
pub struct SummaryPanel<P: AudioPlayer> {
    api: Arc<ApiClient>,
    book_id: String,
    lang: Lang,
    chapter: String,
    summary: Option<ChapterSummary>,
    has_mp3: bool,
    draft_script: Option<String>,
    audio: AudioSlot<P>,
}

impl<P: AudioPlayer> SummaryPanel<P> {
    pub fn new(
        api: Arc<ApiClient>,
        book_id: impl Into<String>,
        lang: Lang,
        chapter: impl Into<String>,
        player: P,
    ) -> Self {
        Self {
            api,
            book_id: book_id.into(),
            lang,
            chapter: chapter.into(),
            summary: None,
            has_mp3: false,
            draft_script: None,
            audio: AudioSlot::new(player),
        }
    }

    pub fn chapter(&self) -> &str {
        &self.chapter
    }

    pub fn summary(&self) -> Option<&ChapterSummary> {
        self.summary.as_ref()
    }

    pub fn has_mp3(&self) -> bool {
        self.has_mp3
    }

    pub fn audio(&self) -> &AudioSlot<P> {
        &self.audio
    }

    /// Voice script as currently edited.
    pub fn script(&self) -> Option<&str> {
        self.draft_script
            .as_deref()
            .or_else(|| self.summary.as_ref().map(|s| s.voice_script.as_str()))
    }

    pub fn has_edits(&self) -> bool {
        match (&self.draft_script, &self.summary) {
            (Some(draft), Some(summary)) => *draft != summary.voice_script,
            _ => false,
        }
    }

    pub async fn load(&mut self) -> Result<()> {
        self.audio.release();
        self.draft_script = None;
        let envelope = self
            .api
            .summary(&self.book_id, self.lang, &self.chapter)
            .await?;
        self.summary = envelope.summary;
        self.has_mp3 = envelope.has_mp3;
        debug!(
            book_id = %self.book_id,
            chapter = %self.chapter,
            has_summary = self.summary.is_some(),
            has_mp3 = self.has_mp3,
            "Loaded summary"
        );
        Ok(())
    }

    /// Show another chapter. Audio of the previous chapter is released.
    pub async fn switch_chapter(&mut self, chapter: impl Into<String>) -> Result<()> {
        self.audio.release();
        self.chapter = chapter.into();
        self.summary = None;
        self.has_mp3 = false;
        self.load().await
    }

    /// Generate (or regenerate) the summary. The backend deletes the old
    /// narration track.
    pub async fn generate(&mut self, model: Option<&str>) -> Result<&ChapterSummary> {
        self.audio.release();
        let summary = self
            .api
            .generate_summary(&self.book_id, self.lang, &self.chapter, model)
            .await?;
        info!(
            book_id = %self.book_id,
            chapter = %self.chapter,
            model = ?summary.model,
            "Summary generated"
        );
        self.draft_script = None;
        self.has_mp3 = false;
        Ok(self.summary.insert(summary))
    }

    pub fn edit_script(&mut self, script: impl Into<String>) -> Result<()> {
        if self.summary.is_none() {
            return Err(Error::InvalidState(format!(
                "No summary to edit for {}",
                self.chapter
            )));
        }
        self.draft_script = Some(script.into());
        Ok(())
    }

    pub fn discard_edits(&mut self) {
        self.draft_script = None;
    }

    /// Save the edited voice script.
    pub async fn save(&mut self) -> Result<()> {
        let Some(current) = self.summary.as_ref() else {
            return Err(Error::InvalidState(format!(
                "No summary to save for {}",
                self.chapter
            )));
        };
        let Some(script) = self.draft_script.clone() else {
            return Ok(());
        };

        let mut edited = current.clone();
        edited.voice_script = script;
        let saved = self
            .api
            .save_summary(&self.book_id, self.lang, &self.chapter, &edited)
            .await?;
        self.summary = Some(saved);
        self.draft_script = None;
        Ok(())
    }

    /// Synthesize the narration track from the saved voice script.
    pub async fn generate_mp3(&mut self) -> Result<()> {
        if self.has_edits() {
            return Err(Error::UnsavedChanges(
                "Save the voice script before generating audio".to_string(),
            ));
        }
        self.audio.release();
        let status = self
            .api
            .generate_mp3(&self.book_id, self.lang, &self.chapter)
            .await?;
        self.has_mp3 = status.success && status.has_mp3;
        Ok(())
    }

    pub fn mp3_url(&self) -> Option<String> {
        self.has_mp3
            .then(|| self.api.mp3_url(&self.book_id, self.lang, &self.chapter))
    }

    pub fn play(&mut self) -> Result<()> {
        let Some(url) = self.mp3_url() else {
            return Err(Error::NotFound(format!("No narration for {}", self.chapter)));
        };
        self.audio.attach(AudioSource {
            book_id: self.book_id.clone(),
            lang: self.lang,
            chapter: self.chapter.clone(),
            url,
        })
    }

    pub fn stop(&mut self) {
        self.audio.release();
    }
}
