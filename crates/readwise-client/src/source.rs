//! Source markdown editing before a re-split.

use std::sync::Arc;

use tracing::info;

use readwise_core::{Error, ResplitResult, Result};

use crate::api::ApiClient;

/// Editable copy of a book's extracted markdown.
pub struct SourceDraft {
    api: Arc<ApiClient>,
    book_id: String,
    original: String,
    content: String,
}

impl SourceDraft {
    pub async fn load(api: Arc<ApiClient>, book_id: impl Into<String>) -> Result<Self> {
        let book_id = book_id.into();
        let original = api.source_markdown(&book_id).await?;
        Ok(Self {
            api,
            book_id,
            content: original.clone(),
            original,
        })
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }

    pub fn has_changes(&self) -> bool {
        self.content != self.original
    }

    pub fn revert(&mut self) {
        self.content = self.original.clone();
    }

    pub async fn save(&mut self) -> Result<()> {
        if !self.has_changes() {
            return Ok(());
        }
        self.api
            .update_source_markdown(&self.book_id, &self.content)
            .await?;
        self.original = self.content.clone();
        info!(book_id = %self.book_id, bytes = self.content.len(), "Source markdown saved");
        Ok(())
    }

    /// Regenerate chapters from the saved source.
    pub async fn resplit(&self) -> Result<ResplitResult> {
        if self.has_changes() {
            return Err(Error::UnsavedChanges(
                "Save the source markdown before re-splitting".to_string(),
            ));
        }
        let result = self.api.resplit(&self.book_id).await?;
        info!(book_id = %self.book_id, chapters = result.chapter_count, "Chapters re-split");
        Ok(result)
    }

    pub async fn save_and_resplit(&mut self) -> Result<ResplitResult> {
        self.save().await?;
        self.resplit().await
    }
}
