//! REST client for the readwise backend.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use readwise_core::{
    AllSummariesStatus, BatchProgress, Book, BookLanguages, Chapter, ChapterSummary, ContentBody,
    Error, ErrorBody, JobKind, JobProgress, Lang, ModelsConfig, Mp3Status, ResplitResult, Result,
    SummaryEnvelope,
};

use crate::backend::{JobBackend, JobParams, StatusSource};
use crate::config::ClientConfig;
use crate::endpoints;
use crate::languages::translation_status;
use crate::transport::{JobStream, JobTransport};

#[derive(Deserialize)]
struct SummaryResponse {
    summary: ChapterSummary,
}

/// HTTP client for every backend endpoint.
///
/// Plain requests carry the configured timeout. Job streams carry none,
/// since extraction and translation run for minutes.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(base_url = %config.base_url, "Initializing readwise client");

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Absolute URL for a route.
    pub fn url(&self, route: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), route)
    }

    fn request(&self, method: Method, route: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(route))
            .timeout(self.config.request_timeout())
    }

    fn stream_request(&self, method: Method, route: &str) -> RequestBuilder {
        self.client.request(method, self.url(route))
    }

    async fn send(&self, request: RequestBuilder, fallback: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::Transport(format!("{}: {}", fallback, e)))?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let detail = response.json::<ErrorBody>().await.ok().and_then(|b| b.detail);
        Err(Error::api(status, detail, fallback))
    }

    async fn json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        fallback: &str,
    ) -> Result<T> {
        let response = self.send(request, fallback).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Serialization(format!("{}: {}", fallback, e)))
    }

    // =========================================================================
    // BOOKS AND CHAPTERS
    // =========================================================================

    pub async fn list_books(&self) -> Result<Vec<Book>> {
        self.json(self.request(Method::GET, &endpoints::books()), "Failed to fetch books")
            .await
    }

    pub async fn get_book(&self, book_id: &str) -> Result<Book> {
        self.json(
            self.request(Method::GET, &endpoints::book(book_id)),
            "Failed to fetch book",
        )
        .await
    }

    pub async fn list_chapters(&self, book_id: &str) -> Result<Vec<Chapter>> {
        self.json(
            self.request(Method::GET, &endpoints::chapters(book_id)),
            "Failed to fetch chapters",
        )
        .await
    }

    pub async fn chapter_content(&self, book_id: &str, file: &str) -> Result<String> {
        let body: ContentBody = self
            .json(
                self.request(Method::GET, &endpoints::chapter_content(book_id, file)),
                "Failed to fetch chapter content",
            )
            .await?;
        Ok(body.content)
    }

    pub async fn lang_chapters(&self, book_id: &str, lang: Lang) -> Result<Vec<Chapter>> {
        self.json(
            self.request(Method::GET, &endpoints::lang_chapters(book_id, lang)),
            "Failed to fetch chapters",
        )
        .await
    }

    pub async fn lang_chapter_content(
        &self,
        book_id: &str,
        lang: Lang,
        file: &str,
    ) -> Result<String> {
        let body: ContentBody = self
            .json(
                self.request(
                    Method::GET,
                    &endpoints::lang_chapter_content(book_id, lang, file),
                ),
                "Failed to fetch chapter content",
            )
            .await?;
        Ok(body.content)
    }

    // =========================================================================
    // EXTRACTION
    // =========================================================================

    /// Start (or resume) extraction and stream its progress.
    pub async fn start_extraction(
        &self,
        book_id: &str,
        cancel: CancellationToken,
    ) -> Result<JobStream<JobProgress>> {
        debug!(book_id, "Starting extraction stream");
        JobTransport::new(
            self.stream_request(Method::POST, &endpoints::extract(book_id)),
            "extraction",
        )
        .with_cancel(cancel)
        .open()
        .await
    }

    pub async fn extraction_status(&self, book_id: &str) -> Result<JobProgress> {
        self.json(
            self.request(Method::GET, &endpoints::extract_status(book_id)),
            "Failed to fetch extraction status",
        )
        .await
    }

    pub async fn cancel_extraction(&self, book_id: &str) -> Result<()> {
        self.send(
            self.request(Method::POST, &endpoints::extract_cancel(book_id)),
            "Failed to cancel extraction",
        )
        .await?;
        Ok(())
    }

    pub async fn source_markdown(&self, book_id: &str) -> Result<String> {
        let body: ContentBody = self
            .json(
                self.request(Method::GET, &endpoints::source(book_id)),
                "Failed to fetch source markdown",
            )
            .await?;
        Ok(body.content)
    }

    pub async fn update_source_markdown(&self, book_id: &str, content: &str) -> Result<()> {
        self.send(
            self.request(Method::PUT, &endpoints::source(book_id))
                .json(&ContentBody {
                    content: content.to_string(),
                }),
            "Failed to update source markdown",
        )
        .await?;
        Ok(())
    }

    pub async fn resplit(&self, book_id: &str) -> Result<ResplitResult> {
        self.json(
            self.request(Method::POST, &endpoints::resplit(book_id)),
            "Failed to re-split chapters",
        )
        .await
    }

    // =========================================================================
    // TRANSLATION
    // =========================================================================

    pub async fn models(&self) -> Result<ModelsConfig> {
        self.json(
            self.request(Method::GET, &endpoints::models()),
            "Failed to fetch models",
        )
        .await
    }

    pub async fn languages(&self, book_id: &str) -> Result<BookLanguages> {
        self.json(
            self.request(Method::GET, &endpoints::languages(book_id)),
            "Failed to fetch language info",
        )
        .await
    }

    /// Start (or resume) translation into `target` and stream its progress.
    pub async fn start_translation(
        &self,
        book_id: &str,
        target: Lang,
        model: &str,
        cancel: CancellationToken,
    ) -> Result<JobStream<JobProgress>> {
        debug!(book_id, %target, model, "Starting translation stream");
        JobTransport::new(
            self.stream_request(Method::POST, &endpoints::translate(book_id, target, model)),
            "translation",
        )
        .with_cancel(cancel)
        .open()
        .await
    }

    pub async fn cancel_translation(&self, book_id: &str) -> Result<()> {
        self.send(
            self.request(Method::POST, &endpoints::translate_cancel(book_id)),
            "Failed to cancel translation",
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // SUMMARIES
    // =========================================================================

    pub async fn summary(&self, book_id: &str, lang: Lang, file: &str) -> Result<SummaryEnvelope> {
        self.json(
            self.request(Method::GET, &endpoints::summary(book_id, lang, file)),
            "Failed to fetch summary",
        )
        .await
    }

    pub async fn generate_summary(
        &self,
        book_id: &str,
        lang: Lang,
        file: &str,
        model: Option<&str>,
    ) -> Result<ChapterSummary> {
        let route = endpoints::summary_with_model(book_id, lang, file, model);
        // generation is a single LLM call and may exceed the default timeout
        let body: SummaryResponse = self
            .json(
                self.stream_request(Method::POST, &route),
                "Failed to generate summary",
            )
            .await?;
        Ok(body.summary)
    }

    pub async fn save_summary(
        &self,
        book_id: &str,
        lang: Lang,
        file: &str,
        summary: &ChapterSummary,
    ) -> Result<ChapterSummary> {
        let body: SummaryResponse = self
            .json(
                self.request(Method::PUT, &endpoints::summary(book_id, lang, file))
                    .json(summary),
                "Failed to save summary",
            )
            .await?;
        Ok(body.summary)
    }

    pub async fn generate_mp3(&self, book_id: &str, lang: Lang, file: &str) -> Result<Mp3Status> {
        self.json(
            self.stream_request(Method::POST, &endpoints::summary_mp3(book_id, lang, file)),
            "Failed to generate MP3",
        )
        .await
    }

    /// Download the narration track.
    pub async fn fetch_mp3(&self, book_id: &str, lang: Lang, file: &str) -> Result<Bytes> {
        let response = self
            .send(
                self.stream_request(Method::GET, &endpoints::summary_mp3(book_id, lang, file)),
                "Failed to fetch MP3",
            )
            .await?;
        Ok(response.bytes().await?)
    }

    /// Playable URL of the narration track.
    pub fn mp3_url(&self, book_id: &str, lang: Lang, file: &str) -> String {
        self.url(&endpoints::summary_mp3(book_id, lang, file))
    }

    pub async fn summaries_status(&self, book_id: &str, lang: Lang) -> Result<AllSummariesStatus> {
        self.json(
            self.request(Method::GET, &endpoints::summaries_status(book_id, lang)),
            "Failed to fetch summaries status",
        )
        .await
    }

    /// Generate every missing summary and narration track, streaming progress.
    pub async fn generate_all(
        &self,
        book_id: &str,
        lang: Lang,
        model: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<JobStream<BatchProgress>> {
        JobTransport::new(
            self.stream_request(Method::POST, &endpoints::generate_all(book_id, lang, model)),
            "batch generation",
        )
        .with_cancel(cancel)
        .open()
        .await
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn job_status(&self, kind: JobKind, book_id: &str) -> Result<JobProgress> {
        match kind {
            JobKind::Extraction => self.extraction_status(book_id).await,
            JobKind::Translation => Ok(translation_status(&self.languages(book_id).await?)),
        }
    }
}

#[async_trait]
impl JobBackend for ApiClient {
    async fn open_job(
        &self,
        book_id: &str,
        params: &JobParams,
        cancel: CancellationToken,
    ) -> Result<JobStream<JobProgress>> {
        match params {
            JobParams::Extraction => self.start_extraction(book_id, cancel).await,
            JobParams::Translation { target, model } => {
                self.start_translation(book_id, *target, model, cancel).await
            }
        }
    }

    async fn cancel_job(&self, kind: JobKind, book_id: &str) -> Result<()> {
        match kind {
            JobKind::Extraction => self.cancel_extraction(book_id).await,
            JobKind::Translation => self.cancel_translation(book_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_and_route() {
        let api = ApiClient::new(ClientConfig::default().with_base_url("http://h:1/")).unwrap();
        assert_eq!(api.url("/api/books"), "http://h:1/api/books");
    }

    #[test]
    fn test_mp3_url() {
        let api = ApiClient::new(ClientConfig::default().with_base_url("http://h:1")).unwrap();
        assert_eq!(
            api.mp3_url("b", Lang::En, "01 a.md"),
            "http://h:1/api/books/b/chapters/en/01%20a.md/summary/mp3"
        );
    }
}
