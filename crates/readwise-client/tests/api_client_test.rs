//! REST and SSE client tests against a mock backend.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use readwise_client::{ApiClient, ClientConfig, StatusSource};
use readwise_core::{BatchEventType, Error, JobKind, JobStatus, Lang};

fn client(server: &MockServer) -> ApiClient {
    ApiClient::new(ClientConfig::default().with_base_url(server.uri())).unwrap()
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

#[tokio::test]
async fn test_list_books() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "deep-work", "title": "Deep Work", "description": "", "file": "deep-work.pdf", "has_chapters": true},
            {"id": "atomic", "title": "Atomic Habits", "file": "atomic.pdf"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let books = client(&server).list_books().await.unwrap();
    assert_eq!(books.len(), 2);
    assert!(books[0].has_chapters);
    assert!(!books[1].has_chapters);
}

#[tokio::test]
async fn test_chapter_filename_is_percent_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/books/my%20book/chapters/01%20Intro.md"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": "# Intro"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let content = client(&server)
        .chapter_content("my book", "01 Intro.md")
        .await
        .unwrap();
    assert_eq!(content, "# Intro");
}

#[tokio::test]
async fn test_api_error_carries_server_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/books/b/resplit"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(serde_json::json!({"detail": "No source markdown"})),
        )
        .mount(&server)
        .await;

    let err = client(&server).resplit("b").await.unwrap_err();
    match err {
        Error::Api { status, detail } => {
            assert_eq!(status, 500);
            assert_eq!(detail, "No source markdown");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_api_error_without_detail_uses_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/books/b/extract/cancel"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let err = client(&server).cancel_extraction("b").await.unwrap_err();
    assert_eq!(err.to_string(), "API error (400): Failed to cancel extraction");
}

#[tokio::test]
async fn test_update_source_sends_content_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/books/b/source"))
        .and(body_json(serde_json::json!({"content": "# Fixed"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})),
        )
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .update_source_markdown("b", "# Fixed")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_extraction_stream_decodes_until_done() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"status\":\"extracting\",\"progress\":10,\"message\":\"Converting PDF\",\"current_step\":\"PDF\"}\n\n",
        ": keep-alive\n\n",
        "data: {\"status\":\"splitting\",\"progress\":85,\"message\":\"Splitting\"}\n\n",
        "data: {\"status\":\"completed\",\"progress\":100,\"message\":\"Done\"}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/books/b/extract"))
        .respond_with(sse(body))
        .expect(1)
        .mount(&server)
        .await;

    let stream = client(&server)
        .start_extraction("b", CancellationToken::new())
        .await
        .unwrap();
    let events: Vec<_> = stream.map(|r| r.unwrap()).collect().await;

    let statuses: Vec<JobStatus> = events.iter().map(|e| e.status.clone()).collect();
    assert_eq!(
        statuses,
        vec![JobStatus::Extracting, JobStatus::Splitting, JobStatus::Completed]
    );
    assert_eq!(events[0].current_step.as_deref(), Some("PDF"));
}

#[tokio::test]
async fn test_rejected_stream_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/books/b/extract"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({"detail": "Book not found"})),
        )
        .mount(&server)
        .await;

    let err = match client(&server)
        .start_extraction("b", CancellationToken::new())
        .await
    {
        Ok(_) => panic!("expected the stream to be rejected"),
        Err(e) => e,
    };
    assert!(err.is_transport());
    assert!(err.to_string().contains("Book not found"));
}

#[tokio::test]
async fn test_cancelled_token_skips_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/books/b/extract"))
        .respond_with(sse("data: [DONE]\n"))
        .expect(0)
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    token.cancel();
    let stream = client(&server).start_extraction("b", token).await.unwrap();
    assert_eq!(stream.count().await, 0);
}

#[tokio::test]
async fn test_translation_stream_query_and_frames() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"progress\":20,\"message\":\"Chapter 1/5\"}\n\n",
        "data: {\"progress\":40,\"message\":\"Chapter 2/5\"}\n\n",
        "data: {\"status\":\"completed\",\"progress\":100,\"chapter_count\":5}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/books/b/translate"))
        .and(query_param("target_lang", "zh"))
        .and(query_param("model", "qwen2.5:14b"))
        .respond_with(sse(body))
        .expect(1)
        .mount(&server)
        .await;

    let stream = client(&server)
        .start_translation("b", Lang::Zh, "qwen2.5:14b", CancellationToken::new())
        .await
        .unwrap();
    let events: Vec<_> = stream.map(|r| r.unwrap()).collect().await;

    assert_eq!(events.len(), 3);
    assert_eq!(events[0].status, JobStatus::Running);
    assert_eq!(events[2].chapter_count, Some(5));
}

#[tokio::test]
async fn test_translation_status_is_derived_from_languages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/books/b/languages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "source_lang": "en",
            "available_langs": ["en"],
            "has_translation": {"en": true, "zh": false},
            "translation_progress": {"zh": 60}
        })))
        .mount(&server)
        .await;

    let status = client(&server)
        .job_status(JobKind::Translation, "b")
        .await
        .unwrap();
    assert_eq!(status.status, JobStatus::Stopped);
    assert_eq!(status.percent(), 60);
}

#[tokio::test]
async fn test_generate_summary_unwraps_summary_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/books/b/chapters/en/01.md/summary"))
        .and(query_param("model", "gpt-4o"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "summary": {
                "key_points": ["Focus is rare"],
                "conclusions": [],
                "examples": [],
                "voice_script": "Today we look at focus.",
                "model": "gpt-4o"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let summary = client(&server)
        .generate_summary("b", Lang::En, "01.md", Some("gpt-4o"))
        .await
        .unwrap();
    assert_eq!(summary.key_points, vec!["Focus is rare"]);
    assert_eq!(summary.model.as_deref(), Some("gpt-4o"));
}

#[tokio::test]
async fn test_fetch_mp3_returns_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/books/b/chapters/zh/02.md/summary/mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x49, 0x44, 0x33], "audio/mpeg"))
        .mount(&server)
        .await;

    let bytes = client(&server).fetch_mp3("b", Lang::Zh, "02.md").await.unwrap();
    assert_eq!(&bytes[..], b"ID3");
}

#[tokio::test]
async fn test_generate_all_stream() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"type\":\"progress\",\"current\":1,\"total\":2,\"chapter\":\"01.md\",\"step\":\"summary\"}\n\n",
        "data: {\"type\":\"error\",\"chapter\":\"02.md\",\"message\":\"TTS failed\"}\n\n",
        "data: {\"type\":\"complete\",\"generated_summaries\":2,\"generated_mp3s\":1}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/books/b/summaries/en/generate-all"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let stream = client(&server)
        .generate_all("b", Lang::En, None, CancellationToken::new())
        .await
        .unwrap();
    let frames: Vec<_> = stream.map(|r| r.unwrap()).collect().await;
    let kinds: Vec<BatchEventType> = frames.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            BatchEventType::Progress,
            BatchEventType::Error,
            BatchEventType::Complete
        ]
    );
}
