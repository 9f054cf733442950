//! Decoding of backend payloads as they appear on the wire.

use readwise_core::{
    AllSummariesStatus, BatchEventType, BatchProgress, BatchStep, Book, BookLanguages, Chapter,
    JobProgress, JobStatus, Lang, ModelsConfig, SummaryEnvelope,
};

#[test]
fn test_book_list_with_missing_optional_fields() {
    let books: Vec<Book> = serde_json::from_str(
        r#"[
            {"id": "deep-work", "title": "Deep Work", "description": "Rules for focus", "file": "deep-work.pdf", "has_chapters": true},
            {"id": "new", "title": "New Upload", "file": "new.pdf"}
        ]"#,
    )
    .unwrap();
    assert_eq!(books[0].description, "Rules for focus");
    assert!(books[0].has_chapters);
    assert_eq!(books[1].description, "");
    assert!(!books[1].has_chapters);
}

#[test]
fn test_chapter_display_name_prefers_title() {
    let chapters: Vec<Chapter> = serde_json::from_str(
        r#"[
            {"name": "01_intro", "filename": "01_intro.md", "order": 1, "title": "Introduction"},
            {"name": "02_focus", "filename": "02_focus.md", "order": 2}
        ]"#,
    )
    .unwrap();
    assert_eq!(chapters[0].display_name(), "Introduction");
    assert_eq!(chapters[1].display_name(), "02_focus");
}

#[test]
fn test_languages_without_progress_map() {
    let info: BookLanguages = serde_json::from_str(
        r#"{"source_lang": "zh", "available_langs": ["zh"], "has_translation": {"zh": true, "en": false}}"#,
    )
    .unwrap();
    assert_eq!(info.source_lang, Lang::Zh);
    assert!(info.has_translation.get(Lang::Zh));
    assert!(!info.has_translation.get(Lang::En));
    assert!(info.translation_progress.is_none());
}

#[test]
fn test_languages_with_partial_progress() {
    let info: BookLanguages = serde_json::from_str(
        r#"{"source_lang": "en", "available_langs": ["en"], "has_translation": {"en": true, "zh": false}, "translation_progress": {"zh": 35}}"#,
    )
    .unwrap();
    let progress = info.translation_progress.unwrap();
    assert_eq!(progress.get(Lang::Zh), Some(35));
    assert_eq!(progress.get(Lang::En), None);
}

#[test]
fn test_models_config() {
    let models: ModelsConfig =
        serde_json::from_str(r#"{"models": ["qwen2.5:14b", "gpt-4o"], "default": "qwen2.5:14b"}"#)
            .unwrap();
    assert_eq!(models.models.len(), 2);
    assert_eq!(models.default, "qwen2.5:14b");
}

#[test]
fn test_status_poll_payloads() {
    let idle: JobProgress =
        serde_json::from_str(r#"{"status": "idle", "progress": 0, "message": null}"#).unwrap();
    assert_eq!(idle.status, JobStatus::Idle);
    assert!(idle.status.is_settled());
    assert_eq!(idle.message(), "");

    let resting: JobProgress = serde_json::from_str(
        r#"{"status": "extracted", "progress": 50, "message": "PDF converted", "current_step": "Waiting to split"}"#,
    )
    .unwrap();
    assert_eq!(resting.status, JobStatus::Extracted);
    assert_eq!(resting.percent(), 50);
    assert!(!resting.status.is_active());
}

#[test]
fn test_fractional_progress_rounds() {
    let p: JobProgress =
        serde_json::from_str(r#"{"status": "extracting", "progress": 33.6}"#).unwrap();
    assert_eq!(p.percent(), 34);
}

#[test]
fn test_summary_envelope_without_summary() {
    let envelope: SummaryEnvelope = serde_json::from_str(r#"{"summary": null}"#).unwrap();
    assert!(envelope.summary.is_none());
    assert!(!envelope.has_mp3);
}

#[test]
fn test_summary_timestamps_parse() {
    let envelope: SummaryEnvelope = serde_json::from_str(
        r#"{
            "summary": {
                "key_points": ["a"],
                "conclusions": ["b"],
                "examples": ["c"],
                "voice_script": "Narration",
                "generated_at": "2025-01-03T10:15:30.123456",
                "edited_at": "2025-01-04T08:00:00",
                "model": "gpt-4o",
                "domain": "psychology"
            },
            "has_mp3": true
        }"#,
    )
    .unwrap();
    let summary = envelope.summary.unwrap();
    assert!(envelope.has_mp3);
    assert!(summary.generated_time().is_some());
    assert!(summary.edited_time().is_some());
    assert_eq!(summary.domain.as_deref(), Some("psychology"));
}

#[test]
fn test_summaries_status_mp3_chapters() {
    let status: AllSummariesStatus = serde_json::from_str(
        r#"{
            "chapters": [
                {"filename": "01.md", "title": "One", "has_summary": true, "has_mp3": true},
                {"filename": "02.md", "title": "Two", "has_summary": false, "has_mp3": false},
                {"filename": "03.md", "title": "Three", "has_summary": true, "has_mp3": true}
            ],
            "total": 3,
            "with_summary": 2,
            "with_mp3": 2
        }"#,
    )
    .unwrap();
    let files: Vec<&str> = status
        .mp3_chapters()
        .iter()
        .map(|c| c.filename.as_str())
        .collect();
    assert_eq!(files, vec!["01.md", "03.md"]);
}

#[test]
fn test_batch_frames() {
    let progress: BatchProgress = serde_json::from_str(
        r#"{"type": "progress", "current": 3, "total": 12, "chapter": "03.md", "step": "mp3"}"#,
    )
    .unwrap();
    assert_eq!(progress.kind, BatchEventType::Progress);
    assert_eq!(progress.step, Some(BatchStep::Mp3));
    assert_eq!(progress.percent(), 25);

    let done: BatchProgress = serde_json::from_str(
        r#"{"type": "complete", "generated_summaries": 12, "generated_mp3s": 11}"#,
    )
    .unwrap();
    assert_eq!(done.kind, BatchEventType::Complete);
    assert_eq!(done.generated_mp3s, Some(11));
}
