//! Translation target selection and resume display.

use readwise_core::{BookLanguages, JobProgress, JobStatus, Lang};

/// Language a new translation would produce: Chinese first, then English.
pub fn translation_target(info: &BookLanguages) -> Option<Lang> {
    [Lang::Zh, Lang::En]
        .into_iter()
        .find(|lang| !info.has_translation.get(*lang))
}

/// Saved percentage of an interrupted translation, 0 when none.
pub fn saved_progress(info: &BookLanguages, lang: Lang) -> u8 {
    info.translation_progress
        .and_then(|p| p.get(lang))
        .unwrap_or(0)
        .min(100)
}

/// True when starting a translation to `lang` continues from saved chapters.
pub fn is_resume(info: &BookLanguages, lang: Lang) -> bool {
    !info.has_translation.get(lang) && saved_progress(info, lang) > 0
}

/// Label for the translate action, `None` when nothing is left to translate.
pub fn translate_label(info: &BookLanguages) -> Option<String> {
    let target = translation_target(info)?;
    if is_resume(info, target) {
        Some(format!("Resume ({}%)", saved_progress(info, target)))
    } else {
        Some(format!("Translate to {}", target.label()))
    }
}

/// Language option label, with saved progress appended for partial translations.
pub fn language_label(info: &BookLanguages, lang: Lang) -> String {
    if is_resume(info, lang) {
        format!("{} ({}%)", lang.label(), saved_progress(info, lang))
    } else {
        lang.label().to_string()
    }
}

/// Translation job status derived from the language listing.
///
/// The backend keeps no live translation status; a partial translation
/// shows up only as saved progress.
pub fn translation_status(info: &BookLanguages) -> JobProgress {
    match translation_target(info) {
        None => JobProgress::new(JobStatus::Completed, 100.0, "All translations available"),
        Some(lang) if is_resume(info, lang) => {
            let pct = saved_progress(info, lang);
            JobProgress::new(
                JobStatus::Stopped,
                pct as f64,
                format!("{} translation paused at {}%", lang.label(), pct),
            )
        }
        Some(_) => JobProgress::new(JobStatus::Idle, 0.0, "Not translated"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readwise_core::{LangFlags, LangProgress};

    fn info(en: bool, zh: bool, zh_progress: Option<u8>) -> BookLanguages {
        BookLanguages {
            source_lang: Lang::En,
            available_langs: vec![Lang::En],
            has_translation: LangFlags { en, zh },
            translation_progress: zh_progress.map(|p| LangProgress {
                en: None,
                zh: Some(p),
            }),
        }
    }

    #[test]
    fn test_target_prefers_chinese() {
        assert_eq!(translation_target(&info(false, false, None)), Some(Lang::Zh));
        assert_eq!(translation_target(&info(false, true, None)), Some(Lang::En));
        assert_eq!(translation_target(&info(true, true, None)), None);
    }

    #[test]
    fn test_resume_label() {
        let partial = info(true, false, Some(40));
        assert!(is_resume(&partial, Lang::Zh));
        assert_eq!(translate_label(&partial).as_deref(), Some("Resume (40%)"));
        assert_eq!(language_label(&partial, Lang::Zh), "Chinese (40%)");
        assert_eq!(language_label(&partial, Lang::En), "English");
    }

    #[test]
    fn test_fresh_label() {
        let fresh = info(true, false, None);
        assert!(!is_resume(&fresh, Lang::Zh));
        assert_eq!(translate_label(&fresh).as_deref(), Some("Translate to Chinese"));
        assert_eq!(translate_label(&info(true, true, None)), None);
    }

    #[test]
    fn test_zero_saved_progress_is_not_resume() {
        assert!(!is_resume(&info(true, false, Some(0)), Lang::Zh));
    }

    #[test]
    fn test_translation_status_derivation() {
        assert_eq!(
            translation_status(&info(true, true, None)).status,
            JobStatus::Completed
        );
        let paused = translation_status(&info(true, false, Some(55)));
        assert_eq!(paused.status, JobStatus::Stopped);
        assert_eq!(paused.percent(), 55);
        assert_eq!(
            translation_status(&info(true, false, None)).status,
            JobStatus::Idle
        );
    }
}
