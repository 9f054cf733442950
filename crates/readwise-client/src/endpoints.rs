//! Backend route templates.
//!
//! Every dynamic segment is percent-encoded here so callers pass raw book
//! ids and chapter filenames.

use readwise_core::defaults::API_PREFIX;
use readwise_core::Lang;
use urlencoding::encode;

pub fn books() -> String {
    format!("{API_PREFIX}/books")
}

pub fn book(id: &str) -> String {
    format!("{API_PREFIX}/books/{}", encode(id))
}

pub fn chapters(id: &str) -> String {
    format!("{}/chapters", book(id))
}

pub fn chapter_content(id: &str, file: &str) -> String {
    format!("{}/chapters/{}", book(id), encode(file))
}

pub fn extract(id: &str) -> String {
    format!("{}/extract", book(id))
}

pub fn extract_status(id: &str) -> String {
    format!("{}/extract/status", book(id))
}

pub fn extract_cancel(id: &str) -> String {
    format!("{}/extract/cancel", book(id))
}

pub fn source(id: &str) -> String {
    format!("{}/source", book(id))
}

pub fn resplit(id: &str) -> String {
    format!("{}/resplit", book(id))
}

pub fn models() -> String {
    format!("{API_PREFIX}/config/models")
}

pub fn languages(id: &str) -> String {
    format!("{}/languages", book(id))
}

pub fn translate(id: &str, target: Lang, model: &str) -> String {
    format!(
        "{}/translate?target_lang={}&model={}",
        book(id),
        target.code(),
        encode(model)
    )
}

pub fn translate_cancel(id: &str) -> String {
    format!("{}/translate/cancel", book(id))
}

pub fn lang_chapters(id: &str, lang: Lang) -> String {
    format!("{}/chapters/{}", book(id), lang.code())
}

pub fn lang_chapter_content(id: &str, lang: Lang, file: &str) -> String {
    format!("{}/{}", lang_chapters(id, lang), encode(file))
}

pub fn summary(id: &str, lang: Lang, file: &str) -> String {
    format!("{}/summary", lang_chapter_content(id, lang, file))
}

pub fn summary_with_model(id: &str, lang: Lang, file: &str, model: Option<&str>) -> String {
    with_model(summary(id, lang, file), model)
}

pub fn summary_mp3(id: &str, lang: Lang, file: &str) -> String {
    format!("{}/mp3", summary(id, lang, file))
}

pub fn summaries_status(id: &str, lang: Lang) -> String {
    format!("{}/summaries/{}/status", book(id), lang.code())
}

pub fn generate_all(id: &str, lang: Lang, model: Option<&str>) -> String {
    with_model(
        format!("{}/summaries/{}/generate-all", book(id), lang.code()),
        model,
    )
}

fn with_model(route: String, model: Option<&str>) -> String {
    match model {
        Some(m) if !m.is_empty() => format!("{}?model={}", route, encode(m)),
        _ => route,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_routes() {
        assert_eq!(books(), "/api/books");
        assert_eq!(chapters("deep-work"), "/api/books/deep-work/chapters");
        assert_eq!(extract_status("deep-work"), "/api/books/deep-work/extract/status");
    }

    #[test]
    fn test_segments_are_percent_encoded() {
        assert_eq!(book("my book"), "/api/books/my%20book");
        assert_eq!(
            chapter_content("b", "01 Intro & Setup.md"),
            "/api/books/b/chapters/01%20Intro%20%26%20Setup.md"
        );
    }

    #[test]
    fn test_translate_query() {
        assert_eq!(
            translate("b", Lang::Zh, "qwen2.5:14b"),
            "/api/books/b/translate?target_lang=zh&model=qwen2.5%3A14b"
        );
    }

    #[test]
    fn test_summary_routes() {
        assert_eq!(
            summary_mp3("b", Lang::En, "02.md"),
            "/api/books/b/chapters/en/02.md/summary/mp3"
        );
        assert_eq!(
            summary_with_model("b", Lang::En, "02.md", Some("gpt-4o")),
            "/api/books/b/chapters/en/02.md/summary?model=gpt-4o"
        );
        assert_eq!(
            summary_with_model("b", Lang::En, "02.md", Some("")),
            "/api/books/b/chapters/en/02.md/summary"
        );
    }

    #[test]
    fn test_cancel_routes() {
        assert_eq!(extract_cancel("b"), "/api/books/b/extract/cancel");
        assert_eq!(translate_cancel("b"), "/api/books/b/translate/cancel");
    }

    #[test]
    fn test_batch_routes() {
        assert_eq!(summaries_status("b", Lang::Zh), "/api/books/b/summaries/zh/status");
        assert_eq!(
            generate_all("b", Lang::Zh, None),
            "/api/books/b/summaries/zh/generate-all"
        );
        assert_eq!(
            generate_all("b", Lang::Zh, Some("gpt-4o")),
            "/api/books/b/summaries/zh/generate-all?model=gpt-4o"
        );
    }
}
