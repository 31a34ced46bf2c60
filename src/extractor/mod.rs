//! HTML to plain text.
//!
//! A precision-oriented block walk runs first; when it yields too little, the
//! readability extractor is tried and its sanitised output flattened the same
//! way. The result is normalised and must clear [`MIN_CONTENT_CHARS`].

pub mod cleaner;
pub mod language;
pub mod model;
pub mod reader;

pub use cleaner::{collect_images, collect_links};
pub use language::{DetectedLanguage, detect_language};
pub use model::{ExtractError, ExtractedContent, Strategy, normalize_text};

use tracing::debug;
use url::Url;

use crate::fetcher::types::PageResponse;

/// Shortest extraction considered useful.
pub const MIN_CONTENT_CHARS: usize = 50;

pub fn extract(page: &PageResponse) -> Result<ExtractedContent, ExtractError> {
    extract_html(&page.body_utf8, &page.url_final)
}

pub fn extract_html(html: &str, url: &Url) -> Result<ExtractedContent, ExtractError> {
    let primary = reader::formatted_text(html);
    let title = reader::title(html);

    let (text, strategy) = if char_len(primary.trim()) >= MIN_CONTENT_CHARS {
        (primary, Strategy::Primary)
    } else {
        match reader::readability_text(html, url) {
            Some(fallback) if char_len(fallback.trim()) > char_len(primary.trim()) => {
                debug!(url = %url, "Primary extraction too short, using readability");
                (fallback, Strategy::Readability)
            }
            _ => (primary, Strategy::Primary),
        }
    };

    let text = normalize_text(&text);
    let length = char_len(&text);
    if length < MIN_CONTENT_CHARS {
        return Err(ExtractError::TooShort {
            length,
            min: MIN_CONTENT_CHARS,
        });
    }

    Ok(ExtractedContent {
        url: url.clone(),
        title,
        language: detect_language(&text).map(|l| l.code.to_string()),
        text,
        strategy,
    })
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://example.com/article").unwrap()
    }

    #[test]
    fn test_article_blocks_are_kept_and_chrome_dropped() {
        let html = r#"<!DOCTYPE html>
<html><head><title>Sample Article - News Site</title>
<style>body { color: red }</style><script>var tracking = 1;</script></head>
<body>
  <nav><a href="/">Home</a> <a href="/about">About</a></nav>
  <article>
    <h1>Sample Article</h1>
    <p>This is the first paragraph of the article, with a <a href="/related">related link</a>.</p>
    <img src="/images/sample.jpg" alt="sample image">
    <p>This is the second paragraph, which carries on the story.</p>
    <ul><li>First point</li><li>Second point</li></ul>
    <table><tr><th>Year</th><th>Value</th></tr><tr><td>2024</td><td>42</td></tr></table>
  </article>
  <footer>Copyright News Site</footer>
</body></html>"#;

        let content = extract_html(html, &url()).unwrap();

        assert_eq!(content.strategy, Strategy::Primary);
        assert_eq!(content.title.as_deref(), Some("Sample Article - News Site"));
        assert!(content.text.contains("first paragraph"));
        assert!(content.text.contains("related link"));
        assert!(content.text.contains("second paragraph"));
        assert!(content.text.contains("- First point"));
        assert!(content.text.contains("2024 | 42"));
        assert!(!content.text.contains("tracking"));
        assert!(!content.text.contains("color: red"));
        assert!(!content.text.contains("About"));
        assert!(!content.text.contains("Copyright"));
        assert!(!content.text.contains("/related"));
        assert!(!content.text.contains("sample.jpg"));
    }

    #[test]
    fn test_language_is_detected() {
        let html = "<html><body><article>\
            <p>The library opened its new reading room on Monday morning, and the first visitors arrived before the doors were unlocked.</p>\
            <p>Staff members said they expect the quiet space to be popular with students who need somewhere calm to study during the exam season.</p>\
            <p>The project was paid for by a local charity and took almost two years to finish.</p>\
            </article></body></html>";
        let content = extract_html(html, &url()).unwrap();
        assert_eq!(content.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_falls_back_when_primary_is_short() {
        // No block-level elements: the primary walk finds nothing.
        let html = format!(
            "<html><head><title>Loose</title></head><body><div id=\"content\">{}</div></body></html>",
            "Loose text without paragraph markup that still forms readable prose. ".repeat(6)
        );
        let content = extract_html(&html, &url()).unwrap();
        assert_eq!(content.strategy, Strategy::Readability);
        assert!(content.text.contains("Loose text without paragraph markup"));
    }

    #[test]
    fn test_rejects_pages_without_content() {
        let html = "<html><head><title>Empty</title></head><body><nav>Menu</nav><p>Hi</p></body></html>";
        let err = extract_html(html, &url()).unwrap_err();
        assert!(matches!(err, ExtractError::TooShort { min: 50, .. }));
    }

    #[test]
    fn test_malformed_html_is_handled() {
        let html = format!(
            "<html><head><title>Broken</title><body><p>Unclosed tags {}<div>More content",
            "and a sentence that keeps going for a while ".repeat(3)
        );
        let content = extract_html(&html, &url()).unwrap();
        assert!(content.text.contains("Unclosed tags"));
    }

    #[cfg(feature = "fuzz")]
    mod fuzz {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_extract_never_panics(html in ".*", path in "[a-z/]*") {
                let url = Url::parse(&format!("https://example.com/{}", path)).unwrap();
                let _ = extract_html(&html, &url);
            }

            #[test]
            fn test_extracted_text_is_normalised(html in ".*") {
                if let Ok(content) = extract_html(&html, &url()) {
                    prop_assert_eq!(content.text.trim(), content.text.as_str());
                    prop_assert!(!content.text.contains("\n\n\n"));
                    prop_assert!(!content.text.contains("  "));
                }
            }
        }
    }
}
