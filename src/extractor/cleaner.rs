use ammonia::Builder;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").unwrap());

static IMAGE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").unwrap());

/// Strips scripts, styles, event handlers and anything else unsafe.
pub fn sanitize_html(html: &str) -> String {
    Builder::default().clean(html).to_string()
}

/// Absolute http(s) targets of every `<a href>`, in document order, deduplicated.
pub fn collect_links(html: &str, base_url: &Url) -> Vec<String> {
    collect_attr(html, base_url, &ANCHOR_SELECTOR, "href")
}

/// Absolute http(s) sources of every `<img src>`, in document order, deduplicated.
pub fn collect_images(html: &str, base_url: &Url) -> Vec<String> {
    collect_attr(html, base_url, &IMAGE_SELECTOR, "src")
}

fn collect_attr(html: &str, base_url: &Url, selector: &Selector, attr: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();

    document
        .select(selector)
        .filter_map(|element| element.value().attr(attr))
        .filter_map(|raw| base_url.join(raw.trim()).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(String::from)
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
