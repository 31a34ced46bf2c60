use readability::extractor;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

use crate::extractor::cleaner::sanitize_html;

/// Subtrees that never contribute text.
const SKIPPED: &[&str] = &[
    "script", "style", "noscript", "template", "nav", "header", "footer", "aside", "form",
    "button", "select", "svg", "canvas", "iframe", "object", "img", "picture", "video", "audio",
    "figure",
];

/// Elements emitted as one block each.
const BLOCKS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "tr", "blockquote", "pre", "dt", "dd",
];

static BLOCK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(&BLOCKS.join(", ")).unwrap());

static ROOT_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["article", "main", "[role='main']", "body"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

static CELL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td, th").unwrap());

static TITLE_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["meta[property='og:title']", "title", "h1"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

/// Block-by-block text of the main content root. Links contribute their text
/// only; images, navigation and page chrome are dropped.
pub fn formatted_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let Some(root) = content_root(&document) else {
        return String::new();
    };
    blocks_text(root)
}

/// Title from `og:title`, `<title>` or the first `<h1>`.
pub fn title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    for selector in TITLE_SELECTORS.iter() {
        for element in document.select(selector) {
            let title = match element.value().attr("content") {
                Some(content) => content.trim().to_string(),
                None => element.text().collect::<String>().trim().to_string(),
            };
            if !title.is_empty() {
                return Some(title);
            }
        }
    }
    None
}

/// Readability's main-content guess, sanitised and flattened to text.
pub fn readability_text(html: &str, url: &Url) -> Option<String> {
    let product = extractor::extract(&mut html.as_bytes(), url).ok()?;
    let clean = sanitize_html(&product.content);
    let fragment = Html::parse_fragment(&clean);

    let text = blocks_text(fragment.root_element());
    if !text.trim().is_empty() {
        return Some(text);
    }
    // Readability sometimes returns bare text nodes with no block markup.
    let mut flat = String::new();
    inline_text(fragment.root_element(), &mut flat);
    Some(flat).filter(|t| !t.trim().is_empty())
}

/// The first of article / main / body holding any block content.
fn content_root(document: &Html) -> Option<ElementRef<'_>> {
    for selector in ROOT_SELECTORS.iter() {
        for candidate in document.select(selector) {
            if candidate.select(&BLOCK_SELECTOR).next().is_some() {
                return Some(candidate);
            }
        }
    }
    None
}

fn blocks_text(root: ElementRef<'_>) -> String {
    let mut blocks: Vec<String> = Vec::new();

    for block in root.select(&BLOCK_SELECTOR) {
        if within(block, root, |name| SKIPPED.contains(&name) || BLOCKS.contains(&name)) {
            continue;
        }

        let text = match block.value().name() {
            "tr" => block
                .select(&CELL_SELECTOR)
                .map(|cell| {
                    let mut buf = String::new();
                    inline_text(cell, &mut buf);
                    squash(&buf)
                })
                .filter(|cell| !cell.is_empty())
                .collect::<Vec<_>>()
                .join(" | "),
            name => {
                let mut buf = String::new();
                inline_text(block, &mut buf);
                let text = squash(&buf);
                if name == "li" && !text.is_empty() {
                    format!("- {}", text)
                } else {
                    text
                }
            }
        };

        if !text.is_empty() {
            blocks.push(text);
        }
    }

    blocks.join("\n\n")
}

/// Whether any ancestor of `el` strictly below `root` matches `pred`.
fn within(el: ElementRef<'_>, root: ElementRef<'_>, pred: impl Fn(&str) -> bool) -> bool {
    for ancestor in el.ancestors() {
        if ancestor.id() == root.id() {
            return false;
        }
        if let Some(element) = ancestor.value().as_element()
            && pred(element.name())
        {
            return true;
        }
    }
    false
}

fn inline_text(el: ElementRef<'_>, buf: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            buf.push_str(text);
            continue;
        }
        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child_el.value().name();
        if SKIPPED.contains(&name) {
            continue;
        }
        if name == "br" {
            buf.push(' ');
            continue;
        }
        inline_text(child_el, buf);
        if matches!(name, "div" | "td" | "th" | "li" | "p") {
            buf.push(' ');
        }
    }
}

fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
