use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

static HORIZONTAL_WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\S\n]+").unwrap());
static SPACE_AROUND_NEWLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" ?\n ?").unwrap());
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Primary,
    Readability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub url: Url,
    pub title: Option<String>,
    pub language: Option<String>,
    pub text: String,
    pub strategy: Strategy,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("extracted content too short or empty ({length} chars, min: {min})")]
    TooShort { length: usize, min: usize },
}

/// Collapses runs of spaces and tabs to one space, trims every line and the
/// whole text, and caps blank-line runs at a single empty line.
pub fn normalize_text(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let spaced = HORIZONTAL_WS.replace_all(&text, " ");
    let tight = SPACE_AROUND_NEWLINE.replace_all(&spaced, "\n");
    EXCESS_NEWLINES
        .replace_all(tight.trim(), "\n\n")
        .into_owned()
}
