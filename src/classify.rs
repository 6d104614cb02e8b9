use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Below this many trimmed characters there is not enough signal to guess.
pub const MIN_CLASSIFY_CHARS: usize = 10;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum LanguageTag {
    #[strum(to_string = "json")]
    Json,
    #[strum(to_string = "javascript", serialize = "js")]
    Javascript,
    #[strum(to_string = "typescript", serialize = "ts")]
    Typescript,
    #[strum(to_string = "html")]
    Html,
    #[strum(to_string = "css")]
    Css,
    #[strum(to_string = "python", serialize = "py")]
    Python,
    #[strum(to_string = "markdown", serialize = "md")]
    Markdown,
    /// Looks like code but matched none of the specific checks.
    #[strum(to_string = "code")]
    Code,
}

impl LanguageTag {
    pub fn label(self) -> &'static str {
        match self {
            LanguageTag::Json => "JSON",
            LanguageTag::Javascript => "JavaScript",
            LanguageTag::Typescript => "TypeScript",
            LanguageTag::Html => "HTML",
            LanguageTag::Css => "CSS",
            LanguageTag::Python => "Python",
            LanguageTag::Markdown => "Markdown",
            LanguageTag::Code => "Code",
        }
    }

    pub fn is_generic(self) -> bool {
        self == LanguageTag::Code
    }
}

static JS_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:function|const|let|var|return|if|else)\b|\bconsole\.log\b")
        .expect("valid javascript keyword pattern")
});

static LEADING_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*<").expect("valid leading tag pattern"));

static TS_MARKERS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r":\s*[A-Za-z]+(?:\[\])?(?:\s*\|[\s\w\[\]]+)*\s*[=;),.{<]")
            .expect("valid type annotation pattern"),
        Regex::new(r"interface\s+\w+\s*\{").expect("valid interface pattern"),
        Regex::new(r"<[A-Za-z]+(?:\[\])?(?:\s*\|[\s\w\[\]]+)*>").expect("valid generic pattern"),
    ]
});

static HTML_OPENING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:<!DOCTYPE\s+html>|<html>|<head>|<body>|<div>|<span>|<a\s|<img\s)")
        .expect("valid html pattern")
});

static CSS_DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)[\w-]+\s*:\s*[\w-]+.*;").expect("valid css declaration pattern"));

static CSS_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid css block pattern"));

static PYTHON_MARKERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bdef\s+\w+\s*\(|import\s+[\w\s,]+\b|\bclass\s+\w+\s*(?:\([\w\s,]+\))?:")
        .expect("valid python pattern")
});

static MARKDOWN_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:#\s+|\*\s+|-\s+|\d+\.\s+|>\s+)").expect("valid markdown prefix pattern")
});

static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[.+\]\(.+\)").expect("valid markdown link pattern"));

/// Best guess at the language of `text`.
///
/// Checks run in a fixed order and the first hit wins: JSON, then
/// JavaScript (escalated to TypeScript when type syntax is present), HTML,
/// CSS, Python, Markdown. Anything long enough that matches none of them is
/// reported as [`LanguageTag::Code`].
pub fn classify(text: &str) -> Option<LanguageTag> {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_CLASSIFY_CHARS {
        return None;
    }

    if looks_like_json(trimmed) {
        return Some(LanguageTag::Json);
    }

    if JS_KEYWORDS.is_match(trimmed)
        && !LEADING_TAG.is_match(trimmed)
        && (trimmed.contains(';') || trimmed.contains('{'))
    {
        if TS_MARKERS.iter().any(|marker| marker.is_match(trimmed)) {
            return Some(LanguageTag::Typescript);
        }
        return Some(LanguageTag::Javascript);
    }

    if HTML_OPENING.is_match(trimmed) {
        return Some(LanguageTag::Html);
    }

    if CSS_DECLARATION.is_match(trimmed) && CSS_BLOCK.is_match(trimmed) {
        return Some(LanguageTag::Css);
    }

    if PYTHON_MARKERS.is_match(trimmed) {
        return Some(LanguageTag::Python);
    }

    if MARKDOWN_PREFIX.is_match(trimmed) || MARKDOWN_LINK.is_match(trimmed) {
        return Some(LanguageTag::Markdown);
    }

    Some(LanguageTag::Code)
}

fn looks_like_json(trimmed: &str) -> bool {
    let wrapped = (trimmed.starts_with('{') || trimmed.starts_with('['))
        && (trimmed.ends_with('}') || trimmed.ends_with(']'));
    if !wrapped || !(trimmed.contains('"') || trimmed.contains(':')) {
        return false;
    }
    serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
}
