//! Locator candidates: one strategy for finding a logical element.
//!
//! Journey files write locators as plain strings in the selector dialect
//! test authors already know:
//!
//! | written as                     | strategy                         |
//! |--------------------------------|----------------------------------|
//! | `xpath=...`, `//...`, `(//...` | XPath                            |
//! | `text=Add to Cart`             | case-insensitive substring text  |
//! | `text="Add to Cart"`           | exact text (whitespace-folded)   |
//! | `text=/SKU/i`                  | regular-expression text          |
//! | `button:has-text('Brand')`     | CSS filtered by contained text   |
//! | `css=...` or anything else     | CSS                              |

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const HAS_TEXT: &str = ":has-text(";
const REGEX_FLAGS: &str = "imsu";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Css(String),
    XPath(String),
    Text { text: String, exact: bool },
    TextPattern { pattern: String, flags: String },
    HasText { css: String, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorParseError {
    #[error("Locator cannot be empty")]
    Empty,
    #[error("Locator '{0}' has an empty {1} expression")]
    EmptyExpression(String, &'static str),
    #[error("Unsupported regex flag '{flag}' in '{locator}'")]
    InvalidFlag { locator: String, flag: char },
    #[error("Malformed :has-text() in '{0}'")]
    MalformedHasText(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text {
            text: text.into(),
            exact: false,
        }
    }

    pub fn has_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Locator::HasText {
            css: css.into(),
            text: text.into(),
        }
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    /// Short strategy name, as used by the query script and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Locator::Css(_) => "css",
            Locator::XPath(_) => "xpath",
            Locator::Text { .. } => "text",
            Locator::TextPattern { .. } => "text_regex",
            Locator::HasText { .. } => "has_text",
        }
    }
}

impl FromStr for Locator {
    type Err = LocatorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(LocatorParseError::Empty);
        }

        if let Some(expr) = s.strip_prefix("xpath=") {
            let expr = expr.trim();
            if expr.is_empty() {
                return Err(LocatorParseError::EmptyExpression(s.into(), "xpath"));
            }
            return Ok(Locator::XPath(expr.to_string()));
        }
        if s.starts_with("//") || s.starts_with("(//") {
            return Ok(Locator::XPath(s.to_string()));
        }
        if let Some(rest) = s.strip_prefix("text=") {
            return parse_text(s, rest.trim());
        }
        if let Some(css) = s.strip_prefix("css=") {
            let css = css.trim();
            if css.is_empty() {
                return Err(LocatorParseError::EmptyExpression(s.into(), "css"));
            }
            return Ok(Locator::Css(css.to_string()));
        }
        if let Some(idx) = s.find(HAS_TEXT) {
            return parse_has_text(s, &s[..idx], &s[idx + HAS_TEXT.len()..]);
        }

        Ok(Locator::Css(s.to_string()))
    }
}

fn parse_text(source: &str, rest: &str) -> Result<Locator, LocatorParseError> {
    if rest.is_empty() {
        return Err(LocatorParseError::EmptyExpression(source.into(), "text"));
    }

    if let Some(inner) = unquote(rest) {
        return Ok(Locator::Text {
            text: inner.to_string(),
            exact: true,
        });
    }

    if let Some(body) = rest.strip_prefix('/')
        && let Some(end) = body.rfind('/')
    {
        let pattern = &body[..end];
        let flags = &body[end + 1..];
        if pattern.is_empty() {
            return Err(LocatorParseError::EmptyExpression(source.into(), "regex"));
        }
        if let Some(flag) = flags.chars().find(|c| !REGEX_FLAGS.contains(*c)) {
            return Err(LocatorParseError::InvalidFlag {
                locator: source.into(),
                flag,
            });
        }
        return Ok(Locator::TextPattern {
            pattern: pattern.to_string(),
            flags: flags.to_string(),
        });
    }

    Ok(Locator::Text {
        text: rest.to_string(),
        exact: false,
    })
}

fn parse_has_text(source: &str, css: &str, args: &str) -> Result<Locator, LocatorParseError> {
    let inner = args
        .trim_end()
        .strip_suffix(')')
        .ok_or_else(|| LocatorParseError::MalformedHasText(source.into()))?;
    let text = unquote(inner.trim())
        .ok_or_else(|| LocatorParseError::MalformedHasText(source.into()))?;
    if text.is_empty() {
        return Err(LocatorParseError::EmptyExpression(source.into(), "has-text"));
    }

    let css = css.trim();
    Ok(Locator::HasText {
        css: if css.is_empty() { "*".into() } else { css.into() },
        text: text.to_string(),
    })
}

fn unquote(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return Some(&s[1..s.len() - 1]);
        }
    }
    None
}

fn quote(s: &str) -> String {
    if s.contains('\'') {
        format!("\"{}\"", s)
    } else {
        format!("'{}'", s)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(css) => {
                let ambiguous = css.starts_with("text=")
                    || css.starts_with("xpath=")
                    || css.starts_with("//")
                    || css.starts_with("(//")
                    || css.contains(HAS_TEXT);
                if ambiguous {
                    write!(f, "css={}", css)
                } else {
                    write!(f, "{}", css)
                }
            }
            Locator::XPath(expr) if expr.starts_with("//") || expr.starts_with("(//") => {
                write!(f, "{}", expr)
            }
            Locator::XPath(expr) => write!(f, "xpath={}", expr),
            Locator::Text { text, exact: false } => write!(f, "text={}", text),
            Locator::Text { text, exact: true } => {
                if text.contains('"') {
                    write!(f, "text='{}'", text)
                } else {
                    write!(f, "text=\"{}\"", text)
                }
            }
            Locator::TextPattern { pattern, flags } => write!(f, "text=/{}/{}", pattern, flags),
            Locator::HasText { css, text } => write!(f, "{}:has-text({})", css, quote(text)),
        }
    }
}

impl Serialize for Locator {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Locator {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
