use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use waypoint_common::locator::{Locator, LocatorParseError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixtureError {
    #[error("Unknown fixture '{0}'")]
    Unknown(String),
    #[error("Unterminated placeholder in '{0}'")]
    Unterminated(String),
    #[error("Rendered locator is invalid: {0}")]
    Locator(#[from] LocatorParseError),
}

/// Named values substituted into step strings written as `{{name}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fixtures(BTreeMap<String, String>);

impl Fixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `self` overlaid with `other`; entries of `other` win.
    pub fn merged(&self, other: &Fixtures) -> Fixtures {
        let mut out = self.clone();
        for (k, v) in &other.0 {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }

    pub fn render(&self, input: &str) -> Result<String, FixtureError> {
        self.render_with(input, str::to_string)
    }

    /// Render a regular expression; substituted values match literally.
    pub fn render_pattern(&self, pattern: &str) -> Result<String, FixtureError> {
        self.render_with(pattern, regex::escape)
    }

    fn render_with(
        &self,
        input: &str,
        encode: impl Fn(&str) -> String,
    ) -> Result<String, FixtureError> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| FixtureError::Unterminated(input.to_string()))?;
            let name = after[..end].trim();
            let value = self
                .get(name)
                .ok_or_else(|| FixtureError::Unknown(name.to_string()))?;
            out.push_str(&encode(value));
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }

    pub fn render_locator(&self, locator: &Locator) -> Result<Locator, FixtureError> {
        let source = locator.to_string();
        if !source.contains("{{") {
            return Ok(locator.clone());
        }
        Ok(self.render(&source)?.parse()?)
    }

    /// Placeholder names referenced by `input`, in order of appearance.
    pub fn references(input: &str) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = input;
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                break;
            };
            names.push(after[..end].trim());
            rest = &after[end + 2..];
        }
        names
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Fixtures {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Fixtures(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
