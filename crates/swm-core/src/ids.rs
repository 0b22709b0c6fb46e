use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Steam ids are decimal; anything longer than this is certainly a typo.
const MAX_APP_ID_LEN: usize = 12;

/// A validated Steam app id.
///
/// Steam app ids are plain decimal numbers, but they are stored and sent to
/// the `CheapShark` API as text, so the canonical form is kept as a `String`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);

impl AppId {
    /// Validates and wraps a raw app id. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAppId`] if the value is empty, too long, or
    /// contains anything other than ASCII digits.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > MAX_APP_ID_LEN
            || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(CoreError::InvalidAppId(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Parses a list of raw ids, failing on the first malformed one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAppId`] for the first invalid entry.
    pub fn parse_all<I, S>(raw: I) -> Result<Vec<Self>, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter().map(|s| Self::parse(s.as_ref())).collect()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AppId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AppId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AppId> for String {
    fn from(value: AppId) -> Self {
        value.0
    }
}

impl AsRef<str> for AppId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
