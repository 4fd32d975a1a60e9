//! Application identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Maximum length of an application identifier.
const MAX_APP_ID_LEN: usize = 128;

/// Identifier of an installed widget application (e.g. `org.example.clock`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AppId(String);

impl<'de> Deserialize<'de> for AppId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl AppId {
    /// Create a validated application id.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAppId`] if the id is empty, too long, or
    /// contains characters other than ASCII alphanumerics, `.`, `-` and `_`.
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> CoreResult<()> {
        if id.is_empty() {
            return Err(CoreError::InvalidAppId(
                "application id must not be empty".into(),
            ));
        }
        if id.len() > MAX_APP_ID_LEN {
            return Err(CoreError::InvalidAppId(format!(
                "application id exceeds {MAX_APP_ID_LEN} characters"
            )));
        }
        if id.starts_with('.') || id.contains("..") {
            return Err(CoreError::InvalidAppId(format!(
                "application id must not contain empty segments, got: {id}"
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(CoreError::InvalidAppId(format!(
                "application id must contain only alphanumerics, '.', '-' and '_', got: {id}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AppId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for AppId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
