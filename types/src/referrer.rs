use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque attribution string reported by the install-tracking service.
///
/// Guaranteed non-empty. Treated as immutable once received; relay never
/// persists the value itself — it exists only in memory for the duration
/// of delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Referrer(String);

/// Rejection of an empty referrer string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("referrer string is empty")]
pub struct EmptyReferrer;

impl Referrer {
    pub fn new(raw: impl Into<String>) -> Result<Self, EmptyReferrer> {
        let raw = raw.into();
        if raw.is_empty() {
            Err(EmptyReferrer)
        } else {
            Ok(Self(raw))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for Referrer {
    type Error = EmptyReferrer;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl fmt::Display for Referrer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
