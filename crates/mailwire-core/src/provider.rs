//! Mail provider identification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider name does not match any supported mail provider.
#[derive(Debug, Error)]
#[error("unknown mail provider: {0}")]
pub struct UnknownProvider(pub String);

/// Supported mail providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MailProvider {
    #[serde(rename = "GOOGLE")]
    Google,
    #[serde(rename = "MICROSOFT")]
    Microsoft,
}

impl MailProvider {
    /// Canonical upper-case name, as stored and as carried on the bus.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "GOOGLE",
            Self::Microsoft => "MICROSOFT",
        }
    }

    /// Lower-case account slug used in identity-service paths.
    #[must_use]
    pub fn account_slug(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
        }
    }

    /// Default inbox identifier for syncs that do not name one.
    #[must_use]
    pub fn default_inbox(&self) -> &'static str {
        match self {
            Self::Google => "primary",
            Self::Microsoft => "inbox",
        }
    }
}

impl fmt::Display for MailProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MailProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GOOGLE" => Ok(Self::Google),
            "MICROSOFT" => Ok(Self::Microsoft),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}
