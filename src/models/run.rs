//! Operator-supplied run configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// How identities are derived for each attempt.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityMode {
    /// Random names with a random numeric suffix.
    #[default]
    Random,
    /// Fixed base followed by a persisted, monotonically increasing counter.
    #[serde(alias = "custom")]
    CustomSequential,
}

/// Settings supplied with a `start` command.
///
/// Immutable for the duration of one scheduler run; the scheduler owns it
/// and lends each cycle a shared reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RunConfiguration {
    /// Credential template applied to every generated identity.
    pub credential: String,
    /// Identity-generation mode.
    #[serde(default)]
    pub mode: IdentityMode,
    /// Username base used by [`IdentityMode::CustomSequential`].
    #[serde(default)]
    pub custom_base: Option<String>,
    /// Raw newline-delimited proxy list; may be empty.
    #[serde(default)]
    pub proxies: String,
    /// Free-form behavior flags consulted by `when_flag` step guards.
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
}

impl RunConfiguration {
    /// Validate operator input before a run is accepted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the credential is empty or sequential
    /// mode is selected without a username base.
    pub fn validate(&self) -> Result<()> {
        if self.credential.trim().is_empty() {
            return Err(AppError::Config("credential must not be empty".into()));
        }

        if self.mode == IdentityMode::CustomSequential
            && self
                .custom_base
                .as_deref()
                .map_or(true, |base| base.trim().is_empty())
        {
            return Err(AppError::Config(
                "custom-sequential mode requires a non-empty custom_base".into(),
            ));
        }

        Ok(())
    }

    /// Whether the named behavior flag is set.
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}
