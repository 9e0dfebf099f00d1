//! Generated identity and viewport profile for a single attempt.

use serde::{Deserialize, Serialize};

/// Screen geometry applied to an environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ViewportProfile {
    /// Display name used in logs.
    pub name: String,
    /// CSS pixel width.
    pub width: u32,
    /// CSS pixel height.
    pub height: u32,
    /// Device scale factor.
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for ViewportProfile {
    fn default() -> Self {
        Self {
            name: "desktop".into(),
            width: 1280,
            height: 800,
            scale: 1.0,
        }
    }
}

/// Identity fields a flow step may reference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    /// Generated given name.
    GivenName,
    /// Generated family name.
    FamilyName,
    /// Generated username.
    Username,
    /// Credential copied from the run configuration.
    Credential,
}

/// The name/credential/profile bundle used for one attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    /// Given name.
    pub given_name: String,
    /// Family name.
    pub family_name: String,
    /// Username submitted to the form.
    pub username: String,
    /// Credential submitted to the form.
    pub credential: String,
    /// Viewport the environment is created with.
    pub viewport: ViewportProfile,
}

impl Identity {
    /// Resolve a field reference to its value.
    #[must_use]
    pub fn field(&self, field: IdentityField) -> &str {
        match field {
            IdentityField::GivenName => &self.given_name,
            IdentityField::FamilyName => &self.family_name,
            IdentityField::Username => &self.username,
            IdentityField::Credential => &self.credential,
        }
    }
}
