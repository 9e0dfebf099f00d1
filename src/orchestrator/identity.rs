//! Identity generation for attempts.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::identity::{Identity, ViewportProfile};
use crate::models::run::{IdentityMode, RunConfiguration};
use crate::persistence::counter_repo::IdentityCounterRepo;
use crate::{AppError, Result};

/// Counter record backing `custom-sequential` usernames.
pub const SEQUENCE_COUNTER: &str = "identity_sequence";

const GIVEN_NAMES: [&str; 12] = [
    "Alex", "Jordan", "Taylor", "Morgan", "Casey", "Riley", "Jamie", "Avery", "Quinn", "Rowan",
    "Harper", "Skyler",
];

const FAMILY_NAMES: [&str; 12] = [
    "Reed", "Hayes", "Brooks", "Parker", "Ellis", "Foster", "Grant", "Lane", "Morgan", "Shaw",
    "Wells", "Young",
];

/// Produces one [`Identity`] per attempt.
#[derive(Clone)]
pub struct IdentityGenerator {
    counter: IdentityCounterRepo,
    sequence_start: i64,
    viewports: Vec<ViewportProfile>,
}

impl IdentityGenerator {
    /// Create a generator backed by the persisted sequence counter.
    #[must_use]
    pub fn new(
        counter: IdentityCounterRepo,
        sequence_start: i64,
        viewports: Vec<ViewportProfile>,
    ) -> Self {
        Self {
            counter,
            sequence_start,
            viewports,
        }
    }

    /// Generate the identity for the next attempt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if sequential mode has no base, or
    /// `AppError::Db` if the sequence counter cannot be advanced.
    pub async fn generate(&self, config: &RunConfiguration) -> Result<Identity> {
        let draft = self.draft();

        let username = match config.mode {
            IdentityMode::Random => draft.random_username,
            IdentityMode::CustomSequential => {
                let base = config
                    .custom_base
                    .as_deref()
                    .map(str::trim)
                    .filter(|base| !base.is_empty())
                    .ok_or_else(|| AppError::Config("custom_base is required".into()))?;
                let sequence = self
                    .counter
                    .next(SEQUENCE_COUNTER, self.sequence_start)
                    .await?;
                sequential_username(base, sequence)
            }
        };

        Ok(Identity {
            given_name: draft.given_name,
            family_name: draft.family_name,
            username,
            credential: config.credential.clone(),
            viewport: draft.viewport,
        })
    }

    // Thread-local RNG is not `Send`; keep every random draw in one sync call.
    fn draft(&self) -> Draft {
        let mut rng = rand::thread_rng();
        let given_name = GIVEN_NAMES.choose(&mut rng).copied().unwrap_or("Alex");
        let family_name = FAMILY_NAMES.choose(&mut rng).copied().unwrap_or("Reed");
        let suffix: u32 = rng.gen_range(0..10_000);
        let viewport = self
            .viewports
            .choose(&mut rng)
            .cloned()
            .unwrap_or_default();

        let stem: String = format!("{given_name}{family_name}")
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_ascii_lowercase();

        Draft {
            given_name: given_name.to_owned(),
            family_name: family_name.to_owned(),
            random_username: format!("{stem}{suffix}"),
            viewport,
        }
    }
}

struct Draft {
    given_name: String,
    family_name: String,
    random_username: String,
    viewport: ViewportProfile,
}

/// Username for a sequence value: the base followed by a zero-padded counter.
#[must_use]
pub fn sequential_username(base: &str, sequence: i64) -> String {
    format!("{base}{sequence:02}")
}
