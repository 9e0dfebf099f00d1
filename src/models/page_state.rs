//! Closed set of page states reported by an automation environment.

use serde::{Deserialize, Serialize};

/// What the environment's current page looks like to the flow.
///
/// Drivers classify the page; steps branch on the variant rather than on
/// raw page text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PageState {
    /// A form is displayed and ready for input.
    Ready,
    /// The current step can be skipped.
    Optional,
    /// The page is asking for data only the operator can supply.
    AwaitingInput,
    /// The target refused the attempt.
    Rejected,
    /// The flow reached its terminal page.
    Completed,
    /// No configured detector matched.
    Unknown,
}
