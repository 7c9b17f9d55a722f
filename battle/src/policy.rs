use serde::{Deserialize, Serialize};

/// What the sweep does with an active battle when neither player submitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BothMissedPolicy {
    /// Complete the battle as a draw and return each stake to its payer.
    #[default]
    Refund,
    /// Leave the battle active; the next one-sided miss decides it.
    KeepActive,
}
