//! Proof-of-compliance submissions (append-only).

use crate::StoreError;
use dareduel_types::{BattleId, SubmissionId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub battle_id: BattleId,
    pub user_id: UserId,
    /// Blob-store reference; resolved to a URL only at the edge.
    pub media_ref: String,
    pub caption: String,
    /// The dare this submission answered, if the battle had one at the time.
    pub dare: Option<String>,
    pub submitted_at: Timestamp,
}

/// Trait for submission reads. Appends go through the write set.
pub trait SubmissionStore {
    /// All of `user`'s submissions in `battle`, most recent first.
    fn submissions_for(
        &self,
        battle: &BattleId,
        user: &UserId,
    ) -> Result<Vec<Submission>, StoreError>;

    /// The most recent submission, if any.
    fn latest_submission(
        &self,
        battle: &BattleId,
        user: &UserId,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(self.submissions_for(battle, user)?.into_iter().next())
    }
}
