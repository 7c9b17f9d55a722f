//! LMDB implementation of SubmissionStore.

use dareduel_store::{StoreError, Submission, SubmissionStore};
use dareduel_types::{BattleId, UserId};

use crate::environment::decode;
use crate::keys::submission_prefix;
use crate::{LmdbError, LmdbStore};

impl SubmissionStore for LmdbStore {
    fn submissions_for(
        &self,
        battle: &BattleId,
        user: &UserId,
    ) -> Result<Vec<Submission>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let prefix = submission_prefix(battle, user);
        let iter = self
            .submissions_db
            .prefix_iter(&rtxn, &prefix)
            .map_err(LmdbError::from)?;
        let mut out = Vec::new();
        for entry in iter {
            let (_key, raw) = entry.map_err(LmdbError::from)?;
            out.push(decode::<Submission>(raw)?);
        }
        // Keys are chronological; callers want most recent first.
        out.reverse();
        Ok(out)
    }

    fn latest_submission(
        &self,
        battle: &BattleId,
        user: &UserId,
    ) -> Result<Option<Submission>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let prefix = submission_prefix(battle, user);
        let mut iter = self
            .submissions_db
            .rev_prefix_iter(&rtxn, &prefix)
            .map_err(LmdbError::from)?;
        match iter.next() {
            Some(entry) => {
                let (_key, raw) = entry.map_err(LmdbError::from)?;
                Ok(Some(decode(raw)?))
            }
            None => Ok(None),
        }
    }
}
