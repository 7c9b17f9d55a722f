//! Nullable store: thread-safe in-memory storage for testing.
//!
//! All records live behind one mutex so a commit checks and applies its
//! whole write set while no other commit can interleave, which is the same
//! guarantee the LMDB single-writer transaction gives.

use dareduel_store::{
    AccountStore, Battle, BattleStore, PinStore, ProfilePin, StoreError, Submission,
    SubmissionStore, TransactionalStore, UserAccount, Versioned, WriteOp, WriteSet,
};
use dareduel_types::{BattleId, BattleStatus, SubmissionId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    accounts: HashMap<UserId, Versioned<UserAccount>>,
    battles: HashMap<BattleId, Versioned<Battle>>,
    submissions: Vec<Submission>,
    submission_ids: HashMap<SubmissionId, usize>,
    pins: HashMap<(UserId, BattleId), ProfilePin>,
}

/// An in-memory store for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Default)]
pub struct NullStore {
    inner: Mutex<Inner>,
    injected_conflicts: AtomicU32,
    commits: AtomicU64,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with [`StoreError::Conflict`] before
    /// looking at their contents.
    pub fn inject_conflicts(&self, n: u32) {
        self.injected_conflicts.store(n, Ordering::SeqCst);
    }

    /// Number of successfully applied write sets.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    /// Insert or overwrite an account directly, bypassing version checks.
    pub fn seed_account(&self, account: UserAccount) {
        let mut inner = self.inner.lock().unwrap();
        let version = inner
            .accounts
            .get(&account.user_id)
            .map(|v| v.version + 1)
            .unwrap_or(1);
        inner
            .accounts
            .insert(account.user_id.clone(), Versioned::new(version, account));
    }

    /// Insert or overwrite a battle directly, bypassing version checks.
    pub fn seed_battle(&self, battle: Battle) {
        let mut inner = self.inner.lock().unwrap();
        let version = inner
            .battles
            .get(&battle.id)
            .map(|v| v.version + 1)
            .unwrap_or(1);
        inner.battles.insert(battle.id, Versioned::new(version, battle));
    }

    /// Append a submission directly.
    pub fn seed_submission(&self, submission: Submission) {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.submissions.len();
        inner.submission_ids.insert(submission.id, idx);
        inner.submissions.push(submission);
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn check_version(found: Option<u64>, expected: Option<u64>, what: String) -> Result<(), StoreError> {
    if found == expected {
        Ok(())
    } else {
        Err(StoreError::Conflict(what))
    }
}

impl AccountStore for NullStore {
    fn get_account(&self, user: &UserId) -> Result<Versioned<UserAccount>, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .get(user)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("account {user}")))
    }

    fn account_exists(&self, user: &UserId) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().accounts.contains_key(user))
    }

    fn account_count(&self) -> Result<u64, StoreError> {
        Ok(self.inner.lock().unwrap().accounts.len() as u64)
    }
}

impl BattleStore for NullStore {
    fn get_battle(&self, id: &BattleId) -> Result<Versioned<Battle>, StoreError> {
        self.inner
            .lock()
            .unwrap()
            .battles
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("battle {id}")))
    }

    fn battle_exists(&self, id: &BattleId) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().battles.contains_key(id))
    }

    fn battles_with_status(&self, status: BattleStatus) -> Result<Vec<Battle>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Battle> = inner
            .battles
            .values()
            .filter(|b| b.value.status == status)
            .map(|b| b.value.clone())
            .collect();
        out.sort_by_key(|b| (b.created_at, b.id));
        Ok(out)
    }

    fn battles_for_player(&self, user: &UserId) -> Result<Vec<Battle>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Battle> = inner
            .battles
            .values()
            .filter(|b| b.value.is_participant(user))
            .map(|b| b.value.clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }
}

impl SubmissionStore for NullStore {
    fn submissions_for(
        &self,
        battle: &BattleId,
        user: &UserId,
    ) -> Result<Vec<Submission>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<Submission> = inner
            .submissions
            .iter()
            .filter(|s| &s.battle_id == battle && &s.user_id == user)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps; reverse it
        // so the latest append wins ties.
        out.reverse();
        out.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(out)
    }
}

impl PinStore for NullStore {
    fn pins_for(&self, user: &UserId) -> Result<Vec<ProfilePin>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut out: Vec<ProfilePin> = inner
            .pins
            .iter()
            .filter(|((owner, _), _)| owner == user)
            .map(|(_, pin)| pin.clone())
            .collect();
        out.sort_by(|a, b| b.pinned_at.cmp(&a.pinned_at));
        Ok(out)
    }
}

impl TransactionalStore for NullStore {
    fn commit(&self, writes: WriteSet) -> Result<(), StoreError> {
        if self.take_injected_conflict() {
            return Err(StoreError::Conflict("injected".into()));
        }

        let mut inner = self.inner.lock().unwrap();

        // Validate everything before touching anything.
        for op in writes.ops() {
            match op {
                WriteOp::PutAccount {
                    expected_version,
                    account,
                } => {
                    let found = inner.accounts.get(&account.user_id).map(|v| v.version);
                    check_version(found, *expected_version, op.describe())?;
                }
                WriteOp::PutBattle {
                    expected_version,
                    battle,
                } => {
                    let found = inner.battles.get(&battle.id).map(|v| v.version);
                    check_version(found, *expected_version, op.describe())?;
                }
                WriteOp::AppendSubmission(s) => {
                    if inner.submission_ids.contains_key(&s.id) {
                        return Err(StoreError::Conflict(op.describe()));
                    }
                }
                WriteOp::PutPin(_) | WriteOp::DeletePin { .. } => {}
            }
        }

        for op in writes.into_ops() {
            match op {
                WriteOp::PutAccount {
                    expected_version,
                    account,
                } => {
                    let version = expected_version.map_or(1, |v| v + 1);
                    inner
                        .accounts
                        .insert(account.user_id.clone(), Versioned::new(version, account));
                }
                WriteOp::PutBattle {
                    expected_version,
                    battle,
                } => {
                    let version = expected_version.map_or(1, |v| v + 1);
                    inner.battles.insert(battle.id, Versioned::new(version, battle));
                }
                WriteOp::AppendSubmission(s) => {
                    let idx = inner.submissions.len();
                    inner.submission_ids.insert(s.id, idx);
                    inner.submissions.push(s);
                }
                WriteOp::PutPin(pin) => {
                    inner
                        .pins
                        .insert((pin.user_id.clone(), pin.battle_id), pin);
                }
                WriteOp::DeletePin { user_id, battle_id } => {
                    inner.pins.remove(&(user_id, battle_id));
                }
            }
        }

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
