//! Binary key layouts.
//!
//! User ids have variable length, so every key that embeds one prefixes it
//! with a one-byte length. That keeps prefix scans unambiguous
//! (`"al" ++ ...` can never match a scan for `"alice"`).

use dareduel_types::{BattleId, SubmissionId, Timestamp, UserId};

fn push_user(key: &mut Vec<u8>, user: &UserId) {
    let bytes = user.as_bytes();
    // UserId::parse caps length well below 256.
    key.push(bytes.len() as u8);
    key.extend_from_slice(bytes);
}

/// `len(user) ++ user`
pub fn user_prefix(user: &UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + user.as_bytes().len());
    push_user(&mut key, user);
    key
}

/// `battle ++ len(user) ++ user`: prefix of one player's submissions.
pub fn submission_prefix(battle: &BattleId, user: &UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + 1 + user.as_bytes().len() + 24);
    key.extend_from_slice(battle.as_bytes());
    push_user(&mut key, user);
    key
}

/// `battle ++ len(user) ++ user ++ be(submitted_at) ++ id`
///
/// Big-endian timestamps make LMDB's byte order the chronological order.
pub fn submission_key(
    battle: &BattleId,
    user: &UserId,
    submitted_at: Timestamp,
    id: &SubmissionId,
) -> Vec<u8> {
    let mut key = submission_prefix(battle, user);
    key.extend_from_slice(&submitted_at.as_secs().to_be_bytes());
    key.extend_from_slice(id.as_bytes());
    key
}

/// `len(user) ++ user ++ battle`: player → battle index and pin key.
pub fn player_battle_key(user: &UserId, battle: &BattleId) -> Vec<u8> {
    let mut key = user_prefix(user);
    key.extend_from_slice(battle.as_bytes());
    key
}

/// Extract the trailing battle id from a [`player_battle_key`].
pub fn battle_from_player_key(key: &[u8]) -> Option<BattleId> {
    let start = key.len().checked_sub(16)?;
    let arr: [u8; 16] = key[start..].try_into().ok()?;
    Some(BattleId::new(arr))
}
