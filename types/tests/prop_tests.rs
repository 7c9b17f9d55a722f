use proptest::prelude::*;

use dareduel_types::time::utc_offset;
use dareduel_types::{BattleId, Coins, Dare, Timestamp};

proptest! {
    /// checked_apply either yields the exact arithmetic result or refuses.
    #[test]
    fn coins_checked_apply_is_exact(start in 0u64..1_000_000, delta in -2_000_000i64..2_000_000) {
        let expected = start as i128 + delta as i128;
        match Coins::new(start).checked_apply(delta) {
            Some(c) => prop_assert_eq!(c.raw() as i128, expected),
            None => prop_assert!(expected < 0),
        }
    }

    /// A BattleId printed as hex parses back to itself.
    #[test]
    fn battle_id_display_parses(bytes in prop::array::uniform16(0u8..)) {
        let id = BattleId::new(bytes);
        let parsed: BattleId = id.to_string().parse().unwrap();
        prop_assert_eq!(parsed, id);
    }

    /// Calendar days never go backwards as time moves forward.
    #[test]
    fn calendar_day_is_monotone(a in 0u64..4_000_000_000, b in 0u64..4_000_000_000, minutes in -720i32..=720) {
        let offset = utc_offset(minutes).unwrap();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(Timestamp::new(lo).calendar_day(offset) <= Timestamp::new(hi).calendar_day(offset));
    }

    /// Advancing a backlog with a replacement keeps its length.
    #[test]
    fn backlog_advance_keeps_length(items in prop::collection::vec("[a-z]{1,12}", 1..8), next in "[a-z]{1,12}") {
        let len = items.len();
        let mut dare = Dare::backlog(items.clone()).unwrap();
        let consumed = dare.advance(Some(next.clone())).unwrap();
        prop_assert_eq!(consumed.as_deref(), Some(items[0].as_str()));
        match dare {
            Dare::Backlog(q) => {
                prop_assert_eq!(q.len(), len);
                prop_assert_eq!(q.back().map(String::as_str), Some(next.as_str()));
            }
            Dare::Single(_) => prop_assert!(false, "mode changed"),
        }
    }

    /// Dares survive bincode encoding, which is how battles are persisted.
    #[test]
    fn dare_bincode_roundtrip(items in prop::collection::vec("[a-z ]{1,20}[a-z]", 1..5)) {
        let dare = Dare::backlog(items).unwrap();
        let encoded = bincode::serialize(&dare).unwrap();
        let decoded: Dare = bincode::deserialize(&encoded).unwrap();
        prop_assert_eq!(decoded, dare);
    }
}
