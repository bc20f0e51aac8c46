//! Property-based tests for the cache engine and the parser.
//!
//! The engine is checked against a plain `HashMap` reference model, the
//! arithmetic ops against a clamped fold, and the payload framing against
//! arbitrary split points inside the data.

use proptest::prelude::*;
use std::collections::HashMap;

use bytes::Bytes;

use crate::cache::{Cache, CacheConfig};
use crate::commands::CommandHandler;
use crate::connection::handler::feed_segment;
use crate::protocol::parser::{LineParser, Step};

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,8}"
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{1,32}"
}

#[derive(Debug, Clone)]
enum Op {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| Op::Set { key, value }),
        key_strategy().prop_map(|key| Op::Get { key }),
        key_strategy().prop_map(|key| Op::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Any interleaving of set/get/delete over a small key domain agrees
    // with a plain map.
    #[test]
    fn engine_matches_reference_map(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let cache = Cache::new(CacheConfig::Unbounded);
        let mut model: HashMap<String, String> = HashMap::new();

        for op in ops {
            match op {
                Op::Set { key, value } => {
                    prop_assert!(cache.set(&key, Bytes::from(value.clone()), 0, 0));
                    model.insert(key, value);
                }
                Op::Get { key } => {
                    let expected = model.get(&key).map(|v| Bytes::from(v.clone()));
                    prop_assert_eq!(cache.get(&key), expected);
                }
                Op::Delete { key } => {
                    prop_assert_eq!(cache.delete(&key), model.remove(&key).is_some());
                }
            }
        }

        prop_assert_eq!(cache.current_items(), model.len());
    }

    // A trace of incr/decr deltas lands on the per-step clamped fold.
    #[test]
    fn arithmetic_trace_matches_clamped_fold(
        start in 0u32..1000,
        deltas in prop::collection::vec(-50i64..50, 1..40)
    ) {
        let cache = Cache::new(CacheConfig::Unbounded);
        cache.set("n", Bytes::from(start.to_string()), 0, 0);

        let mut expected = start as i64;
        for delta in deltas {
            expected = (expected + delta).max(0);
            let result = cache.incr("n", delta).unwrap().unwrap();
            prop_assert_eq!(result, expected as u64);
        }

        prop_assert_eq!(cache.get("n"), Some(Bytes::from(expected.to_string())));
    }

    // With a record bound in place, a purge always settles at or below it.
    #[test]
    fn purge_settles_under_the_record_bound(
        max in 1usize..20,
        keys in prop::collection::vec(key_strategy(), 1..60)
    ) {
        let cache = Cache::new(CacheConfig::ByMaxRecords(max));
        for key in keys {
            cache.set(&key, Bytes::from("v"), 0, 0);
        }
        cache.purge();
        prop_assert!(cache.current_items() <= max);
    }

    // Splitting a storage command anywhere inside its payload (including
    // right before the CRLF, so the terminator straddles segments) yields
    // the same responses as an unsplit stream.
    #[test]
    fn payload_segmentation_is_invisible(
        key in key_strategy(),
        value in value_strategy(),
        split in 0usize..40,
    ) {
        let cache = Cache::new(CacheConfig::Unbounded);
        let mut parser = LineParser::new(CommandHandler::new(cache.clone()));

        // A point strictly inside the data; the remainder (with the CRLF)
        // arrives as the next segment.
        let split = split % value.len();
        let header = format!("set {} 0 0 {}\r\n", key, value.len());
        let first = [header.as_bytes(), &value.as_bytes()[..split]].concat();
        let second = format!("{}\r\n", &value[split..]);

        let mut replies = Vec::new();
        for step in feed_segment(&mut parser, &first) {
            if let Step::Reply(r) = step {
                replies.push(r);
            }
        }
        for step in feed_segment(&mut parser, second.as_bytes()) {
            if let Step::Reply(r) = step {
                replies.push(r);
            }
        }

        prop_assert_eq!(replies, vec!["STORED".to_string()]);
        prop_assert_eq!(cache.get(&key), Some(Bytes::from(value)));
    }
}
