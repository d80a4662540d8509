//! Property-based tests for transcript building.
//!
//! Uses proptest to verify:
//! 1. Lines come out ascending by timestamp for arbitrary input orders.
//! 2. Equal timestamps preserve input order (stable sort).
//! 3. Building/extending is idempotent: re-feeding accumulated input
//!    appends nothing, so repeated polling cycles cannot duplicate lines.

use proptest::prelude::*;

use relaychat::transcript::Transcript;
use relaychat_proto::message::{DirectMessage, Timestamp};

/// Messages with unique texts (their index), so each rendered line maps
/// back to exactly one input message.
fn arb_messages() -> impl Strategy<Value = Vec<DirectMessage>> {
    prop::collection::vec(0.0f64..1_000_000.0, 0..32).prop_map(|timestamps| {
        timestamps
            .into_iter()
            .enumerate()
            .map(|(i, ts)| DirectMessage::new(format!("m{i}"), Timestamp::from_secs(ts), "bob", "alice"))
            .collect()
    })
}

/// Recovers the timestamp of the message a line was rendered from.
fn timestamp_of_line(line: &str, messages: &[DirectMessage]) -> f64 {
    messages
        .iter()
        .find(|m| format!("{} : {}", m.from, m.text) == line)
        .map(|m| m.timestamp.as_secs())
        .unwrap()
}

proptest! {
    #[test]
    fn build_orders_lines_ascending_by_timestamp(messages in arb_messages()) {
        let transcript = Transcript::build(&messages);

        prop_assert_eq!(transcript.len(), messages.len());
        let stamps: Vec<f64> = transcript
            .lines()
            .iter()
            .map(|line| timestamp_of_line(line, &messages))
            .collect();
        prop_assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn equal_timestamps_keep_input_order(count in 0usize..16) {
        let messages: Vec<DirectMessage> = (0..count)
            .map(|i| DirectMessage::new(format!("m{i}"), Timestamp::from_secs(42.0), "bob", "alice"))
            .collect();

        let transcript = Transcript::build(&messages);
        let expected: Vec<String> = messages
            .iter()
            .map(|m| format!("{} : {}", m.from, m.text))
            .collect();
        prop_assert_eq!(transcript.lines(), expected.as_slice());
    }

    #[test]
    fn rebuilding_over_accumulated_input_adds_nothing(messages in arb_messages()) {
        let mut transcript = Transcript::build(&messages);
        let len_before = transcript.len();

        // A polling cycle hands the builder everything it already rendered.
        let appended = transcript.extend(&messages);
        prop_assert_eq!(appended, 0);
        prop_assert_eq!(transcript.len(), len_before);
    }

    #[test]
    fn extending_with_a_superset_appends_only_fresh_lines(
        messages in arb_messages(),
        extra_ts in 0.0f64..1_000_000.0,
    ) {
        let mut transcript = Transcript::build(&messages);

        let mut superset = messages.clone();
        superset.push(DirectMessage::new(
            "fresh",
            Timestamp::from_secs(extra_ts),
            "carol",
            "alice",
        ));

        let appended = transcript.extend(&superset);
        prop_assert_eq!(appended, 1);
        prop_assert_eq!(transcript.len(), messages.len() + 1);
    }
}
