//! Property tests for ledger append-only semantics and range ordering.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use trc_core::{LedgerEvent, LedgerEventType};
use trc_store::{Store, StoreError};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Appending the same event id twice always fails the second write, and
    /// range listings are always sorted by non-decreasing timestamp.
    #[test]
    fn append_only_and_sorted(offsets in proptest::collection::vec(0i64..600, 1..20)) {
        runtime().block_on(async move {
            let store = Store::open_in_memory().await.unwrap();
            let base = Utc::now();

            for (i, offset) in offsets.iter().enumerate() {
                let mut event =
                    LedgerEvent::new(LedgerEventType::LlmCallFinished, "org", "user");
                event.event_id = format!("evt-{i}");
                event.ts = base + Duration::seconds(*offset);
                store.append(&event).await.unwrap();

                let dup = store.append(&event).await;
                assert!(matches!(dup, Err(StoreError::DuplicateEvent(_))));
            }

            let listed = store
                .list_in_range(base - Duration::seconds(1), base + Duration::seconds(601))
                .await
                .unwrap();
            assert_eq!(listed.len(), offsets.len());
            for pair in listed.windows(2) {
                assert!(pair[0].ts <= pair[1].ts, "range scan out of order");
            }
        });
    }
}
