/// Property-based tests for disposal ordering
///
/// For any sequence of registrations, with or without panicking teardowns
/// and repeated dispose calls, every resource is torn down exactly once and
/// in reverse registration order.

use demo_lifecycle::DisposableStore;
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

proptest! {
    #[test]
    fn disposal_is_lifo_and_exactly_once(
        panics in prop::collection::vec(any::<bool>(), 0..40),
        extra_disposes in 0usize..4,
    ) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let store = DisposableStore::new();

        for (i, &should_panic) in panics.iter().enumerate() {
            let log = log.clone();
            store.add_fn(move || {
                log.lock().unwrap().push(i);
                if should_panic {
                    panic!("teardown {i} failed");
                }
            });
        }

        let report = store.dispose_with_report();
        for _ in 0..extra_disposes {
            store.dispose();
        }

        let expected: Vec<usize> = (0..panics.len()).rev().collect();
        prop_assert_eq!(&*log.lock().unwrap(), &expected);

        let failed = panics.iter().filter(|&&p| p).count();
        prop_assert_eq!(report.failures.len(), failed);
        prop_assert_eq!(report.disposed, panics.len() - failed);
        prop_assert_eq!(store.count(), 0);
    }

    #[test]
    fn late_registrations_never_accumulate(late in 0usize..20) {
        let store = DisposableStore::new();
        store.dispose();

        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..late {
            let log = log.clone();
            store.add_fn(move || log.lock().unwrap().push(i));
            prop_assert_eq!(store.count(), 0);
        }
        prop_assert_eq!(&*log.lock().unwrap(), &(0..late).collect::<Vec<_>>());
    }
}
