//! Property tests for the reservation bookkeeping: reserving and releasing
//! never drifts the pool-wide counter, and a sequence of reserve/unreserve
//! calls never leaves bytes stranded.

use gbd_accountant::Accountant;
use proptest::prelude::*;

proptest! {
    #[test]
    fn reserve_then_unreserve_returns_to_baseline(sizes in prop::collection::vec(1usize..1000, 1..50)) {
        let acc = Accountant::new(1_000_000);
        let mut reserved = Vec::new();
        for size in &sizes {
            if acc.try_reserve(*size) {
                reserved.push(*size);
            }
        }
        let total_reserved: usize = reserved.iter().sum();
        prop_assert_eq!(acc.reserved(), total_reserved);

        for size in reserved {
            acc.unreserve(size);
        }
        prop_assert_eq!(acc.reserved(), 0);
    }

    #[test]
    fn reserved_never_exceeds_cap(sizes in prop::collection::vec(1usize..2000, 1..100), cap in 100usize..5000) {
        let acc = Accountant::new(cap);
        for size in sizes {
            let _ = acc.try_reserve(size);
            prop_assert!(acc.reserved() <= cap);
        }
    }
}
