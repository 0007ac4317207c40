//! Internal implementation details.

pub(crate) mod dispose_bag;
pub(crate) mod panic_guard;

pub(crate) use dispose_bag::DisposeBag;
pub(crate) use panic_guard::catch_teardown;
