//! Internal LIFO bag of registered disposables.

use crate::traits::Dispose;

/// One registration in a [`DisposeBag`].
pub(crate) struct Entry {
    /// Registration index within the owning store, for log context
    pub(crate) index: usize,
    /// Type name of the registered resource
    pub(crate) label: &'static str,
    pub(crate) resource: Box<dyn Dispose>,
}

/// Container for registered disposables with LIFO drain order.
///
/// The same resource may be pushed more than once; every push is a separate
/// entry and is disposed independently.
#[derive(Default)]
pub(crate) struct DisposeBag {
    entries: Vec<Entry>,
    next_index: usize,
}

impl DisposeBag {
    /// Add a disposable, returning its registration index.
    pub(crate) fn push(&mut self, label: &'static str, resource: Box<dyn Dispose>) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        self.entries.push(Entry { index, label, resource });
        index
    }

    /// Remove every entry, last registered first.
    pub(crate) fn drain_reverse(&mut self) -> impl Iterator<Item = Entry> {
        std::mem::take(&mut self.entries).into_iter().rev()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the bag is empty (no disposers registered).
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
