use std::num::NonZeroUsize;

/// An ordered group of items loaded as one unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch<T> {
    /// 1-based, continuous across pages of one run.
    pub index: usize,
    pub items: Vec<T>,
}

impl<T> Batch<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Lazily splits an iterator into batches of at most `size` items,
/// preserving order.
pub struct Batches<I> {
    iter: I,
    size: NonZeroUsize,
    next_index: usize,
}

impl<I: Iterator> Batches<I> {
    pub fn new(iter: impl IntoIterator<IntoIter = I>, size: NonZeroUsize) -> Self {
        Self {
            iter: iter.into_iter(),
            size,
            next_index: 1,
        }
    }

    /// Number the first batch `index` instead of 1.
    pub fn starting_at(mut self, index: usize) -> Self {
        self.next_index = index;
        self
    }
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Batch<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let items: Vec<_> = self.iter.by_ref().take(self.size.get()).collect();
        if items.is_empty() {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;
        Some(Batch { index, items })
    }
}
