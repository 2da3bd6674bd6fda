use crate::comparator::{Comparator, NaturalOrder};

/// Array-backed binary min-heap.
///
/// The element for which the comparator reports the highest priority sits at
/// the root. Storage is 0-indexed, so the parent of `i` is `(i - 1) / 2` and
/// its children are `2i + 1` and `2i + 2`.
///
/// Elements of equal priority keep no particular relative order. Callers that
/// need a deterministic tie-break must fold it into the comparator.
#[derive(Debug, Clone)]
pub struct MinHeap<T, C = NaturalOrder> {
    items: Vec<T>,
    comparator: C,
}

impl<T: PartialOrd> MinHeap<T> {
    /// An empty heap ordered by `<`, smallest first.
    pub fn new() -> Self {
        Self::with_comparator(NaturalOrder)
    }
}

impl<T: PartialOrd> Default for MinHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn parent(index: usize) -> usize {
    (index - 1) / 2
}

#[inline]
fn left_child(index: usize) -> usize {
    2 * index + 1
}

impl<T, C: Comparator<T>> MinHeap<T, C> {
    /// An empty heap ordered by `comparator`: `compare(a, b)` is true when
    /// `a` must come out before `b`.
    pub fn with_comparator(comparator: C) -> Self {
        Self {
            items: Vec::new(),
            comparator,
        }
    }

    /// Like [`with_comparator`](Self::with_comparator), with room for
    /// `capacity` elements before reallocating.
    pub fn with_capacity_and_comparator(capacity: usize, comparator: C) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            comparator,
        }
    }

    /// The ordering this heap was built with.
    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Adds an element and sifts it up until its parent no longer has
    /// strictly lower priority. O(log n).
    pub fn insert(&mut self, item: T) {
        self.items.push(item);
        self.sift_up(self.items.len() - 1);
    }

    /// The highest-priority element, without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Removes and returns the highest-priority element. O(log n).
    ///
    /// The last element takes the root's place and is sifted down, always
    /// swapping with the higher-priority of its two children.
    pub fn extract_min(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        // swap_remove moves the last element into slot 0.
        let root = self.items.swap_remove(0);
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some(root)
    }

    /// Bulk-loads `items` on top of the current contents and restores the
    /// heap property bottom-up, from the last parent to the root.
    ///
    /// This is the linear-time heapify: each parent is sifted down once, so the
    /// total work is O(n) rather than the O(n log n) of repeated inserts.
    pub fn build<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.items.extend(items);
        // Leaves (the upper half) already satisfy the property.
        for index in (0..self.items.len() / 2).rev() {
            self.sift_down(index);
        }
    }

    /// Number of stored elements. O(1).
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always equal to `len() == 0`.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Storage order, root first.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Iterates in storage order, not priority order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Consumes the heap, returning its storage unchanged.
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    /// Consumes the heap, returning its elements in extraction order.
    pub fn into_sorted_vec(mut self) -> Vec<T> {
        let mut sorted = Vec::with_capacity(self.items.len());
        while let Some(item) = self.extract_min() {
            sorted.push(item);
        }
        sorted
    }

    /// Checks that no child has strictly higher priority than its parent.
    pub fn is_heap(&self) -> bool {
        (1..self.items.len()).all(|index| !self.precedes(index, parent(index)))
    }

    #[inline]
    fn precedes(&self, a: usize, b: usize) -> bool {
        self.comparator.compare(&self.items[a], &self.items[b])
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let up = parent(index);
            if !self.precedes(index, up) {
                break;
            }
            self.items.swap(index, up);
            index = up;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.items.len();
        loop {
            let left = left_child(index);
            if left >= len {
                break;
            }
            let right = left + 1;
            // Ties go to the left child.
            let child = if right < len && self.precedes(right, left) {
                right
            } else {
                left
            };
            if !self.precedes(child, index) {
                break;
            }
            self.items.swap(index, child);
            index = child;
        }
    }
}

impl<T: PartialOrd> FromIterator<T> for MinHeap<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut heap = Self::new();
        heap.build(iter);
        heap
    }
}

/// Inserts one element at a time. Use [`MinHeap::build`] for a linear bulk load.
impl<T, C: Comparator<T>> Extend<T> for MinHeap<T, C> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}
