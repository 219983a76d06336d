//! Sequenced priority queue.

/// A binary min-heap that tags each inserted value with a unique,
/// monotonically increasing sequence number.
///
/// The sequence number is the last sorting criterion, so entries with equal
/// keys are pulled in insertion order. Callers can also keep it as a weak
/// identity of an entry: an entry whose sequence number no longer matches the
/// caller's bookkeeping is stale and can be dropped when it surfaces.
///
/// Entries cannot be removed from the middle of the heap. Insertion and
/// pulling are *O*(log(*N*)) and peeking is *O*(1).
pub(crate) struct PriorityQueue<K, V>
where
    K: Copy + Ord,
    V: Copy,
{
    heap: Vec<Entry<K, V>>,
    next_seq: u64,
}

impl<K: Copy + Ord, V: Copy> PriorityQueue<K, V> {
    /// Creates an empty queue.
    pub(crate) fn new() -> Self {
        Self {
            heap: Vec::new(),
            next_seq: 0,
        }
    }

    /// Number of entries, stale ones included.
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Inserts a value and returns its sequence number.
    pub(crate) fn insert(&mut self, key: K, value: V) -> u64 {
        let seq = self.next_seq;
        assert_ne!(seq, u64::MAX);
        self.next_seq += 1;

        self.heap.push(Entry {
            order: (key, seq),
            value,
        });
        self.bubble_up(self.heap.len() - 1);

        seq
    }

    /// Removes the entry with the lowest key and sequence number and returns
    /// its key, sequence number and value.
    pub(crate) fn pull(&mut self) -> Option<(K, u64, V)> {
        if self.heap.is_empty() {
            return None;
        }
        let top = self.heap.swap_remove(0);
        if !self.heap.is_empty() {
            self.sink(0);
        }

        Some(top.unpack())
    }

    /// Returns the entry that [`pull()`](Self::pull) would remove.
    pub(crate) fn peek(&self) -> Option<(K, u64, V)> {
        self.heap.first().map(Entry::unpack)
    }

    /// Returns the lowest key.
    pub(crate) fn peek_key(&self) -> Option<&K> {
        self.heap.first().map(|entry| &entry.order.0)
    }

    fn bubble_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[parent].order <= self.heap[pos].order {
                break;
            }
            self.heap.swap(parent, pos);
            pos = parent;
        }
    }

    fn sink(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let smallest = if right < len && self.heap[right].order < self.heap[left].order {
                right
            } else {
                left
            };
            if self.heap[pos].order <= self.heap[smallest].order {
                break;
            }
            self.heap.swap(pos, smallest);
            pos = smallest;
        }
    }
}

#[derive(Copy, Clone)]
struct Entry<K: Copy, V: Copy> {
    // Tuples compare lexicographically: the key first, then the sequence.
    order: (K, u64),
    value: V,
}

impl<K: Copy, V: Copy> Entry<K, V> {
    fn unpack(&self) -> (K, u64, V) {
        (self.order.0, self.order.1, self.value)
    }
}
