//! Slab-backed doubly linked recency list with O(1) touch and removal

const NIL: usize = usize::MAX;

#[derive(Debug, Clone)]
struct Node<K> {
    key: Option<K>,
    prev: usize,
    next: usize,
}

/// Recency order of cache keys; the head is the most recently used.
///
/// Slots are handed out as plain indices and recycled through a free list,
/// so no node is ever reallocated while linked.
#[derive(Debug, Clone)]
pub(crate) struct LruList<K> {
    nodes: Vec<Node<K>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    len: usize,
}

impl<K> Default for LruList<K> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }
}

impl<K> LruList<K> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            ..Default::default()
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Insert as most recent and return the slot
    pub fn push_front(&mut self, key: K) -> usize {
        let node = Node {
            key: Some(key),
            prev: NIL,
            next: self.head,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };

        if self.head != NIL {
            self.nodes[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
        self.len += 1;
        slot
    }

    /// Mark `slot` as most recently used
    pub fn touch(&mut self, slot: usize) {
        if slot == self.head || !self.is_linked(slot) {
            return;
        }
        self.unlink(slot);
        self.nodes[slot].prev = NIL;
        self.nodes[slot].next = self.head;
        if self.head != NIL {
            self.nodes[self.head].prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }

    pub fn remove(&mut self, slot: usize) -> Option<K> {
        if !self.is_linked(slot) {
            return None;
        }
        self.unlink(slot);
        self.len -= 1;
        self.free.push(slot);
        self.nodes[slot].key.take()
    }

    /// Remove and return the least recently used key
    pub fn pop_back(&mut self) -> Option<K> {
        if self.tail == NIL {
            return None;
        }
        self.remove(self.tail)
    }

    /// Least recently used key
    #[cfg(test)]
    pub fn back(&self) -> Option<&K> {
        self.nodes.get(self.tail).and_then(|node| node.key.as_ref())
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
        self.len = 0;
    }

    /// Keys from most to least recently used
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &K> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = self.nodes.get(cursor)?;
            cursor = node.next;
            node.key.as_ref()
        })
    }

    fn is_linked(&self, slot: usize) -> bool {
        self.nodes.get(slot).is_some_and(|node| node.key.is_some())
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.nodes[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.nodes[next].prev = prev;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(list: &LruList<&'static str>) -> Vec<&'static str> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_recency_order() {
        let mut list = LruList::with_capacity(4);
        let a = list.push_front("a");
        let _b = list.push_front("b");
        let c = list.push_front("c");
        assert_eq!(order(&list), ["c", "b", "a"]);

        list.touch(a);
        assert_eq!(order(&list), ["a", "c", "b"]);
        assert_eq!(list.back(), Some(&"b"));

        assert_eq!(list.remove(c), Some("c"));
        assert_eq!(list.remove(c), None);
        assert_eq!(order(&list), ["a", "b"]);

        assert_eq!(list.pop_back(), Some("b"));
        assert_eq!(list.pop_back(), Some("a"));
        assert_eq!(list.pop_back(), None);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_slots_are_recycled() {
        let mut list = LruList::default();
        let a = list.push_front(1);
        list.remove(a);
        let b = list.push_front(2);
        assert_eq!(a, b);
        assert_eq!(list.iter().copied().collect::<Vec<_>>(), [2]);
    }
}
