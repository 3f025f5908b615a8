//! Doubly linked lists threaded through slab entries by key.
//!
//! A node can sit in several lists at once (one [`Link`] per list) and be unlinked from any of them
//! in O(1), which is what keeps socket destruction safe while another list is being walked.

use slab::Slab;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Link {
    prev: Option<usize>,
    next: Option<usize>,
    linked: bool,
}

/// Access to the link a node uses for one particular list.
pub(crate) trait Linked {
    fn link(&self, list: ListKind) -> &Link;
    fn link_mut(&mut self, list: ListKind) -> &mut Link;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListKind {
    /// Sockets whose subscribed and pending masks overlap.
    Callback = 0,
    /// Sockets with egress frames queued.
    Dirty = 1,
}

#[derive(Debug)]
pub(crate) struct IndexList {
    kind: ListKind,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl IndexList {
    pub(crate) fn new(kind: ListKind) -> Self {
        Self {
            kind,
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn front(&self) -> Option<usize> {
        self.head
    }

    pub(crate) fn contains<T: Linked>(&self, nodes: &Slab<T>, index: usize) -> bool {
        nodes.get(index).is_some_and(|n| n.link(self.kind).linked)
    }

    /// Append `index`. Nodes already in the list stay where they are.
    pub(crate) fn push_back<T: Linked>(&mut self, nodes: &mut Slab<T>, index: usize) {
        if self.contains(nodes, index) {
            return;
        }
        let kind = self.kind;
        *nodes[index].link_mut(kind) = Link {
            prev: self.tail,
            next: None,
            linked: true,
        };
        match self.tail {
            Some(tail) => nodes[tail].link_mut(kind).next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
    }

    /// Remove `index` if it is linked; a no-op otherwise.
    pub(crate) fn unlink<T: Linked>(&mut self, nodes: &mut Slab<T>, index: usize) {
        if !self.contains(nodes, index) {
            return;
        }
        let kind = self.kind;
        let Link { prev, next, .. } = std::mem::take(nodes[index].link_mut(kind));
        match prev {
            Some(prev) => nodes[prev].link_mut(kind).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => nodes[next].link_mut(kind).prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    /// Indices from front to back.
    pub(crate) fn iter<'a, T: Linked>(
        &self,
        nodes: &'a Slab<T>,
    ) -> impl Iterator<Item = usize> + 'a {
        let kind = self.kind;
        std::iter::successors(self.head, move |&index| nodes[index].link(kind).next)
    }
}
