//! Intrusive FIFO queue: the link lives inside the payload, so push/pop
//! never allocate.

use core::cell::Cell;
use core::ptr::NonNull;

use crate::sync::IntSpinLock;

/// Implemented by any type that wants to be linked into an [`IntQueue`].
///
/// `link()` must return a reference to storage embedded in `self` — each
/// value can be a member of at most one `IntQueue` at a time.
pub trait Linked {
    fn link(&self) -> &Cell<Option<NonNull<Self>>>
    where
        Self: Sized;
}

struct Inner<T: Linked> {
    first_next: Option<NonNull<T>>,
    last: Option<NonNull<T>>,
}

unsafe impl<T: Linked> Send for Inner<T> {}

/// A non-allocating FIFO queue over intrusively-linked payloads.
pub struct IntQueue<T: Linked> {
    inner: IntSpinLock<Inner<T>>,
}

unsafe impl<T: Linked> Sync for IntQueue<T> {}

impl<T: Linked> IntQueue<T> {
    pub const fn new() -> Self {
        Self {
            inner: IntSpinLock::new(Inner {
                first_next: None,
                last: None,
            }),
        }
    }

    /// Pushes `node` onto the back of the queue.
    ///
    /// # Safety
    /// `node` must point to a live value that stays valid and is not
    /// mutated or freed by anyone else until it is popped back out.
    pub unsafe fn push(&self, node: NonNull<T>, owner: i64) {
        unsafe {
            node.as_ref().link().set(None);
        }
        let mut inner = self.inner.lock(owner);
        match inner.last {
            None => {
                inner.first_next = Some(node);
                inner.last = Some(node);
            }
            Some(last) => {
                unsafe {
                    assert!(
                        last.as_ref().link().get().is_none(),
                        "IntQueue: corrupt tail node"
                    );
                    last.as_ref().link().set(Some(node));
                }
                inner.last = Some(node);
            }
        }
    }

    /// Pops the front of the queue, or `None` if it is empty.
    pub fn pop(&self, owner: i64) -> Option<NonNull<T>> {
        let mut inner = self.inner.lock(owner);
        let first = inner.first_next?;
        let next = unsafe { first.as_ref().link().get() };
        inner.first_next = next;
        if inner.last == Some(first) {
            inner.last = None;
        }
        Some(first)
    }

    pub fn is_empty(&self, owner: i64) -> bool {
        self.inner.lock(owner).last.is_none()
    }
}

impl<T: Linked> Default for IntQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node {
        id: u32,
        link: Cell<Option<NonNull<Node>>>,
    }

    impl Linked for Node {
        fn link(&self) -> &Cell<Option<NonNull<Node>>> {
            &self.link
        }
    }

    #[test]
    fn fifo_order_no_allocation() {
        let mut a = Node { id: 1, link: Cell::new(None) };
        let mut b = Node { id: 2, link: Cell::new(None) };
        let q: IntQueue<Node> = IntQueue::new();
        assert!(q.is_empty(0));
        unsafe {
            q.push(NonNull::from(&mut a), 0);
            q.push(NonNull::from(&mut b), 0);
        }
        assert!(!q.is_empty(0));
        let popped = q.pop(0).unwrap();
        assert_eq!(unsafe { popped.as_ref().id }, 1);
        let popped = q.pop(0).unwrap();
        assert_eq!(unsafe { popped.as_ref().id }, 2);
        assert!(q.pop(0).is_none());
    }

    #[quickcheck_macros::quickcheck]
    fn pops_come_back_in_push_order(ids: Vec<u32>) -> bool {
        let nodes: Vec<Box<Node>> = ids
            .iter()
            .map(|&id| Box::new(Node { id, link: Cell::new(None) }))
            .collect();
        let q: IntQueue<Node> = IntQueue::new();
        for node in &nodes {
            unsafe {
                q.push(NonNull::from(node.as_ref()), 0);
            }
        }
        let mut popped = Vec::with_capacity(ids.len());
        while let Some(node) = q.pop(0) {
            popped.push(unsafe { node.as_ref().id });
        }
        popped == ids
    }
}
