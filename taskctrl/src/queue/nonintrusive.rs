//! Non-intrusive FIFO queue: allocates a node on push, frees it on pop.

use alloc::boxed::Box;
use core::ptr;

use crate::sync::SpinLock;

struct Container<T> {
    data: T,
    next: *mut Container<T>,
}

struct Inner<T> {
    /// Sentinel's `next`: the first real node, or null if the queue is empty.
    first_next: *mut Container<T>,
    /// The last node, or null when the queue is empty (mirrors `_last == &_first`).
    last: *mut Container<T>,
}

/// A heap-allocating FIFO queue, safe to use from any non-interrupt context.
pub struct Queue<T> {
    inner: SpinLock<Inner<T>>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    pub const fn new() -> Self {
        Self {
            inner: SpinLock::new(Inner {
                first_next: ptr::null_mut(),
                last: ptr::null_mut(),
            }),
        }
    }

    /// Pushes `data` onto the back of the queue.
    pub fn push(&self, data: T) {
        let node = Box::into_raw(Box::new(Container {
            data,
            next: ptr::null_mut(),
        }));

        let mut inner = self.inner.lock();
        if inner.last.is_null() {
            inner.first_next = node;
            inner.last = node;
        } else {
            unsafe {
                assert!((*inner.last).next.is_null(), "Queue: corrupt tail node");
                (*inner.last).next = node;
            }
            inner.last = node;
        }
    }

    /// Pops the front of the queue, or `None` if it is empty.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.first_next.is_null() {
            return None;
        }
        let node = inner.first_next;
        inner.first_next = unsafe { (*node).next };
        if inner.last == node {
            inner.last = ptr::null_mut();
        }
        drop(inner);

        let boxed = unsafe { Box::from_raw(node) };
        Some(boxed.data)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().last.is_null()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let q: Queue<u32> = Queue::new();
        assert!(q.is_empty());
        q.push(1);
        q.push(2);
        q.push(3);
        assert!(!q.is_empty());
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert_eq!(q.pop(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn interleaved_push_pop_keeps_tail_consistent() {
        let q: Queue<u32> = Queue::new();
        q.push(1);
        assert_eq!(q.pop(), Some(1));
        q.push(2);
        q.push(3);
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), Some(3));
        assert!(q.is_empty());
    }

    #[test]
    fn drop_frees_remaining_nodes() {
        let q: Queue<alloc::string::String> = Queue::new();
        q.push("a".into());
        q.push("b".into());
        drop(q);
    }

    #[quickcheck_macros::quickcheck]
    fn pops_come_back_in_push_order(items: Vec<i32>) -> bool {
        let q: Queue<i32> = Queue::new();
        for &item in &items {
            q.push(item);
        }
        let mut popped = Vec::with_capacity(items.len());
        while let Some(item) = q.pop() {
            popped.push(item);
        }
        popped == items && q.is_empty()
    }
}
