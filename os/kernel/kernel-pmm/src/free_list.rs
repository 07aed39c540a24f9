//! # High-Memory Free List
//!
//! Free page frames above the DMA boundary form a singly linked LIFO stack.
//! The link lives inside the free page itself:
//!
//! ```text
//! head ──► ┌──────────────────────┬──────────────────────┐
//!          │ FreePageNode { next }│  rest of the page    │
//!          └──────────┬───────────┴──────────────────────┘
//!                     ▼
//!          ┌──────────────────────┬──────────────────────┐
//!          │ FreePageNode { next }│  ...                 │──► None
//!          └──────────────────────┴──────────────────────┘
//! ```
//!
//! Nodes are only ever touched through the [`PhysMapper`] while the owning
//! allocator is exclusively borrowed, and a page stops being a node the
//! moment it is popped.

use crate::addresses::PageFrame;
use crate::phys_mapper::PhysMapper;
use core::ptr;

/// Header stored at the beginning of every **free** high-memory page.
#[repr(C)]
struct FreePageNode {
    /// The next free page, or `None` at the tail.
    next: Option<PageFrame>,
}

/// LIFO list of free single pages.
///
/// # Invariants
/// - Every listed frame is a page the allocator owns and nobody else uses.
/// - No frame appears twice; the chain is acyclic and `len` nodes long.
#[derive(Debug, Default)]
pub struct FreeList {
    head: Option<PageFrame>,
    len: usize,
}

impl FreeList {
    #[must_use]
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// The frame the next [`pop`](Self::pop) returns.
    #[inline]
    #[must_use]
    pub const fn head(&self) -> Option<PageFrame> {
        self.head
    }

    /// Push `frame` onto the list.
    ///
    /// # Safety
    /// - `frame` must be reachable and writable through `mapper`.
    /// - `frame` must be unused and not already on the list.
    pub unsafe fn push<M: PhysMapper>(&mut self, mapper: &M, frame: PageFrame) {
        let node = mapper.phys_to_virt(frame.base()).as_mut_ptr::<FreePageNode>();
        // SAFETY: the caller hands us exclusive ownership of the page.
        unsafe {
            ptr::write(node, FreePageNode { next: self.head });
        }
        self.head = Some(frame);
        self.len += 1;
    }

    /// Pop the most recently pushed frame.
    ///
    /// # Safety
    /// `mapper` must be the mapper the frames were pushed with.
    pub unsafe fn pop<M: PhysMapper>(&mut self, mapper: &M) -> Option<PageFrame> {
        let frame = self.head?;
        // SAFETY: `frame` is on the list, so its first bytes hold a node.
        let next = unsafe { Self::next_of(mapper, frame) };
        self.head = next;
        self.len -= 1;
        Some(frame)
    }

    /// Walk the list from head to tail without modifying it.
    ///
    /// # Safety
    /// `mapper` must be the mapper the frames were pushed with, and the list
    /// must not change while the iterator is alive (guaranteed by the borrow).
    pub unsafe fn iter<'l, M: PhysMapper>(&'l self, mapper: &'l M) -> FreeListIter<'l, M> {
        FreeListIter {
            mapper,
            current: self.head,
            remaining: self.len,
            _list: self,
        }
    }

    /// # Safety
    /// `frame` must currently be a node of a list pushed through `mapper`.
    unsafe fn next_of<M: PhysMapper>(mapper: &M, frame: PageFrame) -> Option<PageFrame> {
        let node = mapper.phys_to_virt(frame.base()).as_mut_ptr::<FreePageNode>();
        // SAFETY: guaranteed by the caller.
        unsafe { ptr::read(node).next }
    }
}

/// Iterator returned by [`FreeList::iter`].
pub struct FreeListIter<'l, M: PhysMapper> {
    mapper: &'l M,
    current: Option<PageFrame>,
    remaining: usize,
    _list: &'l FreeList,
}

impl<M: PhysMapper> Iterator for FreeListIter<'_, M> {
    type Item = PageFrame;

    fn next(&mut self) -> Option<Self::Item> {
        // The length bound stops the walk even on a corrupted (cyclic) chain.
        if self.remaining == 0 {
            return None;
        }
        let frame = self.current?;
        // SAFETY: upheld by the contract of `FreeList::iter`.
        self.current = unsafe { FreeList::next_of(self.mapper, frame) };
        self.remaining -= 1;
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_ram::TestRam;

    #[test]
    fn lifo_order() {
        let ram = TestRam::with_frames(8);
        let mapper = ram.mapper();
        let mut list = FreeList::new();

        unsafe {
            list.push(&mapper, PageFrame::from_index(3));
            list.push(&mapper, PageFrame::from_index(5));
            list.push(&mapper, PageFrame::from_index(4));
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.head(), Some(PageFrame::from_index(4)));

        let walked: Vec<_> = unsafe { list.iter(&mapper) }.map(PageFrame::index).collect();
        assert_eq!(walked, [4, 5, 3]);

        unsafe {
            assert_eq!(list.pop(&mapper), Some(PageFrame::from_index(4)));
            assert_eq!(list.pop(&mapper), Some(PageFrame::from_index(5)));
            assert_eq!(list.pop(&mapper), Some(PageFrame::from_index(3)));
            assert_eq!(list.pop(&mapper), None);
        }
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn node_lives_in_the_page() {
        let ram = TestRam::with_frames(4);
        let mapper = ram.mapper();
        let mut list = FreeList::new();

        unsafe {
            list.push(&mapper, PageFrame::from_index(1));
            list.push(&mapper, PageFrame::from_index(2));
        }

        // Page 2's node links to page 1.
        let next = unsafe { FreeList::next_of(&mapper, PageFrame::from_index(2)) };
        assert_eq!(next, Some(PageFrame::from_index(1)));
        let tail = unsafe { FreeList::next_of(&mapper, PageFrame::from_index(1)) };
        assert_eq!(tail, None);
    }
}
