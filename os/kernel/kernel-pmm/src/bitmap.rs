//! # Low-Memory Page Bitmap
//!
//! One bit per page frame below the DMA boundary, packed into 64-bit words.
//!
//! ```text
//! word 0                       word 1
//! ┌───────────────────────────┐┌───────────────────────────┐
//! │ bit 63 ........... bit 0  ││ bit 127 ......... bit 64  │   1 = free
//! └───────────────────────────┘└───────────────────────────┘   0 = used
//! ```
//!
//! All range operations take an **inclusive** page-index range `[first, last]`.
//! Words that the range only partially covers are updated through a mask;
//! words it covers completely are overwritten in one store.

use kernel_info::memory::PAGES_PER_BITMAP_WORD;

/// Mask with bits `lo..=hi` set (`lo <= hi < 64`).
#[inline]
const fn bit_range_mask(lo: usize, hi: usize) -> u64 {
    (u64::MAX >> (PAGES_PER_BITMAP_WORD - 1 - hi)) & (u64::MAX << lo)
}

/// Free/used bitmap over `words.len() * 64` page frames.
///
/// The bitmap borrows its words; in the kernel they live in physical pages
/// reached through the direct map.
pub struct DmaBitmap<'a> {
    words: &'a mut [u64],
}

impl<'a> DmaBitmap<'a> {
    /// Wrap `words` without touching their contents.
    #[must_use]
    pub const fn new(words: &'a mut [u64]) -> Self {
        Self { words }
    }

    /// Number of page frames covered, always a multiple of 64.
    #[inline]
    #[must_use]
    pub const fn page_count(&self) -> usize {
        self.words.len() * PAGES_PER_BITMAP_WORD
    }

    #[inline]
    #[must_use]
    pub fn words(&self) -> &[u64] {
        &*self.words
    }

    /// Whether `page` is free. Pages outside the bitmap are never free.
    #[inline]
    #[must_use]
    pub fn is_free(&self, page: usize) -> bool {
        self.words
            .get(page / PAGES_PER_BITMAP_WORD)
            .is_some_and(|&w| w & (1u64 << (page % PAGES_PER_BITMAP_WORD)) != 0)
    }

    /// Number of free pages.
    #[must_use]
    pub fn count_free(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set every bit in `[first, last]` (mark free).
    pub fn mark_free(&mut self, first: usize, last: usize) {
        self.fill(first, last, true);
    }

    /// Clear every bit in `[first, last]` (mark used).
    pub fn mark_used(&mut self, first: usize, last: usize) {
        self.fill(first, last, false);
    }

    /// Claim `[first, last]` as used, all or nothing.
    ///
    /// Bits are claimed one at a time from `first`. On meeting a used bit the
    /// already-claimed prefix is released again and `false` is returned, so a
    /// failed attempt leaves the bitmap exactly as it was.
    pub fn try_mark_used(&mut self, first: usize, last: usize) -> bool {
        if first > last || last >= self.page_count() {
            return false;
        }

        for page in first..=last {
            let word = &mut self.words[page / PAGES_PER_BITMAP_WORD];
            let mask = 1u64 << (page % PAGES_PER_BITMAP_WORD);

            if *word & mask != 0 {
                *word &= !mask;
                continue;
            }

            if page > first {
                self.mark_free(first, page - 1);
            }
            return false;
        }

        true
    }

    fn fill(&mut self, first: usize, last: usize, free: bool) {
        debug_assert!(first <= last, "inverted bitmap range {first}..={last}");
        debug_assert!(
            last < self.page_count(),
            "bitmap range {first}..={last} exceeds {} pages",
            self.page_count()
        );
        if first > last || first >= self.page_count() {
            return;
        }
        let last = last.min(self.page_count() - 1);

        let first_word = first / PAGES_PER_BITMAP_WORD;
        let last_word = last / PAGES_PER_BITMAP_WORD;
        let first_bit = first % PAGES_PER_BITMAP_WORD;
        let last_bit = last % PAGES_PER_BITMAP_WORD;

        if first_word == last_word {
            self.apply(first_word, bit_range_mask(first_bit, last_bit), free);
            return;
        }

        self.apply(
            first_word,
            bit_range_mask(first_bit, PAGES_PER_BITMAP_WORD - 1),
            free,
        );
        let bulk = if free { u64::MAX } else { 0 };
        self.words[first_word + 1..last_word].fill(bulk);
        self.apply(last_word, bit_range_mask(0, last_bit), free);
    }

    #[inline]
    fn apply(&mut self, word: usize, mask: u64, free: bool) {
        if free {
            self.words[word] |= mask;
        } else {
            self.words[word] &= !mask;
        }
    }
}
