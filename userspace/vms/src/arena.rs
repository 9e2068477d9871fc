// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Simulated physical memory: a bump allocator over fixed-size frames.
//!
//! Frames are handed out in increasing PPN order and are never returned.
//! A [`PagePtr`] is the simulated physical address of a frame, a [`Ppn`] is
//! its page number; the two convert into each other without consulting the
//! arena.

use core::fmt;

use log::{debug, error};
use static_assertions::const_assert_eq;

use crate::error::{Error, Result};
use crate::pte::Pte;

/// Size of a page in bytes.
pub const PAGE_SIZE: usize = 4096;
/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 12;
/// Number of PTE slots in a page-table page.
pub const PTES_PER_PAGE: usize = PAGE_SIZE / core::mem::size_of::<Pte>();

const_assert_eq!(1usize << PAGE_SHIFT, PAGE_SIZE);
const_assert_eq!(PTES_PER_PAGE, 512);

/// Physical page number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ppn(u64);

impl Ppn {
    /// Wraps a raw page number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw page number.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ppn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Handle to an allocated page: its simulated physical base address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PagePtr(u64);

impl PagePtr {
    /// Returns the simulated physical base address of the page.
    pub const fn addr(self) -> u64 {
        self.0
    }

    fn slot(self) -> usize {
        (self.0 >> PAGE_SHIFT) as usize
    }
}

impl fmt::Display for PagePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Returns the page number of `page`.
pub const fn page_to_ppn(page: PagePtr) -> Ppn {
    Ppn(page.0 >> PAGE_SHIFT)
}

/// Returns the page whose number is `ppn`.
pub const fn ppn_to_page(ppn: Ppn) -> PagePtr {
    PagePtr(ppn.0 << PAGE_SHIFT)
}

impl From<PagePtr> for Ppn {
    fn from(value: PagePtr) -> Self {
        page_to_ppn(value)
    }
}

impl From<Ppn> for PagePtr {
    fn from(value: Ppn) -> Self {
        ppn_to_page(value)
    }
}

/// One physical frame, viewed either as PTE slots or as little-endian bytes.
#[repr(align(4096))]
#[derive(Clone)]
pub struct Frame {
    entries: [Pte; PTES_PER_PAGE],
}

const_assert_eq!(core::mem::size_of::<Frame>(), PAGE_SIZE);

impl Frame {
    const fn zeroed() -> Self {
        Self { entries: [Pte::ZERO; PTES_PER_PAGE] }
    }

    /// Returns a copy of slot `index`.
    pub fn entry(&self, index: usize) -> Result<Pte> {
        self.entries.get(index).copied().ok_or(Error::InvalidIndex(index))
    }

    /// Returns slot `index` for in-place modification.
    pub fn entry_mut(&mut self, index: usize) -> Result<&mut Pte> {
        self.entries.get_mut(index).ok_or(Error::InvalidIndex(index))
    }

    /// Reads the data byte at `offset` within the page.
    pub fn byte(&self, offset: usize) -> Result<u8> {
        let word = self.entries.get(offset / 8).ok_or(Error::InvalidOffset(offset))?.bits();
        Ok((word >> ((offset % 8) * 8)) as u8)
    }

    /// Stores `value` at `offset` within the page.
    pub fn set_byte(&mut self, offset: usize, value: u8) -> Result<()> {
        let shift = (offset % 8) * 8;
        let slot = self.entries.get_mut(offset / 8).ok_or(Error::InvalidOffset(offset))?;
        let word = (slot.bits() & !(0xff << shift)) | (u64::from(value) << shift);
        *slot = Pte::from_bits(word);
        Ok(())
    }
}

/// Fixed-capacity pool of frames with a monotonic allocation counter.
pub struct PageArena {
    frames: Vec<Box<Frame>>,
    capacity: usize,
}

impl PageArena {
    /// Creates an empty arena able to hold `capacity` pages.
    pub fn new(capacity: usize) -> Self {
        Self { frames: Vec::new(), capacity }
    }

    /// Drops every frame and restarts numbering at PPN 0.
    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// Allocates the next zeroed page.
    pub fn new_page(&mut self) -> Result<PagePtr> {
        if self.frames.len() >= self.capacity {
            error!(target: "arena", "ARENA: exhausted after {} pages", self.capacity);
            return Err(Error::OutOfMemory { capacity: self.capacity });
        }
        let ppn = Ppn(self.frames.len() as u64);
        self.frames.push(Box::new(Frame::zeroed()));
        debug!(target: "arena", "ARENA: alloc ppn={} used={}", ppn, self.frames.len());
        Ok(ppn_to_page(ppn))
    }

    /// Number of pages handed out since the last reset.
    pub fn used_pages(&self) -> usize {
        self.frames.len()
    }

    /// Total number of pages the arena can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Borrows the frame behind `page`.
    pub fn frame(&self, page: PagePtr) -> Result<&Frame> {
        self.frames.get(page.slot()).map(|frame| &**frame).ok_or(Error::InvalidPage(page))
    }

    /// Mutably borrows the frame behind `page`.
    pub fn frame_mut(&mut self, page: PagePtr) -> Result<&mut Frame> {
        self.frames.get_mut(page.slot()).map(|frame| &mut **frame).ok_or(Error::InvalidPage(page))
    }

    /// Overwrites `dst` with the full contents of `src`.
    pub fn copy_frame(&mut self, src: PagePtr, dst: PagePtr) -> Result<()> {
        let snapshot = self.frame(src)?.entries;
        self.frame_mut(dst)?.entries = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pages_are_numbered_in_order() {
        let mut arena = PageArena::new(4);
        for expected in 0..4 {
            let page = arena.new_page().expect("alloc");
            assert_eq!(page_to_ppn(page), Ppn::new(expected));
        }
        assert_eq!(arena.used_pages(), 4);
        assert_eq!(arena.new_page(), Err(Error::OutOfMemory { capacity: 4 }));
        assert_eq!(arena.used_pages(), 4);
    }

    #[test]
    fn new_pages_are_zeroed_after_reset() {
        let mut arena = PageArena::new(1);
        let page = arena.new_page().unwrap();
        arena.frame_mut(page).unwrap().set_byte(17, 0x5a).unwrap();
        arena.reset();
        let page = arena.new_page().unwrap();
        assert_eq!(arena.frame(page).unwrap().byte(17), Ok(0));
    }

    #[test]
    fn bytes_do_not_bleed_into_neighbours() {
        let mut frame = Frame::zeroed();
        frame.set_byte(8, 0xff).unwrap();
        frame.set_byte(9, 0x01).unwrap();
        frame.set_byte(8, 0x10).unwrap();
        assert_eq!(frame.byte(7), Ok(0));
        assert_eq!(frame.byte(8), Ok(0x10));
        assert_eq!(frame.byte(9), Ok(0x01));
        assert_eq!(frame.byte(10), Ok(0));
    }

    #[test]
    fn out_of_range_slots_are_errors() {
        let mut frame = Frame::zeroed();
        assert_eq!(frame.entry(PTES_PER_PAGE - 1), Ok(Pte::ZERO));
        assert_eq!(frame.entry(PTES_PER_PAGE), Err(Error::InvalidIndex(PTES_PER_PAGE)));
        assert!(matches!(frame.entry_mut(usize::MAX), Err(Error::InvalidIndex(usize::MAX))));
        assert_eq!(frame.byte(PAGE_SIZE), Err(Error::InvalidOffset(PAGE_SIZE)));
        assert_eq!(frame.set_byte(PAGE_SIZE + 3, 1), Err(Error::InvalidOffset(PAGE_SIZE + 3)));
        assert_eq!(frame.byte(PAGE_SIZE - 1), Ok(0));
    }

    #[test]
    fn unknown_page_is_rejected() {
        let arena = PageArena::new(2);
        let page = ppn_to_page(Ppn::new(1));
        assert!(matches!(arena.frame(page), Err(Error::InvalidPage(p)) if p == page));
    }

    proptest! {
        #[test]
        fn ppn_round_trip(allocs in 1usize..64) {
            let mut arena = PageArena::new(64);
            for _ in 0..allocs {
                let page = arena.new_page().unwrap();
                prop_assert_eq!(ppn_to_page(page_to_ppn(page)), page);
                prop_assert_eq!(page.addr() % PAGE_SIZE as u64, 0);
            }
        }
    }
}
