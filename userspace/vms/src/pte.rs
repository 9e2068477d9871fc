// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page-table entry encoding (Sv39 layout).
//!
//! ```text
//!  63      54 53                 10 9   8 7   3 2 1 0
//! +----------+---------------------+---+---+-----+-+-+-+
//! | reserved |        PPN          |   | C |     |W|R|V|
//! +----------+---------------------+---+---+-----+-+-+-+
//! ```
//!
//! `C` sits in the software-reserved field and marks copy-on-write leaves.

use core::fmt;

use bitflags::bitflags;

use crate::arena::Ppn;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    /// Flags stored in a simulated PTE.
    pub struct PteFlags: u64 {
        /// Entry is live.
        const VALID = 1 << 0;
        /// Loads permitted (leaf only).
        const READ = 1 << 1;
        /// Stores permitted (leaf only).
        const WRITE = 1 << 2;
        /// Copy-on-write share.
        const CUSTOM = 1 << 8;
    }
}

const PPN_SHIFT: u32 = 10;
/// Width of the PPN field in bits.
pub const PPN_BITS: u32 = 44;
const PPN_FIELD: u64 = ((1 << PPN_BITS) - 1) << PPN_SHIFT;

/// A 64-bit page-table entry.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Pte(u64);

impl Pte {
    /// The empty (invalid) entry.
    pub const ZERO: Self = Self(0);

    /// Builds an entry pointing at `ppn` with `flags`.
    pub fn new(ppn: Ppn, flags: PteFlags) -> Self {
        let mut pte = Self(flags.bits());
        pte.set_ppn(ppn);
        pte
    }

    /// Reinterprets a raw word.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw word.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns the known flag bits.
    pub fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    /// Returns true if every flag in `flags` is set.
    pub fn contains(self, flags: PteFlags) -> bool {
        self.flags().contains(flags)
    }

    /// Returns the page number this entry points at.
    pub fn get_ppn(self) -> Ppn {
        Ppn::new((self.0 & PPN_FIELD) >> PPN_SHIFT)
    }

    /// Retargets the entry; flag bits are preserved. Bits of `ppn` beyond
    /// [`PPN_BITS`] are dropped.
    pub fn set_ppn(&mut self, ppn: Ppn) {
        debug_assert!(ppn.as_u64() >> PPN_BITS == 0, "ppn {ppn} exceeds PTE field");
        self.0 = (self.0 & !PPN_FIELD) | ((ppn.as_u64() << PPN_SHIFT) & PPN_FIELD);
    }

    fn insert(&mut self, flag: PteFlags) {
        self.0 |= flag.bits();
    }

    fn remove(&mut self, flag: PteFlags) {
        self.0 &= !flag.bits();
    }

    /// Whether the entry is a live mapping.
    pub fn valid(self) -> bool {
        self.contains(PteFlags::VALID)
    }

    /// Sets `V`.
    pub fn valid_set(&mut self) {
        self.insert(PteFlags::VALID);
    }

    /// Clears `V`.
    pub fn valid_clear(&mut self) {
        self.remove(PteFlags::VALID);
    }

    /// Whether reads are permitted.
    pub fn read(self) -> bool {
        self.contains(PteFlags::READ)
    }

    /// Sets `R`.
    pub fn read_set(&mut self) {
        self.insert(PteFlags::READ);
    }

    /// Clears `R`.
    pub fn read_clear(&mut self) {
        self.remove(PteFlags::READ);
    }

    /// Whether writes are permitted.
    pub fn write(self) -> bool {
        self.contains(PteFlags::WRITE)
    }

    /// Sets `W`.
    pub fn write_set(&mut self) {
        self.insert(PteFlags::WRITE);
    }

    /// Clears `W`.
    pub fn write_clear(&mut self) {
        self.remove(PteFlags::WRITE);
    }

    /// Whether the copy-on-write marker is set.
    pub fn custom(self) -> bool {
        self.contains(PteFlags::CUSTOM)
    }

    /// Sets `C`.
    pub fn custom_set(&mut self) {
        self.insert(PteFlags::CUSTOM);
    }

    /// Clears `C`.
    pub fn custom_clear(&mut self) {
        self.remove(PteFlags::CUSTOM);
    }
}

impl fmt::Display for Pte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |on: bool, c: char| if on { c } else { '-' };
        write!(
            f,
            "PPN: {:#X} Flags: {}{}{}{}",
            self.get_ppn().as_u64(),
            mark(self.custom(), 'C'),
            mark(self.write(), 'W'),
            mark(self.read(), 'R'),
            mark(self.valid(), 'V'),
        )
    }
}

impl fmt::Debug for Pte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pte").field("ppn", &self.get_ppn()).field("flags", &self.flags()).finish()
    }
}
