// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Virtual-address decoding and PTE slot addressing.
//!
//! The walker never allocates and never checks `V`: callers build the chain
//! and decide what an invalid slot means.

use core::fmt;

use crate::arena::{PageArena, PagePtr, PAGE_SHIFT, PAGE_SIZE, PTES_PER_PAGE};
use crate::error::{Error, Result};
use crate::pte::Pte;

const INDEX_BITS: u32 = 9;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;
const OFFSET_MASK: u64 = PAGE_SIZE as u64 - 1;

static_assertions::const_assert_eq!(1usize << INDEX_BITS, PTES_PER_PAGE);

/// A page-table level; [`Level::L2`] is the root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Leaf tables whose entries reference data pages.
    L0,
    /// Middle tables.
    L1,
    /// Root tables.
    L2,
}

impl Level {
    /// Numeric level.
    pub const fn as_usize(self) -> usize {
        match self {
            Level::L0 => 0,
            Level::L1 => 1,
            Level::L2 => 2,
        }
    }

    /// The level whose tables this level's entries point at.
    pub const fn lower(self) -> Option<Level> {
        match self {
            Level::L2 => Some(Level::L1),
            Level::L1 => Some(Level::L0),
            Level::L0 => None,
        }
    }

    const fn shift(self) -> u32 {
        PAGE_SHIFT + INDEX_BITS * self.as_usize() as u32
    }
}

impl TryFrom<usize> for Level {
    type Error = Error;

    fn try_from(value: usize) -> Result<Self> {
        match value {
            0 => Ok(Level::L0),
            1 => Ok(Level::L1),
            2 => Ok(Level::L2),
            other => Err(Error::InvalidLevel(other)),
        }
    }
}

impl From<Level> for usize {
    fn from(value: Level) -> Self {
        value.as_usize()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.as_usize())
    }
}

/// Index of the slot addressed by `addr` in a table at `level`.
pub const fn table_index(addr: u64, level: Level) -> usize {
    ((addr >> level.shift()) & INDEX_MASK) as usize
}

/// Byte offset of `addr` within its page.
pub const fn page_offset(addr: u64) -> usize {
    (addr & OFFSET_MASK) as usize
}

/// Reassembles a page-aligned virtual address from its three indices.
pub const fn compose(l2: usize, l1: usize, l0: usize) -> u64 {
    ((l2 as u64) << Level::L2.shift()) | ((l1 as u64) << Level::L1.shift()) | ((l0 as u64) << Level::L0.shift())
}

/// The slot of `table` that `addr` selects at `level`.
pub fn pte_entry(arena: &mut PageArena, table: PagePtr, addr: u64, level: Level) -> Result<&mut Pte> {
    pte_entry_from_index(arena, table, table_index(addr, level))
}

/// Slot `index` of `table`.
pub fn pte_entry_from_index(arena: &mut PageArena, table: PagePtr, index: usize) -> Result<&mut Pte> {
    arena.frame_mut(table)?.entry_mut(index)
}

/// Copy of slot `index` of `table`.
pub fn pte(arena: &PageArena, table: PagePtr, index: usize) -> Result<Pte> {
    arena.frame(table)?.entry(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decodes_sibling_addresses() {
        let va = 0xABC123;
        assert_eq!(table_index(va, Level::L2), 0);
        assert_eq!(table_index(va, Level::L1), 5);
        assert_eq!(table_index(va, Level::L0), 0xBC);
        assert_eq!(page_offset(va), 0x123);
        for sibling in [0xABD123u64, 0xABE123, 0xABF123, 0xABB123] {
            assert_eq!(table_index(sibling, Level::L2), table_index(va, Level::L2));
            assert_eq!(table_index(sibling, Level::L1), table_index(va, Level::L1));
            assert_ne!(table_index(sibling, Level::L0), table_index(va, Level::L0));
        }
    }

    #[test]
    fn compose_inverts_indices() {
        let va = compose(3, 511, 7);
        assert_eq!(table_index(va, Level::L2), 3);
        assert_eq!(table_index(va, Level::L1), 511);
        assert_eq!(table_index(va, Level::L0), 7);
        assert_eq!(page_offset(va), 0);
    }

    #[test]
    fn level_conversions() {
        assert_eq!(Level::try_from(2usize), Ok(Level::L2));
        assert_eq!(Level::try_from(3usize), Err(Error::InvalidLevel(3)));
        assert_eq!(usize::from(Level::L1), 1);
        assert_eq!(Level::L2.lower(), Some(Level::L1));
        assert_eq!(Level::L0.lower(), None);
    }

    #[test]
    fn entry_by_address_and_by_index_alias() {
        let mut arena = PageArena::new(2);
        let table = arena.new_page().unwrap();
        let va = 0xABC123;
        pte_entry(&mut arena, table, va, Level::L0).unwrap().valid_set();
        let by_index = pte(&arena, table, table_index(va, Level::L0)).unwrap();
        assert!(by_index.valid());
        assert!(!pte(&arena, table, 0).unwrap().valid());
    }

    proptest! {
        #[test]
        fn indices_stay_in_range(addr in any::<u64>(), level in 0usize..3) {
            let level = Level::try_from(level).unwrap();
            prop_assert!(table_index(addr, level) < PTES_PER_PAGE);
        }

        #[test]
        fn shared_prefix_shares_index(addr in any::<u64>(), noise in any::<u64>(), level in 0usize..3) {
            let level = Level::try_from(level).unwrap();
            let low_mask = (1u64 << level.shift()) - 1;
            let other = (addr & !low_mask) | (noise & low_mask);
            prop_assert_eq!(table_index(addr, level), table_index(other, level));
            prop_assert_eq!(table_index(addr, level), table_index(addr, level));
        }
    }
}
