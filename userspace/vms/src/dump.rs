// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Read-only inspection of an address space.

use core::fmt::Write as _;

use crate::arena::{ppn_to_page, PagePtr, PTES_PER_PAGE};
use crate::context::Vms;
use crate::error::Result;
use crate::pte::Pte;
use crate::walker::compose;

/// A valid leaf reachable from a root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mapping {
    /// Page-aligned virtual address.
    pub addr: u64,
    /// The level-0 entry mapping it.
    pub entry: Pte,
}

impl Vms {
    /// Every valid leaf under `root`, in ascending address order.
    pub fn mappings(&self, root: PagePtr) -> Result<Vec<Mapping>> {
        let mut out = Vec::new();
        for (l2, l2_entry) in self.valid_slots(root)? {
            for (l1, l1_entry) in self.valid_slots(ppn_to_page(l2_entry.get_ppn()))? {
                for (l0, entry) in self.valid_slots(ppn_to_page(l1_entry.get_ppn()))? {
                    out.push(Mapping { addr: compose(l2, l1, l0), entry });
                }
            }
        }
        Ok(out)
    }

    /// Renders [`Vms::mappings`] one leaf per line.
    pub fn dump(&self, root: PagePtr) -> Result<String> {
        let mut text = String::new();
        for mapping in self.mappings(root)? {
            let _ = writeln!(text, "{:#011x} {}", mapping.addr, mapping.entry);
        }
        Ok(text)
    }

    fn valid_slots(&self, table: PagePtr) -> Result<Vec<(usize, Pte)>> {
        let mut slots = Vec::new();
        for index in 0..PTES_PER_PAGE {
            let entry = self.pte(table, index)?;
            if entry.valid() {
                slots.push((index, entry));
            }
        }
        Ok(slots)
    }
}
