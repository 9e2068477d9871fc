// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Address-space duplication for fork.
//!
//! Both strategies rebuild the table tree of the active root page by page;
//! they differ only in what happens to the data pages behind valid leaves.
//! Invalid entries are skipped and stay zero in the child. The active root is
//! left alone: the caller decides which side runs next.

use log::debug;

use crate::arena::{page_to_ppn, ppn_to_page, PagePtr, PTES_PER_PAGE};
use crate::context::Vms;
use crate::error::Result;
use crate::pte::Pte;
use crate::walker::Level;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LeafPolicy {
    /// Give the child a private copy of every data page.
    DuplicateData,
    /// Point the child at the parent's data pages; writable leaves become
    /// read-only + `C` on both sides.
    ShareAndProtect,
}

impl Vms {
    /// Deep-copies the active address space, tables and data alike.
    pub fn fork_copy(&mut self) -> Result<PagePtr> {
        self.duplicate_tree(LeafPolicy::DuplicateData)
    }

    /// Copies the table tree of the active address space and shares its data
    /// pages copy-on-write.
    pub fn fork_copy_on_write(&mut self) -> Result<PagePtr> {
        self.duplicate_tree(LeafPolicy::ShareAndProtect)
    }

    fn duplicate_tree(&mut self, policy: LeafPolicy) -> Result<PagePtr> {
        self.ensure_alive()?;
        let parent = self.active_root()?;
        let before = self.used_pages();
        let child = self.new_page()?;
        self.duplicate_table(parent, child, Level::L2, policy)?;
        debug!(
            target: "fork",
            "FORK: {policy:?} {parent} -> {child} (+{} pages)",
            self.used_pages() - before
        );
        Ok(child)
    }

    fn duplicate_table(&mut self, parent: PagePtr, child: PagePtr, level: Level, policy: LeafPolicy) -> Result<()> {
        for index in 0..PTES_PER_PAGE {
            let entry = self.pte(parent, index)?;
            if !entry.valid() {
                continue;
            }
            let copy = match level.lower() {
                Some(lower) => {
                    let next = self.new_page()?;
                    self.duplicate_table(ppn_to_page(entry.get_ppn()), next, lower, policy)?;
                    retarget(entry, next)
                }
                None => self.duplicate_leaf(parent, index, entry, policy)?,
            };
            *self.pte_entry_from_index(child, index)? = copy;
        }
        Ok(())
    }

    /// Returns the entry the child installs for the parent's leaf `entry`.
    fn duplicate_leaf(&mut self, parent: PagePtr, index: usize, entry: Pte, policy: LeafPolicy) -> Result<Pte> {
        match policy {
            LeafPolicy::DuplicateData => {
                let page = self.new_page()?;
                self.arena.copy_frame(ppn_to_page(entry.get_ppn()), page)?;
                Ok(retarget(entry, page))
            }
            LeafPolicy::ShareAndProtect if entry.write() => {
                let mut shared = entry;
                shared.write_clear();
                shared.custom_set();
                *self.pte_entry_from_index(parent, index)? = shared;
                Ok(shared)
            }
            LeafPolicy::ShareAndProtect => Ok(entry),
        }
    }
}

fn retarget(mut entry: Pte, page: PagePtr) -> Pte {
    entry.set_ppn(page_to_ppn(page));
    entry
}
