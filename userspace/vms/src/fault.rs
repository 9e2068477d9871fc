// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Page-fault handling.
//!
//! A denied leaf access lands here. Entries carrying the `C` marker are
//! copy-on-write shares: the faulting side gets a private copy of the page
//! and its write permission back. Anything else kills the simulated process.

use log::debug;

use crate::arena::{page_to_ppn, ppn_to_page, PagePtr};
use crate::context::Vms;
use crate::error::{Error, Result};
use crate::translate::Access;
use crate::walker::{table_index, Level};

/// Fault counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaultStats {
    /// Faults delivered to the handler.
    pub total: u64,
    /// Faults resolved by breaking a copy-on-write share.
    pub cow_resolved: u64,
    /// Faults that terminated the simulated process.
    pub fatal: u64,
}

impl Vms {
    /// Handles a denied `access` to `addr` whose entry lives in `table` at
    /// `level`.
    pub(crate) fn page_fault_handler(&mut self, addr: u64, level: Level, table: PagePtr, access: Access) -> Result<()> {
        self.stats.total += 1;
        let index = table_index(addr, level);
        let entry = self.pte(table, index)?;
        if !(entry.valid() && entry.custom()) {
            return Err(self.terminate(Error::AccessViolation { addr, level: level.as_usize(), access }));
        }

        let shared = ppn_to_page(entry.get_ppn());
        let private = self.new_page()?;
        self.arena.copy_frame(shared, private)?;

        let slot = self.pte_entry_from_index(table, index)?;
        slot.set_ppn(page_to_ppn(private));
        slot.custom_clear();
        slot.write_set();

        self.stats.cow_resolved += 1;
        debug!(target: "fault", "COW: {access} at {addr:#x} copied {shared} -> {private}");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
