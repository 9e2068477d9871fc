// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Address translation through the active root.

use core::fmt;

use log::trace;

use crate::arena::{ppn_to_page, PagePtr};
use crate::context::Vms;
use crate::error::{Error, Result};
use crate::pte::{Pte, PteFlags};
use crate::walker::{page_offset, table_index, Level};

/// Kind of memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    /// Load.
    Read,
    /// Store.
    Write,
}

impl Access {
    fn required(self) -> PteFlags {
        match self {
            Access::Read => PteFlags::VALID | PteFlags::READ,
            Access::Write => PteFlags::VALID | PteFlags::WRITE,
        }
    }

    fn permits(self, entry: Pte) -> bool {
        entry.contains(self.required())
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Access::Read => "read",
            Access::Write => "write",
        })
    }
}

impl Vms {
    /// Loads the byte at `addr` in the active address space.
    pub fn read(&mut self, addr: u64) -> Result<u8> {
        let (page, offset) = self.resolve(addr, Access::Read)?;
        self.arena.frame(page)?.byte(offset)
    }

    /// Stores `value` at `addr` in the active address space.
    pub fn write(&mut self, addr: u64, value: u8) -> Result<()> {
        let (page, offset) = self.resolve(addr, Access::Write)?;
        self.arena.frame_mut(page)?.set_byte(offset, value)
    }

    /// Simulated physical address `addr` resolves to for `access`.
    ///
    /// Faults exactly like the access itself would, including breaking a
    /// copy-on-write share for [`Access::Write`].
    pub fn translate(&mut self, addr: u64, access: Access) -> Result<u64> {
        let (page, offset) = self.resolve(addr, access)?;
        Ok(page.addr() + offset as u64)
    }

    fn resolve(&mut self, addr: u64, access: Access) -> Result<(PagePtr, usize)> {
        self.ensure_alive()?;
        let root = self.active_root()?;
        let table = self.leaf_table(root, addr, access)?;
        let index = table_index(addr, Level::L0);

        let mut entry = self.pte(table, index)?;
        if !access.permits(entry) {
            self.page_fault_handler(addr, Level::L0, table, access)?;
            entry = self.pte(table, index)?;
            if !access.permits(entry) {
                return Err(self.terminate(Error::AccessViolation { addr, level: 0, access }));
            }
        }
        trace!(target: "pt", "XLATE: {access} {addr:#x} -> {entry}");
        Ok((ppn_to_page(entry.get_ppn()), page_offset(addr)))
    }

    /// Follows the level-2 and level-1 entries for `addr` down to its
    /// level-0 table.
    fn leaf_table(&mut self, root: PagePtr, addr: u64, access: Access) -> Result<PagePtr> {
        let mut table = root;
        for level in [Level::L2, Level::L1] {
            let entry = self.pte(table, table_index(addr, level))?;
            if !entry.valid() {
                return Err(self.terminate(Error::AccessViolation { addr, level: level.as_usize(), access }));
            }
            table = ppn_to_page(entry.get_ppn());
        }
        Ok(table)
    }
}
