// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! The simulated process context: arena, active root and fault state.

use log::{debug, error};

use crate::arena::{page_to_ppn, ppn_to_page, PageArena, PagePtr};
use crate::config::VmsConfig;
use crate::error::{Error, Result};
use crate::fault::FaultStats;
use crate::pte::{Pte, PteFlags};
use crate::walker::{self, table_index, Level};

/// One simulated machine: physical memory plus the currently scheduled
/// address space.
///
/// A fatal fault terminates the simulated process; every later operation
/// returns [`Error::Terminated`] until [`Vms::init`] is called.
pub struct Vms {
    pub(crate) arena: PageArena,
    root: Option<PagePtr>,
    pub(crate) stats: FaultStats,
    terminated: bool,
}

impl Vms {
    /// Creates a simulator with an empty arena sized by `config`.
    ///
    /// Rejects configurations that [`VmsConfig::from_toml_str`] would reject.
    pub fn new(config: &VmsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_capacity(config.arena_pages))
    }

    fn with_capacity(pages: usize) -> Self {
        Self { arena: PageArena::new(pages), root: None, stats: FaultStats::default(), terminated: false }
    }

    /// Resets arena, used-page counter, root pointer and fault state.
    pub fn init(&mut self) {
        self.arena.reset();
        self.root = None;
        self.stats = FaultStats::default();
        self.terminated = false;
        debug!(target: "pt", "VMS: init capacity={}", self.arena.capacity());
    }

    /// Allocates a zeroed page. Exhaustion terminates the simulated process.
    pub fn new_page(&mut self) -> Result<PagePtr> {
        self.ensure_alive()?;
        match self.arena.new_page() {
            Ok(page) => Ok(page),
            Err(err) => Err(self.terminate(err)),
        }
    }

    /// Pages allocated since the last [`Vms::init`].
    pub fn used_pages(&self) -> usize {
        self.arena.used_pages()
    }

    /// Read-only access to physical memory.
    pub fn arena(&self) -> &PageArena {
        &self.arena
    }

    /// The slot of `table` selected by `addr` at `level`.
    pub fn pte_entry(&mut self, table: PagePtr, addr: u64, level: Level) -> Result<&mut Pte> {
        self.ensure_alive()?;
        walker::pte_entry(&mut self.arena, table, addr, level)
    }

    /// Slot `index` of `table`.
    pub fn pte_entry_from_index(&mut self, table: PagePtr, index: usize) -> Result<&mut Pte> {
        self.ensure_alive()?;
        walker::pte_entry_from_index(&mut self.arena, table, index)
    }

    /// Copy of slot `index` of `table`.
    pub fn pte(&self, table: PagePtr, index: usize) -> Result<Pte> {
        walker::pte(&self.arena, table, index)
    }

    /// Makes `table` the active level-2 root.
    pub fn set_root_table(&mut self, table: PagePtr) -> Result<()> {
        self.ensure_alive()?;
        self.arena.frame(table)?;
        debug!(target: "pt", "VMS: root -> {table}");
        self.root = Some(table);
        Ok(())
    }

    /// The active root, if one was set.
    pub fn get_root_table(&self) -> Option<PagePtr> {
        self.root
    }

    /// Counters of faults taken since the last [`Vms::init`].
    pub fn fault_stats(&self) -> FaultStats {
        self.stats
    }

    /// Whether a fatal fault has killed the simulated process.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Maps `page` at `addr` under `root` with `flags | V`, allocating any
    /// missing intermediate tables.
    pub fn map_page(&mut self, root: PagePtr, addr: u64, page: PagePtr, flags: PteFlags) -> Result<()> {
        self.ensure_alive()?;
        self.arena.frame(page)?;
        let mut table = root;
        for level in [Level::L2, Level::L1] {
            let entry = self.pte(table, table_index(addr, level))?;
            table = if entry.valid() {
                ppn_to_page(entry.get_ppn())
            } else {
                let next = self.new_page()?;
                *self.pte_entry(table, addr, level)? = Pte::new(page_to_ppn(next), PteFlags::VALID);
                next
            };
        }
        let leaf = self.pte_entry(table, addr, Level::L0)?;
        if leaf.valid() {
            return Err(Error::AlreadyMapped(addr));
        }
        *leaf = Pte::new(page_to_ppn(page), flags | PteFlags::VALID);
        Ok(())
    }

    pub(crate) fn active_root(&self) -> Result<PagePtr> {
        self.root.ok_or(Error::NoRootTable)
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.terminated {
            Err(Error::Terminated)
        } else {
            Ok(())
        }
    }

    /// Marks the simulated process dead and hands `err` back for returning.
    pub(crate) fn terminate(&mut self, err: Error) -> Error {
        error!(target: "fault", "FATAL: {err}");
        self.terminated = true;
        self.stats.fatal += 1;
        err
    }
}

impl Default for Vms {
    fn default() -> Self {
        Self::with_capacity(VmsConfig::default().arena_pages)
    }
}
