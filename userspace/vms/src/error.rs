// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error model of the simulator.
//!
//! Only two variants are faults in the hardware sense:
//! [`Error::AccessViolation`] and [`Error::OutOfMemory`]. Both terminate the
//! simulated process and map to the `EFAULT` exit status. The remaining
//! variants report misuse of the API by the driver.

use crate::arena::PagePtr;
use crate::translate::Access;

/// Exit status used when the simulated process dies on a fatal fault.
pub const EFAULT: i32 = 14;

/// Result alias for simulator operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced by the simulator.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// A denied access that could not be resolved (models SIGSEGV/EFAULT).
    #[error("access violation: {access} at {addr:#x} (level {level})")]
    AccessViolation {
        /// Faulting virtual address.
        addr: u64,
        /// Page-table level where the walk stopped.
        level: usize,
        /// Kind of access that was denied.
        access: Access,
    },
    /// The physical page arena has no frames left.
    #[error("physical page arena exhausted ({capacity} pages)")]
    OutOfMemory {
        /// Total number of frames in the arena.
        capacity: usize,
    },
    /// The simulated process already died on a fatal fault.
    #[error("simulated process terminated")]
    Terminated,
    /// No root table has been activated.
    #[error("no active root page table")]
    NoRootTable,
    /// The handle does not name an allocated page.
    #[error("page {0} was never allocated")]
    InvalidPage(PagePtr),
    /// A leaf mapping already exists at the address.
    #[error("address {0:#x} is already mapped")]
    AlreadyMapped(u64),
    /// A page-table slot index outside `0..PTES_PER_PAGE`.
    #[error("slot index {0} is outside the page table")]
    InvalidIndex(usize),
    /// A byte offset outside the page.
    #[error("offset {0:#x} is outside the page")]
    InvalidOffset(usize),
    /// Page-table levels are 0, 1 and 2.
    #[error("invalid page-table level {0}")]
    InvalidLevel(usize),
    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Returns true when the error terminates the simulated process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AccessViolation { .. } | Self::OutOfMemory { .. } | Self::Terminated)
    }

    /// Process exit status a driver should report for this error.
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            EFAULT
        } else {
            1
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(value: toml::de::Error) -> Self {
        Self::Config(value.to_string())
    }
}
