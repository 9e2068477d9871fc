// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Host-side simulator of a three-level MMU.
//!
//! Physical memory is an arena of 4 KiB frames addressed by page number.
//! Page tables live in those frames using an Sv39-style PTE layout; the
//! [`Vms`] context walks them for every load and store, resolves
//! copy-on-write faults, and forks address spaces either eagerly or
//! copy-on-write.
//!
//! ```
//! use nexus_vms::{page_to_ppn, Level, Pte, PteFlags, Vms};
//!
//! let mut vms = Vms::default();
//! let l2 = vms.new_page()?;
//! let l1 = vms.new_page()?;
//! let l0 = vms.new_page()?;
//! let data = vms.new_page()?;
//! let va = 0xABC123;
//! *vms.pte_entry(l2, va, Level::L2)? = Pte::new(page_to_ppn(l1), PteFlags::VALID);
//! *vms.pte_entry(l1, va, Level::L1)? = Pte::new(page_to_ppn(l0), PteFlags::VALID);
//! *vms.pte_entry(l0, va, Level::L0)? =
//!     Pte::new(page_to_ppn(data), PteFlags::VALID | PteFlags::READ | PteFlags::WRITE);
//! vms.set_root_table(l2)?;
//!
//! vms.write(va, 7)?;
//! let child = vms.fork_copy_on_write()?;
//! vms.set_root_table(child)?;
//! assert_eq!(vms.read(va)?, 7);
//! # Ok::<(), nexus_vms::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

pub mod arena;
pub mod cli;
pub mod config;
pub mod context;
pub mod dump;
pub mod error;
pub mod fault;
pub mod fork;
pub mod pte;
pub mod translate;
pub mod walker;

pub use arena::{page_to_ppn, ppn_to_page, PageArena, PagePtr, Ppn, PAGE_SIZE, PTES_PER_PAGE};
pub use config::VmsConfig;
pub use context::Vms;
pub use dump::Mapping;
pub use error::{Error, Result, EFAULT};
pub use fault::FaultStats;
pub use pte::{Pte, PteFlags};
pub use translate::Access;
pub use walker::{page_offset, table_index, Level};
