// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Unit tests for the page-fault state machine
//! NOTE: Tests only; cover fatal vs copy-on-write resolution and the retry path

use super::FaultStats;
use crate::arena::{page_to_ppn, PagePtr};
use crate::config::VmsConfig;
use crate::context::Vms;
use crate::error::Error;
use crate::pte::{Pte, PteFlags};
use crate::translate::Access;
use crate::walker::Level;

const VA: u64 = 0xABC123;

/// Builds root -> l1 -> l0 -> data for `VA` and activates it.
fn single_mapping(flags: PteFlags) -> (Vms, PagePtr, PagePtr) {
    let mut vms = Vms::new(&VmsConfig { arena_pages: 16 }).unwrap();
    let l2 = vms.new_page().unwrap();
    let l1 = vms.new_page().unwrap();
    let l0 = vms.new_page().unwrap();
    let data = vms.new_page().unwrap();
    *vms.pte_entry(l2, VA, Level::L2).unwrap() = Pte::new(page_to_ppn(l1), PteFlags::VALID);
    *vms.pte_entry(l1, VA, Level::L1).unwrap() = Pte::new(page_to_ppn(l0), PteFlags::VALID);
    *vms.pte_entry(l0, VA, Level::L0).unwrap() = Pte::new(page_to_ppn(data), flags);
    vms.set_root_table(l2).unwrap();
    (vms, l0, data)
}

#[test]
fn cow_write_copies_once() {
    let (mut vms, l0, data) = single_mapping(PteFlags::VALID | PteFlags::READ | PteFlags::CUSTOM);
    vms.arena.frame_mut(data).unwrap().set_byte(0x123, 9).unwrap();

    vms.write(VA, 4).unwrap();
    assert_eq!(vms.used_pages(), 5);
    let entry = *vms.pte_entry(l0, VA, Level::L0).unwrap();
    assert!(entry.write());
    assert!(!entry.custom());
    assert_ne!(entry.get_ppn(), page_to_ppn(data));

    // The shared page keeps its contents; the private copy took the store.
    assert_eq!(vms.arena().frame(data).unwrap().byte(0x123), Ok(9));
    assert_eq!(vms.read(VA).unwrap(), 4);

    vms.write(VA, 5).unwrap();
    assert_eq!(vms.used_pages(), 5);
    assert_eq!(vms.fault_stats(), FaultStats { total: 1, cow_resolved: 1, fatal: 0 });
}

#[test]
fn write_to_read_only_page_is_fatal() {
    let (mut vms, _, _) = single_mapping(PteFlags::VALID | PteFlags::READ);
    assert_eq!(vms.read(VA), Ok(0));
    let err = vms.write(VA, 1).unwrap_err();
    assert_eq!(err, Error::AccessViolation { addr: VA, level: 0, access: Access::Write });
    assert_eq!(err.exit_code(), crate::error::EFAULT);
    assert!(vms.is_terminated());
    assert_eq!(vms.read(VA), Err(Error::Terminated));
    assert_eq!(vms.fault_stats(), FaultStats { total: 1, cow_resolved: 0, fatal: 1 });
}

#[test]
fn dead_process_rejects_table_edits() {
    let (mut vms, l0, data) = single_mapping(PteFlags::VALID | PteFlags::READ);
    let root = vms.get_root_table().unwrap();
    assert!(vms.write(VA, 1).is_err());

    assert_eq!(vms.set_root_table(data), Err(Error::Terminated));
    assert_eq!(vms.get_root_table(), Some(root));
    assert!(matches!(vms.pte_entry_from_index(root, 0), Err(Error::Terminated)));
    assert!(matches!(vms.pte_entry(l0, VA, Level::L0), Err(Error::Terminated)));
    assert_eq!(vms.fork_copy(), Err(Error::Terminated));

    // Inspection still works and shows the leaf untouched.
    assert!(!vms.pte(l0, 0xBC).unwrap().write());

    vms.init();
    assert!(vms.set_root_table(data).is_err());
    let page = vms.new_page().unwrap();
    assert_eq!(vms.set_root_table(page), Ok(()));
}

#[test]
fn read_without_read_bit_is_fatal() {
    let (mut vms, _, _) = single_mapping(PteFlags::VALID | PteFlags::WRITE);
    vms.write(VA, 1).unwrap();
    assert!(matches!(vms.read(VA), Err(Error::AccessViolation { access: Access::Read, .. })));
}

#[test]
fn cow_page_without_read_bit_still_dies_on_read() {
    let (mut vms, _, _) = single_mapping(PteFlags::VALID | PteFlags::CUSTOM);
    let err = vms.read(VA).unwrap_err();
    assert_eq!(err, Error::AccessViolation { addr: VA, level: 0, access: Access::Read });
    // The handler resolved the share before the retry failed.
    assert_eq!(vms.used_pages(), 5);
    assert_eq!(vms.fault_stats(), FaultStats { total: 1, cow_resolved: 1, fatal: 1 });
}

#[test]
fn custom_marker_on_invalid_entry_is_fatal() {
    let (mut vms, _, _) = single_mapping(PteFlags::CUSTOM | PteFlags::READ);
    assert!(matches!(vms.read(VA), Err(Error::AccessViolation { level: 0, .. })));
    assert_eq!(vms.used_pages(), 4);
}

#[test]
fn invalid_intermediate_entry_is_fatal() {
    let (mut vms, _, _) = single_mapping(PteFlags::VALID | PteFlags::READ);
    let elsewhere = 0x4000_0000;
    let err = vms.read(elsewhere).unwrap_err();
    assert_eq!(err, Error::AccessViolation { addr: elsewhere, level: 2, access: Access::Read });
    assert_eq!(vms.fault_stats().total, 0);
}

#[test]
fn access_without_root_is_rejected() {
    let mut vms = Vms::default();
    assert_eq!(vms.read(VA), Err(Error::NoRootTable));
    assert!(!vms.is_terminated());
}

#[test]
fn translate_reports_physical_address() {
    let (mut vms, _, data) = single_mapping(PteFlags::VALID | PteFlags::READ);
    assert_eq!(vms.translate(VA, Access::Read), Ok(data.addr() + 0x123));
}
