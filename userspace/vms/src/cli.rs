// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Command-line driver for the simulator.
//!
//! `vms demo` walks a single mapping through a write, a read and an eager
//! fork. `vms cow` replays the four-sibling copy-on-write scenario and, with
//! `--fatal`, ends on a read that kills the simulated process.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;

use crate::arena::{page_to_ppn, PagePtr};
use crate::config::VmsConfig;
use crate::context::Vms;
use crate::error::Result;
use crate::pte::{Pte, PteFlags};
use crate::walker::Level;

/// Parsed command line.
#[derive(Debug, Parser)]
#[command(name = "vms", about = "MMU simulator with eager and copy-on-write fork")]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
    /// Scenario to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available scenarios.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Map one address, write and read it, then fork it eagerly.
    Demo {
        /// Virtual address to map (decimal or 0x-prefixed hex).
        #[arg(long, default_value = "0xABC123", value_parser = parse_addr)]
        addr: u64,
    },
    /// Fork four sibling pages copy-on-write and write through the forks.
    Cow {
        /// Finish with a read through a root that never mapped the address.
        #[arg(long)]
        fatal: bool,
    },
}

/// Result of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Process exit status.
    pub status: i32,
    /// Everything the run printed.
    pub output: String,
}

/// Parses `args` (without the program name) and runs the scenario.
pub fn execute(args: &[&str]) -> Outcome {
    let cli = match Cli::try_parse_from(std::iter::once("vms").chain(args.iter().copied())) {
        Ok(cli) => cli,
        Err(err) => {
            return Outcome { status: err.exit_code(), output: err.render().to_string() };
        }
    };
    let mut lines = Vec::new();
    let status = match run(&cli, &mut lines) {
        Ok(()) => 0,
        Err(err) => {
            lines.push(format!("vms: {err}"));
            err.exit_code()
        }
    };
    Outcome { status, output: lines.join("\n") + "\n" }
}

/// Runs an already parsed command line, appending its report lines to `out`.
pub fn run(cli: &Cli, out: &mut Vec<String>) -> Result<()> {
    let config = match &cli.config {
        Some(path) => VmsConfig::load(path)?,
        None => VmsConfig::default(),
    };
    info!(target: "pt", "VMS: arena of {} pages", config.arena_pages);
    let mut vms = Vms::new(&config)?;
    match cli.command {
        Command::Demo { addr } => demo(&mut vms, addr, out),
        Command::Cow { fatal } => cow(&mut vms, fatal, out),
    }
}

fn parse_addr(text: &str) -> core::result::Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|err| format!("invalid address {text:?}: {err}"))
}

/// Links `l2 -> l1 -> l0` along the path of `addr`.
fn link_tables(vms: &mut Vms, l2: PagePtr, l1: PagePtr, l0: PagePtr, addr: u64) -> Result<()> {
    *vms.pte_entry(l2, addr, Level::L2)? = Pte::new(page_to_ppn(l1), PteFlags::VALID);
    *vms.pte_entry(l1, addr, Level::L1)? = Pte::new(page_to_ppn(l0), PteFlags::VALID);
    Ok(())
}

fn demo(vms: &mut Vms, addr: u64, out: &mut Vec<String>) -> Result<()> {
    let l2 = vms.new_page()?;
    let l1 = vms.new_page()?;
    let l0 = vms.new_page()?;
    let p0 = vms.new_page()?;
    link_tables(vms, l2, l1, l0, addr)?;
    *vms.pte_entry(l0, addr, Level::L0)? = Pte::new(page_to_ppn(p0), PteFlags::VALID | PteFlags::READ | PteFlags::WRITE);
    vms.set_root_table(l2)?;

    for value in [1, 2] {
        vms.write(addr, value)?;
        out.push(format!("{addr:#X} read: {}", vms.read(addr)?));
    }

    let child = vms.fork_copy()?;
    out.push(format!("fork_copy: child root {child}, used pages {}", vms.used_pages()));
    for (name, root) in [("parent", l2), ("child", child)] {
        out.push(format!("{name}:"));
        out.extend(vms.dump(root)?.lines().map(str::to_owned));
    }
    Ok(())
}

const SIBLINGS: [u64; 4] = [0xABC123, 0xABD123, 0xABE123, 0xABF123];
const UNMAPPED_SIBLING: u64 = 0xABB123;

fn cow(vms: &mut Vms, fatal: bool, out: &mut Vec<String>) -> Result<()> {
    let l2 = vms.new_page()?;
    let l1 = vms.new_page()?;
    let l0 = vms.new_page()?;
    link_tables(vms, l2, l1, l0, SIBLINGS[0])?;
    for (i, addr) in SIBLINGS.iter().enumerate() {
        let page = vms.new_page()?;
        let mut flags = PteFlags::VALID | PteFlags::READ;
        if i < 3 {
            flags |= PteFlags::WRITE;
        }
        *vms.pte_entry(l0, *addr, Level::L0)? = Pte::new(page_to_ppn(page), flags);
    }
    vms.set_root_table(l2)?;
    for (addr, value) in SIBLINGS.iter().zip(1..=3) {
        vms.write(*addr, value)?;
    }
    out.push(format!("parent {l2}: used pages {}", vms.used_pages()));

    let mut roots = vec![l2];
    for _ in 0..4 {
        let child = vms.fork_copy_on_write()?;
        vms.set_root_table(child)?;
        roots.push(child);
        out.push(format!("fork_copy_on_write -> {child}: used pages {}", vms.used_pages()));
    }

    vms.write(SIBLINGS[0], 2)?;
    out.push(format!("write {:#X} = 2: used pages {}", SIBLINGS[0], vms.used_pages()));

    for root in &roots {
        vms.set_root_table(*root)?;
        let values = SIBLINGS
            .iter()
            .map(|addr| vms.read(*addr).map(|value| value.to_string()))
            .collect::<Result<Vec<_>>>()?;
        out.push(format!("{root}: {}", values.join(" ")));
    }

    if fatal {
        let page = vms.new_page()?;
        *vms.pte_entry(l0, UNMAPPED_SIBLING, Level::L0)? = Pte::new(page_to_ppn(page), PteFlags::VALID | PteFlags::READ);
        vms.set_root_table(roots[1])?;
        out.push(format!("read {UNMAPPED_SIBLING:#X} through {}", roots[1]));
        vms.read(UNMAPPED_SIBLING)?;
    }
    Ok(())
}
