// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! `vms` binary: runs a simulator scenario and exits with its status.

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let outcome = nexus_vms::cli::execute(&args);
    print!("{}", outcome.output);
    std::process::exit(outcome.status);
}
