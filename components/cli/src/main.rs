// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use corral_core::{AllocationMode, Config, InitRequest, Result, init, logging};

#[derive(Parser)]
#[command(name = "corral", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Allocate CPU pools and persist them, or validate an existing allocation
    Init(InitArgs),
    /// Print the persisted pool registry as JSON
    Describe(DescribeArgs),
}

#[derive(Args)]
struct InitArgs {
    /// Directory holding the pool registry
    #[arg(long, default_value = "/etc/corral")]
    conf_dir: PathBuf,

    /// Physical cores for the exclusive dataplane pool
    #[arg(long, default_value = "4", value_parser = clap::value_parser!(u64).range(1..))]
    dataplane_cores: u64,

    /// Physical cores for the shared controlplane pool
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u64).range(1..))]
    controlplane_cores: u64,

    /// Selection order for dataplane cores (packed or spread)
    #[arg(long, default_value = "packed")]
    dataplane_mode: AllocationMode,

    /// Selection order for controlplane cores (packed or spread)
    #[arg(long, default_value = "packed")]
    controlplane_mode: AllocationMode,
}

#[derive(Args)]
struct DescribeArgs {
    /// Directory holding the pool registry
    #[arg(long, default_value = "/etc/corral")]
    conf_dir: PathBuf,
}

fn main() -> ExitCode {
    logging::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Init(args) => run_init(args),
        Command::Describe(args) => run_describe(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_init(args: InitArgs) -> Result<()> {
    let request = InitRequest {
        conf_dir: args.conf_dir,
        dataplane_cores: args.dataplane_cores as usize,
        controlplane_cores: args.controlplane_cores as usize,
        dataplane_mode: args.dataplane_mode,
        controlplane_mode: args.controlplane_mode,
    };
    init::run(&request)
}

fn run_describe(args: DescribeArgs) -> Result<()> {
    let config = Config::open(&args.conf_dir)?;
    println!("{}", config.to_json()?);
    Ok(())
}
