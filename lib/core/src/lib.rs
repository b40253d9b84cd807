// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # corral: topology-aware CPU core allocation
//!
//! corral partitions the physical CPU cores of a host into named, disjoint
//! pools based on the discovered hardware topology and operator-requested
//! core counts, then persists the allocation as a JSON registry so other
//! components can pin workloads to specific cores. It targets hosts running
//! latency-sensitive and best-effort workloads side by side, where
//! kernel-isolated cores must be partitioned correctly between workload
//! classes.
//!
//! ## Pools
//!
//! - `dataplane`: exclusive; persisted as one cpu-list per physical core so
//!   consumers can pin to whole cores.
//! - `controlplane`: shared; one aggregated cpu-list per socket.
//! - `infra`: shared catch-all; absorbs every core the other pools leave
//!   free, so each core ends up in exactly one pool.
//!
//! ## Example
//!
//! ```no_run
//! use corral_core::{AllocationMode, InitRequest};
//!
//! # fn main() -> corral_core::Result<()> {
//! let request = InitRequest {
//!     conf_dir: "/etc/corral".into(),
//!     dataplane_cores: 4,
//!     controlplane_cores: 1,
//!     dataplane_mode: AllocationMode::Packed,
//!     controlplane_mode: AllocationMode::Packed,
//! };
//! corral_core::init::run(&request)?;
//! # Ok(())
//! # }
//! ```
//!
//! Re-running with the same directory reconciles the persisted pool sizes
//! against the request instead of reallocating; the registry is immutable
//! until deleted.

pub use anyhow::{Context as ErrorContext, Error, Result};

pub mod allocation;
pub mod error;
pub mod hugepages;
pub mod init;
pub mod logging;
pub mod store;
pub mod topology;

pub use allocation::{Allocation, IsolationCheck, IsolationWarning, PoolName, check_isolation};
pub use error::{AllocationError, PoolMismatch, StoreError};
pub use init::{InitRequest, reconcile, run, run_with_root};
pub use store::{Config, ConfigLock, CpuList, Pool};
pub use topology::{
    AllocationMode, Core, CoreId, HwThread, Platform, Socket, discover, discover_with_root,
};
