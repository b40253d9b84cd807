// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error types for allocation and the pool registry.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A pool whose persisted cpu-list count differs from the count requested
/// on a later run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMismatch {
    /// Pool name as persisted.
    pub pool: String,
    /// Core count requested on this run.
    pub requested: usize,
    /// Cpu-list count found in the registry.
    pub persisted: usize,
}

impl fmt::Display for PoolMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: requested {}, persisted {}",
            self.pool, self.requested, self.persisted
        )
    }
}

/// Errors raised while validating or computing a core allocation.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// Requested pool sizes exceed the isolated-core inventory.
    #[error("{requested} isolated cores requested but only {isolated} available")]
    InsufficientIsolatedCores { isolated: usize, requested: usize },

    /// A pool's candidate list had no unassigned cores left.
    #[error("no free cores left for pool '{pool}'")]
    NoFreeCores { pool: String },

    /// A pool asked for more cores than remain unassigned.
    #[error("pool '{pool}' requested {requested} cores but only {available} free")]
    InsufficientCores {
        pool: String,
        requested: usize,
        available: usize,
    },

    /// An existing registry does not match the requested pool sizes.
    #[error("persisted pools do not match the request ({})", join_mismatches(.0))]
    ReconciliationMismatch(Vec<PoolMismatch>),
}

fn join_mismatches(mismatches: &[PoolMismatch]) -> String {
    mismatches
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from the persisted pool registry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The registry directory is already initialized.
    #[error("registry already exists at {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The registry directory has not been initialized.
    #[error("no registry found at {}", .0.display())]
    NotFound(PathBuf),

    /// A pool was looked up that was never added.
    #[error("unknown pool '{0}'")]
    UnknownPool(String),

    /// Underlying filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The registry document failed to (de)serialize.
    #[error("malformed registry: {0}")]
    Json(#[from] serde_json::Error),
}
