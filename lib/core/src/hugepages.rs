// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Hugepage availability check.
//!
//! A single informational read of `proc/meminfo`. Pinned dataplane
//! workloads usually want hugepage-backed memory, so a host with none free
//! is worth a warning, but nothing in the allocation depends on it.

use std::path::Path;

/// Warn when the host reports no free hugepages.
pub fn check_hugepages<P: AsRef<Path>>(root: P) {
    let path = root.as_ref().join("proc/meminfo");
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(_) => {
            tracing::info!(
                path = %path.display(),
                "meminfo not found, skipping hugepage check"
            );
            return;
        }
    };
    match free_hugepages(&content) {
        Some(0) => tracing::warn!("No hugepages are free"),
        Some(free) => tracing::debug!(free, "Hugepages available"),
        None => {}
    }
}

fn free_hugepages(meminfo: &str) -> Option<u64> {
    let line = meminfo
        .lines()
        .find(|l| l.starts_with("HugePages_Free"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}
