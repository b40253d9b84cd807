// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! CPU topology snapshot.
//!
//! Discovery reads the kernel's sysfs view of the machine once and builds an
//! immutable hierarchy of sockets, physical cores, and hardware threads,
//! each thread flagged with whether the kernel keeps it out of the general
//! scheduler (`isolcpus` and friends). Nothing here tracks pool membership;
//! allocation state lives in [`crate::allocation`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};

/// Sysfs directory describing cpus, relative to the filesystem root.
const SYSFS_CPU_DIR: &str = "sys/devices/system/cpu";

/// Ordering policy used when picking cores for a pool.
///
/// - `Packed`: fill sockets in ascending id order, cores ascending within
///   each socket (default).
/// - `Spread`: round-robin across sockets, cores ascending within each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationMode {
    /// Fill one socket before moving to the next.
    Packed,
    /// Alternate across sockets.
    Spread,
}

impl Default for AllocationMode {
    fn default() -> Self {
        Self::Packed
    }
}

impl fmt::Display for AllocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Packed => write!(f, "packed"),
            Self::Spread => write!(f, "spread"),
        }
    }
}

impl FromStr for AllocationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "packed" => Ok(Self::Packed),
            "spread" => Ok(Self::Spread),
            _ => Err(anyhow::anyhow!(
                "Invalid allocation mode: '{}'. Valid options are: 'packed', 'spread'",
                s
            )),
        }
    }
}

impl AllocationMode {
    /// Check if this mode is packed
    pub fn is_packed(&self) -> bool {
        matches!(self, Self::Packed)
    }

    /// Check if this mode is spread
    pub fn is_spread(&self) -> bool {
        matches!(self, Self::Spread)
    }
}

/// Stable identity of a physical core.
///
/// Sysfs `core_id` values repeat across packages, so the socket id is part
/// of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreId {
    /// Physical package id.
    pub socket: usize,
    /// Core id within the package.
    pub core: usize,
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.socket, self.core)
    }
}

/// A schedulable CPU context as exposed by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwThread {
    /// Kernel cpu id (`cpuN` in sysfs).
    pub id: usize,
    /// Whether the kernel keeps this cpu out of the general scheduler.
    pub isolated: bool,
}

/// A physical core and the SMT siblings it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Core {
    pub id: CoreId,
    /// Sibling threads in ascending cpu-id order. Never empty.
    pub threads: Vec<HwThread>,
}

impl Core {
    /// True when every sibling thread is isolated.
    pub fn is_isolated(&self) -> bool {
        self.threads.iter().all(|t| t.isolated)
    }

    /// True when at least one sibling thread is isolated.
    ///
    /// A core where this holds but [`Core::is_isolated`] does not is
    /// partially isolated, which reflects isolation applied at thread
    /// rather than core granularity on the host.
    pub fn has_isolated_threads(&self) -> bool {
        self.threads.iter().any(|t| t.isolated)
    }

    /// Sibling cpu ids in discovery order.
    pub fn thread_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.threads.iter().map(|t| t.id)
    }
}

/// A CPU package and the cores it owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socket {
    /// Physical package id.
    pub id: usize,
    /// Cores in ascending core-id order. Never empty.
    pub cores: Vec<Core>,
}

/// Immutable snapshot of the host CPU hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    sockets: Vec<Socket>,
}

impl Platform {
    /// Build a snapshot from per-socket data.
    ///
    /// Sockets, cores, and sibling threads are re-sorted into ascending id
    /// order so every accessor below sees one canonical ordering.
    pub fn new(mut sockets: Vec<Socket>) -> Self {
        for socket in &mut sockets {
            for core in &mut socket.cores {
                core.threads.sort_by_key(|t| t.id);
            }
            socket.cores.sort_by_key(|c| c.id);
        }
        sockets.sort_by_key(|s| s.id);
        Self { sockets }
    }

    /// Sockets in ascending id order.
    pub fn sockets(&self) -> &[Socket] {
        &self.sockets
    }

    pub fn num_sockets(&self) -> usize {
        self.sockets.len()
    }

    pub fn num_cores(&self) -> usize {
        self.sockets.iter().map(|s| s.cores.len()).sum()
    }

    pub fn num_threads(&self) -> usize {
        self.all_cores().map(|c| c.threads.len()).sum()
    }

    /// True when at least one core is fully isolated.
    pub fn has_isolated_cores(&self) -> bool {
        self.all_cores().any(Core::is_isolated)
    }

    /// Number of fully isolated cores.
    pub fn num_isolated_cores(&self) -> usize {
        self.all_cores().filter(|c| c.is_isolated()).count()
    }

    /// All physical cores, ordered per `mode`.
    pub fn cores(&self, mode: AllocationMode) -> Vec<&Core> {
        self.ordered(mode, |_| true)
    }

    /// Fully isolated cores, ordered per `mode`.
    pub fn isolated_cores(&self, mode: AllocationMode) -> Vec<&Core> {
        self.ordered(mode, Core::is_isolated)
    }

    /// Cores with no isolated thread, or every core when the platform has
    /// none isolated.
    pub fn shared_cores(&self) -> Vec<&Core> {
        if self.all_cores().any(Core::has_isolated_threads) {
            self.ordered(AllocationMode::Packed, |c| !c.has_isolated_threads())
        } else {
            self.cores(AllocationMode::Packed)
        }
    }

    fn all_cores(&self) -> impl Iterator<Item = &Core> {
        self.sockets.iter().flat_map(|s| s.cores.iter())
    }

    fn ordered<F>(&self, mode: AllocationMode, keep: F) -> Vec<&Core>
    where
        F: Fn(&Core) -> bool,
    {
        match mode {
            AllocationMode::Packed => self.all_cores().filter(|c| keep(c)).collect(),
            AllocationMode::Spread => {
                let per_socket: Vec<Vec<&Core>> = self
                    .sockets
                    .iter()
                    .map(|s| s.cores.iter().filter(|c| keep(c)).collect())
                    .collect();
                let deepest = per_socket.iter().map(Vec::len).max().unwrap_or(0);
                let mut out = Vec::new();
                for rank in 0..deepest {
                    for cores in &per_socket {
                        if let Some(core) = cores.get(rank) {
                            out.push(*core);
                        }
                    }
                }
                out
            }
        }
    }
}

/// Discover the host topology from `/sys`.
pub fn discover() -> Result<Platform> {
    discover_with_root("/")
}

/// Discover a topology from a sysfs tree rooted at `root`.
///
/// Reads `online` (falling back to `present`), `isolated`, and each cpu's
/// `topology/{physical_package_id,core_id}`. A missing or empty `isolated`
/// file means no cpu is isolated.
pub fn discover_with_root<P: AsRef<Path>>(root: P) -> Result<Platform> {
    let cpu_dir = root.as_ref().join(SYSFS_CPU_DIR);

    let online = read_id_list(&cpu_dir.join("online"))
        .or_else(|_| read_id_list(&cpu_dir.join("present")))
        .with_context(|| format!("no readable cpu list under {}", cpu_dir.display()))?;

    let isolated: BTreeSet<usize> = match std::fs::read_to_string(cpu_dir.join("isolated")) {
        Ok(raw) => parse_cpu_list(raw.trim())?.into_iter().collect(),
        Err(_) => BTreeSet::new(),
    };

    // socket id -> core id -> sibling threads
    let mut packages: BTreeMap<usize, BTreeMap<usize, Vec<HwThread>>> = BTreeMap::new();
    for cpu in online {
        let topo_dir = cpu_dir.join(format!("cpu{cpu}/topology"));
        let socket = read_id(&topo_dir.join("physical_package_id"))?;
        let core = read_id(&topo_dir.join("core_id"))?;
        packages
            .entry(socket)
            .or_default()
            .entry(core)
            .or_default()
            .push(HwThread {
                id: cpu,
                isolated: isolated.contains(&cpu),
            });
    }

    let sockets = packages
        .into_iter()
        .map(|(socket_id, cores)| Socket {
            id: socket_id,
            cores: cores
                .into_iter()
                .map(|(core_id, threads)| Core {
                    id: CoreId {
                        socket: socket_id,
                        core: core_id,
                    },
                    threads,
                })
                .collect(),
        })
        .collect();

    Ok(Platform::new(sockets))
}

/// Parse the kernel's cpu-list format, e.g. `0-3,8,10-11`.
///
/// An empty string parses to an empty list.
pub fn parse_cpu_list(list: &str) -> Result<Vec<usize>> {
    let mut ids = Vec::new();
    if list.is_empty() {
        return Ok(ids);
    }
    for part in list.split(',') {
        let part = part.trim();
        match part.split_once('-') {
            Some((start, stop)) => {
                let start: usize = start
                    .parse()
                    .with_context(|| format!("bad cpu range start in '{part}'"))?;
                let stop: usize = stop
                    .parse()
                    .with_context(|| format!("bad cpu range end in '{part}'"))?;
                ids.extend(start..=stop);
            }
            None => ids.push(
                part.parse()
                    .with_context(|| format!("bad cpu id '{part}'"))?,
            ),
        }
    }
    Ok(ids)
}

fn read_id(path: &Path) -> Result<usize> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    raw.trim()
        .parse()
        .with_context(|| format!("parsing '{}' from {}", raw.trim(), path.display()))
}

fn read_id_list(path: &Path) -> Result<Vec<usize>> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_cpu_list(raw.trim())
}
