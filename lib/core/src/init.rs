// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Pool formation flow.
//!
//! First run: discover the topology, validate the isolated-core inventory,
//! commit cores to the dataplane, controlplane, and infra pools, and
//! persist the registry under one locked write scope. When the registry
//! already exists the run degrades to reconciliation: the persisted pool
//! sizes are compared against the request and nothing is mutated.
//!
//! All fatal conditions surface as errors here; deciding the process exit
//! status is the binary's job.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::allocation::{Allocation, IsolationWarning, PoolName, check_isolation};
use crate::error::{AllocationError, PoolMismatch, StoreError};
use crate::hugepages::check_hugepages;
use crate::store::Config;
use crate::topology::{self, AllocationMode, Core, CoreId, Platform};

/// Operator request for one run.
#[derive(Debug, Clone)]
pub struct InitRequest {
    /// Directory holding the pool registry.
    pub conf_dir: PathBuf,
    /// Physical cores for the exclusive dataplane pool.
    pub dataplane_cores: usize,
    /// Physical cores for the shared controlplane pool.
    pub controlplane_cores: usize,
    /// Selection order for dataplane cores.
    pub dataplane_mode: AllocationMode,
    /// Selection order for controlplane cores.
    pub controlplane_mode: AllocationMode,
}

/// Allocate pools and persist them, or reconcile against an existing
/// registry.
pub fn run(request: &InitRequest) -> Result<()> {
    run_with_root(request, "/")
}

/// Same as [`run`] but reads `sys` and `proc` under `root`.
pub fn run_with_root<P: AsRef<Path>>(request: &InitRequest, root: P) -> Result<()> {
    let root = root.as_ref();
    check_hugepages(root);

    tracing::info!(
        conf_dir = %request.conf_dir.display(),
        dataplane_cores = request.dataplane_cores,
        controlplane_cores = request.controlplane_cores,
        dataplane_mode = %request.dataplane_mode,
        controlplane_mode = %request.controlplane_mode,
        "Initializing pool registry"
    );

    let mut config = match Config::create(&request.conf_dir) {
        Ok(config) => config,
        Err(StoreError::AlreadyExists(_)) => {
            tracing::info!("Registry already exists, checking persisted allocation");
            return reconcile(request);
        }
        Err(err) => return Err(err.into()),
    };

    let platform = topology::discover_with_root(root).context("discovering cpu topology")?;
    tracing::info!(
        sockets = platform.num_sockets(),
        cores = platform.num_cores(),
        threads = platform.num_threads(),
        "Discovered topology"
    );

    let requested = request.dataplane_cores + request.controlplane_cores;
    let check = check_isolation(&platform, requested)?;
    report_warnings(&check.warnings);

    if check.use_isolated {
        let isolated: Vec<String> = platform
            .isolated_cores(AllocationMode::Packed)
            .iter()
            .map(|c| c.id.to_string())
            .collect();
        tracing::info!(
            isolated = %isolated.join(","),
            "Drawing dataplane and controlplane from isolated cores"
        );
    } else {
        tracing::info!(
            "No isolated physical cores detected, allocating dataplane and controlplane \
             from the full core list"
        );
    }

    let allocation = allocate(&platform, request, check.use_isolated)?;

    let lock = config.lock()?;
    write_exclusive_pool(PoolName::Dataplane, &platform, &allocation, &mut config);
    write_shared_pool(PoolName::Controlplane, &platform, &allocation, &mut config);
    write_shared_pool(PoolName::Infra, &platform, &allocation, &mut config);
    config.save(&lock).context("persisting pool registry")?;
    drop(lock);

    Ok(())
}

/// Validate an existing registry against the requested counts.
///
/// Both pool comparisons run before the verdict so the operator sees every
/// mismatch at once. A matching registry is a silent success; nothing is
/// ever mutated on this path.
pub fn reconcile(request: &InitRequest) -> Result<()> {
    let config = Config::open(&request.conf_dir)?;

    let mut mismatches = Vec::new();
    for (pool, requested) in [
        (PoolName::Dataplane, request.dataplane_cores),
        (PoolName::Controlplane, request.controlplane_cores),
    ] {
        let persisted = config.pool(pool.as_str())?.cpu_lists().len();
        tracing::debug!(pool = %pool, requested, persisted, "Comparing persisted pool size");
        if persisted != requested {
            tracing::error!(
                pool = %pool,
                requested,
                persisted,
                "Persisted pool does not match the request"
            );
            mismatches.push(PoolMismatch {
                pool: pool.to_string(),
                requested,
                persisted,
            });
        }
    }

    if !mismatches.is_empty() {
        return Err(AllocationError::ReconciliationMismatch(mismatches).into());
    }
    tracing::info!("Existing allocation matches the request");
    Ok(())
}

/// Commit cores to the three pools in their fixed order.
///
/// Dataplane and controlplane draw from the isolated core list when
/// `use_isolated` holds, otherwise from the full list. Infra always absorbs
/// whatever the first two left free, isolated or not, so every core ends up
/// in exactly one pool.
fn allocate(
    platform: &Platform,
    request: &InitRequest,
    use_isolated: bool,
) -> Result<Allocation, AllocationError> {
    let (dataplane, controlplane) = if use_isolated {
        (
            platform.isolated_cores(request.dataplane_mode),
            platform.isolated_cores(request.controlplane_mode),
        )
    } else {
        (
            platform.cores(request.dataplane_mode),
            platform.cores(request.controlplane_mode),
        )
    };

    let mut allocation = Allocation::new();
    let committed = allocation.assign(
        &dataplane,
        PoolName::Dataplane,
        Some(request.dataplane_cores),
    )?;
    report_assignment(PoolName::Dataplane, &committed);

    let committed = allocation.assign(
        &controlplane,
        PoolName::Controlplane,
        Some(request.controlplane_cores),
    )?;
    report_assignment(PoolName::Controlplane, &committed);

    let committed = allocation.assign(
        &platform.cores(AllocationMode::Packed),
        PoolName::Infra,
        None,
    )?;
    report_assignment(PoolName::Infra, &committed);

    Ok(allocation)
}

fn report_warnings(warnings: &[IsolationWarning]) {
    for warning in warnings.iter().copied() {
        match warning {
            IsolationWarning::PartiallyIsolatedCore(core) => {
                tracing::warn!(
                    socket = core.socket,
                    core = core.core,
                    "Physical core is partially isolated"
                );
            }
            IsolationWarning::UnusedIsolatedCores(unused) => {
                tracing::warn!(
                    unused,
                    "Not all isolated cores will be used by dataplane and controlplane"
                );
            }
        }
    }
}

fn report_assignment(pool: PoolName, committed: &[CoreId]) {
    for core in committed {
        tracing::info!(
            pool = %pool,
            socket = core.socket,
            core = core.core,
            "Assigned physical core"
        );
    }
}

/// Persist an exclusive pool: one cpu-list per assigned core, so a
/// downstream consumer can treat each list as a whole physical core.
fn write_exclusive_pool(
    pool_name: PoolName,
    platform: &Platform,
    allocation: &Allocation,
    config: &mut Config,
) {
    tracing::info!(pool = %pool_name, "Adding pool");
    let pool = config.add_pool(pool_name.as_str(), pool_name.is_exclusive());

    for socket in platform.sockets() {
        let cores: Vec<&Core> = socket
            .cores
            .iter()
            .filter(|c| allocation.pool_of(c.id) == Some(pool_name))
            .collect();
        if cores.is_empty() {
            continue;
        }
        pool.add_socket(socket.id);
        for core in cores {
            let cpus = join_ids(core.thread_ids());
            pool.add_cpu_list(socket.id, &cpus);
            tracing::info!(pool = %pool_name, socket = socket.id, cpus = %cpus, "Adding cpu list");
        }
    }
}

/// Persist a shared pool: all assigned threads on a socket aggregate into
/// one cpu-list. Sockets contributing nothing are skipped entirely.
fn write_shared_pool(
    pool_name: PoolName,
    platform: &Platform,
    allocation: &Allocation,
    config: &mut Config,
) {
    tracing::info!(pool = %pool_name, "Adding pool");
    let pool = config.add_pool(pool_name.as_str(), pool_name.is_exclusive());

    for socket in platform.sockets() {
        let cpu_ids: Vec<usize> = socket
            .cores
            .iter()
            .filter(|c| allocation.pool_of(c.id) == Some(pool_name))
            .flat_map(|c| c.thread_ids())
            .collect();
        if cpu_ids.is_empty() {
            continue;
        }
        pool.add_socket(socket.id);
        let cpus = join_ids(cpu_ids.into_iter());
        pool.add_cpu_list(socket.id, &cpus);
        tracing::info!(pool = %pool_name, socket = socket.id, cpus = %cpus, "Adding cpu list");
    }
}

fn join_ids(ids: impl Iterator<Item = usize>) -> String {
    ids.map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{HwThread, Socket};

    fn request(dataplane: usize, controlplane: usize) -> InitRequest {
        InitRequest {
            conf_dir: PathBuf::from("/unused"),
            dataplane_cores: dataplane,
            controlplane_cores: controlplane,
            dataplane_mode: AllocationMode::Packed,
            controlplane_mode: AllocationMode::Packed,
        }
    }

    /// One socket, four cores, two threads each (siblings offset by 4).
    /// Cores listed in `isolated` are fully isolated.
    fn one_socket_platform(isolated: &[usize]) -> Platform {
        let cores = (0..4)
            .map(|core_id| Core {
                id: CoreId {
                    socket: 0,
                    core: core_id,
                },
                threads: vec![
                    HwThread {
                        id: core_id,
                        isolated: isolated.contains(&core_id),
                    },
                    HwThread {
                        id: core_id + 4,
                        isolated: isolated.contains(&core_id),
                    },
                ],
            })
            .collect();
        Platform::new(vec![Socket { id: 0, cores }])
    }

    #[test]
    fn test_allocate_covers_every_core() {
        // Three isolated cores, two consumed; the leftover isolated core
        // still lands in infra.
        let platform = one_socket_platform(&[0, 1, 2]);
        let allocation = allocate(&platform, &request(1, 1), true).unwrap();

        assert_eq!(allocation.len(), platform.num_cores());
        assert_eq!(
            allocation.cores_in(PoolName::Dataplane),
            vec![CoreId { socket: 0, core: 0 }]
        );
        assert_eq!(
            allocation.cores_in(PoolName::Controlplane),
            vec![CoreId { socket: 0, core: 1 }]
        );
        assert_eq!(
            allocation.cores_in(PoolName::Infra),
            vec![
                CoreId { socket: 0, core: 2 },
                CoreId { socket: 0, core: 3 }
            ]
        );
    }

    #[test]
    fn test_allocate_fallback_uses_full_list() {
        let platform = one_socket_platform(&[]);
        let allocation = allocate(&platform, &request(2, 1), false).unwrap();

        assert_eq!(
            allocation.cores_in(PoolName::Dataplane),
            vec![
                CoreId { socket: 0, core: 0 },
                CoreId { socket: 0, core: 1 }
            ]
        );
        assert_eq!(
            allocation.cores_in(PoolName::Controlplane),
            vec![CoreId { socket: 0, core: 2 }]
        );
        assert_eq!(
            allocation.cores_in(PoolName::Infra),
            vec![CoreId { socket: 0, core: 3 }]
        );
    }

    #[test]
    fn test_allocate_insufficient_free_for_controlplane() {
        let platform = one_socket_platform(&[]);
        let err = allocate(&platform, &request(4, 1), false).unwrap_err();
        assert!(matches!(err, AllocationError::NoFreeCores { .. }));
    }

    #[test]
    fn test_writers_skip_sockets_without_members() {
        // Two sockets; everything assigned on socket 0 only.
        let sockets = (0..2)
            .map(|socket_id| Socket {
                id: socket_id,
                cores: vec![Core {
                    id: CoreId {
                        socket: socket_id,
                        core: 0,
                    },
                    threads: vec![HwThread {
                        id: socket_id,
                        isolated: false,
                    }],
                }],
            })
            .collect();
        let platform = Platform::new(sockets);

        let mut allocation = Allocation::new();
        let socket0 = [&platform.sockets()[0].cores[0]];
        allocation
            .assign(&socket0, PoolName::Controlplane, Some(1))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::create(dir.path()).unwrap();
        write_shared_pool(PoolName::Controlplane, &platform, &allocation, &mut config);

        let pool = config.pool("controlplane").unwrap();
        assert_eq!(pool.sockets(), &[0]);
        assert_eq!(pool.cpu_lists().len(), 1);
        assert_eq!(pool.cpu_lists()[0].socket, 0);
    }

    #[test]
    fn test_exclusive_writer_one_list_per_core() {
        let platform = one_socket_platform(&[]);
        let mut allocation = Allocation::new();
        allocation
            .assign(
                &platform.cores(AllocationMode::Packed),
                PoolName::Dataplane,
                Some(2),
            )
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::create(dir.path()).unwrap();
        write_exclusive_pool(PoolName::Dataplane, &platform, &allocation, &mut config);

        let pool = config.pool("dataplane").unwrap();
        assert!(pool.is_exclusive());
        assert_eq!(pool.cpu_lists().len(), 2);
        assert_eq!(pool.cpu_lists()[0].cpus, "0,4");
        assert_eq!(pool.cpu_lists()[1].cpus, "1,5");
    }

    #[test]
    fn test_shared_writer_aggregates_socket() {
        let platform = one_socket_platform(&[]);
        let mut allocation = Allocation::new();
        allocation
            .assign(
                &platform.cores(AllocationMode::Packed),
                PoolName::Infra,
                None,
            )
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::create(dir.path()).unwrap();
        write_shared_pool(PoolName::Infra, &platform, &allocation, &mut config);

        let pool = config.pool("infra").unwrap();
        assert!(!pool.is_exclusive());
        assert_eq!(pool.cpu_lists().len(), 1);
        assert_eq!(pool.cpu_lists()[0].cpus, "0,4,1,5,2,6,3,7");
    }
}
