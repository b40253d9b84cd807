// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Core-to-pool allocation.
//!
//! Pure decision logic: the isolation policy check and the pool assigner
//! compute over a [`Platform`] snapshot and return structured results
//! (warnings, committed cores) without touching the logger or the
//! filesystem. Rendering and persistence happen in [`crate::init`] and
//! [`crate::store`].

use std::collections::BTreeMap;
use std::fmt;

use crate::error::AllocationError;
use crate::topology::{Core, CoreId, Platform};

/// The three pools formed by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PoolName {
    /// Exclusive low-latency pool; persisted as one cpu-list per core.
    Dataplane,
    /// Shared pool for control tasks; one cpu-list per socket.
    Controlplane,
    /// Shared catch-all absorbing every core the other pools left free.
    Infra,
}

impl PoolName {
    /// Name as persisted in the registry.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dataplane => "dataplane",
            Self::Controlplane => "controlplane",
            Self::Infra => "infra",
        }
    }

    /// Whether this pool persists one cpu-list per physical core.
    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Dataplane)
    }
}

impl fmt::Display for PoolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal observation from the isolation policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationWarning {
    /// Some but not all threads of this core are isolated.
    PartiallyIsolatedCore(CoreId),
    /// This many isolated cores will not be used by the request.
    UnusedIsolatedCores(usize),
}

/// Outcome of validating the isolated-core inventory against a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolationCheck {
    /// Whether pools should draw from the isolated core list. False when
    /// the platform has no fully isolated core, in which case selection
    /// falls back to the full core list.
    pub use_isolated: bool,
    /// Observations for the reporting layer to render.
    pub warnings: Vec<IsolationWarning>,
}

/// Validate that `requested` cores can come out of the isolated inventory.
///
/// Partially isolated cores are reported but never fatal; they count as not
/// isolated. A platform with isolated cores but fewer than `requested` is
/// refused before anything is assigned or persisted.
pub fn check_isolation(
    platform: &Platform,
    requested: usize,
) -> Result<IsolationCheck, AllocationError> {
    let mut warnings = Vec::new();
    for socket in platform.sockets() {
        for core in &socket.cores {
            if core.has_isolated_threads() && !core.is_isolated() {
                warnings.push(IsolationWarning::PartiallyIsolatedCore(core.id));
            }
        }
    }

    let isolated = platform.num_isolated_cores();
    if isolated == 0 {
        return Ok(IsolationCheck {
            use_isolated: false,
            warnings,
        });
    }
    if isolated < requested {
        return Err(AllocationError::InsufficientIsolatedCores {
            isolated,
            requested,
        });
    }
    if isolated > requested {
        warnings.push(IsolationWarning::UnusedIsolatedCores(isolated - requested));
    }
    Ok(IsolationCheck {
        use_isolated: true,
        warnings,
    })
}

/// Core-to-pool assignments for one run.
///
/// Built by successive [`Allocation::assign`] calls and then read by the
/// pool writer. Later calls observe earlier commitments through the map,
/// so the fixed call order (dataplane, controlplane, infra) is part of the
/// contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allocation {
    assigned: BTreeMap<CoreId, PoolName>,
}

impl Allocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit cores from `candidates` to `pool`, first fit in candidate
    /// order, skipping cores an earlier call already claimed.
    ///
    /// `count` limits the commitment; `None` commits every free candidate.
    /// Returns the committed core ids in commitment order.
    pub fn assign(
        &mut self,
        candidates: &[&Core],
        pool: PoolName,
        count: Option<usize>,
    ) -> Result<Vec<CoreId>, AllocationError> {
        let free: Vec<&Core> = candidates
            .iter()
            .filter(|c| !self.assigned.contains_key(&c.id))
            .copied()
            .collect();
        if free.is_empty() {
            return Err(AllocationError::NoFreeCores {
                pool: pool.to_string(),
            });
        }
        let take = match count {
            Some(requested) if free.len() < requested => {
                return Err(AllocationError::InsufficientCores {
                    pool: pool.to_string(),
                    requested,
                    available: free.len(),
                });
            }
            Some(requested) => requested,
            None => free.len(),
        };

        let mut committed = Vec::with_capacity(take);
        for core in free.into_iter().take(take) {
            self.assigned.insert(core.id, pool);
            committed.push(core.id);
        }
        Ok(committed)
    }

    /// Pool the core was committed to, if any.
    pub fn pool_of(&self, core: CoreId) -> Option<PoolName> {
        self.assigned.get(&core).copied()
    }

    /// Cores committed to `pool`, in id order.
    pub fn cores_in(&self, pool: PoolName) -> Vec<CoreId> {
        self.assigned
            .iter()
            .filter(|(_, p)| **p == pool)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Number of committed cores across all pools.
    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{AllocationMode, HwThread, Socket};

    fn platform(cores_per_socket: usize, sockets: usize, isolated: &[(usize, usize)]) -> Platform {
        let mut out = Vec::new();
        for socket_id in 0..sockets {
            let cores = (0..cores_per_socket)
                .map(|core_id| {
                    let iso = isolated.contains(&(socket_id, core_id));
                    let base = socket_id * cores_per_socket + core_id;
                    Core {
                        id: CoreId {
                            socket: socket_id,
                            core: core_id,
                        },
                        threads: vec![
                            HwThread {
                                id: base,
                                isolated: iso,
                            },
                            HwThread {
                                id: base + sockets * cores_per_socket,
                                isolated: iso,
                            },
                        ],
                    }
                })
                .collect();
            out.push(Socket {
                id: socket_id,
                cores,
            });
        }
        Platform::new(out)
    }

    fn core_id(socket: usize, core: usize) -> CoreId {
        CoreId { socket, core }
    }

    #[test]
    fn test_pool_name_strings() {
        assert_eq!(PoolName::Dataplane.to_string(), "dataplane");
        assert_eq!(PoolName::Controlplane.to_string(), "controlplane");
        assert_eq!(PoolName::Infra.to_string(), "infra");
        assert!(PoolName::Dataplane.is_exclusive());
        assert!(!PoolName::Controlplane.is_exclusive());
        assert!(!PoolName::Infra.is_exclusive());
    }

    #[test]
    fn test_check_isolation_no_isolated_cores() {
        let platform = platform(4, 1, &[]);
        let check = check_isolation(&platform, 2).unwrap();
        assert!(!check.use_isolated);
        assert!(check.warnings.is_empty());
    }

    #[test]
    fn test_check_isolation_insufficient() {
        // 3 isolated cores cannot satisfy a request for 4.
        let platform = platform(4, 1, &[(0, 0), (0, 1), (0, 2)]);
        let err = check_isolation(&platform, 4).unwrap_err();
        assert!(matches!(
            err,
            AllocationError::InsufficientIsolatedCores {
                isolated: 3,
                requested: 4
            }
        ));
    }

    #[test]
    fn test_check_isolation_surplus_warns() {
        let platform = platform(4, 1, &[(0, 0), (0, 1), (0, 2)]);
        let check = check_isolation(&platform, 2).unwrap();
        assert!(check.use_isolated);
        assert_eq!(
            check.warnings,
            vec![IsolationWarning::UnusedIsolatedCores(1)]
        );
    }

    #[test]
    fn test_check_isolation_reports_partial_cores() {
        let mut sockets = vec![Socket {
            id: 0,
            cores: vec![
                Core {
                    id: core_id(0, 0),
                    threads: vec![
                        HwThread {
                            id: 0,
                            isolated: true,
                        },
                        HwThread {
                            id: 2,
                            isolated: false,
                        },
                    ],
                },
                Core {
                    id: core_id(0, 1),
                    threads: vec![
                        HwThread {
                            id: 1,
                            isolated: true,
                        },
                        HwThread {
                            id: 3,
                            isolated: true,
                        },
                    ],
                },
            ],
        }];
        sockets[0].cores.push(Core {
            id: core_id(0, 2),
            threads: vec![HwThread {
                id: 4,
                isolated: false,
            }],
        });
        let platform = Platform::new(sockets);

        let check = check_isolation(&platform, 1).unwrap();
        assert!(check.use_isolated);
        assert_eq!(
            check.warnings,
            vec![IsolationWarning::PartiallyIsolatedCore(core_id(0, 0))]
        );
    }

    #[test]
    fn test_assign_first_fit() {
        let platform = platform(4, 1, &[]);
        let mut allocation = Allocation::new();
        let candidates = platform.cores(AllocationMode::Packed);

        let committed = allocation
            .assign(&candidates, PoolName::Dataplane, Some(2))
            .unwrap();
        assert_eq!(committed, vec![core_id(0, 0), core_id(0, 1)]);
        assert_eq!(allocation.pool_of(core_id(0, 0)), Some(PoolName::Dataplane));
        assert_eq!(allocation.pool_of(core_id(0, 2)), None);
    }

    #[test]
    fn test_assign_skips_claimed_cores() {
        let platform = platform(4, 1, &[]);
        let mut allocation = Allocation::new();
        let candidates = platform.cores(AllocationMode::Packed);

        allocation
            .assign(&candidates, PoolName::Dataplane, Some(1))
            .unwrap();
        let committed = allocation
            .assign(&candidates, PoolName::Controlplane, Some(2))
            .unwrap();
        assert_eq!(committed, vec![core_id(0, 1), core_id(0, 2)]);
    }

    #[test]
    fn test_assign_no_count_absorbs_free() {
        let platform = platform(4, 2, &[]);
        let mut allocation = Allocation::new();
        let candidates = platform.cores(AllocationMode::Packed);

        allocation
            .assign(&candidates, PoolName::Dataplane, Some(3))
            .unwrap();
        let committed = allocation
            .assign(&candidates, PoolName::Infra, None)
            .unwrap();
        assert_eq!(committed.len(), 5);
        assert_eq!(allocation.len(), 8);
    }

    #[test]
    fn test_assign_no_free_cores() {
        let platform = platform(2, 1, &[]);
        let mut allocation = Allocation::new();
        let candidates = platform.cores(AllocationMode::Packed);

        allocation
            .assign(&candidates, PoolName::Dataplane, None)
            .unwrap();
        let err = allocation
            .assign(&candidates, PoolName::Infra, None)
            .unwrap_err();
        assert!(matches!(err, AllocationError::NoFreeCores { .. }));
    }

    #[test]
    fn test_assign_insufficient_cores() {
        let platform = platform(2, 1, &[]);
        let mut allocation = Allocation::new();
        let candidates = platform.cores(AllocationMode::Packed);

        let err = allocation
            .assign(&candidates, PoolName::Dataplane, Some(3))
            .unwrap_err();
        match err {
            AllocationError::InsufficientCores {
                pool,
                requested,
                available,
            } => {
                assert_eq!(pool, "dataplane");
                assert_eq!(requested, 3);
                assert_eq!(available, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_assign_zero_count_commits_nothing() {
        let platform = platform(2, 1, &[]);
        let mut allocation = Allocation::new();
        let candidates = platform.cores(AllocationMode::Packed);

        let committed = allocation
            .assign(&candidates, PoolName::Controlplane, Some(0))
            .unwrap();
        assert!(committed.is_empty());
        assert!(allocation.is_empty());
    }

    #[test]
    fn test_assign_follows_spread_order() {
        let platform = platform(2, 2, &[]);
        let mut allocation = Allocation::new();
        let candidates = platform.cores(AllocationMode::Spread);

        let committed = allocation
            .assign(&candidates, PoolName::Dataplane, Some(2))
            .unwrap();
        // One core from each socket before a second from either.
        assert_eq!(committed, vec![core_id(0, 0), core_id(1, 0)]);
    }

    #[test]
    fn test_no_double_assignment() {
        let platform = platform(4, 2, &[(0, 0), (0, 1), (1, 0)]);
        let mut allocation = Allocation::new();

        let isolated = platform.isolated_cores(AllocationMode::Packed);
        allocation
            .assign(&isolated, PoolName::Dataplane, Some(2))
            .unwrap();
        allocation
            .assign(&isolated, PoolName::Controlplane, Some(1))
            .unwrap();
        allocation
            .assign(&platform.cores(AllocationMode::Packed), PoolName::Infra, None)
            .unwrap();

        // Every core claimed exactly once across the three pools.
        assert_eq!(allocation.len(), platform.num_cores());
        let mut seen = std::collections::BTreeSet::new();
        for pool in [PoolName::Dataplane, PoolName::Controlplane, PoolName::Infra] {
            for core in allocation.cores_in(pool) {
                assert!(seen.insert(core), "core {core} in two pools");
            }
        }
    }
}
