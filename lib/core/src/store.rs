// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Persisted pool registry.
//!
//! The registry is a single JSON document, `pools.json`, inside the
//! operator-supplied configuration directory. Mutual exclusion across
//! processes uses an advisory lock on a sibling lock file: writers hold it
//! exclusively for the whole write phase, readers take it shared while
//! loading. Saves stage the new document in a temp file and rename it over
//! the old one, so a reader never observes a torn or half-written registry.
//!
//! # File Format
//!
//! ```json
//! {
//!   "pools": {
//!     "dataplane": {
//!       "name": "dataplane",
//!       "exclusive": true,
//!       "sockets": [0],
//!       "cpu_lists": [
//!         { "socket": 0, "cpus": "0,4" }
//!       ]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Registry document name inside the configuration directory.
const REGISTRY_FILE: &str = "pools.json";

/// Lock file name inside the configuration directory.
const LOCK_FILE: &str = ".lock";

/// One persisted cpu-list record: a comma-joined run of hardware-thread
/// ids living on one socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuList {
    pub socket: usize,
    pub cpus: String,
}

/// A named pool and its persisted cpu-list records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    name: String,
    exclusive: bool,
    sockets: Vec<usize>,
    cpu_lists: Vec<CpuList>,
}

impl Pool {
    fn new(name: &str, exclusive: bool) -> Self {
        Self {
            name: name.to_string(),
            exclusive,
            sockets: Vec::new(),
            cpu_lists: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Register a socket with this pool. Idempotent.
    pub fn add_socket(&mut self, socket: usize) {
        if !self.sockets.contains(&socket) {
            self.sockets.push(socket);
        }
    }

    /// Append one cpu-list record for `socket`.
    pub fn add_cpu_list(&mut self, socket: usize, cpus: &str) {
        self.cpu_lists.push(CpuList {
            socket,
            cpus: cpus.to_string(),
        });
    }

    /// Sockets in registration order.
    pub fn sockets(&self) -> &[usize] {
        &self.sockets
    }

    /// Cpu-list records in append order.
    pub fn cpu_lists(&self) -> &[CpuList] {
        &self.cpu_lists
    }
}

/// Serializable registry document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Registry {
    pools: BTreeMap<String, Pool>,
}

/// Exclusive write scope over a registry.
///
/// Holds the advisory lock; it releases when the guard (and its file
/// handle) drops, on every exit path.
#[derive(Debug)]
pub struct ConfigLock {
    _file: std::fs::File,
}

/// Pool registry bound to a configuration directory.
#[derive(Debug)]
pub struct Config {
    dir: PathBuf,
    registry_path: PathBuf,
    lock_path: PathBuf,
    registry: Registry,
}

impl Config {
    /// Create a fresh registry for `dir`.
    ///
    /// Fails with [`StoreError::AlreadyExists`] when the directory already
    /// holds a registry document. The directory itself is created when
    /// missing. Nothing reaches disk until [`Config::save`].
    pub fn create<P: Into<PathBuf>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.into();
        let registry_path = dir.join(REGISTRY_FILE);
        if registry_path.exists() {
            return Err(StoreError::AlreadyExists(dir));
        }
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            lock_path: dir.join(LOCK_FILE),
            registry_path,
            dir,
            registry: Registry::default(),
        })
    }

    /// Open an existing registry, loading the document under a shared lock.
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.into();
        let registry_path = dir.join(REGISTRY_FILE);
        if !registry_path.exists() {
            return Err(StoreError::NotFound(dir));
        }
        let lock_path = dir.join(LOCK_FILE);

        let lock_file = open_lock_file(&lock_path)?;
        lock_file.lock_shared()?;
        let content = std::fs::read_to_string(&registry_path)?;
        // Lock is released when lock_file is dropped
        drop(lock_file);

        let registry: Registry = serde_json::from_str(&content)?;
        Ok(Self {
            dir,
            registry_path,
            lock_path,
            registry,
        })
    }

    /// Whether `dir` already holds a registry document.
    pub fn exists<P: AsRef<Path>>(dir: P) -> bool {
        dir.as_ref().join(REGISTRY_FILE).exists()
    }

    /// Acquire the exclusive write scope. Blocks until other holders
    /// release theirs.
    pub fn lock(&self) -> Result<ConfigLock, StoreError> {
        let file = open_lock_file(&self.lock_path)?;
        file.lock_exclusive()?;
        Ok(ConfigLock { _file: file })
    }

    /// Add (or fetch) a pool record.
    pub fn add_pool(&mut self, name: &str, exclusive: bool) -> &mut Pool {
        self.registry
            .pools
            .entry(name.to_string())
            .or_insert_with(|| Pool::new(name, exclusive))
    }

    /// Look up a pool by name.
    pub fn pool(&self, name: &str) -> Result<&Pool, StoreError> {
        self.registry
            .pools
            .get(name)
            .ok_or_else(|| StoreError::UnknownPool(name.to_string()))
    }

    /// All pools in name order.
    pub fn pools(&self) -> impl Iterator<Item = &Pool> {
        self.registry.pools.values()
    }

    /// Persist the registry document.
    ///
    /// Demands the write scope so every save happens inside the locked
    /// critical section. The document is staged in a temp file and renamed
    /// into place, which is atomic on the same filesystem.
    pub fn save(&self, _lock: &ConfigLock) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(&self.registry)?;
        let temp_path = self
            .dir
            .join(format!("{REGISTRY_FILE}.tmp.{}", std::process::id()));
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &self.registry_path)?;
        Ok(())
    }

    /// Pretty-printed registry document.
    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&self.registry)?)
    }
}

fn open_lock_file(path: &Path) -> Result<std::fs::File, StoreError> {
    Ok(std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}
