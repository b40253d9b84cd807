// SPDX-FileCopyrightText: Copyright (c) 2025-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Logging setup shared by the corral binary and tests.

use std::io::IsTerminal;
use std::sync::Once;

use tracing_subscriber::Layer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// ENV used to set the log level
const FILTER_ENV: &str = "CORRAL_LOG";

/// Default log level
const DEFAULT_FILTER_LEVEL: &str = "info";

/// Once instance to ensure the logger is only initialized once
static INIT: Once = Once::new();

/// Initialize the logger.
///
/// Log lines go to stderr so stdout stays clean for machine-readable
/// output. Safe to call repeatedly; only the first call installs the
/// subscriber.
pub fn init() {
    INIT.call_once(setup_logging);
}

fn setup_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(DEFAULT_FILTER_LEVEL.parse().unwrap())
        .with_env_var(FILTER_ENV)
        .from_env_lossy();

    let l = fmt::layer()
        .with_ansi(std::io::stderr().is_terminal())
        .event_format(fmt::format().compact())
        .with_writer(std::io::stderr)
        .with_filter(filter);
    tracing_subscriber::registry().with(l).init();
}
