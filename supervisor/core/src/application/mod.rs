// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod retry;
pub mod locator;
pub mod launcher;
pub mod status_poller;
pub mod engine;
pub mod factory;

pub use engine::{EngineError, EngineSettings, ReconciliationEngine};
pub use launcher::AgentLauncher;
pub use locator::AgentLocator;
pub use retry::{retry, retry_if, RetryPolicy};
pub use status_poller::{Observation, ObservationSink, PollerHandle, StatusPoller};
