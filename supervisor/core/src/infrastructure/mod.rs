// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod config_store;
pub mod docker_cli_runtime;
pub mod docker_runtime;
pub mod event_bus;
pub mod memory_runtime;

pub use event_bus::{EngineEventBus, EngineEventReceiver, EventBusError};
pub use memory_runtime::InMemoryRuntime;
