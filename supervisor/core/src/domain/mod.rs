// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Value objects, ports and the lifecycle state machine vocabulary.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and traits with no infrastructure dependencies

pub mod agent;
pub mod config_store;
pub mod container;
pub mod events;
pub mod lifecycle;
pub mod run_spec;
pub mod runtime;
pub mod supervisor_config;
