// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Supervisor Core
//!
//! Keeps one named agent container running and reconciled against its
//! stored configuration.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain types, reconciliation services and runtime adapters

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
