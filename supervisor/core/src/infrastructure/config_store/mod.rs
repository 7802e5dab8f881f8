// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Agent Configuration Stores
//!
//! Infrastructure implementations of the domain `ConfigStore` port.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve the single agent configuration
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **FileConfigStore** - JSON document on local disk, owner-only permissions
//! - **HttpConfigStore** - Remote configuration service (`/agents/config`)
//! - **InMemoryConfigStore** - Ephemeral storage for tests and embedding

pub mod file;
pub mod http;
pub mod memory;

pub use file::FileConfigStore;
pub use http::HttpConfigStore;
pub use memory::InMemoryConfigStore;
