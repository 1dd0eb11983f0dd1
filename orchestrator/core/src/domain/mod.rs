// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pod definitions, running-instance naming and labels, roles, and the
//! contracts implemented by the infrastructure layer.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and invariants; no I/O

pub mod instance;
pub mod node_config;
pub mod pod;
pub mod rbac;
pub mod repository;
pub mod runtime;
