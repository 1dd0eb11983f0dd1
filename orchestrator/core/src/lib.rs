// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Conductor Core
//!
//! Request authorization, dispatch and pod orchestration for a conductor node.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, application services, infrastructure adapters
//!   and the wire protocol, wired together by the `conductor` binary

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
