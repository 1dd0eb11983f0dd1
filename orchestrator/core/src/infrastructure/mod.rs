// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod db;
pub mod identity;
pub mod public_ip;
pub mod repositories;
pub mod runtime;
