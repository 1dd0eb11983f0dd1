// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`conductor-core`)
//!
//! Wire surface that translates inbound streams into application service
//! calls. **No business logic lives here**; all real work is delegated to
//! services in `crate::application`.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | XML envelope codec, typed requests and responses |
//! | [`handlers`] | One handler per route |
//! | [`dispatcher`] | Decode, authorize, route and encode for one stream |
//! | [`transport`] | TCP listener, identity handshake and request client |

pub mod dispatcher;
pub mod handlers;
pub mod protocol;
pub mod transport;
