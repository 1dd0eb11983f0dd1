// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Host port allocation for externally reachable containers.
//!
//! A port is handed out only if it is bindable on this host and not already
//! reserved in-process. The reservation lives until the [`PortReservation`]
//! is dropped, which the engine does once the container has bound the port
//! or failed to.

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_MAX_ATTEMPTS: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("No free host port in {start}-{end} after {attempts} attempts")]
    NoFreePort { start: u16, end: u16, attempts: usize },
}

#[derive(Debug, Clone)]
pub struct PortAllocator {
    range: RangeInclusive<u16>,
    max_attempts: usize,
    reserved: Arc<Mutex<HashSet<u16>>>,
}

impl PortAllocator {
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            range: start..=end,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            reserved: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sample the range until a port is both unreserved and bindable.
    pub fn reserve(&self) -> Result<PortReservation, AllocationError> {
        let mut rng = rand::rng();
        for _ in 0..self.max_attempts {
            let port = rng.random_range(self.range.clone());
            let mut reserved = self.reserved.lock();
            if reserved.contains(&port) || !is_bindable(port) {
                continue;
            }
            reserved.insert(port);
            return Ok(PortReservation {
                port,
                reserved: Arc::clone(&self.reserved),
            });
        }
        Err(AllocationError::NoFreePort {
            start: *self.range.start(),
            end: *self.range.end(),
            attempts: self.max_attempts,
        })
    }

    pub fn reserved_count(&self) -> usize {
        self.reserved.lock().len()
    }
}

/// Probe listener is dropped immediately.
fn is_bindable(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
}

/// A reserved host port; released on drop.
#[derive(Debug)]
pub struct PortReservation {
    port: u16,
    reserved: Arc<Mutex<HashSet<u16>>>,
}

impl PortReservation {
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for PortReservation {
    fn drop(&mut self) {
        self.reserved.lock().remove(&self.port);
    }
}
