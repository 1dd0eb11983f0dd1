// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod authorizer;
pub mod orchestration;
pub mod pod_registry;
pub mod port_allocator;
pub mod reaper;
pub mod tenant_locks;

// Re-export services for convenience
pub use authorizer::{Authorizer, Decision};
pub use orchestration::{InstanceStatus, OrchestrationError, OrchestratorConfig, PodOrchestrator, StartedInstance};
pub use pod_registry::{NewPod, PodRegistry, RegistrationError};
pub use port_allocator::{AllocationError, PortAllocator, PortReservation};
pub use reaper::SweepReport;
