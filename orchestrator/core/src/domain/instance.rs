// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Running Instances
//!
//! A running instance is the realisation of a pod for one tenant: an isolation
//! network named after the tenant id plus one container per image. Nothing is
//! cached; the state of an instance is read back from runtime labels.
//!
//! | Object | Label | Value |
//! |--------|-------|-------|
//! | network | `uId` | tenant id |
//! | network | `time` | creation time, unix seconds |
//! | network | `Hash` | pod content hash |
//! | network | `lease` | lease in hours |
//! | container | `UniqueID` | tenant id |
//! | container | `time` | creation time, unix seconds |
//! | container | `port` | bound host port (external container only) |

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub const LABEL_NETWORK_TENANT: &str = "uId";
pub const LABEL_CREATED: &str = "time";
pub const LABEL_HASH: &str = "Hash";
pub const LABEL_LEASE: &str = "lease";
pub const LABEL_CONTAINER_TENANT: &str = "UniqueID";
pub const LABEL_PORT: &str = "port";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstanceError {
    #[error("Tenant id must not be empty")]
    EmptyTenant,

    #[error("Invalid tenant id '{0}': only letters, digits, '_', '.' and '-' are allowed")]
    InvalidTenant(String),

    #[error("Invalid lease '{0}': expected a whole number of hours")]
    InvalidLease(String),

    #[error("Malformed '{label}' label '{value}'")]
    MalformedLabel { label: &'static str, value: String },
}

/// Owner of a running instance; doubles as the isolation network name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: &str) -> Result<Self, InstanceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InstanceError::EmptyTenant);
        }
        if !trimmed.chars().all(is_name_char) {
            return Err(InstanceError::InvalidTenant(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the isolation network for this tenant.
    pub fn network_name(&self) -> &str {
        &self.0
    }

    /// Container name for `image` within this tenant's instance.
    ///
    /// Characters Docker rejects in container names (`:`, `/`, `@`, ...) are
    /// replaced with `_` in the image part, so `nginx:latest` becomes
    /// `nginx_latest-<tenant>`. Tenant ids are already restricted to name
    /// characters and go in unchanged.
    pub fn container_name(&self, image: &str) -> String {
        format!("{}-{}", sanitize_name(image), self.0)
    }

    /// `<image>=<container name>` for every image, so siblings can find each
    /// other by image name.
    pub fn sibling_env(&self, images: &[String]) -> Vec<String> {
        images
            .iter()
            .map(|image| format!("{}={}", image, self.container_name(image)))
            .collect()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if is_name_char(c) { c } else { '_' })
        .collect()
}

/// Tenant segment of a runtime container name (`/<image>-<tenant>`).
///
/// The tenant is whatever follows the last `-`, so tenant ids that themselves
/// contain `-` are grouped under their final segment.
pub fn tenant_of_container(name: &str) -> &str {
    let name = name.trim_start_matches('/');
    name.rsplit('-').next().unwrap_or(name)
}

/// Lifetime of an instance in whole hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseHours(pub u32);

impl LeaseHours {
    /// Parse the wire `Time` field. Empty input yields `default`.
    pub fn parse_or(raw: &str, default: LeaseHours) -> Result<Self, InstanceError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(default);
        }
        trimmed
            .parse::<u32>()
            .map(LeaseHours)
            .map_err(|_| InstanceError::InvalidLease(raw.to_string()))
    }

    pub fn as_duration(&self) -> Duration {
        Duration::hours(i64::from(self.0))
    }
}

impl std::fmt::Display for LeaseHours {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Labels attached to the isolation network at creation.
pub fn network_labels(
    tenant: &TenantId,
    hash: &str,
    created: DateTime<Utc>,
    lease: LeaseHours,
) -> HashMap<String, String> {
    HashMap::from([
        (LABEL_NETWORK_TENANT.to_string(), tenant.as_str().to_string()),
        (LABEL_CREATED.to_string(), created.timestamp().to_string()),
        (LABEL_HASH.to_string(), hash.to_string()),
        (LABEL_LEASE.to_string(), lease.to_string()),
    ])
}

/// Instant at which an instance becomes eligible for reaping.
///
/// Returns `Ok(None)` when the network carries no creation label (not one of
/// ours). The effective lease is the instance's own lease capped by
/// `horizon`; networks without a lease label use `horizon`.
pub fn reap_deadline(
    labels: &HashMap<String, String>,
    horizon: LeaseHours,
) -> Result<Option<DateTime<Utc>>, InstanceError> {
    let Some(raw_created) = labels.get(LABEL_CREATED) else {
        return Ok(None);
    };
    let created = raw_created
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| InstanceError::MalformedLabel {
            label: LABEL_CREATED,
            value: raw_created.clone(),
        })?;

    let lease = match labels.get(LABEL_LEASE) {
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map(LeaseHours)
            .map_err(|_| InstanceError::MalformedLabel {
                label: LABEL_LEASE,
                value: raw.clone(),
            })?,
        None => horizon,
    };
    let effective = LeaseHours(lease.0.min(horizon.0));

    created
        .checked_add_signed(effective.as_duration())
        .map(Some)
        .ok_or_else(|| InstanceError::MalformedLabel {
            label: LABEL_CREATED,
            value: raw_created.clone(),
        })
}

/// `true` once `now` has reached the deadline (inclusive).
pub fn is_overdue(deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now >= deadline
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_container_naming_and_env() {
        let tenant = TenantId::parse("user123").unwrap();
        assert_eq!(tenant.container_name("redis"), "redis-user123");
        assert_eq!(tenant.container_name("nginx:latest"), "nginx_latest-user123");

        let env = tenant.sibling_env(&["app".to_string(), "redis".to_string()]);
        assert_eq!(env, vec!["app=app-user123", "redis=redis-user123"]);
    }

    #[test]
    fn test_empty_tenant_rejected() {
        assert_eq!(TenantId::parse("  "), Err(InstanceError::EmptyTenant));
    }

    #[test]
    fn test_tenant_charset() {
        assert!(TenantId::parse("user-1.a_b").is_ok());
        assert_eq!(
            TenantId::parse("a:b"),
            Err(InstanceError::InvalidTenant("a:b".to_string()))
        );
        assert!(matches!(TenantId::parse("a/b"), Err(InstanceError::InvalidTenant(_))));
        assert_ne!(
            TenantId::parse("a_b").unwrap().container_name("redis"),
            TenantId::parse("a-b").unwrap().container_name("redis")
        );
    }

    #[test]
    fn test_tenant_of_container() {
        assert_eq!(tenant_of_container("/nginx-user123"), "user123");
        assert_eq!(tenant_of_container("my-app-abc"), "abc");
        assert_eq!(tenant_of_container("plain"), "plain");
    }

    #[test]
    fn test_lease_parsing() {
        let default = LeaseHours(3);
        assert_eq!(LeaseHours::parse_or("", default).unwrap(), LeaseHours(3));
        assert_eq!(LeaseHours::parse_or(" 1 ", default).unwrap(), LeaseHours(1));
        assert!(matches!(
            LeaseHours::parse_or("soon", default),
            Err(InstanceError::InvalidLease(_))
        ));
    }

    #[test]
    fn test_deadline_boundary_is_inclusive() {
        let created = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let l = labels(&[(LABEL_CREATED, "1700000000"), (LABEL_LEASE, "1")]);

        let deadline = reap_deadline(&l, LeaseHours(3)).unwrap().unwrap();
        assert_eq!(deadline, created + Duration::hours(1));
        assert!(is_overdue(deadline, deadline));
        assert!(!is_overdue(deadline, deadline - Duration::seconds(1)));
    }

    #[test]
    fn test_deadline_caps_lease_at_horizon() {
        let l = labels(&[(LABEL_CREATED, "0"), (LABEL_LEASE, "48")]);
        let deadline = reap_deadline(&l, LeaseHours(3)).unwrap().unwrap();
        assert_eq!(deadline.timestamp(), 3 * 3600);

        let no_lease = labels(&[(LABEL_CREATED, "0")]);
        let deadline = reap_deadline(&no_lease, LeaseHours(2)).unwrap().unwrap();
        assert_eq!(deadline.timestamp(), 2 * 3600);
    }

    #[test]
    fn test_deadline_unlabelled_and_malformed() {
        assert_eq!(reap_deadline(&labels(&[]), LeaseHours(3)).unwrap(), None);
        assert!(matches!(
            reap_deadline(&labels(&[(LABEL_CREATED, "yesterday")]), LeaseHours(3)),
            Err(InstanceError::MalformedLabel { label: LABEL_CREATED, .. })
        ));
    }

    #[test]
    fn test_deadline_past_end_of_time_is_malformed() {
        let edge = DateTime::<Utc>::MAX_UTC.timestamp().to_string();
        assert!(matches!(
            reap_deadline(&labels(&[(LABEL_CREATED, edge.as_str())]), LeaseHours(3)),
            Err(InstanceError::MalformedLabel { label: LABEL_CREATED, .. })
        ));
    }
}
