// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Wire Protocol
//!
//! One XML request and one XML response per stream. The name of the
//! request's outer element is the route; its inner markup is left untouched
//! for the handler, which decodes it into its own typed request.
//!
//! ```xml
//! <Start>
//!   <Hash>9f86d0...</Hash>
//!   <UniqueId>user123</UniqueId>
//!   <Time>1</Time>
//! </Start>
//! ```
//!
//! Responses are always a `<Response>` element carrying a numeric `Status`:
//! `200` on success, `400` on any decode, validation or runtime failure, and
//! `500` when authorization is denied.

use crate::domain::pod::PodSummary;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const STATUS_OK: u16 = 200;
pub const STATUS_ERROR: u16 = 400;
pub const STATUS_DENIED: u16 = 500;

const ERROR_ENVELOPE: &str = "<Response>\n  <Status>400</Status>\n</Response>";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Request is not valid UTF-8")]
    Encoding,

    #[error("Request contains no root element")]
    MissingRoot,

    #[error("Malformed XML: {0}")]
    Malformed(String),

    #[error("Invalid {route} payload: {reason}")]
    Payload { route: String, reason: String },

    #[error("Request exceeds {0} bytes")]
    TooLarge(usize),

    #[error("Failed to encode response: {0}")]
    Encode(String),
}

/// A decoded envelope: route name plus the raw inner markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub route: String,
    pub raw_content: String,
}

/// Split a request into its route name and raw inner content.
///
/// The inner markup must be well formed but is not interpreted.
pub fn decode_envelope(request: &[u8]) -> Result<Action, ProtocolError> {
    let xml = std::str::from_utf8(request).map_err(|_| ProtocolError::Encoding)?;
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let route = local_name(start.local_name().as_ref())?;
                let qname = start.name().as_ref().to_vec();
                let span = reader
                    .read_to_end(QName(&qname))
                    .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
                let begin = usize::try_from(span.start).map_err(|_| ProtocolError::TooLarge(xml.len()))?;
                let end = usize::try_from(span.end).map_err(|_| ProtocolError::TooLarge(xml.len()))?;
                let raw_content = xml
                    .get(begin..end)
                    .ok_or_else(|| ProtocolError::Malformed("element bounds".to_string()))?
                    .to_string();
                return Ok(Action { route, raw_content });
            }
            Ok(Event::Empty(empty)) => {
                return Ok(Action {
                    route: local_name(empty.local_name().as_ref())?,
                    raw_content: String::new(),
                });
            }
            Ok(Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_)) => continue,
            Ok(Event::Eof) => return Err(ProtocolError::MissingRoot),
            Ok(other) => {
                return Err(ProtocolError::Malformed(format!(
                    "unexpected {:?} before root element",
                    other
                )))
            }
            Err(e) => return Err(ProtocolError::Malformed(e.to_string())),
        }
    }
}

fn local_name(bytes: &[u8]) -> Result<String, ProtocolError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| ProtocolError::Encoding)
}

/// Decode the inner content of `action` into a typed request.
pub fn decode_payload<T: DeserializeOwned>(action: &Action) -> Result<T, ProtocolError> {
    let wrapped = format!("<Root>{}</Root>", action.raw_content);
    quick_xml::de::from_str(&wrapped).map_err(|e| ProtocolError::Payload {
        route: action.route.clone(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListRequest {
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartRequest {
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub unique_id: String,
    /// Lease in hours; empty means the node default.
    #[serde(default)]
    pub time: String,
}

/// Body of `Stop` and `Status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TenantRequest {
    #[serde(default)]
    pub unique_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddPodRequest {
    #[serde(default)]
    pub pod_name: String,
    #[serde(default)]
    pub images: ImageList,
    #[serde(default)]
    pub external_image: String,
    #[serde(default)]
    pub metadata: MetadataList,
    #[serde(default)]
    pub internal_port: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImageList {
    #[serde(rename = "Image", default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MetadataList {
    #[serde(rename = "Item", default)]
    pub items: Vec<String>,
}

/// Every response a handler can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Permissions(Vec<String>),
    Pods(Vec<PodSummary>),
    Started { address: String },
    Stopped,
    Status { hash: String, port: u16 },
    /// Tenant tag to space-joined container names.
    Running(BTreeMap<String, String>),
    Added,
    Error,
    Denied,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StatusOnly {
    status: u16,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PermissionsBody<'a> {
    permissions: PermissionList<'a>,
    status: u16,
}

#[derive(Serialize)]
struct PermissionList<'a> {
    #[serde(rename = "Permission")]
    items: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PodsBody<'a> {
    pod: Vec<PodEntry<'a>>,
    status: u16,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PodEntry<'a> {
    pod_name: &'a str,
    hash: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StartedBody<'a> {
    address: &'a str,
    status: u16,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StatusBody<'a> {
    status: u16,
    hash: &'a str,
    port: u16,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RunningBody<'a> {
    status: u16,
    running: &'a BTreeMap<String, String>,
}

fn to_xml<T: Serialize>(body: &T) -> Result<String, ProtocolError> {
    let mut buffer = String::new();
    let mut serializer = quick_xml::se::Serializer::with_root(&mut buffer, Some("Response"))
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    serializer.indent(' ', 2);
    body.serialize(serializer)
        .map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(buffer)
}

impl Response {
    pub fn status(&self) -> u16 {
        match self {
            Response::Error => STATUS_ERROR,
            Response::Denied => STATUS_DENIED,
            _ => STATUS_OK,
        }
    }

    fn try_encode(&self) -> Result<String, ProtocolError> {
        let status = self.status();
        match self {
            Response::Permissions(items) => to_xml(&PermissionsBody {
                permissions: PermissionList { items },
                status,
            }),
            Response::Pods(pods) => to_xml(&PodsBody {
                pod: pods
                    .iter()
                    .map(|pod| PodEntry {
                        pod_name: &pod.name,
                        hash: pod.hash.as_str(),
                    })
                    .collect(),
                status,
            }),
            Response::Started { address } => to_xml(&StartedBody { address, status }),
            Response::Status { hash, port } => to_xml(&StatusBody {
                status,
                hash,
                port: *port,
            }),
            Response::Running(running) => to_xml(&RunningBody { status, running }),
            Response::Stopped | Response::Added | Response::Error | Response::Denied => {
                to_xml(&StatusOnly { status })
            }
        }
    }

    /// Serialise with two-space indentation, falling back to the error
    /// envelope if encoding fails.
    pub fn encode(&self) -> String {
        match self.try_encode() {
            Ok(xml) => xml,
            Err(e) => {
                tracing::error!("{}", e);
                ERROR_ENVELOPE.to_string()
            }
        }
    }
}

/// Turn an arbitrary tenant tag into a valid XML element name.
///
/// Characters outside the XML name set become `_`; a tag that does not start
/// with a letter or `_` is prefixed with `_`.
pub fn xml_tag(raw: &str) -> String {
    let mut tag: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !tag.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        tag.insert(0, '_');
    }
    tag
}
