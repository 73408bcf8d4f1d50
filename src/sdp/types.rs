//! Structured SDP model used for both offers and answers.
//!
//! Attributes are kept as an ordered `Vec<(String, String)>` rather than a
//! map so that re-serializing a parsed session preserves RFC 4566 line
//! order, building SDP line-by-line instead of through a generic document
//! model.

use serde::{Deserialize, Serialize};

/// Negotiated direction of a single media stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Direction {
    /// Parses one of the four RFC 4566 direction attribute names.
    pub fn from_attr(name: &str) -> Option<Self> {
        match name {
            "sendrecv" => Some(Self::SendRecv),
            "sendonly" => Some(Self::SendOnly),
            "recvonly" => Some(Self::RecvOnly),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }

    pub fn as_attr(self) -> &'static str {
        match self {
            Self::SendRecv => "sendrecv",
            Self::SendOnly => "sendonly",
            Self::RecvOnly => "recvonly",
            Self::Inactive => "inactive",
        }
    }

    pub fn is_send_enabled(self) -> bool {
        matches!(self, Self::SendRecv | Self::SendOnly)
    }

    pub fn is_recv_enabled(self) -> bool {
        matches!(self, Self::SendRecv | Self::RecvOnly)
    }
}

impl Default for Direction {
    fn default() -> Self {
        Self::SendRecv
    }
}

/// A single `m=` line plus the attributes that apply to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub media_type: String,
    pub port: u16,
    pub proto: String,
    /// Format list in offer order, e.g. `["0", "8", "101"]`.
    pub formats: Vec<String>,
    /// `c=` line scoped to this m-line, if present (overrides the
    /// session-level connection for this stream).
    pub connection: Option<String>,
    /// Ordered `a=` attributes, as `(name, value)`; flag attributes like
    /// `a=sendrecv` store an empty value.
    pub attributes: Vec<(String, String)>,
}

impl MediaDescription {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attr_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.attributes
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First direction flag attribute present on this m-line.
    pub fn direction(&self) -> Option<Direction> {
        self.attributes
            .iter()
            .find_map(|(k, _)| Direction::from_attr(k))
    }

    /// `a=label:<text>`, if present.
    pub fn label(&self) -> Option<&str> {
        self.attr("label")
    }

    /// `a=ptime:<ms>`, defaulting per RFC 4566 guidance to 20ms when absent.
    pub fn ptime(&self) -> u32 {
        self.attr("ptime")
            .and_then(|v| v.parse().ok())
            .unwrap_or(20)
    }

    /// PT of an `a=rtpmap` entry whose encoding name is `telephone-event`.
    pub fn dtmf_payload_type(&self) -> Option<u8> {
        self.attr_values("rtpmap")
            .find(|v| v.contains("telephone-event"))
            .and_then(|v| v.split_whitespace().next())
            .and_then(|pt| pt.parse().ok())
    }

    /// Whether this m-line represents a session-level rejection
    /// (`port=0`, empty format list).
    pub fn is_rejected(&self) -> bool {
        self.port == 0 && self.formats.is_empty()
    }
}

/// A parsed or to-be-serialized SDP session description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpSession {
    pub origin_user: String,
    pub session_id: String,
    pub session_version: u64,
    /// Address from the `o=` line, used as the last-resort fallback when
    /// resolving a remote host (see [`SdpSession::connection`]).
    pub origin_address: String,
    pub session_name: String,
    /// Session-level `c=` address, e.g. `127.0.0.1`. Empty if absent.
    pub connection: String,
    pub media: Vec<MediaDescription>,
    /// Ordered session-level `a=` attributes.
    pub attributes: Vec<(String, String)>,
}

impl SdpSession {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Resolves the remote host for one m-line: the m-line's own `c=`,
    /// then the session-level `c=`, then the `o=` address — first
    /// non-empty wins.
    pub fn remote_host(&self, media: &MediaDescription) -> Option<&str> {
        [
            media.connection.as_deref(),
            Some(self.connection.as_str()).filter(|s| !s.is_empty()),
            Some(self.origin_address.as_str()).filter(|s| !s.is_empty()),
        ]
        .into_iter()
        .flatten()
        .next()
    }
}
