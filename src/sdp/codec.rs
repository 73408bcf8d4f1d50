//! Building and parsing SDP session descriptions for audio-only calls.
//!
//! Parsing is tolerant of bare `\n` line endings (some peers skip the
//! `\r`), but [`encode`] always emits `\r\n`, per RFC 4566 guidance.

use crate::errors::{BuilderError, Result};
use crate::sdp::types::{Direction, MediaDescription, SdpSession};

/// One entry of the canonical static payload-type table.
pub struct CodecInfo {
    pub payload_type: u8,
    pub name: &'static str,
    pub clock_rate: u32,
}

/// The minimum required canonical codec table, in payload-type order.
pub const CODEC_TABLE: &[CodecInfo] = &[
    CodecInfo {
        payload_type: 0,
        name: "PCMU",
        clock_rate: 8000,
    },
    CodecInfo {
        payload_type: 3,
        name: "GSM",
        clock_rate: 8000,
    },
    CodecInfo {
        payload_type: 8,
        name: "PCMA",
        clock_rate: 8000,
    },
    CodecInfo {
        payload_type: 9,
        name: "G722",
        clock_rate: 8000,
    },
    CodecInfo {
        payload_type: 18,
        name: "G729",
        clock_rate: 8000,
    },
    CodecInfo {
        payload_type: 101,
        name: "telephone-event",
        clock_rate: 8000,
    },
];

/// Looks up a payload type's canonical name/clock rate, if known.
pub fn codec_info(pt: u8) -> Option<&'static CodecInfo> {
    CODEC_TABLE.iter().find(|c| c.payload_type == pt)
}

/// Inputs needed to build a single-m-line offer.
pub struct OfferParams<'a> {
    pub local_host: &'a str,
    pub primary_port: u16,
    pub payload_types: &'a [u8],
    pub ptime: u32,
    /// DTMF payload type, if in-band DTMF is enabled for this session.
    pub dtmf_payload_type: Option<u8>,
    pub direction: Direction,
    pub session_name: &'a str,
    /// Tool identifier forwarded to SDP as `a=tool:<user_agent>`.
    pub user_agent: &'a str,
}

/// Generates the random numeric `sess-id` RFC 4566 wants for the `o=`
/// line — the username field is always the literal `-` (spec.md §4.2
/// step 1), so this is the only origin value that needs generating per
/// offer/answer.
pub(crate) fn generate_origin_id() -> String {
    rand::random::<u64>().to_string()
}

/// Builds the single-m-line offer a `Builder` sends as UAC.
pub fn build_offer(params: &OfferParams<'_>) -> SdpSession {
    let mut formats: Vec<String> = params.payload_types.iter().map(u8::to_string).collect();

    let mut attributes = Vec::new();
    for &pt in params.payload_types {
        if let Some(info) = codec_info(pt) {
            attributes.push((
                "rtpmap".to_string(),
                format!("{pt} {}/{}", info.name, info.clock_rate),
            ));
        }
    }
    if let Some(dtmf_pt) = params.dtmf_payload_type {
        formats.push(dtmf_pt.to_string());
        attributes.push(("rtpmap".to_string(), format!("{dtmf_pt} telephone-event/8000")));
        attributes.push(("fmtp".to_string(), format!("{dtmf_pt} 0-15")));
    }
    attributes.push(("ptime".to_string(), params.ptime.to_string()));
    attributes.push((params.direction.as_attr().to_string(), String::new()));

    SdpSession {
        origin_user: "-".to_string(),
        session_id: generate_origin_id(),
        session_version: 2,
        origin_address: params.local_host.to_string(),
        session_name: params.session_name.to_string(),
        connection: params.local_host.to_string(),
        media: vec![MediaDescription {
            media_type: "audio".to_string(),
            port: params.primary_port,
            proto: "RTP/AVP".to_string(),
            formats,
            connection: None,
            attributes,
        }],
        attributes: vec![("tool".to_string(), params.user_agent.to_string())],
    }
}

/// Serializes a session description to wire-format SDP text.
pub fn encode(session: &SdpSession) -> String {
    let mut out = String::new();
    out.push_str("v=0\r\n");
    out.push_str(&format!(
        "o={} {} {} IN IP4 {}\r\n",
        session.origin_user, session.session_id, session.session_version, session.origin_address
    ));
    out.push_str(&format!("s={}\r\n", session.session_name));
    out.push_str(&format!("c=IN IP4 {}\r\n", session.connection));
    out.push_str("t=0 0\r\n");
    for (name, value) in &session.attributes {
        if value.is_empty() {
            out.push_str(&format!("a={name}\r\n"));
        } else {
            out.push_str(&format!("a={name}:{value}\r\n"));
        }
    }
    for media in &session.media {
        out.push_str(&format!(
            "m={} {} {} {}\r\n",
            media.media_type,
            media.port,
            media.proto,
            media.formats.join(" ")
        ));
        if let Some(conn) = &media.connection {
            out.push_str(&format!("c=IN IP4 {conn}\r\n"));
        }
        for (name, value) in &media.attributes {
            if value.is_empty() {
                out.push_str(&format!("a={name}\r\n"));
            } else {
                out.push_str(&format!("a={name}:{value}\r\n"));
            }
        }
    }
    out
}

/// Parses wire-format SDP text into a structured session.
///
/// Accepts bare `\n` line endings in addition to `\r\n`.
pub fn parse(text: &str) -> Result<SdpSession> {
    let mut origin_user = String::new();
    let mut session_id = String::new();
    let mut session_version = 0u64;
    let mut origin_address = String::new();
    let mut session_name = String::new();
    let mut connection = String::new();
    let mut session_attrs: Vec<(String, String)> = Vec::new();
    let mut media: Vec<MediaDescription> = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.len() < 2 || line.as_bytes()[1] != b'=' {
            continue;
        }
        let (kind, rest) = (line.as_bytes()[0], &line[2..]);
        match kind {
            b'o' => {
                let fields: Vec<&str> = rest.split_whitespace().collect();
                if fields.len() < 6 {
                    return Err(BuilderError::sdp_invalid("malformed o= line"));
                }
                origin_user = fields[0].to_string();
                session_id = fields[1].to_string();
                session_version = fields[2].parse().unwrap_or(0);
                origin_address = fields[5].to_string();
            }
            b's' => session_name = rest.to_string(),
            b'c' if media.is_empty() => {
                connection = parse_connection(rest)?;
            }
            b'c' => {
                if let Some(last) = media.last_mut() {
                    last.connection = Some(parse_connection(rest)?);
                }
            }
            b'm' => {
                let fields: Vec<&str> = rest.split_whitespace().collect();
                if fields.len() < 3 {
                    return Err(BuilderError::sdp_invalid("malformed m= line"));
                }
                let port = fields[1]
                    .parse()
                    .map_err(|_| BuilderError::sdp_invalid("non-numeric m-line port"))?;
                media.push(MediaDescription {
                    media_type: fields[0].to_string(),
                    port,
                    proto: fields[2].to_string(),
                    formats: fields[3..].iter().map(|s| s.to_string()).collect(),
                    connection: None,
                    attributes: Vec::new(),
                });
            }
            b'a' => {
                let (name, value) = match rest.split_once(':') {
                    Some((n, v)) => (n.to_string(), v.to_string()),
                    None => (rest.to_string(), String::new()),
                };
                match media.last_mut() {
                    Some(last) => last.attributes.push((name, value)),
                    None => session_attrs.push((name, value)),
                }
            }
            _ => {}
        }
    }

    if media.is_empty() {
        return Err(BuilderError::sdp_invalid("no m-lines present"));
    }

    Ok(SdpSession {
        origin_user,
        session_id,
        session_version,
        origin_address,
        session_name,
        connection,
        media,
        attributes: session_attrs,
    })
}

fn parse_connection(rest: &str) -> Result<String> {
    rest.split_whitespace()
        .last()
        .map(|s| s.to_string())
        .ok_or_else(|| BuilderError::sdp_invalid("malformed c= line"))
}

/// Resolved per-m-line negotiation outcome, used by both `process_answer`
/// (UAC) and `process_offer`/`create_answer` (UAS).
pub struct NegotiatedMedia {
    pub media_index: usize,
    pub label: Option<String>,
    pub payload_type: u8,
    pub dtmf_payload_type: Option<u8>,
    pub remote_host: String,
    pub remote_port: u16,
    pub direction: Direction,
    pub ptime: u32,
    pub rejected: bool,
}

/// Chooses the first payload type in `remote_formats` also present in
/// `local_payload_types`, falling back to PCMU (PT 0) if it is locally
/// supported and nothing else matched.
pub fn select_codec(remote_formats: &[String], local_payload_types: &[u8]) -> Option<u8> {
    for fmt in remote_formats {
        if let Ok(pt) = fmt.parse::<u8>() {
            if local_payload_types.contains(&pt) {
                return Some(pt);
            }
        }
    }
    if local_payload_types.contains(&0) {
        return Some(0);
    }
    None
}

/// Resolves every m-line of a remote offer/answer against the local
/// supported payload types, in order. Rejected m-lines (no common codec)
/// are marked `rejected` rather than dropped, preserving positional
/// correspondence with the remote m-line list.
pub fn negotiate(remote: &SdpSession, local_payload_types: &[u8]) -> Vec<NegotiatedMedia> {
    remote
        .media
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let chosen = select_codec(&m.formats, local_payload_types);
            let remote_host = remote.remote_host(m).unwrap_or_default().to_string();
            NegotiatedMedia {
                media_index: i,
                label: m.label().map(str::to_string),
                payload_type: chosen.unwrap_or(0),
                dtmf_payload_type: m.dtmf_payload_type(),
                remote_host,
                remote_port: m.port,
                direction: m.direction().unwrap_or_default(),
                ptime: m.ptime(),
                rejected: chosen.is_none(),
            }
        })
        .collect()
}
