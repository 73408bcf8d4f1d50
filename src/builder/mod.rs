//! The per-session offer/answer state machine.

mod materialize;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;

use crate::errors::{BuilderError, Result};
use crate::media::{
    MediaSession, MediaSessionCallbacks, MediaSessionFactory, MediaStream, MediaStreamSnapshot,
    RtpSessionFactory, RtpTransportFactory,
};
use crate::port_pool::PortPool;
use crate::sdp::{self, Direction, NegotiatedMedia, OfferParams, SdpSession};

use materialize::{materialize, MaterializeContext};

/// States of the per-session negotiation language. Every transition is
/// one-way; `Error` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderMode {
    None,
    Offer,
    OfferComplete,
    Answer,
    AnswerComplete,
    Error,
    Closed,
}

impl BuilderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Offer => "offer",
            Self::OfferComplete => "offer_complete",
            Self::Answer => "answer",
            Self::AnswerComplete => "answer_complete",
            Self::Error => "error",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for BuilderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed, caller-supplied parameters a `Builder` negotiates with; set
/// once at construction by the `BuilderManager` and never mutated.
pub struct BuilderParams {
    pub session_id: String,
    pub local_host: String,
    pub primary_port: u16,
    pub payload_types: Vec<u8>,
    pub ptime: u32,
    pub dtmf_payload_type: Option<u8>,
    pub direction: Direction,
    pub transport_buffer_size: usize,
    pub jitter_enabled: bool,
    pub rtcp_enabled: bool,
    pub session_name: String,
    pub user_agent: String,
    pub default_media_config: serde_json::Value,
    pub deadline: Option<Duration>,
    pub port_pool: Arc<PortPool>,
    pub transport_factory: Arc<dyn RtpTransportFactory>,
    pub session_factory: Arc<dyn RtpSessionFactory>,
    pub media_factory: Arc<dyn MediaSessionFactory>,
    pub callbacks: MediaSessionCallbacks,
}

struct State {
    mode: BuilderMode,
    local_offer: Option<SdpSession>,
    remote: Option<SdpSession>,
    streams: Vec<MediaStream>,
}

/// One-shot per-call negotiation object. Drives exactly one offer/answer
/// cycle (UAC via `create_offer`/`process_answer`, or UAS via
/// `process_offer`/`create_answer`) and then materializes one
/// `MediaStream` per accepted m-line.
///
/// `last_activity` lives outside the negotiation mutex so the reaper can
/// read it without contending with an in-flight negotiation call.
pub struct Builder {
    params: BuilderParams,
    last_activity: SyncMutex<Instant>,
    state: AsyncMutex<State>,
}

impl Builder {
    pub(crate) fn new(params: BuilderParams) -> Self {
        Self {
            params,
            last_activity: SyncMutex::new(Instant::now()),
            state: AsyncMutex::new(State {
                mode: BuilderMode::None,
                local_offer: None,
                remote: None,
                streams: Vec::new(),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.params.session_id
    }

    /// The primary m-line port, allocated and owned by the manager for
    /// the builder's whole lifetime.
    pub fn primary_port(&self) -> u16 {
        self.params.primary_port
    }

    pub async fn mode(&self) -> BuilderMode {
        self.state.lock().await.mode
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    pub(crate) fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Builds and sends the single-m-line offer (UAC path). Requires
    /// `None`; every subsequent call fails with `WrongState`.
    pub async fn create_offer(&self) -> Result<String> {
        self.touch();
        let mut state = self.state.lock().await;
        self.require(&state, BuilderMode::None)?;

        let offer = sdp::build_offer(&OfferParams {
            local_host: &self.params.local_host,
            primary_port: self.params.primary_port,
            payload_types: &self.params.payload_types,
            ptime: self.params.ptime,
            dtmf_payload_type: self.params.dtmf_payload_type,
            direction: self.params.direction,
            session_name: &self.params.session_name,
            user_agent: &self.params.user_agent,
        });
        let text = sdp::encode(&offer);
        state.local_offer = Some(offer);
        state.mode = BuilderMode::Offer;
        Ok(text)
    }

    /// Consumes a remote answer (UAC path). Requires `Offer`. Validates
    /// the m-line count before resolving anything else, then resolves
    /// per-m-line negotiation outcomes and materializes the streams.
    pub async fn process_answer(&self, answer_text: &str) -> Result<()> {
        self.touch();
        let mut state = self.state.lock().await;
        self.require(&state, BuilderMode::Offer)?;

        let offered = state.local_offer.as_ref().map(|o| o.media.len()).unwrap_or(0);
        let outcome = self.resolve_answer(answer_text, offered).await;
        match outcome {
            Ok((remote, streams)) => {
                state.remote = Some(remote);
                state.streams = streams;
                state.mode = BuilderMode::OfferComplete;
                Ok(())
            }
            Err(e) => {
                state.mode = BuilderMode::Error;
                tracing::error!(session_id = %self.params.session_id, error = %e, "builder entered Error state");
                Err(e)
            }
        }
    }

    async fn resolve_answer(
        &self,
        answer_text: &str,
        offered: usize,
    ) -> Result<(SdpSession, Vec<MediaStream>)> {
        let remote = sdp::parse(answer_text)?;
        if remote.media.len() != offered {
            return Err(BuilderError::MlineCountMismatch {
                offered,
                answered: remote.media.len(),
            });
        }
        let negotiated = sdp::negotiate(&remote, &self.params.payload_types);
        let streams = self.run_materialize(&negotiated).await?;
        Ok((remote, streams))
    }

    /// Stores a remote offer (UAS path). Requires `None`. Fails with
    /// `NoCommonCodec` if every m-line is rejected.
    pub async fn process_offer(&self, offer_text: &str) -> Result<()> {
        self.touch();
        let mut state = self.state.lock().await;
        self.require(&state, BuilderMode::None)?;

        let remote = sdp::parse(offer_text)?;
        let negotiated = sdp::negotiate(&remote, &self.params.payload_types);
        if negotiated.iter().all(|nm| nm.rejected) {
            state.mode = BuilderMode::Error;
            return Err(BuilderError::NoCommonCodec);
        }
        state.remote = Some(remote);
        state.mode = BuilderMode::Answer;
        Ok(())
    }

    /// Materializes the streams and builds the 1-to-1 answer (UAS path).
    /// Requires `Answer`.
    pub async fn create_answer(&self) -> Result<String> {
        self.touch();
        let mut state = self.state.lock().await;
        self.require(&state, BuilderMode::Answer)?;

        let remote = state.remote.clone().expect("Answer mode implies a stored remote offer");
        let negotiated = sdp::negotiate(&remote, &self.params.payload_types);

        let streams = match self.run_materialize(&negotiated).await {
            Ok(streams) => streams,
            Err(e) => {
                state.mode = BuilderMode::Error;
                tracing::error!(session_id = %self.params.session_id, error = %e, "builder entered Error state");
                return Err(e);
            }
        };

        let answer = self.build_answer_sdp(&negotiated, &streams);
        let text = sdp::encode(&answer);
        state.streams = streams;
        state.mode = BuilderMode::AnswerComplete;
        Ok(text)
    }

    /// The primary stream's media-session handle, once streams exist.
    pub async fn media_session(&self) -> Option<Arc<dyn MediaSession>> {
        let state = self.state.lock().await;
        state
            .streams
            .iter()
            .find(|s| s.media_index == 0)
            .map(|s| s.media_session.clone())
    }

    /// Read-only snapshots of every materialized stream, in m-line order.
    pub async fn streams(&self) -> Vec<MediaStreamSnapshot> {
        let state = self.state.lock().await;
        state.streams.iter().map(MediaStream::snapshot).collect()
    }

    /// Idempotent teardown: stops every stream's media session, then its
    /// RTP session, then closes its transport, and releases every
    /// secondary port. The primary port is released by the owning
    /// `BuilderManager`, not here.
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.mode == BuilderMode::Closed {
            return Ok(());
        }
        for stream in state.streams.drain(..) {
            let _ = stream.media_session.stop().await;
            let _ = stream.rtp_session.stop().await;
            let _ = stream.transport.close().await;
            if stream.media_index != 0 {
                if let Err(e) = self.params.port_pool.release(stream.local_port) {
                    tracing::warn!(session_id = %self.params.session_id, port = stream.local_port, error = %e, "failed to release secondary port on close");
                }
            }
        }
        state.mode = BuilderMode::Closed;
        Ok(())
    }

    fn require(&self, state: &State, expected: BuilderMode) -> Result<()> {
        if state.mode == BuilderMode::Closed {
            return Err(BuilderError::Closed);
        }
        if state.mode != expected {
            return Err(BuilderError::wrong_state(expected.as_str(), state.mode));
        }
        Ok(())
    }

    fn materialize_ctx(&self) -> MaterializeContext<'_> {
        MaterializeContext {
            session_id: &self.params.session_id,
            local_host: &self.params.local_host,
            primary_port: self.params.primary_port,
            port_pool: &self.params.port_pool,
            transport_factory: &self.params.transport_factory,
            session_factory: &self.params.session_factory,
            media_factory: &self.params.media_factory,
            callbacks: &self.params.callbacks,
            dtmf_payload_type: self.params.dtmf_payload_type,
            jitter_enabled: self.params.jitter_enabled,
            rtcp_enabled: self.params.rtcp_enabled,
            transport_buffer_size: self.params.transport_buffer_size,
            default_media_config: &self.params.default_media_config,
        }
    }

    async fn run_materialize(&self, negotiated: &[NegotiatedMedia]) -> Result<Vec<MediaStream>> {
        let fut = materialize(&self.materialize_ctx(), negotiated);
        match self.params.deadline {
            Some(d) => timeout(d, fut).await.map_err(|_| BuilderError::DeadlineExceeded)?,
            None => fut.await,
        }
    }

    fn build_answer_sdp(&self, negotiated: &[NegotiatedMedia], streams: &[MediaStream]) -> SdpSession {
        use crate::sdp::types::MediaDescription;

        let media = negotiated
            .iter()
            .map(|nm| {
                if nm.rejected {
                    return MediaDescription {
                        media_type: "audio".to_string(),
                        port: 0,
                        proto: "RTP/AVP".to_string(),
                        formats: Vec::new(),
                        connection: None,
                        attributes: Vec::new(),
                    };
                }
                let mut formats = vec![nm.payload_type.to_string()];
                let mut attributes = Vec::new();
                if let Some(info) = sdp::codec::codec_info(nm.payload_type) {
                    attributes.push((
                        "rtpmap".to_string(),
                        format!("{} {}/{}", nm.payload_type, info.name, info.clock_rate),
                    ));
                }
                let include_dtmf =
                    nm.dtmf_payload_type.is_some() && self.params.dtmf_payload_type.is_some();
                if include_dtmf {
                    let dtmf_pt = nm.dtmf_payload_type.unwrap();
                    formats.push(dtmf_pt.to_string());
                    attributes.push((
                        "rtpmap".to_string(),
                        format!("{dtmf_pt} telephone-event/8000"),
                    ));
                    attributes.push(("fmtp".to_string(), format!("{dtmf_pt} 0-15")));
                }
                attributes.push(("ptime".to_string(), nm.ptime.to_string()));
                attributes.push((nm.direction.as_attr().to_string(), String::new()));
                let port = streams
                    .iter()
                    .find(|s| s.media_index == nm.media_index)
                    .map(|s| s.local_port)
                    .unwrap_or(0);
                MediaDescription {
                    media_type: "audio".to_string(),
                    port,
                    proto: "RTP/AVP".to_string(),
                    formats,
                    connection: None,
                    attributes,
                }
            })
            .collect();

        SdpSession {
            origin_user: "-".to_string(),
            session_id: sdp::codec::generate_origin_id(),
            session_version: 2,
            origin_address: self.params.local_host.clone(),
            session_name: self.params.session_name.clone(),
            connection: self.params.local_host.clone(),
            media,
            attributes: vec![("tool".to_string(), self.params.user_agent.clone())],
        }
    }
}
