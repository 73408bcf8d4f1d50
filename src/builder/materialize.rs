//! Stream materialization: turning negotiated per-m-line parameters into
//! live `MediaStream`s.
//!
//! Runs once, either from `process_answer` (UAC) or `create_answer`
//! (UAS). On any step's failure everything built so far in this call is
//! torn down in reverse order and every port acquired for it — including
//! one not yet attached to a stream — is returned to the pool before the
//! error is propagated.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::errors::{BuilderError, Result};
use crate::media::{
    MediaSession, MediaSessionCallbacks, MediaSessionConfig, MediaSessionFactory, MediaStream,
    RtpSession, RtpSessionFactory, RtpTransport, RtpTransportFactory,
};
use crate::port_pool::PortPool;
use crate::sdp::NegotiatedMedia;

/// Everything the algorithm needs besides the per-m-line negotiation
/// results, bundled so the call site doesn't pass a dozen loose
/// arguments.
pub(crate) struct MaterializeContext<'a> {
    pub session_id: &'a str,
    pub local_host: &'a str,
    pub primary_port: u16,
    pub port_pool: &'a PortPool,
    pub transport_factory: &'a Arc<dyn RtpTransportFactory>,
    pub session_factory: &'a Arc<dyn RtpSessionFactory>,
    pub media_factory: &'a Arc<dyn MediaSessionFactory>,
    pub callbacks: &'a MediaSessionCallbacks,
    pub dtmf_payload_type: Option<u8>,
    pub jitter_enabled: bool,
    pub rtcp_enabled: bool,
    pub transport_buffer_size: usize,
    pub default_media_config: &'a serde_json::Value,
}

const RTP_CLOCK_RATE: u32 = 8000;

pub(crate) async fn materialize(
    ctx: &MaterializeContext<'_>,
    negotiated: &[NegotiatedMedia],
) -> Result<Vec<MediaStream>> {
    let local_ip: IpAddr = ctx
        .local_host
        .parse()
        .map_err(|_| BuilderError::config("local_host is not a valid IP address"))?;

    let mut built: Vec<MediaStream> = Vec::new();
    let mut orphan_ports: Vec<u16> = Vec::new();

    for nm in negotiated.iter().filter(|nm| !nm.rejected) {
        let local_port = if nm.media_index == 0 {
            ctx.primary_port
        } else {
            match ctx.port_pool.acquire() {
                Ok(p) => {
                    orphan_ports.push(p);
                    p
                }
                Err(_) => {
                    rollback(built, orphan_ports, ctx.port_pool).await;
                    return Err(BuilderError::PortsExhausted);
                }
            }
        };

        match build_one(ctx, nm, local_ip, local_port).await {
            Ok(stream) => {
                orphan_ports.retain(|&p| p != local_port);
                built.push(stream);
            }
            Err(e) => {
                rollback(built, orphan_ports, ctx.port_pool).await;
                return Err(e);
            }
        }
    }

    Ok(built)
}

async fn build_one(
    ctx: &MaterializeContext<'_>,
    nm: &NegotiatedMedia,
    local_ip: IpAddr,
    local_port: u16,
) -> Result<MediaStream> {
    let remote_ip: IpAddr = nm
        .remote_host
        .parse()
        .map_err(|_| BuilderError::sdp_invalid("missing or invalid remote address"))?;
    let local_addr = SocketAddr::new(local_ip, local_port);
    let remote_addr = SocketAddr::new(remote_ip, nm.remote_port);

    let transport = ctx
        .transport_factory
        .create(local_addr, remote_addr, ctx.transport_buffer_size)
        .await?;

    let source_description = format!("{}_{}", ctx.session_id, nm.media_index);
    let rtp_session = ctx
        .session_factory
        .create(
            nm.payload_type,
            RTP_CLOCK_RATE,
            transport.clone(),
            &source_description,
        )
        .await?;

    let dtmf_payload_type = nm.dtmf_payload_type.filter(|_| ctx.dtmf_payload_type.is_some());
    let media_config = MediaSessionConfig {
        session_id: ctx.session_id.to_string(),
        payload_type: nm.payload_type,
        ptime: nm.ptime,
        direction: nm.direction,
        dtmf_payload_type,
        jitter_enabled: ctx.jitter_enabled,
        rtcp_enabled: ctx.rtcp_enabled,
        media_config: ctx.default_media_config.clone(),
    };
    let media_session = ctx
        .media_factory
        .create(media_config, rtp_session.clone(), ctx.callbacks.clone())
        .await?;

    rtp_session.start().await?;
    media_session.start().await?;

    let stream_id = nm
        .label
        .clone()
        .unwrap_or_else(|| format!("{}_audio_{}", ctx.session_id, nm.media_index));

    Ok(MediaStream {
        stream_id,
        media_type: "audio".to_string(),
        media_index: nm.media_index,
        local_port,
        remote_host: nm.remote_host.clone(),
        remote_port: nm.remote_port,
        payload_type: nm.payload_type,
        direction: nm.direction,
        label: nm.label.clone(),
        transport,
        rtp_session,
        media_session,
    })
}

/// Tears down every stream built so far (media, then RTP, then
/// transport — the same order a normal close uses) and releases both
/// their secondary ports and any port acquired but not yet attached to a
/// stream.
async fn rollback(built: Vec<MediaStream>, orphan_ports: Vec<u16>, port_pool: &PortPool) {
    for stream in built.into_iter().rev() {
        let _ = stream.media_session.stop().await;
        let _ = stream.rtp_session.stop().await;
        let _ = stream.transport.close().await;
        if stream.media_index != 0 {
            let _ = port_pool.release(stream.local_port);
        }
    }
    for port in orphan_ports {
        let _ = port_pool.release(port);
    }
}
