//! End-to-end offer/answer negotiation scenarios plus the round-trip and
//! port-conservation invariants, driven against the in-memory factory
//! triple in `tests/common`.

mod common;

use std::time::Duration;

use common::{test_manager, test_manager_with_media_factory};
use rvoip_media_builder::prelude::*;

fn base_config() -> ManagerConfig {
    ManagerConfig {
        local_host: "127.0.0.1".to_string(),
        min_port: 10000,
        max_port: 10010,
        max_concurrent_builders: 5,
        port_allocation_strategy: AllocationStrategy::Sequential,
        port_step: 2,
        default_payload_types: vec![0, 8],
        default_ptime: 20,
        dtmf_enabled: true,
        dtmf_payload_type: 101,
        ..ManagerConfig::default()
    }
}

/// Basic offer construction (UAC side).
#[tokio::test]
async fn s1_basic_offer_has_expected_shape() {
    let manager = test_manager(base_config());
    manager.create_builder("A").await.unwrap();
    let b = manager.get_builder("A").await.unwrap();

    let offer = b.create_offer().await.unwrap();
    assert!(offer.contains("m=audio 10000 RTP/AVP 0 8 101"));
    assert!(offer.contains("a=rtpmap:0 PCMU/8000"));
    assert!(offer.contains("a=rtpmap:8 PCMA/8000"));
    assert!(offer.contains("a=rtpmap:101 telephone-event/8000"));
    assert!(offer.contains("a=fmtp:101 0-15"));
    assert!(offer.contains("a=ptime:20"));
    assert!(offer.contains("a=sendrecv"));

    assert!(b.media_session().await.is_none());
    assert_eq!(manager.available_ports(), 5);
}

/// Processing an answer materializes the stream.
#[tokio::test]
async fn s2_process_answer_materializes_stream() {
    let manager = test_manager(base_config());
    manager.create_builder("A").await.unwrap();
    let b = manager.get_builder("A").await.unwrap();
    b.create_offer().await.unwrap();

    let answer = concat!(
        "v=0\r\n",
        "o=- 99 2 IN IP4 192.168.1.50\r\n",
        "s=peer\r\n",
        "c=IN IP4 192.168.1.50\r\n",
        "t=0 0\r\n",
        "m=audio 20000 RTP/AVP 0\r\n",
        "a=rtpmap:0 PCMU/8000\r\n",
        "a=ptime:20\r\n",
        "a=sendrecv\r\n",
    );
    b.process_answer(answer).await.unwrap();

    assert!(b.media_session().await.is_some());
    let streams = b.streams().await;
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].local_port, 10000);
    assert_eq!(streams[0].remote_host, "192.168.1.50");
    assert_eq!(streams[0].remote_port, 20000);
    assert_eq!(streams[0].payload_type, 0);
    assert_eq!(streams[0].direction, Direction::SendRecv);
    assert_eq!(streams[0].stream_id, "A_audio_0");
}

/// `ManagerConfig::default_media_config` is opaque to the core — it is
/// forwarded to the media-session factory unchanged, never interpreted.
#[tokio::test]
async fn default_media_config_is_forwarded_to_media_factory_unchanged() {
    let raw_handler_mode = serde_json::json!({"raw_packet_handler": "caller-installed"});
    let config = ManagerConfig {
        default_media_config: raw_handler_mode.clone(),
        ..base_config()
    };
    let (manager, media_factory) = test_manager_with_media_factory(config);
    manager.create_builder("A").await.unwrap();
    let b = manager.get_builder("A").await.unwrap();
    b.create_offer().await.unwrap();

    let answer = concat!(
        "v=0\r\n",
        "o=- 1 2 IN IP4 192.168.1.50\r\n",
        "s=peer\r\n",
        "c=IN IP4 192.168.1.50\r\n",
        "t=0 0\r\n",
        "m=audio 20000 RTP/AVP 0\r\n",
        "a=sendrecv\r\n",
    );
    b.process_answer(answer).await.unwrap();

    let seen = media_factory.seen_media_configs.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], raw_handler_mode);
}

/// Port pool exhaustion and recycling after release.
///
/// `ManagerConfig::validate` rejects a port range smaller than
/// `max_concurrent_builders`, so a config that runs the pool dry before
/// the registry cap is reached is only reachable with
/// `max_concurrent_builders` set to the pool's own capacity — at which
/// point the fourth `create_builder` hits the registry cap
/// (`CapacityExceeded`) at exactly the same moment the pool would have
/// returned `Exhausted`.
#[tokio::test]
async fn s3_port_pool_exhaustion_and_recycle() {
    let config = ManagerConfig {
        min_port: 10000,
        max_port: 10004,
        port_step: 2,
        max_concurrent_builders: 3,
        ..base_config()
    };
    let manager = test_manager(config);

    let x1 = manager.create_builder("x1").await.unwrap();
    let x2 = manager.create_builder("x2").await.unwrap();
    let x3 = manager.create_builder("x3").await.unwrap();
    assert_eq!(x1.primary_port(), 10000);
    assert_eq!(x2.primary_port(), 10002);
    assert_eq!(x3.primary_port(), 10004);

    assert!(matches!(
        manager.create_builder("x4").await,
        Err(BuilderError::CapacityExceeded { limit: 3 })
    ));

    manager.release_builder("x2").await.unwrap();
    let x5 = manager.create_builder("x5").await.unwrap();
    assert_eq!(x5.primary_port(), 10002);
}

/// UAS round-trip with codec selection (PCMU + DTMF chosen from a wider
/// remote offer).
#[tokio::test]
async fn s4_uas_round_trip_with_codec_selection() {
    let manager = test_manager(base_config());
    manager.create_builder("C").await.unwrap();
    let c = manager.get_builder("C").await.unwrap();

    let offer = concat!(
        "v=0\r\n",
        "o=- 1 2 IN IP4 192.168.1.50\r\n",
        "s=peer\r\n",
        "c=IN IP4 192.168.1.50\r\n",
        "t=0 0\r\n",
        "m=audio 5008 RTP/AVP 0 8 18 101\r\n",
        "a=rtpmap:0 PCMU/8000\r\n",
        "a=rtpmap:8 PCMA/8000\r\n",
        "a=rtpmap:18 G729/8000\r\n",
        "a=rtpmap:101 telephone-event/8000\r\n",
        "a=sendrecv\r\n",
    );
    c.process_offer(offer).await.unwrap();
    let answer = c.create_answer().await.unwrap();

    assert!(answer.contains("m=audio 10000 RTP/AVP 0 101"));
    assert!(answer.contains("a=rtpmap:0 PCMU/8000"));
    assert!(answer.contains("a=rtpmap:101 telephone-event/8000"));
    assert!(answer.contains("a=ptime:20"));
    assert!(answer.contains("a=sendrecv"));

    let streams = c.streams().await;
    assert_eq!(streams[0].payload_type, 0);
}

/// Multi-stream negotiation: two m-lines with distinct labels, formats,
/// and directions, and the manager allocates a secondary port for the
/// second.
#[tokio::test]
async fn s5_multi_stream_negotiation() {
    let manager = test_manager(base_config());
    manager.create_builder("C").await.unwrap();
    let c = manager.get_builder("C").await.unwrap();

    let offer = concat!(
        "v=0\r\n",
        "o=- 1 2 IN IP4 192.168.1.50\r\n",
        "s=peer\r\n",
        "c=IN IP4 192.168.1.50\r\n",
        "t=0 0\r\n",
        "m=audio 5000 RTP/AVP 0\r\n",
        "a=rtpmap:0 PCMU/8000\r\n",
        "a=label:main-audio\r\n",
        "a=sendrecv\r\n",
        "m=audio 5002 RTP/AVP 8 0\r\n",
        "a=rtpmap:8 PCMA/8000\r\n",
        "a=rtpmap:0 PCMU/8000\r\n",
        "a=label:backup-audio\r\n",
        "a=sendonly\r\n",
    );
    c.process_offer(offer).await.unwrap();
    let answer = c.create_answer().await.unwrap();

    let streams = c.streams().await;
    assert_eq!(streams.len(), 2);
    assert_eq!(streams[0].stream_id, "main-audio");
    assert_eq!(streams[0].payload_type, 0);
    assert_eq!(streams[0].direction, Direction::SendRecv);
    assert_eq!(streams[1].stream_id, "backup-audio");
    assert_eq!(streams[1].payload_type, 8);
    assert_eq!(streams[1].direction, Direction::SendOnly);
    assert_ne!(streams[0].local_port, streams[1].local_port);

    // Secondary m-line's port came out of the shared pool; primary (index 0)
    // plus one secondary port are now in use out of a 6-port pool.
    assert_eq!(manager.available_ports(), 4);

    let mut answer_lines = answer.lines().filter(|l| l.starts_with("m="));
    assert!(answer_lines.next().unwrap().starts_with("m=audio"));
    assert!(answer_lines.next().unwrap().starts_with("m=audio"));
}

/// A full round trip between two compatible builders leaves both
/// completed with a non-null media session.
#[tokio::test]
async fn round_trip_between_two_builders_completes_both() {
    let manager1 = test_manager(base_config());
    let manager2 = test_manager(ManagerConfig {
        min_port: 20000,
        max_port: 20010,
        ..base_config()
    });

    manager1.create_builder("uac").await.unwrap();
    let b1 = manager1.get_builder("uac").await.unwrap();
    manager2.create_builder("uas").await.unwrap();
    let b2 = manager2.get_builder("uas").await.unwrap();

    let offer = b1.create_offer().await.unwrap();
    b2.process_offer(&offer).await.unwrap();
    let answer = b2.create_answer().await.unwrap();
    b1.process_answer(&answer).await.unwrap();

    assert_eq!(b1.mode().await, BuilderMode::OfferComplete);
    assert_eq!(b2.mode().await, BuilderMode::AnswerComplete);
    assert!(b1.media_session().await.is_some());
    assert!(b2.media_session().await.is_some());
}

/// Port conservation after shutdown: every port in use is returned to
/// the pool.
#[tokio::test]
async fn shutdown_returns_every_port_to_the_pool() {
    let config = base_config();
    let capacity = ((config.max_port - config.min_port) / config.port_step) as usize + 1;
    let manager = test_manager(config);

    manager.create_builder("A").await.unwrap();
    manager.create_builder("B").await.unwrap();
    let a = manager.get_builder("A").await.unwrap();
    a.create_offer().await.unwrap();

    manager.shutdown().await.unwrap();
    assert_eq!(manager.available_ports(), capacity);
    assert!(manager.active_builders().await.is_empty());
}

/// `min_port == max_port`: pool has exactly one port, so
/// `max_concurrent_builders` can be at most 1 too — the second
/// `create_builder` hits that cap at the same instant it would have
/// found the pool empty.
#[tokio::test]
async fn single_port_pool_exhausts_after_first_builder() {
    let config = ManagerConfig {
        min_port: 10000,
        max_port: 10000,
        port_step: 2,
        max_concurrent_builders: 1,
        ..base_config()
    };
    let manager = test_manager(config);
    manager.create_builder("only").await.unwrap();
    assert!(matches!(
        manager.create_builder("second").await,
        Err(BuilderError::CapacityExceeded { limit: 1 })
    ));
}

/// Releasing (or fetching) a reaped builder's session id returns `NotFound`.
#[tokio::test]
async fn release_of_unknown_session_id_is_not_found() {
    let manager = test_manager(base_config());
    assert!(matches!(
        manager.release_builder("ghost").await,
        Err(BuilderError::NotFound { .. })
    ));
    assert!(manager.get_builder("ghost").await.is_none());
}

#[tokio::test]
async fn duplicate_session_id_is_rejected() {
    let manager = test_manager(base_config());
    manager.create_builder("dup").await.unwrap();
    assert!(matches!(
        manager.create_builder("dup").await,
        Err(BuilderError::Duplicate { .. })
    ));
}

#[tokio::test]
async fn capacity_exceeded_once_max_concurrent_builders_reached() {
    let config = ManagerConfig {
        min_port: 10000,
        max_port: 10020,
        max_concurrent_builders: 2,
        ..base_config()
    };
    let manager = test_manager(config);
    manager.create_builder("one").await.unwrap();
    manager.create_builder("two").await.unwrap();
    assert!(matches!(
        manager.create_builder("three").await,
        Err(BuilderError::CapacityExceeded { limit: 2 })
    ));
}

#[tokio::test]
async fn mline_count_mismatch_is_rejected() {
    let manager = test_manager(base_config());
    manager.create_builder("A").await.unwrap();
    let b = manager.get_builder("A").await.unwrap();
    b.create_offer().await.unwrap();

    let answer = concat!(
        "v=0\r\n",
        "o=- 1 2 IN IP4 192.168.1.50\r\n",
        "s=peer\r\n",
        "c=IN IP4 192.168.1.50\r\n",
        "t=0 0\r\n",
        "m=audio 20000 RTP/AVP 0\r\n",
        "a=sendrecv\r\n",
        "m=audio 20002 RTP/AVP 0\r\n",
        "a=sendrecv\r\n",
    );
    assert!(matches!(
        b.process_answer(answer).await,
        Err(BuilderError::MlineCountMismatch {
            offered: 1,
            answered: 2
        })
    ));
    assert_eq!(b.mode().await, BuilderMode::Error);
}

/// A small deadline plus a factory that never returns forces
/// `DeadlineExceeded` instead of hanging forever.
#[tokio::test(start_paused = true)]
async fn negotiation_deadline_is_enforced() {
    use async_trait::async_trait;
    use std::net::SocketAddr;
    use std::sync::Arc;

    struct StallingTransportFactory;

    #[async_trait]
    impl RtpTransportFactory for StallingTransportFactory {
        async fn create(
            &self,
            _local_addr: SocketAddr,
            _remote_addr: SocketAddr,
            _buffer_size: usize,
        ) -> Result<Arc<dyn RtpTransport>> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    let manager = BuilderManager::new(
        base_config(),
        Arc::new(StallingTransportFactory),
        Arc::new(common::MemSessionFactory::default()),
        Arc::new(common::MemMediaFactory),
        common::noop_callbacks(),
    )
    .unwrap();

    let builder = manager
        .create_builder_with_deadline("stalled", Some(Duration::from_millis(50)))
        .await
        .unwrap();
    builder.create_offer().await.unwrap();

    let answer = concat!(
        "v=0\r\n",
        "o=- 1 2 IN IP4 192.168.1.50\r\n",
        "s=peer\r\n",
        "c=IN IP4 192.168.1.50\r\n",
        "t=0 0\r\n",
        "m=audio 20000 RTP/AVP 0\r\n",
        "a=sendrecv\r\n",
    );

    let result =
        tokio::time::timeout(Duration::from_secs(5), builder.process_answer(answer)).await;
    assert!(matches!(result, Ok(Err(BuilderError::DeadlineExceeded))));
}
