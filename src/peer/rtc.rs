use crate::config::CallConfig;
use crate::error::Result;
use crate::peer::media::{LocalStream, RemoteStream, TrackKind};
use crate::peer::transport::{Transport, TransportEvent, TransportEvents, TransportFactory};
use crate::peer::types::{Candidate, SdpKind, ServerConfig, SessionDescription};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// Создаёт конфигурацию для peer connection
fn rtc_config(servers: &[ServerConfig], candidate_pool_size: u8) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: get_user_ice_servers(servers),
        ice_candidate_pool_size: candidate_pool_size,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

pub fn get_user_ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    Ok(match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.payload)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.payload)?,
    })
}

/// Соединения на webrtc-rs
pub struct RtcTransportFactory {
    candidate_pool_size: u8,
}

impl RtcTransportFactory {
    pub fn new(config: &CallConfig) -> Self {
        Self {
            candidate_pool_size: config.ice_candidate_pool_size,
        }
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn connect(
        &self,
        ice_servers: &[ServerConfig],
    ) -> Result<(Box<dyn Transport>, TransportEvents)> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(
            api.new_peer_connection(rtc_config(ice_servers, self.candidate_pool_size))
                .await?,
        );
        let (tx, rx) = mpsc::unbounded_channel();

        let candidates_tx = tx.clone();
        pc.on_ice_candidate(Box::new(move |cand: Option<RTCIceCandidate>| {
            let event = match cand {
                Some(c) => match c.to_json() {
                    Ok(init) => Some(TransportEvent::LocalCandidate(Candidate::from(init))),
                    Err(e) => {
                        tracing::warn!("Failed to serialize local candidate: {e}");
                        None
                    }
                },
                // cand == None означает конец сбора
                None => Some(TransportEvent::GatheringComplete),
            };
            if let Some(event) = event {
                let _ = candidates_tx.send(event);
            }
            Box::pin(async {})
        }));

        // on_track вызывается на каждый трек, поток сообщаем один раз
        let mut seen_streams = HashSet::new();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let id = track.stream_id();
                if seen_streams.insert(id.clone()) {
                    let _ = tx.send(TransportEvent::RemoteStream(RemoteStream { id }));
                }
                Box::pin(async {})
            },
        ));

        pc.on_peer_connection_state_change(Box::new(move |st: RTCPeerConnectionState| {
            tracing::info!("Peer connection state changed to: {st:?}");
            Box::pin(async {})
        }));

        let transport = RtcTransport {
            pc,
            tracks: Mutex::new(Vec::new()),
        };
        Ok((Box::new(transport), rx))
    }
}

pub struct RtcTransport {
    pc: Arc<RTCPeerConnection>,
    tracks: Mutex<Vec<Arc<TrackLocalStaticSample>>>,
}

impl RtcTransport {
    /// Треки, в которые захват пишет сэмплы
    pub fn local_tracks(&self) -> Vec<Arc<TrackLocalStaticSample>> {
        self.tracks.lock().clone()
    }
}

#[async_trait]
impl Transport for RtcTransport {
    async fn add_stream(&self, stream: &LocalStream) -> Result<()> {
        for track in &stream.tracks {
            let mime_type = match track.kind {
                TrackKind::Audio => MIME_TYPE_OPUS,
                TrackKind::Video => MIME_TYPE_VP8,
            };
            let local = Arc::new(TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: mime_type.to_owned(),
                    ..Default::default()
                },
                track.id.clone(),
                stream.id.clone(),
            ));
            self.pc
                .add_track(Arc::clone(&local) as Arc<dyn TrackLocal + Send + Sync>)
                .await?;
            self.tracks.lock().push(local);
        }
        Ok(())
    }

    async fn add_receive_only(&self) -> Result<()> {
        for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
            self.pc
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Recvonly,
                        send_encodings: vec![],
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn has_remote_description(&self) -> bool {
        self.pc.remote_description().await.is_some()
    }

    async fn add_candidate(&self, candidate: Candidate) -> Result<()> {
        self.pc.add_ice_candidate(candidate.into()).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}
