//! Secure-session server for the local channel.
//!
//! One endpoint, three frame shapes: plaintext JSON provisioning frames,
//! a JSON handshake that establishes the AEAD session, and sealed binary
//! control frames. The first byte decides: `{` is JSON, anything else is
//! a sealed frame.

use crate::{
    short_name, ArbiterHandle, BeaconTransport, CommResult, CommissioningError, ReplayWindow,
    DEVICE_ID_LEN, MAX_FRAME_LEN,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use verdant_control::{ActuatorSnapshot, CommandQueue, SharedSnapshot};
use verdant_crypto::{aead_open, hkdf_sha256, EphemeralKeypair, AEAD_IV_LEN, AEAD_TAG_LEN};
use verdant_runtime::{AuditSink, LinkBits, LivenessToken, LOCAL_CHANNEL_ACTIVE, SHUTDOWN};
use verdant_store::Store;
use verdant_types::{Actor, Command, ControlFrame, HandshakeFrame, ProvisioningFrame, HANDSHAKE_CMD};

/// HKDF salt binding the session key to this protocol.
const SESSION_SALT: &[u8] = b"BLE-POP";

/// Derived session-key length.
const SESSION_KEY_LEN: usize = 32;

/// Hex length of an uncompressed P-256 public key.
const CLIENT_PUB_HEX_LEN: usize = 130;

/// Applies validated provisioning frames (credentials, timezone).
pub trait ProvisioningHandler: Send {
    fn apply(&self, frame: &ProvisioningFrame) -> CommResult<()>;
}

impl<F> ProvisioningHandler for F
where
    F: Fn(&ProvisioningFrame) -> CommResult<()> + Send,
{
    fn apply(&self, frame: &ProvisioningFrame) -> CommResult<()> {
        self(frame)
    }
}

/// Counters surfaced through audit and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionMetrics {
    /// Sealed frames that failed the AEAD tag check.
    pub auth_failures: u64,
    /// Sealed frames rejected by the anti-replay window.
    pub replay_rejects: u64,
    /// Frames dropped before reaching either check.
    pub malformed_frames: u64,
}

struct Session {
    key: [u8; SESSION_KEY_LEN],
    replay: ReplayWindow,
}

/// The local-channel protocol endpoint.
pub struct SessionServer {
    store: Store,
    queue: Arc<CommandQueue>,
    snapshot: SharedSnapshot,
    transport: Box<dyn BeaconTransport>,
    frames: mpsc::Receiver<Vec<u8>>,
    handler: Box<dyn ProvisioningHandler>,
    arbiter: ArbiterHandle,
    bits: Arc<LinkBits>,
    audit: AuditSink,
    liveness: LivenessToken,
    pop: String,
    device_id: [u8; DEVICE_ID_LEN],
    session: Option<Session>,
    advertising: bool,
    metrics: SessionMetrics,
}

impl SessionServer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        queue: Arc<CommandQueue>,
        snapshot: SharedSnapshot,
        transport: Box<dyn BeaconTransport>,
        frames: mpsc::Receiver<Vec<u8>>,
        handler: Box<dyn ProvisioningHandler>,
        arbiter: ArbiterHandle,
        bits: Arc<LinkBits>,
        audit: AuditSink,
        liveness: LivenessToken,
        pop: String,
        device_id: [u8; DEVICE_ID_LEN],
    ) -> Self {
        Self {
            store,
            queue,
            snapshot,
            transport,
            frames,
            handler,
            arbiter,
            bits,
            audit,
            liveness,
            pop,
            device_id,
            session: None,
            advertising: false,
            metrics: SessionMetrics::default(),
        }
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.metrics
    }

    /// Process one inbound frame; returns the response frame, if any.
    /// Sealed-frame failures are silent by design.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        if frame.is_empty() || frame.len() > MAX_FRAME_LEN {
            self.metrics.malformed_frames += 1;
            return None;
        }
        if frame[0] == b'{' {
            Some(self.handle_json(frame))
        } else {
            self.handle_sealed(frame);
            None
        }
    }

    fn handle_json(&mut self, frame: &[u8]) -> Vec<u8> {
        let value: serde_json::Value = match serde_json::from_slice(frame) {
            Ok(value) => value,
            Err(err) => {
                self.metrics.malformed_frames += 1;
                return error_response(&format!("invalid JSON: {err}"));
            }
        };

        if value.get("cmd").and_then(|c| c.as_str()) == Some(HANDSHAKE_CMD) {
            match serde_json::from_value::<HandshakeFrame>(value) {
                Ok(handshake) => match self.handshake(&handshake) {
                    Ok(device_pub) => {
                        info!("Commissioning session established");
                        ok_response(Some(&device_pub))
                    }
                    Err(err) => {
                        warn!(error = %err, "Handshake rejected");
                        self.audit.emit(format!("commissioning: handshake rejected: {err}"));
                        error_response("handshake rejected")
                    }
                },
                Err(err) => {
                    self.metrics.malformed_frames += 1;
                    error_response(&format!("invalid handshake: {err}"))
                }
            }
        } else {
            match serde_json::from_value::<ProvisioningFrame>(value) {
                Ok(provisioning) => match self.provision(&provisioning) {
                    Ok(()) => ok_response(None),
                    Err(err) => {
                        warn!(error = %err, "Provisioning rejected");
                        error_response(&err.to_string())
                    }
                },
                Err(err) => {
                    self.metrics.malformed_frames += 1;
                    error_response(&format!("invalid provisioning frame: {err}"))
                }
            }
        }
    }

    /// Establish a session: ECDH, PoP-bound KDF, fresh persisted window.
    fn handshake(&mut self, frame: &HandshakeFrame) -> CommResult<String> {
        if frame.cmd != HANDSHAKE_CMD {
            return Err(CommissioningError::Malformed("not a handshake".into()));
        }
        if frame.client_pub.len() != CLIENT_PUB_HEX_LEN {
            return Err(CommissioningError::Malformed(format!(
                "client_pub must be {CLIENT_PUB_HEX_LEN} hex chars"
            )));
        }
        let client_pub = hex::decode(&frame.client_pub)
            .map_err(|_| CommissioningError::Malformed("client_pub not hex".into()))?;

        let keypair = EphemeralKeypair::generate();
        let shared = keypair.diffie_hellman(&client_pub)?;
        // The KDF binds the device's own PoP, not the peer's claim: a
        // commissioner with the wrong secret derives a different key and
        // every sealed frame dies at the tag check.
        let derived = hkdf_sha256(SESSION_SALT, &shared, self.pop.as_bytes(), SESSION_KEY_LEN)?;
        let mut key = [0u8; SESSION_KEY_LEN];
        key.copy_from_slice(&derived);

        // The fresh window is durable before the first sealed frame can
        // arrive.
        let replay = ReplayWindow::fresh();
        replay.persist(&self.store)?;
        self.session = Some(Session { key, replay });

        Ok(hex::encode(keypair.public_bytes()))
    }

    fn provision(&mut self, frame: &ProvisioningFrame) -> CommResult<()> {
        if frame.ssid.is_empty() {
            return Err(CommissioningError::Provisioning("empty ssid".into()));
        }
        self.handler.apply(frame)?;
        self.arbiter.note_provisioned();
        self.audit
            .emit(format!("commissioning: provisioned ssid {}", frame.ssid));
        Ok(())
    }

    /// Sealed control frame: `iv ‖ ciphertext ‖ tag`. All failures drop
    /// the frame without a response.
    fn handle_sealed(&mut self, frame: &[u8]) {
        let Some(session) = self.session.as_mut() else {
            debug!("Sealed frame without a session, dropping");
            self.metrics.malformed_frames += 1;
            return;
        };
        if frame.len() < AEAD_IV_LEN + AEAD_TAG_LEN {
            self.metrics.malformed_frames += 1;
            return;
        }

        let mut iv = [0u8; AEAD_IV_LEN];
        iv.copy_from_slice(&frame[..AEAD_IV_LEN]);
        let plaintext = match aead_open(&session.key, &iv, b"", &frame[AEAD_IV_LEN..]) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                self.metrics.auth_failures += 1;
                debug!("Sealed frame failed authentication, dropping");
                return;
            }
        };

        let control: ControlFrame = match serde_json::from_slice(&plaintext) {
            Ok(control) => control,
            Err(err) => {
                self.metrics.malformed_frames += 1;
                debug!(error = %err, "Sealed frame carried invalid JSON, dropping");
                return;
            }
        };

        let mut candidate = session.replay;
        if !candidate.check(control.ctr) {
            self.metrics.replay_rejects += 1;
            debug!(ctr = control.ctr, "Replay rejected");
            return;
        }

        // Persist before enqueue: a crash here loses one command but can
        // never admit a replay.
        if let Err(err) = candidate.persist(&self.store) {
            warn!(error = %err, "Replay window persistence failed, dropping frame");
            self.audit
                .emit(format!("commissioning: window persist failed: {err}"));
            return;
        }
        session.replay = candidate;

        let current = ActuatorSnapshot::read(&self.snapshot);
        let cmd = Command::new(
            Actor::LocalRadio,
            u64::from(control.ctr),
            Utc::now().timestamp(),
            control.light.unwrap_or(current.light_percent),
            control.pump.unwrap_or(current.pump_percent),
            control.ramp_ms.unwrap_or(0),
        );
        debug!(ctr = control.ctr, light = cmd.light_percent, pump = cmd.pump_percent, "Control frame accepted");
        self.queue.submit(cmd);
    }

    /// The persisted window as it would be reloaded after a reboot.
    pub fn restore_window(&self) -> CommResult<ReplayWindow> {
        Ok(ReplayWindow::load(&self.store)?)
    }

    fn sync_advertising(&mut self) {
        let should_advertise = self.bits.contains(LOCAL_CHANNEL_ACTIVE);
        if should_advertise && !self.advertising {
            let name = short_name(&self.device_id);
            match self.transport.start_advertising(&name, &self.device_id) {
                Ok(()) => {
                    info!(name = %name, "Local channel advertising");
                    self.advertising = true;
                }
                Err(err) => warn!(error = %err, "Failed to start advertising"),
            }
        } else if !should_advertise && self.advertising {
            if let Err(err) = self.transport.stop_advertising() {
                warn!(error = %err, "Failed to stop advertising");
            }
            self.advertising = false;
            // Channel gone: the session dies with it.
            self.session = None;
            info!("Local channel closed");
        }
    }

    /// Run until shutdown: follow the arbiter's bit and serve frames.
    pub async fn run(mut self) {
        info!("Session server started");
        loop {
            self.sync_advertising();
            tokio::select! {
                _ = self.bits.wait_for(SHUTDOWN) => break,
                maybe_frame = self.frames.recv() => {
                    match maybe_frame {
                        Some(frame) => {
                            if let Some(response) = self.handle_frame(&frame) {
                                if let Err(err) = self.transport.respond(&response) {
                                    warn!(error = %err, "Failed to send response");
                                }
                            }
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(250)) => {}
            }
            self.liveness.touch();
        }
        info!("Session server stopped");
    }
}

fn ok_response(device_pub: Option<&str>) -> Vec<u8> {
    let body = match device_pub {
        Some(device_pub) => serde_json::json!({"status": "ok", "device_pub": device_pub}),
        None => serde_json::json!({"status": "ok"}),
    };
    body.to_string().into_bytes()
}

fn error_response(reason: &str) -> Vec<u8> {
    serde_json::json!({"status": "error", "reason": reason})
        .to_string()
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBeacon;
    use std::sync::Mutex;
    use verdant_crypto::aead_seal;
    use verdant_runtime::{audit_channel, Liveness};
    use verdant_store::{MemoryKv, StoreKeys};

    struct Fixture {
        server: SessionServer,
        queue: Arc<CommandQueue>,
        store: Store,
        provisioned: Arc<Mutex<Vec<ProvisioningFrame>>>,
    }

    fn fixture() -> Fixture {
        let store = Store::new(Arc::new(MemoryKv::new()));
        let queue = Arc::new(CommandQueue::with_default_capacity());
        let snapshot = ActuatorSnapshot::new_shared();
        let bits = Arc::new(LinkBits::new());
        let (audit, _rx) = audit_channel(16);
        let (_frame_tx, frame_rx) = mpsc::channel(8);
        let provisioned: Arc<Mutex<Vec<ProvisioningFrame>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = provisioned.clone();
        let handler = move |frame: &ProvisioningFrame| {
            if frame.ssid == "reject-me" {
                return Err(CommissioningError::Provisioning("bad network".into()));
            }
            sink.lock().unwrap().push(frame.clone());
            Ok(())
        };
        let server = SessionServer::new(
            store.clone(),
            queue.clone(),
            snapshot,
            Box::new(MemoryBeacon::new()),
            frame_rx,
            Box::new(handler),
            ArbiterHandle::new(),
            bits,
            audit,
            Liveness::new().register("commissioning"),
            "garden-pop-1234".to_string(),
            [0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
        );
        Fixture {
            server,
            queue,
            store,
            provisioned,
        }
    }

    fn do_handshake(f: &mut Fixture) -> [u8; SESSION_KEY_LEN] {
        let client = EphemeralKeypair::generate();
        let frame = serde_json::json!({
            "cmd": "handshake",
            "client_pub": hex::encode(client.public_bytes()),
            "pop": "garden-pop-1234",
        });
        let response = f
            .server
            .handle_frame(frame.to_string().as_bytes())
            .expect("handshake must respond");
        let response: serde_json::Value = serde_json::from_slice(&response).unwrap();
        assert_eq!(response["status"], "ok");

        let device_pub = hex::decode(response["device_pub"].as_str().unwrap()).unwrap();
        let shared = client.diffie_hellman(&device_pub).unwrap();
        let derived = hkdf_sha256(SESSION_SALT, &shared, b"garden-pop-1234", SESSION_KEY_LEN)
            .unwrap();
        let mut key = [0u8; SESSION_KEY_LEN];
        key.copy_from_slice(&derived);
        key
    }

    fn sealed_frame(key: &[u8; SESSION_KEY_LEN], iv_seed: u8, body: &serde_json::Value) -> Vec<u8> {
        let iv = [iv_seed; AEAD_IV_LEN];
        let sealed = aead_seal(key, &iv, b"", body.to_string().as_bytes()).unwrap();
        let mut frame = iv.to_vec();
        frame.extend_from_slice(&sealed);
        frame
    }

    #[test]
    fn provisioning_frame_reaches_handler() {
        let mut f = fixture();
        let response = f
            .server
            .handle_frame(br#"{"ssid":"Lab","psk":"secret","tz":"UTC"}"#)
            .unwrap();
        let response: serde_json::Value = serde_json::from_slice(&response).unwrap();
        assert_eq!(response["status"], "ok");

        let seen = f.provisioned.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].ssid, "Lab");
        assert_eq!(seen[0].psk.as_deref(), Some("secret"));
        assert_eq!(seen[0].tz.as_deref(), Some("UTC"));
    }

    #[test]
    fn rejected_provisioning_returns_error() {
        let mut f = fixture();
        let response = f.server.handle_frame(br#"{"ssid":"reject-me"}"#).unwrap();
        let response: serde_json::Value = serde_json::from_slice(&response).unwrap();
        assert_eq!(response["status"], "error");
        assert!(f.provisioned.lock().unwrap().is_empty());
    }

    #[test]
    fn handshake_derives_matching_keys() {
        let mut f = fixture();
        let key = do_handshake(&mut f);

        // A frame sealed with the client-side derivation must open on the
        // device: both sides hold the same key.
        let frame = sealed_frame(&key, 1, &serde_json::json!({"ctr": 1, "light": 80}));
        f.server.handle_frame(&frame);
        let cmd = f.queue.try_recv().unwrap();
        assert_eq!(cmd.actor, Actor::LocalRadio);
        assert_eq!(cmd.light_percent, 80);
        assert_eq!(cmd.seq, 1);
    }

    #[test]
    fn wrong_pop_fails_to_communicate() {
        let mut f = fixture();
        let client = EphemeralKeypair::generate();
        let frame = serde_json::json!({
            "cmd": "handshake",
            "client_pub": hex::encode(client.public_bytes()),
            "pop": "wrong-pop",
        });
        let response = f
            .server
            .handle_frame(frame.to_string().as_bytes())
            .unwrap();
        let response: serde_json::Value = serde_json::from_slice(&response).unwrap();
        // Handshake itself succeeds (the device cannot tell yet)...
        assert_eq!(response["status"], "ok");

        // ...but the client key, derived with the true PoP on our side
        // only, never matches: sealed frames die at the tag check.
        let device_pub = hex::decode(response["device_pub"].as_str().unwrap()).unwrap();
        let shared = client.diffie_hellman(&device_pub).unwrap();
        let derived =
            hkdf_sha256(SESSION_SALT, &shared, b"wrong-pop", SESSION_KEY_LEN).unwrap();
        let mut wrong_key = [0u8; SESSION_KEY_LEN];
        wrong_key.copy_from_slice(&derived);
        // Device derived with "garden-pop-1234": a frame sealed under the
        // client's wrong-PoP key must not decrypt.
        let frame = sealed_frame(&wrong_key, 1, &serde_json::json!({"ctr": 1}));
        f.server.handle_frame(&frame);
        assert!(f.queue.try_recv().is_none());
        assert_eq!(f.server.metrics().auth_failures, 1);
    }

    #[test]
    fn malformed_handshake_rejected() {
        let mut f = fixture();
        let response = f
            .server
            .handle_frame(br#"{"cmd":"handshake","client_pub":"abc","pop":"x"}"#)
            .unwrap();
        let response: serde_json::Value = serde_json::from_slice(&response).unwrap();
        assert_eq!(response["status"], "error");
    }

    #[test]
    fn sealed_frame_without_session_dropped() {
        let mut f = fixture();
        f.server.handle_frame(&[0u8; 64]);
        assert!(f.queue.try_recv().is_none());
        assert_eq!(f.server.metrics().malformed_frames, 1);
    }

    #[test]
    fn tampered_sealed_frame_dropped_silently() {
        let mut f = fixture();
        let key = do_handshake(&mut f);
        let mut frame = sealed_frame(&key, 1, &serde_json::json!({"ctr": 1}));
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        f.server.handle_frame(&frame);
        assert!(f.queue.try_recv().is_none());
        assert_eq!(f.server.metrics().auth_failures, 1);
    }

    #[test]
    fn replayed_frame_rejected() {
        let mut f = fixture();
        let key = do_handshake(&mut f);
        let frame = sealed_frame(&key, 5, &serde_json::json!({"ctr": 5, "light": 50}));
        f.server.handle_frame(&frame);
        assert!(f.queue.try_recv().is_some());

        f.server.handle_frame(&frame);
        assert!(f.queue.try_recv().is_none());
        assert_eq!(f.server.metrics().replay_rejects, 1);
    }

    #[test]
    fn window_persisted_before_enqueue() {
        let mut f = fixture();
        let key = do_handshake(&mut f);
        let frame = sealed_frame(&key, 7, &serde_json::json!({"ctr": 7}));
        f.server.handle_frame(&frame);

        assert_eq!(f.store.load_u32(StoreKeys::BLE_PEER_COUNTER).unwrap(), 7);
        assert_eq!(f.store.load_u64(StoreKeys::BLE_PEER_WINDOW).unwrap(), 1);
    }

    #[test]
    fn replay_rejected_across_reboot() {
        let mut f = fixture();
        let key = do_handshake(&mut f);
        let frame = sealed_frame(&key, 5, &serde_json::json!({"ctr": 5}));
        f.server.handle_frame(&frame);
        assert!(f.queue.try_recv().is_some());

        // Power cycle: a new server over the same store, session resumed
        // with the same key and the persisted window.
        let store = f.store.clone();
        let mut rebooted = fixture();
        rebooted.server.store = store;
        rebooted.server.session = Some(Session {
            key,
            replay: ReplayWindow::load(&rebooted.server.store).unwrap(),
        });

        rebooted.server.handle_frame(&frame);
        assert!(rebooted.queue.try_recv().is_none());
        assert_eq!(rebooted.server.metrics().replay_rejects, 1);
    }

    #[test]
    fn missing_fields_keep_current_actuator_state() {
        let mut f = fixture();
        {
            let mut snapshot = f.server.snapshot.lock().unwrap();
            snapshot.light_percent = 60;
            snapshot.pump_percent = 35;
        }
        let key = do_handshake(&mut f);
        let frame = sealed_frame(&key, 2, &serde_json::json!({"ctr": 2, "pump": 10}));
        f.server.handle_frame(&frame);
        let cmd = f.queue.try_recv().unwrap();
        assert_eq!(cmd.light_percent, 60);
        assert_eq!(cmd.pump_percent, 10);
    }

    #[test]
    fn handshake_resets_window() {
        let mut f = fixture();
        let key = do_handshake(&mut f);
        let frame = sealed_frame(&key, 9, &serde_json::json!({"ctr": 9}));
        f.server.handle_frame(&frame);
        assert_eq!(f.store.load_u32(StoreKeys::BLE_PEER_COUNTER).unwrap(), 9);

        // A second handshake starts a fresh session and window.
        let key2 = do_handshake(&mut f);
        assert_eq!(f.store.load_u32(StoreKeys::BLE_PEER_COUNTER).unwrap(), 0);
        let frame = sealed_frame(&key2, 1, &serde_json::json!({"ctr": 1, "light": 5}));
        f.server.handle_frame(&frame);
        assert_eq!(f.queue.try_recv().unwrap().light_percent, 5);
    }

    #[test]
    fn oversized_frame_dropped() {
        let mut f = fixture();
        let frame = vec![b'x'; MAX_FRAME_LEN + 1];
        assert!(f.server.handle_frame(&frame).is_none());
        assert_eq!(f.server.metrics().malformed_frames, 1);
    }
}
