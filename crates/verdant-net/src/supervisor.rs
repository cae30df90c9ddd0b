//! Link-lifecycle state machine.

use crate::{NetError, NetResult, WifiCredentials, WifiDriver, WifiEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};
use verdant_runtime::{AuditSink, LinkBits, LivenessToken, SHUTDOWN, TIME_SYNCED, WIFI_UP};
use verdant_store::Store;

/// Consecutive disconnects that exhaust the retry budget and fail the
/// supervisor.
pub const MAX_RETRY: u32 = 6;

/// Supervisor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Uninitialized,
    /// No credentials stored; waiting for commissioning.
    Idle,
    Connecting,
    Up,
    /// Link lost, reconnect in progress.
    Degraded,
    /// Retry budget exhausted; needs new credentials or a reset.
    Failed,
}

/// Requests other tasks can make of the supervisor.
pub enum NetCommand {
    SetCredentials {
        ssid: String,
        psk: String,
        reply: Option<oneshot::Sender<NetResult<()>>>,
    },
}

/// Cloneable handle for submitting supervisor requests.
#[derive(Clone)]
pub struct NetHandle {
    tx: mpsc::Sender<NetCommand>,
}

impl NetHandle {
    /// Install new credentials and wait for the outcome.
    pub async fn set_credentials(&self, ssid: &str, psk: &str) -> NetResult<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(NetCommand::SetCredentials {
                ssid: ssid.to_string(),
                psk: psk.to_string(),
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| NetError::Closed)?;
        reply_rx.await.map_err(|_| NetError::Closed)?
    }

    /// Install new credentials without waiting (callback contexts).
    pub fn try_set_credentials(&self, ssid: &str, psk: &str) -> NetResult<()> {
        self.tx
            .try_send(NetCommand::SetCredentials {
                ssid: ssid.to_string(),
                psk: psk.to_string(),
                reply: None,
            })
            .map_err(|_| NetError::Closed)
    }
}

/// Owns the Wi-Fi driver and the `WIFI_UP`/`TIME_SYNCED` bits.
pub struct NetworkSupervisor {
    driver: Box<dyn WifiDriver>,
    events: mpsc::Receiver<WifiEvent>,
    commands: mpsc::Receiver<NetCommand>,
    store: Store,
    bits: Arc<LinkBits>,
    audit: AuditSink,
    liveness: LivenessToken,
    state: SupervisorState,
    retries: u32,
    /// Whether a dedicated time transport reports sync; without one the
    /// first up-transition counts as synced.
    has_time_transport: bool,
    stability_tx: watch::Sender<Option<Instant>>,
    rssi_tx: watch::Sender<Option<i8>>,
}

impl NetworkSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        driver: Box<dyn WifiDriver>,
        events: mpsc::Receiver<WifiEvent>,
        store: Store,
        bits: Arc<LinkBits>,
        audit: AuditSink,
        liveness: LivenessToken,
        has_time_transport: bool,
    ) -> (Self, NetHandle) {
        let (command_tx, commands) = mpsc::channel(8);
        let (stability_tx, _) = watch::channel(None);
        let (rssi_tx, _) = watch::channel(None);
        (
            Self {
                driver,
                events,
                commands,
                store,
                bits,
                audit,
                liveness,
                state: SupervisorState::Uninitialized,
                retries: 0,
                has_time_transport,
                stability_tx,
                rssi_tx,
            },
            NetHandle { tx: command_tx },
        )
    }

    /// Instant of the last down→up transition; `None` while down.
    pub fn stability_watch(&self) -> watch::Receiver<Option<Instant>> {
        self.stability_tx.subscribe()
    }

    /// Last reported signal strength.
    pub fn rssi_watch(&self) -> watch::Receiver<Option<i8>> {
        self.rssi_tx.subscribe()
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Bring up the stack and apply stored credentials, if any.
    pub fn init(&mut self) -> NetResult<()> {
        match WifiCredentials::load(&self.store) {
            Ok(Some(creds)) => {
                info!(ssid = %creds.ssid, "Applying stored credentials");
                self.apply(&creds)
            }
            Ok(None) => {
                info!("No stored credentials, staying idle for commissioning");
                self.state = SupervisorState::Idle;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Stored credentials unreadable, staying idle");
                self.state = SupervisorState::Idle;
                Ok(())
            }
        }
    }

    /// Validate, persist, and apply new credentials; resets the retry
    /// budget and forces a reconnect.
    pub fn set_credentials(&mut self, ssid: &str, psk: &str) -> NetResult<()> {
        let creds = WifiCredentials::new(ssid, psk);
        creds.save(&self.store)?;
        self.retries = 0;
        let _ = self.driver.disconnect();
        self.audit.emit(format!("net: credentials replaced (ssid {ssid})"));
        self.apply(&creds)
    }

    /// Advance the state machine on a driver event.
    pub fn on_event(&mut self, event: WifiEvent) {
        match event {
            WifiEvent::Connected => {
                info!("Link up");
                self.state = SupervisorState::Up;
                self.retries = 0;
                self.bits.set(WIFI_UP);
                if !self.has_time_transport {
                    self.bits.set(TIME_SYNCED);
                }
                let _ = self.stability_tx.send(Some(Instant::now()));
                let _ = self.rssi_tx.send(self.driver.rssi());
            }
            WifiEvent::Disconnected { reason } => {
                self.bits.clear(WIFI_UP);
                let _ = self.stability_tx.send(None);
                let _ = self.rssi_tx.send(None);
                match self.state {
                    SupervisorState::Idle
                    | SupervisorState::Failed
                    | SupervisorState::Uninitialized => {}
                    _ => self.retry(&reason),
                }
            }
            WifiEvent::TimeSynced => {
                self.bits.set(TIME_SYNCED);
            }
        }
    }

    fn retry(&mut self, reason: &str) {
        self.retries += 1;
        if self.retries >= MAX_RETRY {
            error!(reason, retries = self.retries, "Retry budget exhausted");
            self.audit
                .emit(format!("net: link failed after {} retries ({reason})", self.retries));
            self.state = SupervisorState::Failed;
            return;
        }
        self.state = if self.state == SupervisorState::Up {
            SupervisorState::Degraded
        } else {
            self.state
        };
        warn!(reason, attempt = self.retries, "Link lost, reconnecting");
        if let Err(err) = self.driver.connect() {
            warn!(error = %err, "Reconnect attempt failed at the driver");
        }
    }

    fn apply(&mut self, creds: &WifiCredentials) -> NetResult<()> {
        self.driver.configure(&creds.ssid, &creds.psk)?;
        self.driver.connect()?;
        self.state = SupervisorState::Connecting;
        Ok(())
    }

    fn on_command(&mut self, command: NetCommand) {
        match command {
            NetCommand::SetCredentials { ssid, psk, reply } => {
                let result = self.set_credentials(&ssid, &psk);
                if let Err(err) = &result {
                    warn!(error = %err, "set_credentials rejected");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
        }
    }

    /// Run until shutdown.
    pub async fn run(mut self) {
        if let Err(err) = self.init() {
            error!(error = %err, "Network supervisor init failed");
            self.audit.emit(format!("net: init failed: {err}"));
        }
        loop {
            tokio::select! {
                _ = self.bits.wait_for(SHUTDOWN) => break,
                Some(event) = self.events.recv() => self.on_event(event),
                Some(command) = self.commands.recv() => self.on_command(command),
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            }
            self.liveness.touch();
        }
        info!("Network supervisor stopped");
    }
}
