//! Task-graph assembly and CLI entrypoints.
//!
//! Hardware seams (PWM, radio, Wi-Fi, slots, MQTT) are filled with the
//! hosted reference implementations here; device builds link the same
//! graph against their real drivers.

use crate::config::Config;
use crate::context::AppContext;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use verdant_cloud::{CloudEvent, CloudLink, CloudRouter, MemoryCloud, ReportedState};
use verdant_commissioning::{
    ArbiterConfig, ArbiterHandle, CommResult, CommissioningArbiter, CommissioningError,
    MemoryBeacon, SessionServer,
};
use verdant_control::{ControlPipeline, MemoryPwm, DEFAULT_STEP_MS};
use verdant_net::{MemoryWifi, NetworkSupervisor, WifiDriver, WifiEvent};
use verdant_ota::{HttpImageSource, ImageSource, MemoryImageSource, MemorySlot, UpdatePipeline};
use verdant_runtime::{AuditQueue, CLOUD_SESSION_UP, SHUTDOWN};
use verdant_schedule::ScheduleEngine;
use verdant_store::{FileKv, Store, StoreError, StoreKeys};
use verdant_telemetry::{AuditDrain, HeartbeatTask, StaticProbe};
use verdant_types::{ProvisioningFrame, ResetReason, ScheduleConfig};
use verdant_watchdog::{MemoryWatchdog, SafetyWatchdog};

/// Watchdog cadence on the hosted build.
const PET_INTERVAL: Duration = Duration::from_secs(1);
/// A task silent this long is considered hung.
const STALE_AFTER: Duration = Duration::from_secs(15);

/// Hosted Wi-Fi stand-in: reports link-up as soon as it is asked to
/// connect, so the rest of the graph behaves on loopback networking.
struct HostedWifi {
    inner: MemoryWifi,
    events: mpsc::Sender<WifiEvent>,
}

impl WifiDriver for HostedWifi {
    fn configure(&mut self, ssid: &str, psk: &str) -> verdant_net::NetResult<()> {
        self.inner.configure(ssid, psk)
    }

    fn connect(&mut self) -> verdant_net::NetResult<()> {
        self.inner.connect()?;
        let _ = self.events.try_send(WifiEvent::Connected);
        Ok(())
    }

    fn disconnect(&mut self) -> verdant_net::NetResult<()> {
        self.inner.disconnect()
    }

    fn rssi(&self) -> Option<i8> {
        self.inner.rssi()
    }
}

/// Channel ends that must stay open for the daemon's lifetime; dropping
/// them tells the owning task its driver went away.
pub struct DriverPorts {
    pub wifi_events: mpsc::Sender<WifiEvent>,
    pub local_frames: mpsc::Sender<Vec<u8>>,
    pub cloud_events: mpsc::Sender<CloudEvent>,
}

/// Run the daemon until a termination signal.
pub async fn run_daemon(config: Config) -> anyhow::Result<()> {
    let (context, audit_queue) = AppContext::new(config)?;
    materialize_first_boot(&context);

    let (handles, _ports) = spawn_tasks(&context, audit_queue)?;
    info!(device_id = %context.config.device_id, "Verdant controller running");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    context.bits.trigger_shutdown();
    for handle in handles {
        if tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .is_err()
        {
            warn!("Task did not stop within the shutdown budget");
        }
    }
    Ok(())
}

/// Write the device-provisioned schedule and pump defaults into the store
/// on first boot, so every later reader finds them present.
pub fn materialize_first_boot(context: &AppContext) {
    let store = &context.store;
    if matches!(store.load(StoreKeys::SCHEDULE_CFG), Err(StoreError::NotFound)) {
        if let Ok(bytes) = serde_json::to_vec(&context.config.schedule) {
            if let Err(err) = store.save(StoreKeys::SCHEDULE_CFG, &bytes) {
                warn!(error = %err, "Failed to materialize schedule defaults");
            }
        }
    }
    if matches!(store.load(StoreKeys::PUMP_CFG), Err(StoreError::NotFound)) {
        if let Ok(bytes) = serde_json::to_vec(&context.config.pump.normalized()) {
            if let Err(err) = store.save(StoreKeys::PUMP_CFG, &bytes) {
                warn!(error = %err, "Failed to materialize pump defaults");
            }
        }
    }
}

/// Build and spawn the full task graph.
pub fn spawn_tasks(
    context: &AppContext,
    audit_queue: AuditQueue,
) -> anyhow::Result<(Vec<JoinHandle<()>>, DriverPorts)> {
    let config = context.config.clone();
    let mut handles = Vec::new();

    // Control pipeline: sole writer of the PWM peripheral.
    let pipeline = ControlPipeline::new(
        context.queue.clone(),
        Box::new(MemoryPwm::new()),
        context.snapshot.clone(),
        context.bits.clone(),
        context.audit.clone(),
        context.liveness.register("control"),
        DEFAULT_STEP_MS,
    );
    handles.push(tokio::spawn(pipeline.run()));

    // Network supervisor over the hosted driver.
    let (wifi_events_tx, wifi_events_rx) = mpsc::channel(8);
    let wifi = HostedWifi {
        inner: MemoryWifi::new(),
        events: wifi_events_tx.clone(),
    };
    let (supervisor, net_handle) = NetworkSupervisor::new(
        Box::new(wifi),
        wifi_events_rx,
        context.store.clone(),
        context.bits.clone(),
        context.audit.clone(),
        context.liveness.register("net"),
        config.has_time_transport,
    );
    let stability = supervisor.stability_watch();
    let rssi = supervisor.rssi_watch();
    handles.push(tokio::spawn(supervisor.run()));

    // Schedule engine.
    let engine = ScheduleEngine::new(
        context.store.clone(),
        context.queue.clone(),
        context.bits.clone(),
        context.audit.clone(),
        context.liveness.register("schedule"),
    );
    handles.push(tokio::spawn(engine.run()));

    // Commissioning arbiter.
    let arbiter_handle = ArbiterHandle::new();
    let arbiter = CommissioningArbiter::new(
        ArbiterConfig {
            ble_fallback: Duration::from_secs(config.ble_fallback_secs),
            wifi_stable: Duration::from_secs(config.wifi_stable_min * 60),
            reopen_after: Duration::from_secs(180),
        },
        context.bits.clone(),
        stability,
        arbiter_handle.clone(),
        context.liveness.register("arbiter"),
        Instant::now(),
    );
    handles.push(tokio::spawn(arbiter.run()));

    // Session server with the provisioning handler.
    let commissioned_at: Arc<Mutex<Option<i64>>> = Arc::new(Mutex::new(None));
    let (frames_tx, frames_rx) = mpsc::channel(8);
    let server = SessionServer::new(
        context.store.clone(),
        context.queue.clone(),
        context.snapshot.clone(),
        Box::new(MemoryBeacon::new()),
        frames_rx,
        Box::new(provisioning_handler(
            context.store.clone(),
            net_handle.clone(),
            commissioned_at.clone(),
        )),
        arbiter_handle,
        context.bits.clone(),
        context.audit.clone(),
        context.liveness.register("commissioning"),
        config.provisioning_pop.clone(),
        context.local_device_id(),
    );
    handles.push(tokio::spawn(server.run()));

    // Update pipeline fed by the cloud router.
    let (manifest_tx, manifest_rx) = mpsc::channel(2);
    let pinned_ca = context.trust_root.ca_certs.first().map(|ca| ca.as_slice());
    let image_source: Box<dyn ImageSource> = match HttpImageSource::new(pinned_ca) {
        Ok(source) => Box::new(source),
        Err(err) => {
            warn!(error = %err, "HTTPS image source unavailable, updates disabled");
            Box::new(MemoryImageSource::new(b"", 1))
        }
    };
    let reset_bits = context.bits.clone();
    let mut update = UpdatePipeline::new(
        context.store.clone(),
        context.trust_root.clone(),
        image_source,
        Box::new(MemorySlot::new()),
        // A commit on the hosted build exits the daemon; the service
        // manager boots the new image.
        Box::new(move || reset_bits.trigger_shutdown()),
        context.audit.clone(),
    );
    let update_status = update.status_handle();
    match update.confirm_boot_if_pending() {
        Ok(true) => info!("Pending image confirmed on first boot"),
        Ok(false) => {}
        Err(err) => warn!(error = %err, "Boot confirmation failed"),
    }
    handles.push(tokio::spawn(update.run(
        manifest_rx,
        context.bits.clone(),
        context.liveness.register("ota"),
    )));

    // Cloud router and telemetry over the hosted link.
    let (cloud_events_tx, cloud_events_rx) = mpsc::channel(16);
    let cloud: Arc<dyn CloudLink> = Arc::new(MemoryCloud::new());
    let router = CloudRouter::new(
        config.device_id.clone(),
        cloud_events_rx,
        manifest_tx,
        context.trust_root.clone(),
        config.legacy_job_compat,
        context.bits.clone(),
        context.audit.clone(),
        context.liveness.register("cloud"),
    );
    handles.push(tokio::spawn(router.run()));

    let heartbeat = HeartbeatTask::new(
        cloud.clone(),
        verdant_cloud::heartbeat_topic(&config.device_id),
        Duration::from_secs(config.heartbeat_secs),
        context.store.clone(),
        context.snapshot.clone(),
        Box::new(StaticProbe {
            min_free: None,
            reason: ResetReason::PowerOn,
        }),
        rssi,
        context.bits.clone(),
        context.liveness.register("heartbeat"),
    );
    handles.push(tokio::spawn(heartbeat.run()));

    let drain = AuditDrain::new(
        audit_queue,
        cloud.clone(),
        verdant_cloud::audit_topic(&config.device_id),
        context.bits.clone(),
        context.liveness.register("audit"),
    );
    handles.push(tokio::spawn(drain.run()));

    handles.push(tokio::spawn(shadow_task(
        context.clone(),
        cloud,
        update_status,
        commissioned_at,
    )));

    // Safety watchdog last, once every other task is registered.
    let watchdog = SafetyWatchdog::new(
        Box::new(MemoryWatchdog::new()),
        context.liveness.clone(),
        context.queue.clone(),
        context.bits.clone(),
        context.audit.clone(),
        PET_INTERVAL,
        STALE_AFTER,
    );
    handles.push(tokio::spawn(watchdog.run()));

    Ok((
        handles,
        DriverPorts {
            wifi_events: wifi_events_tx,
            local_frames: frames_tx,
            cloud_events: cloud_events_tx,
        },
    ))
}

/// Build the provisioning callback: validates the timezone, updates the
/// stored schedule, and forwards credentials to the network supervisor.
pub fn provisioning_handler(
    store: Store,
    net: verdant_net::NetHandle,
    commissioned_at: Arc<Mutex<Option<i64>>>,
) -> impl Fn(&ProvisioningFrame) -> CommResult<()> + Send {
    move |frame: &ProvisioningFrame| {
        if let Some(tz) = &frame.tz {
            tz.parse::<chrono_tz::Tz>().map_err(|_| {
                CommissioningError::Provisioning(format!("unknown timezone {tz}"))
            })?;
            let mut cfg = match store.load(StoreKeys::SCHEDULE_CFG) {
                Ok(bytes) => serde_json::from_slice::<ScheduleConfig>(&bytes)
                    .unwrap_or_default(),
                Err(_) => ScheduleConfig::default(),
            };
            cfg.tz = tz.clone();
            let bytes = serde_json::to_vec(&cfg)
                .map_err(|e| CommissioningError::Provisioning(e.to_string()))?;
            store
                .save(StoreKeys::SCHEDULE_CFG, &bytes)
                .map_err(|e| CommissioningError::Provisioning(e.to_string()))?;
        }
        net.try_set_credentials(&frame.ssid, frame.psk.as_deref().unwrap_or(""))
            .map_err(|e| CommissioningError::Provisioning(e.to_string()))?;
        *commissioned_at.lock().unwrap() = Some(Utc::now().timestamp());
        Ok(())
    }
}

/// Periodic shadow `reported` publication.
async fn shadow_task(
    context: AppContext,
    cloud: Arc<dyn CloudLink>,
    update_status: verdant_ota::StatusHandle,
    commissioned_at: Arc<Mutex<Option<i64>>>,
) {
    let topic = verdant_cloud::shadow_update_topic(&context.config.device_id);
    loop {
        tokio::select! {
            _ = context.bits.wait_for(SHUTDOWN) => break,
            _ = tokio::time::sleep(Duration::from_secs(60)) => {}
        }
        if !context.bits.contains(CLOUD_SESSION_UP) {
            continue;
        }
        let doc = verdant_cloud::shadow_document(&build_reported(
            &context,
            &update_status,
            &commissioned_at,
        ));
        if let Err(err) = cloud.publish(&topic, doc.to_string().as_bytes()) {
            warn!(error = %err, "Shadow publish failed");
        }
    }
    info!("Shadow reporter stopped");
}

/// Assemble the shadow `reported` block from live state.
pub fn build_reported(
    context: &AppContext,
    update_status: &verdant_ota::StatusHandle,
    commissioned_at: &Arc<Mutex<Option<i64>>>,
) -> ReportedState {
    let snapshot = verdant_control::ActuatorSnapshot::read(&context.snapshot);
    let schedule = context
        .store
        .load(StoreKeys::SCHEDULE_CFG)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok());
    ReportedState {
        fw_version: context
            .store
            .load_u32(StoreKeys::OTA_VERSION)
            .unwrap_or(0),
        last_update_status: *update_status.lock().unwrap(),
        last_commissioning_time: *commissioned_at.lock().unwrap(),
        schedule,
        light_percent: snapshot.light_percent,
        pump_percent: snapshot.pump_percent,
    }
}

/// `status` subcommand: print the persisted device state.
pub fn print_status(config: &Config) -> anyhow::Result<()> {
    let store = Store::open(Arc::new(FileKv::open(&config.data_dir)?))?;
    println!("device:        {}", config.device_id);
    println!("cloud host:    {}", config.cloud_host);

    match store.load(StoreKeys::WIFI_CREDS) {
        Ok(bytes) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(creds) => println!(
                "wifi:          provisioned (ssid {})",
                creds["ssid"].as_str().unwrap_or("?")
            ),
            Err(_) => println!("wifi:          stored blob unreadable"),
        },
        Err(StoreError::NotFound) => println!("wifi:          not provisioned"),
        Err(err) => println!("wifi:          error: {err}"),
    }

    match store.load(StoreKeys::SCHEDULE_CFG) {
        Ok(bytes) => match serde_json::from_slice::<ScheduleConfig>(&bytes) {
            Ok(cfg) => println!(
                "schedule:      {:02}:{:02}-{:02}:{:02} {}",
                cfg.on_hour, cfg.on_minute, cfg.off_hour, cfg.off_minute, cfg.tz
            ),
            Err(_) => println!("schedule:      stored blob unreadable"),
        },
        Err(_) => println!("schedule:      defaults (first boot pending)"),
    }

    let version = store.load_u32(StoreKeys::OTA_VERSION).unwrap_or(0);
    println!("fw version:    {version}");
    Ok(())
}
