mod outputs;
mod ports;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mraconfig::get_config;
use mracontrol::{ZoneConfig, ZoneRepositoryBuilder, ZoneStorage};
use mracovers::{CoverStore, cover_routes};
use mraengine::{AudioEngine, EngineOptions};
use mragroups::GroupTracker;
use mragroups::coordinators::{
    AirplayCoordinator, SendspinCoordinator, SlimprotoCoordinator, SnapcastCoordinator,
    SonosCoordinator, TransportCoordinator,
};
use mramodel::ZoneId;
use mraoutputs::drivers::SonosTopology;

use crate::outputs::OutputFactory;
use crate::ports::{DirectContent, FileStorage, LogNotifier, LoggingInputs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ========== Phase 1: configuration and logging ==========

    let config = get_config();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level().to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let local_ip = mrautils::guess_local_ip();
    let base_url = config.get_base_url(&local_ip);
    info!("🔧 Configuration loaded, base url {}", base_url);

    // ========== Phase 2: core services ==========

    info!("🎚️  Starting audio engine...");
    let (engine, engine_events) = AudioEngine::new(EngineOptions {
        ring_chunks: config.get_subscriber_ring_chunks() as usize,
        prime_bytes: config.get_prime_buffer_bytes() as usize,
        first_chunk_timeout_ms: config.get_first_chunk_timeout_ms(),
        handoff_timeout_ms: config.get_handoff_timeout_ms(),
    });

    info!("🖼️  Opening cover store...");
    let covers = CoverStore::open(config.get_cover_cache_dir()?, base_url.as_str())?;

    info!("🔗 Starting group tracker and coordinators...");
    let tracker = Arc::new(GroupTracker::new());
    let airplay = Arc::new(AirplayCoordinator::new());
    let snapcast = Arc::new(SnapcastCoordinator::new());
    let slimproto = Arc::new(SlimprotoCoordinator::new());
    let sendspin = Arc::new(SendspinCoordinator::new(
        config.get_sendspin_lead_window_ms(),
    ));
    let sonos = Arc::new(SonosCoordinator::new());

    pump_group_changes(
        tracker.clone(),
        vec![
            airplay.clone() as Arc<dyn TransportCoordinator>,
            snapcast.clone() as Arc<dyn TransportCoordinator>,
            slimproto.clone() as Arc<dyn TransportCoordinator>,
            sendspin.clone() as Arc<dyn TransportCoordinator>,
            sonos.clone() as Arc<dyn TransportCoordinator>,
        ],
    );

    // ========== Phase 3: ports and the zone repository ==========

    let content = Arc::new(DirectContent);
    let inputs = Arc::new(LoggingInputs);
    let notifier = Arc::new(LogNotifier);
    let storage_dir = mraconfig::Config::config_dir("");
    let storage = Arc::new(ZoneStorage::new(
        Arc::new(FileStorage::new(storage_dir)),
        notifier.clone(),
    ));

    let repository = ZoneRepositoryBuilder {
        engine: engine.clone(),
        content,
        inputs: inputs.clone(),
        notifier,
        storage,
        covers: covers.clone(),
        spotify_offload_enabled: config.get_spotify_offload_enabled(),
        dispatch_timeout: Duration::from_millis(config.get_dispatch_timeout_ms()),
        handoff_timeout_ms: config.get_handoff_timeout_ms(),
    }
    .build();
    repository.pump_engine_events(engine_events);

    // ========== Phase 4: zones from configuration ==========

    let factory = OutputFactory {
        engine,
        tracker,
        airplay,
        snapcast,
        slimproto,
        sendspin,
        sonos: sonos.clone(),
        sonos_topology: SonosTopology::new(),
        inputs,
        soap: outputs::soap_client(config.get_probe_timeout_ms()),
        airplay_start_retries: config.get_airplay_start_retries() as u32,
        sendspin_lead_window_ms: config.get_sendspin_lead_window_ms(),
        spotify_offload_enabled: config.get_spotify_offload_enabled(),
    };

    let definitions = config.zone_definitions()?;
    info!("🏠 Configuring {} zone(s)...", definitions.len());
    for definition in &definitions {
        let zone_id = ZoneId(definition.id);
        let zone_outputs: Vec<_> = definition
            .outputs
            .iter()
            .filter_map(|output| factory.build(zone_id, output))
            .collect();

        repository.spawn_zone(
            ZoneConfig {
                id: zone_id,
                name: definition.name.clone(),
                source_mac: definition.source_mac.clone(),
                volume_policy: definition.volume.into(),
                enabled_inputs: definition.inputs.clone(),
            },
            zone_outputs,
        );
        info!(
            "  ✅ {} ({} output(s))",
            definition.name,
            definition.outputs.len()
        );
    }

    // ========== Phase 5: internal HTTP endpoint (covers) ==========

    let listener =
        tokio::net::TcpListener::bind(("0.0.0.0", config.get_http_port())).await?;
    info!("🌐 Cover endpoint listening on {}", listener.local_addr()?);
    let router = cover_routes(covers);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            warn!(error = %e, "cover endpoint terminated");
        }
    });

    info!("✅ MRAudio is ready");
    info!("Press Ctrl+C to stop...");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down zones...");
    repository.shutdown().await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    info!("✅ MRAudio stopped");
    Ok(())
}

/// Forwards group-tracker changes to every coordinator whose backend tag
/// matches; a single consumer keeps the event order intact.
fn pump_group_changes(
    tracker: Arc<GroupTracker>,
    coordinators: Vec<Arc<dyn TransportCoordinator>>,
) {
    let rx = tracker.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match tokio::task::block_in_place(|| rx.recv()) {
                Ok(event) => event,
                Err(_) => break,
            };
            for coordinator in &coordinators {
                if coordinator.backend() == event.record.backend {
                    coordinator.on_group_changed(&event).await;
                }
            }
        }
    });
}
