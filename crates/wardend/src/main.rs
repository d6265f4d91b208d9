use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use warden_core::gallery::load_compatible;
use warden_core::greeting::{spawn_greeter, DEFAULT_GREETING_CAPACITY};
use warden_core::{
    AccessEngine, Actuator, ActuatorKind, Config, DoorController, DoorTimer, EuclideanMatcher,
    EventSink, Notifier, RecognitionPipeline,
};
use warden_hw::{Camera, GpioActuator, SimulatedActuator};
use warden_store::Store;
use warden_vision::embedder::{EMBEDDING_DIM, MODEL_VERSION};
use warden_vision::OnnxExtractor;

mod dashboard;
mod engine;
mod greeter;
mod notify;
mod snapshot;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("wardend starting");
    let config = Config::from_env();

    // Fail fast on every resource before the session starts.
    let store = Arc::new(
        Store::open(&config.db_path)
            .with_context(|| format!("opening database {}", config.db_path.display()))?,
    );
    let gallery = load_compatible(&config.gallery_dir, EMBEDDING_DIM, MODEL_VERSION)?;
    let camera = Camera::open(&config.camera_device, config.camera_width, config.camera_height)?;
    let extractor = OnnxExtractor::load(&config.model_dir)?;

    let actuator: Box<dyn Actuator> = match config.actuator {
        ActuatorKind::Gpio => Box::new(GpioActuator::open(&config.gpio_chip, config.gpio_line)?),
        ActuatorKind::Simulated => Box::new(SimulatedActuator::new(config.gpio_line)),
    };
    let notifier: Arc<dyn Notifier> = Arc::new(notify::SmtpNotifier::from_config(config.smtp.as_ref())?);
    let (greetings, _greeter) = spawn_greeter(
        greeter::ProcessGreeter::new(&config.tts_command),
        DEFAULT_GREETING_CAPACITY,
    )?;

    let sink: Arc<dyn EventSink> = store.clone();
    let door = DoorController::new(
        DoorTimer::new(actuator, config.unlock_duration),
        Arc::clone(&sink),
        Arc::clone(&notifier),
    );
    let engine = AccessEngine::new(
        door,
        sink,
        notifier,
        Box::new(snapshot::SnapshotDir::new(&config.capture_dir)),
        greetings,
        config.unknown_cooldown,
    );
    let pipeline = RecognitionPipeline::new(
        Box::new(extractor),
        Box::new(EuclideanMatcher),
        gallery,
        config.match_threshold,
        engine,
    );

    let frames = if config.dashboard_enabled {
        let (tx, rx) = watch::channel(None);
        let state = dashboard::DashboardState {
            store: Arc::clone(&store),
            gallery_dir: config.gallery_dir.clone(),
            frames: rx,
        };
        let addr = config.dashboard_addr.clone();
        tokio::spawn(async move {
            if let Err(err) = dashboard::serve(&addr, state).await {
                tracing::error!(error = %err, "dashboard stopped");
            }
        });
        Some(tx)
    } else {
        tracing::info!("dashboard disabled");
        None
    };

    let stop = Arc::new(AtomicBool::new(false));
    let handle = engine::spawn_engine(camera, pipeline, frames, Arc::clone(&stop))?;
    let mut engine_done = tokio::task::spawn_blocking(move || handle.join());

    tracing::info!("wardend ready");

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("wardend shutting down");
            stop.store(true, Ordering::Relaxed);
            report_engine_exit(engine_done.await);
        }
        res = &mut engine_done => {
            tracing::warn!("recognition session ended");
            report_engine_exit(res);
        }
    }

    Ok(())
}

fn report_engine_exit(res: Result<std::thread::Result<()>, tokio::task::JoinError>) {
    match res {
        Ok(Ok(())) => {}
        Ok(Err(_)) => tracing::error!("engine thread panicked"),
        Err(err) => tracing::error!(error = %err, "failed to join engine thread"),
    }
}
