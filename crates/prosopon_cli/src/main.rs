use clap::Parser;
use prosopon_core::{AudioChunk, Settings, Speaker, TextEvent, UiEvent};
use prosopon_eyes::{
    BlinkConfig, BlinkScheduler, FaceDetector, FrameSource, SyntheticFaceDetector,
    SyntheticFrameSource,
};
use prosopon_gateway::GatewayServer;
use prosopon_mouth::EnvelopeConfig;
use prosopon_rig::RigConfig;
use prosopon_runtime::{
    CameraFactory, CommandExecutor, ControlLoopSet, FaceTracking, MouthTracker, RuntimeConfig,
    Session, SessionFactory, SessionManager, SpeechState,
};
use prosopon_servo::{ActuatorArbiter, JawCalibration, SimulatedBus};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the settings file (defaults to the user config dir)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Gateway bind host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Gateway bind port
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Override the rig from the settings file
    #[arg(long)]
    rig: Option<String>,

    /// Use the frequency-weighted mouth tracker
    #[arg(long)]
    spectral: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let settings_path = args.settings.clone().unwrap_or_else(default_settings_path);
    info!("Loading settings from {}", settings_path.display());
    let mut settings = Settings::load_or_default(&settings_path);
    if let Some(rig) = args.rig {
        settings.rig = rig;
    }

    let rig = RigConfig::by_name(&settings.rig);
    info!("Rig: {} ({} servos)", rig.name(), rig.servo_count());

    // The electrical servo driver is an external collaborator; without
    // one linked the actuator path runs in simulation. Reported once,
    // never fatal.
    warn!("No servo-bus driver linked, actuators run in simulation");
    let bus = Arc::new(SimulatedBus::new());

    let arbiter = Arc::new(ActuatorArbiter::new(
        bus,
        rig,
        JawCalibration {
            open_angle: settings.jaw_open_angle,
            close_angle: settings.jaw_close_angle,
            min_change: settings.jaw_min_change,
        },
    ));

    let (events, _) = broadcast::channel::<UiEvent>(256);
    let (audio_tx, audio_rx) = mpsc::channel::<AudioChunk>(64);
    let (text_tx, text_rx) = mpsc::channel::<TextEvent>(16);
    let (command_tx, command_rx) = mpsc::channel(64);

    let speech = Arc::new(SpeechState::new());
    let envelope_config = EnvelopeConfig::default();
    let tracker = Arc::new(Mutex::new(if args.spectral {
        MouthTracker::spectral(envelope_config)
    } else {
        MouthTracker::plain(envelope_config)
    }));

    let session = Arc::new(SessionManager::new(
        synthetic_speech_factory(),
        audio_tx,
        text_tx,
        speech.clone(),
        tracker.clone(),
        arbiter.clone(),
        events.clone(),
    ));

    let camera_factory: CameraFactory = Box::new(|_index| {
        Ok((
            Box::new(SyntheticFrameSource::default()) as Box<dyn FrameSource>,
            Box::new(SyntheticFaceDetector::new()) as Box<dyn FaceDetector>,
        ))
    });
    let face = Arc::new(FaceTracking::new(
        camera_factory,
        BlinkScheduler::new(BlinkConfig::default()),
    ));

    let settings = Arc::new(Mutex::new(settings));
    let executor = Arc::new(CommandExecutor::new(
        settings.clone(),
        settings_path,
        arbiter.clone(),
        session.clone(),
        face.clone(),
        speech.clone(),
        events.clone(),
    ));

    let loops = ControlLoopSet::spawn(
        RuntimeConfig::default(),
        audio_rx,
        text_rx,
        command_rx,
        tracker,
        speech,
        arbiter.clone(),
        face.clone(),
        executor,
        events.clone(),
    );

    let gateway = GatewayServer::new(command_tx, events.clone(), &args.host, args.port);
    let gateway_handle = gateway.start();
    info!("Open the visualizer at http://{}:{}", args.host, args.port);

    // Auto-start face tracking when the settings ask for it.
    if settings.lock().await.face_tracking_enabled {
        let camera_index = settings.lock().await.camera_index;
        match face.start(camera_index, &arbiter).await {
            Ok(()) => {
                let _ = events.send(UiEvent::FaceTracking { enabled: true });
            }
            Err(e) => {
                warn!("Face tracking failed to start: {}", e);
                let _ = events.send(UiEvent::FaceTracking { enabled: false });
            }
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    session.stop().await;
    face.stop(&arbiter).await;
    loops.shutdown().await;
    gateway_handle.abort();

    info!("Goodbye");
    Ok(())
}

fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prosopon")
        .join("settings.json")
}

/// Stand-in for the cloud speech client: emits sine-burst "utterances"
/// so the jaw pipeline runs end-to-end with nothing external attached.
/// A real client plugs in here by returning its own capture/playback
/// task handles.
fn synthetic_speech_factory() -> SessionFactory {
    Box::new(|audio_tx, text_tx| {
        let task = tokio::spawn(async move {
            let _ = text_tx
                .send(TextEvent {
                    speaker: Speaker::Assistant,
                    text: "Synthetic speech session".to_string(),
                })
                .await;

            let sample_rate = 24_000.0f32;
            let chunk_len = 1024usize;
            let mut phase = 0.0f32;
            let mut elapsed = Duration::ZERO;
            loop {
                // 1.2s bursts of a 220 Hz hum, 0.8s of silence.
                let talking = elapsed.as_millis() % 2000 < 1200;
                let samples: Vec<i16> = (0..chunk_len)
                    .map(|_| {
                        if !talking {
                            return 0;
                        }
                        phase += 2.0 * std::f32::consts::PI * 220.0 / sample_rate;
                        (phase.sin() * 12_000.0) as i16
                    })
                    .collect();
                if audio_tx.send(AudioChunk::new(samples)).await.is_err() {
                    break;
                }
                let pace = Duration::from_millis(40);
                elapsed += pace;
                tokio::time::sleep(pace).await;
            }
        });
        Ok(Session { tasks: vec![task] })
    })
}
