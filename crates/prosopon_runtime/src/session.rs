//! Speech-session lifecycle.

use crate::state::{MouthTracker, SpeechState};
use prosopon_core::{AudioChunk, TextEvent, UiEvent};
use prosopon_mouth::Viseme;
use prosopon_servo::ActuatorArbiter;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;

/// The background tasks of one active speech session (audio capture,
/// playback, dialogue). Owned by the [`SessionManager`]; aborted on stop.
pub struct Session {
    pub tasks: Vec<JoinHandle<()>>,
}

/// Builds a session: starts the external speech client and returns its
/// task handles. The client delivers audio chunks and text events through
/// the provided senders for the session's lifetime.
pub type SessionFactory = Box<
    dyn Fn(mpsc::Sender<AudioChunk>, mpsc::Sender<TextEvent>) -> anyhow::Result<Session>
        + Send
        + Sync,
>;

/// Starts and stops speech sessions, and enforces the terminal guarantees
/// on stop: audio tasks cancelled (abort errors are benign), envelope
/// state reset, and the jaw slam-closed repeatedly so a servo that drops
/// one command still ends up shut.
pub struct SessionManager {
    factory: SessionFactory,
    audio_tx: mpsc::Sender<AudioChunk>,
    text_tx: mpsc::Sender<TextEvent>,
    active: Mutex<Option<Session>>,
    speech: Arc<SpeechState>,
    tracker: Arc<Mutex<MouthTracker>>,
    arbiter: Arc<ActuatorArbiter>,
    events: broadcast::Sender<UiEvent>,
}

impl SessionManager {
    /// How many closed writes the stop path fires at the jaw.
    const STOP_SLAM_REPEATS: usize = 10;

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        factory: SessionFactory,
        audio_tx: mpsc::Sender<AudioChunk>,
        text_tx: mpsc::Sender<TextEvent>,
        speech: Arc<SpeechState>,
        tracker: Arc<Mutex<MouthTracker>>,
        arbiter: Arc<ActuatorArbiter>,
        events: broadcast::Sender<UiEvent>,
    ) -> Self {
        Self {
            factory,
            audio_tx,
            text_tx,
            active: Mutex::new(None),
            speech,
            tracker,
            arbiter,
            events,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Start a session. A second start while one is active is a no-op.
    pub async fn start(&self) -> anyhow::Result<()> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            tracing::warn!("Speech session already running");
            return Ok(());
        }
        let session = (self.factory)(self.audio_tx.clone(), self.text_tx.clone())?;
        tracing::info!("Speech session started ({} tasks)", session.tasks.len());
        *active = Some(session);
        Ok(())
    }

    /// Stop the active session and run the terminal guarantees.
    pub async fn stop(&self) {
        let session = self.active.lock().await.take();
        let Some(session) = session else {
            tracing::warn!("No speech session to stop");
            return;
        };

        tracing::info!("Stopping speech session...");
        for task in &session.tasks {
            task.abort();
        }
        for task in session.tasks {
            match task.await {
                Ok(()) => {}
                // Abort-induced errors are the expected outcome here.
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::warn!("Session task ended abnormally: {}", e),
            }
        }

        self.speech.set_speaking(false);
        self.tracker.lock().await.reset();
        let _ = self.events.send(UiEvent::Mouth {
            viseme: Viseme::Closed.as_str().to_string(),
            text: String::new(),
        });

        // Terminal guarantee: the jaw ends fully closed even if the servo
        // misses an isolated command.
        self.arbiter.slam_jaw_closed(Self::STOP_SLAM_REPEATS).await;
        tracing::info!("Speech session stopped, jaw closed");
    }
}
