use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};

/// Forced stop of the output device, bypassing the drain wait
pub trait HardStop: Send + Sync {
    fn hard_stop(&self);
}

/// Result of an interruption request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// Playback was active and has been stopped
    Interrupted,
    /// Nothing was playing; state unchanged
    AlreadyIdle,
}

/// Point-in-time copy of the shared flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptSnapshot {
    pub audio_playing: bool,
    pub ai_response_active: bool,
    pub audio_interrupted: bool,
}

struct InterruptState {
    flags: InterruptSnapshot,
    /// Bumped by every effective `interrupt()`
    epoch: u64,
    stopper: Option<Arc<dyn HardStop>>,
}

/// Playback/response state shared by the receive loop, the playback worker
/// and the button monitor
///
/// All flags sit behind one mutex. The "abort response" signal is separate:
/// it is a watch channel so the receive loop can wait on it while blocked
/// in a socket read.
pub struct InterruptController {
    state: Mutex<InterruptState>,
    abort_tx: watch::Sender<bool>,
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptController {
    pub fn new() -> Self {
        let (abort_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(InterruptState {
                flags: InterruptSnapshot::default(),
                epoch: 0,
                stopper: None,
            }),
            abort_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, InterruptState> {
        // Flags stay meaningful even if a holder panicked
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the device stop used by `interrupt()`
    pub fn attach_stopper(&self, stopper: Arc<dyn HardStop>) {
        self.lock().stopper = Some(stopper);
    }

    /// Entering `true` clears the interrupted flag; leaving it never sets it
    pub fn set_playing(&self, playing: bool) {
        let mut state = self.lock();
        state.flags.audio_playing = playing;
        if playing {
            state.flags.audio_interrupted = false;
        }
    }

    /// Current interruption count, taken before a setup that may race a press
    pub fn interrupt_epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Enter playing unless `interrupt()` ran since `epoch` was taken
    ///
    /// The check and the update happen under one lock, so an interruption
    /// that lands during device setup is never cleared by it.
    pub fn resume_playing(&self, epoch: u64) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch {
            return false;
        }
        state.flags.audio_playing = true;
        state.flags.audio_interrupted = false;
        true
    }

    pub fn is_playing(&self) -> bool {
        self.lock().flags.audio_playing
    }

    pub fn is_interrupted(&self) -> bool {
        self.lock().flags.audio_interrupted
    }

    pub fn set_ai_response_active(&self, active: bool) {
        self.lock().flags.ai_response_active = active;
    }

    pub fn is_ai_response_active(&self) -> bool {
        self.lock().flags.ai_response_active
    }

    pub fn snapshot(&self) -> InterruptSnapshot {
        self.lock().flags
    }

    /// Stop playback immediately if audio is playing
    pub fn interrupt(&self) -> InterruptOutcome {
        let mut state = self.lock();
        if !state.flags.audio_playing {
            return InterruptOutcome::AlreadyIdle;
        }

        info!("Interrupting audio playback");

        state.flags.audio_playing = false;
        state.flags.audio_interrupted = true;
        state.epoch += 1;
        if let Some(stopper) = &state.stopper {
            stopper.hard_stop();
        }

        InterruptOutcome::Interrupted
    }

    /// Ask the receive loop to stop processing the current response
    pub fn request_abort(&self) {
        self.abort_tx.send_replace(true);
    }

    pub fn abort_requested(&self) -> bool {
        *self.abort_tx.borrow()
    }

    pub fn clear_abort(&self) {
        self.abort_tx.send_replace(false);
    }

    pub fn subscribe_abort(&self) -> watch::Receiver<bool> {
        self.abort_tx.subscribe()
    }

    /// Barge-in: a button press while audio plays or a response is active
    /// stops playback and aborts the response loop
    ///
    /// Returns whether anything was interrupted.
    pub fn on_button_press(&self) -> bool {
        let flags = self.snapshot();
        if !flags.audio_playing && !flags.ai_response_active {
            debug!("Button press with nothing to interrupt");
            return false;
        }

        if flags.audio_playing {
            self.interrupt();
        }
        self.request_abort();
        true
    }
}
