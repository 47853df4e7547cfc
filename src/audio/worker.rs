// Playback worker thread
//
// The output device is owned by a single OS thread. Everything else talks to
// it through `PlaybackHandle`, whose requests are queued on a channel and
// answered over oneshot replies, so blocking device calls never run on the
// async runtime.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::device::{AudioFormat, AudioOutput, ChannelStatus, DeviceError};
use super::sink::{PlayOutcome, PlaybackSink, SinkSettings};
use crate::interrupt::{HardStop, InterruptController};

type Reply<T> = oneshot::Sender<Result<T, DeviceError>>;

enum Command {
    Setup { format: AudioFormat, reply: Reply<()> },
    Play { data: Vec<u8>, reply: Reply<PlayOutcome> },
    QueryStatus { reply: Reply<ChannelStatus> },
    Teardown { reply: Reply<()> },
    HardStop,
    Shutdown,
}

/// Owns the playback thread
pub struct PlaybackWorker {
    commands: mpsc::UnboundedSender<Command>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackWorker {
    /// Start the worker and register its hard stop with `controller`
    pub fn spawn(
        device: Box<dyn AudioOutput>,
        settings: SinkSettings,
        controller: Arc<InterruptController>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let device_name = device.name().to_string();
        let sink = PlaybackSink::new(device, settings, controller.clone());

        let thread = thread::Builder::new()
            .name("playback".to_string())
            .spawn(move || run(sink, rx))
            .context("Failed to spawn playback thread")?;

        controller.attach_stopper(Arc::new(PlaybackStopper {
            commands: tx.clone(),
        }));

        info!("Playback worker started on {}", device_name);

        Ok(Self {
            commands: tx,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> PlaybackHandle {
        PlaybackHandle {
            commands: self.commands.clone(),
        }
    }

    /// Stop the worker and wait for the thread to exit
    pub async fn shutdown(mut self) -> Result<()> {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .context("Failed to join playback thread")?
                .map_err(|_| anyhow::anyhow!("Playback thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.commands.send(Command::Shutdown);
        }
    }
}

fn run(mut sink: PlaybackSink, mut commands: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::Setup { format, reply } => {
                let _ = reply.send(sink.setup(format));
            }
            Command::Play { data, reply } => {
                let _ = reply.send(sink.play(&data));
            }
            Command::QueryStatus { reply } => {
                let _ = reply.send(sink.query_status());
            }
            Command::Teardown { reply } => {
                let _ = reply.send(sink.teardown());
            }
            Command::HardStop => sink.hard_stop(),
            Command::Shutdown => break,
        }
    }

    sink.hard_stop();
    debug!("Playback worker exited");
}

/// Cloneable async front end to the playback worker
#[derive(Clone)]
pub struct PlaybackHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl PlaybackHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, DeviceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| DeviceError::WorkerGone)?;
        response.await.map_err(|_| DeviceError::WorkerGone)?
    }

    pub async fn setup(&self, format: AudioFormat) -> Result<(), DeviceError> {
        self.request(|reply| Command::Setup { format, reply }).await
    }

    pub async fn play(&self, data: Vec<u8>) -> Result<PlayOutcome, DeviceError> {
        self.request(|reply| Command::Play { data, reply }).await
    }

    pub async fn query_status(&self) -> Result<ChannelStatus, DeviceError> {
        self.request(|reply| Command::QueryStatus { reply }).await
    }

    pub async fn teardown(&self) -> Result<(), DeviceError> {
        self.request(|reply| Command::Teardown { reply }).await
    }

    /// Queue a stop without drain; does not wait
    pub fn hard_stop(&self) {
        if self.commands.send(Command::HardStop).is_err() {
            warn!("Hard stop requested but playback worker is gone");
        }
    }
}

/// `HardStop` for the interruption controller
///
/// Only queues a command, so it is safe to call with the controller locked.
pub struct PlaybackStopper {
    commands: mpsc::UnboundedSender<Command>,
}

impl HardStop for PlaybackStopper {
    fn hard_stop(&self) {
        if self.commands.send(Command::HardStop).is_err() {
            warn!("Hard stop requested but playback worker is gone");
        }
    }
}
