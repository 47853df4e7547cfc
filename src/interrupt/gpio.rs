// Button monitoring over a polled GPIO line
//
// The line level is sampled at a fixed interval; a low-to-high transition is
// a press, high-to-low a release. Presses feed the interruption controller
// (barge-in) and both edges are forwarded to whoever drives recording.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::controller::InterruptController;

/// Logic level of a GPIO line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Button edge derived from two consecutive samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Pressed,
    Released,
}

/// Source of GPIO line levels
#[async_trait::async_trait]
pub trait GpioSource: Send {
    async fn read_level(&mut self, line: u32) -> Result<Level>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Reads levels from a debugfs-style GPIO listing
///
/// Expected line shape: ` gpio-1   (   |button  ) in  hi IRQ`
pub struct DebugfsGpio {
    path: PathBuf,
}

impl DebugfsGpio {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl GpioSource for DebugfsGpio {
    async fn read_level(&mut self, line: u32) -> Result<Level> {
        let listing = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read GPIO listing {}", self.path.display()))?;
        parse_level(&listing, line)
    }

    fn name(&self) -> &str {
        "debugfs"
    }
}

/// Find `gpio-<line>` in a debugfs listing and read its `hi`/`lo` state
pub fn parse_level(listing: &str, line: u32) -> Result<Level> {
    let needle = format!("gpio-{}", line);

    let entry = listing
        .lines()
        .find(|l| {
            l.split(|c: char| c.is_whitespace() || c == '(')
                .any(|token| token == needle)
        })
        .with_context(|| format!("{} not found in GPIO listing", needle))?;

    let after_direction = entry
        .find(" in ")
        .map(|pos| &entry[pos + 4..])
        .or_else(|| entry.find(" out ").map(|pos| &entry[pos + 5..]))
        .with_context(|| format!("No direction for {}", needle))?;

    match after_direction.split_whitespace().next() {
        Some("hi") => Ok(Level::High),
        Some("lo") => Ok(Level::Low),
        other => bail!("Unexpected state {:?} for {}", other, needle),
    }
}

/// Turns level samples into edges
#[derive(Debug, Default)]
pub struct EdgeDetector {
    previous: Option<Level>,
}

impl EdgeDetector {
    pub fn update(&mut self, level: Level) -> Option<ButtonEvent> {
        let edge = match (self.previous, level) {
            (Some(Level::Low), Level::High) => Some(ButtonEvent::Pressed),
            (Some(Level::High), Level::Low) => Some(ButtonEvent::Released),
            _ => None,
        };
        self.previous = Some(level);
        edge
    }

    /// Forget the last sample so a failed read cannot fabricate an edge
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

/// Settings for the button monitor
#[derive(Debug, Clone)]
pub struct GpioMonitorConfig {
    /// GPIO line number to watch
    pub line: u32,
    /// Sampling interval (default: 50ms)
    pub poll_interval: Duration,
}

impl Default for GpioMonitorConfig {
    fn default() -> Self {
        Self {
            line: 1,
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Polls a button line and applies barge-in on press
pub struct GpioMonitor<S: GpioSource> {
    source: S,
    config: GpioMonitorConfig,
    controller: Arc<InterruptController>,
    events: Option<mpsc::Sender<ButtonEvent>>,
}

impl<S: GpioSource + 'static> GpioMonitor<S> {
    pub fn new(source: S, config: GpioMonitorConfig, controller: Arc<InterruptController>) -> Self {
        Self {
            source,
            config,
            controller,
            events: None,
        }
    }

    /// Forward press/release edges to a channel
    pub fn with_events(mut self, events: mpsc::Sender<ButtonEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Poll until `shutdown` turns true or the event receiver goes away
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "GPIO monitor started: {} line {} every {:?}",
            self.source.name(),
            self.config.line,
            self.config.poll_interval
        );

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut edges = EdgeDetector::default();

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let level = match self.source.read_level(self.config.line).await {
                Ok(level) => level,
                Err(e) => {
                    warn!("Failed to read GPIO-{}: {:#}", self.config.line, e);
                    edges.reset();
                    continue;
                }
            };

            let Some(event) = edges.update(level) else {
                continue;
            };

            match event {
                ButtonEvent::Pressed => {
                    info!("GPIO-{} pressed", self.config.line);
                    if self.controller.on_button_press() {
                        info!("Barge-in: interrupted active response");
                    }
                }
                ButtonEvent::Released => {
                    debug!("GPIO-{} released", self.config.line);
                }
            }

            if let Some(events) = &self.events {
                if events.send(event).await.is_err() {
                    debug!("Button event receiver dropped");
                    break;
                }
            }
        }

        info!("GPIO monitor stopped");
    }
}
