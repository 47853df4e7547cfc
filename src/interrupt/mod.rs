//! Barge-in: shared playback/response flags and the button monitor

pub mod controller;
pub mod gpio;

pub use controller::{HardStop, InterruptController, InterruptOutcome, InterruptSnapshot};
pub use gpio::{
    ButtonEvent, DebugfsGpio, EdgeDetector, GpioMonitor, GpioMonitorConfig, GpioSource, Level,
};
