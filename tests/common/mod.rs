// Shared fixtures for integration tests
//
// `RecordingOutput` stands in for the audio output device: it records every
// primitive call and can be scripted to report busy or fail specific calls.

#![allow(dead_code)]

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use voicelink::audio::{AudioOutput, ChannelStatus, DeviceError, OutputAttr};
use voicelink::protocol::{encode, Message};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    SetAttr(OutputAttr),
    Enable,
    SetChannelParams,
    EnableChannel,
    SetVolume(u8),
    /// Length of the submitted frame, including rejected attempts
    SendFrame(usize),
    QueryStatus,
    WaitDrained,
    DisableChannel,
    Disable,
}

#[derive(Default)]
struct Inner {
    calls: Vec<DeviceCall>,
    frames: Vec<Vec<u8>>,
    busy_responses: u32,
    failing: Vec<&'static str>,
    failing_sends: Vec<usize>,
    send_attempts: usize,
    set_attr_calls: usize,
    set_attr_gate: Option<(usize, Sender<()>, Receiver<()>)>,
}

/// Holds one device call until released from the test
pub struct Gate {
    /// Signalled once the device thread is parked in the call
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

/// Shared view of what a `RecordingOutput` was asked to do
#[derive(Clone, Default)]
pub struct DeviceLog(Arc<Mutex<Inner>>);

impl DeviceLog {
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.0.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &DeviceCall) -> usize {
        self.0.lock().unwrap().calls.iter().filter(|c| *c == call).count()
    }

    pub fn send_attempts(&self) -> usize {
        self.0.lock().unwrap().send_attempts
    }

    /// Frames the device accepted, in submission order
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().frames.clone()
    }

    pub fn played_bytes(&self) -> Vec<u8> {
        self.frames().concat()
    }

    /// Report busy for the next `n` submissions
    pub fn set_busy(&self, n: u32) {
        self.0.lock().unwrap().busy_responses = n;
    }

    /// Make every call of `op` fail with a status code
    pub fn fail(&self, op: &'static str) {
        self.0.lock().unwrap().failing.push(op);
    }

    /// Make the n-th submission attempt (0-based) fail with a status code
    pub fn fail_send(&self, attempt: usize) {
        self.0.lock().unwrap().failing_sends.push(attempt);
    }

    /// Park the n-th `set_attr` call (1-based) until the gate is released
    pub fn gate_set_attr(&self, call: usize) -> Gate {
        let (entered_tx, entered) = channel();
        let (release, release_rx) = channel();
        self.0.lock().unwrap().set_attr_gate = Some((call, entered_tx, release_rx));
        Gate { entered, release }
    }
}

pub struct RecordingOutput {
    log: DeviceLog,
}

impl RecordingOutput {
    pub fn new() -> (Self, DeviceLog) {
        let log = DeviceLog::default();
        (Self { log: log.clone() }, log)
    }

    fn record(&self, op: &'static str, call: DeviceCall) -> Result<(), DeviceError> {
        let mut inner = self.log.0.lock().unwrap();
        inner.calls.push(call);
        if inner.failing.contains(&op) {
            return Err(DeviceError::status(op, 0xA006_800E_u32 as i32));
        }
        Ok(())
    }
}

impl AudioOutput for RecordingOutput {
    fn name(&self) -> &str {
        "recording"
    }

    fn set_attr(&mut self, attr: &OutputAttr) -> Result<(), DeviceError> {
        let gate = {
            let mut inner = self.log.0.lock().unwrap();
            inner.set_attr_calls += 1;
            let calls = inner.set_attr_calls;
            match inner.set_attr_gate.take() {
                Some((call, entered, release)) if call == calls => Some((entered, release)),
                other => {
                    inner.set_attr_gate = other;
                    None
                }
            }
        };
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv();
        }
        self.record("set_attr", DeviceCall::SetAttr(*attr))
    }

    fn enable(&mut self) -> Result<(), DeviceError> {
        self.record("enable", DeviceCall::Enable)
    }

    fn set_channel_params(&mut self) -> Result<(), DeviceError> {
        self.record("set_channel_params", DeviceCall::SetChannelParams)
    }

    fn enable_channel(&mut self) -> Result<(), DeviceError> {
        self.record("enable_channel", DeviceCall::EnableChannel)
    }

    fn set_volume(&mut self, volume: u8) -> Result<(), DeviceError> {
        self.record("set_volume", DeviceCall::SetVolume(volume))
    }

    fn send_frame(&mut self, pcm: &[u8], _timestamp: u64) -> Result<(), DeviceError> {
        let mut inner = self.log.0.lock().unwrap();
        inner.calls.push(DeviceCall::SendFrame(pcm.len()));
        let attempt = inner.send_attempts;
        inner.send_attempts += 1;

        if inner.busy_responses > 0 {
            inner.busy_responses -= 1;
            return Err(DeviceError::Busy);
        }
        if inner.failing_sends.contains(&attempt) {
            return Err(DeviceError::status("send_frame", -1));
        }
        inner.frames.push(pcm.to_vec());
        Ok(())
    }

    fn query_status(&mut self) -> Result<ChannelStatus, DeviceError> {
        self.record("query_status", DeviceCall::QueryStatus)?;
        Ok(ChannelStatus { total: 8, free: 6, busy: 2 })
    }

    fn wait_drained(&mut self, _timeout: Duration) -> Result<(), DeviceError> {
        self.record("wait_drained", DeviceCall::WaitDrained)
    }

    fn disable_channel(&mut self) -> Result<(), DeviceError> {
        self.record("disable_channel", DeviceCall::DisableChannel)
    }

    fn disable(&mut self) -> Result<(), DeviceError> {
        self.record("disable", DeviceCall::Disable)
    }
}

/// Write `messages` into one end of an in-memory pipe from a background task
///
/// With `keep_open` the writing end stays alive afterwards so the reader
/// sees silence instead of end-of-stream.
pub fn serve(messages: Vec<Message>, keep_open: bool) -> (DuplexStream, JoinHandle<()>) {
    let (client, mut server) = tokio::io::duplex(64 * 1024);

    let task = tokio::spawn(async move {
        for message in messages {
            let frame = message.into_frame();
            let bytes = encode(frame.kind, &frame.payload).unwrap();
            if server.write_all(&bytes).await.is_err() {
                return;
            }
        }
        if keep_open {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    });

    (client, task)
}
