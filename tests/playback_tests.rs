// Integration tests for the playback sink and worker
//
// A recording fake device captures every primitive call so the tests can
// check chunking, retry, teardown and hard-stop behaviour.

mod common;

use anyhow::Result;
use common::{DeviceCall, RecordingOutput};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use voicelink::audio::{
    AudioFormat, DeviceError, PlayOutcome, PlaybackSink, PlaybackWorker, SinkSettings, SinkState,
    WavFileOutput,
};
use voicelink::interrupt::{InterruptController, InterruptOutcome};

fn settings() -> SinkSettings {
    SinkSettings {
        busy_retry_backoff: Duration::from_millis(1),
        ..SinkSettings::default()
    }
}

fn ready_sink() -> (PlaybackSink, common::DeviceLog, Arc<InterruptController>) {
    let (device, log) = RecordingOutput::new();
    let controller = Arc::new(InterruptController::new());
    let mut sink = PlaybackSink::new(Box::new(device), settings(), controller.clone());
    sink.setup(AudioFormat::default()).unwrap();
    controller.set_playing(true);
    (sink, log, controller)
}

#[test]
fn test_setup_sequence_and_buffer_depth() {
    let (sink, log, _) = ready_sink();
    assert_eq!(sink.state(), SinkState::Ready);

    let calls = log.calls();
    match &calls[0] {
        DeviceCall::SetAttr(attr) => {
            assert_eq!(attr.frame_count, 8);
            assert_eq!(attr.samples_per_frame, 409_600);
            assert_eq!(attr.format, AudioFormat::default());
        }
        other => panic!("expected SetAttr first, got {:?}", other),
    }
    assert_eq!(
        &calls[1..],
        &[
            DeviceCall::Enable,
            DeviceCall::SetChannelParams,
            DeviceCall::EnableChannel,
            DeviceCall::SetVolume(100),
        ]
    );
}

#[test]
fn test_large_input_is_chunked_in_order() {
    let (mut sink, log, _) = ready_sink();
    let data: Vec<u8> = (0..20_000u32).map(|i| (i % 253) as u8).collect();

    let outcome = sink.play(&data).unwrap();
    assert_eq!(outcome, PlayOutcome::Played { chunks: 5 });

    let sizes: Vec<usize> = log.frames().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![4096, 4096, 4096, 4096, 3616]);
    assert_eq!(log.played_bytes(), data);
}

#[test]
fn test_busy_is_retried_up_to_limit() {
    let (mut sink, log, _) = ready_sink();

    log.set_busy(2);
    assert_eq!(sink.play(&[1; 10]).unwrap(), PlayOutcome::Played { chunks: 1 });
    assert_eq!(log.send_attempts(), 3);

    log.set_busy(5);
    assert_eq!(sink.play(&[1; 10]), Err(DeviceError::Busy));
    // Three more attempts, then give up
    assert_eq!(log.send_attempts(), 6);
}

#[test]
fn test_other_failures_not_retried_and_remaining_chunks_play() {
    let (mut sink, log, _) = ready_sink();
    log.fail_send(1);

    let data = vec![7u8; 4096 * 3];
    let err = sink.play(&data).unwrap_err();
    assert!(matches!(err, DeviceError::Status { op: "send_frame", .. }));

    // One attempt per chunk; chunks 1 and 3 made it
    assert_eq!(log.send_attempts(), 3);
    assert_eq!(log.frames().len(), 2);
}

#[test]
fn test_play_skipped_once_interrupted() {
    let (mut sink, log, controller) = ready_sink();
    assert_eq!(controller.interrupt(), InterruptOutcome::Interrupted);

    assert_eq!(sink.play(&[0; 100]).unwrap(), PlayOutcome::Skipped);
    assert_eq!(log.send_attempts(), 0);
}

#[test]
fn test_teardown_drains_then_disables() {
    let (mut sink, log, controller) = ready_sink();
    sink.play(&[0; 10]).unwrap();
    sink.teardown().unwrap();

    let calls = log.calls();
    let tail = &calls[calls.len() - 3..];
    assert_eq!(
        tail,
        &[DeviceCall::WaitDrained, DeviceCall::DisableChannel, DeviceCall::Disable]
    );
    assert_eq!(sink.state(), SinkState::Uninitialized);
    assert!(!controller.is_playing());
    assert!(!controller.is_interrupted());
}

#[test]
fn test_teardown_failure_still_clears_playing() {
    let (mut sink, log, controller) = ready_sink();
    log.fail("disable_channel");
    log.fail("wait_drained");

    assert!(sink.teardown().is_err());
    assert!(!controller.is_playing());
    // Device still disabled after the channel failure
    assert_eq!(log.count(&DeviceCall::Disable), 1);
}

#[test]
fn test_setup_failure_releases_device() {
    let (device, log) = RecordingOutput::new();
    let controller = Arc::new(InterruptController::new());
    let mut sink = PlaybackSink::new(Box::new(device), settings(), controller);
    log.fail("enable_channel");

    let err = sink.setup(AudioFormat::default()).unwrap_err();
    assert!(matches!(err, DeviceError::Status { op: "enable_channel", .. }));
    assert_eq!(sink.state(), SinkState::Uninitialized);
    assert_eq!(log.count(&DeviceCall::Disable), 1);
}

#[test]
fn test_volume_failure_is_not_fatal() {
    let (device, log) = RecordingOutput::new();
    let controller = Arc::new(InterruptController::new());
    let mut sink = PlaybackSink::new(Box::new(device), settings(), controller);
    log.fail("set_volume");

    sink.setup(AudioFormat::default()).unwrap();
    assert_eq!(sink.state(), SinkState::Ready);
}

#[test]
fn test_setup_is_idempotent() {
    let (mut sink, log, _) = ready_sink();
    sink.setup(AudioFormat::default()).unwrap();

    assert_eq!(sink.state(), SinkState::Ready);
    assert_eq!(log.count(&DeviceCall::Enable), 2);
    // First setup was released before the second one
    assert_eq!(log.count(&DeviceCall::Disable), 1);
    assert_eq!(log.count(&DeviceCall::WaitDrained), 0);
}

#[test]
fn test_query_status_requires_setup() {
    let (device, _log) = RecordingOutput::new();
    let controller = Arc::new(InterruptController::new());
    let mut sink = PlaybackSink::new(Box::new(device), settings(), controller);
    assert_eq!(sink.query_status(), Err(DeviceError::NotInitialized));

    sink.setup(AudioFormat::default()).unwrap();
    let status = sink.query_status().unwrap();
    assert_eq!(status.total, 8);
    assert_eq!(status.free, 6);
}

#[tokio::test]
async fn test_worker_round_trip() -> Result<()> {
    let (device, log) = RecordingOutput::new();
    let controller = Arc::new(InterruptController::new());
    let worker = PlaybackWorker::spawn(Box::new(device), settings(), controller.clone())?;
    let handle = worker.handle();

    handle.setup(AudioFormat::default()).await?;
    controller.set_playing(true);
    assert_eq!(handle.play(vec![3; 5000]).await?, PlayOutcome::Played { chunks: 2 });
    handle.teardown().await?;

    assert!(!controller.is_playing());
    assert_eq!(log.played_bytes(), vec![3; 5000]);

    worker.shutdown().await?;
    assert_eq!(handle.play(vec![1]).await, Err(DeviceError::WorkerGone));
    Ok(())
}

#[tokio::test]
async fn test_interrupt_hard_stops_worker_without_drain() -> Result<()> {
    let (device, log) = RecordingOutput::new();
    let controller = Arc::new(InterruptController::new());
    let worker = PlaybackWorker::spawn(Box::new(device), settings(), controller.clone())?;
    let handle = worker.handle();

    handle.setup(AudioFormat::default()).await?;
    controller.set_playing(true);
    assert_eq!(controller.interrupt(), InterruptOutcome::Interrupted);

    // Any later request is queued behind the hard stop
    assert_eq!(handle.query_status().await, Err(DeviceError::NotInitialized));

    assert_eq!(log.count(&DeviceCall::DisableChannel), 1);
    assert_eq!(log.count(&DeviceCall::Disable), 1);
    assert_eq!(log.count(&DeviceCall::WaitDrained), 0);
    assert!(controller.is_interrupted());

    worker.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_wav_output_writes_samples() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("played.wav");

    let controller = Arc::new(InterruptController::new());
    let output = Box::new(WavFileOutput::new(&path));
    let worker = PlaybackWorker::spawn(output, settings(), controller.clone())?;
    let handle = worker.handle();

    let samples: Vec<i16> = (0..6000).map(|i| ((i % 200) as i16 - 100) * 50).collect();
    let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

    handle.setup(AudioFormat::default()).await?;
    controller.set_playing(true);
    handle.play(pcm).await?;
    handle.teardown().await?;
    worker.shutdown().await?;

    let mut reader = hound::WavReader::open(&path)?;
    let spec = reader.spec();
    assert_eq!(spec.sample_rate, 8000);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);

    let read: Vec<i16> = reader.samples::<i16>().collect::<std::result::Result<_, _>>()?;
    assert_eq!(read, samples);
    Ok(())
}
