use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voicelink::interrupt::{DebugfsGpio, GpioMonitor};
use voicelink::{
    AudioOutput, ClientConfig, FileVoiceSource, InterruptController, NullOutput, PlaybackWorker,
    ResponseEvent, ResponseFormat, VoiceSession, WavFileOutput,
};

/// Voice client: upload a recording and play the AI response
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Configuration file (toml, json or yaml)
    #[arg(short, long)]
    config: Option<String>,

    /// Recording to upload
    #[arg(long)]
    voice_file: Option<PathBuf>,

    /// Server host
    #[arg(long)]
    server: Option<String>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// Response format: json or stream
    #[arg(long)]
    format: Option<ResponseFormat>,

    /// Play streamed audio as it arrives
    #[arg(long)]
    enable_streaming: bool,
}

impl Args {
    fn apply(&self, cfg: &mut ClientConfig) {
        if let Some(path) = &self.voice_file {
            cfg.session.voice_file = path.clone();
        }
        if let Some(host) = &self.server {
            cfg.server.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if let Some(format) = self.format {
            cfg.session.response_format = format;
        }
        if self.enable_streaming {
            cfg.playback.enable_streaming = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = ClientConfig::load(args.config.as_deref())?;
    args.apply(&mut cfg);
    cfg.validate()?;

    info!("voicelink v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Server {}:{}, format {}, streaming {}",
        cfg.server.host,
        cfg.server.port,
        cfg.session.response_format,
        if cfg.playback.enable_streaming { "on" } else { "off" }
    );

    let controller = Arc::new(InterruptController::new());

    let device: Box<dyn AudioOutput> = match &cfg.playback.output_path {
        Some(path) => Box::new(WavFileOutput::new(path)),
        None => Box::new(NullOutput::new()),
    };
    let worker = PlaybackWorker::spawn(device, cfg.sink_settings(), controller.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = if cfg.gpio.enabled {
        let monitor = GpioMonitor::new(
            DebugfsGpio::new(&cfg.gpio.debug_path),
            cfg.gpio_monitor_config(),
            controller.clone(),
        )
        .spawn(shutdown_rx);
        Some(monitor)
    } else {
        None
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                ResponseEvent::Text(text) => println!("{}", text),
                ResponseEvent::Json(json) => println!("{}", json),
                ResponseEvent::Error(msg) => eprintln!("server error: {}", msg),
            }
        }
    });

    let session = VoiceSession::new(cfg.session_config(), controller.clone())
        .with_playback(worker.handle())
        .with_events(event_tx);

    let mut voice =
        FileVoiceSource::open(&cfg.session.voice_file, cfg.session.voice_chunk_size).await?;
    let result = session.run(&mut voice).await;
    drop(session);

    match &result {
        Ok(Some(report)) if cfg.session.log_timing => report.stats.log_report(),
        Ok(_) => {}
        Err(e) => warn!("Session failed: {:#}", e),
    }

    let _ = shutdown_tx.send(true);
    if let Some(monitor) = monitor {
        monitor.await.context("GPIO monitor task failed")?;
    }
    worker.shutdown().await?;
    printer.await.context("Response printer task failed")?;

    result.map(|_| ())
}
