//! NVR detection worker binary.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nvr_media::{
    estimate_total_bytes, FfmpegFrameDecoder, FfmpegRecordingWriter, OnnxModelLoader,
};
use nvr_worker::{
    load_streams, metrics, run_tick_loop, MemoryStore, NvrConfig, Pipeline, PipelineDeps,
    StreamDefinition, SystemClock,
};

fn init_tracing() -> anyhow::Result<()> {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("nvr=info".parse()?)
        .add_directive("ort=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

fn seed_store(store: &MemoryStore, streams: &[StreamDefinition]) {
    for stream in streams {
        if let Err(e) = store.set_zones(&stream.name, stream.zones.clone()) {
            warn!(stream = %stream.name, error = %e, "Ignoring invalid detection zones");
        }
        if let Err(e) = store.set_object_filter(&stream.name, stream.object_filter.clone()) {
            warn!(stream = %stream.name, error = %e, "Ignoring object filter");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing()?;

    info!("Starting nvr-worker");

    let config = NvrConfig::from_env();
    config.validate().context("invalid configuration")?;
    info!("Worker config: {:?}", config);

    if let Err(e) = nvr_media::ffmpeg::check_ffmpeg() {
        warn!("FFmpeg unavailable, decoding and recording will fail: {}", e);
    }

    if config.metrics_enabled {
        match metrics::init_metrics(config.metrics_addr) {
            Ok(()) => info!("Prometheus metrics enabled on {}", config.metrics_addr),
            Err(e) => warn!("Failed to install metrics exporter: {}", e),
        }
    }

    let streams = match &config.streams_file {
        Some(path) => load_streams(path)
            .with_context(|| format!("failed to load streams from {}", path.display()))?,
        None => {
            warn!("NVR_STREAMS_FILE not set, no streams configured");
            Vec::new()
        }
    };

    let buffered: Vec<_> = streams
        .iter()
        .filter(|s| s.recording_enabled)
        .map(|s| {
            let options = s.recording_options(&config.recording);
            (options.codec, options.pre_buffer_secs)
        })
        .collect();
    if !buffered.is_empty() {
        info!(
            "Estimated pre-roll buffer memory: {} KiB for {} streams",
            estimate_total_bytes(&buffered) / 1024,
            buffered.len()
        );
    }

    let store = Arc::new(MemoryStore::new());
    seed_store(&store, &streams);

    let deps = PipelineDeps {
        decoder: Arc::new(FfmpegFrameDecoder::new()),
        loader: Arc::new(OnnxModelLoader::default()),
        writer: Arc::new(FfmpegRecordingWriter::new()),
        zones: store.clone(),
        objects: store.clone(),
        recordings: store,
        transport: None,
        clock: Arc::new(SystemClock),
    };
    let pipeline = Arc::new(Pipeline::new(config.clone(), deps).context("failed to build pipeline")?);

    for stream in &streams {
        if stream.recording_enabled {
            if let Err(e) =
                pipeline.enable_recording(&stream.name, stream.recording_options(&config.recording))
            {
                error!(stream = %stream.name, "Failed to enable recording: {}", e);
            }
        }
        if stream.detection_enabled {
            if let Err(e) = pipeline.start_monitor(&stream.name, stream.monitor_config()) {
                error!(stream = %stream.name, "Failed to start monitor: {}", e);
            }
        }
    }
    info!("{} streams configured", streams.len());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = tokio::spawn(run_tick_loop(
        pipeline.recordings(),
        config.tick_interval,
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    shutdown_tx.send(true).ok();
    ticker.await.ok();

    let pipeline_ref = Arc::clone(&pipeline);
    tokio::task::spawn_blocking(move || pipeline_ref.shutdown())
        .await
        .context("pipeline shutdown panicked")?;

    info!("Worker shutdown complete");
    Ok(())
}
