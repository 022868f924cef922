// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cadence host binary.
//!
//! Frames go to standard output as JSON lines; logs go to standard error.

mod cli;
mod simulator;
mod trend;

use anyhow::{Context, Result};
use cadence_core::StreamId;
use cadence_infra::SysinfoMonitor;
use cadence_sdk::{FeedError, FeedSender, JsonLinesSink, SessionBuilder};
use cadence_telemetry::LogTelemetrySink;
use clap::Parser;
use cli::Args;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simulator::{SimulatedStream, StreamProfile};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use trend::EnergyTrend;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    cadence_telemetry::logging::init(&args.log_level);

    let config = cli::load_config(args.config.as_deref(), args.streams)?;
    let stream_ids: Vec<StreamId> = config.streams.iter().map(|s| s.id.clone()).collect();

    let mut builder = SessionBuilder::new(config, JsonLinesSink::stdout())
        .telemetry_sink(LogTelemetrySink)
        .extension("energy-trend", EnergyTrend::new(0.1), None, 1.0);
    if args.device_poll_ms > 0 {
        builder = builder.hardware_monitor(
            Arc::new(SysinfoMonitor::new()),
            Duration::from_millis(args.device_poll_ms),
        );
    }
    let handle = builder
        .build()
        .context("failed to start session")?
        .spawn()
        .context("failed to start tick thread")?;
    log::info!(
        "Runtime: session {} running with {} stream(s)",
        handle.session_id(),
        stream_ids.len()
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut seeds = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut producers = Vec::with_capacity(stream_ids.len());
    for id in &stream_ids {
        let Some(feed) = handle.feed(id) else {
            log::warn!("Runtime: no feed for stream '{id}'");
            continue;
        };
        let stream = SimulatedStream::new(StreamProfile::random(&mut seeds), seeds.gen());
        producers.push(tokio::spawn(produce(feed, stream, stop_rx.clone())));
    }

    wait_for_stop(args.duration_secs).await;
    let _ = stop_tx.send(true);

    let mut pushed = 0u64;
    for producer in producers {
        pushed += producer.await.unwrap_or(0);
    }

    let summary = tokio::task::spawn_blocking(move || handle.stop())
        .await
        .context("tick thread join task failed")??;
    log::info!(
        "Runtime: session {} stopped after {} ticks at {:?}; {} tokens pushed, {} frames emitted, {} dropped, {} samples discarded",
        summary.session_id,
        summary.ticks,
        summary.final_quality,
        pushed,
        summary.frames_emitted,
        summary.frames_dropped,
        summary.samples_dropped
    );
    if !summary.extensions_abandoned.is_empty() {
        log::warn!(
            "Runtime: abandoned extensions: {:?}",
            summary.extensions_abandoned
        );
    }
    if !summary.sink_drained {
        log::warn!("Runtime: event sink did not drain before shutdown");
    }
    Ok(())
}

/// Pushes simulated tokens into `feed` until told to stop. Returns the
/// number of tokens accepted.
async fn produce(feed: FeedSender, mut stream: SimulatedStream, mut stop: watch::Receiver<bool>) -> u64 {
    let mut pushed = 0;
    loop {
        let (sequence_no, delay, entropy) = stream.next_token();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.changed() => break,
        }
        match feed.push_token(sequence_no, delay, entropy) {
            Ok(()) => pushed += 1,
            Err(FeedError::Closed(_)) => break,
            Err(e) => log::debug!("Runtime: {e}"),
        }
    }
    pushed
}

async fn wait_for_stop(duration_secs: Option<u64>) {
    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => log::info!("Runtime: interrupted"),
            Err(e) => {
                log::warn!("Runtime: cannot listen for Ctrl-C: {e}");
                (&mut deadline).await;
            }
        },
        _ = &mut deadline => log::info!("Runtime: duration elapsed"),
    }
}
