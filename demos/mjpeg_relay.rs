//! MJPEG relay - fans encoder output out to any number of browsers
//!
//! Run with: cargo run --example mjpeg_relay -- [OPTIONS]
//!
//! Examples:
//!   cargo run --example mjpeg_relay
//!   cargo run --example mjpeg_relay -- --stream /mjpeg_stream1=0.0.0.0:9990 --stream /mjpeg_stream2=0.0.0.0:9991
//!
//! ## Producing (send frames)
//!
//! With gstreamer:
//!   gst-launch-1.0 -v videotestsrc ! video/x-raw,width=640,height=480 ! jpegenc quality=80 \
//!     ! multipartmux boundary=frameboundary ! tcpclientsink host=127.0.0.1 port=9990
//!
//! ## Watching (receive frames)
//!
//! Open http://localhost:1337/mjpeg_stream1 in a browser, or
//!   ffplay http://localhost:1337/mjpeg_stream1
//!
//! # Architecture
//!
//! ```text
//!   encoder ──tcp:9990──> IngestServer ──publish──> Hub<Bytes> ──subscribe──> GET /mjpeg_stream1
//!                                                       │
//!                                                       └────subscribe──> GET /mjpeg_stream1
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use frame_hub::{BufferPlan, Hub, HubConfig, IngestConfig, IngestServer, ServeConfig, StreamServer};

/// One HTTP route fed by one TCP ingest socket
#[derive(Clone, Debug)]
struct StreamRoute {
    path: String,
    ingest: SocketAddr,
}

fn parse_stream(arg: &str) -> Result<StreamRoute, String> {
    let (path, addr) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected PATH=ADDR, got '{}'", arg))?;

    if !path.starts_with('/') {
        return Err(format!("route '{}' must start with '/'", path));
    }

    let ingest = addr
        .parse::<SocketAddr>()
        .map_err(|e| format!("invalid ingest address '{}': {}", addr, e))?;

    Ok(StreamRoute {
        path: path.to_string(),
        ingest,
    })
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Address the HTTP server binds to
    #[arg(long, default_value = "0.0.0.0:1337")]
    http: SocketAddr,

    /// Route and ingest socket as PATH=ADDR. Repeat for more streams.
    #[arg(long = "stream", value_parser = parse_stream, default_value = "/mjpeg_stream1=0.0.0.0:9990")]
    streams: Vec<StreamRoute>,

    /// Total buffers shared between a hub's queue and each inbox
    #[arg(long, default_value_t = frame_hub::hub::DEFAULT_TOTAL_BUFFERS)]
    total_buffers: usize,

    /// Largest chunk read from an ingest socket
    #[arg(long, default_value_t = frame_hub::ingest::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Close an HTTP stream after this long without data
    #[arg(long, default_value_t = 1000)]
    idle_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("frame_hub=info".parse()?)
                .add_directive("mjpeg_relay=info".parse()?),
        )
        .init();

    let plan = BufferPlan::from_total(args.total_buffers);
    plan.validate()?;
    tracing::info!(
        total = plan.total,
        queue_capacity = plan.queue_capacity,
        inbox_capacity = plan.inbox_capacity,
        "Buffer plan"
    );

    let serve_config = ServeConfig::with_addr(args.http)
        .plan(&plan)
        .idle_timeout(Duration::from_millis(args.idle_timeout_ms));
    let mut server = StreamServer::new(serve_config);

    let mut hubs = Vec::with_capacity(args.streams.len());
    for route in &args.streams {
        // Frames are refcounted Bytes, never recycled, so stalled viewers may be evicted
        let config = HubConfig::with_queue_capacity(plan.queue_capacity).name(route.path.clone());
        let hub: Hub<Bytes> = Hub::with_config(config);
        hub.start();

        let ingest = IngestServer::new(
            IngestConfig::with_addr(route.ingest).chunked(args.chunk_size),
            hub.clone(),
        );
        let path = route.path.clone();
        tokio::spawn(async move {
            if let Err(e) = ingest.run().await {
                tracing::error!(route = %path, error = %e, "Ingest server error");
            }
        });

        server = server.mjpeg(&route.path, hub.clone());
        hubs.push(hub);
        println!("{} <- tcp://{}", route.path, route.ingest);
    }

    println!("Serving on http://{}", args.http);
    println!("Press Ctrl+C to stop");

    let shutdown_hubs = hubs.clone();
    server
        .run_until(async move {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
            for hub in &shutdown_hubs {
                hub.shutdown();
            }
        })
        .await?;

    for hub in &hubs {
        hub.stopped().await;
        let stats = hub.stats();
        println!(
            "{}: {} published, {} delivered, {} dropped, {} evicted",
            hub.config().name,
            stats.published,
            stats.delivered,
            stats.dropped,
            stats.evicted
        );
    }

    Ok(())
}
