use clap::Parser;
use config::CONFIG;
use log::{error, info};
use std::{net::SocketAddr, time::Duration};

use crate::{
    analyze::{AnalyzeClient, AnalyzeEndpoint, AnalyzeRequest},
    dashboard::{format_time, DashboardSession},
};

mod analyze;
mod config;
mod dashboard;
mod gateway;
mod normalize;
mod web;

lazy_static::lazy_static! {
    static ref ARGS: Args = Args::parse();
}

/// Eagle Eye dashboard gateway
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Analyzes one video URL against the configured backend, prints the result and exits
    #[clap(long)]
    analyze: Option<String>,
    /// Drone latitude sent along with --analyze
    #[clap(long, allow_hyphen_values = true)]
    lat: Option<f64>,
    /// Drone longitude sent along with --analyze
    #[clap(long, allow_hyphen_values = true)]
    lon: Option<f64>,
    /// Backend route used by --analyze
    #[clap(long, value_enum, default_value_t = AnalyzeEndpoint::Analyze)]
    endpoint: AnalyzeEndpoint,
}

async fn analyze_once(video_url: &str) -> anyhow::Result<bool> {
    let client = AnalyzeClient::new(CONFIG.analyze())?;
    let request = AnalyzeRequest::new(video_url, ARGS.lat, ARGS.lon);
    let mut session = DashboardSession::default();
    session.refresh(&client, ARGS.endpoint, &request).await;

    let snapshot = session.snapshot();
    for entry in &snapshot.timeline {
        info!("{}: {} detected", format_time(entry.second), entry.count);
    }
    if let Some(latest) = &snapshot.latest_detection {
        info!(
            "target found at {} (CCTV {}): {:.4}, {:.4}",
            latest.location_name, latest.cctv_id, latest.coordinates.lat, latest.coordinates.lng
        );
    }
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(snapshot.error.is_none())
}

#[tokio::main]
async fn main() {
    lazy_static::initialize(&ARGS);

    env_logger::Builder::new()
        .parse_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    if let Some(video_url) = &ARGS.analyze {
        match analyze_once(video_url).await {
            Ok(true) => return,
            Ok(false) => std::process::exit(1),
            Err(e) => {
                error!("analyze failed: {e:#}");
                std::process::exit(1);
            }
        }
    }

    if let Some(prometheus_bind) = CONFIG.prometheus_bind {
        prometheus_exporter::start(prometheus_bind).expect("failed to load prometheus_exporter");
    }

    if CONFIG.upstream.url.is_none() {
        error!("no upstream url configured, set upstream.url or EAGLE_EYE_UPSTREAM_URL");
    }

    let state = web::AppState::from_config(&CONFIG).expect("failed to build http clients");

    async fn run(state: web::AppState) -> anyhow::Result<()> {
        let server = axum::Server::bind(&CONFIG.web_bind);
        info!("listening @ {}", CONFIG.web_bind);
        server
            .serve(
                web::route(&CONFIG.gateway_route, state)
                    .into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
        Ok(())
    }
    loop {
        if let Err(e) = run(state.clone()).await {
            error!("failed to start api server: {:?}", e);
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
