//! Honeypot Guard
//!
//! This is the main entry point for the honeypot guard service.
//! It initializes the security pipeline and starts the web server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use log::{debug, info, warn};
use metrics_exporter_prometheus::PrometheusBuilder;

use honeypot_guard::api::{self, ApiState, SecurityGuard};
use honeypot_guard::config;
use honeypot_guard::core::{AccountDirectory, AttackLog, SecurityPipeline};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    info!("Starting Honeypot Guard...");

    // Load configuration
    let config = config::load_config().context("Failed to load configuration")?;

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics exporter unavailable: {}", e);
            None
        }
    };

    // The attack log must be reachable before we accept traffic
    let attack_log = AttackLog::from_config(&config.attack_log)
        .await
        .context("Failed to open attack log")?;
    info!("Attack log backend: {:?}", config.attack_log.backend);

    let pipeline = SecurityPipeline::from_config(&config, attack_log, Arc::new(AccountDirectory::new()))
        .context("Failed to build security pipeline")?;
    let pipeline = Arc::new(pipeline);

    if config.sweep.interval_seconds > 0 {
        let pipeline = Arc::clone(&pipeline);
        let period = Duration::from_secs(config.sweep.interval_seconds);
        actix_rt::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let (clients, pairs) = pipeline.sweep(Instant::now());
                if clients + pairs > 0 {
                    debug!("Swept {} idle clients and {} idle login pairs", clients, pairs);
                }
            }
        });
    }

    let writer = Arc::clone(&pipeline);
    let state = web::Data::new(ApiState {
        pipeline: Arc::clone(&pipeline),
        metrics,
    });

    info!("Listening on {}:{}", config.server.host, config.server.port);

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(SecurityGuard::new(Arc::clone(&pipeline)))
            .configure(api::config)
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    info!("Shutting down, flushing pending attack events");
    writer.flush().await;

    Ok(())
}
