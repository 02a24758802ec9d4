use clap::Parser;
use faultline_core::FaultlineConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use faultline_server::subsystems::ingest;
use faultline_server::{http, server, wiring};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "faultline.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match FaultlineConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    if args.health {
        match &config.database {
            Some(db) if config.needs_database() => {
                let pool = match faultline_core::db::create_pool(db).await {
                    Ok(p) => p,
                    Err(e) => {
                        println!("❌ PostgreSQL connection failed: {}", e);
                        std::process::exit(1);
                    }
                };
                match faultline_core::db::health_check(&pool).await {
                    Ok(v) => println!("✅ PostgreSQL connected: {}", v),
                    Err(e) => {
                        println!("❌ PostgreSQL health check failed: {}", e);
                        std::process::exit(1);
                    }
                }
            }
            _ => println!("✅ Memory backends selected, no database to check"),
        }
        println!("✅ Faultline health check passed");
        return Ok(());
    }

    // Store connection and stream subscription; failure is fatal
    let components = match wiring::build_components(&config).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Startup failed");
            std::process::exit(1);
        }
    };

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
        }
        let _ = shutdown_tx.send(());
    });

    // Operator HTTP API
    let http_handle = if config.http.enabled {
        let http_state = components.http_state();
        let http_config = config.clone();
        let http_shutdown = tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = http::start_http_server(http_state, &http_config, http_shutdown).await {
                tracing::error!("HTTP server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Client channel; bind before ingestion starts so a busy port is fatal
    let channel_addr = format!("{}:{}", config.channel.host, config.channel.port);
    let channel_listener = match TcpListener::bind(&channel_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %channel_addr, error = %e, "Failed to bind client channel");
            std::process::exit(1);
        }
    };
    tracing::info!("Client channel listening on ws://{}", channel_addr);
    let channel_handle = server::spawn_supervised(
        "channel",
        server::serve_channel(channel_listener, components.hub.clone(), tx.subscribe()),
        tx.clone(),
    );

    // Ingestion runs supervised: if it stops on its own, everything stops.
    // The publisher is held so an in-process stream stays open without the HTTP API.
    let wiring::Components {
        consumer,
        resolver,
        hub,
        publisher: _publisher,
        ..
    } = components;
    let ingest_handle = ingest::spawn_ingestion(consumer, resolver, hub, tx.subscribe());
    let outcome = ingest::supervise(ingest_handle, tx.clone()).await;

    let channel_outcome = match channel_handle.await {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("client channel task failed: {}", e)),
    };
    if let Some(handle) = http_handle {
        let _ = handle.await;
    }

    match (outcome, channel_outcome) {
        (Ok(stats), Ok(())) => {
            tracing::info!(
                received = stats.received,
                broadcast = stats.broadcast,
                skipped = stats.skipped,
                "Faultline stopped"
            );
            Ok(())
        }
        (Err(e), _) => {
            tracing::error!(error = %e, "Faultline stopping after ingestion failure");
            std::process::exit(1);
        }
        (Ok(_), Err(e)) => {
            tracing::error!(error = %e, "Faultline stopping after client channel failure");
            std::process::exit(1);
        }
    }
}
