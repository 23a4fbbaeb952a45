use axum::http::{Method, header};
use quill_api_server::{
    config::Config,
    db::{SqliteLedgerStore, init_database},
    generator::HttpContentGenerator,
    handlers::{AppState, app_routes},
    rate_limit::RedisRateLimitStore,
};
use quill_server::{
    ContentGenerator, CreditLedger, MemoryRateLimitStore, RateLimitStore, ReplenishmentScheduler,
    RequestGate, RouteTable, SlidingWindowLimiter,
};
use rusqlite::Connection;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "quill_api_server=debug,quill_server=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Quill API Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Database path: {:?}", config.database_path);
    info!("CORS origins: {:?}", config.cors_origins);

    // Initialize ledger database
    let conn = match Connection::open(&config.database_path) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_database(&conn) {
        error!("Failed to initialize database: {}", e);
        std::process::exit(1);
    }

    let ledger_store = SqliteLedgerStore::new(conn);
    let sessions = Arc::new(ledger_store.session_resolver());
    let ledger = CreditLedger::new(Arc::new(ledger_store)).with_timeout(config.store_timeout);

    // Rate-limit counters: shared via Redis, or in-process for a single instance
    let rate_store: Arc<dyn RateLimitStore> = match &config.redis_url {
        Some(url) => match RedisRateLimitStore::connect(url).await {
            Ok(store) => {
                info!("Rate-limit store: Redis");
                Arc::new(store)
            }
            Err(e) => {
                error!("Failed to connect to Redis: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("REDIS_URL not set; rate limits are enforced per process only");
            let store = MemoryRateLimitStore::new();
            let cleanup_store = store.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
                loop {
                    interval.tick().await;
                    let removed = cleanup_store.cleanup(chrono::Utc::now());
                    if removed > 0 {
                        info!("Cleaned up {} expired rate-limit buckets", removed);
                    }
                }
            });
            Arc::new(store)
        }
    };

    let limiter = SlidingWindowLimiter::new(rate_store, config.limits)
        .with_timeout(config.store_timeout);
    let gate = RequestGate::new(limiter, RouteTable::default());
    let scheduler = ReplenishmentScheduler::new(ledger.clone(), config.replenish);

    let generator: Option<Arc<dyn ContentGenerator>> = match &config.generator {
        Some(generator_config) => match HttpContentGenerator::new(generator_config) {
            Ok(client) => {
                info!("Content generator: {}", generator_config.url);
                let client: Arc<dyn ContentGenerator> = Arc::new(client);
                Some(client)
            }
            Err(e) => {
                error!("Failed to build content generator client: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            warn!("GENERATOR_URL not set; /api/generate will answer 503");
            None
        }
    };

    let state = AppState {
        ledger,
        gate,
        sessions,
        scheduler: scheduler.clone(),
        generator,
        generation_cost: config.generation_cost,
        signup_credits: config.signup_credits,
        trust_proxy_headers: config.trust_proxy_headers,
        admin_secret: config.admin_secret.clone(),
    };

    // Build CORS layer
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-admin-secret"),
        ])
        .expose_headers([
            header::HeaderName::from_static("x-ratelimit-limit"),
            header::HeaderName::from_static("x-ratelimit-remaining"),
            header::HeaderName::from_static("x-ratelimit-reset"),
            header::RETRY_AFTER,
        ])
        .allow_credentials(true)
        .allow_origin(AllowOrigin::list(origins));

    // Build the router
    let app = app_routes(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Create listener
    let addr = config.server_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Server listening on http://{}", addr);

    // Start replenishment task
    if config.replenish_interval_secs > 0 {
        let every = config.replenish_interval_secs;
        info!(
            "Replenishment: {} credits every {}h, checked every {}s",
            config.replenish.grant,
            config.replenish.period.num_hours(),
            every
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(every));
            loop {
                interval.tick().await;
                if let Err(e) = scheduler.run_once().await {
                    error!("Replenishment pass failed: {}", e);
                }
            }
        });
    } else {
        info!("In-process replenishment disabled; use POST /api/admin/replenish");
    }

    // Run server with graceful shutdown
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
