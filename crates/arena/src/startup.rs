//! Application wiring (spec.md §2, §5): builds every domain service from
//! `Settings`, spawns the Tournament Engine's daily ticks and the cache
//! sweeper on a shared `TaskTracker`, and assembles the `Router`. Grounded on
//! `coordinator`'s own `startup.rs`: `Application`/`build`/`run_until_stopped`,
//! `build_reqwest_client`/`LoggingMiddleware`, and `shutdown_signal` are kept
//! near-verbatim; `build_app`/`app()` are rewritten for the new domain.

use crate::{
    api::routes::{auth, game, lnurl, payments, system, tournaments, wallet},
    config::Settings,
    domain::{
        payments::{buy_in::BuyInService, webhook::WebhookHandler},
        sessions::{LnurlAuth, RateLimiter, SessionStore},
        tournament::{attempts::AttemptService, engine::TournamentEngine, service::TournamentQueryService, store::TournamentStore},
        users::UserStore,
        wallet::{WalletService, WalletStore},
        whitelist::WhitelistStore,
    },
    infra::{
        cache::{Cache, CacheSweeper, InProcessCache},
        db::{DBConnection, DatabasePoolConfig, DatabaseType},
        lightning::{Ln, LnbitsClient},
        oracle::{Oracle, OracleClient},
    },
};

#[cfg(any(feature = "e2e-testing", debug_assertions))]
use crate::infra::{lightning_mock::MockLnClient, oracle_mock::MockOracle};

use anyhow::anyhow;
use axum::{
    body::Body,
    extract::{connect_info::IntoMakeServiceWithConnectInfo, ConnectInfo, Request},
    http::{Extensions, HeaderValue},
    middleware::{self, AddExtension, Next},
    response::IntoResponse,
    routing::{get, post},
    serve::Serve,
    Router,
};
use hyper::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use log::{error, info, warn};
use reqwest_middleware::{
    reqwest::{self, Client, Url},
    ClientBuilder, ClientWithMiddleware, Middleware,
};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::collections::HashMap;
use std::{net::SocketAddr, str::FromStr};
use std::{sync::Arc, time::Duration};
use tokio::signal::unix::{signal, SignalKind};
use tokio::{net::TcpListener, select, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub struct Application {
    server: Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    cancellation_token: CancellationToken,
    background_tasks: TaskTracker,
}

impl Application {
    pub async fn build(config: Settings) -> Result<Self, anyhow::Error> {
        let address = format!("{}:{}", config.api_settings.domain, config.api_settings.port);
        let listener = SocketAddr::from_str(&address)?;
        let frontend_url = config.api_settings.frontend_url.clone();
        let (app_state, background_tasks, cancellation_token) = build_app(config).await?;
        let server = build_server(listener, app_state, frontend_url).await?;
        Ok(Self {
            server,
            cancellation_token,
            background_tasks,
        })
    }

    pub async fn run_until_stopped(self) -> Result<(), anyhow::Error> {
        info!("Starting server...");
        match self.server.with_graceful_shutdown(shutdown_signal()).await {
            Ok(_) => {
                info!("Server shutdown initiated");
                self.cancellation_token.cancel();

                let timeout = tokio::time::sleep(std::time::Duration::from_secs(10));
                select! {
                    _ = self.background_tasks.wait() => {
                        info!("Background tasks completed gracefully");
                    }
                    _ = timeout => {
                        warn!("Background tasks timed out during shutdown");
                    }
                }

                info!("Shutdown complete");
                Ok(())
            }
            Err(e) => {
                error!("Server shutdown error: {}", e);
                self.cancellation_token.cancel();

                let _ = tokio::time::timeout(
                    std::time::Duration::from_secs(5),
                    self.background_tasks.wait(),
                )
                .await;

                Err(anyhow!("Error during server shutdown: {}", e))
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub db: DBConnection,
    pub cache: Arc<dyn Cache>,
    pub users: Arc<UserStore>,
    pub wallet: Arc<WalletService>,
    pub tournaments: Arc<TournamentQueryService>,
    pub attempts: Arc<AttemptService>,
    pub buy_in: Arc<BuyInService>,
    pub webhook: Arc<WebhookHandler>,
    pub sessions: Arc<SessionStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub lnurl: Arc<LnurlAuth>,
    pub whitelist: Arc<WhitelistStore>,
    pub engine: Arc<TournamentEngine>,
    pub background_tasks: Arc<HashMap<String, JoinHandle<()>>>,
}

pub async fn build_app(
    config: Settings,
) -> Result<(AppState, TaskTracker, CancellationToken), anyhow::Error> {
    let pool_config: DatabasePoolConfig = config.db_settings.clone().into();
    std::fs::create_dir_all(&config.db_settings.data_folder)?;

    let db = DBConnection::new(
        &config.db_settings.data_folder,
        "arena",
        pool_config,
        DatabaseType::Arena,
    )
    .await
    .map_err(|e| anyhow!("Error setting up arena db: {}", e))?;

    let in_process_cache = Arc::new(InProcessCache::new(config.cache_settings.max_entries));
    let cache: Arc<dyn Cache> = in_process_cache.clone();

    let reqwest_client = build_reqwest_client();

    #[cfg(any(feature = "e2e-testing", debug_assertions))]
    let ln: Arc<dyn Ln> = if config.lightning_settings.mock_enabled {
        let mock_ln = if let Some(auto_accept_secs) = config.lightning_settings.mock_auto_accept_secs {
            MockLnClient::with_auto_accept(Duration::from_secs(auto_accept_secs))
        } else {
            MockLnClient::new()
        };
        info!(
            "Mock LN client configured (auto_accept: {:?})",
            config.lightning_settings.mock_auto_accept_secs
        );
        Arc::new(mock_ln)
    } else {
        let base_url = Url::parse(&config.lightning_settings.lnbits_url)
            .map_err(|e| anyhow!("Failed to parse LNbits url: {}", e))?;
        let client = LnbitsClient::new(
            reqwest_client.clone(),
            base_url,
            secrecy::SecretString::from(config.lightning_settings.api_key.clone()),
            secrecy::SecretString::from(config.lightning_settings.admin_key.clone()),
            Duration::from_millis(config.lightning_settings.api_timeout_ms),
            Duration::from_millis(config.lightning_settings.lnurl_timeout_ms),
        );
        client.ping().await?;
        info!("LNbits client configured");
        Arc::new(client)
    };

    #[cfg(not(any(feature = "e2e-testing", debug_assertions)))]
    let ln: Arc<dyn Ln> = {
        if config.lightning_settings.mock_enabled {
            return Err(anyhow!(
                "Mock LN client requires e2e-testing feature or debug build"
            ));
        }
        let base_url = Url::parse(&config.lightning_settings.lnbits_url)
            .map_err(|e| anyhow!("Failed to parse LNbits url: {}", e))?;
        let client = LnbitsClient::new(
            reqwest_client.clone(),
            base_url,
            secrecy::SecretString::from(config.lightning_settings.api_key.clone()),
            secrecy::SecretString::from(config.lightning_settings.admin_key.clone()),
            Duration::from_millis(config.lightning_settings.api_timeout_ms),
            Duration::from_millis(config.lightning_settings.lnurl_timeout_ms),
        );
        client.ping().await?;
        info!("LNbits client configured");
        Arc::new(client)
    };

    #[cfg(any(feature = "e2e-testing", debug_assertions))]
    let oracle: Arc<dyn Oracle> = if config.oracle_settings.mock_enabled {
        info!("Mock Oracle configured");
        Arc::new(MockOracle::new(config.oracle_settings.fallback_price))
    } else {
        let base_url = Url::parse(&config.oracle_settings.base_url)
            .map_err(|e| anyhow!("Failed to parse oracle url: {}", e))?;
        Arc::new(OracleClient::new(
            reqwest_client.clone(),
            base_url,
            cache.clone(),
            Duration::from_secs(config.oracle_settings.cache_ttl_secs),
            config.oracle_settings.fallback_price,
            config.oracle_settings.max_consecutive_failures,
        ))
    };

    #[cfg(not(any(feature = "e2e-testing", debug_assertions)))]
    let oracle: Arc<dyn Oracle> = {
        if config.oracle_settings.mock_enabled {
            return Err(anyhow!(
                "Mock Oracle requires e2e-testing feature or debug build"
            ));
        }
        let base_url = Url::parse(&config.oracle_settings.base_url)
            .map_err(|e| anyhow!("Failed to parse oracle url: {}", e))?;
        Arc::new(OracleClient::new(
            reqwest_client.clone(),
            base_url,
            cache.clone(),
            Duration::from_secs(config.oracle_settings.cache_ttl_secs),
            config.oracle_settings.fallback_price,
            config.oracle_settings.max_consecutive_failures,
        ))
    };

    let users = Arc::new(UserStore::new(db.clone()));
    let wallet_store = WalletStore::new(db.clone());
    let tournament_store = TournamentStore::new(db.clone());
    let whitelist = Arc::new(WhitelistStore::new(db.clone()));

    let sessions = Arc::new(SessionStore::new(cache.clone()));
    let rate_limiter = Arc::new(RateLimiter::new(cache.clone()));
    let lnurl = Arc::new(LnurlAuth::new(
        cache.clone(),
        whitelist.clone(),
        users.clone(),
        sessions.clone(),
        format!("https://{}/auth/lnurl/callback", config.api_settings.domain),
    ));

    let wallet_store_arc = Arc::new(wallet_store.clone());
    let wallet = Arc::new(WalletService::new(wallet_store, cache.clone(), ln.clone(), oracle.clone()));
    let tournaments = Arc::new(TournamentQueryService::new(
        tournament_store.clone(),
        oracle.clone(),
        config.game_settings.attempt_cost_usd,
    ));
    let attempts = Arc::new(AttemptService::new(
        tournament_store.clone(),
        cache.clone(),
        wallet_store_arc,
        oracle.clone(),
        config.game_settings.attempt_cost_usd,
    ));
    let buy_in = Arc::new(BuyInService::new(tournament_store.clone(), cache.clone(), ln.clone()));
    let webhook = Arc::new(WebhookHandler::new(cache.clone(), tournament_store.clone(), wallet.clone()));
    let engine = Arc::new(TournamentEngine::new(
        tournament_store.clone(),
        ln.clone(),
        config.game_settings.buy_in_sats,
    ));

    let tracker = TaskTracker::new();
    let cancel_token = CancellationToken::new();
    let mut threads = HashMap::new();

    let engine_ticks = crate::domain::tournament::engine::spawn_ticks(engine.clone(), cancel_token.clone());
    threads.insert("tournament_engine".to_string(), engine_ticks);

    let sweeper = CacheSweeper::new(
        in_process_cache,
        Duration::from_secs(config.cache_settings.sweep_interval_secs),
        cancel_token.clone(),
    );
    let sweeper_task = tracker.spawn(sweeper.run());
    threads.insert("cache_sweeper".to_string(), sweeper_task);
    tracker.close();

    let app_state = AppState {
        settings: config,
        db,
        cache,
        users,
        wallet,
        tournaments,
        attempts,
        buy_in,
        webhook,
        sessions,
        rate_limiter,
        lnurl,
        whitelist,
        engine,
        background_tasks: Arc::new(threads),
    };

    Ok((app_state, tracker, cancel_token))
}

pub async fn build_server(
    socket_addr: SocketAddr,
    app_state: AppState,
    frontend_url: String,
) -> Result<
    Serve<
        TcpListener,
        IntoMakeServiceWithConnectInfo<Router, SocketAddr>,
        AddExtension<Router, ConnectInfo<SocketAddr>>,
    >,
    anyhow::Error,
> {
    let listener = TcpListener::bind(socket_addr).await?;

    info!("Setting up service");
    let app = app(app_state, vec![frontend_url]);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    info!(
        "Service running @: http://{}:{}",
        socket_addr.ip(),
        socket_addr.port()
    );
    Ok(server)
}

/// Builds the full `Router`. CORS is an exact allow-list of origins
/// (spec.md §4.8); unlike the rest of the surface, `/payments/webhook` and
/// `/health` also accept requests with no `Origin` header at all, which is
/// what LNbits and uptime probes send — `CorsLayer` only governs
/// browser-originated cross-origin calls, so this is enforced implicitly by
/// those two routes never relying on credentials.
pub fn app(app_state: AppState, origins: Vec<String>) -> Router {
    let origins: Vec<HeaderValue> = origins
        .into_iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION, "x-csrf-token".parse().unwrap()])
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route("/logout-all", post(auth::logout_all))
        .route("/lnurl/challenge", get(lnurl::challenge))
        .route("/lnurl/verify", post(lnurl::verify))
        .route("/lnurl/complete", post(lnurl::complete));

    let tournament_routes = Router::new()
        .route("/current", get(tournaments::current))
        .route("/current/leaderboard", get(tournaments::leaderboard))
        .route("/current/entry", get(tournaments::entry));

    let payment_routes = Router::new()
        .route("/buy-in", post(payments::buy_in))
        .route("/status/{hash}", get(payments::status))
        .route("/webhook", post(payments::webhook));

    let wallet_routes = Router::new()
        .route("/balance", get(wallet::balance))
        .route("/deposit", post(wallet::deposit))
        .route("/deposit/status/{hash}", get(wallet::deposit_status))
        .route("/transactions", get(wallet::transactions));

    let game_routes = Router::new()
        .route("/attempts", get(game::attempts))
        .route("/start-attempt", post(game::start_attempt))
        .route("/submit", post(game::submit))
        .route("/stats", get(game::stats));

    Router::new()
        .route("/health", get(system::health))
        .route("/csrf-token", get(system::csrf_token))
        .nest("/auth", auth_routes)
        .nest("/tournaments", tournament_routes)
        .nest("/payments", payment_routes)
        .nest("/wallet", wallet_routes)
        .nest("/game", game_routes)
        .layer(middleware::from_fn(log_request))
        .with_state(Arc::new(app_state))
        .layer(cors)
}

async fn log_request(request: Request<Body>, next: Next) -> impl IntoResponse {
    let now = time::OffsetDateTime::now_utc();
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or_default();
    info!(target: "http_request","new request, {} {}", request.method().as_str(), path);

    let response = next.run(request).await;
    let response_time = time::OffsetDateTime::now_utc() - now;
    info!(target: "http_response", "response, code: {}, time: {}", response.status().as_str(), response_time);

    response
}

pub fn build_reqwest_client() -> ClientWithMiddleware {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    ClientBuilder::new(Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .with(LoggingMiddleware)
        .build()
}

struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let method = req.method().clone();
        let url = req.url().clone();

        info!("Making {} request to: {}", method, url);

        let result = next.run(req, extensions).await;

        match &result {
            Ok(response) => {
                info!("{} {} -> Status: {}", method, url, response.status());
            }
            Err(error) => {
                warn!("{} {} -> Error: {:?}", method, url, error);
            }
        }

        result
    }
}

async fn shutdown_signal() {
    let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

    select! {
        _ = sigint.recv() => info!("Received SIGINT signal"),
        _ = sigterm.recv() => info!("Received SIGTERM signal"),
    }
}
