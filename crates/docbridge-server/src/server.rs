//! Listener loop and process wiring.

use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use docbridge_client::BackendClient;
use docbridge_core::DocumentStore;
use docbridge_ingest::Ingestor;
use docbridge_sessions::SessionPool;
use docbridge_tasks::Scheduler;
use http::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::auth::BasicAuth;
use crate::config::BridgeConfig;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// The DocBridge process: backend client, session pool, ingestor and the
/// HTTP listener in front of them.
pub struct BridgeServer {
    config: BridgeConfig,
    state: Arc<AppState<BackendClient>>,
    scheduler: Scheduler,
}

impl BridgeServer {
    /// Wire every component from a validated configuration.
    pub fn new(config: BridgeConfig) -> ServerResult<Self> {
        let store = Arc::new(BackendClient::new(config.backend.clone())?);
        let pool = Arc::new(SessionPool::new(
            Arc::clone(&store),
            config.profiles(),
            config.sessions,
        )?);
        let ingestor = Ingestor::new(store, Arc::clone(&pool), config.ingest.clone())?;

        let scheduler = Scheduler::new();
        pool.schedule_refresh(&scheduler)
            .map_err(|e| ServerError::server(format!("failed to schedule session refresh: {e}")))?;

        let state = AppState::new(Arc::new(ingestor), BasicAuth::new(config.auth.credential()))
            .with_max_body_size(config.server.max_body_size);

        Ok(Self {
            config,
            state: Arc::new(state),
            scheduler,
        })
    }

    /// Shared request state.
    pub fn state(&self) -> &Arc<AppState<BackendClient>> {
        &self.state
    }

    /// Serve until SIGINT or SIGTERM, then drain and release every session.
    pub async fn run(self) -> ServerResult<()> {
        let settings = &self.config.server;
        let ip: IpAddr = settings
            .listen_addr
            .parse()
            .map_err(|e| ServerError::config(format!("invalid listen address: {e}")))?;
        let addr = SocketAddr::new(ip, settings.listen_port);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::server(format!("failed to bind {addr}: {e}")))?;

        // logins failing here are retried by the first borrow
        self.state.ingestor().pool().refresh_all().await;
        self.scheduler
            .start()
            .map_err(|e| ServerError::server(format!("failed to start scheduler: {e}")))?;
        info!(
            %addr,
            profiles = self.config.profiles.len(),
            backend = %self.config.backend.base_url,
            "docbridge listening"
        );

        let result = serve(
            Arc::clone(&self.state),
            listener,
            shutdown_signal(),
            settings.shutdown_grace,
        )
        .await;

        self.scheduler.stop().await;
        self.state.shutdown(settings.shutdown_grace).await;
        info!("docbridge stopped");
        result
    }
}

impl std::fmt::Debug for BridgeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeServer")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Accept connections on `listener` until `shutdown` resolves, then give
/// open connections up to `grace` to finish.
pub async fn serve<S, F>(
    state: Arc<AppState<S>>,
    listener: TcpListener,
    shutdown: F,
    grace: Duration,
) -> ServerResult<()>
where
    S: DocumentStore,
    F: Future<Output = ()>,
{
    let graceful = GracefulShutdown::new();
    tokio::pin!(shutdown);

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            },
            () = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        };

        let state = Arc::clone(&state);
        let service = service_fn(move |req: Request<Incoming>| {
            let state = Arc::clone(&state);
            async move { Ok::<_, Infallible>(state.handle(req, Some(peer)).await) }
        });

        let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
        let connection = graceful.watch(connection);
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "connection error");
            }
        });
    }

    state.health().set_draining();
    tokio::select! {
        () = graceful.shutdown() => debug!("all connections closed"),
        () = tokio::time::sleep(grace) => {
            warn!(grace_secs = grace.as_secs(), "connections still open after shutdown grace");
        }
    }
    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
