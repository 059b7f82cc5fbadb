//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo, one task per accepted connection.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Args;
use crate::db::MongoClient;
use crate::ledger::{InMemoryKeyLedger, KeyExchangeLedger, MongoKeyLedger};
use crate::protocol::ProtocolHandlers;
use crate::registry::{DeviceRegistry, InMemoryDeviceRegistry, MongoDeviceRegistry};
use crate::routes;
use crate::types::{GatehouseError, Result};

const REGISTER_PATH: &str = "/api/v1/devices/register";
const KEYS_PATH: &str = "/api/v1/devices/keys";
const HEARTBEAT_PATH: &str = "/api/v1/devices/heartbeat";
const WRAPPED_KEY_PATH: &str = "/api/v1/devices/wrapped-key";

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub protocol: ProtocolHandlers,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        registry: Arc<dyn DeviceRegistry>,
        ledger: Arc<dyn KeyExchangeLedger>,
    ) -> Self {
        let protocol = ProtocolHandlers::new(registry, ledger, args.protocol_config());
        Self {
            args,
            protocol,
            started_at: Instant::now(),
        }
    }

    /// State backed by process-local stores; nothing survives a restart
    pub fn in_memory(args: Args) -> Self {
        Self::new(
            args,
            Arc::new(InMemoryDeviceRegistry::new()),
            Arc::new(InMemoryKeyLedger::new()),
        )
    }

    /// Validate the configuration and open the selected storage backend
    pub async fn connect(args: Args) -> Result<Self> {
        args.validate().map_err(GatehouseError::Config)?;

        if args.dev_mode {
            warn!("Development mode enabled - using in-memory storage");
            return Ok(Self::in_memory(args));
        }

        let mongo = MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await?;
        let registry = MongoDeviceRegistry::new(&mongo).await?;
        let ledger = MongoKeyLedger::new(&mongo).await?;
        info!("MongoDB storage ready (database: {})", mongo.db_name());

        Ok(Self::new(args, Arc::new(registry), Arc::new(ledger)))
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Gatehouse listening on {} ({} storage)",
        state.args.listen,
        state.args.storage_backend()
    );

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Collect the request body, refusing anything over the configured cap
async fn read_body(req: Request<Incoming>, limit: usize) -> Result<Bytes> {
    Limited::new(req.into_body(), limit)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| GatehouseError::Validation(format!("Unreadable request body: {e}")))
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    let response = match (method, path.as_str()) {
        (Method::GET, "/health") | (Method::GET, "/healthz") => routes::health_check(&state),

        // CORS preflight
        (Method::OPTIONS, _) => routes::preflight_response(),

        (Method::POST, KEYS_PATH) => {
            routes::handle_provision_keys(&state.protocol, req.headers()).await
        }

        (Method::POST, REGISTER_PATH | HEARTBEAT_PATH | WRAPPED_KEY_PATH) => {
            let headers = req.headers().clone();
            let body = match read_body(req, state.args.max_body_bytes).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("[{}] {}: {}", addr, path, e);
                    return Ok(routes::error_response(&e));
                }
            };

            match path.as_str() {
                REGISTER_PATH => routes::handle_register(&state.protocol, &headers, body).await,
                HEARTBEAT_PATH => routes::handle_heartbeat(&state.protocol, &headers, body).await,
                _ => routes::handle_submit_wrapped_key(&state.protocol, &headers, body).await,
            }
        }

        (_, REGISTER_PATH | KEYS_PATH | HEARTBEAT_PATH | WRAPPED_KEY_PATH) => {
            routes::method_not_allowed_response("POST, OPTIONS")
        }

        (_, "/health" | "/healthz") => routes::method_not_allowed_response("GET, OPTIONS"),

        _ => routes::not_found_response(),
    };

    Ok(response)
}
