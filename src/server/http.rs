//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Routing is a prefix
//! dispatch into the route modules; each module owns its own method/path
//! matching.

use bson::doc;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::auth::JwtValidator;
use crate::config::Args;
use crate::db::schemas::{
    GroupDoc, ParticipantDoc, SettingDoc, StaffDoc, TemplateDoc, GROUP_COLLECTION,
    PARTICIPANT_COLLECTION, SETTING_COLLECTION, STAFF_COLLECTION, TEMPLATE_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::ledger::{override_setting_keys, CapOverrides};
use crate::routes;
use crate::routes::respond::{cors_preflight, not_found, BoxBody};
use crate::services::Notifier;
use crate::types::{Result, TurnstileError};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub mongo: MongoClient,
    pub jwt: JwtValidator,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(args: Args, mongo: MongoClient, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let jwt = if args.dev_mode && args.jwt_secret.is_none() {
            JwtValidator::new_dev()
        } else {
            let secret = args
                .jwt_secret
                .clone()
                .ok_or_else(|| TurnstileError::Config("JWT_SECRET is required".into()))?;
            JwtValidator::new(secret, args.jwt_expiry_seconds)?
        };

        Ok(Self {
            args,
            mongo,
            jwt,
            notifier,
        })
    }

    pub async fn staff(&self) -> Result<MongoCollection<StaffDoc>> {
        self.mongo.collection(STAFF_COLLECTION).await
    }

    pub async fn participants(&self) -> Result<MongoCollection<ParticipantDoc>> {
        self.mongo.collection(PARTICIPANT_COLLECTION).await
    }

    pub async fn templates(&self) -> Result<MongoCollection<TemplateDoc>> {
        self.mongo.collection(TEMPLATE_COLLECTION).await
    }

    pub async fn groups(&self) -> Result<MongoCollection<GroupDoc>> {
        self.mongo.collection(GROUP_COLLECTION).await
    }

    pub async fn settings(&self) -> Result<MongoCollection<SettingDoc>> {
        self.mongo.collection(SETTING_COLLECTION).await
    }

    /// Fetch the cap-override settings, once per operation. Never cached,
    /// so policy changes apply to the next distribution immediately.
    pub async fn cap_overrides(&self) -> Result<CapOverrides> {
        let settings = self.settings().await?;
        let mut overrides = CapOverrides::new();

        for key in override_setting_keys() {
            if let Some(setting) = settings.find_one(doc! { "name": key }).await? {
                overrides.insert(key, setting.value);
            }
        }

        Ok(overrides)
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Turnstile listening on {} as node {}",
        state.args.listen, state.args.node_id
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

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    // CORS preflight for every route
    if method == Method::OPTIONS {
        return Ok(cors_preflight());
    }

    let response = if path == "/health" || path == "/healthz" || path == "/version" {
        routes::health::handle(&state, &path)
    } else if path.starts_with("/auth") {
        routes::auth_routes::handle(req, state).await
    } else if path.starts_with("/admin/staff") {
        routes::staff::handle(req, state, &path).await
    } else if path.starts_with("/distribute") {
        routes::distribution::handle(req, state, &path).await
    } else if path.starts_with("/participants") {
        routes::participants::handle(req, state, &path).await
    } else if path.starts_with("/templates") {
        routes::templates::handle(req, state, &path).await
    } else if path.starts_with("/groups") {
        routes::groups::handle(req, state, &path).await
    } else if path.starts_with("/settings") {
        routes::settings::handle(req, state, &path).await
    } else if path.starts_with("/import") {
        routes::import::handle(req, state, &path).await
    } else {
        not_found(&path)
    };

    Ok(response)
}
