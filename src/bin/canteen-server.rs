use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use tokio::sync::RwLock;

use canteen::approval::{self, ApprovalAction, ApprovalError};
use canteen::auth::{self, AuthError, DeliveryOutcome, Session};
use canteen::notify::{HttpNotifier, Notifier};
use canteen::store::LocalStore;

#[path = "canteen_server/http_error.rs"]
mod http_error;
use self::http_error::*;

struct AppState {
    // Guards the read-modify-write cycles of the file-backed store.
    store: RwLock<LocalStore>,

    notifier: Option<HttpNotifier>,
    approver: String,
    base_url: String,

    // Dev/test convenience: echo approval URLs in the signup response
    // instead of relying on email delivery.
    echo_approval_urls: bool,
}

#[derive(Parser)]
#[command(name = "canteen-server")]
#[command(about = "Canteen signup and approval endpoint (development)", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Write bound address to this file (dev/test convenience)
    #[arg(long)]
    addr_file: Option<PathBuf>,

    /// Data directory
    #[arg(long, default_value = "./canteen-data")]
    data_dir: PathBuf,

    /// Origin used when rendering approval links (defaults to the bound address)
    #[arg(long)]
    base_url: Option<String>,

    /// Include approve/reject URLs in signup responses
    #[arg(long)]
    echo_approval_urls: bool,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let store = LocalStore::at(&args.data_dir)?;
    let config = store.read_config()?;

    let notifier = match &config.notify {
        Some(nc) => Some(
            HttpNotifier::new(nc.clone())
                .map_err(|e| anyhow::anyhow!(e))
                .context("build notifier")?,
        ),
        None => None,
    };
    let approver = config
        .notify
        .as_ref()
        .map(|n| n.approver_email.clone())
        .unwrap_or_default();

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .with_context(|| format!("bind {}", args.addr))?;

    let local_addr = listener.local_addr().context("read listener local addr")?;
    eprintln!("canteen-server listening on {}", local_addr);

    let base_url = args
        .base_url
        .or(config.base_url)
        .unwrap_or_else(|| format!("http://{}", local_addr));

    if let Some(addr_file) = &args.addr_file {
        std::fs::write(addr_file, local_addr.to_string())
            .with_context(|| format!("write addr file {}", addr_file.display()))?;
    }

    let state = Arc::new(AppState {
        store: RwLock::new(store),
        notifier,
        approver,
        base_url,
        echo_approval_urls: args.echo_approval_urls,
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/approve/:token", get(approve))
        .route("/reject/:token", get(reject))
        .with_state(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

#[derive(Debug, serde::Deserialize)]
struct SignupRequest {
    email: String,
    password: String,
    name: String,
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<serde_json::Value>, Response> {
    let outcome = {
        let store = state.store.write().await;
        auth::signup(
            &store,
            None,
            &state.approver,
            &state.base_url,
            &payload.email,
            &payload.password,
            &payload.name,
        )
        .map_err(auth_error)?
    };

    // Delivery happens outside the store lock; the blocking HTTP client
    // must not run on the async runtime.
    let delivery = match &state.notifier {
        None => DeliveryOutcome::Skipped,
        Some(notifier) => {
            let notifier = notifier.clone();
            let mail = canteen::notify::ApprovalEmail {
                recipient: state.approver.clone(),
                requester_name: outcome.account.name.clone(),
                requester_email: outcome.account.email.clone(),
                approve_url: outcome.approve_url.clone(),
                reject_url: outcome.reject_url.clone(),
            };
            let sent =
                tokio::task::spawn_blocking(move || notifier.send_approval_request(&mail))
                    .await
                    .map_err(|e| internal_error(anyhow::anyhow!(e)))?;
            match sent {
                Ok(()) => DeliveryOutcome::Sent,
                Err(err) => {
                    eprintln!("warning: {}", err);
                    DeliveryOutcome::Failed(err)
                }
            }
        }
    };

    let delivery = match delivery {
        DeliveryOutcome::Sent => "sent",
        DeliveryOutcome::Skipped => "skipped",
        DeliveryOutcome::Failed(_) => "failed",
    };

    let mut body = serde_json::json!({
        "id": outcome.account.id,
        "email": outcome.account.email,
        "status": outcome.account.status,
        "delivery": delivery,
    });
    if state.echo_approval_urls {
        body["approve_url"] = serde_json::Value::String(outcome.approve_url);
        body["reject_url"] = serde_json::Value::String(outcome.reject_url);
    }
    Ok(Json(body))
}

#[derive(Debug, serde::Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, Response> {
    let store = state.store.write().await;
    let mut session = Session::restore(&store).map_err(internal_error)?;
    let account = auth::login(&store, &mut session, &payload.email, &payload.password)
        .map_err(auth_error)?;
    Ok(Json(serde_json::json!({
        "id": account.id,
        "email": account.email,
        "name": account.name,
        "status": account.status,
    })))
}

async fn approve(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, Response> {
    redeem(&state, &token, ApprovalAction::Approve).await
}

async fn reject(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, Response> {
    redeem(&state, &token, ApprovalAction::Reject).await
}

async fn redeem(
    state: &AppState,
    token: &str,
    action: ApprovalAction,
) -> Result<Json<serde_json::Value>, Response> {
    let store = state.store.write().await;
    let account = approval::redeem(&store, token, action).map_err(approval_error)?;
    Ok(Json(serde_json::json!({
        "id": account.id,
        "email": account.email,
        "status": account.status,
    })))
}

fn auth_error(err: AuthError) -> Response {
    match err {
        AuthError::DuplicateUser(_) => conflict(&err.to_string()),
        AuthError::NotFound(_) => not_found(),
        AuthError::InvalidCredential => unauthorized(),
        AuthError::PendingApproval | AuthError::Rejected => forbidden(&err.to_string()),
        AuthError::Store(inner) => internal_error(inner),
    }
}

fn approval_error(err: ApprovalError) -> Response {
    match err {
        ApprovalError::Decode(_) | ApprovalError::InvalidToken => {
            bad_request(anyhow::anyhow!(err))
        }
        ApprovalError::ExpiredToken => gone(&err.to_string()),
        ApprovalError::UnknownUser => not_found(),
        ApprovalError::Store(inner) => internal_error(inner),
    }
}
