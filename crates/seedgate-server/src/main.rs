#![deny(unsafe_code)]

//! HTTP front end for the ticket engine.
//!
//! Four routes, all GET, all HTML except `/time`:
//!
//! - `/` and `/ticket/` — draw from a weighted-random category
//! - `/ticket/{slug}` — draw from a named category (unknown slugs fall
//!   back to random)
//! - `/validate/{seed}/{ticket}` — classify a presented pair
//! - `/time` — server epoch seconds, so clients can spot clock skew
//!
//! Issuance and verification sleep while holding a file lock, so they run
//! on the blocking pool. Operational failures (lock timeouts, scratch-dir
//! I/O) all map to the same generic failure page.

mod pages;

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use seedgate_core::{Service, Tunables};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut tunables = Tunables::default();
    if let Ok(dir) = env::var("SEEDGATE_SEED_DIR") {
        tunables.seed_dir = dir.into();
    }
    if let Ok(dir) = env::var("SEEDGATE_SCRATCH_DIR") {
        tunables.scratch_dir = dir.into();
    }

    let service = Arc::new(Service::from_env(tunables).context("failed to load categories")?);
    info!(
        categories = service.registry().len(),
        seeds = service.registry().total_seeds(),
        "registry loaded"
    );

    let app = Router::new()
        .route("/", get(index))
        .route("/time", get(server_time))
        .route("/ticket/", get(ticket_random))
        .route("/ticket/{slug}", get(ticket_for))
        .route("/validate/{seed}/{ticket}", get(validate))
        .with_state(service);

    let addr: SocketAddr = env::var("SEEDGATE_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_owned())
        .parse()
        .context("SEEDGATE_ADDR is not a socket address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn index(State(service): State<Arc<Service>>) -> Response {
    issue(service, None).await
}

async fn ticket_random(State(service): State<Arc<Service>>) -> Response {
    issue(service, None).await
}

async fn ticket_for(State(service): State<Arc<Service>>, Path(slug): Path<String>) -> Response {
    issue(service, Some(slug)).await
}

async fn issue(service: Arc<Service>, slug: Option<String>) -> Response {
    let outcome =
        tokio::task::spawn_blocking(move || service.issue(slug.as_deref())).await;
    match outcome {
        Ok(Ok(issued)) => Html(pages::ticket(&issued)).into_response(),
        Ok(Err(err)) => {
            error!(%err, "issuance failed");
            failure()
        }
        Err(err) => {
            error!(%err, "issuance task panicked");
            failure()
        }
    }
}

async fn validate(
    State(service): State<Arc<Service>>,
    Path((seed, ticket)): Path<(String, String)>,
) -> Response {
    let outcome =
        tokio::task::spawn_blocking(move || service.verify(&seed, &ticket)).await;
    match outcome {
        Ok(Ok(verdict)) => Html(pages::verdict(&verdict)).into_response(),
        Ok(Err(err)) => {
            error!(%err, "verification failed");
            failure()
        }
        Err(err) => {
            error!(%err, "verification task panicked");
            failure()
        }
    }
}

async fn server_time() -> Html<String> {
    Html(pages::server_time(chrono::Utc::now().timestamp()))
}

fn failure() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Html(pages::failure())).into_response()
}
