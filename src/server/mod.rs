//! The proxy service: the own `/api` surface in front of the upstream backend.

pub mod auth;
pub mod backend;
pub mod error;
mod routes;

use axum::Router;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::storage::{B2Store, ObjectStore};

use backend::BackendClient;
use error::ProxyError;

/// Whose picture an upload is for. Each owner has its own bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureOwner {
  Student,
  Parent,
}

impl PictureOwner {
  /// Object name prefix and upstream collection
  pub fn collection(self) -> &'static str {
    match self {
      PictureOwner::Student => "students",
      PictureOwner::Parent => "parents",
    }
  }
}

/// A picture store, or why there isn't one.
type StoreSlot = std::result::Result<Arc<dyn ObjectStore>, String>;

#[derive(Clone)]
pub struct AppState {
  pub config: Arc<Config>,
  pub backend: BackendClient,
  students_store: StoreSlot,
  parents_store: StoreSlot,
}

impl AppState {
  pub fn new(config: Config) -> Result<Self> {
    let backend = BackendClient::new(&config)?;
    if config.backend_url().is_none() {
      warn!("BACKEND_API_URL is not set; proxy routes will answer 500");
    }

    let students_store = open_store(&config, PictureOwner::Student);
    let parents_store = open_store(&config, PictureOwner::Parent);

    Ok(Self {
      config: Arc::new(config),
      backend,
      students_store,
      parents_store,
    })
  }

  /// Replace the picture store for `owner`.
  #[cfg(test)]
  pub fn with_store(mut self, owner: PictureOwner, store: Arc<dyn ObjectStore>) -> Self {
    match owner {
      PictureOwner::Student => self.students_store = Ok(store),
      PictureOwner::Parent => self.parents_store = Ok(store),
    }
    self
  }

  pub fn store(&self, owner: PictureOwner) -> std::result::Result<Arc<dyn ObjectStore>, ProxyError> {
    let slot = match owner {
      PictureOwner::Student => &self.students_store,
      PictureOwner::Parent => &self.parents_store,
    };
    slot.clone().map_err(ProxyError::Config)
  }
}

fn open_store(config: &Config, owner: PictureOwner) -> StoreSlot {
  let (bucket, env_prefix) = match owner {
    PictureOwner::Student => (&config.storage.students, "B2_"),
    PictureOwner::Parent => (&config.storage.parents, "PARENTS_B2_"),
  };

  match B2Store::new(&config.storage.auth_url, bucket.clone()) {
    Ok(store) => Ok(Arc::new(store)),
    Err(e) => {
      let reason = format!(
        "{} picture storage unavailable (check {}* settings): {}",
        owner.collection(),
        env_prefix,
        e
      );
      warn!("{}", reason);
      Err(reason)
    }
  }
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .nest("/api", routes::api())
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

/// Run the proxy until Ctrl-C.
pub async fn serve(config: Config) -> Result<()> {
  let bind = config.server.bind.clone();
  let state = AppState::new(config)?;

  let listener = tokio::net::TcpListener::bind(&bind)
    .await
    .map_err(|e| eyre!("Failed to bind {}: {}", bind, e))?;
  info!("listening on http://{}", bind);

  axum::serve(listener, router(state))
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| eyre!("Server error: {}", e))?;

  info!("server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!("failed to listen for Ctrl-C: {}", e);
    std::future::pending::<()>().await;
  }
}
