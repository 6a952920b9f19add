// marketplace/src/lib.rs

//! Farm-produce marketplace backend: accounts, listings, carts, orders,
//! delivery assignments and hosted payments over a JSON API.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod store;
pub mod web;

use crate::config::AppConfig;
use crate::errors::Result as AppResult;
use crate::state::AppState;
use crate::store::{MarketStore, MemoryStore, PgStore};
use std::sync::Arc;

/// Picks the store from configuration: Postgres when `DATABASE_URL` is set,
/// otherwise an in-memory store.
pub async fn build_store(config: &AppConfig) -> AppResult<Arc<dyn MarketStore>> {
  match config.database_url.as_deref() {
    Some(url) => {
      let store = PgStore::connect(url).await?;
      tracing::info!("Connected to Postgres.");
      if config.run_migrations {
        store.migrate().await?;
        tracing::info!("Database migrations applied.");
      }
      Ok(Arc::new(store))
    }
    None => {
      tracing::warn!("DATABASE_URL is not set; using the in-memory store. Data will not survive a restart.");
      Ok(Arc::new(MemoryStore::new()))
    }
  }
}

pub async fn build_state(config: AppConfig) -> AppResult<AppState> {
  let store = build_store(&config).await?;
  Ok(AppState::new(store, config))
}
