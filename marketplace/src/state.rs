// marketplace/src/state.rs

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::pipelines;
use crate::services::{Md5SignatureVerifier, NotificationVerifier, PayHereSigner, TokenService};
use crate::store::MarketStore;
use farmgate_flow::Registry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn MarketStore>,
  pub flows: Arc<Registry<AppError>>,
  pub config: Arc<AppConfig>,
  pub tokens: TokenService,
  pub signer: PayHereSigner,
  pub verifier: Arc<dyn NotificationVerifier>,
}

impl AppState {
  /// Wires services from `config` and registers every pipeline.
  pub fn new(store: Arc<dyn MarketStore>, config: AppConfig) -> Self {
    let signer = PayHereSigner::new(&config.payhere);
    let state = Self {
      store,
      flows: Arc::new(Registry::new()),
      tokens: TokenService::new(&config.jwt_secret, config.token_ttl_hours),
      verifier: Arc::new(Md5SignatureVerifier::new(signer.clone())),
      signer,
      config: Arc::new(config),
    };
    pipelines::register_all_pipelines(&state.flows, &state);
    state
  }

  pub fn with_verifier(mut self, verifier: Arc<dyn NotificationVerifier>) -> Self {
    self.verifier = verifier;
    self
  }
}
