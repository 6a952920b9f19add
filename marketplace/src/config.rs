// marketplace/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayHereMode {
  Sandbox,
  Live,
}

impl PayHereMode {
  pub fn checkout_url(self) -> &'static str {
    match self {
      PayHereMode::Sandbox => "https://sandbox.payhere.lk/pay/checkout",
      PayHereMode::Live => "https://www.payhere.lk/pay/checkout",
    }
  }
}

#[derive(Clone)]
pub struct PayHereConfig {
  pub merchant_id: String,
  pub merchant_secret: String,
  pub mode: PayHereMode,
  pub currency: String,
  pub return_url: String,
  pub cancel_url: String,
  pub notify_url: String,
  pub max_renewal_attempts: i32,
}

impl std::fmt::Debug for PayHereConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PayHereConfig")
      .field("merchant_id", &self.merchant_id)
      .field("merchant_secret", &"[REDACTED]")
      .field("mode", &self.mode)
      .field("currency", &self.currency)
      .field("notify_url", &self.notify_url)
      .finish()
  }
}

#[derive(Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  /// Unset means the in-memory store.
  pub database_url: Option<String>,
  pub run_migrations: bool,
  pub app_base_url: String,

  pub jwt_secret: String,
  pub token_ttl_hours: i64,
  pub allow_admin_signup: bool,

  pub payhere: PayHereConfig,
}

impl std::fmt::Debug for AppConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AppConfig")
      .field("server_host", &self.server_host)
      .field("server_port", &self.server_port)
      .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
      .field("run_migrations", &self.run_migrations)
      .field("app_base_url", &self.app_base_url)
      .field("token_ttl_hours", &self.token_ttl_hours)
      .field("allow_admin_signup", &self.allow_admin_signup)
      .field("payhere", &self.payhere)
      .finish()
  }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
  T: std::str::FromStr,
  T::Err: std::fmt::Display,
{
  env::var(name)
    .unwrap_or_else(|_| default.to_string())
    .trim()
    .parse::<T>()
    .map_err(|e| AppError::Config(format!("Invalid {} value: {}", name, e)))
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port: u16 = parse_var("SERVER_PORT", "8080")?;
    let database_url = get_env("DATABASE_URL").ok().filter(|url| !url.trim().is_empty());
    let run_migrations: bool = parse_var("RUN_MIGRATIONS", "true")?;
    let app_base_url = get_env("APP_BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", server_host, server_port));
    let app_base_url = app_base_url.trim_end_matches('/').to_string();

    let jwt_secret = get_env("JWT_SECRET")?;
    let token_ttl_hours: i64 = parse_var("TOKEN_TTL_HOURS", "24")?;
    if token_ttl_hours <= 0 {
      return Err(AppError::Config("TOKEN_TTL_HOURS must be positive".to_string()));
    }
    let allow_admin_signup: bool = parse_var("ALLOW_ADMIN_SIGNUP", "false")?;

    let mode = match get_env("PAYHERE_MODE").unwrap_or_else(|_| "sandbox".to_string()).to_lowercase().as_str() {
      "sandbox" => PayHereMode::Sandbox,
      "live" => PayHereMode::Live,
      other => return Err(AppError::Config(format!("Invalid PAYHERE_MODE value: {}", other))),
    };
    let max_renewal_attempts: i32 = parse_var("MAX_RENEWAL_ATTEMPTS", "3")?;
    if max_renewal_attempts < 1 {
      return Err(AppError::Config("MAX_RENEWAL_ATTEMPTS must be at least 1".to_string()));
    }

    let payhere = PayHereConfig {
      merchant_id: get_env("PAYHERE_MERCHANT_ID")?,
      merchant_secret: get_env("PAYHERE_MERCHANT_SECRET")?,
      mode,
      currency: get_env("PAYHERE_CURRENCY").unwrap_or_else(|_| "LKR".to_string()),
      return_url: get_env("PAYHERE_RETURN_URL").unwrap_or_else(|_| format!("{}/payment/success", app_base_url)),
      cancel_url: get_env("PAYHERE_CANCEL_URL").unwrap_or_else(|_| format!("{}/payment/cancel", app_base_url)),
      notify_url: get_env("PAYHERE_NOTIFY_URL")
        .unwrap_or_else(|_| format!("{}/api/v1/payments/notify", app_base_url)),
      max_renewal_attempts,
    };

    tracing::info!("Application configuration loaded successfully.");

    Ok(Self {
      server_host,
      server_port,
      database_url,
      run_migrations,
      app_base_url,
      jwt_secret,
      token_ttl_hours,
      allow_admin_signup,
      payhere,
    })
  }
}
