// marketplace/src/main.rs

use actix_web::{web as actix_data, App, HttpServer};
use farmgate::config::AppConfig;
use farmgate::web::configure_app_routes;
use std::io;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> io::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting farmgate marketplace server...");

  let app_config = AppConfig::from_env().map_err(|e| {
    tracing::error!(error = %e, "Failed to load application configuration.");
    io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
  })?;
  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);

  let app_state = farmgate::build_state(app_config).await.map_err(|e| {
    tracing::error!(error = %e, "Failed to initialise application state.");
    io::Error::new(io::ErrorKind::Other, e.to_string())
  })?;
  tracing::info!("Pipelines registered; binding server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
