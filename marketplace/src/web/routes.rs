// marketplace/src/web/routes.rs

use crate::errors::AppError;
use crate::web::handlers::{
  agent_handlers, assignment_handlers, auth_handlers, cart_handlers, order_handlers, payment_handlers,
  product_handlers, user_handlers, utility_handlers,
};
use actix_web::{web, HttpResponse};

async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Malformed bodies, queries and path segments answer in the same envelope
/// as every other error.
fn extractor_configs(cfg: &mut web::ServiceConfig) {
  cfg
    .app_data(
      web::JsonConfig::default().error_handler(|err, _req| AppError::Validation(format!("Invalid request body: {}", err)).into()),
    )
    .app_data(
      web::QueryConfig::default()
        .error_handler(|err, _req| AppError::Validation(format!("Invalid query string: {}", err)).into()),
    )
    .app_data(
      web::PathConfig::default().error_handler(|err, _req| AppError::NotFound(format!("Invalid path: {}", err)).into()),
    );
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  extractor_configs(cfg);
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/users")
          .route("", web::get().to(user_handlers::list_users_handler))
          .route("/register", web::post().to(auth_handlers::register_handler))
          .route("/login", web::post().to(auth_handlers::login_handler))
          .route("/me", web::get().to(auth_handlers::get_profile_handler))
          .route("/me", web::put().to(auth_handlers::update_profile_handler))
          .route(
            "/farmer/subscription",
            web::post().to(auth_handlers::pay_farmer_subscription_handler),
          )
          .route("/farmers/pending", web::get().to(user_handlers::pending_farmers_handler))
          .route("/{id}/approve", web::put().to(user_handlers::approve_farmer_handler))
          .route("/{id}/decline", web::put().to(user_handlers::decline_farmer_handler))
          .route("/{id}/block", web::put().to(user_handlers::block_user_handler))
          .route("/{id}/unblock", web::put().to(user_handlers::unblock_user_handler)),
      )
      .service(
        web::scope("/products")
          .route("", web::get().to(product_handlers::list_products_handler))
          .route("", web::post().to(product_handlers::create_product_handler))
          .route("/{id}", web::get().to(product_handlers::get_product_handler))
          .route("/{id}", web::put().to(product_handlers::update_product_handler))
          .route("/{id}", web::delete().to(product_handlers::delete_product_handler))
          .route("/{id}/reduce-stock", web::post().to(product_handlers::reduce_stock_handler)),
      )
      .service(
        web::scope("/cart")
          .route("", web::get().to(cart_handlers::get_cart_handler))
          .route("", web::post().to(cart_handlers::add_to_cart_handler))
          .route("", web::delete().to(cart_handlers::clear_cart_handler))
          .route("/items/{product_id}", web::put().to(cart_handlers::update_cart_item_handler))
          .route("/items/{product_id}", web::delete().to(cart_handlers::remove_cart_item_handler)),
      )
      .service(
        web::scope("/orders")
          .route("", web::get().to(order_handlers::list_orders_handler))
          .route("", web::post().to(order_handlers::create_order_handler))
          .route("/from-cart", web::post().to(order_handlers::order_from_cart_handler))
          .route("/farmer", web::get().to(order_handlers::farmer_orders_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler))
          .route("/{order_id}", web::put().to(order_handlers::update_order_handler))
          .route("/{order_id}/cancel", web::put().to(order_handlers::cancel_order_handler))
          .route(
            "/{order_id}/items/{product_id}/status",
            web::put().to(order_handlers::update_item_status_handler),
          )
          .route("/{order_id}/assign", web::put().to(order_handlers::assign_order_handler))
          .route("/{order_id}/delivery-status", web::put().to(order_handlers::delivery_status_handler))
          .route("/{order_id}/unassign", web::put().to(order_handlers::unassign_order_handler)),
      )
      .service(
        web::scope("/order-assignments")
          .route("", web::get().to(assignment_handlers::list_assignments_handler))
          .route("", web::post().to(assignment_handlers::create_assignment_handler))
          .route("/{order_id}", web::get().to(assignment_handlers::get_assignment_handler))
          .route("/{order_id}", web::put().to(assignment_handlers::update_assignment_handler))
          .route("/{order_id}", web::delete().to(assignment_handlers::delete_assignment_handler)),
      )
      .service(
        web::scope("/delivery-agents")
          .route("", web::get().to(agent_handlers::list_agents_handler))
          .route("", web::post().to(agent_handlers::create_agent_handler))
          .route("/{agent_id}", web::get().to(agent_handlers::get_agent_handler))
          .route("/{agent_id}", web::put().to(agent_handlers::update_agent_handler))
          .route("/{agent_id}", web::delete().to(agent_handlers::delete_agent_handler))
          .route("/{agent_id}/assignments", web::get().to(agent_handlers::agent_assignments_handler)),
      )
      .service(
        web::scope("/payments")
          .route("/checkout", web::post().to(payment_handlers::start_cart_checkout_handler))
          .route("/subscriptions", web::get().to(payment_handlers::list_subscriptions_handler))
          .route("/subscriptions", web::post().to(payment_handlers::start_subscription_handler))
          .route(
            "/subscriptions/{id}/cancel",
            web::post().to(payment_handlers::cancel_subscription_handler),
          )
          .route("/subscriptions/{id}/logs", web::get().to(payment_handlers::subscription_logs_handler))
          .route("/cart-orders", web::get().to(payment_handlers::list_cart_orders_handler))
          .route("/notify", web::post().to(payment_handlers::payment_notify_handler)),
      )
      .service(
        web::scope("/utility")
          .route(
            "/expired-products",
            web::delete().to(utility_handlers::delete_expired_products_handler),
          )
          .route("/expiring-products", web::get().to(utility_handlers::expiring_products_handler))
          .route("/expiring-soon", web::get().to(utility_handlers::expiring_soon_handler))
          .route("/health", web::get().to(utility_handlers::inventory_health_handler)),
      ),
  );
}
