// marketplace/src/web/handlers/order_handlers.rs

use crate::errors::{AppError, Result as AppResult};
use crate::models::{AssignmentStatus, AssignmentUpdate, Capability, DeliveryDetails, ItemStatus, Order, OrderUpdate};
use crate::pipelines::contexts::{CheckoutCtxData, OrderSource, RequestedLine};
use crate::state::AppState;
use crate::web::handlers::assignment_handlers::{self, AssignPayload};
use crate::web::handlers::{created, current_user, ok, run_to_completion};
use crate::web::AuthenticatedUser;
use actix_web::{web, HttpResponse};
use farmgate_flow::ContextData;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DirectOrderPayload {
  #[serde(flatten)]
  pub delivery: DeliveryDetails,
  #[serde(default)]
  pub items: Vec<RequestedLine>,
}

#[derive(Deserialize, Debug)]
pub struct ItemStatusPayload {
  pub status: ItemStatus,
}

#[derive(Deserialize, Debug)]
pub struct DeliveryStatusPayload {
  pub status: AssignmentStatus,
  #[serde(default)]
  pub notes: Option<String>,
}

async fn place_order(
  app_state: &AppState,
  caller: &AuthenticatedUser,
  source: OrderSource,
  delivery: DeliveryDetails,
  lines: Vec<RequestedLine>,
) -> AppResult<Order> {
  caller.require(Capability::ShopAndOrder)?;
  let user = current_user(app_state, caller).await?;
  let ctx_data = ContextData::new(CheckoutCtxData::new(app_state.clone(), &user, source, delivery, lines));
  run_to_completion(app_state, ctx_data.clone(), "checkout").await?;

  let guard = ctx_data.read();
  if !guard.cart_cleared && source == OrderSource::Cart {
    warn!("Order placed but the cart could not be cleared.");
  }
  guard
    .order
    .clone()
    .ok_or_else(|| AppError::Internal("Checkout completed without an order.".to_string()))
}

#[instrument(name = "handler::order_from_cart", skip(app_state, caller, req_payload), fields(user_id = %caller.id()))]
pub async fn order_from_cart_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  req_payload: web::Json<DeliveryDetails>,
) -> AppResult<HttpResponse> {
  let order = place_order(&app_state, &caller, OrderSource::Cart, req_payload.into_inner(), Vec::new()).await?;
  info!(order_id = %order.order_id, total_cents = order.total_cents, "Order placed from cart.");
  Ok(created("Order placed successfully", json!({ "order": order })))
}

#[instrument(name = "handler::create_order", skip(app_state, caller, req_payload), fields(user_id = %caller.id()))]
pub async fn create_order_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  req_payload: web::Json<DirectOrderPayload>,
) -> AppResult<HttpResponse> {
  let DirectOrderPayload { delivery, items } = req_payload.into_inner();
  let order = place_order(&app_state, &caller, OrderSource::Direct, delivery, items).await?;
  info!(order_id = %order.order_id, total_cents = order.total_cents, "Order placed.");
  Ok(created("Order placed successfully", json!({ "order": order })))
}

#[instrument(name = "handler::list_orders", skip(app_state, caller), fields(user_id = %caller.id()))]
pub async fn list_orders_handler(app_state: web::Data<AppState>, caller: AuthenticatedUser) -> AppResult<HttpResponse> {
  let orders = if caller.can(Capability::ViewAllOrders) {
    app_state.store.list_orders(None).await?
  } else if caller.can(Capability::ViewOwnOrders) {
    app_state.store.list_orders(Some(&caller.claims.email)).await?
  } else {
    return Err(AppError::Forbidden("Your role cannot list orders".to_string()));
  };
  Ok(ok("Orders retrieved", json!({ "count": orders.len(), "orders": orders })))
}

async fn find_order(app_state: &AppState, order_id: &str) -> AppResult<Order> {
  app_state
    .store
    .find_order(order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))
}

/// Admins see every order, customers only their own.
fn ensure_can_view(caller: &AuthenticatedUser, order: &Order) -> AppResult<()> {
  if caller.can(Capability::ViewAllOrders) || (caller.can(Capability::ViewOwnOrders) && order.user_id == caller.id()) {
    return Ok(());
  }
  Err(AppError::Forbidden("You do not have access to this order".to_string()))
}

#[instrument(name = "handler::get_order", skip(app_state, caller), fields(order_id = %path))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
) -> AppResult<HttpResponse> {
  let order = find_order(&app_state, &path.into_inner()).await?;
  ensure_can_view(&caller, &order)?;
  Ok(ok("Order retrieved", json!({ "order": order })))
}

#[instrument(name = "handler::update_order", skip(app_state, caller, req_payload), fields(order_id = %path))]
pub async fn update_order_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
  req_payload: web::Json<OrderUpdate>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageOrders)?;
  let order = app_state.store.update_order(&path.into_inner(), req_payload.into_inner()).await?;
  info!(status = ?order.status, "Order updated.");
  Ok(ok("Order updated successfully", json!({ "order": order })))
}

#[instrument(name = "handler::cancel_order", skip(app_state, caller), fields(order_id = %path))]
pub async fn cancel_order_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
) -> AppResult<HttpResponse> {
  let order = find_order(&app_state, &path.into_inner()).await?;
  ensure_can_view(&caller, &order)?;
  let order = app_state.store.cancel_order(&order.order_id).await?;
  info!("Order cancelled.");
  Ok(ok("Order cancelled successfully", json!({ "order": order })))
}

#[instrument(name = "handler::farmer_orders", skip(app_state, caller), fields(user_id = %caller.id()))]
pub async fn farmer_orders_handler(app_state: web::Data<AppState>, caller: AuthenticatedUser) -> AppResult<HttpResponse> {
  caller.require(Capability::FulfilOwnItems)?;
  let orders: Vec<Order> = app_state
    .store
    .list_orders_for_owner(caller.id())
    .await?
    .iter()
    .filter_map(|order| order.for_owner(caller.id()))
    .collect();
  Ok(ok("Orders retrieved", json!({ "count": orders.len(), "orders": orders })))
}

#[instrument(
  name = "handler::update_item_status",
  skip(app_state, caller, path, req_payload),
  fields(order_id = %path.0, product_id = %path.1)
)]
pub async fn update_item_status_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<(String, Uuid)>,
  req_payload: web::Json<ItemStatusPayload>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::FulfilOwnItems)?;
  let (order_id, product_id) = path.into_inner();

  let order = find_order(&app_state, &order_id).await?;
  let item = order
    .ordered_items
    .iter()
    .find(|i| i.product_id == product_id)
    .ok_or_else(|| AppError::NotFound(format!("Product {} is not part of order {}", product_id, order_id)))?;
  if item.owner != caller.id() {
    warn!("Farmer tried to update an item they do not own.");
    return Err(AppError::Forbidden("You can only update your own items".to_string()));
  }

  let order = app_state
    .store
    .set_order_item_status(&order_id, product_id, req_payload.status)
    .await?;
  info!(status = ?req_payload.status, "Order item status updated.");
  let order = order.for_owner(caller.id());
  Ok(ok("Item status updated", json!({ "order": order })))
}

#[instrument(name = "handler::assign_order", skip(app_state, caller, req_payload), fields(order_id = %path))]
pub async fn assign_order_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
  req_payload: web::Json<AssignPayload>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  let (assignment, order) = assignment_handlers::assign_order(&app_state, path.into_inner(), req_payload.into_inner()).await?;
  Ok(ok(
    "Order assigned successfully",
    json!({ "assignment": assignment, "order": order }),
  ))
}

#[instrument(name = "handler::delivery_status", skip(app_state, caller, req_payload), fields(order_id = %path))]
pub async fn delivery_status_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
  req_payload: web::Json<DeliveryStatusPayload>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  let DeliveryStatusPayload { status, notes } = req_payload.into_inner();
  let update = AssignmentUpdate {
    status: Some(status),
    notes,
    ..AssignmentUpdate::default()
  };
  assignment_handlers::update_assignment(&app_state, &path.into_inner(), update).await
}

#[instrument(name = "handler::unassign_order", skip(app_state, caller), fields(order_id = %path))]
pub async fn unassign_order_handler(
  app_state: web::Data<AppState>,
  caller: AuthenticatedUser,
  path: web::Path<String>,
) -> AppResult<HttpResponse> {
  caller.require(Capability::ManageDelivery)?;
  assignment_handlers::delete_assignment(&app_state, &path.into_inner()).await
}
