// marketplace/src/pipelines/checkout_pipeline.rs

//! Order placement. Runs as a saga: stock is reserved line by line and the
//! reservation is handed back if a later step fails.

use crate::errors::AppError;
use crate::models::{line_total_cents, ItemStatus, NewOrder, OrderItem};
use crate::pipelines::common_steps;
use crate::pipelines::contexts::{CheckoutCtxData, OrderSource, RequestedLine};
use crate::state::AppState;
use farmgate_flow::{ContextData, Pipeline, PipelineControl, Registry, SkipCondition};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

fn is_direct_order() -> SkipCondition<CheckoutCtxData> {
  Arc::new(|ctx_data: ContextData<CheckoutCtxData>| ctx_data.read().source == OrderSource::Direct)
}

/// Builds the checkout pipeline without registering it.
pub fn checkout_pipeline() -> Pipeline<CheckoutCtxData, AppError> {
  let mut p = Pipeline::<CheckoutCtxData, AppError>::new(&[
    ("validate_delivery_details", false, None),
    ("load_cart_lines", false, Some(is_direct_order())),
    ("price_and_validate_lines", false, None),
    ("reserve_stock", false, None),
    ("persist_order", false, None),
    ("clear_cart", true, Some(is_direct_order())),
  ]);

  p.on_root("validate_delivery_details", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let delivery = &mut guard.delivery;
      delivery.name = delivery.name.trim().to_string();
      delivery.address = delivery.address.trim().to_string();
      delivery.phone = delivery.phone.trim().to_string();
      if delivery.name.is_empty() || delivery.address.is_empty() || delivery.phone.is_empty() {
        return Err(AppError::Validation(
          "Delivery name, address and phone are required.".to_string(),
        ));
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("load_cart_lines", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (user_id, store) = {
        let guard = ctx_data.read();
        (guard.user_id, guard.app_state.store.clone())
      };
      let cart = store.get_cart(user_id).await?;
      if cart.items.is_empty() {
        return Err(AppError::Validation("Your cart is empty.".to_string()));
      }
      let lines = cart
        .items
        .iter()
        .map(|l| RequestedLine {
          product_id: l.product_id,
          quantity: l.quantity,
        })
        .collect();
      ctx_data.write().lines = lines;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("price_and_validate_lines", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (lines, app_state) = {
        let guard = ctx_data.read();
        (guard.lines.clone(), guard.app_state.clone())
      };
      if lines.is_empty() {
        return Err(AppError::Validation("An order needs at least one item.".to_string()));
      }

      let mut items = Vec::with_capacity(lines.len());
      let mut total_cents = 0_i64;
      for line in lines {
        if line.quantity < 1 {
          return Err(AppError::Validation("Quantity must be at least 1.".to_string()));
        }
        let product = common_steps::load_product_for_sale(&app_state, line.product_id).await?;
        if product.quantity_in_stock < line.quantity {
          return Err(AppError::Validation(format!(
            "Insufficient stock for '{}': {} available, {} requested",
            product.product_name, product.quantity_in_stock, line.quantity
          )));
        }
        total_cents = line_total_cents(product.price_cents, line.quantity)
          .and_then(|line_total| total_cents.checked_add(line_total))
          .ok_or_else(|| AppError::Validation("Order total is too large.".to_string()))?;
        items.push(OrderItem {
          name: product.product_name,
          price_cents: product.price_cents,
          quantity: line.quantity,
          image: product.images.into_iter().next(),
          product_id: product.product_id,
          owner: product.owner,
          status: ItemStatus::Processing,
        });
      }

      {
        let mut guard = ctx_data.write();
        guard.priced_items = items;
        guard.total_cents = total_cents;
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("reserve_stock", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (items, store) = {
        let guard = ctx_data.read();
        (guard.priced_items.clone(), guard.app_state.store.clone())
      };
      for item in items {
        store.reserve_stock(item.product_id, item.quantity).await?;
        ctx_data.write().reserved.push((item.product_id, item.quantity));
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });
  p.compensate_with("reserve_stock", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move { release_reserved_stock(ctx_data).await })
  });

  p.on_root("persist_order", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (new_order, store) = {
        let guard = ctx_data.read();
        let new_order = NewOrder {
          user_id: guard.user_id,
          email: guard.email.clone(),
          delivery: guard.delivery.clone(),
          ordered_items: guard.priced_items.clone(),
          total_cents: guard.total_cents,
        };
        (new_order, guard.app_state.store.clone())
      };
      let order = store.create_order(new_order).await?;
      info!(order_id = %order.order_id, total_cents = order.total_cents, "Order placed.");
      ctx_data.write().order = Some(order);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // The order already exists at this point, so a failure here is only logged.
  p.on_root("clear_cart", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (user_id, store) = {
        let guard = ctx_data.read();
        (guard.user_id, guard.app_state.store.clone())
      };
      match store.clear_cart(user_id).await {
        Ok(()) => ctx_data.write().cart_cleared = true,
        Err(e) => warn!(%user_id, error = %e, "Order placed but the cart could not be cleared."),
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p
}

#[instrument(name = "checkout::release_reserved_stock", skip(ctx_data))]
async fn release_reserved_stock(ctx_data: ContextData<CheckoutCtxData>) -> Result<(), AppError> {
  let (reserved, store) = {
    let mut guard = ctx_data.write();
    (std::mem::take(&mut guard.reserved), guard.app_state.store.clone())
  };
  let mut first_error = None;
  for (product_id, quantity) in reserved {
    match store.restore_stock(product_id, quantity).await {
      Ok(()) => info!(%product_id, quantity, "Reserved stock released."),
      Err(e) => {
        error!(%product_id, quantity, error = %e, "Failed to release reserved stock.");
        first_error.get_or_insert(AppError::from(e));
      }
    }
  }
  first_error.map_or(Ok(()), Err)
}

pub fn register_checkout_pipeline(registry: &Arc<Registry<AppError>>, _app_state: &AppState) {
  registry.register_pipeline(checkout_pipeline());
  tracing::info!("Checkout pipeline registered.");
}
