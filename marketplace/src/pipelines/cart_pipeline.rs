// marketplace/src/pipelines/cart_pipeline.rs

use crate::errors::AppError;
use crate::pipelines::common_steps;
use crate::pipelines::contexts::AddToCartCtxData;
use crate::state::AppState;
use farmgate_flow::{ContextData, Pipeline, PipelineControl, Registry};
use std::sync::Arc;
use tracing::{info, warn};

pub fn register_add_to_cart_pipeline(registry: &Arc<Registry<AppError>>, _app_state: &AppState) {
  let mut p = Pipeline::<AddToCartCtxData, AppError>::new(&[
    ("validate_cart_input", false, None),
    ("fetch_product_for_cart", false, None),
    ("merge_into_cart", false, None),
  ]);

  p.on_root("validate_cart_input", |ctx_data: ContextData<AddToCartCtxData>| {
    Box::pin(async move {
      let quantity = ctx_data.read().quantity;
      if quantity < 1 {
        warn!(quantity, "Add to cart with a non-positive quantity.");
        return Err(AppError::Validation("Quantity must be at least 1.".to_string()));
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("fetch_product_for_cart", |ctx_data: ContextData<AddToCartCtxData>| {
    Box::pin(async move {
      let (product_id, app_state) = {
        let guard = ctx_data.read();
        (guard.product_id, guard.app_state.clone())
      };
      let product = common_steps::load_product_for_sale(&app_state, product_id).await?;
      ctx_data.write().product = Some(product);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // The stock bound is checked inside the store's atomic section so that
  // two concurrent adds cannot overshoot it together.
  p.on_root("merge_into_cart", |ctx_data: ContextData<AddToCartCtxData>| {
    Box::pin(async move {
      let (user_id, product_id, quantity, stock, store) = {
        let guard = ctx_data.read();
        let stock = guard
          .product
          .as_ref()
          .map(|p| p.quantity_in_stock)
          .ok_or_else(|| AppError::Internal("Cart merge without a loaded product.".to_string()))?;
        (guard.user_id, guard.product_id, guard.quantity, stock, guard.app_state.store.clone())
      };
      let cart = store.add_to_cart(user_id, product_id, quantity, stock).await?;
      info!(%user_id, %product_id, quantity, lines = cart.items.len(), "Product added to cart.");
      ctx_data.write().cart = Some(cart);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  registry.register_pipeline(p);
  tracing::info!("Add-to-cart pipeline registered.");
}
