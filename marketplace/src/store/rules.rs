// marketplace/src/store/rules.rs

//! Cross-record rules for delivery assignments, applied to owned copies so
//! that both stores can run them inside their own atomic section and then
//! write the results back.
//!
//! An agent's `assigned_orders` counts its assignments that are not yet
//! `Completed` or `Failed`.

use super::{StoreError, StoreResult};
use crate::models::*;
use chrono::{DateTime, Utc};

pub(crate) struct PlannedAssignment {
  pub assignment: OrderAssignment,
  pub order: Order,
  pub agent: DeliveryAgent,
}

pub(crate) struct PlannedUpdate {
  pub assignment: OrderAssignment,
  pub order: Order,
  /// Agents whose counters changed (one, or two on reassignment).
  pub agents: Vec<DeliveryAgent>,
}

fn ensure_active(agent: &DeliveryAgent) -> StoreResult<()> {
  if agent.status != AgentStatus::Active {
    return Err(StoreError::Rejected(format!(
      "Delivery agent {} is not active (status {:?})",
      agent.agent_id, agent.status
    )));
  }
  Ok(())
}

fn release(agent: &mut DeliveryAgent, now: DateTime<Utc>) {
  agent.assigned_orders = (agent.assigned_orders - 1).max(0);
  agent.updated_at = now;
}

pub(crate) fn plan_new_assignment(
  mut order: Order,
  mut agent: DeliveryAgent,
  already_assigned: bool,
  new: NewAssignment,
  now: DateTime<Utc>,
) -> StoreResult<PlannedAssignment> {
  ensure_active(&agent)?;
  if order.status.is_closed() {
    return Err(StoreError::Rejected(format!(
      "Order {} is {:?} and cannot be assigned",
      order.order_id, order.status
    )));
  }
  if already_assigned {
    return Err(StoreError::Conflict(format!("Order {} already has a delivery assignment", order.order_id)));
  }

  let assignment = OrderAssignment {
    order_id: order.order_id.clone(),
    delivery_agent_id: agent.agent_id.clone(),
    assigned_date: now,
    status: AssignmentStatus::Assigned,
    priority: new.priority,
    notes: new.notes,
    updated_at: now,
  };

  agent.assigned_orders += 1;
  agent.updated_at = now;

  order.status = OrderStatus::Assigned;
  order.delivery_agent_id = Some(agent.agent_id.clone());
  order.assigned_agent = Some(agent.name.clone());
  order.assigned_at = Some(now);
  order.updated_at = now;

  Ok(PlannedAssignment { assignment, order, agent })
}

/// `replacement` is the new agent when the update moves the assignment to a
/// different agent, `None` otherwise.
pub(crate) fn plan_assignment_update(
  mut assignment: OrderAssignment,
  mut order: Order,
  mut current: DeliveryAgent,
  replacement: Option<DeliveryAgent>,
  update: AssignmentUpdate,
  now: DateTime<Utc>,
) -> StoreResult<PlannedUpdate> {
  let old_status = assignment.status;
  let new_status = update.status.unwrap_or(old_status);

  let mut agents = Vec::with_capacity(2);
  match replacement {
    Some(mut next) => {
      ensure_active(&next)?;
      if !old_status.is_terminal() {
        release(&mut current, now);
      }
      if !new_status.is_terminal() {
        next.assigned_orders += 1;
      }
      if new_status == AssignmentStatus::Completed {
        next.completed_deliveries += 1;
      }
      next.updated_at = now;

      assignment.delivery_agent_id = next.agent_id.clone();
      order.delivery_agent_id = Some(next.agent_id.clone());
      order.assigned_agent = Some(next.name.clone());
      order.assigned_at = Some(now);

      agents.push(current);
      agents.push(next);
    }
    None => {
      if old_status != new_status {
        if !old_status.is_terminal() && new_status.is_terminal() {
          release(&mut current, now);
        } else if old_status.is_terminal() && !new_status.is_terminal() {
          current.assigned_orders += 1;
          current.updated_at = now;
        }
        if new_status == AssignmentStatus::Completed {
          current.completed_deliveries += 1;
          current.updated_at = now;
        }
      }
      agents.push(current);
    }
  }

  if update.status.is_some() {
    order.status = new_status.mirrored_order_status();
  }
  order.updated_at = now;

  assignment.status = new_status;
  if let Some(priority) = update.priority {
    assignment.priority = priority;
  }
  if let Some(notes) = update.notes {
    assignment.notes = Some(notes);
  }
  assignment.updated_at = now;

  Ok(PlannedUpdate { assignment, order, agents })
}

/// Returns the order with its agent fields cleared and the released agent,
/// if any. An open order goes back to `processing`; a closed one keeps its
/// status.
pub(crate) fn plan_assignment_removal(
  assignment: &OrderAssignment,
  mut order: Order,
  agent: Option<DeliveryAgent>,
  now: DateTime<Utc>,
) -> (Order, Option<DeliveryAgent>) {
  let agent = agent.map(|mut a| {
    if !assignment.status.is_terminal() {
      release(&mut a, now);
    }
    a
  });
  if !order.status.is_closed() {
    order.status = OrderStatus::Processing;
  }
  order.clear_assignment();
  order.updated_at = now;
  (order, agent)
}

/// Marks the order cancelled. An outstanding assignment is dropped along
/// with it, so the caller must delete the assignment and store the agent.
pub(crate) fn plan_cancellation(
  mut order: Order,
  assignment: Option<&OrderAssignment>,
  agent: Option<DeliveryAgent>,
  now: DateTime<Utc>,
) -> StoreResult<(Order, Option<DeliveryAgent>)> {
  if !order.status.is_cancellable() {
    return Err(StoreError::Rejected(format!(
      "Order {} can no longer be cancelled (status {:?})",
      order.order_id, order.status
    )));
  }
  order.status = OrderStatus::Cancelled;
  order.updated_at = now;
  Ok(match assignment {
    Some(assignment) => plan_assignment_removal(assignment, order, agent, now),
    None => (order, None),
  })
}
