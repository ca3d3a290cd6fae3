use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::models::{OrderSnapshot, VoidReason};
use crate::services::tax_provider::TaxProvider;

/// Order lifecycle events the tax adapter reacts to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderEvent {
    Placed(OrderSnapshot),
    Cancelled(OrderSnapshot),
    Deleted(OrderSnapshot),
}

impl OrderEvent {
    pub fn order(&self) -> &OrderSnapshot {
        match self {
            OrderEvent::Placed(order) | OrderEvent::Cancelled(order) | OrderEvent::Deleted(order) => order,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "placed",
            OrderEvent::Cancelled(_) => "cancelled",
            OrderEvent::Deleted(_) => "deleted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<OrderEvent>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<OrderEvent>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: OrderEvent) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// What a hook did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Committed,
    Voided,
    Skipped,
    Failed(String),
}

/// Keeps provider transactions in step with the order lifecycle.
///
/// Failures are traced and returned as [`HookOutcome::Failed`]; the provider
/// has already written them to the transaction log.
#[derive(Clone)]
pub struct TaxLifecycleHooks {
    provider: Arc<dyn TaxProvider>,
    commit_transactions: bool,
}

impl TaxLifecycleHooks {
    pub fn new(provider: Arc<dyn TaxProvider>, commit_transactions: bool) -> Self {
        Self {
            provider,
            commit_transactions,
        }
    }

    pub async fn handle(&self, event: &OrderEvent) -> HookOutcome {
        let order = event.order();
        let outcome = match event {
            OrderEvent::Placed(_) if !self.commit_transactions => HookOutcome::Skipped,
            OrderEvent::Placed(_) => match self.provider.get_order_tax(order, true).await {
                Ok(totals) if totals.is_success() => HookOutcome::Committed,
                Ok(totals) => HookOutcome::Failed(totals.messages.join("; ")),
                Err(e) => HookOutcome::Failed(e.to_string()),
            },
            OrderEvent::Cancelled(_) => self.void(order, VoidReason::Voided).await,
            OrderEvent::Deleted(_) => self.void(order, VoidReason::Deleted).await,
        };

        match &outcome {
            HookOutcome::Failed(reason) => error!(
                event = event.name(),
                order_number = %order.order_number,
                reason = %reason,
                "Tax lifecycle hook failed"
            ),
            HookOutcome::Skipped => info!(
                event = event.name(),
                order_number = %order.order_number,
                "Transaction commit disabled, order not recorded"
            ),
            _ => info!(
                event = event.name(),
                order_number = %order.order_number,
                outcome = ?outcome,
                "Tax lifecycle hook completed"
            ),
        }
        outcome
    }

    async fn void(&self, order: &OrderSnapshot, reason: VoidReason) -> HookOutcome {
        match self.provider.void(order, reason).await {
            Ok(result) if result.is_success() => HookOutcome::Voided,
            Ok(result) => HookOutcome::Failed(result.error_summary()),
            Err(e) => HookOutcome::Failed(e.to_string()),
        }
    }
}

/// Drains the lifecycle channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<OrderEvent>, hooks: TaxLifecycleHooks) {
    info!("Starting tax lifecycle event loop");

    while let Some(event) = rx.recv().await {
        if let HookOutcome::Failed(reason) = hooks.handle(&event).await {
            warn!(
                order_number = %event.order().order_number,
                "Order event left unreconciled with the tax provider: {}",
                reason
            );
        }
    }

    info!("Tax lifecycle event loop stopped");
}
