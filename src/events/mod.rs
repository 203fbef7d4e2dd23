use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Sender half of the application event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing if the channel is
    /// closed. Events are advisory; dropping one must never fail the
    /// operation that produced it.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!("Dropping event {:?}: {}", event, e);
        }
    }
}

// The events emitted by the storefront services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeactivated(Uuid),

    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, item_id: Uuid },
    CartItemUpdated { cart_id: Uuid, item_id: Uuid },
    CartItemRemoved { cart_id: Uuid, item_id: Uuid },
    CartCleared(Uuid),
    CartConverted { cart_id: Uuid, user_id: i64 },
    CartsMerged { source_cart_id: Uuid, target_cart_id: Uuid },

    // Order events
    OrderCreated(Uuid),
    OrderStatusUpdated {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PaymentRecorded { order_id: Uuid, amount: String },
}

/// Drains the event channel, logging each event. Side effects such as
/// notification email live behind this loop when they arrive.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(%order_id, "Order created");
            }
            Event::OrderStatusUpdated {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "Order status updated");
            }
            Event::PaymentRecorded { order_id, amount } => {
                info!(%order_id, %amount, "Payment recorded");
            }
            Event::CartsMerged {
                source_cart_id,
                target_cart_id,
            } => {
                info!(%source_cart_id, %target_cart_id, "Carts merged");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender
            .send(Event::CartCreated(Uuid::new_v4()))
            .await
            .expect("send should succeed");
        assert!(matches!(rx.recv().await, Some(Event::CartCreated(_))));
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        // Must not panic or return an error to the caller.
        sender.send_or_log(Event::CartCleared(Uuid::new_v4())).await;
    }
}
