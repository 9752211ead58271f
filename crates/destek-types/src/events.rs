use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ChatMessage, Notification, Order, Role, Ticket, TicketMessage};

/// Events pushed to clients over the `/ws` gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, role: Role },

    TicketCreated { ticket: Ticket },

    TicketUpdated { ticket: Ticket },

    TicketMessageCreated { message: TicketMessage },

    OrderCreated { order: Order },

    OrderUpdated { order: Order },

    ChatMessageCreated { message: ChatMessage },

    NotificationCreated { notification: Notification },

    /// Stock level changed after an order was placed or cancelled, or a
    /// seller edited the product.
    ProductStockChanged { product_id: Uuid, stock: i64 },

    /// The other participant is typing in a chat room
    TypingStart { chat_room_id: Uuid, user_id: Uuid },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Indicate typing in an order chat room
    StartTyping { chat_room_id: Uuid },
}
