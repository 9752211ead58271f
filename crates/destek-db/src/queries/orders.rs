use anyhow::Result;
use rusqlite::{Connection, params};
use uuid::Uuid;

use destek_types::models::{ChatRoom, Order, OrderStatus};

use super::OptionalExt;
use super::products::query_product;
use crate::Database;
use crate::models::{self, CHAT_ROOM_COLUMNS, ORDER_COLUMNS};

/// Outcome of placing an order.
#[derive(Debug)]
pub enum PlaceOrder {
    Placed {
        order: Order,
        chat_room: ChatRoom,
        /// Stock left on the product after the decrement
        remaining_stock: i64,
    },
    ProductNotFound,
    OwnProduct,
    InsufficientStock { available: i64 },
}

/// Outcome of a status change.
#[derive(Debug)]
pub enum StatusChange {
    Updated {
        order: Order,
        /// Set when the change put stock back on the shelf
        restocked: Option<i64>,
    },
    NotFound,
    /// The actor may not make this change from the order's current status
    Forbidden,
    Invalid { from: OrderStatus },
}

/// Who is asking for a status change.
#[derive(Debug, Clone, Copy)]
pub enum OrderActor {
    Admin,
    User(Uuid),
}

impl OrderActor {
    /// Admins and the seller drive the lifecycle; the buyer may only cancel
    /// an order that is still pending.
    fn may_move(&self, order: &Order, next: OrderStatus) -> bool {
        match *self {
            OrderActor::Admin => true,
            OrderActor::User(id) if id == order.seller_id => true,
            OrderActor::User(id) if id == order.buyer_id => {
                next == OrderStatus::Cancelled && order.status == OrderStatus::Pending
            }
            OrderActor::User(_) => false,
        }
    }
}

pub enum OrderScope {
    All,
    /// Orders where the user is the buyer or the seller
    Party(Uuid),
}

impl Database {
    /// Check stock, decrement it, insert the order and open its chat room,
    /// all in one transaction.
    pub fn place_order(&self, buyer_id: Uuid, product_id: Uuid, quantity: i64) -> Result<PlaceOrder> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(product) = query_product(&tx, product_id)? else {
                return Ok(PlaceOrder::ProductNotFound);
            };
            if product.seller_id == buyer_id {
                return Ok(PlaceOrder::OwnProduct);
            }
            if product.stock < quantity {
                return Ok(PlaceOrder::InsufficientStock { available: product.stock });
            }

            let (now, now_text) = models::now();
            let remaining_stock = product.stock - quantity;
            tx.execute(
                "UPDATE products SET stock = ?2, updated_at = ?3 WHERE id = ?1",
                params![product_id.to_string(), remaining_stock, now_text],
            )?;

            let order = Order {
                id: Uuid::new_v4(),
                buyer_id,
                seller_id: product.seller_id,
                product_id,
                quantity,
                unit_price: product.price,
                total_price: product.price * quantity as f64,
                status: OrderStatus::Pending,
                created_at: now,
                updated_at: now,
            };
            tx.execute(
                &format!("INSERT INTO orders ({ORDER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)"),
                params![
                    order.id.to_string(),
                    buyer_id.to_string(),
                    order.seller_id.to_string(),
                    product_id.to_string(),
                    quantity,
                    order.unit_price,
                    order.total_price,
                    order.status.as_str(),
                    now_text,
                ],
            )?;

            let chat_room = ChatRoom {
                id: Uuid::new_v4(),
                order_id: order.id,
                buyer_id,
                seller_id: order.seller_id,
                created_at: now,
                updated_at: now,
            };
            tx.execute(
                &format!("INSERT INTO chat_rooms ({CHAT_ROOM_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?5)"),
                params![
                    chat_room.id.to_string(),
                    order.id.to_string(),
                    buyer_id.to_string(),
                    order.seller_id.to_string(),
                    now_text,
                ],
            )?;

            tx.commit()?;
            Ok(PlaceOrder::Placed { order, chat_room, remaining_stock })
        })
    }

    pub fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        self.with_conn(|conn| query_order(conn, id))
    }

    pub fn list_orders(&self, scope: OrderScope) -> Result<Vec<Order>> {
        self.with_conn(|conn| {
            let rows = match scope {
                OrderScope::All => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC"
                    ))?;
                    stmt.query_map([], models::order)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                OrderScope::Party(user_id) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {ORDER_COLUMNS} FROM orders
                         WHERE buyer_id = ?1 OR seller_id = ?1
                         ORDER BY created_at DESC"
                    ))?;
                    stmt.query_map([user_id.to_string()], models::order)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    /// Move an order along its lifecycle. The actor check runs against the
    /// locked row, and cancelling returns the quantity to the product's stock
    /// in the same transaction.
    pub fn update_order_status(&self, id: Uuid, actor: OrderActor, next: OrderStatus) -> Result<StatusChange> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(mut order) = query_order(&tx, id)? else {
                return Ok(StatusChange::NotFound);
            };
            if !actor.may_move(&order, next) {
                return Ok(StatusChange::Forbidden);
            }
            if !order.status.can_transition_to(next) {
                return Ok(StatusChange::Invalid { from: order.status });
            }

            let (now, now_text) = models::now();
            order.status = next;
            order.updated_at = now;

            tx.execute(
                "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id.to_string(), next.as_str(), now_text],
            )?;

            let restocked = if next == OrderStatus::Cancelled {
                let product_id = order.product_id.to_string();
                tx.execute(
                    "UPDATE products SET stock = stock + ?2, updated_at = ?3 WHERE id = ?1",
                    params![product_id, order.quantity, now_text],
                )?;
                let stock: i64 = tx.query_row(
                    "SELECT stock FROM products WHERE id = ?1",
                    [&product_id],
                    |row| row.get(0),
                )?;
                Some(stock)
            } else {
                None
            };

            tx.commit()?;
            Ok(StatusChange::Updated { order, restocked })
        })
    }
}

fn query_order(conn: &Connection, id: Uuid) -> Result<Option<Order>> {
    conn.query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
        [id.to_string()],
        models::order,
    )
    .optional()
}
