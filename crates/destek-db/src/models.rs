//! Row mapping between SQLite rows and the shared `destek-types` models.
//!
//! Ids are stored as TEXT uuids, timestamps as RFC 3339 TEXT with fixed
//! microsecond precision so that lexical order matches time order.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use destek_types::models::{
    ChatMessage, ChatRoom, Notification, Order, Product, Role, Ticket, TicketMessage, User,
};

/// User row including the password hash, which never leaves the DB layer
/// except for login verification.
pub struct UserRow {
    pub user: User,
    pub password_hash: String,
}

pub(crate) const USER_COLUMNS: &str = "id, email, name, role, created_at, password";
pub(crate) const TICKET_COLUMNS: &str = "id, reference, subject, body, status, priority, category, user_id, assigned_to, created_at, updated_at";
pub(crate) const TICKET_MESSAGE_COLUMNS: &str = "id, ticket_id, sender_id, content, is_admin, is_read, created_at";
pub(crate) const PRODUCT_COLUMNS: &str = "id, seller_id, name, description, price, stock, rating, rating_count, category, created_at, updated_at";
pub(crate) const ORDER_COLUMNS: &str = "id, buyer_id, seller_id, product_id, quantity, unit_price, total_price, status, created_at, updated_at";
pub(crate) const CHAT_ROOM_COLUMNS: &str = "id, order_id, buyer_id, seller_id, created_at, updated_at";
pub(crate) const CHAT_MESSAGE_COLUMNS: &str = "id, chat_room_id, sender_id, content, is_read, created_at";
pub(crate) const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, read, created_at";

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at the stored precision, so returned models compare equal
/// to what a later read yields.
pub(crate) fn now() -> (DateTime<Utc>, String) {
    let ts = Utc::now().trunc_subsecs(6);
    (ts, format_timestamp(ts))
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn get_uuid(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn get_opt_uuid(row: &Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn get_time(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    raw.parse::<DateTime<Utc>>().map_err(|e| conversion_error(idx, e))
}

fn get_enum<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

pub(crate) fn user_row(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        user: User {
            id: get_uuid(row, 0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            role: get_enum::<Role>(row, 3)?,
            created_at: get_time(row, 4)?,
        },
        password_hash: row.get(5)?,
    })
}

pub(crate) fn ticket(row: &Row) -> rusqlite::Result<Ticket> {
    Ok(Ticket {
        id: get_uuid(row, 0)?,
        reference: row.get(1)?,
        subject: row.get(2)?,
        body: row.get(3)?,
        status: get_enum(row, 4)?,
        priority: get_enum(row, 5)?,
        category: row.get(6)?,
        user_id: get_uuid(row, 7)?,
        assigned_to: get_opt_uuid(row, 8)?,
        created_at: get_time(row, 9)?,
        updated_at: get_time(row, 10)?,
    })
}

pub(crate) fn ticket_message(row: &Row) -> rusqlite::Result<TicketMessage> {
    Ok(TicketMessage {
        id: get_uuid(row, 0)?,
        ticket_id: get_uuid(row, 1)?,
        sender_id: get_uuid(row, 2)?,
        content: row.get(3)?,
        is_admin: row.get(4)?,
        is_read: row.get(5)?,
        created_at: get_time(row, 6)?,
    })
}

pub(crate) fn product(row: &Row) -> rusqlite::Result<Product> {
    Ok(Product {
        id: get_uuid(row, 0)?,
        seller_id: get_uuid(row, 1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        price: row.get(4)?,
        stock: row.get(5)?,
        rating: row.get(6)?,
        rating_count: row.get(7)?,
        category: row.get(8)?,
        created_at: get_time(row, 9)?,
        updated_at: get_time(row, 10)?,
    })
}

pub(crate) fn order(row: &Row) -> rusqlite::Result<Order> {
    Ok(Order {
        id: get_uuid(row, 0)?,
        buyer_id: get_uuid(row, 1)?,
        seller_id: get_uuid(row, 2)?,
        product_id: get_uuid(row, 3)?,
        quantity: row.get(4)?,
        unit_price: row.get(5)?,
        total_price: row.get(6)?,
        status: get_enum(row, 7)?,
        created_at: get_time(row, 8)?,
        updated_at: get_time(row, 9)?,
    })
}

pub(crate) fn chat_room(row: &Row) -> rusqlite::Result<ChatRoom> {
    Ok(ChatRoom {
        id: get_uuid(row, 0)?,
        order_id: get_uuid(row, 1)?,
        buyer_id: get_uuid(row, 2)?,
        seller_id: get_uuid(row, 3)?,
        created_at: get_time(row, 4)?,
        updated_at: get_time(row, 5)?,
    })
}

pub(crate) fn chat_message(row: &Row) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: get_uuid(row, 0)?,
        chat_room_id: get_uuid(row, 1)?,
        sender_id: get_uuid(row, 2)?,
        content: row.get(3)?,
        is_read: row.get(4)?,
        created_at: get_time(row, 5)?,
    })
}

pub(crate) fn notification(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: get_uuid(row, 0)?,
        user_id: get_uuid(row, 1)?,
        kind: get_enum(row, 2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        read: row.get(5)?,
        created_at: get_time(row, 6)?,
    })
}
