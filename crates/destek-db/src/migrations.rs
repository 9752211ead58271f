use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
            name        TEXT NOT NULL,
            role        TEXT NOT NULL,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tickets (
            id          TEXT PRIMARY KEY,
            reference   TEXT NOT NULL UNIQUE,
            subject     TEXT NOT NULL,
            body        TEXT NOT NULL,
            status      TEXT NOT NULL,
            priority    TEXT NOT NULL,
            category    TEXT,
            user_id     TEXT NOT NULL REFERENCES users(id),
            assigned_to TEXT REFERENCES users(id),
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tickets_user
            ON tickets(user_id, updated_at);

        CREATE TABLE IF NOT EXISTS ticket_messages (
            id          TEXT PRIMARY KEY,
            ticket_id   TEXT NOT NULL REFERENCES tickets(id) ON DELETE CASCADE,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            is_admin    INTEGER NOT NULL,
            is_read     INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ticket_messages_ticket
            ON ticket_messages(ticket_id, created_at);

        CREATE TABLE IF NOT EXISTS products (
            id           TEXT PRIMARY KEY,
            seller_id    TEXT NOT NULL REFERENCES users(id),
            name         TEXT NOT NULL,
            description  TEXT NOT NULL DEFAULT '',
            price        REAL NOT NULL CHECK (price >= 0),
            stock        INTEGER NOT NULL CHECK (stock >= 0),
            rating       REAL NOT NULL DEFAULT 0,
            rating_count INTEGER NOT NULL DEFAULT 0,
            category     TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            updated_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_products_category
            ON products(category);

        CREATE TABLE IF NOT EXISTS orders (
            id          TEXT PRIMARY KEY,
            buyer_id    TEXT NOT NULL REFERENCES users(id),
            seller_id   TEXT NOT NULL REFERENCES users(id),
            product_id  TEXT NOT NULL REFERENCES products(id),
            quantity    INTEGER NOT NULL CHECK (quantity > 0),
            unit_price  REAL NOT NULL,
            total_price REAL NOT NULL,
            status      TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_orders_buyer ON orders(buyer_id);
        CREATE INDEX IF NOT EXISTS idx_orders_seller ON orders(seller_id);

        CREATE TABLE IF NOT EXISTS chat_rooms (
            id          TEXT PRIMARY KEY,
            order_id    TEXT NOT NULL UNIQUE REFERENCES orders(id),
            buyer_id    TEXT NOT NULL REFERENCES users(id),
            seller_id   TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chat_messages (
            id            TEXT PRIMARY KEY,
            chat_room_id  TEXT NOT NULL REFERENCES chat_rooms(id) ON DELETE CASCADE,
            sender_id     TEXT NOT NULL REFERENCES users(id),
            content       TEXT NOT NULL,
            is_read       INTEGER NOT NULL DEFAULT 0,
            created_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_room
            ON chat_messages(chat_room_id, created_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            kind        TEXT NOT NULL,
            title       TEXT NOT NULL,
            message     TEXT NOT NULL,
            read        INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
