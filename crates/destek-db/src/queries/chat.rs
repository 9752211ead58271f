use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use destek_types::models::{ChatMessage, ChatRoom};

use super::OptionalExt;
use crate::Database;
use crate::models::{self, CHAT_MESSAGE_COLUMNS, CHAT_ROOM_COLUMNS};

impl Database {
    pub fn get_chat_room(&self, id: Uuid) -> Result<Option<ChatRoom>> {
        self.with_conn(|conn| query_chat_room(conn, id))
    }

    /// Rooms the user takes part in, most recently active first.
    /// `None` lists every room.
    pub fn list_chat_rooms(&self, participant: Option<Uuid>) -> Result<Vec<ChatRoom>> {
        self.with_conn(|conn| {
            let rows = match participant {
                Some(user_id) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {CHAT_ROOM_COLUMNS} FROM chat_rooms
                         WHERE buyer_id = ?1 OR seller_id = ?1
                         ORDER BY updated_at DESC"
                    ))?;
                    stmt.query_map([user_id.to_string()], models::chat_room)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {CHAT_ROOM_COLUMNS} FROM chat_rooms ORDER BY updated_at DESC"
                    ))?;
                    stmt.query_map([], models::chat_room)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    /// Insert a chat message and touch the room in one transaction.
    /// Returns `None` if the room does not exist.
    pub fn insert_chat_message(
        &self,
        chat_room_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<Option<ChatMessage>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let (now, now_text) = models::now();
            let touched = tx.execute(
                "UPDATE chat_rooms SET updated_at = ?2 WHERE id = ?1",
                params![chat_room_id.to_string(), now_text],
            )?;
            if touched == 0 {
                return Ok(None);
            }

            let message = ChatMessage {
                id: Uuid::new_v4(),
                chat_room_id,
                sender_id,
                content: content.to_string(),
                is_read: false,
                created_at: now,
            };
            tx.execute(
                &format!("INSERT INTO chat_messages ({CHAT_MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, 0, ?5)"),
                params![
                    message.id.to_string(),
                    chat_room_id.to_string(),
                    sender_id.to_string(),
                    message.content,
                    now_text,
                ],
            )?;

            tx.commit()?;
            Ok(Some(message))
        })
    }

    /// Newest `limit` messages older than `before`, returned oldest first.
    pub fn list_chat_messages(
        &self,
        chat_room_id: Uuid,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<ChatMessage>> {
        let before = before.map(models::format_timestamp);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CHAT_MESSAGE_COLUMNS} FROM chat_messages
                 WHERE chat_room_id = ?1 AND (?2 IS NULL OR created_at < ?2)
                 ORDER BY created_at DESC
                 LIMIT ?3"
            ))?;
            let mut rows = stmt
                .query_map(params![chat_room_id.to_string(), before, limit], models::chat_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Mark everything the other participant sent as read.
    pub fn mark_chat_read(&self, chat_room_id: Uuid, reader_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE chat_messages SET is_read = 1
                 WHERE chat_room_id = ?1 AND sender_id != ?2 AND is_read = 0",
                params![chat_room_id.to_string(), reader_id.to_string()],
            )?;
            Ok(n)
        })
    }
}

fn query_chat_room(conn: &Connection, id: Uuid) -> Result<Option<ChatRoom>> {
    conn.query_row(
        &format!("SELECT {CHAT_ROOM_COLUMNS} FROM chat_rooms WHERE id = ?1"),
        [id.to_string()],
        models::chat_room,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlaceOrder;
    use crate::queries::testutil;
    use destek_types::api::CreateProductRequest;
    use destek_types::models::{Role, User};

    fn room(db: &Database) -> (ChatRoom, User, User) {
        let seller = testutil::user(db, Role::Seller);
        let buyer = testutil::user(db, Role::Customer);
        let p = db
            .insert_product(
                Uuid::new_v4(),
                seller.id,
                &CreateProductRequest {
                    name: "Fide".into(),
                    description: String::new(),
                    price: 3.0,
                    stock: 9,
                    category: "garden".into(),
                },
            )
            .unwrap();
        let PlaceOrder::Placed { chat_room, .. } = db.place_order(buyer.id, p.id, 1).unwrap() else {
            panic!("order should be placed");
        };
        (chat_room, buyer, seller)
    }

    #[test]
    fn message_touches_room() {
        let db = testutil::db();
        let (room, buyer, _) = room(&db);

        let msg = db.insert_chat_message(room.id, buyer.id, "Ne zaman kargoda?").unwrap().unwrap();
        let stored = db.get_chat_room(room.id).unwrap().unwrap();
        assert_eq!(stored.updated_at, msg.created_at);

        assert!(db.insert_chat_message(Uuid::new_v4(), buyer.id, "x").unwrap().is_none());
    }

    #[test]
    fn paging_with_before_cursor() {
        let db = testutil::db();
        let (room, buyer, seller) = room(&db);
        for i in 0..5 {
            let sender = if i % 2 == 0 { buyer.id } else { seller.id };
            db.insert_chat_message(room.id, sender, &format!("m{i}")).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let latest = db.list_chat_messages(room.id, 2, None).unwrap();
        assert_eq!(latest.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), vec!["m3", "m4"]);

        let older = db.list_chat_messages(room.id, 10, Some(latest[0].created_at)).unwrap();
        assert_eq!(older.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(), vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn rooms_listed_per_participant() {
        let db = testutil::db();
        let (room, buyer, seller) = room(&db);
        let outsider = testutil::user(&db, Role::Customer);

        assert_eq!(db.list_chat_rooms(Some(buyer.id)).unwrap()[0].id, room.id);
        assert_eq!(db.list_chat_rooms(Some(seller.id)).unwrap().len(), 1);
        assert!(db.list_chat_rooms(Some(outsider.id)).unwrap().is_empty());
        assert_eq!(db.list_chat_rooms(None).unwrap().len(), 1);
    }

    #[test]
    fn read_marks_counterpart_messages() {
        let db = testutil::db();
        let (room, buyer, seller) = room(&db);
        db.insert_chat_message(room.id, buyer.id, "a").unwrap();
        db.insert_chat_message(room.id, buyer.id, "b").unwrap();
        db.insert_chat_message(room.id, seller.id, "c").unwrap();

        assert_eq!(db.mark_chat_read(room.id, seller.id).unwrap(), 2);
        assert_eq!(db.mark_chat_read(room.id, buyer.id).unwrap(), 1);
    }
}
