use anyhow::Result;
use rusqlite::params;
use uuid::Uuid;

use destek_types::models::{Notification, NotificationKind};

use crate::Database;
use crate::models::{self, NOTIFICATION_COLUMNS};

impl Database {
    pub fn insert_notification(
        &self,
        user_id: Uuid,
        kind: NotificationKind,
        title: &str,
        message: &str,
    ) -> Result<Notification> {
        let (now, now_text) = models::now();
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            kind,
            title: title.to_string(),
            message: message.to_string(),
            read: false,
            created_at: now,
        };

        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO notifications ({NOTIFICATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)"),
                params![
                    notification.id.to_string(),
                    user_id.to_string(),
                    kind.as_str(),
                    title,
                    message,
                    now_text,
                ],
            )?;
            Ok(())
        })?;

        Ok(notification)
    }

    pub fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                 WHERE user_id = ?1 AND (?2 = 0 OR read = 0)
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map(params![user_id.to_string(), unread_only], models::notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false when the notification is unknown or belongs to someone else.
    pub fn mark_notification_read(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND user_id = ?2",
                params![id.to_string(), user_id.to_string()],
            )?;
            Ok(n > 0)
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE notifications SET read = 1 WHERE user_id = ?1 AND read = 0",
                [user_id.to_string()],
            )?;
            Ok(n)
        })
    }
}
