use anyhow::Result;
use rusqlite::ErrorCode;
use uuid::Uuid;

use destek_types::models::{Role, User};

use super::OptionalExt;
use crate::Database;
use crate::models::{self, USER_COLUMNS, UserRow};

pub struct NewUser<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub name: &'a str,
    pub role: Role,
    pub password_hash: &'a str,
}

impl Database {
    /// Insert a user. Returns `None` when the email is already registered.
    pub fn create_user(&self, new: &NewUser<'_>) -> Result<Option<User>> {
        let (created_at, created_at_text) = models::now();

        self.with_conn(|conn| {
            let res = conn.execute(
                "INSERT INTO users (id, email, name, role, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    new.id.to_string(),
                    new.email,
                    new.name,
                    new.role.as_str(),
                    new.password_hash,
                    &created_at_text,
                ),
            );

            match res {
                Ok(_) => Ok(Some(User {
                    id: new.id,
                    email: new.email.to_string(),
                    name: new.name.to_string(),
                    role: new.role,
                    created_at,
                })),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                [email],
                models::user_row,
            )
            .optional()
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id.to_string()],
                models::user_row,
            )
            .optional()
        })
        .map(|row| row.map(|r| r.user))
    }

    /// Ids of every admin account, used to fan out ticket notifications.
    pub fn admin_ids(&self) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM users WHERE role = 'admin'")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows.iter().filter_map(|id| id.parse().ok()).collect())
        })
    }
}
