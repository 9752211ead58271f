use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use uuid::Uuid;

use destek_types::api::TicketQuery;
use destek_types::models::{Ticket, TicketMessage, TicketPriority, TicketStatus};

use super::OptionalExt;
use crate::Database;
use crate::models::{self, TICKET_COLUMNS, TICKET_MESSAGE_COLUMNS};

pub struct NewTicket<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: &'a str,
    pub body: &'a str,
    pub priority: TicketPriority,
    pub category: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct TicketPatch {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub category: Option<String>,
    /// `Some(None)` clears the assignee
    pub assigned_to: Option<Option<Uuid>>,
}

/// Outcome of posting to a ticket thread.
#[derive(Debug)]
pub enum PostTicketMessage {
    Posted {
        message: TicketMessage,
        ticket: Ticket,
        /// Status before the post, to tell whether the reply moved it
        previous_status: TicketStatus,
    },
    NotFound,
    Closed,
}

impl Database {
    pub fn insert_ticket(&self, new: &NewTicket<'_>) -> Result<Ticket> {
        let (now, now_text) = models::now();
        let ticket = Ticket {
            id: new.id,
            reference: Ticket::reference_for(new.id),
            subject: new.subject.to_string(),
            body: new.body.to_string(),
            status: TicketStatus::Open,
            priority: new.priority,
            category: new.category.map(str::to_string),
            user_id: new.user_id,
            assigned_to: None,
            created_at: now,
            updated_at: now,
        };

        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO tickets ({TICKET_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, ?9)"),
                params![
                    ticket.id.to_string(),
                    ticket.reference,
                    ticket.subject,
                    ticket.body,
                    ticket.status.as_str(),
                    ticket.priority.as_str(),
                    ticket.category,
                    ticket.user_id.to_string(),
                    now_text,
                ],
            )?;
            Ok(())
        })?;

        Ok(ticket)
    }

    pub fn get_ticket(&self, id: Uuid) -> Result<Option<Ticket>> {
        self.with_conn(|conn| query_ticket(conn, id))
    }

    /// List tickets, most recently active first. `owner` restricts the result
    /// to one user's tickets.
    pub fn list_tickets(&self, owner: Option<Uuid>, filter: &TicketQuery) -> Result<Vec<Ticket>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        let mut push = |clause: &str, value: Value| {
            values.push(value);
            clauses.push(format!("{clause} = ?{}", values.len()));
        };

        if let Some(owner) = owner {
            push("user_id", Value::Text(owner.to_string()));
        }
        if let Some(status) = filter.status {
            push("status", Value::Text(status.as_str().into()));
        }
        if let Some(priority) = filter.priority {
            push("priority", Value::Text(priority.as_str().into()));
        }
        if let Some(category) = &filter.category {
            push("category", Value::Text(category.clone()));
        }
        if let Some(assignee) = filter.assigned_to {
            push("assigned_to", Value::Text(assignee.to_string()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TICKET_COLUMNS} FROM tickets {where_sql} ORDER BY updated_at DESC"
            ))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), models::ticket)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Apply a partial update. Returns `None` if the ticket does not exist.
    pub fn update_ticket(&self, id: Uuid, patch: &TicketPatch) -> Result<Option<Ticket>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(mut ticket) = query_ticket(&tx, id)? else {
                return Ok(None);
            };

            if let Some(status) = patch.status {
                ticket.status = status;
            }
            if let Some(priority) = patch.priority {
                ticket.priority = priority;
            }
            if let Some(category) = &patch.category {
                ticket.category = Some(category.clone());
            }
            if let Some(assignee) = patch.assigned_to {
                ticket.assigned_to = assignee;
            }

            let (now, now_text) = models::now();
            ticket.updated_at = now;

            tx.execute(
                "UPDATE tickets SET status = ?2, priority = ?3, category = ?4, assigned_to = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    ticket.status.as_str(),
                    ticket.priority.as_str(),
                    ticket.category,
                    ticket.assigned_to.map(|a| a.to_string()),
                    now_text,
                ],
            )?;

            tx.commit()?;
            Ok(Some(ticket))
        })
    }

    /// Delete a ticket and, through the cascade, its messages.
    pub fn delete_ticket(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM tickets WHERE id = ?1", [id.to_string()])?;
            Ok(n > 0)
        })
    }

    /// Insert a message and touch the parent ticket in one transaction.
    /// An admin reply moves an open ticket to in-progress; a closed ticket
    /// takes no new messages.
    pub fn insert_ticket_message(
        &self,
        ticket_id: Uuid,
        sender_id: Uuid,
        content: &str,
        is_admin: bool,
    ) -> Result<PostTicketMessage> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(mut ticket) = query_ticket(&tx, ticket_id)? else {
                return Ok(PostTicketMessage::NotFound);
            };
            if ticket.status == TicketStatus::Closed {
                return Ok(PostTicketMessage::Closed);
            }
            let previous_status = ticket.status;

            let (now, now_text) = models::now();
            let message = TicketMessage {
                id: Uuid::new_v4(),
                ticket_id,
                sender_id,
                content: content.to_string(),
                is_admin,
                is_read: false,
                created_at: now,
            };

            tx.execute(
                &format!("INSERT INTO ticket_messages ({TICKET_MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)"),
                params![
                    message.id.to_string(),
                    ticket_id.to_string(),
                    sender_id.to_string(),
                    message.content,
                    is_admin,
                    now_text,
                ],
            )?;

            if is_admin && ticket.status == TicketStatus::Open {
                ticket.status = TicketStatus::InProgress;
            }
            ticket.updated_at = now;

            tx.execute(
                "UPDATE tickets SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![ticket_id.to_string(), ticket.status.as_str(), now_text],
            )?;

            tx.commit()?;
            Ok(PostTicketMessage::Posted { message, ticket, previous_status })
        })
    }

    pub fn list_ticket_messages(&self, ticket_id: Uuid) -> Result<Vec<TicketMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TICKET_MESSAGE_COLUMNS} FROM ticket_messages
                 WHERE ticket_id = ?1
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt
                .query_map([ticket_id.to_string()], models::ticket_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark messages written by the other side as read.
    pub fn mark_ticket_messages_read(&self, ticket_id: Uuid, reader_is_admin: bool) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE ticket_messages SET is_read = 1
                 WHERE ticket_id = ?1 AND is_admin != ?2 AND is_read = 0",
                params![ticket_id.to_string(), reader_is_admin],
            )?;
            Ok(n)
        })
    }
}

fn query_ticket(conn: &Connection, id: Uuid) -> Result<Option<Ticket>> {
    conn.query_row(
        &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1"),
        [id.to_string()],
        models::ticket,
    )
    .optional()
}
