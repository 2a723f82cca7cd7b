//! Outbound email channel.
//!
//! Messages are composed here and appended to the workspace `outbox` table;
//! an external delivery agent (the host process holding the SMTP account)
//! drains the table. Queue failures surface to the caller unchanged, same
//! as any other store failure.

use rusqlite::Connection;
use serde::Serialize;

pub const PASSCODE_SUBJECT: &str = "QUB AI Assist Feedback Form";
pub const REWARD_SUBJECT: &str = "Thank you for participating in the feedback study";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Passcode,
    Reward,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Passcode => "passcode",
            MessageKind::Reward => "reward",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub kind: String,
    pub queued_at: String,
}

/// The passcode body keeps the code as the final token so the host mail
/// template can highlight it.
pub fn passcode_body(email: &str, student_id: &str, passcode: &str) -> String {
    format!(
        "Hi, {} ({}). Your pass code for the feedback form is {}",
        email, student_id, passcode
    )
}

pub fn reward_body(reward_code: &str) -> String {
    format!(
        "We highly appreciate your efforts in participating in the feedback. \
         Your Amazon voucher code is {}",
        reward_code
    )
}

pub fn queue(
    conn: &Connection,
    recipient: &str,
    subject: &str,
    body: &str,
    kind: MessageKind,
    queued_at: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO outbox(recipient, subject, body, kind, queued_at)
         VALUES(?, ?, ?, ?, ?)",
        (recipient, subject, body, kind.as_str(), queued_at),
    )?;
    Ok(())
}

/// Queued messages, oldest first, optionally filtered by recipient.
pub fn queued(conn: &Connection, recipient: Option<&str>) -> anyhow::Result<Vec<OutboxMessage>> {
    let mut out = Vec::new();
    match recipient {
        Some(addr) => {
            let mut stmt = conn.prepare(
                "SELECT recipient, subject, body, kind, queued_at FROM outbox
                 WHERE recipient = ? ORDER BY id",
            )?;
            let rows = stmt.query_map([addr], row_to_message)?;
            for row in rows {
                out.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT recipient, subject, body, kind, queued_at FROM outbox ORDER BY id",
            )?;
            let rows = stmt.query_map([], row_to_message)?;
            for row in rows {
                out.push(row?);
            }
        }
    }
    Ok(out)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<OutboxMessage> {
    Ok(OutboxMessage {
        recipient: row.get(0)?,
        subject: row.get(1)?,
        body: row.get(2)?,
        kind: row.get(3)?,
        queued_at: row.get(4)?,
    })
}
