use anyhow::bail;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

/// Maximum number of Likert ratings a survey variant may collect.
pub const MAX_RATINGS: usize = 10;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("survey.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS roster(
            email TEXT PRIMARY KEY,
            student_id TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS login_log(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL,
            student_id TEXT NOT NULL,
            logged_in_at TEXT NOT NULL
        )",
        [],
    )?;

    // Reward rows are pre-seeded with a blank email; a row is "claimed"
    // once a participant's email is written into it.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS responses(
            reward_code TEXT PRIMARY KEY,
            email TEXT NOT NULL DEFAULT '',
            student_id TEXT NOT NULL DEFAULT '',
            rating_1 INTEGER,
            rating_2 INTEGER,
            rating_3 INTEGER,
            rating_4 INTEGER,
            rating_5 INTEGER,
            rating_6 INTEGER,
            rating_7 INTEGER,
            rating_8 INTEGER,
            rating_9 INTEGER,
            rating_10 INTEGER,
            preferred_version TEXT NOT NULL DEFAULT '',
            comment TEXT NOT NULL DEFAULT '',
            instructions_first INTEGER,
            completed_at TEXT NOT NULL DEFAULT '',
            student_id_check TEXT NOT NULL DEFAULT '',
            seeded_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_responses_email ON responses(email)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS feedback_sections(
            student_id TEXT NOT NULL,
            section TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            original_text TEXT NOT NULL,
            alternative_text TEXT NOT NULL,
            PRIMARY KEY(student_id, section)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_feedback_sections_student
         ON feedback_sections(student_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS outbox(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipient TEXT NOT NULL,
            subject TEXT NOT NULL,
            body TEXT NOT NULL,
            kind TEXT NOT NULL,
            queued_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_outbox_recipient ON outbox(recipient)",
        [],
    )?;

    Ok(conn)
}

/// Roster pairing for an invited email, if any.
pub fn roster_lookup(conn: &Connection, email: &str) -> anyhow::Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT student_id FROM roster WHERE email = ?",
            [email],
            |r| r.get::<_, String>(0),
        )
        .optional()?;
    Ok(id)
}

/// True if a claimed response row already bears this email or student ID.
pub fn has_participated(conn: &Connection, email: &str, student_id: &str) -> anyhow::Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM responses
             WHERE email <> '' AND (email = ? OR student_id = ?)
             LIMIT 1",
            [email, student_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

pub fn has_feedback_content(conn: &Connection, student_id: &str) -> anyhow::Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM feedback_sections WHERE student_id = ? LIMIT 1",
            [student_id],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

/// Appends a login row and returns the 1-based ordinal of this login.
pub fn record_login(
    conn: &Connection,
    email: &str,
    student_id: &str,
    logged_in_at: &str,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO login_log(email, student_id, logged_in_at) VALUES(?, ?, ?)",
        (email, student_id, logged_in_at),
    )?;
    let n = conn.query_row("SELECT COUNT(*) FROM login_log", [], |r| r.get::<_, i64>(0))?;
    Ok(n)
}

pub struct CompletedSurvey<'a> {
    pub email: &'a str,
    pub student_id: &'a str,
    pub ratings: &'a [i64],
    pub preferred_version: &'a str,
    pub comment: &'a str,
    pub instructions_first: bool,
    pub completed_at: &'a str,
}

/// Claims the first unclaimed reward row and writes the full response into it
/// in one transaction. Returns the claimed reward code, or None when every
/// seeded row is already taken.
pub fn claim_next_reward(
    conn: &Connection,
    survey: &CompletedSurvey<'_>,
) -> anyhow::Result<Option<String>> {
    if survey.ratings.is_empty() || survey.ratings.len() > MAX_RATINGS {
        bail!("expected 1..={} ratings, got {}", MAX_RATINGS, survey.ratings.len());
    }

    let tx = conn.unchecked_transaction()?;

    let code: Option<String> = tx
        .query_row(
            "SELECT reward_code FROM responses
             WHERE email = ''
             ORDER BY seeded_at, rowid
             LIMIT 1",
            [],
            |r| r.get(0),
        )
        .optional()?;
    let Some(code) = code else {
        tx.rollback()?;
        return Ok(None);
    };

    let mut ratings: [Option<i64>; MAX_RATINGS] = [None; MAX_RATINGS];
    for (slot, v) in ratings.iter_mut().zip(survey.ratings.iter()) {
        *slot = Some(*v);
    }

    let updated = tx.execute(
        "UPDATE responses SET
            email = ?1, student_id = ?2,
            rating_1 = ?3, rating_2 = ?4, rating_3 = ?5, rating_4 = ?6,
            rating_5 = ?7, rating_6 = ?8, rating_7 = ?9, rating_8 = ?10,
            rating_9 = ?11, rating_10 = ?12,
            preferred_version = ?13, comment = ?14,
            instructions_first = ?15, completed_at = ?16, student_id_check = ?17
         WHERE reward_code = ?18 AND email = ''",
        rusqlite::params![
            survey.email,
            survey.student_id,
            ratings[0],
            ratings[1],
            ratings[2],
            ratings[3],
            ratings[4],
            ratings[5],
            ratings[6],
            ratings[7],
            ratings[8],
            ratings[9],
            survey.preferred_version,
            survey.comment,
            survey.instructions_first as i64,
            survey.completed_at,
            survey.student_id,
            code,
        ],
    )?;
    if updated != 1 {
        tx.rollback()?;
        bail!("reward row {} was claimed concurrently", code);
    }

    tx.commit()?;
    Ok(Some(code))
}

pub fn claimed_count(conn: &Connection) -> anyhow::Result<i64> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM responses WHERE email <> ''",
        [],
        |r| r.get(0),
    )?;
    Ok(n)
}

pub fn unclaimed_count(conn: &Connection) -> anyhow::Result<i64> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM responses WHERE email = ''",
        [],
        |r| r.get(0),
    )?;
    Ok(n)
}

/// The two full feedback texts for a student, assembled from the stored
/// sections in sort order. Empty when no content was imported for the ID.
pub fn feedback_texts(
    conn: &Connection,
    student_id: &str,
) -> anyhow::Result<Option<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT original_text, alternative_text FROM feedback_sections
         WHERE student_id = ?
         ORDER BY sort_order",
    )?;
    let sections = stmt
        .query_map([student_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if sections.is_empty() {
        return Ok(None);
    }

    let original = sections
        .iter()
        .map(|(o, _)| o.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let alternative = sections
        .iter()
        .map(|(_, a)| a.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    Ok(Some((original, alternative)))
}
