use rusqlite::Connection;
use serde_json::{json, Value};

use crate::db;
use crate::flow::{Page, Session};

/// Answer options for the preferred-version question, in display order.
pub const PREFERRED_CHOICES: [&str; 2] = ["original feedback", "alternative feedback"];

pub fn param_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// Timestamp format carried over from the study's spreadsheet exports.
pub fn now_stamp() -> String {
    chrono::Local::now().format("%d/%m/%Y %H:%M:%S").to_string()
}

/// The page descriptor embedded in every session-scoped response. The UI
/// renders this verbatim; it holds no flow logic of its own.
pub fn page_descriptor(conn: Option<&Connection>, session: &Session) -> Value {
    match session.page {
        Page::Login => json!({
            "name": session.page.name(),
            "passcodeSent": session.passcode_sent,
            // Login inputs lock once the passcode email is out, so a page
            // reload cannot trigger a second send.
            "inputsDisabled": session.passcode_sent,
        }),
        Page::Instructions | Page::DoNotConsent => json!({
            "name": session.page.name(),
        }),
        Page::Consent => json!({
            "name": session.page.name(),
            "statementCount": 6,
        }),
        Page::ConditionalInstructions => json!({
            "name": session.page.name(),
            // Briefing before the survey, debrief after it.
            "variant": if session.reward_code.is_none() { "briefing" } else { "debrief" },
        }),
        Page::Survey => {
            let feedback = conn
                .and_then(|c| db::feedback_texts(c, &session.student_id).ok())
                .flatten()
                .map(|(original, alternative)| {
                    json!({ "original": original, "alternative": alternative })
                });
            json!({
                "name": session.page.name(),
                "feedback": feedback,
                "ratingScale": { "min": 0, "max": 100, "step": 1 },
                "preferredChoices": PREFERRED_CHOICES,
            })
        }
        Page::Voucher => json!({
            "name": session.page.name(),
            "rewardCode": session.reward_code,
            "emailSent": session.reward_email_sent,
        }),
    }
}
