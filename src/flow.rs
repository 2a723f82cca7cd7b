//! Page state machine for the survey flow.
//!
//! The session is an immutable record: applying an action returns the next
//! session value instead of mutating in place, so every field change is
//! visible at the call site. Pages advance only on explicit user actions.
//!
//! Counterbalancing: half of the participants read the study instructions
//! before the survey, half read the debrief after it. Both halves pass
//! through `ConditionalInstructions` exactly once; which side of the survey
//! it lands on depends on `instructions_first`, assigned at login from the
//! login ordinal (first login true, second false, alternating).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Login,
    Instructions,
    Consent,
    DoNotConsent,
    ConditionalInstructions,
    Survey,
    Voucher,
}

impl Page {
    pub fn name(self) -> &'static str {
        match self {
            Page::Login => "login",
            Page::Instructions => "instructions",
            Page::Consent => "consent",
            Page::DoNotConsent => "do_not_consent",
            Page::ConditionalInstructions => "conditional_instructions",
            Page::Survey => "survey",
            Page::Voucher => "voucher",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Page::DoNotConsent | Page::Voucher)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub email: String,
    pub student_id: String,
    pub passcode: String,
    pub page: Page,
    pub instructions_first: bool,
    pub passcode_sent: bool,
    pub reward_code: Option<String>,
    pub reward_email_sent: bool,
}

impl Session {
    pub fn new(passcode: String) -> Self {
        Session {
            email: String::new(),
            student_id: String::new(),
            passcode,
            page: Page::Login,
            instructions_first: true,
            passcode_sent: false,
            reward_code: None,
            reward_email_sent: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Action {
    /// Passcode echoed back correctly; carries the counterbalancing flag
    /// computed from the login ordinal.
    PasscodeVerified { instructions_first: bool },
    /// "Proceed" on the study information page.
    Proceed,
    ConsentGranted,
    ConsentDeclined,
    /// Ratings recorded and a reward row claimed.
    SurveySubmitted { reward_code: String },
    /// "Okay, I understand" on the conditional instructions page.
    Acknowledge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowError {
    /// The action does not belong to the session's current page.
    WrongPage(Page),
}

/// Applies a user action, returning the next session value. The input
/// session is untouched on error.
pub fn apply(session: &Session, action: &Action) -> Result<Session, FlowError> {
    let mut next = session.clone();
    match (session.page, action) {
        (Page::Login, Action::PasscodeVerified { instructions_first }) => {
            next.instructions_first = *instructions_first;
            next.page = Page::Instructions;
        }
        (Page::Instructions, Action::Proceed) => {
            next.page = Page::Consent;
        }
        (Page::Consent, Action::ConsentGranted) => {
            next.page = if session.instructions_first {
                Page::ConditionalInstructions
            } else {
                Page::Survey
            };
        }
        (Page::Consent, Action::ConsentDeclined) => {
            next.page = Page::DoNotConsent;
        }
        (Page::Survey, Action::SurveySubmitted { reward_code }) => {
            next.reward_code = Some(reward_code.clone());
            next.page = if session.instructions_first {
                Page::Voucher
            } else {
                Page::ConditionalInstructions
            };
        }
        (Page::ConditionalInstructions, Action::Acknowledge) => {
            // Junction: before the survey this page briefs, after it debriefs.
            next.page = if session.reward_code.is_none() {
                Page::Survey
            } else {
                Page::Voucher
            };
        }
        (page, _) => return Err(FlowError::WrongPage(page)),
    }
    Ok(next)
}
