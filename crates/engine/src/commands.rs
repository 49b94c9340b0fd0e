//! Text-command classification and postback decoding.
//!
//! Postback `data` is an ASCII `KEY=value[:value2]` mini-protocol. It is
//! decoded once here into a tagged enum so handlers match exhaustively and
//! unknown keys are an explicit `None`, not a stringly-typed fallthrough.

/// Recognized text input, classified after flow-continuation checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextCommand {
    /// `pay` or `pay MM/YYYY`.
    Pay { period: Option<(u32, i32)> },
    /// `move out`.
    MoveOut,
    /// `repair`.
    Maintenance,
    /// `payments` (staff drill-down).
    StaffPayments,
    /// `checkouts` (staff drill-down).
    StaffCheckouts,
    /// `code <phone>` (staff issues a link code).
    IssueCode { phone: String },
    /// A bare phone number (link request from an unlinked user).
    Phone(String),
    /// A six-digit link code.
    LinkCode(String),
}

/// Classify free text. Returns `None` for anything unrecognized; the router
/// stays silent in that case.
#[must_use]
pub fn classify_text(text: &str) -> Option<TextCommand> {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();

    match lower.as_str() {
        "pay" => return Some(TextCommand::Pay { period: None }),
        "move out" => return Some(TextCommand::MoveOut),
        "repair" => return Some(TextCommand::Maintenance),
        "payments" => return Some(TextCommand::StaffPayments),
        "checkouts" => return Some(TextCommand::StaffCheckouts),
        _ => {},
    }

    if let Some(rest) = lower.strip_prefix("pay ") {
        return Some(TextCommand::Pay {
            period: parse_period(rest.trim()),
        });
    }
    if let Some(rest) = lower.strip_prefix("code ") {
        let phone = rest.trim();
        if is_phone(phone) {
            return Some(TextCommand::IssueCode {
                phone: phone.to_string(),
            });
        }
        return None;
    }
    if is_phone(trimmed) {
        return Some(TextCommand::Phone(trimmed.to_string()));
    }
    if trimmed.len() == 6 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Some(TextCommand::LinkCode(trimmed.to_string()));
    }
    None
}

/// `MM/YYYY` billing period.
fn parse_period(text: &str) -> Option<(u32, i32)> {
    let (month, year) = text.split_once('/')?;
    let month: u32 = month.parse().ok()?;
    let year: i32 = year.parse().ok()?;
    if (1..=12).contains(&month) && (2000..=2100).contains(&year) {
        Some((month, year))
    } else {
        None
    }
}

/// Local mobile number: all digits, leading zero, 9 or 10 digits.
fn is_phone(text: &str) -> bool {
    (9..=10).contains(&text.len())
        && text.starts_with('0')
        && text.chars().all(|c| c.is_ascii_digit())
}

/// Decoded postback command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostbackCommand {
    MoveOutDays(u32),
    MoveOutDate,
    LinkAccept { user_id: String },
    LinkReject { user_id: String },
    PayBuilding { building_id: String },
    PayFloor { building_id: String, floor: String },
    PayRoom { room_id: String },
    PayBack,
    MoBuilding { building_id: String },
    MoFloor { building_id: String, floor: String },
    MoRoom { room_id: String },
    MaintDone { request_id: String },
    MaintNotDone { request_id: String },
}

/// Decode `KEY=value[:value2]`. Unknown keys and malformed values yield `None`.
#[must_use]
pub fn parse_postback(data: &str) -> Option<PostbackCommand> {
    let (key, value) = match data.split_once('=') {
        Some((key, value)) => (key, value),
        None => (data, ""),
    };
    let (first, second) = match value.split_once(':') {
        Some((a, b)) => (a, Some(b)),
        None => (value, None),
    };

    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

    match key {
        "MOVEOUT_DAYS" => first.parse().ok().map(PostbackCommand::MoveOutDays),
        "TENANT_MOVEOUT_DATE" => Some(PostbackCommand::MoveOutDate),
        "LINK_ACCEPT" => non_empty(first).map(|user_id| PostbackCommand::LinkAccept { user_id }),
        "LINK_REJECT" => non_empty(first).map(|user_id| PostbackCommand::LinkReject { user_id }),
        "PAY_BUILDING" => {
            non_empty(first).map(|building_id| PostbackCommand::PayBuilding { building_id })
        },
        "PAY_FLOOR" => match (non_empty(first), second.and_then(non_empty)) {
            (Some(building_id), Some(floor)) => {
                Some(PostbackCommand::PayFloor { building_id, floor })
            },
            _ => None,
        },
        "PAY_ROOM" => non_empty(first).map(|room_id| PostbackCommand::PayRoom { room_id }),
        "PAY_BACK" => Some(PostbackCommand::PayBack),
        "MO_BUILDING" => {
            non_empty(first).map(|building_id| PostbackCommand::MoBuilding { building_id })
        },
        "MO_FLOOR" => match (non_empty(first), second.and_then(non_empty)) {
            (Some(building_id), Some(floor)) => {
                Some(PostbackCommand::MoFloor { building_id, floor })
            },
            _ => None,
        },
        "MO_ROOM" => non_empty(first).map(|room_id| PostbackCommand::MoRoom { room_id }),
        "MAINT_DONE" => non_empty(first).map(|request_id| PostbackCommand::MaintDone { request_id }),
        "MAINT_NOT_DONE" => {
            non_empty(first).map(|request_id| PostbackCommand::MaintNotDone { request_id })
        },
        _ => None,
    }
}
