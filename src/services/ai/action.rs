use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use chrono_tz::Tz;

use crate::models::{ActionKind, ModelAction};
use crate::services::datetime::resolve_local;

pub const ACTION_PROMPT: &str = r#"You are a personal secretary that manages the user's appointments.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "action": "create|cancel|reschedule|list|none",
  "title": "appointment title or a fragment of it, or null",
  "date": "YYYY-MM-DD or null",
  "time": "HH:MM (24h) or null",
  "reply": "Your short reply to the user"
}

Action rules:
- "create": the user wants a new appointment; title, date and time are required
- "cancel": the user wants to cancel an existing appointment; title identifies it
- "reschedule": the user wants to move an existing appointment; title, date and time are required
- "list": the user wants to see their appointments
- "none": anything else; just answer in "reply"

Resolve relative dates against the current time given below. Never claim an
action was performed in "reply"; the system confirms actions itself.
"#;

/// A model action that passed validation and may touch the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedAction {
    Create {
        title: String,
        at: DateTime<FixedOffset>,
    },
    Cancel {
        fragment: String,
    },
    Reschedule {
        fragment: String,
        at: DateTime<FixedOffset>,
    },
    List,
    Reply(String),
}

pub fn parse_action_response(response: &str) -> ModelAction {
    // Try direct parse first
    if let Ok(action) = serde_json::from_str::<ModelAction>(response) {
        return action;
    }

    // Strip markdown code fences
    let cleaned = response
        .trim()
        .strip_prefix("```json")
        .or_else(|| response.trim().strip_prefix("```"))
        .unwrap_or(response.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(action) = serde_json::from_str::<ModelAction>(cleaned) {
        return action;
    }

    // Try to find JSON object in the response
    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(action) = serde_json::from_str::<ModelAction>(&cleaned[start..=end]) {
                return action;
            }
        }
    }

    tracing::warn!("completion did not return an action descriptor, treating it as a plain reply");
    ModelAction {
        action: ActionKind::None,
        title: None,
        date: None,
        time: None,
        reply: response.trim().to_string(),
    }
}

/// Checks the descriptor before anything is mutated. The error names the
/// first field that failed.
pub fn validate(action: &ModelAction, tz: Tz) -> Result<ValidatedAction, String> {
    match action.action {
        ActionKind::None => Ok(ValidatedAction::Reply(action.reply.trim().to_string())),
        ActionKind::List => Ok(ValidatedAction::List),
        ActionKind::Cancel => Ok(ValidatedAction::Cancel {
            fragment: required_title(action)?,
        }),
        ActionKind::Create => Ok(ValidatedAction::Create {
            title: required_title(action)?,
            at: required_instant(action, tz)?,
        }),
        ActionKind::Reschedule => Ok(ValidatedAction::Reschedule {
            fragment: required_title(action)?,
            at: required_instant(action, tz)?,
        }),
    }
}

fn required_title(action: &ModelAction) -> Result<String, String> {
    action
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| "title is missing".to_string())
}

fn required_instant(action: &ModelAction, tz: Tz) -> Result<DateTime<FixedOffset>, String> {
    let date = action.date.as_deref().ok_or("date is missing")?;
    let time = action.time.as_deref().ok_or("time is missing")?;

    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| format!("date {date:?} is not YYYY-MM-DD"))?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|_| format!("time {time:?} is not HH:MM"))?;

    resolve_local(date, time, tz).ok_or_else(|| format!("{date} {time} does not exist in {tz}"))
}
