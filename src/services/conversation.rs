use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

use crate::errors::{AppError, StoreError};
use crate::models::{ConversationTurn, Intent, ListFilter, Role};
use crate::services::ai::action::{parse_action_response, validate, ValidatedAction, ACTION_PROMPT};
use crate::services::ai::Message;
use crate::services::classifier::classify;
use crate::services::datetime::format_local;
use crate::services::title::{derive_title, target_fragment};
use crate::state::AppState;

const ASSISTANT_PROMPT: &str = "You are a friendly personal secretary. Keep answers short. \
You cannot change appointments yourself; if the user seems to want that, tell them to ask \
explicitly, for example \"schedule a meeting with Ana tomorrow at 10h\".";

const HELP_REPLY: &str = "I can schedule, cancel, reschedule or list your appointments. \
Try \"schedule a meeting with Ana tomorrow at 10h\" or \"what appointments do I have?\".";

const TIMEOUT_REPLY: &str =
    "Sorry, I'm taking too long to answer right now. Please try again in a moment.";

const INVALID_ACTION_REPLY: &str =
    "Sorry, I couldn't work out what to do with that. Could you rephrase it?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Cancelled,
    Rescheduled,
    Listed,
    NeedsClarification,
    NotFound,
    Answered,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub intent: Intent,
    pub outcome: Outcome,
}

impl Reply {
    fn new(intent: Intent, outcome: Outcome, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            intent,
            outcome,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Classifying,
    Extracting,
    Mutating,
    Responding,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Classifying => "classifying",
            Phase::Extracting => "extracting",
            Phase::Mutating => "mutating",
            Phase::Responding => "responding",
        }
    }
}

pub async fn process_message(
    state: &Arc<AppState>,
    conversation_id: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Result<Reply, AppError> {
    let message = message.trim();
    let intent = classify(message);

    tracing::info!(
        conversation_id,
        intent = intent.as_str(),
        phase = Phase::Classifying.as_str(),
        "processing message"
    );

    let reply = match intent {
        Intent::Create => handle_create(state, message, now).await?,
        Intent::Cancel => handle_cancel(state, message, now).await?,
        Intent::Reschedule => handle_reschedule(state, message, now).await?,
        Intent::List => list_appointments(state).await?,
        Intent::Unknown => handle_unknown(state, conversation_id, message, now).await?,
    };

    tracing::info!(
        conversation_id,
        intent = reply.intent.as_str(),
        outcome = ?reply.outcome,
        phase = Phase::Responding.as_str(),
        "reply ready"
    );

    record_turns(state, conversation_id, message, &reply.text).await;
    Ok(reply)
}

async fn handle_create(
    state: &Arc<AppState>,
    message: &str,
    now: DateTime<Utc>,
) -> Result<Reply, AppError> {
    let tz = state.config.timezone;
    let Some(extraction) = state.extractor.extract(message, now, tz) else {
        tracing::info!(phase = Phase::Extracting.as_str(), "no date/time in create request");
        return Ok(Reply::new(
            Intent::Create,
            Outcome::NeedsClarification,
            "When should I schedule it? Please include a date and time, e.g. \"tomorrow at 9h\".",
        ));
    };

    let title = derive_title(message, &extraction.spans);
    create_appointment(state, &title, extraction.instant).await
}

async fn handle_cancel(
    state: &Arc<AppState>,
    message: &str,
    now: DateTime<Utc>,
) -> Result<Reply, AppError> {
    let spans = match state.extractor.extract(message, now, state.config.timezone) {
        Some(extraction) => extraction.spans,
        None => state.extractor.date_spans(message),
    };

    match target_fragment(message, &spans) {
        Some(fragment) => cancel_appointment(state, &fragment).await,
        None => Ok(Reply::new(
            Intent::Cancel,
            Outcome::NeedsClarification,
            "Which appointment should I cancel?",
        )),
    }
}

async fn handle_reschedule(
    state: &Arc<AppState>,
    message: &str,
    now: DateTime<Utc>,
) -> Result<Reply, AppError> {
    let extraction = state.extractor.extract(message, now, state.config.timezone);
    let spans = match &extraction {
        Some(extraction) => extraction.spans.clone(),
        None => state.extractor.date_spans(message),
    };

    let Some(fragment) = target_fragment(message, &spans) else {
        return Ok(Reply::new(
            Intent::Reschedule,
            Outcome::NeedsClarification,
            "Which appointment should I reschedule?",
        ));
    };
    let Some(extraction) = extraction else {
        return Ok(Reply::new(
            Intent::Reschedule,
            Outcome::NeedsClarification,
            format!("When should I move \"{fragment}\" to? Please include a date and time."),
        ));
    };

    reschedule_appointment(state, &fragment, extraction.instant).await
}

async fn handle_unknown(
    state: &Arc<AppState>,
    conversation_id: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Result<Reply, AppError> {
    if state.llm.is_none() {
        if state.config.llm_fallback {
            return Err(AppError::Config(
                "LLM_FALLBACK is enabled but no completion provider was built".to_string(),
            ));
        }
        return Ok(Reply::new(Intent::Unknown, Outcome::Answered, HELP_REPLY));
    }

    let mut messages: Vec<Message> = load_history(state, conversation_id)
        .await
        .iter()
        .map(Message::from)
        .collect();
    messages.push(Message::user(message));

    let instructions = if state.config.llm_actions {
        ACTION_PROMPT
    } else {
        ASSISTANT_PROMPT
    };
    let system = format!("{instructions}\n\n{}", context_block(state, now).await?);

    let Some(response) = complete(state, &system, &messages).await? else {
        return Ok(Reply::new(Intent::Unknown, Outcome::TimedOut, TIMEOUT_REPLY));
    };

    if !state.config.llm_actions {
        return Ok(Reply::new(Intent::Unknown, Outcome::Answered, response));
    }

    let action = parse_action_response(&response);
    match validate(&action, state.config.timezone) {
        Ok(ValidatedAction::Create { title, at }) => create_appointment(state, &title, at).await,
        Ok(ValidatedAction::Cancel { fragment }) => cancel_appointment(state, &fragment).await,
        Ok(ValidatedAction::Reschedule { fragment, at }) => {
            reschedule_appointment(state, &fragment, at).await
        }
        Ok(ValidatedAction::List) => list_appointments(state).await,
        Ok(ValidatedAction::Reply(text)) if text.is_empty() => {
            Ok(Reply::new(Intent::Unknown, Outcome::Answered, HELP_REPLY))
        }
        Ok(ValidatedAction::Reply(text)) => Ok(Reply::new(Intent::Unknown, Outcome::Answered, text)),
        Err(reason) => {
            tracing::warn!(action = ?action.action, reason, "discarding invalid model action");
            Ok(Reply::new(
                Intent::Unknown,
                Outcome::NeedsClarification,
                INVALID_ACTION_REPLY,
            ))
        }
    }
}

// ── Store operations shared by the keyword and model-action paths ──

async fn create_appointment(
    state: &Arc<AppState>,
    title: &str,
    at: DateTime<FixedOffset>,
) -> Result<Reply, AppError> {
    let tz = state.config.timezone;
    let at = at.with_timezone(&tz).fixed_offset();

    tracing::info!(phase = Phase::Mutating.as_str(), title, at = %at, "creating appointment");
    let appt = state.store.create(title, at).await?;

    Ok(Reply::new(
        Intent::Create,
        Outcome::Created,
        format!(
            "Appointment \"{}\" scheduled for {}.",
            appt.title,
            format_local(&appt.scheduled_at, tz)
        ),
    ))
}

async fn cancel_appointment(state: &Arc<AppState>, fragment: &str) -> Result<Reply, AppError> {
    tracing::info!(phase = Phase::Mutating.as_str(), fragment, "cancelling appointment");

    match state.store.cancel(fragment).await {
        Ok(appt) => Ok(Reply::new(
            Intent::Cancel,
            Outcome::Cancelled,
            format!(
                "Appointment \"{}\" on {} has been cancelled.",
                appt.title,
                format_local(&appt.scheduled_at, state.config.timezone)
            ),
        )),
        Err(StoreError::NotFound(_)) => Ok(not_found(Intent::Cancel, fragment)),
        Err(e) => Err(e.into()),
    }
}

async fn reschedule_appointment(
    state: &Arc<AppState>,
    fragment: &str,
    at: DateTime<FixedOffset>,
) -> Result<Reply, AppError> {
    let tz = state.config.timezone;
    let at = at.with_timezone(&tz).fixed_offset();

    tracing::info!(phase = Phase::Mutating.as_str(), fragment, at = %at, "rescheduling appointment");

    match state.store.reschedule(fragment, at).await {
        Ok(appt) => Ok(Reply::new(
            Intent::Reschedule,
            Outcome::Rescheduled,
            format!(
                "Appointment \"{}\" moved to {}.",
                appt.title,
                format_local(&appt.scheduled_at, tz)
            ),
        )),
        Err(StoreError::NotFound(_)) => Ok(not_found(Intent::Reschedule, fragment)),
        Err(e) => Err(e.into()),
    }
}

async fn list_appointments(state: &Arc<AppState>) -> Result<Reply, AppError> {
    let appointments = state.store.list(ListFilter::Active).await?;
    if appointments.is_empty() {
        return Ok(Reply::new(
            Intent::List,
            Outcome::Listed,
            "You have no appointments scheduled.",
        ));
    }

    let lines: Vec<String> = appointments
        .iter()
        .map(|a| format!("• {} @ {}", a.title, format_local(&a.scheduled_at, state.config.timezone)))
        .collect();
    Ok(Reply::new(
        Intent::List,
        Outcome::Listed,
        format!("Your appointments:\n{}", lines.join("\n")),
    ))
}

fn not_found(intent: Intent, fragment: &str) -> Reply {
    Reply::new(
        intent,
        Outcome::NotFound,
        format!("I couldn't find an active appointment matching \"{fragment}\". Which one did you mean?"),
    )
}

// ── Completion plumbing ──

/// `Ok(None)` when the completion did not answer in time.
async fn complete(
    state: &Arc<AppState>,
    system: &str,
    messages: &[Message],
) -> Result<Option<String>, AppError> {
    let Some(llm) = state.llm.as_deref() else {
        return Ok(None);
    };

    match tokio::time::timeout(state.config.completion_timeout, llm.chat(system, messages)).await {
        Ok(Ok(text)) => Ok(Some(text)),
        Ok(Err(e)) => Err(AppError::Completion(e)),
        Err(_) => {
            tracing::warn!(
                timeout_ms = state.config.completion_timeout.as_millis() as u64,
                "completion timed out"
            );
            Ok(None)
        }
    }
}

async fn context_block(state: &Arc<AppState>, now: DateTime<Utc>) -> Result<String, AppError> {
    let tz = state.config.timezone;
    let appointments = state.store.list(ListFilter::Active).await?;

    let snapshot = if appointments.is_empty() {
        "none".to_string()
    } else {
        appointments
            .iter()
            .map(|a| format!("- {} @ {}", a.title, format_local(&a.scheduled_at, tz)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    Ok(format!(
        "Current time: {} ({tz}, {})\nUpcoming appointments:\n{snapshot}",
        now.with_timezone(&tz).format("%Y-%m-%d %H:%M"),
        now.with_timezone(&tz).format("%A"),
    ))
}

async fn load_history(state: &Arc<AppState>, conversation_id: &str) -> Vec<ConversationTurn> {
    let Some(history) = state.history.as_ref() else {
        return Vec::new();
    };
    let limit = state.config.history_limit;
    if limit == 0 {
        return Vec::new();
    }

    match history.recent_turns(conversation_id, limit).await {
        Ok(turns) => turns,
        Err(e) => {
            tracing::warn!(conversation_id, error = %e, "failed to load conversation history");
            Vec::new()
        }
    }
}

async fn record_turns(state: &Arc<AppState>, conversation_id: &str, message: &str, reply: &str) {
    let Some(history) = state.history.as_ref() else {
        return;
    };
    if state.config.history_limit == 0 {
        return;
    }

    for (role, content) in [(Role::User, message), (Role::Assistant, reply)] {
        if let Err(e) = history.append_turn(conversation_id, role, content).await {
            tracing::warn!(conversation_id, error = %e, "failed to record conversation turn");
            return;
        }
    }
}
