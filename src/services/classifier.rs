use crate::models::Intent;

const CANCEL_KEYWORDS: &[&str] = &[
    "cancel", "cancela", "cancele", "cancelar", "desmarque", "desmarcar", "desmarca", "remova",
    "remover", "remove", "delete", "apague", "apagar", "call off", "unschedule",
];

const RESCHEDULE_KEYWORDS: &[&str] = &[
    "reschedule", "postpone", "move", "change", "edit", "altere", "alterar", "mude", "muda",
    "mudar", "troque", "troca", "trocar", "edite", "editar", "remarque", "remarcar", "adie",
    "adiar",
];

const CREATE_KEYWORDS: &[&str] = &[
    "schedule", "book", "set up", "create", "add", "marque", "marcar", "marca", "agende",
    "agendar", "agenda", "reserve", "reservar", "crie", "criar",
];

const LIST_KEYWORDS: &[&str] = &[
    "what appointments", "which appointments", "do i have", "my appointments",
    "list", "show", "quais compromissos", "quais os compromissos", "meus compromissos",
    "o que tenho", "tenho algum", "tenho compromisso", "listar", "liste", "mostre", "mostrar",
];

/// Questions about the agenda itself. Their nouns ("schedule", "agenda") are
/// also create verbs, so they are looked at before the create set.
const AGENDA_PHRASES: &[&str] = &[
    "my agenda", "my schedule", "my calendar", "minha agenda", "meus horários", "meus horarios",
];

/// Keyword classifier. Sets are checked in a fixed order so that
/// "cancel the rescheduled meeting" stays a cancellation.
pub fn classify(text: &str) -> Intent {
    let normalized = normalize(text);

    let has_any = |keywords: &[&str]| keywords.iter().any(|k| contains_phrase(&normalized, k));

    if has_any(CANCEL_KEYWORDS) {
        Intent::Cancel
    } else if has_any(RESCHEDULE_KEYWORDS) {
        Intent::Reschedule
    } else if asks_for_agenda(&normalized) {
        Intent::List
    } else if has_any(CREATE_KEYWORDS) {
        Intent::Create
    } else if has_any(LIST_KEYWORDS) {
        Intent::List
    } else {
        Intent::Unknown
    }
}

/// An agenda phrase with no other create verb around it. "marque na minha
/// agenda" still books something.
fn asks_for_agenda(normalized: &str) -> bool {
    let Some(phrase) = AGENDA_PHRASES
        .iter()
        .find(|p| contains_phrase(normalized, p))
    else {
        return false;
    };
    let rest = normalized.replacen(&format!(" {phrase} "), " ", 1);
    !CREATE_KEYWORDS.iter().any(|k| contains_phrase(&rest, k))
}

/// Lowercased words joined by single spaces and padded on both ends, so that
/// phrase lookups only ever match whole words.
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    format!(" {} ", words.join(" "))
}

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    normalized.contains(&format!(" {phrase} "))
}
