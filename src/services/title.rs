use std::ops::Range;

use crate::models::DEFAULT_TITLE;
use crate::services::datetime::mask;

const ACTION_VERBS: &[&str] = &[
    "schedule", "book", "set", "up", "create", "add", "cancel", "delete", "remove", "unschedule",
    "reschedule", "postpone", "move", "change", "edit", "marque", "marcar", "marca", "agende",
    "agendar", "agenda", "reserve", "reservar", "crie", "criar", "desmarque", "desmarcar",
    "desmarca", "cancele", "cancelar", "cancela", "remova", "remover", "apague", "apagar",
    "altere", "alterar", "mude", "muda", "mudar", "troque", "troca", "trocar", "edite", "editar",
    "remarque", "remarcar", "adie", "adiar",
];

const FILLERS: &[&str] = &[
    "please", "can", "could", "would", "you", "i", "want", "need", "like", "me", "my", "new",
    "por", "favor", "pode", "quero", "preciso", "meu", "minha", "novo", "nova",
];

const ARTICLES: &[&str] = &["a", "an", "the", "o", "os", "as", "um", "uma"];

const MEETING_NOUNS: &[&str] = &[
    "meeting", "appointment", "reunião", "reuniao", "compromisso", "encontro",
];

const CONNECTORS: &[&str] = &[
    "for", "at", "on", "to", "in", "of", "and", "para", "pra", "às", "em", "no", "na", "de",
    "do", "da", "e",
];

const WITH: &[&str] = &["with", "com"];

/// Builds a human-readable label from a request once the date/time spans are
/// known. Falls back to `"Meeting with <Name>"`, then to the default label.
pub fn derive_title(text: &str, spans: &[Range<usize>]) -> String {
    let words = core_words(text, spans);

    match words.first() {
        Some(first) if is_in(first, WITH) => {
            if let Some(name) = name_after(&words[1..]) {
                return meeting_with(&name);
            }
        }
        Some(_) => return capitalize(&words.join(" ")),
        None => {}
    }

    match counterpart(text, spans) {
        Some(name) => meeting_with(&name),
        None => DEFAULT_TITLE.to_string(),
    }
}

/// The person named after "with"/"com", articles skipped.
pub fn counterpart(text: &str, spans: &[Range<usize>]) -> Option<String> {
    let words = tokens(text, spans);
    let start = words.iter().position(|w| is_in(w, WITH))?;
    name_after(&words[start + 1..])
}

/// Fragment used to locate an existing appointment: the counterpart if one is
/// named, otherwise whatever is left once verbs and connectors are gone.
pub fn target_fragment(text: &str, spans: &[Range<usize>]) -> Option<String> {
    if let Some(name) = counterpart(text, spans) {
        return Some(name);
    }
    let words = core_words(text, spans);
    (!words.is_empty()).then(|| words.join(" "))
}

fn tokens(text: &str, spans: &[Range<usize>]) -> Vec<String> {
    mask(text, spans)
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

fn core_words(text: &str, spans: &[Range<usize>]) -> Vec<String> {
    let words = tokens(text, spans);

    let leading = |w: &String| {
        is_in(w, ACTION_VERBS)
            || is_in(w, FILLERS)
            || is_in(w, ARTICLES)
            || is_in(w, MEETING_NOUNS)
            || is_in(w, CONNECTORS)
    };
    let trailing =
        |w: &String| is_in(w, CONNECTORS) || is_in(w, WITH) || is_in(w, ARTICLES) || is_in(w, FILLERS);

    let start = words.iter().position(|w| !leading(w)).unwrap_or(words.len());
    let end = words
        .iter()
        .rposition(|w| !trailing(w))
        .map(|i| i + 1)
        .unwrap_or(0);

    if start >= end {
        return Vec::new();
    }
    words[start..end].to_vec()
}

fn name_after(words: &[String]) -> Option<String> {
    let name: Vec<&str> = words
        .iter()
        .skip_while(|w| is_in(w, ARTICLES))
        .take_while(|w| is_name_word(w))
        .map(String::as_str)
        .collect();
    (!name.is_empty()).then(|| name.join(" "))
}

fn is_name_word(word: &str) -> bool {
    word.chars().all(|c| c.is_alphabetic() || c == '-' || c == '\'')
        && !is_in(word, CONNECTORS)
        && !is_in(word, WITH)
        && !is_in(word, FILLERS)
        && !is_in(word, ACTION_VERBS)
}

fn is_in(word: &str, set: &[&str]) -> bool {
    let lower = word.to_lowercase();
    set.contains(&lower.as_str())
}

fn meeting_with(name: &str) -> String {
    format!("Meeting with {name}")
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().chain(chars).collect(),
    }
}
