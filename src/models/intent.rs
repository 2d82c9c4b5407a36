use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Create,
    Cancel,
    Reschedule,
    List,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Create => "create",
            Intent::Cancel => "cancel",
            Intent::Reschedule => "reschedule",
            Intent::List => "list",
            Intent::Unknown => "unknown",
        }
    }
}

/// Action descriptor the completion service returns when structured actions
/// are enabled. Nothing here is trusted until it has been validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAction {
    #[serde(default)]
    pub action: ActionKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub reply: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Cancel,
    Reschedule,
    List,
    #[default]
    None,
}
