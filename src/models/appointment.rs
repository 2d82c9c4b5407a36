use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Label used when nothing in the message names the appointment.
pub const DEFAULT_TITLE: &str = "Appointment";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub title: String,
    pub scheduled_at: DateTime<FixedOffset>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn new(title: &str, scheduled_at: DateTime<FixedOffset>) -> Self {
        let now = Utc::now();
        let title = title.trim();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: if title.is_empty() {
                DEFAULT_TITLE.to_string()
            } else {
                title.to_string()
            },
            scheduled_at,
            status: AppointmentStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Case-insensitive substring match used to locate an appointment from
    /// free text.
    pub fn matches(&self, fragment: &str) -> bool {
        let fragment = fragment.trim().to_lowercase();
        !fragment.is_empty() && self.title.to_lowercase().contains(&fragment)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Cancelled,
    Rescheduled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Rescheduled => "rescheduled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "cancelled" => AppointmentStatus::Cancelled,
            "rescheduled" => AppointmentStatus::Rescheduled,
            _ => AppointmentStatus::Scheduled,
        }
    }

    /// Cancelled is terminal; everything else can still be listed and mutated.
    pub fn is_active(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListFilter {
    #[default]
    Active,
    Status(AppointmentStatus),
    All,
}

impl ListFilter {
    pub fn accepts(&self, status: AppointmentStatus) -> bool {
        match self {
            ListFilter::Active => status.is_active(),
            ListFilter::Status(s) => *s == status,
            ListFilter::All => true,
        }
    }
}
