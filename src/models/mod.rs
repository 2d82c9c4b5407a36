pub mod appointment;
pub mod conversation;
pub mod intent;

pub use appointment::{Appointment, AppointmentStatus, ListFilter, DEFAULT_TITLE};
pub use conversation::{ConversationTurn, Role};
pub use intent::{ActionKind, Intent, ModelAction};
