use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::ai::LlmProvider;
use crate::services::datetime::DateTimeExtractor;
use crate::services::store::{AppointmentStore, ConversationLog};

pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn AppointmentStore>,
    /// `None` keeps the service stateless between requests.
    pub history: Option<Arc<dyn ConversationLog>>,
    pub extractor: Box<dyn DateTimeExtractor>,
    pub llm: Option<Box<dyn LlmProvider>>,
}
