use ai_client::SavingsAdvisor;
use services::{AnalysisStore, AuthService, PriceService, TaskScope};
use std::sync::Arc;
use std::time::Duration;

/// Services shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub price: Arc<PriceService>,
    pub analysis: Arc<AnalysisStore>,
    pub advisor: Arc<SavingsAdvisor>,
    /// Long-running work (LLM calls, background refresh) is tied to this
    /// scope and cut short when the server shuts down.
    pub scope: Arc<TaskScope>,
    /// A cached price older than this is refetched before use.
    pub price_max_age: Duration,
}
