use uc_agent::agent::Agent;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agent: Agent,
}

impl AppState {
    pub fn new(agent: Agent) -> Self {
        Self { agent }
    }
}
