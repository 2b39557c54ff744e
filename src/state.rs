use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::CONFIG;
use crate::credits::CreditLedger;

/// Session state shared between the orchestrator and the caller. The ledger
/// is only ever mutated between shots, never concurrently.
#[derive(Clone)]
pub struct AppState {
    pub credits: Arc<Mutex<CreditLedger>>,
}

impl AppState {
    pub fn new() -> Self {
        AppState {
            credits: Arc::new(Mutex::new(CreditLedger::new(CONFIG.initial_credits))),
        }
    }
}
