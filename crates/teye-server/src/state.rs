use std::sync::Arc;

use teye_auth::AdminSessionManager;
use teye_core::{CancellationRegistry, ConfigStore, PipelineBus, QuotaManager, SessionStore, Storage};
use teye_eyes::EyeRegistry;
use teye_orchestrator::Overseer;
use teye_providers::ProviderRegistry;

use crate::pending::PendingEnvelopes;

/// Everything a request handler needs, cloned cheaply per-request the way
/// the teacher's `AppState` is — every field is itself `Arc`/`Clone`-backed,
/// so `AppState` as a whole is just a bundle of handles.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub config: ConfigStore,
    pub sessions: SessionStore,
    pub quotas: QuotaManager,
    pub bus: PipelineBus,
    pub cancellations: CancellationRegistry,
    pub providers: ProviderRegistry,
    pub eyes: EyeRegistry,
    pub overseer: Arc<Overseer>,
    pub admin_sessions: AdminSessionManager,
    pub pending_clarifications: PendingEnvelopes,
    pub server_secret: Arc<Vec<u8>>,
}
