//! Application state.

use refrain_auth::AuthDb;
use refrain_core::config::AppConfig;
use refrain_core::gate::DispatchGate;
use refrain_core::linking::LinkingOrchestrator;
use refrain_core::nowplaying::NowPlayingService;
use refrain_core::post::Poster;
use refrain_core::provider::Adapters;
use refrain_core::session::SessionManager;
use refrain_core::refrain_http_client;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: AuthDb,
    pub sessions: Arc<SessionManager>,
    pub linking: Arc<LinkingOrchestrator>,
    pub gate: Arc<DispatchGate>,
    pub poster: Arc<Poster>,
}

impl AppState {
    pub fn new(config: AppConfig, db: AuthDb) -> Self {
        let config = Arc::new(config);
        let http = refrain_http_client();

        let adapters = Arc::new(Adapters::new(config.clone(), http.clone()));
        let sessions = Arc::new(SessionManager::new(db.clone(), config.session_ttl_days));
        let linking = Arc::new(LinkingOrchestrator::new(
            db.clone(),
            adapters.clone(),
            config.clone(),
        ));
        let gate = Arc::new(DispatchGate::new(db.clone(), adapters, config.clone()));
        let nowplaying = Arc::new(NowPlayingService::new(
            gate.clone(),
            http.clone(),
            config.market.clone(),
        ));
        let poster = Arc::new(Poster::new(gate.clone(), nowplaying, http));

        Self {
            config,
            db,
            sessions,
            linking,
            gate,
            poster,
        }
    }
}
