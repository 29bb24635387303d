use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::auth::PinSessions;
use crate::notify::ChangeNotifier;
use crate::service::QueueService;

pub struct AppState {
    pub service: QueueService,
    pub sessions: PinSessions,
    pub notifier: ChangeNotifier,
    pub shutdown_token: CancellationToken,
    pub registry: RwLock<Registry>,
}

impl AppState {
    pub fn new(
        service: QueueService,
        sessions: PinSessions,
        notifier: ChangeNotifier,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            service,
            sessions,
            notifier,
            shutdown_token,
            registry: RwLock::new(<Registry>::default()),
        }
    }
}
