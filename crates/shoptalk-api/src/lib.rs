pub mod businesses;
pub mod error;
pub mod messages;
pub mod router;
pub mod users;

use std::sync::Arc;

use shoptalk_db::Database;
use shoptalk_gateway::ConnectionRegistry;
use shoptalk_intelligence::IntelligenceGateway;

use crate::router::MessageRouter;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub store: Arc<Database>,
    pub registry: ConnectionRegistry,
    pub intelligence: Arc<IntelligenceGateway>,
    pub router: MessageRouter,
}
