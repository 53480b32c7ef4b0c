use std::sync::Arc;

use crate::config::SyncConfig;
use crate::errors::SyncResult;

use super::client_state::ClientState;
use super::context::BoardContext;
use super::engine::Engine;
use super::gateway::RemoteGateway;
use super::models::BoardView;
use super::session::BoardSession;

/// Everything one account needs on one device: a session manager and a
/// mutation engine sharing a single context.
pub struct BoardClient {
    pub session: BoardSession,
    pub engine: Engine,
}

impl BoardClient {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        state: Arc<ClientState>,
        config: &SyncConfig,
    ) -> Self {
        let ctx = BoardContext::new(gateway);
        let settings = config.boards().clone();
        Self {
            session: BoardSession::new(config.account.clone(), ctx.clone(), state, settings),
            engine: Engine::new(ctx, config.tasks().clone()),
        }
    }

    pub fn context(&self) -> &BoardContext {
        self.session.context()
    }

    pub fn view(&self) -> SyncResult<BoardView> {
        self.context().view()
    }
}
