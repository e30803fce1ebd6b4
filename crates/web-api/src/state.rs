use std::sync::Arc;

use application::ChatService;
use infrastructure::InMemoryConnectionRouter;

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub router: Arc<InMemoryConnectionRouter>,
    pub jwt_service: Arc<JwtService>,
}

impl AppState {
    pub fn new(
        chat_service: Arc<ChatService>,
        router: Arc<InMemoryConnectionRouter>,
        jwt_service: Arc<JwtService>,
    ) -> Self {
        Self {
            chat_service,
            router,
            jwt_service,
        }
    }
}
