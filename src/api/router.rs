use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};

use super::{handlers, middleware::auth_middleware, websocket::handle_websocket};
use crate::AppState;

pub fn create_router(state: AppState) -> Router<AppState> {
    // Conversation routes (protected)
    let conversation_routes = Router::new()
        .route("/", get(handlers::conversations::list_conversations))
        .route("/", post(handlers::conversations::start_conversation))
        .route("/:id", delete(handlers::conversations::hide_conversation))
        .route("/:id/feed", get(handlers::conversations::get_feed))
        .route("/:id/messages", post(handlers::messages::send_message))
        .route("/:id/read", post(handlers::messages::mark_read))
        .route("/:id/offers", post(handlers::offers::create_offer))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Offer routes (protected)
    let offer_routes = Router::new()
        .route("/:id/counter", post(handlers::offers::counter_offer))
        .route("/:id/respond", post(handlers::offers::respond_to_offer))
        .route("/:id/cancel", post(handlers::offers::cancel_offer))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // WebSocket route (protected)
    let ws_route = Router::new()
        .route("/ws", get(handle_websocket))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/conversations", conversation_routes)
        .nest("/offers", offer_routes)
        .merge(ws_route)
        .with_state(state)
}
