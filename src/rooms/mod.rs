pub mod directory;
pub mod events;
pub mod hub;
pub mod msg;
pub mod ws;

mod info;
mod new;

use axum::Router;
use axum::routing::{get, post};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chatrooms", get(info::list_rooms).post(new::create_room))
        .route("/chatrooms/mission", post(new::create_mission_room))
        .route("/chatrooms/{id}", get(info::room_info))
        .route(
            "/chatrooms/{id}/messages",
            get(msg::room_messages).post(msg::post_message),
        )
        .route("/chatrooms/debug/{id}", get(info::debug_room))
}
