use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;

use crate::bot::Bot;
use crate::message::{ConversationType, Jid};

#[derive(Clone)]
struct AppState {
    bot: Arc<Bot>,
}

#[derive(Deserialize)]
struct RoomForm {
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Deserialize)]
struct DirectMessage {
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

type Reply = (StatusCode, String);

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub struct Webhooks {
    bot: Arc<Bot>,
    bind_address: String,
}

impl Webhooks {
    pub fn new(bot: Arc<Bot>, bind_address: String) -> Self {
        Self { bot, bind_address }
    }

    fn router(bot: Arc<Bot>) -> Router {
        Router::new()
            .route("/room", post(handle_room))
            .route("/message", post(handle_message))
            .with_state(AppState { bot })
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        log::info!("Starting webhooks on {}", self.bind_address);
        let app = Self::router(self.bot);

        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        log::info!("Webhooks listening on {}", self.bind_address);
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Send a message into the bot's chat room.
async fn handle_room(State(state): State<AppState>, Form(form): Form<RoomForm>) -> Reply {
    let room = match state.bot.transport().room() {
        Some(room) => room,
        None => return (StatusCode::NOT_FOUND, "MUC room disabled".to_string()),
    };

    let msg = match non_empty(form.msg) {
        Some(msg) => msg,
        None => {
            log::warn!("Missing msg parameter in room request");
            return (StatusCode::BAD_REQUEST, "Missing msg parameter".to_string());
        }
    };

    state.bot.send(&room, &msg, ConversationType::Group).await;
    (StatusCode::OK, "Message sent".to_string())
}

/// Send a direct message, e.g. `{"to": "ops@example.com", "msg": "Deploy done"}`.
async fn handle_message(
    State(state): State<AppState>,
    Json(body): Json<DirectMessage>,
) -> Reply {
    let (to, msg) = match (non_empty(body.to), non_empty(body.msg)) {
        (Some(to), Some(msg)) => (Jid::parse(&to), msg),
        (None, _) => return (StatusCode::BAD_REQUEST, "Missing to parameter".to_string()),
        (_, None) => return (StatusCode::BAD_REQUEST, "Missing msg parameter".to_string()),
    };

    state.bot.relay(&to, &msg).await;
    (StatusCode::OK, "Message sent".to_string())
}
