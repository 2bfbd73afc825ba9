use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

use ecotrack_db::Database;
use ecotrack_types::events::{
    CHAT_CONTENT_MAX, GatewayCommand, GatewayEvent, HISTORY_LIMIT_DEFAULT, HISTORY_LIMIT_MAX,
};
use ecotrack_types::models::ChatMessage;

use crate::dispatcher::Dispatcher;

/// The authenticated side of one gateway connection.
pub struct Session {
    pub user_id: Uuid,
    pub name: String,
    pub conn_id: Uuid,
    pub reply: mpsc::UnboundedSender<GatewayEvent>,
}

impl Session {
    fn respond(&self, event: GatewayEvent) {
        let _ = self.reply.send(event);
    }
}

pub async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    session: &Session,
    cmd: GatewayCommand,
) {
    match cmd {
        GatewayCommand::PresenceSync => {
            let users = dispatcher.online_users().await;
            session.respond(GatewayEvent::PresenceOnline { users });
        }

        GatewayCommand::History { peer_id, limit } => {
            let limit = limit.unwrap_or(HISTORY_LIMIT_DEFAULT).clamp(1, HISTORY_LIMIT_MAX);
            let user_id = session.user_id;
            match blocking(db, move |db| db.chat_history(user_id, peer_id, limit)).await {
                Ok(messages) => session.respond(GatewayEvent::ChatHistory { peer_id, messages }),
                Err(e) => {
                    error!("chat history for {} <-> {} failed: {:#}", user_id, peer_id, e);
                    session.respond(GatewayEvent::error("Could not load chat history"));
                }
            }
        }

        GatewayCommand::Send { to, content } => {
            send_message(dispatcher, db, session, to, content).await;
        }
    }
}

async fn send_message(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    session: &Session,
    to: Uuid,
    content: String,
) {
    let content = content.trim().to_string();
    if content.is_empty() {
        session.respond(GatewayEvent::error("Message cannot be empty"));
        return;
    }
    if content.chars().count() > CHAT_CONTENT_MAX {
        session.respond(GatewayEvent::error(format!(
            "Message exceeds {} characters",
            CHAT_CONTENT_MAX
        )));
        return;
    }
    if to == session.user_id {
        session.respond(GatewayEvent::error("Cannot send a message to yourself"));
        return;
    }

    let message = ChatMessage {
        id: Uuid::new_v4(),
        sender_id: session.user_id,
        receiver_id: to,
        content,
        created_at: chrono::Utc::now(),
    };

    let stored = message.clone();
    let persisted = blocking(db, move |db| {
        if !db.user_exists(stored.receiver_id)? {
            return Ok(false);
        }
        db.insert_chat_message(&stored)?;
        Ok(true)
    })
    .await;

    match persisted {
        Ok(true) => {}
        Ok(false) => {
            session.respond(GatewayEvent::error("Recipient not found"));
            return;
        }
        Err(e) => {
            error!("chat send {} -> {} failed: {:#}", session.user_id, to, e);
            session.respond(GatewayEvent::error("Could not send message"));
            return;
        }
    }

    session.respond(GatewayEvent::ChatMessage(message.clone()));
    if !dispatcher.send_to_user(to, GatewayEvent::ChatMessage(message)).await {
        debug!("{} is offline; message kept for history", to);
    }
}

/// Run a DB call off the async runtime.
async fn blocking<F, T>(db: &Arc<Database>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db)).await?
}
