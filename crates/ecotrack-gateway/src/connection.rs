use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{error, info, warn};
use uuid::Uuid;

use ecotrack_db::Database;
use ecotrack_types::api::Claims;
use ecotrack_types::events::{GatewayCommand, GatewayEvent};

use crate::chat::{Session, handle_command};
use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

/// Counts heartbeat ticks that passed without a Pong.
#[derive(Debug, Default)]
struct Heartbeat {
    missed: u8,
}

impl Heartbeat {
    /// Record one tick. Returns false once the peer should be dropped.
    fn on_tick(&mut self, pong_seen: bool) -> bool {
        if pong_seen {
            self.missed = 0;
        } else {
            self.missed += 1;
        }
        self.missed < MAX_MISSED_PONGS
    }
}

/// Who is on the other end of an authenticated socket.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub name: String,
}

/// Verify a bearer token and confirm the user still exists. The error is the
/// message sent back in `chat:error` before the socket is closed.
pub async fn authenticate(
    db: &Arc<Database>,
    jwt_secret: &str,
    token: Option<&str>,
) -> Result<Identity, String> {
    let token = token.ok_or_else(|| "Authentication required".to_string())?;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| "Invalid or expired token".to_string())?
    .claims;

    let db = db.clone();
    let user = tokio::task::spawn_blocking(move || db.get_user(claims.sub))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            "Authentication failed".to_string()
        })?
        .map_err(|e| {
            error!("gateway user lookup failed: {:#}", e);
            "Authentication failed".to_string()
        })?
        .ok_or_else(|| "User not found".to_string())?;

    Ok(Identity {
        user_id: user.id,
        name: user.name,
    })
}

/// Drive one WebSocket connection. Authentication happened at the upgrade;
/// a failed result is reported to the client and the socket is closed.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    auth: Result<Identity, String>,
) {
    let (mut sender, mut receiver) = socket.split();

    let identity = match auth {
        Ok(identity) => identity,
        Err(reason) => {
            warn!("Gateway connection rejected: {}", reason);
            let _ = sender.send(text(&GatewayEvent::error(reason))).await;
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "unauthorized".into(),
                })))
                .await;
            return;
        }
    };

    let Identity { user_id, name } = identity;
    info!("{} ({}) connected to gateway", name, user_id);

    // Registering queues the online list for this socket and tells everyone else
    let registration = dispatcher.connect(user_id, name.clone()).await;
    let conn_id = registration.conn_id;
    let mut events = registration.events;
    let mut closed = registration.closed;
    let session = Session {
        user_id,
        name: name.clone(),
        conn_id,
        reply: registration.reply,
    };

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.tick().await;
        let mut heartbeat = Heartbeat::default();

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if sender.send(text(&event)).await.is_err() {
                        break;
                    }
                }
                _ = &mut closed => {
                    info!("Connection {} replaced by a newer one, closing", conn_id);
                    let _ = sender
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: "replaced by a newer connection".into(),
                        })))
                        .await;
                    break;
                }
                _ = interval.tick() => {
                    if !heartbeat.on_tick(pong_flag_send.swap(false, Ordering::Acquire)) {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection", heartbeat.missed);
                        break;
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let recv_dispatcher = dispatcher.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            recv_dispatcher.touch(session.user_id, session.conn_id).await;

            match msg {
                Message::Text(raw) => match serde_json::from_str::<GatewayCommand>(&raw) {
                    Ok(cmd) => handle_command(&recv_dispatcher, &db, &session, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            session.name,
                            session.user_id,
                            e,
                            raw.chars().take(200).collect::<String>()
                        );
                        let _ = session.reply.send(GatewayEvent::error("Unrecognised command"));
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.disconnect(user_id, conn_id).await;
    info!("{} ({}) disconnected from gateway", name, user_id);
}

fn text(event: &GatewayEvent) -> Message {
    let json = serde_json::to_string(event).unwrap_or_else(|e| {
        error!("Failed to serialize gateway event: {}", e);
        r#"{"type":"chat:error","data":{"message":"Internal error"}}"#.to_string()
    });
    Message::Text(json.into())
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};

    use super::*;
    use ecotrack_db::NewUser;
    use ecotrack_types::models::Address;

    const SECRET: &str = "gateway-test-secret";

    fn token_for(sub: Uuid, exp_offset: i64) -> String {
        let claims = Claims {
            sub,
            email: "t@example.com".into(),
            name: "Tess".into(),
            is_admin: false,
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn db_with_user() -> (Arc<Database>, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        db.create_user(&NewUser {
            id,
            name: "Tess".into(),
            email: "t@example.com".into(),
            password_hash: "hash".into(),
            address: Address::default(),
            is_admin: false,
        })
        .unwrap();
        (Arc::new(db), id)
    }

    #[test]
    fn two_missed_pongs_in_a_row_drop_the_peer() {
        let mut heartbeat = Heartbeat::default();
        assert!(heartbeat.on_tick(true));
        assert!(heartbeat.on_tick(false));
        // an answer in between resets the count
        assert!(heartbeat.on_tick(true));
        assert!(heartbeat.on_tick(false));
        assert!(!heartbeat.on_tick(false));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_is_dropped_after_two_intervals() {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.tick().await;
        let start = tokio::time::Instant::now();
        let mut heartbeat = Heartbeat::default();

        let mut ticks: u8 = 0;
        loop {
            interval.tick().await;
            ticks += 1;
            if !heartbeat.on_tick(false) {
                break;
            }
        }
        assert_eq!(ticks, MAX_MISSED_PONGS);
        assert_eq!(start.elapsed(), HEARTBEAT_INTERVAL * 2);
    }

    #[tokio::test]
    async fn valid_token_resolves_identity() {
        let (db, id) = db_with_user();
        let identity = authenticate(&db, SECRET, Some(&token_for(id, 3600))).await.unwrap();
        assert_eq!(identity.user_id, id);
        assert_eq!(identity.name, "Tess");
    }

    #[tokio::test]
    async fn missing_bad_or_expired_tokens_are_refused() {
        let (db, id) = db_with_user();
        assert!(authenticate(&db, SECRET, None).await.is_err());
        assert!(authenticate(&db, SECRET, Some("not-a-jwt")).await.is_err());
        assert!(authenticate(&db, "other-secret", Some(&token_for(id, 3600))).await.is_err());
        assert!(authenticate(&db, SECRET, Some(&token_for(id, -3600))).await.is_err());
    }

    #[tokio::test]
    async fn deleted_user_cannot_connect() {
        let (db, _) = db_with_user();
        let err = authenticate(&db, SECRET, Some(&token_for(Uuid::new_v4(), 3600)))
            .await
            .unwrap_err();
        assert_eq!(err, "User not found");
    }
}
