//! Transactional mail. Sends never block or fail the request that triggered
//! them: handlers call [`Mailer::send_in_background`] and move on.

use std::sync::Arc;

use anyhow::{Context, bail};
use serde::Serialize;
use tracing::{debug, info, warn};

use ecotrack_types::models::User;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

pub struct HttpRelay {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Clone)]
pub enum Mailer {
    /// No relay configured; messages are only logged.
    Disabled,
    Http(Arc<HttpRelay>),
    /// Keeps every message in memory so tests can read what was sent.
    #[cfg(test)]
    Outbox(Arc<std::sync::Mutex<Vec<Email>>>),
}

impl Mailer {
    pub fn http(endpoint: String, api_key: Option<String>, from: String) -> Self {
        Mailer::Http(Arc::new(HttpRelay {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            from,
        }))
    }

    pub async fn send(&self, email: &Email) -> anyhow::Result<()> {
        let relay = match self {
            Mailer::Disabled => {
                debug!("Mail disabled, not sending '{}' to {}", email.subject, email.to);
                return Ok(());
            }
            Mailer::Http(relay) => relay,
            #[cfg(test)]
            Mailer::Outbox(sent) => {
                sent.lock().unwrap().push(email.clone());
                return Ok(());
            }
        };

        let mut request = relay.client.post(&relay.endpoint).json(&RelayPayload {
            from: &relay.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
        });
        if let Some(key) = &relay.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.context("mail relay unreachable")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("mail relay returned {}: {}", status, body.chars().take(200).collect::<String>());
        }

        info!("Sent '{}' to {}", email.subject, email.to);
        Ok(())
    }

    pub fn send_in_background(&self, email: Email) {
        let mailer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send(&email).await {
                warn!("Failed to send '{}' to {}: {:#}", email.subject, email.to, e);
            }
        });
    }
}

// -- Templates --

fn render(to: &str, subject: String, heading: &str, paragraphs: &[String]) -> Email {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<p style=\"font-size:15px;line-height:1.6;color:#333333;\">{}</p>", escape(p)))
        .collect();

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"></head>
<body style="font-family:Helvetica,Arial,sans-serif;background:#ffffff;margin:0;padding:0;">
  <div style="max-width:600px;margin:0 auto;padding:40px 20px;">
    <div style="border:1px solid #e5e5e5;padding:40px;">
      <h1 style="font-size:20px;font-weight:300;color:#1b5e20;">{}</h1>
      {}
      <p style="font-size:13px;color:#777777;">EcoTrack</p>
    </div>
  </div>
</body>
</html>"#,
        escape(heading),
        body
    );

    let mut text = format!("{}\n\n", heading);
    for p in paragraphs {
        text.push_str(p);
        text.push_str("\n\n");
    }
    text.push_str("EcoTrack\n");

    Email {
        to: to.to_string(),
        subject,
        html,
        text,
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn welcome(user: &User) -> Email {
    render(
        &user.email,
        "Welcome to EcoTrack".into(),
        &format!("Welcome, {}!", user.name),
        &["Your account is ready. Pick a mission, complete it and submit your proof to start earning points.".into()],
    )
}

pub fn submission_pending(user: &User, mission_title: &str) -> Email {
    render(
        &user.email,
        format!("Submission received: {}", mission_title),
        "We got your submission",
        &[format!(
            "Your submission for \"{}\" is waiting for review. We'll let you know once an admin has looked at it.",
            mission_title
        )],
    )
}

pub fn submission_approved(user: &User, mission_title: &str, points: i64, note: Option<&str>) -> Email {
    let mut paragraphs = vec![format!(
        "Your submission for \"{}\" was approved and you earned {} points. You now have {} points in total.",
        mission_title, points, user.points
    )];
    if let Some(note) = note {
        paragraphs.push(format!("Reviewer note: {}", note));
    }
    render(
        &user.email,
        format!("Approved: {}", mission_title),
        "Mission complete",
        &paragraphs,
    )
}

pub fn submission_rejected(user: &User, mission_title: &str, reason: &str) -> Email {
    render(
        &user.email,
        format!("Not approved: {}", mission_title),
        "Your submission needs another look",
        &[
            format!("Your submission for \"{}\" was not approved.", mission_title),
            format!("Reason: {}", reason),
            "You can submit the mission again at any time.".into(),
        ],
    )
}

pub fn password_reset(user: &User, frontend_url: &str, token: &str) -> Email {
    let link = format!("{}/reset-password?token={}", frontend_url.trim_end_matches('/'), token);
    render(
        &user.email,
        "Reset your EcoTrack password".into(),
        "Password reset",
        &[
            format!("Open this link within one hour to choose a new password: {}", link),
            "If you did not ask for a reset you can ignore this message.".into(),
        ],
    )
}
