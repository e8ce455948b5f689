//! Transactional email
//!
//! Emails are sent in a spawned task; a failed send is logged and never
//! reaches the request that triggered it.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::config::EmailConfig;

const DEFAULT_FROM: &str = "Bookshop <noreply@bookshop.local>";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("email request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("email provider rejected message: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

/// Build the mailer described by `config`.
pub fn from_config(config: &EmailConfig) -> Arc<dyn Mailer> {
    if config.api_url.is_empty() {
        tracing::warn!("Email API not configured, emails will only be logged");
        Arc::new(LogMailer)
    } else {
        Arc::new(HttpMailer::new(config))
    }
}

/// Send without waiting; failures are logged.
pub fn send_in_background(mailer: Arc<dyn Mailer>, email: Email) {
    tokio::spawn(async move {
        let to = email.to.clone();
        let subject = email.subject.clone();
        match mailer.send(email).await {
            Ok(()) => tracing::info!("Email \"{}\" sent to {}", subject, to),
            Err(e) => tracing::error!("Email \"{}\" to {} failed: {}", subject, to, e),
        }
    });
}

#[derive(Serialize)]
struct ProviderMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts `{from, to, subject, html}` as JSON with a bearer key.
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from: if config.from.is_empty() {
                DEFAULT_FROM.to_string()
            } else {
                config.from.clone()
            },
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&ProviderMessage {
                from: &self.from,
                to: &email.to,
                subject: &email.subject,
                html: &email.html,
            })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(MailError::Rejected(format!("{}: {}", status, body)))
        }
    }
}

pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        tracing::info!("[mail] to={} subject={:?}\n{}", email.to, email.subject, email.html);
        Ok(())
    }
}

fn escape_html(raw: &str) -> String {
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

fn layout(heading: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
      <h1 style="background-color: #4CAF50; color: white; padding: 20px; text-align: center;">{}</h1>
      <div style="padding: 20px; background-color: #f9f9f9;">{}</div>
      <p style="text-align: center; color: #666; font-size: 12px;">University Bookshop</p>
    </div>
  </body>
</html>"#,
        heading, body
    )
}

pub fn sub_admin_welcome(to: &str, username: &str, temporary_password: &str) -> Email {
    let body = format!(
        "<p>Hello,</p>\
         <p>You have been added as a Sub-Admin for the bookshop management system.</p>\
         <p><strong>Username:</strong> {}<br><strong>Temporary Password:</strong> {}</p>\
         <p><strong>Important:</strong> please change your password after your first login.</p>",
        escape_html(username),
        escape_html(temporary_password)
    );
    Email {
        to: to.to_string(),
        subject: "Welcome to the Bookshop Admin Panel".to_string(),
        html: layout("Welcome to the Bookshop Admin Panel", &body),
    }
}

pub fn password_reset(to: &str, username: &str, reset_url: &str) -> Email {
    let url = escape_html(reset_url);
    let body = format!(
        "<p>Hello <strong>{}</strong>,</p>\
         <p>We received a request to reset your password.</p>\
         <p><a href=\"{url}\">Reset Password</a></p>\
         <p>Or paste this link into your browser:</p>\
         <p style=\"word-break: break-all; color: #666;\">{url}</p>\
         <p>This link expires in 1 hour. If you did not request a reset, ignore this email.</p>",
        escape_html(username),
        url = url
    );
    Email {
        to: to.to_string(),
        subject: "Password Reset Request".to_string(),
        html: layout("Password Reset Request", &body),
    }
}

pub fn password_reset_success(to: &str, username: &str) -> Email {
    let body = format!(
        "<p>Hello <strong>{}</strong>,</p>\
         <p>Your password has been reset successfully. You can now log in with your new password.</p>\
         <p>If you did not make this change, contact an administrator immediately.</p>",
        escape_html(username)
    );
    Email {
        to: to.to_string(),
        subject: "Password Reset Successful".to_string(),
        html: layout("Password Reset Successful", &body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<Email>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: Email) -> Result<(), MailError> {
            self.sent.lock().await.push(email);
            Ok(())
        }
    }

    #[test]
    fn welcome_contains_credentials() {
        let email = sub_admin_welcome("clerk@uni.edu", "clerk_01", "Ab3#xyz9Qw!e");
        assert_eq!(email.to, "clerk@uni.edu");
        assert!(email.html.contains("clerk_01"));
        assert!(email.html.contains("Ab3#xyz9Qw!e"));
    }

    #[test]
    fn reset_link_is_escaped() {
        let email = password_reset("a@b.co", "<admin>", "https://shop/reset?token=t&email=a@b.co");
        assert!(email.html.contains("&lt;admin&gt;"));
        assert!(email.html.contains("token=t&amp;email=a@b.co"));
    }

    #[tokio::test]
    async fn background_send_reaches_mailer() {
        let mailer = Arc::new(RecordingMailer::default());
        send_in_background(mailer.clone(), password_reset_success("a@b.co", "admin"));

        for _ in 0..50 {
            if !mailer.sent.lock().await.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let sent = mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Password Reset Successful");
    }

    #[test]
    fn empty_config_logs_only() {
        // Constructing must not require a runtime or network.
        let _mailer = from_config(&EmailConfig::default());
    }
}
