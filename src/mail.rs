/*!
 * Mail Module
 * Transactional email over an HTTP email API (password reset codes,
 * email-change verification, contact form).
 */
use serde::Serialize;
use thiserror::Error;

/// Mail client errors.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Email API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Email delivery is not configured")]
    NotConfigured,
}

#[derive(Debug, Serialize)]
struct EmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailBody {
    sender: EmailAddress,
    to: Vec<EmailAddress>,
    subject: String,
    text_content: String,
}

/// Email API configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
}

impl MailConfig {
    /// Returns `None` unless both the API key and sender address are set.
    pub fn from_env() -> Option<Self> {
        let api_key = non_empty_env("EMAIL_API_KEY")?;
        let sender_email = non_empty_env("EMAIL_SENDER")?;

        Some(Self {
            api_url: std::env::var("EMAIL_API_URL")
                .unwrap_or_else(|_| "https://api.brevo.com/v3/smtp/email".to_string()),
            api_key,
            sender_email,
            sender_name: non_empty_env("EMAIL_SENDER_NAME"),
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn is_configured() -> bool {
    MailConfig::from_env().is_some()
}

/// Send a plain-text transactional email. Fire-once, no retries; the
/// caller decides whether a failure is fatal for the request.
pub async fn send_email(
    to_email: &str,
    to_name: Option<&str>,
    subject: &str,
    text: &str,
) -> Result<(), MailError> {
    let config = MailConfig::from_env().ok_or(MailError::NotConfigured)?;

    let body = SendEmailBody {
        sender: EmailAddress {
            email: config.sender_email,
            name: config.sender_name,
        },
        to: vec![EmailAddress {
            email: to_email.to_string(),
            name: to_name.map(|s| s.to_string()),
        }],
        subject: subject.to_string(),
        text_content: text.to_string(),
    };

    let client = reqwest::Client::new();
    let resp = client
        .post(&config.api_url)
        .header("api-key", &config.api_key)
        .header("Accept", "application/json")
        .json(&body)
        .send()
        .await?;

    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }

    let message = resp.text().await.unwrap_or_default();
    Err(MailError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_configured_without_env() {
        // EMAIL_API_KEY is unset in the test environment
        if std::env::var("EMAIL_API_KEY").is_err() {
            assert!(!is_configured());
        }
    }

    #[test]
    fn test_send_body_serializes_camel_case() {
        let body = SendEmailBody {
            sender: EmailAddress {
                email: "noreply@academy.test".to_string(),
                name: Some("Academy".to_string()),
            },
            to: vec![EmailAddress {
                email: "user@example.com".to_string(),
                name: None,
            }],
            subject: "Reset code".to_string(),
            text_content: "123456".to_string(),
        };

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("textContent").is_some());
        assert!(json["to"][0].get("name").is_none());
    }
}
