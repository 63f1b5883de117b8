//! Generic HTTP webhook notifier.
//!
//! Posts each rendered notice as JSON, e.g. to a chat integration or a
//! ticketing endpoint.

use std::collections::HashMap;

use crate::traits::{Notification, Notifier, NotifyError};

/// Delivers notices as JSON over HTTP to a configured endpoint.
///
/// `${VAR_NAME}` references in the URL and header values are resolved at
/// construction time so secrets can stay in the environment.
#[derive(Debug)]
pub struct WebhookNotifier {
    url: String,
    method: reqwest::Method,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    /// Create a new webhook notifier. `method` defaults to `POST`.
    pub fn new(
        url: &str,
        method: Option<&str>,
        headers: HashMap<String, String>,
    ) -> Result<Self, NotifyError> {
        let method = match method {
            Some(m) => m
                .to_uppercase()
                .parse::<reqwest::Method>()
                .map_err(|_| NotifyError::Config(format!("invalid HTTP method: {m}")))?,
            None => reqwest::Method::POST,
        };

        let headers = headers
            .into_iter()
            .map(|(key, value)| Ok((key, resolve_env_vars(&value)?)))
            .collect::<Result<HashMap<_, _>, NotifyError>>()?;

        Ok(Self {
            url: resolve_env_vars(url)?,
            method,
            headers,
            client: reqwest::Client::new(),
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .json(notification);

        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(
                url = %self.url,
                %status,
                body = %body_text,
                "webhook returned non-2xx status"
            );
            return Err(NotifyError::Config(format!(
                "webhook returned {status}: {body_text}"
            )));
        }

        tracing::debug!(url = %self.url, %status, "webhook notice delivered");
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

/// Substitute `${VAR_NAME}` references from the process environment.
fn resolve_env_vars(input: &str) -> Result<String, NotifyError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after.find('}').ok_or_else(|| {
            NotifyError::Config(format!("unclosed env var reference in: {input}"))
        })?;
        let name = &after[..close];
        let value = std::env::var(name)
            .map_err(|_| NotifyError::Config(format!("env var not found: {name}")))?;
        out.push_str(&value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_substitutes() {
        std::env::set_var("GQ_WEBHOOK_TEST_HOST", "hooks.example.edu");
        std::env::set_var("GQ_WEBHOOK_TEST_TOKEN", "abc");
        let result =
            resolve_env_vars("https://${GQ_WEBHOOK_TEST_HOST}/t/${GQ_WEBHOOK_TEST_TOKEN}").unwrap();
        assert_eq!(result, "https://hooks.example.edu/t/abc");
        std::env::remove_var("GQ_WEBHOOK_TEST_HOST");
        std::env::remove_var("GQ_WEBHOOK_TEST_TOKEN");
    }

    #[test]
    fn resolve_env_vars_plain_string() {
        assert_eq!(
            resolve_env_vars("https://plain.example.edu/hook").unwrap(),
            "https://plain.example.edu/hook"
        );
    }

    #[test]
    fn resolve_env_vars_missing() {
        match resolve_env_vars("https://${GQ_ABSOLUTELY_NOT_SET}/hook").unwrap_err() {
            NotifyError::Config(msg) => assert!(msg.contains("GQ_ABSOLUTELY_NOT_SET")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn resolve_env_vars_unclosed() {
        match resolve_env_vars("https://${UNCLOSED/hook").unwrap_err() {
            NotifyError::Config(msg) => assert!(msg.contains("unclosed")),
            other => panic!("expected Config error, got: {other:?}"),
        }
    }

    #[test]
    fn method_defaults_to_post() {
        let notifier = WebhookNotifier::new("https://example.edu", None, HashMap::new()).unwrap();
        assert_eq!(notifier.method, reqwest::Method::POST);
        assert_eq!(notifier.channel_name(), "webhook");
    }

    #[test]
    fn method_is_case_insensitive() {
        let notifier =
            WebhookNotifier::new("https://example.edu", Some("put"), HashMap::new()).unwrap();
        assert_eq!(notifier.method, reqwest::Method::PUT);
    }

    #[test]
    fn invalid_method_is_rejected() {
        let result = WebhookNotifier::new("https://example.edu", Some("NOT A METHOD"), HashMap::new());
        assert!(result.is_err());
    }

    #[test]
    fn header_values_are_resolved() {
        std::env::set_var("GQ_WEBHOOK_API_KEY", "secret-key-123");
        let headers = HashMap::from([
            ("X-Api-Key".to_string(), "${GQ_WEBHOOK_API_KEY}".to_string()),
            ("X-Static".to_string(), "fixed".to_string()),
        ]);
        let notifier = WebhookNotifier::new("https://example.edu", None, headers).unwrap();
        assert_eq!(notifier.headers["X-Api-Key"], "secret-key-123");
        assert_eq!(notifier.headers["X-Static"], "fixed");
        std::env::remove_var("GQ_WEBHOOK_API_KEY");
    }
}
