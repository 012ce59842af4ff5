//! SMS gateway client implementation
//!
//! The gateway speaks a small SOAP dialect. The envelope is assembled by hand
//! and the response read with a tag scanner; the three fields we care about
//! (`ResultCode`, `MessageId`, `ErrorMessage`) do not warrant an XML stack.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument, warn};

use crate::error::{SmsError, SmsResult};
use crate::phone::normalize_phone_number;
use crate::templates::{AlertTemplate, TemplateVars, MAX_LMS_LENGTH};

/// Default SMS gateway endpoint
const SMS_GATEWAY_URL: &str = "https://sms.example.com/soap/v1";

/// SOAPAction header value for the send operation
const SOAP_ACTION: &str = "http://sms.example.com/api/SendSMS";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 100;

/// SMS gateway client
#[derive(Clone)]
pub struct SmsClient {
    http_client: Client,
    api_key: String,
    sender: String,
    gateway_url: String,
    max_retries: u32,
}

impl fmt::Debug for SmsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmsClient")
            .field("api_key", &"[REDACTED]")
            .field("sender", &self.sender)
            .field("gateway_url", &self.gateway_url)
            .finish()
    }
}

impl SmsClient {
    /// Create a new SMS client
    ///
    /// # Errors
    /// Returns `SmsError::NotConfigured` if the API key or sender is empty
    pub fn new(api_key: impl Into<String>, sender: impl Into<String>) -> SmsResult<Self> {
        let api_key = api_key.into();
        let sender = sender.into();
        if api_key.is_empty() || sender.is_empty() {
            return Err(SmsError::NotConfigured);
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .user_agent("Vitalink/1.0")
            .build()?;

        Ok(Self {
            http_client,
            api_key,
            sender,
            gateway_url: SMS_GATEWAY_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Create an SMS client from environment variables
    ///
    /// Reads `SMS_API_KEY`, `SMS_SENDER_NUMBER` and optionally
    /// `SMS_GATEWAY_URL`.
    ///
    /// # Errors
    /// Returns `SmsError::NotConfigured` if either required variable is unset
    /// or empty
    pub fn from_env() -> SmsResult<Self> {
        let api_key = std::env::var("SMS_API_KEY").unwrap_or_default();
        let sender = std::env::var("SMS_SENDER_NUMBER").unwrap_or_default();
        let mut client = Self::new(api_key, sender)?;
        if let Ok(url) = std::env::var("SMS_GATEWAY_URL") {
            if !url.is_empty() {
                client.gateway_url = url;
            }
        }
        Ok(client)
    }

    /// Override the gateway URL (test servers, regional gateways)
    pub fn with_gateway_url(mut self, gateway_url: impl Into<String>) -> Self {
        self.gateway_url = gateway_url.into();
        self
    }

    /// Send a templated guardian alert
    ///
    /// Returns the gateway message id when the gateway reports one.
    ///
    /// # Errors
    /// - `SmsError::InvalidPhoneNumber` - If the recipient fails normalization
    /// - `SmsError::Gateway` - If the gateway rejects the send
    /// - `SmsError::Http` - If the HTTP request fails
    #[instrument(skip(self, vars))]
    pub async fn send_alert(
        &self,
        phone: &str,
        template: AlertTemplate,
        vars: &TemplateVars,
    ) -> SmsResult<Option<String>> {
        let message = template.render(vars);
        self.send_message(phone, &message).await
    }

    /// Send a raw message
    pub async fn send_message(&self, phone: &str, message: &str) -> SmsResult<Option<String>> {
        let receiver = normalize_phone_number(phone)
            .ok_or_else(|| SmsError::InvalidPhoneNumber(phone.to_string()))?;

        if message.is_empty() {
            return Err(SmsError::InvalidMessage("empty message".to_string()));
        }
        if message.chars().count() > MAX_LMS_LENGTH {
            return Err(SmsError::InvalidMessage(format!(
                "message too long (max {} characters)",
                MAX_LMS_LENGTH
            )));
        }

        let envelope = self.build_envelope(&receiver, message);

        debug!(receiver = %receiver, length = message.chars().count(), "Sending SMS");

        let text = self
            .with_retry(|| async { self.post_envelope(&envelope).await })
            .await?;

        let message_id = parse_send_response(&text)?;
        debug!(receiver = %receiver, message_id = ?message_id, "SMS accepted by gateway");
        Ok(message_id)
    }

    fn build_envelope(&self, receiver: &str, message: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"
               xmlns:sms="http://sms.example.com/api">
    <soap:Header>
        <sms:AuthHeader>
            <sms:ApiKey>{}</sms:ApiKey>
        </sms:AuthHeader>
    </soap:Header>
    <soap:Body>
        <sms:SendSMS>
            <sms:Receiver>{}</sms:Receiver>
            <sms:Sender>{}</sms:Sender>
            <sms:Message>{}</sms:Message>
            <sms:MessageType>SMS</sms:MessageType>
        </sms:SendSMS>
    </soap:Body>
</soap:Envelope>"#,
            escape_xml(&self.api_key),
            escape_xml(receiver),
            escape_xml(&self.sender),
            escape_xml(message),
        )
    }

    async fn post_envelope(&self, envelope: &str) -> SmsResult<String> {
        let response = self
            .http_client
            .post(&self.gateway_url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", SOAP_ACTION)
            .body(envelope.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SmsError::Timeout
                } else {
                    SmsError::Http(e)
                }
            })?;

        let response = response.error_for_status().map_err(SmsError::Http)?;
        response.text().await.map_err(SmsError::Http)
    }

    /// Execute an operation with retry logic for transient failures
    async fn with_retry<T, F, Fut>(&self, operation: F) -> SmsResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = SmsResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay_ms = RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
                    warn!(
                        attempt = attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "SMS request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Parse the gateway's SOAP response.
///
/// `ResultCode` 0 means accepted; anything else carries an `ErrorMessage`.
fn parse_send_response(xml: &str) -> SmsResult<Option<String>> {
    let code = extract_tag(xml, "ResultCode")
        .ok_or_else(|| SmsError::ParseResponse("missing ResultCode".to_string()))?;

    if code.trim() == "0" {
        Ok(extract_tag(xml, "MessageId").map(|s| s.trim().to_string()))
    } else {
        let message = extract_tag(xml, "ErrorMessage")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        Err(SmsError::Gateway {
            code: code.trim().to_string(),
            message,
        })
    }
}

/// Extract the text content of the first element with the given local name,
/// with or without a namespace prefix.
fn extract_tag<'a>(xml: &'a str, local_name: &str) -> Option<&'a str> {
    let mut search_from = 0;
    while let Some(rel) = xml[search_from..].find('<') {
        let tag_start = search_from + rel;
        let rest = &xml[tag_start + 1..];
        let tag_end = rest.find('>')?;
        let tag = &rest[..tag_end];
        let name = tag.rsplit(':').next().unwrap_or(tag);
        if name == local_name {
            let content_start = tag_start + 1 + tag_end + 1;
            let close = xml[content_start..].find('<')?;
            return Some(&xml[content_start..content_start + close]);
        }
        search_from = tag_start + 1 + tag_end + 1;
    }
    None
}

/// Escape XML special characters
fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
