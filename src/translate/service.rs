//! Reasoning service boundary.
//!
//! The service turns a prompt into free text. It is the only external,
//! non-deterministic collaborator, and everything it returns is treated as
//! untrusted input by the grammar in [`super::grammar`].
//!
//! [`ChatCompletionsService`] talks to any OpenAI-compatible
//! `/chat/completions` endpoint over blocking HTTP.

use std::io::Read;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from the reasoning service boundary.
///
/// All of these abort the adjustment cycle as "service unavailable"; the
/// store is never touched.
#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum ServiceError {
    #[error("no credential for the reasoning service: ${env} is not set")]
    #[diagnostic(
        code(tuner::service::missing_credential),
        help("Export the API key in the environment, e.g. `export {env}=sk-...`.")
    )]
    MissingCredential { env: String },

    #[error("reasoning service request failed: {message}")]
    #[diagnostic(
        code(tuner::service::request_failed),
        help("Check network connectivity, the configured base_url, and that the model name is valid.")
    )]
    Request { message: String },

    #[error("reasoning service did not answer within {timeout_ms}ms")]
    #[diagnostic(
        code(tuner::service::timeout),
        help("Retry, or pass a longer timeout.")
    )]
    Timeout { timeout_ms: u128 },

    #[error("malformed reasoning service response: {message}")]
    #[diagnostic(
        code(tuner::service::malformed),
        help("The endpoint did not return a chat completion. Check that base_url points at an OpenAI-compatible API.")
    )]
    MalformedResponse { message: String },
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// One prompt for the reasoning service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningRequest {
    /// Role and output-format contract.
    pub system: String,
    /// Current parameters and the user's instruction.
    pub user: String,
}

/// A blocking, single round-trip text completion service.
pub trait ReasoningService: Send + Sync {
    /// Send one request and return the raw response text.
    ///
    /// Implementations should give up after `timeout`; callers enforce the
    /// deadline independently as well.
    fn complete(&self, request: &ReasoningRequest, timeout: Duration) -> ServiceResult<String>;

    /// Whether the service is configured well enough to attempt a call.
    fn is_available(&self) -> bool {
        true
    }
}

/// Connection settings for [`ChatCompletionsService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// API root, without the trailing `/chat/completions`.
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Environment variable the API key is read from.
    pub api_key_env: String,
    /// Upper bound on the completion text the caller will parse.
    pub max_response_bytes: usize,
    /// Transport timeout for one request. A shorter caller deadline wins.
    pub timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4".into(),
            temperature: 0.7,
            api_key_env: "OPENAI_API_KEY".into(),
            max_response_bytes: 64 * 1024,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Extra body bytes allowed on top of the escaped completion text for the
/// JSON envelope.
const ENVELOPE_SLACK: usize = 16 * 1024;

/// Worst-case bytes per completion byte once JSON-escaped (`\u0001`).
const ESCAPE_FACTOR: usize = 6;

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct ChatCompletionsService {
    config: ServiceConfig,
    api_key: Option<String>,
}

impl ChatCompletionsService {
    /// Create a client, reading the API key from the configured environment
    /// variable. A missing key is reported on the first call, not here.
    pub fn from_env(config: ServiceConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(env = %config.api_key_env, "reasoning service API key not set");
        }
        Self { config, api_key }
    }

    /// Create a client with an explicit key.
    pub fn with_key(config: ServiceConfig, api_key: Option<String>) -> Self {
        Self { config, api_key }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn body_limit(&self) -> u64 {
        self.config
            .max_response_bytes
            .saturating_mul(ESCAPE_FACTOR)
            .saturating_add(ENVELOPE_SLACK) as u64
    }
}

impl ReasoningService for ChatCompletionsService {
    fn complete(&self, request: &ReasoningRequest, timeout: Duration) -> ServiceResult<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ServiceError::MissingCredential {
                env: self.config.api_key_env.clone(),
            });
        };

        let timeout = timeout.min(self.config.timeout);
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();

        let body = serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "stream": false,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        });
        let body_str = serde_json::to_string(&body).map_err(|e| ServiceError::Request {
            message: format!("JSON serialize error: {e}"),
        })?;

        tracing::debug!(
            model = %self.config.model,
            bytes = body_str.len(),
            timeout_ms = timeout.as_millis(),
            "calling reasoning service"
        );

        let resp = agent
            .post(&self.endpoint())
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {api_key}"))
            .send_string(&body_str)
            .map_err(|e| classify_error(e, timeout))?;

        let limit = self.body_limit();
        let mut bytes = Vec::new();
        resp.into_reader()
            .take(limit)
            .read_to_end(&mut bytes)
            .map_err(|e| {
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) {
                    ServiceError::Timeout {
                        timeout_ms: timeout.as_millis(),
                    }
                } else {
                    ServiceError::MalformedResponse {
                        message: e.to_string(),
                    }
                }
            })?;

        let capped = bytes.len() as u64 >= limit;
        decode_body(&bytes, capped)
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

impl std::fmt::Debug for ChatCompletionsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsService")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn classify_error(err: ureq::Error, timeout: Duration) -> ServiceError {
    match err {
        ureq::Error::Status(code, resp) => {
            let detail = resp.into_string().unwrap_or_default();
            let detail: String = detail.chars().take(200).collect();
            ServiceError::Request {
                message: format!("server returned status {code}: {detail}"),
            }
        }
        ureq::Error::Transport(t) => {
            if is_timeout(&t) {
                ServiceError::Timeout {
                    timeout_ms: timeout.as_millis(),
                }
            } else {
                ServiceError::Request {
                    message: t.to_string(),
                }
            }
        }
    }
}

fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = err.source();
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        source = e.source();
    }
    false
}

/// Turn a (possibly cut) response body into completion text.
///
/// A body cut at the read limit is no longer valid JSON; in that case the
/// readable prefix of the content string is returned so the caller can
/// truncate it to whole lines.
fn decode_body(bytes: &[u8], capped: bool) -> ServiceResult<String> {
    let raw = match std::str::from_utf8(bytes) {
        Ok(raw) => raw,
        Err(e) if capped => std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        Err(e) => {
            return Err(ServiceError::MalformedResponse {
                message: e.to_string(),
            });
        }
    };

    match extract_content(raw) {
        Err(err) if capped => {
            let partial = content_prefix(raw).ok_or(err)?;
            tracing::warn!(
                body_bytes = raw.len(),
                content_bytes = partial.len(),
                "response body hit the read limit, keeping the content prefix"
            );
            Ok(partial)
        }
        other => other,
    }
}

/// Pull `choices[0].message.content` out of a chat completion body.
fn extract_content(raw: &str) -> ServiceResult<String> {
    let json: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ServiceError::MalformedResponse {
            message: e.to_string(),
        })?;

    json["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| ServiceError::MalformedResponse {
            message: "missing 'choices[0].message.content' field".into(),
        })
}

/// Decode the `content` string of the first choice from a body that ends
/// early, stopping at the cut or at the closing quote.
fn content_prefix(raw: &str) -> Option<String> {
    let rest = &raw[raw.find("\"choices\"")?..];
    let rest = &rest[rest.find("\"content\"")? + "\"content\"".len()..];
    let rest = rest.trim_start().strip_prefix(':')?.trim_start();
    let rest = rest.strip_prefix('"')?;
    Some(decode_string_prefix(rest))
}

/// Decode JSON string text up to the closing quote or the first incomplete
/// escape.
fn decode_string_prefix(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        let decoded = match c {
            '"' => break,
            '\\' => match chars.next() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some('b') => '\u{8}',
                Some('f') => '\u{c}',
                Some(c @ ('"' | '\\' | '/')) => c,
                Some('u') => match unicode_escape(&mut chars) {
                    Some(c) => c,
                    None => break,
                },
                _ => break,
            },
            c => c,
        };
        out.push(decoded);
    }
    out
}

/// Decode the rest of a `\uXXXX` escape, including a surrogate pair.
fn unicode_escape(chars: &mut std::str::Chars<'_>) -> Option<char> {
    let high = hex_unit(chars)?;
    if !(0xD800..0xDC00).contains(&high) {
        return char::from_u32(u32::from(high));
    }
    if chars.next()? != '\\' || chars.next()? != 'u' {
        return None;
    }
    let low = hex_unit(chars)?;
    char::decode_utf16([high, low]).next()?.ok()
}

fn hex_unit(chars: &mut std::str::Chars<'_>) -> Option<u16> {
    let digits: String = chars.by_ref().take(4).collect();
    if digits.len() != 4 {
        return None;
    }
    u16::from_str_radix(&digits, 16).ok()
}
