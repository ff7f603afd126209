pub mod chrome;
pub mod fingerprint;

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;

use crate::error::Result;
pub use chrome::ChromeSession;
pub use fingerprint::Fingerprint;

/// A network response observed during the last page load.
#[derive(Debug, Clone, Default)]
pub struct CapturedResponse {
    pub url: String,
    pub status: u32,
    pub mime_type: String,
    /// `None` when the body could not be retrieved.
    pub body: Option<String>,
    pub base64_encoded: bool,
}

impl CapturedResponse {
    /// Body as text, base64-decoded when flagged.
    pub fn decoded_body(&self) -> Option<String> {
        let body = self.body.as_ref()?;
        if !self.base64_encoded {
            return Some(body.clone());
        }
        let bytes = BASE64.decode(body.trim()).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Immutable browser settings, fixed before the session starts.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub headless: bool,
    pub use_fingerprint: bool,
    pub fingerprint: Fingerprint,
    pub page_load_timeout: Duration,
    /// Pause after navigation so late XHRs land in the capture buffer.
    pub settle_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: false,
            use_fingerprint: false,
            fingerprint: Fingerprint::default(),
            page_load_timeout: Duration::from_secs(35),
            settle_delay: Duration::from_secs(3),
        }
    }
}

/// What the scraper needs from a browser.
pub trait Session {
    /// Load `url`, wait for it and the settle delay. Clears captured responses.
    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Same as `navigate` with a caller-chosen settle delay.
    fn navigate_with_delay(&mut self, url: &str, settle: Duration) -> Result<()>;

    fn page_source(&self) -> Result<String>;

    /// Responses captured since the last navigation, draining the buffer.
    fn take_responses(&mut self) -> Vec<CapturedResponse>;

    /// Inner text of every element matching `css`.
    fn select_texts(&self, css: &str) -> Result<Vec<String>>;

    fn evaluate(&self, script: &str) -> Result<Value>;

    fn add_cookies(&self, cookies: &[(String, String)], domain: &str) -> Result<()>;

    fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<()>;
}

/// Split a `name=value; name2=value2` header into pairs.
pub fn parse_cookie_header(cookie: &str) -> Vec<(String, String)> {
    cookie
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_header_pairs() {
        let pairs = parse_cookie_header("a=1; b = two ;broken; =x; c=d=e");
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "two".to_string()),
                ("c".to_string(), "d=e".to_string()),
            ]
        );
    }

    #[test]
    fn base64_bodies_are_decoded() {
        let resp = CapturedResponse {
            body: Some(BASE64.encode("{\"ok\":true}")),
            base64_encoded: true,
            ..Default::default()
        };
        assert_eq!(resp.decoded_body().as_deref(), Some("{\"ok\":true}"));

        let plain = CapturedResponse {
            body: Some("x".into()),
            ..Default::default()
        };
        assert_eq!(plain.decoded_body().as_deref(), Some("x"));
        assert_eq!(CapturedResponse::default().decoded_body(), None);
    }
}
