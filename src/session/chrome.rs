use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use headless_chrome::protocol::cdp::Network;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{CapturedResponse, Fingerprint, Session, SessionConfig};
use crate::error::{Result, ScrapeError};

/// `headless_chrome` tab with every XHR/JSON response buffered for later
/// inspection.
pub struct ChromeSession {
    _browser: Browser,
    tab: Arc<Tab>,
    captured: Arc<Mutex<Vec<CapturedResponse>>>,
    config: SessionConfig,
}

impl ChromeSession {
    pub fn launch(config: SessionConfig) -> Result<Self> {
        let mut args: Vec<OsString> = vec![
            "--disable-blink-features=AutomationControlled".into(),
            "--disable-gpu".into(),
            "--no-sandbox".into(),
            "--disable-dev-shm-usage".into(),
        ];
        if config.use_fingerprint && !config.fingerprint.user_agent.is_empty() {
            args.push(format!("--user-agent={}", config.fingerprint.user_agent).into());
        }
        let arg_refs: Vec<&OsStr> = args.iter().map(|a| a.as_os_str()).collect();

        let browser = Browser::new(LaunchOptions {
            headless: config.headless,
            args: arg_refs,
            ..Default::default()
        })
        .map_err(|e| ScrapeError::SessionLost(format!("launch: {}", e)))?;
        let tab = browser
            .new_tab()
            .map_err(|e| ScrapeError::SessionLost(format!("new tab: {}", e)))?;
        tab.set_default_timeout(config.page_load_timeout);

        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&captured);
        tab.register_response_handling(
            "capture",
            Box::new(move |event, fetch_body| {
                let response = &event.response;
                let url = response.url.clone();
                let mime_type = response.mime_type.clone();
                let wants_body = mime_type.to_lowercase().contains("json")
                    || url.contains("/api/")
                    || url.contains("search");
                let (body, base64_encoded) = if wants_body {
                    match fetch_body() {
                        Ok(b) => (Some(b.body), b.base_64_encoded),
                        Err(_) => (None, false),
                    }
                } else {
                    (None, false)
                };
                if let Ok(mut buf) = sink.lock() {
                    buf.push(CapturedResponse {
                        url,
                        status: response.status as u32,
                        mime_type,
                        body,
                        base64_encoded,
                    });
                }
            }),
        )
        .map_err(|e| ScrapeError::SessionLost(format!("response capture: {}", e)))?;

        let session = Self {
            _browser: browser,
            tab,
            captured,
            config,
        };

        let token = session.config.fingerprint.xsrf_token.clone();
        if session.config.use_fingerprint && !token.is_empty() {
            session.set_extra_headers(&[("x-xsrf-token".to_string(), token)])?;
        }
        info!(headless = session.config.headless, fingerprint = session.config.use_fingerprint, "browser ready");
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Read the live user agent and cookie jar back out of the browser.
    pub fn capture_fingerprint(&self) -> Result<Fingerprint> {
        let user_agent = self
            .evaluate("navigator.userAgent")?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let cookies = self
            .tab
            .get_cookies()
            .map_err(|e| ScrapeError::from_driver("cookies", e))?;
        let xsrf_token = cookies
            .iter()
            .find(|c| c.name == "XSRF-TOKEN")
            .map(|c| c.value.clone())
            .unwrap_or_default();
        let cookie = cookies
            .iter()
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ");
        Ok(Fingerprint {
            user_agent,
            cookie,
            xsrf_token,
        })
    }
}

impl Session for ChromeSession {
    fn navigate(&mut self, url: &str) -> Result<()> {
        let settle = self.config.settle_delay;
        self.navigate_with_delay(url, settle)
    }

    fn navigate_with_delay(&mut self, url: &str, settle: Duration) -> Result<()> {
        if let Ok(mut buf) = self.captured.lock() {
            buf.clear();
        }
        debug!(url, "navigating");
        self.tab
            .navigate_to(url)
            .map_err(|e| ScrapeError::from_driver(url, e))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| ScrapeError::from_driver(url, e))?;
        std::thread::sleep(settle);
        Ok(())
    }

    fn page_source(&self) -> Result<String> {
        self.tab
            .get_content()
            .map_err(|e| ScrapeError::from_driver(&self.tab.get_url(), e))
    }

    fn take_responses(&mut self) -> Vec<CapturedResponse> {
        self.captured
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    fn select_texts(&self, css: &str) -> Result<Vec<String>> {
        // No match is an ordinary outcome, not an error.
        match self.tab.find_elements(css) {
            Ok(elements) => Ok(elements
                .iter()
                .filter_map(|el| el.get_inner_text().ok())
                .collect()),
            Err(_) => Ok(Vec::new()),
        }
    }

    fn evaluate(&self, script: &str) -> Result<Value> {
        let remote = self
            .tab
            .evaluate(script, false)
            .map_err(|e| ScrapeError::from_driver(&self.tab.get_url(), e))?;
        Ok(remote.value.unwrap_or(Value::Null))
    }

    fn add_cookies(&self, cookies: &[(String, String)], domain: &str) -> Result<()> {
        for (name, value) in cookies {
            let result = self.tab.call_method(Network::SetCookie {
                name: name.clone(),
                value: value.clone(),
                url: None,
                domain: Some(domain.to_string()),
                path: Some("/".to_string()),
                secure: None,
                http_only: None,
                same_site: None,
                expires: None,
                priority: None,
                same_party: None,
                source_scheme: None,
                source_port: None,
                partition_key: None,
            });
            if let Err(e) = result {
                warn!(cookie = %name, error = %e, "cookie rejected");
            }
        }
        Ok(())
    }

    fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<()> {
        let map: HashMap<&str, &str> = headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.tab
            .set_extra_http_headers(map)
            .map_err(|e| ScrapeError::from_driver("headers", e))?;
        Ok(())
    }
}
