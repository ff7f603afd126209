use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::Result;

static UA_DUMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^user-agent\s*\r?\n(.+)$").unwrap());
static COOKIE_DUMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)\bcookie\s*\r?\n(.+?)\r?\n(?:priority|referer|sec-ch-ua|user-agent|upgrade-insecure-requests|\})",
    )
    .unwrap()
});
static XSRF_DUMP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^x-xsrf-token\s*\r?\n(.+)$").unwrap());

/// Browser identity captured from an earlier session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    pub user_agent: String,
    pub cookie: String,
    pub xsrf_token: String,
}

impl Fingerprint {
    /// Read a fingerprint file. A missing file yields an empty fingerprint.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no fingerprint file");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `key` on one line, its value on the next. Falls back to scanning a raw
    /// request-header dump copied out of devtools.
    pub fn parse(text: &str) -> Self {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let find_value = |key: &str| -> String {
            lines
                .windows(2)
                .find(|w| w[0].eq_ignore_ascii_case(key))
                .map(|w| w[1].to_string())
                .unwrap_or_default()
        };
        let from_dump = |re: &Regex| -> String {
            re.captures(text)
                .map(|c| c[1].trim().to_string())
                .unwrap_or_default()
        };

        let mut fp = Fingerprint {
            user_agent: find_value("user-agent"),
            cookie: find_value("cookie"),
            xsrf_token: find_value("x-xsrf-token"),
        };
        if fp.user_agent.is_empty() {
            fp.user_agent = from_dump(&UA_DUMP_RE);
        }
        if fp.cookie.is_empty() {
            fp.cookie = from_dump(&COOKIE_DUMP_RE);
        }
        if fp.xsrf_token.is_empty() {
            fp.xsrf_token = from_dump(&XSRF_DUMP_RE);
        }
        fp
    }

    pub fn to_file_format(&self) -> String {
        format!(
            "user-agent\n{}\ncookie\n{}\nx-xsrf-token\n{}\n",
            self.user_agent, self.cookie, self.xsrf_token
        )
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_file_format())?;
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.user_agent.is_empty() && self.cookie.is_empty() && self.xsrf_token.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_own_format() {
        let fp = Fingerprint {
            user_agent: "Mozilla/5.0 Test".into(),
            cookie: "a=1; XSRF-TOKEN=tok".into(),
            xsrf_token: "tok".into(),
        };
        assert_eq!(Fingerprint::parse(&fp.to_file_format()), fp);
    }

    #[test]
    fn parses_header_dump() {
        let dump = "accept\n*/*\nCookie\n\nsid=9; lang=zh\npriority\nu=1\nUser-Agent \nMozilla/5.0 Dump\n";
        let fp = Fingerprint::parse(dump);
        assert_eq!(fp.cookie, "sid=9; lang=zh");
        assert_eq!(fp.user_agent, "Mozilla/5.0 Dump");
        assert!(fp.xsrf_token.is_empty());
    }

    #[test]
    fn missing_file_is_empty() {
        let fp = Fingerprint::load(Path::new("does/not/exist.txt")).unwrap();
        assert!(fp.is_empty());
    }
}
