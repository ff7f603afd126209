use std::sync::LazyLock;
use std::time::Duration;

use chrono::Local;
use rand::Rng;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::normalize::{collapse_whitespace, dedupe_preserving_order, normalize_logo_url};
use super::record::{CandidateRecord, JobRecord};
use super::salary::parse_salary;
use crate::error::Result;
use crate::session::Session;
use crate::sites::SiteProfile;
use crate::skills::SkillLibrary;

const SECURITY_MARKERS: &[&str] = &[
    "security verification",
    "captcha.eo.gtimg.com",
    "teocaptchawidget",
    "cap_union_prehandle",
    "请完成安全验证",
    "安全验证",
];

const DESCRIPTION_JSON_KEYS: &[&str] =
    &["jobSummary", "jobDescription", "positionDetail", "description", "duty"];
const DESCRIPTION_LABELS: &[&str] = &["职位描述", "岗位职责", "任职要求"];
const LABEL_BLOCK_CHARS: usize = 2500;
const MIN_DESCRIPTION_CHARS: usize = 20;

/// Fixed vocabulary scanned for in descriptions, case-insensitively.
pub const COMMON_SKILLS: &[&str] = &[
    "Java",
    "Spring",
    "Spring Boot",
    "Spring Cloud",
    "MySQL",
    "Redis",
    "Kafka",
    "RocketMQ",
    "RabbitMQ",
    "Oracle",
    "SQL",
    "Linux",
    "Docker",
    "Kubernetes",
    "JVM",
    "Go",
    "Python",
    "C++",
    "JavaScript",
    "TypeScript",
    "Vue",
    "React",
    "微服务",
    "分布式",
];
const MAX_VOCAB_SKILLS: usize = 8;
const MAX_PHRASE_SKILLS: usize = 4;
const FALLBACK_SKILLS: usize = 4;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static BR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static JSON_KEY_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DESCRIPTION_JSON_KEYS
        .iter()
        .map(|key| Regex::new(&format!(r#"(?is)"{}"\s*:\s*"((?:[^"\\]|\\.)*)""#, key)).unwrap())
        .collect()
});

/// A challenge page, unless every expected-content marker of the site is
/// present as well.
pub fn is_security_page(html: &str, site: &SiteProfile) -> bool {
    let lower = html.to_lowercase();
    if !SECURITY_MARKERS.iter().any(|m| lower.contains(m)) {
        return false;
    }
    let has_content = !site.content_markers.is_empty()
        && site.content_markers.iter().all(|m| lower.contains(m));
    !has_content
}

/// The detail page loaded but the posting has been taken down.
pub fn is_unavailable_page(html: &str, site: &SiteProfile) -> bool {
    site.unavailable_markers.iter().any(|m| html.contains(m))
}

/// Longest text among the site's description selectors in the live page,
/// else whatever the raw HTML yields.
pub fn extract_description_from_page(session: &dyn Session, html: &str, site: &SiteProfile) -> String {
    let best = site
        .description_selectors
        .iter()
        .filter_map(|css| session.select_texts(css).ok())
        .flatten()
        .map(|t| clean_description(&t))
        .max_by_key(|t| t.chars().count())
        .unwrap_or_default();

    if best.chars().count() >= MIN_DESCRIPTION_CHARS {
        return best;
    }
    extract_description_from_html(html, site)
}

/// Description from page markup alone: description selectors, then JSON
/// keys embedded in scripts, then the block following a section label.
pub fn extract_description_from_html(html: &str, site: &SiteProfile) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let long_enough = |t: &String| t.chars().count() >= MIN_DESCRIPTION_CHARS;

    let doc = Html::parse_document(html);
    let from_markup = site
        .description_selectors
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .flat_map(|sel| {
            doc.select(&sel)
                .map(|el| clean_description(&el.text().collect::<Vec<_>>().join("\n")))
                .collect::<Vec<_>>()
        })
        .max_by_key(|t| t.chars().count())
        .filter(long_enough);
    if let Some(text) = from_markup {
        return text;
    }

    let from_json = JSON_KEY_RES
        .iter()
        .filter_map(|re| re.captures(html))
        .map(|caps| {
            let raw = &caps[1];
            let decoded = serde_json::from_str::<String>(&format!("\"{}\"", raw))
                .unwrap_or_else(|_| raw.to_string());
            clean_description(&strip_tags(&decoded))
        })
        .find(long_enough);
    if let Some(text) = from_json {
        return text;
    }

    DESCRIPTION_LABELS
        .iter()
        .filter_map(|label| {
            let start = html.find(label)?;
            let block: String = html[start..]
                .chars()
                .take(label.chars().count() + LABEL_BLOCK_CHARS)
                .collect();
            Some(collapse_whitespace(&strip_tags(&block)))
        })
        .find(long_enough)
        .unwrap_or_default()
}

fn strip_tags(html: &str) -> String {
    let with_breaks = BR_RE.replace_all(html, "\n");
    TAG_RE.replace_all(&with_breaks, " ").into_owned()
}

/// Trim every line, drop blank ones and a leading "职位介绍" heading.
fn clean_description(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.first() == Some(&"职位介绍") {
        lines.remove(0);
    }
    lines.join("\n")
}

/// Vocabulary terms found in the description, else its short lines.
pub fn skills_from_description(description: &str) -> Vec<String> {
    let text = description.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let lower = text.to_lowercase();
    let found: Vec<String> = COMMON_SKILLS
        .iter()
        .filter(|term| lower.contains(&term.to_lowercase()))
        .take(MAX_VOCAB_SKILLS)
        .map(|term| term.to_string())
        .collect();
    if !found.is_empty() {
        return found;
    }

    text.lines()
        .map(|line| line.trim_matches(|c| matches!(c, ' ' | '：' | ':' | ';' | '；' | '-')))
        .filter(|line| (2..=60).contains(&line.chars().count()))
        .take(MAX_PHRASE_SKILLS)
        .map(str::to_string)
        .collect()
}

/// What a job's detail page yielded.
#[derive(Debug, PartialEq)]
pub enum DetailPage {
    Description(String),
    /// The posting is gone; revisiting will not help.
    Offline,
    /// Not loaded, challenged or empty. Worth another try.
    Unusable,
}

impl DetailPage {
    pub fn into_description(self) -> Option<String> {
        match self {
            DetailPage::Description(text) => Some(text),
            _ => None,
        }
    }
}

/// Load the detail page for `url`. Only a lost session is an error.
pub fn fetch_detail_description(
    session: &mut dyn Session,
    url: &str,
    site: &SiteProfile,
    wait: Duration,
) -> Result<DetailPage> {
    let loaded = session
        .navigate_with_delay(url, wait)
        .and_then(|_| session.page_source());
    let html = match loaded {
        Ok(html) => html,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            debug!(url, error = %e, "detail page unavailable");
            return Ok(DetailPage::Unusable);
        }
    };

    if is_security_page(&html, site) {
        warn!(url, "security verification on detail page");
        return Ok(DetailPage::Unusable);
    }
    if is_unavailable_page(&html, site) {
        debug!(url, "job is offline");
        return Ok(DetailPage::Offline);
    }
    let description = extract_description_from_page(&*session, &html, site);
    if description.is_empty() {
        Ok(DetailPage::Unusable)
    } else {
        Ok(DetailPage::Description(description))
    }
}

/// Turns candidates into persisted rows, filling skills through the
/// detail page, the description and finally the skill library.
pub struct Finalizer<'a> {
    pub site: &'static SiteProfile,
    pub keyword: &'a str,
    pub library: &'a SkillLibrary,
    pub fetch_details: bool,
    pub detail_wait: Duration,
}

impl Finalizer<'_> {
    pub fn finalize<R: Rng + ?Sized>(
        &self,
        session: &mut dyn Session,
        candidate: CandidateRecord,
        rng: &mut R,
    ) -> Result<JobRecord> {
        let mut skills = candidate.skills;
        let mut description = candidate.description;

        if skills.is_empty() && self.fetch_details {
            if let Some(detail) =
                fetch_detail_description(session, &candidate.job_url, self.site, self.detail_wait)?
                    .into_description()
            {
                description = detail;
            }
        }
        if skills.is_empty() {
            skills = skills_from_description(&description);
        }
        if skills.is_empty() {
            skills = self
                .library
                .pick_fallback(self.keyword, &candidate.title, FALLBACK_SKILLS, rng);
            debug!(url = %candidate.job_url, picked = skills.len(), "fallback skills");
        }

        let range = parse_salary(&candidate.salary).unwrap_or_default();

        Ok(JobRecord {
            title: candidate.title,
            company: candidate.company,
            salary: candidate.salary,
            salary_min: range.min,
            salary_max: range.max,
            salary_avg: range.avg,
            location: candidate.location,
            experience: candidate.experience,
            education: candidate.education,
            industry: candidate.industry,
            job_type: candidate.job_type,
            company_nature: candidate.company_nature,
            company_size: candidate.company_size,
            job_url: candidate.job_url,
            skills: dedupe_preserving_order(skills),
            source: candidate.source,
            company_logo: normalize_logo_url(&candidate.company_logo, self.site.image_host),
            crawl_date: Local::now().naive_local(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use crate::session::fake::FakeSession;
    use crate::sites::{Source, LIEPIN, ZHILIAN};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DETAIL: &str = "https://jobs.zhaopin.com/CC1.htm";

    fn finalizer(library: &SkillLibrary) -> Finalizer<'_> {
        Finalizer {
            site: &ZHILIAN,
            keyword: "java",
            library,
            fetch_details: true,
            detail_wait: Duration::ZERO,
        }
    }

    fn candidate() -> CandidateRecord {
        let mut c = CandidateRecord::bare(Source::Zhilian, DETAIL.to_string());
        c.title = "后端开发".into();
        c.salary = "1万-1.5万·13薪".into();
        c
    }

    #[test]
    fn security_page_detection() {
        assert!(is_security_page("<div>请完成安全验证</div>", &ZHILIAN));
        assert!(is_security_page("<script src=//captcha.eo.gtimg.com/x.js>", &LIEPIN));
        assert!(!is_security_page("<html>normal</html>", &ZHILIAN));
        let leaked = "安全验证 window.__INITIAL_STATE__ = {\"positionURL\": \"x\"}";
        assert!(!is_security_page(leaked, &ZHILIAN));
        assert!(is_security_page("安全验证 __INITIAL_STATE__", &ZHILIAN));
    }

    #[test]
    fn vocabulary_then_phrases() {
        assert_eq!(
            skills_from_description("熟悉 java 与 REDIS 缓存"),
            vec!["Java", "Redis"]
        );
        let text = "- 负责支付系统设计：\n  参与需求评审\n\n x\n 编写文档；";
        assert_eq!(
            skills_from_description(text),
            vec!["负责支付系统设计", "参与需求评审", "编写文档"]
        );
        assert!(skills_from_description("   ").is_empty());
    }

    #[test]
    fn vocabulary_capped() {
        let text = "Java Spring Spring Boot Spring Cloud MySQL Redis Kafka RocketMQ RabbitMQ Oracle";
        assert_eq!(skills_from_description(text).len(), 8);
    }

    #[test]
    fn description_from_json_key() {
        let html = r#"<script>var d = {"jobSummary":"岗位要求：\n熟悉Java和Redis，有高并发经验优先考虑。"}</script>"#;
        let desc = extract_description_from_html(html, &ZHILIAN);
        assert!(desc.starts_with("岗位要求："));
        assert!(desc.contains("Redis"));
    }

    #[test]
    fn description_from_label_block() {
        let html = "<div><h3>职位描述</h3><p>负责核心交易链路的开发与维护，保障线上稳定运行。</p></div>";
        let desc = extract_description_from_html(html, &LIEPIN);
        assert!(desc.starts_with("职位描述"));
        assert!(desc.contains("核心交易链路"));
        assert!(!desc.contains('<'));
    }

    #[test]
    fn description_from_selector_drops_heading() {
        let html = "<dl><dd data-selector=\"job-intro-content\">职位介绍<br>负责推荐系统的召回与排序模块设计开发及线上效果优化</dd></dl>";
        let desc = extract_description_from_html(html, &LIEPIN);
        assert_eq!(desc, "负责推荐系统的召回与排序模块设计开发及线上效果优化");
    }

    #[test]
    fn short_descriptions_rejected() {
        assert_eq!(extract_description_from_html("<p>职位描述 短</p>", &ZHILIAN), "");
        assert_eq!(extract_description_from_html("", &ZHILIAN), "");
    }

    #[test]
    fn detail_page_feeds_skills() {
        let page = "<div class=\"describtion\">任职要求：精通 Kafka 消息队列，熟悉 Docker 部署流程</div>";
        let mut session = FakeSession::default().with_page(DETAIL, page);
        let lib = SkillLibrary::default();
        let mut rng = StdRng::seed_from_u64(0);
        let rec = finalizer(&lib).finalize(&mut session, candidate(), &mut rng).unwrap();
        assert_eq!(rec.skills, vec!["Kafka", "Docker"]);
        assert_eq!((rec.salary_min, rec.salary_max, rec.salary_avg), (10.0, 15.0, 12.5));
        assert_eq!(session.visited, vec![DETAIL]);
    }

    #[test]
    fn existing_skills_skip_detail_fetch() {
        let mut session = FakeSession::default();
        let mut c = candidate();
        c.skills = vec!["Go".into(), "Go".into(), "gRPC".into()];
        c.salary = "面议".into();
        let lib = SkillLibrary::default();
        let rec = finalizer(&lib)
            .finalize(&mut session, c, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert!(session.visited.is_empty());
        assert_eq!(rec.skills, vec!["Go", "gRPC"]);
        assert_eq!((rec.salary_min, rec.salary_max, rec.salary_avg), (0.0, 0.0, 0.0));
    }

    #[test]
    fn failed_detail_falls_back_to_library() {
        let mut session = FakeSession::default();
        let lib = SkillLibrary::from_topics([("java", vec!["JVM".to_string(), "Netty".to_string()])]);
        let rec = finalizer(&lib)
            .finalize(&mut session, candidate(), &mut StdRng::seed_from_u64(0))
            .unwrap();
        let mut skills = rec.skills.clone();
        skills.sort();
        assert_eq!(skills, vec!["JVM", "Netty"]);
    }

    #[test]
    fn security_detail_keeps_embedded_description() {
        let mut session = FakeSession::default().with_page(DETAIL, "<p>请完成安全验证</p>");
        let mut c = candidate();
        c.description = "使用 Python 做数据处理".into();
        let lib = SkillLibrary::default();
        let rec = finalizer(&lib)
            .finalize(&mut session, c, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(rec.skills, vec!["Python"]);
    }

    #[test]
    fn lost_session_is_propagated() {
        let mut session = FakeSession::default().with_lost_session(DETAIL);
        let lib = SkillLibrary::default();
        let err = finalizer(&lib)
            .finalize(&mut session, candidate(), &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, ScrapeError::SessionLost(_)));
    }

    #[test]
    fn detail_pages_are_classified() {
        let offline = "https://www.liepin.com/job/9.shtml";
        let live = "https://www.liepin.com/job/10.shtml";
        let mut session = FakeSession::default()
            .with_page(offline, "<div>该职位已下线</div>")
            .with_page(live, "<dd data-selector=\"job-intro-content\">负责推荐系统开发，熟悉 Python 与 Spark 生态</dd>");

        let fetch = |s: &mut FakeSession, url: &str| fetch_detail_description(s, url, &LIEPIN, Duration::ZERO).unwrap();
        assert_eq!(fetch(&mut session, offline), DetailPage::Offline);
        assert_eq!(fetch(&mut session, "https://www.liepin.com/job/11.shtml"), DetailPage::Unusable);
        assert!(matches!(fetch(&mut session, live), DetailPage::Description(d) if d.contains("Spark")));
    }
}
