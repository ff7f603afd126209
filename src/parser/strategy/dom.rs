use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{PageContext, Strategy};
use crate::parser::normalize::{collapse_whitespace, normalize_logo_url};
use crate::parser::record::CandidateRecord;
use crate::sites::SiteProfile;

static SALARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:\.\d+)?(?:k|K|千|万)\s*[-~]\s*\d+(?:\.\d+)?(?:k|K|千|万)").unwrap()
});
static CITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("(北京|上海|广州|深圳|杭州|成都|武汉|西安|南京|苏州|重庆|天津|长沙|郑州|青岛|厦门)")
        .unwrap()
});
static COMPANY_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["[class*='company']", "a[href*='company']", "span"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});
static IMG_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());

const MAX_COMPANY_CHARS: usize = 40;

/// Last resort: job links in the rendered markup, with card fields guessed
/// from the surrounding container. Records are partial by nature.
pub struct DomHeuristics;

impl Strategy for DomHeuristics {
    fn name(&self) -> &'static str {
        "dom-heuristics"
    }

    fn collect(&self, page: &PageContext, site: &SiteProfile) -> Vec<CandidateRecord> {
        let doc = Html::parse_document(&page.html);
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for css in site.job_link_selectors {
            let Ok(selector) = Selector::parse(css) else {
                continue;
            };
            for anchor in doc.select(&selector) {
                let Some(job_url) = anchor.value().attr("href").and_then(|h| site.resolve_url(h))
                else {
                    continue;
                };
                let title = element_text(anchor);
                if title.chars().count() < 2 || !seen.insert(job_url.clone()) {
                    continue;
                }

                let mut record = CandidateRecord::bare(site.source, job_url);
                record.title = title;
                if let Some(card) = nearest_card(anchor) {
                    fill_from_card(&mut record, card, site);
                }
                records.push(record);
            }
        }
        records
    }
}

fn element_text(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// Closest enclosing `li` or `div`.
fn nearest_card(anchor: ElementRef) -> Option<ElementRef> {
    anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| matches!(el.value().name(), "li" | "div"))
}

fn fill_from_card(record: &mut CandidateRecord, card: ElementRef, site: &SiteProfile) {
    let card_text = element_text(card);

    if let Some(m) = SALARY_RE.find(&card_text) {
        record.salary = m.as_str().to_string();
    }
    if let Some(caps) = CITY_RE.captures(&card_text) {
        record.location = caps[1].to_string();
    }

    record.company = COMPANY_SELECTORS
        .iter()
        .find_map(|selector| {
            card.select(selector).map(element_text).find(|t| {
                !t.is_empty() && *t != record.title && t.chars().count() <= MAX_COMPANY_CHARS
            })
        })
        .unwrap_or_default();

    record.company_logo = card
        .select(&IMG_SELECTOR)
        .filter_map(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
        .map(|src| normalize_logo_url(src, site.image_host))
        .find(|src| !src.is_empty())
        .unwrap_or_default();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::{LIEPIN, ZHILIAN};

    fn page(html: &str) -> PageContext {
        PageContext {
            html: html.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn card_fields_guessed() {
        let html = r#"
        <ul>
          <li class="joblist-box">
            <a href="//jobs.zhaopin.com/CC100.htm">Java 后端开发</a>
            <div class="company-name">星河科技</div>
            <span>深圳·南山</span>
            <span>15k-25k</span>
            <img src="//img01.zhaopin.cn/logo/x.png">
          </li>
        </ul>"#;
        let recs = DomHeuristics.collect(&page(html), &ZHILIAN);
        assert_eq!(recs.len(), 1);
        let r = &recs[0];
        assert_eq!(r.job_url, "https://jobs.zhaopin.com/CC100.htm");
        assert_eq!(r.title, "Java 后端开发");
        assert_eq!(r.company, "星河科技");
        assert_eq!(r.salary, "15k-25k");
        assert_eq!(r.location, "深圳");
        assert_eq!(r.company_logo, "https://img01.zhaopin.cn/logo/x.png");
        assert!(r.skills.is_empty());
    }

    #[test]
    fn short_titles_foreign_and_repeated_links_dropped() {
        let html = r#"
        <div><a href="https://jobs.zhaopin.com/A.htm">后端工程师</a></div>
        <div><a href="https://jobs.zhaopin.com/A.htm">后端工程师</a></div>
        <div><a href="https://jobs.zhaopin.com/B.htm">x</a></div>
        <div><a href="https://example.com/job/C">前端工程师</a></div>"#;
        let recs = DomHeuristics.collect(&page(html), &ZHILIAN);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].job_url, "https://jobs.zhaopin.com/A.htm");
    }

    #[test]
    fn relative_liepin_links() {
        let html = r#"<div class="job-card"><a href="/job/1966.shtml">算法工程师</a>
            <span class="company-name">某AI公司</span> 北京 30k-50k</div>"#;
        let recs = DomHeuristics.collect(&page(html), &LIEPIN);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].job_url, "https://www.liepin.com/job/1966.shtml");
        assert_eq!(recs[0].company, "某AI公司");
        assert_eq!(recs[0].location, "北京");
        assert_eq!(recs[0].salary, "30k-50k");
    }

    #[test]
    fn empty_page() {
        assert!(DomHeuristics.collect(&page("<html></html>"), &ZHILIAN).is_empty());
    }
}
