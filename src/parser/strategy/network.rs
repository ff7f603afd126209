use serde_json::Value;
use tracing::debug;

use super::{records_from_objects, PageContext, Strategy};
use crate::parser::fields::iter_dicts;
use crate::parser::record::CandidateRecord;
use crate::session::CapturedResponse;
use crate::sites::SiteProfile;

/// Job objects inside search API responses captured during page load.
pub struct NetworkCapture;

impl Strategy for NetworkCapture {
    fn name(&self) -> &'static str {
        "network-capture"
    }

    fn collect(&self, page: &PageContext, site: &SiteProfile) -> Vec<CandidateRecord> {
        let bodies = api_bodies(&page.responses, site);
        records_from_objects(bodies.iter().flat_map(iter_dicts), site)
    }
}

/// Parsed JSON of every matching response. Unreadable or malformed bodies
/// are skipped.
pub fn api_bodies(responses: &[CapturedResponse], site: &SiteProfile) -> Vec<Value> {
    responses
        .iter()
        .filter(|r| site.is_api_response(r))
        .filter_map(|r| {
            let body = r.decoded_body()?;
            serde_json::from_str::<Value>(&body)
                .inspect_err(|e| debug!(url = %r.url, error = %e, "api body is not json"))
                .ok()
        })
        .collect()
}

/// Liepin serves a 403 for its JS bundle when replayed cookies are rejected.
pub fn blocked_asset_seen(responses: &[CapturedResponse], site: &SiteProfile) -> bool {
    site.blocked_asset_marker.is_some_and(|marker| {
        responses
            .iter()
            .any(|r| r.status == 403 && r.url.contains(marker))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::{LIEPIN, ZHILIAN};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde_json::json;

    const LIEPIN_API: &str =
        "https://api-c.liepin.com/api/com.liepin.searchfront4c.pc-search-job";

    fn api_response(url: &str, body: &str, encode: bool) -> CapturedResponse {
        CapturedResponse {
            url: url.to_string(),
            status: 200,
            mime_type: "application/json".to_string(),
            body: Some(if encode { BASE64.encode(body) } else { body.to_string() }),
            base64_encoded: encode,
        }
    }

    fn liepin_body() -> String {
        json!({
            "flag": 1,
            "data": {"data": {"jobCardList": [
                {"job": {"jobId": 1, "title": "Java工程师", "salary": "20-30k"},
                 "comp": {"compName": "甲公司"}},
                {"job": {"jobId": 2, "title": "Go工程师"}, "comp": {"compName": "乙公司"}},
                {"job": {"jobId": 1, "title": "重复"}, "comp": {}}
            ]}}
        })
        .to_string()
    }

    #[test]
    fn liepin_cards_from_api() {
        let page = PageContext {
            responses: vec![api_response(LIEPIN_API, &liepin_body(), true)],
            ..Default::default()
        };
        let recs = NetworkCapture.collect(&page, &LIEPIN);
        let urls: Vec<&str> = recs.iter().map(|r| r.job_url.as_str()).collect();
        assert_eq!(recs.len(), 2);
        assert!(urls.contains(&"https://www.liepin.com/job/1.shtml"));
        assert!(urls.contains(&"https://www.liepin.com/job/2.shtml"));
    }

    #[test]
    fn non_api_and_broken_bodies_skipped() {
        let page = PageContext {
            responses: vec![
                api_response("https://www.liepin.com/other", &liepin_body(), false),
                api_response(LIEPIN_API, "{broken", false),
                CapturedResponse {
                    url: LIEPIN_API.to_string(),
                    body: None,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert!(NetworkCapture.collect(&page, &LIEPIN).is_empty());
    }

    #[test]
    fn zhilian_nested_positions() {
        let body = json!({"data": {"list": [
            {"name": "数据工程师", "positionURL": "https://jobs.zhaopin.com/A1.htm",
             "company": {"name": "丙公司"}, "salary60": "1万-1.5万"}
        ]}})
        .to_string();
        let page = PageContext {
            responses: vec![api_response("https://fe-api.zhaopin.com/c/i/search/positions", &body, false)],
            ..Default::default()
        };
        let recs = NetworkCapture.collect(&page, &ZHILIAN);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].company, "丙公司");
        assert_eq!(recs[0].salary, "1万-1.5万");
    }

    #[test]
    fn blocked_asset_detection() {
        let blocked = CapturedResponse {
            url: "https://concat.lietou-static.com/fe-www-pc/v6/js/app.js".to_string(),
            status: 403,
            ..Default::default()
        };
        assert!(blocked_asset_seen(std::slice::from_ref(&blocked), &LIEPIN));
        assert!(!blocked_asset_seen(&[blocked], &ZHILIAN));
    }
}
