use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;

use super::fields::extract_field;
use super::normalize::{normalize_logo_url, normalize_opt, normalize_skills};
use crate::sites::{SiteProfile, Source};

/// A job as recovered from a page, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub source: Source,
    pub job_url: String,
    pub title: String,
    pub company: String,
    pub salary: String,
    pub location: String,
    pub experience: String,
    pub education: String,
    pub industry: String,
    pub job_type: String,
    pub company_nature: String,
    pub company_size: String,
    pub company_logo: String,
    pub skills: Vec<String>,
    pub description: String,
}

impl CandidateRecord {
    /// A record carrying only its URL; the DOM strategy fills the rest.
    pub fn bare(source: Source, job_url: String) -> Self {
        Self {
            source,
            job_url,
            title: String::new(),
            company: String::new(),
            salary: String::new(),
            location: String::new(),
            experience: String::new(),
            education: String::new(),
            industry: String::new(),
            job_type: String::new(),
            company_nature: String::new(),
            company_size: String::new(),
            company_logo: String::new(),
            skills: Vec::new(),
            description: String::new(),
        }
    }
}

/// The persisted row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub title: String,
    pub company: String,
    pub salary: String,
    pub salary_min: f64,
    pub salary_max: f64,
    pub salary_avg: f64,
    pub location: String,
    pub experience: String,
    pub education: String,
    pub industry: String,
    pub job_type: String,
    pub company_nature: String,
    pub company_size: String,
    pub job_url: String,
    pub skills: Vec<String>,
    pub source: Source,
    pub company_logo: String,
    #[serde(with = "crawl_date_format")]
    pub crawl_date: NaiveDateTime,
}

impl JobRecord {
    pub fn skills_json(&self) -> String {
        serde_json::to_string(&self.skills).unwrap_or_else(|_| "[]".to_string())
    }
}

pub const CRAWL_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

mod crawl_date_format {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(date: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format(super::CRAWL_DATE_FORMAT).to_string())
    }
}

/// Apply the site's field table to one candidate object. `None` when no
/// job URL on the site can be produced.
pub fn extract_job_record(obj: &Value, site: &SiteProfile) -> Option<CandidateRecord> {
    if !obj.is_object() {
        return None;
    }
    let fields = &site.fields;
    let job_url = resolve_job_url(obj, site)?;
    let get = |paths| normalize_opt(extract_field(obj, paths));

    Some(CandidateRecord {
        source: site.source,
        job_url,
        title: get(fields.title),
        company: get(fields.company),
        salary: get(fields.salary),
        location: get(fields.location),
        experience: get(fields.experience),
        education: get(fields.education),
        industry: get(fields.industry),
        job_type: get(fields.job_type),
        company_nature: get(fields.company_nature),
        company_size: get(fields.company_size),
        company_logo: normalize_logo_url(&get(fields.company_logo), site.image_host),
        skills: extract_field(obj, fields.skills)
            .map(normalize_skills)
            .unwrap_or_default(),
        description: get(fields.description),
    })
}

fn resolve_job_url(obj: &Value, site: &SiteProfile) -> Option<String> {
    let direct = normalize_opt(extract_field(obj, site.fields.job_url));
    if !direct.is_empty() {
        return site.resolve_url(&direct);
    }
    let id = normalize_opt(extract_field(obj, site.fields.job_id));
    (!id.is_empty()).then(|| site.synthesize_job_url(&id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sites::{LIEPIN, ZHILIAN};
    use serde_json::json;

    #[test]
    fn liepin_card() {
        let card = json!({
            "job": {
                "jobId": 65432,
                "title": " Java开发工程师 ",
                "salary": "15-25k·14薪",
                "dq": "上海-浦东",
                "requireWorkYears": "3-5年",
                "requireEduLevel": "本科",
                "labels": ["Java", "Spring", "Java"]
            },
            "comp": {
                "compName": "某科技有限公司",
                "compIndustry": "互联网",
                "compScale": "100-499人",
                "compStage": "B轮",
                "compLogo": "//image0.lietou-static.com/logo.png"
            }
        });
        let rec = extract_job_record(&card, &LIEPIN).unwrap();
        assert_eq!(rec.job_url, "https://www.liepin.com/job/65432.shtml");
        assert_eq!(rec.title, "Java开发工程师");
        assert_eq!(rec.company, "某科技有限公司");
        assert_eq!(rec.location, "上海-浦东");
        assert_eq!(rec.company_nature, "B轮");
        assert_eq!(rec.skills, vec!["Java", "Spring"]);
        assert_eq!(rec.company_logo, "https://image0.lietou-static.com/logo.png");
        assert_eq!(rec.source, Source::Liepin);
    }

    #[test]
    fn explicit_url_beats_id() {
        let card = json!({"job": {"jobUrl": "https://www.liepin.com/a/1.shtml", "jobId": 9}});
        let rec = extract_job_record(&card, &LIEPIN).unwrap();
        assert_eq!(rec.job_url, "https://www.liepin.com/a/1.shtml");
    }

    #[test]
    fn zhilian_position_requires_site_url() {
        let pos = json!({"name": "后端", "positionURL": "https://jobs.zhaopin.com/CC1.htm"});
        assert!(extract_job_record(&pos, &ZHILIAN).is_some());

        let foreign = json!({"name": "后端", "positionURL": "https://example.com/CC1.htm"});
        assert!(extract_job_record(&foreign, &ZHILIAN).is_none());
    }

    #[test]
    fn no_url_no_record() {
        assert!(extract_job_record(&json!({"name": "x"}), &ZHILIAN).is_none());
        assert!(extract_job_record(&json!({"title": "x", "id": 3}), &LIEPIN).is_none());
        assert!(extract_job_record(&json!("x"), &LIEPIN).is_none());
    }

    #[test]
    fn skills_serialize_as_list() {
        let rec = JobRecord {
            title: String::new(),
            company: String::new(),
            salary: String::new(),
            salary_min: 0.0,
            salary_max: 0.0,
            salary_avg: 0.0,
            location: String::new(),
            experience: String::new(),
            education: String::new(),
            industry: String::new(),
            job_type: String::new(),
            company_nature: String::new(),
            company_size: String::new(),
            job_url: "u".into(),
            skills: Vec::new(),
            source: Source::Zhilian,
            company_logo: String::new(),
            crawl_date: NaiveDateTime::parse_from_str("2026-01-02 03:04:05", CRAWL_DATE_FORMAT)
                .unwrap(),
        };
        assert_eq!(rec.skills_json(), "[]");
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["skills"], json!([]));
        assert_eq!(v["source"], json!("zhilian"));
        assert_eq!(v["crawl_date"], json!("2026-01-02 03:04:05"));
    }
}
