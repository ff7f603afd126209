use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::session::CapturedResponse;

static PATH_PAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/p\d+(\?|$)").unwrap());

/// One key, or a chain of nested keys.
pub type FieldPath = &'static [&'static str];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Liepin,
    Zhilian,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Liepin => "liepin",
            Source::Zhilian => "zhilian",
        }
    }

    pub fn profile(&self) -> &'static SiteProfile {
        match self {
            Source::Liepin => &LIEPIN,
            Source::Zhilian => &ZHILIAN,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate paths per semantic field, most reliable first.
pub struct FieldTable {
    pub job_url: &'static [FieldPath],
    pub job_id: &'static [FieldPath],
    pub title: &'static [FieldPath],
    pub company: &'static [FieldPath],
    pub salary: &'static [FieldPath],
    pub location: &'static [FieldPath],
    pub experience: &'static [FieldPath],
    pub education: &'static [FieldPath],
    pub industry: &'static [FieldPath],
    pub job_type: &'static [FieldPath],
    pub company_nature: &'static [FieldPath],
    pub company_size: &'static [FieldPath],
    pub company_logo: &'static [FieldPath],
    pub skills: &'static [FieldPath],
    pub description: &'static [FieldPath],
}

/// Which captured responses carry search results.
pub struct ApiPattern {
    pub host_marker: &'static str,
    /// Any of these in the URL qualifies.
    pub path_markers: &'static [&'static str],
    /// A JSON mime type on a site host also qualifies.
    pub accept_json_mime: bool,
}

pub enum Paging {
    /// Page index, size and keyword carried as query parameters.
    Query {
        page_param: &'static str,
        size_param: &'static str,
        key_param: &'static str,
        page_size: u32,
        first_page: u32,
    },
    /// `{page}` placeholder, a `/pN` path segment, or a `p` query parameter.
    Path { first_page: u32 },
}

pub struct SiteProfile {
    pub source: Source,
    pub origin: &'static str,
    pub domain_marker: &'static str,
    pub job_url_template: &'static str,
    pub image_host: &'static str,
    pub cookie_domain: &'static str,
    pub default_search_url: &'static str,
    pub paging: Paging,
    pub fields: FieldTable,
    pub state_markers: &'static [&'static str],
    pub api: ApiPattern,
    pub job_link_selectors: &'static [&'static str],
    pub description_selectors: &'static [&'static str],
    /// All present means a real content page even if challenge markers leak in.
    pub content_markers: &'static [&'static str],
    /// The detail page exists but the posting is gone.
    pub unavailable_markers: &'static [&'static str],
    /// A 403 on this asset means injected cookies are being rejected.
    pub blocked_asset_marker: Option<&'static str>,
}

impl SiteProfile {
    /// Search URL for a zero-based page index.
    pub fn search_url(&self, base: &str, page_index: u32, keyword: &str) -> String {
        match &self.paging {
            Paging::Query {
                page_param,
                size_param,
                key_param,
                page_size,
                first_page,
            } => {
                let mut overrides = vec![
                    (*page_param, (first_page + page_index).to_string()),
                    (*size_param, page_size.to_string()),
                ];
                if !keyword.trim().is_empty() {
                    overrides.push((*key_param, keyword.trim().to_string()));
                }
                set_query_params(base, &overrides)
            }
            Paging::Path { first_page } => {
                let page = (first_page + page_index).to_string();
                if base.contains("{page}") {
                    base.replace("{page}", &page)
                } else if PATH_PAGE_RE.is_match(base) {
                    PATH_PAGE_RE
                        .replace(base, format!("/p{}$1", page).as_str())
                        .to_string()
                } else {
                    set_query_params(base, &[("p", page)])
                }
            }
        }
    }

    /// Resolve an href against the site origin; only links on this site pass.
    pub fn resolve_url(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with("javascript:") {
            return None;
        }
        let base = Url::parse(self.origin).ok()?;
        let absolute = base.join(href).ok()?.to_string();
        absolute
            .to_lowercase()
            .contains(self.domain_marker)
            .then_some(absolute)
    }

    pub fn synthesize_job_url(&self, id: &str) -> String {
        self.job_url_template.replace("{id}", id)
    }

    pub fn is_api_response(&self, response: &CapturedResponse) -> bool {
        let url = response.url.to_lowercase();
        if !url.contains(self.api.host_marker) {
            return false;
        }
        let json_mime = self.api.accept_json_mime && response.mime_type.to_lowercase().contains("json");
        json_mime || self.api.path_markers.iter().any(|m| url.contains(m))
    }
}

fn set_query_params(base: &str, overrides: &[(&str, String)]) -> String {
    let Ok(mut url) = Url::parse(base) else {
        return base.to_string();
    };
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !overrides.iter().any(|(o, _)| o == k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .extend_pairs(overrides.iter().map(|(k, v)| (*k, v.as_str())));
    url.to_string()
}

// ── Liepin ──

pub static LIEPIN: SiteProfile = SiteProfile {
    source: Source::Liepin,
    origin: "https://www.liepin.com",
    domain_marker: "liepin.com",
    job_url_template: "https://www.liepin.com/job/{id}.shtml",
    image_host: "https://image0.lietou-static.com",
    cookie_domain: ".liepin.com",
    default_search_url: "https://www.liepin.com/zhaopin/?city=410&currentPage=0&pageSize=40",
    paging: Paging::Query {
        page_param: "currentPage",
        size_param: "pageSize",
        key_param: "key",
        page_size: 40,
        first_page: 0,
    },
    fields: FieldTable {
        job_url: &[
            &["job", "jobUrl"],
            &["job", "jobLink"],
            &["job", "link"],
            &["job", "detailUrl"],
        ],
        job_id: &[&["job", "jobId"], &["job", "job_id"], &["job", "id"]],
        title: &[&["job", "title"], &["job", "jobName"]],
        company: &[&["comp", "compName"], &["comp", "name"]],
        salary: &[&["job", "salary"], &["job", "salaryDesc"], &["job", "salaryRange"]],
        location: &[
            &["job", "dq"],
            &["job", "city"],
            &["job", "workPlace"],
            &["job", "workCity"],
        ],
        experience: &[
            &["job", "requireWorkYears"],
            &["job", "workYear"],
            &["job", "workYearDesc"],
        ],
        education: &[
            &["job", "requireEduLevel"],
            &["job", "eduLevel"],
            &["job", "education"],
        ],
        industry: &[
            &["comp", "compIndustry"],
            &["comp", "industry"],
            &["comp", "industryName"],
        ],
        job_type: &[&["job", "jobType"], &["job", "jobKind"], &["job", "workType"]],
        company_nature: &[
            &["comp", "compKind"],
            &["comp", "compType"],
            &["comp", "compNature"],
            &["comp", "compProperty"],
            &["comp", "compStage"],
        ],
        company_size: &[&["comp", "compScale"], &["comp", "scale"], &["comp", "compSize"]],
        company_logo: &[
            &["comp", "compLogo"],
            &["comp", "logo"],
            &["comp", "logoUrl"],
            &["comp", "compLogoUrl"],
        ],
        skills: &[
            &["job", "skills"],
            &["job", "skill"],
            &["job", "labels"],
            &["job", "tagList"],
            &["job", "keyLabels"],
            &["job", "keySkills"],
        ],
        description: &[&["job", "jobDesc"], &["job", "description"]],
    },
    state_markers: &["__INITIAL_STATE__"],
    api: ApiPattern {
        host_marker: "api-c.liepin.com",
        path_markers: &["com.liepin.searchfront4c.pc-search-job"],
        accept_json_mime: false,
    },
    job_link_selectors: &["a[href*='liepin.com/job/']", "a[href*='/job/']", "a[href*='/a/']"],
    description_selectors: &[
        "dd[data-selector='job-intro-content']",
        ".job-intro-container dd[data-selector='job-intro-content']",
        ".job-intro-container .paragraph dd",
    ],
    content_markers: &["job-intro-content"],
    unavailable_markers: &["该职位已下线", "职位不存在", "页面不存在"],
    blocked_asset_marker: Some("concat.lietou-static.com/fe-www-pc/v6/js"),
};

// ── Zhilian ──

pub static ZHILIAN: SiteProfile = SiteProfile {
    source: Source::Zhilian,
    origin: "https://www.zhaopin.com",
    domain_marker: "zhaopin",
    job_url_template: "https://www.zhaopin.com/jobdetail/{id}.htm",
    image_host: "https://img01.zhaopin.cn",
    cookie_domain: ".zhaopin.com",
    default_search_url: "https://www.zhaopin.com/sou/jl538/kw01L00O80EO062/p1?srccode=401801",
    paging: Paging::Path { first_page: 1 },
    fields: FieldTable {
        job_url: &[
            &["positionURL"],
            &["positionUrl"],
            &["jobUrl"],
            &["detailUrl"],
            &["positionDetailUrl"],
            &["job", "positionURL"],
            &["job", "positionUrl"],
            &["job", "jobUrl"],
        ],
        job_id: &[&["jobNumber"], &["job", "jobNumber"]],
        title: &[
            &["name"],
            &["positionName"],
            &["jobName"],
            &["title"],
            &["job", "name"],
            &["job", "positionName"],
            &["job", "title"],
        ],
        company: &[
            &["companyName"],
            &["company", "name"],
            &["company", "companyName"],
            &["comp", "name"],
            &["comp", "compName"],
        ],
        salary: &[
            &["salary60"],
            &["salary"],
            &["salaryDesc"],
            &["salaryReal"],
            &["job", "salary"],
        ],
        location: &[
            &["workingCity"],
            &["cityName"],
            &["city"],
            &["cityDistrict"],
            &["workCity"],
            &["job", "cityName"],
        ],
        experience: &[
            &["workingExp"],
            &["workExp"],
            &["experience"],
            &["job", "workingExp"],
        ],
        education: &[&["education"], &["eduLevel"], &["job", "education"]],
        industry: &[
            &["industryName"],
            &["company", "industryName"],
            &["comp", "compIndustry"],
        ],
        job_type: &[&["jobType"], &["positionType"], &["job", "jobType"]],
        company_nature: &[&["companyType"], &["companyNature"], &["company", "typeName"]],
        company_size: &[&["companySize"], &["company", "sizeName"], &["comp", "compScale"]],
        company_logo: &[
            &["companyLogo"],
            &["logo"],
            &["logoUrl"],
            &["company", "logo"],
            &["company", "logoUrl"],
            &["comp", "compLogo"],
        ],
        skills: &[
            &["skills"],
            &["skillLabel"],
            &["skillLabels"],
            &["jobSkillTags"],
            &["welfareTag"],
            &["job", "skills"],
            &["job", "skillLabels"],
        ],
        description: &[
            &["jobSummary"],
            &["jobDescription"],
            &["positionDetail"],
            &["description"],
            &["job", "jobSummary"],
            &["job", "description"],
        ],
    },
    state_markers: &["__INITIAL_STATE__"],
    api: ApiPattern {
        host_marker: "zhaopin",
        path_markers: &["/api/", "search"],
        accept_json_mime: true,
    },
    job_link_selectors: &[
        "a[href*='jobs.zhaopin.com']",
        "a[href*='job_detail']",
        "a[href*='/job/']",
    ],
    description_selectors: &[
        "[data-selector='job-intro-content']",
        "[class*='job-summary']",
        "[class*='describ']",
        "[class*='detail-content']",
        "[class*='job-detail']",
    ],
    content_markers: &["__initial_state__", "positionurl"],
    unavailable_markers: &[],
    blocked_asset_marker: None,
};
