use std::path::Path;

use anyhow::Result;
use rusqlite::{params, Connection};

use crate::error::ScrapeError;
use crate::parser::record::{JobRecord, CRAWL_DATE_FORMAT};
use crate::sites::Source;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id             INTEGER PRIMARY KEY,
            title          TEXT NOT NULL DEFAULT '',
            company        TEXT NOT NULL DEFAULT '',
            salary         TEXT NOT NULL DEFAULT '',
            salary_min     REAL NOT NULL DEFAULT 0,
            salary_max     REAL NOT NULL DEFAULT 0,
            salary_avg     REAL NOT NULL DEFAULT 0,
            location       TEXT NOT NULL DEFAULT '',
            experience     TEXT NOT NULL DEFAULT '',
            education      TEXT NOT NULL DEFAULT '',
            industry       TEXT NOT NULL DEFAULT '',
            job_type       TEXT NOT NULL DEFAULT '',
            company_nature TEXT NOT NULL DEFAULT '',
            company_size   TEXT NOT NULL DEFAULT '',
            job_url        TEXT NOT NULL UNIQUE,
            skills         TEXT NOT NULL DEFAULT '[]',
            source         TEXT NOT NULL CHECK(source IN ('liepin','zhilian')),
            company_logo   TEXT NOT NULL DEFAULT '',
            crawl_date     TEXT NOT NULL,
            created_at     TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_source ON jobs(source);
        ",
    )?;
    Ok(())
}

// ── Crawl ──

/// Insert or refresh one page's records in a single transaction. Every
/// column but `created_at` is overwritten on a repeated `job_url`.
pub fn upsert_jobs(conn: &Connection, records: &[JobRecord]) -> Result<usize, ScrapeError> {
    if records.is_empty() {
        return Ok(0);
    }
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO jobs
             (title, company, salary, salary_min, salary_max, salary_avg, location,
              experience, education, industry, job_type, company_nature, company_size,
              job_url, skills, source, company_logo, crawl_date)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18)
             ON CONFLICT(job_url) DO UPDATE SET
                title = excluded.title,
                company = excluded.company,
                salary = excluded.salary,
                salary_min = excluded.salary_min,
                salary_max = excluded.salary_max,
                salary_avg = excluded.salary_avg,
                location = excluded.location,
                experience = excluded.experience,
                education = excluded.education,
                industry = excluded.industry,
                job_type = excluded.job_type,
                company_nature = excluded.company_nature,
                company_size = excluded.company_size,
                skills = excluded.skills,
                source = excluded.source,
                company_logo = excluded.company_logo,
                crawl_date = excluded.crawl_date,
                updated_at = datetime('now')",
        )?;
        for r in records {
            count += stmt.execute(params![
                r.title,
                r.company,
                r.salary,
                r.salary_min,
                r.salary_max,
                r.salary_avg,
                r.location,
                r.experience,
                r.education,
                r.industry,
                r.job_type,
                r.company_nature,
                r.company_size,
                r.job_url,
                r.skills_json(),
                r.source.as_str(),
                r.company_logo,
                r.crawl_date.format(CRAWL_DATE_FORMAT).to_string(),
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Backfill ──

pub struct SkillRow {
    pub id: i64,
    pub job_url: String,
    pub title: String,
    pub skills: String,
}

/// Rows of `source` to revisit, oldest first. With `only_empty`, only rows
/// whose skills are missing, blank, `[]` or `null`.
pub fn fetch_missing_skills(
    conn: &Connection,
    source: Source,
    limit: Option<usize>,
    only_empty: bool,
) -> Result<Vec<SkillRow>> {
    let mut sql = String::from(
        "SELECT id, job_url, title, skills FROM jobs
         WHERE source = ?1 AND TRIM(job_url) <> ''",
    );
    if only_empty {
        sql.push_str(
            " AND (skills IS NULL OR TRIM(skills) IN ('', '[]') OR LOWER(TRIM(skills)) = 'null')",
        );
    }
    sql.push_str(" ORDER BY id");
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {}", n));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![source.as_str()], |row| {
            Ok(SkillRow {
                id: row.get(0)?,
                job_url: row.get(1)?,
                title: row.get(2)?,
                skills: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_skills(conn: &Connection, id: i64, skills: &[String]) -> Result<usize, ScrapeError> {
    let payload = serde_json::to_string(skills)?;
    let n = conn.execute(
        "UPDATE jobs SET skills = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![payload, id],
    )?;
    Ok(n)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub per_source: Vec<(String, usize)>,
    pub without_skills: usize,
    pub without_salary: usize,
    pub last_crawl: Option<String>,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?;
    let without_skills: usize = conn.query_row(
        "SELECT COUNT(*) FROM jobs WHERE TRIM(skills) IN ('', '[]')",
        [],
        |r| r.get(0),
    )?;
    let without_salary: usize = conn.query_row(
        "SELECT COUNT(*) FROM jobs WHERE salary_max = 0",
        [],
        |r| r.get(0),
    )?;
    let last_crawl: Option<String> =
        conn.query_row("SELECT MAX(crawl_date) FROM jobs", [], |r| r.get(0))?;

    let mut stmt =
        conn.prepare("SELECT source, COUNT(*) FROM jobs GROUP BY source ORDER BY source")?;
    let per_source = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Stats {
        total,
        per_source,
        without_skills,
        without_salary,
        last_crawl,
    })
}
