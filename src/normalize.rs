//! Row cleanup and feature extraction.
//!
//! Turns a raw [`JobRow`] into a canonical [`JobRecord`]: placeholder
//! values become missing, titles/companies/locations are standardized,
//! and skills, work mode, salary range, posted date and the
//! [`JobFeatures`] are extracted from free text.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use jobscope_core::models::{identity_id, JobFeatures, JobRecord, JobRow, JobType, SalaryRange, WorkMode};
use jobscope_core::text;
use jobscope_core::CoreError;
use regex::Regex;

const PLACEHOLDERS: &[&str] = &[
    "non specifie",
    "non specifiee",
    "n/a",
    "na",
    "none",
    "null",
    "nan",
    "-",
    "not specified",
];

static TITLE_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s()\-+/#.]").expect("valid regex"));
static LEGAL_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(ltd|llc|inc|sarl|sa|sas|gmbh|corp|limited|pvt)\b\.?").expect("valid regex")
});
static COMPANY_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s\-.&]").expect("valid regex"));
// Checked before REMOTE: "teletravail partiel" is hybrid, not remote.
static HYBRID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(hybrid|hybride|flexi|mixte|partial remote|partially remote|remote partiel|teletravail partiel)\b",
    )
    .expect("valid regex")
});
static REMOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(remote|full remote|teletravail|a distance|distanciel|work from home|wfh|home[ -]based)\b",
    )
    .expect("valid regex")
});
static INTERNATIONAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(international|worldwide|global|offshore|nearshore|abroad|overseas|a l'etranger)\b",
    )
    .expect("valid regex")
});
static JOB_TYPES: LazyLock<Vec<(JobType, Regex)>> = LazyLock::new(|| {
    [
        (JobType::FullTime, r"\b(full[ -]time|temps[ -]plein|cdi|permanent)\b"),
        (JobType::PartTime, r"\b(part[ -]time|temps[ -]partiel)\b"),
        (JobType::Contract, r"\b(contract|contractual|cdd|contrat)\b"),
        (JobType::Internship, r"\b(stage|stagiaire|intern|internship|pfe)\b"),
        (JobType::Temporary, r"\b(temporary|temporaire|interim)\b"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).expect("valid regex")))
    .collect()
});
static DEGREE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(bac\s*\+\s*\d|master|licence|doctorat|doctoral|phd|ingenieur|mba|diplome|dut|bts)\b")
        .expect("valid regex")
});
static YEARS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        // "3-5 ans d'experience", "5+ years of experience"
        r"(\d+)(?:\s*(?:-|–|a|to)\s*\d+)?\s*\+?\s*(?:ans?|years?)\s+(?:d'\s*|of\s+)?(?:experience|exp)\b",
        // "experience de 3 ans", "experience: 2 years"
        r"experience\s*(?:de|of|:)?\s*(?:minimum|au moins|at least)?\s*(\d+)\s*\+?\s*(?:ans?|years?)\b",
        // "minimum 3 ans", "at least 2 years"
        r"(?:minimum|au moins|at least)\s+(\d+)\s*\+?\s*(?:ans?|years?)\b",
    ]
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
});
static JUNIOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(junior|debutant|entry level|graduate|jeune diplome)\b").expect("valid regex")
});
static SENIOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(senior|experienced|experimente|confirme)\b").expect("valid regex")
});

/// Years assumed for postings that only say "senior".
const SENIOR_YEARS: u32 = 5;
static SALARY_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d[\d\s.,]*\d|\d)\s*(k)?\s*(?:-|–|to|a)\s*(\d[\d\s.,]*\d|\d)\s*(k)?")
        .expect("valid regex")
});
static SALARY_SINGLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:(€|\$|£)\s*)?(\d[\d\s.,]*\d|\d)\s*(k)?\s*(dhs?|mad|dirhams?|euros?|eur|€|\$|usd|gbp|£)?",
    )
    .expect("valid regex")
});
static CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(dhs?\b|mad\b|dirhams?\b|euros?\b|eur\b|€|\$|usd\b|gbp\b|£)").expect("valid regex")
});

/// Moroccan city aliases (folded) and their display names.
const CITIES: &[(&str, &str)] = &[
    ("casablanca", "Casablanca"),
    ("casa", "Casablanca"),
    ("rabat", "Rabat"),
    ("tanger", "Tangier"),
    ("tangier", "Tangier"),
    ("marrakech", "Marrakech"),
    ("marrakesh", "Marrakech"),
    ("agadir", "Agadir"),
    ("fes", "Fez"),
    ("fez", "Fez"),
    ("meknes", "Meknes"),
    ("tetouan", "Tetouan"),
    ("oujda", "Oujda"),
    ("kenitra", "Kenitra"),
    ("mohammedia", "Mohammedia"),
    ("el jadida", "El Jadida"),
    ("nador", "Nador"),
    ("beni mellal", "Beni Mellal"),
    ("temara", "Temara"),
    ("safi", "Safi"),
    ("berrechid", "Berrechid"),
    ("taza", "Taza"),
    ("settat", "Settat"),
];

/// Skill display names with the phrases that signal them.
const SKILLS: &[(&str, &[&str])] = &[
    ("Python", &["python"]),
    ("JavaScript", &["javascript", "js"]),
    ("TypeScript", &["typescript"]),
    ("Java", &["java"]),
    ("C++", &["c++"]),
    ("C#", &["c#"]),
    ("Go", &["golang"]),
    ("Rust", &["rust"]),
    ("PHP", &["php"]),
    ("SQL", &["sql"]),
    ("NoSQL", &["nosql"]),
    ("HTML", &["html"]),
    ("CSS", &["css"]),
    ("Django", &["django"]),
    ("Flask", &["flask"]),
    ("Node.js", &["node.js", "nodejs"]),
    ("React", &["react", "react.js"]),
    ("Angular", &["angular"]),
    ("Vue", &["vue", "vue.js"]),
    ("Spring", &["spring", "spring boot"]),
    ("AWS", &["aws"]),
    ("Azure", &["azure"]),
    ("GCP", &["gcp", "google cloud"]),
    ("Docker", &["docker"]),
    ("Kubernetes", &["kubernetes", "k8s"]),
    ("Terraform", &["terraform"]),
    ("Git", &["git"]),
    ("GitLab", &["gitlab"]),
    ("GitHub", &["github"]),
    ("Jenkins", &["jenkins"]),
    ("CI/CD", &["ci/cd", "ci cd"]),
    ("DevOps", &["devops"]),
    ("Linux", &["linux"]),
    ("Agile", &["agile"]),
    ("Scrum", &["scrum"]),
    ("Jira", &["jira"]),
    ("Machine Learning", &["machine learning"]),
    ("Deep Learning", &["deep learning"]),
    ("TensorFlow", &["tensorflow"]),
    ("PyTorch", &["pytorch"]),
    ("NLP", &["nlp"]),
    ("Data Science", &["data science"]),
    ("Data Analysis", &["data analysis", "analyse de donnees"]),
    ("Power BI", &["power bi"]),
    ("Tableau", &["tableau"]),
    ("Excel", &["excel"]),
    ("PostgreSQL", &["postgresql", "postgres"]),
    ("MySQL", &["mysql"]),
    ("MongoDB", &["mongodb"]),
    ("Oracle", &["oracle"]),
    ("SAP", &["sap"]),
    ("Salesforce", &["salesforce"]),
    ("CRM", &["crm"]),
    ("ERP", &["erp"]),
    ("Figma", &["figma"]),
    ("UX", &["ux"]),
    ("SEO", &["seo"]),
    ("Marketing", &["marketing"]),
    ("Accounting", &["comptabilite", "accounting"]),
    ("Finance", &["finance"]),
    ("Audit", &["audit"]),
    ("Project Management", &["project management", "gestion de projet"]),
    ("Networking", &["reseaux", "networks", "networking"]),
    ("Security", &["securite", "security", "cybersecurity", "cybersecurite"]),
    ("French", &["francais", "french"]),
    ("English", &["anglais", "english"]),
    ("Spanish", &["espagnol", "spanish"]),
    ("German", &["allemand", "german"]),
    ("Arabic", &["arabe", "arabic"]),
];

/// Trimmed value, or `None` for blanks and placeholders like `"Non spécifié"`.
pub fn clean_value(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    let folded = text::fold(trimmed);
    if PLACEHOLDERS.contains(&folded.as_str()) {
        return None;
    }
    Some(trimmed.to_string())
}

pub fn clean_title(title: &str) -> String {
    text::collapse_whitespace(&TITLE_NOISE.replace_all(title, " "))
}

/// Drop legal-form suffixes and punctuation noise from a company name.
pub fn clean_company(company: &str) -> String {
    let without_suffix = LEGAL_SUFFIX.replace_all(company, " ");
    let cleaned = COMPANY_NOISE.replace_all(&without_suffix, " ");
    let collapsed = text::collapse_whitespace(&cleaned);
    let trimmed = collapsed.trim_matches(|c: char| c == '-' || c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        text::collapse_whitespace(company)
    } else {
        trimmed.to_string()
    }
}

/// Standardize a location string. Known Moroccan cities become
/// `"<City>, Morocco"` with country `MA`.
pub fn standardize_location(location: &str) -> (String, Option<String>) {
    let key = format!(" {} ", text::normalize_key(location));
    for (alias, city) in CITIES {
        if key.contains(&format!(" {alias} ")) {
            return (format!("{city}, Morocco"), Some("MA".to_string()));
        }
    }
    if key.contains(" maroc ") || key.contains(" morocco ") {
        return ("Morocco".to_string(), Some("MA".to_string()));
    }
    // "Paris, France" or "Austin, US": the last part names the country.
    let country = location
        .rsplit_once(',')
        .and_then(|(_, tail)| country_code(tail));
    (text::collapse_whitespace(location), country)
}

/// Map a country column value to an uppercase ISO alpha-2 code.
pub fn country_code(value: &str) -> Option<String> {
    let folded = text::normalize_key(value);
    match folded.as_str() {
        "" => None,
        "morocco" | "maroc" => Some("MA".into()),
        "france" => Some("FR".into()),
        "spain" | "espagne" => Some("ES".into()),
        "united states" | "usa" | "us" => Some("US".into()),
        "united kingdom" | "uk" | "gb" => Some("GB".into()),
        "germany" | "allemagne" => Some("DE".into()),
        code if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) => {
            Some(code.to_ascii_uppercase())
        }
        _ => None,
    }
}

/// Skills from the curated vocabulary mentioned as whole words in `body`.
pub fn extract_skills(body: &str) -> BTreeSet<String> {
    let haystack = format!(" {} ", text::normalize_key(body));
    SKILLS
        .iter()
        .filter(|(_, phrases)| {
            phrases
                .iter()
                .any(|p| haystack.contains(&format!(" {} ", text::normalize_key(p))))
        })
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Skills listed explicitly in a row, separated by `,`, `;` or `|`.
pub fn split_skills(list: &str) -> BTreeSet<String> {
    list.split([',', ';', '|'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Remote, hybrid or onsite, from English or French wording. Hybrid
/// wording wins over remote wording.
pub fn detect_work_mode(body: &str) -> WorkMode {
    let folded = text::fold(body);
    if HYBRID.is_match(&folded) {
        WorkMode::Hybrid
    } else if REMOTE.is_match(&folded) {
        WorkMode::Remote
    } else {
        WorkMode::Onsite
    }
}

/// True when the posting is open to candidates abroad.
pub fn detect_international(body: &str) -> bool {
    INTERNATIONAL.is_match(&text::fold(body))
}

/// First contract type mentioned, checked in a fixed order.
pub fn extract_job_type(body: &str) -> Option<JobType> {
    let folded = text::fold(body);
    JOB_TYPES
        .iter()
        .find(|(_, pattern)| pattern.is_match(&folded))
        .map(|(kind, _)| *kind)
}

/// Minimum years of experience asked for. Ranges give their lower bound;
/// "junior" wording gives 0 and "senior" wording gives 5.
pub fn extract_years_experience(body: &str) -> Option<u32> {
    let folded = text::fold(body);
    for pattern in YEARS.iter() {
        if let Some(years) = pattern
            .captures(&folded)
            .and_then(|c| c[1].parse::<u32>().ok())
        {
            return Some(years);
        }
    }
    if JUNIOR.is_match(&folded) {
        Some(0)
    } else if SENIOR.is_match(&folded) {
        Some(SENIOR_YEARS)
    } else {
        None
    }
}

/// Degrees mentioned, lowercase with spaces removed (`"bac+5"`).
pub fn extract_education(body: &str) -> BTreeSet<String> {
    let folded = text::fold(body);
    DEGREE
        .find_iter(&folded)
        .map(|m| m.as_str().split_whitespace().collect())
        .collect()
}

fn currency_code(token: &str) -> Option<String> {
    let code = match token.trim() {
        t if t.starts_with("dh") || t == "mad" || t.starts_with("dirham") => "MAD",
        "€" | "eur" | "euro" | "euros" => "EUR",
        "$" | "usd" => "USD",
        "£" | "gbp" => "GBP",
        _ => return None,
    };
    Some(code.to_string())
}

fn parse_amount(raw: &str, thousands: bool) -> Option<f64> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let normalized = if compact.contains(',') && compact.contains('.') {
        compact.replace(',', "")
    } else if let Some((_, tail)) = compact.rsplit_once([',', '.']) {
        if tail.len() == 3 {
            compact.replace([',', '.'], "")
        } else {
            compact.replace(',', ".")
        }
    } else {
        compact
    };
    let value: f64 = normalized.parse().ok()?;
    Some(if thousands { value * 1000.0 } else { value })
}

/// Parse free-text salary such as `"10000-15000 DH"`, `"12 000 MAD"` or
/// `"€40k"`. A single amount needs a currency marker to count.
pub fn parse_salary(raw: &str) -> Option<SalaryRange> {
    let lowered = text::fold(raw);
    let currency = CURRENCY
        .captures(&lowered)
        .and_then(|c| currency_code(&c[1]));

    if let Some(caps) = SALARY_RANGE.captures(&lowered) {
        let min = parse_amount(&caps[1], caps.get(2).is_some() || caps.get(4).is_some());
        let max = parse_amount(&caps[3], caps.get(4).is_some());
        if let (Some(min), Some(max)) = (min, max) {
            let (min, max) = if min <= max { (min, max) } else { (max, min) };
            return Some(SalaryRange {
                min: Some(min),
                max: Some(max),
                currency,
            });
        }
    }

    for caps in SALARY_SINGLE.captures_iter(&lowered) {
        let marker = caps.get(1).or_else(|| caps.get(4));
        let Some(marker) = marker else { continue };
        if let Some(value) = parse_amount(&caps[2], caps.get(3).is_some()) {
            return Some(SalaryRange {
                min: Some(value),
                max: Some(value),
                currency: currency_code(marker.as_str()).or(currency),
            });
        }
    }
    None
}

/// Parse a posted/scrape date in one of the common export formats.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Build the canonical record for one ingestion row.
///
/// Fails with [`CoreError::IngestionRow`] when the row has no usable title.
pub fn normalize_row(
    row: &JobRow,
    row_no: usize,
    ingested_at: DateTime<Utc>,
    default_country: Option<&str>,
) -> Result<JobRecord, CoreError> {
    let title = clean_value(row.title.as_deref())
        .map(|t| clean_title(&t))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CoreError::IngestionRow {
            row: row_no,
            reason: "missing required field: title".to_string(),
        })?;
    let company = clean_value(row.company.as_deref())
        .map(|c| clean_company(&c))
        .unwrap_or_default();
    let (location, location_country) = clean_value(row.location.as_deref())
        .map(|l| standardize_location(&l))
        .unwrap_or_default();

    let summary = clean_value(row.summary.as_deref());
    let description = clean_value(row.description.as_deref()).unwrap_or_default();
    let source_url = clean_value(row.url.as_deref());

    // The default only stands in for a missing location, never for one
    // that just is not recognized.
    let country = clean_value(row.country.as_deref())
        .and_then(|c| country_code(&c))
        .or(location_country)
        .or_else(|| {
            location
                .is_empty()
                .then(|| default_country.map(str::to_ascii_uppercase))
                .flatten()
        });

    let body = [
        title.as_str(),
        summary.as_deref().unwrap_or(""),
        description.as_str(),
    ]
    .join("\n");

    let mut skills = extract_skills(&body);
    if let Some(listed) = clean_value(row.skills.as_deref()) {
        skills.extend(split_skills(&listed));
    }

    let detected = detect_work_mode(&format!("{body}\n{location}"));
    let work_mode = match row.remote {
        Some(true) => WorkMode::Remote,
        Some(false) if detected == WorkMode::Remote => WorkMode::Onsite,
        _ => detected,
    };
    let features = JobFeatures {
        work_mode,
        international: detect_international(&body),
        job_type: extract_job_type(&body),
        years_experience: extract_years_experience(&body),
        education: extract_education(&body),
    };

    let salary = clean_value(row.salary.as_deref()).and_then(|s| parse_salary(&s));
    let posted_at = clean_value(row.scrape_date.as_deref())
        .and_then(|d| parse_date(&d))
        .unwrap_or(ingested_at);

    let id = clean_value(row.id.as_deref())
        .unwrap_or_else(|| identity_id(&title, &company, &location, source_url.as_deref()));

    let mut record = JobRecord {
        id,
        content_hash: String::new(),
        title,
        company,
        location,
        country,
        summary,
        description,
        salary,
        skills,
        remote: work_mode == WorkMode::Remote,
        source_url,
        posted_at,
        ingested_at,
        specialty: clean_value(row.specialty.as_deref()),
        keyword: clean_value(row.keyword.as_deref()),
        features,
    };
    record.content_hash = record.compute_content_hash();
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_placeholders_are_missing() {
        assert_eq!(clean_value(Some("Non spécifié")), None);
        assert_eq!(clean_value(Some("  N/A ")), None);
        assert_eq!(clean_value(Some("")), None);
        assert_eq!(clean_value(Some(" Acme ")), Some("Acme".into()));
    }

    #[test]
    fn test_clean_company_drops_legal_suffix() {
        assert_eq!(clean_company("Acme SARL"), "Acme");
        assert_eq!(clean_company("Globex Corp."), "Globex");
        assert_eq!(clean_company("Initech, Inc"), "Initech");
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("  Développeur  C++ / Java!!! "), "Développeur C++ / Java");
    }

    #[test]
    fn test_location_aliases() {
        assert_eq!(
            standardize_location("casa, Maroc"),
            ("Casablanca, Morocco".to_string(), Some("MA".to_string()))
        );
        assert_eq!(standardize_location("Fès").0, "Fez, Morocco");
        assert_eq!(standardize_location("Paris").1, None);
        assert_eq!(standardize_location("Paris, France").1.as_deref(), Some("FR"));
    }

    #[test]
    fn test_extract_skills() {
        let skills = extract_skills("Ingénieur Python/Django, maîtrise de Docker et CI/CD. Anglais courant.");
        assert!(skills.contains("Python"));
        assert!(skills.contains("Django"));
        assert!(skills.contains("Docker"));
        assert!(skills.contains("CI/CD"));
        assert!(skills.contains("English"));
        assert!(!skills.contains("Java"));
    }

    #[test]
    fn test_detect_work_mode() {
        assert_eq!(detect_work_mode("Poste en télétravail partiel"), WorkMode::Hybrid);
        assert_eq!(detect_work_mode("Hybrid: 2 days in the office"), WorkMode::Hybrid);
        assert_eq!(detect_work_mode("Fully REMOTE role"), WorkMode::Remote);
        assert_eq!(detect_work_mode("Travail à distance possible"), WorkMode::Remote);
        assert_eq!(detect_work_mode("On-site in Rabat"), WorkMode::Onsite);
    }

    #[test]
    fn test_detect_international() {
        assert!(detect_international("Join our nearshore delivery centre"));
        assert!(detect_international("Missions à l'étranger"));
        assert!(!detect_international("Équipe locale à Rabat"));
    }

    #[test]
    fn test_extract_job_type() {
        assert_eq!(extract_job_type("CDI, temps plein"), Some(JobType::FullTime));
        assert_eq!(extract_job_type("Stage PFE de 6 mois"), Some(JobType::Internship));
        assert_eq!(extract_job_type("12-month contract"), Some(JobType::Contract));
        assert_eq!(extract_job_type("Great team"), None);
    }

    #[test]
    fn test_extract_years_experience() {
        assert_eq!(extract_years_experience("3-5 ans d'expérience exigés"), Some(3));
        assert_eq!(extract_years_experience("Expérience de 2 ans minimum"), Some(2));
        assert_eq!(extract_years_experience("5+ years of experience"), Some(5));
        assert_eq!(extract_years_experience("At least 4 years in Java"), Some(4));
        assert_eq!(extract_years_experience("Développeur junior"), Some(0));
        assert_eq!(extract_years_experience("Senior engineer"), Some(5));
        assert_eq!(extract_years_experience("Backend engineer"), None);
    }

    #[test]
    fn test_extract_education() {
        let degrees = extract_education("Bac + 5 en informatique, Master ou diplôme d'ingénieur");
        let expected: BTreeSet<String> = ["bac+5", "master", "diplome", "ingenieur"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(degrees, expected);
        assert!(extract_education("No degree required").is_empty());
    }

    #[test]
    fn test_parse_salary() {
        let s = parse_salary("10000-15000 DH").unwrap();
        assert_eq!((s.min, s.max), (Some(10000.0), Some(15000.0)));
        assert_eq!(s.currency.as_deref(), Some("MAD"));

        let s = parse_salary("12 000 MAD").unwrap();
        assert_eq!((s.min, s.max), (Some(12000.0), Some(12000.0)));

        let s = parse_salary("€40k").unwrap();
        assert_eq!(s.min, Some(40000.0));
        assert_eq!(s.currency.as_deref(), Some("EUR"));

        assert!(parse_salary("competitive").is_none());
        assert!(parse_salary("3 years experience").is_none());
    }

    #[test]
    fn test_parse_date() {
        let d = parse_date("2024-03-15").unwrap();
        assert_eq!(d, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
        assert_eq!(parse_date("15/03/2024"), Some(d));
        assert!(parse_date("2024-03-15T08:30:00Z").is_some());
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn test_normalize_row() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let row = JobRow {
            title: Some("Backend Engineer".into()),
            company: Some("Acme SARL".into()),
            location: Some("Casablanca".into()),
            description: Some(
                "Build services in Rust and PostgreSQL. Hybride. CDI, 3 ans d'expérience, Bac+5."
                    .into(),
            ),
            salary: Some("15000-20000 MAD".into()),
            scrape_date: Some("2024-05-20".into()),
            ..Default::default()
        };
        let record = normalize_row(&row, 0, now, None).unwrap();
        assert_eq!(record.company, "Acme");
        assert_eq!(record.location, "Casablanca, Morocco");
        assert_eq!(record.country.as_deref(), Some("MA"));
        assert_eq!(record.features.work_mode, WorkMode::Hybrid);
        assert!(!record.remote);
        assert_eq!(record.features.job_type, Some(JobType::FullTime));
        assert_eq!(record.features.years_experience, Some(3));
        assert!(record.features.education.contains("bac+5"));
        assert!(!record.features.international);
        assert!(record.skills.contains("Rust"));
        assert!(record.skills.contains("PostgreSQL"));
        assert!(record.id.starts_with("job-"));
        assert_eq!(record.content_hash, record.compute_content_hash());
        assert_ne!(record.posted_at, now);
    }

    #[test]
    fn test_normalize_row_requires_title() {
        let row = JobRow {
            title: Some("Non spécifié".into()),
            ..Default::default()
        };
        let err = normalize_row(&row, 7, Utc::now(), None).unwrap_err();
        assert!(matches!(err, CoreError::IngestionRow { row: 7, .. }));
    }

    #[test]
    fn test_explicit_country_wins() {
        let row = JobRow {
            title: Some("Analyst".into()),
            location: Some("Rabat".into()),
            country: Some("fr".into()),
            ..Default::default()
        };
        let record = normalize_row(&row, 0, Utc::now(), Some("MA")).unwrap();
        assert_eq!(record.country.as_deref(), Some("FR"));
    }

    #[test]
    fn test_default_country_only_fills_missing_location() {
        let paris = JobRow {
            title: Some("Welder".into()),
            location: Some("Paris".into()),
            ..Default::default()
        };
        let record = normalize_row(&paris, 0, Utc::now(), Some("MA")).unwrap();
        assert_eq!(record.country, None);

        let unplaced = JobRow {
            title: Some("Welder".into()),
            location: Some("Non spécifié".into()),
            ..Default::default()
        };
        let record = normalize_row(&unplaced, 0, Utc::now(), Some("ma")).unwrap();
        assert_eq!(record.country.as_deref(), Some("MA"));
    }

    #[test]
    fn test_explicit_remote_flag_overrides_text() {
        let row = JobRow {
            title: Some("Support Engineer".into()),
            description: Some("Remote friendly team".into()),
            remote: Some(false),
            ..Default::default()
        };
        let record = normalize_row(&row, 0, Utc::now(), None).unwrap();
        assert!(!record.remote);
        assert_eq!(record.features.work_mode, WorkMode::Onsite);
    }
}
