//! Store statistics.
//!
//! A quick summary of what is indexed: record and index counts, remote,
//! hybrid, international and low-confidence coverage, and breakdowns by
//! country, specialty, contract type and skill.
//! Used by `jobscope stats` to confirm that ingestion and deduplication
//! behave as expected.

use std::collections::{BTreeMap, HashMap};

use jobscope_core::catalog::JobCatalog;
use jobscope_core::models::{JobType, WorkMode};
use serde::Serialize;

use crate::store::JobStore;

const TOP_SKILLS: usize = 10;
const UNKNOWN: &str = "(unknown)";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub records: usize,
    pub live_entries: usize,
    pub tombstoned_entries: usize,
    pub remote: usize,
    pub hybrid: usize,
    pub international: usize,
    pub low_confidence: usize,
    pub with_salary: usize,
    pub by_country: BTreeMap<String, usize>,
    pub by_specialty: BTreeMap<String, usize>,
    pub by_job_type: BTreeMap<String, usize>,
    /// Most frequent skills, count descending then name.
    pub top_skills: Vec<(String, usize)>,
    pub integrity_issues: usize,
}

impl StoreStats {
    pub fn from_catalog(catalog: &JobCatalog) -> Self {
        let mut stats = StoreStats {
            records: catalog.len(),
            live_entries: catalog.index().len(),
            tombstoned_entries: catalog.index().tombstone_count(),
            low_confidence: catalog
                .index()
                .iter_live()
                .filter(|e| e.low_confidence)
                .count(),
            integrity_issues: catalog.check_integrity().len(),
            ..StoreStats::default()
        };

        let mut skills: HashMap<&str, usize> = HashMap::new();
        for record in catalog.records().iter() {
            stats.remote += usize::from(record.remote);
            stats.hybrid += usize::from(record.features.work_mode == WorkMode::Hybrid);
            stats.international += usize::from(record.features.international);
            stats.with_salary += usize::from(record.salary.is_some());
            let country = record.country.as_deref().unwrap_or(UNKNOWN);
            *stats.by_country.entry(country.to_string()).or_default() += 1;
            let specialty = record.specialty.as_deref().unwrap_or(UNKNOWN);
            *stats.by_specialty.entry(specialty.to_string()).or_default() += 1;
            let job_type = record.features.job_type.map_or(UNKNOWN, JobType::as_str);
            *stats.by_job_type.entry(job_type.to_string()).or_default() += 1;
            for skill in &record.skills {
                *skills.entry(skill.as_str()).or_default() += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = skills
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(TOP_SKILLS);
        stats.top_skills = ranked;
        stats
    }
}

impl JobStore {
    /// Counts over the current snapshot.
    pub fn get_stats(&self) -> StoreStats {
        StoreStats::from_catalog(&self.snapshot())
    }
}

/// Print the stats table.
pub fn print_stats(store: &JobStore) {
    let stats = store.get_stats();
    let config = store.config();

    println!("jobscope — Store Stats");
    println!("======================");
    println!();
    println!("  Store:          {}/{}", config.store.dir.display(), config.store.name);
    println!("  Encoder:        {} ({} dims)", store.encoder().model_name(), store.dims());
    println!();
    println!("  Records:        {}", stats.records);
    println!(
        "  Index entries:  {} live, {} tombstoned",
        stats.live_entries, stats.tombstoned_entries
    );
    println!("  Remote:         {}", format_share(stats.remote, stats.records));
    println!("  Hybrid:         {}", format_share(stats.hybrid, stats.records));
    println!("  International:  {}", format_share(stats.international, stats.records));
    println!(
        "  Low confidence: {}",
        format_share(stats.low_confidence, stats.live_entries)
    );
    println!("  With salary:    {}", format_share(stats.with_salary, stats.records));
    if stats.integrity_issues > 0 {
        println!("  Integrity:      {} issue(s), run `jobscope rebuild`", stats.integrity_issues);
    }

    print_breakdown("By country", "COUNTRY", &stats.by_country);
    print_breakdown("By specialty", "SPECIALTY", &stats.by_specialty);
    print_breakdown("By contract", "TYPE", &stats.by_job_type);

    if !stats.top_skills.is_empty() {
        println!();
        println!("  Top skills:");
        for (skill, count) in &stats.top_skills {
            println!("  {:<28} {:>6}", skill, count);
        }
    }
    println!();
}

fn print_breakdown(heading: &str, column: &str, counts: &BTreeMap<String, usize>) {
    if counts.is_empty() {
        return;
    }
    let mut rows: Vec<(&String, &usize)> = counts.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    println!();
    println!("  {}:", heading);
    println!("  {:<28} {:>6}", column, "JOBS");
    println!("  {}", "-".repeat(36));
    for (name, count) in rows {
        println!("  {:<28} {:>6}", name, count);
    }
}

fn format_share(part: usize, total: usize) -> String {
    if total == 0 {
        return format!("{part}");
    }
    format!("{} / {} ({}%)", part, total, part * 100 / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use jobscope_core::models::JobRow;

    fn row(title: &str, location: &str, remote: bool, skills: &str) -> JobRow {
        JobRow {
            title: Some(title.into()),
            company: Some("Acme".into()),
            location: Some(location.into()),
            description: Some(format!("{title} role using {skills}")),
            remote: Some(remote),
            specialty: Some("Engineering".into()),
            ..JobRow::default()
        }
    }

    #[tokio::test]
    async fn test_counts_by_country_and_skill() {
        let mut config = Config::default();
        config.embedding.dims = 32;
        let store = JobStore::from_config(config).unwrap();
        store
            .ingest(vec![
                row("Backend Engineer", "Casablanca", false, "Python and Docker"),
                row("Data Engineer", "Rabat", true, "Python and SQL"),
                row("Web Developer", "Paris", false, "React for worldwide clients, CDI"),
            ])
            .await
            .unwrap();

        let stats = store.get_stats();
        assert_eq!(stats.records, 3);
        assert_eq!(stats.live_entries, 3);
        assert_eq!(stats.remote, 1);
        assert_eq!(stats.hybrid, 0);
        assert_eq!(stats.international, 1);
        // Paris is not recognized and must not fall back to the default country.
        assert_eq!(stats.by_country.get("MA"), Some(&2));
        assert_eq!(stats.by_country.get(UNKNOWN), Some(&1));
        assert_eq!(stats.by_job_type.get("full_time"), Some(&1));
        assert_eq!(stats.by_specialty.get("Engineering"), Some(&3));
        assert_eq!(stats.top_skills[0], ("Python".to_string(), 2));
        assert_eq!(stats.integrity_issues, 0);
    }

    #[test]
    fn test_format_share() {
        assert_eq!(format_share(0, 0), "0");
        assert_eq!(format_share(1, 4), "1 / 4 (25%)");
    }
}
