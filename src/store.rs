use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::HarvestError;

pub type Result<T> = std::result::Result<T, HarvestError>;

/// Identity written when a listing link carries no place identifier.
pub const UNRESOLVED_IDENTITY: &str = "ChIundefined";

/// Stable place identifier, the dedup key of the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Identity(id.into())
    }

    pub fn unresolved() -> Self {
        Identity(UNRESOLVED_IDENTITY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_resolved(&self) -> bool {
        self.0 != UNRESOLVED_IDENTITY
    }
}

/// One school listing. Legacy key names from older stores are accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    #[serde(alias = "placeId")]
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, alias = "googleUrl", skip_serializing_if = "Option::is_none")]
    pub detail_url: Option<String>,
    #[serde(default, alias = "schWebsite", skip_serializing_if = "Option::is_none")]
    pub external_site: Option<String>,
    #[serde(default, alias = "schoolName")]
    pub display_name: String,
    #[serde(default, alias = "ratingText", skip_serializing_if = "Option::is_none")]
    pub rating_label: Option<String>,
    #[serde(default, alias = "stars")]
    pub star_rating: Option<f64>,
    #[serde(default, alias = "numberOfReviews")]
    pub review_count: Option<u64>,
}

// ── Persistence ──

/// Read the whole store. A missing or blank file is an empty store.
pub fn load(path: &Path) -> Result<Vec<School>> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(HarvestError::StoreRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|source| HarvestError::StoreDecode {
        path: path.to_path_buf(),
        source,
    })
}

/// Rewrite the whole store, pretty-printed, via a temp file and rename.
pub fn save(path: &Path, schools: &[School]) -> Result<()> {
    let raw = serde_json::to_string_pretty(schools)?;
    let write_err = |source| HarvestError::StoreWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, raw).map_err(write_err)?;
    fs::rename(&tmp_path, path).map_err(write_err)?;
    Ok(())
}

#[derive(Debug)]
pub struct MergeOutcome {
    pub schools: Vec<School>,
    pub added: usize,
    pub skipped: usize,
}

/// Prior records in their order, then candidates whose identity is not yet present.
pub fn merge(prior: Vec<School>, candidates: Vec<School>) -> MergeOutcome {
    let mut seen: HashSet<Identity> = prior.iter().map(|s| s.identity.clone()).collect();
    let mut schools = prior;
    let mut added = 0;
    let mut skipped = 0;

    for school in candidates {
        if seen.insert(school.identity.clone()) {
            schools.push(school);
            added += 1;
        } else {
            info!(identity = school.identity.as_str(), "School already exists");
            skipped += 1;
        }
    }

    MergeOutcome {
        schools,
        added,
        skipped,
    }
}

/// Merge `candidates` into the store at `path` under the store lock.
/// The first run writes candidates verbatim.
pub fn merge_into(path: &Path, candidates: Vec<School>) -> Result<MergeOutcome> {
    let _lock = StoreLock::acquire(path)?;

    if !path.exists() {
        let added = candidates.len();
        save(path, &candidates)?;
        info!(path = %path.display(), added, "Created store");
        return Ok(MergeOutcome {
            schools: candidates,
            added,
            skipped: 0,
        });
    }

    let prior = load(path)?;
    let outcome = merge(prior, candidates);
    save(path, &outcome.schools)?;
    info!(
        path = %path.display(),
        added = outcome.added,
        skipped = outcome.skipped,
        total = outcome.schools.len(),
        "Store updated"
    );
    Ok(outcome)
}

// ── Single writer ──

/// Exclusive `<store>.lock` file held for one read-modify-write.
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    pub fn acquire(store: &Path) -> Result<Self> {
        let path = lock_path(store);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| HarvestError::StoreWrite {
                path: path.clone(),
                source,
            })?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(HarvestError::StoreLocked(store.to_path_buf()))
            }
            Err(source) => return Err(HarvestError::StoreWrite { path, source }),
        };
        let stamp = format!("pid {} at {}\n", std::process::id(), chrono::Utc::now().to_rfc3339());
        if let Err(e) = file.write_all(stamp.as_bytes()) {
            debug!("Could not stamp lock file {}: {}", path.display(), e);
        }
        Ok(StoreLock { path })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release store lock {}: {}", self.path.display(), e);
        }
    }
}

fn lock_path(store: &Path) -> PathBuf {
    let mut name = store.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub resolved: usize,
    pub rated: usize,
    pub with_phone: usize,
    pub with_website: usize,
    pub average_stars: Option<f64>,
}

pub fn get_stats(schools: &[School]) -> Stats {
    let stars: Vec<f64> = schools.iter().filter_map(|s| s.star_rating).collect();
    let average_stars = if stars.is_empty() {
        None
    } else {
        Some(stars.iter().sum::<f64>() / stars.len() as f64)
    };
    Stats {
        total: schools.len(),
        resolved: schools.iter().filter(|s| s.identity.is_resolved()).count(),
        rated: stars.len(),
        with_phone: schools.iter().filter(|s| s.phone.is_some()).count(),
        with_website: schools.iter().filter(|s| s.external_site.is_some()).count(),
        average_stars,
    }
}

// ── Overview ──

/// Stored schools, optionally filtered by a case-insensitive category substring,
/// best rated first.
pub fn overview<'a>(schools: &'a [School], category: Option<&str>, limit: usize) -> Vec<&'a School> {
    let needle = category.map(str::to_lowercase);
    let mut rows: Vec<&School> = schools
        .iter()
        .filter(|s| match &needle {
            Some(n) => s
                .category
                .as_deref()
                .is_some_and(|c| c.to_lowercase().contains(n.as_str())),
            None => true,
        })
        .collect();
    rows.sort_by(|a, b| {
        b.star_rating
            .unwrap_or(0.0)
            .total_cmp(&a.star_rating.unwrap_or(0.0))
            .then(b.review_count.unwrap_or(0).cmp(&a.review_count.unwrap_or(0)))
    });
    rows.truncate(limit);
    rows
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn school(id: &str) -> School {
        School {
            identity: Identity::new(id),
            address: None,
            category: None,
            phone: None,
            detail_url: None,
            external_site: None,
            display_name: format!("School {}", id),
            rating_label: None,
            star_rating: None,
            review_count: None,
        }
    }

    fn ids(schools: &[School]) -> Vec<&str> {
        schools.iter().map(|s| s.identity.as_str()).collect()
    }

    #[test]
    fn merge_skips_known_identity() {
        let out = merge(vec![school("A")], vec![school("A"), school("B")]);
        assert_eq!(ids(&out.schools), vec!["A", "B"]);
        assert_eq!(out.added, 1);
        assert_eq!(out.skipped, 1);
    }

    #[test]
    fn merge_keeps_prior_record_untouched() {
        let mut fresh = school("A");
        fresh.display_name = "Renamed".into();
        let out = merge(vec![school("A")], vec![fresh]);
        assert_eq!(out.schools[0].display_name, "School A");
    }

    #[test]
    fn merge_collapses_repeats_against_accumulated_set() {
        let out = merge(vec![school("A")], vec![school("B"), school("B"), school("C")]);
        assert_eq!(ids(&out.schools), vec!["A", "B", "C"]);
        assert_eq!(out.skipped, 1);
    }

    #[test]
    fn merge_is_idempotent() {
        let prior = vec![school("A"), school("X")];
        let candidates = vec![school("B"), school("A"), school("C")];
        let once = merge(prior, candidates.clone());
        let twice = merge(once.schools.clone(), candidates);
        assert_eq!(twice.schools, once.schools);
        assert_eq!(twice.added, 0);
    }

    #[test]
    fn first_run_writes_candidates_verbatim() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schools.json");

        let out = merge_into(&path, vec![school("A"), school("A")]).unwrap();

        assert_eq!(out.added, 2);
        assert_eq!(ids(&load(&path).unwrap()), vec!["A", "A"]);
        assert!(!lock_path(&path).exists());
    }

    #[test]
    fn second_run_adds_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schools.json");
        let batch = vec![school("A"), school("B")];

        merge_into(&path, batch.clone()).unwrap();
        let before = fs::read_to_string(&path).unwrap();
        let out = merge_into(&path, batch).unwrap();

        assert_eq!(out.added, 0);
        assert_eq!(out.skipped, 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn blank_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schools.json");
        fs::write(&path, "  \n").unwrap();

        assert!(load(&path).unwrap().is_empty());
        let out = merge_into(&path, vec![school("A")]).unwrap();
        assert_eq!(ids(&out.schools), vec!["A"]);
    }

    #[test]
    fn corrupt_store_is_an_error_and_left_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schools.json");
        fs::write(&path, "{not json").unwrap();

        let err = merge_into(&path, vec![school("A")]).err().unwrap();
        assert!(matches!(err, HarvestError::StoreDecode { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
        assert!(!lock_path(&path).exists());
    }

    #[test]
    fn concurrent_writer_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schools.json");

        let held = StoreLock::acquire(&path).unwrap();
        let err = merge_into(&path, vec![school("A")]).err().unwrap();
        assert!(matches!(err, HarvestError::StoreLocked(_)));
        assert!(!path.exists());

        drop(held);
        assert!(merge_into(&path, vec![school("A")]).is_ok());
    }

    #[test]
    fn json_shape() {
        let mut s = school("ChIJabc");
        s.category = Some("Primary School".into());
        s.star_rating = Some(4.5);
        let value = serde_json::to_value(&s).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj["identity"], "ChIJabc");
        assert_eq!(obj["displayName"], "School ChIJabc");
        assert_eq!(obj["category"], "Primary School");
        assert_eq!(obj["starRating"], 4.5);
        assert!(obj["reviewCount"].is_null());
        assert!(!obj.contains_key("address"));
        assert!(!obj.contains_key("externalSite"));
    }

    #[test]
    fn saved_store_is_two_space_indented() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("schools.json");
        save(&path, &[school("A")]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n  {\n    \"identity\": \"A\""));
    }

    #[test]
    fn reads_legacy_keys() {
        let legacy = r#"[{
            "placeId": "ChIJold",
            "address": "5 Old Rd",
            "category": "Secondary school",
            "googleUrl": "https://www.google.com/maps/place/Old/ChIJold",
            "schWebsite": "https://old.sch.ng",
            "schoolName": "Old School",
            "ratingText": "3.9 stars 41 Reviews",
            "stars": 3.9,
            "numberOfReviews": 41
        }]"#;
        let schools: Vec<School> = serde_json::from_str(legacy).unwrap();
        let s = &schools[0];
        assert_eq!(s.identity.as_str(), "ChIJold");
        assert_eq!(s.display_name, "Old School");
        assert_eq!(s.external_site.as_deref(), Some("https://old.sch.ng"));
        assert_eq!(s.star_rating, Some(3.9));
        assert_eq!(s.review_count, Some(41));
        assert!(s.phone.is_none());
    }

    #[test]
    fn stats_and_overview() {
        let mut a = school("A");
        a.star_rating = Some(4.0);
        a.category = Some("Primary School".into());
        a.phone = Some("0800".into());
        let mut b = school("B");
        b.star_rating = Some(5.0);
        b.category = Some("Secondary School".into());
        let c = School {
            identity: Identity::unresolved(),
            ..school("C")
        };
        let all = vec![a, b, c];

        let s = get_stats(&all);
        assert_eq!(s.total, 3);
        assert_eq!(s.resolved, 2);
        assert_eq!(s.rated, 2);
        assert_eq!(s.with_phone, 1);
        assert_eq!(s.average_stars, Some(4.5));

        let top: Vec<&str> = overview(&all, None, 2)
            .into_iter()
            .map(|s| s.identity.as_str())
            .collect();
        assert_eq!(top, vec!["B", "A"]);
        let primary = overview(&all, Some("primary"), 10);
        assert_eq!(primary.len(), 1);
    }
}
