// src/store/mod.rs
//! Durable article store and the JSON document helpers shared by every
//! persisted file.

pub mod logs;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::article::{Article, ClassificationStatus};
use crate::config::PathsConfig;

/// Serialize to `<file>.tmp` next to `path`, then rename over it.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    f.write_all(json.as_bytes())
        .with_context(|| format!("writing {}", tmp.display()))?;
    f.sync_all().ok();
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

/// Read a JSON document; missing or malformed yields `T::default()` with a
/// warning.
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let raw = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = ?e, "unreadable document; using empty default");
            return T::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed document; using empty default");
            T::default()
        }
    }
}

/// Persistent mapping id → article with uniqueness by dedup key.
pub trait ArticleStore {
    fn get(&self, id: &str) -> Option<&Article>;
    /// Whether an article with this dedup key is already stored.
    fn contains_key(&self, dedup_key: &str) -> bool;
    /// Insert a new article. Returns `false` (and stores nothing) when the id
    /// or the dedup key is already present.
    fn put(&mut self, article: Article) -> bool;
    /// Returns `false` for an unknown id.
    fn set_status(&mut self, id: &str, status: ClassificationStatus) -> bool;
    /// Drop articles whose publish date (in `tz`) is before `cutoff`.
    fn prune(&mut self, cutoff: NaiveDate, tz: &FixedOffset) -> usize;
    fn articles(&self) -> Vec<&Article>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn persist(&self) -> Result<()>;
}

/// JSON object `{id: article}` on disk.
#[derive(Debug)]
pub struct JsonArticleStore {
    path: PathBuf,
    legacy_copy: Option<PathBuf>,
    by_id: BTreeMap<String, Article>,
    by_key: HashMap<String, String>,
}

impl JsonArticleStore {
    /// Load from `path`; when it does not exist, fall back to `legacy` (read
    /// only). A malformed document loads as empty, and records that fail to
    /// parse individually are dropped.
    pub fn open(path: impl Into<PathBuf>, legacy: Option<&Path>) -> Self {
        let path = path.into();
        let source = match legacy {
            Some(l) if !path.exists() && l.exists() => {
                debug!(legacy = %l.display(), "primary store absent; reading legacy copy");
                l.to_path_buf()
            }
            _ => path.clone(),
        };
        let doc: BTreeMap<String, serde_json::Value> = load_json_or_default(&source);

        let mut store = Self {
            path,
            legacy_copy: None,
            by_id: BTreeMap::new(),
            by_key: HashMap::new(),
        };
        let mut dropped = 0usize;
        for (id, value) in doc {
            match serde_json::from_value::<Article>(value) {
                Ok(a) if a.id == id => {
                    if !store.put(a) {
                        dropped += 1;
                    }
                }
                Ok(_) => dropped += 1,
                Err(e) => {
                    debug!(%id, error = %e, "dropping malformed article record");
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            warn!(dropped, path = %source.display(), "dropped unusable article records");
        }
        store
    }

    /// Open the store at the configured locations; legacy copies are written
    /// on persist when enabled.
    pub fn from_paths(paths: &PathsConfig) -> Self {
        let legacy = paths.legacy_articles();
        let mut store = Self::open(paths.articles(), Some(legacy.as_path()));
        if paths.write_legacy_files {
            store.legacy_copy = Some(legacy);
        }
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArticleStore for JsonArticleStore {
    fn get(&self, id: &str) -> Option<&Article> {
        self.by_id.get(id)
    }

    fn contains_key(&self, dedup_key: &str) -> bool {
        self.by_key.contains_key(dedup_key)
    }

    fn put(&mut self, article: Article) -> bool {
        let key = article.dedup_key();
        if self.by_id.contains_key(&article.id) || self.by_key.contains_key(&key) {
            return false;
        }
        self.by_key.insert(key, article.id.clone());
        self.by_id.insert(article.id.clone(), article);
        true
    }

    fn set_status(&mut self, id: &str, status: ClassificationStatus) -> bool {
        match self.by_id.get_mut(id) {
            Some(a) => {
                a.classification = status;
                true
            }
            None => false,
        }
    }

    fn prune(&mut self, cutoff: NaiveDate, tz: &FixedOffset) -> usize {
        let before = self.by_id.len();
        self.by_id.retain(|_, a| a.publish_date(tz) >= cutoff);
        let by_id = &self.by_id;
        self.by_key.retain(|_, id| by_id.contains_key(id));
        before - self.by_id.len()
    }

    fn articles(&self) -> Vec<&Article> {
        self.by_id.values().collect()
    }

    fn len(&self) -> usize {
        self.by_id.len()
    }

    fn persist(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.by_id)?;
        if let Some(copy) = &self.legacy_copy {
            write_json_atomic(copy, &self.by_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::Indicator;
    use crate::ingest::types::FeedEntry;
    use chrono::{Duration, TimeZone};

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn article(title: &str, link: &str, days_ago: i64) -> Article {
        let at = kst().with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap() - Duration::days(days_ago);
        let e = FeedEntry {
            title: title.into(),
            link: link.into(),
            published: String::new(),
            summary: String::new(),
        };
        Article::from_entry(Indicator::DcVacancy, &e, at, at)
    }

    #[test]
    fn put_rejects_duplicate_id_and_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = JsonArticleStore::open(dir.path().join("a.json"), None);
        assert!(s.put(article("Vacancy rises", "https://x.com/a?utm_source=z", 0)));
        // same normalized link, different title
        assert!(!s.put(article("Other headline", "https://X.com/a/", 0)));
        assert!(!s.put(article("Vacancy rises", "https://x.com/a", 0)));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn prune_boundary_is_inclusive_of_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = JsonArticleStore::open(dir.path().join("a.json"), None);
        s.put(article("keep", "https://x.com/keep", 45));
        s.put(article("drop", "https://x.com/drop", 46));
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap() - Duration::days(45);
        assert_eq!(s.prune(cutoff, &kst()), 1);
        let titles: Vec<_> = s.articles().iter().map(|a| a.title.clone()).collect();
        assert_eq!(titles, vec!["keep".to_string()]);
        // key index follows
        assert!(!s.contains_key("L:https://x.com/drop"));
        assert!(s.put(article("drop", "https://x.com/drop", 0)));
    }

    #[test]
    fn persist_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/articles.json");
        let mut s = JsonArticleStore::open(&path, None);
        let a = article("Vacancy rises", "https://x.com/a", 1);
        let id = a.id.clone();
        s.put(a);
        s.set_status(&id, ClassificationStatus::SkippedPrefilter);
        s.persist().unwrap();
        assert!(!dir.path().join("nested/articles.json.tmp").exists());

        let r = JsonArticleStore::open(&path, None);
        assert_eq!(r.len(), 1);
        assert_eq!(
            r.get(&id).unwrap().classification,
            ClassificationStatus::SkippedPrefilter
        );
    }

    #[test]
    fn malformed_document_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.json");
        fs::write(&path, "{not json").unwrap();
        assert!(JsonArticleStore::open(&path, None).is_empty());

        let good = article("Vacancy rises", "https://x.com/a", 1);
        let mut doc = serde_json::Map::new();
        doc.insert(good.id.clone(), serde_json::to_value(&good).unwrap());
        doc.insert("bad".into(), serde_json::json!({"title": 3}));
        fs::write(&path, serde_json::Value::Object(doc).to_string()).unwrap();
        assert_eq!(JsonArticleStore::open(&path, None).len(), 1);
    }

    #[test]
    fn legacy_copy_is_read_when_primary_absent() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("legacy.json");
        let mut l = JsonArticleStore::open(&legacy, None);
        l.put(article("Vacancy rises", "https://x.com/a", 1));
        l.persist().unwrap();

        let s = JsonArticleStore::open(dir.path().join("data/articles.json"), Some(legacy.as_path()));
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn load_json_or_default_handles_missing() {
        let dir = tempfile::tempdir().unwrap();
        let v: Vec<u32> = load_json_or_default(&dir.path().join("nope.json"));
        assert!(v.is_empty());
    }
}
