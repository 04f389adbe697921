use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::models::{ImageRef, UploadRecord};

pub type History = BTreeMap<String, UploadRecord>;

/// Upload history kept as one JSON object keyed by fingerprint.
///
/// Every mutation reloads the whole file, edits it in memory and replaces the
/// file. Callers must serialize writers; see `MenuPipeline`.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the full mapping. A missing or unreadable file is an empty history.
    #[must_use]
    pub fn load(&self) -> History {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return History::new(),
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "failed reading upload history");
                return History::new();
            }
        };

        let entries: Map<String, Value> = match serde_json::from_str(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                tracing::error!(path = %self.path.display(), "upload history is not a JSON object, ignoring it");
                return History::new();
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "upload history is corrupt, ignoring it");
                return History::new();
            }
        };

        entries
            .into_iter()
            .filter_map(|(hash, value)| match serde_json::from_value::<UploadRecord>(value) {
                Ok(record) => Some((hash, record)),
                Err(e) => {
                    tracing::warn!(%hash, error = %e, "dropping unreadable history entry");
                    None
                }
            })
            .collect()
    }

    #[must_use]
    pub fn get(&self, fingerprint: &str) -> Option<UploadRecord> {
        self.load().remove(fingerprint)
    }

    /// Upserts the entry for `fingerprint`, replacing its dish and image lists.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Persistence` if the history file can't be written.
    pub fn record(
        &self,
        fingerprint: &str,
        filename: &str,
        dishes: &[String],
        images: &[ImageRef],
    ) -> Result<UploadRecord, PipelineError> {
        let mut history = self.load();
        let upload_count = history
            .get(fingerprint)
            .map_or(1, |prev| prev.upload_count.saturating_add(1));

        let record = UploadRecord {
            original_filename: filename.to_string(),
            dishes: dishes.to_vec(),
            generated_images: images.to_vec(),
            timestamp: now_secs(),
            upload_count,
        };
        history.insert(fingerprint.to_string(), record.clone());
        self.save(&history)?;
        Ok(record)
    }

    /// Counts a repeat submission of a cached fingerprint.
    ///
    /// Returns `Ok(None)` when there is no entry to touch.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Persistence` if the history file can't be written.
    pub fn touch(&self, fingerprint: &str) -> Result<Option<UploadRecord>, PipelineError> {
        let mut history = self.load();
        let Some(record) = history.get_mut(fingerprint) else {
            return Ok(None);
        };
        record.upload_count = record.upload_count.saturating_add(1);
        record.timestamp = now_secs();
        let updated = record.clone();
        self.save(&history)?;
        Ok(Some(updated))
    }

    fn save(&self, history: &History) -> Result<(), PipelineError> {
        let persist = || -> anyhow::Result<()> {
            let dir = match self.path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            std::fs::create_dir_all(dir)?;

            let body = serde_json::to_vec_pretty(history)?;
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            tmp.write_all(&body)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&self.path)?;
            Ok(())
        };

        persist().map_err(|e| PipelineError::Persistence(format!("{}: {e:#}", self.path.display())))
    }
}

#[allow(clippy::cast_precision_loss)]
fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images(names: &[(&str, &str)]) -> Vec<ImageRef> {
        names.iter().map(|(d, f)| ImageRef::new(d, f)).collect()
    }

    #[test]
    fn missing_file_is_empty_history() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = HistoryStore::new(tmp.path().join("nope.json"));
        assert!(store.load().is_empty());
        assert!(store.get("abc").is_none());
        Ok(())
    }

    #[test]
    fn record_then_get() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = HistoryStore::new(tmp.path().join("history.json"));

        let dishes = vec!["Tacos".to_string(), "Tacos".to_string()];
        let imgs = images(&[("Tacos", "tacos.png")]);
        let rec = store.record("h1", "menu.jpg", &dishes, &imgs)?;
        assert_eq!(rec.upload_count, 1);

        let got = store.get("h1").expect("recorded");
        assert_eq!(got.original_filename, "menu.jpg");
        assert_eq!(got.dishes, dishes);
        assert_eq!(got.generated_images, imgs);
        assert_eq!(got.generated_images[0].path, "/image/tacos.png");
        Ok(())
    }

    #[test]
    fn re_record_replaces_lists_and_counts() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = HistoryStore::new(tmp.path().join("history.json"));

        store.record("h1", "a.jpg", &["Soup".into(), "Salad".into()], &[])?;
        let rec = store.record("h1", "b.jpg", &["Pie".into()], &images(&[("Pie", "pie.png")]))?;

        assert_eq!(rec.upload_count, 2);
        assert_eq!(rec.dishes, vec!["Pie".to_string()]);
        assert_eq!(store.get("h1").map(|r| r.original_filename), Some("b.jpg".into()));
        Ok(())
    }

    #[test]
    fn touch_increments_without_replacing() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let store = HistoryStore::new(tmp.path().join("history.json"));
        assert!(store.touch("h1")?.is_none());

        store.record("h1", "a.jpg", &["Soup".into()], &images(&[("Soup", "soup.png")]))?;
        let touched = store.touch("h1")?.expect("present");
        assert_eq!(touched.upload_count, 2);
        assert_eq!(touched.dishes, vec!["Soup".to_string()]);
        assert_eq!(store.get("h1").map(|r| r.upload_count), Some(2));
        Ok(())
    }

    #[test]
    fn corrupt_file_loads_empty_and_is_rewritten() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("history.json");
        std::fs::write(&path, "{ not json")?;

        let store = HistoryStore::new(&path);
        assert!(store.load().is_empty());

        store.record("h1", "a.jpg", &["Soup".into()], &[])?;
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert!(raw.get("h1").is_some());
        Ok(())
    }

    #[test]
    fn tolerates_legacy_and_unknown_fields() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("history.json");
        std::fs::write(
            &path,
            r#"{
                "old": {"filename": "m.jpg", "dishes": ["Flan"], "timestamp": 1700000000.5},
                "new": {"filename": "n.jpg", "upload_count": 4, "future_field": true},
                "broken": {"dishes": "not a list"}
            }"#,
        )?;

        let history = HistoryStore::new(&path).load();
        assert_eq!(history.len(), 2);
        assert_eq!(history["old"].upload_count, 1);
        assert_eq!(history["old"].dishes, vec!["Flan".to_string()]);
        assert!(history["old"].generated_images.is_empty());
        assert_eq!(history["new"].upload_count, 4);
        Ok(())
    }

    #[test]
    fn unwritable_location_is_persistence_error() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        // A regular file where the parent directory should be.
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"x")?;
        let store = HistoryStore::new(blocker.join("history.json"));

        let err = store.record("h1", "a.jpg", &[], &[]);
        assert!(matches!(err, Err(PipelineError::Persistence(_))));
        Ok(())
    }
}
