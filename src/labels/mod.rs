//! Shared label mapping.
//!
//! A read-mostly table from node key to an ordered list of labels,
//! consumed by the pipeline on every message and rebuilt wholesale from
//! a CSV file when the refresh trigger fires. Readers take an `Arc`
//! snapshot, so a refresh concurrent with reads never yields a lookup
//! mixing old and new entries.

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::telemetry::counters;

/// One immutable snapshot of the mapping.
pub type LabelSnapshot = Arc<HashMap<String, Vec<String>>>;

/// Handle to the shared label mapping. Cheap to clone; all clones see
/// the same table.
#[derive(Clone)]
pub struct LabelMap {
    inner: Arc<ArcSwap<HashMap<String, Vec<String>>>>,
}

impl LabelMap {
    /// An empty mapping.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(HashMap::new())),
        }
    }

    /// Build a mapping from a CSV file, or empty when no path is
    /// configured.
    pub fn from_file(path: Option<&Path>) -> Result<Self> {
        let map = Self::empty();
        if let Some(path) = path {
            map.refresh_from(path)?;
        }
        Ok(map)
    }

    /// Current snapshot. Lookups against the snapshot are consistent
    /// even while a replacement happens.
    pub fn snapshot(&self) -> LabelSnapshot {
        self.inner.load_full()
    }

    /// Replace the whole mapping atomically.
    pub fn replace(&self, map: HashMap<String, Vec<String>>) {
        counters::labels_refreshed(map.len());
        self.inner.store(Arc::new(map));
    }

    /// Rebuild the mapping from a CSV file of `key,value,value,...`
    /// rows. Blank lines and `#` comments are skipped; a row without
    /// values is skipped with a warning.
    pub fn refresh_from(&self, path: &Path) -> Result<usize> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read label file: {}", path.display()))?;

        let mut map = HashMap::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split(',').map(str::trim);
            let key = fields.next().unwrap_or_default();
            let values: Vec<String> = fields
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();

            if key.is_empty() || values.is_empty() {
                warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    "skipping malformed label row"
                );
                continue;
            }

            map.insert(key.to_string(), values);
        }

        let entries = map.len();
        self.replace(map);

        info!(path = %path.display(), entries, "label mapping refreshed");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_csv(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("dialoutd-labels-{name}-{}", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn parses_csv_rows() {
        let path = temp_csv(
            "parse",
            "# node labels\n10.0.0.1,edge,zrh\n\n10.0.0.2,core\nbroken-row,\n",
        );

        let labels = LabelMap::empty();
        let entries = labels.refresh_from(&path).unwrap();
        assert_eq!(entries, 2);

        let snapshot = labels.snapshot();
        assert_eq!(
            snapshot.get("10.0.0.1").unwrap(),
            &vec!["edge".to_string(), "zrh".to_string()]
        );
        assert_eq!(snapshot.get("10.0.0.2").unwrap(), &vec!["core".to_string()]);
        assert!(!snapshot.contains_key("broken-row"));

        fs::remove_file(path).ok();
    }

    #[test]
    fn snapshot_survives_replacement() {
        let labels = LabelMap::empty();
        labels.replace(HashMap::from([(
            "10.0.0.1".to_string(),
            vec!["old".to_string()],
        )]));

        let before = labels.snapshot();
        labels.replace(HashMap::from([(
            "10.0.0.1".to_string(),
            vec!["new".to_string()],
        )]));

        // The old snapshot is still internally consistent
        assert_eq!(before.get("10.0.0.1").unwrap(), &vec!["old".to_string()]);
        assert_eq!(
            labels.snapshot().get("10.0.0.1").unwrap(),
            &vec!["new".to_string()]
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let labels = LabelMap::empty();
        assert!(labels
            .refresh_from(Path::new("/nonexistent/labels.csv"))
            .is_err());
    }
}
