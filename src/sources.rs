//! # Filesystem Record Sources
//!
//! `SourceLister`/`SourceReader` over the host's on-disk layout: a
//! directory of `<uuid>.json` record files, each carrying the entity's
//! cumulative counter totals as a two-level object:
//!
//! ```json
//! {"stats": {"mined": {"minecraft:stone": 42}, "killed": {"zombie": 7}}}
//! ```
//!
//! Unknown top-level fields are ignored; files whose stem is not a UUID
//! are skipped at enumeration time.

use crate::indexer::{SourceLister, SourceReader};
use crate::model::{SourceInfo, StoreError};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;
use tracing::warn;

/// Record sources stored as one JSON file per entity in a directory.
pub struct FsStatSources {
    dir: PathBuf,
}

impl FsStatSources {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SourceLister for FsStatSources {
    fn list_sources(&self) -> Result<Vec<SourceInfo>, StoreError> {
        let mut sources = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let Ok(entity) = stem.parse::<uuid::Uuid>() else {
                warn!(file = %path.display(), "skipping record file without a UUID name");
                continue;
            };
            let modified = entry.metadata()?.modified()?;
            let modified_ms = modified
                .duration_since(UNIX_EPOCH)
                .map(|age| age.as_millis() as i64)
                .unwrap_or(0);
            sources.push(SourceInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                entity,
                modified_ms,
            });
        }
        Ok(sources)
    }
}

impl SourceReader for FsStatSources {
    fn for_each_counter(
        &self,
        source: &SourceInfo,
        f: &mut dyn FnMut(&str, &str, i64),
    ) -> Result<(), StoreError> {
        let file = File::open(self.dir.join(&source.name))?;
        let root: Value = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| parse_err(source, &err.to_string()))?;
        let Some(stats) = root.get("stats") else {
            // A record file with no counters yet.
            return Ok(());
        };
        let Some(categories) = stats.as_object() else {
            return Err(parse_err(source, "stats is not an object"));
        };
        for (category, entries) in categories {
            let Some(entries) = entries.as_object() else {
                return Err(parse_err(source, "stat category is not an object"));
            };
            for (name, value) in entries {
                let Some(value) = value.as_i64() else {
                    return Err(parse_err(source, "counter value is not an integer"));
                };
                f(category, name, value);
            }
        }
        Ok(())
    }
}

fn parse_err(source: &SourceInfo, detail: &str) -> StoreError {
    StoreError::SourceParse {
        source: source.name.clone(),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn write_record(dir: &std::path::Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn lists_uuid_named_json_files_only() {
        let dir = tempdir().unwrap();
        let player = Uuid::new_v4();
        write_record(dir.path(), &format!("{player}.json"), "{}");
        write_record(dir.path(), "not-a-uuid.json", "{}");
        write_record(dir.path(), "README.txt", "notes");

        let sources = FsStatSources::new(dir.path()).list_sources().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].entity, player);
        assert_eq!(sources[0].name, format!("{player}.json"));
        assert!(sources[0].modified_ms > 0);
    }

    #[test]
    fn walks_the_two_level_stats_object() {
        let dir = tempdir().unwrap();
        let player = Uuid::new_v4();
        write_record(
            dir.path(),
            &format!("{player}.json"),
            r#"{"stats": {"mined": {"minecraft:stone": 42, "minecraft:dirt": 7},
                          "killed": {"zombie": 3}},
                "dataVersion": 3465}"#,
        );

        let fs = FsStatSources::new(dir.path());
        let source = fs.list_sources().unwrap().remove(0);
        let mut triples = Vec::new();
        fs.for_each_counter(&source, &mut |category, name, value| {
            triples.push((category.to_string(), name.to_string(), value));
        })
        .unwrap();

        triples.sort();
        assert_eq!(
            triples,
            vec![
                ("killed".into(), "zombie".into(), 3),
                ("mined".into(), "minecraft:dirt".into(), 7),
                ("mined".into(), "minecraft:stone".into(), 42),
            ]
        );
    }

    #[test]
    fn record_without_stats_yields_nothing() {
        let dir = tempdir().unwrap();
        let player = Uuid::new_v4();
        write_record(dir.path(), &format!("{player}.json"), r#"{"dataVersion": 1}"#);

        let fs = FsStatSources::new(dir.path());
        let source = fs.list_sources().unwrap().remove(0);
        let mut count = 0;
        fs.for_each_counter(&source, &mut |_, _, _| count += 1).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn malformed_json_is_a_source_parse_error() {
        let dir = tempdir().unwrap();
        let player = Uuid::new_v4();
        write_record(dir.path(), &format!("{player}.json"), "{truncated");

        let fs = FsStatSources::new(dir.path());
        let source = fs.list_sources().unwrap().remove(0);
        let err = fs.for_each_counter(&source, &mut |_, _, _| {}).unwrap_err();
        assert!(matches!(err, StoreError::SourceParse { .. }));
    }

    #[test]
    fn non_integer_counter_is_a_source_parse_error() {
        let dir = tempdir().unwrap();
        let player = Uuid::new_v4();
        write_record(
            dir.path(),
            &format!("{player}.json"),
            r#"{"stats": {"mined": {"minecraft:stone": "many"}}}"#,
        );

        let fs = FsStatSources::new(dir.path());
        let source = fs.list_sources().unwrap().remove(0);
        let err = fs.for_each_counter(&source, &mut |_, _, _| {}).unwrap_err();
        assert!(matches!(err, StoreError::SourceParse { .. }));
    }
}
