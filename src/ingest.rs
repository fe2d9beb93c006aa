//! Sketching jobs: JSON Lines file → [`TableSketch`] → sketch store.
//!
//! Each file is one job. A job hashes the file, skips it when the stored
//! table already has the same content hash (unless forced), streams its
//! records through a fresh `TableSketch` on a blocking thread, and
//! persists the table row and its column sketches. Jobs share no mutable
//! state and run concurrently on a [`JoinSet`].

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use findopendata_core::column::SketchParams;
use findopendata_core::store::{SketchStore, TableRecord};
use findopendata_core::table::TableSketch;
use findopendata_core::value::Record;

use crate::config::{Config, SketchConfig};
use crate::db;
use crate::progress::{JobStatus, SketchProgressEvent, SketchProgressReporter};
use crate::sqlite_store::SqliteStore;

/// Per-job settings shared by every file of one `fod sketch` invocation.
#[derive(Debug, Clone)]
pub struct SketchJob {
    pub source: String,
    /// Table name; defaults to the file stem.
    pub name: Option<String>,
    pub force: bool,
    pub params: SketchParams,
    pub record_sample_size: usize,
    pub max_records: Option<u64>,
}

impl SketchJob {
    pub fn new(source: impl Into<String>, sketch: &SketchConfig) -> Self {
        Self {
            source: source.into(),
            name: None,
            force: false,
            params: sketch.params(),
            record_sample_size: sketch.record_sample_size,
            max_records: sketch.max_records,
        }
    }
}

/// Result of one file job.
#[derive(Debug, Clone)]
pub struct SketchOutcome {
    pub path: PathBuf,
    pub table_id: String,
    pub name: String,
    pub status: JobStatus,
    pub records: u64,
    /// Column name and sketch id, in column order.
    pub columns: Vec<(String, String)>,
}

/// SHA-256 hex digest of a file's bytes.
pub fn content_hash(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Lazily parse a JSON Lines stream of objects into ordered records.
pub fn read_records<R: Read>(reader: R) -> impl Iterator<Item = Result<Record>> {
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<Record>()
        .map(|r| r.context("malformed JSON record"))
}

/// Stream every record of `path` through a new table sketch.
pub fn sketch_file(path: &Path, job: &SketchJob) -> Result<TableSketch> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut sketch = TableSketch::new(job.params.clone(), job.record_sample_size);
    let records = read_records(BufReader::new(file))
        .enumerate()
        .map(|(i, record)| {
            record.with_context(|| format!("{}: record {}", path.display(), i + 1))
        });
    sketch.try_extend(records, job.max_records)?;
    Ok(sketch)
}

fn table_name(path: &Path, job: &SketchJob) -> Result<String> {
    if let Some(name) = &job.name {
        return Ok(name.clone());
    }
    match path.file_stem().and_then(|s| s.to_str()) {
        Some(stem) if !stem.is_empty() => Ok(stem.to_string()),
        _ => bail!("cannot derive a table name from {}", path.display()),
    }
}

/// Run one file job against `store`.
pub async fn sketch_and_store<S: SketchStore>(
    store: &S,
    path: &Path,
    job: &SketchJob,
) -> Result<SketchOutcome> {
    let name = table_name(path, job)?;

    let hash_path = path.to_path_buf();
    let hash = tokio::task::spawn_blocking(move || content_hash(&hash_path)).await??;

    let existing = store.get_table(&job.source, &name).await?;
    if let Some(table) = &existing {
        if table.content_hash == hash && !job.force {
            info!(file = %path.display(), table = %name, "content unchanged, skipping");
            return Ok(SketchOutcome {
                path: path.to_path_buf(),
                table_id: table.id.clone(),
                name,
                status: JobStatus::Unchanged,
                records: table.record_count,
                columns: Vec::new(),
            });
        }
    }

    let sketch_path = path.to_path_buf();
    let sketch_job = job.clone();
    let sketch = tokio::task::spawn_blocking(move || sketch_file(&sketch_path, &sketch_job)).await??;

    let now = chrono::Utc::now().timestamp();
    let table = TableRecord {
        id: existing
            .as_ref()
            .map(|t| t.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        source: job.source.clone(),
        name: name.clone(),
        content_hash: hash,
        record_sample: sketch.record_sample().to_vec(),
        record_count: sketch.record_count(),
        created_at: existing.as_ref().map(|t| t.created_at).unwrap_or(now),
        updated_at: now,
    };
    let table_id = store.upsert_table(&table).await?;
    let records = sketch.to_records();
    let ids = store.replace_columns(&table_id, &records).await?;

    info!(
        file = %path.display(),
        table = %name,
        table_id = %table_id,
        records = sketch.record_count(),
        columns = ids.len(),
        "sketch job complete"
    );

    Ok(SketchOutcome {
        path: path.to_path_buf(),
        table_id,
        name,
        status: JobStatus::Sketched,
        records: sketch.record_count(),
        columns: records.into_iter().map(|r| r.column_name).zip(ids).collect(),
    })
}

/// Sketch every file concurrently, one job per file.
///
/// Failed jobs are reported and do not stop the others; the call fails at
/// the end if any job failed.
pub async fn run_sketch<S: SketchStore + 'static>(
    store: Arc<S>,
    files: Vec<PathBuf>,
    job: SketchJob,
    reporter: &dyn SketchProgressReporter,
) -> Result<Vec<SketchOutcome>> {
    if job.name.is_some() && files.len() > 1 {
        bail!("--name can only be used with a single file");
    }
    // two jobs writing one (source, name) would overwrite each other
    let mut names: HashMap<String, &Path> = HashMap::new();
    for path in &files {
        let Ok(name) = table_name(path, &job) else {
            continue;
        };
        if let Some(first) = names.insert(name.clone(), path) {
            bail!(
                "{} and {} both map to table {:?}",
                first.display(),
                path.display(),
                name
            );
        }
    }

    let total = files.len() as u64;
    let job = Arc::new(job);
    let mut set = JoinSet::new();
    for path in files {
        let store = store.clone();
        let job = job.clone();
        set.spawn(async move {
            let result = sketch_and_store(store.as_ref(), &path, &job).await;
            (path, result)
        });
    }

    let mut outcomes = Vec::new();
    let mut failures = 0usize;
    let mut n = 0u64;
    while let Some(joined) = set.join_next().await {
        let (path, result) = joined.context("sketch job panicked")?;
        n += 1;
        match result {
            Ok(outcome) => {
                reporter.report(SketchProgressEvent {
                    file: path.display().to_string(),
                    status: outcome.status,
                    records: outcome.records,
                    n,
                    total,
                });
                outcomes.push(outcome);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %format!("{:#}", e), "sketch job failed");
                reporter.report(SketchProgressEvent {
                    file: path.display().to_string(),
                    status: JobStatus::Failed,
                    records: 0,
                    n,
                    total,
                });
                failures += 1;
            }
        }
    }

    // completion order is nondeterministic
    outcomes.sort_by(|a, b| a.path.cmp(&b.path));
    if failures > 0 {
        bail!("{} of {} sketch jobs failed", failures, total);
    }
    Ok(outcomes)
}

/// `fod sketch` entry point.
pub async fn run_sketch_cmd(
    config: &Config,
    files: Vec<PathBuf>,
    source: String,
    name: Option<String>,
    force: bool,
    reporter: &dyn SketchProgressReporter,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStore::new(pool.clone()));

    let mut job = SketchJob::new(source, &config.sketch);
    job.name = name;
    job.force = force;

    let result = run_sketch(store, files, job, reporter).await;
    pool.close().await;
    let outcomes = result?;

    for outcome in &outcomes {
        println!("sketch {}", outcome.path.display());
        println!("  table: {} ({})", outcome.name, outcome.table_id);
        match outcome.status {
            JobStatus::Unchanged => println!("  unchanged, skipped (use --force to re-sketch)"),
            _ => {
                println!("  records: {}", outcome.records);
                println!("  columns: {}", outcome.columns.len());
                for (column, id) in &outcome.columns {
                    println!("    {}  {}", id, column);
                }
            }
        }
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use findopendata_core::store::memory::InMemoryStore;
    use std::io::Write;

    fn write_jsonl(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        path
    }

    fn job() -> SketchJob {
        SketchJob::new("test.org", &SketchConfig::default())
    }

    #[test]
    fn reads_records_in_key_order() {
        let data = "{\"b\": 1, \"a\": \"x\"}\n\n{\"c\": null}\n";
        let records: Vec<Record> = read_records(data.as_bytes()).collect::<Result<_>>().unwrap();
        assert_eq!(records.len(), 2);
        let keys: Vec<&str> = records[0].keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn malformed_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jsonl(dir.path(), "bad.jsonl", &["{\"a\": 1}", "{oops"]);
        assert!(sketch_file(&path, &job()).is_err());
    }

    #[test]
    fn max_records_caps_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        let lines: Vec<String> = (0..10).map(|i| format!("{{\"n\": {}}}", i)).collect();
        let lines: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
        let path = write_jsonl(dir.path(), "n.jsonl", &lines);
        let mut j = job();
        j.max_records = Some(3);
        let sketch = sketch_file(&path, &j).unwrap();
        assert_eq!(sketch.record_count(), 3);

        // lines past the cap are never parsed
        let path = write_jsonl(dir.path(), "tail.jsonl", &["{\"n\": 1}", "{oops"]);
        j.max_records = Some(1);
        assert_eq!(sketch_file(&path, &j).unwrap().record_count(), 1);
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jsonl");
        File::create(&path).unwrap();
        assert_eq!(
            content_hash(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn unchanged_file_is_skipped_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_jsonl(
            dir.path(),
            "parks.jsonl",
            &["{\"name\": \"Elm\", \"zip\": 10001}", "{\"name\": \"Oak\", \"zip\": 10002}"],
        );
        let store = InMemoryStore::new();

        let first = sketch_and_store(&store, &path, &job()).await.unwrap();
        assert_eq!(first.status, JobStatus::Sketched);
        assert_eq!(first.name, "parks");
        assert_eq!(first.records, 2);
        let names: Vec<&str> = first.columns.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(names, vec!["name", "zip"]);

        let second = sketch_and_store(&store, &path, &job()).await.unwrap();
        assert_eq!(second.status, JobStatus::Unchanged);
        assert_eq!(second.table_id, first.table_id);

        let mut forced = job();
        forced.force = true;
        let third = sketch_and_store(&store, &path, &forced).await.unwrap();
        assert_eq!(third.status, JobStatus::Sketched);
        assert_eq!(third.columns, first.columns);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_jobs_report_each_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_jsonl(dir.path(), "a.jsonl", &["{\"x\": 1}"]);
        let b = write_jsonl(dir.path(), "b.jsonl", &["{\"y\": 2}", "{\"y\": 3}"]);
        let store = Arc::new(InMemoryStore::new());

        let outcomes = run_sketch(store.clone(), vec![b.clone(), a.clone()], job(), &crate::progress::NoProgress)
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].path, a);
        assert_eq!(outcomes[1].records, 2);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn name_with_multiple_files_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let mut j = job();
        j.name = Some("t".into());
        let err = run_sketch(
            store,
            vec![PathBuf::from("a"), PathBuf::from("b")],
            j,
            &crate::progress::NoProgress,
        )
        .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn duplicate_table_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a")).unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        let first = write_jsonl(&dir.path().join("a"), "x.jsonl", &["{\"k\": 1}"]);
        let second = write_jsonl(&dir.path().join("b"), "x.jsonl", &["{\"k\": 2}"]);

        let store = Arc::new(InMemoryStore::new());
        let err = run_sketch(
            store.clone(),
            vec![first, second],
            job(),
            &crate::progress::NoProgress,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("\"x\""), "{}", err);
        assert!(store.is_empty());
        assert!(store.get_table("test.org", "x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_fails_its_job() {
        let store = Arc::new(InMemoryStore::new());
        let result = run_sketch(
            store,
            vec![PathBuf::from("/nonexistent/file.jsonl")],
            job(),
            &crate::progress::NoProgress,
        )
        .await;
        assert!(result.is_err());
    }
}
