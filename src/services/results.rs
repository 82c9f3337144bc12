use crate::error::StoreError;
use crate::services::runner::{JobSink, ProcessJob};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

const SEPARATOR_WIDTH: usize = 50;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResultArtifact {
    pub filename: String,
    pub size: u64,
    #[serde(serialize_with = "ser_time")]
    pub created_at: DateTime<Local>,
}

fn ser_time<S: serde::Serializer>(t: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339())
}

pub struct ResultStore {
    dir: PathBuf,
    // serialises name allocation so two saves in one second get distinct suffixes
    write_lock: Mutex<()>,
}

/// Characters outside `[A-Za-z0-9._-]` become `-`; runs of `.` collapse to one.
pub fn sanitize(part: &str) -> String {
    let mut s = String::with_capacity(part.len());
    for c in part.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            c
        } else {
            '-'
        };
        if c == '.' && s.ends_with('.') {
            continue;
        }
        s.push(c);
    }
    if s.is_empty() || s == "." {
        "na".to_string()
    } else {
        s
    }
}

pub fn artifact_stem(tool: &str, target: &str, at: &DateTime<Local>) -> String {
    format!(
        "{}_{}_{}",
        sanitize(tool),
        sanitize(target),
        at.format("%Y%m%d_%H%M%S")
    )
}

// exactly one plain path component
fn valid_name(name: &str) -> bool {
    let mut parts = Path::new(name).components();
    matches!(
        (parts.next(), parts.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn header(job: &ProcessJob) -> String {
        let fmt = |t: Option<DateTime<Local>>| {
            t.map(|t| t.format(TIME_FORMAT).to_string())
                .unwrap_or_else(|| "-".into())
        };
        let mut out = String::new();
        out.push_str(&format!("Tool: {}\n", job.tool_id));
        out.push_str(&format!("Command: {}\n", job.command.display()));
        out.push_str(&format!("Target: {}\n", job.target));
        out.push_str(&format!("Status: {}\n", job.status.label()));
        out.push_str(&format!("Started: {}\n", fmt(job.started_at)));
        out.push_str(&format!("Ended: {}\n", fmt(job.ended_at)));
        out.push_str(&"=".repeat(SEPARATOR_WIDTH));
        out.push_str("\n\n");
        out
    }

    pub fn save(&self, job: &ProcessJob) -> Result<String, StoreError> {
        if !job.status.is_terminal() {
            return Err(StoreError::NotTerminal(job.id));
        }
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Write {
            path: self.dir.clone(),
            source,
        })?;
        if job.output.is_empty() {
            debug!(job = job.id, "archiving a job that produced no output");
        }
        let stamp = job.started_at.unwrap_or_else(Local::now);
        let stem = artifact_stem(&job.tool_id, &job.target, &stamp);
        let mut n = 0usize;
        let (name, mut file) = loop {
            let name = if n == 0 {
                format!("{stem}.txt")
            } else {
                format!("{stem}_{n}.txt")
            };
            let path = self.dir.join(&name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => break (name, f),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(source) => return Err(StoreError::Write { path, source }),
            }
        };
        let path = self.dir.join(&name);
        let write = |f: &mut fs::File| -> std::io::Result<()> {
            f.write_all(Self::header(job).as_bytes())?;
            f.write_all(job.output.bytes())?;
            f.flush()
        };
        if let Err(source) = write(&mut file) {
            // leave no half-written artifact behind
            let _ = fs::remove_file(&path);
            return Err(StoreError::Write { path, source });
        }
        info!(job = job.id, file = %name, bytes = job.output.len(), "saved result");
        Ok(name)
    }

    /// Artifacts newest first; ties broken by filename, descending.
    pub fn list(&self) -> Result<Vec<ResultArtifact>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        let mut out = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".txt") {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            if !meta.is_file() {
                continue;
            }
            let created_at = meta
                .modified()
                .map(DateTime::<Local>::from)
                .unwrap_or_else(|_| Local::now());
            out.push(ResultArtifact {
                filename: name,
                size: meta.len(),
                created_at,
            });
        }
        out.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(out)
    }

    pub fn read(&self, filename: &str) -> Result<Vec<u8>, StoreError> {
        if !valid_name(filename) {
            return Err(StoreError::NotFound(filename.to_string()));
        }
        let path = self.dir.join(filename);
        fs::read(&path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                StoreError::NotFound(filename.to_string())
            } else {
                StoreError::Read { path, source }
            }
        })
    }

    pub fn cleanup(&self, max_files: usize) -> Result<usize, StoreError> {
        let listing = self.list()?;
        let mut removed = 0;
        for a in listing.iter().skip(max_files) {
            let path = self.dir.join(&a.filename);
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(file = %a.filename, "removed old result");
                    removed += 1;
                }
                Err(e) => warn!(?path, "could not remove old result: {e}"),
            }
        }
        if removed > 0 {
            info!(removed, kept = max_files, "result retention applied");
        }
        Ok(removed)
    }
}

impl JobSink for ResultStore {
    fn archive(&self, job: &ProcessJob) -> Result<String, StoreError> {
        self.save(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::template::ResolvedCommand;
    use crate::services::runner::{JobRequest, JobStatus, ProcessRunner, RunnerConfig};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn sanitize_keeps_safe_characters() {
        assert_eq!(sanitize("192.168.1.1"), "192.168.1.1");
        assert_eq!(sanitize("a/b c"), "a-b-c");
        assert_eq!(sanitize("../"), ".-");
        assert_eq!(sanitize("ls ../.."), "ls-.-.");
        assert_eq!(sanitize(""), "na");
    }

    #[test]
    fn stem_embeds_tool_target_and_second() {
        let at = Local::now();
        let stem = artifact_stem("nmap", "192.168.1.1", &at);
        assert_eq!(
            stem,
            format!("nmap_192.168.1.1_{}", at.format("%Y%m%d_%H%M%S"))
        );
    }

    #[test]
    fn missing_directory_lists_empty_and_read_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path().join("nope"));
        assert!(store.list().unwrap().is_empty());
        assert!(matches!(store.read("x.txt"), Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.read("../etc/passwd"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn cleanup_keeps_newest() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["a_1.txt", "b_2.txt", "c_3.txt"] {
            fs::write(tmp.path().join(name), name).unwrap();
        }
        let store = ResultStore::new(tmp.path());
        assert_eq!(store.cleanup(2).unwrap(), 1);
        assert_eq!(store.list().unwrap().len(), 2);
        assert_eq!(store.cleanup(5).unwrap(), 0);
    }

    #[cfg(unix)]
    fn run_echo(store: Arc<ResultStore>, target: &str) -> ProcessRunner {
        let runner = ProcessRunner::build(RunnerConfig::default(), Some(store), None);
        let id = runner
            .start(JobRequest {
                tool_id: "nmap".into(),
                command_id: "quick_scan".into(),
                target: target.into(),
                command: ResolvedCommand {
                    argv: vec!["sh".into(), "-c".into(), "echo scanned".into()],
                    params: vec![("target".into(), target.into())],
                },
                timeout: Duration::from_secs(10),
            })
            .unwrap();
        assert_eq!(
            runner.wait(id),
            Some(JobStatus::Completed { exit_code: 0 })
        );
        runner
    }

    #[cfg(unix)]
    #[test]
    fn finished_job_is_archived_with_header() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(ResultStore::new(tmp.path()));
        let runner = run_echo(Arc::clone(&store), "192.168.1.1");
        let listing = store.list().unwrap();
        assert_eq!(listing.len(), 1);
        let name = &listing[0].filename;
        assert!(name.starts_with("nmap_192.168.1.1_"));
        assert!(name.ends_with(".txt"));
        assert_eq!(runner.poll(1, 0).unwrap().archive, Some(Ok(name.clone())));

        let text = String::from_utf8(store.read(name).unwrap()).unwrap();
        assert!(text.starts_with("Tool: nmap\nCommand: sh -c 'echo scanned'\nTarget: 192.168.1.1\n"));
        assert!(text.contains("Status: completed (exit 0)\n"));
        assert!(text.contains(&format!("{}\n\nscanned\n", "=".repeat(50))));
    }

    #[cfg(unix)]
    #[test]
    fn dotted_target_reads_back_from_listing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(ResultStore::new(tmp.path()));
        run_echo(Arc::clone(&store), "ls ../");
        let listing = store.list().unwrap();
        assert_eq!(listing.len(), 1);
        let name = &listing[0].filename;
        assert!(!name.contains(".."), "{name}");
        let text = String::from_utf8(store.read(name).unwrap()).unwrap();
        assert!(text.contains("Target: ls ../\n"));
        assert!(text.ends_with("scanned\n"));
    }

    #[cfg(unix)]
    #[test]
    fn same_second_collisions_get_suffixes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path());
        let runner = ProcessRunner::new(RunnerConfig::default());
        let id = runner
            .start(JobRequest {
                tool_id: "t".into(),
                command_id: "c".into(),
                target: "x".into(),
                command: ResolvedCommand {
                    argv: vec!["true".into()],
                    params: vec![],
                },
                timeout: Duration::from_secs(5),
            })
            .unwrap();
        runner.wait(id);
        let job = runner.snapshot(id).unwrap();
        let a = store.save(&job).unwrap();
        let b = store.save(&job).unwrap();
        let c = store.save(&job).unwrap();
        assert_ne!(a, b);
        assert!(b.ends_with("_1.txt"));
        assert!(c.ends_with("_2.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn running_job_is_never_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ResultStore::new(tmp.path());
        let runner = ProcessRunner::new(RunnerConfig::default());
        let id = runner
            .start(JobRequest {
                tool_id: "t".into(),
                command_id: "c".into(),
                target: "x".into(),
                command: ResolvedCommand {
                    argv: vec!["sleep".into(), "5".into()],
                    params: vec![],
                },
                timeout: Duration::from_secs(10),
            })
            .unwrap();
        let job = runner.snapshot(id).unwrap();
        if !job.status.is_terminal() {
            assert!(matches!(store.save(&job), Err(StoreError::NotTerminal(_))));
        }
        runner.cancel(id);
        runner.wait(id);
        assert!(store.list().unwrap().is_empty());
    }
}
