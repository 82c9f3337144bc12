use crate::error::{RunnerError, StoreError};
use crate::menu::template::ResolvedCommand;
use crate::services::killers::{GroupKiller, Killer};
use crate::services::output::OutputBuffer;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub type JobId = u64;

const READ_CHUNK: usize = 4096;
// finished jobs kept in memory for polling; older ones are forgotten
const MAX_FINISHED_JOBS: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed { exit_code: i32 },
    Failed { reason: String },
    TimedOut,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Running => 1,
            _ => 2,
        }
    }

    pub fn label(&self) -> String {
        match self {
            JobStatus::Pending => "pending".into(),
            JobStatus::Running => "running".into(),
            JobStatus::Completed { exit_code } => format!("completed (exit {exit_code})"),
            JobStatus::Failed { reason } => format!("failed: {reason}"),
            JobStatus::TimedOut => "timed out".into(),
            JobStatus::Cancelled => "cancelled".into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct JobRequest {
    pub tool_id: String,
    pub command_id: String,
    pub target: String,
    pub command: ResolvedCommand,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ProcessJob {
    pub id: JobId,
    pub tool_id: String,
    pub command_id: String,
    pub target: String,
    pub command: ResolvedCommand,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Local>>,
    pub ended_at: Option<DateTime<Local>>,
    pub output: OutputBuffer,
    // filename of the archived artifact, or why archiving failed
    pub archive: Option<Result<String, String>>,
    started: Option<Instant>,
    ended: Option<Instant>,
}

impl ProcessJob {
    fn new(id: JobId, req: JobRequest, max_output: usize) -> Self {
        Self {
            id,
            tool_id: req.tool_id,
            command_id: req.command_id,
            target: req.target,
            command: req.command,
            status: JobStatus::Pending,
            started_at: None,
            ended_at: None,
            output: OutputBuffer::new(max_output),
            archive: None,
            started: None,
            ended: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match (self.started, self.ended) {
            (Some(s), Some(e)) => e.saturating_duration_since(s),
            (Some(s), None) => s.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Status changes only ever move forward; a terminal status is final.
    fn transition(&mut self, next: JobStatus) -> bool {
        if self.status.is_terminal() || next.rank() <= self.status.rank() {
            return false;
        }
        let now = Instant::now();
        if next == JobStatus::Running {
            self.started = Some(now);
            self.started_at = Some(Local::now());
        }
        if next.is_terminal() {
            self.output.seal();
            self.ended = Some(now);
            self.ended_at = Some(Local::now());
            if self.started.is_none() {
                self.started = Some(now);
                self.started_at = self.ended_at;
            }
        }
        self.status = next;
        true
    }
}

#[derive(Clone, Debug)]
pub struct JobPoll {
    pub id: JobId,
    pub status: JobStatus,
    pub elapsed: Duration,
    pub output: Vec<u8>,
    pub next_offset: usize,
    pub truncated: bool,
    pub archive: Option<Result<String, String>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct JobReport {
    pub id: JobId,
    pub tool_id: String,
    pub command_id: String,
    pub target: String,
    pub command: String,
    pub status: JobStatus,
    pub elapsed_secs: f64,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub output: String,
    pub truncated: bool,
    pub dropped_bytes: u64,
    pub artifact: Option<String>,
    pub store_error: Option<String>,
}

/// Receives every job once it reaches a terminal status.
pub trait JobSink: Send + Sync {
    fn archive(&self, job: &ProcessJob) -> Result<String, StoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobEvent {
    Output(JobId),
    Finished(JobId),
}

#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub max_output_bytes: usize,
    pub grace: Duration,
    pub tick: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_output_bytes: 1 << 20,
            grace: Duration::from_secs(3),
            tick: Duration::from_millis(20),
        }
    }
}

pub type JobRef = Arc<Mutex<ProcessJob>>;

struct Worker {
    // observed by the supervisor loop; when set the child is terminated
    cancel: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

struct Shared {
    cfg: RunnerConfig,
    jobs: Mutex<HashMap<JobId, JobRef>>,
    workers: Mutex<HashMap<JobId, Worker>>,
    next_id: AtomicU64,
    sink: Option<Arc<dyn JobSink>>,
    events: Mutex<Option<Sender<JobEvent>>>,
    killer: Arc<dyn Killer>,
}

#[derive(Clone)]
pub struct ProcessRunner {
    shared: Arc<Shared>,
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProcessRunner {
    #[cfg(test)]
    pub fn new(cfg: RunnerConfig) -> Self {
        Self::build(cfg, None, None)
    }

    pub fn build(
        cfg: RunnerConfig,
        sink: Option<Arc<dyn JobSink>>,
        events: Option<Sender<JobEvent>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                cfg,
                jobs: Mutex::new(HashMap::new()),
                workers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                sink,
                events: Mutex::new(events),
                killer: Arc::new(GroupKiller::new()),
            }),
        }
    }

    pub fn start(&self, req: JobRequest) -> Result<JobId, RunnerError> {
        if req.command.program().map(str::is_empty).unwrap_or(true) {
            return Err(RunnerError::EmptyCommand);
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let timeout = req.timeout;
        info!(
            job = id,
            tool = %req.tool_id,
            command = %req.command.display(),
            timeout_secs = timeout.as_secs(),
            "starting job"
        );
        let job = Arc::new(Mutex::new(ProcessJob::new(
            id,
            req,
            self.shared.cfg.max_output_bytes,
        )));
        self.forget_old_jobs();
        lock(&self.shared.jobs).insert(id, Arc::clone(&job));

        let cancel = Arc::new(AtomicBool::new(false));
        lock(&self.shared.workers).insert(
            id,
            Worker {
                cancel: Arc::clone(&cancel),
                handle: None,
            },
        );
        let shared = Arc::clone(&self.shared);
        let supervised = Arc::clone(&job);
        let spawned = thread::Builder::new()
            .name(format!("job-{id}"))
            .spawn(move || supervise(&shared, &supervised, timeout, &cancel));
        match spawned {
            Ok(h) => {
                if let Some(w) = lock(&self.shared.workers).get_mut(&id) {
                    w.handle = Some(h);
                }
            }
            Err(e) => {
                warn!(job = id, "could not spawn supervisor thread: {e}");
                lock(&job).transition(JobStatus::Failed {
                    reason: format!("could not start supervisor: {e}"),
                });
            }
        }
        Ok(id)
    }

    fn job(&self, id: JobId) -> Option<JobRef> {
        lock(&self.shared.jobs).get(&id).cloned()
    }

    fn forget_old_jobs(&self) {
        let mut jobs = lock(&self.shared.jobs);
        let mut finished: Vec<JobId> = jobs
            .iter()
            .filter(|(_, j)| lock(j).status.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        if finished.len() < MAX_FINISHED_JOBS {
            return;
        }
        finished.sort_unstable();
        let excess = finished.len() + 1 - MAX_FINISHED_JOBS;
        let mut workers = lock(&self.shared.workers);
        for id in finished.into_iter().take(excess) {
            jobs.remove(&id);
            workers.remove(&id);
            debug!(job = id, "forgot finished job");
        }
    }

    /// Status plus output appended after byte `since`. Never blocks on the child.
    pub fn poll(&self, id: JobId, since: usize) -> Option<JobPoll> {
        let job = self.job(id)?;
        let j = lock(&job);
        Some(JobPoll {
            id,
            status: j.status.clone(),
            elapsed: j.elapsed(),
            output: j.output.since(since).to_vec(),
            next_offset: j.output.len(),
            truncated: j.output.truncated(),
            archive: j.archive.clone(),
        })
    }

    pub fn status(&self, id: JobId) -> Option<JobStatus> {
        self.job(id).map(|j| lock(&j).status.clone())
    }

    #[cfg(test)]
    pub fn snapshot(&self, id: JobId) -> Option<ProcessJob> {
        self.job(id).map(|j| lock(&j).clone())
    }

    pub fn job_report(&self, id: JobId) -> Option<JobReport> {
        let job = self.job(id)?;
        let j = lock(&job);
        let (artifact, store_error) = match &j.archive {
            Some(Ok(name)) => (Some(name.clone()), None),
            Some(Err(e)) => (None, Some(e.clone())),
            None => (None, None),
        };
        Some(JobReport {
            id,
            tool_id: j.tool_id.clone(),
            command_id: j.command_id.clone(),
            target: j.target.clone(),
            command: j.command.display(),
            status: j.status.clone(),
            elapsed_secs: j.elapsed().as_secs_f64(),
            started_at: j.started_at.map(|t| t.to_rfc3339()),
            ended_at: j.ended_at.map(|t| t.to_rfc3339()),
            output: String::from_utf8_lossy(j.output.bytes()).into_owned(),
            truncated: j.output.truncated(),
            dropped_bytes: j.output.dropped(),
            artifact,
            store_error,
        })
    }

    /// Ask a job to stop. Returns false when the job is unknown or already finished.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.status(id) {
            Some(s) if !s.is_terminal() => {}
            _ => return false,
        }
        match lock(&self.shared.workers).get(&id) {
            Some(w) => {
                info!(job = id, "cancellation requested");
                w.cancel.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn wait(&self, id: JobId) -> Option<JobStatus> {
        let handle = lock(&self.shared.workers)
            .get_mut(&id)
            .and_then(|w| w.handle.take());
        if let Some(h) = handle {
            let _ = h.join();
        }
        self.status(id)
    }

    pub fn shutdown(&self) {
        let ids: Vec<JobId> = lock(&self.shared.workers).keys().copied().collect();
        for id in &ids {
            self.cancel(*id);
        }
        for id in ids {
            self.wait(id);
        }
    }
}

fn notify(shared: &Shared, ev: JobEvent) {
    if let Some(tx) = lock(&shared.events).as_ref() {
        let _ = tx.send(ev);
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    mut src: R,
    job: JobRef,
    shared: Arc<Shared>,
    done: Sender<()>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().spawn(move || {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            match src.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let id = {
                        let mut j = lock(&job);
                        j.output.append(&buf[..n]);
                        j.id
                    };
                    notify(&shared, JobEvent::Output(id));
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        let _ = done.send(());
    })
}

fn exit_status_to_job_status(status: ExitStatus) -> JobStatus {
    if let Some(code) = status.code() {
        return JobStatus::Completed { exit_code: code };
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return JobStatus::Failed {
                reason: format!("terminated by signal {sig}"),
            };
        }
    }
    JobStatus::Failed {
        reason: "process ended without an exit code".into(),
    }
}

fn supervise(shared: &Arc<Shared>, job: &JobRef, timeout: Duration, cancel: &AtomicBool) {
    let (id, argv) = {
        let j = lock(job);
        (j.id, j.command.argv.clone())
    };
    let final_status = if cancel.load(Ordering::SeqCst) {
        JobStatus::Cancelled
    } else {
        match launch(&argv) {
            Ok(child) => {
                lock(job).transition(JobStatus::Running);
                run_child(shared, job, child, timeout, cancel)
            }
            Err(e) => {
                warn!(job = id, program = %argv[0], "launch failed: {e}");
                JobStatus::Failed {
                    reason: format!("failed to launch '{}': {e}", argv[0]),
                }
            }
        }
    };
    // The terminal status and the archive outcome become visible together.
    let mut finished = lock(job).clone();
    if !finished.transition(final_status.clone()) {
        return;
    }
    info!(job = id, status = %final_status.label(), "job finished");
    if let Some(sink) = &shared.sink {
        let outcome = sink.archive(&finished).map_err(|e| {
            warn!(job = id, "archiving result failed: {e}");
            e.to_string()
        });
        finished.archive = Some(outcome);
    }
    *lock(job) = finished;
    notify(shared, JobEvent::Finished(id));
}

fn launch(argv: &[String]) -> std::io::Result<Child> {
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd.spawn()
}

fn run_child(
    shared: &Arc<Shared>,
    job: &JobRef,
    mut child: Child,
    timeout: Duration,
    cancel: &AtomicBool,
) -> JobStatus {
    let id = lock(job).id;
    let cfg = &shared.cfg;
    let (done_tx, done_rx) = mpsc::channel::<()>();
    let mut readers = 0usize;
    if let Some(out) = child.stdout.take() {
        if spawn_reader(out, Arc::clone(job), Arc::clone(shared), done_tx.clone()).is_ok() {
            readers += 1;
        }
    }
    if let Some(err) = child.stderr.take() {
        if spawn_reader(err, Arc::clone(job), Arc::clone(shared), done_tx.clone()).is_ok() {
            readers += 1;
        }
    }
    drop(done_tx);

    let deadline = Instant::now() + timeout;
    let mut requested: Option<JobStatus> = None;
    let mut term_sent: Option<Instant> = None;
    let mut killed = false;
    let exit = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => {}
            Err(e) => {
                shared.killer.kill(&mut child);
                break Err(e);
            }
        }
        let now = Instant::now();
        if requested.is_none() && cancel.load(Ordering::SeqCst) {
            requested = Some(JobStatus::Cancelled);
            term_sent = Some(now);
            shared.killer.terminate(&mut child);
        }
        if now >= deadline && !killed && requested != Some(JobStatus::Cancelled) {
            warn!(job = id, timeout_secs = timeout.as_secs(), "job timed out");
            requested = Some(JobStatus::TimedOut);
            shared.killer.kill(&mut child);
            killed = true;
        }
        if let Some(t) = term_sent {
            if !killed && now.saturating_duration_since(t) >= cfg.grace {
                warn!(job = id, "process ignored termination, killing");
                shared.killer.kill(&mut child);
                killed = true;
            }
        }
        thread::sleep(cfg.tick);
    };

    // A grandchild may still hold the pipes open; give readers one grace period.
    let drain_deadline = Instant::now() + cfg.grace;
    for _ in 0..readers {
        let left = drain_deadline.saturating_duration_since(Instant::now());
        if done_rx.recv_timeout(left).is_err() {
            debug!(job = id, "output readers did not finish, sealing buffer");
            break;
        }
    }

    if let Some(status) = requested {
        return status;
    }
    match exit {
        Ok(status) => exit_status_to_job_status(status),
        Err(e) => JobStatus::Failed {
            reason: format!("waiting on process: {e}"),
        },
    }
}

/// Whether `program` can be found as an executable file, directly or on `PATH`.
pub fn which(program: &str) -> bool {
    fn executable(p: &Path) -> bool {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            p.metadata()
                .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        }
        #[cfg(not(unix))]
        {
            p.is_file()
        }
    }
    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        return executable(Path::new(program));
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| executable(&dir.join(program))))
        .unwrap_or(false)
}
