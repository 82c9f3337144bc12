use crate::app::view::ViewModel;
use crate::app::{update, Effect, InputEvent, NavMsg, NavOptions, Navigator};
use crate::menu::{MenuTree, NodeIdx};
use crate::services::results::ResultStore;
use crate::services::runner::{
    lock, which, JobEvent, JobId, JobReport, JobSink, ProcessRunner, RunnerConfig,
};
use crate::settings::SystemSettings;
use std::collections::{HashSet, VecDeque};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub struct Console {
    nav: Mutex<Navigator>,
    runner: ProcessRunner,
    store: Arc<ResultStore>,
    events: Mutex<Receiver<JobEvent>>,
}

impl Console {
    pub fn new(tree: Arc<MenuTree>, sys: &SystemSettings) -> Self {
        let store = Arc::new(ResultStore::new(&sys.results_directory));
        let sink: Option<Arc<dyn JobSink>> = if sys.auto_save_results {
            Some(Arc::clone(&store) as Arc<dyn JobSink>)
        } else {
            None
        };
        let (tx, rx) = mpsc::channel();
        let runner = ProcessRunner::build(
            RunnerConfig {
                max_output_bytes: sys.max_output_bytes,
                grace: sys.cancel_grace,
                ..RunnerConfig::default()
            },
            sink,
            Some(tx),
        );
        let nav = Navigator::new(
            tree,
            NavOptions {
                default_timeout: sys.scan_timeout,
                visible_rows: sys.visible_rows,
            },
        );
        Self {
            nav: Mutex::new(nav),
            runner,
            store,
            events: Mutex::new(rx),
        }
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn mark_unavailable(&self) -> usize {
        let mut nav = lock(&self.nav);
        let missing: HashSet<NodeIdx> = nav
            .tree()
            .iter()
            .filter_map(|(idx, node)| {
                let program = node.command.as_ref()?.template.program()?;
                (!which(program)).then_some(idx)
            })
            .collect();
        for idx in &missing {
            debug!(node = %nav.tree().node(*idx).id, "program not found on PATH");
        }
        let n = missing.len();
        nav.set_unavailable(missing);
        n
    }

    pub fn handle_input(&self, ev: InputEvent) -> ViewModel {
        let mut store_work = {
            let mut nav = lock(&self.nav);
            self.sync_job(&mut nav);
            let effects = update(&mut nav, NavMsg::Input(ev));
            self.run_effects(&mut nav, effects)
        };
        // result store reads happen with the navigator unlocked
        while !store_work.is_empty() {
            let replies: Vec<NavMsg> = store_work
                .drain(..)
                .filter_map(|e| self.read_store(e))
                .collect();
            let mut nav = lock(&self.nav);
            for msg in replies {
                let effects = update(&mut nav, msg);
                store_work.extend(self.run_effects(&mut nav, effects));
            }
        }
        lock(&self.nav).current_view()
    }

    pub fn current_view(&self) -> ViewModel {
        let mut nav = lock(&self.nav);
        self.sync_job(&mut nav);
        nav.current_view()
    }

    pub fn pump(&self) -> bool {
        let events: Vec<JobEvent> = lock(&self.events).try_iter().collect();
        if events.is_empty() {
            return false;
        }
        let mut nav = lock(&self.nav);
        let active = nav.active_job_id();
        let relevant = events.iter().any(|ev| match ev {
            JobEvent::Output(id) | JobEvent::Finished(id) => Some(*id) == active,
        });
        if relevant {
            self.sync_job(&mut nav);
        }
        relevant
    }

    pub fn job_status(&self, id: JobId) -> Option<JobReport> {
        self.runner.job_report(id)
    }

    pub fn shutdown(&self) {
        info!("shutting down, cancelling running jobs");
        self.runner.shutdown();
    }

    fn sync_job(&self, nav: &mut Navigator) {
        let Some((id, since)) = nav.job_sync_point() else {
            return;
        };
        if let Some(p) = self.runner.poll(id, since) {
            // progress never asks for store reads
            let effects = update(nav, NavMsg::JobProgress(p));
            let deferred = self.run_effects(nav, effects);
            debug_assert!(deferred.is_empty());
        }
    }

    fn read_store(&self, effect: Effect) -> Option<NavMsg> {
        match effect {
            Effect::ListResults => Some(NavMsg::ResultsListed(
                self.store.list().map_err(|e| e.to_string()),
            )),
            Effect::OpenArtifact(name) => {
                let outcome = self.store.read(&name).map_err(|e| e.to_string());
                Some(NavMsg::ArtifactLoaded { name, outcome })
            }
            Effect::Launch(_) | Effect::Cancel(_) => None,
        }
    }

    fn run_effects(&self, nav: &mut Navigator, effects: Vec<Effect>) -> Vec<Effect> {
        let mut deferred = Vec::new();
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            let msg = match effect {
                Effect::Launch(req) => match self.runner.start(req) {
                    Ok(job) => NavMsg::JobStarted { job },
                    Err(e) => {
                        warn!("launch refused: {e}");
                        NavMsg::JobRejected {
                            reason: e.to_string(),
                        }
                    }
                },
                Effect::Cancel(id) => {
                    if !self.runner.cancel(id) {
                        debug!(job = id, "cancel ignored, job already finished");
                    }
                    continue;
                }
                Effect::ListResults | Effect::OpenArtifact(_) => {
                    deferred.push(effect);
                    continue;
                }
            };
            queue.extend(update(nav, msg));
        }
        deferred
    }
}
