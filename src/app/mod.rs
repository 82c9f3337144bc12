pub mod view;

use crate::menu::template::ResolvedCommand;
use crate::menu::{LeafContent, MenuTree, NodeIdx, NodeKind};
use crate::services::results::ResultArtifact;
use crate::services::runner::{JobId, JobPoll, JobRequest, JobStatus};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use view::{Document, JobView, MenuRow, Screen, ViewModel};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Up,
    Down,
    Left,
    Right,
    Select,
    Back,
    Delete,
    TextChar(char),
}

pub enum NavMsg {
    Input(InputEvent),
    JobStarted { job: JobId },
    JobRejected { reason: String },
    JobProgress(JobPoll),
    ResultsListed(Result<Vec<ResultArtifact>, String>),
    ArtifactLoaded {
        name: String,
        outcome: Result<Vec<u8>, String>,
    },
}

#[derive(Debug)]
pub enum Effect {
    Launch(JobRequest),
    Cancel(JobId),
    ListResults,
    OpenArtifact(String),
}

#[derive(Clone, Debug)]
pub struct NavOptions {
    pub default_timeout: Duration,
    pub visible_rows: usize,
}

impl Default for NavOptions {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(1800),
            visible_rows: 6,
        }
    }
}

struct ActiveJob {
    // None until the runner has accepted the launch
    id: Option<JobId>,
    command: String,
    status: JobStatus,
    elapsed: Duration,
    // bytes received so far; `text` holds them decoded, `carry` a split UTF-8 sequence
    received: usize,
    text: String,
    carry: Vec<u8>,
    truncated: bool,
    archive: Option<Result<String, String>>,
    cancel_requested: bool,
}

struct Prompt {
    node: NodeIdx,
    params: Vec<String>,
    collected: Vec<(String, String)>,
}

enum LeafState {
    Results {
        listing: Option<Vec<ResultArtifact>>,
        selected: usize,
        document: Option<Document>,
    },
    Text {
        lines: Vec<String>,
        scroll: usize,
    },
}

pub struct Navigator {
    tree: Arc<MenuTree>,
    opts: NavOptions,
    cursor: Vec<NodeIdx>,
    // (selection_index, offset) of every ancestor on the cursor, restored on Back
    saved: Vec<(usize, usize)>,
    selection_index: usize,
    offset: usize,
    pending_input: String,
    prompt: Option<Prompt>,
    active_job: Option<ActiveJob>,
    leaf: Option<LeafState>,
    notice: Option<String>,
    unavailable: HashSet<NodeIdx>,
}

pub fn job_target(cmd: &ResolvedCommand) -> String {
    cmd.param("target")
        .or_else(|| cmd.params.first().map(|(_, v)| v.as_str()))
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("na")
        .to_string()
}

fn text_lines(s: &str) -> Vec<String> {
    s.lines().map(str::to_string).collect()
}

/// Lossy UTF-8 decoding of a byte stream that arrives in arbitrary chunks. An
/// incomplete trailing sequence waits in `carry` for the next chunk.
fn decode_into(out: &mut String, carry: &mut Vec<u8>, chunk: &[u8]) {
    carry.extend_from_slice(chunk);
    let mut rest: &[u8] = carry;
    loop {
        match std::str::from_utf8(rest) {
            Ok(s) => {
                out.push_str(s);
                rest = &[];
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                out.push_str(&String::from_utf8_lossy(valid));
                match e.error_len() {
                    Some(n) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[n..];
                    }
                    None => {
                        rest = after;
                        break;
                    }
                }
            }
        }
    }
    let tail = rest.to_vec();
    *carry = tail;
}

pub fn update(nav: &mut Navigator, msg: NavMsg) -> Vec<Effect> {
    let mut effects = Vec::new();
    match msg {
        NavMsg::Input(ev) => nav.on_input(ev, &mut effects),
        NavMsg::JobStarted { job } => {
            if let Some(a) = nav.active_job.as_mut().filter(|a| a.id.is_none()) {
                a.id = Some(job);
                if a.cancel_requested {
                    effects.push(Effect::Cancel(job));
                }
            }
        }
        NavMsg::JobRejected { reason } => {
            if let Some(a) = nav.active_job.as_mut().filter(|a| a.id.is_none()) {
                a.status = JobStatus::Failed {
                    reason: reason.clone(),
                };
                nav.notice = Some(reason);
            }
        }
        NavMsg::JobProgress(p) => nav.on_progress(p),
        NavMsg::ResultsListed(outcome) => {
            if let Some(LeafState::Results {
                listing, selected, ..
            }) = nav.leaf.as_mut()
            {
                match outcome {
                    Ok(items) => {
                        *selected = (*selected).min(items.len().saturating_sub(1));
                        *listing = Some(items);
                    }
                    Err(e) => {
                        *listing = Some(Vec::new());
                        nav.notice = Some(e);
                    }
                }
            }
        }
        NavMsg::ArtifactLoaded { name, outcome } => {
            if let Some(LeafState::Results {
                listing,
                selected,
                document,
            }) = nav.leaf.as_mut()
            {
                // a reply for an entry that is no longer highlighted is stale
                let highlighted = listing
                    .as_ref()
                    .and_then(|l| l.get(*selected))
                    .map(|a| a.filename == name)
                    .unwrap_or(false);
                if document.is_some() || !highlighted {
                    debug!(artifact = %name, "dropping stale artifact read");
                    return effects;
                }
                match outcome {
                    Ok(bytes) => {
                        *document = Some(Document {
                            name,
                            lines: text_lines(&String::from_utf8_lossy(&bytes)),
                            scroll: 0,
                        })
                    }
                    Err(e) => nav.notice = Some(e),
                }
            }
        }
    }
    effects
}

impl Navigator {
    pub fn new(tree: Arc<MenuTree>, opts: NavOptions) -> Self {
        let root = tree.root();
        Self {
            tree,
            opts,
            cursor: vec![root],
            saved: Vec::new(),
            selection_index: 0,
            offset: 0,
            pending_input: String::new(),
            prompt: None,
            active_job: None,
            leaf: None,
            notice: None,
            unavailable: HashSet::new(),
        }
    }

    #[cfg(test)]
    pub fn handle_input(&mut self, ev: InputEvent) -> Vec<Effect> {
        update(self, NavMsg::Input(ev))
    }

    pub fn set_unavailable(&mut self, nodes: HashSet<NodeIdx>) {
        self.unavailable = nodes;
    }

    pub fn tree(&self) -> &MenuTree {
        &self.tree
    }

    pub fn cursor_ids(&self) -> Vec<String> {
        self.cursor
            .iter()
            .map(|i| self.tree.node(*i).id.clone())
            .collect()
    }

    #[cfg(test)]
    pub fn selection_index(&self) -> usize {
        self.selection_index
    }

    #[cfg(test)]
    pub fn pending_input(&self) -> &str {
        &self.pending_input
    }

    #[cfg(test)]
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn active_job_id(&self) -> Option<JobId> {
        self.active_job.as_ref().and_then(|a| a.id)
    }

    #[cfg(test)]
    pub fn has_active_job(&self) -> bool {
        self.active_job.is_some()
    }

    pub fn job_sync_point(&self) -> Option<(JobId, usize)> {
        let a = self.active_job.as_ref()?;
        Some((a.id?, a.received))
    }

    fn tail(&self) -> NodeIdx {
        *self.cursor.last().unwrap_or(&0)
    }

    fn on_input(&mut self, ev: InputEvent, effects: &mut Vec<Effect>) {
        let previous = self.notice.take();
        let accepted = if self.active_job.is_some() {
            self.input_job(ev, effects)
        } else if self.prompt.is_some() {
            self.input_prompt(ev, effects)
        } else if self.tree.node(self.tail()).kind == NodeKind::Leaf {
            self.input_leaf(ev, effects)
        } else {
            self.input_menu(ev, effects)
        };
        if !accepted {
            debug!(?ev, "input ignored");
            if self.notice.is_none() {
                self.notice = previous;
            }
        }
    }

    fn input_menu(&mut self, ev: InputEvent, effects: &mut Vec<Effect>) -> bool {
        let tree = Arc::clone(&self.tree);
        let children = tree.children(self.tail());
        let n = children.len();
        match ev {
            InputEvent::Up if n > 0 => {
                self.selection_index = (self.selection_index + n - 1) % n;
                self.follow_selection(n);
                true
            }
            InputEvent::Down if n > 0 => {
                self.selection_index = (self.selection_index + 1) % n;
                self.follow_selection(n);
                true
            }
            InputEvent::Select | InputEvent::Right if n > 0 => {
                let child = children[self.selection_index.min(n - 1)];
                self.enter(child, effects);
                true
            }
            InputEvent::Back | InputEvent::Left => self.pop(),
            _ => false,
        }
    }

    fn follow_selection(&mut self, n: usize) {
        let rows = self.opts.visible_rows.max(1);
        if self.selection_index < self.offset {
            self.offset = self.selection_index;
        } else if self.selection_index >= self.offset + rows {
            self.offset = self.selection_index + 1 - rows;
        }
        self.offset = self.offset.min(n.saturating_sub(rows));
    }

    fn push(&mut self, idx: NodeIdx) {
        self.saved.push((self.selection_index, self.offset));
        self.cursor.push(idx);
        self.selection_index = 0;
        self.offset = 0;
    }

    fn pop(&mut self) -> bool {
        if self.cursor.len() <= 1 {
            return false;
        }
        self.cursor.pop();
        let (sel, off) = self.saved.pop().unwrap_or((0, 0));
        self.selection_index = sel;
        self.offset = off;
        self.leaf = None;
        self.prompt = None;
        self.pending_input.clear();
        true
    }

    fn enter(&mut self, child: NodeIdx, effects: &mut Vec<Effect>) {
        let tree = Arc::clone(&self.tree);
        let node = tree.node(child);
        if matches!(node.kind, NodeKind::Action | NodeKind::ParameterizedCommand)
            && self.unavailable.contains(&child)
        {
            let program = node
                .command
                .as_ref()
                .and_then(|c| c.template.program())
                .unwrap_or(node.id.as_str());
            self.notice = Some(format!("{program} is not installed"));
            return;
        }
        match node.kind {
            NodeKind::Submenu => self.push(child),
            NodeKind::Leaf => {
                let state = match &node.leaf {
                    Some(LeafContent::Text(content)) => LeafState::Text {
                        lines: text_lines(content),
                        scroll: 0,
                    },
                    _ => {
                        effects.push(Effect::ListResults);
                        LeafState::Results {
                            listing: None,
                            selected: 0,
                            document: None,
                        }
                    }
                };
                self.push(child);
                self.leaf = Some(state);
            }
            NodeKind::Action => {
                let resolved = match node.command.as_ref().map(|c| c.template.resolve(&[])) {
                    Some(Ok(r)) => r,
                    Some(Err(e)) => {
                        self.notice = Some(format!("cannot run {}: {e}", node.label));
                        return;
                    }
                    None => return,
                };
                self.push(child);
                self.launch(child, resolved, effects);
            }
            NodeKind::ParameterizedCommand => {
                let params = node
                    .command
                    .as_ref()
                    .map(|c| c.template.params().to_vec())
                    .unwrap_or_default();
                self.push(child);
                self.pending_input.clear();
                self.prompt = Some(Prompt {
                    node: child,
                    params,
                    collected: Vec::new(),
                });
            }
        }
    }

    fn launch(&mut self, node: NodeIdx, command: ResolvedCommand, effects: &mut Vec<Effect>) {
        let Some(spec) = self.tree.node(node).command.as_ref() else {
            return;
        };
        let request = JobRequest {
            tool_id: spec.tool_id.clone(),
            command_id: spec.command_id.clone(),
            target: job_target(&command),
            timeout: spec.timeout.unwrap_or(self.opts.default_timeout),
            command,
        };
        info!(
            node = %self.tree.node(node).id,
            command = %request.command.display(),
            "launch requested"
        );
        self.active_job = Some(ActiveJob {
            id: None,
            command: request.command.display(),
            status: JobStatus::Pending,
            elapsed: Duration::ZERO,
            received: 0,
            text: String::new(),
            carry: Vec::new(),
            truncated: false,
            archive: None,
            cancel_requested: false,
        });
        self.prompt = None;
        self.pending_input.clear();
        effects.push(Effect::Launch(request));
    }

    fn input_prompt(&mut self, ev: InputEvent, effects: &mut Vec<Effect>) -> bool {
        match ev {
            InputEvent::TextChar(c) if !c.is_control() => {
                self.pending_input.push(c);
                true
            }
            InputEvent::Delete => self.pending_input.pop().is_some(),
            InputEvent::Select => {
                if self.pending_input.trim().is_empty() {
                    return false;
                }
                let Some(prompt) = self.prompt.as_mut() else {
                    return false;
                };
                if prompt.collected.len() >= prompt.params.len() {
                    return false;
                }
                let param = prompt.params[prompt.collected.len()].clone();
                prompt
                    .collected
                    .push((param, std::mem::take(&mut self.pending_input)));
                if prompt.collected.len() < prompt.params.len() {
                    return true;
                }
                let node = prompt.node;
                let resolved = self
                    .tree
                    .node(node)
                    .command
                    .as_ref()
                    .map(|c| c.template.resolve(&prompt.collected));
                match resolved {
                    Some(Ok(cmd)) => self.launch(node, cmd, effects),
                    Some(Err(e)) => {
                        // hand the last value back for editing
                        if let Some((_, v)) = prompt.collected.pop() {
                            self.pending_input = v;
                        }
                        self.notice = Some(format!("cannot run: {e}"));
                    }
                    None => {}
                }
                true
            }
            InputEvent::Back => self.pop(),
            _ => false,
        }
    }

    fn input_job(&mut self, ev: InputEvent, effects: &mut Vec<Effect>) -> bool {
        let Some(a) = self.active_job.as_mut() else {
            return false;
        };
        let terminal = a.status.is_terminal();
        match ev {
            InputEvent::Back | InputEvent::Select if terminal => {
                debug!(job = ?a.id, "job acknowledged");
                self.active_job = None;
                self.pop();
                true
            }
            InputEvent::Back if !a.cancel_requested => {
                a.cancel_requested = true;
                if let Some(id) = a.id {
                    effects.push(Effect::Cancel(id));
                }
                self.notice = Some("cancelling...".to_string());
                true
            }
            _ => false,
        }
    }

    fn input_leaf(&mut self, ev: InputEvent, effects: &mut Vec<Effect>) -> bool {
        let Some(leaf) = self.leaf.as_mut() else {
            return matches!(ev, InputEvent::Back | InputEvent::Left) && self.pop();
        };
        match leaf {
            LeafState::Text { lines, scroll } => match ev {
                InputEvent::Up => {
                    *scroll = scroll.saturating_sub(1);
                    true
                }
                InputEvent::Down => {
                    *scroll = (*scroll + 1).min(lines.len().saturating_sub(1));
                    true
                }
                InputEvent::Back | InputEvent::Left => self.pop(),
                _ => false,
            },
            LeafState::Results {
                listing,
                selected,
                document,
            } => {
                if let Some(doc) = document.as_mut() {
                    return match ev {
                        InputEvent::Up => {
                            doc.scroll = doc.scroll.saturating_sub(1);
                            true
                        }
                        InputEvent::Down => {
                            doc.scroll = (doc.scroll + 1).min(doc.lines.len().saturating_sub(1));
                            true
                        }
                        InputEvent::Back | InputEvent::Left => {
                            *document = None;
                            true
                        }
                        _ => false,
                    };
                }
                let items = listing.as_deref().unwrap_or_default();
                match ev {
                    InputEvent::Up => {
                        *selected = selected.saturating_sub(1);
                        true
                    }
                    InputEvent::Down => {
                        *selected = (*selected + 1).min(items.len().saturating_sub(1));
                        true
                    }
                    InputEvent::Select | InputEvent::Right => match items.get(*selected) {
                        Some(a) => {
                            effects.push(Effect::OpenArtifact(a.filename.clone()));
                            true
                        }
                        None => false,
                    },
                    InputEvent::Back | InputEvent::Left => self.pop(),
                    _ => false,
                }
            }
        }
    }

    fn on_progress(&mut self, p: JobPoll) {
        let Some(a) = self.active_job.as_mut() else {
            return;
        };
        if a.id != Some(p.id) {
            return;
        }
        if !a.status.is_terminal() {
            a.status = p.status;
        }
        if p.next_offset > a.received {
            decode_into(&mut a.text, &mut a.carry, &p.output);
            a.received = p.next_offset;
        }
        if a.status.is_terminal() && !a.carry.is_empty() {
            a.carry.clear();
            a.text.push(char::REPLACEMENT_CHARACTER);
        }
        a.elapsed = p.elapsed;
        a.truncated = p.truncated;
        if a.archive.is_none() {
            if let Some(Err(e)) = &p.archive {
                self.notice = Some(format!("result not saved: {e}"));
            }
            a.archive = p.archive;
        }
    }

    pub fn current_view(&self) -> ViewModel {
        let tail = self.tail();
        let node = self.tree.node(tail);
        let breadcrumb = self
            .cursor
            .iter()
            .map(|i| self.tree.node(*i).label.clone())
            .collect();
        let screen = if let Some(a) = &self.active_job {
            Screen::Job(JobView {
                id: a.id,
                command: a.command.clone(),
                status_label: a.status.label(),
                terminal: a.status.is_terminal(),
                status: a.status.clone(),
                elapsed_secs: a.elapsed.as_secs_f64(),
                output: a.text.clone(),
                truncated: a.truncated,
                artifact: a.archive.as_ref().and_then(|r| r.as_ref().ok().cloned()),
            })
        } else if let Some(p) = &self.prompt {
            let index = p.collected.len().min(p.params.len().saturating_sub(1));
            Screen::Prompt {
                param: p.params.get(index).cloned().unwrap_or_default(),
                index,
                total: p.params.len(),
                input: self.pending_input.clone(),
                template: node
                    .command
                    .as_ref()
                    .map(|c| c.template.raw().to_string())
                    .unwrap_or_default(),
            }
        } else {
            match &self.leaf {
                Some(LeafState::Text { lines, scroll }) => Screen::Text {
                    lines: lines.clone(),
                    scroll: *scroll,
                },
                Some(LeafState::Results {
                    listing,
                    selected,
                    document,
                }) => Screen::Results {
                    items: listing.clone().unwrap_or_default(),
                    selected: *selected,
                    loading: listing.is_none(),
                    document: document.clone(),
                },
                None => Screen::Menu {
                    items: self
                        .tree
                        .children(tail)
                        .iter()
                        .map(|c| {
                            let n = self.tree.node(*c);
                            MenuRow {
                                id: n.id.clone(),
                                label: n.label.clone(),
                                kind: n.kind.as_str(),
                                available: !self.unavailable.contains(c),
                            }
                        })
                        .collect(),
                    selected: self.selection_index,
                    offset: self.offset,
                    visible_rows: self.opts.visible_rows,
                },
            }
        };
        ViewModel {
            breadcrumb,
            path: self.cursor_ids(),
            title: node.label.clone(),
            screen,
            notice: self.notice.clone(),
        }
    }
}

#[cfg(test)]
mod tests;
