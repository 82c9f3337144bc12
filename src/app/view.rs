use crate::services::results::ResultArtifact;
use crate::services::runner::{JobId, JobStatus};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ViewModel {
    pub breadcrumb: Vec<String>,
    pub path: Vec<String>,
    pub title: String,
    pub screen: Screen,
    pub notice: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Screen {
    Menu {
        items: Vec<MenuRow>,
        selected: usize,
        offset: usize,
        visible_rows: usize,
    },
    Prompt {
        param: String,
        index: usize,
        total: usize,
        input: String,
        template: String,
    },
    Job(JobView),
    Results {
        items: Vec<ResultArtifact>,
        selected: usize,
        loading: bool,
        document: Option<Document>,
    },
    Text {
        lines: Vec<String>,
        scroll: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MenuRow {
    pub id: String,
    pub label: String,
    pub kind: &'static str,
    pub available: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobView {
    pub id: Option<JobId>,
    pub command: String,
    pub status: JobStatus,
    pub status_label: String,
    pub terminal: bool,
    pub elapsed_secs: f64,
    pub output: String,
    pub truncated: bool,
    pub artifact: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Document {
    pub name: String,
    pub lines: Vec<String>,
    pub scroll: usize,
}

impl ViewModel {
    pub fn job(&self) -> Option<&JobView> {
        match &self.screen {
            Screen::Job(j) => Some(j),
            _ => None,
        }
    }

    pub fn copyable_text(&self) -> Option<String> {
        match &self.screen {
            Screen::Job(j) if !j.output.is_empty() => Some(j.output.clone()),
            Screen::Results {
                document: Some(d), ..
            } => Some(d.lines.join("\n")),
            Screen::Text { lines, .. } => Some(lines.join("\n")),
            _ => None,
        }
    }
}
