pub mod template;

use crate::error::ConfigError;
use crate::model::{title_from_id, AppConfig, MenuItem};
use std::collections::HashSet;
use std::time::Duration;
use template::CommandTemplate;
use tracing::debug;

pub type NodeIdx = usize;

pub const ROOT_ID: &str = "root";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Submenu,
    Action,
    ParameterizedCommand,
    Leaf,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Submenu => "submenu",
            NodeKind::Action => "action",
            NodeKind::ParameterizedCommand => "command",
            NodeKind::Leaf => "leaf",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "submenu" | "menu" => Some(NodeKind::Submenu),
            "action" => Some(NodeKind::Action),
            "command" | "parameterized_command" => Some(NodeKind::ParameterizedCommand),
            "leaf" => Some(NodeKind::Leaf),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeafContent {
    Results,
    Text(String),
}

#[derive(Clone, Debug)]
pub struct CommandSpec {
    pub tool_id: String,
    pub command_id: String,
    pub template: CommandTemplate,
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct MenuNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub parent: Option<NodeIdx>,
    pub children: Vec<NodeIdx>,
    pub command: Option<CommandSpec>,
    pub leaf: Option<LeafContent>,
}

#[derive(Clone, Debug)]
pub struct MenuTree {
    nodes: Vec<MenuNode>,
}

enum Shape<'a> {
    Submenu(Vec<MenuItem>),
    Tool(&'a str),
    Command(CommandSpec),
    Leaf(LeafContent),
}

impl MenuTree {
    pub fn build(cfg: &AppConfig) -> Result<Self, ConfigError> {
        let mut tree = MenuTree {
            nodes: vec![MenuNode {
                id: ROOT_ID.to_string(),
                label: cfg.header.clone(),
                kind: NodeKind::Submenu,
                parent: None,
                children: Vec::new(),
                command: None,
                leaf: None,
            }],
        };
        if cfg.menu.is_empty() {
            return Err(ConfigError::EmptySubmenu {
                id: ROOT_ID.to_string(),
            });
        }
        tree.add_items(cfg, 0, &cfg.menu)?;
        debug!(nodes = tree.nodes.len(), "menu tree built");
        Ok(tree)
    }

    fn add_items(
        &mut self,
        cfg: &AppConfig,
        parent: NodeIdx,
        items: &[MenuItem],
    ) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (i, mi) in items.iter().enumerate() {
            if mi.id.trim().is_empty() {
                return Err(ConfigError::EmptyId {
                    path: format!("{}[{i}]", self.path_of(parent).join("/")),
                });
            }
            if !seen.insert(mi.id.as_str()) {
                return Err(ConfigError::DuplicateId {
                    id: mi.id.clone(),
                    parent: self.path_of(parent).join("/"),
                });
            }
            self.add_item(cfg, parent, mi)?;
        }
        Ok(())
    }

    fn shape_of<'a>(cfg: &AppConfig, mi: &'a MenuItem) -> Result<Shape<'a>, ConfigError> {
        if let Some(w) = &mi.widget {
            return match w.as_str() {
                "results" => Ok(Shape::Leaf(LeafContent::Results)),
                "text" => Ok(Shape::Leaf(LeafContent::Text(
                    mi.content.clone().unwrap_or_default(),
                ))),
                other => Err(ConfigError::UnknownWidget {
                    id: mi.id.clone(),
                    widget: other.to_string(),
                }),
            };
        }
        if let Some(raw) = &mi.command {
            let template = CommandTemplate::parse(&mi.id, raw)?;
            return Ok(Shape::Command(CommandSpec {
                tool_id: mi.tool.clone().unwrap_or_else(|| mi.id.clone()),
                command_id: mi.id.clone(),
                template,
                timeout: mi.timeout_secs.map(Duration::from_secs),
            }));
        }
        if let Some(children) = &mi.children {
            if !children.is_empty() {
                return Ok(Shape::Submenu(children.clone()));
            }
        } else if let Some(tool) = &mi.tool {
            if !cfg.has_tool(tool) {
                return Err(ConfigError::UnknownTool {
                    id: mi.id.clone(),
                    tool: tool.clone(),
                });
            }
            return Ok(Shape::Tool(tool.as_str()));
        }
        Err(ConfigError::EmptySubmenu { id: mi.id.clone() })
    }

    fn add_item(
        &mut self,
        cfg: &AppConfig,
        parent: NodeIdx,
        mi: &MenuItem,
    ) -> Result<(), ConfigError> {
        let shape = Self::shape_of(cfg, mi)?;
        let derived = match &shape {
            Shape::Submenu(_) | Shape::Tool(_) => NodeKind::Submenu,
            Shape::Command(spec) if spec.template.is_parameterized() => {
                NodeKind::ParameterizedCommand
            }
            Shape::Command(_) => NodeKind::Action,
            Shape::Leaf(_) => NodeKind::Leaf,
        };
        if let Some(declared) = &mi.kind {
            let want = NodeKind::parse(declared)
                .ok_or_else(|| ConfigError::Schema(format!("unknown kind '{declared}'")))?;
            if want == NodeKind::ParameterizedCommand && derived == NodeKind::Action {
                return Err(ConfigError::MissingPlaceholder {
                    id: mi.id.clone(),
                    template: mi.command.clone().unwrap_or_default(),
                });
            }
            if want != derived {
                return Err(ConfigError::KindMismatch {
                    id: mi.id.clone(),
                    declared: declared.clone(),
                    derived: derived.as_str(),
                });
            }
        }
        let idx = self.push(parent, &mi.id, &mi.title, derived);
        match shape {
            Shape::Submenu(children) => self.add_items(cfg, idx, &children)?,
            Shape::Tool(tool) => {
                let cmds = cfg.tool_commands(tool)?;
                if cmds.is_empty() {
                    return Err(ConfigError::EmptySubmenu { id: mi.id.clone() });
                }
                for c in cmds {
                    let template = CommandTemplate::parse(&c.id, &c.template)?;
                    let kind = if template.is_parameterized() {
                        NodeKind::ParameterizedCommand
                    } else {
                        NodeKind::Action
                    };
                    let child = self.push(idx, &c.id, &title_from_id(&c.id), kind);
                    self.nodes[child].command = Some(CommandSpec {
                        tool_id: tool.to_string(),
                        command_id: c.id,
                        template,
                        timeout: mi.timeout_secs.map(Duration::from_secs),
                    });
                }
            }
            Shape::Command(spec) => self.nodes[idx].command = Some(spec),
            Shape::Leaf(content) => self.nodes[idx].leaf = Some(content),
        }
        Ok(())
    }

    fn push(&mut self, parent: NodeIdx, id: &str, label: &str, kind: NodeKind) -> NodeIdx {
        let idx = self.nodes.len();
        self.nodes.push(MenuNode {
            id: id.to_string(),
            label: label.to_string(),
            kind,
            parent: Some(parent),
            children: Vec::new(),
            command: None,
            leaf: None,
        });
        self.nodes[parent].children.push(idx);
        idx
    }

    pub fn root(&self) -> NodeIdx {
        0
    }

    pub fn node(&self, idx: NodeIdx) -> &MenuNode {
        &self.nodes[idx]
    }

    pub fn children(&self, idx: NodeIdx) -> &[NodeIdx] {
        &self.nodes[idx].children
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIdx, &MenuNode)> {
        self.nodes.iter().enumerate()
    }

    pub fn path_of(&self, idx: NodeIdx) -> Vec<String> {
        let mut out = Vec::new();
        let mut cur = Some(idx);
        while let Some(i) = cur {
            out.push(self.nodes[i].id.clone());
            cur = self.nodes[i].parent;
        }
        out.reverse();
        out
    }

    #[cfg(test)]
    pub fn find(&self, ids: &[&str]) -> Option<NodeIdx> {
        let (first, rest) = ids.split_first()?;
        if *first != self.nodes[0].id {
            return None;
        }
        let mut cur = 0;
        for id in rest {
            cur = *self.nodes[cur]
                .children
                .iter()
                .find(|c| self.nodes[**c].id == *id)?;
        }
        Some(cur)
    }
}
