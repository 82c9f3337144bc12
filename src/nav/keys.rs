use crate::app::InputEvent;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Input(InputEvent),
    Copy,
    Quit,
}

/// Plain characters are always text so a target like `quiet.example` can be typed;
/// console commands live on Ctrl chords.
pub fn map_key(key: KeyEvent) -> Option<KeyAction> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('q') => Some(KeyAction::Quit),
            KeyCode::Char('c') => Some(KeyAction::Copy),
            _ => None,
        };
    }
    let ev = match key.code {
        KeyCode::Up => InputEvent::Up,
        KeyCode::Down => InputEvent::Down,
        KeyCode::Left => InputEvent::Left,
        KeyCode::Right => InputEvent::Right,
        KeyCode::Enter => InputEvent::Select,
        KeyCode::Esc => InputEvent::Back,
        KeyCode::Backspace | KeyCode::Delete => InputEvent::Delete,
        KeyCode::Char(c) => InputEvent::TextChar(c),
        _ => return None,
    };
    Some(KeyAction::Input(ev))
}

pub fn parse_event(s: &str) -> Option<InputEvent> {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("char:") {
        let mut chars = rest.chars();
        return match (chars.next(), chars.next()) {
            (Some(c), None) => Some(InputEvent::TextChar(c)),
            _ => None,
        };
    }
    Some(match s.to_ascii_lowercase().as_str() {
        "up" => InputEvent::Up,
        "down" => InputEvent::Down,
        "left" => InputEvent::Left,
        "right" => InputEvent::Right,
        "select" | "enter" => InputEvent::Select,
        "back" | "esc" => InputEvent::Back,
        "delete" | "backspace" => InputEvent::Delete,
        _ => return None,
    })
}

pub fn parse_script(script: &str) -> Result<Vec<InputEvent>, String> {
    let mut out = Vec::new();
    for part in script.split(',').filter(|p| !p.trim().is_empty()) {
        if let Some(text) = part.trim_start().strip_prefix("text:") {
            out.extend(text.chars().map(InputEvent::TextChar));
            continue;
        }
        out.push(parse_event(part).ok_or_else(|| format!("unknown input event '{part}'"))?);
    }
    Ok(out)
}
