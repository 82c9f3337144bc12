use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::*;

use crate::app::view::{Screen, ViewModel};
use crate::theme::Theme;

pub fn help_text(view: &ViewModel) -> &'static str {
    match &view.screen {
        Screen::Menu { .. } => "↑/↓ move  Enter/→ open  Esc/← back  Ctrl+Q quit",
        Screen::Prompt { .. } => "type value  Backspace delete  Enter confirm  Esc back",
        Screen::Job(j) if j.terminal => "Enter/Esc dismiss  Ctrl+C copy output",
        Screen::Job(_) => "Esc cancel  Ctrl+C copy output",
        Screen::Results {
            document: Some(_), ..
        } => "↑/↓ scroll  Esc close  Ctrl+C copy",
        Screen::Results { .. } => "↑/↓ move  Enter open  Esc back",
        Screen::Text { .. } => "↑/↓ scroll  Esc back",
    }
}

pub fn draw_footer(f: &mut Frame, area: Rect, view: &ViewModel, theme: &Theme) {
    let mut spans: Vec<Span> = Vec::new();
    if let Some(n) = &view.notice {
        spans.push(Span::styled(
            "[INFO] ",
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(format!("{n}  |  "), Style::default().fg(theme.accent)));
    }
    spans.push(Span::styled(help_text(view), theme.text_muted()));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
