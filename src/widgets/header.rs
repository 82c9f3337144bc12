use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::theme::Theme;

pub fn draw_header(f: &mut Frame, area: Rect, breadcrumb: &[String], theme: &Theme) {
    let mut spans: Vec<Span> = Vec::new();
    for (i, label) in breadcrumb.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" > ", theme.text_muted()));
        }
        let style = if i + 1 == breadcrumb.len() {
            theme.title_style()
        } else {
            Style::default().fg(theme.accent)
        };
        spans.push(Span::styled(label.clone(), style));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
