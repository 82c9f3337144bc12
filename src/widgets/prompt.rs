use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

use crate::theme::Theme;
use crate::widgets::chrome::panel_block;

#[allow(clippy::too_many_arguments)]
pub fn draw_prompt(
    f: &mut Frame,
    area: Rect,
    param: &str,
    index: usize,
    total: usize,
    input: &str,
    template: &str,
    theme: &Theme,
) {
    let label = if total > 1 {
        format!("{param} ({}/{total})", index + 1)
    } else {
        param.to_string()
    };
    let lines = vec![
        Line::from(Span::styled(template.to_string(), theme.text_muted())),
        Line::raw(""),
        Line::from(vec![
            Span::styled(format!("{label}: "), theme.text_active_bold()),
            Span::styled(input.to_string(), theme.text_editing_bold()),
            Span::styled("_", theme.text_editing_bold()),
        ]),
    ];
    let p = Paragraph::new(lines).block(panel_block("Enter value", true, theme));
    f.render_widget(p, area);
}
