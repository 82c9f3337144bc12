use ratatui::prelude::*;
use ratatui::widgets::{List, ListItem, Paragraph, Wrap};

use crate::app::view::{Document, JobView};
use crate::services::results::ResultArtifact;
use crate::services::runner::JobStatus;
use crate::theme::Theme;
use crate::widgets::chrome::panel_block;
use crate::widgets::menu::compute_scroll_window;
use crate::widgets::SPINNER;

/// First line to show so the last `inner_h` lines of `total` are visible.
pub(crate) fn tail_scroll(total: usize, inner_h: u16) -> u16 {
    total.saturating_sub(inner_h as usize).min(u16::MAX as usize) as u16
}

fn status_style(status: &JobStatus, theme: &Theme) -> Style {
    match status {
        JobStatus::Completed { exit_code: 0 } => theme.text_success(),
        JobStatus::Pending | JobStatus::Running => theme.text_active_bold(),
        JobStatus::Cancelled => theme.text_muted(),
        _ => theme.text_error(),
    }
}

pub fn draw_job(f: &mut Frame, area: Rect, job: &JobView, theme: &Theme, tick: u64) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(2), Constraint::Min(3)])
        .split(area);

    let spinner = if job.terminal {
        ""
    } else {
        SPINNER[tick as usize % SPINNER.len()]
    };
    let mut status = vec![
        Span::styled(
            format!("{spinner} {}", job.status_label),
            status_style(&job.status, theme),
        ),
        Span::styled(format!("  {:.1}s", job.elapsed_secs), theme.text_muted()),
    ];
    if job.truncated {
        status.push(Span::styled("  [output truncated]", theme.text_error()));
    }
    if let Some(a) = &job.artifact {
        status.push(Span::styled(format!("  saved: {a}"), theme.text_muted()));
    }
    let head = Paragraph::new(vec![
        Line::from(Span::styled(format!("$ {}", job.command), theme.text_muted())),
        Line::from(status),
    ]);
    f.render_widget(head, chunks[0]);

    // follow the tail while output grows
    let lines: Vec<Line> = job.output.lines().map(|l| Line::raw(l.to_string())).collect();
    let inner_h = chunks[1].height.saturating_sub(2);
    let scroll = tail_scroll(lines.len(), inner_h);
    let title = match job.id {
        Some(id) => format!("Job #{id}"),
        None => "Job".to_string(),
    };
    let body = Paragraph::new(lines)
        .block(panel_block(&title, !job.terminal, theme))
        .scroll((scroll, 0));
    f.render_widget(body, chunks[1]);
}

pub fn draw_lines(f: &mut Frame, area: Rect, title: &str, lines: &[String], scroll: usize, theme: &Theme) {
    let text: Vec<Line> = lines.iter().map(|l| Line::raw(l.as_str())).collect();
    let p = Paragraph::new(text)
        .block(panel_block(title, true, theme))
        .wrap(Wrap { trim: false })
        .scroll((scroll.min(u16::MAX as usize) as u16, 0));
    f.render_widget(p, area);
}

pub fn draw_document(f: &mut Frame, area: Rect, doc: &Document, theme: &Theme) {
    draw_lines(f, area, &doc.name, &doc.lines, doc.scroll, theme);
}

pub fn draw_results(
    f: &mut Frame,
    area: Rect,
    title: &str,
    items: &[ResultArtifact],
    selected: usize,
    loading: bool,
    theme: &Theme,
) {
    let block = panel_block(title, true, theme);
    if loading || items.is_empty() {
        let msg = if loading { "Loading..." } else { "No results yet" };
        f.render_widget(
            Paragraph::new(Span::styled(msg, theme.text_muted())).block(block),
            area,
        );
        return;
    }
    let inner_h = area.height.saturating_sub(2);
    let (start, end) = compute_scroll_window(items.len(), selected, 0, inner_h);
    let rows: Vec<ListItem> = items[start..end]
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let is_sel = start + i == selected;
            let sel = if is_sel { "> " } else { "  " };
            let item = ListItem::new(format!(
                "{sel}{}  {}  {}B",
                a.filename,
                a.created_at.format("%Y-%m-%d %H:%M"),
                a.size
            ));
            if is_sel {
                item.style(theme.list_cursor_style())
            } else {
                item
            }
        })
        .collect();
    f.render_widget(List::new(rows).block(block), area);
}
