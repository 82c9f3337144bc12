use ratatui::prelude::*;
use ratatui::widgets::*;

use crate::app::view::MenuRow;
use crate::theme::Theme;
use crate::widgets::chrome::panel_block;

/// Window `[start, end)` of `total` rows that keeps `selected` visible in `inner_h`
/// lines, starting from the navigator's `offset` when it fits.
pub(crate) fn compute_scroll_window(
    total: usize,
    selected: usize,
    offset: usize,
    inner_h: u16,
) -> (usize, usize) {
    if inner_h == 0 || total == 0 {
        return (0, 0);
    }
    let ih = inner_h as usize;
    let sel = selected.min(total - 1);
    let mut start = offset.min(total.saturating_sub(ih));
    if sel < start {
        start = sel;
    } else if sel >= start + ih {
        start = sel + 1 - ih;
    }
    (start, (start + ih).min(total))
}

fn marker(kind: &str) -> &'static str {
    match kind {
        "submenu" => " ▸",
        "command" => " …",
        _ => "",
    }
}

pub fn draw_menu(
    f: &mut Frame,
    area: Rect,
    title: &str,
    rows: &[MenuRow],
    selected: usize,
    offset: usize,
    theme: &Theme,
) {
    let inner_h = area.height.saturating_sub(2);
    let (start, end) = compute_scroll_window(rows.len(), selected, offset, inner_h);
    let items: Vec<ListItem> = rows
        .iter()
        .enumerate()
        .skip(start)
        .take(end - start)
        .map(|(idx, row)| {
            let is_sel = idx == selected;
            let sel = if is_sel { "> " } else { "  " };
            let mut text = format!("{sel}{}{}", row.label, marker(row.kind));
            if !row.available {
                text.push_str(" (not installed)");
            }
            let item = ListItem::new(text);
            if is_sel {
                item.style(theme.list_cursor_style())
            } else if !row.available {
                item.style(theme.text_muted())
            } else {
                item
            }
        })
        .collect();
    let list = List::new(items).block(panel_block(title, true, theme));
    f.render_widget(list, area);
}
