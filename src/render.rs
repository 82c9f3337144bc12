use crate::app::view::{Screen, ViewModel};
use crate::theme::Theme;
use crate::widgets::header::draw_header;
use crate::widgets::menu::draw_menu;
use crate::widgets::output::{draw_document, draw_job, draw_lines, draw_results};
use crate::widgets::prompt::draw_prompt;
use crate::widgets::status_bar::draw_footer;
use anyhow::{Context, Result};
use ratatui::prelude::*;
use ratatui::widgets::Block;
use std::io::Write;

pub trait Renderer {
    fn render(&mut self, view: &ViewModel) -> Result<()>;
}

pub struct TerminalRenderer<B: Backend> {
    terminal: Terminal<B>,
    theme: Theme,
    tick: u64,
}

impl<B: Backend> TerminalRenderer<B> {
    pub fn new(backend: B) -> Result<Self> {
        Ok(Self {
            terminal: Terminal::new(backend).context("creating terminal")?,
            theme: Theme::synthwave_dark(),
            tick: 0,
        })
    }

    pub fn tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
    }

    #[cfg(test)]
    pub fn terminal(&self) -> &Terminal<B> {
        &self.terminal
    }

    pub fn terminal_mut(&mut self) -> &mut Terminal<B> {
        &mut self.terminal
    }
}

pub fn draw_view(f: &mut Frame, view: &ViewModel, theme: &Theme, tick: u64) {
    let screen = f.area();
    f.render_widget(Block::default().style(theme.base_style()), screen);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(screen);
    draw_header(f, chunks[0], &view.breadcrumb, theme);
    let body = chunks[1];
    match &view.screen {
        Screen::Menu {
            items,
            selected,
            offset,
            ..
        } => draw_menu(f, body, &view.title, items, *selected, *offset, theme),
        Screen::Prompt {
            param,
            index,
            total,
            input,
            template,
        } => draw_prompt(f, body, param, *index, *total, input, template, theme),
        Screen::Job(job) => draw_job(f, body, job, theme, tick),
        Screen::Results {
            document: Some(doc),
            ..
        } => draw_document(f, body, doc, theme),
        Screen::Results {
            items,
            selected,
            loading,
            ..
        } => draw_results(f, body, &view.title, items, *selected, *loading, theme),
        Screen::Text { lines, scroll } => draw_lines(f, body, &view.title, lines, *scroll, theme),
    }
    draw_footer(f, chunks[2], view, theme);
}

impl<B: Backend> Renderer for TerminalRenderer<B> {
    fn render(&mut self, view: &ViewModel) -> Result<()> {
        let theme = &self.theme;
        let tick = self.tick;
        self.terminal
            .draw(|f| draw_view(f, view, theme, tick))
            .context("drawing frame")?;
        Ok(())
    }
}

pub struct JsonRenderer<W: Write> {
    out: W,
}

impl<W: Write> JsonRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for JsonRenderer<W> {
    fn render(&mut self, view: &ViewModel) -> Result<()> {
        serde_json::to_writer(&mut self.out, view).context("serializing view")?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}
