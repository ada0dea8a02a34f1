//! Bordered slot grid: one column per slot, one block per configured row.

use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};

use hwcheck_probe::Entity;
use ratatui::{
    backend::CrosstermBackend,
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    widgets::Widget,
    Terminal, TerminalOptions, Viewport,
};

use crate::layout::Visualization;
use crate::matcher::Severity;
use crate::ui::theme;

/// Inner width of a cell; matches the longest canonical position.
pub const CELL_WIDTH: usize = hwcheck_probe::POSITION_MAX_LEN;
const ROW_HEIGHT: u16 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    Observed(Severity),
    /// Required by policy but absent or inactive.
    Missing,
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    pub slot: u32,
    pub position: Option<String>,
    pub value: String,
    pub status: String,
    pub state: CellState,
}

impl GridCell {
    fn lines(&self) -> [String; 4] {
        let symbol = match self.state {
            CellState::Observed(s) => format!("{} {}", self.slot, theme::severity_symbol(s)),
            CellState::Missing => format!("{} {}", self.slot, theme::severity_symbol(Severity::Missing)),
            CellState::Empty => format!("{} {}", self.slot, theme::EMPTY_GLYPH),
        };
        let name = self.position.clone().unwrap_or_default();
        match self.state {
            CellState::Missing => [symbol, name, String::new(), theme::MISS.to_string()],
            CellState::Empty => [symbol, name, theme::EMPTY_GLYPH.to_string(), String::new()],
            CellState::Observed(_) => [symbol, name, self.value.clone(), self.status.clone()],
        }
    }

    fn style(&self) -> Style {
        match self.state {
            CellState::Observed(s) => theme::severity_style(s),
            CellState::Missing => theme::severity_style(Severity::Missing),
            CellState::Empty => Style::default().fg(theme::EMPTY),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub name: String,
    pub cells: Vec<GridCell>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridModel {
    pub rows: Vec<GridRow>,
    /// Observed positions with no slot in the saved map.
    pub unmapped: Vec<String>,
}

impl GridModel {
    /// Slots and rows come from the saved map, never from the live entity order.
    pub fn build(
        entities: &[Entity],
        vis: &Visualization,
        required: &[String],
        severities: &BTreeMap<String, Severity>,
    ) -> Self {
        let mut by_position: BTreeMap<&str, &Entity> = BTreeMap::new();
        for e in entities {
            by_position.entry(e.position.as_str()).or_insert(e);
        }
        let slot_positions = vis.positions_by_slot();

        let rows = vis
            .rows()
            .into_iter()
            .map(|row| GridRow {
                cells: row
                    .slots
                    .iter()
                    .map(|slot| {
                        let position = slot_positions.get(slot).cloned();
                        let entity = position
                            .as_deref()
                            .and_then(|p| by_position.get(p))
                            .filter(|e| e.is_active());
                        let state = match (&position, entity) {
                            (Some(p), Some(_)) => CellState::Observed(
                                severities.get(p).copied().unwrap_or_default(),
                            ),
                            (Some(p), None) if required.contains(p) => CellState::Missing,
                            _ => CellState::Empty,
                        };
                        GridCell {
                            slot: *slot,
                            value: entity.map(|e| e.display_value()).unwrap_or_default(),
                            status: entity.map(|e| e.status.to_string()).unwrap_or_default(),
                            position,
                            state,
                        }
                    })
                    .collect(),
                name: row.name,
            })
            .collect();

        let mut unmapped: Vec<String> = Vec::new();
        for e in entities {
            if vis.slot_of(&e.position).is_none() && !unmapped.contains(&e.position) {
                unmapped.push(e.position.clone());
            }
        }
        Self { rows, unmapped }
    }

    pub fn width(&self) -> u16 {
        let cols = self.rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
        let grid = if cols == 0 { 0 } else { cols * (CELL_WIDTH + 1) + 1 };
        let extra = self.unmapped_line().map_or(0, |l| l.chars().count());
        grid.max(extra).min(u16::MAX as usize) as u16
    }

    pub fn height(&self) -> u16 {
        let unmapped = u16::from(self.unmapped_line().is_some());
        (self.rows.len() as u16) * ROW_HEIGHT + unmapped
    }

    fn unmapped_line(&self) -> Option<String> {
        if self.unmapped.is_empty() {
            None
        } else {
            Some(format!("Unmapped: {}", self.unmapped.join(", ")))
        }
    }
}

fn fit(s: &str, width: usize) -> String {
    let t: String = s.chars().take(width).collect();
    format!("{t:^width$}")
}

fn put(buf: &mut Buffer, area: Rect, x: u16, y: u16, s: &str, style: Style) -> u16 {
    if y >= area.bottom() || x >= area.right() {
        return x;
    }
    let (nx, _) = buf.set_stringn(x, y, s, (area.right() - x) as usize, style);
    nx
}

fn border(buf: &mut Buffer, area: Rect, y: u16, n: usize, [l, mid, r]: [&str; 3]) {
    let seg = "─".repeat(CELL_WIDTH);
    let mut line = String::from(l);
    for i in 0..n {
        line.push_str(&seg);
        line.push_str(if i + 1 == n { r } else { mid });
    }
    put(buf, area, area.x, y, &line, Style::default().fg(theme::BORDER));
}

impl Widget for &GridModel {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let frame = Style::default().fg(theme::BORDER);
        let mut y = area.y;
        for row in &self.rows {
            put(buf, area, area.x, y, &row.name, Style::default().add_modifier(Modifier::BOLD));
            y += 1;
            let n = row.cells.len();
            if n == 0 {
                y += ROW_HEIGHT - 1;
                continue;
            }
            border(buf, area, y, n, ["┌", "┬", "┐"]);
            y += 1;
            let lines: Vec<[String; 4]> = row.cells.iter().map(GridCell::lines).collect();
            for line in 0..4 {
                let mut x = put(buf, area, area.x, y, "│", frame);
                for (cell, text) in row.cells.iter().zip(&lines) {
                    x = put(buf, area, x, y, &fit(&text[line], CELL_WIDTH), cell.style());
                    x = put(buf, area, x, y, "│", frame);
                }
                y += 1;
            }
            border(buf, area, y, n, ["└", "┴", "┘"]);
            y += 1;
        }
        if let Some(line) = self.unmapped_line() {
            put(buf, area, area.x, y, &line, Style::default().fg(theme::CAUTION));
        }
    }
}

/// Plain text of a rendered grid, one string per line, trailing blanks trimmed.
pub fn render_lines(model: &GridModel) -> Vec<String> {
    let area = Rect::new(0, 0, model.width(), model.height());
    let mut buf = Buffer::empty(area);
    model.render(area, &mut buf);
    (area.top()..area.bottom())
        .map(|y| {
            let mut line = String::new();
            for x in area.left()..area.right() {
                line.push_str(buf[(x, y)].symbol());
            }
            line.trim_end().to_string()
        })
        .collect()
}

/// Colored inline viewport on a terminal, plain lines otherwise.
pub fn print_grid(model: &GridModel) -> io::Result<()> {
    if model.rows.is_empty() && model.unmapped.is_empty() {
        println!("(no slots mapped)");
        return Ok(());
    }
    if !io::stdout().is_terminal() {
        let mut out = io::stdout().lock();
        for line in render_lines(model) {
            writeln!(out, "{line}")?;
        }
        return Ok(());
    }
    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::with_options(
        backend,
        TerminalOptions {
            viewport: Viewport::Inline(model.height()),
        },
    )?;
    terminal.draw(|f| f.render_widget(model, f.area()))?;
    println!();
    Ok(())
}
