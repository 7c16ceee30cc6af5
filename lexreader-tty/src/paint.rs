use std::io::Write;

use anyhow::Result;
use crossterm::{
    cursor, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use lexreader_core::{HighlightColor, MarkerTag, NoteId, PageNumber, TextRange};

use crate::layout::{Row, RowKind};

/// Per-frame decoration on top of the laid-out rows.
#[derive(Debug, Clone, Default)]
pub struct PaintStyle<'a> {
    pub dark_mode: bool,
    pub selection: Option<(PageNumber, TextRange)>,
    pub cursor: Option<(PageNumber, usize)>,
    pub active_note: Option<&'a NoteId>,
    pub flashing: Option<&'a NoteId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelLine {
    pub text: String,
    pub color: Option<HighlightColor>,
    pub flashing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CellStyle {
    fg: Color,
    bg: Color,
    underline: bool,
    reverse: bool,
}

pub fn marker_color(color: HighlightColor) -> Color {
    match color {
        HighlightColor::Yellow => Color::DarkYellow,
        HighlightColor::Green => Color::DarkGreen,
        HighlightColor::Blue => Color::DarkBlue,
        HighlightColor::Pink => Color::Magenta,
        HighlightColor::Purple => Color::DarkMagenta,
    }
}

impl PaintStyle<'_> {
    fn base(&self) -> CellStyle {
        let (fg, bg) = if self.dark_mode {
            (Color::Grey, Color::Black)
        } else {
            (Color::Black, Color::White)
        };
        CellStyle {
            fg,
            bg,
            underline: false,
            reverse: false,
        }
    }

    fn cell(&self, page: PageNumber, offset: usize, marker: Option<&MarkerTag>) -> CellStyle {
        let mut style = self.base();
        if let Some(tag) = marker {
            style.bg = marker_color(tag.color);
            style.fg = Color::White;
            style.underline = self.active_note == Some(&tag.note_id);
            if self.flashing == Some(&tag.note_id) {
                style.reverse = true;
            }
        }
        if matches!(self.selection, Some((p, range)) if p == page && range.contains(offset)) {
            style.bg = Color::DarkGrey;
            style.fg = Color::White;
        }
        if self.cursor == Some((page, offset)) {
            style.reverse = !style.reverse;
        }
        style
    }
}

pub struct TextRenderer<W: Write> {
    writer: W,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Paints `rows` from screen position (`col`, `row`), each padded to
    /// `width` columns.
    pub fn paint_rows(
        &mut self,
        rows: &[Row],
        col: u16,
        row: u16,
        width: u16,
        style: &PaintStyle<'_>,
    ) -> Result<()> {
        let base = style.base();
        for (idx, line) in rows.iter().enumerate() {
            let y = row.saturating_add(idx as u16);
            queue!(self.writer, cursor::MoveTo(col, y))?;
            let used = match line.kind {
                RowKind::PageHeader => {
                    let label = truncate_with_ellipsis(
                        format!("-- page {} --", line.page),
                        usize::from(width),
                    );
                    self.print_styled(&label, base, Some(Attribute::Dim))?;
                    usize::from(width)
                }
                RowKind::Pending => {
                    let label = truncate_with_ellipsis(
                        format!("   (loading page {})", line.page),
                        usize::from(width),
                    );
                    self.print_styled(&label, base, Some(Attribute::Italic))?;
                    usize::from(width)
                }
                RowKind::Text => self.paint_text_row(line, style)?,
            };
            let pad = usize::from(width).saturating_sub(used);
            if pad > 0 {
                self.print_styled(&" ".repeat(pad), base, None)?;
            }
        }
        queue!(self.writer, ResetColor, SetAttribute(Attribute::Reset))?;
        Ok(())
    }

    fn paint_text_row(&mut self, line: &Row, style: &PaintStyle<'_>) -> Result<usize> {
        let mut used = 0;
        let mut run = String::new();
        let mut run_style: Option<CellStyle> = None;
        for piece in &line.pieces {
            for (idx, ch) in piece.text.chars().enumerate() {
                let cell = style.cell(line.page, piece.start + idx, piece.marker.as_ref());
                if run_style.is_some_and(|current| current != cell) {
                    if let Some(current) = run_style {
                        self.print_styled(&run, current, None)?;
                    }
                    run.clear();
                }
                run_style = Some(cell);
                run.push(ch);
                used += 1;
            }
        }
        if let Some(current) = run_style {
            self.print_styled(&run, current, None)?;
        }
        // An empty row still shows the cursor when it sits on the line break.
        if line.pieces.is_empty() && style.cursor == Some((line.page, line.start)) {
            self.print_styled(" ", style.cell(line.page, line.start, None), None)?;
            used += 1;
        }
        Ok(used)
    }

    fn print_styled(&mut self, text: &str, cell: CellStyle, extra: Option<Attribute>) -> Result<()> {
        queue!(
            self.writer,
            SetAttribute(Attribute::Reset),
            SetForegroundColor(cell.fg),
            SetBackgroundColor(cell.bg)
        )?;
        if cell.underline {
            queue!(self.writer, SetAttribute(Attribute::Underlined))?;
        }
        if cell.reverse {
            queue!(self.writer, SetAttribute(Attribute::Reverse))?;
        }
        if let Some(attribute) = extra {
            queue!(self.writer, SetAttribute(attribute))?;
        }
        queue!(self.writer, Print(text))?;
        Ok(())
    }

    /// Bordered side panel with a title and a scrolled list of lines.
    #[allow(clippy::too_many_arguments)]
    pub fn paint_panel(
        &mut self,
        col: u16,
        row: u16,
        width: u16,
        height: u16,
        title: &str,
        lines: &[PanelLine],
        selected: Option<usize>,
        scroll: usize,
    ) -> Result<()> {
        if width < 6 || height < 4 {
            return Ok(());
        }
        let inner_width = usize::from(width) - 2;
        let content_height = usize::from(height) - 3;
        let border = format!("+{}+", "-".repeat(inner_width));

        let mut y = row;
        print_inverted(&mut self.writer, col, y, &border)?;
        y += 1;
        let title_line = format!("|{: ^inner_width$}|", truncate_with_ellipsis(title.to_owned(), inner_width));
        print_inverted(&mut self.writer, col, y, &title_line)?;
        y += 1;

        for idx in scroll..scroll + content_height {
            queue!(self.writer, cursor::MoveTo(col, y))?;
            match lines.get(idx) {
                Some(line) => {
                    let marker = if selected == Some(idx) { '>' } else { ' ' };
                    let content = truncate_with_ellipsis(
                        format!("{} {}", marker, line.text),
                        inner_width,
                    );
                    queue!(self.writer, Print("|"))?;
                    if let Some(color) = line.color {
                        queue!(self.writer, SetBackgroundColor(marker_color(color)))?;
                    }
                    if line.flashing || selected == Some(idx) {
                        queue!(self.writer, SetAttribute(Attribute::Reverse))?;
                    }
                    queue!(
                        self.writer,
                        Print(content),
                        SetAttribute(Attribute::Reset),
                        ResetColor,
                        Print("|")
                    )?;
                }
                None => {
                    queue!(self.writer, Print(format!("|{}|", " ".repeat(inner_width))))?;
                }
            }
            y += 1;
        }
        print_inverted(&mut self.writer, col, y, &border)?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Clears the entire screen.
    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

fn print_inverted(writer: &mut impl Write, col: u16, row: u16, content: &str) -> Result<()> {
    queue!(
        writer,
        cursor::MoveTo(col, row),
        SetAttribute(Attribute::Reverse),
        Print(content),
        SetAttribute(Attribute::Reset)
    )?;
    Ok(())
}

/// Cuts `text` to `width` chars with a trailing `...`, padding short text.
pub fn truncate_with_ellipsis(text: String, width: usize) -> String {
    let len = text.chars().count();
    let mut text = if len > width {
        if width <= 3 {
            text.chars().take(width).collect()
        } else {
            let mut truncated = text.chars().take(width - 3).collect::<String>();
            truncated.push_str("...");
            truncated
        }
    } else {
        text
    };
    let len = text.chars().count();
    if len < width {
        text.push_str(&" ".repeat(width - len));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::layout_page;
    use lexreader_core::{render_highlights, HighlightSpec, TextLayer};

    fn highlighted() -> Vec<Row> {
        let mut layer = TextLayer::from_spans(1, &["Plaintiff alleges breach"]);
        render_highlights(
            &mut layer,
            &[HighlightSpec {
                range: TextRange { start: 10, end: 17 },
                color: HighlightColor::Blue,
                note_id: NoteId::from("n1"),
            }],
        );
        layout_page(&layer, 40)
    }

    #[test]
    fn sync_update_wraps_frame() {
        let mut renderer = TextRenderer::new(Vec::new());
        renderer.begin_sync_update().unwrap();
        renderer.end_sync_update().unwrap();
        assert_eq!(renderer.writer().as_slice(), b"\x1b[?2026h\x1b[?2026l");
    }

    #[test]
    fn rows_paint_text_and_marker_colour() {
        let mut renderer = TextRenderer::new(Vec::new());
        let rows = highlighted();
        renderer
            .paint_rows(&rows, 0, 0, 40, &PaintStyle::default())
            .unwrap();
        let output = String::from_utf8(renderer.writer().clone()).unwrap();
        assert!(output.contains("-- page 1 --"));
        assert!(output.contains("Plaintiff "));
        assert!(output.contains("alleges"));
        // Marker background for blue highlights.
        let mut expected = Vec::new();
        queue!(expected, SetBackgroundColor(Color::DarkBlue)).unwrap();
        assert!(output.contains(std::str::from_utf8(&expected).unwrap()));
    }

    #[test]
    fn cell_style_layers_selection_and_cursor() {
        let id = NoteId::from("n1");
        let tag = MarkerTag {
            note_id: id.clone(),
            color: HighlightColor::Yellow,
        };
        let style = PaintStyle {
            selection: Some((1, TextRange { start: 0, end: 5 })),
            cursor: Some((1, 4)),
            active_note: Some(&id),
            ..PaintStyle::default()
        };
        let selected = style.cell(1, 2, None);
        assert_eq!(selected.bg, Color::DarkGrey);
        assert!(!selected.reverse);
        assert!(style.cell(1, 4, None).reverse);
        let marked = style.cell(1, 9, Some(&tag));
        assert_eq!(marked.bg, Color::DarkYellow);
        assert!(marked.underline);
        assert_eq!(style.cell(2, 2, None).bg, Color::White);
    }

    #[test]
    fn truncation_pads_and_cuts_by_chars() {
        assert_eq!(truncate_with_ellipsis("abc".into(), 5), "abc  ");
        assert_eq!(truncate_with_ellipsis("abcdefgh".into(), 6), "abc...");
        assert_eq!(truncate_with_ellipsis("déjà vu".into(), 4), "d...");
    }
}
