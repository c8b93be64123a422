use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind},
    terminal::{Clear, ClearType},
};
use marginalia_core::{KeyChord, RenderImage, Tool, ZoomMode};
use png::{BitDepth, ColorType, Encoder};

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits the image as PNG and places it at the cursor, replacing the previous
    /// placement.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    more
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", more)?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
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

/// Where a page image sits on the terminal grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub column: u32,
    pub row: u32,
    pub columns: u32,
    pub rows: u32,
    pub image_width: u32,
    pub image_height: u32,
}

impl Placement {
    /// Fits an image into the `available` cell box, keeping its aspect ratio, and centers
    /// it. `window_pixels` is the terminal's pixel size when the terminal reports one.
    pub fn fit(
        image_width: u32,
        image_height: u32,
        available: (u32, u32),
        grid: (u32, u32),
        window_pixels: Option<(u32, u32)>,
    ) -> Self {
        let (available_cols, available_rows) = (available.0.max(1), available.1.max(1));
        let (total_cols, total_rows) = (grid.0.max(1), grid.1.max(1));
        let (cell_width, cell_height) = match window_pixels {
            Some((width, height)) if width > 0 && height > 0 => (
                width as f32 / total_cols as f32,
                height as f32 / total_rows as f32,
            ),
            // Typical cells are about twice as tall as they are wide.
            _ => (1.0, 2.0),
        };

        let box_width = available_cols as f32 * cell_width;
        let box_height = available_rows as f32 * cell_height;
        let (mut columns, mut rows) = (available_cols, available_rows);
        if image_width > 0 && image_height > 0 {
            let ratio = (box_width / image_width as f32).min(box_height / image_height as f32);
            columns = ((image_width as f32 * ratio / cell_width).round() as u32)
                .clamp(1, available_cols);
            rows = ((image_height as f32 * ratio / cell_height).round() as u32)
                .clamp(1, available_rows);
        }

        Self {
            column: total_cols.saturating_sub(columns) / 2,
            row: available_rows.saturating_sub(rows) / 2,
            columns,
            rows,
            image_width,
            image_height,
        }
    }

    /// Pixel size of the `available` cell box. Without a reported window size, cells are
    /// taken as 8x16 pixels.
    pub fn area_pixels(
        available: (u32, u32),
        grid: (u32, u32),
        window_pixels: Option<(u32, u32)>,
    ) -> (f32, f32) {
        let (total_cols, total_rows) = (grid.0.max(1), grid.1.max(1));
        let (cell_width, cell_height) = match window_pixels {
            Some((width, height)) if width > 0 && height > 0 => (
                width as f32 / total_cols as f32,
                height as f32 / total_rows as f32,
            ),
            _ => (8.0, 16.0),
        };
        (
            available.0 as f32 * cell_width,
            available.1 as f32 * cell_height,
        )
    }

    pub fn draw_params(&self) -> DrawParams {
        DrawParams::clamped(self.columns, self.rows)
    }

    /// Image pixel at the center of a terminal cell, if the cell is on the image.
    pub fn cell_to_image(&self, column: u16, row: u16) -> Option<(f32, f32)> {
        let column = u32::from(column).checked_sub(self.column)?;
        let row = u32::from(row).checked_sub(self.row)?;
        if column >= self.columns || row >= self.rows {
            return None;
        }
        let x = (column as f32 + 0.5) / self.columns as f32 * self.image_width as f32;
        let y = (row as f32 + 0.5) / self.rows as f32 * self.image_height as f32;
        Some((x, y))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    SelectTool(Tool),
    ClearTool,
    CycleColor,
    AdjustStrokeWidth { delta: f32 },
    AdjustAlpha { delta: f32 },
    AdjustTextSize { delta: f32 },
    ToggleBold,
    ToggleItalic,
    ZoomBy { steps: i32 },
    SetZoomMode(ZoomMode),
    ScrollPages { count: isize },
    ScrollLines { count: isize },
    ToggleDarkMode,
    Shortcut(KeyChord),
    PointerDown { column: u16, row: u16 },
    PointerDrag { column: u16, row: u16 },
    PointerUp { column: u16, row: u16 },
    EditorInput(char),
    EditorNewline,
    EditorBackspace,
    EditorCommit,
    Resize,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    /// A text annotation editor is open; keys edit its content.
    TextEntry,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
}

impl EventMapper {
    const STROKE_STEP: f32 = 1.0;
    const ALPHA_STEP: f32 = 0.1;
    const TEXT_SIZE_STEP: f32 = 2.0;
    const WHEEL_LINES: isize = 3;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Mouse(mouse) => self.map_mouse(mouse),
            Event::Resize(..) => UiEvent::Resize,
            event => match self.mode {
                InputMode::Normal => self.map_event_normal(event),
                InputMode::TextEntry => self.map_event_text(event),
            },
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        if modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::SUPER) {
            self.reset_count();
            return match code {
                KeyCode::Char(c) => UiEvent::Shortcut(chord(c, modifiers)),
                _ => UiEvent::None,
            };
        }
        match code {
            KeyCode::Char(c) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            KeyCode::Char('j') | KeyCode::Down => {
                let count = self.take_count() as isize;
                UiEvent::ScrollPages { count }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                let count = self.take_count() as isize;
                UiEvent::ScrollPages { count: -count }
            }
            code => {
                self.reset_count();
                match code {
                    KeyCode::Char('d') => UiEvent::SelectTool(Tool::Draw),
                    KeyCode::Char('e') => UiEvent::SelectTool(Tool::Eraser),
                    KeyCode::Char('t') => UiEvent::SelectTool(Tool::Text),
                    KeyCode::Char('h') => UiEvent::SelectTool(Tool::Highlight),
                    KeyCode::Esc => UiEvent::ClearTool,
                    KeyCode::Char('c') => UiEvent::CycleColor,
                    KeyCode::Char('[') => UiEvent::AdjustStrokeWidth {
                        delta: -Self::STROKE_STEP,
                    },
                    KeyCode::Char(']') => UiEvent::AdjustStrokeWidth {
                        delta: Self::STROKE_STEP,
                    },
                    KeyCode::Char(',') => UiEvent::AdjustAlpha {
                        delta: -Self::ALPHA_STEP,
                    },
                    KeyCode::Char('.') => UiEvent::AdjustAlpha {
                        delta: Self::ALPHA_STEP,
                    },
                    KeyCode::Char('{') => UiEvent::AdjustTextSize {
                        delta: -Self::TEXT_SIZE_STEP,
                    },
                    KeyCode::Char('}') => UiEvent::AdjustTextSize {
                        delta: Self::TEXT_SIZE_STEP,
                    },
                    KeyCode::Char('b') => UiEvent::ToggleBold,
                    KeyCode::Char('i') => UiEvent::ToggleItalic,
                    KeyCode::Char('+') | KeyCode::Char('=') => UiEvent::ZoomBy { steps: 1 },
                    KeyCode::Char('-') => UiEvent::ZoomBy { steps: -1 },
                    KeyCode::Char('w') => UiEvent::SetZoomMode(ZoomMode::FitWidth),
                    KeyCode::Char('f') => UiEvent::SetZoomMode(ZoomMode::FitPage),
                    KeyCode::Char('D') => UiEvent::ToggleDarkMode,
                    KeyCode::Char('q') => UiEvent::Quit,
                    _ => UiEvent::None,
                }
            }
        }
    }

    /// Shortcuts are not mapped here; the editor keeps every key.
    fn map_event_text(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match (code, modifiers) {
            (KeyCode::Enter, mods) if mods.contains(KeyModifiers::SHIFT) => UiEvent::EditorNewline,
            (KeyCode::Enter, _) | (KeyCode::Esc, _) => UiEvent::EditorCommit,
            (KeyCode::Backspace, _) => UiEvent::EditorBackspace,
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                UiEvent::EditorInput(c)
            }
            _ => UiEvent::None,
        }
    }

    fn map_mouse(&mut self, mouse: MouseEvent) -> UiEvent {
        let MouseEvent {
            kind, column, row, ..
        } = mouse;
        match kind {
            MouseEventKind::Down(MouseButton::Left) => UiEvent::PointerDown { column, row },
            MouseEventKind::Drag(MouseButton::Left) => UiEvent::PointerDrag { column, row },
            MouseEventKind::Up(MouseButton::Left) => UiEvent::PointerUp { column, row },
            MouseEventKind::ScrollDown => UiEvent::ScrollLines {
                count: Self::WHEEL_LINES,
            },
            MouseEventKind::ScrollUp => UiEvent::ScrollLines {
                count: -Self::WHEEL_LINES,
            },
            _ => UiEvent::None,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        match self.mode {
            InputMode::TextEntry => Some("-- TEXT --".to_string()),
            InputMode::Normal if !self.pending_digits.is_empty() => {
                Some(self.pending_digits.clone())
            }
            InputMode::Normal => None,
        }
    }
}

fn chord(c: char, modifiers: KeyModifiers) -> KeyChord {
    KeyChord {
        key: c.to_ascii_lowercase(),
        ctrl: modifiers.contains(KeyModifiers::CONTROL),
        meta: modifiers.contains(KeyModifiers::SUPER),
        shift: modifiers.contains(KeyModifiers::SHIFT) || c.is_ascii_uppercase(),
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};
    use marginalia_core::{shortcut_for, Shortcut};

    #[test]
    fn kitty_draw_emits_protocol() {
        let mut renderer = KittyRenderer::new(Vec::new());
        let image = RenderImage {
            width: 1,
            height: 1,
            pixels: vec![255, 0, 0, 255],
        };

        renderer.draw(&image, DrawParams::clamped(10, 5)).unwrap();
        let output = String::from_utf8(renderer.writer).unwrap();
        assert!(output.starts_with("\u{1b}_Ga=T,f=100"));
        assert!(output.contains("c=10,r=5,s=1,v=1"));
        assert!(output.ends_with("\u{1b}\\"));
    }

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> Event {
        Event::Mouse(MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        })
    }

    #[test]
    fn letters_select_tools() {
        let mut mapper = EventMapper::new();
        for (key, tool) in [
            ('d', Tool::Draw),
            ('e', Tool::Eraser),
            ('t', Tool::Text),
            ('h', Tool::Highlight),
        ] {
            assert_eq!(
                mapper.map_event(key_event(KeyCode::Char(key))),
                UiEvent::SelectTool(tool)
            );
        }
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::ClearTool);
    }

    #[test]
    fn style_and_zoom_mode_keys() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('.'))),
            UiEvent::AdjustAlpha { delta: 0.1 }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char(','))),
            UiEvent::AdjustAlpha { delta: -0.1 }
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('}'),
                KeyModifiers::SHIFT
            )),
            UiEvent::AdjustTextSize { delta: 2.0 }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('{'))),
            UiEvent::AdjustTextSize { delta: -2.0 }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('w'))),
            UiEvent::SetZoomMode(ZoomMode::FitWidth)
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('f'))),
            UiEvent::SetZoomMode(ZoomMode::FitPage)
        );
    }

    #[test]
    fn ctrl_chords_become_history_shortcuts() {
        let mut mapper = EventMapper::new();
        let undo = mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('z'),
            KeyModifiers::CONTROL,
        ));
        let redo = mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('Z'),
            KeyModifiers::CONTROL | KeyModifiers::SHIFT,
        ));
        let redo_y = mapper.map_event(key_event_with_modifiers(
            KeyCode::Char('y'),
            KeyModifiers::CONTROL,
        ));
        let shortcut = |event: UiEvent| match event {
            UiEvent::Shortcut(chord) => shortcut_for(chord, false),
            other => panic!("expected a shortcut, got {other:?}"),
        };
        assert_eq!(shortcut(undo), Some(Shortcut::Undo));
        assert_eq!(shortcut(redo), Some(Shortcut::Redo));
        assert_eq!(shortcut(redo_y), Some(Shortcut::Redo));
    }

    #[test]
    fn numeric_prefix_scrolls_several_pages() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('1')));
        mapper.map_event(key_event(KeyCode::Char('2')));
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('k'))),
            UiEvent::ScrollPages { count: -12 }
        );
        assert_eq!(mapper.pending_input(), None);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::ScrollPages { count: 1 }
        );
    }

    #[test]
    fn text_entry_keeps_every_key_for_the_editor() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::TextEntry);
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('q'))),
            UiEvent::EditorInput('q')
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('Q'),
                KeyModifiers::SHIFT
            )),
            UiEvent::EditorInput('Q')
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('z'),
                KeyModifiers::CONTROL
            )),
            UiEvent::None
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(KeyCode::Enter, KeyModifiers::SHIFT)),
            UiEvent::EditorNewline
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Backspace)),
            UiEvent::EditorBackspace
        );
        assert_eq!(mapper.map_event(key_event(KeyCode::Enter)), UiEvent::EditorCommit);
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::EditorCommit);
    }

    #[test]
    fn left_button_maps_to_pointer_events() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(mouse(MouseEventKind::Down(MouseButton::Left), 3, 4)),
            UiEvent::PointerDown { column: 3, row: 4 }
        );
        assert_eq!(
            mapper.map_event(mouse(MouseEventKind::Drag(MouseButton::Left), 5, 4)),
            UiEvent::PointerDrag { column: 5, row: 4 }
        );
        assert_eq!(
            mapper.map_event(mouse(MouseEventKind::Up(MouseButton::Left), 5, 6)),
            UiEvent::PointerUp { column: 5, row: 6 }
        );
        assert_eq!(
            mapper.map_event(mouse(MouseEventKind::Down(MouseButton::Right), 1, 1)),
            UiEvent::None
        );
        assert_eq!(
            mapper.map_event(mouse(MouseEventKind::ScrollDown, 0, 0)),
            UiEvent::ScrollLines { count: 3 }
        );
    }

    #[test]
    fn placement_keeps_aspect_and_maps_cells() {
        // 10x20 pixel cells on an 80x24 grid.
        let placement = Placement::fit(600, 800, (80, 24), (80, 24), Some((800, 480)));
        assert_eq!(placement.rows, 24);
        assert_eq!(placement.columns, 36);
        assert_eq!(placement.column, 22);
        assert_eq!(placement.row, 0);

        assert_eq!(placement.cell_to_image(21, 0), None);
        assert_eq!(placement.cell_to_image(22 + 36, 0), None);
        let (x, y) = placement.cell_to_image(22, 0).unwrap();
        assert!((x - 0.5 / 36.0 * 600.0).abs() < 1e-3);
        assert!((y - 0.5 / 24.0 * 800.0).abs() < 1e-3);
    }

    #[test]
    fn image_area_in_pixels() {
        assert_eq!(
            Placement::area_pixels((80, 23), (80, 24), Some((800, 480))),
            (800.0, 460.0)
        );
        assert_eq!(Placement::area_pixels((80, 23), (80, 24), None), (640.0, 368.0));
    }
}
