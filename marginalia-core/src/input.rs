//! Pointer, selection and keyboard handling for annotation tools.
//!
//! The controller never draws. Stroke outcomes carry the segment to preview, and
//! every committed command is reported so the host can replay the page from the
//! session, which stays the system of record.

use tracing::{debug, trace};

use crate::command::{Command, CommandId, FontSpec, FontWeight, StrokeStyle};
use crate::error::AnnotationError;
use crate::geometry::{Color, Point, Rect};
use crate::session::{AnnotationSession, HistoryOutcome};
use crate::tool::{Tool, ToolState};
use crate::PageNumber;

/// Measures rendered text for hit-testing. Only the width is measured; the hit box
/// height is the font size.
pub trait TextMetrics {
    /// Width of the widest line of `text`.
    fn text_width(&self, text: &str, font: FontSpec) -> f32;
}

/// Fixed-advance metrics matching the built-in glyph painter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproximateMetrics;

impl ApproximateMetrics {
    pub fn advance(font: FontSpec) -> f32 {
        let em = match font.weight {
            FontWeight::Normal => 0.55,
            FontWeight::Bold => 0.6,
        };
        font.size * em
    }
}

impl TextMetrics for ApproximateMetrics {
    fn text_width(&self, text: &str, font: FontSpec) -> f32 {
        let widest = text.lines().map(|line| line.chars().count()).max().unwrap_or(0);
        widest as f32 * Self::advance(font)
    }
}

/// A pointer position already resolved to a page, in page-local canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerTarget {
    pub page: PageNumber,
    pub point: Point,
}

impl PointerTarget {
    pub fn new(page: PageNumber, point: Point) -> Self {
        Self { page, point }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerOutcome {
    Ignored,
    StrokeStarted {
        page: PageNumber,
        point: Point,
        style: StrokeStyle,
    },
    StrokeExtended {
        page: PageNumber,
        from: Point,
        to: Point,
        style: StrokeStyle,
    },
    /// A command was stored; the page must be replayed.
    Committed { page: PageNumber, id: CommandId },
    /// The stroke was too short to keep; the page must be replayed to drop its preview.
    StrokeDiscarded { page: PageNumber },
    EditorOpened {
        page: PageNumber,
        replaces: Option<CommandId>,
    },
    EditorClosed(EditorOutcome),
}

impl PointerOutcome {
    /// Page whose layers must be replayed from the session.
    pub fn dirty_page(&self) -> Option<PageNumber> {
        match self {
            PointerOutcome::Committed { page, .. } | PointerOutcome::StrokeDiscarded { page } => {
                Some(*page)
            }
            PointerOutcome::EditorClosed(outcome) => outcome.page(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorOutcome {
    Created {
        page: PageNumber,
        id: CommandId,
    },
    Replaced {
        page: PageNumber,
        old: CommandId,
        id: CommandId,
    },
    /// An existing text was edited down to nothing.
    Deleted { page: PageNumber, old: CommandId },
    /// A new editor was closed empty.
    Discarded { page: PageNumber },
}

impl EditorOutcome {
    pub fn page(&self) -> Option<PageNumber> {
        match self {
            EditorOutcome::Created { page, .. }
            | EditorOutcome::Replaced { page, .. }
            | EditorOutcome::Deleted { page, .. } => Some(*page),
            EditorOutcome::Discarded { .. } => None,
        }
    }
}

/// Open text overlay. Style is fixed when it opens.
#[derive(Debug, Clone, PartialEq)]
pub struct TextEditor {
    pub page: PageNumber,
    pub anchor: Point,
    content: String,
    replaces: Option<CommandId>,
    pub color: Color,
    pub font: FontSpec,
    pub alpha: f32,
    suspended_tool: Tool,
}

impl TextEditor {
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn replaces(&self) -> Option<CommandId> {
        self.replaces
    }

    pub fn insert(&mut self, ch: char) {
        self.content.push(ch);
    }

    pub fn insert_str(&mut self, text: &str) {
        self.content.push_str(text);
    }

    pub fn newline(&mut self) {
        self.content.push('\n');
    }

    pub fn backspace(&mut self) -> Option<char> {
        self.content.pop()
    }

    pub fn clear(&mut self) {
        self.content.clear();
    }
}

/// Native text selection that ended while the highlight tool was active.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionEnd {
    /// Page whose text layer holds the selection, if any.
    pub page: Option<PageNumber>,
    /// Top-left corner of that page in the same space as `client_rects`.
    pub page_origin: Point,
    pub client_rects: Vec<Rect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChord {
    pub key: char,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

impl KeyChord {
    pub fn ctrl(key: char) -> Self {
        Self {
            key,
            ctrl: true,
            meta: false,
            shift: false,
        }
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    Undo,
    Redo,
}

/// Undo is Ctrl/Cmd+Z; redo is Ctrl/Cmd+Shift+Z or Ctrl/Cmd+Y. Nothing fires while an
/// editable field has focus.
pub fn shortcut_for(chord: KeyChord, focus_in_editable: bool) -> Option<Shortcut> {
    if focus_in_editable || !(chord.ctrl || chord.meta) {
        return None;
    }
    match chord.key.to_ascii_lowercase() {
        'z' if chord.shift => Some(Shortcut::Redo),
        'z' => Some(Shortcut::Undo),
        'y' => Some(Shortcut::Redo),
        _ => None,
    }
}

#[derive(Debug, Clone)]
struct StrokeInProgress {
    page: PageNumber,
    tool: Tool,
    /// Width chosen when the stroke began; the preview style may be wider.
    width: f32,
    style: StrokeStyle,
    points: Vec<Point>,
}

pub struct InputController<M: TextMetrics = ApproximateMetrics> {
    tools: ToolState,
    metrics: M,
    stroke: Option<StrokeInProgress>,
    editor: Option<TextEditor>,
    scale: f32,
}

impl InputController<ApproximateMetrics> {
    pub fn new(tools: ToolState) -> Self {
        Self::with_metrics(tools, ApproximateMetrics)
    }
}

impl<M: TextMetrics> InputController<M> {
    pub fn with_metrics(tools: ToolState, metrics: M) -> Self {
        Self {
            tools,
            metrics,
            stroke: None,
            editor: None,
            scale: 1.0,
        }
    }

    pub fn tools(&self) -> &ToolState {
        &self.tools
    }

    pub fn tools_mut(&mut self) -> &mut ToolState {
        &mut self.tools
    }

    pub fn select_tool(&mut self, tool: Tool) -> Tool {
        let active = self.tools.select(tool);
        debug!(tool = active.label(), "tool selected");
        active
    }

    /// Zoom at which incoming coordinates are expressed.
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn is_stroking(&self) -> bool {
        self.stroke.is_some()
    }

    pub fn editor(&self) -> Option<&TextEditor> {
        self.editor.as_ref()
    }

    pub fn editor_mut(&mut self) -> Option<&mut TextEditor> {
        self.editor.as_mut()
    }

    pub fn pointer_down(
        &mut self,
        session: &mut AnnotationSession,
        target: Option<PointerTarget>,
    ) -> PointerOutcome {
        if self.editor.is_some() {
            // Clicking anywhere else blurs the editor.
            return match self.commit_editor(session) {
                Ok(outcome) => PointerOutcome::EditorClosed(outcome),
                Err(_) => PointerOutcome::Ignored,
            };
        }
        if !self.tools.pointer_routing().accepts_pointer_events {
            return PointerOutcome::Ignored;
        }
        let Some(target) = target.filter(|t| session.contains_page(t.page)) else {
            return PointerOutcome::Ignored;
        };
        match self.tools.active() {
            Tool::Text => self.open_editor(session, target),
            tool @ (Tool::Draw | Tool::Eraser) => {
                if self.stroke.is_some() {
                    self.finish_stroke(session);
                }
                let style = if tool == Tool::Eraser {
                    StrokeStyle::eraser(self.tools.stroke_width)
                } else {
                    StrokeStyle {
                        color: self.tools.color,
                        width: self.tools.stroke_width,
                        alpha: self.tools.alpha,
                        blend_mode: self.tools.blend_mode,
                        erase: false,
                    }
                };
                self.stroke = Some(StrokeInProgress {
                    page: target.page,
                    tool,
                    width: self.tools.stroke_width,
                    style,
                    points: vec![target.point],
                });
                PointerOutcome::StrokeStarted {
                    page: target.page,
                    point: target.point,
                    style,
                }
            }
            Tool::None | Tool::Highlight => PointerOutcome::Ignored,
        }
    }

    /// Extends the stroke. Moving off the stroke's page finalizes it.
    pub fn pointer_move(
        &mut self,
        session: &mut AnnotationSession,
        target: Option<PointerTarget>,
    ) -> PointerOutcome {
        let Some(stroke) = self.stroke.as_mut() else {
            return PointerOutcome::Ignored;
        };
        match target {
            Some(target) if target.page == stroke.page => {
                let from = stroke.points.last().copied().unwrap_or(target.point);
                stroke.points.push(target.point);
                trace!(page = stroke.page, points = stroke.points.len(), "stroke extended");
                PointerOutcome::StrokeExtended {
                    page: stroke.page,
                    from,
                    to: target.point,
                    style: stroke.style,
                }
            }
            _ => self.finish_stroke(session),
        }
    }

    pub fn pointer_up(&mut self, session: &mut AnnotationSession) -> PointerOutcome {
        self.finish_stroke(session)
    }

    pub fn pointer_leave(&mut self, session: &mut AnnotationSession) -> PointerOutcome {
        self.finish_stroke(session)
    }

    /// Emits one highlight covering every selected rectangle.
    pub fn selection_end(
        &mut self,
        session: &mut AnnotationSession,
        selection: SelectionEnd,
    ) -> PointerOutcome {
        if self.tools.active() != Tool::Highlight {
            return PointerOutcome::Ignored;
        }
        let Some(page) = selection.page.filter(|p| session.contains_page(*p)) else {
            return PointerOutcome::Ignored;
        };
        let origin = selection.page_origin;
        let rects: Vec<Rect> = selection
            .client_rects
            .iter()
            .filter(|r| !r.is_empty())
            .map(|r| r.translated(-origin.x, -origin.y))
            .collect();
        if rects.is_empty() {
            return PointerOutcome::Ignored;
        }
        let command = Command::Highlight {
            page,
            color: self.tools.color,
            alpha: self.tools.highlight_alpha(),
            rects,
        };
        self.commit(session, command)
    }

    /// Closes the text editor. Editing an existing text retracts it first; empty
    /// content stores nothing.
    pub fn commit_editor(
        &mut self,
        session: &mut AnnotationSession,
    ) -> Result<EditorOutcome, AnnotationError> {
        let editor = self.editor.take().ok_or(AnnotationError::NoActiveEditor)?;
        self.tools.resume(editor.suspended_tool);
        let page = editor.page;
        if let Some(old) = editor.replaces {
            if session.retract(page, old).is_none() {
                debug!(page, %old, "edited text was already gone");
            }
        }
        let content = editor.content.trim();
        if content.is_empty() {
            return Ok(match editor.replaces {
                Some(old) => EditorOutcome::Deleted { page, old },
                None => EditorOutcome::Discarded { page },
            });
        }
        let command = Command::Text {
            page,
            content: content.to_owned(),
            x: editor.anchor.x,
            y: editor.anchor.y,
            color: editor.color,
            font_size: editor.font.size,
            weight: editor.font.weight,
            style: editor.font.style,
            alpha: editor.alpha,
        };
        debug_assert!(session.contains_page(page), "text editor on page {page} outside document");
        let id = session.push_command(command, self.scale)?;
        Ok(match editor.replaces {
            Some(old) => EditorOutcome::Replaced { page, old, id },
            None => EditorOutcome::Created { page, id },
        })
    }

    /// Closes the editor without storing anything; an edited text stays as it was.
    pub fn cancel_editor(&mut self) -> bool {
        match self.editor.take() {
            Some(editor) => {
                self.tools.resume(editor.suspended_tool);
                true
            }
            None => false,
        }
    }

    /// Runs the history shortcut for `chord`, unless the text editor has focus.
    pub fn handle_shortcut(
        &mut self,
        session: &mut AnnotationSession,
        chord: KeyChord,
    ) -> Option<HistoryOutcome> {
        let shortcut = shortcut_for(chord, self.editor.is_some())?;
        Some(match shortcut {
            Shortcut::Undo => session.undo(),
            Shortcut::Redo => session.redo(),
        })
    }

    /// Topmost text command whose approximate box contains `point`.
    pub fn hit_test_text(
        &self,
        session: &AnnotationSession,
        page: PageNumber,
        point: Point,
    ) -> Option<(CommandId, Command)> {
        session.commands(page).iter().rev().find_map(|annotation| {
            let command = annotation.at_scale(self.scale);
            let Command::Text {
                content, x, y, ..
            } = command.as_ref()
            else {
                return None;
            };
            let font = command.font()?;
            let width = self.metrics.text_width(content, font);
            let bounds = Rect::new(*x, *y, width, font.size);
            bounds
                .contains(point)
                .then(|| (annotation.id, command.into_owned()))
        })
    }

    fn open_editor(&mut self, session: &AnnotationSession, target: PointerTarget) -> PointerOutcome {
        let hit = self.hit_test_text(session, target.page, target.point);
        let suspended_tool = self.tools.suspend();
        let editor = match hit {
            Some((
                id,
                Command::Text {
                    content,
                    x,
                    y,
                    color,
                    font_size,
                    weight,
                    style,
                    alpha,
                    ..
                },
            )) => TextEditor {
                page: target.page,
                anchor: Point::new(x, y),
                content,
                replaces: Some(id),
                color,
                font: FontSpec {
                    size: font_size,
                    weight,
                    style,
                },
                alpha,
                suspended_tool,
            },
            _ => TextEditor {
                page: target.page,
                anchor: target.point,
                content: String::new(),
                replaces: None,
                color: self.tools.color,
                font: self.tools.font(),
                alpha: self.tools.alpha,
                suspended_tool,
            },
        };
        let outcome = PointerOutcome::EditorOpened {
            page: editor.page,
            replaces: editor.replaces,
        };
        debug!(page = editor.page, editing = editor.replaces.is_some(), "text editor opened");
        self.editor = Some(editor);
        outcome
    }

    fn finish_stroke(&mut self, session: &mut AnnotationSession) -> PointerOutcome {
        let Some(stroke) = self.stroke.take() else {
            return PointerOutcome::Ignored;
        };
        if stroke.points.len() < 2 {
            return PointerOutcome::StrokeDiscarded { page: stroke.page };
        }
        let command = match stroke.tool {
            Tool::Eraser => Command::Eraser {
                page: stroke.page,
                stroke_width: stroke.width,
                points: stroke.points,
            },
            _ => Command::Path {
                page: stroke.page,
                color: stroke.style.color,
                stroke_width: stroke.style.width,
                alpha: stroke.style.alpha,
                blend_mode: stroke.style.blend_mode,
                points: stroke.points,
            },
        };
        self.commit(session, command)
    }

    fn commit(&mut self, session: &mut AnnotationSession, command: Command) -> PointerOutcome {
        let page = command.page();
        debug_assert!(session.contains_page(page), "command for page {page} outside document");
        match session.push_command(command, self.scale) {
            Ok(id) => PointerOutcome::Committed { page, id },
            Err(_) => PointerOutcome::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::BlendMode;

    fn controller(tool: Tool) -> InputController {
        let mut controller = InputController::new(ToolState::default());
        controller.select_tool(tool);
        controller
    }

    fn on(page: PageNumber, x: f32, y: f32) -> Option<PointerTarget> {
        Some(PointerTarget::new(page, Point::new(x, y)))
    }

    fn type_text(controller: &mut InputController, text: &str) {
        controller.editor_mut().unwrap().insert_str(text);
    }

    #[test]
    fn draw_gesture_commits_one_path() {
        let mut session = AnnotationSession::new(3);
        let mut controller = controller(Tool::Draw);
        controller.tools_mut().set_color(Color::RED);
        controller.tools_mut().set_stroke_width(2.0);

        assert!(matches!(
            controller.pointer_down(&mut session, on(1, 0.0, 0.0)),
            PointerOutcome::StrokeStarted { page: 1, .. }
        ));
        controller.pointer_move(&mut session, on(1, 10.0, 0.0));
        let extended = controller.pointer_move(&mut session, on(1, 10.0, 10.0));
        assert!(matches!(
            extended,
            PointerOutcome::StrokeExtended { from, to, .. }
                if from == Point::new(10.0, 0.0) && to == Point::new(10.0, 10.0)
        ));
        let outcome = controller.pointer_up(&mut session);
        assert_eq!(outcome.dirty_page(), Some(1));

        let commands = session.commands(1);
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0].command,
            Command::Path {
                page: 1,
                color: Color::RED,
                stroke_width: 2.0,
                alpha: 1.0,
                blend_mode: BlendMode::Normal,
                points: vec![
                    Point::new(0.0, 0.0),
                    Point::new(10.0, 0.0),
                    Point::new(10.0, 10.0)
                ],
            }
        );
        assert_eq!(session.undo_len(), 1);
    }

    #[test]
    fn eraser_stores_nominal_width_and_previews_double() {
        let mut session = AnnotationSession::new(1);
        let mut controller = controller(Tool::Eraser);
        controller.tools_mut().set_stroke_width(4.0);
        let PointerOutcome::StrokeStarted { style, .. } =
            controller.pointer_down(&mut session, on(1, 0.0, 0.0))
        else {
            panic!("stroke should start");
        };
        assert!(style.erase);
        assert_eq!(style.width, 8.0);
        controller.pointer_move(&mut session, on(1, 5.0, 5.0));
        controller.pointer_leave(&mut session);
        assert!(matches!(
            session.commands(1)[0].command,
            Command::Eraser { stroke_width, .. } if stroke_width == 4.0
        ));
    }

    #[test]
    fn width_change_mid_stroke_keeps_starting_width() {
        let mut session = AnnotationSession::new(1);
        let mut controller = controller(Tool::Eraser);
        controller.tools_mut().set_stroke_width(3.0);
        controller.pointer_down(&mut session, on(1, 0.0, 0.0));
        controller.tools_mut().set_stroke_width(9.0);
        controller.pointer_move(&mut session, on(1, 4.0, 4.0));
        controller.pointer_up(&mut session);
        assert!(matches!(
            session.commands(1)[0].command,
            Command::Eraser { stroke_width, .. } if stroke_width == 3.0
        ));

        controller.select_tool(Tool::Draw);
        controller.tools_mut().set_stroke_width(2.0);
        controller.pointer_down(&mut session, on(1, 0.0, 0.0));
        controller.tools_mut().set_stroke_width(6.0);
        controller.pointer_move(&mut session, on(1, 4.0, 4.0));
        controller.pointer_up(&mut session);
        assert!(matches!(
            session.commands(1)[1].command,
            Command::Path { stroke_width, .. } if stroke_width == 2.0
        ));
    }

    #[test]
    fn leaving_the_page_finalizes_the_stroke() {
        let mut session = AnnotationSession::new(2);
        let mut controller = controller(Tool::Draw);
        controller.pointer_down(&mut session, on(1, 0.0, 0.0));
        controller.pointer_move(&mut session, on(1, 3.0, 3.0));
        let outcome = controller.pointer_move(&mut session, on(2, 3.0, 3.0));
        assert!(matches!(outcome, PointerOutcome::Committed { page: 1, .. }));
        assert!(!controller.is_stroking());
        assert!(session.commands(2).is_empty());
    }

    #[test]
    fn single_point_stroke_is_discarded() {
        let mut session = AnnotationSession::new(1);
        let mut controller = controller(Tool::Draw);
        controller.pointer_down(&mut session, on(1, 0.0, 0.0));
        assert_eq!(
            controller.pointer_up(&mut session),
            PointerOutcome::StrokeDiscarded { page: 1 }
        );
        assert!(session.annotations().is_empty());
    }

    #[test]
    fn clicks_outside_pages_are_ignored() {
        let mut session = AnnotationSession::new(2);
        let mut controller = controller(Tool::Draw);
        assert_eq!(controller.pointer_down(&mut session, None), PointerOutcome::Ignored);
        assert_eq!(
            controller.pointer_down(&mut session, on(7, 1.0, 1.0)),
            PointerOutcome::Ignored
        );
        assert!(!controller.is_stroking());
    }

    #[test]
    fn no_tool_and_highlight_ignore_pointer() {
        let mut session = AnnotationSession::new(1);
        let mut controller = controller(Tool::None);
        assert_eq!(
            controller.pointer_down(&mut session, on(1, 1.0, 1.0)),
            PointerOutcome::Ignored
        );
        controller.select_tool(Tool::Highlight);
        assert_eq!(
            controller.pointer_down(&mut session, on(1, 1.0, 1.0)),
            PointerOutcome::Ignored
        );
    }

    #[test]
    fn text_create_then_clear_removes_it() {
        let mut session = AnnotationSession::new(2);
        let mut controller = controller(Tool::Text);

        let opened = controller.pointer_down(&mut session, on(1, 40.0, 50.0));
        assert_eq!(opened, PointerOutcome::EditorOpened { page: 1, replaces: None });
        assert_eq!(controller.tools().active(), Tool::None);
        type_text(&mut controller, "note");
        let outcome = controller.commit_editor(&mut session).unwrap();
        assert!(matches!(outcome, EditorOutcome::Created { page: 1, .. }));
        assert_eq!(controller.tools().active(), Tool::Text);

        let stored = &session.commands(1)[0].command;
        assert!(matches!(
            stored,
            Command::Text { content, x, y, .. }
                if content == "note" && *x == 40.0 && *y == 50.0
        ));

        let reopened = controller.pointer_down(&mut session, on(1, 45.0, 55.0));
        assert!(matches!(
            reopened,
            PointerOutcome::EditorOpened { replaces: Some(_), .. }
        ));
        assert_eq!(controller.editor().unwrap().content(), "note");
        controller.editor_mut().unwrap().clear();
        let outcome = controller.commit_editor(&mut session).unwrap();
        assert!(matches!(outcome, EditorOutcome::Deleted { page: 1, .. }));
        assert!(session.commands(1).is_empty());
        assert!(!session.can_undo());
        assert!(!session.can_redo());
    }

    #[test]
    fn editing_text_keeps_its_style_and_position() {
        let mut session = AnnotationSession::new(1);
        let mut controller = controller(Tool::Text);
        controller.tools_mut().toggle_bold();
        controller.tools_mut().set_color(Color::BLUE);
        controller.pointer_down(&mut session, on(1, 10.0, 10.0));
        type_text(&mut controller, "draft");
        controller.commit_editor(&mut session).unwrap();

        controller.tools_mut().set_color(Color::GREEN);
        controller.pointer_down(&mut session, on(1, 12.0, 12.0));
        let editor = controller.editor_mut().unwrap();
        assert_eq!(editor.color, Color::BLUE);
        assert_eq!(editor.font.weight, FontWeight::Bold);
        editor.clear();
        editor.insert_str("  final  ");
        let outcome = controller.commit_editor(&mut session).unwrap();
        assert!(matches!(outcome, EditorOutcome::Replaced { .. }));

        let commands = session.commands(1);
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            &commands[0].command,
            Command::Text { content, color, x, .. }
                if content == "final" && *color == Color::BLUE && *x == 10.0
        ));
        assert_eq!(session.undo_len(), 1);
    }

    #[test]
    fn topmost_text_wins_hit_test() {
        let mut session = AnnotationSession::new(1);
        let controller = controller(Tool::Text);
        for word in ["below", "above"] {
            let text = Command::Text {
                page: 1,
                content: word.to_owned(),
                x: 0.0,
                y: 0.0,
                color: Color::SLATE,
                font_size: 14.0,
                weight: FontWeight::Normal,
                style: crate::command::FontStyle::Normal,
                alpha: 1.0,
            };
            session.push_command(text, 1.0).unwrap();
        }
        let (_, hit) = controller
            .hit_test_text(&session, 1, Point::new(2.0, 2.0))
            .unwrap();
        assert!(matches!(hit, Command::Text { content, .. } if content == "above"));
        assert!(controller
            .hit_test_text(&session, 1, Point::new(2.0, 20.0))
            .is_none());
    }

    #[test]
    fn hit_test_follows_zoom() {
        let mut session = AnnotationSession::new(1);
        let mut controller = controller(Tool::Text);
        controller.pointer_down(&mut session, on(1, 10.0, 10.0));
        type_text(&mut controller, "zoomed");
        controller.commit_editor(&mut session).unwrap();

        controller.set_scale(2.0);
        assert!(controller
            .hit_test_text(&session, 1, Point::new(12.0, 12.0))
            .is_none());
        assert!(controller
            .hit_test_text(&session, 1, Point::new(24.0, 24.0))
            .is_some());
    }

    #[test]
    fn clicking_elsewhere_commits_the_editor() {
        let mut session = AnnotationSession::new(1);
        let mut controller = controller(Tool::Text);
        controller.pointer_down(&mut session, on(1, 5.0, 5.0));
        type_text(&mut controller, "blur");
        let outcome = controller.pointer_down(&mut session, on(1, 300.0, 300.0));
        assert!(matches!(
            outcome,
            PointerOutcome::EditorClosed(EditorOutcome::Created { .. })
        ));
        assert_eq!(session.commands(1).len(), 1);
    }

    #[test]
    fn commit_without_editor_is_an_error() {
        let mut session = AnnotationSession::new(1);
        let mut controller = controller(Tool::Text);
        assert!(matches!(
            controller.commit_editor(&mut session),
            Err(AnnotationError::NoActiveEditor)
        ));
    }

    #[test]
    fn selection_becomes_one_page_local_highlight() {
        let mut session = AnnotationSession::new(3);
        let mut controller = controller(Tool::Highlight);
        let selection = SelectionEnd {
            page: Some(2),
            page_origin: Point::new(100.0, 1000.0),
            client_rects: vec![
                Rect::new(110.0, 1020.0, 50.0, 12.0),
                Rect::new(110.0, 1034.0, 0.0, 12.0),
                Rect::new(110.0, 1034.0, 30.0, 12.0),
            ],
        };
        let outcome = controller.selection_end(&mut session, selection);
        assert!(matches!(outcome, PointerOutcome::Committed { page: 2, .. }));
        assert_eq!(
            session.commands(2)[0].command,
            Command::Highlight {
                page: 2,
                color: Color::RED,
                alpha: 0.4,
                rects: vec![
                    Rect::new(10.0, 20.0, 50.0, 12.0),
                    Rect::new(10.0, 34.0, 30.0, 12.0)
                ],
            }
        );
    }

    #[test]
    fn selection_outside_pages_is_ignored() {
        let mut session = AnnotationSession::new(1);
        let mut controller = controller(Tool::Highlight);
        let selection = SelectionEnd {
            page: None,
            page_origin: Point::new(0.0, 0.0),
            client_rects: vec![Rect::new(0.0, 0.0, 5.0, 5.0)],
        };
        assert_eq!(
            controller.selection_end(&mut session, selection),
            PointerOutcome::Ignored
        );
        assert!(session.annotations().is_empty());
    }

    #[test]
    fn shortcuts_map_and_are_suppressed_in_editable_fields() {
        assert_eq!(shortcut_for(KeyChord::ctrl('z'), false), Some(Shortcut::Undo));
        assert_eq!(
            shortcut_for(KeyChord::ctrl('Z').with_shift(), false),
            Some(Shortcut::Redo)
        );
        assert_eq!(shortcut_for(KeyChord::ctrl('y'), false), Some(Shortcut::Redo));
        let cmd_z = KeyChord {
            key: 'z',
            ctrl: false,
            meta: true,
            shift: false,
        };
        assert_eq!(shortcut_for(cmd_z, false), Some(Shortcut::Undo));
        assert_eq!(shortcut_for(KeyChord::ctrl('z'), true), None);
        let plain_z = KeyChord {
            key: 'z',
            ctrl: false,
            meta: false,
            shift: false,
        };
        assert_eq!(shortcut_for(plain_z, false), None);
    }

    #[test]
    fn editor_focus_blocks_undo() {
        let mut session = AnnotationSession::new(1);
        let mut controller = controller(Tool::Draw);
        controller.pointer_down(&mut session, on(1, 0.0, 0.0));
        controller.pointer_move(&mut session, on(1, 1.0, 1.0));
        controller.pointer_up(&mut session);

        controller.select_tool(Tool::Text);
        controller.pointer_down(&mut session, on(1, 50.0, 50.0));
        assert_eq!(controller.handle_shortcut(&mut session, KeyChord::ctrl('z')), None);
        assert!(controller.cancel_editor());
        assert!(matches!(
            controller.handle_shortcut(&mut session, KeyChord::ctrl('z')),
            Some(HistoryOutcome::Undone { .. })
        ));
    }
}
