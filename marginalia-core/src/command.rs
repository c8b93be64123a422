//! Annotation commands.
//!
//! A command is a self-describing drawing instruction for one page. Commands are
//! immutable once stored; editing a text annotation retracts the old command and
//! stores a new one.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Color, Point, Rect};
use crate::PageNumber;

/// Identity of a stored command. Two commands with identical content still have
/// distinct ids, and every removal goes through the id.
pub type CommandId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

impl FontWeight {
    pub fn toggled(self) -> Self {
        match self {
            FontWeight::Normal => FontWeight::Bold,
            FontWeight::Bold => FontWeight::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

impl FontStyle {
    pub fn toggled(self) -> Self {
        match self {
            FontStyle::Normal => FontStyle::Italic,
            FontStyle::Italic => FontStyle::Normal,
        }
    }
}

/// Font parameters shared by text commands and text measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontSpec {
    pub size: f32,
    pub weight: FontWeight,
    pub style: FontStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Command {
    Path {
        page: PageNumber,
        color: Color,
        stroke_width: f32,
        alpha: f32,
        blend_mode: BlendMode,
        points: Vec<Point>,
    },
    /// Erases annotation pixels along the polyline. Renders at twice `stroke_width`.
    Eraser {
        page: PageNumber,
        stroke_width: f32,
        points: Vec<Point>,
    },
    Text {
        page: PageNumber,
        content: String,
        x: f32,
        y: f32,
        color: Color,
        font_size: f32,
        weight: FontWeight,
        style: FontStyle,
        alpha: f32,
    },
    Highlight {
        page: PageNumber,
        color: Color,
        alpha: f32,
        rects: Vec<Rect>,
    },
}

impl Command {
    pub fn page(&self) -> PageNumber {
        match self {
            Command::Path { page, .. }
            | Command::Eraser { page, .. }
            | Command::Text { page, .. }
            | Command::Highlight { page, .. } => *page,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::Path { .. } => "path",
            Command::Eraser { .. } => "eraser",
            Command::Text { .. } => "text",
            Command::Highlight { .. } => "highlight",
        }
    }

    pub fn font(&self) -> Option<FontSpec> {
        match self {
            Command::Text {
                font_size,
                weight,
                style,
                ..
            } => Some(FontSpec {
                size: *font_size,
                weight: *weight,
                style: *style,
            }),
            _ => None,
        }
    }

    /// Polyline and paint style for `Path` and `Eraser`; `None` for the other kinds.
    pub fn stroke(&self) -> Option<(StrokeStyle, &[Point])> {
        match self {
            Command::Path {
                color,
                stroke_width,
                alpha,
                blend_mode,
                points,
                ..
            } => Some((
                StrokeStyle {
                    color: *color,
                    width: *stroke_width,
                    alpha: *alpha,
                    blend_mode: *blend_mode,
                    erase: false,
                },
                points,
            )),
            Command::Eraser {
                stroke_width,
                points,
                ..
            } => Some((StrokeStyle::eraser(*stroke_width), points)),
            Command::Text { .. } | Command::Highlight { .. } => None,
        }
    }

    /// Copy with every coordinate and length multiplied by `factor`.
    pub fn scaled(&self, factor: f32) -> Command {
        let scale_points = |points: &[Point]| points.iter().map(|p| p.scaled(factor)).collect();
        match self {
            Command::Path {
                page,
                color,
                stroke_width,
                alpha,
                blend_mode,
                points,
            } => Command::Path {
                page: *page,
                color: *color,
                stroke_width: stroke_width * factor,
                alpha: *alpha,
                blend_mode: *blend_mode,
                points: scale_points(points),
            },
            Command::Eraser {
                page,
                stroke_width,
                points,
            } => Command::Eraser {
                page: *page,
                stroke_width: stroke_width * factor,
                points: scale_points(points),
            },
            Command::Text {
                page,
                content,
                x,
                y,
                color,
                font_size,
                weight,
                style,
                alpha,
            } => Command::Text {
                page: *page,
                content: content.clone(),
                x: x * factor,
                y: y * factor,
                color: *color,
                font_size: font_size * factor,
                weight: *weight,
                style: *style,
                alpha: *alpha,
            },
            Command::Highlight {
                page,
                color,
                alpha,
                rects,
            } => Command::Highlight {
                page: *page,
                color: *color,
                alpha: *alpha,
                rects: rects.iter().map(|r| r.scaled(factor)).collect(),
            },
        }
    }
}

/// How a stroke command paints its polyline. Live previews and replay share it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub color: Color,
    pub width: f32,
    pub alpha: f32,
    pub blend_mode: BlendMode,
    /// Removes annotation pixels instead of painting.
    pub erase: bool,
}

impl StrokeStyle {
    pub fn eraser(nominal_width: f32) -> Self {
        Self {
            color: Color::BLACK,
            width: nominal_width * 2.0,
            alpha: 1.0,
            blend_mode: BlendMode::Normal,
            erase: true,
        }
    }
}

/// A command as held by the page annotation set.
///
/// `scale` is the zoom that was active when the command was captured; its coordinates
/// are canvas pixels at that zoom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: CommandId,
    pub scale: f32,
    pub command: Command,
}

impl Annotation {
    pub fn new(command: Command, scale: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            scale,
            command,
        }
    }

    pub fn page(&self) -> PageNumber {
        self.command.page()
    }

    /// The command expressed in canvas pixels at `target_scale`.
    pub fn at_scale(&self, target_scale: f32) -> std::borrow::Cow<'_, Command> {
        if self.scale <= 0.0 || (self.scale - target_scale).abs() < f32::EPSILON {
            std::borrow::Cow::Borrowed(&self.command)
        } else {
            std::borrow::Cow::Owned(self.command.scaled(target_scale / self.scale))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_serializes_with_kind_tag() {
        let cmd = Command::Eraser {
            page: 3,
            stroke_width: 4.0,
            points: vec![Point::new(1.0, 2.0)],
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["kind"], "eraser");
        assert_eq!(value["page"], 3);
    }

    #[test]
    fn annotation_at_same_scale_borrows() {
        let annotation = Annotation::new(
            Command::Highlight {
                page: 1,
                color: Color::YELLOW,
                alpha: 0.4,
                rects: vec![Rect::new(0.0, 0.0, 10.0, 10.0)],
            },
            1.5,
        );
        assert!(matches!(
            annotation.at_scale(1.5),
            std::borrow::Cow::Borrowed(_)
        ));
        match annotation.at_scale(3.0).into_owned() {
            Command::Highlight { rects, .. } => {
                assert_eq!(rects[0], Rect::new(0.0, 0.0, 20.0, 20.0));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn eraser_strokes_at_twice_nominal_width() {
        let cmd = Command::Eraser {
            page: 1,
            stroke_width: 3.0,
            points: vec![Point::new(0.0, 0.0), Point::new(4.0, 0.0)],
        };
        let (style, points) = cmd.stroke().unwrap();
        assert!(style.erase);
        assert_eq!(style.width, 6.0);
        assert_eq!(style.alpha, 1.0);
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn identical_commands_get_distinct_ids() {
        let cmd = Command::Eraser {
            page: 1,
            stroke_width: 2.0,
            points: vec![],
        };
        let a = Annotation::new(cmd.clone(), 1.0);
        let b = Annotation::new(cmd, 1.0);
        assert_ne!(a.id, b.id);
        assert_eq!(a.command, b.command);
    }
}
