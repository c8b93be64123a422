//! Active tool and drawing style, the state the input controller consults when it
//! turns pointer events into commands.

use crate::command::{BlendMode, FontSpec, FontStyle, FontWeight};
use crate::config::AnnotationDefaults;
use crate::geometry::Color;

pub const MIN_STROKE_WIDTH: f32 = 1.0;
pub const MAX_STROKE_WIDTH: f32 = 50.0;
pub const MIN_TEXT_SIZE: f32 = 8.0;
pub const MAX_TEXT_SIZE: f32 = 72.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    None,
    Draw,
    Eraser,
    Text,
    Highlight,
}

impl Tool {
    /// Highlight works through native text selection, so the annotation surface lets
    /// pointer events through to the text layer for it.
    pub fn captures_pointer(self) -> bool {
        matches!(self, Tool::Draw | Tool::Eraser | Tool::Text)
    }

    pub fn label(self) -> &'static str {
        match self {
            Tool::None => "none",
            Tool::Draw => "draw",
            Tool::Eraser => "eraser",
            Tool::Text => "text",
            Tool::Highlight => "highlight",
        }
    }
}

/// How the host should stack and route the annotation surface for the active tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerRouting {
    pub accepts_pointer_events: bool,
    /// The annotation surface sits above the text layer while drawing tools are active.
    pub above_text_layer: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolState {
    active: Tool,
    pub color: Color,
    pub stroke_width: f32,
    pub alpha: f32,
    pub blend_mode: BlendMode,
    pub text_size: f32,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    highlight_alpha: f32,
    default_alpha: f32,
}

impl Default for ToolState {
    fn default() -> Self {
        Self::new(&AnnotationDefaults::default())
    }
}

impl ToolState {
    pub fn new(defaults: &AnnotationDefaults) -> Self {
        Self {
            active: Tool::None,
            color: defaults.color,
            stroke_width: defaults.stroke_width,
            alpha: defaults.alpha,
            blend_mode: BlendMode::Normal,
            text_size: defaults.text_size,
            font_weight: FontWeight::Normal,
            font_style: FontStyle::Normal,
            highlight_alpha: defaults.highlight_alpha,
            default_alpha: defaults.alpha,
        }
    }

    pub fn active(&self) -> Tool {
        self.active
    }

    /// Opacity given to highlight commands regardless of the current alpha.
    pub fn highlight_alpha(&self) -> f32 {
        self.highlight_alpha
    }

    /// Activates `tool`, or deactivates it when it is already the active tool.
    /// Returns the tool that is active afterwards.
    pub fn select(&mut self, tool: Tool) -> Tool {
        if tool == self.active {
            self.active = Tool::None;
            return self.active;
        }
        self.active = tool;
        match tool {
            Tool::Highlight => {
                self.blend_mode = BlendMode::Multiply;
                self.alpha = self.highlight_alpha;
            }
            Tool::Draw => {
                self.blend_mode = BlendMode::Normal;
                self.alpha = self.default_alpha;
            }
            Tool::None | Tool::Eraser | Tool::Text => {}
        }
        self.active
    }

    pub fn clear(&mut self) {
        self.active = Tool::None;
    }

    /// Parks the active tool while a text editor has focus.
    pub fn suspend(&mut self) -> Tool {
        std::mem::replace(&mut self.active, Tool::None)
    }

    pub fn resume(&mut self, tool: Tool) {
        self.active = tool;
    }

    pub fn pointer_routing(&self) -> PointerRouting {
        let captures = self.active.captures_pointer();
        PointerRouting {
            accepts_pointer_events: captures,
            above_text_layer: captures,
        }
    }

    pub fn font(&self) -> FontSpec {
        FontSpec {
            size: self.text_size,
            weight: self.font_weight,
            style: self.font_style,
        }
    }

    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    /// Steps to the next palette swatch; custom colors restart at the first swatch.
    pub fn cycle_color(&mut self) -> Color {
        let next = Color::PALETTE
            .iter()
            .position(|c| *c == self.color)
            .map(|idx| (idx + 1) % Color::PALETTE.len())
            .unwrap_or(0);
        self.color = Color::PALETTE[next];
        self.color
    }

    pub fn set_stroke_width(&mut self, width: f32) {
        self.stroke_width = width.clamp(MIN_STROKE_WIDTH, MAX_STROKE_WIDTH);
    }

    pub fn set_text_size(&mut self, size: f32) {
        self.text_size = size.clamp(MIN_TEXT_SIZE, MAX_TEXT_SIZE);
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn toggle_bold(&mut self) -> FontWeight {
        self.font_weight = self.font_weight.toggled();
        self.font_weight
    }

    pub fn toggle_italic(&mut self) -> FontStyle {
        self.font_style = self.font_style.toggled();
        self.font_style
    }
}
