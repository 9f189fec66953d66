use crate::canvas::Region;

// ============================================================================
// TOOL MODES
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    /// Viewing only; pointer events are ignored.
    #[default]
    None,
    Brush,
    Text,
    Crop,
    /// Drag pans the display.
    View,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::None => "None",
            Tool::Brush => "Brush",
            Tool::Text => "Text",
            Tool::Crop => "Crop",
            Tool::View => "View",
        }
    }

    /// Parse a tool name as used by scripts and settings.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Some(Tool::None),
            "brush" | "b" => Some(Tool::Brush),
            "text" | "t" => Some(Tool::Text),
            "crop" | "c" => Some(Tool::Crop),
            "view" | "pan" | "v" => Some(Tool::View),
            _ => None,
        }
    }
}

// ============================================================================
// GESTURES
// ============================================================================

/// One pointer sample, in both coordinate spaces. `buffer` is already mapped
/// and clamped into the surface; `display` is raw and only used for panning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerSample {
    pub buffer: (f32, f32),
    pub display: (f32, f32),
}

/// In-progress pointer gesture of the active tool.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Stroking { last: (f32, f32) },
    CropDrag { start: (f32, f32), current: (f32, f32) },
    Panning { last: (f32, f32) },
}

/// What the session must do in response to a pointer event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ToolAction {
    Nothing,
    /// Snapshot the pre-stroke surface, then stamp a dot at the point.
    BeginStroke { at: (f32, f32) },
    StrokeSegment { from: (f32, f32), to: (f32, f32) },
    EndStroke,
    /// Ask the host for text to place with its baseline at the point.
    PromptText { at: (f32, f32) },
    /// Rubber band changed; the surface is untouched.
    CropPreview(Region),
    CommitCrop(Region),
    Pan { dx: f32, dy: f32 },
}

/// Tool-mode state machine: the active tool and its gesture.
#[derive(Clone, Debug, Default)]
pub struct ToolState {
    active: Tool,
    gesture: Gesture,
}

impl ToolState {
    pub fn active(&self) -> Tool {
        self.active
    }

    pub fn gesture(&self) -> Gesture {
        self.gesture
    }

    /// Switch tools. Any in-progress gesture is abandoned; returns `true` when
    /// one was (an open brush stroke then needs closing by the caller).
    pub fn select(&mut self, tool: Tool) -> bool {
        let abandoned = self.gesture != Gesture::Idle;
        self.active = tool;
        self.gesture = Gesture::Idle;
        abandoned
    }

    pub fn is_stroking(&self) -> bool {
        matches!(self.gesture, Gesture::Stroking { .. })
    }

    /// The normalized rubber-band rectangle while a crop drag is live.
    pub fn crop_overlay(&self) -> Option<Region> {
        match self.gesture {
            Gesture::CropDrag { start, current } => Some(Region::from_corners(start, current)),
            _ => None,
        }
    }

    pub fn pointer_down(&mut self, p: PointerSample) -> ToolAction {
        match self.active {
            Tool::None => ToolAction::Nothing,
            Tool::Brush => {
                self.gesture = Gesture::Stroking { last: p.buffer };
                ToolAction::BeginStroke { at: p.buffer }
            }
            Tool::Text => ToolAction::PromptText { at: p.buffer },
            Tool::Crop => {
                self.gesture = Gesture::CropDrag {
                    start: p.buffer,
                    current: p.buffer,
                };
                ToolAction::CropPreview(Region::from_corners(p.buffer, p.buffer))
            }
            Tool::View => {
                self.gesture = Gesture::Panning { last: p.display };
                ToolAction::Nothing
            }
        }
    }

    pub fn pointer_move(&mut self, p: PointerSample) -> ToolAction {
        match self.gesture {
            Gesture::Idle => ToolAction::Nothing,
            Gesture::Stroking { last } => {
                self.gesture = Gesture::Stroking { last: p.buffer };
                ToolAction::StrokeSegment { from: last, to: p.buffer }
            }
            Gesture::CropDrag { start, .. } => {
                self.gesture = Gesture::CropDrag {
                    start,
                    current: p.buffer,
                };
                ToolAction::CropPreview(Region::from_corners(start, p.buffer))
            }
            Gesture::Panning { last } => {
                self.gesture = Gesture::Panning { last: p.display };
                ToolAction::Pan {
                    dx: p.display.0 - last.0,
                    dy: p.display.1 - last.1,
                }
            }
        }
    }

    pub fn pointer_up(&mut self, p: PointerSample) -> ToolAction {
        let gesture = std::mem::take(&mut self.gesture);
        match gesture {
            Gesture::Idle => ToolAction::Nothing,
            Gesture::Stroking { .. } => ToolAction::EndStroke,
            Gesture::CropDrag { start, .. } => ToolAction::CommitCrop(Region::from_corners(start, p.buffer)),
            Gesture::Panning { last } => ToolAction::Pan {
                dx: p.display.0 - last.0,
                dy: p.display.1 - last.1,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f32, y: f32) -> PointerSample {
        PointerSample {
            buffer: (x, y),
            display: (x * 2.0, y * 2.0),
        }
    }

    #[test]
    fn brush_gesture_sequence() {
        let mut t = ToolState::default();
        t.select(Tool::Brush);
        assert_eq!(t.pointer_down(at(1.0, 1.0)), ToolAction::BeginStroke { at: (1.0, 1.0) });
        assert_eq!(
            t.pointer_move(at(5.0, 1.0)),
            ToolAction::StrokeSegment { from: (1.0, 1.0), to: (5.0, 1.0) }
        );
        assert_eq!(t.pointer_up(at(5.0, 1.0)), ToolAction::EndStroke);
        assert_eq!(t.gesture(), Gesture::Idle);
    }

    #[test]
    fn moves_without_down_are_ignored() {
        let mut t = ToolState::default();
        t.select(Tool::Brush);
        assert_eq!(t.pointer_move(at(3.0, 3.0)), ToolAction::Nothing);
        assert_eq!(t.pointer_up(at(3.0, 3.0)), ToolAction::Nothing);
    }

    #[test]
    fn crop_drag_normalizes_direction() {
        let mut t = ToolState::default();
        t.select(Tool::Crop);
        t.pointer_down(at(60.0, 60.0));
        t.pointer_move(at(20.0, 30.0));
        assert_eq!(t.crop_overlay(), Some(Region::new(20, 30, 40, 30)));
        assert_eq!(
            t.pointer_up(at(10.0, 10.0)),
            ToolAction::CommitCrop(Region::new(10, 10, 50, 50))
        );
        assert_eq!(t.crop_overlay(), None);
    }

    #[test]
    fn switching_tools_abandons_the_gesture() {
        let mut t = ToolState::default();
        t.select(Tool::Crop);
        t.pointer_down(at(1.0, 1.0));
        assert!(t.select(Tool::Text));
        assert_eq!(t.pointer_up(at(9.0, 9.0)), ToolAction::Nothing);
        assert!(!t.select(Tool::Brush));
    }

    #[test]
    fn view_pans_in_display_space() {
        let mut t = ToolState::default();
        t.select(Tool::View);
        assert_eq!(t.pointer_down(at(1.0, 1.0)), ToolAction::Nothing);
        assert_eq!(t.pointer_move(at(3.0, 2.0)), ToolAction::Pan { dx: 4.0, dy: 2.0 });
    }

    #[test]
    fn tool_names_parse() {
        assert_eq!(Tool::from_name("Brush"), Some(Tool::Brush));
        assert_eq!(Tool::from_name("pan"), Some(Tool::View));
        assert_eq!(Tool::from_name("lasso"), None);
    }
}
