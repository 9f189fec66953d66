// ============================================================================
// EDIT SESSION — one opened image with its history, view and tool state
// ============================================================================

use ab_glyph::FontArc;
use uuid::Uuid;

use crate::canvas::{RasterSurface, Region, RegionError};
use crate::components::colors::Color;
use crate::components::history::HistoryManager;
use crate::components::tools::{PointerSample, Tool, ToolState};
use crate::io::{DecodeError, SaveFormat};
use crate::view::{Pointer, Rotation, ViewTransform};

/// Summary of the current image for the info panel.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Size of the source file as last read.
    pub byte_size: usize,
    pub mime: String,
    pub zoom: f32,
    pub rotation: u32,
    pub can_overwrite: bool,
    pub dirty: bool,
    pub tool: &'static str,
    pub undo_steps: usize,
    pub redo_steps: usize,
    /// Description of the edit an undo/redo would step over.
    pub next_undo: Option<String>,
    pub next_redo: Option<String>,
    /// Index into the open sources and their count
    pub position: (usize, usize),
}

impl std::fmt::Display for ImageInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "File: {}", self.name)?;
        writeln!(f, "Size: {} x {}", self.width, self.height)?;
        writeln!(f, "Bytes: {}", self.byte_size)?;
        writeln!(f, "Type: {}", self.mime)?;
        writeln!(f, "Zoom: {:.0}%  Rotation: {}°", self.zoom * 100.0, self.rotation)?;
        writeln!(f, "Overwrite: {}", if self.can_overwrite { "yes" } else { "no" })?;
        writeln!(f, "Modified: {}", if self.dirty { "yes" } else { "no" })?;
        writeln!(f, "Tool: {}", self.tool)?;
        writeln!(f, "History: {} undo / {} redo", self.undo_steps, self.redo_steps)?;
        if let Some(d) = &self.next_undo {
            writeln!(f, "Undo: {}", d)?;
        }
        if let Some(d) = &self.next_redo {
            writeln!(f, "Redo: {}", d)?;
        }
        write!(f, "Image {} of {}", self.position.0 + 1, self.position.1)
    }
}

/// An image being viewed/edited. Owns its surface exclusively.
pub struct EditSession {
    pub id: Uuid,
    name: String,
    mime: String,
    byte_size: usize,
    can_overwrite: bool,
    source_index: usize,
    surface: RasterSurface,
    history: HistoryManager,
    pub view: ViewTransform,
    tools: ToolState,
    dirty: bool,
}

impl EditSession {
    /// Decode `bytes` and record the loaded image as the history floor.
    pub fn open(
        source_index: usize,
        name: impl Into<String>,
        declared_mime: Option<&str>,
        bytes: &[u8],
        can_overwrite: bool,
        max_undo_steps: usize,
    ) -> Result<Self, DecodeError> {
        let surface = RasterSurface::load(bytes, declared_mime)?;
        // What the bytes really are wins over what the name claims
        let mime = crate::io::sniff_mime(bytes)
            .or(declared_mime)
            .unwrap_or("image/*")
            .to_string();

        let mut history = HistoryManager::new(max_undo_steps);
        history.push_snapshot(&surface, "Open");

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            mime,
            byte_size: bytes.len(),
            can_overwrite,
            source_index,
            surface,
            history,
            view: ViewTransform::default(),
            tools: ToolState::default(),
            dirty: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn source_index(&self) -> usize {
        self.source_index
    }

    pub fn surface(&self) -> &RasterSurface {
        &self.surface
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn tools(&self) -> &ToolState {
        &self.tools
    }

    pub fn tools_mut(&mut self) -> &mut ToolState {
        &mut self.tools
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn can_overwrite(&self) -> bool {
        self.can_overwrite
    }

    /// Format an overwrite must keep, if the source's format can be re-encoded.
    pub fn source_format(&self) -> Option<SaveFormat> {
        SaveFormat::from_mime(&self.mime)
    }

    /// Change the display name. Blank names are refused.
    pub fn rename(&mut self, new_name: &str) -> bool {
        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.name = trimmed.to_string();
        true
    }

    /// `photo.jpg` → `photo-edited.png`; a nameless image becomes `edited.png`.
    pub fn suggested_save_name(&self, suffix: &str, format: SaveFormat) -> String {
        let stem = match self.name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => self.name.as_str(),
        };
        if stem.trim().is_empty() {
            format!("edited.{}", format.extension())
        } else {
            format!("{stem}{suffix}.{}", format.extension())
        }
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    pub fn info(&self, source_count: usize) -> ImageInfo {
        ImageInfo {
            name: self.name.clone(),
            width: self.surface.width(),
            height: self.surface.height(),
            byte_size: self.byte_size,
            mime: self.mime.clone(),
            zoom: self.view.zoom,
            rotation: self.view.rotation.degrees(),
            can_overwrite: self.can_overwrite,
            dirty: self.dirty,
            tool: self.tools.active().label(),
            undo_steps: self.history.undo_count().saturating_sub(1),
            redo_steps: self.history.redo_count(),
            next_undo: self.history.undo_description().map(str::to_string),
            next_redo: self.history.redo_description().map(str::to_string),
            position: (self.source_index, source_count),
        }
    }

    /// Map a display-space pointer to buffer space for the current view.
    pub fn sample(&self, pointer: &Pointer) -> PointerSample {
        let (w, h) = self.surface.dimensions();
        PointerSample {
            buffer: pointer.to_buffer(w, h, self.view.rotation),
            display: (pointer.x, pointer.y),
        }
    }

    /// Switch tools, closing a stroke that was still open.
    pub fn select_tool(&mut self, tool: Tool) {
        let was_stroking = self.tools.is_stroking();
        self.tools.select(tool);
        if was_stroking {
            self.end_stroke();
        }
    }

    // ------------------------------------------------------------------
    //  Edits
    // ------------------------------------------------------------------

    /// Record the pre-stroke state, then stamp the first dab.
    pub fn begin_stroke(&mut self, at: (f32, f32), color: Color, width: f32) {
        self.history.push_snapshot(&self.surface, "Brush");
        self.surface.draw_stroke(&[at], color, width);
        self.dirty = true;
    }

    pub fn extend_stroke(&mut self, from: (f32, f32), to: (f32, f32), color: Color, width: f32) {
        self.surface.draw_segment(from, to, color, width);
    }

    /// The finished stroke becomes the current history state.
    pub fn end_stroke(&mut self) {
        self.history.amend_top(&self.surface);
    }

    pub fn insert_text(&mut self, font: &FontArc, at: (f32, f32), text: &str, color: Color, size_px: f32) {
        self.surface.draw_text(font, at.0, at.1, text, color, size_px);
        self.history.push_snapshot(&self.surface, "Text");
        self.dirty = true;
    }

    /// Replace the surface with `region`. Sides at or below `min_size` are
    /// rejected; on any error the surface and history are untouched.
    pub fn crop(&mut self, region: Region, min_size: u32) -> Result<(), RegionError> {
        if region.width > 0
            && region.height > 0
            && (region.width <= min_size as i64 || region.height <= min_size as i64)
        {
            return Err(RegionError::TooSmall {
                width: region.width,
                height: region.height,
                min: min_size,
            });
        }
        let cropped = self.surface.crop(region)?;
        self.surface = cropped;
        self.history.push_snapshot(&self.surface, "Crop");
        self.dirty = true;
        Ok(())
    }

    pub fn undo(&mut self) -> bool {
        let Some(snap) = self.history.undo() else {
            return false;
        };
        snap.restore_into(&mut self.surface);
        self.dirty = true;
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(snap) = self.history.redo() else {
            return false;
        };
        snap.restore_into(&mut self.surface);
        self.dirty = true;
        true
    }

    /// The surface with the display rotation rendered into its pixels.
    pub fn baked_surface(&self) -> RasterSurface {
        match self.view.rotation {
            Rotation::R0 => self.surface.clone(),
            r => RasterSurface::from_image(crate::ops::transform::bake_rotation(self.surface.image(), r)),
        }
    }
}
