use image::RgbaImage;
use std::collections::VecDeque;

use crate::canvas::RasterSurface;

// ============================================================================
// SNAPSHOT — full-surface copy taken at an action boundary
// ============================================================================

/// Immutable copy of the surface at one instant. Carries its own dimensions
/// since crop changes them.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    description: String,
    pixels: RgbaImage,
}

impl Snapshot {
    pub fn capture(surface: &RasterSurface, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            pixels: surface.image().clone(),
        }
    }

    pub fn restore_into(&self, surface: &mut RasterSurface) {
        surface.replace(self.pixels.clone());
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// True when this snapshot holds exactly the surface's current content.
    pub fn matches(&self, surface: &RasterSurface) -> bool {
        &self.pixels == surface.image()
    }
}

// ============================================================================
// HISTORY MANAGER — bounded undo/redo stacks of snapshots
// ============================================================================

/// Linear undo/redo history. The top of `undo_stack` is the state the surface
/// is in; the bottom one (the loaded image) is never undone past.
pub struct HistoryManager {
    undo_stack: VecDeque<Snapshot>,
    redo_stack: VecDeque<Snapshot>,
    max_history_size: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(20)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
        }
    }

    /// Record the surface as the newest state. Clears the redo stack.
    pub fn push_snapshot(&mut self, surface: &RasterSurface, description: impl Into<String>) {
        self.redo_stack.clear();
        self.undo_stack.push_back(Snapshot::capture(surface, description));

        self.prune();
    }

    /// Step back one state. Returns the snapshot to restore, or `None` when
    /// only the initial state is left.
    pub fn undo(&mut self) -> Option<&Snapshot> {
        if self.undo_stack.len() <= 1 {
            return None;
        }
        let top = self.undo_stack.pop_back()?;
        self.redo_stack.push_back(top);
        self.undo_stack.back()
    }

    /// Re-apply the most recently undone state.
    pub fn redo(&mut self) -> Option<&Snapshot> {
        let snap = self.redo_stack.pop_back()?;
        self.undo_stack.push_back(snap);
        self.undo_stack.back()
    }

    /// Replace the top snapshot's pixels with the surface, keeping its
    /// description. Redo and length are untouched.
    pub fn amend_top(&mut self, surface: &RasterSurface) {
        if let Some(top) = self.undo_stack.back_mut() {
            top.pixels = surface.image().clone();
        }
    }

    pub fn current(&self) -> Option<&Snapshot> {
        self.undo_stack.back()
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// What an undo would take back.
    pub fn undo_description(&self) -> Option<&str> {
        if self.can_undo() {
            self.undo_stack.back().map(|s| s.description())
        } else {
            None
        }
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|s| s.description())
    }

    /// All undo descriptions (most recent first)
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|s| s.description.clone()).collect()
    }

    /// Drop the oldest snapshots to stay within the bound
    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            self.undo_stack.pop_front();
        }
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}
