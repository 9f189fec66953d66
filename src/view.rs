// ============================================================================
// VIEW TRANSFORM — zoom, quarter-turn rotation, pan and pointer mapping
// ============================================================================

/// Display rotation in clockwise quarter turns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// `(r + 90) mod 360`
    pub fn next(self) -> Self {
        match self {
            Rotation::R0 => Rotation::R90,
            Rotation::R90 => Rotation::R180,
            Rotation::R180 => Rotation::R270,
            Rotation::R270 => Rotation::R0,
        }
    }

    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }
}

/// Display-only transform of the current image. Never touches pixels; the
/// rotation is baked in at save time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    pub zoom: f32,
    pub rotation: Rotation,
    /// Pan offset in display pixels.
    pub pan: (f32, f32),
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            rotation: Rotation::R0,
            pan: (0.0, 0.0),
        }
    }
}

impl ViewTransform {
    pub fn zoom_in(&mut self, step: f32) {
        self.zoom = round_zoom(self.zoom + step);
    }

    /// Zoom out, never below `min`.
    pub fn zoom_out(&mut self, step: f32, min: f32) {
        self.zoom = round_zoom((self.zoom - step).max(min));
    }

    pub fn rotate_cw(&mut self) {
        self.rotation = self.rotation.next();
    }

    pub fn pan_by(&mut self, dx: f32, dy: f32) {
        self.pan.0 += dx;
        self.pan.1 += dy;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// CSS-style description, e.g. `translate(0px, 0px) scale(1.2) rotate(90deg)`.
    pub fn transform_string(&self) -> String {
        format!(
            "translate({}px, {}px) scale({}) rotate({}deg)",
            self.pan.0,
            self.pan.1,
            self.zoom,
            self.rotation.degrees()
        )
    }

    /// On-screen size of a `w × h` surface inside a viewport: fit scale times
    /// zoom, with axes swapped for quarter turns.
    pub fn displayed_size(&self, w: u32, h: u32, viewport: (f32, f32)) -> (f32, f32) {
        let (rw, rh) = if self.rotation.swaps_axes() { (h, w) } else { (w, h) };
        let s = fit_scale(rw, rh, viewport.0, viewport.1) * self.zoom;
        (rw as f32 * s, rh as f32 * s)
    }
}

// Keep repeated ±0.2 steps from drifting (0.2 * 5 != 1.0 in f32).
fn round_zoom(z: f32) -> f32 {
    (z * 1000.0).round() / 1000.0
}

/// Scale that fits `w × h` into the viewport without upscaling.
pub fn fit_scale(w: u32, h: u32, viewport_w: f32, viewport_h: f32) -> f32 {
    if w == 0 || h == 0 {
        return 1.0;
    }
    (viewport_w / w as f32).min(viewport_h / h as f32).min(1.0)
}

/// A pointer position relative to the top-left of the displayed image,
/// together with the displayed size of that image (after zoom and rotation).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pointer {
    pub x: f32,
    pub y: f32,
    pub display_w: f32,
    pub display_h: f32,
}

impl Pointer {
    /// A pointer already in buffer space (displayed at 1:1, unrotated).
    pub fn at_buffer(x: f32, y: f32, surface_w: u32, surface_h: u32) -> Self {
        Self {
            x,
            y,
            display_w: surface_w as f32,
            display_h: surface_h as f32,
        }
    }

    /// The display-space pointer that lands on buffer point `(x, y)` when the
    /// surface is shown at 1:1 with `rotation`. Inverse of [`Pointer::to_buffer`].
    pub fn from_buffer(x: f32, y: f32, surface_w: u32, surface_h: u32, rotation: Rotation) -> Self {
        let (w, h) = (surface_w as f32, surface_h as f32);
        let (dx, dy) = match rotation {
            Rotation::R0 => (x, y),
            Rotation::R90 => (h - y, x),
            Rotation::R180 => (w - x, h - y),
            Rotation::R270 => (y, w - x),
        };
        let (display_w, display_h) = if rotation.swaps_axes() { (h, w) } else { (w, h) };
        Self {
            x: dx,
            y: dy,
            display_w,
            display_h,
        }
    }

    /// Map into buffer space of a `surface_w × surface_h` image shown with
    /// `rotation`. The result is clamped into `[0, w] × [0, h]`.
    pub fn to_buffer(&self, surface_w: u32, surface_h: u32, rotation: Rotation) -> (f32, f32) {
        let (dx, dy) = (self.x, self.y);
        let (dw, dh) = (self.display_w, self.display_h);

        // Undo the display rotation: unrotated coords and unrotated display size
        let (ux, uy, uw, uh) = match rotation {
            Rotation::R0 => (dx, dy, dw, dh),
            Rotation::R90 => (dy, dw - dx, dh, dw),
            Rotation::R180 => (dw - dx, dh - dy, dw, dh),
            Rotation::R270 => (dh - dy, dx, dh, dw),
        };

        let (w, h) = (surface_w as f32, surface_h as f32);
        let sx = if uw > 0.0 { w / uw } else { 1.0 };
        let sy = if uh > 0.0 { h / uh } else { 1.0 };
        let bx = (ux * sx).clamp(0.0, w);
        let by = (uy * sy).clamp(0.0, h);
        (bx, by)
    }
}
