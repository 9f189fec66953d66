// ============================================================================
// CONTROLLER — turns Commands into edits on the current session
// ============================================================================

use ab_glyph::FontArc;
use thiserror::Error;

use crate::canvas::RegionError;
use crate::components::colors::Color;
use crate::components::tools::{Tool, ToolAction};
use crate::io::{DecodeError, EncodeError, ImageSource, SaveFormat};
use crate::ops::scripting::ScriptError;
use crate::ops::text;
use crate::persistence::{BusyFlag, PersistenceSink, SaveError, SaveOutcome, SaveRequest, SaveTarget};
use crate::session::{EditSession, ImageInfo};
use crate::settings::EditorSettings;
use crate::view::Pointer;

/// One discrete user intent. Front-ends translate their events into these.
#[derive(Debug)]
pub enum Command {
    /// Replace the open sources and show the first one.
    Open(Vec<Box<dyn ImageSource>>),
    Next,
    Prev,
    ZoomIn,
    ZoomOut,
    Rotate,
    ResetView,
    /// Pan the display by a delta in display pixels.
    Pan { dx: f32, dy: f32 },
    SelectTool(Tool),
    SetBrushColor(Color),
    SetBrushWidth(f32),
    SetTextColor(Color),
    SetTextSize(f32),
    PointerDown(Pointer),
    PointerMove(Pointer),
    PointerUp(Pointer),
    Undo,
    Redo,
    Save,
    SaveAs,
    Rename(String),
    Info,
    /// Drop all sources and the session.
    Close,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Done,
    /// The command had nothing to act on (e.g. undo at the floor).
    Ignored,
    Saved(SaveOutcome),
    Info(ImageInfo),
}

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("no image is open")]
    NoImage,
    #[error("could not read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Save(#[from] SaveError),
    #[error("no font available for family \"{0}\"")]
    FontUnavailable(String),
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// What is about to be written over the original file.
#[derive(Clone, Copy, Debug)]
pub struct SavePreview<'a> {
    pub name: &'a str,
    pub width: u32,
    pub height: u32,
    pub format: SaveFormat,
    pub bytes: &'a [u8],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// Shown in place of the image when nothing can be displayed.
    Placeholder(String),
    Info(String),
    Warning(String),
}

/// The front-end side of interactions the controller cannot resolve itself.
pub trait Host {
    /// Text for the text tool. `None` or an empty string cancels.
    fn prompt_text(&mut self, at: (f32, f32)) -> Option<String>;
    /// Final confirmation before the original file is overwritten.
    fn confirm_overwrite(&mut self, preview: &SavePreview<'_>) -> bool;
    fn notify(&mut self, notice: Notice);
}

/// Owns the open sources and the session of the one being shown.
pub struct Controller {
    settings: EditorSettings,
    sources: Vec<Box<dyn ImageSource>>,
    index: usize,
    session: Option<EditSession>,
    placeholder: Option<String>,
    sink: PersistenceSink,
    font: Option<FontArc>,
}

const NO_IMAGE: &str = "No image";

impl Controller {
    pub fn new(settings: EditorSettings, sink: PersistenceSink) -> Self {
        Self {
            settings,
            sources: Vec::new(),
            index: 0,
            session: None,
            placeholder: Some(NO_IMAGE.to_string()),
            sink,
            font: None,
        }
    }

    /// Use this font for the text tool instead of looking one up.
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn has_prev(&self) -> bool {
        self.sources.len() > 1 && self.index > 0
    }

    pub fn has_next(&self) -> bool {
        self.sources.len() > 1 && self.index + 1 < self.sources.len()
    }

    /// Save controls are live only with an image and no save in flight.
    pub fn can_save(&self) -> bool {
        self.session.is_some() && !self.sink.is_busy()
    }

    pub fn busy_flag(&self) -> BusyFlag {
        self.sink.busy_flag()
    }

    pub fn dispatch(&mut self, command: Command, host: &mut dyn Host) -> Result<Response, EditorError> {
        match command {
            Command::Open(sources) => {
                self.sources = sources;
                self.index = 0;
                self.show_current(host)
            }
            Command::Next => {
                if !self.has_next() {
                    return Ok(Response::Ignored);
                }
                self.index += 1;
                self.show_current(host)
            }
            Command::Prev => {
                if !self.has_prev() {
                    return Ok(Response::Ignored);
                }
                self.index -= 1;
                self.show_current(host)
            }
            Command::ZoomIn => {
                let step = self.settings.zoom_step;
                self.session_mut()?.view.zoom_in(step);
                Ok(Response::Done)
            }
            Command::ZoomOut => {
                let (step, min) = (self.settings.zoom_step, self.settings.zoom_min);
                self.session_mut()?.view.zoom_out(step, min);
                Ok(Response::Done)
            }
            Command::Rotate => {
                self.session_mut()?.view.rotate_cw();
                Ok(Response::Done)
            }
            Command::ResetView => {
                self.session_mut()?.view.reset();
                Ok(Response::Done)
            }
            Command::Pan { dx, dy } => {
                self.session_mut()?.view.pan_by(dx, dy);
                Ok(Response::Done)
            }
            Command::SelectTool(tool) => {
                self.session_mut()?.select_tool(tool);
                Ok(Response::Done)
            }
            Command::SetBrushColor(c) => {
                self.settings.brush_color = c;
                Ok(Response::Done)
            }
            Command::SetBrushWidth(w) => {
                self.settings.brush_width = w.clamp(1.0, 500.0);
                Ok(Response::Done)
            }
            Command::SetTextColor(c) => {
                self.settings.text_color = c;
                Ok(Response::Done)
            }
            Command::SetTextSize(s) => {
                self.settings.text_size = s.clamp(4.0, 1000.0);
                Ok(Response::Done)
            }
            Command::PointerDown(p) => {
                let session = self.session_mut()?;
                let sample = session.sample(&p);
                let action = session.tools_mut().pointer_down(sample);
                self.apply(action, host)
            }
            Command::PointerMove(p) => {
                let session = self.session_mut()?;
                let sample = session.sample(&p);
                let action = session.tools_mut().pointer_move(sample);
                self.apply(action, host)
            }
            Command::PointerUp(p) => {
                let session = self.session_mut()?;
                let sample = session.sample(&p);
                let action = session.tools_mut().pointer_up(sample);
                self.apply(action, host)
            }
            Command::Undo => {
                let session = self.session_mut()?;
                if session.tools().is_stroking() {
                    session.select_tool(session.tools().active());
                }
                Ok(if session.undo() { Response::Done } else { Response::Ignored })
            }
            Command::Redo => {
                let session = self.session_mut()?;
                Ok(if session.redo() { Response::Done } else { Response::Ignored })
            }
            Command::Save => self.save(SaveRequest::Save, host),
            Command::SaveAs => self.save(SaveRequest::SaveAs, host),
            Command::Rename(name) => {
                let session = self.session_mut()?;
                Ok(if session.rename(&name) { Response::Done } else { Response::Ignored })
            }
            Command::Info => {
                let count = self.sources.len();
                let session = self.session.as_ref().ok_or(EditorError::NoImage)?;
                Ok(Response::Info(session.info(count)))
            }
            Command::Close => {
                self.sources.clear();
                self.index = 0;
                self.session = None;
                self.placeholder = Some(NO_IMAGE.to_string());
                host.notify(Notice::Placeholder(NO_IMAGE.to_string()));
                Ok(Response::Done)
            }
        }
    }

    /// Keyboard shortcut for `key` (a DOM-style key name), if any.
    pub fn key_command(&self, key: &str, ctrl: bool, shift: bool) -> Option<Command> {
        if ctrl {
            return match key.to_ascii_lowercase().as_str() {
                "z" => Some(Command::Undo),
                "y" => Some(Command::Redo),
                "s" if shift => Some(Command::SaveAs),
                "s" => Some(Command::Save),
                _ => None,
            };
        }
        match key {
            "ArrowLeft" => Some(Command::Prev),
            "ArrowRight" => Some(Command::Next),
            "+" | "=" => Some(Command::ZoomIn),
            "-" => Some(Command::ZoomOut),
            "0" => Some(Command::ResetView),
            "i" => Some(Command::Info),
            _ => match key.to_ascii_lowercase().as_str() {
                "r" => Some(Command::Rotate),
                "b" => Some(Command::SelectTool(Tool::Brush)),
                "t" => Some(Command::SelectTool(Tool::Text)),
                "c" => Some(Command::SelectTool(Tool::Crop)),
                "v" => Some(Command::SelectTool(Tool::View)),
                // Toggle edit mode: entering it starts on the brush
                "e" => {
                    let editing = self
                        .session
                        .as_ref()
                        .is_some_and(|s| s.tools().active() != Tool::None);
                    Some(Command::SelectTool(if editing { Tool::None } else { Tool::Brush }))
                }
                "escape" => Some(Command::SelectTool(Tool::None)),
                _ => None,
            },
        }
    }

    fn session_mut(&mut self) -> Result<&mut EditSession, EditorError> {
        self.session.as_mut().ok_or(EditorError::NoImage)
    }

    /// (Re-)read the current source and open a fresh session for it. On
    /// failure the session is dropped and a placeholder explains why.
    fn show_current(&mut self, host: &mut dyn Host) -> Result<Response, EditorError> {
        self.session = None;
        let Some(source) = self.sources.get(self.index) else {
            self.placeholder = Some(NO_IMAGE.to_string());
            host.notify(Notice::Placeholder(NO_IMAGE.to_string()));
            return Ok(Response::Done);
        };

        let name = source.name();
        let opened = source
            .read_bytes()
            .map_err(|source| EditorError::Read {
                name: name.clone(),
                source,
            })
            .and_then(|bytes| {
                let mime = source.mime();
                EditSession::open(
                    self.index,
                    name.clone(),
                    mime.as_deref(),
                    &bytes,
                    source.can_overwrite(),
                    self.settings.max_undo_steps,
                )
                .map_err(EditorError::from)
            });

        match opened {
            Ok(session) => {
                crate::log_info!(
                    "Opened {} ({}x{}, {} of {})",
                    name,
                    session.surface().width(),
                    session.surface().height(),
                    self.index + 1,
                    self.sources.len()
                );
                self.session = Some(session);
                self.placeholder = None;
                Ok(Response::Done)
            }
            Err(e) => {
                crate::log_warn!("Cannot show {}: {}", name, e);
                let msg = format!("{name}: {e}");
                self.placeholder = Some(msg.clone());
                host.notify(Notice::Placeholder(msg));
                Err(e)
            }
        }
    }

    fn text_font(&mut self) -> Result<FontArc, EditorError> {
        if let Some(font) = &self.font {
            return Ok(font.clone());
        }
        let family = &self.settings.font_family;
        let font = text::load_system_font(family).ok_or_else(|| EditorError::FontUnavailable(family.clone()))?;
        self.font = Some(font.clone());
        Ok(font)
    }

    fn apply(&mut self, action: ToolAction, host: &mut dyn Host) -> Result<Response, EditorError> {
        let (brush_color, brush_width) = (self.settings.brush_color, self.settings.brush_width);
        match action {
            ToolAction::Nothing => Ok(Response::Ignored),
            ToolAction::BeginStroke { at } => {
                self.session_mut()?.begin_stroke(at, brush_color, brush_width);
                Ok(Response::Done)
            }
            ToolAction::StrokeSegment { from, to } => {
                self.session_mut()?.extend_stroke(from, to, brush_color, brush_width);
                Ok(Response::Done)
            }
            ToolAction::EndStroke => {
                self.session_mut()?.end_stroke();
                Ok(Response::Done)
            }
            ToolAction::PromptText { at } => {
                let Some(text) = host.prompt_text(at).filter(|t| !t.trim().is_empty()) else {
                    return Ok(Response::Ignored);
                };
                let font = self.text_font()?;
                let (color, size) = (self.settings.text_color, self.settings.text_size);
                self.session_mut()?.insert_text(&font, at, &text, color, size);
                Ok(Response::Done)
            }
            ToolAction::CropPreview(_) => Ok(Response::Done),
            ToolAction::CommitCrop(region) => {
                let min = self.settings.crop_min_size;
                let session = self.session_mut()?;
                match session.crop(region, min) {
                    Ok(()) => {
                        crate::log_info!("Cropped to {}x{}", region.width, region.height);
                        Ok(Response::Done)
                    }
                    Err(e) => {
                        crate::log_warn!("Crop rejected: {}", e);
                        Err(e.into())
                    }
                }
            }
            ToolAction::Pan { dx, dy } => {
                self.session_mut()?.view.pan_by(dx, dy);
                Ok(Response::Done)
            }
        }
    }

    fn save(&mut self, request: SaveRequest, host: &mut dyn Host) -> Result<Response, EditorError> {
        let session = self.session.as_ref().ok_or(EditorError::NoImage)?;
        if self.sink.is_busy() {
            return Err(SaveError::Busy.into());
        }

        // Overwriting keeps the source's own format; anything else uses the
        // configured save-as format.
        let source = self.sources.get(session.source_index()).map(|s| s.as_ref());
        let overwrite_format = match request {
            SaveRequest::Save => session.source_format(),
            SaveRequest::SaveAs => None,
        };
        let target = match overwrite_format {
            Some(_) => SaveTarget::for_source(source),
            None => SaveTarget::NoHandle,
        };
        let format = match (target, overwrite_format) {
            (SaveTarget::Overwrite(_), Some(f)) => f,
            _ => self.settings.save_format,
        };

        let baked = session.baked_surface();
        let bytes = baked.to_encoded_bytes(format, self.settings.jpeg_quality)?;
        let suggested = session.suggested_save_name(&self.settings.edited_suffix, format);

        if let SaveTarget::Overwrite(src) = target
            && self.settings.confirm_before_overwrite
        {
            let name = src.name();
            let preview = SavePreview {
                name: &name,
                width: baked.width(),
                height: baked.height(),
                format,
                bytes: &bytes,
            };
            if !host.confirm_overwrite(&preview) {
                crate::log_info!("Overwrite of {} declined at preview", name);
                return Ok(Response::Saved(SaveOutcome::Cancelled));
            }
        }

        let outcome = self.sink.commit(&bytes, target, &suggested, format, request)?;

        match &outcome {
            SaveOutcome::Overwritten { name } => host.notify(Notice::Info(format!("Saved {name}"))),
            SaveOutcome::SavedAs { path } => host.notify(Notice::Info(format!("Saved {}", path.display()))),
            SaveOutcome::Recovered { path, write_error } => host.notify(Notice::Warning(format!(
                "Could not overwrite the original ({write_error}); saved a copy to {}",
                path.display()
            ))),
            SaveOutcome::Cancelled => {}
        }
        if !matches!(outcome, SaveOutcome::Cancelled)
            && let Some(session) = self.session.as_mut()
        {
            session.mark_saved();
        }
        Ok(Response::Saved(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Region;
    use crate::io::{encode_image, FileSource, UploadedFile};
    use crate::persistence::tests::RecordingSaveAs;
    use image::{Rgba, RgbaImage};

    #[derive(Default)]
    struct ScriptedHost {
        answers: Vec<String>,
        confirm: bool,
        notices: Vec<Notice>,
        previews: usize,
    }

    impl Host for ScriptedHost {
        fn prompt_text(&mut self, _at: (f32, f32)) -> Option<String> {
            if self.answers.is_empty() {
                None
            } else {
                Some(self.answers.remove(0))
            }
        }
        fn confirm_overwrite(&mut self, _preview: &SavePreview<'_>) -> bool {
            self.previews += 1;
            self.confirm
        }
        fn notify(&mut self, notice: Notice) {
            self.notices.push(notice);
        }
    }

    fn png(w: u32, h: u32, shade: u8) -> Vec<u8> {
        let img = RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, shade, 255]));
        encode_image(&img, crate::io::SaveFormat::Png, 90).unwrap()
    }

    fn upload(name: &str, w: u32, h: u32) -> Box<dyn ImageSource> {
        Box::new(UploadedFile::new(name, png(w, h, 0)))
    }

    fn controller(rec: &RecordingSaveAs) -> Controller {
        Controller::new(EditorSettings::default(), PersistenceSink::new(Box::new(rec.clone())))
    }

    fn at(x: f32, y: f32, c: &Controller) -> Pointer {
        let (w, h) = c.session().unwrap().surface().dimensions();
        Pointer::at_buffer(x, y, w, h)
    }

    fn in_sync(c: &Controller) -> bool {
        let s = c.session().unwrap();
        s.history().current().is_some_and(|top| top.matches(s.surface()))
    }

    #[test]
    fn navigation_stops_at_the_ends() {
        let rec = RecordingSaveAs::default();
        let mut c = controller(&rec);
        let mut host = ScriptedHost::default();
        c.dispatch(Command::Open(vec![upload("a.png", 4, 4), upload("b.png", 6, 6)]), &mut host)
            .unwrap();
        assert_eq!(c.dispatch(Command::Prev, &mut host).unwrap(), Response::Ignored);
        assert_eq!(c.dispatch(Command::Next, &mut host).unwrap(), Response::Done);
        assert_eq!(c.session().unwrap().name(), "b.png");
        assert_eq!(c.dispatch(Command::Next, &mut host).unwrap(), Response::Ignored);
    }

    #[test]
    fn unreadable_image_leaves_a_placeholder_and_navigation_works() {
        let rec = RecordingSaveAs::default();
        let mut c = controller(&rec);
        let mut host = ScriptedHost::default();
        let broken: Box<dyn ImageSource> = Box::new(UploadedFile::new("broken.png", Vec::new()));
        let err = c
            .dispatch(Command::Open(vec![broken, upload("ok.png", 4, 4)]), &mut host)
            .unwrap_err();
        assert!(matches!(err, EditorError::Decode(DecodeError::Empty)));
        assert!(c.session().is_none());
        assert!(c.placeholder().unwrap().contains("broken.png"));
        assert!(matches!(c.dispatch(Command::Undo, &mut host), Err(EditorError::NoImage)));

        c.dispatch(Command::Next, &mut host).unwrap();
        assert!(c.session().is_some());
        assert!(c.placeholder().is_none());
    }

    #[test]
    fn brush_stroke_is_one_undo_step() {
        let rec = RecordingSaveAs::default();
        let mut c = controller(&rec);
        let mut host = ScriptedHost::default();
        c.dispatch(Command::Open(vec![upload("a.png", 60, 60)]), &mut host).unwrap();
        let original = c.session().unwrap().surface().clone();

        c.dispatch(Command::SelectTool(Tool::Brush), &mut host).unwrap();
        c.dispatch(Command::PointerDown(at(10.0, 10.0, &c)), &mut host).unwrap();
        for x in [20.0, 30.0, 40.0] {
            c.dispatch(Command::PointerMove(at(x, 10.0, &c)), &mut host).unwrap();
        }
        c.dispatch(Command::PointerUp(at(40.0, 10.0, &c)), &mut host).unwrap();

        let s = c.session().unwrap();
        assert_eq!(s.history().undo_count(), 2);
        assert_eq!(s.surface().pixel(25, 10), Some([255, 0, 0, 255]));
        assert!(in_sync(&c));

        c.dispatch(Command::Undo, &mut host).unwrap();
        assert_eq!(c.session().unwrap().surface(), &original);
        assert_eq!(c.dispatch(Command::Undo, &mut host).unwrap(), Response::Ignored);
    }

    #[test]
    fn undo_redo_round_trip_and_push_clears_redo() {
        let rec = RecordingSaveAs::default();
        let mut c = controller(&rec);
        let mut host = ScriptedHost::default();
        c.dispatch(Command::Open(vec![upload("a.png", 100, 100)]), &mut host).unwrap();
        c.dispatch(Command::SelectTool(Tool::Crop), &mut host).unwrap();
        c.dispatch(Command::PointerDown(at(10.0, 10.0, &c)), &mut host).unwrap();
        c.dispatch(Command::PointerUp(at(60.0, 60.0, &c)), &mut host).unwrap();
        let cropped = c.session().unwrap().surface().clone();
        assert_eq!(cropped.dimensions(), (50, 50));

        c.dispatch(Command::Undo, &mut host).unwrap();
        c.dispatch(Command::Redo, &mut host).unwrap();
        assert_eq!(c.session().unwrap().surface(), &cropped);
        assert!(in_sync(&c));

        c.dispatch(Command::Undo, &mut host).unwrap();
        c.dispatch(Command::SelectTool(Tool::Brush), &mut host).unwrap();
        c.dispatch(Command::PointerDown(at(5.0, 5.0, &c)), &mut host).unwrap();
        c.dispatch(Command::PointerUp(at(5.0, 5.0, &c)), &mut host).unwrap();
        assert_eq!(c.dispatch(Command::Redo, &mut host).unwrap(), Response::Ignored);
    }

    #[test]
    fn small_crop_is_rejected_without_a_snapshot() {
        let rec = RecordingSaveAs::default();
        let mut c = controller(&rec);
        let mut host = ScriptedHost::default();
        c.dispatch(Command::Open(vec![upload("a.png", 100, 100)]), &mut host).unwrap();
        c.dispatch(Command::SelectTool(Tool::Crop), &mut host).unwrap();
        c.dispatch(Command::PointerDown(at(10.0, 10.0, &c)), &mut host).unwrap();
        c.dispatch(Command::PointerMove(at(40.0, 15.0, &c)), &mut host).unwrap();
        assert_eq!(
            c.session().unwrap().tools().crop_overlay(),
            Some(Region::new(10, 10, 30, 5))
        );
        let err = c
            .dispatch(Command::PointerUp(at(40.0, 15.0, &c)), &mut host)
            .unwrap_err();
        assert!(matches!(err, EditorError::Region(RegionError::TooSmall { .. })));
        assert_eq!(c.session().unwrap().surface().dimensions(), (100, 100));
        assert_eq!(c.session().unwrap().history().undo_count(), 1);
    }

    #[test]
    fn cancelled_text_prompt_changes_nothing() {
        let rec = RecordingSaveAs::default();
        let mut c = controller(&rec);
        let mut host = ScriptedHost {
            answers: vec!["  ".into()],
            ..Default::default()
        };
        c.dispatch(Command::Open(vec![upload("a.png", 120, 80)]), &mut host).unwrap();
        let before = c.session().unwrap().surface().clone();
        c.dispatch(Command::SelectTool(Tool::Text), &mut host).unwrap();

        assert_eq!(
            c.dispatch(Command::PointerDown(at(10.0, 60.0, &c)), &mut host).unwrap(),
            Response::Ignored
        );
        assert_eq!(c.session().unwrap().history().undo_count(), 1);
        assert_eq!(c.session().unwrap().surface(), &before);
        assert!(!c.session().unwrap().is_dirty());
    }

    #[test]
    #[ignore = "needs an installed system font"]
    fn confirmed_text_is_one_undo_step() {
        let rec = RecordingSaveAs::default();
        let font = text::load_system_font("sans-serif").expect("a system font");
        let mut c = controller(&rec).with_font(font);
        let mut host = ScriptedHost {
            answers: vec!["Hi".into()],
            ..Default::default()
        };
        c.dispatch(Command::Open(vec![upload("a.png", 120, 80)]), &mut host).unwrap();
        c.dispatch(Command::SelectTool(Tool::Text), &mut host).unwrap();

        c.dispatch(Command::PointerDown(at(10.0, 60.0, &c)), &mut host).unwrap();
        assert_eq!(c.session().unwrap().history().undo_history()[0], "Text");
        assert_eq!(c.session().unwrap().history().undo_count(), 2);
        assert!(in_sync(&c));
    }

    #[test]
    fn upload_save_always_downloads() {
        let rec = RecordingSaveAs::default();
        let mut c = controller(&rec);
        let mut host = ScriptedHost::default();
        c.dispatch(Command::Open(vec![upload("cat.jpeg", 8, 8)]), &mut host).unwrap();
        for cmd in [Command::Save, Command::SaveAs] {
            let out = c.dispatch(cmd, &mut host).unwrap();
            assert!(matches!(out, Response::Saved(SaveOutcome::SavedAs { .. })));
        }
        assert_eq!(*rec.calls.lock().unwrap(), vec!["cat-edited.png", "cat-edited.png"]);
        assert_eq!(host.previews, 0);
    }

    #[test]
    fn overwrite_with_confirmation_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, png(30, 10, 1)).unwrap();

        let rec = RecordingSaveAs::default();
        let mut c = controller(&rec);
        let mut host = ScriptedHost { confirm: true, ..Default::default() };
        c.dispatch(Command::Open(vec![Box::new(FileSource::open(&path))]), &mut host).unwrap();
        c.dispatch(Command::Rotate, &mut host).unwrap();

        let out = c.dispatch(Command::Save, &mut host).unwrap();
        assert_eq!(out, Response::Saved(SaveOutcome::Overwritten { name: "shot.png".into() }));
        assert!(rec.calls.lock().unwrap().is_empty());
        assert_eq!(host.previews, 1);

        // rotation was baked in: 30x10 became 10x30
        let written = image::load_from_memory(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!((written.width(), written.height()), (10, 30));
    }

    #[test]
    fn declined_preview_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.png");
        let original = png(12, 12, 3);
        std::fs::write(&path, &original).unwrap();

        let rec = RecordingSaveAs::default();
        let mut c = controller(&rec);
        let mut host = ScriptedHost { confirm: false, ..Default::default() };
        c.dispatch(Command::Open(vec![Box::new(FileSource::open(&path))]), &mut host).unwrap();
        let out = c.dispatch(Command::Save, &mut host).unwrap();
        assert_eq!(out, Response::Saved(SaveOutcome::Cancelled));
        assert_eq!(std::fs::read(&path).unwrap(), original);
    }

    #[test]
    fn save_while_busy_is_refused() {
        let rec = RecordingSaveAs::default();
        let mut c = controller(&rec);
        let mut host = ScriptedHost::default();
        c.dispatch(Command::Open(vec![upload("a.png", 4, 4)]), &mut host).unwrap();
        let flag = c.busy_flag();
        let guard = flag.try_acquire().unwrap();
        assert!(!c.can_save());
        assert!(matches!(
            c.dispatch(Command::SaveAs, &mut host),
            Err(EditorError::Save(SaveError::Busy))
        ));
        drop(guard);
        assert!(c.dispatch(Command::SaveAs, &mut host).is_ok());
    }

    #[test]
    fn four_rotations_restore_the_view() {
        let rec = RecordingSaveAs::default();
        let mut c = controller(&rec);
        let mut host = ScriptedHost::default();
        c.dispatch(Command::Open(vec![upload("a.png", 4, 4)]), &mut host).unwrap();
        let before = c.session().unwrap().view;
        for _ in 0..4 {
            c.dispatch(Command::Rotate, &mut host).unwrap();
        }
        assert_eq!(c.session().unwrap().view, before);
    }

    #[test]
    fn key_bindings() {
        let rec = RecordingSaveAs::default();
        let c = controller(&rec);
        assert!(matches!(c.key_command("ArrowLeft", false, false), Some(Command::Prev)));
        assert!(matches!(c.key_command("+", false, false), Some(Command::ZoomIn)));
        assert!(matches!(c.key_command("R", false, false), Some(Command::Rotate)));
        assert!(matches!(c.key_command("c", false, false), Some(Command::SelectTool(Tool::Crop))));
        assert!(matches!(c.key_command("e", false, false), Some(Command::SelectTool(Tool::Brush))));
        assert!(matches!(c.key_command("z", true, false), Some(Command::Undo)));
        assert!(matches!(c.key_command("S", true, true), Some(Command::SaveAs)));
        assert!(c.key_command("q", false, false).is_none());
    }

    #[test]
    fn info_reports_the_current_image() {
        let rec = RecordingSaveAs::default();
        let mut c = controller(&rec);
        let mut host = ScriptedHost::default();
        c.dispatch(Command::Open(vec![upload("a.png", 7, 5), upload("b.png", 2, 2)]), &mut host)
            .unwrap();
        c.dispatch(Command::ZoomIn, &mut host).unwrap();
        let Response::Info(info) = c.dispatch(Command::Info, &mut host).unwrap() else {
            panic!("expected info");
        };
        assert_eq!((info.width, info.height), (7, 5));
        assert_eq!(info.mime, "image/png");
        assert!(!info.can_overwrite);
        assert_eq!(info.position, (0, 2));
        assert_eq!(info.zoom, 1.2);
        assert_eq!(info.tool, "None");
        assert_eq!((info.next_undo.as_deref(), info.next_redo.as_deref()), (None, None));
    }

    #[test]
    fn info_names_the_pending_undo_and_redo() {
        let rec = RecordingSaveAs::default();
        let mut c = controller(&rec);
        let mut host = ScriptedHost::default();
        c.dispatch(Command::Open(vec![upload("a.png", 100, 100)]), &mut host).unwrap();
        c.dispatch(Command::SelectTool(Tool::Crop), &mut host).unwrap();
        c.dispatch(Command::PointerDown(at(10.0, 10.0, &c)), &mut host).unwrap();
        c.dispatch(Command::PointerUp(at(60.0, 60.0, &c)), &mut host).unwrap();

        let Response::Info(info) = c.dispatch(Command::Info, &mut host).unwrap() else {
            panic!("expected info");
        };
        assert_eq!(info.tool, "Crop");
        assert_eq!(info.next_undo.as_deref(), Some("Crop"));

        c.dispatch(Command::Undo, &mut host).unwrap();
        let Response::Info(info) = c.dispatch(Command::Info, &mut host).unwrap() else {
            panic!("expected info");
        };
        assert_eq!(info.next_undo, None);
        assert_eq!(info.next_redo.as_deref(), Some("Crop"));
        assert!(info.to_string().contains("Redo: Crop"));
    }
}
