// ============================================================================
// EDIT SCRIPTS — Rhai programs recorded into a replayable command list
// ============================================================================
//
// A script never touches pixels directly. Every host function it calls is
// recorded as a step; the steps are then replayed through the Controller so
// scripted edits get exactly the same history, crop rules and save behaviour
// as interactive ones.

use rhai::{Array, Dynamic, Engine, EvalAltResult, Position};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::components::colors;
use crate::components::tools::Tool;
use crate::controller::{Command, Controller, EditorError, Host, Notice, Response, SavePreview};
use crate::view::Pointer;

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, Clone)]
pub struct ScriptError {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl ScriptError {
    fn at(message: String, pos: Position) -> Self {
        Self {
            message,
            line: pos.line().filter(|l| *l > 0),
            column: pos.position().filter(|c| *c > 0),
        }
    }

    /// Error explanation with line/column context and suggestions.
    pub fn friendly_message(&self) -> String {
        let raw = &self.message;
        let cleaned = raw.split(" (line ").next().unwrap_or(raw);
        let mut parts = Vec::new();

        match (self.line, self.column) {
            (Some(line), Some(col)) => parts.push(format!("Error on line {}, column {}:", line, col)),
            (Some(line), None) => parts.push(format!("Error on line {}:", line)),
            _ => parts.push("Script error:".to_string()),
        }

        if let Some(fn_part) = raw.strip_prefix("Function not found: ") {
            let fn_desc = fn_part.split(" (line ").next().unwrap_or(fn_part);
            parts.push(format!("  Could not find function: {}", fn_desc.trim()));
            parts.push(String::new());
            parts.push("  Tip: coordinates may be ints or floats, colors are \"#rrggbb\" strings,".to_string());
            parts.push("  and tool names are brush, text, crop, view or none.".to_string());
        } else if raw.contains("Variable not found:") {
            let var_name = raw
                .split("Variable not found:")
                .nth(1)
                .and_then(|v| v.split('(').next())
                .unwrap_or("")
                .trim();
            parts.push(format!("  Variable '{}' is not defined.", var_name));
            parts.push(String::new());
            parts.push("  Tip: Make sure you declared it with 'let' before using it:".to_string());
            parts.push(format!("    let {} = 0;", var_name));
        } else if raw.contains("Syntax error") || raw.contains("Expected") {
            parts.push(format!("  Syntax error: {}", cleaned));
            parts.push(String::new());
            parts.push("  Tip: Check for missing semicolons, brackets, or typos near this line.".to_string());
        } else if raw.contains("Too many operations") {
            parts.push("  Script exceeded the maximum operation limit.".to_string());
            parts.push(String::new());
            parts.push("  Tip: Your script may have an infinite loop.".to_string());
        } else {
            parts.push(format!("  {}", cleaned));
        }

        parts.join("\n")
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let (Some(line), Some(col)) = (self.line, self.column) {
            write!(f, "Line {}, Col {}: {}", line, col, self.message)
        } else if let Some(line) = self.line {
            write!(f, "Line {}: {}", line, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ScriptError {}

// ============================================================================
// Recorded steps
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
}

#[derive(Debug)]
pub enum ScriptStep {
    Run(Command),
    /// Pointer event in buffer coordinates of whatever image is current when
    /// the step is replayed.
    Pointer { phase: PointerPhase, x: f32, y: f32 },
    Print(String),
}

/// A recorded script: steps in call order plus the answers to hand out, in
/// order, whenever the text tool asks for input.
#[derive(Debug, Default)]
pub struct EditScript {
    pub steps: Vec<ScriptStep>,
    pub prompt_answers: VecDeque<String>,
}

type SharedScript = Arc<Mutex<EditScript>>;

type FnResult = Result<(), Box<EvalAltResult>>;

fn record(ctx: &SharedScript, step: ScriptStep) {
    let mut lock = ctx.lock().unwrap_or_else(|e| e.into_inner());
    lock.steps.push(step);
}

fn number(v: &Dynamic) -> Result<f32, Box<EvalAltResult>> {
    if let Ok(f) = v.as_float() {
        return Ok(f as f32);
    }
    if let Ok(i) = v.as_int() {
        return Ok(i as f32);
    }
    Err(format!("expected a number, got {}", v.type_name()).into())
}

fn point(v: &Dynamic) -> Result<(f32, f32), Box<EvalAltResult>> {
    let pair = v
        .clone()
        .try_cast::<Array>()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| -> Box<EvalAltResult> { "expected a point [x, y]".into() })?;
    Ok((number(&pair[0])?, number(&pair[1])?))
}

fn color(hex: &str) -> Result<colors::Color, Box<EvalAltResult>> {
    colors::parse_hex(hex).ok_or_else(|| format!("invalid color \"{}\"", hex).into())
}

// ============================================================================
// Engine construction with sandbox + API registration
// ============================================================================

fn create_engine(ctx: SharedScript) -> Engine {
    let mut engine = Engine::new();

    // ── Sandbox limits ──
    engine.set_max_operations(50_000_000);
    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(64, 64);
    engine.set_max_string_size(10_000);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(1_000);

    let c = ctx.clone();
    engine.on_print(move |msg| record(&c, ScriptStep::Print(msg.to_string())));

    register_view_api(&mut engine, ctx.clone());
    register_tool_api(&mut engine, ctx.clone());
    register_edit_api(&mut engine, ctx.clone());
    register_file_api(&mut engine, ctx);

    engine
}

fn register_view_api(engine: &mut Engine, ctx: SharedScript) {
    let simple: [(&str, fn() -> Command); 6] = [
        ("zoom_in", || Command::ZoomIn),
        ("zoom_out", || Command::ZoomOut),
        ("rotate", || Command::Rotate),
        ("reset_view", || Command::ResetView),
        ("next", || Command::Next),
        ("prev", || Command::Prev),
    ];
    for (name, make) in simple {
        let c = ctx.clone();
        engine.register_fn(name, move || record(&c, ScriptStep::Run(make())));
    }

    let c = ctx;
    engine.register_fn("pan", move |dx: Dynamic, dy: Dynamic| -> FnResult {
        let (dx, dy) = (number(&dx)?, number(&dy)?);
        record(&c, ScriptStep::Run(Command::Pan { dx, dy }));
        Ok(())
    });
}

fn register_tool_api(engine: &mut Engine, ctx: SharedScript) {
    let c = ctx.clone();
    engine.register_fn("select_tool", move |name: &str| -> FnResult {
        let tool = Tool::from_name(name).ok_or_else(|| format!("unknown tool \"{}\"", name))?;
        record(&c, ScriptStep::Run(Command::SelectTool(tool)));
        Ok(())
    });

    for (name, phase) in [
        ("pointer_down", PointerPhase::Down),
        ("pointer_move", PointerPhase::Move),
        ("pointer_up", PointerPhase::Up),
    ] {
        let c = ctx.clone();
        engine.register_fn(name, move |x: Dynamic, y: Dynamic| -> FnResult {
            let (x, y) = (number(&x)?, number(&y)?);
            record(&c, ScriptStep::Pointer { phase, x, y });
            Ok(())
        });
    }

    let c = ctx.clone();
    engine.register_fn("set_color", move |hex: &str| -> FnResult {
        record(&c, ScriptStep::Run(Command::SetBrushColor(color(hex)?)));
        Ok(())
    });
    let c = ctx.clone();
    engine.register_fn("set_text_color", move |hex: &str| -> FnResult {
        record(&c, ScriptStep::Run(Command::SetTextColor(color(hex)?)));
        Ok(())
    });
    let c = ctx.clone();
    engine.register_fn("set_brush_width", move |w: Dynamic| -> FnResult {
        record(&c, ScriptStep::Run(Command::SetBrushWidth(number(&w)?)));
        Ok(())
    });
    let c = ctx;
    engine.register_fn("set_text_size", move |s: Dynamic| -> FnResult {
        record(&c, ScriptStep::Run(Command::SetTextSize(number(&s)?)));
        Ok(())
    });
}

fn register_edit_api(engine: &mut Engine, ctx: SharedScript) {
    // brush(x0, y0, x1, y1) — one straight stroke
    let c = ctx.clone();
    engine.register_fn(
        "brush",
        move |x0: Dynamic, y0: Dynamic, x1: Dynamic, y1: Dynamic| -> FnResult {
            let from = (number(&x0)?, number(&y0)?);
            let to = (number(&x1)?, number(&y1)?);
            record_stroke(&c, &[from, to]);
            Ok(())
        },
    );

    // stroke([[x, y], ...]) — one stroke through every point
    let c = ctx.clone();
    engine.register_fn("stroke", move |points: Array| -> FnResult {
        if points.is_empty() {
            return Err("stroke needs at least one point".into());
        }
        let points = points.iter().map(point).collect::<Result<Vec<_>, _>>()?;
        record_stroke(&c, &points);
        Ok(())
    });

    let c = ctx.clone();
    engine.register_fn("text", move |x: Dynamic, y: Dynamic, s: &str| -> FnResult {
        let (x, y) = (number(&x)?, number(&y)?);
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.steps.push(ScriptStep::Run(Command::SelectTool(Tool::Text)));
        lock.steps.push(ScriptStep::Pointer { phase: PointerPhase::Down, x, y });
        lock.steps.push(ScriptStep::Pointer { phase: PointerPhase::Up, x, y });
        lock.prompt_answers.push_back(s.to_string());
        Ok(())
    });

    let c = ctx.clone();
    engine.register_fn(
        "crop",
        move |x: Dynamic, y: Dynamic, w: Dynamic, h: Dynamic| -> FnResult {
            let (x, y) = (number(&x)?, number(&y)?);
            let (w, h) = (number(&w)?, number(&h)?);
            let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
            lock.steps.push(ScriptStep::Run(Command::SelectTool(Tool::Crop)));
            lock.steps.push(ScriptStep::Pointer { phase: PointerPhase::Down, x, y });
            lock.steps.push(ScriptStep::Pointer { phase: PointerPhase::Up, x: x + w, y: y + h });
            Ok(())
        },
    );

    let c = ctx.clone();
    engine.register_fn("undo", move || record(&c, ScriptStep::Run(Command::Undo)));
    let c = ctx;
    engine.register_fn("redo", move || record(&c, ScriptStep::Run(Command::Redo)));
}

fn record_stroke(ctx: &SharedScript, points: &[(f32, f32)]) {
    let Some((&(x0, y0), rest)) = points.split_first() else {
        return;
    };
    let mut lock = ctx.lock().unwrap_or_else(|e| e.into_inner());
    lock.steps.push(ScriptStep::Run(Command::SelectTool(Tool::Brush)));
    lock.steps.push(ScriptStep::Pointer { phase: PointerPhase::Down, x: x0, y: y0 });
    for &(x, y) in rest {
        lock.steps.push(ScriptStep::Pointer { phase: PointerPhase::Move, x, y });
    }
    let (xn, yn) = rest.last().copied().unwrap_or((x0, y0));
    lock.steps.push(ScriptStep::Pointer { phase: PointerPhase::Up, x: xn, y: yn });
}

fn register_file_api(engine: &mut Engine, ctx: SharedScript) {
    let c = ctx.clone();
    engine.register_fn("save", move || record(&c, ScriptStep::Run(Command::Save)));
    let c = ctx.clone();
    engine.register_fn("save_as", move || record(&c, ScriptStep::Run(Command::SaveAs)));
    let c = ctx.clone();
    engine.register_fn("info", move || record(&c, ScriptStep::Run(Command::Info)));
    let c = ctx;
    engine.register_fn("rename", move |name: &str| {
        record(&c, ScriptStep::Run(Command::Rename(name.to_string())))
    });
}

// ============================================================================
// Public API
// ============================================================================

/// Evaluate `source` and record the edits it asks for. Nothing is applied
/// until [`EditScript::run`].
pub fn compile_edit_script(source: &str) -> Result<EditScript, ScriptError> {
    let ctx: SharedScript = Arc::new(Mutex::new(EditScript::default()));
    let engine = create_engine(ctx.clone());

    let ast = engine
        .compile(source)
        .map_err(|e| ScriptError::at(e.to_string(), e.position()))?;
    engine
        .run_ast(&ast)
        .map_err(|e| ScriptError::at(e.to_string(), e.position()))?;

    // The engine holds the other handles; drop it before unwrapping.
    drop(engine);
    let script = match Arc::try_unwrap(ctx) {
        Ok(m) => m.into_inner().unwrap_or_else(|e| e.into_inner()),
        Err(shared) => std::mem::take(&mut *shared.lock().unwrap_or_else(|e| e.into_inner())),
    };
    Ok(script)
}

/// Hands out the script's queued text before asking the real host.
struct ScriptHost<'a> {
    inner: &'a mut dyn Host,
    answers: VecDeque<String>,
}

impl Host for ScriptHost<'_> {
    fn prompt_text(&mut self, at: (f32, f32)) -> Option<String> {
        self.answers.pop_front().or_else(|| self.inner.prompt_text(at))
    }

    fn confirm_overwrite(&mut self, preview: &SavePreview<'_>) -> bool {
        self.inner.confirm_overwrite(preview)
    }

    fn notify(&mut self, notice: Notice) {
        self.inner.notify(notice)
    }
}

impl EditScript {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Replay every step through `controller`, stopping at the first error.
    /// `print` output and info reports go to the host as notices.
    pub fn run(self, controller: &mut Controller, host: &mut dyn Host) -> Result<Vec<Response>, EditorError> {
        let mut host = ScriptHost {
            inner: host,
            answers: self.prompt_answers,
        };
        let mut responses = Vec::with_capacity(self.steps.len());

        for (i, step) in self.steps.into_iter().enumerate() {
            let command = match step {
                ScriptStep::Print(line) => {
                    host.notify(Notice::Info(line));
                    continue;
                }
                ScriptStep::Run(cmd) => cmd,
                ScriptStep::Pointer { phase, x, y } => {
                    let session = controller.session().ok_or(EditorError::NoImage)?;
                    let (w, h) = session.surface().dimensions();
                    let p = Pointer::from_buffer(x, y, w, h, session.view.rotation);
                    match phase {
                        PointerPhase::Down => Command::PointerDown(p),
                        PointerPhase::Move => Command::PointerMove(p),
                        PointerPhase::Up => Command::PointerUp(p),
                    }
                }
            };

            match controller.dispatch(command, &mut host) {
                Ok(Response::Info(info)) => {
                    host.notify(Notice::Info(info.to_string()));
                    responses.push(Response::Info(info));
                }
                Ok(response) => responses.push(response),
                Err(e) => {
                    crate::log_err!("Script stopped at step {}: {}", i + 1, e);
                    return Err(e);
                }
            }
        }
        Ok(responses)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{encode_image, ImageSource, SaveFormat, UploadedFile};
    use crate::persistence::tests::RecordingSaveAs;
    use crate::persistence::{PersistenceSink, SaveOutcome};
    use crate::settings::EditorSettings;
    use image::{Rgba, RgbaImage};

    #[derive(Default)]
    struct QuietHost {
        notices: Vec<Notice>,
    }

    impl Host for QuietHost {
        fn prompt_text(&mut self, _at: (f32, f32)) -> Option<String> {
            None
        }
        fn confirm_overwrite(&mut self, _preview: &SavePreview<'_>) -> bool {
            false
        }
        fn notify(&mut self, notice: Notice) {
            self.notices.push(notice);
        }
    }

    fn opened(rec: &RecordingSaveAs, w: u32, h: u32) -> Controller {
        let img = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
        let bytes = encode_image(&img, SaveFormat::Png, 90).unwrap();
        let src: Box<dyn ImageSource> = Box::new(UploadedFile::new("pic.png", bytes));
        let mut c = Controller::new(EditorSettings::default(), PersistenceSink::new(Box::new(rec.clone())));
        c.dispatch(Command::Open(vec![src]), &mut QuietHost::default()).unwrap();
        c
    }

    #[test]
    fn records_calls_in_order() {
        let script = compile_edit_script(
            r##"
            set_color("#00ff00");
            brush(1, 2, 30.5, 2);
            print("half way");
            text(5, 40, "hello");
            save_as();
            "##,
        )
        .unwrap();

        assert!(matches!(script.steps[0], ScriptStep::Run(Command::SetBrushColor([0, 255, 0, 255]))));
        assert!(matches!(script.steps[1], ScriptStep::Run(Command::SelectTool(Tool::Brush))));
        assert!(matches!(
            script.steps[2],
            ScriptStep::Pointer { phase: PointerPhase::Down, x, y } if x == 1.0 && y == 2.0
        ));
        assert!(matches!(
            script.steps[4],
            ScriptStep::Pointer { phase: PointerPhase::Up, x, .. } if x == 30.5
        ));
        assert!(matches!(&script.steps[5], ScriptStep::Print(s) if s == "half way"));
        assert_eq!(script.prompt_answers, ["hello"]);
        assert!(matches!(script.steps.last(), Some(ScriptStep::Run(Command::SaveAs))));
    }

    #[test]
    fn syntax_errors_carry_a_location() {
        let err = compile_edit_script("zoom_in();\nlet = 3;").unwrap_err();
        assert_eq!(err.line, Some(2));
        assert!(err.friendly_message().starts_with("Error on line 2"));
    }

    #[test]
    fn bad_arguments_fail_at_compile_time() {
        assert!(compile_edit_script(r#"set_color("teal");"#).is_err());
        assert!(compile_edit_script(r#"select_tool("lasso");"#).is_err());
        assert!(compile_edit_script("stroke([]);").is_err());
        assert!(compile_edit_script(r#"pan("a", 1);"#).is_err());
    }

    #[test]
    fn crop_script_runs_through_the_controller() {
        let rec = RecordingSaveAs::default();
        let mut c = opened(&rec, 100, 80);
        let script = compile_edit_script("crop(10, 10, 40, 30); info(); save_as();").unwrap();
        let mut host = QuietHost::default();
        let responses = script.run(&mut c, &mut host).unwrap();

        assert_eq!(c.session().unwrap().surface().dimensions(), (40, 30));
        assert!(matches!(
            responses.last(),
            Some(Response::Saved(SaveOutcome::SavedAs { .. }))
        ));
        assert_eq!(*rec.calls.lock().unwrap(), vec!["pic-edited.png"]);
        assert!(host.notices.iter().any(|n| matches!(n, Notice::Info(s) if s.contains("Size: 40 x 30"))));
    }

    #[test]
    fn rotated_view_still_uses_buffer_coordinates() {
        let rec = RecordingSaveAs::default();
        let mut c = opened(&rec, 60, 40);
        let script = compile_edit_script("rotate(); brush(5, 5, 25, 5);").unwrap();
        script.run(&mut c, &mut QuietHost::default()).unwrap();

        let s = c.session().unwrap();
        assert_eq!(s.surface().pixel(15, 5), Some([255, 0, 0, 255]));
        assert_eq!(s.surface().pixel(5, 30), Some([255, 255, 255, 255]));
    }

    #[test]
    fn run_stops_at_the_first_failure() {
        let rec = RecordingSaveAs::default();
        let mut c = opened(&rec, 100, 100);
        let script = compile_edit_script("crop(0, 0, 5, 5); save_as();").unwrap();
        let err = script.run(&mut c, &mut QuietHost::default()).unwrap_err();
        assert!(matches!(err, EditorError::Region(_)));
        assert!(rec.calls.lock().unwrap().is_empty());
    }
}
