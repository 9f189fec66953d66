// ============================================================================
// GalleryFE CLI — headless viewing/editing driven by command-line arguments
// ============================================================================
//
// Usage examples:
//   galleryfe -i photo.png --info
//   galleryfe -i photo.jpg --script annotate.rhai --save --yes
//   galleryfe -i "shots/*.png" --script crop.rhai --save-as --output-dir edited/
//   galleryfe -i holiday/ --save-as --format jpeg --quality 85
//
// Every input is opened through the same Controller an interactive front-end
// would use, so scripted edits, history and save fallbacks behave identically.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::controller::{Command, Controller, Host, Notice, Response, SavePreview};
use crate::io::{self, FileSource, ImageSource, SaveFormat};
use crate::ops::scripting::compile_edit_script;
use crate::persistence::{DownloadSaveAs, PersistenceSink, SaveAs, SaveOutcome};
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// GalleryFE headless image viewer/editor.
#[derive(Parser, Debug)]
#[command(
    name = "galleryfe",
    about = "GalleryFE headless image viewer and editor",
    long_about = "Open images, apply Rhai edit scripts and save the result either over\n\
                  the original file or as a new copy.\n\n\
                  Example:\n  \
                  galleryfe -i photo.png --script annotate.rhai --save --yes\n  \
                  galleryfe -i \"*.jpg\" --script crop.rhai --save-as --output-dir out/"
)]
pub struct CliArgs {
    /// Input file(s) or folder(s). Glob patterns accepted (e.g. "*.png").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Rhai edit script to run on each image.
    #[arg(short, long, value_name = "SCRIPT.rhai")]
    pub script: Option<PathBuf>,

    /// Overwrite each original after editing (falls back to a copy when it can't).
    #[arg(long, conflicts_with = "save_as")]
    pub save: bool,

    /// Save each edited image as a new file.
    #[arg(long)]
    pub save_as: bool,

    /// Where "save as" copies go. Defaults to the configured download folder.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Format for "save as" copies: png or jpeg.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100).
    #[arg(short, long, value_name = "1-100", value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Overwrite without asking.
    #[arg(short, long)]
    pub yes: bool,

    /// Pick "save as" destinations with the native file dialog.
    #[arg(long)]
    pub dialog: bool,

    /// Print image information after editing.
    #[arg(long)]
    pub info: bool,

    /// Remember --format and --quality as the new defaults.
    #[arg(long)]
    pub save_settings: bool,

    /// Echo the session log to stderr and print per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Terminal host
// ============================================================================

/// Answers controller questions on the terminal.
struct TerminalHost {
    assume_yes: bool,
}

fn read_answer(prompt: &str) -> Option<String> {
    print!("{}", prompt);
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

impl Host for TerminalHost {
    fn prompt_text(&mut self, at: (f32, f32)) -> Option<String> {
        read_answer(&format!("Text at ({:.0}, {:.0}): ", at.0, at.1))
    }

    fn confirm_overwrite(&mut self, preview: &SavePreview<'_>) -> bool {
        if self.assume_yes {
            return true;
        }
        let question = format!(
            "Overwrite {} with {}x{} {} ({} bytes)? [y/N] ",
            preview.name,
            preview.width,
            preview.height,
            preview.format.mime(),
            preview.bytes.len()
        );
        matches!(read_answer(&question).as_deref().map(str::trim), Some("y" | "Y" | "yes"))
    }

    fn notify(&mut self, notice: Notice) {
        match notice {
            Notice::Info(msg) => println!("  {}", msg.replace('\n', "\n  ")),
            Notice::Warning(msg) => eprintln!("  warning: {}", msg),
            Notice::Placeholder(msg) => eprintln!("  {}", msg),
        }
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Result of a whole CLI run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
}

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = setup failed or any file failed.
pub fn run(args: CliArgs) -> ExitCode {
    crate::logger::set_echo(args.verbose);
    let settings = match apply_overrides(&args, EditorSettings::load()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if args.save_settings
        && let Err(e) = settings.save()
    {
        eprintln!("warning: could not save settings: {}", e);
    }
    match execute(&args, settings) {
        Ok(summary) if summary.failed == 0 => ExitCode::SUCCESS,
        Ok(summary) => {
            eprintln!("{} of {} image(s) failed.", summary.failed, summary.processed);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// `--format` and `--quality` on top of the stored settings.
pub fn apply_overrides(args: &CliArgs, mut settings: EditorSettings) -> Result<EditorSettings, String> {
    if let Some(f) = args.format.as_deref() {
        settings.save_format =
            SaveFormat::from_name(f).ok_or_else(|| format!("unsupported output format '{}' (png or jpeg)", f))?;
    }
    if let Some(q) = args.quality {
        settings.jpeg_quality = q;
    }
    Ok(settings)
}

/// Build a controller from the arguments and walk every input through it.
pub fn execute(args: &CliArgs, settings: EditorSettings) -> Result<BatchSummary, String> {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        return Err("no input files matched the given pattern(s).".to_string());
    }

    let script_source = match &args.script {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .map_err(|e| format!("could not read script '{}': {}", path.display(), e))?,
        ),
        None => None,
    };
    // Surface syntax errors once, before touching any image
    if let Some(src) = &script_source {
        compile_edit_script(src).map_err(|e| e.friendly_message())?;
    }

    let save_as = save_as_target(args, &settings)?;
    let mut controller = Controller::new(settings, PersistenceSink::new(save_as));
    let mut host = TerminalHost { assume_yes: args.yes };

    let sources: Vec<Box<dyn ImageSource>> = inputs
        .iter()
        .map(|p| Box::new(FileSource::open(p)) as Box<dyn ImageSource>)
        .collect();
    let total = sources.len();
    crate::log_info!("CLI: {} input(s)", total);

    let mut summary = BatchSummary::default();
    let mut opened = controller.dispatch(Command::Open(sources), &mut host).map(|_| ());

    loop {
        let file_start = Instant::now();
        let label = inputs
            .get(controller.index())
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        if total > 1 || args.verbose {
            println!("[{}/{}] {}", controller.index() + 1, total, label);
        }

        let result = opened
            .map_err(|e| e.to_string())
            .and_then(|()| process_current(&mut controller, &mut host, script_source.as_deref(), args));
        summary.processed += 1;
        match result {
            Ok(()) if args.verbose => {
                println!("  done ({:.0}ms)", file_start.elapsed().as_secs_f64() * 1000.0)
            }
            Ok(()) => {}
            Err(e) => {
                eprintln!("  error: {}", e);
                crate::log_err!("{}: {}", label, e);
                summary.failed += 1;
            }
        }

        if !controller.has_next() {
            break;
        }
        opened = controller.dispatch(Command::Next, &mut host).map(|_| ());
    }

    Ok(summary)
}

// ============================================================================
// Per-image pipeline
// ============================================================================

fn process_current(
    controller: &mut Controller,
    host: &mut TerminalHost,
    script: Option<&str>,
    args: &CliArgs,
) -> Result<(), String> {
    // -- Step 1: Script --------------------------------------------------
    if let Some(src) = script {
        let edit = compile_edit_script(src).map_err(|e| e.friendly_message())?;
        edit.run(controller, host).map_err(|e| format!("script failed: {}", e))?;
    }

    // -- Step 2: Info ----------------------------------------------------
    if args.info
        && let Response::Info(info) = controller.dispatch(Command::Info, host).map_err(|e| e.to_string())?
    {
        host.notify(Notice::Info(info.to_string()));
    }

    // -- Step 3: Save ----------------------------------------------------
    let request = if args.save {
        Command::Save
    } else if args.save_as {
        Command::SaveAs
    } else {
        return Ok(());
    };
    match controller.dispatch(request, host).map_err(|e| e.to_string())? {
        Response::Saved(SaveOutcome::Cancelled) => println!("  skipped (not overwritten)"),
        Response::Saved(_) => {}
        other => {
            crate::log_warn!("Unexpected save response {:?}", other);
        }
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn save_as_target(args: &CliArgs, settings: &EditorSettings) -> Result<Box<dyn SaveAs>, String> {
    if args.dialog {
        #[cfg(feature = "native-dialog")]
        {
            return Ok(Box::new(crate::persistence::DialogSaveAs {
                start_dir: args.output_dir.clone(),
            }));
        }
        #[cfg(not(feature = "native-dialog"))]
        return Err("--dialog needs a build with the `native-dialog` feature".to_string());
    }

    let dir = args.output_dir.clone().unwrap_or_else(|| settings.download_dir());
    if args.save || args.save_as {
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("could not create output directory '{}': {}", dir.display(), e))?;
    }
    Ok(Box::new(DownloadSaveAs::new(dir)))
}

/// Expand glob patterns, folders and literal paths into a deduplicated,
/// ordered list. Folders contribute their image files in name order.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    fn push(p: PathBuf, result: &mut Vec<PathBuf>) {
        if !result.contains(&p) {
            result.push(p);
        }
    }

    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.is_dir() {
            match io::list_images_in_dir(as_path) {
                Ok(files) => files.into_iter().for_each(|f| push(f, &mut result)),
                Err(e) => eprintln!("warning: cannot list '{}': {}", pattern, e),
            }
            continue;
        }
        if as_path.exists() {
            push(as_path.to_path_buf(), &mut result);
            continue;
        }

        // Treat as glob pattern
        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    push(entry, &mut result);
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}
