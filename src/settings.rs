//! Editor settings persisted across sessions as `key=value` lines.

use std::path::{Path, PathBuf};

use crate::components::colors::{self, Color};
use crate::io::SaveFormat;

/// Settings that persist across sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Maximum number of undo snapshots kept (oldest dropped first)
    pub max_undo_steps: usize,
    /// Crop rectangles with a side at or below this many pixels are rejected
    pub crop_min_size: u32,
    /// Additive zoom step for zoom in/out
    pub zoom_step: f32,
    /// Lower zoom clamp
    pub zoom_min: f32,
    pub brush_color: Color,
    /// Brush diameter in buffer pixels
    pub brush_width: f32,
    pub text_color: Color,
    /// Text size in buffer pixels
    pub text_size: f32,
    /// Font family for the text tool ("sans-serif", "serif", "monospace" or a family name)
    pub font_family: String,
    /// Format used by "Save As"
    pub save_format: SaveFormat,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Show a preview and ask before overwriting the original file
    pub confirm_before_overwrite: bool,
    /// Appended to the file stem for "Save As" suggestions
    pub edited_suffix: String,
    /// Where synthetic downloads land. Empty = platform default.
    pub download_dir: String,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            max_undo_steps: 20,
            crop_min_size: 10,
            zoom_step: 0.2,
            zoom_min: 0.2,
            brush_color: colors::BRUSH_RED,
            brush_width: 8.0,
            text_color: colors::TEXT_WHITE,
            text_size: 48.0,
            font_family: "sans-serif".to_string(),
            save_format: SaveFormat::Png,
            jpeg_quality: 90,
            confirm_before_overwrite: true,
            edited_suffix: "-edited".to_string(),
            download_dir: String::new(),
        }
    }
}

impl EditorSettings {
    #[allow(unreachable_code)]
    pub(crate) fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
                .ok()?
                .join("galleryfe");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("galleryfe_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            let config_dir = PathBuf::from(appdata).join("GalleryFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("galleryfe_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("GalleryFE");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("galleryfe_settings.cfg"));
        }
        None
    }

    /// Directory used by the download fallback.
    pub fn download_dir(&self) -> PathBuf {
        if !self.download_dir.is_empty() {
            return PathBuf::from(&self.download_dir);
        }
        let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"));
        match home {
            Ok(h) => PathBuf::from(h).join("Downloads"),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Persist to the platform settings file.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::settings_path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no settings directory on this platform",
            ));
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_cfg_string()).inspect_err(|e| {
            crate::log_warn!("Failed to write settings {}: {}", path.display(), e);
        })
    }

    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Missing or unreadable files give the defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };
        Self::parse(&content)
    }

    pub fn to_cfg_string(&self) -> String {
        let format_str = match self.save_format {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpeg",
        };
        format!(
            "max_undo_steps={}\n\
             crop_min_size={}\n\
             zoom_step={}\n\
             zoom_min={}\n\
             brush_color={}\n\
             brush_width={}\n\
             text_color={}\n\
             text_size={}\n\
             font_family={}\n\
             save_format={format_str}\n\
             jpeg_quality={}\n\
             confirm_before_overwrite={}\n\
             edited_suffix={}\n\
             download_dir={}\n",
            self.max_undo_steps,
            self.crop_min_size,
            self.zoom_step,
            self.zoom_min,
            colors::to_hex(self.brush_color),
            self.brush_width,
            colors::to_hex(self.text_color),
            self.text_size,
            self.font_family,
            self.jpeg_quality,
            self.confirm_before_overwrite,
            self.edited_suffix,
            self.download_dir,
        )
    }

    /// Parse `key=value` lines. Unknown keys are skipped and unparsable values
    /// keep their defaults.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "max_undo_steps" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.max_undo_steps = v.max(1);
                    }
                }
                "crop_min_size" => {
                    if let Ok(v) = val.parse() {
                        s.crop_min_size = v;
                    }
                }
                "zoom_step" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v > 0.0
                    {
                        s.zoom_step = v;
                    }
                }
                "zoom_min" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v > 0.0
                    {
                        s.zoom_min = v;
                    }
                }
                "brush_color" => {
                    if let Some(c) = colors::parse_hex(val) {
                        s.brush_color = c;
                    }
                }
                "brush_width" => {
                    if let Ok(v) = val.parse::<f32>() {
                        s.brush_width = v.clamp(1.0, 500.0);
                    }
                }
                "text_color" => {
                    if let Some(c) = colors::parse_hex(val) {
                        s.text_color = c;
                    }
                }
                "text_size" => {
                    if let Ok(v) = val.parse::<f32>() {
                        s.text_size = v.clamp(4.0, 1000.0);
                    }
                }
                "font_family" => {
                    if !val.is_empty() {
                        s.font_family = val.to_string();
                    }
                }
                "save_format" => {
                    if let Some(f) = SaveFormat::from_name(val) {
                        s.save_format = f;
                    }
                }
                "jpeg_quality" => {
                    if let Ok(v) = val.parse::<u8>()
                        && (1..=100).contains(&v)
                    {
                        s.jpeg_quality = v;
                    }
                }
                "confirm_before_overwrite" => {
                    s.confirm_before_overwrite = val != "false";
                }
                "edited_suffix" => s.edited_suffix = val.to_string(),
                "download_dir" => s.download_dir = val.to_string(),
                _ => {}
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cfg_round_trip_preserves_values() {
        let settings = EditorSettings {
            max_undo_steps: 7,
            crop_min_size: 4,
            brush_color: [10, 20, 30, 255],
            save_format: SaveFormat::Jpeg,
            jpeg_quality: 75,
            confirm_before_overwrite: false,
            download_dir: "/tmp/dl".to_string(),
            ..EditorSettings::default()
        };
        let parsed = EditorSettings::parse(&settings.to_cfg_string());
        assert_eq!(parsed, settings);
    }

    #[test]
    fn saved_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("galleryfe_settings.cfg");
        assert_eq!(EditorSettings::load_from(&path), EditorSettings::default());

        let settings = EditorSettings {
            save_format: SaveFormat::Jpeg,
            jpeg_quality: 60,
            ..EditorSettings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(EditorSettings::load_from(&path), settings);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let parsed = EditorSettings::parse(
            "max_undo_steps=lots\nbrush_color=#nothex\nzoom_step=-1\nunknown_key=1\njpeg_quality=250",
        );
        let defaults = EditorSettings::default();
        assert_eq!(parsed.max_undo_steps, defaults.max_undo_steps);
        assert_eq!(parsed.brush_color, defaults.brush_color);
        assert_eq!(parsed.zoom_step, defaults.zoom_step);
        assert_eq!(parsed.jpeg_quality, defaults.jpeg_quality);
        assert_eq!(EditorSettings::parse("jpeg_quality=0").jpeg_quality, defaults.jpeg_quality);
        assert_eq!(EditorSettings::parse("jpeg_quality=100").jpeg_quality, 100);
    }
}
