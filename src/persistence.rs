// ============================================================================
// PERSISTENCE SINK — overwrite in place, or fall back to "save as"
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::io::{ImageSource, SaveFormat};

/// Which save action the user asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveRequest {
    /// Overwrite the original if the source allows it.
    Save,
    /// Always pick a new destination.
    SaveAs,
}

/// Where committed bytes may go. Bound from the source when it was opened.
#[derive(Clone, Copy, Debug)]
pub enum SaveTarget<'a> {
    Overwrite(&'a dyn ImageSource),
    NoHandle,
}

impl<'a> SaveTarget<'a> {
    pub fn for_source(source: Option<&'a dyn ImageSource>) -> Self {
        match source {
            Some(src) if src.can_overwrite() => SaveTarget::Overwrite(src),
            _ => SaveTarget::NoHandle,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The original file was replaced.
    Overwritten { name: String },
    SavedAs { path: PathBuf },
    /// Overwriting failed; the bytes went through "save as" instead.
    Recovered { path: PathBuf, write_error: String },
    /// The user dismissed the save-as dialog or declined the preview.
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("could not overwrite the original file: {0}")]
    Write(#[source] std::io::Error),
    #[error("could not overwrite the original file: {write_error}; save as also failed: {fallback}")]
    FallbackFailed {
        write_error: std::io::Error,
        #[source]
        fallback: std::io::Error,
    },
    #[error("a save is already in progress")]
    Busy,
    #[error("save as failed: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// BUSY FLAG
// ============================================================================

/// Shared "save in progress" flag. Front-ends can hold a clone to disable
/// their save controls while it is set.
#[derive(Clone, Debug, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Set the flag, or `None` if it is already set. Released when the guard drops.
    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard { flag: self.0.clone() })
    }
}

#[derive(Debug)]
pub struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ============================================================================
// SAVE-AS PROVIDERS
// ============================================================================

/// A user-driven "save as". `Ok(None)` means the user dismissed it.
pub trait SaveAs {
    fn save_as(&mut self, bytes: &[u8], suggested_name: &str, format: SaveFormat) -> std::io::Result<Option<PathBuf>>;
}

/// Synthetic download: writes into a downloads directory without asking,
/// picking `name (1).ext`, `name (2).ext`, ... when the name is taken.
#[derive(Clone, Debug)]
pub struct DownloadSaveAs {
    pub dir: PathBuf,
}

impl DownloadSaveAs {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// First path in `dir` for `name` that does not exist yet.
pub fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    (1u32..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

impl SaveAs for DownloadSaveAs {
    fn save_as(&mut self, bytes: &[u8], suggested_name: &str, _format: SaveFormat) -> std::io::Result<Option<PathBuf>> {
        std::fs::create_dir_all(&self.dir)?;
        let path = unique_path(&self.dir, suggested_name);
        std::fs::write(&path, bytes)?;
        crate::log_info!("Downloaded {} ({} bytes)", path.display(), bytes.len());
        Ok(Some(path))
    }
}

/// Native "save file" dialog.
#[cfg(feature = "native-dialog")]
#[derive(Clone, Debug, Default)]
pub struct DialogSaveAs {
    pub start_dir: Option<PathBuf>,
}

#[cfg(feature = "native-dialog")]
impl SaveAs for DialogSaveAs {
    fn save_as(&mut self, bytes: &[u8], suggested_name: &str, format: SaveFormat) -> std::io::Result<Option<PathBuf>> {
        let label = match format {
            SaveFormat::Png => "PNG Image",
            SaveFormat::Jpeg => "JPEG Image",
        };
        let mut dialog = rfd::FileDialog::new()
            .set_file_name(suggested_name)
            .add_filter(label, &[format.extension()]);
        if let Some(dir) = &self.start_dir {
            dialog = dialog.set_directory(dir);
        }
        let Some(path) = dialog.save_file() else {
            return Ok(None);
        };
        std::fs::write(&path, bytes)?;
        Ok(Some(path))
    }
}

// ============================================================================
// SINK
// ============================================================================

pub struct PersistenceSink {
    busy: BusyFlag,
    save_as: Box<dyn SaveAs>,
}

impl PersistenceSink {
    pub fn new(save_as: Box<dyn SaveAs>) -> Self {
        Self {
            busy: BusyFlag::default(),
            save_as,
        }
    }

    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    /// Write `bytes` to `target`.
    ///
    /// `Save` on an overwrite-capable target writes in place. If that write
    /// fails the error is logged and the bytes go through save-as instead
    /// (`Recovered`); dismissing that fallback returns the write error. Every
    /// other combination is a plain save-as.
    pub fn commit(
        &mut self,
        bytes: &[u8],
        target: SaveTarget<'_>,
        suggested_name: &str,
        format: SaveFormat,
        request: SaveRequest,
    ) -> Result<SaveOutcome, SaveError> {
        let _guard = self.busy.try_acquire().ok_or(SaveError::Busy)?;

        match (request, target) {
            (SaveRequest::Save, SaveTarget::Overwrite(src)) => match src.write_bytes(bytes) {
                Ok(()) => {
                    crate::log_info!("Overwrote {} ({} bytes)", src.name(), bytes.len());
                    Ok(SaveOutcome::Overwritten { name: src.name() })
                }
                Err(write_err) => {
                    crate::log_err!("Overwrite of {} failed: {}", src.name(), write_err);
                    match self.save_as.save_as(bytes, suggested_name, format) {
                        Ok(Some(path)) => Ok(SaveOutcome::Recovered {
                            path,
                            write_error: write_err.to_string(),
                        }),
                        Ok(None) => Err(SaveError::Write(write_err)),
                        Err(fallback) => Err(SaveError::FallbackFailed {
                            write_error: write_err,
                            fallback,
                        }),
                    }
                }
            },
            _ => match self.save_as.save_as(bytes, suggested_name, format)? {
                Some(path) => Ok(SaveOutcome::SavedAs { path }),
                None => {
                    crate::log_info!("Save as dismissed");
                    Ok(SaveOutcome::Cancelled)
                }
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::io::{FileSource, UploadedFile};
    use std::sync::Mutex;

    /// Save-as stand-in that records every call.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSaveAs {
        pub calls: Arc<Mutex<Vec<String>>>,
        pub dismiss: bool,
    }

    impl SaveAs for RecordingSaveAs {
        fn save_as(&mut self, _bytes: &[u8], name: &str, _format: SaveFormat) -> std::io::Result<Option<PathBuf>> {
            self.calls.lock().unwrap().push(name.to_string());
            if self.dismiss {
                Ok(None)
            } else {
                Ok(Some(PathBuf::from("/downloads").join(name)))
            }
        }
    }

    /// Save-as whose destination cannot be written.
    struct FailingSaveAs;

    impl SaveAs for FailingSaveAs {
        fn save_as(&mut self, _bytes: &[u8], _name: &str, _format: SaveFormat) -> std::io::Result<Option<PathBuf>> {
            Err(std::io::Error::new(std::io::ErrorKind::StorageFull, "no space left"))
        }
    }

    /// An overwrite-capable source whose writes always fail.
    struct Broken;

    impl ImageSource for Broken {
        fn name(&self) -> String {
            "c.png".into()
        }
        fn mime(&self) -> Option<String> {
            None
        }
        fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
            Ok(Vec::new())
        }
        fn can_overwrite(&self) -> bool {
            true
        }
        fn write_bytes(&self, _: &[u8]) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "revoked"))
        }
    }

    fn sink(recorder: &RecordingSaveAs) -> PersistenceSink {
        PersistenceSink::new(Box::new(recorder.clone()))
    }

    #[test]
    fn overwrite_success_skips_the_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"old").unwrap();
        let src = FileSource::open(&path);

        let rec = RecordingSaveAs::default();
        let out = sink(&rec)
            .commit(b"new", SaveTarget::for_source(Some(&src as &dyn ImageSource)), "a-edited.png", SaveFormat::Png, SaveRequest::Save)
            .unwrap();
        assert_eq!(out, SaveOutcome::Overwritten { name: "a.png".into() });
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
        assert!(rec.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn uploads_always_go_through_save_as() {
        let upload = UploadedFile::new("b.png", vec![1, 2, 3]);
        let rec = RecordingSaveAs::default();
        let mut sink = sink(&rec);
        for request in [SaveRequest::Save, SaveRequest::SaveAs] {
            let out = sink
                .commit(b"x", SaveTarget::for_source(Some(&upload as &dyn ImageSource)), "b-edited.png", SaveFormat::Png, request)
                .unwrap();
            assert!(matches!(out, SaveOutcome::SavedAs { .. }));
        }
        assert_eq!(rec.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn failed_overwrite_recovers_through_save_as() {
        let rec = RecordingSaveAs::default();
        let out = sink(&rec)
            .commit(b"x", SaveTarget::Overwrite(&Broken), "c-edited.png", SaveFormat::Png, SaveRequest::Save)
            .unwrap();
        assert!(matches!(out, SaveOutcome::Recovered { ref write_error, .. } if write_error.contains("revoked")));

        let dismissing = RecordingSaveAs { dismiss: true, ..Default::default() };
        let mut dismissing = sink(&dismissing);
        let err = dismissing
            .commit(b"x", SaveTarget::Overwrite(&Broken), "c-edited.png", SaveFormat::Png, SaveRequest::Save)
            .unwrap_err();
        assert!(matches!(err, SaveError::Write(_)));
        assert!(!dismissing.is_busy());
    }

    #[test]
    fn failed_fallback_keeps_both_errors() {
        let mut sink = PersistenceSink::new(Box::new(FailingSaveAs));
        let err = sink
            .commit(b"x", SaveTarget::Overwrite(&Broken), "c-edited.png", SaveFormat::Png, SaveRequest::Save)
            .unwrap_err();
        let SaveError::FallbackFailed { write_error, fallback } = &err else {
            panic!("expected both errors, got {err:?}");
        };
        assert_eq!(write_error.kind(), std::io::ErrorKind::PermissionDenied);
        assert_eq!(fallback.kind(), std::io::ErrorKind::StorageFull);
        let message = err.to_string();
        assert!(message.contains("revoked") && message.contains("no space left"));
        assert!(!sink.is_busy());

        // A plain save-as failure still releases the flag
        let err = sink
            .commit(b"x", SaveTarget::NoHandle, "c.png", SaveFormat::Png, SaveRequest::SaveAs)
            .unwrap_err();
        assert!(matches!(err, SaveError::Io(_)));
        assert!(!sink.is_busy());
    }

    #[test]
    fn dismissed_save_as_is_not_an_error() {
        let rec = RecordingSaveAs { dismiss: true, ..Default::default() };
        let out = sink(&rec)
            .commit(b"x", SaveTarget::NoHandle, "d.png", SaveFormat::Png, SaveRequest::SaveAs)
            .unwrap();
        assert_eq!(out, SaveOutcome::Cancelled);
    }

    #[test]
    fn busy_flag_rejects_reentry_and_releases() {
        let rec = RecordingSaveAs::default();
        let mut sink = sink(&rec);
        let flag = sink.busy_flag();
        {
            let _held = flag.try_acquire().unwrap();
            let err = sink
                .commit(b"x", SaveTarget::NoHandle, "e.png", SaveFormat::Png, SaveRequest::SaveAs)
                .unwrap_err();
            assert!(matches!(err, SaveError::Busy));
        }
        assert!(!flag.is_busy());
        assert!(sink
            .commit(b"x", SaveTarget::NoHandle, "e.png", SaveFormat::Png, SaveRequest::SaveAs)
            .is_ok());
        assert!(!flag.is_busy());
    }

    #[test]
    fn downloads_never_clobber_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut dl = DownloadSaveAs::new(dir.path());
        let first = dl.save_as(b"1", "edited.png", SaveFormat::Png).unwrap().unwrap();
        let second = dl.save_as(b"2", "edited.png", SaveFormat::Png).unwrap().unwrap();
        assert_eq!(first.file_name().unwrap(), "edited.png");
        assert_eq!(second.file_name().unwrap(), "edited (1).png");
        assert_eq!(std::fs::read(first).unwrap(), b"1");
    }
}
