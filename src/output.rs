//! Output naming and staged, all-or-nothing file creation.
//!
//! Exports write into a hidden staging file next to the final destination.
//! Only a successful export commits it, with a rename that refuses to
//! overwrite anything; dropping an uncommitted [`StagedOutput`] deletes the
//! staging file, so a failed or cancelled job leaves nothing behind.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tempfile::{Builder, NamedTempFile};

use crate::error::ClipError;

/// Highest collision suffix tried before giving up.
const MAX_COLLISION_SUFFIX: u32 = 10_000;

/// Rename attempts before a commit gives up on losing races.
const MAX_COMMIT_ATTEMPTS: u32 = 8;

/// Builds timestamped output file names.
///
/// # Example
///
/// ```
/// use chrono::{Local, TimeZone};
/// use clipcast::output::OutputNamer;
///
/// let at = Local.with_ymd_and_hms(2026, 10, 18, 14, 3, 22).unwrap();
/// let namer = OutputNamer::new("Clip", "gif");
/// assert_eq!(namer.base_name(&at), "Clip 2026-10-18 at 14.03.22.gif");
/// ```
#[derive(Debug, Clone)]
pub struct OutputNamer {
    stem: String,
    extension: String,
}

impl OutputNamer {
    /// Namer producing `"<stem> <date> at <time>.<extension>"`.
    pub fn new(stem: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            stem: stem.into(),
            extension: extension.into(),
        }
    }

    /// File name for `at`, without any collision suffix.
    pub fn base_name(&self, at: &DateTime<Local>) -> String {
        self.name_with_suffix(at, 1)
    }

    fn name_with_suffix(&self, at: &DateTime<Local>, suffix: u32) -> String {
        let stamp = at.format("%Y-%m-%d at %H.%M.%S");
        if suffix <= 1 {
            format!("{} {stamp}.{}", self.stem, self.extension)
        } else {
            format!("{} {stamp} ({suffix}).{}", self.stem, self.extension)
        }
    }

    /// First free path in `directory` for `at`: the base name, then
    /// `" (2)"`, `" (3)"`, and so on.
    ///
    /// # Errors
    ///
    /// [`ClipError::ExportFailed`] if every suffix is taken.
    pub fn available_path(&self, directory: &Path, at: &DateTime<Local>) -> Result<PathBuf, ClipError> {
        for suffix in 1..=MAX_COLLISION_SUFFIX {
            let candidate = directory.join(self.name_with_suffix(at, suffix));
            if !candidate.exists() {
                if suffix > 1 {
                    log::warn!("Output name taken, using {}", candidate.display());
                }
                return Ok(candidate);
            }
        }
        Err(ClipError::ExportFailed(format!(
            "no free output name in {}",
            directory.display()
        )))
    }
}

/// Create `directory` and its parents if missing.
///
/// # Errors
///
/// [`ClipError::DirectoryCreationFailed`] if it cannot be created or
/// exists but is not a directory.
pub fn ensure_directory(directory: &Path) -> Result<(), ClipError> {
    if directory.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(directory).map_err(|source| ClipError::DirectoryCreationFailed {
        path: directory.to_path_buf(),
        source,
    })?;
    log::debug!("Created output directory {}", directory.display());
    Ok(())
}

/// A hidden staging file that becomes the export's output on commit.
#[derive(Debug)]
pub struct StagedOutput {
    file: NamedTempFile,
    directory: PathBuf,
    namer: OutputNamer,
}

impl StagedOutput {
    /// Create a staging file in `directory`, which must already exist.
    ///
    /// # Errors
    ///
    /// [`ClipError::CannotCreateWriter`] if the file cannot be created.
    pub fn create(directory: &Path, namer: OutputNamer) -> Result<Self, ClipError> {
        let suffix = format!(".{}", namer.extension);
        let file = Builder::new()
            .prefix(".clipcast-")
            .suffix(&suffix)
            .tempfile_in(directory)
            .map_err(|error| {
                ClipError::CannotCreateWriter(format!(
                    "cannot create staging file in {}: {error}",
                    directory.display()
                ))
            })?;
        log::debug!("Staging output at {}", file.path().display());
        Ok(Self {
            file,
            directory: directory.to_path_buf(),
            namer,
        })
    }

    /// Path of the staging file, for writers that open by path.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// The open staging file, for writers that stream into a handle.
    pub fn as_file_mut(&mut self) -> &mut File {
        self.file.as_file_mut()
    }

    /// Move the staging file to a fresh timestamped name and return that
    /// path.
    ///
    /// Existing files are never replaced. If another job claims the chosen
    /// name between the check and the rename, a new name is picked.
    ///
    /// # Errors
    ///
    /// [`ClipError::CannotFinalize`] if the rename fails for any other
    /// reason. The staging file is deleted in that case.
    pub fn commit(self) -> Result<PathBuf, ClipError> {
        self.commit_at(Local::now())
    }

    pub(crate) fn commit_at(self, at: DateTime<Local>) -> Result<PathBuf, ClipError> {
        let Self {
            mut file,
            directory,
            namer,
        } = self;

        file.as_file_mut()
            .sync_all()
            .map_err(|error| ClipError::CannotFinalize(format!("cannot sync output: {error}")))?;

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let destination = namer.available_path(&directory, &at)?;
            match file.persist_noclobber(&destination) {
                Ok(_) => {
                    log::info!("Wrote {}", destination.display());
                    return Ok(destination);
                }
                Err(error) if error.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    log::warn!(
                        "{} was claimed during commit (attempt {attempt}), renaming",
                        destination.display()
                    );
                    file = error.file;
                }
                Err(error) => {
                    return Err(ClipError::CannotFinalize(format!(
                        "cannot move output to {}: {}",
                        destination.display(),
                        error.error
                    )));
                }
            }
        }
        Err(ClipError::CannotFinalize(
            "output name kept colliding with concurrent exports".to_string(),
        ))
    }
}
