//! Dry-run preview for `gymgate proxy render` and `gymgate proxy diff`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use gymgate_core::OriginRegistry;
use gymgate_renderer::Renderer;

use crate::{error::io_err, SyncError};

/// Rendered config compared with the file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDiff {
    pub path: PathBuf,
    /// `None` when the on-disk file already matches.
    pub unified_diff: Option<String>,
}

impl ConfigDiff {
    pub fn is_clean(&self) -> bool {
        self.unified_diff.is_none()
    }
}

/// Render the config the reconciler would write for the current registry.
pub fn render_current<R>(registry: &R, renderer: &Renderer) -> Result<String, SyncError>
where
    R: OriginRegistry + ?Sized,
{
    let origins = registry.list_origins()?;
    Ok(renderer.render(&origins)?)
}

/// Diff the would-be config against the current file. No files are written.
pub fn diff_config<R>(registry: &R, renderer: &Renderer) -> Result<ConfigDiff, SyncError>
where
    R: OriginRegistry + ?Sized,
{
    let rendered = render_current(registry, renderer)?;
    let path = renderer.output_path().to_path_buf();
    let existing = read_existing_or_empty(&path)?;
    if existing == rendered {
        return Ok(ConfigDiff {
            path,
            unified_diff: None,
        });
    }

    let old_header = format!("a/{}", path.display());
    let new_header = format!("b/{}", path.display());
    let unified = TextDiff::from_lines(&existing, &rendered)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string();

    Ok(ConfigDiff {
        path,
        unified_diff: Some(unified),
    })
}

fn read_existing_or_empty(path: &Path) -> Result<String, SyncError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content.replace("\r\n", "\n")),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(io_err(path, err)),
    }
}
