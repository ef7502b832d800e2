//! On-disk layout shared by the pipeline: the design (scratch) directory and the
//! render directory holding uploads and produced artifacts.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

const DESIGN_EXTENSION: &str = "scad";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid stored reference `{0}`")]
    InvalidReference(String),
}

/// Filesystem roots used by jobs. Each job only touches names derived from its id
/// inside these roots, plus the stored inputs it references.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    design_dir: PathBuf,
    render_dir: PathBuf,
}

impl StorageLayout {
    /// Initialise the layout, creating both directories if necessary.
    pub fn new(design_dir: PathBuf, render_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&design_dir)?;
        std::fs::create_dir_all(&render_dir)?;
        Ok(Self {
            design_dir,
            render_dir,
        })
    }

    pub fn design_dir(&self) -> &Path {
        &self.design_dir
    }

    pub fn render_dir(&self) -> &Path {
        &self.render_dir
    }

    /// Path of a job-scoped scratch file in the design directory.
    pub fn scratch_path(&self, filename: &str) -> PathBuf {
        self.design_dir.join(filename)
    }

    /// Path of a produced artifact in the render directory.
    pub fn render_path(&self, filename: &str) -> PathBuf {
        self.render_dir.join(filename)
    }

    /// Resolve a stored design reference to `<design_dir>/<ref>.scad`.
    pub fn stored_design_path(&self, reference: &str) -> Result<PathBuf, StorageError> {
        let has_extension = Path::new(reference)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(DESIGN_EXTENSION));
        let relative = if has_extension {
            reference.to_string()
        } else {
            format!("{reference}.{DESIGN_EXTENSION}")
        };
        resolve(&self.design_dir, &relative)
    }

    /// Resolve an uploaded mesh reference to `<render_dir>/<ref>`.
    pub fn stored_mesh_path(&self, reference: &str) -> Result<PathBuf, StorageError> {
        resolve(&self.render_dir, reference)
    }
}

/// Join a caller-supplied relative reference onto a root, refusing anything that
/// could escape it.
fn resolve(root: &Path, reference: &str) -> Result<PathBuf, StorageError> {
    let relative = Path::new(reference);
    if reference.trim().is_empty()
        || relative.is_absolute()
        || relative.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::Prefix(_) | Component::RootDir
            )
        })
    {
        return Err(StorageError::InvalidReference(reference.to_string()));
    }

    Ok(root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(dir: &TempDir) -> StorageLayout {
        StorageLayout::new(dir.path().join("designs"), dir.path().join("renders"))
            .expect("layout")
    }

    #[test]
    fn creates_both_roots() {
        let dir = TempDir::new().expect("temp dir");
        let layout = layout(&dir);
        assert!(layout.design_dir().is_dir());
        assert!(layout.render_dir().is_dir());
    }

    #[test]
    fn design_references_gain_the_source_extension() {
        let dir = TempDir::new().expect("temp dir");
        let layout = layout(&dir);

        let path = layout.stored_design_path("42").expect("path");
        assert_eq!(path, dir.path().join("designs").join("42.scad"));

        let path = layout.stored_design_path("bracket.scad").expect("path");
        assert_eq!(path, dir.path().join("designs").join("bracket.scad"));
    }

    #[test]
    fn mesh_references_resolve_inside_render_dir() {
        let dir = TempDir::new().expect("temp dir");
        let layout = layout(&dir);
        let path = layout.stored_mesh_path("upload-1.stl").expect("path");
        assert_eq!(path, dir.path().join("renders").join("upload-1.stl"));
    }

    #[test]
    fn escaping_references_are_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let layout = layout(&dir);

        for reference in ["../secret.stl", "/etc/passwd", "", "a/../../b"] {
            assert!(
                matches!(
                    layout.stored_mesh_path(reference),
                    Err(StorageError::InvalidReference(_))
                ),
                "reference `{reference}` should be rejected"
            );
        }
    }
}
