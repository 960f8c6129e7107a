use std::io;
use std::path::{Path, PathBuf};

/// The external documents a dashboard can draw on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Free-form markdown progress report
    Report,
    /// Structured per-stage status
    StatusDocument,
    /// Project configuration
    Config,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::Report, ArtifactKind::StatusDocument, ArtifactKind::Config];

    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Report => "PROGRESS.md",
            ArtifactKind::StatusDocument => "status.json",
            ArtifactKind::Config => "config.json",
        }
    }
}

/// Read-only access to per-project artifacts.
///
/// `Ok(None)` means the source does not exist, which is not an error.
pub trait ArtifactStore: Send + Sync {
    fn read(&self, project_id: &str, kind: ArtifactKind) -> io::Result<Option<String>>;
}

/// Artifacts laid out as `<root>/<project_id>/<file>`
#[derive(Debug, Clone)]
pub struct DirArtifactStore {
    root: PathBuf,
}

impl DirArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, project_id: &str, kind: ArtifactKind) -> PathBuf {
        self.root.join(project_id).join(kind.file_name())
    }
}

impl ArtifactStore for DirArtifactStore {
    fn read(&self, project_id: &str, kind: ArtifactKind) -> io::Result<Option<String>> {
        if project_id.is_empty()
            || project_id == "."
            || project_id == ".."
            || project_id.contains(|c: char| c == '/' || c == '\\')
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("project id '{}' cannot be used as a directory name", project_id),
            ));
        }
        match std::fs::read_to_string(self.path_for(project_id, kind)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Artifact source with nothing in it
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArtifacts;

impl ArtifactStore for NoArtifacts {
    fn read(&self, _project_id: &str, _kind: ArtifactKind) -> io::Result<Option<String>> {
        Ok(None)
    }
}
