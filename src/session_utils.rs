use crate::models::{LogFile, SessionIdentity};
use std::path::{Component, Path, PathBuf};

const PROJECTS_DIR: &str = "projects";
const UNKNOWN_PROJECT: &str = "unknown";

/// Handles session-related utilities: turning a log file location into the
/// (project path, session id) pair reports are grouped by.
pub struct SessionUtils;

impl SessionUtils {
    /// Derive the session identity from a log file path.
    ///
    /// Layouts understood, relative to the last `projects` directory:
    /// - `projects/<project...>/<session>/<file>.jsonl` - session directory
    /// - `projects/<project>/<session>.jsonl` - session named by the file
    pub fn identity_from_path(path: &Path) -> SessionIdentity {
        let parts: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        let after_projects = match parts.iter().rposition(|p| p == PROJECTS_DIR) {
            Some(pos) => &parts[pos + 1..],
            None => &parts[parts.len().saturating_sub(2)..],
        };

        match after_projects {
            [project, file] => SessionIdentity {
                project_path: project.clone(),
                session_id: Self::file_stem(file),
            },
            [project @ .., session, _file] if !project.is_empty() => SessionIdentity {
                project_path: project.join("/"),
                session_id: session.clone(),
            },
            [file] => SessionIdentity {
                project_path: UNKNOWN_PROJECT.to_string(),
                session_id: Self::file_stem(file),
            },
            _ => SessionIdentity {
                project_path: UNKNOWN_PROJECT.to_string(),
                session_id: UNKNOWN_PROJECT.to_string(),
            },
        }
    }

    pub fn log_file(path: PathBuf) -> LogFile {
        let session = Self::identity_from_path(&path);
        LogFile { path, session }
    }

    fn file_stem(file: &str) -> String {
        Path::new(file)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.to_string())
    }
}
