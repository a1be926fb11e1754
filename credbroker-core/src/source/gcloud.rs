//! gcloud SDK token source.

use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::TokenStrategy;
use crate::error::HelperError;

const GCLOUD_PROGRAM: &str = "gcloud";
const GCLOUD_ARGS: &[&str] = &["auth", "print-access-token"];

/// Shells out to `gcloud auth print-access-token`.
///
/// The child is killed if the returned future is dropped, so a caller-side
/// timeout does not leak processes.
#[derive(Debug, Clone)]
pub struct GcloudSdkToken {
    program: String,
    args: Vec<String>,
    search_path: Option<OsString>,
}

impl GcloudSdkToken {
    pub fn new() -> Self {
        Self::with_command(GCLOUD_PROGRAM, GCLOUD_ARGS.iter().copied())
    }

    /// Use a different program and arguments, e.g. a wrapper script.
    pub fn with_command<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            search_path: None,
        }
    }

    /// Search these directories instead of the process `PATH`.
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Default for GcloudSdkToken {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStrategy for GcloudSdkToken {
    async fn access_token(&self) -> Result<String, HelperError> {
        let search_path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"));
        let program = find_program(&self.program, search_path.as_deref()).ok_or_else(|| {
            HelperError::GcloudNotFound {
                program: self.program.clone(),
            }
        })?;

        let command = self.command_line();
        tracing::debug!("Running {} ({:?})", command, program);

        let output = Command::new(&program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| HelperError::CommandFailed {
                command: command.clone(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = match stderr.trim() {
                "" => output.status.to_string(),
                msg => format!("{}: {}", output.status, msg),
            };
            return Err(HelperError::CommandFailed { command, detail });
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(HelperError::EmptyToken { command });
        }

        Ok(token)
    }
}

/// Resolve `program` the way a shell would: paths are checked directly,
/// bare names are searched for in `search_path`.
///
/// Only executable files match, so a stray non-executable `gcloud` early in
/// the search path does not shadow the real one.
fn find_program(program: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return executable_candidates(as_path).find(|p| is_executable(p));
    }

    std::env::split_paths(search_path?)
        .flat_map(|dir| executable_candidates(&dir.join(program)).collect::<Vec<_>>())
        .find(|p| is_executable(p))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(windows)]
fn executable_candidates(base: &Path) -> impl Iterator<Item = PathBuf> {
    let exts = std::env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
    let mut candidates = vec![base.to_path_buf()];
    for ext in exts.split(';').filter(|e| !e.is_empty()) {
        let mut name = base.as_os_str().to_os_string();
        name.push(ext);
        candidates.push(PathBuf::from(name));
    }
    candidates.into_iter()
}

#[cfg(not(windows))]
fn executable_candidates(base: &Path) -> impl Iterator<Item = PathBuf> {
    std::iter::once(base.to_path_buf())
}
