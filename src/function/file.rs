use super::Function;
use serde::Deserialize;
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error as ThisError;

/// A function spec on disk. `codeFile`, when set, replaces `code` with the
/// contents of that file, resolved relative to the spec file.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FunctionFile {
    #[serde(flatten)]
    function: Function,
    #[serde(default)]
    code_file: Option<PathBuf>,
}

#[derive(ThisError, Debug)]
pub enum FunctionFileError {
    #[error("Failed to read {path:?}: {error}")]
    Read {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    #[error("Failed to parse function spec: {0}")]
    Parse(#[source] serde_yaml::Error),
}

async fn read(path: &Path) -> Result<String, FunctionFileError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|error| FunctionFileError::Read {
            path: path.to_path_buf(),
            error,
        })
}

/// Reads a YAML or JSON function spec and applies defaults.
pub async fn read_function_file(path: &Path) -> Result<Function, FunctionFileError> {
    let contents = read(path).await?;
    let file: FunctionFile = serde_yaml::from_str(&contents).map_err(FunctionFileError::Parse)?;

    let mut function = file.function;
    if let Some(code_file) = file.code_file {
        let code_path = match path.parent() {
            Some(parent) if code_file.is_relative() => parent.join(code_file),
            _ => code_file,
        };
        function.code = read(&code_path).await?;
    }

    Ok(function.with_defaults())
}
