use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("unsupported config format: .{extension}")]
    UnsupportedFormat { extension: String },
}

impl Error {
    pub(crate) fn parse(path: &std::path::Path, error: impl std::fmt::Display) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
