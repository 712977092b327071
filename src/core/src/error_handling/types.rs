use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    MissingProgram(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::MissingProgram(e) => write!(f, "Collaborator configuration error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum StorageError {
    CreateDirFailed(PathBuf, std::io::Error),
    WriteFailed(PathBuf, std::io::Error),
    CopyFailed(PathBuf, std::io::Error),
    ReadFailed(PathBuf, std::io::Error),
    RemoveFailed(PathBuf, std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::CreateDirFailed(p, e) => {
                write!(f, "Failed to create directory {}: {}", p.display(), e)
            }
            StorageError::WriteFailed(p, e) => write!(f, "Failed to write {}: {}", p.display(), e),
            StorageError::CopyFailed(p, e) => write!(f, "Failed to copy {}: {}", p.display(), e),
            StorageError::ReadFailed(p, e) => write!(f, "Failed to read {}: {}", p.display(), e),
            StorageError::RemoveFailed(p, e) => {
                write!(f, "Failed to remove {}: {}", p.display(), e)
            }
        }
    }
}

impl std::error::Error for StorageError {}

/// Failures of a single synthesis run. All of them short-circuit artifact
/// collection and are reported to the caller as a processing failure.
#[derive(Debug)]
pub enum SynthesisError {
    SpawnFailed(String),
    NonZeroExit(Option<i32>),
    TimedOut(u64),
    Cancelled,
    PlaceholderFailed(String),
    IoError(std::io::Error),
}

impl fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisError::SpawnFailed(e) => write!(f, "failed to start collaborator: {}", e),
            SynthesisError::NonZeroExit(Some(code)) => {
                write!(f, "collaborator exited with status {}", code)
            }
            SynthesisError::NonZeroExit(None) => {
                write!(f, "collaborator terminated by signal")
            }
            SynthesisError::TimedOut(secs) => {
                write!(f, "collaborator timed out after {}s", secs)
            }
            SynthesisError::Cancelled => write!(f, "collaborator run was cancelled"),
            SynthesisError::PlaceholderFailed(e) => {
                write!(f, "placeholder generation failed: {}", e)
            }
            SynthesisError::IoError(e) => write!(f, "collaborator IO error: {}", e),
        }
    }
}

impl std::error::Error for SynthesisError {}

impl From<std::io::Error> for SynthesisError {
    fn from(err: std::io::Error) -> Self {
        SynthesisError::IoError(err)
    }
}

/// Faults of the request handler that are not reported as a structured
/// processing failure.
#[derive(Debug)]
pub enum TryOnError {
    StorageError(StorageError),
    InvalidParameter(String),
}

impl fmt::Display for TryOnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryOnError::StorageError(e) => write!(f, "Storage error: {}", e),
            TryOnError::InvalidParameter(e) => write!(f, "Invalid parameter: {}", e),
        }
    }
}

impl std::error::Error for TryOnError {}

impl From<StorageError> for TryOnError {
    fn from(err: StorageError) -> Self {
        TryOnError::StorageError(err)
    }
}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
    MissingField(String),
    InvalidField(String),
    MultipartError(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Failed to bind web server: {}", e),
            WebError::MissingField(e) => write!(f, "Missing form field: {}", e),
            WebError::InvalidField(e) => write!(f, "Invalid form field: {}", e),
            WebError::MultipartError(e) => write!(f, "Malformed multipart body: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    StorageError(StorageError),
    WebError(WebError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::StorageError(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        ControllerError::WebError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesis_error_messages_are_human_readable() {
        assert_eq!(
            SynthesisError::NonZeroExit(Some(3)).to_string(),
            "collaborator exited with status 3"
        );
        assert_eq!(
            SynthesisError::TimedOut(5).to_string(),
            "collaborator timed out after 5s"
        );
    }

    #[test]
    fn storage_error_wraps_into_tryon_error() {
        let err: TryOnError = StorageError::WriteFailed(
            PathBuf::from("/tmp/x"),
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        )
        .into();
        assert!(err.to_string().contains("/tmp/x"));
        assert!(err.to_string().contains("disk full"));
    }
}
