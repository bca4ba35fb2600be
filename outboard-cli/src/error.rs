//! Error handling for the outboard CLI

use std::path::PathBuf;
use thiserror::Error;

/// Configuration and usage failures reported before or outside the viewer
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Input/Output error: {message}")]
    Io { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid value for {option}: {message}")]
    InvalidValue { option: String, message: String },

    #[error("Shared viewer error: {name} - {message}")]
    Share { name: String, message: String },

    #[error("Control command error: {message}")]
    Control { message: String },

    #[error("Producer error: {program} - {message}")]
    Producer { program: String, message: String },
}

impl CliError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn file_not_found(path: PathBuf) -> Self {
        Self::FileNotFound { path }
    }

    pub fn invalid_value<O: Into<String>, S: Into<String>>(option: O, message: S) -> Self {
        Self::InvalidValue {
            option: option.into(),
            message: message.into(),
        }
    }

    pub fn share<N: Into<String>, S: Into<String>>(name: N, message: S) -> Self {
        Self::Share {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn control<S: Into<String>>(message: S) -> Self {
        Self::Control { message: message.into() }
    }

    pub fn producer<P: Into<String>, S: Into<String>>(program: P, message: S) -> Self {
        Self::Producer {
            program: program.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io { message: err.to_string() }
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        Self::config(format!("TOML serialization error: {}", err))
    }
}

pub type CliResult<T> = Result<T, CliError>;

/// Render an error with hints for the user
pub fn format_error_with_suggestions(error: &CliError) -> String {
    let mut message = error.to_string();

    match error {
        CliError::FileNotFound { path } => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Check that the file path is correct: {}\n\
                 • Omit --input to read the plot stream from stdin",
                path.display()
            ));
        }

        CliError::InvalidValue { option, .. } => match option.as_str() {
            "interval" => message.push_str(
                "\n\nSuggestions:\n\
                 • Movie intervals are given in seconds between 0 and 60\n\
                 • Use fractions for sub-second frames, e.g. --interval 0.05",
            ),
            "timeout-hours" => message.push_str(
                "\n\nSuggestions:\n\
                 • The session timeout is given in hours between 0 and 8760\n\
                 • Use 0 to disable the timeout",
            ),
            "byte-order" => message.push_str(
                "\n\nSuggestions:\n\
                 • Valid byte orders are: little, big, native",
            ),
            _ => message.push_str(
                "\n\nSuggestions:\n\
                 • Run with --help to see accepted values",
            ),
        },

        CliError::Share { name, .. } => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Check that no stale socket remains for share name '{}'\n\
                 • Use a path containing '/' to place the socket explicitly",
                name
            ));
        }

        CliError::Producer { program, .. } => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Ensure {} is installed and in your PATH\n\
                 • Pass the full producer command line with --command",
                program
            ));
        }

        CliError::Config { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Check the configuration file syntax\n\
                 • Print a sample with: mpl_outboard config --example",
            );
        }

        _ => {}
    }

    message
}

pub fn print_error_and_exit(error: &CliError) -> ! {
    eprintln!("Error: {}", format_error_with_suggestions(error));
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CliError::config("test message");
        assert!(matches!(err, CliError::Config { .. }));
        assert_eq!(err.to_string(), "Configuration error: test message");
    }

    #[test]
    fn test_error_suggestions() {
        let err = CliError::file_not_found(PathBuf::from("plots.mpl"));
        let formatted = format_error_with_suggestions(&err);
        assert!(formatted.contains("Suggestions:"));
        assert!(formatted.contains("Check that the file path is correct"));

        let err = CliError::invalid_value("interval", "must be at most 60 seconds");
        assert!(format_error_with_suggestions(&err).contains("between 0 and 60"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err: CliError = io_err.into();
        assert!(matches!(cli_err, CliError::Io { .. }));
    }
}
