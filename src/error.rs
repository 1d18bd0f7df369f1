use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! synthesis_error {
    ($property:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::Synthesis {
            property: $property.to_string(),
            message: format!($fmt $(, $arg)*),
        }
    };
}

macro_rules! resolution_error {
    ($property:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::Resolution {
            property: $property.to_string(),
            message: format!($fmt $(, $arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into two groups. The low-level format errors are produced while
/// reading or writing PE images, metadata streams and Portable PDBs. The weaving errors
/// describe which phase of a run failed and are what callers usually match on.
///
/// # Error Categories
///
/// ## Weaving Errors
/// - [`Error::Load`] - The module or its symbols could not be read
/// - [`Error::Resolution`] - The equality comparer for a property could not be resolved
/// - [`Error::Synthesis`] - The new setter body could not be built for a property
/// - [`Error::Write`] - The transformed module could not be persisted
///
/// ## Format Errors
/// - [`Error::InvalidOffset`] - Invalid file offset or RVA during parsing
/// - [`Error::Malformed`] - Corrupted or invalid file structure
/// - [`Error::OutOfBounds`] - Attempted to read or write beyond a buffer
/// - [`Error::NotSupported`] - Unsupported file format or feature
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - PE parsing errors from the goblin crate
///
/// # Examples
///
/// ```rust,no_run
/// use dotweave::{Error, Weaver, WeaverConfig};
/// use std::path::Path;
///
/// let weaver = Weaver::new(WeaverConfig::default());
/// match weaver.weave_file(Path::new("ViewModels.dll")) {
///     Ok(report) => println!("woven {} properties", report.woven.len()),
///     Err(Error::Synthesis { property, message }) => eprintln!("{property}: {message}"),
///     Err(e) => eprintln!("weaving failed: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // Weaving errors
    /// The module, or its sidecar symbol file, could not be loaded.
    ///
    /// Wraps the underlying format or I/O error together with the path that was
    /// being read. In-memory images report `<memory>` as their path.
    #[error("Failed to load '{path}': {source}")]
    Load {
        /// The path of the image or symbol file
        path: String,
        /// The error which caused the load to fail
        #[source]
        source: Box<Error>,
    },

    /// The equality comparer requested for a property could not be resolved.
    ///
    /// Raised when an explicit comparer type is not declared in the module, when it lacks
    /// the `get_Default` accessor or a two-parameter `Equals`, or when the default
    /// comparer cannot be referenced because no core library scope exists.
    #[error("Failed to resolve comparer for '{property}': {message}")]
    Resolution {
        /// The `Type::Property` the comparer was resolved for
        property: String,
        /// What was missing
        message: String,
    },

    /// The notifying setter body could not be synthesized for a property.
    #[error("Failed to weave '{property}': {message}")]
    Synthesis {
        /// The `Type::Property` that was being transformed
        property: String,
        /// What went wrong
        message: String,
    },

    /// The transformed module or its symbols could not be written.
    ///
    /// A failed write may leave the destination in an undefined state.
    #[error("Failed to write '{path}': {source}")]
    Write {
        /// The destination path
        path: String,
        /// The error which caused the write to fail
        #[source]
        source: Box<Error>,
    },

    // File parsing Errors
    /// Encountered an invalid offset while parsing file structures.
    ///
    /// This error occurs when an RVA or file offset does not map into any section
    /// of the image.
    #[error("Could not retrieve a valid offset!")]
    InvalidOffset,

    /// The file is damaged and could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing or writing data.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// This file type is not supported.
    ///
    /// Indicates that the input is not a .NET PE image, that the symbols are not a
    /// Portable PDB, or that the image uses a metadata layout this library does not rewrite.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Errors from the goblin crate while parsing the PE container.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),
}

/// Coarse classification of an [`Error`], mirroring the phases of a weaving run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reading the module or its symbols failed
    Load,
    /// Comparer resolution failed
    Resolution,
    /// Body synthesis failed
    Synthesis,
    /// Persisting the result failed
    Write,
    /// A low-level format error that was not wrapped into one of the phases above
    Format,
}

impl Error {
    /// Returns the phase this error belongs to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Load { .. } => ErrorKind::Load,
            Error::Resolution { .. } => ErrorKind::Resolution,
            Error::Synthesis { .. } => ErrorKind::Synthesis,
            Error::Write { .. } => ErrorKind::Write,
            _ => ErrorKind::Format,
        }
    }

    /// Wraps this error as a load failure for `path`. Already classified weaving errors
    /// are passed through unchanged.
    pub(crate) fn into_load(self, path: &str) -> Error {
        match self.kind() {
            ErrorKind::Format => Error::Load {
                path: path.to_string(),
                source: Box::new(self),
            },
            _ => self,
        }
    }

    /// Wraps this error as a write failure for `path`. Already classified weaving errors
    /// are passed through unchanged.
    pub(crate) fn into_write(self, path: &str) -> Error {
        match self.kind() {
            ErrorKind::Format => Error::Write {
                path: path.to_string(),
                source: Box::new(self),
            },
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_classifies_phases() {
        let err = Error::Synthesis {
            property: "Model::X".into(),
            message: "no setter".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Synthesis);
        assert_eq!(err.to_string(), "Failed to weave 'Model::X': no setter");

        let err = malformed_error!("bad {}", 1);
        assert_eq!(err.kind(), ErrorKind::Format);
    }

    #[test]
    fn format_errors_are_wrapped_once() {
        let err = Error::OutOfBounds.into_load("a.dll");
        assert_eq!(err.kind(), ErrorKind::Load);
        assert!(err.to_string().contains("a.dll"));

        let err = err.into_write("b.dll");
        assert_eq!(err.kind(), ErrorKind::Load);
    }
}
