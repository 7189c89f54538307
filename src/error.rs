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

/// The generic Error type, which covers every failure the library can report.
///
/// The variants fall into two groups. The first group describes problems with the analysed file
/// itself and is produced while an assembly is being loaded. The second group is the taxonomy
/// the analysis operations report to their callers: misuse of an operation (bad arguments, no
/// assembly loaded) or a request the analyzer cannot serve.
///
/// Failing to *find* something is usually not an error. Resolution and search report an empty
/// result instead, so that callers can tell "the target does not exist" apart from "the
/// request was broken". [`Error::NotFound`] is only used where an operation needs a target to
/// work on at all, e.g. finding the overrides of a method identifier that resolves to nothing.
///
/// # Error Categories
///
/// ## File Parsing Errors
/// - [`Error::Malformed`] - Corrupted or invalid file structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond file boundaries
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - PE parsing errors from goblin crate
///
/// ## Analysis Errors
/// - [`Error::InvalidArgument`] - Malformed identifier, bad pagination parameters
/// - [`Error::InvalidOperation`] - Query issued while no assembly is loaded
/// - [`Error::NotFound`] - A required target could not be resolved
/// - [`Error::NotSupported`] - The requested mode or format is not available
///
/// # Examples
///
/// ```rust,no_run
/// use dotlens::{Analyzer, Error};
///
/// let analyzer = Analyzer::new();
/// match analyzer.search_types(&Default::default()) {
///     Err(Error::InvalidOperation(message)) => eprintln!("nothing loaded: {message}"),
///     Err(e) => eprintln!("other error: {e}"),
///     Ok(page) => println!("{} types", page.items.len()),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// A caller supplied a structurally invalid argument.
    ///
    /// Covers malformed identifiers handed to [`crate::identity::MemberId::parse`], zero or
    /// unparsable pagination parameters, and unsupported filter combinations.
    #[error("Invalid argument - {0}")]
    InvalidArgument(String),

    /// The operation is not valid in the current state.
    ///
    /// Every query issued while no assembly is loaded fails with this error.
    #[error("Invalid operation - {0}")]
    InvalidOperation(String),

    /// A target that the operation requires could not be resolved.
    #[error("Not found - {0}")]
    NotFound(String),

    /// The requested analysis mode or output format is not available.
    #[error("Not supported - {0}")]
    NotSupported(String),
}

impl Error {
    /// Shorthand for the error returned by queries issued without a loaded assembly.
    pub(crate) fn not_loaded() -> Self {
        Error::InvalidOperation("no assembly is loaded".to_string())
    }
}
