use std::fmt;
use std::io;

use crate::grammars::CompileError;

pub(crate) type AmbraResult<T> = Result<T, Error>;

/// Errors that can occur during ambra usage
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred when reading a grammar file
    Io(io::Error),

    /// JSON parsing failed when loading a grammar.
    Json(serde_json::Error),

    /// A grammar was not found in the registry.
    /// Only happens when explicitly asking to scan something with a grammar we can't find.
    /// Auto-detection silently skips unknown candidates.
    GrammarNotFound(String),

    /// The grammar definition is invalid: this is raised the first time the grammar is compiled.
    #[allow(missing_docs)]
    Compile { grammar: String, error: CompileError },

    /// A grammar already used for scanning was registered again under the same name.
    ReplacingCompiledGrammar(String),

    /// The `illegal` pattern of the active mode matched in a strict scan.
    #[allow(missing_docs)]
    IllegalLexeme {
        language: String,
        lexeme: String,
        offset: usize,
        mode: String,
    },

    /// The scan went through too many steps without advancing in the input.
    #[allow(missing_docs)]
    NoProgress {
        language: String,
        iterations: usize,
        offset: usize,
    },

    /// A zero-width begin was immediately followed by a zero-width end at the same offset.
    /// Only raised when the registry is not in safe mode.
    #[allow(missing_docs)]
    ZeroWidthLoop { language: String, offset: usize },

    /// Sublanguages were nested deeper than the configured maximum.
    #[allow(missing_docs)]
    RecursionLimit { language: String, depth: usize },

    /// More modes were open at once than the configured maximum.
    #[allow(missing_docs)]
    NestingLimit {
        language: String,
        depth: usize,
        offset: usize,
    },

    /// A regex compilation error occurred during tokenization.
    /// Every single pattern is validated when compiling a grammar but the combined matchers
    /// are only built when first needed.
    TokenizeRegex(String),
}

impl Error {
    /// Whether this error comes from the `illegal` pattern of a grammar.
    /// Auto-detection relies on those to reject candidates.
    pub fn is_illegal(&self) -> bool {
        matches!(self, Error::IllegalLexeme { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "JSON parsing error: {}", err),
            Error::GrammarNotFound(name) => write!(f, "grammar '{}' not found", name),
            Error::Compile { grammar, error } => {
                write!(f, "invalid grammar '{}': {}", grammar, error)
            }
            Error::ReplacingCompiledGrammar(name) => {
                write!(f, "grammar '{}' is already in use and cannot be replaced", name)
            }
            Error::IllegalLexeme {
                language,
                lexeme,
                offset,
                mode,
            } => write!(
                f,
                "illegal lexeme {:?} at offset {} for mode '{}' of '{}'",
                lexeme, offset, mode, language
            ),
            Error::NoProgress {
                language,
                iterations,
                offset,
            } => write!(
                f,
                "potential infinite loop in '{}': {} iterations and stuck at offset {}",
                language, iterations, offset
            ),
            Error::ZeroWidthLoop { language, offset } => write!(
                f,
                "zero-width begin and end matches at offset {} in '{}'",
                offset, language
            ),
            Error::RecursionLimit { language, depth } => write!(
                f,
                "sublanguage '{}' nested more than {} levels deep",
                language, depth
            ),
            Error::NestingLimit {
                language,
                depth,
                offset,
            } => write!(
                f,
                "more than {} nested modes at offset {} in '{}'",
                depth, offset, language
            ),
            Error::TokenizeRegex(message) => write!(f, "regex compilation error: {}", message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Compile { error, .. } => Some(error),
            Error::GrammarNotFound(_)
            | Error::ReplacingCompiledGrammar(_)
            | Error::IllegalLexeme { .. }
            | Error::NoProgress { .. }
            | Error::ZeroWidthLoop { .. }
            | Error::RecursionLimit { .. }
            | Error::NestingLimit { .. }
            | Error::TokenizeRegex(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
