use std::fmt;

/// Errors a client can reasonably expect to handle. Everything else
/// (corrupt headers, allocation failure, reentrant collection) goes
/// through [`fatal_error`] instead and never returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcError {
    /// A walked slot pointed at a block that had already been reclaimed.
    DanglingReference { label: String },
}

impl fmt::Display for GcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcError::DanglingReference { label } => {
                write!(f, "dangling reference encountered at `{}`", label)
            }
        }
    }
}

impl std::error::Error for GcError {}

pub type GcResult<T> = Result<T, GcError>;

/// Prints a diagnostic and aborts the process. Used for corruption that
/// indicates a bug in the collector itself or memory stomped by the
/// client, not something a caller can recover from.
#[cold]
pub fn fatal_error(msg: impl fmt::Display) -> ! {
    eprintln!("driftgc: fatal: {}", msg);
    std::process::abort();
}
