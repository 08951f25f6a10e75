use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconError {
    /// Malformed or invalidated tree structure. Aborts the current tree.
    Structure(String),

    /// A gene leaf whose species label has no match in the species tree.
    Mapping { leaf: String },

    /// The enumerator was invoked on a non-polytomy. This indicates a bug
    /// in the calling code, not bad user input.
    DegenerateInput(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconError::Structure(msg) => write!(f, "Tree structure error: {}", msg),
            ReconError::Mapping { leaf } => {
                write!(f, "Gene leaf \"{}\" has no match in the species tree", leaf)
            }
            ReconError::DegenerateInput(msg) => {
                write!(f, "Degenerate enumerator input: {}", msg)
            }
        }
    }
}

impl std::error::Error for ReconError {}
