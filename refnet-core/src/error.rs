use thiserror::Error;

pub type Result<T> = std::result::Result<T, NnError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NnError {
    #[error("Shape mismatch in {op}: expected {expected}, got {got}")]
    ShapeMismatch {
        op: &'static str,
        expected: String,
        got: String,
    },

    #[error("{layer}: backward called before forward")]
    State { layer: &'static str },
}

impl NnError {
    pub(crate) fn shape(op: &'static str, expected: impl Into<String>, got: &[usize]) -> Self {
        NnError::ShapeMismatch {
            op,
            expected: expected.into(),
            got: format!("{:?}", got),
        }
    }
}
