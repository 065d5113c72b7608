use classify_common::error::CommonError;

use crate::category::CategoryId;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("candidate set is empty")]
    EmptyCandidates,

    #[error("candidate {code} does not share the parent and level of the other candidates")]
    NotSiblings { code: String },

    #[error("unknown category: {0}")]
    UnknownCategory(CategoryId),

    #[error("classifier selected {code}, which is not among the candidates")]
    SelectionOutsideCandidates { code: String },

    #[error("load error at line {line}: {message}")]
    Load { line: usize, message: String },

    #[error("document error: {0}")]
    Document(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
