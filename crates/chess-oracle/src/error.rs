//! Oracle error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("invalid FEN '{0}'")]
    InvalidFen(String),

    #[error("unparseable move '{0}'")]
    BadMove(String),

    #[error("illegal move '{0}' in this position")]
    IllegalMove(String),
}
