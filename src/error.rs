use thiserror::Error;

use crate::analyzer::ParseError;
use crate::class_registry::RegistryError;
use crate::codec::CodecError;
use crate::eval::evaluator::EvalError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }

    /// True for errors meaning the program references members that do not
    /// exist; callers typically regenerate the program.
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Eval(e) if e.is_structural())
    }
}
