//! A narrower error enum for tokenizer/index failures internal to this
//! crate, converted into `qorch_core::Error` at the crate boundary per the
//! ambient error-handling convention.

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("vector store error: {0}")]
    VectorStore(String),
    #[error("rerank failed: {0}")]
    Rerank(String),
}

impl From<Error> for qorch_core::Error {
    fn from(err: Error) -> Self {
        qorch_core::Error::TransientTransport {
            origin: "retriever".to_string(),
            message: err.to_string(),
        }
    }
}
