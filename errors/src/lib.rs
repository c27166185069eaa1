mod error;

pub use error::{BoxError, Error, ErrorKind, RepoError, Result, StoreError};
