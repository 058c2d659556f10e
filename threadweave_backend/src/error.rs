use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures surfaced by the content-tree services.
///
/// Store failures never leak as raw `rusqlite` errors: they are wrapped in
/// [`ThreadError::Persistence`] together with the operation that was running.
#[derive(Debug, Error)]
pub enum ThreadError {
    /// Caller-side misuse such as empty text or a zero page number.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The referenced record does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("error {operation}: {source}")]
    Persistence {
        operation: &'static str,
        #[source]
        source: BoxError,
    },
}

pub type ThreadResult<T> = Result<T, ThreadError>;

impl ThreadError {
    pub fn validation(message: impl Into<String>) -> Self {
        ThreadError::Validation(message.into())
    }

    pub fn thread_not_found(id: impl Into<String>) -> Self {
        ThreadError::NotFound {
            entity: "thread",
            id: id.into(),
        }
    }

    pub fn user_not_found(id: impl Into<String>) -> Self {
        ThreadError::NotFound {
            entity: "user",
            id: id.into(),
        }
    }

    pub fn persistence(operation: &'static str, err: anyhow::Error) -> Self {
        ThreadError::Persistence {
            operation,
            source: err.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ThreadError::NotFound { .. })
    }
}

/// Shorthand for wrapping a repository result at the service boundary.
pub(crate) trait PersistenceContext<T> {
    fn during(self, operation: &'static str) -> ThreadResult<T>;
}

impl<T> PersistenceContext<T> for anyhow::Result<T> {
    fn during(self, operation: &'static str) -> ThreadResult<T> {
        self.map_err(|err| ThreadError::persistence(operation, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn persistence_error_keeps_operation_and_cause() {
        let err: anyhow::Result<()> = Err(anyhow::anyhow!("disk on fire"));
        let wrapped = err.during("creating thread").unwrap_err();
        assert_eq!(wrapped.to_string(), "error creating thread: disk on fire");
        assert!(wrapped.source().is_some());
        assert!(!wrapped.is_not_found());
    }

    #[test]
    fn not_found_names_the_entity() {
        let err = ThreadError::thread_not_found("t-9");
        assert_eq!(err.to_string(), "thread t-9 not found");
        assert!(err.is_not_found());
    }
}
