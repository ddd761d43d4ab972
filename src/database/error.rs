use thiserror::Error;

/// Errors surfaced by the repository traits.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("database connection error: {message}")]
    Connection { message: String },

    #[error("database query failed: {message}")]
    Query { message: String },
}

impl DatabaseError {
    /// Map an sqlx error onto the repository error taxonomy.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::Connection {
                    message: err.to_string(),
                }
            }
            other => DatabaseError::Query {
                message: other.to_string(),
            },
        }
    }
}
