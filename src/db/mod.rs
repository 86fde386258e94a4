//! Data access subsystem.
//!
//! # Data Flow
//! ```text
//! Model / Repository (find, save, delete, ...)
//!     → query.rs (fluent builder, named placeholders)
//!     → connection.rs (shared handle, statement execution, transactions)
//!     → SQLite
//! ```
//!
//! # Design Decisions
//! - The handle is created by the application and passed in; nothing is global
//! - Rows travel as JSON maps so they can flow straight into responses

pub mod connection;
pub mod error;
pub mod model;
pub mod query;

pub use connection::{Database, Row};
pub use error::{DbError, TransactionError};
pub use model::{Fillable, Model, Repository};
pub use query::{Direction, QueryBuilder};
