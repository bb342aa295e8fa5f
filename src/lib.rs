//! Running/candidate configuration daemon library.

pub mod config;
pub mod constraint;
pub mod deps;
pub mod http;
pub mod observability;
pub mod path;
pub mod session;
pub mod transaction;
pub mod tree;

pub use http::{AppState, HttpServer};
pub use session::SessionManager;
pub use transaction::TransactionManager;
