//! HTTP transport subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware layers)
//!     → auth.rs (bearer token → active session, timer touch)
//!     → handlers.rs (transaction manager calls)
//!     → JSON response
//! ```

pub mod auth;
pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer};
