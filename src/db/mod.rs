//! MySQL access layer.
//!
//! This module provides everything that talks SQL:
//! - Scoped connections with connect and statement timeouts
//! - Identifier validation and quoting
//! - Schema introspection and row reads on source servers
//! - Statement text for provisioning and loading the ODS
//! - Value conversion between MySQL rows and [`SqlValue`](crate::models::SqlValue)

pub mod connection;
pub mod identifier;
pub mod schema;
pub mod statements;
pub mod values;

pub use connection::{ConnectionProvider, QueryFailure, ScopedConnection, timed};
pub use schema::SchemaInspector;
