//! Operations session for production asset management servers.
//!
//! This crate turns create/update/delete intents against the production
//! hierarchy (project → folder → subset → version → representation) into
//! batched operation requests for a REST server, with document builders,
//! a shallow update diff engine, and legacy-to-server shape conversion.

pub mod adapter;
pub mod config;
pub mod connection;
pub mod diff;
pub mod documents;
pub mod error;
pub mod http;
pub mod id;
pub mod logging;
pub mod operations;
pub mod project;
pub mod session;
pub mod types;

pub use config::ClientConfig;
pub use connection::{AnatomyPreset, Connection, RestResponse};
pub use diff::{DiffMap, FieldValue, apply_diff, diff};
pub use error::{OpsError, Result};
pub use http::HttpConnection;
pub use id::{EntityId, OperationId, new_id, validate_or_accept};
pub use operations::{
    CreateOperation, DeleteOperation, Operation, PreparedCreate, UpdateOperation, WireOp,
};
pub use project::{create_project, delete_project, validate_project_name};
pub use session::{OperationHandle, OperationsSession};
pub use types::{Document, EntityKind, OperationKind};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::connection::{Connection, RestResponse};
    pub use crate::diff::{DiffMap, FieldValue, diff};
    pub use crate::documents::*;
    pub use crate::error::{OpsError, Result};
    pub use crate::id::{EntityId, new_id};
    pub use crate::session::{OperationHandle, OperationsSession};
    pub use crate::types::{Document, EntityKind};
}
