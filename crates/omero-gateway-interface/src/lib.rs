//! OMERO Gateway Interface: the remote collaborator contract
//!
//! This crate defines what the session client consumes from the outside
//! world: a [`Gateway`] that owns the transport and hands out facilities, one
//! trait per facility, the collaborator failure enum, and the raw payloads
//! the facilities materialize.
//!
//! # Architecture
//!
//! - **Gateway**: connect / disconnect / session key, and facility lookup
//! - **Facilities**: browse, admin, data manager, metadata, query and ROI
//! - **DeleteCallback**: pollable completion handle returned by deletes
//!
//! Every facility call takes the [`SecurityContext`] it runs under. All calls
//! block the calling thread until the server answers.
//!
//! # Example
//!
//! ```rust,no_run
//! use omero_gateway_interface::{Filter, Gateway, GatewayResult, LoginCredentials, SecurityContext};
//!
//! fn project_names<G: Gateway>(gateway: &G) -> GatewayResult<Vec<String>> {
//!     let creds = LoginCredentials::password("omero", 4064, "testUser", "password");
//!     let user = gateway.connect(&creds)?;
//!     let ctx = SecurityContext::bound(user.default_group_id, user.id.unwrap_or(-1));
//!
//!     let projects = gateway.browse()?.get_projects(&ctx, &Filter::All)?;
//!     Ok(projects.into_iter().map(|p| p.name).collect())
//! }
//! ```

pub mod context;
pub mod model;

pub use context::{Authentication, LoginCredentials, SecurityContext};
pub use model::*;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Remote object id, assigned by the server
pub type Id = i64;

/// State of the connection reported alongside out-of-service failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Ok,
    /// Credentials rejected or session expired
    Unauthenticated,
    /// Transport lost after it was established
    LostConnection,
    /// Host unreachable
    Network,
    /// Server up but refusing service
    ServerOutOfService,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Ok => write!(f, "ok"),
            ConnectionStatus::Unauthenticated => write!(f, "unauthenticated"),
            ConnectionStatus::LostConnection => write!(f, "lost connection"),
            ConnectionStatus::Network => write!(f, "network"),
            ConnectionStatus::ServerOutOfService => write!(f, "server out of service"),
        }
    }
}

/// Failure modes of the remote-call layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Out of service ({status}): {message}")]
    OutOfService {
        message: String,
        status: ConnectionStatus,
    },

    #[error("Access denied: {0}")]
    Access(String),

    #[error("Server error: {0}")]
    Server(String),

    /// A lock held on the server was not released in time
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    /// The blocked calling thread was interrupted
    #[error("Interrupted: {0}")]
    Interrupted(String),

    /// A facility could not be retrieved or instantiated
    #[error("Facility unavailable: {0}")]
    Facility(String),
}

impl GatewayError {
    pub fn out_of_service(message: impl Into<String>, status: ConnectionStatus) -> Self {
        GatewayError::OutOfService {
            message: message.into(),
            status,
        }
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Completion handle of a remote delete
///
/// Deletes run asynchronously on the server; the handle is polled until the
/// server reports completion.
pub trait DeleteCallback: Send {
    /// Block up to `timeout` for the delete to finish.
    ///
    /// Returns `Ok(true)` once finished, `Ok(false)` if still running after
    /// `timeout`. A rejected delete is reported as an error.
    fn block(&mut self, timeout: Duration) -> GatewayResult<bool>;
}

/// Read access to the repository hierarchy
pub trait BrowseFacility: Send + Sync {
    /// Projects with their datasets loaded
    fn get_projects(&self, ctx: &SecurityContext, filter: &Filter) -> GatewayResult<Vec<ProjectData>>;

    fn get_datasets(&self, ctx: &SecurityContext, filter: &Filter) -> GatewayResult<Vec<DatasetData>>;

    fn get_images(&self, ctx: &SecurityContext, filter: &Filter) -> GatewayResult<Vec<ImageData>>;

    /// Images owned by the acting identity in the context's group
    fn get_user_images(&self, ctx: &SecurityContext) -> GatewayResult<Vec<ImageData>>;

    /// Images contained in any of the datasets
    fn get_images_for_datasets(
        &self,
        ctx: &SecurityContext,
        dataset_ids: &[Id],
    ) -> GatewayResult<Vec<ImageData>>;
}

/// Experimenter and group lookups
pub trait AdminFacility: Send + Sync {
    fn lookup_experimenter(
        &self,
        ctx: &SecurityContext,
        username: &str,
    ) -> GatewayResult<Option<ExperimenterData>>;

    fn get_experimenter(&self, ctx: &SecurityContext, id: Id) -> GatewayResult<Option<ExperimenterData>>;

    fn lookup_group(&self, ctx: &SecurityContext, name: &str) -> GatewayResult<Option<GroupData>>;

    fn get_group(&self, ctx: &SecurityContext, id: Id) -> GatewayResult<Option<GroupData>>;
}

/// Persistence
pub trait DataManagerFacility: Send + Sync {
    /// Persist an object and return it as stored, with its id assigned
    fn save_and_return(&self, ctx: &SecurityContext, object: RemoteObject) -> GatewayResult<RemoteObject>;

    /// Start deleting an object; completion is observed through the handle
    fn delete(&self, ctx: &SecurityContext, target: ObjectRef) -> GatewayResult<Box<dyn DeleteCallback>>;
}

/// Annotations attached to repository objects
pub trait MetadataFacility: Send + Sync {
    fn get_tags(&self, ctx: &SecurityContext, target: ObjectRef) -> GatewayResult<Vec<TagData>>;

    fn get_map_annotations(
        &self,
        ctx: &SecurityContext,
        target: ObjectRef,
    ) -> GatewayResult<Vec<MapAnnotationData>>;
}

/// Untyped query access
pub trait QueryService: Send + Sync {
    fn find(&self, ctx: &SecurityContext, kind: ObjectKind, id: Id) -> GatewayResult<Option<RemoteObject>>;

    fn find_all(
        &self,
        ctx: &SecurityContext,
        kind: ObjectKind,
        criteria: &Criteria,
    ) -> GatewayResult<Vec<RemoteObject>>;

    /// Run a server-side query; the text is passed through uninterpreted
    fn find_all_by_query(
        &self,
        ctx: &SecurityContext,
        query: &str,
        params: &[(String, String)],
    ) -> GatewayResult<Vec<ObjectRef>>;
}

/// Regions of interest and their folder associations
pub trait RoiFacility: Send + Sync {
    fn load_rois(&self, ctx: &SecurityContext, image_id: Id) -> GatewayResult<Vec<RoiResult>>;

    fn save_rois(&self, ctx: &SecurityContext, image_id: Id, rois: &[RoiData]) -> GatewayResult<Vec<RoiData>>;

    fn add_rois_to_folders(
        &self,
        ctx: &SecurityContext,
        image_id: Id,
        rois: &[RoiData],
        folders: &[FolderData],
    ) -> GatewayResult<()>;

    /// Unlink ROIs from folders; the ROIs stay attached to their image
    fn remove_rois_from_folders(
        &self,
        ctx: &SecurityContext,
        image_id: Id,
        rois: &[RoiData],
        folders: &[FolderData],
    ) -> GatewayResult<()>;

    fn load_rois_for_folder(
        &self,
        ctx: &SecurityContext,
        image_id: Id,
        folder_id: Id,
    ) -> GatewayResult<Vec<RoiResult>>;
}

/// The connection to the server and the source of every facility
///
/// # Thread Safety
///
/// A gateway may be shared by several sessions (an administrator's session and
/// the sessions it impersonates from). Whether concurrent calls through one
/// connection are safe is the implementation's contract.
pub trait Gateway: Send + Sync {
    /// Authenticate and return the logged-in identity. The identity's
    /// `default_group_id` is the group the server opened the session in.
    fn connect(&self, credentials: &LoginCredentials) -> GatewayResult<ExperimenterData>;

    fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Key of the remote session opened for `user`
    fn session_id(&self, user: &ExperimenterData) -> GatewayResult<String>;

    fn browse(&self) -> GatewayResult<Arc<dyn BrowseFacility>>;

    fn admin(&self) -> GatewayResult<Arc<dyn AdminFacility>>;

    fn data_manager(&self) -> GatewayResult<Arc<dyn DataManagerFacility>>;

    fn metadata(&self) -> GatewayResult<Arc<dyn MetadataFacility>>;

    fn query(&self) -> GatewayResult<Arc<dyn QueryService>>;

    fn roi(&self) -> GatewayResult<Arc<dyn RoiFacility>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::out_of_service("Cannot connect", ConnectionStatus::Network);
        assert_eq!(err.to_string(), "Out of service (network): Cannot connect");

        let err = GatewayError::LockTimeout("delete".to_string());
        assert_eq!(err.to_string(), "Lock timeout: delete");
    }
}
