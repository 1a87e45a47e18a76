/*!
 * OMERO Client - session-oriented access to an OMERO server
 *
 * A thin, typed facade over the remote gateway:
 * - Sessions with explicit connect / disconnect / sudo / group switching
 * - Immutable security contexts replaced wholesale on every transition
 * - One error taxonomy for every remote failure
 * - Entity wrappers with identity by remote id and deterministic ordering
 * - Navigation between projects, datasets, images, tags, folders and ROIs
 * - Bounded waits on remote deletes
 *
 * The remote side is abstracted by [`omero_gateway_interface::Gateway`].
 * With the `mock` feature, `MockGateway` provides an in-memory implementation
 * for tests.
 */

pub mod config;
pub mod error;
pub mod handler;
pub mod logging;
pub mod meta;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod repository;
pub mod session;
pub mod wrapper;

// Re-export commonly used types
pub use config::{ClientConfig, DeleteWait, LogLevel};
pub use error::{ErrorKind, OmeroError, Result};
pub use meta::{ExperimenterWrapper, GroupWrapper};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockGateway;
pub use repository::{
    DatasetWrapper, FolderWrapper, ImageFilter, ImageWrapper, ProjectWrapper, RepositoryObject,
    RoiWrapper, TagWrapper,
};
pub use session::Session;
pub use wrapper::{EntityWrapper, Named, Persistent};

pub use omero_gateway_interface as gateway;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
