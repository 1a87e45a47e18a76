//! Session: one authenticated connection and its current security context
//!
//! A session is either disconnected (no context, no user) or connected. All
//! reads and writes require a connected session and fail fast otherwise.
//!
//! # Example
//!
//! ```rust,no_run
//! use omero_client::gateway::Gateway;
//! use omero_client::Session;
//! use std::sync::Arc;
//!
//! # fn example(gateway: Arc<dyn Gateway>) -> omero_client::Result<()> {
//! let mut session = Session::new(gateway);
//! session.connect_with_password("omero", 4064, "testUser", "password", Some(3))?;
//!
//! for project in session.get_projects()? {
//!     println!("{}: {}", project, project.name());
//! }
//!
//! session.disconnect();
//! # Ok(())
//! # }
//! ```

use omero_gateway_interface::{
    AdminFacility, BrowseFacility, ConnectionStatus, Criteria, DataManagerFacility,
    ExperimenterData, Filter, Gateway, GroupData, Id, LinkData, LinkKind, LoginCredentials,
    MetadataFacility, ObjectKind, ObjectRef, QueryService, RemoteObject, RoiFacility,
    SecurityContext, TagData,
};
use once_cell::sync::OnceCell;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, DeleteWait};
use crate::error::{OmeroError, Result};
use crate::handler;
use crate::meta::{ExperimenterWrapper, GroupWrapper};
use crate::repository::{
    DatasetWrapper, FolderWrapper, ImageFilter, ImageWrapper, ProjectWrapper, TagWrapper,
};
use crate::wrapper::{
    first, retain_like, retain_named, sort_and_purge, wrap_by_id, EntityWrapper, Persistent,
};

/// Gateway plus the facilities obtained from it, memoized on first use
///
/// Shared between a session and the sessions it impersonates from.
struct Connection {
    gateway: Arc<dyn Gateway>,
    browse: OnceCell<Arc<dyn BrowseFacility>>,
    admin: OnceCell<Arc<dyn AdminFacility>>,
    data_manager: OnceCell<Arc<dyn DataManagerFacility>>,
    metadata: OnceCell<Arc<dyn MetadataFacility>>,
    query: OnceCell<Arc<dyn QueryService>>,
    roi: OnceCell<Arc<dyn RoiFacility>>,
}

impl Connection {
    fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            browse: OnceCell::new(),
            admin: OnceCell::new(),
            data_manager: OnceCell::new(),
            metadata: OnceCell::new(),
            query: OnceCell::new(),
            roi: OnceCell::new(),
        }
    }
}

/// Obtain a facility from the gateway once, then reuse it
macro_rules! memoized_facility {
    ($conn:expr, $cell:ident, $name:literal) => {
        $conn
            .$cell
            .get_or_try_init(|| {
                debug!("Retrieving {} facility", $name);
                handler::call(
                    $conn.gateway.as_ref(),
                    |g| g.$cell(),
                    concat!("Cannot retrieve the ", $name, " facility"),
                )
            })
            .cloned()
    };
}

/// Context and identity of a connected session
struct SessionState {
    ctx: Arc<SecurityContext>,
    user: ExperimenterWrapper,
}

/// Authenticated handle to the server plus its current permission scope
pub struct Session {
    connection: Arc<Connection>,
    state: Option<SessionState>,
    /// Sessions derived by `sudo` share the connection but never release it
    owns_connection: bool,
    delete_wait: DeleteWait,
}

impl Session {
    /// Create a disconnected session over `gateway`
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self::with_delete_wait(gateway, DeleteWait::default())
    }

    /// Create a disconnected session with a custom delete-wait budget
    pub fn with_delete_wait(gateway: Arc<dyn Gateway>, delete_wait: DeleteWait) -> Self {
        Self {
            connection: Arc::new(Connection::new(gateway)),
            state: None,
            owns_connection: true,
            delete_wait,
        }
    }

    /// Create a disconnected session configured by `config`
    pub fn from_config(gateway: Arc<dyn Gateway>, config: &ClientConfig) -> Self {
        Self::with_delete_wait(gateway, config.delete_wait())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Open a connection; any previous connection is torn down first
    ///
    /// The session runs in the requested group when the identity belongs to
    /// it, and in the identity's default group otherwise. A session obtained
    /// through [`Session::sudo`] borrows its parent's connection and cannot
    /// open one of its own.
    pub fn connect(&mut self, credentials: &LoginCredentials) -> Result<()> {
        if !self.owns_connection {
            return Err(OmeroError::precondition(
                "Cannot connect a session derived through sudo: it shares its parent's connection",
            ));
        }
        self.disconnect();

        info!(
            "Connecting to {}:{} as {}",
            credentials.host,
            credentials.port,
            credentials.username().unwrap_or("<session key>")
        );

        let gateway = Arc::clone(&self.connection.gateway);
        let user = handler::call(
            gateway.as_ref(),
            |g| g.connect(credentials),
            "Cannot connect to OMERO",
        )?;

        let user_id = user.id.ok_or_else(|| {
            OmeroError::service(
                "Server returned an identity without id",
                ConnectionStatus::Unauthenticated,
            )
        })?;
        let group_id = resolve_group(&user, credentials.group_id);

        self.connection = Arc::new(Connection::new(gateway));
        self.owns_connection = true;
        self.state = Some(SessionState {
            ctx: Arc::new(SecurityContext::bound(group_id, user_id)),
            user: ExperimenterWrapper::new(user),
        });

        info!("Connected as user {} in group {}", user_id, group_id);
        Ok(())
    }

    /// Connect with a username and password
    pub fn connect_with_password(
        &mut self,
        host: &str,
        port: u16,
        username: &str,
        password: &str,
        group_id: Option<Id>,
    ) -> Result<()> {
        let credentials = LoginCredentials::password(host, port, username, password);
        let credentials = match group_id {
            Some(group_id) => credentials.with_group(group_id),
            None => credentials,
        };
        self.connect(&credentials)
    }

    /// Join an existing remote session by its key
    pub fn connect_with_session_key(&mut self, host: &str, port: u16, key: &str) -> Result<()> {
        self.connect(&LoginCredentials::session_key(host, port, key))
    }

    /// Drop the context and identity, then release the connection
    ///
    /// Does nothing when already disconnected. A session obtained through
    /// [`Session::sudo`] leaves the shared connection open.
    pub fn disconnect(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };

        let was_sudo = state.ctx.is_sudo();
        drop(state);

        if self.owns_connection {
            self.connection.gateway.disconnect();
        }

        info!(
            "Disconnected{}",
            if was_sudo { " (impersonation ended)" } else { "" }
        );
    }

    /// Session acting as `username`, sharing this session's connection
    ///
    /// The new session runs in that identity's default group. This session
    /// is left untouched.
    pub fn sudo(&self, username: &str) -> Result<Session> {
        let ctx = self.ctx()?;
        let admin = self.admin()?;

        let user = handler::call(
            admin.as_ref(),
            |a| a.lookup_experimenter(&ctx, username),
            &format!("Cannot retrieve user: {}", username),
        )?
        .ok_or_else(|| OmeroError::not_found(format!("User not found: {}", username)))?;

        let user_id = user
            .id
            .ok_or_else(|| OmeroError::not_found(format!("User {} has no id", username)))?;
        let sudo_ctx = SecurityContext::impersonating(user.default_group_id, user_id);

        info!(
            "Acting as {} (id {}) in group {}",
            username, user_id, user.default_group_id
        );

        Ok(Session {
            connection: Arc::clone(&self.connection),
            state: Some(SessionState {
                ctx: Arc::new(sudo_ctx),
                user: ExperimenterWrapper::new(user),
            }),
            owns_connection: false,
            delete_wait: self.delete_wait,
        })
    }

    /// Replace the security context with one for `group_id`
    ///
    /// The acting identity and sudo flag carry over. The previous context is
    /// not modified, so anyone still holding it keeps the old group. Fails
    /// with an access error when the identity is not a member of the group,
    /// unless the identity is an administrator and the group exists.
    pub fn switch_group(&mut self, group_id: Id) -> Result<()> {
        let (is_member, is_admin) = {
            let state = self.state()?;
            let user = state.user.data();
            (user.is_member_of_group(group_id), user.is_admin())
        };

        if !is_member {
            if is_admin {
                self.get_group_by_id(group_id)?;
            } else {
                return Err(OmeroError::access(format!(
                    "Cannot switch to group {}: not a member",
                    group_id
                )));
            }
        }

        if let Some(state) = self.state.as_mut() {
            let switched = state.ctx.switched_to(group_id);
            state.ctx = Arc::new(switched);
        }

        info!("Switched to group {}", group_id);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // State
    // ═══════════════════════════════════════════════════════════════════════

    /// Connected iff the transport is alive and a context is set
    pub fn is_connected(&self) -> bool {
        self.state.is_some() && self.connection.gateway.is_connected()
    }

    /// Identity the session acts as
    pub fn user(&self) -> Option<&ExperimenterWrapper> {
        self.state.as_ref().map(|s| &s.user)
    }

    pub fn user_id(&self) -> Option<Id> {
        self.state.as_ref().and_then(|s| s.ctx.experimenter_id())
    }

    pub fn current_group_id(&self) -> Option<Id> {
        self.state.as_ref().map(|s| s.ctx.group_id())
    }

    /// Snapshot of the current context; later transitions do not affect it
    pub fn security_context(&self) -> Option<Arc<SecurityContext>> {
        self.state.as_ref().map(|s| Arc::clone(&s.ctx))
    }

    pub fn is_sudo(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.ctx.is_sudo())
    }

    pub fn delete_wait(&self) -> DeleteWait {
        self.delete_wait
    }

    /// Key of the remote session, usable with [`Session::connect_with_session_key`]
    pub fn session_id(&self) -> Result<String> {
        let state = self.state()?;
        handler::call(
            self.connection.gateway.as_ref(),
            |g| g.session_id(state.user.data()),
            "Cannot retrieve the session id",
        )
    }

    fn state(&self) -> Result<&SessionState> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| OmeroError::precondition("Session is not connected"))?;

        if !self.connection.gateway.is_connected() {
            return Err(OmeroError::service(
                "Connection to OMERO was lost",
                ConnectionStatus::LostConnection,
            ));
        }

        Ok(state)
    }

    /// Context every facility call of this session runs under
    pub fn ctx(&self) -> Result<Arc<SecurityContext>> {
        self.state().map(|s| Arc::clone(&s.ctx))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Facilities
    // ═══════════════════════════════════════════════════════════════════════

    pub fn browse(&self) -> Result<Arc<dyn BrowseFacility>> {
        self.state()?;
        memoized_facility!(self.connection, browse, "browse")
    }

    pub fn admin(&self) -> Result<Arc<dyn AdminFacility>> {
        self.state()?;
        memoized_facility!(self.connection, admin, "admin")
    }

    pub fn data_manager(&self) -> Result<Arc<dyn DataManagerFacility>> {
        self.state()?;
        memoized_facility!(self.connection, data_manager, "data manager")
    }

    pub fn metadata(&self) -> Result<Arc<dyn MetadataFacility>> {
        self.state()?;
        memoized_facility!(self.connection, metadata, "metadata")
    }

    pub fn query(&self) -> Result<Arc<dyn QueryService>> {
        self.state()?;
        memoized_facility!(self.connection, query, "query")
    }

    pub fn roi(&self) -> Result<Arc<dyn RoiFacility>> {
        self.state()?;
        memoized_facility!(self.connection, roi, "ROI")
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Projects
    // ═══════════════════════════════════════════════════════════════════════

    fn fetch_projects(&self, filter: &Filter, label: &str) -> Result<Vec<ProjectWrapper>> {
        let ctx = self.ctx()?;
        let projects = handler::call(
            self.browse()?.as_ref(),
            |b| b.get_projects(&ctx, filter),
            label,
        )?;
        Ok(wrap_by_id(projects))
    }

    /// All projects visible in the current context
    pub fn get_projects(&self) -> Result<Vec<ProjectWrapper>> {
        self.fetch_projects(&Filter::All, "Cannot get projects")
    }

    pub fn get_projects_by_ids(&self, ids: &[Id]) -> Result<Vec<ProjectWrapper>> {
        self.fetch_projects(
            &Filter::Ids(ids.to_vec()),
            &format!("Cannot get projects with ids {:?}", ids),
        )
    }

    pub fn get_project(&self, id: Id) -> Result<ProjectWrapper> {
        first(self.get_projects_by_ids(&[id])?, || {
            format!("Project {} doesn't exist in this context", id)
        })
    }

    /// Projects named exactly `name`
    pub fn get_projects_by_name(&self, name: &str) -> Result<Vec<ProjectWrapper>> {
        let mut projects = self.fetch_projects(
            &Filter::Name(name.to_string()),
            &format!("Cannot get projects with name: {}", name),
        )?;
        retain_named(&mut projects, name);
        Ok(projects)
    }

    /// Projects whose name contains a match of the regular expression
    pub fn get_projects_like(&self, pattern: &str) -> Result<Vec<ProjectWrapper>> {
        let mut projects = self.get_projects()?;
        retain_like(&mut projects, pattern)?;
        Ok(projects)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Datasets
    // ═══════════════════════════════════════════════════════════════════════

    fn fetch_datasets(&self, filter: &Filter, label: &str) -> Result<Vec<DatasetWrapper>> {
        let ctx = self.ctx()?;
        let datasets = handler::call(
            self.browse()?.as_ref(),
            |b| b.get_datasets(&ctx, filter),
            label,
        )?;
        Ok(wrap_by_id(datasets))
    }

    pub fn get_datasets(&self) -> Result<Vec<DatasetWrapper>> {
        self.fetch_datasets(&Filter::All, "Cannot get datasets")
    }

    pub fn get_datasets_by_ids(&self, ids: &[Id]) -> Result<Vec<DatasetWrapper>> {
        self.fetch_datasets(
            &Filter::Ids(ids.to_vec()),
            &format!("Cannot get datasets with ids {:?}", ids),
        )
    }

    pub fn get_dataset(&self, id: Id) -> Result<DatasetWrapper> {
        first(self.get_datasets_by_ids(&[id])?, || {
            format!("Dataset {} doesn't exist in this context", id)
        })
    }

    /// Datasets named exactly `name`
    pub fn get_datasets_by_name(&self, name: &str) -> Result<Vec<DatasetWrapper>> {
        let mut datasets = self.fetch_datasets(
            &Filter::Name(name.to_string()),
            &format!("Cannot get datasets with name: {}", name),
        )?;
        retain_named(&mut datasets, name);
        Ok(datasets)
    }

    pub fn get_datasets_like(&self, pattern: &str) -> Result<Vec<DatasetWrapper>> {
        let mut datasets = self.get_datasets()?;
        retain_like(&mut datasets, pattern)?;
        Ok(datasets)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Images
    // ═══════════════════════════════════════════════════════════════════════

    fn fetch_images(&self, filter: &Filter, label: &str) -> Result<Vec<ImageWrapper>> {
        let ctx = self.ctx()?;
        let images = handler::call(
            self.browse()?.as_ref(),
            |b| b.get_images(&ctx, filter),
            label,
        )?;
        Ok(wrap_by_id(images))
    }

    /// Images owned by the acting identity in the current group
    pub fn get_images(&self) -> Result<Vec<ImageWrapper>> {
        let ctx = self.ctx()?;
        let images = handler::call(
            self.browse()?.as_ref(),
            |b| b.get_user_images(&ctx),
            "Cannot get images",
        )?;
        Ok(wrap_by_id(images))
    }

    pub fn get_images_by_ids(&self, ids: &[Id]) -> Result<Vec<ImageWrapper>> {
        self.fetch_images(
            &Filter::Ids(ids.to_vec()),
            &format!("Cannot get images with ids {:?}", ids),
        )
    }

    pub fn get_image(&self, id: Id) -> Result<ImageWrapper> {
        first(self.get_images_by_ids(&[id])?, || {
            format!("Image {} doesn't exist in this context", id)
        })
    }

    /// Images named exactly `name`
    pub fn get_images_by_name(&self, name: &str) -> Result<Vec<ImageWrapper>> {
        let images = self.fetch_images(
            &Filter::Name(name.to_string()),
            &format!("Cannot get images with name: {}", name),
        )?;
        ImageFilter::Named(name).apply(self, images)
    }

    /// The caller's images whose name contains a match of the regular expression
    pub fn get_images_like(&self, pattern: &str) -> Result<Vec<ImageWrapper>> {
        ImageFilter::Like(pattern).apply(self, self.get_images()?)
    }

    /// Images linked to `tag`
    pub fn get_images_tagged(&self, tag: &TagWrapper) -> Result<Vec<ImageWrapper>> {
        self.get_images_tagged_id(tag.object_ref()?.id)
    }

    pub fn get_images_tagged_id(&self, tag_id: Id) -> Result<Vec<ImageWrapper>> {
        let ids: Vec<Id> = self.tagged_image_ids(tag_id)?.into_iter().collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(sort_and_purge(self.get_images_by_ids(&ids)?))
    }

    /// The caller's images with a key/value pair named `key`
    pub fn get_images_with_key(&self, key: &str) -> Result<Vec<ImageWrapper>> {
        ImageFilter::WithKey(key).apply(self, self.get_images()?)
    }

    /// The caller's images with the pair `key` = `value`
    pub fn get_images_with_pair(&self, key: &str, value: &str) -> Result<Vec<ImageWrapper>> {
        ImageFilter::WithPair(key, value).apply(self, self.get_images()?)
    }

    /// Ids of the images linked to a tag
    pub(crate) fn tagged_image_ids(&self, tag_id: Id) -> Result<BTreeSet<Id>> {
        let tag = ObjectRef::new(ObjectKind::TagAnnotation, tag_id);
        let links = self.find_links(LinkKind::ImageAnnotation, None, Some(tag_id))?;
        Ok(links
            .into_iter()
            .filter(|link| link.child == tag)
            .map(|link| link.parent.id)
            .collect())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Tags and folders
    // ═══════════════════════════════════════════════════════════════════════

    pub fn get_tags(&self) -> Result<Vec<TagWrapper>> {
        let ctx = self.ctx()?;
        let objects = handler::call(
            self.query()?.as_ref(),
            |q| q.find_all(&ctx, ObjectKind::TagAnnotation, &Criteria::all()),
            "Cannot get tags",
        )?;
        let tags: Vec<TagData> = objects
            .into_iter()
            .filter_map(|o| TagData::try_from(o).ok())
            .collect();
        Ok(wrap_by_id(tags))
    }

    /// Tags whose text is exactly `name`
    pub fn get_tags_by_name(&self, name: &str) -> Result<Vec<TagWrapper>> {
        let mut tags = self.get_tags()?;
        retain_named(&mut tags, name);
        Ok(tags)
    }

    pub fn get_tag(&self, id: Id) -> Result<TagWrapper> {
        match self.find(ObjectKind::TagAnnotation, id)? {
            Some(RemoteObject::Tag(tag)) => Ok(TagWrapper::new(tag)),
            _ => Err(OmeroError::not_found(format!("Tag {} not found", id))),
        }
    }

    pub fn get_folder(&self, id: Id) -> Result<FolderWrapper> {
        match self.find(ObjectKind::Folder, id)? {
            Some(RemoteObject::Folder(folder)) => Ok(FolderWrapper::new(folder)),
            _ => Err(OmeroError::not_found(format!("Folder {} not found", id))),
        }
    }

    pub fn get_folders(&self) -> Result<Vec<FolderWrapper>> {
        let ctx = self.ctx()?;
        let objects = handler::call(
            self.query()?.as_ref(),
            |q| q.find_all(&ctx, ObjectKind::Folder, &Criteria::all()),
            "Cannot get folders",
        )?;
        let folders = objects.into_iter().filter_map(|o| match o {
            RemoteObject::Folder(folder) => Some(folder),
            _ => None,
        });
        Ok(wrap_by_id(folders))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Experimenters and groups
    // ═══════════════════════════════════════════════════════════════════════

    pub fn get_user(&self, username: &str) -> Result<ExperimenterWrapper> {
        let ctx = self.ctx()?;
        let user = handler::call(
            self.admin()?.as_ref(),
            |a| a.lookup_experimenter(&ctx, username),
            &format!("Cannot retrieve user: {}", username),
        )?;
        user.map(ExperimenterWrapper::new)
            .ok_or_else(|| OmeroError::not_found(format!("User not found: {}", username)))
    }

    pub fn get_user_by_id(&self, id: Id) -> Result<ExperimenterWrapper> {
        let ctx = self.ctx()?;
        let user: Option<ExperimenterData> = handler::call(
            self.admin()?.as_ref(),
            |a| a.get_experimenter(&ctx, id),
            &format!("Cannot retrieve user {}", id),
        )?;
        user.map(ExperimenterWrapper::new)
            .ok_or_else(|| OmeroError::not_found(format!("User {} not found", id)))
    }

    pub fn get_group(&self, name: &str) -> Result<GroupWrapper> {
        let ctx = self.ctx()?;
        let group = handler::call(
            self.admin()?.as_ref(),
            |a| a.lookup_group(&ctx, name),
            &format!("Cannot retrieve group: {}", name),
        )?;
        group
            .map(GroupWrapper::new)
            .ok_or_else(|| OmeroError::not_found(format!("Group not found: {}", name)))
    }

    pub fn get_group_by_id(&self, id: Id) -> Result<GroupWrapper> {
        let ctx = self.ctx()?;
        let group: Option<GroupData> = handler::call(
            self.admin()?.as_ref(),
            |a| a.get_group(&ctx, id),
            &format!("Cannot retrieve group {}", id),
        )?;
        group
            .map(GroupWrapper::new)
            .ok_or_else(|| OmeroError::not_found(format!("Group {} not found", id)))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Persistence
    // ═══════════════════════════════════════════════════════════════════════

    /// Persist an object and return it as stored
    pub fn save(&self, object: RemoteObject) -> Result<RemoteObject> {
        let ctx = self.ctx()?;
        let label = match object.object_ref() {
            Some(target) => format!("Cannot save {}", target),
            None => format!("Cannot create {}", object.kind()),
        };
        handler::call(
            self.data_manager()?.as_ref(),
            |dm| dm.save_and_return(&ctx, object),
            &label,
        )
    }

    /// Delete an entity and wait for the server to finish
    ///
    /// Entity-specific clean-up runs first: a folder is emptied of its ROI
    /// associations before it is removed.
    pub fn delete<W: Persistent>(&self, entity: &W) -> Result<()> {
        let target = entity.object_ref()?;
        entity.prepare_delete(self)?;
        self.delete_ref(target)
    }

    /// Delete several entities, one after the other
    pub fn delete_all<W: Persistent>(&self, entities: &[W]) -> Result<()> {
        for entity in entities {
            self.delete(entity)?;
        }
        Ok(())
    }

    /// Delete the object behind an unloaded reference
    pub fn delete_ref(&self, target: ObjectRef) -> Result<()> {
        let ctx = self.ctx()?;
        debug!("Deleting {}", target);
        handler::delete(
            self.data_manager()?.as_ref(),
            &ctx,
            target,
            self.delete_wait,
            &format!("Cannot delete {}", target),
        )
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// Run a server-side query; results are not type-checked locally
    pub fn find_by_query(&self, query: &str) -> Result<Vec<ObjectRef>> {
        let ctx = self.ctx()?;
        handler::call(
            self.query()?.as_ref(),
            |q| q.find_all_by_query(&ctx, query, &[]),
            &format!("Query failed: {}", query),
        )
    }

    pub(crate) fn find(&self, kind: ObjectKind, id: Id) -> Result<Option<RemoteObject>> {
        let ctx = self.ctx()?;
        handler::call(
            self.query()?.as_ref(),
            |q| q.find(&ctx, kind, id),
            &format!("Cannot get {} {}", kind, id),
        )
    }

    /// Links of `kind`, optionally narrowed to a parent and/or child id
    pub(crate) fn find_links(
        &self,
        kind: LinkKind,
        parent: Option<Id>,
        child: Option<Id>,
    ) -> Result<Vec<LinkData>> {
        let ctx = self.ctx()?;
        let criteria = Criteria {
            ids: None,
            parent,
            child,
        };
        let objects = handler::call(
            self.query()?.as_ref(),
            |q| q.find_all(&ctx, ObjectKind::Link(kind), &criteria),
            &format!("Cannot get {} links", kind.as_str()),
        )?;
        Ok(objects
            .into_iter()
            .filter_map(|o| match o {
                RemoteObject::Link(link) => Some(link),
                _ => None,
            })
            .collect())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id())
            .field("group_id", &self.current_group_id())
            .field("sudo", &self.is_sudo())
            .field("owns_connection", &self.owns_connection)
            .field("delete_wait", &self.delete_wait)
            .finish_non_exhaustive()
    }
}

/// Group to run a fresh session in
fn resolve_group(user: &ExperimenterData, requested: Option<Id>) -> Id {
    match requested {
        Some(group_id) if user.is_member_of_group(group_id) => group_id,
        Some(group_id) => {
            warn!(
                "User {} is not a member of group {}; using group {}",
                user.username, group_id, user.default_group_id
            );
            user.default_group_id
        }
        None => user.default_group_id,
    }
}
