//! In-memory gateway for testing
//!
//! Implements [`Gateway`] and every facility over a shared in-memory store, so
//! sessions and wrappers can be exercised without a server. The store behaves
//! like a server where it matters to callers:
//!
//! - objects are visible only in the group they were created in
//! - listings come back in descending id order
//! - name searches are case-insensitive substring matches
//! - a folder still referenced by ROIs cannot be deleted
//! - deleting an object removes the links that reference it
//!
//! Failures can be injected per operation with [`MockGateway::fail_next`], and
//! deletes can be made to stall or be interrupted.
//!
//! # Example
//!
//! ```rust
//! use omero_client::{MockGateway, Session};
//! use std::sync::Arc;
//!
//! let gateway = MockGateway::new("omero", 4064);
//! let group = gateway.add_group(3, "testGroup");
//! let user = gateway.add_user(2, "testUser", "password", &[group]);
//! gateway.add_project(user, group, "TestProject", "");
//!
//! let mut session = Session::new(Arc::new(gateway));
//! session
//!     .connect_with_password("omero", 4064, "testUser", "password", None)
//!     .unwrap();
//! assert_eq!(session.get_projects().unwrap().len(), 1);
//! ```

use chrono::Utc;
use omero_gateway_interface::{
    AdminFacility, Authentication, BrowseFacility, ConnectionStatus, Criteria,
    DataManagerFacility, DatasetData, DeleteCallback, Details, ExperimenterData, Filter,
    FolderData, Gateway, GatewayError, GatewayResult, GroupData, GroupMember, Id, ImageData,
    LinkData, LinkKind, LoginCredentials, MapAnnotationData, MetadataFacility, NamedValue,
    ObjectKind, ObjectRef, ProjectData, QueryService, RemoteObject, RoiData, RoiFacility,
    RoiResult, SecurityContext, TagData,
};
use secrecy::ExposeSecret;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

#[derive(Debug, Clone)]
struct MockUser {
    data: ExperimenterData,
    password: String,
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    disconnects: u32,
    next_ids: HashMap<ObjectKind, Id>,

    users: BTreeMap<Id, MockUser>,
    groups: BTreeMap<Id, GroupData>,
    sessions: HashMap<String, Id>,

    projects: BTreeMap<Id, ProjectData>,
    datasets: BTreeMap<Id, DatasetData>,
    images: BTreeMap<Id, ImageData>,
    tags: BTreeMap<Id, TagData>,
    maps: BTreeMap<Id, MapAnnotationData>,
    folders: BTreeMap<Id, FolderData>,
    rois: BTreeMap<Id, RoiData>,
    links: BTreeMap<(LinkKind, Id), LinkData>,
    /// (roi, folder) associations
    roi_folders: BTreeSet<(Id, Id)>,

    failures: HashMap<String, GatewayError>,
    queries: HashMap<String, Vec<ObjectRef>>,
    stall_deletes: bool,
    interrupt_deletes: bool,
    delete_polls: u32,
}

impl MockState {
    fn next_id(&mut self, kind: ObjectKind) -> Id {
        let next = self.next_ids.entry(kind).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    fn exists(&self, target: ObjectRef) -> bool {
        match target.kind {
            ObjectKind::Project => self.projects.contains_key(&target.id),
            ObjectKind::Dataset => self.datasets.contains_key(&target.id),
            ObjectKind::Image => self.images.contains_key(&target.id),
            ObjectKind::TagAnnotation => self.tags.contains_key(&target.id),
            ObjectKind::MapAnnotation => self.maps.contains_key(&target.id),
            ObjectKind::Folder => self.folders.contains_key(&target.id),
            ObjectKind::Roi => self.rois.contains_key(&target.id),
            ObjectKind::Experimenter => self.users.contains_key(&target.id),
            ObjectKind::ExperimenterGroup => self.groups.contains_key(&target.id),
            ObjectKind::Link(kind) => self.links.contains_key(&(kind, target.id)),
        }
    }

    fn details_of(&self, target: ObjectRef) -> Option<&Details> {
        match target.kind {
            ObjectKind::Project => self.projects.get(&target.id).map(|d| &d.details),
            ObjectKind::Dataset => self.datasets.get(&target.id).map(|d| &d.details),
            ObjectKind::Image => self.images.get(&target.id).map(|d| &d.details),
            ObjectKind::TagAnnotation => self.tags.get(&target.id).map(|d| &d.details),
            ObjectKind::MapAnnotation => self.maps.get(&target.id).map(|d| &d.details),
            ObjectKind::Folder => self.folders.get(&target.id).map(|d| &d.details),
            ObjectKind::Roi => self.rois.get(&target.id).map(|d| &d.details),
            _ => None,
        }
    }

    fn is_admin(&self, ctx: &SecurityContext) -> bool {
        ctx.experimenter_id()
            .and_then(|id| self.users.get(&id))
            .is_some_and(|u| u.data.is_admin())
    }

    fn linked(&self, kind: LinkKind, parent: Id) -> Vec<Id> {
        self.links
            .values()
            .filter(|l| l.kind == kind && l.parent.id == parent)
            .map(|l| l.child.id)
            .collect()
    }

    fn project_with_datasets(&self, project: &ProjectData) -> ProjectData {
        let mut project = project.clone();
        if let Some(id) = project.id {
            project.datasets = self
                .linked(LinkKind::ProjectDataset, id)
                .into_iter()
                .rev()
                .filter_map(|d| self.datasets.get(&d).cloned())
                .collect();
        }
        project
    }

    fn add_link(&mut self, mut link: LinkData) -> GatewayResult<LinkData> {
        let duplicate = self.links.values().any(|l| {
            l.kind == link.kind && l.parent == link.parent && l.child == link.child
        });
        if duplicate {
            return Err(GatewayError::Server(format!(
                "{} between {} and {} already exists",
                link.kind.as_str(),
                link.parent,
                link.child
            )));
        }
        if !self.exists(link.parent) || !self.exists(link.child) {
            return Err(GatewayError::Server(format!(
                "Cannot link {} to {}: missing object",
                link.child, link.parent
            )));
        }

        let id = self.next_id(ObjectKind::Link(link.kind));
        link.id = Some(id);
        self.links.insert((link.kind, id), link.clone());
        Ok(link)
    }

    fn remove(&mut self, target: ObjectRef) -> GatewayResult<()> {
        if target.kind == ObjectKind::Folder
            && self.roi_folders.iter().any(|&(_, folder)| folder == target.id)
        {
            return Err(GatewayError::Server(format!(
                "{} is still referenced by ROIs",
                target
            )));
        }

        match target.kind {
            ObjectKind::Project => {
                self.projects.remove(&target.id);
            }
            ObjectKind::Dataset => {
                self.datasets.remove(&target.id);
            }
            ObjectKind::Image => {
                self.images.remove(&target.id);
                self.rois.retain(|_, roi| roi.image_id != Some(target.id));
            }
            ObjectKind::TagAnnotation => {
                self.tags.remove(&target.id);
            }
            ObjectKind::MapAnnotation => {
                self.maps.remove(&target.id);
            }
            ObjectKind::Folder => {
                self.folders.remove(&target.id);
            }
            ObjectKind::Roi => {
                self.rois.remove(&target.id);
                self.roi_folders.retain(|&(roi, _)| roi != target.id);
            }
            ObjectKind::Link(kind) => {
                self.links.remove(&(kind, target.id));
            }
            ObjectKind::Experimenter | ObjectKind::ExperimenterGroup => {
                return Err(GatewayError::Access(format!("{} cannot be deleted", target)));
            }
        }

        self.links
            .retain(|_, link| link.parent != target && link.child != target);
        Ok(())
    }
}

fn details(owner: Id, group: Id) -> Details {
    Details {
        owner_id: Some(owner),
        group_id: Some(group),
        created: Some(Utc::now()),
    }
}

fn visible(details: &Details, ctx: &SecurityContext) -> bool {
    details.group_id == Some(ctx.group_id())
}

fn name_matches(name: &str, query: &str) -> bool {
    name.to_lowercase().contains(&query.to_lowercase())
}

/// Entries visible in `ctx` that pass `filter`, in descending id order
fn select<T: Clone>(
    items: &BTreeMap<Id, T>,
    ctx: &SecurityContext,
    filter: &Filter,
    details: impl Fn(&T) -> &Details,
    name: impl Fn(&T) -> &str,
) -> Vec<T> {
    items
        .iter()
        .rev()
        .filter(|(_, item)| visible(details(item), ctx))
        .filter(|(id, item)| match filter {
            Filter::All => true,
            Filter::Ids(ids) => ids.contains(id),
            Filter::Name(query) => name_matches(name(item), query),
        })
        .map(|(_, item)| item.clone())
        .collect()
}

/// In-memory [`Gateway`] and facilities for tests
#[derive(Debug, Clone)]
pub struct MockGateway {
    host: String,
    port: u16,
    state: Arc<RwLock<MockState>>,
}

impl MockGateway {
    /// Create an empty store answering on `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            state: Arc::new(RwLock::new(MockState::default())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consume an injected failure for `op`, then require a live connection
    fn check(&self, op: &str) -> GatewayResult<()> {
        let mut state = self.write();
        if let Some(err) = state.failures.remove(op) {
            return Err(err);
        }
        if !state.connected {
            return Err(GatewayError::out_of_service(
                "Not connected",
                ConnectionStatus::LostConnection,
            ));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Seeding
    // ═══════════════════════════════════════════════════════════════════════

    pub fn add_group(&self, id: Id, name: &str) -> Id {
        self.write().groups.insert(
            id,
            GroupData {
                id: Some(id),
                name: name.to_string(),
                ..Default::default()
            },
        );
        id
    }

    /// Add a user; the first group is its default group
    pub fn add_user(&self, id: Id, username: &str, password: &str, groups: &[Id]) -> Id {
        let mut state = self.write();

        for &group in groups {
            if let Some(data) = state.groups.get_mut(&group) {
                data.members.push(GroupMember {
                    experimenter_id: id,
                    owner: false,
                });
            }
        }

        let data = ExperimenterData {
            id: Some(id),
            username: username.to_string(),
            first_name: username.to_string(),
            active: true,
            default_group_id: groups.first().copied().unwrap_or_default(),
            groups: groups
                .iter()
                .filter_map(|g| state.groups.get(g).cloned())
                .collect(),
            ..Default::default()
        };

        state.users.insert(
            id,
            MockUser {
                data,
                password: password.to_string(),
            },
        );
        id
    }

    /// Mark a member of a group as one of its owners
    pub fn set_group_owner(&self, group: Id, user: Id) {
        if let Some(data) = self.write().groups.get_mut(&group) {
            for member in data.members.iter_mut().filter(|m| m.experimenter_id == user) {
                member.owner = true;
            }
        }
    }

    pub fn add_project(&self, owner: Id, group: Id, name: &str, description: &str) -> Id {
        let mut state = self.write();
        let id = state.next_id(ObjectKind::Project);
        state.projects.insert(
            id,
            ProjectData {
                id: Some(id),
                name: name.to_string(),
                description: description.to_string(),
                details: details(owner, group),
                datasets: Vec::new(),
            },
        );
        id
    }

    pub fn add_dataset(&self, owner: Id, group: Id, name: &str, project: Option<Id>) -> Id {
        let mut state = self.write();
        let id = state.next_id(ObjectKind::Dataset);
        state.datasets.insert(
            id,
            DatasetData {
                id: Some(id),
                name: name.to_string(),
                details: details(owner, group),
                ..Default::default()
            },
        );
        drop(state);

        if let Some(project) = project {
            self.seed_link(
                LinkKind::ProjectDataset,
                ObjectRef::new(ObjectKind::Project, project),
                ObjectRef::new(ObjectKind::Dataset, id),
            );
        }
        id
    }

    pub fn add_image(&self, owner: Id, group: Id, name: &str, dataset: Option<Id>) -> Id {
        let mut state = self.write();
        let id = state.next_id(ObjectKind::Image);
        state.images.insert(
            id,
            ImageData {
                id: Some(id),
                name: name.to_string(),
                details: details(owner, group),
                acquisition_date: Some(Utc::now()),
                ..Default::default()
            },
        );
        drop(state);

        if let Some(dataset) = dataset {
            self.add_image_to_dataset(dataset, id);
        }
        id
    }

    pub fn add_image_to_dataset(&self, dataset: Id, image: Id) {
        self.seed_link(
            LinkKind::DatasetImage,
            ObjectRef::new(ObjectKind::Dataset, dataset),
            ObjectRef::new(ObjectKind::Image, image),
        );
    }

    pub fn add_tag(&self, owner: Id, group: Id, name: &str, description: &str) -> Id {
        let mut state = self.write();
        let id = state.next_id(ObjectKind::TagAnnotation);
        state.tags.insert(
            id,
            TagData {
                id: Some(id),
                name: name.to_string(),
                description: description.to_string(),
                details: details(owner, group),
                ..Default::default()
            },
        );
        id
    }

    /// Attach a tag to an object
    pub fn tag(&self, target: ObjectRef, tag: Id) {
        if let Some(kind) = annotation_link(target.kind) {
            self.seed_link(kind, target, ObjectRef::new(ObjectKind::TagAnnotation, tag));
        }
    }

    /// Attach a map annotation holding `pairs` to an object
    pub fn add_pairs(&self, owner: Id, group: Id, target: ObjectRef, pairs: &[(&str, &str)]) -> Id {
        let mut state = self.write();
        let id = state.next_id(ObjectKind::MapAnnotation);
        state.maps.insert(
            id,
            MapAnnotationData {
                id: Some(id),
                namespace: None,
                pairs: pairs.iter().map(|(k, v)| NamedValue::new(*k, *v)).collect(),
                details: details(owner, group),
            },
        );
        drop(state);

        if let Some(kind) = annotation_link(target.kind) {
            self.seed_link(kind, target, ObjectRef::new(ObjectKind::MapAnnotation, id));
        }
        id
    }

    pub fn add_folder(&self, owner: Id, group: Id, name: &str) -> Id {
        let mut state = self.write();
        let id = state.next_id(ObjectKind::Folder);
        state.folders.insert(
            id,
            FolderData {
                id: Some(id),
                name: name.to_string(),
                details: details(owner, group),
                ..Default::default()
            },
        );
        id
    }

    pub fn add_roi(&self, owner: Id, group: Id, image: Id, name: &str) -> Id {
        let mut state = self.write();
        let id = state.next_id(ObjectKind::Roi);
        state.rois.insert(
            id,
            RoiData {
                id: Some(id),
                name: name.to_string(),
                image_id: Some(image),
                details: details(owner, group),
                ..Default::default()
            },
        );
        id
    }

    pub fn add_roi_to_folder(&self, roi: Id, folder: Id) {
        self.write().roi_folders.insert((roi, folder));
    }

    fn seed_link(&self, kind: LinkKind, parent: ObjectRef, child: ObjectRef) {
        let mut state = self.write();
        // Seeding the same association twice is harmless
        let _ = state.add_link(LinkData::new(kind, parent, child));
    }

    /// Answer `query` with `results` from `find_all_by_query`
    pub fn on_query(&self, query: &str, results: Vec<ObjectRef>) {
        self.write().queries.insert(query.to_string(), results);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Failure injection
    // ═══════════════════════════════════════════════════════════════════════

    /// Make the next call of `op` fail with `err`
    ///
    /// `op` is the facility method name (`"get_projects"`, `"delete"`, ...),
    /// `"connect"`, or a facility name (`"browse"`, `"roi"`, ...) to fail its
    /// retrieval.
    pub fn fail_next(&self, op: &str, err: GatewayError) {
        self.write().failures.insert(op.to_string(), err);
    }

    /// Keep deletes running forever
    pub fn stall_deletes(&self, stall: bool) {
        self.write().stall_deletes = stall;
    }

    /// Interrupt threads waiting on a delete
    pub fn interrupt_deletes(&self, interrupt: bool) {
        self.write().interrupt_deletes = interrupt;
    }

    /// Simulate the transport dropping
    pub fn drop_connection(&self) {
        self.write().connected = false;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════════

    pub fn contains(&self, target: ObjectRef) -> bool {
        self.read().exists(target)
    }

    /// Times a delete completion handle was polled
    pub fn delete_polls(&self) -> u32 {
        self.read().delete_polls
    }

    /// Times the connection was released
    pub fn disconnect_count(&self) -> u32 {
        self.read().disconnects
    }

    /// ROIs associated with a folder
    pub fn rois_in_folder(&self, folder: Id) -> Vec<Id> {
        self.read()
            .roi_folders
            .iter()
            .filter(|&&(_, f)| f == folder)
            .map(|&(roi, _)| roi)
            .collect()
    }
}

fn annotation_link(kind: ObjectKind) -> Option<LinkKind> {
    match kind {
        ObjectKind::Project => Some(LinkKind::ProjectAnnotation),
        ObjectKind::Dataset => Some(LinkKind::DatasetAnnotation),
        ObjectKind::Image => Some(LinkKind::ImageAnnotation),
        ObjectKind::Folder => Some(LinkKind::FolderAnnotation),
        _ => None,
    }
}

impl Gateway for MockGateway {
    fn connect(&self, credentials: &LoginCredentials) -> GatewayResult<ExperimenterData> {
        let mut state = self.write();
        if let Some(err) = state.failures.remove("connect") {
            return Err(err);
        }

        if credentials.host != self.host || credentials.port != self.port {
            return Err(GatewayError::out_of_service(
                format!("Cannot reach {}:{}", credentials.host, credentials.port),
                ConnectionStatus::Network,
            ));
        }

        let user_id = match &credentials.auth {
            Authentication::Password { username, password } => state
                .users
                .values()
                .find(|u| &u.data.username == username && u.password == password.expose_secret())
                .and_then(|u| u.data.id),
            Authentication::SessionKey(key) => state.sessions.get(key.expose_secret()).copied(),
        };

        let Some(user) = user_id.and_then(|id| state.users.get(&id)).map(|u| u.data.clone())
        else {
            return Err(GatewayError::out_of_service(
                "Login failed",
                ConnectionStatus::Unauthenticated,
            ));
        };

        if let Some(id) = user.id {
            state.sessions.insert(format!("session-{}", id), id);
        }
        state.connected = true;
        Ok(user)
    }

    fn disconnect(&self) {
        let mut state = self.write();
        if state.connected {
            state.connected = false;
            state.disconnects += 1;
        }
    }

    fn is_connected(&self) -> bool {
        self.read().connected
    }

    fn session_id(&self, user: &ExperimenterData) -> GatewayResult<String> {
        self.check("session_id")?;
        let id = user
            .id
            .ok_or_else(|| GatewayError::Server("User has no id".to_string()))?;
        Ok(format!("session-{}", id))
    }

    fn browse(&self) -> GatewayResult<Arc<dyn BrowseFacility>> {
        self.check("browse")?;
        Ok(Arc::new(self.clone()))
    }

    fn admin(&self) -> GatewayResult<Arc<dyn AdminFacility>> {
        self.check("admin")?;
        Ok(Arc::new(self.clone()))
    }

    fn data_manager(&self) -> GatewayResult<Arc<dyn DataManagerFacility>> {
        self.check("data_manager")?;
        Ok(Arc::new(self.clone()))
    }

    fn metadata(&self) -> GatewayResult<Arc<dyn MetadataFacility>> {
        self.check("metadata")?;
        Ok(Arc::new(self.clone()))
    }

    fn query(&self) -> GatewayResult<Arc<dyn QueryService>> {
        self.check("query")?;
        Ok(Arc::new(self.clone()))
    }

    fn roi(&self) -> GatewayResult<Arc<dyn RoiFacility>> {
        self.check("roi")?;
        Ok(Arc::new(self.clone()))
    }
}

impl BrowseFacility for MockGateway {
    fn get_projects(&self, ctx: &SecurityContext, filter: &Filter) -> GatewayResult<Vec<ProjectData>> {
        self.check("get_projects")?;
        let state = self.read();
        let projects = select(&state.projects, ctx, filter, |p| &p.details, |p| &p.name);
        Ok(projects
            .iter()
            .map(|p| state.project_with_datasets(p))
            .collect())
    }

    fn get_datasets(&self, ctx: &SecurityContext, filter: &Filter) -> GatewayResult<Vec<DatasetData>> {
        self.check("get_datasets")?;
        let state = self.read();
        Ok(select(&state.datasets, ctx, filter, |d| &d.details, |d| &d.name))
    }

    fn get_images(&self, ctx: &SecurityContext, filter: &Filter) -> GatewayResult<Vec<ImageData>> {
        self.check("get_images")?;
        let state = self.read();
        Ok(select(&state.images, ctx, filter, |i| &i.details, |i| &i.name))
    }

    fn get_user_images(&self, ctx: &SecurityContext) -> GatewayResult<Vec<ImageData>> {
        self.check("get_user_images")?;
        let state = self.read();
        let mut images = select(&state.images, ctx, &Filter::All, |i| &i.details, |i| &i.name);
        images.retain(|i| i.details.owner_id.is_some() && i.details.owner_id == ctx.experimenter_id());
        Ok(images)
    }

    fn get_images_for_datasets(
        &self,
        ctx: &SecurityContext,
        dataset_ids: &[Id],
    ) -> GatewayResult<Vec<ImageData>> {
        self.check("get_images_for_datasets")?;
        let state = self.read();
        Ok(dataset_ids
            .iter()
            .flat_map(|&dataset| state.linked(LinkKind::DatasetImage, dataset))
            .rev()
            .filter_map(|image| state.images.get(&image))
            .filter(|image| visible(&image.details, ctx))
            .cloned()
            .collect())
    }
}

impl AdminFacility for MockGateway {
    fn lookup_experimenter(
        &self,
        _ctx: &SecurityContext,
        username: &str,
    ) -> GatewayResult<Option<ExperimenterData>> {
        self.check("lookup_experimenter")?;
        Ok(self
            .read()
            .users
            .values()
            .find(|u| u.data.username == username)
            .map(|u| u.data.clone()))
    }

    fn get_experimenter(&self, _ctx: &SecurityContext, id: Id) -> GatewayResult<Option<ExperimenterData>> {
        self.check("get_experimenter")?;
        Ok(self.read().users.get(&id).map(|u| u.data.clone()))
    }

    fn lookup_group(&self, _ctx: &SecurityContext, name: &str) -> GatewayResult<Option<GroupData>> {
        self.check("lookup_group")?;
        Ok(self
            .read()
            .groups
            .values()
            .find(|g| g.name == name)
            .cloned())
    }

    fn get_group(&self, _ctx: &SecurityContext, id: Id) -> GatewayResult<Option<GroupData>> {
        self.check("get_group")?;
        Ok(self.read().groups.get(&id).cloned())
    }
}

/// Completion handle of a mock delete
///
/// The delete is applied on the first poll that is allowed to finish.
struct MockDeleteCallback {
    gateway: MockGateway,
    target: ObjectRef,
}

impl DeleteCallback for MockDeleteCallback {
    fn block(&mut self, timeout: Duration) -> GatewayResult<bool> {
        let mut state = self.gateway.write();
        state.delete_polls += 1;

        if state.interrupt_deletes {
            return Err(GatewayError::Interrupted(format!(
                "wait for deletion of {} interrupted",
                self.target
            )));
        }
        if state.stall_deletes {
            drop(state);
            std::thread::sleep(timeout);
            return Ok(false);
        }

        state.remove(self.target)?;
        Ok(true)
    }
}

impl DataManagerFacility for MockGateway {
    fn save_and_return(&self, ctx: &SecurityContext, object: RemoteObject) -> GatewayResult<RemoteObject> {
        self.check("save")?;
        let owner = ctx
            .experimenter_id()
            .ok_or_else(|| GatewayError::Access("No acting identity".to_string()))?;
        let group = ctx.group_id();
        let mut state = self.write();

        macro_rules! upsert {
            ($map:ident, $data:ident, $kind:expr) => {{
                match $data.id {
                    Some(id) => match state.$map.get(&id) {
                        Some(existing) => $data.details = existing.details.clone(),
                        None => {
                            return Err(GatewayError::Server(format!(
                                "{} {} does not exist",
                                $kind, id
                            )))
                        }
                    },
                    None => {
                        $data.id = Some(state.next_id($kind));
                        $data.details = details(owner, group);
                    }
                }
                let id = $data.id.unwrap_or_default();
                state.$map.insert(id, $data.clone());
                id
            }};
        }

        match object {
            RemoteObject::Project(mut data) => {
                data.datasets.clear();
                upsert!(projects, data, ObjectKind::Project);
                Ok(RemoteObject::Project(state.project_with_datasets(&data)))
            }
            RemoteObject::Dataset(mut data) => {
                let projects = std::mem::take(&mut data.projects);
                let id = upsert!(datasets, data, ObjectKind::Dataset);
                for project in projects {
                    state.add_link(LinkData::new(
                        LinkKind::ProjectDataset,
                        ObjectRef::new(ObjectKind::Project, project),
                        ObjectRef::new(ObjectKind::Dataset, id),
                    ))?;
                }
                Ok(RemoteObject::Dataset(data))
            }
            RemoteObject::Image(mut data) => {
                upsert!(images, data, ObjectKind::Image);
                Ok(RemoteObject::Image(data))
            }
            RemoteObject::Tag(mut data) => {
                upsert!(tags, data, ObjectKind::TagAnnotation);
                Ok(RemoteObject::Tag(data))
            }
            RemoteObject::MapAnnotation(mut data) => {
                upsert!(maps, data, ObjectKind::MapAnnotation);
                Ok(RemoteObject::MapAnnotation(data))
            }
            RemoteObject::Folder(mut data) => {
                upsert!(folders, data, ObjectKind::Folder);
                Ok(RemoteObject::Folder(data))
            }
            RemoteObject::Roi(mut data) => {
                upsert!(rois, data, ObjectKind::Roi);
                Ok(RemoteObject::Roi(data))
            }
            RemoteObject::Link(link) => match link.id {
                Some(_) => Ok(RemoteObject::Link(link)),
                None => state.add_link(link).map(RemoteObject::Link),
            },
        }
    }

    fn delete(&self, ctx: &SecurityContext, target: ObjectRef) -> GatewayResult<Box<dyn DeleteCallback>> {
        self.check("delete")?;
        {
            let state = self.read();
            if let Some(details) = state.details_of(target) {
                let owned = details.owner_id.is_some() && details.owner_id == ctx.experimenter_id();
                if !owned && !state.is_admin(ctx) {
                    return Err(GatewayError::Access(format!(
                        "{} is not owned by the acting user",
                        target
                    )));
                }
            }
        }

        Ok(Box::new(MockDeleteCallback {
            gateway: self.clone(),
            target,
        }))
    }
}

impl MetadataFacility for MockGateway {
    fn get_tags(&self, ctx: &SecurityContext, target: ObjectRef) -> GatewayResult<Vec<TagData>> {
        self.check("get_tags")?;
        let state = self.read();
        let Some(kind) = annotation_link(target.kind) else {
            return Ok(Vec::new());
        };

        Ok(state
            .links
            .values()
            .filter(|l| l.kind == kind && l.parent == target)
            .filter(|l| l.child.kind == ObjectKind::TagAnnotation)
            .filter_map(|l| state.tags.get(&l.child.id))
            .filter(|t| visible(&t.details, ctx))
            .cloned()
            .collect())
    }

    fn get_map_annotations(
        &self,
        ctx: &SecurityContext,
        target: ObjectRef,
    ) -> GatewayResult<Vec<MapAnnotationData>> {
        self.check("get_map_annotations")?;
        let state = self.read();
        let Some(kind) = annotation_link(target.kind) else {
            return Ok(Vec::new());
        };

        Ok(state
            .links
            .values()
            .filter(|l| l.kind == kind && l.parent == target)
            .filter(|l| l.child.kind == ObjectKind::MapAnnotation)
            .filter_map(|l| state.maps.get(&l.child.id))
            .filter(|m| visible(&m.details, ctx))
            .cloned()
            .collect())
    }
}

impl QueryService for MockGateway {
    fn find(&self, ctx: &SecurityContext, kind: ObjectKind, id: Id) -> GatewayResult<Option<RemoteObject>> {
        let found = self.find_all(ctx, kind, &Criteria::ids(vec![id]))?;
        Ok(found.into_iter().next())
    }

    fn find_all(
        &self,
        ctx: &SecurityContext,
        kind: ObjectKind,
        criteria: &Criteria,
    ) -> GatewayResult<Vec<RemoteObject>> {
        self.check("find_all")?;
        let state = self.read();
        let filter = match &criteria.ids {
            Some(ids) => Filter::Ids(ids.clone()),
            None => Filter::All,
        };

        let objects: Vec<RemoteObject> = match kind {
            ObjectKind::Project => select(&state.projects, ctx, &filter, |d| &d.details, |d| &d.name)
                .iter()
                .map(|p| RemoteObject::Project(state.project_with_datasets(p)))
                .collect(),
            ObjectKind::Dataset => select(&state.datasets, ctx, &filter, |d| &d.details, |d| &d.name)
                .into_iter()
                .map(RemoteObject::from)
                .collect(),
            ObjectKind::Image => select(&state.images, ctx, &filter, |d| &d.details, |d| &d.name)
                .into_iter()
                .map(RemoteObject::from)
                .collect(),
            ObjectKind::TagAnnotation => select(&state.tags, ctx, &filter, |d| &d.details, |d| &d.name)
                .into_iter()
                .map(RemoteObject::from)
                .collect(),
            ObjectKind::MapAnnotation => select(&state.maps, ctx, &filter, |d| &d.details, |_| "")
                .into_iter()
                .map(RemoteObject::from)
                .collect(),
            ObjectKind::Folder => select(&state.folders, ctx, &filter, |d| &d.details, |d| &d.name)
                .into_iter()
                .map(RemoteObject::from)
                .collect(),
            ObjectKind::Roi => select(&state.rois, ctx, &filter, |d| &d.details, |d| &d.name)
                .into_iter()
                .map(RemoteObject::from)
                .collect(),
            ObjectKind::Link(link_kind) => state
                .links
                .values()
                .rev()
                .filter(|l| l.kind == link_kind)
                .filter(|l| criteria.ids.as_ref().map_or(true, |ids| l.id.is_some_and(|id| ids.contains(&id))))
                .filter(|l| criteria.parent.map_or(true, |p| l.parent.id == p))
                .filter(|l| criteria.child.map_or(true, |c| l.child.id == c))
                .cloned()
                .map(RemoteObject::Link)
                .collect(),
            ObjectKind::Experimenter | ObjectKind::ExperimenterGroup => {
                return Err(GatewayError::Server(format!("{} is not queryable", kind)));
            }
        };

        Ok(objects)
    }

    fn find_all_by_query(
        &self,
        _ctx: &SecurityContext,
        query: &str,
        _params: &[(String, String)],
    ) -> GatewayResult<Vec<ObjectRef>> {
        self.check("find_all_by_query")?;
        self.read()
            .queries
            .get(query)
            .cloned()
            .ok_or_else(|| GatewayError::Server(format!("Cannot parse query: {}", query)))
    }
}

impl RoiFacility for MockGateway {
    fn load_rois(&self, ctx: &SecurityContext, image_id: Id) -> GatewayResult<Vec<RoiResult>> {
        self.check("load_rois")?;
        let state = self.read();
        let rois = state
            .rois
            .values()
            .rev()
            .filter(|r| r.image_id == Some(image_id) && visible(&r.details, ctx))
            .cloned()
            .collect();
        Ok(vec![RoiResult { image_id, rois }])
    }

    fn save_rois(&self, ctx: &SecurityContext, image_id: Id, rois: &[RoiData]) -> GatewayResult<Vec<RoiData>> {
        self.check("save_rois")?;
        let owner = ctx
            .experimenter_id()
            .ok_or_else(|| GatewayError::Access("No acting identity".to_string()))?;
        let mut state = self.write();

        if !state.images.contains_key(&image_id) {
            return Err(GatewayError::Server(format!("Image {} does not exist", image_id)));
        }

        let mut saved = Vec::with_capacity(rois.len());
        for roi in rois {
            let mut roi = roi.clone();
            roi.image_id = Some(image_id);
            let id = match roi.id {
                Some(id) => id,
                None => {
                    roi.details = details(owner, ctx.group_id());
                    state.next_id(ObjectKind::Roi)
                }
            };
            roi.id = Some(id);
            state.rois.insert(id, roi.clone());
            saved.push(roi);
        }
        Ok(saved)
    }

    fn add_rois_to_folders(
        &self,
        _ctx: &SecurityContext,
        _image_id: Id,
        rois: &[RoiData],
        folders: &[FolderData],
    ) -> GatewayResult<()> {
        self.check("add_rois_to_folders")?;
        let mut state = self.write();
        for roi in rois.iter().filter_map(|r| r.id) {
            for folder in folders.iter().filter_map(|f| f.id) {
                if !state.rois.contains_key(&roi) || !state.folders.contains_key(&folder) {
                    return Err(GatewayError::Server(format!(
                        "Cannot add ROI {} to folder {}",
                        roi, folder
                    )));
                }
                state.roi_folders.insert((roi, folder));
            }
        }
        Ok(())
    }

    fn remove_rois_from_folders(
        &self,
        _ctx: &SecurityContext,
        _image_id: Id,
        rois: &[RoiData],
        folders: &[FolderData],
    ) -> GatewayResult<()> {
        self.check("remove_rois_from_folders")?;
        let mut state = self.write();
        for roi in rois.iter().filter_map(|r| r.id) {
            for folder in folders.iter().filter_map(|f| f.id) {
                state.roi_folders.remove(&(roi, folder));
            }
        }
        Ok(())
    }

    fn load_rois_for_folder(
        &self,
        ctx: &SecurityContext,
        image_id: Id,
        folder_id: Id,
    ) -> GatewayResult<Vec<RoiResult>> {
        self.check("load_rois_for_folder")?;
        let state = self.read();
        let rois = state
            .roi_folders
            .iter()
            .filter(|&&(_, folder)| folder == folder_id)
            .filter_map(|(roi, _)| state.rois.get(roi))
            .filter(|r| r.image_id == Some(image_id) && visible(&r.details, ctx))
            .cloned()
            .collect();
        Ok(vec![RoiResult { image_id, rois }])
    }
}
