//! Experimenter groups

use omero_gateway_interface::{GroupData, Id, ObjectKind, PermissionLevel};

use crate::error::Result;
use crate::meta::ExperimenterWrapper;
use crate::session::Session;
use crate::wrapper::{impl_entity_wrapper, Named};

#[derive(Debug, Clone)]
pub struct GroupWrapper {
    data: GroupData,
}

impl_entity_wrapper!(GroupWrapper, GroupData, ObjectKind::ExperimenterGroup);

impl GroupWrapper {
    pub fn new(data: GroupData) -> Self {
        Self { data }
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn description(&self) -> &str {
        &self.data.description
    }

    pub fn permissions(&self) -> PermissionLevel {
        self.data.permissions
    }

    fn member_ids(&self, owners_only: bool) -> Vec<Id> {
        let mut ids: Vec<Id> = self
            .data
            .members
            .iter()
            .filter(|m| !owners_only || m.owner)
            .map(|m| m.experimenter_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Members of the group, sorted by id
    pub fn experimenters(&self, session: &Session) -> Result<Vec<ExperimenterWrapper>> {
        self.member_ids(false)
            .into_iter()
            .map(|id| session.get_user_by_id(id))
            .collect()
    }

    /// Owners of the group, sorted by id
    pub fn leaders(&self, session: &Session) -> Result<Vec<ExperimenterWrapper>> {
        self.member_ids(true)
            .into_iter()
            .map(|id| session.get_user_by_id(id))
            .collect()
    }
}

impl Named for GroupWrapper {
    fn name(&self) -> &str {
        &self.data.name
    }
}
