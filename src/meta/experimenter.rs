//! Experimenters (users)

use omero_gateway_interface::{ExperimenterData, GroupData, Id, ObjectKind};
use std::cmp::Ordering;

use crate::meta::GroupWrapper;
use crate::wrapper::{impl_entity_wrapper, sort_by_name, wrap_by_id};

#[derive(Debug, Clone)]
pub struct ExperimenterWrapper {
    data: ExperimenterData,
}

impl_entity_wrapper!(ExperimenterWrapper, ExperimenterData, ObjectKind::Experimenter);

impl ExperimenterWrapper {
    pub fn new(data: ExperimenterData) -> Self {
        Self { data }
    }

    pub fn user_name(&self) -> &str {
        &self.data.username
    }

    pub fn first_name(&self) -> &str {
        &self.data.first_name
    }

    pub fn set_first_name(&mut self, first_name: impl Into<String>) {
        self.data.first_name = first_name.into();
    }

    pub fn middle_name(&self) -> &str {
        &self.data.middle_name
    }

    pub fn set_middle_name(&mut self, middle_name: impl Into<String>) {
        self.data.middle_name = middle_name.into();
    }

    pub fn last_name(&self) -> &str {
        &self.data.last_name
    }

    pub fn set_last_name(&mut self, last_name: impl Into<String>) {
        self.data.last_name = last_name.into();
    }

    /// "First Last", or the username when both are empty
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.data.first_name, self.data.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.data.username.clone()
        } else {
            full.to_string()
        }
    }

    pub fn email(&self) -> &str {
        &self.data.email
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.data.email = email.into();
    }

    pub fn institution(&self) -> &str {
        &self.data.institution
    }

    pub fn set_institution(&mut self, institution: impl Into<String>) {
        self.data.institution = institution.into();
    }

    pub fn is_active(&self) -> bool {
        self.data.active
    }

    pub fn is_ldap(&self) -> bool {
        self.data.ldap
    }

    /// Member of the system group
    pub fn is_admin(&self) -> bool {
        self.data.is_admin()
    }

    pub fn is_member_of_group(&self, group_id: Id) -> bool {
        self.data.is_member_of_group(group_id)
    }

    /// Groups the experimenter belongs to, sorted by name
    pub fn groups(&self) -> Vec<GroupWrapper> {
        let mut groups: Vec<GroupWrapper> = wrap_by_id(self.data.groups.clone());
        sort_by_name(&mut groups);
        groups
    }

    /// Group sessions open in when no group is requested
    pub fn default_group(&self) -> GroupWrapper {
        let default_id = self.data.default_group_id;
        let data = self
            .data
            .groups
            .iter()
            .find(|g| g.id == Some(default_id))
            .cloned()
            .unwrap_or_else(|| GroupData {
                id: Some(default_id),
                ..Default::default()
            });
        GroupWrapper::new(data)
    }

    pub fn default_group_id(&self) -> Id {
        self.data.default_group_id
    }

    /// Order by last name, then first name
    pub fn cmp_by_name(&self, other: &Self) -> Ordering {
        self.data
            .last_name
            .cmp(&other.data.last_name)
            .then_with(|| self.data.first_name.cmp(&other.data.first_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wrapper::EntityWrapper;
    use omero_gateway_interface::SYSTEM_GROUP_ID;

    fn group(id: Id, name: &str) -> GroupData {
        GroupData {
            id: Some(id),
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn user() -> ExperimenterWrapper {
        ExperimenterWrapper::new(ExperimenterData {
            id: Some(2),
            username: "testUser".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            default_group_id: 3,
            groups: vec![group(4, "testGroup2"), group(3, "testGroup"), group(1, "user")],
            ..Default::default()
        })
    }

    #[test]
    fn test_groups_sorted_by_name() {
        let names: Vec<String> = user().groups().iter().map(|g| g.name().to_string()).collect();
        assert_eq!(names, vec!["testGroup", "testGroup2", "user"]);
    }

    #[test]
    fn test_default_group() {
        let user = user();
        assert_eq!(user.default_group().id(), Some(3));
        assert_eq!(user.default_group().name(), "testGroup");
    }

    #[test]
    fn test_admin_is_system_group_member() {
        assert!(!user().is_admin());

        let root = ExperimenterWrapper::new(ExperimenterData {
            id: Some(0),
            username: "root".to_string(),
            groups: vec![group(SYSTEM_GROUP_ID, "system")],
            ..Default::default()
        });
        assert!(root.is_admin());
        assert_eq!(root.full_name(), "root");
    }

    #[test]
    fn test_cmp_by_name() {
        let a = user();
        let mut data = a.data().clone();
        data.id = Some(5);
        data.last_name = "Another".to_string();
        let b = ExperimenterWrapper::new(data);

        assert_eq!(a.cmp_by_name(&b), Ordering::Greater);
        assert_eq!(a.full_name(), "Test User");
    }

    #[test]
    fn test_setters_update_names_and_contact() {
        let mut user = user();
        user.set_first_name("Jane");
        user.set_middle_name("Q");
        user.set_last_name("Doe");
        user.set_email("jane.doe@example.org");
        user.set_institution("GReD");

        assert_eq!(user.full_name(), "Jane Doe");
        assert_eq!(user.middle_name(), "Q");
        assert_eq!(user.email(), "jane.doe@example.org");
        assert_eq!(user.institution(), "GReD");
        // Identity is untouched
        assert_eq!(user.id(), Some(2));
        assert_eq!(user.user_name(), "testUser");
    }
}
