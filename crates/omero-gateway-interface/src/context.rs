//! Security context and login credentials

use crate::Id;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Permission scope for every facility call: the group the call runs in, the
/// identity it acts as, and whether that identity was assumed by impersonation.
///
/// A context is immutable once built. Transitions (group switch, sudo,
/// disconnect) build a new context and replace the old one wholesale, so a
/// holder of an older context keeps seeing the group it was built for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    group_id: Id,
    experimenter_id: Option<Id>,
    sudo: bool,
}

impl SecurityContext {
    /// Context scoped to a group with no acting identity
    pub fn for_group(group_id: Id) -> Self {
        Self {
            group_id,
            experimenter_id: None,
            sudo: false,
        }
    }

    /// Context for an identity that authenticated itself
    pub fn bound(group_id: Id, experimenter_id: Id) -> Self {
        Self {
            group_id,
            experimenter_id: Some(experimenter_id),
            sudo: false,
        }
    }

    /// Context for an identity assumed through impersonation
    ///
    /// This is the only constructor that sets the sudo flag.
    pub fn impersonating(group_id: Id, experimenter_id: Id) -> Self {
        Self {
            group_id,
            experimenter_id: Some(experimenter_id),
            sudo: true,
        }
    }

    /// Same identity and sudo flag, different group
    pub fn switched_to(&self, group_id: Id) -> Self {
        Self {
            group_id,
            experimenter_id: self.experimenter_id,
            sudo: self.sudo,
        }
    }

    pub fn group_id(&self) -> Id {
        self.group_id
    }

    pub fn experimenter_id(&self) -> Option<Id> {
        self.experimenter_id
    }

    pub fn is_sudo(&self) -> bool {
        self.sudo
    }
}

/// How a login proves its identity
#[derive(Debug, Clone)]
pub enum Authentication {
    /// Username and password
    Password {
        username: String,
        password: SecretString,
    },
    /// Join an existing remote session by its key
    SessionKey(SecretString),
}

/// Everything the gateway needs to open a connection
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub host: String,
    pub port: u16,
    pub auth: Authentication,
    /// Requested group; the server may settle on another one
    pub group_id: Option<Id>,
}

impl LoginCredentials {
    pub fn password(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            auth: Authentication::Password {
                username: username.into(),
                password: SecretString::from(password.into()),
            },
            group_id: None,
        }
    }

    pub fn session_key(host: impl Into<String>, port: u16, key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            auth: Authentication::SessionKey(SecretString::from(key.into())),
            group_id: None,
        }
    }

    pub fn with_group(mut self, group_id: Id) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Username for password logins
    pub fn username(&self) -> Option<&str> {
        match &self.auth {
            Authentication::Password { username, .. } => Some(username),
            Authentication::SessionKey(_) => None,
        }
    }
}
