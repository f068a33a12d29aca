use std::fmt;

use serde::{Deserialize, Serialize};

/// Organization every organization-scoped object falls back to when its
/// file does not name one.
pub const DEFAULT_ORGANIZATION: &str = "default";

/// Join key between desired and observed state.
///
/// Organization-scoped types carry the owning organization's name; global
/// types (such as `organization.Organization` itself) carry `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub object_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    pub name: String,
}

impl Identity {
    pub fn global(object_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            organization: None,
            name: name.into(),
        }
    }

    pub fn scoped(
        object_type: impl Into<String>,
        organization: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            organization: Some(organization.into()),
            name: name.into(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.organization.is_none()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.organization {
            Some(org) => write!(f, "{} {}/{}", self.object_type, org, self.name),
            None => write!(f, "{} {}", self.object_type, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_organization_for_scoped_identity() {
        let id = Identity::scoped("bios.Policy", "default", "p1");
        assert_eq!(id.to_string(), "bios.Policy default/p1");
        assert!(!id.is_global());
    }

    #[test]
    fn test_global_identity_differs_from_scoped_with_same_name() {
        let global = Identity::global("organization.Organization", "default");
        let scoped = Identity::scoped("organization.Organization", "default", "default");
        assert_ne!(global, scoped);
        assert_eq!(global.to_string(), "organization.Organization default");
    }
}
