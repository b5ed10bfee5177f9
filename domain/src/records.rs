//! Typed views of the two record kinds the tracker stores.

use crate::{DEFAULT_ROLE, DocumentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of change a property describes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PropertyType {
    #[default]
    Feature,
    #[serde(rename = "Fix Bug")]
    FixBug,
    Change,
    Deprecated,
}

impl PropertyType {
    pub const LABELS: [&'static str; 4] = ["Feature", "Fix Bug", "Change", "Deprecated"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Feature => "Feature",
            PropertyType::FixBug => "Fix Bug",
            PropertyType::Change => "Change",
            PropertyType::Deprecated => "Deprecated",
        }
    }
}

/// How much of a change is covered by tests.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TestsScope {
    #[serde(rename = "None")]
    Untested,
    #[default]
    Partial,
    Large,
    Full,
}

impl TestsScope {
    pub const LABELS: [&'static str; 4] = ["None", "Partial", "Large", "Full"];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestsScope::Untested => "None",
            TestsScope::Partial => "Partial",
            TestsScope::Large => "Large",
            TestsScope::Full => "Full",
        }
    }
}

/// One line of a version's change list. Owned by its parent `Version`.
///
/// `kind` and `tests_scope` may be left unset on write; the store fills in
/// the schema defaults, so records read back always carry them.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Property {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PropertyType>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_scope: Option<TestsScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_issues: Option<String>,
}

impl Property {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_kind(mut self, kind: PropertyType) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_tests_scope(mut self, scope: TestsScope) -> Self {
        self.tests_scope = Some(scope);
        self
    }

    pub fn kind(&self) -> PropertyType {
        self.kind.unwrap_or_default()
    }

    pub fn tests_scope(&self) -> TestsScope {
        self.tests_scope.unwrap_or_default()
    }
}

/// One released build. `prev_version` links to the preceding label; the
/// link is not checked for existence or uniqueness.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Version {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<DocumentId>,
    pub version: String,
    pub prev_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_issues: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl Version {
    pub fn new(version: impl Into<String>, prev_version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            prev_version: prev_version.into(),
            ..Self::default()
        }
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn property(&self, id: &DocumentId) -> Option<&Property> {
        self.properties.iter().find(|p| p.id.as_ref() == Some(id))
    }

    pub fn property_mut(&mut self, id: &DocumentId) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.id.as_ref() == Some(id))
    }
}

/// Ordinal access levels. Higher is more privileged.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Banned = 0,
    Guest = 1,
    User = 2,
    Manager = 3,
    Admin = 4,
}

impl Role {
    /// Maps a stored level to a named role; levels outside 0..=4 have none.
    pub fn from_level(level: i64) -> Option<Role> {
        match level {
            0 => Some(Role::Banned),
            1 => Some(Role::Guest),
            2 => Some(Role::User),
            3 => Some(Role::Manager),
            4 => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn level(self) -> i64 {
        self as i64
    }
}

/// An account. `id` is assigned by the caller and unrelated to the
/// store-generated `doc_id`. `role` is a bare integer; nothing restricts it
/// to the named levels.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<DocumentId>,
    pub id: i64,
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_date: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(id: i64, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, level: i64) -> Self {
        self.role = Some(level);
        self
    }

    pub fn role_level(&self) -> i64 {
        self.role.unwrap_or(DEFAULT_ROLE)
    }

    pub fn role(&self) -> Option<Role> {
        Role::from_level(self.role_level())
    }

    pub fn can_view(&self) -> bool {
        self.role_level() >= Role::Guest.level()
    }

    pub fn can_comment(&self) -> bool {
        self.role_level() >= Role::User.level()
    }

    pub fn can_manage_versions(&self) -> bool {
        self.role_level() >= Role::Manager.level()
    }

    pub fn is_admin(&self) -> bool {
        self.role_level() >= Role::Admin.level()
    }
}
