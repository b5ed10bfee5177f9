use crate::{ApplicationError, Filters, FindOptions, Model, SearchPage, SortBy};
use domain::{DocumentId, Property, Role, User, Version};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// Use cases over the `versions` collection.
#[derive(Debug, Clone)]
pub struct VersionService {
    versions: Model<Version>,
}

impl VersionService {
    pub fn new(versions: Model<Version>) -> Self {
        Self { versions }
    }

    pub fn model(&self) -> &Model<Version> {
        &self.versions
    }

    pub async fn create(&self, version: &Version) -> Result<Version, ApplicationError> {
        self.versions.create(version).await
    }

    pub async fn get(&self, id: &DocumentId) -> Result<Version, ApplicationError> {
        self.versions
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(id.to_string()))
    }

    /// The most recently released version.
    #[instrument(skip(self))]
    pub async fn latest(&self) -> Result<Option<Version>, ApplicationError> {
        let options = FindOptions::new().sort(SortBy::desc("release_date")).limit(1);
        Ok(self.versions.find(&options).await?.into_iter().next())
    }

    /// An unsaved `version` whose `prev_version` points at the latest release.
    pub async fn draft_next(&self, version: impl Into<String>) -> Result<Version, ApplicationError> {
        let prev_version = self
            .latest()
            .await?
            .map(|latest| latest.version)
            .unwrap_or_default();
        Ok(Version::new(version, prev_version))
    }

    pub async fn find_by_label(&self, label: &str) -> Result<Option<Version>, ApplicationError> {
        let mut filters = Filters::new();
        filters.insert("version".to_string(), json!(label));
        self.versions.find_one(filters).await
    }

    /// Text search when `query` has content, otherwise newest-first listing.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage<Version>, ApplicationError> {
        if query.trim().is_empty() {
            let options = FindOptions::new()
                .sort(SortBy::desc("release_date"))
                .offset(offset)
                .limit(limit);
            return self.versions.list_page(options).await;
        }
        self.versions.text_search(query, offset, limit).await
    }

    pub async fn update(&self, id: &DocumentId, version: &Version) -> Result<Version, ApplicationError> {
        self.versions.update(id, version).await
    }

    pub async fn delete(&self, id: &DocumentId) -> Result<bool, ApplicationError> {
        self.versions.delete(id).await
    }

    #[instrument(skip(self, property))]
    pub async fn add_property(
        &self,
        version_id: &DocumentId,
        property: Property,
    ) -> Result<Version, ApplicationError> {
        let mut version = self.get(version_id).await?;
        version.properties.push(Property { id: None, ..property });
        let updated = self.versions.update(version_id, &version).await?;
        info!(version = %updated.version, "Property added");
        Ok(updated)
    }

    #[instrument(skip(self, property))]
    pub async fn update_property(
        &self,
        version_id: &DocumentId,
        property_id: &DocumentId,
        property: Property,
    ) -> Result<Version, ApplicationError> {
        let mut version = self.get(version_id).await?;
        let slot = version
            .property_mut(property_id)
            .ok_or_else(|| ApplicationError::NotFound(property_id.to_string()))?;
        *slot = Property {
            id: Some(property_id.clone()),
            ..property
        };
        self.versions.update(version_id, &version).await
    }

    #[instrument(skip(self))]
    pub async fn remove_property(
        &self,
        version_id: &DocumentId,
        property_id: &DocumentId,
    ) -> Result<Version, ApplicationError> {
        let mut version = self.get(version_id).await?;
        let before = version.properties.len();
        version
            .properties
            .retain(|property| property.id.as_ref() != Some(property_id));
        if version.properties.len() == before {
            return Err(ApplicationError::NotFound(property_id.to_string()));
        }
        self.versions.update(version_id, &version).await
    }

    /// Follows `prev_version` links back from `label`. Stops at a label that
    /// is not stored or at one already visited.
    #[instrument(skip(self))]
    pub async fn history(&self, label: &str) -> Result<Vec<Version>, ApplicationError> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(label.to_string());
        while let Some(current) = next.take() {
            if current.is_empty() || !seen.insert(current.clone()) {
                break;
            }
            let Some(version) = self.find_by_label(&current).await? else {
                debug!(label = %current, "Version chain ends at a missing label");
                break;
            };
            next = Some(version.prev_version.clone());
            chain.push(version);
        }
        Ok(chain)
    }
}

/// Use cases over the `users` collection.
#[derive(Debug, Clone)]
pub struct UserService {
    users: Model<User>,
}

impl UserService {
    pub fn new(users: Model<User>) -> Self {
        Self { users }
    }

    pub fn model(&self) -> &Model<User> {
        &self.users
    }

    /// Stores a new account. The caller-assigned `id` is not checked for
    /// uniqueness.
    pub async fn register(&self, user: &User) -> Result<User, ApplicationError> {
        self.users.create(user).await
    }

    pub async fn get(&self, id: &DocumentId) -> Result<User, ApplicationError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(id.to_string()))
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, ApplicationError> {
        let mut filters = Filters::new();
        filters.insert("username".to_string(), json!(username));
        self.users.find_one(filters).await
    }

    /// Stores any integer as the role level.
    #[instrument(skip(self))]
    pub async fn set_role(&self, id: &DocumentId, level: i64) -> Result<User, ApplicationError> {
        if Role::from_level(level).is_none() {
            warn!(level, "Storing a role level outside the named roles");
        }
        let mut changes = Map::new();
        changes.insert("role".to_string(), Value::from(level));
        self.users.update_fields(id, changes).await
    }

    pub async fn delete(&self, id: &DocumentId) -> Result<bool, ApplicationError> {
        self.users.delete(id).await
    }

    pub async fn search(
        &self,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage<User>, ApplicationError> {
        if query.trim().is_empty() {
            let options = FindOptions::new().sort(SortBy::asc("id")).offset(offset).limit(limit);
            return self.users.list_page(options).await;
        }
        self.users.text_search(query, offset, limit).await
    }
}
