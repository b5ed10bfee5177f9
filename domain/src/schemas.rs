//! Collection schemas of the version tracker.

use crate::records::{PropertyType, TestsScope};
use crate::schema::{CollectionSchema, FieldDefault, FieldDefinition, TextIndex};
use serde_json::json;

pub const VERSIONS_COLLECTION: &str = "versions";
pub const USERS_COLLECTION: &str = "users";

/// Role level given to accounts registered without one (Guest).
pub const DEFAULT_ROLE: i64 = 1;

/// Shape of a released version and its embedded property list, with an
/// equally weighted text index over the free-text fields.
pub fn versions_schema() -> CollectionSchema {
    let property_fields = vec![
        FieldDefinition::text("type")
            .required()
            .one_of(&PropertyType::LABELS)
            .with_default(FieldDefault::Value(json!(PropertyType::Feature.as_str()))),
        FieldDefinition::text("description").required(),
        FieldDefinition::text("tests_scope")
            .required()
            .one_of(&TestsScope::LABELS)
            .with_default(FieldDefault::Value(json!(TestsScope::Partial.as_str()))),
        FieldDefinition::text("tests_details"),
        FieldDefinition::text("known_issues"),
    ];

    CollectionSchema::new(
        VERSIONS_COLLECTION,
        vec![
            FieldDefinition::text("version").required(),
            FieldDefinition::text("prev_version").required(),
            FieldDefinition::text("details"),
            FieldDefinition::text("downloader"),
            FieldDefinition::date("release_date").with_default(FieldDefault::Now),
            FieldDefinition::text("known_issues"),
            FieldDefinition::embedded("properties", property_fields)
                .with_default(FieldDefault::EmptyArray),
        ],
    )
    .with_text_index(
        TextIndex::new()
            .field("details", 1)
            .field("downloader", 1)
            .field("known_issues", 1)
            .field("properties.type", 1)
            .field("properties.description", 1)
            .field("properties.known_issues", 1),
    )
}

/// Shape of an account. `role` carries no allowed-values list: any integer
/// is stored.
pub fn users_schema() -> CollectionSchema {
    CollectionSchema::new(
        USERS_COLLECTION,
        vec![
            FieldDefinition::number("id").required(),
            FieldDefinition::text("username").required(),
            FieldDefinition::text("password").required(),
            FieldDefinition::number("role")
                .required()
                .with_default(FieldDefault::Value(json!(DEFAULT_ROLE))),
            FieldDefinition::date("register_date").with_default(FieldDefault::Now),
        ],
    )
    .with_text_index(TextIndex::new().field("username", 1).field("role", 10))
}
