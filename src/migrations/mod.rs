//! Built-in migrations for the audience-response document collection.

pub mod content_format;
pub mod published_range;

pub use content_format::ContentFormatMigration;
pub use published_range::{published_range, GroupPublishedRangeMigration, PublishedRange};

use crate::registry::MigrationRegistry;

/// Ordered registry of the built-in migrations.
pub fn builtin_registry() -> MigrationRegistry {
    MigrationRegistry::new()
        .register(GroupPublishedRangeMigration)
        .register(ContentFormatMigration)
}
