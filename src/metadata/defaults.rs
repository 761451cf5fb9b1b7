use serde_json::Value;

use super::MetadataTree;
use crate::schema::{ObjectSchema, RootInfo, Schema};

/// Top-level key holding the output file's root metadata.
pub const ROOT_METADATA_KEY: &str = "File";

/// Session description used when no source supplies one.
pub const DEFAULT_SESSION_DESCRIPTION: &str = "no description";

/// Root metadata seeded below every adapter's contribution.
pub fn default_root_metadata(identifier: &str) -> MetadataTree {
    let mut tree = MetadataTree::new();
    tree.set_path(
        &format!("{ROOT_METADATA_KEY}.session_description"),
        DEFAULT_SESSION_DESCRIPTION,
    );
    tree.set_path(
        &format!("{ROOT_METADATA_KEY}.identifier"),
        Value::String(identifier.to_string()),
    );
    tree
}

/// Metadata schema every composed metadata schema starts from.
///
/// Requires the root `File` block; `Subject` is optional.
pub fn base_metadata_schema() -> Schema {
    let file = ObjectSchema::new()
        .required(
            "session_description",
            Schema::string().with_description("Description of the recording session"),
        )
        .required(
            "identifier",
            Schema::string().with_description("Unique identifier of this output"),
        )
        .required(
            "session_start_time",
            Schema::string()
                .with_format("date-time")
                .with_description("Start time of the recording session"),
        )
        .optional("experimenter", Schema::array_of(Schema::string()))
        .optional("institution", Schema::string())
        .optional("lab", Schema::string())
        .optional("session_id", Schema::string())
        .optional("experiment_description", Schema::string());

    let subject = ObjectSchema::new()
        .optional("subject_id", Schema::string())
        .optional("species", Schema::string())
        .optional("sex", Schema::string())
        .optional("age", Schema::string().with_description("ISO 8601 duration, e.g. P90D"))
        .optional("description", Schema::string());

    let mut root = RootInfo::metadata().root_schema();
    root.properties.insert(ROOT_METADATA_KEY.to_string(), file.into());
    root.properties.insert("Subject".to_string(), subject.into());
    root.required.push(ROOT_METADATA_KEY.to_string());
    Schema::Object(root)
}
