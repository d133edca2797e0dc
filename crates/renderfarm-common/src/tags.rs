//! AWS resource tag constants for renderfarm
//!
//! Resources created by the provisioner are tagged with these keys so they
//! can be recognized in the console and cleaned up by hand.
//!
//! ## Tag Schema
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `renderfarm:tool` | Static identifier ("renderfarm") |
//! | `renderfarm:app` | Application name the resource belongs to |
//! | `renderfarm:created-at` | RFC 3339 creation timestamp |

/// Tag key for tool identification - all renderfarm resources have this
pub const TAG_TOOL: &str = "renderfarm:tool";

/// Tag value for tool identification
pub const TAG_TOOL_VALUE: &str = "renderfarm";

/// Tag key for the application name
pub const TAG_APP: &str = "renderfarm:app";

/// Tag key for creation timestamp (RFC 3339 format)
pub const TAG_CREATED_AT: &str = "renderfarm:created-at";

/// Helper to format creation timestamp for tags
pub fn format_created_at(time: chrono::DateTime<chrono::Utc>) -> String {
    time.to_rfc3339()
}

/// Helper to parse creation timestamp from tags
pub fn parse_created_at(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

/// Standard tag pairs for a resource created now by `app_name`.
pub fn standard_tags(app_name: &str) -> Vec<(&'static str, String)> {
    vec![
        (TAG_TOOL, TAG_TOOL_VALUE.to_string()),
        (TAG_APP, app_name.to_string()),
        (TAG_CREATED_AT, format_created_at(chrono::Utc::now())),
    ]
}
