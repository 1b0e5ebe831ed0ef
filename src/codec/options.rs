//! Rendering options for the schema-object decode path.

use serde::{Deserialize, Serialize};

/// Controls how [`ValueCodec::to_object`](super::ValueCodec::to_object)
/// renders wire values. The encode path takes no options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecodeOptions {
    /// Render `nullValue` as `"NULL_VALUE"` instead of `0`.
    pub enums_as_string: bool,
    /// Render bytes fields as base64. The value schema has none.
    pub bytes_as_base64: bool,
    /// Render default values; implies both `populate_*` flags.
    pub include_defaults: bool,
    /// Render an empty list as `{"values": []}` instead of `{}`.
    pub populate_empty_arrays: bool,
    /// Render an empty struct as `{"fields": {}}` instead of `{}`.
    pub populate_empty_objects: bool,
    /// Add a `"kind"` member naming the populated slot.
    pub include_oneof_markers: bool,
}

impl DecodeOptions {
    /// The options used for end-to-end echo traffic.
    pub fn standard() -> Self {
        Self {
            enums_as_string: true,
            bytes_as_base64: true,
            ..Self::default()
        }
    }

    pub(crate) fn arrays(&self) -> bool {
        self.populate_empty_arrays || self.include_defaults
    }

    pub(crate) fn objects(&self) -> bool {
        self.populate_empty_objects || self.include_defaults
    }
}
