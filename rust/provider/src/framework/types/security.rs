//! Names used by the security plugin
use crate::attributed_string_type;

attributed_string_type! {
    RoleName,
    "The name of a security role",
    "logs_reader",
    min_length: 1,
    // Role names are stored as document IDs in the security index.
    max_length: 255,
    // The name is used as a single path segment of the REST API.
    regex: "[^/?#\\s]+"
}
