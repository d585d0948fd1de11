pub mod attributed_string_type;
