//! Code generator configuration.
//!
//! Plain TOML, handed in as a string by the embedding tool — the library
//! itself never touches the filesystem.
//!
//! ```toml
//! file-name = "prog.c"
//! emit-comments = false
//! switch-table-min-cases = 8
//! ```

use serde::Deserialize;

fn default_file_name() -> String {
    "main.c".to_string()
}

fn default_emit_comments() -> bool {
    true
}

fn default_switch_table_min_cases() -> usize {
    5
}

/// Options steering assembly emission.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CodegenConfig {
    /// Name stamped into the `.file` directive.
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Whether to write `#` commentary into the assembly.
    #[serde(default = "default_emit_comments")]
    pub emit_comments: bool,

    /// Switches with at least this many cases dispatch through the runtime
    /// hash table; smaller ones use a `beq` comparison chain.
    #[serde(default = "default_switch_table_min_cases")]
    pub switch_table_min_cases: usize,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        CodegenConfig {
            file_name: default_file_name(),
            emit_comments: default_emit_comments(),
            switch_table_min_cases: default_switch_table_min_cases(),
        }
    }
}

impl CodegenConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse codegen config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CodegenConfig::default();
        assert_eq!(config.file_name, "main.c");
        assert!(config.emit_comments);
        assert_eq!(config.switch_table_min_cases, 5);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = CodegenConfig::from_toml("file-name = \"t.c\"").unwrap();
        assert_eq!(config.file_name, "t.c");
        assert!(config.emit_comments);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(CodegenConfig::from_toml("optimize = true").is_err());
    }
}
