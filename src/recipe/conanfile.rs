//! Edits of the primary recipe's dependency version tables.
//!
//! The bgfx `conanfile.py` pins its bx and bimg versions through methods such
//! as:
//!
//! ```python
//! @property
//! def _bx_version(self):
//!     return {
//!         "1.128.8786": "cci.20230216",
//!         "1.127.8725": "cci.20230120",
//!     }
//! ```
//!
//! A new primary version is added as the first entry of each table. An entry
//! that already exists for the primary version is rewritten in place.

use regex::Regex;

use crate::error::{Error, Result};

/// Indentation used when the table has no entries to copy it from.
const DEFAULT_ENTRY_INDENT: &str = "            ";

/// What happened to a version table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableEdit {
    Inserted,
    Updated,
    Unchanged,
}

/// Map `primary_version` to `dependency_version` in the `_<dependency>_version`
/// table.
///
/// Returns `Ok(None)` when the recipe has no such table. `path` only names the
/// file in errors.
pub fn set_dependency_version(
    path: &str,
    content: &str,
    dependency: &str,
    primary_version: &str,
    dependency_version: &str,
) -> Result<Option<(String, TableEdit)>> {
    let table = Regex::new(&format!(
        r"def _{}_version\(self\):\s*return\s*\{{",
        regex::escape(dependency)
    ))?;
    let Some(found) = table.find(content) else {
        return Ok(None);
    };

    let body_start = found.end();
    let body_end = match content[body_start..].find('}') {
        Some(offset) => body_start + offset,
        None => {
            return Err(Error::Recipe {
                path: path.to_string(),
                message: format!("unterminated _{}_version table", dependency),
            })
        }
    };
    let body = &content[body_start..body_end];

    let entry = Regex::new(&format!(
        r#"["']{}["']\s*:\s*["']([^"']*)["']"#,
        regex::escape(primary_version)
    ))?;
    if let Some(value) = entry.captures(body).and_then(|c| c.get(1)) {
        if value.as_str() == dependency_version {
            return Ok(Some((content.to_string(), TableEdit::Unchanged)));
        }
        let start = body_start + value.start();
        let end = body_start + value.end();
        let mut updated = String::with_capacity(content.len());
        updated.push_str(&content[..start]);
        updated.push_str(dependency_version);
        updated.push_str(&content[end..]);
        return Ok(Some((updated, TableEdit::Updated)));
    }

    let indent = entry_indent(body).unwrap_or(DEFAULT_ENTRY_INDENT);
    let line = format!(
        "\n{}\"{}\": \"{}\",",
        indent, primary_version, dependency_version
    );
    let mut updated = String::with_capacity(content.len() + line.len());
    updated.push_str(&content[..body_start]);
    updated.push_str(&line);
    updated.push_str(&content[body_start..]);
    Ok(Some((updated, TableEdit::Inserted)))
}

/// Leading whitespace of the first entry line in a table body.
fn entry_indent(body: &str) -> Option<&str> {
    let line = body
        .split('\n')
        .skip(1)
        .find(|line| !line.trim().is_empty())?;
    let trimmed = line.trim_start_matches([' ', '\t']);
    if trimmed.starts_with('}') || trimmed.is_empty() {
        return None;
    }
    Some(&line[..line.len() - trimmed.len()])
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH: &str = "recipes/bgfx/all/conanfile.py";

    const CONANFILE: &str = r#"class bgfxConan(ConanFile):
    name = "bgfx"

    @property
    def _bx_version(self):
        return {
            "1.118.8384": "cci.20221116",
            "1.115.8250": "cci.20220730",
        }

    @property
    def _bimg_version(self):
        return {
            "1.118.8384": "cci.20221115",
        }

    def requirements(self):
        self.requires(f"bx/{self._bx_version[self.version]}")
"#;

    #[test]
    fn test_inserts_first_entry() {
        let (updated, edit) = set_dependency_version(PATH, CONANFILE, "bx", "1.128.8786", "8980")
            .unwrap()
            .unwrap();
        assert_eq!(edit, TableEdit::Inserted);
        assert!(updated.contains(
            "        return {\n            \"1.128.8786\": \"8980\",\n            \"1.118.8384\": \"cci.20221116\","
        ));
        assert_eq!(updated.replace("\n            \"1.128.8786\": \"8980\",", ""), CONANFILE);
    }

    #[test]
    fn test_only_named_table_changes() {
        let (updated, _) = set_dependency_version(PATH, CONANFILE, "bimg", "1.128.8786", "1200")
            .unwrap()
            .unwrap();
        assert!(updated.contains("def _bimg_version(self):\n        return {\n            \"1.128.8786\": \"1200\","));
        assert!(!updated.contains("\"1.128.8786\": \"1200\",\n            \"1.118.8384\": \"cci.20221116\""));
    }

    #[test]
    fn test_updates_existing_entry_in_place() {
        let (updated, edit) = set_dependency_version(PATH, CONANFILE, "bx", "1.118.8384", "8400")
            .unwrap()
            .unwrap();
        assert_eq!(edit, TableEdit::Updated);
        assert_eq!(
            updated,
            CONANFILE.replacen("\"1.118.8384\": \"cci.20221116\"", "\"1.118.8384\": \"8400\"", 1)
        );
    }

    #[test]
    fn test_same_value_is_unchanged() {
        let (updated, edit) =
            set_dependency_version(PATH, CONANFILE, "bx", "1.115.8250", "cci.20220730")
                .unwrap()
                .unwrap();
        assert_eq!(edit, TableEdit::Unchanged);
        assert_eq!(updated, CONANFILE);
    }

    #[test]
    fn test_missing_table() {
        let result = set_dependency_version(PATH, CONANFILE, "glslang", "1.0.0", "11").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_empty_table_uses_default_indent() {
        let content = "    def _bx_version(self):\n        return {}\n";
        let (updated, edit) = set_dependency_version(PATH, content, "bx", "1.0.0", "10")
            .unwrap()
            .unwrap();
        assert_eq!(edit, TableEdit::Inserted);
        assert_eq!(
            updated,
            "    def _bx_version(self):\n        return {\n            \"1.0.0\": \"10\",}\n"
        );
    }

    #[test]
    fn test_unterminated_table() {
        let content = "def _bx_version(self):\n    return {\n        \"1.0.0\": \"10\",\n";
        let err = set_dependency_version(PATH, content, "bx", "2.0.0", "11").unwrap_err();
        assert!(err.to_string().contains("unterminated _bx_version table"));
        assert!(err.to_string().contains(PATH));
    }
}
