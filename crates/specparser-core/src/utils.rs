//! String and path utilities shared by the pipeline stages

use std::path::{Component, Path, PathBuf};

/// Convert a string to snake_case
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    let mut prev_is_lowercase = false;

    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            // Add underscore before uppercase letter if:
            // - Not at the start
            // - Previous character was lowercase
            if i > 0 && prev_is_lowercase {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
            prev_is_lowercase = false;
        } else if ch.is_alphanumeric() {
            result.push(ch);
            prev_is_lowercase = ch.is_lowercase();
        } else {
            if !result.is_empty() && !result.ends_with('_') {
                result.push('_');
            }
            prev_is_lowercase = false;
        }
    }

    result.trim_matches('_').to_string()
}

/// Convert a URL path into UpperCamelCase, dropping separators and parameter braces.
///
/// `/pets/{petId}/owner-info` becomes `PetsPetIdOwnerInfo`.
pub fn path_to_upper_camel_case(path: &str) -> String {
    path.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            }
        })
        .collect()
}

/// Whether the string only contains characters from `[A-Za-z0-9_]`
pub fn is_identifier(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Replace every character outside `[A-Za-z0-9_]` with an underscore
pub fn sanitize_identifier(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Path of `target` relative to the directory `base`, with `/` separators.
///
/// Neither path has to exist. Relative inputs are taken relative to the current directory.
pub fn relative_path(base: &Path, target: &Path) -> std::io::Result<String> {
    let base = absolute(base)?;
    let target = absolute(target)?;
    let base: Vec<Component> = base.components().collect();
    let target: Vec<Component> = target.components().collect();
    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    parts.extend(base[common..].iter().map(|_| "..".to_string()));
    parts.extend(
        target[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    Ok(parts.join("/"))
}

/// Make a path absolute and drop `.` and `..` components without touching the filesystem
fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("findPetsByStatus"), "find_pets_by_status");
        assert_eq!(to_snake_case("FindPetsByStatus"), "find_pets_by_status");
        assert_eq!(to_snake_case("api-key auth"), "api_key_auth");
        assert_eq!(to_snake_case("oauth2.scheme"), "oauth2_scheme");
    }

    #[test]
    fn test_path_to_upper_camel_case() {
        assert_eq!(path_to_upper_camel_case("/pets"), "Pets");
        assert_eq!(
            path_to_upper_camel_case("/pets/{petId}/owner-info"),
            "PetsPetIdOwnerInfo"
        );
        assert_eq!(path_to_upper_camel_case("/v1/store_items"), "V1StoreItems");
        assert_eq!(path_to_upper_camel_case("/"), "");
    }

    #[test]
    fn test_sanitize_identifier_is_idempotent() {
        for raw in ["get-pets", "list.items/v2", "already_ok", "ünïcode id", ""] {
            let once = sanitize_identifier(raw);
            assert_eq!(sanitize_identifier(&once), once);
            assert!(is_identifier(&once));
        }
        assert_eq!(sanitize_identifier("get-pets.v2"), "get_pets_v2");
    }

    #[test]
    fn test_relative_path() -> std::io::Result<()> {
        let base = Path::new("/work/app/appPackage");
        assert_eq!(
            relative_path(base, Path::new("/work/app/appPackage/apiSpecificationFile/openapi.yaml"))?,
            "apiSpecificationFile/openapi.yaml"
        );
        assert_eq!(
            relative_path(base, Path::new("/work/app/./specs/../cards/a.json"))?,
            "../cards/a.json"
        );
        Ok(())
    }
}
