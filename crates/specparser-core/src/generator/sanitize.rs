//! Pre-generation passes: operationId sanitization and auth grouping.

use std::collections::HashSet;

use serde_json::json;

use crate::config::ParseOptions;
use crate::error::{WarningDetail, WarningKind};
use crate::openapi::document::{collect_operations, operation_mut};
use crate::openapi::operations::{resolve_operation_id, AuthDescriptor, AuthScheme, OperationIndex};
use crate::openapi::SpecDocument;
use crate::utils::{is_identifier, sanitize_identifier};
use crate::validator::policy::{is_scheme_supported, OperationPolicy};

/// Rewrite every explicit operationId that is not a plain identifier.
///
/// A rewritten id that collides with another operation's id gets the first free numeric
/// suffix (`get_pets`, `get_pets1`, ...). Both views are rebuilt. Running the pass on its
/// own output changes nothing.
pub fn sanitize_operation_ids(doc: &SpecDocument) -> crate::Result<(SpecDocument, Vec<WarningDetail>)> {
    let operations = collect_operations(doc.unresolved());
    let mut taken: HashSet<String> = HashSet::new();
    let mut pending = Vec::new();
    for (path, method, _, op) in operations {
        let (id, explicit) = resolve_operation_id(method, path, op);
        if explicit && !is_identifier(&id) {
            pending.push((path.to_string(), method, id));
        } else {
            taken.insert(id);
        }
    }

    let renames: Vec<(String, &'static str, String, String)> = pending
        .into_iter()
        .map(|(path, method, id)| {
            let base = sanitize_identifier(&id);
            let mut new_id = base.clone();
            let mut suffix = 0u32;
            while taken.contains(&new_id) {
                suffix += 1;
                new_id = format!("{}{}", base, suffix);
            }
            taken.insert(new_id.clone());
            (path, method, id, new_id)
        })
        .collect();

    if renames.is_empty() {
        return Ok((doc.clone(), Vec::new()));
    }

    let mut sanitized = doc.clone();
    sanitized.update(|value| {
        for (path, method, _, new_id) in &renames {
            if let Some(operation) = operation_mut(value, path, method) {
                operation.insert("operationId".to_string(), json!(new_id));
            }
        }
        Ok(())
    })?;

    let warnings = renames
        .into_iter()
        .map(|(_, _, old_id, new_id)| {
            WarningDetail::new(
                WarningKind::OperationIdSanitized,
                format!("Operation id '{}' was renamed to '{}'", old_id, new_id),
            )
            .with_data(json!({"from": old_id, "to": new_id}))
        })
        .collect();
    Ok((sanitized, warnings))
}

/// Operations sharing one authentication setup
#[derive(Debug, Clone, PartialEq)]
pub struct AuthGroup {
    /// `None` for unauthenticated operations
    pub scheme: Option<AuthScheme>,
    pub operation_ids: Vec<String>,
}

/// Group the given operations by the scheme they will be called with.
///
/// Operations whose auth the policy cannot support get an `UnsupportedAuthType`
/// warning and are grouped as unauthenticated. For alternatives, the first
/// supported scheme is used.
pub fn group_by_auth<'a>(
    index: &OperationIndex,
    operation_ids: impl IntoIterator<Item = &'a str>,
    policy: &dyn OperationPolicy,
    options: &ParseOptions,
) -> (Vec<AuthGroup>, Vec<WarningDetail>) {
    let mut groups: Vec<AuthGroup> = Vec::new();
    let mut warnings = Vec::new();

    for id in operation_ids {
        let Some(entry) = index.by_operation_id(id) else {
            continue;
        };
        let scheme = match &entry.auth {
            Some(auth) if policy.descriptor_error(auth, options).is_none() => match auth {
                AuthDescriptor::Single(scheme) => Some(scheme.clone()),
                AuthDescriptor::MultipleAlternatives(schemes) => schemes
                    .iter()
                    .find(|s| is_scheme_supported(s, options))
                    .cloned(),
                _ => None,
            },
            Some(AuthDescriptor::None) => None,
            _ => {
                let names: Vec<String> = entry
                    .auth
                    .as_ref()
                    .map(|a| a.schemes().into_iter().map(|s| s.name.clone()).collect())
                    .unwrap_or_default();
                warnings.push(
                    WarningDetail::new(
                        WarningKind::UnsupportedAuthType,
                        format!("Authentication of {} is not supported", entry.key),
                    )
                    .with_data(json!({"operationId": entry.operation_id, "schemes": names})),
                );
                None
            }
        };

        let scheme_name = scheme.as_ref().map(|s| s.name.as_str());
        match groups
            .iter_mut()
            .find(|g| g.scheme.as_ref().map(|s| s.name.as_str()) == scheme_name)
        {
            Some(group) => group.operation_ids.push(entry.operation_id.clone()),
            None => groups.push(AuthGroup {
                scheme,
                operation_ids: vec![entry.operation_id.clone()],
            }),
        }
    }
    (groups, warnings)
}
