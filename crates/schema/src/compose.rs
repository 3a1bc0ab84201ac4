//! Merging module fragments into one [`TypeRegistry`].

use std::collections::HashMap;

use tracing::{debug, info};

use crate::{
    Error, Result, is_builtin_scalar,
    registry::{RootTypes, TypeRegistry},
    types::{FieldDef, InputValueDef, SchemaRoots, TypeDef, TypeDefKind, TypeFragment},
};

/// Compose fragments, in the given order, into an immutable registry.
///
/// Base definitions are merged first; two definitions of the same name must
/// have identical bodies. Type extensions are applied afterwards, in fragment
/// order, so a module may extend a type declared by a module listed after it.
/// Finally every type reference is checked against the merged set.
pub fn compose<'a>(
    fragments: impl IntoIterator<Item = &'a TypeFragment>,
) -> Result<TypeRegistry> {
    let fragments: Vec<&TypeFragment> = fragments.into_iter().collect();

    let mut types: Vec<TypeDef> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut origins: HashMap<String, Vec<String>> = HashMap::new();
    let mut declared_roots: Option<(SchemaRoots, String)> = None;

    for fragment in &fragments {
        for def in &fragment.types {
            match index.get(&def.name).copied() {
                Some(i) => {
                    let existing = &mut types[i];
                    if !existing.same_body(def) {
                        let first = origins
                            .get(&def.name)
                            .and_then(|o| o.first())
                            .cloned()
                            .unwrap_or_default();
                        return Err(Error::DuplicateTypeDefinition {
                            name: def.name.clone(),
                            first,
                            second: fragment.locator.clone(),
                        });
                    }
                    if existing.description.is_none() {
                        existing.description.clone_from(&def.description);
                    }
                    debug!(
                        name = %def.name,
                        locator = %fragment.locator,
                        "merged identical type definition"
                    );
                },
                None => {
                    index.insert(def.name.clone(), types.len());
                    types.push(def.clone());
                },
            }
            origins
                .entry(def.name.clone())
                .or_default()
                .push(fragment.locator.clone());
        }

        if let Some(roots) = &fragment.roots {
            match &declared_roots {
                Some((existing, first)) if existing != roots => {
                    return Err(Error::ConflictingSchemaRoots {
                        first: first.clone(),
                        second: fragment.locator.clone(),
                    });
                },
                Some(_) => {},
                None => declared_roots = Some((roots.clone(), fragment.locator.clone())),
            }
        }
    }

    for fragment in &fragments {
        for ext in &fragment.extensions {
            let Some(&i) = index.get(&ext.name) else {
                return Err(Error::UnresolvedTypeReference {
                    name: ext.name.clone(),
                    referenced_by: format!("a type extension in '{}'", fragment.locator),
                });
            };
            apply_extension(&mut types[i], ext, &fragment.locator)?;
            origins
                .entry(ext.name.clone())
                .or_default()
                .push(fragment.locator.clone());
        }
    }

    let roots = resolve_roots(declared_roots.map(|(r, _)| r), &types, &index)?;
    check_references(&types, &index)?;

    let registry = TypeRegistry::new(types, origins, roots);
    info!(
        fragments = fragments.len(),
        types = registry.len(),
        "composed type registry"
    );
    Ok(registry)
}

fn apply_extension(target: &mut TypeDef, ext: &TypeDef, locator: &str) -> Result<()> {
    let expected = target.kind.label();

    match (&mut target.kind, &ext.kind) {
        (TypeDefKind::Scalar, TypeDefKind::Scalar) => Ok(()),
        (
            TypeDefKind::Object { implements, fields },
            TypeDefKind::Object {
                implements: ext_implements,
                fields: ext_fields,
            },
        )
        | (
            TypeDefKind::Interface { implements, fields },
            TypeDefKind::Interface {
                implements: ext_implements,
                fields: ext_fields,
            },
        ) => {
            extend_names(implements, ext_implements);
            extend_fields(&target.name, fields, ext_fields, locator)
        },
        (TypeDefKind::Union { members }, TypeDefKind::Union { members: ext_members }) => {
            extend_names(members, ext_members);
            Ok(())
        },
        (TypeDefKind::Enum { values }, TypeDefKind::Enum { values: ext_values }) => {
            extend_names(values, ext_values);
            Ok(())
        },
        (TypeDefKind::InputObject { fields }, TypeDefKind::InputObject { fields: ext_fields }) => {
            extend_inputs(&target.name, fields, ext_fields, locator)
        },
        _ => Err(Error::ExtensionKindMismatch {
            name: ext.name.clone(),
            expected,
            found: ext.kind.label(),
            locator: locator.to_string(),
        }),
    }
}

fn extend_names(names: &mut Vec<String>, extra: &[String]) {
    for name in extra {
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
}

fn extend_fields(
    type_name: &str,
    fields: &mut Vec<FieldDef>,
    extra: &[FieldDef],
    locator: &str,
) -> Result<()> {
    for field in extra {
        match fields.iter().find(|f| f.name == field.name) {
            Some(existing) if existing.same_shape(field) => {},
            Some(_) => {
                return Err(Error::DuplicateFieldDefinition {
                    type_name: type_name.to_string(),
                    field: field.name.clone(),
                    locator: locator.to_string(),
                });
            },
            None => fields.push(field.clone()),
        }
    }
    Ok(())
}

fn extend_inputs(
    type_name: &str,
    fields: &mut Vec<InputValueDef>,
    extra: &[InputValueDef],
    locator: &str,
) -> Result<()> {
    for field in extra {
        match fields.iter().find(|f| f.name == field.name) {
            Some(existing) if existing.same_shape(field) => {},
            Some(_) => {
                return Err(Error::DuplicateFieldDefinition {
                    type_name: type_name.to_string(),
                    field: field.name.clone(),
                    locator: locator.to_string(),
                });
            },
            None => fields.push(field.clone()),
        }
    }
    Ok(())
}

fn resolve_roots(
    declared: Option<SchemaRoots>,
    types: &[TypeDef],
    index: &HashMap<String, usize>,
) -> Result<RootTypes> {
    let declared = declared.unwrap_or_default();
    let object = |name: &str| {
        index
            .get(name)
            .map(|&i| types[i].is_object())
            .unwrap_or(false)
    };
    let require = |name: String| {
        if object(&name) {
            Ok(name)
        } else {
            Err(Error::MissingQueryRoot { name })
        }
    };

    let query = require(declared.query.unwrap_or_else(|| "Query".to_string()))?;
    let mutation = match declared.mutation {
        Some(name) => Some(require(name)?),
        None => object("Mutation").then(|| "Mutation".to_string()),
    };
    let subscription = match declared.subscription {
        Some(name) => Some(require(name)?),
        None => object("Subscription").then(|| "Subscription".to_string()),
    };

    Ok(RootTypes {
        query,
        mutation,
        subscription,
    })
}

fn check_references(types: &[TypeDef], index: &HashMap<String, usize>) -> Result<()> {
    let known = |name: &str| is_builtin_scalar(name) || index.contains_key(name);
    let unresolved = |name: &str, referenced_by: String| Error::UnresolvedTypeReference {
        name: name.to_string(),
        referenced_by,
    };

    for ty in types {
        match &ty.kind {
            TypeDefKind::Scalar | TypeDefKind::Enum { .. } => {},
            TypeDefKind::Object { implements, fields }
            | TypeDefKind::Interface { implements, fields } => {
                for iface in implements {
                    let is_interface = index
                        .get(iface.as_str())
                        .is_some_and(|&i| matches!(types[i].kind, TypeDefKind::Interface { .. }));
                    if !is_interface {
                        return Err(unresolved(iface, format!("'{}' implements", ty.name)));
                    }
                }
                for field in fields {
                    let base = field.ty.base_name();
                    if !known(base) {
                        return Err(unresolved(base, format!("field '{}.{}'", ty.name, field.name)));
                    }
                    for arg in &field.arguments {
                        let base = arg.ty.base_name();
                        if !known(base) {
                            return Err(unresolved(
                                base,
                                format!("argument '{}' of '{}.{}'", arg.name, ty.name, field.name),
                            ));
                        }
                    }
                }
            },
            TypeDefKind::Union { members } => {
                for member in members {
                    let is_object = index
                        .get(member.as_str())
                        .is_some_and(|&i| types[i].is_object());
                    if !is_object {
                        return Err(unresolved(member, format!("union '{}'", ty.name)));
                    }
                }
            },
            TypeDefKind::InputObject { fields } => {
                for field in fields {
                    let base = field.ty.base_name();
                    if !known(base) {
                        return Err(unresolved(
                            base,
                            format!("input field '{}.{}'", ty.name, field.name),
                        ));
                    }
                }
            },
        }
    }
    Ok(())
}
