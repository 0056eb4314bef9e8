//! Identifier flattening.
//!
//! Every identifier, simple or composite, flattens to an ordered list of
//! scalar tokens joined by single spaces. Association-valued identifier
//! members recurse into the target's own identifier. An entity whose
//! identifier is not fully assigned yet has no flattened form.

use crate::error::{CoreError, CoreResult};
use crate::proxy::EntityRef;
use remorm_meta::EntityMetadata;
use remorm_wire::Value;
use std::collections::BTreeMap;

/// One caller-supplied identifier member.
#[derive(Debug, Clone)]
pub enum IdInput {
    /// A scalar identifier value.
    Value(Value),
    /// A reference standing in for an association-valued member.
    Ref(EntityRef),
}

impl From<Value> for IdInput {
    fn from(value: Value) -> Self {
        IdInput::Value(value)
    }
}

impl From<EntityRef> for IdInput {
    fn from(reference: EntityRef) -> Self {
        IdInput::Ref(reference)
    }
}

/// Caller-supplied identifier, keyed by member name.
pub type IdMap = BTreeMap<String, IdInput>;

/// Wraps a single scalar as the identifier of a single-member class.
pub fn single_id(meta: &EntityMetadata, value: Value) -> CoreResult<IdMap> {
    if meta.identifier().len() != 1 {
        return Err(CoreError::invalid_state(
            meta.class_name(),
            "a composite identifier needs every member spelled out",
        ));
    }
    let mut id = IdMap::new();
    id.insert(meta.identifier()[0].clone(), IdInput::Value(value));
    Ok(id)
}

/// Resolves a caller-supplied identifier to scalar members in metadata
/// order.
///
/// Association-valued members collapse to the target's own scalar
/// identifier; a target with a composite identifier is rejected, and a
/// target that has no identifier yet collapses to null.
pub fn flatten(meta: &EntityMetadata, id: &IdMap) -> CoreResult<Vec<(String, Value)>> {
    let mut members = Vec::with_capacity(meta.identifier().len());
    for member in meta.identifier() {
        let input = id.get(member).ok_or_else(|| {
            CoreError::invalid_state(
                meta.class_name(),
                format!("identifier member '{member}' is missing"),
            )
        })?;
        let value = match input {
            IdInput::Value(value) => {
                if value.to_token().is_none() {
                    return Err(CoreError::invalid_state(
                        meta.class_name(),
                        format!("identifier member '{member}' is not a scalar"),
                    ));
                }
                value.clone()
            }
            IdInput::Ref(target) => target_id_value(meta, member, target)?,
        };
        members.push((member.clone(), value));
    }
    Ok(members)
}

/// Collapses a referenced target to its single scalar identifier value.
pub(crate) fn target_id_value(
    meta: &EntityMetadata,
    member: &str,
    target: &EntityRef,
) -> CoreResult<Value> {
    let target_id = target.id();
    match target_id.len() {
        0 => Ok(Value::Null),
        1 => Ok(target_id.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null)),
        _ => Err(CoreError::hydration(
            meta.class_name(),
            format!("identifier member '{member}' references a composite-keyed class"),
        )),
    }
}

/// Joins flattened members into the identity-map key.
///
/// Returns `None` while any member is unassigned; such an entity cannot
/// be keyed yet.
#[must_use]
pub fn hash_of(members: &[(String, Value)]) -> Option<String> {
    if members.is_empty() {
        return None;
    }
    let mut tokens = Vec::with_capacity(members.len());
    for (_, value) in members {
        match value.to_token() {
            Some(token) if !token.is_empty() => tokens.push(token),
            _ => return None,
        }
    }
    Some(tokens.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use remorm_meta::{
        AssociationMapping, ClassDescription, FieldMapping, MetadataFactory, StaticDriver,
    };

    fn factory() -> MetadataFactory {
        let driver = StaticDriver::new()
            .with(
                ClassDescription::entity("User")
                    .field(FieldMapping::new("id", "id", "string"))
                    .id_field("id"),
            )
            .with(
                ClassDescription::entity("Subscription")
                    .field(FieldMapping::new("plan", "plan", "string"))
                    .association(AssociationMapping::many_to_one("user", "userId", "User"))
                    .id_field("user")
                    .id_field("plan"),
            );
        MetadataFactory::new(Box::new(driver))
    }

    fn user_ref(id: Value) -> EntityRef {
        EntityRef::from_instance("User", "User", vec![("id".to_owned(), id)], Box::new(()))
    }

    #[test]
    fn single_member_flattens_to_one_token() {
        let factory = factory();
        let meta = factory.metadata_for("User").unwrap();
        let id = single_id(&meta, Value::from("u-1")).unwrap();
        let members = flatten(&meta, &id).unwrap();
        assert_eq!(hash_of(&members).as_deref(), Some("u-1"));
    }

    #[test]
    fn composite_members_join_in_metadata_order() {
        let factory = factory();
        let meta = factory.metadata_for("Subscription").unwrap();

        let mut id = IdMap::new();
        id.insert("user".into(), IdInput::Ref(user_ref(Value::from("u-9"))));
        id.insert("plan".into(), IdInput::Value(Value::from("gold")));

        let members = flatten(&meta, &id).unwrap();
        // Identifier order comes from the declaration, not the map.
        assert_eq!(members[0].0, "user");
        assert_eq!(members[1].0, "plan");
        assert_eq!(hash_of(&members).as_deref(), Some("u-9 gold"));
    }

    #[test]
    fn unsaved_target_yields_no_hash() {
        let factory = factory();
        let meta = factory.metadata_for("Subscription").unwrap();

        let mut id = IdMap::new();
        id.insert("user".into(), IdInput::Ref(user_ref(Value::Null)));
        id.insert("plan".into(), IdInput::Value(Value::from("gold")));

        let members = flatten(&meta, &id).unwrap();
        assert!(hash_of(&members).is_none());
    }

    #[test]
    fn missing_member_is_rejected() {
        let factory = factory();
        let meta = factory.metadata_for("Subscription").unwrap();
        let id = IdMap::new();
        assert!(flatten(&meta, &id).is_err());
    }

    proptest::proptest! {
        #[test]
        fn hash_is_stable_for_scalar_pairs(a in "[a-z0-9]{1,8}", b in "[a-z0-9]{1,8}") {
            let members = vec![
                ("user".to_owned(), Value::from(a.as_str())),
                ("plan".to_owned(), Value::from(b.as_str())),
            ];
            let first = hash_of(&members);
            let second = hash_of(&members);
            proptest::prop_assert_eq!(first.clone(), second);
            proptest::prop_assert_eq!(first.unwrap(), format!("{a} {b}"));
        }
    }
}
