//! Hydration and dehydration.
//!
//! Hydration turns one wire record into a populated instance: the
//! discriminator picks the concrete class, scalar fields run through
//! their converters, single-valued associations become lazy references,
//! and to-many associations become uninitialized collections.
//! Dehydration is the reverse, producing full wire records for creates
//! and the baseline used for patch diffs. References to entities that
//! have no identifier yet dehydrate to null and are reported for a
//! deferred patch.

use crate::entity::{AccessorTable, AssocValue};
use crate::error::{CoreError, CoreResult};
use crate::flatten::{self, IdInput, IdMap};
use crate::proxy::EntityRef;
use crate::uow::UowCore;
use remorm_meta::{AssociationKind, EntityMetadata, FetchMode, IdGeneration};
use remorm_wire::{Record, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

impl UowCore {
    /// Picks the concrete class of a record through the discriminator.
    pub(crate) fn resolve_concrete_class(
        &self,
        meta: &Arc<EntityMetadata>,
        record: &Record,
    ) -> CoreResult<Arc<EntityMetadata>> {
        let Some(disc) = meta.discriminator() else {
            if meta.is_abstract() {
                return Err(CoreError::hydration(
                    meta.class_name(),
                    "abstract class without a discriminator",
                ));
            }
            return Ok(Arc::clone(meta));
        };
        let tag_value = record.get(&disc.field).ok_or_else(|| {
            CoreError::hydration(
                meta.class_name(),
                format!("record is missing discriminator field '{}'", disc.field),
            )
        })?;
        let tag = tag_value.as_text().ok_or_else(|| {
            CoreError::hydration(meta.class_name(), "discriminator tag is not text")
        })?;
        let class = self.services.factory.class_for_tag(meta, tag)?;
        self.meta(&class)
    }

    /// Extracts the identifier members of a record, in metadata order,
    /// as domain values.
    pub(crate) fn id_members_from_record(
        &self,
        meta: &EntityMetadata,
        record: &Record,
    ) -> CoreResult<Vec<(String, Value)>> {
        let mut members = Vec::with_capacity(meta.identifier().len());
        for member in meta.identifier() {
            if let Some(field) = meta.field(member) {
                let wire_value = record.get(&field.wire_name).ok_or_else(|| {
                    CoreError::hydration(
                        meta.class_name(),
                        format!("record is missing identifier field '{}'", field.wire_name),
                    )
                })?;
                let converter = self.services.types.get(&field.type_name)?;
                members.push((member.clone(), converter.from_wire(wire_value, &field.options)?));
                continue;
            }
            let assoc = meta.association(member).ok_or_else(|| {
                CoreError::hydration(
                    meta.class_name(),
                    format!("identifier member '{member}' is not mapped"),
                )
            })?;
            let wire_name = assoc.wire_name.as_ref().ok_or_else(|| {
                CoreError::hydration(
                    meta.class_name(),
                    format!("identifier association '{member}' has no wire field"),
                )
            })?;
            let wire_value = record.get(wire_name).ok_or_else(|| {
                CoreError::hydration(
                    meta.class_name(),
                    format!("record is missing identifier field '{wire_name}'"),
                )
            })?;
            members.push((
                member.clone(),
                self.target_domain_id(&assoc.target_class, wire_value)?,
            ));
        }
        Ok(members)
    }

    /// Converts a wire-side target identifier into its domain value.
    fn target_domain_id(&self, target_class: &str, wire_value: &Value) -> CoreResult<Value> {
        let target_meta = self.meta(target_class)?;
        if target_meta.is_composite() {
            return Err(CoreError::hydration(
                target_meta.class_name(),
                "single-valued references to composite-keyed classes are unsupported",
            ));
        }
        let member = target_meta.identifier().first().cloned().ok_or_else(|| {
            CoreError::hydration(target_meta.class_name(), "target class has no identifier")
        })?;
        match target_meta.field(&member) {
            Some(field) => {
                let converter = self.services.types.get(&field.type_name)?;
                Ok(converter.from_wire(wire_value, &field.options)?)
            }
            None => Ok(wire_value.clone()),
        }
    }

    /// Extracts the identifier members of a live instance.
    pub(crate) fn identifier_of_instance(
        &self,
        meta: &EntityMetadata,
        table: &AccessorTable,
        instance: &dyn Any,
    ) -> CoreResult<Vec<(String, Value)>> {
        let mut members = Vec::with_capacity(meta.identifier().len());
        for member in meta.identifier() {
            if meta.field(member).is_some() {
                members.push((member.clone(), table.get_field(instance, member)?));
                continue;
            }
            let value = match table.get_assoc(instance, member)? {
                AssocValue::Null => Value::Null,
                AssocValue::Ref(target) => flatten::target_id_value(meta, member, &target)?,
                AssocValue::Collection(_) => {
                    return Err(CoreError::hydration(
                        meta.class_name(),
                        format!("identifier member '{member}' is collection-valued"),
                    ));
                }
            };
            members.push((member.clone(), value));
        }
        Ok(members)
    }

    /// Populates `target` from a wire record and marks it initialized.
    pub(crate) fn hydrate_into(
        &self,
        meta: &EntityMetadata,
        record: &Record,
        target: &EntityRef,
    ) -> CoreResult<()> {
        let table = self.services.registry.get(meta.class_name())?;
        let mut instance = table.instantiate();

        for field in meta.fields() {
            let value = match record.get(&field.wire_name) {
                Some(wire_value) => {
                    let converter = self.services.types.get(&field.type_name)?;
                    converter.from_wire(wire_value, &field.options)?
                }
                None if field.nullable => Value::Null,
                None => {
                    return Err(CoreError::hydration(
                        meta.class_name(),
                        format!("record is missing field '{}'", field.wire_name),
                    ));
                }
            };
            table.set_field(instance.as_mut(), &field.name, value)?;
        }

        for assoc in meta.associations() {
            let value = match assoc.kind {
                AssociationKind::OneToMany => AssocValue::Collection(
                    crate::collection::LazyCollection::uninitialized(
                        target,
                        &assoc.name,
                        assoc.fetch == FetchMode::ExtraLazy,
                        self.collection_loader(),
                    ),
                ),
                AssociationKind::OneToOne | AssociationKind::ManyToOne => {
                    if assoc.owning {
                        let wire_name = assoc.wire_name.as_ref().ok_or_else(|| {
                            CoreError::hydration(
                                meta.class_name(),
                                format!("owning association '{}' has no wire field", assoc.name),
                            )
                        })?;
                        match record.get(wire_name) {
                            None if assoc.nullable => AssocValue::Null,
                            None => {
                                return Err(CoreError::hydration(
                                    meta.class_name(),
                                    format!("record is missing field '{wire_name}'"),
                                ));
                            }
                            Some(Value::Null) => AssocValue::Null,
                            Some(wire_value) => {
                                self.reference_from_wire(&assoc.target_class, wire_value)?
                            }
                        }
                    } else {
                        // The inverse side shares the owning record's
                        // identifier.
                        self.inverse_reference(meta, record, &assoc.target_class)?
                    }
                }
            };
            table.set_assoc(instance.as_mut(), &assoc.name, value)?;
        }

        target.set_class(meta.class_name());
        target.attach_instance(instance);
        Ok(())
    }

    fn reference_from_wire(
        &self,
        target_class: &str,
        wire_value: &Value,
    ) -> CoreResult<AssocValue> {
        let target_meta = self.meta(target_class)?;
        let member = target_meta.identifier().first().cloned().ok_or_else(|| {
            CoreError::hydration(target_meta.class_name(), "target class has no identifier")
        })?;
        let domain_value = self.target_domain_id(target_class, wire_value)?;
        let mut id = IdMap::new();
        id.insert(member, IdInput::Value(domain_value));
        Ok(AssocValue::Ref(
            self.reference_for(target_meta.class_name(), &id)?,
        ))
    }

    fn inverse_reference(
        &self,
        meta: &EntityMetadata,
        record: &Record,
        target_class: &str,
    ) -> CoreResult<AssocValue> {
        let own_members = self.id_members_from_record(meta, record)?;
        if own_members.len() != 1 {
            return Err(CoreError::hydration(
                meta.class_name(),
                "inverse one-to-one needs a simple identifier",
            ));
        }
        let target_meta = self.meta(target_class)?;
        let member = target_meta.identifier().first().cloned().ok_or_else(|| {
            CoreError::hydration(target_meta.class_name(), "target class has no identifier")
        })?;
        let mut id = IdMap::new();
        id.insert(member, IdInput::Value(own_members.into_iter().next().map(|(_, v)| v).unwrap_or(Value::Null)));
        Ok(AssocValue::Ref(
            self.reference_for(target_meta.class_name(), &id)?,
        ))
    }

    /// Produces the full wire image of a loaded entity.
    ///
    /// The discriminator tag is emitted alongside the mapped fields.
    /// Returns the record and the owning wire fields whose targets have
    /// no identifier yet.
    pub(crate) fn dehydrate_full(
        &self,
        meta: &EntityMetadata,
        entity: &EntityRef,
    ) -> CoreResult<(Record, Vec<(String, EntityRef)>)> {
        let table = self.services.registry.get(meta.class_name())?;
        let mut record = Record::new();
        if let Some(disc) = meta.discriminator() {
            if let Some(tag) = &disc.value {
                record.insert(disc.field.clone(), Value::Text(tag.clone()));
            }
        }
        let mut deferred: Vec<(String, EntityRef)> = Vec::new();

        entity.with_raw_instance(|instance| {
            for field in meta.fields() {
                let domain_value = table.get_field(instance, &field.name)?;
                let converter = self.services.types.get(&field.type_name)?;
                record.insert(
                    field.wire_name.clone(),
                    converter.to_wire(&domain_value, &field.options)?,
                );
            }
            for assoc in meta.associations() {
                if !assoc.kind.is_single() || !assoc.owning {
                    continue;
                }
                let wire_name = assoc.wire_name.clone().ok_or_else(|| {
                    CoreError::hydration(
                        meta.class_name(),
                        format!("owning association '{}' has no wire field", assoc.name),
                    )
                })?;
                match table.get_assoc(instance, &assoc.name)? {
                    AssocValue::Null => {
                        record.insert(wire_name, Value::Null);
                    }
                    AssocValue::Ref(target) => {
                        if target.has_id() {
                            record.insert(
                                wire_name,
                                self.target_wire_id(&assoc.target_class, &target)?,
                            );
                        } else {
                            record.insert(wire_name.clone(), Value::Null);
                            deferred.push((wire_name, target));
                        }
                    }
                    AssocValue::Collection(_) => {
                        return Err(CoreError::hydration(
                            meta.class_name(),
                            format!("association '{}' holds a collection", assoc.name),
                        ));
                    }
                }
            }
            Ok(())
        })?;
        Ok((record, deferred))
    }

    /// Converts a referenced target's identifier to its wire value.
    pub(crate) fn target_wire_id(
        &self,
        target_class: &str,
        target: &EntityRef,
    ) -> CoreResult<Value> {
        let target_meta = self.meta(target_class)?;
        let member = target_meta.identifier().first().cloned().ok_or_else(|| {
            CoreError::hydration(target_meta.class_name(), "target class has no identifier")
        })?;
        let domain_value = flatten::target_id_value(&target_meta, &member, target)?;
        match target_meta.field(&member) {
            Some(field) => {
                let converter = self.services.types.get(&field.type_name)?;
                Ok(converter.to_wire(&domain_value, &field.options)?)
            }
            None => Ok(domain_value),
        }
    }

    /// Builds the create payload: the full wire image minus any
    /// remote-generated identifier fields.
    pub(crate) fn create_payload(
        &self,
        meta: &EntityMetadata,
        entity: &EntityRef,
    ) -> CoreResult<(Record, Vec<(String, EntityRef)>)> {
        let (mut record, deferred) = self.dehydrate_full(meta, entity)?;
        if meta.id_generation() == IdGeneration::Remote {
            let generated: Vec<String> = meta
                .identifier()
                .iter()
                .filter_map(|member| meta.field(member).map(|f| f.wire_name.clone()))
                .collect();
            for wire_name in generated {
                record.remove(&wire_name);
            }
        }
        Ok((record, deferred))
    }

    /// Translates domain-keyed criteria into wire-keyed criteria,
    /// appending the discriminator filter for polymorphic classes.
    pub(crate) fn dehydrate_criteria(
        &self,
        meta: &EntityMetadata,
        criteria: &Record,
    ) -> CoreResult<Record> {
        let mut wire: Record = BTreeMap::new();
        for (name, value) in criteria {
            if let Some(field) = meta.field(name) {
                let converter = self.services.types.get(&field.type_name)?;
                let converted = match value {
                    // An array stands for an IN filter; convert each
                    // element.
                    Value::Array(items) => {
                        let mut out = Vec::with_capacity(items.len());
                        for item in items {
                            out.push(converter.to_wire(item, &field.options)?);
                        }
                        Value::Array(out)
                    }
                    other => converter.to_wire(other, &field.options)?,
                };
                wire.insert(field.wire_name.clone(), converted);
                continue;
            }
            if let Some(assoc) = meta.association(name) {
                let wire_name = assoc.wire_name.clone().ok_or_else(|| {
                    CoreError::hydration(
                        meta.class_name(),
                        format!("cannot filter by inverse association '{name}'"),
                    )
                })?;
                let target_meta = self.meta(&assoc.target_class)?;
                if target_meta.is_composite() {
                    return Err(CoreError::hydration(
                        meta.class_name(),
                        format!("cannot filter '{name}' by a composite-keyed target"),
                    ));
                }
                // The criterion carries the target's domain identifier;
                // it goes through the same converter as the id field.
                let converted = match target_meta
                    .identifier()
                    .first()
                    .and_then(|member| target_meta.field(member))
                {
                    Some(field) => {
                        let converter = self.services.types.get(&field.type_name)?;
                        match value {
                            Value::Array(items) => {
                                let mut out = Vec::with_capacity(items.len());
                                for item in items {
                                    out.push(converter.to_wire(item, &field.options)?);
                                }
                                Value::Array(out)
                            }
                            other => converter.to_wire(other, &field.options)?,
                        }
                    }
                    None => value.clone(),
                };
                wire.insert(wire_name, converted);
                continue;
            }
            return Err(CoreError::hydration(
                meta.class_name(),
                format!("unknown criteria member '{name}'"),
            ));
        }

        if let Some(disc) = meta.discriminator() {
            if !wire.contains_key(&disc.field) {
                let tags = self
                    .services
                    .factory
                    .discriminator_values_under(meta.class_name())?;
                if !tags.is_empty() {
                    wire.insert(
                        disc.field.clone(),
                        Value::Array(tags.into_iter().map(Value::Text).collect()),
                    );
                }
            }
        }
        Ok(wire)
    }

    /// Translates an identifier into wire-keyed lookup criteria.
    pub(crate) fn id_criteria(
        &self,
        meta: &EntityMetadata,
        members: &[(String, Value)],
    ) -> CoreResult<Record> {
        let mut wire = Record::new();
        for (member, value) in members {
            if let Some(field) = meta.field(member) {
                let converter = self.services.types.get(&field.type_name)?;
                wire.insert(
                    field.wire_name.clone(),
                    converter.to_wire(value, &field.options)?,
                );
                continue;
            }
            let assoc = meta.association(member).ok_or_else(|| {
                CoreError::hydration(
                    meta.class_name(),
                    format!("identifier member '{member}' is not mapped"),
                )
            })?;
            let wire_name = assoc.wire_name.clone().ok_or_else(|| {
                CoreError::hydration(
                    meta.class_name(),
                    format!("identifier association '{member}' has no wire field"),
                )
            })?;
            let target_meta = self.meta(&assoc.target_class)?;
            let converted = match target_meta
                .identifier()
                .first()
                .and_then(|m| target_meta.field(m))
            {
                Some(field) => {
                    let converter = self.services.types.get(&field.type_name)?;
                    converter.to_wire(value, &field.options)?
                }
                None => value.clone(),
            };
            wire.insert(wire_name, converted);
        }
        Ok(wire)
    }
}
