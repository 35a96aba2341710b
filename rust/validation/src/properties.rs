// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property set resolution through the reference index

use ifc_ids_core::{Entity, IfcModel, Value};

/// Resolved property or quantity set
#[derive(Debug, Clone)]
pub struct PropertySetView<'m> {
    pub id: u32,
    pub name: &'m str,
    pub properties: Vec<PropertyView<'m>>,
}

/// Resolved property; `values` is empty for presence-only property kinds
#[derive(Debug, Clone)]
pub struct PropertyView<'m> {
    pub name: &'m str,
    pub values: Vec<&'m Value>,
}

/// Property sets of an object: its own definitions first, then those of its type.
///
/// Definitions that are missing from the model or are not property/quantity
/// sets are ignored.
pub fn property_sets(model: &IfcModel, entity_id: u32) -> Vec<PropertySetView<'_>> {
    let mut sets: Vec<PropertySetView<'_>> = model
        .property_definitions(entity_id)
        .iter()
        .filter_map(|&id| resolve_definition(model, id))
        .collect();

    for &type_id in model.type_objects(entity_id) {
        let Some(type_object) = model.get(type_id) else {
            continue;
        };
        // IfcTypeObject: [5]=HasPropertySets
        for pset_id in type_object.get_ref_list(5) {
            if sets.iter().any(|set| set.id == pset_id) {
                continue;
            }
            if let Some(set) = resolve_definition(model, pset_id) {
                sets.push(set);
            }
        }
    }

    sets
}

/// Resolve one property definition entity
pub fn resolve_definition(model: &IfcModel, definition_id: u32) -> Option<PropertySetView<'_>> {
    let entity = model.get(definition_id)?;
    let type_name = entity.type_name.as_str();

    // IfcPropertySet: [2]=Name, [4]=HasProperties
    // IfcElementQuantity: [2]=Name, [5]=Quantities
    let members = if type_name.eq_ignore_ascii_case("IFCPROPERTYSET") {
        entity.get_ref_list(4)
    } else if type_name.eq_ignore_ascii_case("IFCELEMENTQUANTITY") {
        entity.get_ref_list(5)
    } else {
        return None;
    };

    let properties = members
        .into_iter()
        .filter_map(|id| model.get(id))
        .filter_map(resolve_property)
        .collect();

    Some(PropertySetView {
        id: definition_id,
        name: entity.get_string(2).unwrap_or_default(),
        properties,
    })
}

fn resolve_property(entity: &Entity) -> Option<PropertyView<'_>> {
    let type_name = entity.type_name.to_ascii_uppercase();
    if !type_name.starts_with("IFCPROPERTY") && !type_name.starts_with("IFCQUANTITY") {
        return None;
    }

    // IfcProperty*: [0]=Name; IfcPhysicalSimpleQuantity: [0]=Name
    let name = entity.get_string(0)?;

    let values = match type_name.as_str() {
        // IfcPropertySingleValue: [2]=NominalValue
        "IFCPROPERTYSINGLEVALUE" => entity.get(2).filter(|v| !v.is_null()).into_iter().collect(),
        // IfcPropertyEnumeratedValue / IfcPropertyListValue: [2]=list of values
        "IFCPROPERTYENUMERATEDVALUE" | "IFCPROPERTYLISTVALUE" => {
            entity.get_list(2).map(|items| items.iter().collect()).unwrap_or_default()
        }
        // IfcQuantityLength/Area/Volume/Count/Weight/Time: [3]=value
        t if t.starts_with("IFCQUANTITY") => entity.get(3).filter(|v| !v.is_null()).into_iter().collect(),
        _ => Vec::new(),
    };

    Some(PropertyView { name, values })
}
