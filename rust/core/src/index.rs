// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Relation records and the object → definition reference index

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::entity::Entity;

/// Relationship entity kinds that attach definitions to objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RelationKind {
    /// IFCRELDEFINESBYPROPERTIES: objects → property set / element quantity
    DefinesByProperties,
    /// IFCRELDEFINESBYTYPE: objects → type object
    DefinesByType,
}

impl RelationKind {
    /// Map an entity type name to a relation kind
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        if type_name.eq_ignore_ascii_case("IFCRELDEFINESBYPROPERTIES") {
            Some(RelationKind::DefinesByProperties)
        } else if type_name.eq_ignore_ascii_case("IFCRELDEFINESBYTYPE") {
            Some(RelationKind::DefinesByType)
        } else {
            None
        }
    }

    /// (related objects, relating definition) argument positions
    fn positions(self) -> (usize, usize) {
        match self {
            // IfcRelDefinesByProperties: [4]=RelatedObjects, [5]=RelatingPropertyDefinition
            RelationKind::DefinesByProperties => (4, 5),
            // IfcRelDefinesByType: [4]=RelatedObjects, [5]=RelatingType
            RelationKind::DefinesByType => (4, 5),
        }
    }
}

/// Relationship view over an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRecord {
    pub relation_id: u32,
    pub kind: RelationKind,
    pub related_objects: Vec<u32>,
    pub relating_definition: Option<u32>,
}

impl RelationRecord {
    /// Build the view for relationship entities; other entities yield `None`
    pub fn from_entity(entity: &Entity) -> Option<Self> {
        let kind = RelationKind::from_type_name(&entity.type_name)?;
        let (related_idx, relating_idx) = kind.positions();

        let mut related_objects = Vec::new();
        for id in entity.get_ref_list(related_idx) {
            if !related_objects.contains(&id) {
                related_objects.push(id);
            }
        }

        Some(Self {
            relation_id: entity.id,
            kind,
            related_objects,
            relating_definition: entity.get_ref(relating_idx),
        })
    }
}

/// Object id → definition ids, in relation processing order.
///
/// Built once per file and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    entries: FxHashMap<u32, SmallVec<[u32; 2]>>,
    total: usize,
}

impl ReferenceIndex {
    /// Definitions attached to `id`; empty when there are none
    #[inline]
    pub fn get(&self, id: u32) -> &[u32] {
        self.entries.get(&id).map(|defs| defs.as_slice()).unwrap_or(&[])
    }

    /// Append a definition to an object's entry
    pub fn insert(&mut self, object_id: u32, definition_id: u32) {
        self.entries.entry(object_id).or_default().push(definition_id);
        self.total += 1;
    }

    /// Number of objects with at least one definition
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of object → definition references
    pub fn total_references(&self) -> usize {
        self.total
    }
}

/// Build an index from relation records.
///
/// Records without related objects or without a relating definition are skipped.
pub fn build_reference_index<'a>(records: impl IntoIterator<Item = &'a RelationRecord>) -> ReferenceIndex {
    let mut index = ReferenceIndex::default();
    for record in records {
        let Some(definition) = record.relating_definition else {
            continue;
        };
        for &object in &record.related_objects {
            index.insert(object, definition);
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_record;

    fn record(text: &str) -> RelationRecord {
        RelationRecord::from_entity(&parse_record(text).unwrap()).unwrap()
    }

    #[test]
    fn test_relation_record_view() {
        let rel = record("#10=IFCRELDEFINESBYPROPERTIES('g',$,$,$,(#1,#2,#1),#3);");
        assert_eq!(rel.relation_id, 10);
        assert_eq!(rel.kind, RelationKind::DefinesByProperties);
        assert_eq!(rel.related_objects, vec![1, 2]);
        assert_eq!(rel.relating_definition, Some(3));

        let wall = parse_record("#1=IFCWALL('g',$,$,$,$,$,$,$);").unwrap();
        assert!(RelationRecord::from_entity(&wall).is_none());
    }

    #[test]
    fn test_build_preserves_order_and_duplicates() {
        let records = vec![
            record("#10=IFCRELDEFINESBYPROPERTIES('a',$,$,$,(#1,#2),#5);"),
            record("#11=IFCRELDEFINESBYPROPERTIES('b',$,$,$,(#1),#6);"),
            record("#12=IFCRELDEFINESBYPROPERTIES('c',$,$,$,(#1),#5);"),
        ];
        let index = build_reference_index(&records);

        assert_eq!(index.get(1), &[5, 6, 5]);
        assert_eq!(index.get(2), &[5]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.total_references(), 4);
    }

    #[test]
    fn test_incomplete_relations_are_skipped() {
        let records = vec![
            record("#10=IFCRELDEFINESBYPROPERTIES('a',$,$,$,(#1),$);"),
            record("#11=IFCRELDEFINESBYPROPERTIES('b',$,$,$,(),#6);"),
            record("#12=IFCRELDEFINESBYPROPERTIES('c',$,$,$,$,#7);"),
        ];
        let index = build_reference_index(&records);
        assert!(index.is_empty());
    }

    #[test]
    fn test_unknown_id_returns_empty() {
        let index = ReferenceIndex::default();
        assert!(index.get(42).is_empty());
    }
}
