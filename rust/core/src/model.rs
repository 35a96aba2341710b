// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsed model: entity table plus the reference indices built over it

use rustc_hash::FxHashMap;

use crate::entity::Entity;
use crate::index::{build_reference_index, ReferenceIndex, RelationKind, RelationRecord};

/// Read-only entity collection with O(1) id lookup and relation indices.
///
/// Share it between execution units as `Arc<IfcModel>`.
#[derive(Debug, Default)]
pub struct IfcModel {
    entities: Vec<Entity>,
    positions: FxHashMap<u32, usize>,
    property_index: ReferenceIndex,
    type_index: ReferenceIndex,
}

impl IfcModel {
    /// Build the model in one pass over the entities (file order is kept)
    pub fn from_entities(entities: Vec<Entity>) -> Self {
        let mut positions = FxHashMap::with_capacity_and_hasher(entities.len(), Default::default());
        let mut property_relations = Vec::new();
        let mut type_relations = Vec::new();

        for (position, entity) in entities.iter().enumerate() {
            positions.insert(entity.id, position);

            if let Some(record) = RelationRecord::from_entity(entity) {
                match record.kind {
                    RelationKind::DefinesByProperties => property_relations.push(record),
                    RelationKind::DefinesByType => type_relations.push(record),
                }
            }
        }

        let property_index = build_reference_index(&property_relations);
        let type_index = build_reference_index(&type_relations);

        tracing::debug!(
            entities = entities.len(),
            property_links = property_index.total_references(),
            type_links = type_index.total_references(),
            "Built model indices"
        );

        Self {
            entities,
            positions,
            property_index,
            type_index,
        }
    }

    /// All entities in file order
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Look up an entity by id
    #[inline]
    pub fn get(&self, id: u32) -> Option<&Entity> {
        self.positions.get(&id).map(|&pos| &self.entities[pos])
    }

    /// Property definitions attached to an object (IFCRELDEFINESBYPROPERTIES)
    #[inline]
    pub fn property_definitions(&self, id: u32) -> &[u32] {
        self.property_index.get(id)
    }

    /// Type objects attached to an object (IFCRELDEFINESBYTYPE)
    #[inline]
    pub fn type_objects(&self, id: u32) -> &[u32] {
        self.type_index.get(id)
    }

    pub fn property_index(&self) -> &ReferenceIndex {
        &self.property_index
    }

    pub fn type_index(&self) -> &ReferenceIndex {
        &self.type_index
    }

    /// Count entities by type name
    pub fn count_by_type(&self) -> FxHashMap<&str, usize> {
        let mut counts = FxHashMap::default();
        for entity in &self.entities {
            *counts.entry(entity.type_name.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{parse_bytes, StreamConfig};

    #[test]
    fn test_model_indices() {
        let content = "DATA;
#1=IFCWALL('w',$,$,$,$,$,$,$);
#2=IFCPROPERTYSET('p',$,'Pset_WallCommon',$,(#3));
#3=IFCPROPERTYSINGLEVALUE('FireRating',$,IFCLABEL('2HR'),$);
#4=IFCRELDEFINESBYPROPERTIES('r',$,$,$,(#1),#2);
#5=IFCWALLTYPE('t',$,'Type',$,$,(#2),$,$,$,.SOLIDWALL.);
#6=IFCRELDEFINESBYTYPE('rt',$,$,$,(#1),#5);
ENDSEC;
";
        let parsed = parse_bytes(content.as_bytes(), StreamConfig::default());
        let model = IfcModel::from_entities(parsed.entities);

        assert_eq!(model.len(), 6);
        assert_eq!(model.get(3).map(|e| e.type_name.as_str()), Some("IFCPROPERTYSINGLEVALUE"));
        assert!(model.get(99).is_none());
        assert_eq!(model.property_definitions(1), &[2]);
        assert_eq!(model.type_objects(1), &[5]);
        assert!(model.property_definitions(2).is_empty());
        assert_eq!(model.count_by_type().get("IFCWALL"), Some(&1));
    }

    #[test]
    fn test_indices_follow_relation_order() {
        let content = "DATA;
#1=IFCWALL('w',$,$,$,$,$,$,$);
#10=IFCRELDEFINESBYPROPERTIES('a',$,$,$,(#1),#21);
#11=IFCRELDEFINESBYPROPERTIES('b',$,$,$,(#1),$);
#12=IFCRELDEFINESBYTYPE('c',$,$,$,(#1),#30);
#13=IFCRELDEFINESBYPROPERTIES('d',$,$,$,(#1,#1),#20);
#14=IFCRELDEFINESBYPROPERTIES('e',$,$,$,(#1),#21);
ENDSEC;
";
        let parsed = parse_bytes(content.as_bytes(), StreamConfig::default());
        let model = IfcModel::from_entities(parsed.entities);

        // Missing relating definition skipped; repeats across relations kept in order
        assert_eq!(model.property_definitions(1), &[21, 20, 21]);
        assert_eq!(model.type_objects(1), &[30]);
    }
}
