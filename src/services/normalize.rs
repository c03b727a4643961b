//! Flattens the raw medical-entity payload embedded in a processing record
//! into a stable, render-ready graph.
//!
//! The upstream payload is free-form: fields go missing, scores arrive as
//! percentages or ratios, ids arrive as numbers or strings, and relationship
//! targets may point at entities that were never emitted. Everything here is
//! tolerant; a missing or misshapen payload yields an empty graph, never an
//! error.

use crate::models::document::{ProcessingRecord, score_value, text_value};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Flattened extraction result: recognized entities plus the attributes the
/// extractor could not attach to any of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityGraph {
    pub entities: Vec<Entity>,
    pub unmapped_attributes: Vec<UnmappedAttribute>,
}

/// One clinically recognized concept with its inferred codes, qualifiers and
/// links to other entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Entity {
    pub id: String,
    pub text: String,
    pub category: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub score: f64,
    pub normalized_value: String,
    pub icd_concepts: Vec<IcdConcept>,
    pub traits: Vec<EntityTrait>,
    pub attributes: Vec<EntityAttribute>,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IcdConcept {
    pub code: String,
    pub description: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityTrait {
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityAttribute {
    pub text: String,
    #[serde(rename = "type")]
    pub attribute_type: String,
    pub score: f64,
    pub relationship_score: f64,
}

/// A typed link to other entities. `targets` holds display text resolved from
/// `target_ids`; ids with no matching entity resolve to a synthesized
/// `Entity <id>` label instead of being dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Relationship {
    #[serde(rename = "type")]
    pub relation_type: String,
    pub target_ids: Vec<String>,
    pub targets: Vec<String>,
    pub score: f64,
}

/// An attribute the extractor detected but could not associate with any entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnmappedAttribute {
    pub text: String,
    #[serde(rename = "type")]
    pub attribute_type: String,
    pub category: String,
    pub score: f64,
    pub traits: Vec<EntityTrait>,
}

/// One row of the initial coding table derived from an entity's top concept.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CodeRow {
    pub code: String,
    pub description: String,
    /// Normalized to [0, 1] via [`normalize_confidence`].
    pub confidence: f64,
    pub category: String,
    pub entity_type: String,
    pub source_text: String,
}

/// Flatten the entity payload of `record` into an [`EntityGraph`].
pub fn normalize_entity_graph(record: Option<&ProcessingRecord>) -> EntityGraph {
    let Some(result) = record.and_then(ProcessingRecord::medical_result) else {
        return EntityGraph::default();
    };

    let entities = normalize_entities(result.get("Entities"));
    let unmapped_attributes = normalize_unmapped(result.get("UnmappedAttributes"));

    EntityGraph {
        entities,
        unmapped_attributes,
    }
}

/// Reconcile percentage-scale and ratio-scale confidences to a [0, 1] ratio.
///
/// Finite values above 1 are read as percentages and divided by 100 (clamped
/// to 1); values already in [0, 1] pass through; anything else is 0.
pub fn normalize_confidence(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    if value > 1.0 {
        return (value / 100.0).min(1.0);
    }
    if (0.0..=1.0).contains(&value) {
        return value;
    }
    0.0
}

/// Render a raw score for display, four decimal places.
pub fn format_score(value: f64) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    format!("{value:.4}")
}

/// Derive the initial coding rows: one per entity, carrying its top inferred
/// concept. Rows with no code, no description and no source text are dropped.
pub fn derive_code_rows(graph: &EntityGraph) -> Vec<CodeRow> {
    graph
        .entities
        .iter()
        .map(|entity| {
            let top = entity.icd_concepts.first();
            let top_score = top.map(|concept| concept.score).unwrap_or(entity.score);
            let description = top
                .map(|concept| concept.description.clone())
                .filter(|description| !description.is_empty())
                .unwrap_or_else(|| entity.text.clone());
            CodeRow {
                code: top.map(|concept| concept.code.clone()).unwrap_or_default(),
                description,
                confidence: normalize_confidence(top_score),
                category: entity.category.clone(),
                entity_type: entity.entity_type.clone(),
                source_text: entity.text.clone(),
            }
        })
        .filter(|row| !row.code.is_empty() || !row.description.is_empty() || !row.source_text.is_empty())
        .collect()
}

/// Mean confidence over the coding rows, as a whole percentage.
pub fn average_confidence(rows: &[CodeRow]) -> u32 {
    if rows.is_empty() {
        return 0;
    }
    let sum: f64 = rows.iter().map(|row| row.confidence).sum();
    ((sum / rows.len() as f64) * 100.0).round() as u32
}

fn normalize_entities(raw: Option<&Value>) -> Vec<Entity> {
    let Some(items) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut entities: Vec<Entity> = items
        .iter()
        .enumerate()
        .map(|(index, item)| normalize_entity(item, index))
        .collect();

    // Resolve relationship targets through an id -> display-text map built
    // over the whole graph before any lookup happens.
    let lookup: HashMap<String, String> = entities
        .iter()
        .map(|entity| (entity.id.clone(), entity.text.clone()))
        .collect();

    for entity in &mut entities {
        for relationship in &mut entity.relationships {
            relationship.targets = relationship
                .target_ids
                .iter()
                .map(|id| resolve_target(&lookup, id))
                .collect();
        }
    }

    entities
}

fn resolve_target(lookup: &HashMap<String, String>, id: &str) -> String {
    lookup
        .get(id)
        .filter(|text| !text.is_empty())
        .cloned()
        .unwrap_or_else(|| format!("Entity {id}"))
}

fn normalize_entity(item: &Value, index: usize) -> Entity {
    let id = item
        .get("Id")
        .and_then(text_value)
        .unwrap_or_else(|| index.to_string());

    let icd_concepts = array_items(item.get("ICD10CMConcepts"))
        .map(|concept| IcdConcept {
            code: string_field(concept, "Code"),
            description: string_field(concept, "Description"),
            score: number_field(concept, "Score"),
        })
        .collect();

    let attributes = array_items(item.get("Attributes"))
        .map(|attribute| EntityAttribute {
            text: string_field(attribute, "Text"),
            attribute_type: string_field(attribute, "Type"),
            score: number_field(attribute, "Score"),
            relationship_score: number_field(attribute, "RelationshipScore"),
        })
        .collect();

    let relationships = array_items(item.get("Relationships"))
        .map(|relationship| Relationship {
            relation_type: string_field(relationship, "Type"),
            target_ids: relationship
                .get("Ids")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(text_value).collect())
                .unwrap_or_default(),
            targets: Vec::new(),
            score: number_field(relationship, "Score"),
        })
        .collect();

    Entity {
        id,
        text: string_field(item, "Text"),
        category: string_field(item, "Category"),
        entity_type: string_field(item, "Type"),
        score: number_field(item, "Score"),
        normalized_value: item
            .get("NormalizedValue")
            .and_then(|value| value.get("Value"))
            .and_then(text_value)
            .unwrap_or_default(),
        icd_concepts,
        traits: normalize_traits(item.get("Traits")),
        attributes,
        relationships,
    }
}

fn normalize_unmapped(raw: Option<&Value>) -> Vec<UnmappedAttribute> {
    let Some(items) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| {
            let attribute = item.get("Attribute");
            let field = |name: &str| {
                attribute
                    .and_then(|a| a.get(name))
                    .and_then(text_value)
                    .unwrap_or_default()
            };
            let score = attribute
                .and_then(|a| a.get("Score"))
                .filter(|value| !value.is_null())
                .or_else(|| item.get("Score"))
                .map(score_value)
                .unwrap_or(0.0);
            let attribute_type = {
                let own = field("Type");
                if own.is_empty() {
                    string_field(item, "Type")
                } else {
                    own
                }
            };
            UnmappedAttribute {
                text: field("Text"),
                attribute_type,
                category: field("Category"),
                score,
                traits: normalize_traits(attribute.and_then(|a| a.get("Traits"))),
            }
        })
        .collect()
}

fn normalize_traits(raw: Option<&Value>) -> Vec<EntityTrait> {
    array_items(raw)
        .map(|item| EntityTrait {
            name: string_field(item, "Name"),
            score: number_field(item, "Score"),
        })
        .collect()
}

fn array_items(raw: Option<&Value>) -> impl Iterator<Item = &Value> {
    raw.and_then(Value::as_array)
        .map(|items| items.iter())
        .into_iter()
        .flatten()
}

fn string_field(item: &Value, field: &str) -> String {
    item.get(field).and_then(text_value).unwrap_or_default()
}

fn number_field(item: &Value, field: &str) -> f64 {
    item.get(field).map(score_value).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> ProcessingRecord {
        ProcessingRecord::from_value(value)
    }

    fn sample_record() -> ProcessingRecord {
        record(json!({
            "DocumentId": "doc-1",
            "ComprehendMedicalResult": {
                "Entities": [
                    {
                        "Id": 0,
                        "Text": "metformin",
                        "Category": "MEDICATION",
                        "Type": "GENERIC_NAME",
                        "Score": "0.9921",
                        "Attributes": [
                            {"Text": "500 mg", "Type": "DOSAGE", "Score": 0.91, "RelationshipScore": 0.99}
                        ],
                        "Relationships": [
                            {"Type": "TEST_TREATS_CONDITION", "Ids": [1, "7"], "Score": 0.8}
                        ]
                    },
                    {
                        "Id": 1,
                        "Text": "type 2 diabetes",
                        "Category": "MEDICAL_CONDITION",
                        "Type": "DX_NAME",
                        "Score": 87.5,
                        "NormalizedValue": {"Value": "diabetes mellitus type 2"},
                        "ICD10CMConcepts": [
                            {"Code": "E11.9", "Description": "Type 2 diabetes mellitus without complications", "Score": 0.83},
                            {"Code": "E11.8", "Description": "Type 2 diabetes with complications", "Score": 0.41}
                        ],
                        "Traits": [{"Name": "DIAGNOSIS", "Score": 0.97}]
                    },
                    {
                        "Text": "lisinopril",
                        "Category": "MEDICATION",
                        "Type": "GENERIC_NAME",
                        "Score": 0.88
                    }
                ],
                "UnmappedAttributes": [
                    {
                        "Type": "SYSTEM_ORGAN_SITE",
                        "Score": 0.42,
                        "Attribute": {
                            "Text": "left arm",
                            "Category": "ANATOMY",
                            "Traits": [{"Name": "SIGN", "Score": 0.31}]
                        }
                    }
                ]
            }
        }))
    }

    #[test]
    fn test_null_record_yields_empty_graph() {
        assert_eq!(normalize_entity_graph(None), EntityGraph::default());
    }

    #[test]
    fn test_record_without_result_yields_empty_graph() {
        let rec = record(json!({"DocumentId": "doc-1"}));
        assert_eq!(normalize_entity_graph(Some(&rec)), EntityGraph::default());
    }

    #[test]
    fn test_non_array_entities_yield_empty_graph() {
        let rec = record(json!({"ComprehendMedicalResult": {"Entities": "oops"}}));
        assert!(normalize_entity_graph(Some(&rec)).entities.is_empty());
    }

    #[test]
    fn test_entities_are_flattened() {
        let graph = normalize_entity_graph(Some(&sample_record()));
        assert_eq!(graph.entities.len(), 3);

        let metformin = &graph.entities[0];
        assert_eq!(metformin.id, "0");
        assert_eq!(metformin.score, 0.9921);
        assert_eq!(metformin.attributes.len(), 1);
        assert_eq!(metformin.attributes[0].attribute_type, "DOSAGE");

        let diabetes = &graph.entities[1];
        assert_eq!(diabetes.normalized_value, "diabetes mellitus type 2");
        assert_eq!(diabetes.icd_concepts.len(), 2);
        assert_eq!(diabetes.icd_concepts[0].code, "E11.9");
        assert_eq!(diabetes.traits[0].name, "DIAGNOSIS");
    }

    #[test]
    fn test_missing_id_falls_back_to_position() {
        let graph = normalize_entity_graph(Some(&sample_record()));
        assert_eq!(graph.entities[2].id, "2");
    }

    #[test]
    fn test_relationship_targets_resolve_or_synthesize() {
        let graph = normalize_entity_graph(Some(&sample_record()));
        let relationship = &graph.entities[0].relationships[0];
        assert_eq!(relationship.relation_type, "TEST_TREATS_CONDITION");
        // Id 1 resolves to the entity's text; id 7 has no entity and gets a
        // synthesized label instead of an error.
        assert_eq!(relationship.targets, vec!["type 2 diabetes", "Entity 7"]);
    }

    #[test]
    fn test_unmapped_attributes_with_item_level_fallbacks() {
        let graph = normalize_entity_graph(Some(&sample_record()));
        assert_eq!(graph.unmapped_attributes.len(), 1);
        let unmapped = &graph.unmapped_attributes[0];
        assert_eq!(unmapped.text, "left arm");
        // Type and Score live on the wrapper item, not the attribute.
        assert_eq!(unmapped.attribute_type, "SYSTEM_ORGAN_SITE");
        assert_eq!(unmapped.score, 0.42);
        assert_eq!(unmapped.category, "ANATOMY");
        assert_eq!(unmapped.traits[0].name, "SIGN");
    }

    #[test]
    fn test_normalize_confidence_rule() {
        assert_eq!(normalize_confidence(0.85), 0.85);
        assert_eq!(normalize_confidence(85.0), 0.85);
        assert_eq!(normalize_confidence(250.0), 1.0);
        assert_eq!(normalize_confidence(0.0), 0.0);
        assert_eq!(normalize_confidence(1.0), 1.0);
        assert_eq!(normalize_confidence(-5.0), 0.0);
        assert_eq!(normalize_confidence(f64::NAN), 0.0);
        assert_eq!(normalize_confidence(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(0.8312345), "0.8312");
        assert_eq!(format_score(f64::NAN), "0.0000");
    }

    #[test]
    fn test_derive_code_rows() {
        let graph = normalize_entity_graph(Some(&sample_record()));
        let rows = derive_code_rows(&graph);
        assert_eq!(rows.len(), 3);

        // Entity with concepts: code and confidence come from the top concept.
        assert_eq!(rows[1].code, "E11.9");
        assert_eq!(rows[1].confidence, 0.83);

        // Entity without concepts: description falls back to the entity text,
        // confidence to the entity's own score.
        assert_eq!(rows[0].code, "");
        assert_eq!(rows[0].description, "metformin");
        assert_eq!(rows[0].confidence, 0.9921);
    }

    #[test]
    fn test_code_rows_drop_fully_empty_entities() {
        let rec = record(json!({
            "ComprehendMedicalResult": {"Entities": [{"Score": 0.5}]}
        }));
        let graph = normalize_entity_graph(Some(&rec));
        assert!(derive_code_rows(&graph).is_empty());
    }

    #[test]
    fn test_average_confidence() {
        let rows = vec![
            CodeRow {
                confidence: 0.8,
                code: "A".into(),
                ..CodeRow::default()
            },
            CodeRow {
                confidence: 0.9,
                code: "B".into(),
                ..CodeRow::default()
            },
        ];
        assert_eq!(average_confidence(&rows), 85);
        assert_eq!(average_confidence(&[]), 0);
    }
}
