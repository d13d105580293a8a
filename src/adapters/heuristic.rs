//! Deterministic rule-based executor.
//!
//! Understands ontology documents written as simple statements, one per
//! sentence:
//!
//! ```text
//! # comments are ignored
//! Person isA Entity.
//! Organization isA Entity.
//! Person hasAttribute age.
//! Person worksFor Organization.
//! ```
//!
//! `isA` / `subClassOf` declare the class hierarchy, `hasAttribute` /
//! `hasProperty` declare attributes, anything else declares a relation type
//! with the subject as domain and the object as range.
//!
//! Source sentences are read the same way: `Alice is a Person.` introduces
//! an entity, `Alice has age 42.` an attribute value, `Alice worksFor Acme.`
//! a relationship. The same input always yields the same output.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ExecutionRequest, Executor, ExecutorOutput};

pub const ALIGNMENT_TASK: &str = "Ontology_Alignment";
pub const EXTRACTION_TASK: &str = "Attribute_Extraction";
pub const LINKING_TASK: &str = "Relationship_Establishment";
pub const VALIDATION_TASK: &str = "Quality_Validation";

/// Offline executor producing knowledge-graph JSON without an LLM
#[derive(Debug, Default)]
pub struct HeuristicExecutor;

impl HeuristicExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Produce the output for a request
    pub fn respond(&self, request: &ExecutionRequest) -> Value {
        let rules = RuleSet::parse(request.ontology.as_deref().unwrap_or(""));
        let source = request.input("source_text");

        match request.task.as_str() {
            ALIGNMENT_TASK => align(&rules),
            EXTRACTION_TASK => extract(&rules, request, source),
            LINKING_TASK => link(&rules, request, source),
            VALIDATION_TASK => validate(&rules, request),
            other => json!({
                "task": other,
                "role": request.role,
                "inputs": request.context.iter().map(|c| c.file_name.as_str()).collect::<Vec<_>>(),
            }),
        }
    }
}

#[async_trait]
impl Executor for HeuristicExecutor {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn execute(
        &self,
        request: &ExecutionRequest,
        _timeout: Duration,
    ) -> Result<ExecutorOutput> {
        let value = self.respond(request);
        Ok(ExecutorOutput::new(serde_json::to_string(&value)?))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

/// Rules parsed from the ontology document
#[derive(Debug, Default)]
pub struct RuleSet {
    /// class -> parent
    classes: BTreeMap<String, Option<String>>,
    /// (class, attribute)
    attributes: BTreeSet<(String, String)>,
    /// (domain, predicate, range)
    relations: BTreeSet<(String, String, String)>,
}

impl RuleSet {
    pub fn parse(text: &str) -> Self {
        let mut rules = Self::default();

        for statement in sentences(text) {
            let tokens: Vec<&str> = statement.split_whitespace().collect();
            if tokens.len() < 3 {
                continue;
            }
            let subject = tokens[0].to_string();
            let predicate = tokens[1];
            let object = tokens[2..].join(" ");

            match predicate {
                "isA" | "is_a" | "subClassOf" => {
                    rules.classes.entry(object.clone()).or_insert(None);
                    rules.classes.insert(subject, Some(object));
                }
                "hasAttribute" | "hasProperty" => {
                    rules.classes.entry(subject.clone()).or_insert(None);
                    rules.attributes.insert((subject, object));
                }
                _ => {
                    rules.classes.entry(subject.clone()).or_insert(None);
                    rules.classes.entry(object.clone()).or_insert(None);
                    rules
                        .relations
                        .insert((subject, predicate.to_string(), object));
                }
            }
        }

        rules
    }

    /// Classes without a parent
    pub fn top_level_classes(&self) -> Vec<&str> {
        self.classes
            .iter()
            .filter(|(_, parent)| parent.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// `class` equals `ancestor` or descends from it
    pub fn is_a(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class);
        let mut seen = BTreeSet::new();
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            if !seen.insert(c) {
                break;
            }
            current = self.classes.get(c).and_then(|p| p.as_deref());
        }
        false
    }

    fn canonical_class(&self, name: &str) -> Option<&str> {
        self.classes
            .keys()
            .find(|c| c.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    fn canonical_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(_, a)| a.eq_ignore_ascii_case(name))
            .map(|(_, a)| a.as_str())
    }

    fn declares_attribute(&self, class: &str, attribute: &str) -> bool {
        self.attributes
            .iter()
            .any(|(c, a)| a == attribute && self.is_a(class, c))
    }

    fn is_relation(&self, predicate: &str) -> bool {
        self.relations.iter().any(|(_, p, _)| p == predicate)
    }

    fn permits(&self, subject_class: &str, predicate: &str, object_class: &str) -> bool {
        self.relations.iter().any(|(domain, p, range)| {
            p == predicate && self.is_a(subject_class, domain) && self.is_a(object_class, range)
        })
    }
}

/// Split text into sentences, dropping `#` comment lines
fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut current = String::new();
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            let boundary = matches!(c, '.' | '!' | '?' | ';')
                && chars.peek().map_or(true, |n| n.is_whitespace());
            if boundary {
                push_sentence(&mut out, &current);
                current.clear();
            } else {
                current.push(c);
            }
        }
        push_sentence(&mut out, &current);
    }

    out
}

fn push_sentence(out: &mut Vec<String>, sentence: &str) {
    let trimmed = sentence.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Class table from an upstream artifact, falling back to the rules
fn known_classes(rules: &RuleSet, request: &ExecutionRequest) -> Vec<String> {
    let from_context: Vec<String> = context_values(request, "classes")
        .iter()
        .filter_map(|c| c.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect();

    if from_context.is_empty() {
        rules.classes.keys().cloned().collect()
    } else {
        from_context
    }
}

/// Array field collected from every context artifact that has it
fn context_values(request: &ExecutionRequest, field: &str) -> Vec<Value> {
    request
        .context
        .iter()
        .filter_map(|c| serde_json::from_str::<Value>(&c.content).ok())
        .filter_map(|v| v.get(field).and_then(Value::as_array).cloned())
        .flatten()
        .collect()
}

fn align(rules: &RuleSet) -> Value {
    let classes: Vec<Value> = rules
        .classes
        .iter()
        .map(|(name, parent)| json!({ "name": name, "parent": parent }))
        .collect();
    let attributes: Vec<Value> = rules
        .attributes
        .iter()
        .map(|(class, attribute)| json!({ "class": class, "attribute": attribute }))
        .collect();
    let relations: Vec<Value> = rules
        .relations
        .iter()
        .map(|(s, p, o)| json!({ "domain": s, "predicate": p, "range": o }))
        .collect();

    json!({
        "task": ALIGNMENT_TASK,
        "classes": classes,
        "top_level_classes": rules.top_level_classes(),
        "attributes": attributes,
        "relations": relations,
    })
}

fn extract(rules: &RuleSet, request: &ExecutionRequest, source: &str) -> Value {
    let classes = known_classes(rules, request);
    let mut entities: Vec<Value> = Vec::new();
    let mut entity_classes: BTreeMap<String, String> = BTreeMap::new();
    let mut attributes: Vec<Value> = Vec::new();

    for sentence in sentences(source) {
        let tokens: Vec<&str> = sentence.split_whitespace().collect();
        if tokens.len() < 4 {
            continue;
        }

        let is_article = tokens[2].eq_ignore_ascii_case("a") || tokens[2].eq_ignore_ascii_case("an");
        if tokens[1].eq_ignore_ascii_case("is") && is_article {
            let candidate = tokens[3..].join(" ");
            if let Some(class) = classes.iter().find(|c| c.eq_ignore_ascii_case(&candidate)) {
                if !entity_classes.contains_key(tokens[0]) {
                    entity_classes.insert(tokens[0].to_string(), class.clone());
                    entities.push(json!({
                        "name": tokens[0],
                        "class": class,
                        "evidence": sentence,
                    }));
                }
            }
        } else if tokens[1].eq_ignore_ascii_case("has") {
            if let Some(attribute) = rules.canonical_attribute(tokens[2]) {
                attributes.push(json!({
                    "entity": tokens[0],
                    "class": entity_classes.get(tokens[0]),
                    "attribute": attribute,
                    "value": tokens[3..].join(" "),
                    "evidence": sentence,
                }));
            }
        }
    }

    json!({
        "task": EXTRACTION_TASK,
        "entities": entities,
        "attributes": attributes,
    })
}

fn link(rules: &RuleSet, request: &ExecutionRequest, source: &str) -> Value {
    let entities = context_values(request, "entities");
    let attributes = context_values(request, "attributes");
    let names: BTreeSet<&str> = entities
        .iter()
        .filter_map(|e| e.get("name").and_then(Value::as_str))
        .collect();

    let mut relationships: Vec<Value> = Vec::new();
    for sentence in sentences(source) {
        let tokens: Vec<&str> = sentence.split_whitespace().collect();
        if tokens.len() < 3 || !rules.is_relation(tokens[1]) {
            continue;
        }
        let object = tokens[2..].join(" ");
        if names.contains(tokens[0]) && names.contains(object.as_str()) {
            relationships.push(json!({
                "subject": tokens[0],
                "predicate": tokens[1],
                "object": object,
                "evidence": sentence,
            }));
        }
    }

    json!({
        "task": LINKING_TASK,
        "entities": entities,
        "attributes": attributes,
        "relationships": relationships,
    })
}

fn validate(rules: &RuleSet, request: &ExecutionRequest) -> Value {
    let entities = context_values(request, "entities");
    let attributes = context_values(request, "attributes");
    let relationships = context_values(request, "relationships");

    let class_of: BTreeMap<&str, &str> = entities
        .iter()
        .filter_map(|e| {
            let name = e.get("name").and_then(Value::as_str)?;
            let class = e.get("class").and_then(Value::as_str)?;
            Some((name, class))
        })
        .collect();

    let mut valid_entities = Vec::new();
    let mut valid_attributes = Vec::new();
    let mut valid_relationships = Vec::new();
    let mut rejected = Vec::new();

    for entity in &entities {
        let class = entity.get("class").and_then(Value::as_str).unwrap_or("");
        match rules.canonical_class(class) {
            Some(_) => valid_entities.push(entity.clone()),
            None => rejected.push(json!({
                "kind": "entity",
                "item": entity,
                "reason": format!("class '{}' is not defined by the ontology", class),
            })),
        }
    }

    for attribute in &attributes {
        let entity = attribute.get("entity").and_then(Value::as_str).unwrap_or("");
        let name = attribute.get("attribute").and_then(Value::as_str).unwrap_or("");
        let reason = match class_of.get(entity) {
            None => Some(format!("entity '{}' has no known class", entity)),
            Some(class) if !rules.declares_attribute(class, name) => Some(format!(
                "class '{}' does not declare attribute '{}'",
                class, name
            )),
            Some(_) => None,
        };
        match reason {
            None => valid_attributes.push(attribute.clone()),
            Some(reason) => rejected.push(json!({
                "kind": "attribute",
                "item": attribute,
                "reason": reason,
            })),
        }
    }

    for relationship in &relationships {
        let subject = relationship.get("subject").and_then(Value::as_str).unwrap_or("");
        let predicate = relationship.get("predicate").and_then(Value::as_str).unwrap_or("");
        let object = relationship.get("object").and_then(Value::as_str).unwrap_or("");
        let reason = match (class_of.get(subject), class_of.get(object)) {
            (Some(s), Some(o)) if rules.permits(s, predicate, o) => None,
            (Some(s), Some(o)) => Some(format!(
                "ontology does not allow {} {} {}",
                s, predicate, o
            )),
            _ => Some("subject or object has no known class".to_string()),
        };
        match reason {
            None => valid_relationships.push(relationship.clone()),
            Some(reason) => rejected.push(json!({
                "kind": "relationship",
                "item": relationship,
                "reason": reason,
            })),
        }
    }

    let summary = json!({
        "entities": valid_entities.len(),
        "attributes": valid_attributes.len(),
        "relationships": valid_relationships.len(),
        "rejected": rejected.len(),
    });

    json!({
        "task": VALIDATION_TASK,
        "validated": {
            "entities": valid_entities,
            "attributes": valid_attributes,
            "relationships": valid_relationships,
        },
        "rejected": rejected,
        "summary": summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ContextArtifact;
    use std::sync::Arc;

    const RULES: &str = "\
# people and organizations
Person isA Entity.
Organization isA Entity.
Person hasAttribute age.
Person worksFor Organization.
";

    const SOURCE: &str = "Alice is a Person. Acme is an Organization. \
Alice has age 42. Acme has age 7. Alice worksFor Acme. Acme worksFor Alice.";

    fn request(task: &str, context: Vec<(&str, Value)>) -> ExecutionRequest {
        ExecutionRequest {
            role: "Tester".to_string(),
            task: task.to_string(),
            attempt: 1,
            system_prompt: String::new(),
            prompt: String::new(),
            ontology: Some(Arc::from(RULES)),
            inputs: [("source_text".to_string(), SOURCE.to_string())]
                .into_iter()
                .collect(),
            context: context
                .into_iter()
                .map(|(task, value)| ContextArtifact {
                    task: task.to_string(),
                    file_name: format!("{}.json", task),
                    content: value.to_string(),
                })
                .collect(),
            history: Vec::new(),
        }
    }

    #[test]
    fn test_rule_parsing() {
        let rules = RuleSet::parse(RULES);

        assert_eq!(rules.top_level_classes(), vec!["Entity"]);
        assert!(rules.is_a("Person", "Entity"));
        assert!(!rules.is_a("Entity", "Person"));
        assert!(rules.declares_attribute("Person", "age"));
        assert!(!rules.declares_attribute("Organization", "age"));
        assert!(rules.permits("Person", "worksFor", "Organization"));
        assert!(!rules.permits("Organization", "worksFor", "Person"));
    }

    #[test]
    fn test_hierarchy_cycle_terminates() {
        let rules = RuleSet::parse("A isA B. B isA A.");
        assert!(!rules.is_a("A", "C"));
    }

    #[test]
    fn test_single_statement_alignment() {
        let mut req = request(ALIGNMENT_TASK, vec![]);
        req.ontology = Some(Arc::from("Person isA Entity."));

        let out = HeuristicExecutor::new().respond(&req);

        assert_eq!(out["top_level_classes"], json!(["Entity"]));
        assert_eq!(out["classes"][1], json!({"name": "Person", "parent": "Entity"}));
    }

    #[test]
    fn test_full_chain() {
        let executor = HeuristicExecutor::new();

        let aligned = executor.respond(&request(ALIGNMENT_TASK, vec![]));
        let extracted = executor.respond(&request(EXTRACTION_TASK, vec![("a", aligned)]));

        assert_eq!(extracted["entities"].as_array().unwrap().len(), 2);
        assert_eq!(extracted["attributes"].as_array().unwrap().len(), 2);

        let linked = executor.respond(&request(LINKING_TASK, vec![("b", extracted)]));
        assert_eq!(linked["relationships"].as_array().unwrap().len(), 2);

        let validated = executor.respond(&request(VALIDATION_TASK, vec![("c", linked)]));
        assert_eq!(validated["summary"]["entities"], 2);
        assert_eq!(validated["summary"]["attributes"], 1);
        assert_eq!(validated["summary"]["relationships"], 1);
        assert_eq!(validated["summary"]["rejected"], 2);
        assert_eq!(
            validated["validated"]["relationships"][0]["subject"],
            "Alice"
        );
    }

    #[test]
    fn test_unknown_task_echoes_inputs() {
        let out = HeuristicExecutor::new().respond(&request("Summarize", vec![("x", json!({}))]));
        assert_eq!(out["task"], "Summarize");
        assert_eq!(out["inputs"], json!(["x.json"]));
    }

    #[test]
    fn test_sentence_splitting_keeps_decimals() {
        let parts = sentences("Alice has height 1.8. Bob is a Person");
        assert_eq!(parts, vec!["Alice has height 1.8", "Bob is a Person"]);
    }
}
