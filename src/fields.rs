//! Field descriptor registry.
//!
//! Built once per page of records: one [`FieldDescriptor`] per discovered
//! field in extracted order, plus a statistics map. Visibility and order are
//! caller-owned view state; every mutation re-packs the orders so visible
//! fields are numbered `0..n` without gaps and hidden fields carry no order.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::classify::{compute_statistics, extract_field_order, infer_type, sample_values, validate_value};
use crate::config::Config;
use crate::error::RegistryError;
use crate::gateway::build_gateway;
use crate::models::{FieldBag, FieldDescriptor, FieldStatistics, QueryOptions};

/// `"email"` → `"Email"`.
pub fn label_for(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    descriptors: Vec<FieldDescriptor>,
    default_order: Vec<String>,
    statistics: HashMap<String, FieldStatistics>,
}

impl FieldRegistry {
    pub fn from_records<R: FieldBag>(records: &[R]) -> Self {
        let order = extract_field_order(records);
        let mut statistics = HashMap::with_capacity(order.len());

        let descriptors = order
            .iter()
            .enumerate()
            .map(|(position, name)| {
                statistics.insert(name.clone(), compute_statistics(name, records));
                FieldDescriptor {
                    name: name.clone(),
                    label: label_for(name),
                    order: Some(position),
                    visible: true,
                    field_type: infer_type(name, records),
                    usage_count: records
                        .iter()
                        .filter(|r| r.field(name).is_some_and(|v| !v.is_null()))
                        .count(),
                }
            })
            .collect();

        Self {
            descriptors,
            default_order: order,
            statistics,
        }
    }

    /// All descriptors in layout order, hidden ones included.
    pub fn descriptors(&self) -> &[FieldDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, name: &str) -> Option<&FieldDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn statistics(&self, name: &str) -> Option<&FieldStatistics> {
        self.statistics.get(name)
    }

    pub fn visible(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.descriptors.iter().filter(|d| d.visible)
    }

    pub fn visible_names(&self) -> Vec<String> {
        self.visible().map(|d| d.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Shows or hides a field. Returns `false` when the name is unknown.
    pub fn set_visible(&mut self, name: &str, visible: bool) -> bool {
        let Some(descriptor) = self.descriptors.iter_mut().find(|d| d.name == name) else {
            return false;
        };
        descriptor.visible = visible;
        self.repack();
        true
    }

    /// Moves a field to `new_position` in the layout, clamped to the end.
    pub fn move_field(&mut self, name: &str, new_position: usize) -> bool {
        let Some(index) = self.descriptors.iter().position(|d| d.name == name) else {
            return false;
        };
        let descriptor = self.descriptors.remove(index);
        let at = new_position.min(self.descriptors.len());
        self.descriptors.insert(at, descriptor);
        self.repack();
        true
    }

    /// Restores extracted order with every field visible.
    pub fn reset(&mut self) {
        let rank: HashMap<&str, usize> = self
            .default_order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        self.descriptors
            .sort_by_key(|d| rank.get(d.name.as_str()).copied().unwrap_or(usize::MAX));
        for descriptor in &mut self.descriptors {
            descriptor.visible = true;
        }
        self.repack();
    }

    fn repack(&mut self) {
        let mut next = 0;
        for descriptor in &mut self.descriptors {
            if descriptor.visible {
                descriptor.order = Some(next);
                next += 1;
            } else {
                descriptor.order = None;
            }
        }
    }

    /// Checks name uniqueness and the contiguous-order invariant.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        let mut next = 0;
        for descriptor in &self.descriptors {
            if !seen.insert(descriptor.name.as_str()) {
                return Err(RegistryError::DuplicateName(descriptor.name.clone()));
            }
            let expected = descriptor.visible.then_some(next);
            if descriptor.order != expected {
                return Err(RegistryError::OrderMismatch {
                    name: descriptor.name.clone(),
                    expected,
                    found: descriptor.order,
                });
            }
            if descriptor.visible {
                next += 1;
            }
        }
        Ok(())
    }
}

/// `formdeck fields <namespace>`: prints inferred field metadata.
pub async fn run_fields(config: &Config, namespace: &str, form_id: Option<&str>) -> Result<()> {
    let gateway = build_gateway(config)?;
    let mut options = QueryOptions::namespace(namespace).with_limit(config.query.max_limit);
    if let Some(form_id) = form_id {
        options = options.with_filter("formId", form_id);
    }
    let page = gateway.query_submissions(&options).await?;
    let records = &page.result.items;

    if records.is_empty() {
        println!("No submissions in {}.", namespace);
        return Ok(());
    }

    let registry = FieldRegistry::from_records(records);
    println!(
        "{:<24} {:<10} {:>6} {:>7} {:>8}  MOST COMMON",
        "FIELD", "TYPE", "USED", "UNIQUE", "INVALID"
    );
    for descriptor in registry.descriptors() {
        let stats = registry
            .statistics(&descriptor.name)
            .cloned()
            .unwrap_or_else(FieldStatistics::empty);
        let invalid = sample_values(&descriptor.name, records)
            .into_iter()
            .filter(|v| validate_value(Some(*v), descriptor.field_type).is_err())
            .count();
        let most_common = stats
            .most_common
            .map(|mc| format!("{} ({})", mc.value, mc.count))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<10} {:>6} {:>7} {:>8}  {}",
            descriptor.name,
            descriptor.field_type.as_str(),
            descriptor.usage_count,
            stats.unique_values,
            invalid,
            most_common
        );
    }
    println!();
    println!(
        "{} fields over {} submissions ({} dropped)",
        registry.descriptors().len(),
        records.len(),
        page.dropped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldType, RawRecord};
    use serde_json::json;

    fn records() -> Vec<RawRecord> {
        vec![
            json!({"name": "Ada", "email": "ada@example.com", "age": "30"}),
            json!({"name": "Bob", "age": "abc", "notes": null}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
    }

    #[test]
    fn test_descriptors_follow_extracted_order() {
        let registry = FieldRegistry::from_records(&records());
        let names: Vec<&str> = registry.descriptors().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["name", "email", "age", "notes"]);

        let email = registry.descriptor("email").unwrap();
        assert_eq!(email.label, "Email");
        assert_eq!(email.field_type, FieldType::Email);
        assert_eq!(email.usage_count, 1);
        assert_eq!(registry.descriptor("notes").unwrap().usage_count, 0);
        assert_eq!(registry.descriptor("age").unwrap().field_type, FieldType::Text);
        assert!(registry.statistics("notes").unwrap().is_empty);
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_hide_move_reset_keep_orders_contiguous() {
        let mut registry = FieldRegistry::from_records(&records());

        assert!(registry.set_visible("email", false));
        assert!(registry.validate().is_ok());
        assert_eq!(registry.descriptor("email").unwrap().order, None);
        assert_eq!(registry.visible_names(), vec!["name", "age", "notes"]);
        assert_eq!(registry.descriptor("age").unwrap().order, Some(1));

        assert!(registry.move_field("notes", 0));
        assert!(registry.validate().is_ok());
        assert_eq!(registry.visible_names(), vec!["notes", "name", "age"]);

        assert!(registry.move_field("name", 99));
        assert_eq!(registry.visible_names(), vec!["notes", "age", "name"]);

        registry.reset();
        assert!(registry.validate().is_ok());
        assert_eq!(registry.visible_names(), vec!["name", "email", "age", "notes"]);
    }

    #[test]
    fn test_unknown_field_is_ignored() {
        let mut registry = FieldRegistry::from_records(&records());
        assert!(!registry.set_visible("nope", false));
        assert!(!registry.move_field("nope", 0));
    }

    #[test]
    fn test_validate_reports_duplicates() {
        let mut registry = FieldRegistry::from_records(&records());
        let dup = registry.descriptors[0].clone();
        registry.descriptors.push(dup);
        assert_eq!(
            registry.validate(),
            Err(RegistryError::DuplicateName("name".into()))
        );
    }

    #[test]
    fn test_label_for() {
        assert_eq!(label_for("firstName"), "FirstName");
        assert_eq!(label_for(""), "");
    }
}
