use crate::core::db::query::{Row, Value};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Display metadata for one stored field, loaded from the `[[fields]]`
/// entries of the configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldSpec {
    pub field_name: String,
    pub display_name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// A field value paired with its display metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldReading<'a> {
    pub field_name: &'a str,
    pub display_name: &'a str,
    pub unit: Option<&'a str>,
    pub value: &'a Value,
}

/// Read-only lookup table from field name to display metadata.
#[derive(Debug, Default)]
pub struct FieldCatalog {
    specs: Vec<FieldSpec>,
    index: HashMap<String, usize>,
}

static FIELD_CATALOG: OnceCell<FieldCatalog> = OnceCell::new();

impl FieldCatalog {
    /// Builds a catalog; a later entry for the same field name replaces an earlier one.
    pub fn new(specs: Vec<FieldSpec>) -> Self {
        let mut catalog = FieldCatalog::default();
        for spec in specs {
            match catalog.index.get(&spec.field_name) {
                Some(&idx) => catalog.specs[idx] = spec,
                None => {
                    catalog.index.insert(spec.field_name.clone(), catalog.specs.len());
                    catalog.specs.push(spec);
                }
            }
        }
        catalog
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn specs(&self) -> &[FieldSpec] {
        &self.specs
    }

    pub fn lookup(&self, field_name: &str) -> Option<&FieldSpec> {
        self.index.get(field_name).map(|&idx| &self.specs[idx])
    }

    /// Display name of a field, or the field name itself when it is not catalogued.
    pub fn display_name<'a>(&'a self, field_name: &'a str) -> &'a str {
        self.lookup(field_name)
            .map(|spec| spec.display_name.as_str())
            .unwrap_or(field_name)
    }

    /// Entries of one category, in catalog order.
    pub fn category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a FieldSpec> + 'a {
        self.specs
            .iter()
            .filter(move |spec| spec.category.as_deref() == Some(category))
    }

    /// Pairs the catalogued columns of a dict row with their metadata, in row order.
    pub fn annotate<'a>(&'a self, row: &'a Row) -> Vec<FieldReading<'a>> {
        row.fields()
            .filter_map(|(column, value)| {
                self.lookup(column).map(|spec| FieldReading {
                    field_name: &spec.field_name,
                    display_name: &spec.display_name,
                    unit: spec.unit.as_deref(),
                    value,
                })
            })
            .collect()
    }
}

/// Installs the process-wide catalog. Returns `false` if one was already installed.
pub fn install_field_catalog(specs: Vec<FieldSpec>) -> bool {
    FIELD_CATALOG.set(FieldCatalog::new(specs)).is_ok()
}

/// The process-wide catalog; empty until [`install_field_catalog`] is called.
pub fn field_catalog() -> &'static FieldCatalog {
    FIELD_CATALOG.get_or_init(FieldCatalog::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, display: &str, unit: &str, category: &str) -> FieldSpec {
        FieldSpec {
            field_name: name.to_string(),
            display_name: display.to_string(),
            unit: Some(unit.to_string()),
            category: Some(category.to_string()),
        }
    }

    fn sample() -> FieldCatalog {
        FieldCatalog::new(vec![
            spec("aao_effluent_q_ted", "总出水流量", "m³/d", "出水参数"),
            spec("aao_effluent_tn_ted", "离线模拟出水总氮", "mg/L", "出水参数"),
            spec("aao_cstr_front_1_1_qair_ntp_ted", "离线模拟1-1#AAO生化池曝气支管1曝气量", "Nm³/d", "曝气参数"),
        ])
    }

    #[test]
    fn test_lookup_and_display_name() {
        let catalog = sample();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.lookup("aao_effluent_tn_ted").unwrap().unit.as_deref(), Some("mg/L"));
        assert_eq!(catalog.display_name("aao_effluent_q_ted"), "总出水流量");
        assert_eq!(catalog.display_name("unknown_field"), "unknown_field");
    }

    #[test]
    fn test_duplicate_entry_replaces_earlier() {
        let catalog = FieldCatalog::new(vec![
            spec("f", "old", "mg/L", "a"),
            spec("f", "new", "mg/L", "a"),
        ]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.display_name("f"), "new");
    }

    #[test]
    fn test_category_filter() {
        let catalog = sample();
        let effluent: Vec<_> = catalog.category("出水参数").map(|s| s.field_name.as_str()).collect();
        assert_eq!(effluent, vec!["aao_effluent_q_ted", "aao_effluent_tn_ted"]);
    }

    #[test]
    fn test_annotate_skips_uncatalogued_columns() {
        let catalog = sample();
        let row = Row::from_pairs([
            ("ts", Value::from("2023-12-23 10:16:01.001")),
            ("aao_effluent_q_ted", Value::Float(41250.0)),
        ]);
        let readings = catalog.annotate(&row);
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].display_name, "总出水流量");
        assert_eq!(readings[0].value, &Value::Float(41250.0));
    }
}
