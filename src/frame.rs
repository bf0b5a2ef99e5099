use std::collections::{BTreeMap, BTreeSet, HashMap};

use roaring::RoaringTreemap;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::construct::{Catalog, StudyField, Thing, ThingHasher};
use crate::datatype::{as_number, FieldType};
use crate::error::{CatalogError, Result};

// ------------- Variable lookup -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableInfo {
    pub code: String,
    pub label: String,
}

/// Code and label by variable id, supplied by the caller so that it can be
/// shared between several aggregation calls.
pub type VariableLookup = HashMap<Thing, VariableInfo, ThingHasher>;

// ------------- Flat counts -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountRecord {
    pub id: Thing,
    pub study: Thing,
    pub study_label: String,
    pub count: i64,
    pub subjects: i64,
    pub domain_code: String,
    pub domain_label: String,
    pub codes: Thing,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountTable {
    rows: Vec<CountRecord>,
}

impl CountTable {
    pub const COLUMNS: [&'static str; 8] = [
        "id",
        "study",
        "study_label",
        "count",
        "subjects",
        "domain_code",
        "domain_label",
        "codes",
    ];

    pub fn new(rows: Vec<CountRecord>) -> Self {
        Self { rows }
    }
    pub fn columns(&self) -> &'static [&'static str] {
        &Self::COLUMNS
    }
    pub fn rows(&self) -> &[CountRecord] {
        &self.rows
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One row per count of the given studies and variable attached to it.
pub fn flatten(catalog: &Catalog, studies: &RoaringTreemap) -> Result<CountTable> {
    let mut rows = Vec::new();
    for study in studies.iter() {
        let Some(study_label) = catalog.study_id(study) else {
            continue;
        };
        for count in catalog.study_counts(study) {
            for code in count.codes() {
                let variable = catalog
                    .variable(*code)
                    .ok_or_else(|| CatalogError::Invariant(format!("count {} refers to missing variable {code}", count.id())))?;
                let domain = catalog.domain(variable.domain()).ok_or_else(|| {
                    CatalogError::Invariant(format!("variable {code} refers to missing domain {}", variable.domain()))
                })?;
                rows.push(CountRecord {
                    id: count.id(),
                    study,
                    study_label: study_label.to_owned(),
                    count: count.count(),
                    subjects: count.subjects(),
                    domain_code: domain.code().to_owned(),
                    domain_label: domain.label().to_owned(),
                    codes: *code,
                });
            }
        }
    }
    debug!(studies = studies.len(), rows = rows.len(), "flattened counts");
    Ok(CountTable::new(rows))
}

// ------------- Totals by domain -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainTotal {
    pub study: Thing,
    pub study_label: String,
    pub domain_code: String,
    pub domain_label: String,
    pub count: i64,
    pub subjects: i64,
}

// ordered by study and domain
pub fn summarize_by_domain(table: &CountTable) -> Vec<DomainTotal> {
    let mut groups: BTreeMap<(Thing, &str, &str, &str), (i64, i64)> = BTreeMap::new();
    for row in table.rows() {
        let sums = groups
            .entry((row.study, row.study_label.as_str(), row.domain_code.as_str(), row.domain_label.as_str()))
            .or_default();
        sums.0 += row.count;
        sums.1 += row.subjects;
    }
    groups
        .into_iter()
        .map(|((study, study_label, domain_code, domain_label), (count, subjects))| DomainTotal {
            study,
            study_label: study_label.to_owned(),
            domain_code: domain_code.to_owned(),
            domain_label: domain_label.to_owned(),
            count,
            subjects,
        })
        .collect()
}

// ------------- Pivot -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PivotRow {
    pub id: Thing,
    pub study: Thing,
    pub study_label: String,
    pub count: i64,
    pub subjects: i64,
    cells: BTreeMap<String, Thing>,
}

impl PivotRow {
    pub fn cell(&self, domain_code: &str) -> Option<Thing> {
        self.cells.get(domain_code).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PivotTable {
    domains: Vec<String>,
    rows: Vec<PivotRow>,
}

impl PivotTable {
    // ordered by code
    pub fn domains(&self) -> &[String] {
        &self.domains
    }
    pub fn has_domain(&self, domain_code: &str) -> bool {
        self.domains.binary_search_by(|d| d.as_str().cmp(domain_code)).is_ok()
    }
    pub fn rows(&self) -> &[PivotRow] {
        &self.rows
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One row per count, one column per domain holding the variable the count
/// has in that domain.
pub fn pivot(table: &CountTable) -> PivotTable {
    let mut domains = BTreeSet::new();
    let mut rows: BTreeMap<Thing, PivotRow> = BTreeMap::new();
    for record in table.rows() {
        domains.insert(record.domain_code.clone());
        let row = rows.entry(record.id).or_insert_with(|| PivotRow {
            id: record.id,
            study: record.study,
            study_label: record.study_label.clone(),
            count: record.count,
            subjects: record.subjects,
            cells: BTreeMap::new(),
        });
        let cell = row.cells.entry(record.domain_code.clone()).or_insert(record.codes);
        if *cell != record.codes {
            debug!(count = record.id, domain = %record.domain_code, "count has several variables in one domain");
            *cell = (*cell).min(record.codes);
        }
    }
    PivotTable {
        domains: domains.into_iter().collect(),
        rows: rows.into_values().collect(),
    }
}

// ------------- Counts by variable -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableCount {
    pub study: Thing,
    pub study_label: String,
    pub variable: Thing,
    pub count: i64,
    pub subjects: i64,
    pub var_code: Option<String>,
    pub var_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariableCounts {
    pub domain_code: String,
    pub rows: Vec<VariableCount>,
}

impl VariableCounts {
    pub fn total(&self) -> i64 {
        self.rows.iter().map(|r| r.count).sum()
    }
}

/// Counts per study and variable of the domain. `None` when the domain is not
/// a column of the pivot or no count has a variable in it.
pub fn counts_by_variable(pivot: &PivotTable, lookup: &VariableLookup, domain_code: &str) -> Option<VariableCounts> {
    if !pivot.has_domain(domain_code) {
        return None;
    }
    let mut groups: BTreeMap<(Thing, &str, Thing), (i64, i64)> = BTreeMap::new();
    for row in pivot.rows() {
        let Some(variable) = row.cell(domain_code) else {
            continue;
        };
        let sums = groups.entry((row.study, row.study_label.as_str(), variable)).or_default();
        sums.0 += row.count;
        sums.1 += row.subjects;
    }
    if groups.is_empty() {
        return None;
    }
    let rows: Vec<VariableCount> = groups
        .into_iter()
        .map(|((study, study_label, variable), (count, subjects))| {
            let info = lookup.get(&variable);
            VariableCount {
                study,
                study_label: study_label.to_owned(),
                variable,
                count,
                subjects,
                var_code: info.map(|i| i.code.clone()),
                var_label: info.map(|i| i.label.clone()),
            }
        })
        .collect();
    debug!(domain = domain_code, groups = rows.len(), "grouped counts by variable");
    Some(VariableCounts { domain_code: domain_code.to_owned(), rows })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariablePairCount {
    pub study: Thing,
    pub study_label: String,
    pub qualifier: Thing,
    pub variable: Thing,
    pub count: i64,
    pub subjects: i64,
    pub var_code: Option<String>,
    pub var_label: Option<String>,
    pub qual_code: Option<String>,
    pub qual_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariablePairCounts {
    pub domain_code: String,
    pub qualifier_code: String,
    pub rows: Vec<VariablePairCount>,
}

impl VariablePairCounts {
    pub fn total(&self) -> i64 {
        self.rows.iter().map(|r| r.count).sum()
    }
}

/// Counts per study, qualifier variable and domain variable. `None` when
/// either domain is missing from the pivot, when both are the same, or when
/// no count has a variable in both.
pub fn counts_by_variable_pair(
    pivot: &PivotTable,
    lookup: &VariableLookup,
    domain_code: &str,
    qualifier_code: &str,
) -> Option<VariablePairCounts> {
    if domain_code == qualifier_code || !pivot.has_domain(domain_code) || !pivot.has_domain(qualifier_code) {
        return None;
    }
    let mut groups: BTreeMap<(Thing, &str, Thing, Thing), (i64, i64)> = BTreeMap::new();
    for row in pivot.rows() {
        let (Some(qualifier), Some(variable)) = (row.cell(qualifier_code), row.cell(domain_code)) else {
            continue;
        };
        let sums = groups
            .entry((row.study, row.study_label.as_str(), qualifier, variable))
            .or_default();
        sums.0 += row.count;
        sums.1 += row.subjects;
    }
    if groups.is_empty() {
        return None;
    }
    let rows = groups
        .into_iter()
        .map(|((study, study_label, qualifier, variable), (count, subjects))| {
            let var = lookup.get(&variable);
            let qual = lookup.get(&qualifier);
            VariablePairCount {
                study,
                study_label: study_label.to_owned(),
                qualifier,
                variable,
                count,
                subjects,
                var_code: var.map(|i| i.code.clone()),
                var_label: var.map(|i| i.label.clone()),
                qual_code: qual.map(|i| i.code.clone()),
                qual_label: qual.map(|i| i.label.clone()),
            }
        })
        .collect();
    Some(VariablePairCounts {
        domain_code: domain_code.to_owned(),
        qualifier_code: qualifier_code.to_owned(),
        rows,
    })
}

// ------------- Study metadata table -------------
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyRow {
    pub study_id: String,
    pub cells: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyTable {
    pub columns: Vec<String>,
    pub rows: Vec<StudyRow>,
}

/// One row per study holding any value of the fields, one column per field
/// label. A study holding several values of a field shows the longest.
pub fn study_table(catalog: &Catalog, fields: &[&StudyField], studies: &RoaringTreemap) -> Option<StudyTable> {
    // field position -> study id -> longest value
    let mut longest: Vec<BTreeMap<&str, &str>> = vec![BTreeMap::new(); fields.len()];
    for (position, field) in fields.iter().enumerate() {
        for value in catalog.field_values(field.field_name()) {
            for study in value.studies().iter().filter(|s| studies.contains(*s)) {
                let Some(study_id) = catalog.study_id(study) else {
                    continue;
                };
                let cell = longest[position].entry(study_id).or_insert(value.value());
                if value.value().len() > cell.len() {
                    *cell = value.value();
                }
            }
        }
    }
    let shown: Vec<usize> = (0..fields.len()).filter(|p| !longest[*p].is_empty()).collect();
    if shown.is_empty() {
        return None;
    }
    let study_ids: BTreeSet<&str> = shown.iter().flat_map(|p| longest[*p].keys().copied()).collect();
    let rows = study_ids
        .into_iter()
        .map(|study_id| StudyRow {
            study_id: study_id.to_owned(),
            cells: shown
                .iter()
                .map(|p| match longest[*p].get(study_id) {
                    Some(value) => render_cell(fields[*p].field_type(), value),
                    None => Value::Null,
                })
                .collect(),
        })
        .collect();
    Some(StudyTable {
        columns: shown.iter().map(|p| fields[*p].label().to_owned()).collect(),
        rows,
    })
}

fn render_cell(field_type: FieldType, value: &str) -> Value {
    match field_type {
        FieldType::Int => match as_number(value).filter(|n| n.is_finite()) {
            Some(n) => Value::String(format!("{n:.0}")),
            None => Value::Null,
        },
        FieldType::Float => as_number(value)
            .and_then(serde_json::Number::from_f64)
            .map_or(Value::Null, Value::Number),
        FieldType::Str | FieldType::List => Value::String(value.to_owned()),
    }
}
