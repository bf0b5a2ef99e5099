// used to keep the one-to-one mapping between study row ids and their textual study ids
use bimap::BiMap;

// used to hold the studies linked to values and variables, so that filters can be
// resolved by intersecting bitsets
use roaring::RoaringTreemap;

// other keepers use HashSet, HashMap or BTreeMap (where a stable order is wanted)
use core::hash::{BuildHasher, BuildHasherDefault};
use std::collections::hash_map::RandomState;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use seahash::SeaHasher;

use serde::{Deserialize, Serialize};
use tracing::debug;

// our own stuff that we need
use crate::datatype::{FieldType, Sentinels};
use crate::error::{CatalogError, Result};
use crate::filter::{Filter, FilterDefinition, Registry};
use crate::frame::{VariableInfo, VariableLookup};
use crate::selection::Selection;

// ------------- Thing -------------
pub type Thing = u64;

pub type ThingHasher = BuildHasherDefault<SeaHasher>;
pub type OtherHasher = BuildHasherDefault<SeaHasher>;

pub const GENESIS: Thing = 0;

#[derive(Debug)]
pub struct ThingGenerator {
    lower_bound: Thing,
    retained: HashSet<Thing, ThingHasher>,
}

impl ThingGenerator {
    pub fn new() -> Self {
        Self {
            lower_bound: GENESIS,
            retained: HashSet::<Thing, ThingHasher>::default(),
        }
    }
    // Claims a thing for one construct. False when some construct, of any
    // kind, already holds it. Later generated things stay above every claim.
    pub fn retain(&mut self, t: Thing) -> bool {
        if t > self.lower_bound {
            self.lower_bound = t;
        }
        self.retained.insert(t)
    }
    // a fresh thing, not yet claimed
    pub fn generate(&mut self) -> Thing {
        self.lower_bound += 1;
        self.lower_bound
    }
}

impl Default for ThingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Study Field -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyField {
    field_name: String,
    label: String,
    field_type: FieldType,
    big_order: i32,
    lil_order: i32,
}

impl StudyField {
    pub fn new(field_name: impl Into<String>) -> Self {
        let field_name = field_name.into();
        Self {
            label: field_name.replace('_', " "),
            field_name,
            field_type: FieldType::Str,
            big_order: -1,
            lil_order: -1,
        }
    }
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }
    /// Display ranks for the study table and the filter page, negative hides the field.
    pub fn with_orders(mut self, big_order: i32, lil_order: i32) -> Self {
        self.big_order = big_order;
        self.lil_order = lil_order;
        self
    }
    pub fn field_name(&self) -> &str {
        &self.field_name
    }
    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }
    pub fn big_order(&self) -> i32 {
        self.big_order
    }
    pub fn lil_order(&self) -> i32 {
        self.lil_order
    }
    pub fn shown_in_table(&self) -> bool {
        self.big_order >= 0
    }
    pub fn shown_in_filter(&self) -> bool {
        self.lil_order >= 0
    }
}

// ------------- Study Variable -------------
/// A literal value of a study field together with every study holding it.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyVariable {
    id: Thing,
    field_name: String,
    value: String,
    studies: RoaringTreemap,
}

impl StudyVariable {
    pub fn new(id: Thing, field_name: String, value: String, studies: RoaringTreemap) -> Self {
        Self { id, field_name, value, studies }
    }
    pub fn id(&self) -> Thing {
        self.id
    }
    pub fn field_name(&self) -> &str {
        &self.field_name
    }
    pub fn value(&self) -> &str {
        &self.value
    }
    pub fn studies(&self) -> &RoaringTreemap {
        &self.studies
    }
}

// ------------- Domain -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Domain {
    id: Thing,
    code: String,
    label: String,
    is_qualifier: bool,
}

impl Domain {
    pub fn new(id: Thing, code: String, label: String, is_qualifier: bool) -> Self {
        Self { id, code, label, is_qualifier }
    }
    pub fn id(&self) -> Thing {
        self.id
    }
    pub fn code(&self) -> &str {
        &self.code
    }
    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn is_qualifier(&self) -> bool {
        self.is_qualifier
    }
}

// ------------- Variable -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variable {
    id: Thing,
    domain: String,
    code: String,
    label: String,
    category: Option<String>,
}

impl Variable {
    pub fn new(id: Thing, domain: String, code: String, label: String, category: Option<String>) -> Self {
        Self { id, domain, code, label, category }
    }
    pub fn id(&self) -> Thing {
        self.id
    }
    /// Code of the owning domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }
    pub fn code(&self) -> &str {
        &self.code
    }
    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }
}

// ------------- Count -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Count {
    id: Thing,
    study: Thing,
    count: i64,
    subjects: i64,
    codes: Vec<Thing>,
}

impl Count {
    pub fn new(id: Thing, study: Thing, count: i64, subjects: i64, mut codes: Vec<Thing>) -> Self {
        codes.sort_unstable();
        codes.dedup();
        Self { id, study, count, subjects, codes }
    }
    pub fn id(&self) -> Thing {
        self.id
    }
    pub fn study(&self) -> Thing {
        self.study
    }
    pub fn count(&self) -> i64 {
        self.count
    }
    pub fn subjects(&self) -> i64 {
        self.subjects
    }
    /// The variables classifying this count, at most one per domain in practice.
    pub fn codes(&self) -> &[Thing] {
        &self.codes
    }
}

// ------------- Lookups -------------
#[derive(Debug)]
pub struct Lookup<K, V, H = RandomState> {
    index: HashMap<K, HashSet<V>, H>,
}
impl<K: Eq + Hash, V: Eq + Hash, H: BuildHasher + Default> Lookup<K, V, H> {
    pub fn new() -> Self {
        Self {
            index: HashMap::<K, HashSet<V>, H>::default(),
        }
    }
    pub fn insert(&mut self, key: K, value: V) {
        let set = self.index.entry(key).or_default();
        set.insert(value);
    }
    pub fn remove(&mut self, key: &K, value: &V) {
        if let Some(set) = self.index.get_mut(key) {
            set.remove(value);
        }
    }
    pub fn lookup(&self, key: &K) -> Option<&HashSet<V>> {
        self.index.get(key)
    }
}
impl<K: Eq + Hash, V: Eq + Hash, H: BuildHasher + Default> Default for Lookup<K, V, H> {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Catalog -------------
/// Conventions the catalog is built with, normally taken from the settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogOptions {
    pub sentinels: Sentinels,
    pub list_separator: String,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            sentinels: Sentinels::default(),
            list_separator: String::from(","),
        }
    }
}

// This holds every study, attribute and classification the filters are evaluated
// against. It is filled by ingestion (or restored from the store) and read-only
// while requests are served.
#[derive(Debug)]
pub struct Catalog {
    options: CatalogOptions,
    thing_generator: ThingGenerator,
    // owns the constructs
    studies: BiMap<Thing, String>,
    fields: BTreeMap<String, StudyField>,
    values: HashMap<Thing, StudyVariable, ThingHasher>,
    domains: BTreeMap<String, Domain>,
    variables: HashMap<Thing, Variable, ThingHasher>,
    counts: BTreeMap<Thing, Count>,
    filters: BTreeMap<String, Filter>,
    // owns lookups between constructs (similar to database indexes)
    value_lookup: HashMap<(String, String), Thing, OtherHasher>,
    field_to_value_lookup: Lookup<String, Thing, OtherHasher>,
    variable_lookup: HashMap<(String, String), Thing, OtherHasher>,
    domain_to_variable_lookup: Lookup<String, Thing, OtherHasher>,
    study_to_count_lookup: Lookup<Thing, Thing, ThingHasher>,
    variable_to_studies: HashMap<Thing, RoaringTreemap, ThingHasher>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(CatalogOptions::default())
    }
}

impl Catalog {
    pub fn new(options: CatalogOptions) -> Self {
        Self {
            options,
            thing_generator: ThingGenerator::new(),
            studies: BiMap::new(),
            fields: BTreeMap::new(),
            values: HashMap::default(),
            domains: BTreeMap::new(),
            variables: HashMap::default(),
            counts: BTreeMap::new(),
            filters: BTreeMap::new(),
            value_lookup: HashMap::default(),
            field_to_value_lookup: Lookup::new(),
            variable_lookup: HashMap::default(),
            domain_to_variable_lookup: Lookup::new(),
            study_to_count_lookup: Lookup::new(),
            variable_to_studies: HashMap::default(),
        }
    }
    pub fn options(&self) -> &CatalogOptions {
        &self.options
    }
    pub fn sentinels(&self) -> &Sentinels {
        &self.options.sentinels
    }
    pub fn separator(&self) -> &str {
        &self.options.list_separator
    }
    // restored rows bring their own ids, which must be unique across every kind
    fn claim(&mut self, thing: Thing, kind: &'static str) -> Result<()> {
        if !self.thing_generator.retain(thing) {
            return Err(CatalogError::duplicate(kind, format!("id {thing} is already taken")));
        }
        Ok(())
    }

    // ------------- studies -------------
    /// Returns the row id of the study, creating it when it does not exist yet.
    pub fn add_study(&mut self, study_id: &str) -> Thing {
        if let Some(thing) = self.studies.get_by_right(study_id) {
            return *thing;
        }
        let thing = self.thing_generator.generate();
        self.thing_generator.retain(thing);
        self.studies.insert(thing, study_id.to_owned());
        thing
    }
    pub fn keep_study(&mut self, thing: Thing, study_id: String) -> Result<()> {
        if self.studies.contains_right(&study_id) {
            return Err(CatalogError::duplicate("study", study_id));
        }
        self.claim(thing, "study")?;
        self.studies.insert(thing, study_id);
        Ok(())
    }
    pub fn study_id(&self, thing: Thing) -> Option<&str> {
        self.studies.get_by_left(&thing).map(String::as_str)
    }
    pub fn study(&self, study_id: &str) -> Option<Thing> {
        self.studies.get_by_right(study_id).copied()
    }
    /// Every study as (row id, study id), ordered by study id.
    pub fn studies(&self) -> Vec<(Thing, &str)> {
        let mut studies: Vec<(Thing, &str)> =
            self.studies.iter().map(|(t, s)| (*t, s.as_str())).collect();
        studies.sort_by(|a, b| a.1.cmp(b.1));
        studies
    }
    pub fn all_studies(&self) -> RoaringTreemap {
        self.studies.left_values().copied().collect()
    }
    pub fn study_count(&self) -> usize {
        self.studies.len()
    }

    // ------------- study fields -------------
    pub fn add_field(&mut self, field: StudyField) -> Result<()> {
        if self.fields.contains_key(field.field_name()) {
            return Err(CatalogError::duplicate("study field", field.field_name()));
        }
        // fields and domains share the filter namespace
        if self.domains.contains_key(field.field_name()) {
            return Err(CatalogError::duplicate("filter name", field.field_name()));
        }
        self.fields.insert(field.field_name().to_owned(), field);
        Ok(())
    }
    pub fn field(&self, field_name: &str) -> Option<&StudyField> {
        self.fields.get(field_name)
    }
    pub fn fields(&self) -> impl Iterator<Item = &StudyField> {
        self.fields.values()
    }
    /// Changes the declared type of a field. Every existing value has to be
    /// castable to the new type, and switching to a list explodes compound values.
    pub fn set_field_type(&mut self, field_name: &str, field_type: FieldType) -> Result<()> {
        let field = self
            .fields
            .get(field_name)
            .ok_or_else(|| CatalogError::unknown("study field", field_name))?;
        let castable = self
            .field_values(field_name)
            .iter()
            .filter(|v| !self.sentinels().is_missing(v.value()))
            .all(|v| field_type.accepts(v.value()));
        if !castable {
            return Err(CatalogError::Configuration(format!(
                "Pre-existing {} values could not be cast to {}s",
                field.label(),
                field_type.describe()
            )));
        }
        if let Some(field) = self.fields.get_mut(field_name) {
            field.field_type = field_type;
        }
        if field_type == FieldType::List {
            self.explode_field(field_name)?;
        }
        Ok(())
    }

    // ------------- study variables -------------
    /// Records that the given studies hold `literal` for the field and returns the
    /// value rows involved. A compound literal of a list field is split into one
    /// row per token, and the compound itself is never kept.
    pub fn add_value(&mut self, field_name: &str, literal: &str, studies: &[Thing]) -> Result<Vec<Thing>> {
        let field = self
            .fields
            .get(field_name)
            .ok_or_else(|| CatalogError::unknown("study field", field_name))?;
        let field_type = field.field_type();
        if !self.sentinels().is_missing(literal) && !field_type.accepts(literal) {
            return Err(CatalogError::Validation(format!(
                "{}: {} cannot be cast to {} type",
                field.label(),
                literal,
                field_type.describe()
            )));
        }
        if let Some(missing) = studies.iter().find(|s| !self.studies.contains_left(*s)) {
            return Err(CatalogError::unknown("study", missing.to_string()));
        }
        let studies: RoaringTreemap = studies.iter().copied().collect();
        if field_type == FieldType::List && self.is_compound(literal) {
            let tokens = self.split_list(literal);
            return Ok(tokens
                .iter()
                .map(|token| self.link_value(field_name, token, &studies))
                .collect());
        }
        Ok(vec![self.link_value(field_name, literal, &studies)])
    }
    pub fn keep_value(&mut self, value: StudyVariable) -> Result<()> {
        if !self.fields.contains_key(value.field_name()) {
            return Err(CatalogError::unknown("study field", value.field_name()));
        }
        let key = (value.field_name().to_owned(), value.value().to_owned());
        if self.value_lookup.contains_key(&key) || self.values.contains_key(&value.id()) {
            return Err(CatalogError::duplicate("study variable", format!("{}: {}", key.0, key.1)));
        }
        self.claim(value.id(), "study variable")?;
        self.value_lookup.insert(key, value.id());
        self.field_to_value_lookup.insert(value.field_name().to_owned(), value.id());
        self.values.insert(value.id(), value);
        Ok(())
    }
    pub fn value(&self, id: Thing) -> Option<&StudyVariable> {
        self.values.get(&id)
    }
    pub fn value_by_literal(&self, field_name: &str, literal: &str) -> Option<&StudyVariable> {
        self.value_lookup
            .get(&(field_name.to_owned(), literal.to_owned()))
            .and_then(|id| self.values.get(id))
    }
    /// Every value row of the field, sentinels included, ordered by id.
    pub fn field_values(&self, field_name: &str) -> Vec<&StudyVariable> {
        let mut values: Vec<&StudyVariable> = self
            .field_to_value_lookup
            .lookup(&field_name.to_owned())
            .map(|ids| ids.iter().filter_map(|id| self.values.get(id)).collect())
            .unwrap_or_default();
        values.sort_by_key(|v| v.id());
        values
    }
    pub fn values(&self) -> impl Iterator<Item = &StudyVariable> {
        self.values.values()
    }
    fn is_compound(&self, literal: &str) -> bool {
        !self.separator().is_empty() && literal.contains(self.separator())
    }
    fn split_list(&self, literal: &str) -> Vec<String> {
        literal
            .split(self.separator())
            .map(|token| token.replace(' ', ""))
            .filter(|token| !token.is_empty())
            .collect()
    }
    fn link_value(&mut self, field_name: &str, literal: &str, studies: &RoaringTreemap) -> Thing {
        let key = (field_name.to_owned(), literal.to_owned());
        let id = match self.value_lookup.get(&key) {
            Some(id) => *id,
            None => {
                let id = self.thing_generator.generate();
                self.thing_generator.retain(id);
                self.values.insert(
                    id,
                    StudyVariable::new(id, key.0.clone(), key.1.clone(), RoaringTreemap::new()),
                );
                self.field_to_value_lookup.insert(key.0.clone(), id);
                self.value_lookup.insert(key, id);
                id
            }
        };
        if let Some(value) = self.values.get_mut(&id) {
            value.studies |= studies;
        }
        id
    }
    fn explode_field(&mut self, field_name: &str) -> Result<()> {
        let compounds: Vec<Thing> = self
            .field_values(field_name)
            .into_iter()
            .filter(|v| self.is_compound(v.value()))
            .map(|v| v.id())
            .collect();
        for id in compounds {
            let compound = self
                .values
                .remove(&id)
                .ok_or_else(|| CatalogError::Invariant(format!("value {id} vanished while splitting")))?;
            self.value_lookup
                .remove(&(compound.field_name().to_owned(), compound.value().to_owned()));
            self.field_to_value_lookup.remove(&compound.field_name().to_owned(), &id);
            for token in self.split_list(compound.value()) {
                self.link_value(field_name, &token, compound.studies());
            }
            debug!(field = field_name, value = compound.value(), "split compound value");
        }
        Ok(())
    }

    // ------------- domains and variables -------------
    pub fn add_domain(&mut self, code: &str, label: &str, is_qualifier: bool) -> Result<Thing> {
        let id = self.thing_generator.generate();
        self.keep_domain(Domain::new(id, code.to_owned(), label.to_owned(), is_qualifier))?;
        Ok(id)
    }
    pub fn keep_domain(&mut self, domain: Domain) -> Result<()> {
        if self.domains.contains_key(domain.code()) {
            return Err(CatalogError::duplicate("domain", domain.code()));
        }
        if self.fields.contains_key(domain.code()) {
            return Err(CatalogError::duplicate("filter name", domain.code()));
        }
        self.claim(domain.id(), "domain")?;
        self.domains.insert(domain.code().to_owned(), domain);
        Ok(())
    }
    pub fn domain(&self, code: &str) -> Option<&Domain> {
        self.domains.get(code)
    }
    /// Every domain ordered by code.
    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.domains.values()
    }
    pub fn add_variable(
        &mut self,
        domain_code: &str,
        code: &str,
        label: &str,
        category: Option<&str>,
    ) -> Result<Thing> {
        let id = self.thing_generator.generate();
        self.keep_variable(Variable::new(
            id,
            domain_code.to_owned(),
            code.to_owned(),
            label.to_owned(),
            category.map(str::to_owned),
        ))?;
        Ok(id)
    }
    pub fn keep_variable(&mut self, variable: Variable) -> Result<()> {
        let domain = self
            .domains
            .get(variable.domain())
            .ok_or_else(|| CatalogError::unknown("domain", variable.domain()))?;
        // qualifier codes are ordered numerically, so they must be integers
        if domain.is_qualifier() && variable.code().parse::<i64>().is_err() {
            return Err(CatalogError::Validation(format!(
                "Qualifier domain {} requires integer codes, got '{}'",
                domain.code(),
                variable.code()
            )));
        }
        let key = (variable.domain().to_owned(), variable.code().to_owned());
        if self.variable_lookup.contains_key(&key) || self.variables.contains_key(&variable.id()) {
            return Err(CatalogError::duplicate("variable", format!("{}: {}", key.0, key.1)));
        }
        self.claim(variable.id(), "variable")?;
        self.variable_lookup.insert(key, variable.id());
        self.domain_to_variable_lookup.insert(variable.domain().to_owned(), variable.id());
        self.variables.insert(variable.id(), variable);
        Ok(())
    }
    pub fn variable(&self, id: Thing) -> Option<&Variable> {
        self.variables.get(&id)
    }
    pub fn variable_by_code(&self, domain_code: &str, code: &str) -> Option<&Variable> {
        self.variable_lookup
            .get(&(domain_code.to_owned(), code.to_owned()))
            .and_then(|id| self.variables.get(id))
    }
    /// Every variable of the domain, ordered by id.
    pub fn domain_variables(&self, domain_code: &str) -> Vec<&Variable> {
        let mut variables: Vec<&Variable> = self
            .domain_to_variable_lookup
            .lookup(&domain_code.to_owned())
            .map(|ids| ids.iter().filter_map(|id| self.variables.get(id)).collect())
            .unwrap_or_default();
        variables.sort_by_key(|v| v.id());
        variables
    }
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }
    /// Code and label of every variable, built once per request and shared
    /// between the aggregation views.
    pub fn variable_lookup(&self) -> VariableLookup {
        self.variables
            .values()
            .map(|v| {
                (v.id(), VariableInfo { code: v.code().to_owned(), label: v.label().to_owned() })
            })
            .collect()
    }

    // ------------- counts -------------
    pub fn add_count(&mut self, study: Thing, count: i64, subjects: i64, codes: &[Thing]) -> Result<Thing> {
        let id = self.thing_generator.generate();
        self.keep_count(Count::new(id, study, count, subjects, codes.to_vec()))?;
        Ok(id)
    }
    pub fn keep_count(&mut self, count: Count) -> Result<()> {
        if !self.studies.contains_left(&count.study()) {
            return Err(CatalogError::unknown("study", count.study().to_string()));
        }
        if let Some(missing) = count.codes().iter().find(|c| !self.variables.contains_key(*c)) {
            return Err(CatalogError::unknown("variable", missing.to_string()));
        }
        if self.counts.contains_key(&count.id()) {
            return Err(CatalogError::duplicate("count", count.id().to_string()));
        }
        self.claim(count.id(), "count")?;
        self.study_to_count_lookup.insert(count.study(), count.id());
        for code in count.codes() {
            self.variable_to_studies.entry(*code).or_default().insert(count.study());
        }
        self.counts.insert(count.id(), count);
        Ok(())
    }
    /// Counts of the study, ordered by id.
    pub fn study_counts(&self, study: Thing) -> Vec<&Count> {
        let mut counts: Vec<&Count> = self
            .study_to_count_lookup
            .lookup(&study)
            .map(|ids| ids.iter().filter_map(|id| self.counts.get(id)).collect())
            .unwrap_or_default();
        counts.sort_by_key(|c| c.id());
        counts
    }
    pub fn counts(&self) -> impl Iterator<Item = &Count> {
        self.counts.values()
    }
    /// Studies having at least one count classified by the variable.
    pub fn variable_studies(&self, variable: Thing) -> Option<&RoaringTreemap> {
        self.variable_to_studies.get(&variable)
    }

    // ------------- filters -------------
    /// Validates the definition and keeps the resulting filter.
    pub fn add_filter(&mut self, definition: FilterDefinition) -> Result<&Filter> {
        let filter = Registry::new(self).define(definition)?;
        self.keep_filter(filter)
    }
    pub fn keep_filter(&mut self, filter: Filter) -> Result<&Filter> {
        let name = filter.name().to_owned();
        if self.filters.contains_key(&name) {
            return Err(CatalogError::duplicate("filter", name));
        }
        let kept: &Filter = self.filters.entry(name).or_insert(filter);
        Ok(kept)
    }
    pub fn filter(&self, name: &str) -> Option<&Filter> {
        self.filters.get(name)
    }
    /// Every filter ordered by name.
    pub fn filters(&self) -> impl Iterator<Item = &Filter> {
        self.filters.values()
    }
    /// Filters whose name appears as a key of the selection payload.
    pub fn active_filters(&self, params: &Selection) -> Vec<&Filter> {
        self.filters
            .values()
            .filter(|f| params.contains(f.name()))
            .collect()
    }
}
