//! Request-scoped entry points over a borrowed catalog.

use roaring::RoaringTreemap;
use serde::Serialize;
use tracing::debug;

use crate::construct::{Catalog, Domain, StudyField, Thing, Variable};
use crate::error::{CatalogError, Result};
use crate::facet::{FacetCounter, FilterPanel};
use crate::filter::Registry;
use crate::frame::{
    counts_by_variable, counts_by_variable_pair, flatten, pivot, study_table, summarize_by_domain, DomainTotal,
    StudyTable, VariableCounts, VariablePairCounts,
};
use crate::resolve::Resolver;
use crate::selection::{Selection, RESET_KEY};

/// Payload key carrying explicit study row ids, which bypass the filters.
pub const STUDY_KEY: &str = "study";
// keys allowed next to explicit study ids
const STUDY_MODE_KEYS: [&str; 3] = ["Apply", STUDY_KEY, "search"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedStudies {
    #[serde(skip)]
    pub studies: RoaringTreemap,
    /// (filter label, applied summary) of every filter that was applied.
    pub applied: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterPage {
    pub query: String,
    pub total: usize,
    pub selected: u64,
    pub studies: Vec<String>,
    pub panel: FilterPanel,
    pub summary: Vec<DomainTotal>,
    pub table: Option<StudyTable>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainView {
    pub code: String,
    pub label: String,
    pub count: i64,
    pub counts: VariableCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualifiedDomainView {
    pub code: String,
    pub label: String,
    pub count: i64,
    pub counts: VariablePairCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exploration {
    pub total: usize,
    pub selected: u64,
    pub applied: Vec<(String, String)>,
    pub studies: Vec<String>,
    pub summary: Vec<DomainTotal>,
    pub domains: Vec<DomainView>,
    pub qualified_domains: Vec<QualifiedDomainView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableListing {
    pub domain: Domain,
    pub variables: Vec<Variable>,
    /// False when no listed variable has a category.
    pub show_category: bool,
    pub domains: Vec<Domain>,
    pub qualifiers: Vec<Domain>,
}

pub struct Explorer<'a> {
    catalog: &'a Catalog,
    qualifier_code: String,
}

impl<'a> Explorer<'a> {
    pub fn new(catalog: &'a Catalog, qualifier_code: impl Into<String>) -> Self {
        Self { catalog, qualifier_code: qualifier_code.into() }
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub fn normalize(&self, params: &Selection) -> Result<Selection> {
        params.normalize(self.catalog)
    }

    /// The studies a request is about. Explicit `study` ids are taken as they
    /// are, otherwise the active filters of the normalized payload are resolved.
    pub fn resolve_studies(&self, params: &Selection) -> Result<ResolvedStudies> {
        if params.contains(STUDY_KEY) {
            let mut studies = RoaringTreemap::new();
            for token in params.get_list(STUDY_KEY) {
                let thing: Thing = token
                    .trim()
                    .parse()
                    .map_err(|_| CatalogError::Input(format!("'{token}' is not a study id")))?;
                if self.catalog.study_id(thing).is_some() {
                    studies.insert(thing);
                }
            }
            return Ok(ResolvedStudies { studies, applied: Vec::new() });
        }
        let params = self.normalize(params)?;
        let filters = self.catalog.active_filters(&params);
        let studies = Resolver::new(self.catalog).resolve(&filters, &params)?;
        let registry = Registry::new(self.catalog);
        let applied = filters
            .iter()
            .map(|f| -> Result<(String, String)> {
                Ok((f.label().to_owned(), registry.applied_summary(f, &params)?))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ResolvedStudies { studies, applied })
    }

    /// Everything the study filter page shows for the selection.
    pub fn filter_page(&self, params: &Selection) -> Result<FilterPage> {
        let params = self.normalize(params)?;
        let filters = self.catalog.active_filters(&params);
        let studies = Resolver::new(self.catalog).resolve(&filters, &params)?;
        let panel = FacetCounter::new(self.catalog).panel(&params)?;
        let summary = summarize_by_domain(&flatten(self.catalog, &studies)?);
        let mut fields: Vec<&StudyField> = self.catalog.fields().filter(|f| f.shown_in_filter()).collect();
        fields.sort_by_key(|f| f.lil_order());
        let table = if studies.is_empty() { None } else { study_table(self.catalog, &fields, &studies) };
        Ok(FilterPage {
            query: params.to_query()?,
            total: self.catalog.study_count(),
            selected: studies.len(),
            studies: self.study_ids(&studies),
            panel,
            summary,
            table,
        })
    }

    /// Every study with the fields chosen for the study list, ordered by
    /// `big_order`. Every field is shown when none is chosen.
    pub fn study_list(&self) -> Option<StudyTable> {
        let mut fields: Vec<&StudyField> = self.catalog.fields().filter(|f| f.shown_in_table()).collect();
        if fields.is_empty() {
            fields = self.catalog.fields().collect();
        }
        fields.sort_by_key(|f| f.big_order());
        study_table(self.catalog, &fields, &self.catalog.all_studies())
    }

    /// Count views of the selected studies: the totals by domain, and per
    /// domain the counts by variable and by variable and qualifier.
    pub fn explore(&self, params: &Selection) -> Result<Exploration> {
        let params = if params.contains(RESET_KEY) { Selection::new() } else { params.clone() };
        if params.contains(STUDY_KEY) {
            if let Some(key) = params.keys().find(|k| !STUDY_MODE_KEYS.contains(k)) {
                return Err(CatalogError::Input(format!(
                    "'{key}' cannot be combined with explicit study ids"
                )));
            }
        }
        let resolved = self.resolve_studies(&params)?;
        let table = flatten(self.catalog, &resolved.studies)?;
        let mut exploration = Exploration {
            total: self.catalog.study_count(),
            selected: resolved.studies.len(),
            applied: resolved.applied,
            studies: self.study_ids(&resolved.studies),
            summary: Vec::new(),
            domains: Vec::new(),
            qualified_domains: Vec::new(),
        };
        if table.is_empty() {
            return Ok(exploration);
        }
        exploration.summary = summarize_by_domain(&table);
        let lookup = self.catalog.variable_lookup();
        let pivoted = pivot(&table);
        let mut domains: Vec<&Domain> = self.catalog.domains().collect();
        domains.sort_by(|a, b| a.label().cmp(b.label()));
        for domain in domains {
            let code = domain.code().trim_matches('*').to_owned();
            if let Some(counts) = counts_by_variable(&pivoted, &lookup, domain.code()) {
                exploration.domains.push(DomainView {
                    code: code.clone(),
                    label: domain.label().to_owned(),
                    count: counts.total(),
                    counts,
                });
            }
            if let Some(counts) = counts_by_variable_pair(&pivoted, &lookup, domain.code(), &self.qualifier_code) {
                exploration.qualified_domains.push(QualifiedDomainView {
                    code,
                    label: domain.label().to_owned(),
                    count: counts.total(),
                    counts,
                });
            }
        }
        debug!(
            domains = exploration.domains.len(),
            qualified = exploration.qualified_domains.len(),
            "explored counts"
        );
        Ok(exploration)
    }

    /// The variables of a domain, narrowed by `category` and by `variable`
    /// (matching either code or label).
    pub fn variables(&self, domain_code: &str, params: &Selection) -> Result<VariableListing> {
        let domain = self
            .catalog
            .domain(domain_code)
            .ok_or_else(|| CatalogError::unknown("domain", domain_code))?;
        let (category, wanted) = if params.contains(RESET_KEY) {
            (None, None)
        } else {
            (
                params.get("category").filter(|c| !c.is_empty()),
                params.get("variable").filter(|v| !v.is_empty()),
            )
        };
        let variables: Vec<Variable> = self
            .catalog
            .domain_variables(domain_code)
            .into_iter()
            .filter(|v| category.is_none_or(|c| v.category() == Some(c)))
            .filter(|v| wanted.is_none_or(|w| v.code() == w || v.label() == w))
            .cloned()
            .collect();
        let mut domains: Vec<Domain> = self.catalog.domains().cloned().collect();
        domains.sort_by(|a, b| a.label().cmp(b.label()));
        let (qualifiers, domains): (Vec<Domain>, Vec<Domain>) = domains.into_iter().partition(|d| d.is_qualifier());
        Ok(VariableListing {
            domain: domain.clone(),
            show_category: variables.iter().any(|v| v.category().is_some()),
            variables,
            domains,
            qualifiers,
        })
    }

    fn study_ids(&self, studies: &RoaringTreemap) -> Vec<String> {
        let mut ids: Vec<String> = studies
            .iter()
            .filter_map(|s| self.catalog.study_id(s))
            .map(str::to_owned)
            .collect();
        ids.sort();
        ids
    }
}
