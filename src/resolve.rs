use roaring::RoaringTreemap;
use tracing::debug;

use crate::construct::{Catalog, Thing};
use crate::datatype::Widget;
use crate::error::{CatalogError, Result};
use crate::filter::{Filter, FilterSource, Registry};
use crate::selection::Selection;

pub struct Resolver<'a> {
    catalog: &'a Catalog,
    registry: Registry<'a>,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog, registry: Registry::new(catalog) }
    }

    /// Studies satisfying every one of `filters`, or every study when there
    /// are no filters.
    pub fn resolve(&self, filters: &[&Filter], params: &Selection) -> Result<RoaringTreemap> {
        let mut studies = self.catalog.all_studies();
        for filter in filters {
            if studies.is_empty() {
                break;
            }
            // this is instead of the deprecated intersect_with
            studies &= self.matching(filter, params)?;
        }
        debug!(filters = filters.len(), studies = studies.len(), "resolved population");
        Ok(studies)
    }

    pub fn matching(&self, filter: &Filter, params: &Selection) -> Result<RoaringTreemap> {
        let selected = self.registry.parse_selection(filter, params, None)?;
        let mut studies = RoaringTreemap::new();
        match (filter.source(), filter.widget()) {
            (FilterSource::Field(name), Widget::Checkbox) => {
                for id in parse_ids(filter, &selected)? {
                    if let Some(value) = self.catalog.value(id).filter(|v| v.field_name() == name) {
                        studies |= value.studies();
                    }
                }
            }
            (FilterSource::Field(name), _) => {
                for literal in &selected {
                    if let Some(value) = self.catalog.value_by_literal(name, literal) {
                        studies |= value.studies();
                    }
                }
            }
            (FilterSource::Domain(code), Widget::Checkbox) => {
                for id in parse_ids(filter, &selected)? {
                    let in_domain = self.catalog.variable(id).is_some_and(|v| v.domain() == code);
                    if let Some(holders) = self.catalog.variable_studies(id).filter(|_| in_domain) {
                        studies |= holders;
                    }
                }
            }
            (FilterSource::Domain(code), _) => {
                for variable in &selected {
                    if let Some(holders) = self
                        .catalog
                        .variable_by_code(code, variable)
                        .and_then(|v| self.catalog.variable_studies(v.id()))
                    {
                        studies |= holders;
                    }
                }
            }
        }
        debug!(filter = filter.name(), selected = selected.len(), studies = studies.len(), "matched filter");
        Ok(studies)
    }
}

fn parse_ids(filter: &Filter, tokens: &[String]) -> Result<Vec<Thing>> {
    tokens
        .iter()
        .map(|token| {
            token.trim().parse::<Thing>().map_err(|_| {
                CatalogError::Input(format!("'{token}' is not a choice id of filter {}", filter.name()))
            })
        })
        .collect()
}
