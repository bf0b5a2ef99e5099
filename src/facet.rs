// A choice is counted against every active filter except its own.

use serde::Serialize;
use serde_json::{Number, Value};
use tracing::debug;

use crate::construct::Catalog;
use crate::datatype::{as_number, json_number, Widget};
use crate::error::Result;
use crate::filter::{Choice, Filter, FilterKind, FilterSource, Registry, SliderPosition};
use crate::resolve::Resolver;
use crate::selection::Selection;

/// The active filters other than `filter`, compared by name.
pub fn excluding<'f>(active: &[&'f Filter], filter: &Filter) -> Vec<&'f Filter> {
    active.iter().copied().filter(|f| f.name() != filter.name()).collect()
}

pub struct FacetCounter<'a> {
    catalog: &'a Catalog,
    registry: Registry<'a>,
    resolver: Resolver<'a>,
}

impl<'a> FacetCounter<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            registry: Registry::new(catalog),
            resolver: Resolver::new(catalog),
        }
    }

    /// Studies per value of the filter, aligned with [`Registry::values_for`].
    /// `others` must not contain the filter itself, see [`excluding`].
    pub fn counts_for(&self, filter: &Filter, others: &[&Filter], params: &Selection) -> Result<Vec<u64>> {
        let values = self.registry.values_for(filter);
        self.counts_for_values(filter, others, params, &values)
    }

    fn counts_for_values(
        &self,
        filter: &Filter,
        others: &[&Filter],
        params: &Selection,
        values: &[String],
    ) -> Result<Vec<u64>> {
        let population = self.resolver.resolve(others, params)?;
        let counts = values
            .iter()
            .map(|value| match filter.source() {
                FilterSource::Field(name) => self
                    .catalog
                    .value_by_literal(name, value)
                    .map_or(0, |v| v.studies().intersection_len(&population)),
                FilterSource::Domain(code) => self
                    .catalog
                    .variable_by_code(code, value)
                    .and_then(|v| self.catalog.variable_studies(v.id()))
                    .map_or(0, |holders| holders.intersection_len(&population)),
            })
            .collect();
        debug!(filter = filter.name(), population = population.len(), "counted facet");
        Ok(counts)
    }

    /// Every filter rendered against the selection, grouped by kind and
    /// ordered by label within a group.
    pub fn panel(&self, params: &Selection) -> Result<FilterPanel> {
        let active = self.catalog.active_filters(params);
        let mut filters: Vec<&Filter> = self.catalog.filters().collect();
        filters.sort_by(|a, b| a.label().cmp(b.label()));
        let mut panel = FilterPanel::default();
        for filter in filters {
            let view = self.view(filter, &active, params)?;
            if let Some(summary) = &view.applied {
                panel.applied.push((filter.label().to_owned(), summary.clone()));
            }
            match filter.kind() {
                FilterKind::Study => panel.study.push(view),
                FilterKind::Qualifier => panel.qualifier.push(view),
                FilterKind::Domain => panel.domain.push(view),
            }
        }
        Ok(panel)
    }

    fn view(&self, filter: &Filter, active: &[&Filter], params: &Selection) -> Result<FacetView> {
        let values = self.registry.values_for(filter);
        let control = match filter.widget() {
            Widget::DiscreteSlider => Control::DiscreteSlider {
                choices: self.registry.choices_for(filter, Some(&values), false)?,
                initial: self.registry.initial_slider_values(filter, params, Some(&values))?,
                widget_json: filter.widget_json().clone(),
            },
            Widget::DoubleSlider => {
                let numbers: Vec<f64> = values.iter().filter_map(|v| as_number(v)).collect();
                Control::DoubleSlider {
                    min: numbers.iter().copied().reduce(f64::min).and_then(json_number),
                    max: numbers.iter().copied().reduce(f64::max).and_then(json_number),
                    initial: self.registry.initial_slider_values(filter, params, Some(&values))?,
                    widget_json: filter.widget_json().clone(),
                }
            }
            Widget::Checkbox => {
                let choices = self.registry.choices_for(filter, Some(&values), true)?;
                let counts = self.counts_for_values(filter, &excluding(active, filter), params, &values)?;
                let (categories, autocomplete) = if filter.kind() == FilterKind::Domain {
                    let mut terms: Vec<String> =
                        choices.iter().flat_map(|c| [c.value.clone(), c.label.clone()]).collect();
                    terms.sort();
                    terms.dedup();
                    (self.registry.categories(filter)?, terms)
                } else {
                    (Vec::new(), Vec::new())
                };
                Control::Checkbox {
                    choices: choices
                        .into_iter()
                        .zip(counts)
                        .map(|(choice, count)| CountedChoice { choice, count })
                        .collect(),
                    selected: params.get_list(filter.name()).to_vec(),
                    categories,
                    autocomplete,
                }
            }
        };
        let applied = if params.contains(filter.name()) {
            Some(self.registry.applied_summary(filter, params)?)
        } else {
            None
        };
        Ok(FacetView {
            name: filter.name().to_owned(),
            label: filter.label().to_owned(),
            applied,
            control,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountedChoice {
    #[serde(flatten)]
    pub choice: Choice,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum Control {
    Checkbox {
        choices: Vec<CountedChoice>,
        selected: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        categories: Vec<Option<String>>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        autocomplete: Vec<String>,
    },
    DiscreteSlider {
        choices: Vec<Choice>,
        initial: Option<SliderPosition>,
        widget_json: Value,
    },
    DoubleSlider {
        min: Option<Number>,
        max: Option<Number>,
        initial: Option<SliderPosition>,
        widget_json: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetView {
    pub name: String,
    pub label: String,
    pub applied: Option<String>,
    pub control: Control,
}

impl FacetView {
    pub fn is_active(&self) -> bool {
        self.applied.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterPanel {
    pub study: Vec<FacetView>,
    pub qualifier: Vec<FacetView>,
    pub domain: Vec<FacetView>,
    /// (filter label, applied summary) of every active filter.
    pub applied: Vec<(String, String)>,
}

impl FilterPanel {
    pub fn get(&self, name: &str) -> Option<&FacetView> {
        self.study
            .iter()
            .chain(&self.qualifier)
            .chain(&self.domain)
            .find(|v| v.name == name)
    }
}
