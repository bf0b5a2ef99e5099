// Filters, and the registry deriving their values and choices from the catalog.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::construct::{Catalog, Thing, Variable};
use crate::datatype::{as_number, is_digit, json_number, Widget};
use crate::error::{CatalogError, Result};
use crate::selection::{Bounds, Selection};

// ------------- Filter -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterSource {
    Field(String),
    Domain(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FilterKind {
    Study,
    Qualifier,
    Domain,
}

/// A filter as the administrator declares it. Exactly one of `study_field`
/// and `domain` has to be given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDefinition {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub study_field: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub widget: Widget,
    #[serde(default = "empty_widget_json")]
    pub widget_json: Value,
}

fn empty_widget_json() -> Value {
    Value::Object(Map::new())
}

impl FilterDefinition {
    pub fn field(field_name: impl Into<String>, widget: Widget) -> Self {
        Self {
            label: None,
            study_field: Some(field_name.into()),
            domain: None,
            widget,
            widget_json: empty_widget_json(),
        }
    }
    pub fn domain(code: impl Into<String>, widget: Widget) -> Self {
        Self {
            label: None,
            study_field: None,
            domain: Some(code.into()),
            widget,
            widget_json: empty_widget_json(),
        }
    }
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
    pub fn with_widget_json(mut self, widget_json: Value) -> Self {
        self.widget_json = widget_json;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Filter {
    label: String,
    source: FilterSource,
    kind: FilterKind,
    widget: Widget,
    widget_json: Value,
}

impl Filter {
    // field name or domain code
    pub fn name(&self) -> &str {
        match &self.source {
            FilterSource::Field(name) => name,
            FilterSource::Domain(code) => code,
        }
    }
    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn source(&self) -> &FilterSource {
        &self.source
    }
    pub fn kind(&self) -> FilterKind {
        self.kind
    }
    pub fn widget(&self) -> Widget {
        self.widget
    }
    pub fn widget_json(&self) -> &Value {
        &self.widget_json
    }
    pub fn definition(&self) -> FilterDefinition {
        let (study_field, domain) = match &self.source {
            FilterSource::Field(name) => (Some(name.clone()), None),
            FilterSource::Domain(code) => (None, Some(code.clone())),
        };
        FilterDefinition {
            label: Some(self.label.clone()),
            study_field,
            domain,
            widget: self.widget,
            widget_json: self.widget_json.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Thing>,
    pub value: String,
    pub label: String,
}

/// Where a slider starts out, derived from the current selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SliderPosition {
    Index { from: usize, to: usize },
    // integral bounds stay integral
    Number { from: Number, to: Number },
}

// ------------- Registry -------------
pub struct Registry<'a> {
    catalog: &'a Catalog,
}

impl<'a> Registry<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    pub fn define(&self, definition: FilterDefinition) -> Result<Filter> {
        let FilterDefinition { label, study_field, domain, widget, widget_json } = definition;
        let (source, kind, default_label) = match (study_field, domain) {
            (Some(_), Some(_)) => {
                return Err(CatalogError::Configuration(
                    "Supply either a domain or a study_field, not both.".into(),
                ));
            }
            (None, None) => {
                return Err(CatalogError::Configuration(
                    "Supply either a domain or a study_field.".into(),
                ));
            }
            (Some(name), None) => {
                let field = self
                    .catalog
                    .field(&name)
                    .ok_or_else(|| CatalogError::unknown("study field", name.as_str()))?;
                let label = field.label().to_owned();
                (FilterSource::Field(name), FilterKind::Study, label)
            }
            (None, Some(code)) => {
                let domain = self
                    .catalog
                    .domain(&code)
                    .ok_or_else(|| CatalogError::unknown("domain", code.as_str()))?;
                let kind = if domain.is_qualifier() { FilterKind::Qualifier } else { FilterKind::Domain };
                let label = domain.label().to_owned();
                (FilterSource::Domain(code), kind, label)
            }
        };
        let filter = Filter {
            label: label.filter(|l| !l.is_empty()).unwrap_or(default_label),
            source,
            kind,
            widget,
            widget_json,
        };
        if widget == Widget::DoubleSlider && self.values_for(&filter).iter().any(|v| !is_digit(v)) {
            return Err(CatalogError::Configuration(
                "Filter values are not numeric, cannot use range slider widget".into(),
            ));
        }
        Ok(filter)
    }

    pub fn filter_kind(&self, filter: &Filter) -> FilterKind {
        filter.kind()
    }

    /// The legal values of the filter, sentinels excluded. Field literals sort
    /// lexically, domain codes by variable label (qualifiers numerically).
    pub fn values_for(&self, filter: &Filter) -> Vec<String> {
        let sentinels = self.catalog.sentinels();
        let mut values: Vec<String> = match filter.source() {
            FilterSource::Field(name) => {
                let mut values: Vec<String> = self
                    .catalog
                    .field_values(name)
                    .iter()
                    .map(|v| v.value().to_owned())
                    .collect();
                values.sort();
                values.dedup();
                values
            }
            FilterSource::Domain(code) => {
                let mut codes: Vec<String> = self
                    .labelled_variables(code)
                    .iter()
                    .map(|v| v.code().to_owned())
                    .collect();
                if filter.kind() == FilterKind::Qualifier {
                    codes.sort_by_key(|c| c.parse::<i64>().ok());
                }
                codes
            }
        };
        values.retain(|v| !sentinels.is_missing(v));
        values
    }

    /// Pairs every value with its label, and optionally with the id of the row
    /// behind it, in the order of `values` (or of [`Registry::values_for`]).
    pub fn choices_for(&self, filter: &Filter, values: Option<&[String]>, include_ids: bool) -> Result<Vec<Choice>> {
        let owned;
        let values = match values {
            Some(values) => values,
            None => {
                owned = self.values_for(filter);
                &owned
            }
        };
        values
            .iter()
            .map(|value| -> Result<Choice> {
                match filter.source() {
                    FilterSource::Field(name) => {
                        let id = if include_ids {
                            let row = self
                                .catalog
                                .value_by_literal(name, value)
                                .ok_or_else(|| CatalogError::unknown("study variable", format!("{name}: {value}")))?;
                            Some(row.id())
                        } else {
                            None
                        };
                        Ok(Choice { id, value: value.clone(), label: value.clone() })
                    }
                    FilterSource::Domain(code) => {
                        let variable = self
                            .catalog
                            .variable_by_code(code, value)
                            .ok_or_else(|| CatalogError::unknown("variable", format!("{code}: {value}")))?;
                        Ok(Choice {
                            id: include_ids.then(|| variable.id()),
                            value: value.clone(),
                            label: variable.label().to_owned(),
                        })
                    }
                }
            })
            .collect()
    }

    // checkboxes yield the submitted row ids, sliders the values inside the range
    pub fn parse_selection(&self, filter: &Filter, params: &Selection, values: Option<&[String]>) -> Result<Vec<String>> {
        match filter.widget() {
            Widget::Checkbox => Ok(params.get_list(filter.name()).to_vec()),
            Widget::DiscreteSlider => {
                let bounds = self.bounds(filter, params)?;
                let choices = self.choices_for(filter, values, false)?;
                let from = label_index(&choices, &bounds.from)?;
                let to = label_index(&choices, &bounds.to)?;
                if from > to {
                    return Ok(Vec::new());
                }
                Ok(choices[from..=to].iter().map(|c| c.value.clone()).collect())
            }
            Widget::DoubleSlider => {
                let bounds = self.bounds(filter, params)?;
                let from = bound_number(&bounds.from)?;
                let to = bound_number(&bounds.to)?;
                let owned;
                let values = match values {
                    Some(values) => values,
                    None => {
                        owned = self.values_for(filter);
                        &owned
                    }
                };
                Ok(values
                    .iter()
                    .filter(|v| as_number(v).is_some_and(|n| from <= n && n <= to))
                    .cloned()
                    .collect())
            }
        }
    }

    /// True when `[from, to]` covers every legal value, so the selection
    /// would not narrow anything down.
    pub fn is_full_range(&self, filter: &Filter, from: &str, to: &str) -> Result<bool> {
        match filter.widget() {
            Widget::DiscreteSlider => {
                let choices = self.choices_for(filter, None, false)?;
                Ok(match (choices.first(), choices.last()) {
                    (Some(first), Some(last)) => first.label == from && last.label == to,
                    _ => false,
                })
            }
            Widget::DoubleSlider => {
                let from = bound_number(from)?;
                let to = bound_number(to)?;
                let numbers: Vec<f64> = self.values_for(filter).iter().filter_map(|v| as_number(v)).collect();
                let min = numbers.iter().copied().reduce(f64::min);
                let max = numbers.iter().copied().reduce(f64::max);
                Ok(match (min, max) {
                    (Some(min), Some(max)) => from <= min && max <= to,
                    _ => false,
                })
            }
            Widget::Checkbox => Err(not_a_range(filter)),
        }
    }

    /// The category of every variable of the filter's domain in label order, or
    /// nothing at all when no variable has a category.
    pub fn categories(&self, filter: &Filter) -> Result<Vec<Option<String>>> {
        let code = match (filter.source(), filter.kind()) {
            (FilterSource::Domain(code), FilterKind::Domain) => code,
            _ => {
                return Err(CatalogError::Configuration(format!(
                    "Filter {} has no categories, only non-qualifier domains do",
                    filter.name()
                )));
            }
        };
        let categories: Vec<Option<String>> = self
            .labelled_variables(code)
            .iter()
            .map(|v| v.category().map(str::to_owned))
            .collect();
        if categories.iter().all(|c| c.as_deref().is_none_or(str::is_empty)) {
            return Ok(Vec::new());
        }
        Ok(categories)
    }

    pub fn applied_summary(&self, filter: &Filter, params: &Selection) -> Result<String> {
        if filter.widget().is_slider() {
            let bounds = self.bounds(filter, params)?;
            return Ok(format!("{} - {}", bounds.from, bounds.to));
        }
        let values = self.values_for(filter);
        let selections = self.parse_selection(filter, params, Some(&values))?;
        let choices = self.choices_for(filter, Some(&values), true)?;
        let labels: Vec<&str> = selections
            .iter()
            .map(|selected| {
                choices
                    .iter()
                    .find(|c| c.id.is_some_and(|id| id.to_string() == *selected))
                    .map_or("Invalid", |c| c.label.as_str())
            })
            .collect();
        Ok(labels.join(" | "))
    }

    /// Where the slider of the filter starts, `None` when it is not selected.
    pub fn initial_slider_values(
        &self,
        filter: &Filter,
        params: &Selection,
        values: Option<&[String]>,
    ) -> Result<Option<SliderPosition>> {
        let bounds = match params.range(filter.name())? {
            Some(bounds) => bounds,
            None => {
                return match filter.widget() {
                    Widget::Checkbox => Err(not_a_range(filter)),
                    _ => Ok(None),
                };
            }
        };
        match filter.widget() {
            Widget::DiscreteSlider => {
                let choices = self.choices_for(filter, values, false)?;
                Ok(Some(SliderPosition::Index {
                    from: label_index(&choices, &bounds.from)?,
                    to: label_index(&choices, &bounds.to)?,
                }))
            }
            Widget::DoubleSlider => Ok(Some(SliderPosition::Number {
                from: bound_json(bound_number(&bounds.from)?)?,
                to: bound_json(bound_number(&bounds.to)?)?,
            })),
            Widget::Checkbox => Err(not_a_range(filter)),
        }
    }

    fn bounds(&self, filter: &Filter, params: &Selection) -> Result<Bounds> {
        params
            .range(filter.name())?
            .ok_or_else(|| CatalogError::Input(format!("No range selected for filter {}", filter.name())))
    }

    // the domain's variables ordered by label, ties keep id order
    fn labelled_variables(&self, domain_code: &str) -> Vec<&'a Variable> {
        let mut variables = self.catalog.domain_variables(domain_code);
        variables.sort_by(|a, b| a.label().cmp(b.label()));
        variables
    }
}

fn label_index(choices: &[Choice], label: &str) -> Result<usize> {
    choices
        .iter()
        .position(|c| c.label == label)
        .ok_or_else(|| CatalogError::Input(format!("'{label}' is not a label of this filter")))
}

fn bound_number(token: &str) -> Result<f64> {
    as_number(token)
        .filter(|n| !n.is_nan())
        .ok_or_else(|| CatalogError::Input(format!("'{token}' is not a number")))
}

fn bound_json(n: f64) -> Result<Number> {
    json_number(n).ok_or_else(|| CatalogError::Input(format!("{n} is not a finite number")))
}

fn not_a_range(filter: &Filter) -> CatalogError {
    CatalogError::Configuration(format!("Filter {} does not use a range widget", filter.name()))
}
