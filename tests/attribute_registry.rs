use serde_json::{json, Number};
use studycat::construct::{Catalog, StudyField};
use studycat::datatype::{FieldType, Widget};
use studycat::error::CatalogError;
use studycat::filter::{FilterDefinition, FilterKind, Registry, SliderPosition};
use studycat::resolve::Resolver;
use studycat::selection::Selection;

fn setup() -> Catalog {
    let mut catalog = Catalog::default();
    let a = catalog.add_study("A");
    let b = catalog.add_study("B");
    let c = catalog.add_study("C");
    let d = catalog.add_study("D");
    catalog.add_field(StudyField::new("country").with_type(FieldType::List)).unwrap();
    catalog.add_field(StudyField::new("start_year").with_type(FieldType::Int)).unwrap();
    catalog.add_field(StudyField::new("design")).unwrap();
    catalog.add_value("country", "USA, CAN", &[a]).unwrap();
    catalog.add_value("country", "USA", &[b]).unwrap();
    catalog.add_value("country", "None", &[c]).unwrap();
    for (study, year) in [(a, "1991"), (b, "1992"), (c, "1993"), (d, "1994")] {
        catalog.add_value("start_year", year, &[study]).unwrap();
    }
    catalog.add_value("start_year", "9999", &[]).unwrap();
    catalog.add_value("design", "RCT", &[a, b]).unwrap();

    catalog.add_domain("FOO", "Foo findings", false).unwrap();
    catalog.add_variable("FOO", "F1", "Zeta", Some("Blood")).unwrap();
    catalog.add_variable("FOO", "F2", "Alpha", None).unwrap();
    catalog.add_variable("FOO", "F3", "Mid", Some("Bone")).unwrap();
    catalog.add_domain("BAR", "Bar findings", false).unwrap();
    catalog.add_variable("BAR", "B1", "Bar one", None).unwrap();
    catalog.add_domain("AGECAT", "Age category", true).unwrap();
    for (code, label) in [("10", "10+ years"), ("2", "2 years"), ("0", "Birth"), ("1", "1 year")] {
        catalog.add_variable("AGECAT", code, label, None).unwrap();
    }

    catalog.add_filter(FilterDefinition::field("country", Widget::Checkbox)).unwrap();
    catalog
        .add_filter(FilterDefinition::field("start_year", Widget::DoubleSlider).with_label("Start year"))
        .unwrap();
    catalog.add_filter(FilterDefinition::domain("AGECAT", Widget::DiscreteSlider)).unwrap();
    catalog.add_filter(FilterDefinition::domain("FOO", Widget::Checkbox)).unwrap();
    catalog.add_filter(FilterDefinition::domain("BAR", Widget::Checkbox)).unwrap();
    catalog
}

#[test]
fn field_values_are_lexical_and_skip_sentinels() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    // "None" is stored but never listed, and the compound was split
    assert_eq!(registry.values_for(catalog.filter("country").unwrap()), ["CAN", "USA"]);
    assert_eq!(
        registry.values_for(catalog.filter("start_year").unwrap()),
        ["1991", "1992", "1993", "1994"]
    );
}

#[test]
fn domain_values_are_ordered_by_label() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    assert_eq!(registry.values_for(catalog.filter("FOO").unwrap()), ["F2", "F3", "F1"]);
}

#[test]
fn qualifier_values_are_ordered_numerically() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    assert_eq!(registry.values_for(catalog.filter("AGECAT").unwrap()), ["0", "1", "2", "10"]);
}

#[test]
fn choices_follow_value_order() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    let filter = catalog.filter("FOO").unwrap();
    let values = registry.values_for(filter);
    let choices = registry.choices_for(filter, None, true).unwrap();
    let codes: Vec<&str> = choices.iter().map(|c| c.value.as_str()).collect();
    assert_eq!(codes, values);
    let labels: Vec<&str> = choices.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, ["Alpha", "Mid", "Zeta"]);
    assert_eq!(choices[2].id, Some(catalog.variable_by_code("FOO", "F1").unwrap().id()));
    // ids are only attached when asked for
    assert!(registry.choices_for(filter, None, false).unwrap().iter().all(|c| c.id.is_none()));
}

#[test]
fn filter_kinds_and_default_labels() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    let country = catalog.filter("country").unwrap();
    assert_eq!(registry.filter_kind(country), FilterKind::Study);
    assert_eq!(country.label(), "country");
    assert_eq!(catalog.filter("start_year").unwrap().label(), "Start year");
    assert_eq!(catalog.filter("AGECAT").unwrap().kind(), FilterKind::Qualifier);
    assert_eq!(catalog.filter("FOO").unwrap().kind(), FilterKind::Domain);
    assert_eq!(catalog.filter("FOO").unwrap().label(), "Foo findings");
}

#[test]
fn definitions_need_exactly_one_source() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    let both = FilterDefinition {
        label: None,
        study_field: Some("design".into()),
        domain: Some("FOO".into()),
        widget: Widget::Checkbox,
        widget_json: json!({}),
    };
    assert!(matches!(registry.define(both), Err(CatalogError::Configuration(_))));
    let neither = FilterDefinition { study_field: None, domain: None, ..FilterDefinition::field("design", Widget::Checkbox) };
    assert!(matches!(registry.define(neither), Err(CatalogError::Configuration(_))));
    assert!(matches!(
        registry.define(FilterDefinition::field("missing", Widget::Checkbox)),
        Err(CatalogError::Unknown { .. })
    ));
}

#[test]
fn double_slider_needs_numeric_values() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    let result = registry.define(FilterDefinition::field("design", Widget::DoubleSlider));
    assert!(matches!(result, Err(CatalogError::Configuration(_))));
}

#[test]
fn definitions_read_from_json() {
    let catalog = setup();
    let definition: FilterDefinition =
        serde_json::from_value(json!({"domain": "AGECAT", "widget": "discrete slider"})).unwrap();
    let filter = Registry::new(&catalog).define(definition).unwrap();
    assert_eq!(filter.widget(), Widget::DiscreteSlider);
    assert_eq!(filter.definition().domain.as_deref(), Some("AGECAT"));
}

#[test]
fn checkbox_selection_is_taken_verbatim() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    let params = Selection::new().with("country", "7").with("country", "3");
    let selected = registry.parse_selection(catalog.filter("country").unwrap(), &params, None).unwrap();
    assert_eq!(selected, ["7", "3"]);
}

#[test]
fn discrete_slider_selects_a_label_range() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    let filter = catalog.filter("AGECAT").unwrap();
    let params = Selection::new().with("AGECAT", "1 year;2 years");
    assert_eq!(registry.parse_selection(filter, &params, None).unwrap(), ["1", "2"]);
    let unknown = Selection::new().with("AGECAT", "1 year;Teen");
    assert!(matches!(registry.parse_selection(filter, &unknown, None), Err(CatalogError::Input(_))));
}

#[test]
fn reversed_discrete_range_selects_nothing() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    let filter = catalog.filter("AGECAT").unwrap();
    let params = Selection::new().with("AGECAT", "2 years;1 year");
    assert!(registry.parse_selection(filter, &params, None).unwrap().is_empty());
    let studies = Resolver::new(&catalog).matching(filter, &params).unwrap();
    assert!(studies.is_empty());
}

#[test]
fn double_slider_selects_a_numeric_range() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    let filter = catalog.filter("start_year").unwrap();
    let params = Selection::new().with("start_year", "1992;1993");
    assert_eq!(registry.parse_selection(filter, &params, None).unwrap(), ["1992", "1993"]);
    let malformed = Selection::new().with("start_year", "soon;1993");
    assert!(matches!(registry.parse_selection(filter, &malformed, None), Err(CatalogError::Input(_))));
}

#[test]
fn full_range_detection() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    let years = catalog.filter("start_year").unwrap();
    assert!(registry.is_full_range(years, "1991", "1994").unwrap());
    assert!(!registry.is_full_range(years, "1991", "1993").unwrap());
    let ages = catalog.filter("AGECAT").unwrap();
    assert!(registry.is_full_range(ages, "Birth", "10+ years").unwrap());
    assert!(!registry.is_full_range(ages, "1 year", "10+ years").unwrap());
    let countries = catalog.filter("country").unwrap();
    assert!(matches!(registry.is_full_range(countries, "a", "b"), Err(CatalogError::Configuration(_))));
}

#[test]
fn categories_only_for_plain_domains() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    assert_eq!(
        registry.categories(catalog.filter("FOO").unwrap()).unwrap(),
        [None, Some("Bone".to_string()), Some("Blood".to_string())]
    );
    assert!(registry.categories(catalog.filter("BAR").unwrap()).unwrap().is_empty());
    assert!(matches!(
        registry.categories(catalog.filter("country").unwrap()),
        Err(CatalogError::Configuration(_))
    ));
    assert!(matches!(
        registry.categories(catalog.filter("AGECAT").unwrap()),
        Err(CatalogError::Configuration(_))
    ));
}

#[test]
fn applied_summaries() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    let usa = catalog.value_by_literal("country", "USA").unwrap().id();
    let params = Selection::new()
        .with("country", usa.to_string())
        .with("country", "424242")
        .with("start_year", "1992;1993");
    assert_eq!(
        registry.applied_summary(catalog.filter("country").unwrap(), &params).unwrap(),
        "USA | Invalid"
    );
    assert_eq!(
        registry.applied_summary(catalog.filter("start_year").unwrap(), &params).unwrap(),
        "1992 - 1993"
    );
}

#[test]
fn initial_slider_positions() {
    let catalog = setup();
    let registry = Registry::new(&catalog);
    let params = Selection::new().with("AGECAT", "1 year;2 years").with("start_year", "1992.5;1994");
    assert_eq!(
        registry.initial_slider_values(catalog.filter("AGECAT").unwrap(), &params, None).unwrap(),
        Some(SliderPosition::Index { from: 1, to: 2 })
    );
    assert_eq!(
        registry.initial_slider_values(catalog.filter("start_year").unwrap(), &params, None).unwrap(),
        Some(SliderPosition::Number { from: Number::from_f64(1992.5).unwrap(), to: Number::from(1994) })
    );
    assert_eq!(
        registry.initial_slider_values(catalog.filter("AGECAT").unwrap(), &Selection::new(), None).unwrap(),
        None
    );
    assert!(registry.initial_slider_values(catalog.filter("country").unwrap(), &params, None).is_err());
}
