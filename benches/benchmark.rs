use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use studycat::construct::{Catalog, StudyField, Thing};
use studycat::datatype::{FieldType, Widget};
use studycat::facet::FacetCounter;
use studycat::filter::FilterDefinition;
use studycat::frame::{counts_by_variable_pair, flatten, pivot};
use studycat::resolve::Resolver;
use studycat::selection::Selection;

const COUNTRIES: [&str; 6] = ["USA", "CAN", "GBR", "PER", "IND", "ZAF"];

// a catalog of `studies` studies, each with a handful of counts over two
// plain domains and the age qualifier
fn synthetic_catalog(studies: u64) -> Catalog {
    let mut catalog = Catalog::default();
    catalog.add_field(StudyField::new("country").with_type(FieldType::List)).unwrap();
    catalog.add_field(StudyField::new("start_year").with_type(FieldType::Int)).unwrap();
    catalog.add_domain("FOO", "Foo findings", false).unwrap();
    catalog.add_domain("BAR", "Bar findings", false).unwrap();
    catalog.add_domain("AGECAT", "Age category", true).unwrap();
    let foo: Vec<Thing> = (0..20)
        .map(|n| catalog.add_variable("FOO", &format!("F{n}"), &format!("Foo {n}"), None).unwrap())
        .collect();
    let bar: Vec<Thing> = (0..10)
        .map(|n| catalog.add_variable("BAR", &format!("B{n}"), &format!("Bar {n}"), None).unwrap())
        .collect();
    let ages: Vec<Thing> = (0..8)
        .map(|n| catalog.add_variable("AGECAT", &n.to_string(), &format!("Age {n}"), None).unwrap())
        .collect();
    for n in 0..studies {
        let study = catalog.add_study(&format!("S{n:05}"));
        let countries = format!("{}, {}", COUNTRIES[(n % 6) as usize], COUNTRIES[(n % 5) as usize]);
        catalog.add_value("country", &countries, &[study]).unwrap();
        catalog.add_value("start_year", &(1980 + n % 40).to_string(), &[study]).unwrap();
        for k in 0..8u64 {
            let i = (n + k) as usize;
            catalog.add_count(study, (10 + k) as i64, 5, &[foo[i % 20], ages[i % 8]]).unwrap();
        }
        catalog.add_count(study, 3, 1, &[bar[(n % 10) as usize]]).unwrap();
    }
    catalog.add_filter(FilterDefinition::field("country", Widget::Checkbox)).unwrap();
    catalog.add_filter(FilterDefinition::field("start_year", Widget::DoubleSlider)).unwrap();
    catalog.add_filter(FilterDefinition::domain("FOO", Widget::Checkbox)).unwrap();
    catalog.add_filter(FilterDefinition::domain("AGECAT", Widget::DiscreteSlider)).unwrap();
    catalog
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let catalog = synthetic_catalog(5000);
    let usa = catalog.value_by_literal("country", "USA").unwrap().id();
    let f3 = catalog.variable_by_code("FOO", "F3").unwrap().id();
    let params = Selection::new()
        .with("country", usa.to_string())
        .with("start_year", "1990;2010")
        .with("FOO", f3.to_string())
        .with("AGECAT", "Age 1;Age 5");
    let active = catalog.active_filters(&params);
    let resolver = Resolver::new(&catalog);
    let studies = resolver.resolve(&active, &params).unwrap();
    println!("{} of {} studies selected", studies.len(), catalog.study_count());

    c.bench_function("resolve 4 filters", |b| {
        b.iter(|| resolver.resolve(black_box(&active), black_box(&params)))
    });
    c.bench_function("filter panel", |b| {
        let counter = FacetCounter::new(&catalog);
        b.iter(|| counter.panel(black_box(&params)))
    });
    let everything = catalog.all_studies();
    c.bench_function("flatten and pivot", |b| {
        b.iter(|| pivot(&flatten(&catalog, black_box(&everything)).unwrap()))
    });
    let lookup = catalog.variable_lookup();
    let pivoted = pivot(&flatten(&catalog, &everything).unwrap());
    c.bench_function("counts by variable pair", |b| {
        b.iter(|| counts_by_variable_pair(black_box(&pivoted), &lookup, "FOO", "AGECAT"))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
