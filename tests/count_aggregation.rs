use roaring::RoaringTreemap;
use serde_json::{json, Value};
use studycat::construct::{Catalog, StudyField, Thing};
use studycat::datatype::FieldType;
use studycat::frame::{
    counts_by_variable, counts_by_variable_pair, flatten, pivot, study_table, summarize_by_domain, CountTable,
};

struct Fixture {
    catalog: Catalog,
    x: Thing,
    y: Thing,
    anemia: Thing,
    rickets: Thing,
    infant: Thing,
    toddler: Thing,
}

fn setup() -> Fixture {
    let mut catalog = Catalog::default();
    let x = catalog.add_study("X");
    let y = catalog.add_study("Y");
    catalog.add_domain("FOO", "Foo findings", false).unwrap();
    let anemia = catalog.add_variable("FOO", "F1", "Anemia", None).unwrap();
    let rickets = catalog.add_variable("FOO", "F2", "Rickets", None).unwrap();
    catalog.add_domain("BAR", "Bar findings", false).unwrap();
    let bar = catalog.add_variable("BAR", "B1", "Bar one", None).unwrap();
    catalog.add_domain("AGECAT", "Age category", true).unwrap();
    let infant = catalog.add_variable("AGECAT", "1", "Infant", None).unwrap();
    let toddler = catalog.add_variable("AGECAT", "2", "Toddler", None).unwrap();
    catalog.add_count(x, 10, 5, &[anemia, infant]).unwrap();
    catalog.add_count(x, 20, 7, &[anemia, toddler]).unwrap();
    catalog.add_count(x, 5, 2, &[rickets, infant]).unwrap();
    catalog.add_count(y, 3, 1, &[bar]).unwrap();
    Fixture { catalog, x, y, anemia, rickets, infant, toddler }
}

fn only(study: Thing) -> RoaringTreemap {
    std::iter::once(study).collect()
}

#[test]
fn flatten_explodes_counts_per_variable() {
    let f = setup();
    let table = flatten(&f.catalog, &only(f.x)).unwrap();
    assert_eq!(table.len(), 6);
    assert!(table.rows().iter().all(|r| r.study_label == "X"));
    let foo_rows = table.rows().iter().filter(|r| r.domain_code == "FOO").count();
    assert_eq!(foo_rows, 3);
    assert!(table.rows().iter().any(|r| r.domain_label == "Age category" && r.codes == f.toddler));
}

#[test]
fn empty_flatten_keeps_columns() {
    let f = setup();
    let table = flatten(&f.catalog, &RoaringTreemap::new()).unwrap();
    assert!(table.is_empty());
    assert_eq!(table.columns(), CountTable::COLUMNS);
    assert!(table.columns().contains(&"domain_code"));
}

#[test]
fn totals_by_domain() {
    let f = setup();
    let both: RoaringTreemap = [f.x, f.y].into_iter().collect();
    let totals = summarize_by_domain(&flatten(&f.catalog, &both).unwrap());
    let summary: Vec<(&str, &str, i64, i64)> = totals
        .iter()
        .map(|t| (t.study_label.as_str(), t.domain_code.as_str(), t.count, t.subjects))
        .collect();
    assert_eq!(
        summary,
        [("X", "AGECAT", 35, 14), ("X", "FOO", 35, 14), ("Y", "BAR", 3, 1)]
    );
}

#[test]
fn pivot_has_a_column_per_domain() {
    let f = setup();
    let pivoted = pivot(&flatten(&f.catalog, &only(f.x)).unwrap());
    assert_eq!(pivoted.domains(), ["AGECAT", "FOO"]);
    assert_eq!(pivoted.len(), 3);
    let first = &pivoted.rows()[0];
    assert_eq!((first.count, first.subjects), (10, 5));
    assert_eq!(first.cell("FOO"), Some(f.anemia));
    assert_eq!(first.cell("AGECAT"), Some(f.infant));
    assert_eq!(first.cell("BAR"), None);
}

#[test]
fn counts_by_variable_sums_per_variable() {
    let f = setup();
    let lookup = f.catalog.variable_lookup();
    let pivoted = pivot(&flatten(&f.catalog, &only(f.x)).unwrap());
    let counts = counts_by_variable(&pivoted, &lookup, "FOO").unwrap();
    let rows: Vec<(Thing, i64, i64, Option<&str>, Option<&str>)> = counts
        .rows
        .iter()
        .map(|r| (r.variable, r.count, r.subjects, r.var_code.as_deref(), r.var_label.as_deref()))
        .collect();
    assert_eq!(
        rows,
        [
            (f.anemia, 30, 12, Some("F1"), Some("Anemia")),
            (f.rickets, 5, 2, Some("F2"), Some("Rickets"))
        ]
    );
    assert_eq!(counts.total(), 35);
    assert!(counts_by_variable(&pivoted, &lookup, "NONEXISTENT").is_none());
    assert!(counts_by_variable(&pivoted, &lookup, "BAR").is_none());
}

#[test]
fn counts_by_variable_is_repeatable() {
    let f = setup();
    let lookup = f.catalog.variable_lookup();
    let pivoted = pivot(&flatten(&f.catalog, &only(f.x)).unwrap());
    assert_eq!(
        counts_by_variable(&pivoted, &lookup, "FOO"),
        counts_by_variable(&pivoted, &lookup, "FOO")
    );
}

#[test]
fn counts_by_variable_pair_crosses_qualifier() {
    let f = setup();
    let lookup = f.catalog.variable_lookup();
    let pivoted = pivot(&flatten(&f.catalog, &only(f.x)).unwrap());
    let counts = counts_by_variable_pair(&pivoted, &lookup, "FOO", "AGECAT").unwrap();
    let rows: Vec<(Thing, Thing, i64)> = counts.rows.iter().map(|r| (r.qualifier, r.variable, r.count)).collect();
    assert_eq!(
        rows,
        [(f.infant, f.anemia, 10), (f.infant, f.rickets, 5), (f.toddler, f.anemia, 20)]
    );
    assert_eq!(counts.rows[0].qual_label.as_deref(), Some("Infant"));
    assert_eq!(counts.rows[0].var_code.as_deref(), Some("F1"));
    assert!(counts_by_variable_pair(&pivoted, &lookup, "FOO", "FOO").is_none());
    assert!(counts_by_variable_pair(&pivoted, &lookup, "BAR", "AGECAT").is_none());
}

#[test]
fn pair_without_shared_counts_is_none() {
    let f = setup();
    let lookup = f.catalog.variable_lookup();
    let both: RoaringTreemap = [f.x, f.y].into_iter().collect();
    let pivoted = pivot(&flatten(&f.catalog, &both).unwrap());
    // both columns exist, but no count is classified by both
    assert!(pivoted.has_domain("BAR") && pivoted.has_domain("AGECAT"));
    assert!(counts_by_variable_pair(&pivoted, &lookup, "BAR", "AGECAT").is_none());
}

#[test]
fn study_table_shows_longest_values() {
    let mut catalog = Catalog::default();
    let a = catalog.add_study("A");
    let b = catalog.add_study("B");
    catalog.add_field(StudyField::new("design").with_orders(0, 1)).unwrap();
    catalog.add_field(StudyField::new("start_year").with_type(FieldType::Int).with_orders(0, 0)).unwrap();
    catalog.add_field(StudyField::new("weight").with_type(FieldType::Float)).unwrap();
    catalog.add_field(StudyField::new("notes")).unwrap();
    catalog.add_value("design", "RCT", &[a, b]).unwrap();
    catalog.add_value("design", "Cohort study", &[a]).unwrap();
    catalog.add_value("start_year", "1992.0", &[a]).unwrap();
    catalog.add_value("weight", "2.5", &[a]).unwrap();

    let fields = [
        catalog.field("start_year").unwrap(),
        catalog.field("design").unwrap(),
        catalog.field("weight").unwrap(),
        catalog.field("notes").unwrap(),
    ];
    let studies: RoaringTreemap = [a, b].into_iter().collect();
    let table = study_table(&catalog, &fields, &studies).unwrap();
    assert_eq!(table.columns, ["start year", "design", "weight"]);
    let rows: Vec<(&str, &[Value])> = table.rows.iter().map(|r| (r.study_id.as_str(), r.cells.as_slice())).collect();
    assert_eq!(rows[0], ("A", &[json!("1992"), json!("Cohort study"), json!(2.5)][..]));
    assert_eq!(rows[1], ("B", &[Value::Null, json!("RCT"), Value::Null][..]));

    let notes_only = [catalog.field("notes").unwrap()];
    assert!(study_table(&catalog, &notes_only, &studies).is_none());
}
