// used for persistence
use rusqlite::{params, Connection, Transaction};

use std::collections::HashMap;

use roaring::RoaringTreemap;
use tracing::{debug, info};

use crate::construct::{Catalog, CatalogOptions, Count, Domain, StudyField, StudyVariable, Thing, ThingHasher, Variable};
use crate::datatype::{FieldType, Widget};
use crate::error::{CatalogError, Result};
use crate::filter::FilterDefinition;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(String),
}

impl PersistenceMode {
    /// `:memory:` selects an in-memory database, anything else is a file path.
    pub fn from_path(path: &str) -> Self {
        match path {
            ":memory:" => PersistenceMode::InMemory,
            file => PersistenceMode::File(file.to_owned()),
        }
    }
}

// row ids are u64 in memory and integers in SQLite
fn to_sql_id(thing: Thing) -> i64 {
    thing as i64
}
fn from_sql_id(id: i64) -> Thing {
    id as Thing
}

// ------------- Persistence -------------
pub struct Persistor {
    connection: Connection,
}

impl Persistor {
    pub fn new(mode: &PersistenceMode) -> Result<Self> {
        let connection = match mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => Connection::open(path)?,
        };
        // The "STRICT" keyword introduced in 3.37.0 breaks JDBC connections, which makes
        // debugging using an external tool like DBeaver impossible
        connection.execute_batch(
            "
            pragma foreign_keys = on;
            create table if not exists Study (
                Study_Identity integer not null,
                StudyID text not null,
                constraint referenceable_Study_Identity primary key (
                    Study_Identity
                ),
                constraint unique_StudyID unique (
                    StudyID
                )
            );-- STRICT;
            create table if not exists StudyField (
                FieldName text not null,
                Label text not null,
                FieldType text not null,
                BigOrder integer not null,
                LilOrder integer not null,
                constraint referenceable_FieldName primary key (
                    FieldName
                )
            );-- STRICT;
            create table if not exists StudyVariable (
                StudyVariable_Identity integer not null,
                FieldName text not null,
                Value text not null,
                constraint StudyVariable_of_StudyField foreign key (
                    FieldName
                ) references StudyField(FieldName),
                constraint referenceable_StudyVariable_Identity primary key (
                    StudyVariable_Identity
                ),
                constraint unique_StudyVariable unique (
                    FieldName,
                    Value
                )
            );-- STRICT;
            create table if not exists StudyVariable_Study (
                StudyVariable_Identity integer not null,
                Study_Identity integer not null,
                constraint held_StudyVariable foreign key (
                    StudyVariable_Identity
                ) references StudyVariable(StudyVariable_Identity),
                constraint holding_Study foreign key (
                    Study_Identity
                ) references Study(Study_Identity),
                constraint unique_StudyVariable_Study primary key (
                    StudyVariable_Identity,
                    Study_Identity
                )
            );-- STRICT;
            create table if not exists Domain (
                Domain_Identity integer not null,
                Code text not null,
                Label text not null,
                IsQualifier integer not null,
                constraint referenceable_Domain_Identity primary key (
                    Domain_Identity
                ),
                constraint unique_Domain_Code unique (
                    Code
                )
            );-- STRICT;
            create table if not exists Variable (
                Variable_Identity integer not null,
                DomainCode text not null,
                Code text not null,
                Label text not null,
                Category text null,
                constraint Variable_in_Domain foreign key (
                    DomainCode
                ) references Domain(Code),
                constraint referenceable_Variable_Identity primary key (
                    Variable_Identity
                ),
                constraint unique_Variable unique (
                    DomainCode,
                    Code
                )
            );-- STRICT;
            create table if not exists Count (
                Count_Identity integer not null,
                Study_Identity integer not null,
                Count integer not null,
                Subjects integer not null,
                constraint Count_of_Study foreign key (
                    Study_Identity
                ) references Study(Study_Identity),
                constraint referenceable_Count_Identity primary key (
                    Count_Identity
                )
            );-- STRICT;
            create table if not exists Count_Variable (
                Count_Identity integer not null,
                Variable_Identity integer not null,
                constraint classified_Count foreign key (
                    Count_Identity
                ) references Count(Count_Identity),
                constraint classifying_Variable foreign key (
                    Variable_Identity
                ) references Variable(Variable_Identity),
                constraint unique_Count_Variable primary key (
                    Count_Identity,
                    Variable_Identity
                )
            );-- STRICT;
            create table if not exists Filter (
                Name text not null,
                Label text not null,
                StudyField text null,
                DomainCode text null,
                Widget text not null,
                WidgetJson text not null,
                constraint Filter_on_StudyField foreign key (
                    StudyField
                ) references StudyField(FieldName),
                constraint Filter_on_Domain foreign key (
                    DomainCode
                ) references Domain(Code),
                constraint referenceable_Filter_Name primary key (
                    Name
                )
            );-- STRICT;
            ",
        )?;
        Ok(Self { connection })
    }

    /// Replaces the stored catalog with the given one in a single transaction.
    pub fn save(&mut self, catalog: &Catalog) -> Result<()> {
        let tx = self.connection.transaction()?;
        tx.execute_batch(
            "
            delete from Filter;
            delete from Count_Variable;
            delete from Count;
            delete from StudyVariable_Study;
            delete from StudyVariable;
            delete from Variable;
            delete from Domain;
            delete from StudyField;
            delete from Study;
            ",
        )?;
        persist_studies(&tx, catalog)?;
        persist_fields(&tx, catalog)?;
        persist_values(&tx, catalog)?;
        persist_domains(&tx, catalog)?;
        persist_counts(&tx, catalog)?;
        persist_filters(&tx, catalog)?;
        tx.commit()?;
        info!(studies = catalog.study_count(), "saved catalog");
        Ok(())
    }

    /// Rebuilds the stored catalog. Row ids are kept as they were, since
    /// checkbox selections refer to them, and filters are validated again.
    pub fn restore(&self, options: CatalogOptions) -> Result<Catalog> {
        let mut catalog = Catalog::new(options);
        self.restore_studies(&mut catalog)?;
        self.restore_fields(&mut catalog)?;
        self.restore_values(&mut catalog)?;
        self.restore_domains(&mut catalog)?;
        self.restore_variables(&mut catalog)?;
        self.restore_counts(&mut catalog)?;
        self.restore_filters(&mut catalog)?;
        info!(
            studies = catalog.study_count(),
            filters = catalog.filters().count(),
            "restored catalog"
        );
        Ok(catalog)
    }

    fn restore_studies(&self, catalog: &mut Catalog) -> Result<()> {
        let mut statement = self.connection.prepare("select Study_Identity, StudyID from Study")?;
        let studies = statement.query_map([], |row| Ok((from_sql_id(row.get(0)?), row.get::<_, String>(1)?)))?;
        for study in studies {
            let (thing, study_id) = study?;
            catalog.keep_study(thing, study_id)?;
        }
        Ok(())
    }
    fn restore_fields(&self, catalog: &mut Catalog) -> Result<()> {
        let mut statement = self
            .connection
            .prepare("select FieldName, Label, FieldType, BigOrder, LilOrder from StudyField")?;
        let fields = statement.query_map([], |row| {
            Ok(StudyField::new(row.get::<_, String>(0)?)
                .with_label(row.get::<_, String>(1)?)
                .with_type(row.get::<_, FieldType>(2)?)
                .with_orders(row.get(3)?, row.get(4)?))
        })?;
        for field in fields {
            catalog.add_field(field?)?;
        }
        Ok(())
    }
    fn restore_values(&self, catalog: &mut Catalog) -> Result<()> {
        let mut holders: HashMap<Thing, RoaringTreemap, ThingHasher> = HashMap::default();
        let mut statement = self
            .connection
            .prepare("select StudyVariable_Identity, Study_Identity from StudyVariable_Study")?;
        let links = statement.query_map([], |row| Ok((from_sql_id(row.get(0)?), from_sql_id(row.get(1)?))))?;
        for link in links {
            let (value, study) = link?;
            holders.entry(value).or_default().insert(study);
        }
        let mut statement = self
            .connection
            .prepare("select StudyVariable_Identity, FieldName, Value from StudyVariable")?;
        let values = statement.query_map([], |row| {
            Ok((from_sql_id(row.get(0)?), row.get::<_, String>(1)?, row.get::<_, String>(2)?))
        })?;
        for value in values {
            let (thing, field_name, literal) = value?;
            let studies = holders.remove(&thing).unwrap_or_default();
            catalog.keep_value(StudyVariable::new(thing, field_name, literal, studies))?;
        }
        Ok(())
    }
    fn restore_domains(&self, catalog: &mut Catalog) -> Result<()> {
        let mut statement = self
            .connection
            .prepare("select Domain_Identity, Code, Label, IsQualifier from Domain")?;
        let domains = statement.query_map([], |row| {
            Ok(Domain::new(from_sql_id(row.get(0)?), row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
        for domain in domains {
            catalog.keep_domain(domain?)?;
        }
        Ok(())
    }
    fn restore_variables(&self, catalog: &mut Catalog) -> Result<()> {
        let mut statement = self
            .connection
            .prepare("select Variable_Identity, DomainCode, Code, Label, Category from Variable")?;
        let variables = statement.query_map([], |row| {
            Ok(Variable::new(from_sql_id(row.get(0)?), row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
        })?;
        for variable in variables {
            catalog.keep_variable(variable?)?;
        }
        Ok(())
    }
    fn restore_counts(&self, catalog: &mut Catalog) -> Result<()> {
        let mut codes: HashMap<Thing, Vec<Thing>, ThingHasher> = HashMap::default();
        let mut statement = self
            .connection
            .prepare("select Count_Identity, Variable_Identity from Count_Variable")?;
        let links = statement.query_map([], |row| Ok((from_sql_id(row.get(0)?), from_sql_id(row.get(1)?))))?;
        for link in links {
            let (count, variable) = link?;
            codes.entry(count).or_default().push(variable);
        }
        let mut statement = self
            .connection
            .prepare("select Count_Identity, Study_Identity, Count, Subjects from Count")?;
        let counts = statement.query_map([], |row| {
            Ok((from_sql_id(row.get(0)?), from_sql_id(row.get(1)?), row.get::<_, i64>(2)?, row.get::<_, i64>(3)?))
        })?;
        for count in counts {
            let (thing, study, count, subjects) = count?;
            let codes = codes.remove(&thing).unwrap_or_default();
            catalog.keep_count(Count::new(thing, study, count, subjects, codes))?;
        }
        Ok(())
    }
    fn restore_filters(&self, catalog: &mut Catalog) -> Result<()> {
        let mut statement = self
            .connection
            .prepare("select Label, StudyField, DomainCode, Widget, WidgetJson from Filter order by Name")?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Widget>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        for row in rows {
            let (label, study_field, domain, widget, widget_json) = row?;
            let widget_json = serde_json::from_str(&widget_json)
                .map_err(|e| CatalogError::Persistence(format!("Stored widget JSON is unreadable: {e}")))?;
            let filter = catalog.add_filter(FilterDefinition {
                label: Some(label),
                study_field,
                domain,
                widget,
                widget_json,
            })?;
            debug!(filter = filter.name(), "restored filter");
        }
        Ok(())
    }
}

fn persist_studies(tx: &Transaction, catalog: &Catalog) -> Result<()> {
    let mut add_study = tx.prepare("insert into Study (Study_Identity, StudyID) values (?, ?)")?;
    for (thing, study_id) in catalog.studies() {
        add_study.execute(params![to_sql_id(thing), study_id])?;
    }
    Ok(())
}

fn persist_fields(tx: &Transaction, catalog: &Catalog) -> Result<()> {
    let mut add_field = tx.prepare(
        "
        insert into StudyField (
            FieldName,
            Label,
            FieldType,
            BigOrder,
            LilOrder
        ) values (?, ?, ?, ?, ?)
        ",
    )?;
    for field in catalog.fields() {
        add_field.execute(params![
            field.field_name(),
            field.label(),
            field.field_type(),
            field.big_order(),
            field.lil_order()
        ])?;
    }
    Ok(())
}

fn persist_values(tx: &Transaction, catalog: &Catalog) -> Result<()> {
    let mut add_value =
        tx.prepare("insert into StudyVariable (StudyVariable_Identity, FieldName, Value) values (?, ?, ?)")?;
    let mut add_link =
        tx.prepare("insert into StudyVariable_Study (StudyVariable_Identity, Study_Identity) values (?, ?)")?;
    for value in catalog.values() {
        add_value.execute(params![to_sql_id(value.id()), value.field_name(), value.value()])?;
        for study in value.studies() {
            add_link.execute(params![to_sql_id(value.id()), to_sql_id(study)])?;
        }
    }
    Ok(())
}

fn persist_domains(tx: &Transaction, catalog: &Catalog) -> Result<()> {
    let mut add_domain =
        tx.prepare("insert into Domain (Domain_Identity, Code, Label, IsQualifier) values (?, ?, ?, ?)")?;
    let mut add_variable = tx.prepare(
        "
        insert into Variable (
            Variable_Identity,
            DomainCode,
            Code,
            Label,
            Category
        ) values (?, ?, ?, ?, ?)
        ",
    )?;
    for domain in catalog.domains() {
        add_domain.execute(params![
            to_sql_id(domain.id()),
            domain.code(),
            domain.label(),
            domain.is_qualifier()
        ])?;
    }
    for variable in catalog.variables() {
        add_variable.execute(params![
            to_sql_id(variable.id()),
            variable.domain(),
            variable.code(),
            variable.label(),
            variable.category()
        ])?;
    }
    Ok(())
}

fn persist_counts(tx: &Transaction, catalog: &Catalog) -> Result<()> {
    let mut add_count =
        tx.prepare("insert into Count (Count_Identity, Study_Identity, Count, Subjects) values (?, ?, ?, ?)")?;
    let mut add_link = tx.prepare("insert into Count_Variable (Count_Identity, Variable_Identity) values (?, ?)")?;
    for count in catalog.counts() {
        add_count.execute(params![
            to_sql_id(count.id()),
            to_sql_id(count.study()),
            count.count(),
            count.subjects()
        ])?;
        for code in count.codes() {
            add_link.execute(params![to_sql_id(count.id()), to_sql_id(*code)])?;
        }
    }
    Ok(())
}

fn persist_filters(tx: &Transaction, catalog: &Catalog) -> Result<()> {
    let mut add_filter = tx.prepare(
        "
        insert into Filter (
            Name,
            Label,
            StudyField,
            DomainCode,
            Widget,
            WidgetJson
        ) values (?, ?, ?, ?, ?, ?)
        ",
    )?;
    for filter in catalog.filters() {
        let definition = filter.definition();
        let widget_json = serde_json::to_string(filter.widget_json())
            .map_err(|e| CatalogError::Persistence(format!("Could not store widget JSON: {e}")))?;
        add_filter.execute(params![
            filter.name(),
            filter.label(),
            definition.study_field,
            definition.domain,
            filter.widget(),
            widget_json
        ])?;
    }
    Ok(())
}
