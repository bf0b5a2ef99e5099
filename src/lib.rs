//! Studycat – faceted filtering and count aggregation over research study metadata.
//!
//! A [`construct::Catalog`] holds:
//! * studies, each identified by a textual study id,
//! * study fields ([`construct::StudyField`]), typed columns of per-study metadata,
//!   whose literal values ([`construct::StudyVariable`]) link back to the studies holding them,
//! * classification domains ([`construct::Domain`]) and their variables
//!   ([`construct::Variable`]), where qualifier domains (such as age brackets)
//!   order their codes numerically,
//! * counts ([`construct::Count`]), observation and subject totals of one study
//!   classified by a set of variables drawn from several domains,
//! * filters ([`filter::Filter`]), facets driven by either a study field or a domain.
//!
//! Studies, values and variables are "things" with `u64` row ids, and the studies
//! holding a value or a variable are kept as roaring bitmaps, so that filters
//! are resolved by intersecting bitsets.
//!
//! ## Modules
//! * [`filter`] – the attribute registry: legal values, choices and selection
//!   parsing for checkbox, double slider and discrete slider filters.
//! * [`resolve`] – the population resolver, the AND of every active filter.
//! * [`facet`] – facet counts that exclude the facet's own selection, and the filter panel.
//! * [`frame`] – count aggregation: flatten, summarize by domain, pivot, and
//!   the per-variable and variable by qualifier views.
//! * [`selection`] – the multi-valued query payload and its normalization.
//! * [`persist`] – SQLite storage of a catalog.
//! * [`interface`] – [`interface::Explorer`], request-scoped composition of the above.
//! * [`server`] – a JSON HTTP surface over the explorer.
//!
//! ## Quick Start
//! ```
//! use studycat::construct::{Catalog, StudyField};
//! use studycat::datatype::Widget;
//! use studycat::filter::{FilterDefinition, Registry};
//! use studycat::facet::FacetCounter;
//! use studycat::selection::Selection;
//!
//! let mut catalog = Catalog::default();
//! let a = catalog.add_study("A");
//! let b = catalog.add_study("B");
//! catalog.add_field(StudyField::new("country")).unwrap();
//! catalog.add_value("country", "USA", &[a, b]).unwrap();
//! catalog.add_value("country", "CAN", &[a]).unwrap();
//! catalog.add_filter(FilterDefinition::field("country", Widget::Checkbox)).unwrap();
//!
//! let filter = catalog.filter("country").unwrap();
//! assert_eq!(Registry::new(&catalog).values_for(filter), ["CAN", "USA"]);
//! let counts = FacetCounter::new(&catalog).counts_for(filter, &[], &Selection::new()).unwrap();
//! assert_eq!(counts, [1, 2]);
//! ```

pub mod construct;
pub mod datatype;
pub mod error;
pub mod facet;
pub mod filter;
pub mod frame;
pub mod interface;
pub mod persist;
pub mod resolve;
pub mod selection;
pub mod server;
pub mod settings;
