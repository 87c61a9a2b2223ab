//! Quarry Search - Search filters for the directory
//!
//! Provides the filter tree, the filter string parser, three-valued filter
//! evaluation against entries, and a filter-driven search engine.

pub mod engine;
pub mod error;
pub mod evaluator;
pub mod filter;
pub mod parser;
pub mod traits;

pub use engine::FilterSearchEngine;
pub use error::{SearchError, SearchResult};
pub use evaluator::FilterEvaluator;
pub use filter::{
    escape_value, AttributeDescription, ExtensibleAssertion, Filter, FilterTree, FilterType, SubstringAssertion,
    ValueAssertion,
};
pub use parser::FilterParser;
pub use traits::{SearchEngine, SearchRequest, SearchScope};
