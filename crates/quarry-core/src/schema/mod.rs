//! Directory schema: the read interface every component consumes, the
//! element definitions, matching rules and an in-memory registry.

pub mod matching;
pub mod registry;
pub mod standard;
pub mod types;

pub use matching::{MatchingRule, MatchingRuleKind, MatchingRuleRef, StandardMatchingRule};
pub use registry::{Schema, SchemaRegistry};
pub use standard::names;
pub use types::{
    AttributeType, AttributeUsage, DitContentRule, DitStructureRule, MatchingRuleUse, NameForm, ObjectClass,
    ObjectClassKind, OBJECT_CLASS_OID,
};
