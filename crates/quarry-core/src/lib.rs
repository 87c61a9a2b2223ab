//! Quarry Core - Directory entry model
//!
//! This crate provides entries and their attribute store, the schema and
//! its matching rules, schema validation of entries, and virtual and
//! collective attribute resolution (scoped by subtree specifications) for
//! the Quarry directory server.

pub mod attribute;
pub mod condition;
pub mod dn;
pub mod entry;
pub mod error;
pub mod limits;
pub mod modification;
pub mod record;
pub mod schema;
pub mod subtree;
pub mod validator;
pub mod virtual_attrs;

pub use attribute::{parse_attribute_description, Attribute};
pub use condition::ConditionResult;
pub use dn::{Ava, Dn, Rdn};
pub use entry::{Attachment, AttributeMap, Entry};
pub use error::{Error, Result, ResultCode};
pub use modification::{Modification, ModificationType};
pub use record::EntryRecord;
pub use schema::{
    AttributeType, AttributeUsage, DitContentRule, DitStructureRule, MatchingRule, MatchingRuleKind, MatchingRuleRef,
    MatchingRuleUse, NameForm, ObjectClass, ObjectClassKind, Schema, SchemaRegistry,
};
pub use subtree::{Refinement, SubtreeSpecification};
pub use validator::{AcceptRejectWarn, SchemaValidator, ValidationPolicy};
pub use virtual_attrs::{
    ConflictBehavior, ConstantValueProvider, EntryDnProvider, EntryLookup, InheritFrom, SubEntry, SubentrySource,
    VirtualAttributeProvider, VirtualAttributeResolver, VirtualAttributeRule,
};
