//! Error types for Quarry Core

use thiserror::Error;

/// Result type alias using Quarry's Error
pub type Result<T> = std::result::Result<T, Error>;

/// LDAP result codes that core errors translate to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    ProtocolError,
    NoSuchAttribute,
    ConstraintViolation,
    AttributeOrValueExists,
    InvalidAttributeSyntax,
    InvalidDnSyntax,
    UnwillingToPerform,
    ObjectClassViolation,
    Other,
}

impl ResultCode {
    /// Numeric value as carried in an LDAPResult
    pub fn code(self) -> u32 {
        match self {
            Self::ProtocolError => 2,
            Self::NoSuchAttribute => 16,
            Self::ConstraintViolation => 19,
            Self::AttributeOrValueExists => 20,
            Self::InvalidAttributeSyntax => 21,
            Self::InvalidDnSyntax => 34,
            Self::UnwillingToPerform => 53,
            Self::ObjectClassViolation => 65,
            Self::Other => 80,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ProtocolError => "protocolError",
            Self::NoSuchAttribute => "noSuchAttribute",
            Self::ConstraintViolation => "constraintViolation",
            Self::AttributeOrValueExists => "attributeOrValueExists",
            Self::InvalidAttributeSyntax => "invalidAttributeSyntax",
            Self::InvalidDnSyntax => "invalidDNSyntax",
            Self::UnwillingToPerform => "unwillingToPerform",
            Self::ObjectClassViolation => "objectClassViolation",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// Quarry error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Attribute or value exists: {0}")]
    AttributeOrValueExists(String),

    #[error("No such attribute: {0}")]
    NoSuchAttribute(String),

    #[error("Object class violation: {0}")]
    ObjectClassViolation(String),

    #[error("Invalid attribute syntax: {0}")]
    InvalidAttributeSyntax(String),

    #[error("Invalid DN '{dn}': {reason}")]
    InvalidDn { dn: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unwilling to perform: {0}")]
    UnwillingToPerform(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Schema error: {0}")]
    Schema(String),
}

impl Error {
    /// Map this error onto the LDAP result code a protocol layer would send
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::ConstraintViolation(_) => ResultCode::ConstraintViolation,
            Self::AttributeOrValueExists(_) => ResultCode::AttributeOrValueExists,
            Self::NoSuchAttribute(_) => ResultCode::NoSuchAttribute,
            Self::ObjectClassViolation(_) => ResultCode::ObjectClassViolation,
            Self::InvalidAttributeSyntax(_) => ResultCode::InvalidAttributeSyntax,
            Self::InvalidDn { .. } => ResultCode::InvalidDnSyntax,
            Self::Protocol(_) => ResultCode::ProtocolError,
            Self::UnwillingToPerform(_) => ResultCode::UnwillingToPerform,
            Self::Decode(_) | Self::Schema(_) => ResultCode::Other,
        }
    }

    pub(crate) fn invalid_dn(dn: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDn {
            dn: dn.to_string(),
            reason: reason.into(),
        }
    }
}
