//! Resource limits shared by the parser, evaluator and codec

/// Maximum nesting of AND/OR/NOT components evaluated for one filter (100)
pub const MAX_NESTED_FILTER_DEPTH: usize = 100;

/// Maximum length of a filter string accepted by the parser (64KB)
pub const MAX_FILTER_STRING_LEN: usize = 64 * 1024;

/// Largest value a BER length field can carry (four length octets)
pub const MAX_BER_LENGTH: usize = u32::MAX as usize;

/// Maximum number of RDN components in a DN (256)
pub const MAX_DN_COMPONENTS: usize = 256;

/// Limit violation
#[derive(Debug, Clone, PartialEq)]
pub enum LimitError {
    FilterTooDeep { depth: usize, max: usize },
    FilterTooLong { len: usize, max: usize },
    LengthTooLarge { len: usize, max: usize },
    TooManyDnComponents { count: usize, max: usize },
}

impl std::fmt::Display for LimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FilterTooDeep { depth, max } => {
                write!(f, "Filter nesting too deep: {} levels (max {})", depth, max)
            }
            Self::FilterTooLong { len, max } => {
                write!(f, "Filter string too long: {} bytes (max {})", len, max)
            }
            Self::LengthTooLarge { len, max } => {
                write!(f, "Length too large to encode: {} (max {})", len, max)
            }
            Self::TooManyDnComponents { count, max } => {
                write!(f, "Too many DN components: {} (max {})", count, max)
            }
        }
    }
}

impl std::error::Error for LimitError {}

/// Validate filter nesting depth
pub fn validate_filter_depth(depth: usize) -> Result<(), LimitError> {
    if depth >= MAX_NESTED_FILTER_DEPTH {
        return Err(LimitError::FilterTooDeep {
            depth,
            max: MAX_NESTED_FILTER_DEPTH,
        });
    }
    Ok(())
}

/// Validate filter string length
pub fn validate_filter_length(len: usize) -> Result<(), LimitError> {
    if len > MAX_FILTER_STRING_LEN {
        return Err(LimitError::FilterTooLong {
            len,
            max: MAX_FILTER_STRING_LEN,
        });
    }
    Ok(())
}

/// Validate a length before writing it as a BER length
pub fn validate_ber_length(len: usize) -> Result<(), LimitError> {
    if len > MAX_BER_LENGTH {
        return Err(LimitError::LengthTooLarge {
            len,
            max: MAX_BER_LENGTH,
        });
    }
    Ok(())
}

/// Validate DN component count
pub fn validate_dn_components(count: usize) -> Result<(), LimitError> {
    if count > MAX_DN_COMPONENTS {
        return Err(LimitError::TooManyDnComponents {
            count,
            max: MAX_DN_COMPONENTS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_filter_depth() {
        assert!(validate_filter_depth(0).is_ok());
        assert!(validate_filter_depth(MAX_NESTED_FILTER_DEPTH - 1).is_ok());
        assert!(validate_filter_depth(MAX_NESTED_FILTER_DEPTH).is_err());
    }

    #[test]
    fn test_validate_filter_length() {
        assert!(validate_filter_length(10).is_ok());
        assert!(validate_filter_length(MAX_FILTER_STRING_LEN + 1).is_err());
    }

    #[test]
    fn test_limit_error_display() {
        let err = validate_filter_depth(150).unwrap_err();
        assert_eq!(err.to_string(), "Filter nesting too deep: 150 levels (max 100)");
    }
}
