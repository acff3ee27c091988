use atvm_derive::Error;

/// Errors raised while executing opcodes or function codes.
///
/// Every kind is recoverable: when an on-error address is installed the
/// round driver redirects there instead of finishing the machine.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Unknown opcode byte or function code, or a function invoked with the
    /// wrong parameter/return shape.
    #[error("illegal operation: {0}")]
    IllegalOperation(String),
    /// Ran out of code bytes while fetching an opcode or its operands.
    #[error("code segment: {0}")]
    CodeSegment(&'static str),
    /// Code or data address outside its segment, including computed
    /// indirect indices.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Call-stack or user-stack overflow/underflow.
    #[error("stack bounds: {0}")]
    StackBounds(&'static str),
    /// Divisor of zero in DIV_DAT or MOD_DAT.
    #[error("division by zero")]
    DivisionByZero,
    /// Catch-all raised by function codes, e.g. a hash length overflowing
    /// the data segment.
    #[error("execution failed: {0}")]
    Execution(String),
}

/// Errors raised while constructing a machine from creation bytes or
/// restoring one from serialized state.
#[derive(Debug, Error)]
pub enum StateError {
    /// Header shorter than the version-dependent fixed length.
    #[error("header bytes length {actual} incorrect, expected {expected}")]
    HeaderLength { actual: usize, expected: usize },
    /// Version absent from the supported set.
    #[error("version {0} unsupported")]
    UnsupportedVersion(u16),
    /// Page count outside its permitted range.
    #[error("number of {0} pages invalid")]
    PageCount(&'static str),
    /// Code or data bytes empty where content is required.
    #[error("empty {0} bytes")]
    EmptySegment(&'static str),
    /// Code or data bytes larger than the allocated pages.
    #[error("number of {0} pages too small to hold {0} bytes")]
    SegmentOverflow(&'static str),
    /// Creation bytes length does not agree with the header page counts.
    #[error("creation bytes length does not match header values")]
    CreationLength,
    /// Serialized state ended before all indicated fields were read.
    #[error("state bytes truncated")]
    Truncated,
    /// Code bytes supplied on restore do not match the header page count.
    #[error("code bytes length does not match header")]
    CodeLength,
    /// Recorded stack length exceeds the allocated stack.
    #[error("{0} stack length corrupt")]
    StackLength(&'static str),
}
