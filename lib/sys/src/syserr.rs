use core::fmt;

use strum::FromRepr;

/// Result type returned by syscalls
pub type KResult<T> = Result<T, SysErr>;

/// Error codes returned by syscalls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr)]
#[repr(usize)]
pub enum SysErr {
    TimedOut = 1,
    Cancelled = 2,
    InvalidHandle = 3,
    InvalidState = 4,
    InvalidAddress = 5,
    InvalidCurrentMemory = 6,
    InvalidSize = 7,
    InvalidCombination = 8,
    InvalidEnumValue = 9,
    OutOfRange = 10,
    OutOfHandles = 11,
    OutOfResource = 12,
    SessionClosed = 13,
    NotFound = 14,
    Unknown = 15,
}

impl SysErr {
    /// Creates a SysErr from the given number, returns none if `n` is an invalid syserr code
    pub fn new(n: usize) -> Option<Self> {
        Self::from_repr(n)
    }

    pub const fn num(&self) -> usize {
        *self as usize
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TimedOut => "operation timed out",
            Self::Cancelled => "wait was cancelled",
            Self::InvalidHandle => "invalid handle",
            Self::InvalidState => "object was in an invalid state for the operation",
            Self::InvalidAddress => "invalid address",
            Self::InvalidCurrentMemory => "memory is not in the state required by the operation",
            Self::InvalidSize => "invalid size",
            Self::InvalidCombination => "invalid combination of arguments",
            Self::InvalidEnumValue => "invalid enum value",
            Self::OutOfRange => "argument out of range",
            Self::OutOfHandles => "out of handles",
            Self::OutOfResource => "out of kernel resources",
            Self::SessionClosed => "peer closed the session",
            Self::NotFound => "not found",
            Self::Unknown => "unknown error",
        }
    }
}

impl fmt::Display for SysErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_round_trip() {
        assert_eq!(SysErr::new(SysErr::Cancelled.num()), Some(SysErr::Cancelled));
        assert_eq!(SysErr::new(0), None);
        assert_eq!(SysErr::new(1000), None);
        assert_eq!(SysErr::TimedOut.to_string(), "operation timed out");
    }
}
