//! Process exit codes of `bp`
//!
//! Scripts branch on these numbers, so an existing code is never reused for
//! a different outcome. 7 is unassigned.

use bp_core::Error;

/// How a `bp` invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Bad arguments, remote paths, keys or configuration
    UsageError = 2,
    /// The endpoint could not be reached; retrying may help
    NetworkError = 3,
    AuthError = 4,
    /// Missing bucket, object, profile or persistence state
    NotFound = 5,
    Conflict = 6,
    /// Unreadable archive or manifest
    ArchiveError = 8,
    /// The batch ran to the end but some objects failed
    PartialFailure = 9,
    /// Ctrl+C
    Interrupted = 130,
}

impl ExitCode {
    const ALL: [ExitCode; 10] = [
        Self::Success,
        Self::GeneralError,
        Self::UsageError,
        Self::NetworkError,
        Self::AuthError,
        Self::NotFound,
        Self::Conflict,
        Self::ArchiveError,
        Self::PartialFailure,
        Self::Interrupted,
    ];

    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// The code with numeric value `code`, if one is assigned
    pub fn from_i32(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_i32() == code)
    }

    /// Exit code for an error that aborted a command
    pub fn from_error(error: &Error) -> Self {
        Self::from_i32(error.exit_code()).unwrap_or(Self::GeneralError)
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "completed successfully",
            Self::GeneralError => "failed",
            Self::UsageError => "invalid usage or configuration",
            Self::NetworkError => "storage endpoint unreachable",
            Self::AuthError => "access denied",
            Self::NotFound => "not found",
            Self::Conflict => "conflicts with existing state",
            Self::ArchiveError => "invalid archive",
            Self::PartialFailure => "completed with failed objects",
            Self::Interrupted => "interrupted",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (exit {})", self.description(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assigned_codes() {
        let codes: Vec<i32> = ExitCode::ALL.iter().map(|c| c.as_i32()).collect();
        assert_eq!(codes, [0, 1, 2, 3, 4, 5, 6, 8, 9, 130]);
        for code in ExitCode::ALL {
            assert_eq!(ExitCode::from_i32(code.as_i32()), Some(code));
            assert_eq!(i32::from(code), code.as_i32());
        }
    }

    #[test]
    fn test_unassigned_codes() {
        for value in [-1, 7, 10, 99, 255] {
            assert_eq!(ExitCode::from_i32(value), None);
        }
    }

    #[test]
    fn test_exit_code_from_error() {
        let cases = [
            (Error::StoreUnavailable("down".into()), ExitCode::NetworkError),
            (Error::ArchiveFormat("bad".into()), ExitCode::ArchiveError),
            (Error::ProfileNotFound("x".into()), ExitCode::NotFound),
            (Error::InvalidPath("x".into()), ExitCode::UsageError),
            (Error::General("x".into()), ExitCode::GeneralError),
        ];
        for (error, expected) in cases {
            assert_eq!(ExitCode::from_error(&error), expected, "{error}");
        }
    }

    #[test]
    fn test_display_includes_number() {
        assert_eq!(
            ExitCode::PartialFailure.to_string(),
            "completed with failed objects (exit 9)"
        );
        assert_eq!(ExitCode::NotFound.to_string(), "not found (exit 5)");
    }
}
