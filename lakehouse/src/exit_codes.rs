//! Process exit codes of `lakehouse-cli`.
//!
//! A scheduler can route alerts on these without parsing log output.

/// Outcome of one pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// All stages completed
    Success = 0,

    /// Bad configuration or command line
    ConfigError = 1,

    /// Upstream API could not be read
    FetchFailed = 2,

    /// Bronze partition could not be written
    BronzeFailed = 3,

    /// Silver transform failed
    SilverFailed = 4,

    /// Gold aggregation failed
    GoldFailed = 5,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Success)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}
