/// How an existing local file is checked before it is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    /// Compare file size only. Cheap, catches truncated files.
    #[default]
    SizeOnly,
    /// Also recompute the digest the index declares.
    Checksum,
}

impl VerifyMode {
    pub fn from_flag(verify: bool) -> Self {
        if verify {
            Self::Checksum
        } else {
            Self::SizeOnly
        }
    }
}

/// Log level selected by the number of `-v` flags.
/// Ordered from quietest to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => Self::Error,
            1 => Self::Warn,
            2 => Self::Info,
            3 => Self::Debug,
            _ => Self::Trace,
        }
    }

    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Error);
        assert_eq!(LogLevel::from_verbosity(2), LogLevel::Info);
        assert_eq!(LogLevel::from_verbosity(3).as_filter(), "debug");
        assert_eq!(LogLevel::from_verbosity(9), LogLevel::Trace);
    }

    #[test]
    fn test_verify_mode_defaults_to_size_only() {
        assert_eq!(VerifyMode::default(), VerifyMode::SizeOnly);
        assert_eq!(VerifyMode::from_flag(true), VerifyMode::Checksum);
    }
}
