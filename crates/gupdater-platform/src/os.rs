#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Windows,
    Linux,
    MacOs,
    Other,
}

impl OsFamily {
    #[must_use]
    pub fn current() -> Self {
        Self::from_name(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` style name onto a family.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "windows" => Self::Windows,
            "linux" => Self::Linux,
            "macos" => Self::MacOs,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub fn is_posix_supported(self) -> bool {
        matches!(self, Self::Linux | Self::MacOs)
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::Linux => "Linux",
            Self::MacOs => "macOS",
            Self::Other => "unknown",
        }
    }
}
