use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Operation not supported by this host: {operation}")]
    Unsupported { operation: &'static str },

    #[error("Managed component unavailable: {details}")]
    ComponentUnavailable { details: String },

    #[error("Host rejected {operation}: {details}")]
    Rejected {
        operation: &'static str,
        details: String,
    },

    #[error("Host main thread is no longer accepting tasks")]
    MainThreadClosed,

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl HostError {
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn rejected(operation: &'static str, details: impl Into<String>) -> Self {
        Self::Rejected {
            operation,
            details: details.into(),
        }
    }

    pub fn component_unavailable(details: impl Into<String>) -> Self {
        Self::ComponentUnavailable {
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HostError;

    #[test]
    fn helpers_fill_in_context() {
        let error = HostError::rejected("restart", "server is not Spigot");
        assert_eq!(
            error.to_string(),
            "Host rejected restart: server is not Spigot"
        );

        let error = HostError::io(
            "failed to read launch arguments",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(
            error
                .to_string()
                .starts_with("failed to read launch arguments: ")
        );
    }
}
