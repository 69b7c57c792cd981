use thiserror::Error;

use crate::domain::category::Category;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("message is required")]
    EmptyMessage,
    #[error("message exceeds {limit} characters")]
    MessageTooLong { limit: usize },
    #[error("unknown category `{0}`")]
    UnknownCategory(String),
    #[error("classification already set to {existing}, refusing {attempted}")]
    ClassificationAlreadySet { existing: Category, attempted: Category },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("classification failed: {0}")]
    Classification(String),
    #[error("routing failed: {0}")]
    Routing(String),
    #[error("{category} agent exceeded {limit} tool rounds without a final answer")]
    ToolRoundsExhausted { category: Category, limit: u32 },
    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },
    #[error("agent failure: {0}")]
    Agent(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("gateway timeout: {message}")]
    GatewayTimeout { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    /// Text that is safe to hand to an external caller.
    pub fn user_message(&self) -> String {
        match self {
            Self::BadRequest { message, .. } => capitalize(message),
            Self::GatewayTimeout { .. } => {
                "The request timed out before the agent produced an answer.".to_owned()
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly.".to_owned()
            }
            Self::Internal { .. } => "An unexpected internal error occurred.".to_owned(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Internal { .. } => 500,
            Self::ServiceUnavailable { .. } => 503,
            Self::GatewayTimeout { .. } => 504,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::GatewayTimeout { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::GatewayTimeout { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }

    /// Stable label used in structured logs and CLI output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(_) => "validation",
            Self::Classification(_) => "classification",
            Self::Routing(_) => "routing",
            Self::ToolRoundsExhausted { .. } => "tool_rounds_exhausted",
            Self::Timeout { .. } => "timeout",
            Self::Agent(_) => "agent",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned }
            }
            ApplicationError::Timeout { .. } => {
                Self::GatewayTimeout { message: value.to_string(), correlation_id: unassigned }
            }
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned }
            }
            ApplicationError::Classification(_)
            | ApplicationError::Routing(_)
            | ApplicationError::ToolRoundsExhausted { .. }
            | ApplicationError::Agent(_)
            | ApplicationError::Configuration(_) => {
                Self::Internal { message: value.to_string(), correlation_id: unassigned }
            }
        }
    }
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::category::Category;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn empty_message_maps_to_bad_request_with_caller_safe_text() {
        let interface = ApplicationError::from(DomainError::EmptyMessage).into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(interface.status_code(), 400);
        assert_eq!(interface.user_message(), "Message is required");
    }

    #[test]
    fn classification_failure_maps_to_internal_without_leaking_detail() {
        let interface =
            ApplicationError::Classification("connection refused to 10.0.0.7:443".to_owned())
                .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.status_code(), 500);
        assert!(!interface.user_message().contains("10.0.0.7"));
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let interface =
            ApplicationError::Timeout { stage: "request", secs: 30 }.into_interface("req-3");

        assert!(matches!(interface, InterfaceError::GatewayTimeout { .. }));
        assert_eq!(interface.status_code(), 504);
        assert_eq!(interface.correlation_id(), "req-3");
    }

    #[test]
    fn terminal_agent_errors_map_to_internal() {
        for error in [
            ApplicationError::Routing("no classification recorded".to_owned()),
            ApplicationError::ToolRoundsExhausted { category: Category::Bug, limit: 6 },
            ApplicationError::Configuration("missing api key".to_owned()),
        ] {
            assert_eq!(error.into_interface("req-4").status_code(), 500);
        }
    }

    #[test]
    fn integration_failure_maps_to_service_unavailable() {
        let interface =
            ApplicationError::Integration("slack api down".to_owned()).into_interface("req-5");
        assert_eq!(interface.status_code(), 503);
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }
}
