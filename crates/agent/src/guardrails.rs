use triage_core::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, error: DomainError },
}

/// Input checks run before any model call is made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputGuardrail {
    pub max_message_chars: usize,
}

impl Default for InputGuardrail {
    fn default() -> Self {
        Self { max_message_chars: 4_000 }
    }
}

impl InputGuardrail {
    pub fn new(max_message_chars: usize) -> Self {
        Self { max_message_chars }
    }

    pub fn evaluate(&self, message: &str) -> GuardrailDecision {
        if message.trim().is_empty() {
            return GuardrailDecision::Deny {
                reason_code: "empty_message",
                error: DomainError::EmptyMessage,
            };
        }

        if message.chars().count() > self.max_message_chars {
            return GuardrailDecision::Deny {
                reason_code: "message_too_long",
                error: DomainError::MessageTooLong { limit: self.max_message_chars },
            };
        }

        GuardrailDecision::Allow
    }

    pub fn check(&self, message: &str) -> Result<(), DomainError> {
        match self.evaluate(message) {
            GuardrailDecision::Allow => Ok(()),
            GuardrailDecision::Deny { error, .. } => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use triage_core::errors::DomainError;

    use super::{GuardrailDecision, InputGuardrail};

    #[test]
    fn ordinary_message_is_allowed() {
        let policy = InputGuardrail::default();
        assert_eq!(policy.evaluate("How do I use the search API?"), GuardrailDecision::Allow);
    }

    #[test]
    fn whitespace_only_message_is_denied() {
        let policy = InputGuardrail::default();
        let decision = policy.evaluate(" \n\t ");

        let reason_code = match decision {
            GuardrailDecision::Deny { reason_code, .. } => reason_code,
            GuardrailDecision::Allow => "",
        };
        assert_eq!(reason_code, "empty_message");
        assert_eq!(policy.check(""), Err(DomainError::EmptyMessage));
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        let policy = InputGuardrail::new(3);
        assert_eq!(policy.check("äöü"), Ok(()));
        assert_eq!(policy.check("abcd"), Err(DomainError::MessageTooLong { limit: 3 }));
    }
}
