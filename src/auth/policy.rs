//! Password policy applied on every path that sets a password.

use serde::Serialize;
use utoipa::ToSchema;

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    MinLength,
    Uppercase,
    Lowercase,
    Digit,
    Symbol,
}

impl PolicyRule {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::MinLength => "Password must be at least 8 characters long",
            Self::Uppercase => "Password must contain at least one uppercase letter",
            Self::Lowercase => "Password must contain at least one lowercase letter",
            Self::Digit => "Password must contain at least one number",
            Self::Symbol => "Password must contain at least one special character",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("password does not meet the policy: {}", self.messages().join("; "))]
pub struct PolicyViolation(pub Vec<PolicyRule>);

impl PolicyViolation {
    #[must_use]
    pub fn rules(&self) -> &[PolicyRule] {
        &self.0
    }

    #[must_use]
    pub fn messages(&self) -> Vec<&'static str> {
        self.0.iter().map(|rule| rule.message()).collect()
    }
}

/// Every rule the password fails, in a fixed order. Empty means acceptable.
#[must_use]
pub fn violations(password: &str) -> Vec<PolicyRule> {
    let mut failed = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        failed.push(PolicyRule::MinLength);
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        failed.push(PolicyRule::Uppercase);
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        failed.push(PolicyRule::Lowercase);
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        failed.push(PolicyRule::Digit);
    }
    if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        failed.push(PolicyRule::Symbol);
    }
    failed
}

/// # Errors
/// Returns every failed rule when the password is not acceptable.
pub fn check_password(password: &str) -> Result<(), PolicyViolation> {
    let failed = violations(password);
    if failed.is_empty() {
        Ok(())
    } else {
        Err(PolicyViolation(failed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_digits_only_misses_upper_and_symbol() {
        assert_eq!(
            violations("abc12345"),
            vec![PolicyRule::Uppercase, PolicyRule::Symbol]
        );
    }

    #[test]
    fn compliant_password_passes() {
        assert!(check_password("Abc123!@").is_ok());
        assert!(check_password("Correct-Horse-9").is_ok());
    }

    #[test]
    fn empty_password_fails_every_rule() {
        let err = check_password("").err();
        assert_eq!(
            err.map(|e| e.0),
            Some(vec![
                PolicyRule::MinLength,
                PolicyRule::Uppercase,
                PolicyRule::Lowercase,
                PolicyRule::Digit,
                PolicyRule::Symbol,
            ])
        );
    }

    #[test]
    fn short_password_reports_length() {
        assert_eq!(violations("Ab1!"), vec![PolicyRule::MinLength]);
    }

    #[test]
    fn whitespace_counts_as_special_character() {
        assert!(check_password("Abcdef 1").is_ok());
    }

    #[test]
    fn violation_messages_are_human_readable() {
        let err = PolicyViolation(vec![PolicyRule::Digit]);
        assert_eq!(err.messages(), vec!["Password must contain at least one number"]);
        assert!(err.to_string().contains("at least one number"));
    }
}
