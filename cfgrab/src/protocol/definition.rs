//! Vendor protocol definition.

use std::fmt;

use super::step::{Action, Phase, Step};
use super::template::Variables;
use crate::channel::CaptureTransition;
use crate::credential::CredentialRole;
use crate::error::ProtocolError;

/// Line terminator appended to command lines and credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    /// Carriage return, what a terminal sends for Enter.
    #[default]
    Cr,
    Lf,
    CrLf,
}

impl LineEnding {
    /// The terminator bytes.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineEnding::Cr => b"\r",
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
        }
    }
}

/// The scripted dialogue for one device family.
///
/// Built in code with the `with_*` methods and checked with
/// [`VendorProtocol::validate`] before it is registered or run.
#[derive(Clone, PartialEq, Eq)]
pub struct VendorProtocol {
    /// Family name (e.g. "enable_shell", "extended_cli").
    pub name: String,

    /// Steps in execution order.
    pub steps: Vec<Step>,

    /// Terminator for lines and credentials.
    pub line_ending: LineEnding,

    /// Output that means a command was refused. Checked while the capture
    /// window is closed; a hit is a protocol mismatch.
    pub failed_when_contains: Vec<String>,

    /// Output that means a credential was refused. Checked in authenticating
    /// steps and in the step right after a credential is sent.
    pub auth_failed_when_contains: Vec<String>,

    /// Sent best-effort when a session fails with the channel still open.
    pub abort_sequence: Vec<Action>,

    /// Terminal width for the PTY request.
    pub terminal_width: u32,

    /// Terminal height for the PTY request.
    pub terminal_height: u32,
}

impl VendorProtocol {
    /// Create an empty protocol; the abort sequence defaults to `exit`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: vec![],
            line_ending: LineEnding::default(),
            failed_when_contains: vec![],
            auth_failed_when_contains: vec![],
            abort_sequence: vec![Action::Line("exit".to_string())],
            terminal_width: 511,
            terminal_height: 24,
        }
    }

    /// Append a step.
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Set the line terminator.
    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Add a command failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// Add an authentication failure pattern.
    pub fn with_auth_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.auth_failed_when_contains.push(pattern.into());
        self
    }

    /// Replace the abort sequence.
    pub fn with_abort_sequence(mut self, actions: Vec<Action>) -> Self {
        self.abort_sequence = actions;
        self
    }

    /// Set terminal dimensions.
    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Credential roles the protocol sends, in first-use order.
    pub fn required_credentials(&self) -> Vec<CredentialRole> {
        let mut roles = Vec::new();
        for action in self.actions() {
            if let Some(role) = action.credential() {
                if !roles.contains(&role) {
                    roles.push(role);
                }
            }
        }
        roles
    }

    /// Every action in step order, repeat actions before the step's own.
    fn actions(&self) -> impl Iterator<Item = &Action> {
        self.steps.iter().flat_map(|step| {
            step.expect
                .iter()
                .filter_map(|p| p.repeat.as_ref())
                .chain(std::iter::once(&step.action))
        })
    }

    /// Check the structural rules every protocol must follow.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.name.is_empty() {
            return Err(self.invalid("name must not be empty"));
        }
        if self.steps.is_empty() {
            return Err(self.invalid("no steps"));
        }

        let mut previous = Phase::Authenticating;
        let mut capturing = false;
        let mut captures = false;
        let mut sent = Vec::new();
        let sample = Variables::sample();

        for (index, step) in self.steps.iter().enumerate() {
            if step.expect.is_empty() {
                return Err(self.invalid(format!("step {} has no expect patterns", index)));
            }
            if step.phase < previous {
                return Err(self.invalid(format!(
                    "step {} goes back from {} to {}",
                    index, previous, step.phase
                )));
            }
            previous = step.phase;

            if step.phase == Phase::Authenticating && step.capture == CaptureTransition::Enable {
                return Err(self.invalid(format!(
                    "step {} enables capture while authenticating",
                    index
                )));
            }
            if step.expect.iter().all(|p| p.repeat.is_some()) {
                return Err(self.invalid(format!(
                    "step {} has only repeatable patterns and can never complete",
                    index
                )));
            }

            for pattern in &step.expect {
                pattern.compile(&sample)?;
                if let Some(repeat) = &pattern.repeat {
                    if repeat.credential().is_some() {
                        return Err(self.invalid(format!(
                            "step {} repeats a credential on '{}'",
                            index, pattern.text
                        )));
                    }
                    pattern.repeat_action(&sample)?;
                }
            }
            for pattern in &step.reject {
                pattern.compile(&sample)?;
                if pattern.repeat.is_some() {
                    return Err(self.invalid(format!(
                        "step {} has a repeatable reject pattern",
                        index
                    )));
                }
            }

            // Capture transition applies before the action is sent
            match step.capture {
                CaptureTransition::Enable => {
                    capturing = true;
                    captures = true;
                }
                CaptureTransition::Disable => capturing = false,
                CaptureTransition::Unchanged => {}
            }

            if let Some(role) = step.action.credential() {
                if capturing {
                    return Err(self.invalid(format!(
                        "step {} sends the {} credential while capturing",
                        index, role
                    )));
                }
                if sent.contains(&role) {
                    return Err(self.invalid(format!(
                        "step {} sends the {} credential a second time",
                        index, role
                    )));
                }
                sent.push(role);
            }
            step.substituted_action(&sample)?;
        }

        if !captures {
            return Err(self.invalid("no step enables capture"));
        }
        if self.abort_sequence.iter().any(|a| a.credential().is_some()) {
            return Err(self.invalid("abort sequence must not send credentials"));
        }
        Ok(())
    }

    fn invalid(&self, message: impl Into<String>) -> ProtocolError {
        ProtocolError::InvalidDefinition {
            name: self.name.clone(),
            message: message.into(),
        }
    }
}

impl fmt::Debug for VendorProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorProtocol")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .field("line_ending", &self.line_ending)
            .field("failed_when_contains", &self.failed_when_contains)
            .field("auth_failed_when_contains", &self.auth_failed_when_contains)
            .field("abort_sequence", &self.abort_sequence)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PatternSpec;

    fn minimal() -> VendorProtocol {
        VendorProtocol::new("test")
            .with_step(
                Step::new(Phase::Capturing)
                    .expect(PatternSpec::prompt("{hostname}#"))
                    .capture(CaptureTransition::Enable)
                    .send_line("show config"),
            )
            .with_step(
                Step::new(Phase::Terminating)
                    .expect(PatternSpec::prompt("{hostname}#"))
                    .capture(CaptureTransition::Disable)
                    .send_line("exit"),
            )
    }

    fn assert_invalid(protocol: VendorProtocol, needle: &str) {
        match protocol.validate() {
            Err(ProtocolError::InvalidDefinition { message, .. }) => {
                assert!(message.contains(needle), "unexpected message: {}", message)
            }
            other => panic!("expected InvalidDefinition, got {:?}", other),
        }
    }

    #[test]
    fn test_minimal_protocol_is_valid() {
        assert!(minimal().validate().is_ok());
        assert!(minimal().required_credentials().is_empty());
    }

    #[test]
    fn test_required_credentials_in_order() {
        let protocol = VendorProtocol::new("test")
            .with_step(
                Step::new(Phase::Authenticating)
                    .expect(PatternSpec::literal("password:"))
                    .send_credential(CredentialRole::Login),
            )
            .with_step(
                Step::new(Phase::PrivilegeEscalation)
                    .expect(PatternSpec::literal("Password:"))
                    .send_credential(CredentialRole::Privileged),
            );
        assert_eq!(
            protocol.required_credentials(),
            vec![CredentialRole::Login, CredentialRole::Privileged]
        );
    }

    #[test]
    fn test_credential_sent_twice_rejected() {
        let step = Step::new(Phase::Authenticating)
            .expect(PatternSpec::literal("password:"))
            .send_credential(CredentialRole::Login);
        let mut protocol = minimal();
        protocol.steps.insert(0, step.clone());
        protocol.steps.insert(0, step);
        assert_invalid(protocol, "second time");
    }

    #[test]
    fn test_credential_while_capturing_rejected() {
        let mut protocol = minimal();
        protocol.steps.insert(
            1,
            Step::new(Phase::Capturing)
                .expect(PatternSpec::literal("Password:"))
                .send_credential(CredentialRole::Privileged),
        );
        assert_invalid(protocol, "while capturing");
    }

    #[test]
    fn test_phase_regression_rejected() {
        let protocol = minimal().with_step(
            Step::new(Phase::PagerDisable)
                .expect(PatternSpec::literal("$"))
                .send_line("no page"),
        );
        assert_invalid(protocol, "goes back");
    }

    #[test]
    fn test_capture_enable_while_authenticating_rejected() {
        let mut protocol = minimal();
        protocol.steps[0].phase = Phase::Authenticating;
        assert_invalid(protocol, "while authenticating");
    }

    #[test]
    fn test_step_without_expect_rejected() {
        let mut protocol = minimal();
        protocol.steps[1].expect.clear();
        assert_invalid(protocol, "no expect patterns");
    }

    #[test]
    fn test_only_repeatable_patterns_rejected() {
        let mut protocol = minimal();
        protocol.steps[1].expect =
            vec![PatternSpec::literal("--More--").repeatable(Action::Keys(" ".to_string()))];
        assert_invalid(protocol, "never complete");
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let mut protocol = minimal();
        protocol.steps[0].expect = vec![PatternSpec::prompt("{prompt}#")];
        assert!(matches!(
            protocol.validate(),
            Err(ProtocolError::UnknownPlaceholder { .. })
        ));
    }

    #[test]
    fn test_bad_regex_rejected() {
        let mut protocol = minimal();
        protocol.steps[0].reject = vec![PatternSpec::regex("(unclosed")];
        assert!(matches!(
            protocol.validate(),
            Err(ProtocolError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_protocol_without_capture_rejected() {
        let mut protocol = minimal();
        protocol.steps[0].capture = CaptureTransition::Unchanged;
        assert_invalid(protocol, "no step enables capture");
    }

    #[test]
    fn test_line_endings() {
        assert_eq!(LineEnding::default().as_bytes(), b"\r");
        assert_eq!(LineEnding::CrLf.as_bytes(), b"\r\n");
    }
}
