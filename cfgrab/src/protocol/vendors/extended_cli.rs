//! Two-credential device with an extended command mode.
//!
//! The full command set is unlocked with `_cmdline-mode on`, which asks for
//! confirmation and then for a second password sourced separately from the
//! login password.
//!
//! # Prompt Examples
//!
//! ```text
//! <sw1>                              # user view
//! Continue? [Y/N]:
//! Please input password:
//! ```

use crate::channel::CaptureTransition;
use crate::credential::CredentialRole;
use crate::protocol::{Action, PatternSpec, Phase, Step, VendorProtocol};

/// Create the extended command-mode protocol.
pub fn protocol() -> VendorProtocol {
    VendorProtocol::new("extended_cli")
        .with_step(
            Step::new(Phase::Authenticating)
                .expect(PatternSpec::regex(r"[Pp]assword:"))
                .send_credential(CredentialRole::Login),
        )
        .with_step(
            Step::new(Phase::Authenticating)
                .expect(PatternSpec::prompt("<{hostname}>"))
                .send_line("_cmdline-mode on"),
        )
        .with_step(
            Step::new(Phase::PrivilegeEscalation)
                .expect(PatternSpec::literal("[Y/N]"))
                .send_line("Y"),
        )
        .with_step(
            Step::new(Phase::PrivilegeEscalation)
                .expect(PatternSpec::regex(r"[Pp]assword:"))
                .reject(PatternSpec::prompt("<{hostname}>"))
                .send_credential(CredentialRole::Privileged),
        )
        .with_step(
            Step::new(Phase::PagerDisable)
                .expect(PatternSpec::prompt("<{hostname}>"))
                .send_line("screen-length disable"),
        )
        .with_step(
            Step::new(Phase::PagerDisable)
                .expect(PatternSpec::prompt("<{hostname}>"))
                .capture(CaptureTransition::Enable)
                .send_line("display current-configuration"),
        )
        .with_step(
            Step::new(Phase::Capturing)
                .expect(PatternSpec::prompt("<{hostname}>"))
                .capture(CaptureTransition::Disable)
                .send_line("quit"),
        )
        .with_auth_failure_pattern("Invalid password")
        .with_auth_failure_pattern("Authentication fail")
        .with_failure_pattern("Unrecognized command")
        .with_abort_sequence(vec![Action::Line("quit".to_string())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Variables;

    #[test]
    fn test_extended_cli_protocol() {
        let protocol = protocol();
        assert_eq!(protocol.name, "extended_cli");
        assert_eq!(protocol.steps.len(), 7);
        assert_eq!(
            protocol.required_credentials(),
            vec![CredentialRole::Login, CredentialRole::Privileged]
        );
        protocol.validate().unwrap();
    }

    #[test]
    fn test_bracketed_prompt_match() {
        let vars = Variables {
            user: "ops",
            host: "sw1.example.net",
            hostname: "sw1",
        };
        let prompt = protocol().steps[1].expect[0].compile(&vars).unwrap();
        assert!(prompt.is_match(b"Info: welcome\r\n<sw1>"));
        assert!(!prompt.is_match(b"<sw1>display"));
        assert!(!prompt.is_match(b"[sw1]"));
    }
}
