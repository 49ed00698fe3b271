//! Menu-driven device with a login banner and logout confirmation.
//!
//! After the password the device shows a "press any key" banner. The pager
//! is turned off with `no page` before the dump, and leaving the CLI asks
//! for confirmation.
//!
//! # Prompt Examples
//!
//! ```text
//! Press any key to continue
//! sw1#                               # manager level
//! sw1>                               # operator level, after one exit
//! Do you want to log out [y/n]?
//! ```

use crate::channel::CaptureTransition;
use crate::credential::CredentialRole;
use crate::protocol::{Action, PatternSpec, Phase, Step, VendorProtocol};

/// Create the menu-driven protocol.
pub fn protocol() -> VendorProtocol {
    VendorProtocol::new("menu_shell")
        .with_step(
            Step::new(Phase::Authenticating)
                .expect(PatternSpec::regex(r"[Pp]assword:"))
                .send_credential(CredentialRole::Login),
        )
        .with_step(
            Step::new(Phase::Authenticating)
                .expect(PatternSpec::literal("Press any key to continue"))
                .send_keys(" "),
        )
        .with_step(
            Step::new(Phase::PagerDisable)
                .expect(PatternSpec::prompt("{hostname}#"))
                .send_line("no page"),
        )
        .with_step(
            Step::new(Phase::PagerDisable)
                .expect(PatternSpec::prompt("{hostname}#"))
                .capture(CaptureTransition::Enable)
                .send_line("show running-config"),
        )
        .with_step(
            Step::new(Phase::Capturing)
                .expect(PatternSpec::prompt("{hostname}#"))
                .capture(CaptureTransition::Disable)
                .send_line("exit"),
        )
        .with_step(
            Step::new(Phase::Terminating)
                .expect(PatternSpec::prompt("{hostname}>"))
                .send_line("exit"),
        )
        .with_step(
            Step::new(Phase::Terminating)
                .expect(PatternSpec::literal("Do you want to log out"))
                .send_keys("y"),
        )
        .with_auth_failure_pattern("Invalid password")
        .with_auth_failure_pattern("Access denied")
        .with_failure_pattern("Invalid input")
        .with_abort_sequence(vec![
            Action::Line("exit".to_string()),
            Action::Line("exit".to_string()),
            Action::Keys("y".to_string()),
        ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_shell_protocol() {
        let protocol = protocol();
        assert_eq!(protocol.name, "menu_shell");
        assert_eq!(protocol.steps.len(), 7);
        assert_eq!(protocol.required_credentials(), vec![CredentialRole::Login]);
        assert_eq!(protocol.steps[1].action, Action::Keys(" ".to_string()));
        assert_eq!(protocol.steps[6].action, Action::Keys("y".to_string()));
        protocol.validate().unwrap();
    }

    #[test]
    fn test_abort_sequence_confirms_logout() {
        let protocol = protocol();
        assert_eq!(protocol.abort_sequence.len(), 3);
        assert_eq!(protocol.abort_sequence[2], Action::Keys("y".to_string()));
    }
}
