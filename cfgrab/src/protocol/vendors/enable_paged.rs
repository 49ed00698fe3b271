//! Enable-mode device that pages long output.
//!
//! Same dialogue as [`enable_shell`](super::enable_shell), but the pager
//! cannot be turned off: the configuration dump arrives one screen at a
//! time, each followed by a `--More--` banner that needs a space to
//! continue.
//!
//! # Prompt Examples
//!
//! ```text
//! r1#show running-config
//! hostname r1
//! ...
//!  --More--                          # send space, banner is erased
//! ...
//! r1#
//! ```

use crate::channel::CaptureTransition;
use crate::credential::CredentialRole;
use crate::protocol::{Action, PatternSpec, Phase, Step, VendorProtocol};

/// The pagination banner, with the padding devices print around it.
pub const MORE_BANNER: &str = r" *--More-- *";

/// Create the paging enable-mode protocol.
pub fn protocol() -> VendorProtocol {
    VendorProtocol::new("enable_paged")
        .with_step(
            Step::new(Phase::Authenticating)
                .expect(PatternSpec::literal("{user}@{host}'s password:"))
                .send_credential(CredentialRole::Login),
        )
        .with_step(
            Step::new(Phase::Authenticating)
                .expect(PatternSpec::prompt("{hostname}>"))
                .reject(PatternSpec::literal("{user}@{host}'s password:"))
                .send_line("enable"),
        )
        .with_step(
            Step::new(Phase::PrivilegeEscalation)
                .expect(PatternSpec::prompt("{hostname}#"))
                .capture(CaptureTransition::Enable)
                .send_line("show running-config"),
        )
        .with_step(
            Step::new(Phase::Capturing)
                .expect(PatternSpec::regex(MORE_BANNER).repeatable(Action::Keys(" ".to_string())))
                .expect(PatternSpec::prompt("{hostname}#"))
                .capture(CaptureTransition::Disable)
                .send_line("exit"),
        )
        .with_step(
            Step::new(Phase::Terminating)
                .expect(PatternSpec::prompt("{hostname}$"))
                .send_line("exit"),
        )
        .with_auth_failure_pattern("Permission denied")
        .with_failure_pattern("% Invalid input")
        .with_failure_pattern("% Unknown command")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Variables;

    #[test]
    fn test_enable_paged_protocol() {
        let protocol = protocol();
        assert_eq!(protocol.name, "enable_paged");
        assert_eq!(protocol.steps.len(), 5);
        assert!(protocol.steps[3].has_repeatable());
        assert!(!protocol.steps[2].has_repeatable());
        protocol.validate().unwrap();
    }

    #[test]
    fn test_more_banner_match() {
        let vars = Variables {
            user: "alice",
            host: "r1",
            hostname: "r1",
        };
        let banner = protocol().steps[3].expect[0].compile(&vars).unwrap();
        assert_eq!(banner.find(b"interface Gi0/1\n --More-- "), Some((16, 26)));
        assert!(!banner.is_match(b"interface Gi0/1\n"));
    }
}
