//! Simple enable-mode device.
//!
//! Logs in at an OpenSSH-style password prompt, enters privileged mode with
//! `enable` and dumps the running configuration.
//!
//! # Prompt Examples
//!
//! ```text
//! alice@r1's password:
//! r1>                                # user mode
//! r1#                                # privileged mode
//! r1$                                # after leaving privileged mode
//! ```

use crate::channel::CaptureTransition;
use crate::credential::CredentialRole;
use crate::protocol::{PatternSpec, Phase, Step, VendorProtocol};

/// Create the enable-mode protocol.
pub fn protocol() -> VendorProtocol {
    VendorProtocol::new("enable_shell")
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
