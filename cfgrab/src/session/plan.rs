//! A vendor protocol bound to one device and its credentials.

use std::time::Duration;

use log::debug;

use crate::channel::{CaptureTransition, Pattern};
use crate::credential::{CredentialRole, CredentialSet};
use crate::error::{ConfigError, Result};
use crate::protocol::{Action, LineEnding, Phase, Variables, VendorProtocol};
use crate::target::DeviceTarget;

/// A step with its patterns compiled and its templates filled in.
#[derive(Debug)]
pub(crate) struct PlannedStep {
    pub phase: Phase,
    pub expect: Vec<Pattern>,
    /// Parallel to `expect`; `Some` marks a repeatable pattern.
    pub repeats: Vec<Option<Action>>,
    pub reject: Vec<Pattern>,
    pub action: Action,
    pub capture: CaptureTransition,
    pub timeout: Option<Duration>,
}

impl PlannedStep {
    /// Steps the transport makes redundant when it already logged in.
    pub fn is_login_submission(&self) -> bool {
        self.phase == Phase::Authenticating
            && self.action == Action::Credential(CredentialRole::Login)
    }
}

/// Everything a session needs before the first byte is exchanged.
///
/// Construction validates the protocol, checks that every credential it
/// sends is present and substitutes the target's user, host and short
/// hostname into every pattern and payload. Any problem surfaces here, not
/// halfway through a device dialogue.
#[derive(Debug)]
pub struct SessionPlan {
    family: String,
    host: String,
    pub(crate) steps: Vec<PlannedStep>,
    pub(crate) line_ending: LineEnding,
    pub(crate) failures: Vec<Pattern>,
    pub(crate) auth_failures: Vec<Pattern>,
    pub(crate) abort_sequence: Vec<Action>,
    pub(crate) credentials: CredentialSet,
}

impl SessionPlan {
    /// Bind `protocol` to `target` and `credentials`.
    pub fn new(
        target: &DeviceTarget,
        credentials: CredentialSet,
        protocol: &VendorProtocol,
    ) -> Result<Self> {
        protocol.validate()?;

        for role in protocol.required_credentials() {
            if !credentials.contains(role) {
                return Err(ConfigError::MissingCredential {
                    family: protocol.name.clone(),
                    role,
                }
                .into());
            }
        }

        let vars = Variables::from_target(target);
        let mut steps = Vec::with_capacity(protocol.steps.len());
        for step in &protocol.steps {
            let mut expect = Vec::with_capacity(step.expect.len());
            let mut repeats = Vec::with_capacity(step.expect.len());
            for spec in &step.expect {
                expect.push(spec.compile(&vars)?);
                repeats.push(spec.repeat_action(&vars)?);
            }
            let reject = step
                .reject
                .iter()
                .map(|spec| spec.compile(&vars))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            steps.push(PlannedStep {
                phase: step.phase,
                expect,
                repeats,
                reject,
                action: step.substituted_action(&vars)?,
                capture: step.capture,
                timeout: step.timeout,
            });
        }

        debug!(
            "Planned {} steps of '{}' for {}",
            steps.len(),
            protocol.name,
            target.host()
        );

        Ok(Self {
            family: protocol.name.clone(),
            host: target.host().to_string(),
            steps,
            line_ending: protocol.line_ending,
            failures: literals(&protocol.failed_when_contains),
            auth_failures: literals(&protocol.auth_failed_when_contains),
            abort_sequence: protocol.abort_sequence.clone(),
            credentials,
        })
    }

    /// Device family this plan was built from.
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Host the plan targets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Credentials the plan sends, also used for SSH-layer authentication.
    pub fn credentials(&self) -> &CredentialSet {
        &self.credentials
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Labels of the patterns a step waits for.
    pub fn expected(&self, step: usize) -> Vec<String> {
        self.steps
            .get(step)
            .map(|s| s.expect.iter().map(|p| p.label().to_string()).collect())
            .unwrap_or_default()
    }
}

fn literals(patterns: &[String]) -> Vec<Pattern> {
    patterns.iter().map(Pattern::literal).collect()
}
