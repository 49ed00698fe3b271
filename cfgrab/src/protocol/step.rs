//! Steps, pattern templates and actions.

use std::fmt;
use std::time::Duration;

use super::template::{self, Variables};
use crate::channel::{Anchor, CaptureTransition, Pattern};
use crate::credential::CredentialRole;
use crate::error::ProtocolError;

/// The part of the session a step belongs to.
///
/// Phases of consecutive steps never go backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Authenticating,
    PrivilegeEscalation,
    PagerDisable,
    Capturing,
    Terminating,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Authenticating => "authenticating",
            Phase::PrivilegeEscalation => "privilege-escalation",
            Phase::PagerDisable => "pager-disable",
            Phase::Capturing => "capturing",
            Phase::Terminating => "terminating",
        };
        f.write_str(name)
    }
}

/// What to write to the channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Action {
    /// Write nothing.
    #[default]
    None,

    /// A command line, followed by the protocol's line terminator.
    Line(String),

    /// Raw keystrokes, written as-is (e.g. a space for `--More--`).
    Keys(String),

    /// The session's credential for a role, followed by the line terminator.
    Credential(CredentialRole),
}

impl Action {
    /// Credential role this action sends, if any.
    pub fn credential(&self) -> Option<CredentialRole> {
        match self {
            Action::Credential(role) => Some(*role),
            _ => None,
        }
    }

    /// Log-safe description.
    pub fn describe(&self) -> String {
        match self {
            Action::None => "<nothing>".to_string(),
            Action::Line(line) => format!("{:?}", line),
            Action::Keys(keys) => format!("keys {:?}", keys),
            Action::Credential(role) => format!("<{} credential>", role),
        }
    }

    fn substitute(&self, vars: &Variables<'_>) -> Result<Action, ProtocolError> {
        Ok(match self {
            Action::Line(line) => Action::Line(template::substitute(line, vars)?),
            Action::Keys(keys) => Action::Keys(template::substitute(keys, vars)?),
            other => other.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternKind {
    Literal,
    Regex,
}

/// An uncompiled pattern with `{user}`, `{host}` and `{hostname}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSpec {
    /// Template text.
    pub text: String,

    kind: PatternKind,

    /// Anchoring of the compiled pattern.
    pub anchor: Anchor,

    /// When set, a match performs this action and the step keeps waiting.
    pub repeat: Option<Action>,
}

impl PatternSpec {
    /// Literal substring.
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: PatternKind::Literal,
            anchor: Anchor::Anywhere,
            repeat: None,
        }
    }

    /// Literal that must end the output, as a shell prompt does.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self::literal(text).with_anchor(Anchor::End)
    }

    /// Regular expression; substituted values are escaped.
    pub fn regex(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: PatternKind::Regex,
            anchor: Anchor::Anywhere,
            repeat: None,
        }
    }

    /// Set the anchoring.
    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    /// Make the pattern repeatable: on match, perform `action` and keep waiting.
    pub fn repeatable(mut self, action: Action) -> Self {
        self.repeat = Some(action);
        self
    }

    /// Whether this is a regular expression.
    pub fn is_regex(&self) -> bool {
        self.kind == PatternKind::Regex
    }

    /// Substitute variables and compile.
    pub fn compile(&self, vars: &Variables<'_>) -> Result<Pattern, ProtocolError> {
        let pattern = match self.kind {
            PatternKind::Literal => Pattern::literal(template::substitute(&self.text, vars)?),
            PatternKind::Regex => {
                Pattern::regex(&template::substitute_escaped(&self.text, vars)?)?
            }
        };
        Ok(pattern.with_anchor(self.anchor))
    }

    /// Substitute variables in the repeat action.
    pub(crate) fn repeat_action(&self, vars: &Variables<'_>) -> Result<Option<Action>, ProtocolError> {
        self.repeat.as_ref().map(|a| a.substitute(vars)).transpose()
    }
}

/// One unit of a vendor protocol: wait for a pattern, then act.
///
/// After a non-repeatable `expect` pattern matches, the capture transition
/// is applied first and the action is sent second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Phase the session is in while this step runs.
    pub phase: Phase,

    /// Candidate patterns; the first non-repeatable match completes the step.
    pub expect: Vec<PatternSpec>,

    /// Patterns that mean the device went off-script.
    pub reject: Vec<PatternSpec>,

    /// What to send once the step completes.
    pub action: Action,

    /// How the capture window changes once the step completes.
    pub capture: CaptureTransition,

    /// Timeout override for this step.
    pub timeout: Option<Duration>,
}

impl Step {
    /// Create a step in a phase.
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            expect: vec![],
            reject: vec![],
            action: Action::None,
            capture: CaptureTransition::Unchanged,
            timeout: None,
        }
    }

    /// Add a candidate pattern.
    pub fn expect(mut self, pattern: PatternSpec) -> Self {
        self.expect.push(pattern);
        self
    }

    /// Add a rejection pattern.
    pub fn reject(mut self, pattern: PatternSpec) -> Self {
        self.reject.push(pattern);
        self
    }

    /// Send a command line when the step completes.
    pub fn send_line(mut self, line: impl Into<String>) -> Self {
        self.action = Action::Line(line.into());
        self
    }

    /// Send raw keystrokes when the step completes.
    pub fn send_keys(mut self, keys: impl Into<String>) -> Self {
        self.action = Action::Keys(keys.into());
        self
    }

    /// Send a credential when the step completes.
    pub fn send_credential(mut self, role: CredentialRole) -> Self {
        self.action = Action::Credential(role);
        self
    }

    /// Set the capture transition.
    pub fn capture(mut self, transition: CaptureTransition) -> Self {
        self.capture = transition;
        self
    }

    /// Override the step timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether the step loops on a repeatable pattern.
    pub fn has_repeatable(&self) -> bool {
        self.expect.iter().any(|p| p.repeat.is_some())
    }

    pub(crate) fn substituted_action(&self, vars: &Variables<'_>) -> Result<Action, ProtocolError> {
        self.action.substitute(vars)
    }
}
