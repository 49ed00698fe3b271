//! The session engine: drives one vendor protocol over one terminal channel.

use std::time::Duration;

use log::{debug, info, trace, warn};
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::config::EngineConfig;
use super::plan::{PlannedStep, SessionPlan};
use super::state::SessionState;
use crate::channel::{
    CaptureBuffer, CaptureWindow, MatchOutcome, Pattern, PatternMatcher, ReadBuffer,
    TerminalChannel, printable,
};
use crate::credential::CredentialSet;
use crate::error::{CancelReason, SessionError};
use crate::protocol::{Action, LineEnding, Phase, VendorProtocol};
use crate::target::DeviceTarget;

/// Bytes of unmatched output quoted in a timeout error.
const TAIL_BYTES: usize = 256;

/// Lines at the start of a capture that are checked for failure patterns.
/// Some devices print a caret marker line before the error itself.
const FAILURE_HEAD_LINES: usize = 2;

/// Executes a [`SessionPlan`] against a [`TerminalChannel`].
///
/// One engine drives exactly one channel. Steps run strictly in order: wait
/// for a pattern, apply the capture transition, send the action. On success
/// the bytes seen while the capture window was open are returned; on
/// failure a best-effort termination is attempted and the classified error
/// is returned with no partial capture.
///
/// # Example
///
/// ```rust,no_run
/// use cfgrab::channel::StreamChannel;
/// use cfgrab::credential::{Credential, CredentialRole, CredentialSet};
/// use cfgrab::protocol::ProtocolRegistry;
/// use cfgrab::session::{EngineConfig, SessionEngine, SessionPlan};
/// use cfgrab::target::DeviceTarget;
///
/// # async fn example() -> Result<(), cfgrab::Error> {
/// let stream = tokio::net::TcpStream::connect("10.0.0.1:23").await.map_err(cfgrab::error::TransportError::from)?;
/// let mut channel = StreamChannel::new(stream);
///
/// let target = DeviceTarget::new("r1.example.net", "alice");
/// let credentials = CredentialSet::new().with(Credential::new(CredentialRole::Login, "secret"));
/// let protocol = ProtocolRegistry::lookup("enable_shell")?;
///
/// let plan = SessionPlan::new(&target, credentials, &protocol)?;
/// let config = SessionEngine::new(plan, EngineConfig::default()).run(&mut channel).await?;
/// println!("{}", config.as_str_lossy());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SessionEngine {
    plan: SessionPlan,
    config: EngineConfig,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
}

/// Mutable state of one run.
struct Run<'c, C> {
    channel: &'c mut C,
    buffer: ReadBuffer,
    window: CaptureWindow,
    credentials: CredentialSet,
    line_ending: LineEnding,
    deadline: Option<Instant>,
    cancel: CancellationToken,
    /// Bound on a single wait or write in the current step.
    timeout: Duration,
    /// The previous step sent a credential.
    after_credential: bool,
}

impl SessionEngine {
    /// Create an engine for a plan.
    pub fn new(plan: SessionPlan, config: EngineConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            plan,
            config,
            cancel: CancellationToken::new(),
            state,
        }
    }

    /// Abort the session when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Run the session to completion.
    pub async fn run<C: TerminalChannel>(
        mut self,
        channel: &mut C,
    ) -> Result<CaptureBuffer, SessionError> {
        let mut run = Run {
            channel,
            buffer: ReadBuffer::new(self.config.search_depth),
            window: CaptureWindow::new(),
            credentials: std::mem::take(&mut self.plan.credentials),
            line_ending: self.plan.line_ending,
            deadline: self.config.deadline.map(|d| Instant::now() + d),
            cancel: self.cancel.clone(),
            timeout: self.config.timeout,
            after_credential: false,
        };

        match self.drive(&mut run).await {
            Ok(()) => {
                self.close(run.channel).await;
                self.transition(SessionState::Closed);
                info!(
                    "{}: captured {} bytes of configuration",
                    self.plan.host(),
                    run.window.len()
                );
                Ok(run.window.into_buffer())
            }
            Err(err) => {
                warn!("{}: {}", self.plan.host(), err);
                if !err.channel_closed() {
                    self.abort(&mut run).await;
                }
                self.transition(SessionState::Failed);
                Err(err)
            }
        }
    }

    async fn drive<C: TerminalChannel>(&self, run: &mut Run<'_, C>) -> Result<(), SessionError> {
        let login_completed = run.channel.login_completed();

        for (index, step) in self.plan.steps.iter().enumerate() {
            if login_completed && step.is_login_submission() {
                debug!("{}: step {} handled by transport login", self.plan.host(), index);
                continue;
            }
            self.transition(step.phase.into());
            run.timeout = step.timeout.unwrap_or(self.config.timeout);

            self.wait(run, index, step).await?;

            run.window.apply(step.capture);
            run.send(index, &step.action).await?;
            run.after_credential = step.action.credential().is_some();
        }
        Ok(())
    }

    /// Wait for a step's completing pattern, looping on repeatable ones.
    async fn wait<C: TerminalChannel>(
        &self,
        run: &mut Run<'_, C>,
        index: usize,
        step: &PlannedStep,
    ) -> Result<(), SessionError> {
        let timeout = run.timeout;

        // Candidates: expect, then reject, then protocol-wide failures
        let mut candidates: Vec<&Pattern> = step.expect.iter().collect();
        let reject_start = candidates.len();
        candidates.extend(&step.reject);
        if !run.window.is_enabled() {
            candidates.extend(&self.plan.failures);
        }
        let auth_start = candidates.len();
        if step.phase == Phase::Authenticating || run.after_credential {
            candidates.extend(&self.plan.auth_failures);
        }
        let matcher = PatternMatcher::new(candidates, timeout);

        let mut last_output = Instant::now();
        loop {
            match matcher.poll(run.buffer.as_slice(), last_output.elapsed()) {
                MatchOutcome::Matched(m) if m.index < reject_start => {
                    let before = run.buffer.consume(m.start, m.end);
                    run.window.offer(&before);
                    if let Some(found) = self.refused(&run.window) {
                        return Err(SessionError::ProtocolMismatch {
                            step: index,
                            expected: self.plan.expected(index),
                            found,
                        });
                    }

                    match &step.repeats[m.index] {
                        Some(action) => {
                            trace!(
                                "{}: step {} repeat on '{}'",
                                self.plan.host(),
                                index,
                                step.expect[m.index].label()
                            );
                            run.send(index, action).await?;
                        }
                        None => {
                            debug!(
                                "{}: step {} matched '{}'",
                                self.plan.host(),
                                index,
                                step.expect[m.index].label()
                            );
                            return Ok(());
                        }
                    }
                }
                MatchOutcome::Matched(m) => {
                    let found = printable(&run.buffer.as_slice()[m.start..m.end]);
                    return Err(if m.index >= auth_start || run.after_credential {
                        SessionError::AuthenticationFailed {
                            step: index,
                            reason: format!("device answered '{}'", found),
                        }
                    } else {
                        SessionError::ProtocolMismatch {
                            step: index,
                            expected: self.plan.expected(index),
                            found,
                        }
                    });
                }
                MatchOutcome::TimedOut => {
                    let waited = last_output.elapsed();
                    return Err(if run.after_credential {
                        SessionError::AuthenticationFailed {
                            step: index,
                            reason: format!(
                                "no expected prompt within {:?} of the credential",
                                waited
                            ),
                        }
                    } else {
                        SessionError::ExpectationTimeout {
                            step: index,
                            patterns: self.plan.expected(index),
                            waited,
                            tail: printable(run.buffer.tail(TAIL_BYTES)),
                        }
                    });
                }
                MatchOutcome::Pending => {
                    if let Some(evicted) = run.buffer.evict() {
                        run.window.offer(&evicted);
                    }

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            return Err(SessionError::Cancelled {
                                step: index,
                                reason: CancelReason::Requested,
                            });
                        }
                        _ = sleep_until(run.deadline) => {
                            return Err(SessionError::Cancelled {
                                step: index,
                                reason: CancelReason::Deadline,
                            });
                        }
                        _ = time::sleep_until(last_output + timeout) => {}
                        chunk = run.channel.read_chunk() => match chunk {
                            Ok(Some(data)) => {
                                trace!("{}: read {} bytes", self.plan.host(), data.len());
                                last_output = Instant::now();
                                run.buffer.extend(&data);
                            }
                            Ok(None) => {
                                return Err(SessionError::TransportClosed {
                                    step: index,
                                    reason: None,
                                });
                            }
                            Err(e) => {
                                return Err(SessionError::TransportClosed {
                                    step: index,
                                    reason: Some(e.to_string()),
                                });
                            }
                        },
                    }
                }
            }
        }
    }

    /// A failure pattern at the start of the captured output, meaning the
    /// device refused the dump command. Returns the offending line.
    fn refused(&self, window: &CaptureWindow) -> Option<String> {
        if !window.is_enabled() {
            return None;
        }
        let head = window.head(FAILURE_HEAD_LINES);
        self.plan.failures.iter().find_map(|pattern| {
            let (start, end) = pattern.find(head)?;
            let line_start = head[..start]
                .iter()
                .rposition(|&b| b == b'\n')
                .map_or(0, |pos| pos + 1);
            let line_end = head[end..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(head.len(), |pos| end + pos);
            Some(printable(&head[line_start..line_end]).trim().to_string())
        })
    }

    /// Best-effort termination after a failure.
    async fn abort<C: TerminalChannel>(&self, run: &mut Run<'_, C>) {
        self.transition(SessionState::Terminating);
        for action in &self.plan.abort_sequence {
            let data = match action {
                Action::Line(line) => [line.as_bytes(), run.line_ending.as_bytes()].concat(),
                Action::Keys(keys) => keys.as_bytes().to_vec(),
                Action::None | Action::Credential(_) => continue,
            };
            match time::timeout(self.config.close_timeout, run.channel.write_all(&data)).await {
                Ok(Ok(())) => debug!("{}: abort sent {}", self.plan.host(), action.describe()),
                Ok(Err(e)) => {
                    debug!("{}: abort write failed: {}", self.plan.host(), e);
                    break;
                }
                Err(_) => {
                    warn!("{}: abort write timed out", self.plan.host());
                    break;
                }
            }
        }
        self.close(run.channel).await;
    }

    async fn close<C: TerminalChannel>(&self, channel: &mut C) {
        match time::timeout(self.config.close_timeout, channel.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("{}: close failed: {}", self.plan.host(), e),
            Err(_) => warn!(
                "{}: close timed out after {:?}",
                self.plan.host(),
                self.config.close_timeout
            ),
        }
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("{}: {} -> {}", self.plan.host(), previous, next);
        }
    }
}

impl<C: TerminalChannel> Run<'_, C> {
    async fn send(&mut self, step: usize, action: &Action) -> Result<(), SessionError> {
        match action {
            Action::None => Ok(()),
            Action::Line(line) => {
                debug!("step {}: send {}", step, action.describe());
                self.window.expect_echo(line.as_bytes());
                let data = [line.as_bytes(), self.line_ending.as_bytes()].concat();
                self.write(step, &data).await
            }
            Action::Keys(keys) => {
                trace!("step {}: send {}", step, action.describe());
                self.window.expect_erase();
                self.write(step, keys.as_bytes()).await
            }
            Action::Credential(role) => {
                debug!("step {}: send {}", step, action.describe());
                let credential =
                    self.credentials
                        .take(*role)
                        .ok_or_else(|| SessionError::AuthenticationFailed {
                            step,
                            reason: format!("no {} credential left to send", role),
                        })?;
                let ending = self.line_ending.as_bytes();
                self.write(step, credential.expose()).await?;
                self.write(step, ending).await
            }
        }
    }

    /// Write, bounded like a wait. A write blocked past the step timeout
    /// means the peer stopped reading.
    async fn write(&mut self, step: usize, data: &[u8]) -> Result<(), SessionError> {
        let timeout = self.timeout;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SessionError::Cancelled {
                step,
                reason: CancelReason::Requested,
            }),
            _ = sleep_until(self.deadline) => Err(SessionError::Cancelled {
                step,
                reason: CancelReason::Deadline,
            }),
            _ = time::sleep(timeout) => Err(SessionError::TransportClosed {
                step,
                reason: Some(format!("write blocked for {:?}", timeout)),
            }),
            written = self.channel.write_all(data) => {
                written.map_err(|e| SessionError::TransportClosed {
                    step,
                    reason: Some(e.to_string()),
                })
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Run `protocol` for `target` over `channel` with default engine settings.
///
/// Configuration problems surface before the first byte is exchanged.
pub async fn run<C: TerminalChannel>(
    target: &DeviceTarget,
    credentials: CredentialSet,
    protocol: &VendorProtocol,
    channel: &mut C,
) -> crate::Result<CaptureBuffer> {
    let plan = SessionPlan::new(target, credentials, protocol)?;
    Ok(SessionEngine::new(plan, EngineConfig::default())
        .run(channel)
        .await?)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::duplex;
    use tokio_test::io::Builder;

    use super::*;
    use crate::channel::StreamChannel;
    use crate::credential::{Credential, CredentialRole};
    use crate::error::{ConfigError, Error};
    use crate::protocol::vendors;

    fn login(secret: &str) -> CredentialSet {
        CredentialSet::new().with(Credential::new(CredentialRole::Login, secret))
    }

    fn engine(
        protocol: VendorProtocol,
        target: DeviceTarget,
        credentials: CredentialSet,
        config: EngineConfig,
    ) -> SessionEngine {
        let plan = SessionPlan::new(&target, credentials, &protocol).unwrap();
        SessionEngine::new(plan, config)
    }

    fn short_timeout() -> EngineConfig {
        EngineConfig::default()
            .with_timeout(Duration::from_millis(50))
            .with_close_timeout(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_enable_shell_end_to_end() {
        let mock = Builder::new()
            .read(b"alice@r1's password: ")
            .write(b"s3cret")
            .write(b"\r")
            .read(b"\r\nWelcome\r\nr1>")
            .write(b"enable\r")
            .read(b"enable\r\nr1#")
            .write(b"show running-config\r")
            .read(b"line1\nline2\nr1#")
            .write(b"exit\r")
            .read(b"exit\r\nr1$")
            .write(b"exit\r")
            .build();
        let mut channel = StreamChannel::new(mock);

        let engine = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            login("s3cret"),
            EngineConfig::default(),
        );
        let state = engine.subscribe();
        assert_eq!(engine.state(), SessionState::Connecting);

        let capture = engine.run(&mut channel).await.unwrap();
        assert_eq!(capture.as_bytes(), b"line1\nline2\n");
        assert_eq!(*state.borrow(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_pagination_loop_end_to_end() {
        let erase_backspace = [&[0x08u8; 10][..], &[b' '; 10][..], &[0x08u8; 10][..]].concat();
        let page_two = [&erase_backspace[..], &b"line2\n --More-- "[..]].concat();

        let mock = Builder::new()
            .read(b"alice@r1's password:")
            .write(b"s3cret")
            .write(b"\r")
            .read(b"\r\nr1>")
            .write(b"enable\r")
            .read(b"\r\nr1#")
            .write(b"show running-config\r")
            .read(b"show running-config\r\nline1\n --More-- ")
            .write(b" ")
            .read(&page_two)
            .write(b" ")
            .read(b"\r          \rline3\nr1#")
            .write(b"exit\r")
            .read(b"\r\nr1$")
            .write(b"exit\r")
            .build();
        let mut channel = StreamChannel::new(mock);

        let capture = engine(
            vendors::enable_paged::protocol(),
            DeviceTarget::new("r1", "alice"),
            login("s3cret"),
            EngineConfig::default(),
        )
        .run(&mut channel)
        .await
        .unwrap();

        assert_eq!(capture.as_bytes(), b"line1\nline2\nline3\n");
    }

    #[tokio::test]
    async fn test_menu_shell_end_to_end() {
        let mock = Builder::new()
            .read(b"admin@sw1.lab's password: ")
            .write(b"pw")
            .write(b"\r")
            .read(b"\r\nPress any key to continue")
            .write(b" ")
            .read(b"\r\nsw1# ")
            .write(b"no page\r")
            .read(b"no page\r\nsw1# ")
            .write(b"show running-config\r")
            .read(b"show running-config\r\nhostname sw1\nvlan 10\nsw1# ")
            .write(b"exit\r")
            .read(b"exit\r\nsw1> ")
            .write(b"exit\r")
            .read(b"exit\r\nDo you want to log out [y/n]? ")
            .write(b"y")
            .build();
        let mut channel = StreamChannel::new(mock);

        let capture = engine(
            vendors::menu_shell::protocol(),
            DeviceTarget::new("sw1.lab", "admin"),
            login("pw"),
            EngineConfig::default(),
        )
        .run(&mut channel)
        .await
        .unwrap();

        assert_eq!(capture.as_bytes(), b"hostname sw1\nvlan 10\n");
    }

    #[tokio::test]
    async fn test_extended_cli_two_credentials() {
        let mock = Builder::new()
            .read(b"Password:")
            .write(b"login-pw")
            .write(b"\r")
            .read(b"\r\nInfo: The max number of VTY users is 5.\r\n<sw1>")
            .write(b"_cmdline-mode on\r")
            .read(b"_cmdline-mode on\r\nAll commands can be displayed and executed. Continue? [Y/N]:")
            .write(b"Y\r")
            .read(b"Y\r\nPlease input password:")
            .write(b"super-pw")
            .write(b"\r")
            .read(b"\r\nInfo: Mode developer!\r\n<sw1>")
            .write(b"screen-length disable\r")
            .read(b"screen-length disable\r\n<sw1>")
            .write(b"display current-configuration\r")
            .read(b"display current-configuration\r\n#\nsysname sw1\n#\nreturn\n<sw1>")
            .write(b"quit\r")
            .build();
        let mut channel = StreamChannel::new(mock);

        let credentials = login("login-pw")
            .with(Credential::new(CredentialRole::Privileged, "super-pw"));
        let capture = engine(
            vendors::extended_cli::protocol(),
            DeviceTarget::new("sw1.example.net", "ops"),
            credentials,
            EngineConfig::default(),
        )
        .run(&mut channel)
        .await
        .unwrap();

        assert_eq!(capture.as_bytes(), b"#\nsysname sw1\n#\nreturn\n");
        let text = capture.as_str_lossy();
        assert!(!text.contains("login-pw"));
        assert!(!text.contains("super-pw"));
        assert!(!text.contains("Password"));
    }

    #[tokio::test]
    async fn test_login_completed_by_transport_skips_password_step() {
        let mock = Builder::new()
            .read(b"r1>")
            .write(b"enable\r")
            .read(b"r1#")
            .write(b"show running-config\r")
            .read(b"show running-config\r\nhostname r1\nr1#")
            .write(b"exit\r")
            .read(b"r1$")
            .write(b"exit\r")
            .build();
        let mut channel = StreamChannel::new(mock).with_login_completed(true);

        let capture = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            login("s3cret"),
            EngineConfig::default(),
        )
        .run(&mut channel)
        .await
        .unwrap();

        assert_eq!(capture.as_bytes(), b"hostname r1\n");
    }

    #[tokio::test]
    async fn test_sliding_window_keeps_long_dump() {
        let mock = Builder::new()
            .read(b"r1>")
            .write(b"enable\r")
            .read(b"r1#")
            .write(b"show running-config\r")
            .read(b"interface GigabitEthernet0/1\n description uplink to core\n")
            .read(b" ip address 192.0.2.1 255.255.255.0\n")
            .read(b"!\nr1#")
            .write(b"exit\r")
            .read(b"r1$")
            .write(b"exit\r")
            .build();
        let mut channel = StreamChannel::new(mock).with_login_completed(true);

        let capture = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            login("s3cret"),
            EngineConfig::default().with_search_depth(16),
        )
        .run(&mut channel)
        .await
        .unwrap();

        assert_eq!(
            capture.as_bytes(),
            &b"interface GigabitEthernet0/1\n description uplink to core\n ip address 192.0.2.1 255.255.255.0\n!\n"[..]
        );
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let (client, _server) = duplex(1024);
        let mut channel = StreamChannel::new(client);

        let engine = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            login("s3cret"),
            short_timeout(),
        );
        let state = engine.subscribe();
        let err = engine.run(&mut channel).await.unwrap_err();

        match err {
            SessionError::ExpectationTimeout {
                step,
                patterns,
                waited,
                ..
            } => {
                assert_eq!(step, 0);
                assert_eq!(patterns, vec!["alice@r1's password:".to_string()]);
                assert!(waited >= Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(*state.borrow(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_remote_close_is_transport_closed() {
        let mock = Builder::new()
            .read(b"alice@r1's password: ")
            .write(b"s3cret")
            .write(b"\r")
            .build();
        let mut channel = StreamChannel::new(mock);

        let err = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            login("s3cret"),
            EngineConfig::default(),
        )
        .run(&mut channel)
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            SessionError::TransportClosed { step: 1, reason: None }
        ));
    }

    #[tokio::test]
    async fn test_rejected_password_is_authentication_failure() {
        let mock = Builder::new()
            .read(b"alice@r1's password: ")
            .write(b"wrong")
            .write(b"\r")
            .read(b"\r\nPermission denied, please try again.\r\nalice@r1's password: ")
            .write(b"exit\r")
            .build();
        let mut channel = StreamChannel::new(mock);

        let err = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            login("wrong"),
            EngineConfig::default(),
        )
        .run(&mut channel)
        .await
        .unwrap_err();

        assert!(matches!(err, SessionError::AuthenticationFailed { step: 1, .. }));
        assert!(!err.to_string().contains("wrong"));
    }

    #[tokio::test]
    async fn test_silence_after_credential_is_authentication_failure() {
        let (client, mut server) = duplex(1024);
        tokio::io::AsyncWriteExt::write_all(&mut server, b"alice@r1's password: ")
            .await
            .unwrap();
        let mut channel = StreamChannel::new(client);

        let err = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            login("s3cret"),
            short_timeout(),
        )
        .run(&mut channel)
        .await
        .unwrap_err();

        assert!(matches!(err, SessionError::AuthenticationFailed { step: 1, .. }));
    }

    #[tokio::test]
    async fn test_unexpected_prompt_is_protocol_mismatch() {
        let mock = Builder::new()
            .read(b"Password:")
            .write(b"login-pw")
            .write(b"\r")
            .read(b"\r\n<sw1>")
            .write(b"_cmdline-mode on\r")
            .read(b"Continue? [Y/N]:")
            .write(b"Y\r")
            .read(b"Y\r\n<sw1>")
            .write(b"quit\r")
            .build();
        let mut channel = StreamChannel::new(mock);

        let credentials = login("login-pw")
            .with(Credential::new(CredentialRole::Privileged, "super-pw"));
        let err = engine(
            vendors::extended_cli::protocol(),
            DeviceTarget::new("sw1", "ops"),
            credentials,
            EngineConfig::default(),
        )
        .run(&mut channel)
        .await
        .unwrap_err();

        match err {
            SessionError::ProtocolMismatch {
                step,
                expected,
                found,
            } => {
                assert_eq!(step, 3);
                assert_eq!(expected, vec!["[Pp]assword:".to_string()]);
                assert_eq!(found, "<sw1>");
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_command_failure_is_protocol_mismatch() {
        let mock = Builder::new()
            .read(b"r1>")
            .write(b"enable\r")
            .read(b"enable\r\n% Invalid input detected at '^' marker.\r\nr1>")
            .write(b"exit\r")
            .build();
        let mut channel = StreamChannel::new(mock).with_login_completed(true);

        let err = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            login("s3cret"),
            EngineConfig::default(),
        )
        .run(&mut channel)
        .await
        .unwrap_err();

        assert!(matches!(err, SessionError::ProtocolMismatch { step: 2, .. }));
    }

    #[tokio::test]
    async fn test_refused_dump_command_is_protocol_mismatch() {
        let mock = Builder::new()
            .read(b"r1>")
            .write(b"enable\r")
            .read(b"r1#")
            .write(b"show running-config\r")
            .read(b"show running-config\r\n          ^\r\n% Invalid input detected at '^' marker.\r\nr1#")
            .write(b"exit\r")
            .build();
        let mut channel = StreamChannel::new(mock).with_login_completed(true);

        let err = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            login("s3cret"),
            EngineConfig::default(),
        )
        .run(&mut channel)
        .await
        .unwrap_err();

        match err {
            SessionError::ProtocolMismatch { step, found, .. } => {
                assert_eq!(step, 3);
                assert_eq!(found, "% Invalid input detected at '^' marker.");
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failure_text_inside_config_is_captured() {
        let mock = Builder::new()
            .read(b"r1>")
            .write(b"enable\r")
            .read(b"r1#")
            .write(b"show running-config\r")
            .read(b"show running-config\r\nhostname r1\nbanner motd ^C\n% Invalid input is logged\n^C\nr1#")
            .write(b"exit\r")
            .read(b"r1$")
            .write(b"exit\r")
            .build();
        let mut channel = StreamChannel::new(mock).with_login_completed(true);

        let capture = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            login("s3cret"),
            EngineConfig::default(),
        )
        .run(&mut channel)
        .await
        .unwrap();

        assert_eq!(
            capture.as_bytes(),
            &b"hostname r1\nbanner motd ^C\n% Invalid input is logged\n^C\n"[..]
        );
    }

    /// A device that prints the password prompt and then stops reading.
    async fn stalled_device() -> (StreamChannel<tokio::io::DuplexStream>, tokio::io::DuplexStream) {
        let (client, mut device) = duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut device, b"alice@r1's password:")
            .await
            .unwrap();
        (StreamChannel::new(client), device)
    }

    fn long_secret() -> CredentialSet {
        login(&"x".repeat(200))
    }

    #[tokio::test]
    async fn test_blocked_write_stops_at_deadline() {
        let (mut channel, _device) = stalled_device().await;

        let session = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            long_secret(),
            EngineConfig::default()
                .with_deadline(Duration::from_millis(100))
                .with_close_timeout(Duration::from_millis(50)),
        )
        .run(&mut channel);
        let err = time::timeout(Duration::from_secs(2), session)
            .await
            .expect("session hung in a write")
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Cancelled {
                step: 0,
                reason: CancelReason::Deadline
            }
        ));
    }

    #[tokio::test]
    async fn test_blocked_write_stops_on_cancel() {
        let (mut channel, _device) = stalled_device().await;
        let token = CancellationToken::new();

        let session = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            long_secret(),
            EngineConfig::default().with_close_timeout(Duration::from_millis(50)),
        )
        .with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let err = time::timeout(Duration::from_secs(2), session.run(&mut channel))
            .await
            .expect("session hung in a write")
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(
            err,
            SessionError::Cancelled {
                step: 0,
                reason: CancelReason::Requested
            }
        ));
    }

    #[tokio::test]
    async fn test_blocked_write_times_out() {
        let (mut channel, _device) = stalled_device().await;

        let session = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            long_secret(),
            short_timeout(),
        )
        .run(&mut channel);
        let err = time::timeout(Duration::from_secs(2), session)
            .await
            .expect("session hung in a write")
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::TransportClosed { step: 0, reason: Some(_) }
        ));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_wait() {
        let (client, _server) = duplex(1024);
        let mut channel = StreamChannel::new(client);
        let token = CancellationToken::new();

        let engine = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            login("s3cret"),
            EngineConfig::default().with_close_timeout(Duration::from_millis(50)),
        )
        .with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let err = engine.run(&mut channel).await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(
            err,
            SessionError::Cancelled {
                step: 0,
                reason: CancelReason::Requested
            }
        ));
    }

    #[tokio::test]
    async fn test_session_deadline_cancels() {
        let (client, _server) = duplex(1024);
        let mut channel = StreamChannel::new(client);

        let err = engine(
            vendors::enable_shell::protocol(),
            DeviceTarget::new("r1", "alice"),
            login("s3cret"),
            EngineConfig::default()
                .with_deadline(Duration::from_millis(50))
                .with_close_timeout(Duration::from_millis(50)),
        )
        .run(&mut channel)
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            SessionError::Cancelled {
                reason: CancelReason::Deadline,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_privileged_credential_fails_before_io() {
        let mock = Builder::new().build();
        let mut channel = StreamChannel::new(mock);

        let err = run(
            &DeviceTarget::new("sw1", "ops"),
            login("login-pw"),
            &vendors::extended_cli::protocol(),
            &mut channel,
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingCredential {
                role: CredentialRole::Privileged,
                ..
            })
        ));
    }
}
