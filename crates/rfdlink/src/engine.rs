// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link test run loop.
//!
//! Drives a [`LinkRole`] until the [`CancelToken`] is set (Ctrl+C) or the
//! transport fails. Whatever ends the loop, the role is terminated, the final
//! report is produced and the link is closed before [`run`] returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::link::{ConnectionError, SerialLink};
use super::report::Report;
use super::role::LinkRole;

/// Longest uninterrupted sleep while waiting for a deadline.
const CANCEL_SLICE: Duration = Duration::from_millis(10);

/// Shared shutdown flag.
///
/// Cloned into the signal handler; checked at every suspension point.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep until `deadline` in short slices.
    ///
    /// Returns `false` if cancelled before the deadline.
    pub fn sleep_until(&self, deadline: Instant) -> bool {
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(CANCEL_SLICE));
        }
    }

    /// Sleep for `duration`; `false` if cancelled first.
    pub fn sleep(&self, duration: Duration) -> bool {
        self.sleep_until(Instant::now() + duration)
    }
}

/// Result of a run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Final statistics, always present.
    pub report: Report,
    /// Transport failure that ended the run, if any.
    pub failure: Option<ConnectionError>,
}

impl RunOutcome {
    /// 0 after a clean interrupt, 1 after a transport failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.failure.is_some())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Run `role` over `link` until cancelled or the link fails.
pub fn run(
    role: &mut dyn LinkRole,
    link: &mut dyn SerialLink,
    cancel: &CancelToken,
) -> RunOutcome {
    run_with_progress(role, link, cancel, None, |_| {})
}

/// Like [`run`], calling `on_progress` with a snapshot every `interval`.
pub fn run_with_progress<F>(
    role: &mut dyn LinkRole,
    link: &mut dyn SerialLink,
    cancel: &CancelToken,
    interval: Option<Duration>,
    mut on_progress: F,
) -> RunOutcome
where
    F: FnMut(&Report),
{
    log::info!("[ENGINE] {} running on {}", role.role(), link.name());

    let mut next_progress = interval.map(|i| Instant::now() + i);
    let failure = loop {
        if cancel.is_cancelled() {
            log::debug!("[ENGINE] interrupt received");
            break None;
        }

        if let Err(e) = role.poll(link, cancel) {
            log::error!("[ENGINE] {} aborted: {}", role.role(), e);
            break Some(e);
        }

        if let (Some(due), Some(period)) = (next_progress, interval) {
            if Instant::now() >= due {
                on_progress(&role.snapshot());
                // Skip missed periods instead of printing a backlog.
                let next = due + period;
                let now = Instant::now();
                next_progress = Some(if next <= now { now + period } else { next });
            }
        }
    };

    let report = role.on_terminate();
    link.close();

    RunOutcome { report, failure }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::link::{SimLink, SimLinkConfig};
    use crate::report::SenderReport;
    use crate::role::{ReceiverRole, Role, RoleState, SenderRole};

    /// Role whose first poll stalls, then polls quickly until `limit`.
    struct StallingRole {
        stall: Duration,
        polls: u32,
        limit: u32,
        cancel: CancelToken,
    }

    impl LinkRole for StallingRole {
        fn role(&self) -> Role {
            Role::Sender
        }

        fn state(&self) -> RoleState {
            RoleState::Running
        }

        fn poll(
            &mut self,
            _link: &mut dyn SerialLink,
            _cancel: &CancelToken,
        ) -> Result<(), ConnectionError> {
            let pause = if self.polls == 0 {
                self.stall
            } else {
                Duration::from_millis(1)
            };
            std::thread::sleep(pause);
            self.polls += 1;
            if self.polls >= self.limit {
                self.cancel.cancel();
            }
            Ok(())
        }

        fn snapshot(&self) -> Report {
            Report::Sender(SenderReport {
                frames_sent: u64::from(self.polls),
                bytes_sent: 0,
                last_sequence: None,
                elapsed: Duration::ZERO,
            })
        }

        fn on_terminate(&mut self) -> Report {
            self.snapshot()
        }
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_sleep_returns_early_when_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_secs(60)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_sleep_reaches_deadline() {
        let token = CancelToken::new();
        assert!(token.sleep(Duration::from_millis(5)));
    }

    #[test]
    fn test_cancelled_before_start_still_reports() {
        let mut link = SimLink::perfect();
        let mut role = ReceiverRole::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = run(&mut role, &mut link, &cancel);
        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code(), 0);
        assert!(outcome.report.as_receiver().is_some());
        assert!(link.is_closed());
    }

    #[test]
    fn test_transport_failure_keeps_statistics() {
        let mut link = SimLink::new(SimLinkConfig {
            disconnect_after_reads: Some(1),
            ..Default::default()
        });
        for seq in [0u16, 1, 3] {
            link.write_all(&Frame::test_pattern(seq).to_bytes())
                .expect("write");
        }

        let mut role = ReceiverRole::new();
        let outcome = run(&mut role, &mut link, &CancelToken::new());

        assert_eq!(outcome.exit_code(), 1);
        assert!(matches!(outcome.failure, Some(ConnectionError::Read(_))));
        let report = outcome.report.as_receiver().expect("receiver report");
        assert_eq!(report.frames_received, 3);
        assert_eq!(report.frames_missed, 1);
        assert!(link.is_closed());
    }

    #[test]
    fn test_sender_failure_ends_run() {
        let mut link = SimLink::perfect();
        link.close();
        let mut role = SenderRole::new(Duration::from_millis(1));

        let outcome = run(&mut role, &mut link, &CancelToken::new());
        assert!(matches!(outcome.failure, Some(ConnectionError::Closed)));
        assert_eq!(outcome.report.as_sender().map(|s| s.frames_sent), Some(0));
    }

    #[test]
    fn test_progress_skips_missed_periods() {
        let cancel = CancelToken::new();
        let mut role = StallingRole {
            stall: Duration::from_millis(100),
            polls: 0,
            limit: 6,
            cancel: cancel.clone(),
        };
        let mut link = SimLink::perfect();
        let mut fired = 0;

        let outcome = run_with_progress(
            &mut role,
            &mut link,
            &cancel,
            Some(Duration::from_millis(20)),
            |_| fired += 1,
        );

        assert!(outcome.is_success());
        // One line after the stall, not one per elapsed period.
        assert!(fired >= 1);
        assert!(fired <= 2, "progress fired {} times", fired);
    }
}
