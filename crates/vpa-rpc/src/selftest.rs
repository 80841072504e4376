//! Startup self-test.
//!
//! Drives the dispatcher through the in-process transport and records
//! each outcome in the segment's self-test block, so `view-shared` can
//! show the result of the last run.

use vpa_core::wire::codec::Writer;
use vpa_core::{Status, VersionMsg, WireMessage, NO_HANDLE};
use vpa_shm::{ProcessLock, SegmentMemory, SelfTest, TestOutcome};

use crate::dispatch::{Dispatcher, RequestContext};
use crate::error::{Result, RpcError};
use crate::session::VpaSession;
use crate::transport::LocalTransport;

#[derive(Clone)]
pub struct SelfTestReport {
    pub results: Vec<(&'static str, TestOutcome)>,
    /// Block as left in the segment
    pub block: SelfTest,
}

impl SelfTestReport {
    pub fn passed(&self) -> bool {
        self.block.overall_passed != 0
    }
}

struct Recorder<'a, M: SegmentMemory, L: ProcessLock> {
    dispatcher: &'a Dispatcher<M, L>,
    results: Vec<(&'static str, TestOutcome)>,
}

impl<M: SegmentMemory, L: ProcessLock> Recorder<'_, M, L> {
    fn record(&mut self, name: &'static str, outcome: TestOutcome) -> Result<()> {
        let index = self.results.len() as u32;
        self.dispatcher
            .store()
            .with_locked(|shm| shm.selftest.record(index, outcome))?;
        match outcome {
            TestOutcome::Failed => tracing::warn!(test = name, "self-test failed"),
            _ => tracing::info!(test = name, ?outcome, "self-test"),
        }
        self.results.push((name, outcome));
        Ok(())
    }

    fn check(&mut self, name: &'static str, passed: bool) -> Result<()> {
        let outcome = if passed {
            TestOutcome::Passed
        } else {
            TestOutcome::Failed
        };
        self.record(name, outcome)
    }
}

/// Run every check against `dispatcher`, which must accept `psk`.
///
/// Failed-authentication checks skip the reply delay. LOOKUP is recorded
/// as skipped because it needs a real account.
pub fn run<M: SegmentMemory, L: ProcessLock>(
    dispatcher: &Dispatcher<M, L>,
    psk: &str,
) -> Result<SelfTestReport> {
    dispatcher.store().with_locked(|shm| shm.selftest.begin())?;
    let mut rec = Recorder {
        dispatcher,
        results: Vec::new(),
    };
    let transport = || LocalTransport::new(dispatcher).without_penalty();
    let expected_token = dispatcher.store().token()?;

    let mut session = VpaSession::new(transport());
    let token = session.authenticate(psk);
    rec.check("get_auth", token.is_ok_and(|t| t == expected_token))?;

    let wrong = format!("{psk}-wrong");
    let rejected = VpaSession::new(transport()).authenticate(&wrong);
    rec.check("get_auth_rejects_bad_psk", is_auth_failure(&rejected))?;

    rec.check(
        "version",
        session.version().is_ok_and(|v| v == vpa_core::VERSION),
    )?;

    let stale = VpaSession::with_token(transport(), "stale-token").version();
    rec.check("version_rejects_stale_token", is_auth_failure(&stale))?;

    rec.check("urls", session.urls().is_ok())?;

    rec.check(
        "creds_rejects_missing_handle",
        matches!(
            session.creds(NO_HANDLE),
            Err(RpcError::Status {
                status: Status::Error,
                ..
            })
        ),
    )?;

    rec.check(
        "host2ipv4_literal",
        session.host2ipv4("127.0.0.1").is_ok_and(|ip| ip == "127.0.0.1"),
    )?;

    rec.record("lookup", TestOutcome::Skipped)?;

    let mut frame = VersionMsg::request(&expected_token).encode();
    Writer::at(&mut frame, 8).u32(0x7f);
    let reply = dispatcher.handle_frame(&frame, &RequestContext::local());
    rec.check(
        "unknown_request",
        reply.is_some_and(|r| r.status == Status::UnknownRequest),
    )?;

    let block = dispatcher.store().with_locked(|shm| {
        shm.selftest.finish();
        shm.selftest
    })?;
    let report = SelfTestReport {
        results: rec.results,
        block,
    };
    tracing::info!(
        passed = block.num_passed,
        failed = block.num_failed,
        skipped = block.num_skipped,
        "self-test complete"
    );
    Ok(report)
}

fn is_auth_failure<T>(r: &Result<T>) -> bool {
    matches!(r, Err(e) if e.is_auth_failure())
}
