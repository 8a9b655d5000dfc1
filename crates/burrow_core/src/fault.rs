//! Deterministic fault injection for crash-recovery tests.

use crate::error::{JournalError, JournalResult};

/// Checkpoints inside `append_changeset` where a simulated crash can fire.
///
/// Recovery tests arm one of these via
/// [`Journal::arm_crash_point`](crate::Journal::arm_crash_point), drive a
/// changeset append into the injected failure, then reopen the journal and
/// verify that recovery converges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Between two page bodies, before the next page header is buffered.
    BetweenPageWrites,
    /// After all pages are buffered, before the entry header is patched
    /// with the final followup size.
    BeforeHeaderPatch,
    /// After the changeset was flushed (and synced, if configured).
    AfterFlush,
}

/// Holds at most one armed crash point.
///
/// Fires once the armed checkpoint has been passed `skip` times, then
/// disarms itself so recovery can run without re-triggering.
#[derive(Debug, Default)]
pub(crate) struct FaultInjector {
    armed: Option<(CrashPoint, u32)>,
}

impl FaultInjector {
    pub(crate) fn arm(&mut self, point: CrashPoint, skip: u32) {
        self.armed = Some((point, skip));
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = None;
    }

    pub(crate) fn hit(&mut self, point: CrashPoint) -> JournalResult<()> {
        if let Some((armed, skip)) = self.armed {
            if armed == point {
                if skip == 0 {
                    self.armed = None;
                    return Err(JournalError::InjectedFault(point));
                }
                self.armed = Some((armed, skip - 1));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unarmed_injector_is_silent() {
        let mut faults = FaultInjector::default();
        assert!(faults.hit(CrashPoint::AfterFlush).is_ok());
    }

    #[test]
    fn fires_on_matching_point_only() {
        let mut faults = FaultInjector::default();
        faults.arm(CrashPoint::BeforeHeaderPatch, 0);

        assert!(faults.hit(CrashPoint::AfterFlush).is_ok());
        assert!(matches!(
            faults.hit(CrashPoint::BeforeHeaderPatch),
            Err(JournalError::InjectedFault(CrashPoint::BeforeHeaderPatch))
        ));
        // disarmed after firing
        assert!(faults.hit(CrashPoint::BeforeHeaderPatch).is_ok());
    }

    #[test]
    fn skip_counts_down() {
        let mut faults = FaultInjector::default();
        faults.arm(CrashPoint::BetweenPageWrites, 2);

        assert!(faults.hit(CrashPoint::BetweenPageWrites).is_ok());
        assert!(faults.hit(CrashPoint::BetweenPageWrites).is_ok());
        assert!(faults.hit(CrashPoint::BetweenPageWrites).is_err());
    }
}
