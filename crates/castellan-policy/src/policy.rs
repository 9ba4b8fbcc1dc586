//! The policy interface the firmware consumes.

use std::time::Duration;

/// Time remaining in the current policy period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodLeft {
    /// No period accounting applies (policy not active).
    NotApplicable,
    /// The policy has no period, limits never reset.
    Unbounded,
    /// Time left until the current period rolls over.
    Remaining(Duration),
}

/// Narrow view of a policy as consumed by the approval flow and the
/// lockdown screen.
///
/// Everything behind this trait is opaque to the UI: it can ask for an
/// explanation, trigger the one-way activation, and read the running
/// statistics. Whether an individual transaction is acceptable is decided
/// elsewhere, by the signing engine that shares the policy object.
pub trait Policy: Send {
    /// Human-readable multi-line explanation of what the policy permits.
    fn explain(&self) -> String;

    /// Activate the policy. One-way: there is no deactivation.
    ///
    /// `is_new` is true when the policy was freshly proposed this session
    /// rather than restored from storage; storage of new policies is the
    /// caller's concern.
    fn activate(&mut self, is_new: bool);

    /// Number of requests approved since activation.
    fn approvals(&self) -> u32;

    /// Number of requests refused since activation.
    fn refusals(&self) -> u32;

    /// Time remaining in the current period.
    fn time_left(&self) -> PeriodLeft;
}
