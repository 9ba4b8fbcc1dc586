//! The parsed signing-policy document.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::info;

use crate::policy::{PeriodLeft, Policy};

/// Upper bound for `period`, in minutes (28 days).
pub(crate) const MAX_PERIOD_MINUTES: u32 = 28 * 24 * 60;

/// One rule of the signing policy.
///
/// Only the fields the device explains to the operator are modelled; rule
/// evaluation lives in the signing engine. A rule with no constraints
/// matches any transaction.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRule {
    /// Maximum value of a single transaction, in base units.
    #[serde(default)]
    pub max_amount: Option<u64>,
    /// Maximum total value signed per period, in base units.
    #[serde(default)]
    pub per_period: Option<u64>,
    /// Usernames whose confirmation this rule requires.
    #[serde(default)]
    pub users: Vec<String>,
    /// Destination addresses this rule is restricted to.
    #[serde(default)]
    pub whitelist: Vec<String>,
}

impl PolicyRule {
    fn explain_line(&self, index: usize) -> String {
        let mut parts = Vec::new();
        if let Some(amount) = self.max_amount {
            parts.push(format!("up to {amount} per txn"));
        }
        if let Some(total) = self.per_period {
            parts.push(format!("{total} per period"));
        }
        if !self.users.is_empty() {
            parts.push(format!("needs auth from: {}", self.users.join(", ")));
        }
        if !self.whitelist.is_empty() {
            parts.push(format!("{} whitelisted destinations", self.whitelist.len()));
        }
        if parts.is_empty() {
            parts.push("any transaction".to_owned());
        }
        format!("- Rule #{}: {}", index.saturating_add(1), parts.join(", "))
    }
}

/// The operator-authored autonomous-signing policy, plus runtime state.
///
/// Deserialized from JSON by [`crate::loader::load`]; unknown fields are
/// rejected so a policy written for newer firmware fails loudly instead of
/// silently losing constraints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SigningPolicy {
    /// Free-form operator notes, shown during approval.
    #[serde(default)]
    pub notes: Option<String>,
    /// Length of the accounting period in minutes; absent means unbounded.
    #[serde(default)]
    pub period: Option<u32>,
    /// The signing rules, in priority order.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,

    #[serde(skip)]
    active: bool,
    #[serde(skip)]
    approvals: u32,
    #[serde(skip)]
    refusals: u32,
    #[serde(skip)]
    period_end: Option<Instant>,
}

impl SigningPolicy {
    /// Structural validation beyond what serde enforces.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if let Some(period) = self.period {
            if period == 0 {
                return Err("period: must be at least 1 minute".to_owned());
            }
            if period > MAX_PERIOD_MINUTES {
                return Err(format!("period: {period} exceeds {MAX_PERIOD_MINUTES} minutes"));
            }
        }
        Ok(())
    }

    /// Whether the policy has been activated.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Count one approved request.
    pub fn record_approval(&mut self) {
        self.approvals = self.approvals.saturating_add(1);
    }

    /// Count one refused request.
    pub fn record_refusal(&mut self) {
        self.refusals = self.refusals.saturating_add(1);
    }
}

impl Policy for SigningPolicy {
    fn explain(&self) -> String {
        let mut msg = String::new();

        if self.rules.is_empty() {
            msg.push_str("No transactions will be signed.\n");
        } else {
            msg.push_str("Transactions:\n");
            for (index, rule) in self.rules.iter().enumerate() {
                let _ = writeln!(msg, "{}", rule.explain_line(index));
            }
        }

        match self.period {
            Some(period) => {
                let _ = writeln!(msg, "Period: {period} minutes");
            },
            None => msg.push_str("Period: unlimited\n"),
        }

        if let Some(notes) = &self.notes {
            let _ = writeln!(msg, "\n{notes}");
        }

        msg
    }

    fn activate(&mut self, is_new: bool) {
        self.active = true;
        self.period_end = self.period.and_then(|minutes| {
            Instant::now().checked_add(Duration::from_secs(u64::from(minutes).saturating_mul(60)))
        });
        info!(new = is_new, rules = self.rules.len(), "HSM policy activated");
    }

    fn approvals(&self) -> u32 {
        self.approvals
    }

    fn refusals(&self) -> u32 {
        self.refusals
    }

    fn time_left(&self) -> PeriodLeft {
        if !self.active {
            return PeriodLeft::NotApplicable;
        }
        match self.period_end {
            None => PeriodLeft::Unbounded,
            Some(end) => PeriodLeft::Remaining(end.saturating_duration_since(Instant::now())),
        }
    }
}
