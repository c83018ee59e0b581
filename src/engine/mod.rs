//! Attendance action engine: detect → act → verify.
//!
//! One invocation flows through `Detecting → (ShortCircuit | Acting) →
//! Verifying → Done`. Detection always happens before acting, acting before
//! verification, and the state is re-derived from the live page at both
//! ends; nothing is cached across invocations because the session may have
//! changed out-of-band.

pub mod detect;
pub mod modal;
pub mod strategy;

pub use detect::{AttendanceState, ButtonDescriptor, ModalState, Snapshot};
pub use strategy::{Activation, Attempt, ChainResult, Confirmation, Strategy, DEFAULT_CHAIN};

use crate::config::Config;
use crate::driver::PageDriver;
use crate::Error;
use chrono::Local;
use std::fmt;
use tracing::{debug, info, warn};

/// What the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    SignIn,
    SignOut,
    StatusOnly,
}

impl ActionKind {
    /// Target state for mutating actions; `None` for status reads.
    fn target(self) -> Option<AttendanceState> {
        match self {
            Self::SignIn => Some(AttendanceState::SignedIn),
            Self::SignOut => Some(AttendanceState::SignedOut),
            Self::StatusOnly => None,
        }
    }

    fn done_phrase(self) -> &'static str {
        match self {
            Self::SignIn => "Signed in",
            Self::SignOut => "Signed out",
            Self::StatusOnly => "Status checked",
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Self::SignIn => "sign in",
            Self::SignOut => "sign out",
            Self::StatusOnly => "check status",
        }
    }
}

/// User-facing failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NavigationFailure,
    CredentialRejected,
    WidgetNotFound,
    NoActionableControl,
    ActivationUnconfirmed,
    ModalResolutionFailed,
    VerificationIndeterminate,
    Timeout,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NavigationFailure => "navigation failure",
            Self::CredentialRejected => "credentials rejected",
            Self::WidgetNotFound => "attendance widget not found",
            Self::NoActionableControl => "no actionable control",
            Self::ActivationUnconfirmed => "activation unconfirmed",
            Self::ModalResolutionFailed => "confirmation dialog unresolved",
            Self::VerificationIndeterminate => "verification indeterminate",
            Self::Timeout => "timeout",
        })
    }
}

/// Structured result of one orchestrated action.
///
/// `classification` is always set when `success` is false. It is also set on
/// the one success-with-caveat path, `VerificationIndeterminate`, where the
/// action likely landed but the final state could not be re-read.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub success: bool,
    /// Best-effort resulting state; `Unknown` when unverifiable.
    pub state: AttendanceState,
    pub summary: String,
    pub classification: Option<Classification>,
}

impl ActionOutcome {
    fn ok(state: AttendanceState, summary: String) -> Self {
        Self {
            success: true,
            state,
            summary,
            classification: None,
        }
    }

    fn ok_with_caveat(
        state: AttendanceState,
        summary: String,
        classification: Classification,
    ) -> Self {
        Self {
            success: true,
            state,
            summary,
            classification: Some(classification),
        }
    }

    fn failed(
        classification: Classification,
        state: AttendanceState,
        summary: String,
    ) -> Self {
        Self {
            success: false,
            state,
            summary,
            classification: Some(classification),
        }
    }
}

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M").to_string()
}

/// Orchestrates one attendance action against a live, logged-in page.
pub struct Engine<'a> {
    driver: &'a dyn PageDriver,
    config: &'a Config,
}

impl<'a> Engine<'a> {
    pub fn new(driver: &'a dyn PageDriver, config: &'a Config) -> Self {
        Self { driver, config }
    }

    /// Run one action end to end. Action-level failures come back inside the
    /// outcome; this never surfaces a raw error and never reports success on
    /// a failed action.
    pub async fn perform(&self, kind: ActionKind) -> ActionOutcome {
        debug!(?kind, "detecting");
        let snapshot = match detect::scan(self.driver, self.config).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("detection failed: {e}");
                let classification = match e {
                    Error::Timeout(_) => Classification::Timeout,
                    _ => Classification::WidgetNotFound,
                };
                return ActionOutcome::failed(
                    classification,
                    AttendanceState::Unknown,
                    format!("Could not read the attendance widget: {e}"),
                );
            }
        };

        let state = snapshot.state();
        debug!(%state, "detected");

        if !snapshot.widget_found {
            return ActionOutcome::failed(
                Classification::WidgetNotFound,
                AttendanceState::Unknown,
                "Attendance widget not found on the page; check that the portal loaded correctly.".into(),
            );
        }

        let Some(target) = kind.target() else {
            // Status reads perform no mutation and verify against the
            // detection that just happened.
            info!("status: {state}");
            return ActionOutcome::ok(state, self.status_summary(&snapshot));
        };

        if state == target {
            debug!("short-circuit: already {state}");
            return ActionOutcome::ok(
                state,
                format!("Already {state} as of {}; nothing to do.", timestamp()),
            );
        }

        debug!("acting");
        let Some(button) = snapshot.primary_button() else {
            return ActionOutcome::failed(
                Classification::NoActionableControl,
                state,
                "No actionable control found in the attendance widget.".into(),
            );
        };
        info!(label = %button.label, "activating primary control");

        let chain = strategy::run_chain(self.driver, self.config, button, state).await;
        let Some(confirmation) = chain.confirmation else {
            let (classification, summary) = if chain.any_fired() {
                (
                    Classification::ActivationUnconfirmed,
                    format!(
                        "Tried to {} but no strategy produced an observable change.",
                        kind.verb()
                    ),
                )
            } else {
                (
                    Classification::NoActionableControl,
                    "Could not locate or activate the primary control.".into(),
                )
            };
            return ActionOutcome::failed(classification, state, summary);
        };

        if confirmation == Confirmation::ModalOpened {
            debug!("completing confirmation dialog");
            if let Err(e) = modal::complete(self.driver, self.config).await {
                warn!("modal handling failed: {e}");
                return ActionOutcome::failed(
                    Classification::ModalResolutionFailed,
                    state,
                    format!("Confirmation dialog could not be completed: {e}"),
                );
            }
        }

        debug!("verifying");
        self.driver.settle(self.config.timing.post_action_ms).await;
        let after = match detect::scan(self.driver, self.config).await {
            Ok(snapshot) => snapshot.state(),
            Err(e) => {
                warn!("verification read failed: {e}");
                AttendanceState::Unknown
            }
        };

        if after == target {
            info!("confirmed: {after}");
            return ActionOutcome::ok(
                after,
                format!("{} at {}.", kind.done_phrase(), timestamp()),
            );
        }
        if after == AttendanceState::Unknown {
            // The activation was confirmed by a post-condition, so the action
            // may well have landed; only the re-read is unreliable.
            return ActionOutcome::ok_with_caveat(
                AttendanceState::Unknown,
                format!(
                    "{} at {}, but the final state could not be verified.",
                    kind.done_phrase(),
                    timestamp()
                ),
                Classification::VerificationIndeterminate,
            );
        }
        ActionOutcome::failed(
            Classification::ActivationUnconfirmed,
            after,
            format!("Activation did not change attendance state (still {after})."),
        )
    }

    fn status_summary(&self, snapshot: &Snapshot) -> String {
        let yes_no = |b: bool| if b { "yes" } else { "no" };
        format!(
            "Status: {} (checked {}). {} control(s) in widget, primary: {}, history: {}.",
            snapshot.state(),
            timestamp(),
            snapshot.controls.len(),
            yes_no(snapshot.primary_button().is_some()),
            yes_no(snapshot.history_present()),
        )
    }
}
