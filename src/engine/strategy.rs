//! Ordered activation strategies for the primary control.
//!
//! The portal's buttons are script-rendered custom elements whose internal
//! event handling sometimes swallows a plain click, so the chain falls back
//! from the most semantically faithful method to the least. A strategy only
//! counts as successful when a post-condition is observed (dialog opened or
//! state flipped), never merely because it executed without erroring.

use super::detect::{self, AttendanceState, ButtonDescriptor};
use crate::config::Config;
use crate::driver::PageDriver;
use crate::Result;
use tracing::{debug, warn};

/// How a strategy triggers the control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Dispatch the control's native click directly.
    Direct,
    /// Pointer click at the control's bounding-box center.
    Pointer,
    /// Focus the control and dispatch an Enter key sequence.
    Keyboard,
}

/// One entry in the chain: a label plus an activation method. New strategies
/// are data, not new code paths.
#[derive(Debug, Clone, Copy)]
pub struct Strategy {
    pub label: &'static str,
    pub activation: Activation,
}

/// Most faithful first; least likely to mis-click an unrelated element.
pub const DEFAULT_CHAIN: [Strategy; 3] = [
    Strategy {
        label: "direct",
        activation: Activation::Direct,
    },
    Strategy {
        label: "pointer",
        activation: Activation::Pointer,
    },
    Strategy {
        label: "keyboard",
        activation: Activation::Keyboard,
    },
];

/// Observable post-condition that confirms an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    ModalOpened,
    StateFlipped(AttendanceState),
}

/// Record of one strategy attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    pub strategy: &'static str,
    /// Whether the activation executed at all.
    pub fired: bool,
    /// Whether a post-condition confirmed it.
    pub confirmed: bool,
}

/// Outcome of running the chain.
#[derive(Debug, Clone)]
pub struct ChainResult {
    pub confirmation: Option<Confirmation>,
    pub attempts: Vec<Attempt>,
}

impl ChainResult {
    /// Whether any strategy managed to execute its activation.
    pub fn any_fired(&self) -> bool {
        self.attempts.iter().any(|a| a.fired)
    }
}

/// Run strategies in order until one is confirmed or the chain exhausts.
/// Strategy errors are recorded and the chain moves on; this never fails.
pub async fn run_chain(
    driver: &dyn PageDriver,
    config: &Config,
    button: &ButtonDescriptor,
    initial: AttendanceState,
) -> ChainResult {
    let mut attempts = Vec::new();

    for strategy in DEFAULT_CHAIN {
        debug!(strategy = strategy.label, "attempting activation");
        let fired = match attempt(driver, config, strategy.activation, button).await {
            Ok(fired) => fired,
            Err(e) => {
                warn!(strategy = strategy.label, "activation error: {e}");
                false
            }
        };

        if !fired {
            attempts.push(Attempt {
                strategy: strategy.label,
                fired: false,
                confirmed: false,
            });
            continue;
        }

        driver.settle(config.timing.post_click_ms).await;
        let confirmation = match confirm(driver, config, initial).await {
            Ok(confirmation) => confirmation,
            Err(e) => {
                warn!(strategy = strategy.label, "confirmation probe failed: {e}");
                None
            }
        };

        let confirmed = confirmation.is_some();
        attempts.push(Attempt {
            strategy: strategy.label,
            fired: true,
            confirmed,
        });

        if confirmed {
            debug!(strategy = strategy.label, "activation confirmed");
            return ChainResult {
                confirmation,
                attempts,
            };
        }
    }

    ChainResult {
        confirmation: None,
        attempts,
    }
}

async fn attempt(
    driver: &dyn PageDriver,
    config: &Config,
    activation: Activation,
    button: &ButtonDescriptor,
) -> Result<bool> {
    match activation {
        Activation::Direct => {
            let clicked = driver.evaluate(&direct_script(config)).await?;
            Ok(clicked.as_bool().unwrap_or(false))
        }
        Activation::Pointer => {
            let bbox = if button.bbox.is_empty() {
                driver
                    .bounding_box(&detect::primary_selector(config))
                    .await?
                    .unwrap_or_default()
            } else {
                button.bbox
            };
            if bbox.is_empty() {
                return Ok(false);
            }
            let (x, y) = bbox.center();
            driver.click_at(x, y).await?;
            Ok(true)
        }
        Activation::Keyboard => {
            driver
                .dispatch_key(&detect::primary_selector(config), "Enter")
                .await?;
            // Keyboard dispatch gives no direct success signal; the
            // confirmation probe decides.
            Ok(true)
        }
    }
}

async fn confirm(
    driver: &dyn PageDriver,
    config: &Config,
    initial: AttendanceState,
) -> Result<Option<Confirmation>> {
    let snapshot = detect::scan(driver, config).await?;
    if snapshot.modal.present {
        return Ok(Some(Confirmation::ModalOpened));
    }
    let state = snapshot.state();
    if state != AttendanceState::Unknown && state != initial {
        return Ok(Some(Confirmation::StateFlipped(state)));
    }
    Ok(None)
}

fn direct_script(config: &Config) -> String {
    let widget = serde_json::to_string(&config.widget.container).unwrap();
    let selector = serde_json::to_string(&format!(
        "{}[{}=\"{}\"]",
        config.widget.control, config.widget.marker_attr, config.widget.primary_marker
    ))
    .unwrap();
    format!(
        r#"/* direct-activate */
(() => {{
    const widget = document.querySelector({widget});
    if (!widget) return false;
    const button = widget.querySelector({selector});
    if (!button) return false;
    button.click();
    return true;
}})()"#
    )
}
