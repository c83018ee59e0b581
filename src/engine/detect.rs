//! State detection — one pure read of the live page.
//!
//! A single scan script returns the attendance widget's controls and the
//! confirmation dialog state in one round trip. Controls are opaque custom
//! elements, so they are described uniformly by label, name attribute,
//! marker attribute and geometry rather than by form semantics.

use crate::config::Config;
use crate::driver::{PageDriver, Rect};
use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;

/// Current attendance state, derived fresh on every read and never cached
/// across invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceState {
    SignedIn,
    SignedOut,
    Unknown,
}

impl fmt::Display for AttendanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SignedIn => "signed in",
            Self::SignedOut => "signed out",
            Self::Unknown => "unknown",
        })
    }
}

/// One actionable control inside the attendance widget. Transient: lives for
/// a single orchestrated action.
#[derive(Debug, Clone)]
pub struct ButtonDescriptor {
    /// Visible label text.
    pub label: String,
    /// Semantic `name` attribute.
    pub name: String,
    /// Value of the configured marker attribute.
    pub marker: String,
    pub visible: bool,
    pub bbox: Rect,
    /// Selector of the owning widget.
    pub widget: String,
    /// Whether this is the primary action control.
    pub primary: bool,
}

/// Confirmation dialog state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModalState {
    pub present: bool,
    pub prompt: String,
    /// Whether a free-text field must be filled before submission.
    pub needs_input: bool,
}

/// Result of one page scan.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Whether the attendance widget container was located at all.
    pub widget_found: bool,
    pub controls: Vec<ButtonDescriptor>,
    pub modal: ModalState,
    state: AttendanceState,
    history_present: bool,
}

impl Snapshot {
    pub fn state(&self) -> AttendanceState {
        self.state
    }

    /// Whether the historical-record control ("view swipes") was seen.
    pub fn history_present(&self) -> bool {
        self.history_present
    }

    /// The visible primary action control, if any.
    pub fn primary_button(&self) -> Option<&ButtonDescriptor> {
        self.controls.iter().find(|c| c.primary && c.visible)
    }

    fn from_raw(raw: RawScan, config: &Config) -> Self {
        let history_marker = config.widget.history_marker.to_lowercase();
        let controls: Vec<ButtonDescriptor> = raw
            .controls
            .into_iter()
            .map(|c| ButtonDescriptor {
                primary: c.marker == config.widget.primary_marker,
                label: c.label,
                name: c.name,
                marker: c.marker,
                visible: c.visible,
                bbox: Rect {
                    x: c.x,
                    y: c.y,
                    width: c.width,
                    height: c.height,
                },
                widget: config.widget.container.clone(),
            })
            .collect();

        let history_present = raw.found
            && controls.iter().any(|c| {
                c.name.to_lowercase().contains(&history_marker)
                    || c.label.to_lowercase().contains(&history_marker)
            });

        // Two independent signals, in priority order. The history control is
        // a UI-text heuristic; verification elsewhere prefers an observed
        // state flip.
        let state = if !raw.found {
            AttendanceState::Unknown
        } else if history_present {
            AttendanceState::SignedIn
        } else if controls.iter().any(|c| c.primary && c.visible) {
            AttendanceState::SignedOut
        } else {
            AttendanceState::Unknown
        };

        Self {
            widget_found: raw.found,
            controls,
            modal: raw.modal,
            state,
            history_present,
        }
    }
}

#[derive(Deserialize)]
struct RawScan {
    found: bool,
    controls: Vec<RawControl>,
    modal: ModalState,
}

#[derive(Deserialize)]
struct RawControl {
    label: String,
    name: String,
    marker: String,
    visible: bool,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

/// Selector for the primary action control, for strategies that must
/// re-resolve it.
pub(crate) fn primary_selector(config: &Config) -> String {
    format!(
        "{} {}[{}=\"{}\"]",
        config.widget.container,
        config.widget.control,
        config.widget.marker_attr,
        config.widget.primary_marker
    )
}

fn scan_script(config: &Config) -> String {
    let widget = serde_json::to_string(&config.widget.container).unwrap();
    let control = serde_json::to_string(&config.widget.control).unwrap();
    let marker_attr = serde_json::to_string(&config.widget.marker_attr).unwrap();
    let modal = serde_json::to_string(&config.modal.container).unwrap();
    let text_input = serde_json::to_string(&config.modal.text_input).unwrap();
    format!(
        r#"/* widget-scan */
(() => {{
    const out = {{ found: false, controls: [], modal: {{ present: false, prompt: '', needs_input: false }} }};
    const widget = document.querySelector({widget});
    if (widget) {{
        out.found = true;
        for (const el of widget.querySelectorAll({control})) {{
            const rect = el.getBoundingClientRect();
            out.controls.push({{
                label: (el.textContent || '').trim().replace(/\s+/g, ' '),
                name: el.getAttribute('name') || '',
                marker: el.getAttribute({marker_attr}) || '',
                visible: el.offsetParent !== null && rect.width > 0 && rect.height > 0,
                x: rect.x, y: rect.y, width: rect.width, height: rect.height,
            }});
        }}
    }}
    const dialog = document.querySelector({modal});
    if (dialog) {{
        out.modal.present = true;
        out.modal.prompt = (dialog.textContent || '').trim().replace(/\s+/g, ' ').slice(0, 120);
        out.modal.needs_input = !!(dialog.querySelector({text_input}) || document.querySelector({text_input}));
    }}
    return out;
}})()"#
    )
}

/// Scan the page. Pure read: no side effects on the page.
pub async fn scan(driver: &dyn PageDriver, config: &Config) -> Result<Snapshot> {
    let value = driver.evaluate(&scan_script(config)).await?;
    let raw: RawScan = serde_json::from_value(value)
        .map_err(|e| Error::Driver(format!("widget scan parse error: {e}")))?;
    Ok(Snapshot::from_raw(raw, config))
}
