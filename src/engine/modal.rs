//! Confirmation dialog handling.
//!
//! The dialog's text field is an opaque custom element; the real
//! input-capable node usually hides inside its shadow root. Fill searches
//! the shadow root first, then nested content, then the host itself.

use super::detect::ModalState;
use crate::config::Config;
use crate::driver::PageDriver;
use crate::{Error, Result};
use tracing::{debug, info};

/// Detect and complete the confirmation dialog. No-op when absent.
///
/// Any error here means the dialog was present but could not be resolved;
/// the orchestrator maps that to `ModalResolutionFailed` rather than letting
/// it escape the action.
pub async fn complete(driver: &dyn PageDriver, config: &Config) -> Result<()> {
    let value = driver.evaluate(&probe_script(config)).await?;
    let modal: ModalState = serde_json::from_value(value)
        .map_err(|e| Error::Driver(format!("modal probe parse error: {e}")))?;

    if !modal.present {
        debug!("no confirmation dialog");
        return Ok(());
    }
    debug!(prompt = %modal.prompt, needs_input = modal.needs_input, "confirmation dialog present");

    if modal.needs_input {
        info!("filling confirmation dialog: '{}'", config.modal.default_text);
        let filled = driver.evaluate(&fill_script(config)).await?;
        if !filled.as_bool().unwrap_or(false) {
            return Err(Error::Driver(
                "no fillable field in confirmation dialog".into(),
            ));
        }
    }

    let submitted = driver.evaluate(&submit_script(config)).await?;
    if !submitted.as_bool().unwrap_or(false) {
        return Err(Error::Driver(
            "no submit control in confirmation dialog".into(),
        ));
    }

    driver.settle(config.timing.modal_settle_ms).await;
    Ok(())
}

fn probe_script(config: &Config) -> String {
    let modal = serde_json::to_string(&config.modal.container).unwrap();
    let text_input = serde_json::to_string(&config.modal.text_input).unwrap();
    format!(
        r#"/* modal-probe */
(() => {{
    const dialog = document.querySelector({modal});
    if (!dialog) return {{ present: false, prompt: '', needs_input: false }};
    return {{
        present: true,
        prompt: (dialog.textContent || '').trim().replace(/\s+/g, ' ').slice(0, 120),
        needs_input: !!(dialog.querySelector({text_input}) || document.querySelector({text_input})),
    }};
}})()"#
    )
}

fn fill_script(config: &Config) -> String {
    let text_input = serde_json::to_string(&config.modal.text_input).unwrap();
    let value = serde_json::to_string(&config.modal.default_text).unwrap();
    format!(
        r#"/* modal-fill */
(() => {{
    const host = document.querySelector({text_input});
    if (!host) return false;
    const field = (host.shadowRoot && host.shadowRoot.querySelector('textarea, input'))
        || host.querySelector('textarea, input')
        || (host.matches('textarea, input') ? host : null);
    if (!field) return false;
    field.value = {value};
    field.dispatchEvent(new Event('input', {{ bubbles: true }}));
    field.dispatchEvent(new Event('change', {{ bubbles: true }}));
    return true;
}})()"#
    )
}

fn submit_script(config: &Config) -> String {
    let submit = serde_json::to_string(&config.modal.submit).unwrap();
    format!(
        r#"/* modal-submit */
(() => {{
    const button = document.querySelector({submit});
    if (!button) return false;
    button.click();
    return true;
}})()"#
    )
}
