//! Engine behavior against a scripted page driver — no browser required.
//!
//! The fake driver simulates the portal page: the scan script sees a page
//! state, activations mutate it according to the script, and every driver
//! interaction is recorded so tests can assert on side effects.

use async_trait::async_trait;
use punchclock::config::Config;
use punchclock::driver::{PageDriver, Rect};
use punchclock::engine::{ActionKind, AttendanceState, Classification, Engine};
use punchclock::{Error, Session};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
struct Modal {
    needs_input: bool,
    has_field: bool,
    has_submit: bool,
}

/// What the fake page looks like at one point in time.
#[derive(Clone)]
struct PageState {
    widget: bool,
    history: bool,
    primary: bool,
    modal: Option<Modal>,
}

impl PageState {
    fn signed_out() -> Self {
        Self {
            widget: true,
            history: false,
            primary: true,
            modal: None,
        }
    }

    fn signed_in() -> Self {
        Self {
            widget: true,
            history: true,
            primary: true,
            modal: None,
        }
    }

    /// Widget present but neither state signal.
    fn ambiguous() -> Self {
        Self {
            widget: true,
            history: false,
            primary: false,
            modal: None,
        }
    }

    fn missing() -> Self {
        Self {
            widget: false,
            history: false,
            primary: false,
            modal: None,
        }
    }

    fn with_modal(mut self, modal: Modal) -> Self {
        self.modal = Some(modal);
        self
    }

    fn scan_json(&self) -> Value {
        let mut controls = Vec::new();
        if self.primary {
            controls.push(json!({
                "label": "Punch", "name": "punch", "marker": "primary",
                "visible": true, "x": 100.0, "y": 200.0, "width": 120.0, "height": 40.0,
            }));
        }
        if self.history {
            controls.push(json!({
                "label": "View Swipes", "name": "view swipes", "marker": "",
                "visible": true, "x": 100.0, "y": 260.0, "width": 120.0, "height": 40.0,
            }));
        }
        json!({
            "found": self.widget,
            "controls": controls,
            "modal": {
                "present": self.modal.is_some(),
                "prompt": if self.modal.is_some() { "Where are you working from?" } else { "" },
                "needs_input": self.modal.as_ref().map(|m| m.needs_input).unwrap_or(false),
            },
        })
    }
}

impl Default for PageState {
    fn default() -> Self {
        Self::missing()
    }
}

#[derive(Default)]
struct Script {
    state: PageState,
    /// Whether the direct-click script reports the click as dispatched.
    direct_fires: bool,
    /// Whether a coordinate click lands.
    pointer_fires: bool,
    /// Whether a keyboard dispatch has any effect on the page.
    keyboard_flips: bool,
    /// Page state after a successful activation.
    after_activation: Option<PageState>,
    /// Page state after the modal is submitted (modal simply closes if unset).
    after_modal: Option<PageState>,
    /// Whether waiting for the widget container times out.
    wait_for_fails: bool,
    /// Whether the login form is still on screen after a failed wait.
    login_form_stuck: bool,
    calls: Vec<String>,
}

fn apply_activation(script: &mut Script) {
    if let Some(next) = script.after_activation.take() {
        script.state = next;
    }
}

struct FakeDriver {
    inner: Arc<Mutex<Script>>,
}

impl FakeDriver {
    fn new(script: Script) -> Self {
        Self {
            inner: Arc::new(Mutex::new(script)),
        }
    }

    /// A second handle onto the same script, so calls can still be inspected
    /// after the driver itself has been boxed into a session.
    fn handle(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    /// Total control-activation side effects of any kind.
    fn activations(&self) -> usize {
        self.count("direct-activate") + self.count("click_at") + self.count("dispatch_key")
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&self, _url: &str) -> punchclock::Result<()> {
        self.inner.lock().unwrap().calls.push("navigate".into());
        Ok(())
    }

    async fn fill(&self, _selector: &str, _value: &str) -> punchclock::Result<()> {
        self.inner.lock().unwrap().calls.push("fill".into());
        Ok(())
    }

    async fn click(&self, _selector: &str) -> punchclock::Result<()> {
        self.inner.lock().unwrap().calls.push("click".into());
        Ok(())
    }

    async fn evaluate(&self, js: &str) -> punchclock::Result<Value> {
        let mut script = self.inner.lock().unwrap();
        if js.contains("widget-scan") {
            script.calls.push("scan".into());
            return Ok(script.state.scan_json());
        }
        if js.contains("direct-activate") {
            script.calls.push("direct-activate".into());
            let fired = script.direct_fires && script.state.primary;
            if fired {
                apply_activation(&mut script);
            }
            return Ok(Value::Bool(fired));
        }
        if js.contains("modal-probe") {
            script.calls.push("modal-probe".into());
            let modal = script.state.modal.clone();
            return Ok(json!({
                "present": modal.is_some(),
                "prompt": if modal.is_some() { "Where are you working from?" } else { "" },
                "needs_input": modal.as_ref().map(|m| m.needs_input).unwrap_or(false),
            }));
        }
        if js.contains("modal-fill") {
            script.calls.push("modal-fill".into());
            let ok = script.state.modal.as_ref().map(|m| m.has_field).unwrap_or(false);
            return Ok(Value::Bool(ok));
        }
        if js.contains("modal-submit") {
            script.calls.push("modal-submit".into());
            let ok = script
                .state
                .modal
                .as_ref()
                .map(|m| m.has_submit)
                .unwrap_or(false);
            if ok {
                if let Some(next) = script.after_modal.take() {
                    script.state = next;
                } else {
                    script.state.modal = None;
                }
            }
            return Ok(Value::Bool(ok));
        }
        if js.contains("login-probe") {
            script.calls.push("login-probe".into());
            return Ok(Value::Bool(script.login_form_stuck));
        }
        panic!("unexpected script: {js}");
    }

    async fn wait_for(&self, selector: &str, _timeout_ms: u64) -> punchclock::Result<()> {
        let mut script = self.inner.lock().unwrap();
        script.calls.push("wait_for".into());
        if script.wait_for_fails {
            Err(Error::Timeout(format!("waiting for '{selector}'")))
        } else {
            Ok(())
        }
    }

    async fn settle(&self, _ms: u64) {}

    async fn bounding_box(&self, _selector: &str) -> punchclock::Result<Option<Rect>> {
        Ok(Some(Rect {
            x: 100.0,
            y: 200.0,
            width: 120.0,
            height: 40.0,
        }))
    }

    async fn click_at(&self, _x: f64, _y: f64) -> punchclock::Result<()> {
        let mut script = self.inner.lock().unwrap();
        script.calls.push("click_at".into());
        if script.pointer_fires {
            apply_activation(&mut script);
            Ok(())
        } else {
            Err(punchclock::Error::Driver("no element at point".into()))
        }
    }

    async fn dispatch_key(&self, _selector: &str, _key: &str) -> punchclock::Result<()> {
        let mut script = self.inner.lock().unwrap();
        script.calls.push("dispatch_key".into());
        if script.keyboard_flips {
            apply_activation(&mut script);
        }
        Ok(())
    }

    async fn screenshot(&self) -> punchclock::Result<Vec<u8>> {
        self.inner.lock().unwrap().calls.push("screenshot".into());
        Ok(Vec::new())
    }

    async fn close(self: Box<Self>) -> punchclock::Result<()> {
        Ok(())
    }
}

fn test_config() -> Config {
    Config::parse(
        r#"
name: "Test"
portal:
  url: "https://acme.greythr.com"
  username: "u"
  password: "p"
timing:
  dashboard_timeout_ms: 100
  settle_ms: 0
  post_click_ms: 0
  post_action_ms: 0
  modal_settle_ms: 0
"#,
    )
    .unwrap()
}

#[tokio::test]
async fn sign_in_from_signed_out_succeeds() {
    let fake = FakeDriver::new(Script {
        state: PageState::signed_out(),
        direct_fires: true,
        after_activation: Some(PageState::signed_in()),
        ..Default::default()
    });
    let config = test_config();

    let outcome = Engine::new(&fake, &config).perform(ActionKind::SignIn).await;

    assert!(outcome.success, "summary: {}", outcome.summary);
    assert_eq!(outcome.state, AttendanceState::SignedIn);
    assert_eq!(outcome.classification, None);
    assert_eq!(fake.count("direct-activate"), 1);
    assert_eq!(fake.count("click_at"), 0);
    assert_eq!(fake.count("dispatch_key"), 0);
}

#[tokio::test]
async fn sign_in_when_already_signed_in_is_noop() {
    let fake = FakeDriver::new(Script {
        state: PageState::signed_in(),
        ..Default::default()
    });
    let config = test_config();

    let outcome = Engine::new(&fake, &config).perform(ActionKind::SignIn).await;

    assert!(outcome.success);
    assert_eq!(outcome.state, AttendanceState::SignedIn);
    assert!(outcome.summary.contains("Already"), "summary: {}", outcome.summary);
    assert_eq!(fake.activations(), 0);
    // One detection read and nothing else touched the page.
    assert_eq!(fake.count("scan"), 1);
}

#[tokio::test]
async fn sign_out_when_already_signed_out_is_noop() {
    let fake = FakeDriver::new(Script {
        state: PageState::signed_out(),
        ..Default::default()
    });
    let config = test_config();

    let outcome = Engine::new(&fake, &config).perform(ActionKind::SignOut).await;

    assert!(outcome.success);
    assert_eq!(outcome.state, AttendanceState::SignedOut);
    assert_eq!(fake.activations(), 0);
}

#[tokio::test]
async fn status_only_never_activates() {
    for state in [PageState::signed_in(), PageState::signed_out()] {
        let expected = if state.history {
            AttendanceState::SignedIn
        } else {
            AttendanceState::SignedOut
        };
        let fake = FakeDriver::new(Script {
            state,
            // Even a fully activatable page must not be touched.
            direct_fires: true,
            pointer_fires: true,
            keyboard_flips: true,
            ..Default::default()
        });
        let config = test_config();

        let outcome = Engine::new(&fake, &config)
            .perform(ActionKind::StatusOnly)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.state, expected);
        assert_eq!(fake.activations(), 0);
        assert_eq!(fake.count("scan"), 1);
    }
}

#[tokio::test]
async fn status_with_ambiguous_widget_reports_unknown() {
    let fake = FakeDriver::new(Script {
        state: PageState::ambiguous(),
        ..Default::default()
    });
    let config = test_config();

    let outcome = Engine::new(&fake, &config)
        .perform(ActionKind::StatusOnly)
        .await;

    // An ambiguous read is still a successful read; it must not escalate.
    assert!(outcome.success);
    assert_eq!(outcome.state, AttendanceState::Unknown);
}

#[tokio::test]
async fn missing_widget_fails_without_reaching_the_chain() {
    for kind in [ActionKind::SignIn, ActionKind::SignOut, ActionKind::StatusOnly] {
        let fake = FakeDriver::new(Script {
            state: PageState::missing(),
            direct_fires: true,
            pointer_fires: true,
            ..Default::default()
        });
        let config = test_config();

        let outcome = Engine::new(&fake, &config).perform(kind).await;

        assert!(!outcome.success);
        assert_eq!(outcome.classification, Some(Classification::WidgetNotFound));
        assert_eq!(fake.activations(), 0);
    }
}

#[tokio::test]
async fn strategy_chain_falls_back_in_order() {
    let fake = FakeDriver::new(Script {
        state: PageState::signed_out(),
        direct_fires: false,
        pointer_fires: true,
        after_activation: Some(PageState::signed_in()),
        ..Default::default()
    });
    let config = test_config();

    let outcome = Engine::new(&fake, &config).perform(ActionKind::SignIn).await;

    assert!(outcome.success, "summary: {}", outcome.summary);
    assert_eq!(fake.count("direct-activate"), 1);
    assert_eq!(fake.count("click_at"), 1);
    // The chain stopped at the confirmed strategy.
    assert_eq!(fake.count("dispatch_key"), 0);

    let calls = fake.calls();
    let direct = calls.iter().position(|c| c == "direct-activate").unwrap();
    let pointer = calls.iter().position(|c| c == "click_at").unwrap();
    assert!(direct < pointer);
}

#[tokio::test]
async fn exhausted_chain_reports_activation_unconfirmed() {
    let fake = FakeDriver::new(Script {
        state: PageState::signed_out(),
        direct_fires: false,
        pointer_fires: false,
        keyboard_flips: false,
        ..Default::default()
    });
    let config = test_config();

    let outcome = Engine::new(&fake, &config).perform(ActionKind::SignIn).await;

    assert!(!outcome.success);
    // The keyboard dispatch executed but nothing observable happened.
    assert_eq!(
        outcome.classification,
        Some(Classification::ActivationUnconfirmed)
    );
    assert_eq!(fake.count("dispatch_key"), 1);
}

#[tokio::test]
async fn no_visible_primary_control_fails_fast() {
    // Signed in (history control present) but the punch button is gone.
    let mut state = PageState::signed_in();
    state.primary = false;
    let fake = FakeDriver::new(Script {
        state,
        ..Default::default()
    });
    let config = test_config();

    let outcome = Engine::new(&fake, &config).perform(ActionKind::SignOut).await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.classification,
        Some(Classification::NoActionableControl)
    );
    assert_eq!(fake.activations(), 0);
}

#[tokio::test]
async fn modal_with_required_input_is_filled_and_submitted() {
    let fake = FakeDriver::new(Script {
        state: PageState::signed_out(),
        direct_fires: true,
        after_activation: Some(PageState::signed_out().with_modal(Modal {
            needs_input: true,
            has_field: true,
            has_submit: true,
        })),
        after_modal: Some(PageState::signed_in()),
        ..Default::default()
    });
    let config = test_config();

    let outcome = Engine::new(&fake, &config).perform(ActionKind::SignIn).await;

    assert!(outcome.success, "summary: {}", outcome.summary);
    assert_eq!(outcome.state, AttendanceState::SignedIn);
    assert_eq!(fake.count("modal-fill"), 1);
    assert_eq!(fake.count("modal-submit"), 1);
}

#[tokio::test]
async fn modal_without_required_input_submits_directly() {
    let fake = FakeDriver::new(Script {
        state: PageState::signed_out(),
        direct_fires: true,
        after_activation: Some(PageState::signed_out().with_modal(Modal {
            needs_input: false,
            has_field: false,
            has_submit: true,
        })),
        after_modal: Some(PageState::signed_in()),
        ..Default::default()
    });
    let config = test_config();

    let outcome = Engine::new(&fake, &config).perform(ActionKind::SignIn).await;

    assert!(outcome.success);
    assert_eq!(fake.count("modal-fill"), 0);
    assert_eq!(fake.count("modal-submit"), 1);
}

#[tokio::test]
async fn unresolvable_modal_submit_fails_the_action() {
    let fake = FakeDriver::new(Script {
        state: PageState::signed_out(),
        direct_fires: true,
        after_activation: Some(PageState::signed_out().with_modal(Modal {
            needs_input: true,
            has_field: true,
            has_submit: false,
        })),
        ..Default::default()
    });
    let config = test_config();

    let outcome = Engine::new(&fake, &config).perform(ActionKind::SignIn).await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.classification,
        Some(Classification::ModalResolutionFailed)
    );
}

#[tokio::test]
async fn unverifiable_final_state_is_success_with_caveat() {
    let fake = FakeDriver::new(Script {
        state: PageState::signed_out(),
        direct_fires: true,
        after_activation: Some(PageState::signed_out().with_modal(Modal {
            needs_input: false,
            has_field: false,
            has_submit: true,
        })),
        // After the modal closes the widget renders nothing recognizable.
        after_modal: Some(PageState::ambiguous()),
        ..Default::default()
    });
    let config = test_config();

    let outcome = Engine::new(&fake, &config).perform(ActionKind::SignIn).await;

    assert!(outcome.success);
    assert_eq!(outcome.state, AttendanceState::Unknown);
    assert_eq!(
        outcome.classification,
        Some(Classification::VerificationIndeterminate)
    );
}

#[tokio::test]
async fn round_trip_sign_in_status_sign_out_status() {
    let config = test_config();

    let fake = FakeDriver::new(Script {
        state: PageState::signed_out(),
        direct_fires: true,
        after_activation: Some(PageState::signed_in()),
        ..Default::default()
    });
    let outcome = Engine::new(&fake, &config).perform(ActionKind::SignIn).await;
    assert!(outcome.success);
    assert_eq!(outcome.state, AttendanceState::SignedIn);

    let fake = FakeDriver::new(Script {
        state: PageState::signed_in(),
        ..Default::default()
    });
    let outcome = Engine::new(&fake, &config)
        .perform(ActionKind::StatusOnly)
        .await;
    assert_eq!(outcome.state, AttendanceState::SignedIn);

    let fake = FakeDriver::new(Script {
        state: PageState::signed_in(),
        direct_fires: true,
        after_activation: Some(PageState::signed_out()),
        ..Default::default()
    });
    let outcome = Engine::new(&fake, &config).perform(ActionKind::SignOut).await;
    assert!(outcome.success);
    assert_eq!(outcome.state, AttendanceState::SignedOut);

    let fake = FakeDriver::new(Script {
        state: PageState::signed_out(),
        ..Default::default()
    });
    let outcome = Engine::new(&fake, &config)
        .perform(ActionKind::StatusOnly)
        .await;
    assert_eq!(outcome.state, AttendanceState::SignedOut);
}

#[tokio::test]
async fn login_stuck_on_form_is_credentials_rejected() {
    let fake = FakeDriver::new(Script {
        state: PageState::signed_out(),
        wait_for_fails: true,
        login_form_stuck: true,
        ..Default::default()
    });
    let log = fake.handle();

    let err = Session::open_with_driver(Box::new(fake), test_config())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Credentials(_)), "got: {err}");
    assert_eq!(err.classification(), Classification::CredentialRejected);
    // Credentials were submitted before the wait gave up.
    assert_eq!(log.count("fill"), 2);
    assert_eq!(log.count("click"), 1);
    assert_eq!(log.count("login-probe"), 1);
}

#[tokio::test]
async fn login_past_form_without_widget_is_widget_not_found() {
    let fake = FakeDriver::new(Script {
        state: PageState::missing(),
        wait_for_fails: true,
        login_form_stuck: false,
        ..Default::default()
    });

    let err = Session::open_with_driver(Box::new(fake), test_config())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Widget(_)), "got: {err}");
    assert_eq!(err.classification(), Classification::WidgetNotFound);
}

#[tokio::test]
async fn failed_login_captures_configured_screenshot() {
    let path = std::env::temp_dir().join("login-failure-test.png");
    let path = path.to_str().unwrap().to_string();
    let _ = std::fs::remove_file(&path);

    let config = Config::parse(&format!(
        r#"
name: "Test"
portal:
  url: "https://acme.greythr.com"
  username: "u"
  password: "p"
on_failure:
  screenshot: "{path}"
"#
    ))
    .unwrap();

    let fake = FakeDriver::new(Script {
        state: PageState::missing(),
        wait_for_fails: true,
        ..Default::default()
    });
    let log = fake.handle();

    let result = Session::open_with_driver(Box::new(fake), config).await;

    assert!(result.is_err());
    // The page was captured while it still showed the failure.
    assert_eq!(log.count("screenshot"), 1);
    assert!(std::path::Path::new(&path).exists());
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn successful_login_yields_working_session() {
    let fake = FakeDriver::new(Script {
        state: PageState::signed_in(),
        ..Default::default()
    });
    let log = fake.handle();

    let session = Session::open_with_driver(Box::new(fake), test_config())
        .await
        .unwrap();
    let outcome = session.perform(ActionKind::StatusOnly).await;

    assert!(outcome.success);
    assert_eq!(outcome.state, AttendanceState::SignedIn);
    assert_eq!(log.count("navigate"), 1);
    assert_eq!(log.count("wait_for"), 1);
    assert_eq!(log.count("screenshot"), 0);
    session.close().await.unwrap();
}
