//! # punchclock
//!
//! Attendance automation for the GreytHR portal. Detects the current
//! sign-in state, performs an idempotent sign-in or sign-out against the
//! portal's script-rendered custom widgets, completes the confirmation
//! dialog when one appears, and verifies the result.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use punchclock::{ActionKind, Config, Params, Session};
//!
//! # #[tokio::main]
//! # async fn main() -> punchclock::Result<()> {
//! let params = Params::new().set("username", "alice").set("password", "secret");
//! let config = Config::load_with_params("configs/greythr.yaml", &params)?;
//!
//! let session = Session::open(config).await?;
//! let outcome = session.perform(ActionKind::SignIn).await;
//! println!("{}", outcome.summary);
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod driver;
pub mod engine;
pub mod session;

pub use config::{BrowserConfig, Config, Params};
pub use driver::{CdpDriver, PageDriver, Rect};
pub use engine::{ActionKind, ActionOutcome, AttendanceState, Classification, Engine};
pub use session::Session;

/// Result type for punchclock operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during config loading or a portal session.
///
/// Action-level failures (an exhausted strategy chain, an unresolvable
/// confirmation dialog) do not appear here: they are reported inside
/// [`ActionOutcome`] with a [`Classification`]. This enum covers the
/// invocation-fatal paths: configuration, browser launch, navigation and
/// login.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("credentials rejected: {0}")]
    Credentials(String),

    #[error("attendance widget not found: {0}")]
    Widget(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// Map a fatal error onto the user-facing failure taxonomy.
    ///
    /// Anything not covered explicitly happened while acquiring the session,
    /// so it reads as a navigation-phase failure to the operator.
    pub fn classification(&self) -> Classification {
        match self {
            Error::Credentials(_) => Classification::CredentialRejected,
            Error::Widget(_) => Classification::WidgetNotFound,
            Error::Timeout(_) => Classification::Timeout,
            _ => Classification::NavigationFailure,
        }
    }
}
