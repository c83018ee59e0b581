pub mod params;
pub mod schema;

pub use params::Params;
pub use schema::{
    BrowserConfig, Config, LoginSelectors, ModalSelectors, OnFailure, PortalConfig, RetryConfig,
    Timing, Viewport, WidgetSelectors,
};
