pub mod settings;

pub use settings::{
    generate_default_config, MonitoringSettings, PowerSettings, PricingSettings,
    RateLimitSettings, ReportingSettings, ServerSettings, Settings,
};
