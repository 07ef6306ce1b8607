use anyhow::Result;
use std::sync::Arc;
use usage_meter::config::Settings;
use usage_meter::{start_dashboard, AsyncMutex, SessionManager};

#[tokio::main]
async fn main() -> Result<()> {
    // No log subscriber here: output would tear the alternate screen.
    let settings = Settings::new()?;
    let sessions = Arc::new(AsyncMutex::new(SessionManager::from_settings(&settings)));

    start_dashboard(sessions).await
}
