use anyhow::Context;

use crate::server::{serve, AppState};
use crate::settings::load_settings;

pub fn run(bind: Option<String>) -> anyhow::Result<()> {
    let settings = load_settings();
    let bind = bind.unwrap_or_else(|| settings.server.bind.clone());
    let state = AppState::from_settings(&settings).context("failed to open data directory")?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime
        .block_on(serve(state, &bind))
        .with_context(|| format!("server on {bind} stopped"))
}
