//! `connect`: probe the server, optionally waiting through retries.

use std::time::Duration;

use serde::Serialize;

use scadalink_core::{ConnectionState, Supervisor};

use crate::cli::{ConnectArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectReport {
    state: ConnectionState,
    host: String,
    route: String,
    live_stream: ConnectionState,
}

pub async fn handle(
    supervisor: &Supervisor,
    args: &ConnectArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut state = supervisor.connect().await?;

    if !state.is_connected() && args.wait > 0 {
        let mut states = supervisor.state();
        let waited = tokio::time::timeout(
            Duration::from_secs(args.wait),
            states.wait_for(|s| s.is_connected()),
        )
        .await;
        if let Ok(Ok(current)) = waited {
            state = *current;
        }
    }

    let settings = supervisor.settings()?;
    let report = ConnectReport {
        state,
        host: settings.host.clone(),
        route: settings.route_mode().to_string(),
        live_stream: supervisor.broker().connection_state(),
    };
    let color = output::should_color(global.color);
    let out = output::render(global.output, &report, |r| {
        format!(
            "{} to {} ({}), live stream {}",
            output::paint_state(r.state, color),
            r.host,
            r.route,
            output::paint_state(r.live_stream, color)
        )
    })?;
    output::print_output(&out, global);

    if state.is_connected() {
        Ok(())
    } else {
        Err(CliError::NotConnected {
            state: state.to_string(),
        })
    }
}
