//! `watch`: stream live values for one register until interrupted.

use tokio_stream::StreamExt;

use scadalink_core::{LiveValue, RegisterSubscriptionKey, Supervisor};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    supervisor: &Supervisor,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let key = RegisterSubscriptionKey {
        analyzer_id: args.analyzer,
        address: args.address,
        data_type: args.data_type,
        scale: args.scale,
        byte_order: args.byte_order,
        bit_offset: args.bit_offset,
        register_id: args.register,
    };

    let state = supervisor.connect().await?;
    if !state.is_connected() {
        return Err(CliError::NotConnected {
            state: state.to_string(),
        });
    }
    if supervisor.demo_mode() {
        return Err(CliError::Validation {
            field: "demo mode".into(),
            reason: "live values are not simulated; run `scadalink demo off` first".into(),
        });
    }

    output::notice(&format!("Watching {key} (Ctrl-C to stop)"), global);
    let mut values = supervisor.watch_stream(key);
    let mut seen = 0usize;

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => break,
            value = values.next() => {
                let Some(value) = value else { break };
                let out = render_value(global.output, &value)?;
                output::print_output(&out, global);
                seen += 1;
                if args.count.is_some_and(|n| seen >= n) {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn render_value(format: OutputFormat, value: &LiveValue) -> Result<String, CliError> {
    match format {
        OutputFormat::Plain => {
            let at = value
                .timestamp
                .map_or_else(|| "-".to_owned(), |t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string());
            Ok(format!("{at}  {}", value.value))
        }
        // one value per line, even for `json`
        OutputFormat::Json | OutputFormat::JsonCompact => {
            output::render(OutputFormat::JsonCompact, value, |_| String::new())
        }
    }
}
