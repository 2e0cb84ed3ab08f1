//! `settings show|set`.

use serde::Serialize;

use scadalink_core::{AgentId, ServerSettings, Supervisor};

use crate::cli::{GlobalOpts, SettingsArgs, SettingsCommand};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsView {
    #[serde(flatten)]
    settings: ServerSettings,
    route: String,
    selected_agent: Option<AgentId>,
    demo_mode: bool,
}

pub async fn handle(
    supervisor: &Supervisor,
    args: SettingsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        SettingsCommand::Show => {
            let settings = supervisor.settings()?;
            let view = SettingsView {
                route: settings.route_mode().to_string(),
                settings,
                selected_agent: supervisor.selected_agent(),
                demo_mode: supervisor.demo_mode(),
            };
            let out = output::render(global.output, &view, detail)?;
            output::print_output(&out, global);
            Ok(())
        }

        SettingsCommand::Set {
            host,
            port,
            auto_connect,
        } => {
            let mut settings = supervisor.settings()?;
            if let Some(host) = host {
                settings.host = host;
            }
            if let Some(port) = port {
                settings.port = port;
            }
            if let Some(auto_connect) = auto_connect {
                settings.auto_connect = auto_connect;
            }
            supervisor.update_settings(settings.clone()).await?;
            output::notice(
                &format!(
                    "Settings saved: {}:{} ({})",
                    settings.host,
                    settings.port,
                    settings.route_mode()
                ),
                global,
            );
            Ok(())
        }
    }
}

fn detail(view: &SettingsView) -> String {
    let host = if view.settings.host.is_empty() {
        "(not set)"
    } else {
        view.settings.host.as_str()
    };
    let agent = view
        .selected_agent
        .as_ref()
        .map_or_else(|| "(none)".to_owned(), ToString::to_string);
    [
        format!("host:          {host}"),
        format!("port:          {}", view.settings.port),
        format!("route:         {}", view.route),
        format!("auto-connect:  {}", view.settings.auto_connect),
        format!("agent:         {agent}"),
        format!("demo mode:     {}", if view.demo_mode { "on" } else { "off" }),
    ]
    .join("\n")
}
