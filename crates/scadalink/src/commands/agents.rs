//! `agents list|select|clear`.

use scadalink_core::{AgentId, AgentSummary, Supervisor};

use crate::cli::{AgentsArgs, AgentsCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    supervisor: &Supervisor,
    args: AgentsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        AgentsCommand::List => {
            let agents = supervisor.list_agents().await?;
            let selected = supervisor.selected_agent();
            let color = output::should_color(global.color);
            let out = output::render(global.output, &agents, |list| {
                render_list(list, selected.as_ref(), color)
            })?;
            output::print_output(&out, global);
            Ok(())
        }

        AgentsCommand::Select { id } => {
            let agent = AgentId::new(id);
            supervisor.select_agent(agent.clone()).await?;
            output::notice(&format!("Selected agent {agent}"), global);
            Ok(())
        }

        AgentsCommand::Clear => {
            supervisor.logout().await?;
            output::notice("Agent selection cleared", global);
            Ok(())
        }
    }
}

fn render_list(agents: &[AgentSummary], selected: Option<&AgentId>, color: bool) -> String {
    if agents.is_empty() {
        return "No agents".into();
    }
    let width = agents.iter().map(|a| a.id.as_str().len()).max().unwrap_or(0);
    agents
        .iter()
        .map(|a| {
            let marker = if Some(&a.id) == selected { '*' } else { ' ' };
            format!(
                "{marker} {:<width$}  {:<8}  {}",
                a.id.as_str(),
                output::paint_online(a.online, color),
                a.name.as_deref().unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
