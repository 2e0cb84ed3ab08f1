//! `get` / `post`: one-shot calls through the request gateway.

use serde_json::Value;

use scadalink_core::{HttpMethod, Supervisor};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

pub async fn get(supervisor: &Supervisor, path: &str, global: &GlobalOpts) -> Result<(), CliError> {
    let value = supervisor.request(path, HttpMethod::Get, None).await?;
    print_value(&value, global)
}

pub async fn post(
    supervisor: &Supervisor,
    path: &str,
    body: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let body: Value = serde_json::from_str(body).map_err(|e| CliError::Validation {
        field: "--body".into(),
        reason: format!("not valid JSON: {e}"),
    })?;
    let value = supervisor
        .request(path, HttpMethod::Post, Some(body))
        .await?;
    print_value(&value, global)
}

fn print_value(value: &Value, global: &GlobalOpts) -> Result<(), CliError> {
    if value.is_null() {
        output::notice("(empty response)", global);
        return Ok(());
    }
    let out = output::render_value(global.output, value)?;
    output::print_output(&out, global);
    Ok(())
}
