//! Line-delimited JSON front end: one `Request` per stdin line, one reply per
//! stdout line.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::Result;
use btc_vault::logging::init_logging;
use btc_vault::{Backend, Request, VaultConfig};
use serde_json::{json, Value};
use tracing::info;

fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => VaultConfig::load(Path::new(&path))?,
        None => VaultConfig::from_env()?,
    };
    init_logging(&config.logging);

    let backend = Backend::from_config(&config)?;
    info!(
        storage = ?config.storage.backend,
        policy = ?config.token.policy,
        "btc-vault ready"
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_line(&backend, &line)?;
        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}

fn handle_line(backend: &Backend, line: &str) -> Result<Value> {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return Ok(json!({ "error": format!("InvalidRequestError: {e}") })),
    };
    Ok(match backend.handle_request(&request) {
        Ok(response) => serde_json::to_value(&response)?,
        Err(e) => json!({ "error": e.to_string() }),
    })
}
