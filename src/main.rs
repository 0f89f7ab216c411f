mod aggregate;
mod calc;
mod config;
mod credentials;
mod gate;
mod groups;
mod ingest;
mod ipc;
mod merge;
mod model;
mod store;
mod text;
mod token;

use std::io::{self, BufRead, Write};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    // stdout carries the protocol; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_ansi(false))
        .with(filter)
        .try_init();
}

fn main() {
    init_tracing();

    let config = config::Config::from_env();
    match config.secret() {
        Ok(_) => tracing::info!(mode = config.mode.as_str(), "auth secret configured"),
        Err(e) => tracing::error!(
            mode = config.mode.as_str(),
            error = %e,
            "auth secret rejected; sign-in is disabled"
        ),
    }
    let mut state = ipc::AppState::new(config);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                tracing::warn!(error = %e, "unparseable request");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{resp}");
                let _ = stdout.flush();
                continue;
            }
        };

        tracing::debug!(id = %req.id, method = %req.method, "request");
        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
