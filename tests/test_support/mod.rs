#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const SECRET: &str = "integration-test-secret-0123456789";
pub const SUPER_PASSWORD: &str = "super-env-password";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    /// Production mode, valid secret, env super password.
    pub fn spawn() -> Self {
        Self::spawn_with(&[
            ("RAFD_ENV", "production"),
            ("AUTH_SECRET", SECRET),
            ("AUTH_SUPER_PASSWORD", SUPER_PASSWORD),
        ])
    }

    pub fn spawn_with(env: &[(&str, &str)]) -> Self {
        let exe = env!("CARGO_BIN_EXE_rafd");
        let mut cmd = Command::new(exe);
        for key in [
            "RAFD_ENV",
            "AUTH_SECRET",
            "AUTH_SUPER_PASSWORD",
            "AUTH_SUPER_HASH",
            "RAFD_WORKSPACE",
        ] {
            cmd.env_remove(key);
        }
        for (k, v) in env {
            cmd.env(k, v);
        }
        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn rafd");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(json!({}))
    }

    /// Error code of a failed request.
    pub fn request_err(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value["error"]["code"]
            .as_str()
            .unwrap_or("unknown")
            .to_string()
    }

    pub fn select_workspace(&mut self, path: &Path) {
        self.request_ok("workspace.select", json!({ "path": path.to_string_lossy() }));
    }

    pub fn login(&mut self, password: &str) -> String {
        let result = self.request_ok("auth.login", json!({ "password": password }));
        result["cookie"]["value"]
            .as_str()
            .expect("token")
            .to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn export_header() -> String {
    let mut cols = vec![
        "FirstName".to_string(),
        "LastName".to_string(),
        "QuizClass".to_string(),
    ];
    for i in 1..=12 {
        cols.push(format!("Points{i}"));
        cols.push(format!("Mark{i}"));
    }
    cols.join(",")
}

/// One export row; `marks` are (points, mark) for the leading items.
pub fn export_row(first: &str, last: &str, class: &str, marks: &[(&str, &str)]) -> String {
    let mut cells = vec![first.to_string(), last.to_string(), class.to_string()];
    for i in 0..12 {
        let (p, m) = marks.get(i).copied().unwrap_or(("", ""));
        cells.push(p.to_string());
        cells.push(m.to_string());
    }
    cells.join(",")
}

pub fn write_export(dir: &Path, cct: &str, rows: &[String]) {
    std::fs::create_dir_all(dir).expect("create exports dir");
    let mut text = export_header();
    text.push('\n');
    for r in rows {
        text.push_str(r);
        text.push('\n');
    }
    std::fs::write(dir.join(format!("{cct}_actualizado.csv")), text).expect("write export");
}

/// Two schools: A1 (1AM + 1AV) and B2 (one student), in `<workspace>/exports`.
pub fn seed_exports(workspace: &Path) {
    let dir = workspace.join("exports");
    write_export(
        &dir,
        "A1",
        &[
            export_row("ANA", "LOPEZ", "M1A", &[("1", "C"), ("1", "C")]),
            export_row("LUIS", "MORA", "1AM", &[("1", "I"), ("1", "C")]),
            export_row("EVA", "RUIZ", "Z11EST56V1", &[("1", "C"), ("1", "I")]),
        ],
    );
    write_export(
        &dir,
        "B2",
        &[export_row("OMAR", "SOTO", "V1B", &[("1", "C")])],
    );
}
