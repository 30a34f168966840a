use std::collections::VecDeque;
use std::fs;
use std::io::{BufReader, Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::settings::{GATEWAY_PORT, Layout, Settings};
use crate::util;

const TAIL_LINES: usize = 40;

/// Launch the gateway and block for the rest of the container's lifetime.
/// The returned code is the child's own exit code so the container
/// orchestrator can apply its restart policy; a duplicate instance is a
/// successful no-op.
pub fn run(layout: &Layout, settings: &Settings) -> Result<i32> {
    if gateway_already_running(&settings.gateway_program) {
        info!("gateway already running; nothing to do");
        return Ok(0);
    }

    clear_stale_lock(layout);

    let args = gateway_args(settings);
    info!("launching {} {}", settings.gateway_program, args.join(" "));

    let mut child = match Command::new(&settings.gateway_program)
        .args(&args)
        // The supervisor owns the terminal; a gateway read from an inherited
        // stdin would block on nothing.
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(c) => c,
        Err(e) => {
            warn!("failed to spawn {}: {e}", settings.gateway_program);
            return Ok(127);
        }
    };

    let log_path = layout.gateway_log();
    if let Some(parent) = log_path.parent() {
        util::ensure_dir(parent)?;
    }
    let mut log = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| Error::msg(format!("failed to open {}: {e}", log_path.display())))?;

    write_log_line(
        &mut log,
        &format!("=== gateway started at {} ===", now_rfc3339()),
    );

    let (tx, rx) = mpsc::channel::<String>();
    if let Some(out) = child.stdout.take() {
        let tx = tx.clone();
        std::thread::spawn(move || read_output_stream(out, tx));
    }
    if let Some(err) = child.stderr.take() {
        let tx = tx.clone();
        std::thread::spawn(move || read_output_stream(err, tx));
    }
    drop(tx);

    let mut tail = VecDeque::<String>::with_capacity(TAIL_LINES);
    for line in rx {
        let line = strip_control_chars(&line);
        if line.is_empty() {
            continue;
        }
        write_log_line(&mut log, &line);
        if tail.len() >= TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    let status = child
        .wait()
        .map_err(|e| Error::msg(format!("wait for gateway failed: {e}")))?;
    let code = exit_code(&status);

    write_log_line(
        &mut log,
        &format!("=== gateway exited at {} (code {code}) ===", now_rfc3339()),
    );

    emit_tail(&tail, code);
    Ok(code)
}

/// Invocation surface of the gateway subcommand. Startup is permissive
/// (`--allow-unconfigured`): a partially synthesized document must not keep
/// the gateway down.
pub fn gateway_args(settings: &Settings) -> Vec<String> {
    let mut args = vec![
        "gateway".to_string(),
        "--port".to_string(),
        GATEWAY_PORT.to_string(),
        "--verbose".to_string(),
        "--allow-unconfigured".to_string(),
        "--bind".to_string(),
        "lan".to_string(),
    ];
    if let Some(token) = settings.gateway_token.as_deref() {
        args.push("--token".to_string());
        args.push(token.to_string());
    }
    args
}

/// Re-entry guard: another live process already invoking
/// `<program> gateway ...` means this boot has nothing to do.
#[cfg(target_os = "linux")]
pub fn gateway_already_running(program: &str) -> bool {
    let own_pid = std::process::id();
    let program_name = std::path::Path::new(program)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(program)
        .to_string();

    let Ok(entries) = fs::read_dir("/proc") else {
        return false;
    };
    for entry in entries.flatten() {
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|s| s.parse::<u32>().ok())
        else {
            continue;
        };
        if pid == own_pid {
            continue;
        }
        let Ok(raw) = fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        let argv: Vec<&str> = raw
            .split(|b| *b == 0)
            .filter_map(|s| std::str::from_utf8(s).ok())
            .filter(|s| !s.is_empty())
            .collect();
        // The gateway may run under an interpreter, so the program name can
        // sit anywhere in argv, not just argv[0].
        let names_program = argv.iter().any(|a| {
            std::path::Path::new(a)
                .file_name()
                .and_then(|s| s.to_str())
                .map(|n| n == program_name)
                .unwrap_or(false)
        });
        if names_program && argv.iter().any(|a| *a == "gateway") {
            return true;
        }
    }
    false
}

#[cfg(not(target_os = "linux"))]
pub fn gateway_already_running(_program: &str) -> bool {
    false
}

/// An unclean shutdown can leave the gateway's lock file behind, which would
/// make the fresh instance refuse to start.
fn clear_stale_lock(layout: &Layout) {
    let lock = layout.gateway_lock();
    if lock.exists() {
        match fs::remove_file(&lock) {
            Ok(()) => info!("removed stale lock {}", lock.display()),
            Err(e) => warn!("failed to remove stale lock {}: {e}", lock.display()),
        }
    }
}

fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    1
}

fn emit_tail(tail: &VecDeque<String>, code: i32) {
    if tail.is_empty() {
        eprintln!("gateway exited with code {code} (no output captured)");
        return;
    }
    eprintln!("gateway exited with code {code}; last {} line(s):", tail.len());
    for line in tail {
        eprintln!("  {line}");
    }
}

fn write_log_line(log: &mut fs::File, line: &str) {
    if let Err(e) = writeln!(log, "{line}") {
        warn!("failed to append to gateway log: {e}");
    }
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn read_output_stream<R: Read>(reader: R, tx: mpsc::Sender<String>) {
    const MAX_PENDING_BYTES: usize = 16 * 1024;
    let mut r = BufReader::new(reader);
    let mut buf = [0u8; 8192];
    let mut pending = Vec::with_capacity(1024);

    loop {
        let n = match r.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        for b in &buf[..n] {
            if *b == b'\n' || *b == b'\r' {
                if pending.is_empty() {
                    continue;
                }
                let line = String::from_utf8_lossy(&pending).into_owned();
                pending.clear();
                let _ = tx.send(line);
            } else {
                pending.push(*b);
                if pending.len() >= MAX_PENDING_BYTES {
                    let line = String::from_utf8_lossy(&pending).into_owned();
                    pending.clear();
                    let _ = tx.send(line);
                }
            }
        }
    }

    if !pending.is_empty() {
        let line = String::from_utf8_lossy(&pending).into_owned();
        let _ = tx.send(line);
    }
}

enum EscapeMode {
    Esc,
    Csi,
    Osc,
}

/// Keep log and tail output terminal-safe: drop escape sequences and other
/// control characters, map tabs to spaces.
fn strip_control_chars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut esc: Option<EscapeMode> = None;
    for c in input.chars() {
        if let Some(mode) = esc.as_ref() {
            match mode {
                EscapeMode::Esc => match c {
                    '[' => esc = Some(EscapeMode::Csi),
                    ']' => esc = Some(EscapeMode::Osc),
                    _ => esc = None,
                },
                EscapeMode::Csi => {
                    if ('@'..='~').contains(&c) {
                        esc = None;
                    }
                }
                EscapeMode::Osc => {
                    if c == '\x07' {
                        esc = None;
                    }
                }
            }
            continue;
        }
        match c {
            '\x1b' => esc = Some(EscapeMode::Esc),
            '\t' => out.push(' '),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}
