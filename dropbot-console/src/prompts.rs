//! Interactive answers to recovery queries
//!
//! Questions go to stdout and answers are read from stdin on the blocking
//! pool. An empty answer means the capitalised default (`Ignore`); any
//! unambiguous prefix of an option is accepted; anything else asks again.
//! End of input gives no answer, which the monitor treats as skip.

use std::io::{self, BufRead, Write};

use dropbot_monitor::{EventBus, HandlerError, RecoveryDecision, RecoveryQuery};
use dropbot_protocol::{FailureKind, Signal};
use tracing::debug;

/// Subscribe console prompts for both recovery queries
pub fn install(bus: &EventBus) {
    for signal in [Signal::NoPower, Signal::VersionMismatch] {
        bus.subscribe(signal, |event| {
            let query = event.recovery_query().cloned();
            async move {
                let Some(query) = query else {
                    return Ok(None);
                };
                tokio::task::spawn_blocking(move || ask_stdin(&query))
                    .await
                    .map_err(HandlerError::failed)?
                    .map_err(HandlerError::failed)
            }
        });
    }
}

fn ask_stdin(query: &RecoveryQuery) -> io::Result<Option<RecoveryDecision>> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    ask(&mut stdin.lock(), &mut stdout.lock(), query)
}

/// Question text for a query
pub fn question(query: &RecoveryQuery) -> String {
    match query.kind {
        FailureKind::NoPower => "No 12V power supply detected.".to_string(),
        FailureKind::VersionMismatch => format!(
            "Driver version `{}` does not match firmware version `{}`.",
            display_version(query.driver_version()),
            display_version(query.firmware_version()),
        ),
    }
}

fn display_version(version: Option<dropbot_protocol::Version>) -> String {
    version.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}

/// Option list in `[I]gnore/[u]pdate/[s]kip` form; the first option is the default
pub fn menu(options: &[RecoveryDecision]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(i, option)| {
            let name = option.as_str();
            let (first, rest) = name.split_at(1);
            let first = if i == 0 {
                first.to_ascii_uppercase()
            } else {
                first.to_string()
            };
            format!("[{}]{}", first, rest)
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Match an answer against the offered options
pub fn parse_answer(answer: &str, options: &[RecoveryDecision]) -> Option<RecoveryDecision> {
    let answer = answer.trim().to_ascii_lowercase();
    if answer.is_empty() {
        return options.first().copied();
    }

    let mut matches = options
        .iter()
        .copied()
        .filter(|option| option.as_str().starts_with(&answer));
    match (matches.next(), matches.next()) {
        (Some(decision), None) => Some(decision),
        _ => None,
    }
}

/// Ask until a valid answer arrives or input runs out
pub fn ask(
    input: &mut impl BufRead,
    output: &mut impl Write,
    query: &RecoveryQuery,
) -> io::Result<Option<RecoveryDecision>> {
    let options = query.options();
    let prompt = format!("{} {}: ", question(query), menu(options));

    loop {
        output.write_all(prompt.as_bytes())?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            debug!("Input closed, leaving {} unanswered", query.kind);
            return Ok(None);
        }
        if let Some(decision) = parse_answer(&line, options) {
            return Ok(Some(decision));
        }
    }
}
