use std::io::Write;
use std::sync::Mutex;

use log::debug;
use scriptup_backend::{Notifier, ProgressSink, ScriptId, UpdateState};

/// Prints batch notifications to a writer, stdout by default.
pub struct ConsoleNotifier<W: Write + Send = std::io::Stdout> {
    out: Mutex<W>,
}

impl ConsoleNotifier {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleNotifier<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

fn render(title: &str, body: &str, ids: &[ScriptId]) -> String {
    let ids = ids
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("{title}\n{body}(scripts: {ids})\n")
}

impl<W: Write + Send> Notifier for ConsoleNotifier<W> {
    fn notify_to_open_scripts(&self, title: &str, body: &str, ids: &[ScriptId]) {
        let mut out = self
            .out
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let _ = out
            .write_all(render(title, body, ids).as_bytes())
            .and_then(|()| out.flush());
    }
}

/// Sends per-script progress to the debug log.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn update_script(&self, id: ScriptId, state: &UpdateState) {
        match &state.error {
            Some(error) => debug!("script {id}: {} ({error})", state.message),
            None if state.checking => debug!("script {id}: {}...", state.message),
            None => debug!("script {id}: {}", state.message),
        }
    }
}
