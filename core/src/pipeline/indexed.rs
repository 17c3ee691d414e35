// ## 📂 File: `src/pipeline/indexed.rs`
// ## External indexer: plaintext in on stdin, index artifact out on stdout

//! Design notes:
//! - Two independent byte channels: the fan-out engine writes plaintext into
//!   the child's stdin while a pump thread moves the child's stdout into an
//!   encrypted index sink. Stderr is drained by a third thread so the child
//!   never blocks on a full pipe.
//! - A watchdog started with the child kills it once the timeout (counted
//!   from spawn) runs out, even while the fan-out is blocked writing its
//!   stdin. Such a kill is reported as a timeout.
//! - Exit status != 0 is attributed to the input (user error), unless the
//!   output pump failed first. Spawn failure, pump failure and timeout are
//!   system errors.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::DEFAULT_INDEX_SUFFIX;
use crate::pipeline::outputs::EncryptedFileSink;
use crate::pipeline::types::PipelineError;
use crate::stream::{BlockSink, FanoutError, PipelineStream, WriterSink};

const STDERR_LIMIT: usize = 8 * 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(20);
const EXIT_GRACE: Duration = Duration::from_secs(5);
/// Position of the indexer's stdin among the fan-out sinks.
const STDIN_SINK: usize = 1;

fn default_timeout_secs() -> u64 {
    300
}

fn default_suffix() -> String {
    DEFAULT_INDEX_SUFFIX.to_string()
}

/// How to run the external indexing tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerSettings {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Data file extensions that get an index (`bam`, `cram`).
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Appended to the primary destination to name the index output.
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

impl IndexerSettings {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
            extensions: Vec::new(),
            suffix: default_suffix(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// True when any dot-separated part of the file name after the stem
    /// matches a configured extension, so `x.bam.gpg` matches `bam`.
    pub fn applies_to(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        name.split('.')
            .skip(1)
            .any(|part| self.extensions.iter().any(|ext| ext.eq_ignore_ascii_case(part)))
    }
}

/// Copy `source` into `primary` and into the indexer, re-encrypting the
/// indexer's stdout through `index_sink`. Returns the plaintext byte count.
pub(crate) fn run_indexed(
    stream: &PipelineStream,
    source: &mut (dyn Read + Send),
    primary: Box<dyn BlockSink>,
    mut index_sink: EncryptedFileSink,
    settings: &IndexerSettings,
) -> Result<u64, PipelineError> {
    let mut child = Command::new(&settings.program)
        .args(&settings.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| PipelineError::IndexerSpawn { program: settings.program.clone(), source })?;
    info!(program = %settings.program, pid = child.id(), "indexer started");

    let (stdin, stdout, stderr) = match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
        (Some(i), Some(o), Some(e)) => (i, o, e),
        _ => {
            let child = Mutex::new(child);
            kill_quietly(&child);
            return Err(PipelineError::Internal("indexer pipes were not captured".into()));
        }
    };

    let child = Mutex::new(child);
    let expired = AtomicBool::new(false);
    let (done_tx, done_rx) = channel::bounded::<()>(1);

    thread::scope(|scope| {
        let timer = scope.spawn(|| watchdog(&child, &expired, done_rx, settings.timeout()));
        let pump = scope.spawn(move || pump_stdout(stdout, &mut index_sink));
        let drain = scope.spawn(move || drain_stderr(stderr));

        let sinks: Vec<Box<dyn BlockSink>> = vec![primary, Box::new(WriterSink::new(stdin))];
        let copied = stream.copy(source, sinks);

        // stdin is closed by now. The watchdog bounds every wait below.
        let exited = match &copied {
            Ok(_) => wait_for_exit(&child).map(Some),
            // A broken stdin usually means the child exited on its own.
            Err(FanoutError::Sink { index: STDIN_SINK, .. } | FanoutError::Close { index: STDIN_SINK, .. }) => {
                wait_with_timeout(&child, EXIT_GRACE)
            }
            Err(_) => child.lock().try_wait(),
        };
        if !matches!(exited, Ok(Some(_))) {
            kill_quietly(&child);
        }

        let _ = done_tx.send(());
        let _ = timer.join();
        let pumped = pump.join();
        let stderr = drain.join().unwrap_or_default();

        if expired.load(Ordering::SeqCst) {
            return Err(PipelineError::IndexerTimeout(settings.timeout()));
        }
        // A failed pump closes the child's stdout; whatever the child does
        // next is a consequence, not a verdict on the input.
        match pumped {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(PipelineError::classify_io("writing index output", e)),
            Err(_) => return Err(PipelineError::Internal("indexer output pump panicked".into())),
        }
        match exited {
            Ok(Some(status)) if !status.success() => {
                return Err(PipelineError::IndexerFailed { status: status.to_string(), stderr })
            }
            Err(e) => return Err(PipelineError::io("waiting for indexer", e)),
            _ => {}
        }

        let total = copied.map_err(PipelineError::from_fanout)?;
        debug!(bytes = total, "indexer finished");
        Ok(total)
    })
}

/// Kills the child once `timeout` has passed since spawn, unless told the
/// run is over first.
fn watchdog(child: &Mutex<Child>, expired: &AtomicBool, done: Receiver<()>, timeout: Duration) {
    if let Err(RecvTimeoutError::Timeout) = done.recv_timeout(timeout) {
        let mut child = child.lock();
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        expired.store(true, Ordering::SeqCst);
        warn!(timeout = ?timeout, "indexer timed out, killing it");
        if let Err(e) = child.kill() {
            debug!(error = %e, "indexer kill failed (already exited?)");
        }
    }
}

/// `Ok(None)` when the child is still running after `timeout`.
fn wait_with_timeout(child: &Mutex<Child>, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.lock().try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Polls without holding the lock so the watchdog can still kill.
fn wait_for_exit(child: &Mutex<Child>) -> io::Result<ExitStatus> {
    loop {
        if let Some(status) = child.lock().try_wait()? {
            return Ok(status);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn kill_quietly(child: &Mutex<Child>) {
    let mut child = child.lock();
    if let Err(e) = child.kill() {
        debug!(error = %e, "indexer kill failed (already exited?)");
    }
    let _ = child.wait();
}
