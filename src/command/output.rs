use crate::utils::threads::spawn_named_thread;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::debug;

const MAX_CAPTURED_LINES: usize = 200;
const READER_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Default)]
struct CaptureState {
    capturing: bool,
    lines: Vec<String>,
}

/// Reads the worker pipes for the whole life of the process.
///
/// Every line is forwarded to the watchdog logs. While the startup grace period
/// lasts lines are also kept, so an immediate failure can be reported with its output.
pub(crate) struct OutputCapture {
    state: Arc<Mutex<CaptureState>>,
    readers: Vec<JoinHandle<()>>,
}

impl OutputCapture {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(CaptureState {
                capturing: true,
                lines: Vec::new(),
            })),
            readers: Vec::new(),
        }
    }

    pub(crate) fn read<R>(&mut self, stream: R, stream_name: &'static str, worker_pid: u32)
    where
        R: Read + Send + 'static,
    {
        let state = self.state.clone();
        let reader = spawn_named_thread(&format!("worker {stream_name}"), move || {
            let mut reader = BufReader::new(stream);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        debug!(worker_pid, stream = stream_name, "Stopped reading worker output: {err}");
                        break;
                    }
                }
                // Undecodable bytes must not stop the reader, the worker would get SIGPIPE.
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\n', '\r'])
                    .to_string();
                debug!(worker_pid, stream = stream_name, "{line}");

                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.capturing && state.lines.len() < MAX_CAPTURED_LINES {
                    state.lines.push(line);
                }
            }
        });
        self.readers.push(reader);
    }

    /// Stops capturing and returns what was read so far. Readers keep forwarding.
    pub(crate) fn finish(self) -> String {
        take_lines(&self.state)
    }

    /// Waits up to `timeout` for the pipes to be closed and returns everything captured.
    pub(crate) fn drain(self, timeout: Duration) -> String {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline && !self.readers.iter().all(JoinHandle::is_finished) {
            std::thread::sleep(READER_POLL_INTERVAL);
        }
        take_lines(&self.state)
    }
}

fn take_lines(state: &Mutex<CaptureState>) -> String {
    let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
    state.capturing = false;
    std::mem::take(&mut state.lines).join("\n")
}
