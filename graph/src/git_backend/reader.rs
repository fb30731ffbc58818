use super::parser::RECORD_TERMINATOR;
use crate::error::{GraphError, Result};
use std::ffi::{OsStr, OsString};
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// A fully specified subprocess invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlumbingCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub workdir: PathBuf,
}

impl PlumbingCommand {
    pub fn new(program: impl Into<PathBuf>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: workdir.into(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }
}

struct CancelState {
    cancelled: AtomicBool,
    child: Mutex<Option<Child>>,
}

/// Cancels a running traversal from any thread. Cancelling kills the
/// subprocess; it does not just stop reading from it.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    fn new(child: Child) -> Self {
        Self {
            state: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                child: Mutex::new(Some(child)),
            }),
        }
    }

    pub fn cancel(&self) {
        if self.state.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut guard = self
            .state
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(child) = guard.as_mut() {
            if let Err(err) = child.kill() {
                // InvalidInput means the process already exited
                if err.kind() != io::ErrorKind::InvalidInput {
                    warn!(pid = child.id(), error = %err, "failed to kill history process");
                }
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Reap the child once its output is exhausted
    fn wait(&self) -> Option<io::Result<ExitStatus>> {
        let child = self
            .state
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        child.map(|mut child| child.wait())
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Streams NUL-terminated records out of a subprocess.
///
/// A background thread reads the pipe, decodes each record and pushes it
/// into a bounded channel; once `window` records are waiting the thread
/// blocks, and the pipe then blocks the subprocess. A non-zero exit is
/// delivered as the last item.
pub struct PlumbingReader<T> {
    receiver: Receiver<Result<T>>,
    token: CancelToken,
}

impl<T: Send + 'static> PlumbingReader<T> {
    pub fn spawn<F>(command: &PlumbingCommand, window: usize, decode: F) -> Result<Self>
    where
        F: FnMut(Vec<u8>) -> T + Send + 'static,
    {
        let program = command.program.display().to_string();
        if !command.workdir.is_dir() {
            return Err(GraphError::ProcessSpawn {
                program,
                source: io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("working directory {} does not exist", command.workdir.display()),
                ),
            });
        }

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GraphError::ProcessSpawn {
                program: program.clone(),
                source,
            })?;

        debug!(
            program = %program,
            args = ?command.args,
            cwd = %command.workdir.display(),
            pid = child.id(),
            "spawned history process"
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let token = CancelToken::new(child);

        let Some(stdout) = stdout else {
            token.cancel();
            return Err(GraphError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "history process has no stdout",
            )));
        };

        let stderr_thread = thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf);
            }
            buf
        });

        let (sender, receiver) = sync_channel(window.max(1));
        let pump_token = token.clone();
        let spawned = thread::Builder::new()
            .name("history-reader".to_string())
            .spawn(move || pump(stdout, sender, decode, pump_token, stderr_thread));
        if let Err(err) = spawned {
            token.cancel();
            return Err(GraphError::Io(err));
        }

        Ok(Self { receiver, token })
    }
}

impl<T> PlumbingReader<T> {
    /// Next record; `None` once the stream is over or was cancelled
    pub fn recv(&self) -> Option<Result<T>> {
        self.receiver.recv().ok()
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl<T> Drop for PlumbingReader<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn pump<T, F>(
    stdout: ChildStdout,
    sender: SyncSender<Result<T>>,
    mut decode: F,
    token: CancelToken,
    stderr_thread: JoinHandle<Vec<u8>>,
) where
    F: FnMut(Vec<u8>) -> T,
{
    let mut reader = BufReader::new(stdout);
    loop {
        let mut chunk = Vec::new();
        match reader.read_until(RECORD_TERMINATOR, &mut chunk) {
            Ok(0) => break,
            Ok(_) => {
                if chunk.last() == Some(&RECORD_TERMINATOR) {
                    chunk.pop();
                }
                if chunk.is_empty() {
                    continue;
                }
                if token.is_cancelled() {
                    break;
                }
                if sender.send(Ok(decode(chunk))).is_err() {
                    // consumer is gone
                    token.cancel();
                    break;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                if !token.is_cancelled() {
                    let _ = sender.send(Err(GraphError::Io(err)));
                    token.cancel();
                }
                break;
            }
        }
    }

    let status = token.wait();
    let stderr = stderr_thread.join().unwrap_or_default();
    if token.is_cancelled() {
        return;
    }

    match status {
        Some(Ok(status)) if status.success() => {}
        Some(Ok(status)) => {
            let _ = sender.send(Err(GraphError::ProcessExit {
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim_end().to_string(),
            }));
        }
        Some(Err(err)) => {
            let _ = sender.send(Err(GraphError::Io(err)));
        }
        None => {}
    }
}
