//! Session management
//!
//! A session is a single run of an executable. It owns a timestamped directory holding the log
//! file and any data saved during the run, such as the local plan of each control cycle. Saving
//! happens on a background thread so that control cycles never wait on the disk.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use erased_serde::Serialize;
use log::{debug, warn};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use thiserror::Error;

// Internal imports
use crate::time;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<DateTime<Utc>> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// chrono format of the timestamp in session directory names.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// How long the writer waits for new data before checking whether it should stop.
const WRITER_POLL_PERIOD: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Data queued for writing, with its session-relative path.
type SaveRequest = (PathBuf, Box<dyn Serialize + Send>);

/// The current session
pub struct Session {
    /// The root directory for this session
    pub session_root: PathBuf,

    /// The path to the session's log file
    pub log_file_path: PathBuf,

    writer: Writer,
}

/// Background thread writing saved data into the session directory.
struct Writer {
    sender: Sender<SaveRequest>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable ({}) is not set", crate::host::SW_ROOT_ENV_VAR)]
    SwRootNotSet,

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(io::Error),

    #[error("Cannot start the session writer thread: {0}")]
    CannotSpawnWriter(io::Error),

    #[error("A session has already been started in this process")]
    AlreadyStarted,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {
    /// Start a new session.
    ///
    /// Creates the directory `$RSBAND_SW_ROOT/{sessions_dir}/{exec_name}_{timestamp}`. Only one
    /// session may be started per process, as the session start is the epoch of all log
    /// timestamps.
    pub fn new(exec_name: &str, sessions_dir: &str) -> Result<Self, SessionError> {
        let epoch = Utc::now();
        SESSION_EPOCH
            .try_init_once(|| epoch)
            .map_err(|_| SessionError::AlreadyStarted)?;

        let session_root = crate::host::get_sw_root()
            .map_err(|_| SessionError::SwRootNotSet)?
            .join(sessions_dir)
            .join(format!("{}_{}", exec_name, epoch.format(TIMESTAMP_FORMAT)));

        fs::create_dir_all(&session_root).map_err(SessionError::CannotCreateDir)?;

        Ok(Session {
            log_file_path: session_root.join(format!("{}.log", exec_name)),
            writer: Writer::spawn(session_root.clone()).map_err(SessionError::CannotSpawnWriter)?,
            session_root,
        })
    }

    /// Save `data` as JSON at the session-relative `path`.
    ///
    /// Writing happens in the background, failures are logged rather than returned. Paths must
    /// have the `json` extension.
    pub fn save<P, T>(&self, path: P, data: T)
    where
        P: AsRef<Path>,
        T: serde::Serialize + Send + 'static,
    {
        let path = path.as_ref();

        if let Err(e) = self.writer.sender.send((path.to_path_buf(), Box::new(data))) {
            warn!("Could not queue {:?} for saving: {}", path, e);
        }
    }

    /// End the session, waiting until all queued data has been written.
    pub fn exit(mut self) {
        debug!("Waiting for the session writer to finish");
        self.writer.finish();
    }
}

impl Writer {
    fn spawn(session_root: PathBuf) -> io::Result<Self> {
        let (sender, receiver) = channel();
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("session_writer".into())
            .spawn(move || write_loop(&session_root, &receiver, &thread_stop))?;

        Ok(Self {
            sender,
            stop,
            handle: Some(handle),
        })
    }

    fn finish(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("The session writer thread panicked, some data may not have been saved");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Seconds elapsed since the session started, or `NAN` if no session has been started.
pub fn get_elapsed_seconds() -> f64 {
    SESSION_EPOCH
        .get()
        .and_then(|epoch| time::duration_to_seconds(Utc::now() - *epoch))
        .unwrap_or(std::f64::NAN)
}

/// The time the session started, if one has been started.
pub fn get_epoch() -> Option<&'static DateTime<Utc>> {
    SESSION_EPOCH.get()
}

// -----------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn write_loop(session_root: &Path, receiver: &Receiver<SaveRequest>, stop: &AtomicBool) {
    loop {
        match receiver.recv_timeout(WRITER_POLL_PERIOD) {
            Ok((path, data)) => {
                let full_path = session_root.join(path);
                if let Err(e) = write_json(&full_path, data.as_ref()) {
                    warn!("Could not save {:?}: {}", full_path, e);
                }
            }
            // The queue is empty, so it is safe to stop
            Err(RecvTimeoutError::Timeout) if stop.load(Ordering::Relaxed) => break,
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn write_json(full_path: &Path, data: &(dyn Serialize + Send)) -> io::Result<()> {
    if full_path.extension().and_then(|e| e.to_str()) != Some("json") {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "only .json paths can be saved",
        ));
    }

    if let Some(parent) = full_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = File::create(full_path)?;
    serde_json::to_writer_pretty(&file, data).map_err(io::Error::from)
}
