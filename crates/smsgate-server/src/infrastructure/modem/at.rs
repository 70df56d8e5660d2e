//! AT-command modem driver (GSM 07.05 PDU mode).
//!
//! The device node is opened as a plain file after the line has been
//! configured with the platform's `stty`/`mode` tool.  A reader thread turns
//! the byte stream into [`ModemLine`]s and hands them to the sending thread
//! over a channel, so every wait for a response is a `recv_timeout`.
//!
//! Send sequence for one unit:
//!
//! ```text
//! → AT+CMGS=<tpdu_len>\r
//! ← >
//! → <pdu hex><Ctrl-Z>
//! ← +CMGS: <mr>
//! ← OK                     (or ERROR / +CMS ERROR: <n>)
//! ```

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use smsgate_core::OutgoingPdu;
use tracing::{debug, info, warn};

use crate::application::driver::{
    DriverError, DriverNotification, DriverSubscription, HandlerList, ModemDriver,
    NotificationHandler, PortSettings,
};

/// Ctrl-Z terminates the PDU after the `>` prompt.
const CTRL_Z: u8 = 0x1A;
/// Networks can take a long time to acknowledge a submit.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);
/// An empty read faster than this did not wait for the `VTIME` tick.
const INSTANT_READ: Duration = Duration::from_millis(20);
/// Consecutive instant empty reads that mean the line has hung up.
const HANGUP_EMPTY_READS: u32 = 3;
/// How long `close` waits for the reader thread before detaching it.
const READER_STOP_GRACE: Duration = Duration::from_millis(500);

/// One unit of modem output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemLine {
    /// The `> ` prompt that asks for the PDU body.
    Prompt,
    /// A complete non-empty response line.
    Text(String),
}

/// Final result codes recognised in modem output.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FinalResult {
    Ok,
    Error(String),
}

fn final_result(line: &str) -> Option<FinalResult> {
    if line == "OK" {
        Some(FinalResult::Ok)
    } else if line == "ERROR" || line.starts_with("+CMS ERROR") || line.starts_with("+CME ERROR")
    {
        Some(FinalResult::Error(line.to_string()))
    } else {
        None
    }
}

/// Splits raw modem output into [`ModemLine`]s.
///
/// The prompt is not newline-terminated, so it is recognised as soon as the
/// pending buffer consists of `>` optionally followed by a space.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ModemLine> {
        let mut out = Vec::new();
        for &b in bytes {
            match b {
                b'\n' | b'\r' => {
                    let text = String::from_utf8_lossy(&self.pending).trim().to_string();
                    self.pending.clear();
                    if !text.is_empty() {
                        out.push(ModemLine::Text(text));
                    }
                }
                _ => self.pending.push(b),
            }
            if self.pending == b"> " {
                self.pending.clear();
                out.push(ModemLine::Prompt);
            }
        }
        if self.pending == b">" {
            self.pending.clear();
            out.push(ModemLine::Prompt);
        }
        out
    }
}

/// Arguments for the platform line-configuration tool.
fn line_setup_command(port: &str, baud_rate: u32) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "windows") {
        (
            "mode",
            vec![
                port.to_string(),
                format!("BAUD={baud_rate}"),
                "PARITY=n".to_string(),
                "DATA=8".to_string(),
                "STOP=1".to_string(),
            ],
        )
    } else {
        let device_flag = if cfg!(target_os = "macos") { "-f" } else { "-F" };
        (
            "stty",
            vec![
                device_flag.to_string(),
                port.to_string(),
                baud_rate.to_string(),
                "raw".to_string(),
                "-echo".to_string(),
                "min".to_string(),
                "0".to_string(),
                "time".to_string(),
                "1".to_string(),
            ],
        )
    }
}

fn device_path(port: &str) -> String {
    if cfg!(target_os = "windows") && !port.starts_with(r"\\.\") {
        format!(r"\\.\{port}")
    } else {
        port.to_string()
    }
}

/// Tells a `VTIME` poll tick apart from the end of the stream.
///
/// With `VMIN=0 VTIME=1` an idle line returns an empty read after 100 ms.
/// After a hangup the tty returns empty reads immediately, forever.
#[derive(Debug, Default)]
struct HangupDetector {
    instant_empty_reads: u32,
}

impl HangupDetector {
    /// Records an empty read that took `elapsed`.  Returns `true` once the
    /// line should be treated as closed.
    fn empty_read(&mut self, elapsed: Duration) -> bool {
        if elapsed < INSTANT_READ {
            self.instant_empty_reads += 1;
        } else {
            self.instant_empty_reads = 0;
        }
        self.instant_empty_reads >= HANGUP_EMPTY_READS
    }

    fn data_read(&mut self) {
        self.instant_empty_reads = 0;
    }
}

/// The reader thread together with the channel that disconnects when it exits.
struct ReaderThread {
    handle: JoinHandle<()>,
    exited: Receiver<()>,
}

impl ReaderThread {
    /// Joins the thread if it exits within `grace`.  A thread stuck in a
    /// blocking read is detached instead; returns `false` in that case.
    fn stop_within(self, grace: Duration) -> bool {
        match self.exited.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    warn!("modem reader thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

struct OpenPort {
    name: String,
    writer: File,
    lines: Receiver<ModemLine>,
    running: Arc<AtomicBool>,
    reader: Option<ReaderThread>,
    timeout: Duration,
}

impl OpenPort {
    fn write(&mut self, bytes: &[u8]) -> Result<(), DriverError> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Discards anything the modem said since the last command.
    fn drain(&self) {
        while let Ok(line) = self.lines.try_recv() {
            debug!(?line, "discarding unsolicited modem output");
        }
    }

    fn next_line(&self, deadline: Instant, expected: &str) -> Result<ModemLine, DriverError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.lines.recv_timeout(remaining) {
            Ok(line) => Ok(line),
            Err(RecvTimeoutError::Timeout) => Err(DriverError::Timeout {
                expected: expected.to_string(),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(DriverError::Rejected(
                "modem reader stopped".to_string(),
            )),
        }
    }

    /// Waits for `OK`, failing on an error result code.
    fn expect_ok(&self, timeout: Duration, expected: &str) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let ModemLine::Text(text) = self.next_line(deadline, expected)? {
                match final_result(&text) {
                    Some(FinalResult::Ok) => return Ok(()),
                    Some(FinalResult::Error(e)) => return Err(DriverError::Rejected(e)),
                    None => debug!(line = %text, "modem"),
                }
            }
        }
    }

    fn expect_prompt(&self) -> Result<(), DriverError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.next_line(deadline, "PDU prompt")? {
                ModemLine::Prompt => return Ok(()),
                ModemLine::Text(text) => {
                    if let Some(FinalResult::Error(e)) = final_result(&text) {
                        return Err(DriverError::Rejected(e));
                    }
                }
            }
        }
    }

    fn command(&mut self, command: &str) -> Result<(), DriverError> {
        self.drain();
        self.write(format!("{command}\r").as_bytes())?;
        self.expect_ok(self.timeout, command)
    }

    fn submit(&mut self, pdu: &OutgoingPdu) -> Result<(), DriverError> {
        self.drain();
        self.write(format!("AT+CMGS={}\r", pdu.tpdu_len()).as_bytes())?;
        self.expect_prompt()?;

        let mut body = pdu.to_hex().into_bytes();
        body.push(CTRL_Z);
        self.write(&body)?;
        self.expect_ok(SUBMIT_TIMEOUT, "+CMGS acknowledgement")
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            if !reader.stop_within(READER_STOP_GRACE) {
                warn!(port = %self.name, "modem reader blocked in read, detaching it");
            }
        }
    }
}

fn reader_loop(mut file: File, tx: Sender<ModemLine>, running: Arc<AtomicBool>) {
    let mut splitter = LineSplitter::default();
    let mut hangup = HangupDetector::default();
    let mut buf = [0u8; 256];
    while running.load(Ordering::Relaxed) {
        let started = Instant::now();
        match file.read(&mut buf) {
            Ok(0) => {
                if hangup.empty_read(started.elapsed()) {
                    warn!("modem line hung up");
                    return;
                }
            }
            Ok(n) => {
                hangup.data_read();
                for line in splitter.feed(&buf[..n]) {
                    if tx.send(line).is_err() {
                        return;
                    }
                }
            }
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                warn!(error = %e, "modem read failed");
                return;
            }
        }
    }
}

fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
    )
}

/// [`ModemDriver`] speaking AT commands to a serial GSM modem.
#[derive(Default)]
pub struct AtModem {
    handlers: HandlerList,
    port: Option<OpenPort>,
}

impl AtModem {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_port(settings: &PortSettings) -> Result<OpenPort, String> {
        let (tool, args) = line_setup_command(&settings.port, settings.baud_rate);
        let status = Command::new(tool)
            .args(&args)
            .status()
            .map_err(|e| format!("cannot run {tool}: {e}"))?;
        if !status.success() {
            return Err(format!("{tool} exited with {status}"));
        }

        let path = device_path(&settings.port);
        let writer = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| format!("cannot open {path}: {e}"))?;
        let reader_file = writer
            .try_clone()
            .map_err(|e| format!("cannot clone handle: {e}"))?;

        let (tx, lines) = mpsc::channel();
        let (exit_signal, exited) = mpsc::channel::<()>();
        let running = Arc::new(AtomicBool::new(true));
        let reader_running = Arc::clone(&running);
        let handle = std::thread::Builder::new()
            .name("smsgate-modem-reader".to_string())
            .spawn(move || {
                let _exit_signal = exit_signal;
                reader_loop(reader_file, tx, reader_running);
            })
            .map_err(|e| format!("cannot spawn reader: {e}"))?;
        let reader = ReaderThread { handle, exited };

        let mut port = OpenPort {
            name: settings.port.clone(),
            writer,
            lines,
            running,
            reader: Some(reader),
            timeout: settings.timeout,
        };

        let init = port
            .command("ATE0")
            .and_then(|()| port.command("AT+CMGF=0"));
        if let Err(e) = init {
            port.shutdown();
            return Err(format!("modem initialisation failed: {e}"));
        }
        Ok(port)
    }
}

impl ModemDriver for AtModem {
    fn subscribe(&mut self, handler: NotificationHandler) -> DriverSubscription {
        self.handlers.add(handler)
    }

    fn unsubscribe(&mut self, subscription: DriverSubscription) -> bool {
        self.handlers.remove(subscription)
    }

    fn open(&mut self, settings: &PortSettings) -> Result<(), DriverError> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = Self::open_port(settings).map_err(|reason| DriverError::Open {
            port: settings.port.clone(),
            reason,
        })?;
        info!(port = %settings.port, baud = settings.baud_rate, "AT modem ready");
        self.port = Some(port);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if let Some(mut port) = self.port.take() {
            port.shutdown();
            info!(port = %port.name, "AT modem closed");
        }
        Ok(())
    }

    fn send(&mut self, pdu: &OutgoingPdu) -> Result<(), DriverError> {
        let port = self.port.as_mut().ok_or(DriverError::NotOpen)?;
        let reference = pdu.reference;

        self.handlers.raise(&DriverNotification::Starting { reference });
        match port.submit(pdu) {
            Ok(()) => {
                self.handlers.raise(&DriverNotification::Complete { reference });
                Ok(())
            }
            Err(e) => {
                self.handlers.raise(&DriverNotification::Failed {
                    reference,
                    cause: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

impl Drop for AtModem {
    fn drop(&mut self) {
        if let Some(port) = self.port.as_mut() {
            port.shutdown();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
