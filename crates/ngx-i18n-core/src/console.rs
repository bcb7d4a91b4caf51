//! Line-atomic stdout/stderr sinks shared by the host and the core.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anstyle::{AnsiColor, Style};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Cloneable handle to the two output streams of one invocation.
///
/// Each message is written and flushed under the sink's lock, so lines from
/// concurrent writers never interleave.
#[derive(Clone)]
pub struct Console {
    stdout: Sink,
    stderr: Sink,
    stderr_emitted: Arc<AtomicBool>,
    color: bool,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("stderr_emitted", &self.stderr_emitted())
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

impl Console {
    pub fn new(stdout: impl Write + Send + 'static, stderr: impl Write + Send + 'static) -> Self {
        Self {
            stdout: Arc::new(Mutex::new(Box::new(stdout))),
            stderr: Arc::new(Mutex::new(Box::new(stderr))),
            stderr_emitted: Arc::new(AtomicBool::new(false)),
            color: false,
        }
    }

    /// The process streams.
    pub fn stdio(color: bool) -> Self {
        Self::new(io::stdout(), io::stderr()).with_color(color)
    }

    /// Two in-memory buffers, for tests and embedding.
    pub fn capture() -> (Self, CaptureBuffer, CaptureBuffer) {
        let out = CaptureBuffer::default();
        let err = CaptureBuffer::default();
        (Self::new(out.clone(), err.clone()), out, err)
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Write `text` plus a newline to stdout.
    pub fn out(&self, text: &str) {
        write_line(&self.stdout, text);
    }

    /// Write `text` plus a newline to stderr.
    pub fn err(&self, text: &str) {
        self.stderr_emitted.store(true, Ordering::SeqCst);
        write_line(&self.stderr, text);
    }

    pub fn warn(&self, text: &str) {
        let label = self.paint("[WARN]", Style::new().fg_color(Some(AnsiColor::Yellow.into())).bold());
        self.err(&format!("{label} {text}"));
    }

    pub fn error(&self, text: &str) {
        let label = self.paint("error:", Style::new().fg_color(Some(AnsiColor::Red.into())).bold());
        self.err(&format!("{label} {text}"));
    }

    pub fn stderr_emitted(&self) -> bool {
        self.stderr_emitted.load(Ordering::SeqCst)
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.color {
            format!("{}{text}{}", style.render(), style.render_reset())
        } else {
            text.to_string()
        }
    }
}

fn write_line(sink: &Sink, text: &str) {
    let mut guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
    let mut line = String::with_capacity(text.len() + 1);
    line.push_str(text);
    line.push('\n');
    // A closed pipe must not turn into a tool failure.
    let _ = guard.write_all(line.as_bytes()).and_then(|()| guard.flush());
}

/// Shared in-memory sink.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_and_stderr_flag() {
        let (console, out, err) = Console::capture();
        console.out("{\"a\": 1}");
        assert!(!console.stderr_emitted());

        console.err("[1/6]\tReading Angular project configuration");
        console.warn("placeholder missing");
        assert!(console.stderr_emitted());
        assert_eq!(out.contents(), "{\"a\": 1}\n");
        assert_eq!(
            err.contents(),
            "[1/6]\tReading Angular project configuration\n[WARN] placeholder missing\n"
        );
    }

    #[test]
    fn test_colored_warning() {
        let (console, _, err) = Console::capture();
        console.with_color(true).warn("x");
        let text = err.contents();
        assert!(text.starts_with("\u{1b}["));
        assert!(text.contains("[WARN]"));
        assert!(text.ends_with(" x\n"));
    }

    #[test]
    fn test_clones_share_state() {
        let (console, _, err) = Console::capture();
        let other = console.clone();
        other.error("boom");
        assert!(console.stderr_emitted());
        assert_eq!(err.contents(), "error: boom\n");
    }

    #[test]
    fn test_lines_stay_whole_across_threads() {
        let (console, _, err) = Console::capture();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let console = console.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        console.err(&format!("writer-{i}-line-with-some-length"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let text = err.contents();
        assert_eq!(text.lines().count(), 400);
        assert!(text
            .lines()
            .all(|l| l.starts_with("writer-") && l.ends_with("-line-with-some-length")));
    }
}
