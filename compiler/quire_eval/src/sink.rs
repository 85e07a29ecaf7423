//! Output sinks.
//!
//! Everything a render produces as visible text goes through a [`Sink`],
//! never through the traversal accumulator, and in document order:
//! - `Stdout`: writes straight to stdout
//! - `Buffer`: captures into a string (tests, `render_to_string`)
//! - `Writer`: any `io::Write` owned by the host
//! - `Silent`: discards output
//!
//! Enum dispatch rather than a trait object: the write path runs once per
//! text node.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::{output_failed, RenderResult};

/// Sink that captures output to a buffer.
#[derive(Default)]
pub struct BufferSink {
    buffer: Mutex<String>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, text: &str) {
        self.buffer.lock().push_str(text);
    }

    pub fn output(&self) -> String {
        self.buffer.lock().clone()
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

/// Sink over a host-supplied writer.
pub struct WriterSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl WriterSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        WriterSink {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    pub fn write(&self, text: &str) -> io::Result<()> {
        self.writer.lock().write_all(text.as_bytes())
    }

    pub fn flush(&self) -> io::Result<()> {
        self.writer.lock().flush()
    }
}

/// Output destination of a render.
pub enum Sink {
    Stdout,
    Buffer(BufferSink),
    Writer(WriterSink),
    Silent,
}

impl Sink {
    pub fn buffer() -> Self {
        Sink::Buffer(BufferSink::new())
    }

    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Sink::Writer(WriterSink::new(writer))
    }

    /// Append `text` to the output.
    pub fn write(&self, text: &str) -> RenderResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        match self {
            Sink::Stdout => io::stdout()
                .lock()
                .write_all(text.as_bytes())
                .map_err(|e| output_failed(&e)),
            Sink::Buffer(b) => {
                b.write(text);
                Ok(())
            }
            Sink::Writer(w) => w.write(text).map_err(|e| output_failed(&e)),
            Sink::Silent => Ok(()),
        }
    }

    pub fn flush(&self) -> RenderResult<()> {
        match self {
            Sink::Stdout => io::stdout().flush().map_err(|e| output_failed(&e)),
            Sink::Writer(w) => w.flush().map_err(|e| output_failed(&e)),
            Sink::Buffer(_) | Sink::Silent => Ok(()),
        }
    }

    /// Captured output. Empty for sinks that do not capture.
    pub fn output(&self) -> String {
        match self {
            Sink::Buffer(b) => b.output(),
            Sink::Stdout | Sink::Writer(_) | Sink::Silent => String::new(),
        }
    }

    pub fn clear(&self) {
        if let Sink::Buffer(b) = self {
            b.clear();
        }
    }
}

/// Sink shared between the host and a render.
pub type SharedSink = Arc<Sink>;

pub fn stdout_sink() -> SharedSink {
    Arc::new(Sink::Stdout)
}

pub fn buffer_sink() -> SharedSink {
    Arc::new(Sink::buffer())
}
