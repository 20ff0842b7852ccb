use std::io::{BufWriter, Write};

/// Where one stream of the emitter ends up.
enum Sink {
    Buffer(Vec<u8>),
    Stream(BufWriter<Box<dyn Write>>),
}

impl Sink {
    fn write(&mut self, msg: &str) {
        let written = match self {
            Sink::Buffer(buffer) => buffer.write_all(msg.as_bytes()),
            Sink::Stream(stream) => stream.write_all(msg.as_bytes()),
        };
        written.expect("Failed to write diagnostics.");
    }

    fn contents(&self) -> Option<String> {
        match self {
            Sink::Buffer(buffer) => Some(String::from_utf8_lossy(buffer).into_owned()),
            Sink::Stream(_) => None,
        }
    }

    fn flush(&mut self) {
        if let Sink::Stream(stream) = self {
            stream.flush().expect("Failed to flush diagnostics.");
        }
    }
}

/// Buffered writers for the regular output and the diagnostics. Tests log
/// to in-memory buffers and inspect them afterwards.
pub struct DiagnosticEmitter {
    out: Sink,
    err: Sink,
    errors: usize,
    warnings: usize,
}

impl DiagnosticEmitter {
    pub fn new(out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        Self::with_sinks(
            Sink::Stream(BufWriter::new(out)),
            Sink::Stream(BufWriter::new(err)),
        )
    }

    pub fn log_to_buffer() -> Self {
        Self::with_sinks(Sink::Buffer(Vec::new()), Sink::Buffer(Vec::new()))
    }

    fn with_sinks(out: Sink, err: Sink) -> Self {
        Self {
            out,
            err,
            errors: 0,
            warnings: 0,
        }
    }

    pub fn out(&mut self, msg: &str) {
        self.out.write(msg);
    }

    pub fn out_ln(&mut self, msg: &str) {
        self.out(msg);
        self.out("\n");
    }

    pub fn err(&mut self, msg: &str) {
        self.err.write(msg);
    }

    pub fn err_ln(&mut self, msg: &str) {
        self.err(msg);
        self.err("\n");
    }

    /// `None` unless the emitter logs to buffers.
    pub fn out_buffer(&self) -> Option<String> {
        self.out.contents()
    }

    pub fn err_buffer(&self) -> Option<String> {
        self.err.contents()
    }

    pub fn error(&mut self, message: &str) {
        self.errors += 1;
        self.err_ln(&format!("error: {message}"));
    }

    pub fn warning(&mut self, message: &str) {
        self.warnings += 1;
        self.err_ln(&format!("warning: {message}"));
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn flush(&mut self) {
        self.out.flush();
        self.err.flush();
    }
}

impl Drop for DiagnosticEmitter {
    fn drop(&mut self) {
        self.flush();
    }
}
