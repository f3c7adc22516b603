//! Output seam between evaluated code and the host.
//!
//! Everything user-visible that is not an error goes through a sink:
//! `print`, expression echoes, and inspection query results. Tests swap
//! in a buffer; the binary uses stdout.

use std::cell::RefCell;
use std::rc::Rc;

/// Line-oriented sink: each `emit` is one line of session output.
pub trait OutputSink {
    fn emit(&mut self, text: &str);
}

/// Cloneable handle to a shared sink.
#[derive(Clone)]
pub struct SharedOutput {
    sink: Rc<RefCell<dyn OutputSink>>,
}

impl SharedOutput {
    pub fn new(sink: impl OutputSink + 'static) -> Self {
        Self {
            sink: Rc::new(RefCell::new(sink)),
        }
    }

    pub fn emit(&self, text: &str) {
        self.sink.borrow_mut().emit(text);
    }
}

pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&mut self, text: &str) {
        println!("{}", text);
    }
}

/// Captures output for assertions. Clones share the same storage, so a
/// test can keep one handle and give another to the pipeline.
#[derive(Clone, Default)]
pub struct OutputBuffer {
    lines: Rc<RefCell<Vec<String>>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn contents(&self) -> String {
        self.lines.borrow().join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.lines.borrow_mut().clear();
    }
}

impl OutputSink for OutputBuffer {
    fn emit(&mut self, text: &str) {
        self.lines.borrow_mut().push(text.to_string());
    }
}
