//! Level-triggered output lines

use alloc::boxed::Box;
use core::fmt;

/// A level-style output line (interrupt request)
///
/// The line keeps its current level so the owner and tests can inspect it.
/// A host interrupt controller can be connected to receive every level
/// change.
#[derive(Default)]
pub struct IrqLine {
    level: bool,
    sink: Option<Box<dyn FnMut(bool)>>,
}

impl IrqLine {
    /// Create a new line, initially low and unconnected
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a sink that is told about every level update
    pub fn connect<F>(&mut self, sink: F)
    where
        F: FnMut(bool) + 'static,
    {
        self.sink = Some(Box::new(sink));
    }

    /// Current line level
    pub fn level(&self) -> bool {
        self.level
    }

    /// Drive the line to the given level
    pub fn set(&mut self, level: bool) {
        self.level = level;
        if let Some(sink) = self.sink.as_mut() {
            sink(level);
        }
    }

    /// Drive the line high
    pub fn raise(&mut self) {
        self.set(true);
    }

    /// Drive the line low
    pub fn lower(&mut self) {
        self.set(false);
    }
}

impl fmt::Debug for IrqLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrqLine")
            .field("level", &self.level)
            .field("connected", &self.sink.is_some())
            .finish()
    }
}
