use std::cell::RefCell;
use std::rc::Rc;

/// Destination for `print` output. Tests capture lines instead of writing
/// to the process's stdout.
#[derive(Debug, Clone)]
pub enum Printer {
    Stdout,
    Capture(Rc<RefCell<Vec<String>>>),
}

impl Printer {
    pub fn capture() -> (Self, Rc<RefCell<Vec<String>>>) {
        let lines = Rc::new(RefCell::new(Vec::new()));
        (Printer::Capture(Rc::clone(&lines)), lines)
    }

    pub fn println(&self, line: String) {
        match self {
            Printer::Stdout => println!("{line}"),
            Printer::Capture(lines) => lines.borrow_mut().push(line),
        }
    }
}

impl Default for Printer {
    fn default() -> Self {
        Printer::Stdout
    }
}
