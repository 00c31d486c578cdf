use std::io::{self, IsTerminal, Read};

/// A request body read from STDIN
pub struct InputBody {
    pub bytes: usize,
    pub content: String,
}

impl InputBody {
    pub fn empty() -> Self {
        Self {
            bytes: 0,
            content: String::new(),
        }
    }
}

pub struct InputCollector;

impl InputCollector {
    pub fn stdin_is_terminal() -> bool {
        io::stdin().is_terminal()
    }

    pub fn collect() -> Result<InputBody, io::Error> {
        Self::collect_from(io::stdin())
    }

    pub fn collect_from(mut reader: impl Read) -> Result<InputBody, io::Error> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        Ok(InputBody {
            bytes: content.len(),
            content,
        })
    }
}
