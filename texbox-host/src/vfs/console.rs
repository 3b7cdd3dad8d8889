//! Line-buffered console output
//!
//! Text printed to the terminal is held until a line feed arrives; complete
//! lines go to the session transcript and, when enabled, to the host log.

/// Console buffer for one session
#[derive(Debug, Default)]
pub struct Console {
    pending: String,
    transcript: Vec<String>,
    echo: bool,
}

impl Console {
    pub fn new(echo: bool) -> Self {
        Self {
            echo,
            ..Default::default()
        }
    }

    /// Append text; complete lines are emitted, the last partial line is kept
    pub fn write(&mut self, text: &str) {
        self.pending.push_str(text);
        if !self.pending.contains('\n') {
            return;
        }

        let pending = std::mem::take(&mut self.pending);
        let mut lines: Vec<&str> = pending.split('\n').collect();
        self.pending = lines.pop().unwrap_or_default().to_string();

        for line in lines.into_iter().filter(|line| !line.is_empty()) {
            if self.echo {
                tracing::info!(target: "texbox::console", "{}", line);
            }
            self.transcript.push(line.to_string());
        }
    }

    /// Terminate a pending partial line
    pub fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.write("\n");
        }
    }

    /// Lines emitted so far
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn take_transcript(&mut self) -> Vec<String> {
        std::mem::take(&mut self.transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffers_until_newline() {
        let mut console = Console::new(false);
        console.write("This is ");
        assert!(console.transcript().is_empty());

        console.write("TeX\n(input.tex");
        assert_eq!(console.transcript(), ["This is TeX"]);

        console.flush();
        assert_eq!(console.transcript(), ["This is TeX", "(input.tex"]);
    }

    #[test]
    fn test_skips_empty_lines() {
        let mut console = Console::new(false);
        console.write("\n\na\n\nb\n");
        assert_eq!(console.transcript(), ["a", "b"]);

        console.flush();
        assert_eq!(console.transcript().len(), 2);
    }
}
