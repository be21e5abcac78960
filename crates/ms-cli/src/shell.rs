//! Interactive `remote>` loop
//!
//! Reads one line at a time, handles the local directives (`exit`, `quit`,
//! `clear`, `help`) and sends everything else to the server as an argv.
//! Only one command is in flight at a time: the loop waits for its response
//! (or the timeout) before reading the next line.

use std::io::Write;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::correlator::{ClientError, Correlator};
use crate::output::format_response;

/// Prompt shown before each line is read
pub const PROMPT: &str = "remote> ";

const HELP_TEXT: &str = "\
Secure MQTT Shell - Help
===========================

Commands are executed on the remote system.

Examples:
  docker ps                    - List containers
  docker port webserver        - Show port mappings
  netstat -tulpn | grep 9080   - Check if port is listening
  curl http://localhost:9080   - Test local access
  ip addr show                 - Show network interfaces
  ps aux                       - List processes
  free -m                      - Show memory usage
  df -h                        - Show disk usage

Shell Special commands:
  exit, quit   - Exit remote shell
  clear        - Clear screen
  help         - Show this help
";

/// Greeting shown once the client is connected
pub fn banner() -> String {
    format!(
        "Secure MQTT Shell v{}\n================================\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Short list of local directives shown at startup
pub fn directives_summary() -> &'static str {
    "Type commands to execute on remote system.\n\
     Special commands:\n  \
     exit, quit    - Exit the shell\n  \
     clear         - Clear screen\n  \
     help          - Show help\n"
}

/// Full help text for the `help` directive
pub fn help_text() -> &'static str {
    HELP_TEXT
}

/// One line of user input, classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Blank line or nothing left after parsing
    Empty,
    /// `exit` or `quit`
    Exit,
    /// `clear`
    Clear,
    /// `help`
    Help,
    /// A command to run remotely
    Command(Vec<String>),
}

impl Input {
    /// Classify a raw input line
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Input::Empty,
            "exit" | "quit" => Input::Exit,
            "clear" => Input::Clear,
            "help" => Input::Help,
            other => {
                let argv = parse_command(other);
                if argv.is_empty() {
                    Input::Empty
                } else {
                    Input::Command(argv)
                }
            }
        }
    }
}

/// Split a line into arguments.
///
/// Whitespace separates arguments outside quotes. A single or double quote
/// opens a group that ends at the matching quote; the other quote character
/// is literal inside it. There are no escapes, and an unmatched quote runs to
/// the end of the line. Empty groups produce no argument.
pub fn parse_command(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => quote = Some(c),
            (None, c) if c.is_whitespace() => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Line-driven client session over a correlator
pub struct InteractiveShell {
    correlator: Correlator,
    response_timeout: Duration,
}

impl InteractiveShell {
    /// Create a shell that waits up to `response_timeout` per command
    pub fn new(correlator: Correlator, response_timeout: Duration) -> Self {
        Self {
            correlator,
            response_timeout,
        }
    }

    /// Run until `exit`/`quit` or end of input.
    ///
    /// Only I/O errors on `input` or `out` end the loop early; send and
    /// receive failures are reported and the loop continues.
    pub async fn run<R, W>(&mut self, mut input: R, out: &mut W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut line = String::new();
        loop {
            write!(out, "\n{}", PROMPT)?;
            out.flush()?;

            line.clear();
            if input.read_line(&mut line).await? == 0 {
                writeln!(out)?;
                return Ok(());
            }

            match Input::parse(&line) {
                Input::Empty => continue,
                Input::Exit => {
                    writeln!(out, "Goodbye!")?;
                    return Ok(());
                }
                Input::Clear => clear_screen(out)?,
                Input::Help => write!(out, "\n{}", help_text())?,
                Input::Command(argv) => self.execute(argv, out).await?,
            }
        }
    }

    async fn execute<W: Write>(&mut self, argv: Vec<String>, out: &mut W) -> std::io::Result<()> {
        tracing::debug!("Sending command: {:?}", argv);
        if let Err(e) = self.correlator.send(argv).await {
            writeln!(out, "Error sending command: {}", e)?;
            return Ok(());
        }

        writeln!(out, "Waiting for response...")?;
        out.flush()?;

        match self.correlator.await_reply(self.response_timeout).await {
            Ok(response) => write!(out, "{}", format_response(&response)),
            Err(ClientError::Timeout(_)) => {
                writeln!(out, "Response timeout - server may be offline")
            }
            Err(e) => writeln!(out, "Error receiving response: {}", e),
        }
    }
}

fn clear_screen<W: Write>(out: &mut W) -> std::io::Result<()> {
    use crossterm::cursor::MoveTo;
    use crossterm::terminal::{Clear, ClearType};

    crossterm::execute!(out, MoveTo(0, 0), Clear(ClearType::All))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_plain_words() {
        assert_eq!(parse_command("ls -la /tmp"), argv(&["ls", "-la", "/tmp"]));
    }

    #[test]
    fn test_parse_collapses_whitespace() {
        assert_eq!(parse_command("  ps   aux  "), argv(&["ps", "aux"]));
    }

    #[test]
    fn test_parse_double_quotes() {
        assert_eq!(
            parse_command(r#"echo "hello world" done"#),
            argv(&["echo", "hello world", "done"])
        );
    }

    #[test]
    fn test_parse_single_quotes_keep_double() {
        assert_eq!(
            parse_command(r#"echo 'say "hi"'"#),
            argv(&["echo", r#"say "hi""#])
        );
    }

    #[test]
    fn test_parse_quote_joins_adjacent_text() {
        assert_eq!(parse_command(r#"a"b c"d"#), argv(&["ab cd"]));
    }

    #[test]
    fn test_parse_unmatched_quote_runs_to_end() {
        assert_eq!(
            parse_command("echo 'unterminated text"),
            argv(&["echo", "unterminated text"])
        );
    }

    #[test]
    fn test_parse_empty_quotes_produce_nothing() {
        assert_eq!(parse_command(r#"echo """#), argv(&["echo"]));
        assert!(parse_command("''").is_empty());
    }

    #[test]
    fn test_parse_no_shell_semantics() {
        assert_eq!(
            parse_command("netstat -tulpn | grep 9080"),
            argv(&["netstat", "-tulpn", "|", "grep", "9080"])
        );
    }

    #[test]
    fn test_input_directives() {
        assert_eq!(Input::parse("exit\n"), Input::Exit);
        assert_eq!(Input::parse("  quit "), Input::Exit);
        assert_eq!(Input::parse("clear"), Input::Clear);
        assert_eq!(Input::parse("help"), Input::Help);
        assert_eq!(Input::parse("   \n"), Input::Empty);
        assert_eq!(Input::parse("\"\""), Input::Empty);
        assert_eq!(Input::parse("exit now"), Input::Command(argv(&["exit", "now"])));
    }

    #[test]
    fn test_help_lists_examples() {
        let help = help_text();
        assert!(help.contains("docker ps"));
        assert!(help.contains("df -h"));
        assert!(help.contains("exit, quit"));
    }

    #[test]
    fn test_banner_has_version() {
        assert!(banner().starts_with(&format!(
            "Secure MQTT Shell v{}",
            env!("CARGO_PKG_VERSION")
        )));
    }
}
