//! Output formatting utilities for the client
//!
//! Responses are rendered as plain text so they can be written to any sink;
//! the `print_*` helpers add a colored marker for status lines on the
//! terminal.

use chrono::Local;

use ms_protocol::Response;

/// Timestamp layout used when displaying a response
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render a response for display.
///
/// Output is framed by `---` lines and always ends with a newline before the
/// closing frame. Data fields that are absent are skipped.
pub fn format_response(response: &Response) -> String {
    let mut out = String::new();

    let status = if response.success { "Success" } else { "Failed" };
    out.push_str(&format!("\n{}: {}\n", status, response.message));

    if let Some(data) = &response.data {
        if let Some(command) = &data.command {
            out.push_str(&format!("\nCommand: {}\n", command));
        }

        if let Some(output) = &data.output {
            out.push_str("\nOutput:\n---\n");
            out.push_str(output);
            if !output.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("---\n");
        }

        if let Some(error) = &data.error {
            out.push_str(&format!("\nError: {}\n", error));
        }
    }

    out.push_str(&format!(
        "\nTime: {}\n",
        response.timestamp.with_timezone(&Local).format(TIME_FORMAT)
    ));
    out
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow
///
/// Outputs to stderr so it does not interleave with response text on stdout.
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ms_protocol::ResponseData;

    fn data(command: Option<&str>, output: Option<&str>, error: Option<&str>) -> ResponseData {
        ResponseData {
            command: command.map(String::from),
            output: output.map(String::from),
            error: error.map(String::from),
        }
    }

    #[test]
    fn test_format_success() {
        let response = Response::new(
            true,
            "Command executed successfully",
            Some(data(Some("echo hello"), Some("hello\n"), None)),
        );
        let text = format_response(&response);

        assert!(text.starts_with("\nSuccess: Command executed successfully\n"));
        assert!(text.contains("\nCommand: echo hello\n"));
        assert!(text.contains("\nOutput:\n---\nhello\n---\n"));
        assert!(!text.contains("Error:"));
        assert!(text.contains("\nTime: "));
    }

    #[test]
    fn test_output_gets_trailing_newline() {
        let response = Response::new(true, "ok", Some(data(None, Some("no newline"), None)));
        let text = format_response(&response);
        assert!(text.contains("---\nno newline\n---\n"));
    }

    #[test]
    fn test_format_failure_with_error() {
        let response = Response::new(
            false,
            "Command execution failed",
            Some(data(Some("false"), Some(""), Some("exit status 1"))),
        );
        let text = format_response(&response);

        assert!(text.starts_with("\nFailed: Command execution failed\n"));
        assert!(text.contains("\nError: exit status 1\n"));
    }

    #[test]
    fn test_format_without_data() {
        let text = format_response(&Response::failure("Decryption failed"));
        assert!(text.starts_with("\nFailed: Decryption failed\n"));
        assert!(!text.contains("Command:"));
        assert!(!text.contains("Output:"));
    }

    #[test]
    fn test_time_layout() {
        let text = format_response(&Response::failure("x"));
        let time = text
            .lines()
            .find_map(|line| line.strip_prefix("Time: "))
            .unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(time, TIME_FORMAT).is_ok());
    }
}
