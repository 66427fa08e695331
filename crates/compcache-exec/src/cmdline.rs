//! Argument vector rendering.
//!
//! [`win32_command_string`] produces a command line that the Microsoft C
//! runtime (`CommandLineToArgvW` rules) splits back into the original
//! arguments. With `escape_backslashes` set it instead targets GCC-style
//! response files, where a backslash escapes the character after it.

use std::ffi::OsStr;
use std::path::Path;

/// Longest command line passed to process creation before spilling the
/// arguments into a response file.
pub const MAX_COMMAND_LINE_LENGTH: usize = 8192;

/// Joins arguments with spaces, quoting those that contain a space.
pub fn format_argv_for_logging<S: AsRef<OsStr>>(argv: &[S]) -> String {
    argv.iter()
        .map(|arg| {
            let arg = arg.as_ref().to_string_lossy();
            if arg.contains(' ') {
                format!("\"{}\"", arg)
            } else {
                arg.into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Renders `argv` as one Win32 command line, each argument double-quoted.
///
/// `prefix` (the shell interpreter, if any) is emitted verbatim in front.
pub fn win32_command_string<S: AsRef<str>>(
    argv: &[S],
    prefix: Option<&str>,
    escape_backslashes: bool,
) -> String {
    let mut result = String::new();
    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        result.push_str(prefix);
        result.push(' ');
    }

    for arg in argv {
        let mut backslashes = 0usize;
        result.push('"');
        for c in arg.as_ref().chars() {
            match c {
                '\\' if !escape_backslashes => {
                    backslashes += 1;
                    continue;
                }
                '\\' | '"' => backslashes = backslashes * 2 + 1,
                _ => {}
            }
            push_backslashes(&mut result, backslashes);
            backslashes = 0;
            result.push(c);
        }
        // Backslashes before the closing quote must be doubled.
        push_backslashes(&mut result, backslashes * 2);
        result.push_str("\" ");
    }

    result.pop();
    result
}

fn push_backslashes(out: &mut String, count: usize) {
    out.extend(std::iter::repeat('\\').take(count));
}

/// Appends `.exe` unless the path already names an `.exe`, `.bat` or `.sh`.
pub fn add_exe_suffix(path: &str) -> String {
    let extension = Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    match extension.as_deref() {
        Some("exe") | Some("bat") | Some("sh") => path.to_string(),
        _ => format!("{}.exe", path),
    }
}

/// Length as process creation counts it (UTF-16 units).
pub fn command_line_length(command_line: &str) -> usize {
    command_line.encode_utf16().count()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Splits a command line the way the MSVC runtime does.
    pub(crate) fn parse_win32_command_line(line: &str) -> Vec<String> {
        let chars: Vec<char> = line.chars().collect();
        let mut args = Vec::new();
        let mut i = 0;

        loop {
            while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
                i += 1;
            }
            if i >= chars.len() {
                return args;
            }

            let mut arg = String::new();
            let mut in_quotes = false;
            while i < chars.len() {
                let c = chars[i];
                if c == '\\' {
                    let start = i;
                    while i < chars.len() && chars[i] == '\\' {
                        i += 1;
                    }
                    let count = i - start;
                    if i < chars.len() && chars[i] == '"' {
                        arg.extend(std::iter::repeat('\\').take(count / 2));
                        if count % 2 == 1 {
                            arg.push('"');
                            i += 1;
                        }
                    } else {
                        arg.extend(std::iter::repeat('\\').take(count));
                    }
                    continue;
                }
                if c == '"' {
                    in_quotes = !in_quotes;
                    i += 1;
                    continue;
                }
                if !in_quotes && (c == ' ' || c == '\t') {
                    break;
                }
                arg.push(c);
                i += 1;
            }
            args.push(arg);
        }
    }

    /// Splits response-file text the way GCC's `@file` expansion does.
    pub(crate) fn parse_response_file(text: &str) -> Vec<String> {
        let mut args = Vec::new();
        let mut chars = text.chars().peekable();

        loop {
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            if chars.peek().is_none() {
                return args;
            }

            let mut arg = String::new();
            let mut quote: Option<char> = None;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            arg.push(escaped);
                        }
                    }
                    '"' | '\'' if quote == Some(c) => quote = None,
                    '"' | '\'' if quote.is_none() => quote = Some(c),
                    c if c.is_whitespace() && quote.is_none() => break,
                    c => arg.push(c),
                }
            }
            args.push(arg);
        }
    }

    const AWKWARD: &[&str] = &[
        "plain",
        "with space",
        "",
        "C:\\path\\to\\file.c",
        "trailing\\",
        "double trailing\\\\",
        "say \"hi\"",
        "\\\"already escaped\\\"",
        "-DSTR=\"a b\"",
        "tab\there",
    ];

    #[test]
    fn test_format_argv_for_logging() {
        let argv = ["/usr/bin/cc", "-c", "my file.c", "-o", "out.o"];
        assert_eq!(
            format_argv_for_logging(&argv),
            "/usr/bin/cc -c \"my file.c\" -o out.o"
        );
    }

    #[test]
    fn test_simple_command_string() {
        let argv = ["cl.exe", "/c", "foo.c"];
        assert_eq!(
            win32_command_string(&argv, None, false),
            r#""cl.exe" "/c" "foo.c""#
        );
    }

    #[test]
    fn test_prefix_is_unquoted() {
        let argv = ["build.sh", "x"];
        assert_eq!(
            win32_command_string(&argv, Some("C:\\msys\\bin\\sh.exe"), false),
            r#"C:\msys\bin\sh.exe "build.sh" "x""#
        );
    }

    #[test]
    fn test_backslash_rules() {
        assert_eq!(win32_command_string(&["a\\b"], None, false), r#""a\b""#);
        assert_eq!(win32_command_string(&["a\\"], None, false), r#""a\\""#);
        assert_eq!(win32_command_string(&["a\\\"b"], None, false), r#""a\\\"b""#);
        assert_eq!(win32_command_string(&["a\\b"], None, true), r#""a\\b""#);
    }

    #[test]
    fn test_command_line_round_trip() {
        let line = win32_command_string(AWKWARD, None, false);
        assert_eq!(parse_win32_command_line(&line), AWKWARD);
    }

    #[test]
    fn test_response_file_round_trip() {
        let text = win32_command_string(AWKWARD, None, true);
        assert_eq!(parse_response_file(&text), AWKWARD);
    }

    #[test]
    fn test_add_exe_suffix() {
        assert_eq!(add_exe_suffix("C:\\bin\\gcc"), "C:\\bin\\gcc.exe");
        assert_eq!(add_exe_suffix("C:\\bin\\gcc.exe"), "C:\\bin\\gcc.exe");
        assert_eq!(add_exe_suffix("C:\\bin\\GCC.EXE"), "C:\\bin\\GCC.EXE");
        assert_eq!(add_exe_suffix("build.bat"), "build.bat");
        assert_eq!(add_exe_suffix("configure.sh"), "configure.sh");
        assert_eq!(add_exe_suffix("clang-17.0"), "clang-17.0.exe");
    }

    #[test]
    fn test_command_line_length_counts_utf16_units() {
        assert_eq!(command_line_length("abc"), 3);
        assert_eq!(command_line_length("é"), 1);
        assert_eq!(command_line_length("𝄞"), 2);
    }
}
