//! Platform conventions for search paths, script wrappers and argument text.
//!
//! Everything here takes an explicit [`Platform`] instead of branching on
//! `cfg!` so the Windows rules can be exercised from any host.

use std::path::Path;

use super::EnvMap;

/// Extensions tried, in order, when a Windows lookup needs a runnable file.
const WINDOWS_EXTENSIONS: &[&str] = &[".cmd", ".bat", ".exe", ".com"];

/// Host conventions relevant to launching a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux, macOS and other Unix-likes.
    Unix,
    /// Windows.
    Windows,
}

impl Platform {
    /// The platform this binary was compiled for.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }

    /// Separator between `PATH` entries.
    #[must_use]
    pub const fn path_list_separator(self) -> char {
        match self {
            Self::Unix => ':',
            Self::Windows => ';',
        }
    }

    /// Extensions that make a bare name runnable, in lookup order.
    #[must_use]
    pub const fn executable_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Unix => &[],
            Self::Windows => WINDOWS_EXTENSIONS,
        }
    }

    /// Whether `name` already names a location rather than a bare command.
    #[must_use]
    pub fn has_path_component(self, name: &str) -> bool {
        Path::new(name).is_absolute()
            || name.contains('/')
            || (self == Self::Windows && name.contains('\\'))
    }

    /// Split a `PATH` value into its non-empty entries.
    #[must_use]
    pub fn split_path_list(self, value: &str) -> Vec<String> {
        value
            .split(self.path_list_separator())
            .filter(|entry| !entry.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Join entries back into a `PATH` value.
    #[must_use]
    pub fn join_path_list(self, entries: &[String]) -> String {
        entries.join(&self.path_list_separator().to_string())
    }

    /// Whether two `PATH` entries refer to the same directory.
    #[must_use]
    pub fn same_path_entry(self, a: &str, b: &str) -> bool {
        match self {
            Self::Unix => a == b,
            Self::Windows => a.eq_ignore_ascii_case(b),
        }
    }

    /// Make prompt text safe to pass as a single argument.
    ///
    /// Windows console tooling mangles raw control characters in arguments,
    /// so they are written as escape sequences there.
    #[must_use]
    pub fn escape_prompt(self, prompt: &str) -> String {
        match self {
            Self::Unix => prompt.to_owned(),
            Self::Windows => prompt
                .replace('\n', "\\n")
                .replace('\r', "\\r")
                .replace('\t', "\\t"),
        }
    }
}

/// Look up an environment variable, falling back to a case-insensitive match.
#[must_use]
pub fn env_lookup<'a>(env: &'a EnvMap, key: &str) -> Option<&'a str> {
    env.get(key)
        .or_else(|| {
            env.iter()
                .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
                .map(|(_, value)| value)
        })
        .map(String::as_str)
}

/// The key under which `PATH` is stored, preserving its existing spelling.
#[must_use]
pub fn path_key(env: &EnvMap) -> String {
    env.keys()
        .find(|key| key.eq_ignore_ascii_case("PATH"))
        .cloned()
        .unwrap_or_else(|| "PATH".to_owned())
}

/// Whether `path` is a batch script that needs `cmd.exe` to run.
#[must_use]
pub fn is_batch_script(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("cmd") || ext.eq_ignore_ascii_case("bat"))
}

/// Quote one argument for a `cmd.exe /s /c "…"` command line.
///
/// `%` and `^` are doubled first; arguments containing whitespace or cmd
/// metacharacters are wrapped in quotes with embedded quotes written as
/// `"^""`.
#[must_use]
pub fn quote_for_cmd(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_owned();
    }

    let escaped = arg.replace('%', "%%").replace('^', "^^");
    if escaped
        .chars()
        .any(|c| matches!(c, '&' | '|' | '<' | '>' | '(' | ')' | '^' | '"' | ' ' | '\t'))
    {
        format!("\"{}\"", escaped.replace('"', "\"^\"\""))
    } else {
        escaped
    }
}
