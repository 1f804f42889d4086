//! Executable lookup.
//!
//! [`ExecutableResolver`] is the single seam through which the launcher
//! learns where a command lives. The production [`SearchPathResolver`]
//! searches the child's `PATH` and then the global install directories of
//! the npm package manager, where agent CLIs are commonly installed.
//!
//! Resolution never fails: when nothing is found the bare name is returned
//! and the launch attempt reports the problem.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::platform::{env_lookup, path_key, Platform};
use super::EnvMap;

/// Locates the executable for a logical command name.
pub trait ExecutableResolver: Send + Sync {
    /// Resolve `name` against `env`, returning `name` itself when nothing
    /// better is found.
    fn resolve(&self, name: &str, env: &EnvMap) -> PathBuf;

    /// Adjust the child environment before resolution and launch.
    ///
    /// The default implementation leaves the environment untouched.
    fn augment_path(&self, _env: &mut EnvMap) {}
}

/// `PATH`-based resolver with npm global directory fallbacks.
#[derive(Debug, Clone)]
pub struct SearchPathResolver {
    platform: Platform,
    cwd: PathBuf,
}

impl SearchPathResolver {
    /// Resolver for the current host, relative to the current directory.
    #[must_use]
    pub fn new() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::for_platform(Platform::current(), cwd)
    }

    /// Resolver applying `platform` conventions, relative to `cwd`.
    #[must_use]
    pub fn for_platform(platform: Platform, cwd: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            cwd: cwd.into(),
        }
    }

    /// Candidate files for `name` inside `dir`.
    fn candidates_in(&self, dir: &Path, name: &str) -> Vec<PathBuf> {
        match self.platform {
            Platform::Unix => vec![dir.join(name)],
            Platform::Windows => self
                .platform
                .executable_extensions()
                .iter()
                .map(|ext| dir.join(format!("{name}{ext}")))
                .collect(),
        }
    }

    /// On Windows, prefer a sibling script over an extensionless hit.
    ///
    /// npm installs both `codex` (a shell shim) and `codex.cmd`; only the
    /// latter is runnable without a Unix shell.
    fn prefer_runnable(&self, found: PathBuf, name: &str) -> PathBuf {
        if self.platform != Platform::Windows || found.extension().is_some() {
            return found;
        }
        let Some(dir) = found.parent() else {
            return found;
        };
        self.candidates_in(dir, name)
            .into_iter()
            .find(|candidate| candidate.is_file())
            .unwrap_or(found)
    }
}

impl Default for SearchPathResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutableResolver for SearchPathResolver {
    fn resolve(&self, name: &str, env: &EnvMap) -> PathBuf {
        if self.platform.has_path_component(name) {
            return PathBuf::from(name);
        }

        if let Some(search) = env_lookup(env, "PATH") {
            if let Ok(found) = which::which_in(name, Some(search), &self.cwd) {
                let found = self.prefer_runnable(found, name);
                debug!(name, path = %found.display(), "resolved executable on PATH");
                return found;
            }
        }

        for dir in package_manager_dirs(self.platform, env) {
            if let Some(hit) = self
                .candidates_in(&dir, name)
                .into_iter()
                .find(|candidate| candidate.is_file())
            {
                debug!(name, path = %hit.display(), "resolved executable in npm directory");
                return hit;
            }
        }

        debug!(name, "executable not found; deferring to launch");
        PathBuf::from(name)
    }

    fn augment_path(&self, env: &mut EnvMap) {
        if self.platform != Platform::Windows {
            return;
        }

        let key = path_key(env);
        let mut entries = env
            .get(&key)
            .map(|value| self.platform.split_path_list(value))
            .unwrap_or_default();

        let mut missing = Vec::new();
        for dir in package_manager_dirs(self.platform, env) {
            if !dir.is_dir() {
                continue;
            }
            let dir = dir.to_string_lossy().into_owned();
            let known = entries
                .iter()
                .chain(missing.iter())
                .any(|entry| self.platform.same_path_entry(entry, &dir));
            if !known {
                missing.push(dir);
            }
        }

        if missing.is_empty() {
            return;
        }
        debug!(added = ?missing, "prepending npm directories to PATH");
        missing.append(&mut entries);
        env.insert(key, self.platform.join_path_list(&missing));
    }
}

/// Global install directories used by npm, in lookup order.
#[must_use]
pub fn package_manager_dirs(platform: Platform, env: &EnvMap) -> Vec<PathBuf> {
    let prefix = env_lookup(env, "NPM_CONFIG_PREFIX")
        .or_else(|| env_lookup(env, "npm_config_prefix"))
        .filter(|value| !value.is_empty());

    let mut dirs = Vec::new();
    match platform {
        Platform::Windows => {
            dirs.extend(prefix.map(PathBuf::from));
            for (var, sub) in [
                ("APPDATA", "npm"),
                ("LOCALAPPDATA", "npm"),
                ("ProgramFiles", "nodejs"),
            ] {
                if let Some(base) = env_lookup(env, var).filter(|value| !value.is_empty()) {
                    dirs.push(Path::new(base).join(sub));
                }
            }
        }
        Platform::Unix => {
            dirs.extend(prefix.map(|value| Path::new(value).join("bin")));
            if let Some(home) = env_lookup(env, "HOME").filter(|value| !value.is_empty()) {
                dirs.push(Path::new(home).join(".npm-global").join("bin"));
            }
        }
    }
    dirs
}
