use crate::driver::error::Error;
use crate::driver::process::{LaunchSpec, Mode};
use crate::driver::session::Timeouts;
use crate::mux_debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

/// Well known name of a project configuration file.
pub const CONFIG_FILE: &str = "pdbconfig.json";

/// Virtual environment directories probed when `venv` is not set or does not exist.
const VENV_CANDIDATES: [&str; 3] = [".venv", "venv", ".pixi/envs/default"];

/// Project configuration, unrecognized keys are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Explicit interpreter, wins over any venv discovery.
    pub python_path: Option<String>,
    pub venv: Option<String>,
    pub working_directory: String,
    /// Added to the environment of a debugger process.
    pub environment: HashMap<String, String>,
    /// Extra arguments for pytest mode, placed before the target.
    pub pytest_args: Vec<String>,
    pub startup_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub terminate_timeout_ms: u64,
    /// Page size used when a request has no `limit`, no limit means "the remainder".
    pub default_page_limit: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            python_path: None,
            venv: None,
            working_directory: ".".to_string(),
            environment: HashMap::new(),
            pytest_args: vec![],
            startup_timeout_ms: 10_000,
            command_timeout_ms: 5_000,
            terminate_timeout_ms: 5_000,
            default_page_limit: None,
        }
    }
}

impl Config {
    /// Load configuration from a file. A missing file means defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                mux_debug!(target: "driver", "no config at {}, use defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&data)?)
    }

    /// Load `pdbconfig.json` from a directory.
    pub fn discover(dir: impl AsRef<Path>) -> Result<Self, Error> {
        Self::load(dir.as_ref().join(CONFIG_FILE))
    }

    /// Write configuration as a pretty JSON document.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json + "\n")?;
        Ok(())
    }

    pub fn working_dir(&self) -> PathBuf {
        PathBuf::from(&self.working_directory)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            startup: Duration::from_millis(self.startup_timeout_ms),
            command: Duration::from_millis(self.command_timeout_ms),
            terminate: Duration::from_millis(self.terminate_timeout_ms),
        }
    }

    /// Interpreter for debugger processes: explicit `python_path`, then a venv
    /// interpreter, then `python3` or `python` from `PATH`.
    pub fn python_executable(&self) -> PathBuf {
        if let Some(path) = &self.python_path {
            return PathBuf::from(path);
        }

        let cwd = self.working_dir();
        let venvs = self
            .venv
            .iter()
            .map(PathBuf::from)
            .chain(VENV_CANDIDATES.iter().map(PathBuf::from))
            .map(|venv| if venv.is_absolute() { venv } else { cwd.join(venv) });
        for venv in venvs {
            let python = venv.join("bin").join("python");
            if python.exists() {
                mux_debug!(target: "driver", "use venv interpreter {}", python.display());
                return python;
            }
        }

        ["python3", "python"]
            .into_iter()
            .find_map(|name| which::which(name).ok())
            .unwrap_or_else(|| PathBuf::from("python3"))
    }

    /// Build a launch specification for a debug target.
    pub fn launch_spec(&self, target: &str, mode: Mode, args: Vec<String>) -> LaunchSpec {
        LaunchSpec {
            interpreter: self.python_executable(),
            cwd: self.working_dir(),
            env: self.environment.clone(),
            mode,
            target: target.to_string(),
            args,
            pytest_args: self.pytest_args.clone(),
        }
    }
}
