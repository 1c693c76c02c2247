use crate::driver::error::LaunchError;
use crate::{mux_debug, mux_info, mux_warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use os_pipe::PipeReader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use std::{io, process, thread};
use strum_macros::{Display, EnumString};

const REAP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What the debugger is asked to run.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// `python -m pdb <script>`
    Script,
    /// `python -m pdb -m <module>`
    Module,
    /// `python -m pytest --trace <target>`
    Pytest,
}

/// Everything needed to (re)create a debugger process.
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    pub interpreter: PathBuf,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub mode: Mode,
    pub target: String,
    pub args: Vec<String>,
    pub pytest_args: Vec<String>,
}

impl LaunchSpec {
    /// Interpreter arguments for a current launch mode.
    pub fn command_args(&self) -> Vec<String> {
        let mut cmd: Vec<String> = match self.mode {
            Mode::Script => vec!["-m".into(), "pdb".into(), self.target.clone()],
            Mode::Module => vec![
                "-m".into(),
                "pdb".into(),
                "-m".into(),
                self.target.clone(),
            ],
            Mode::Pytest => {
                let mut cmd: Vec<String> = ["-m", "pytest", "--trace", "-s", "-v"]
                    .into_iter()
                    .map(Into::into)
                    .collect();
                cmd.extend(self.pytest_args.iter().cloned());
                cmd.push(self.target.clone());
                cmd
            }
        };
        cmd.extend(self.args.iter().cloned());
        cmd
    }

    /// Path of the file that must exist for the current mode (modules are resolved by python).
    fn target_file(&self) -> Option<PathBuf> {
        let file = match self.mode {
            Mode::Script => self.target.as_str(),
            // pytest node ids look like `tests/test_a.py::test_fn`
            Mode::Pytest => self.target.split("::").next().unwrap_or_default(),
            Mode::Module => return None,
        };
        let path = Path::new(file);
        Some(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        })
    }

    fn resolve_interpreter(&self) -> Result<PathBuf, LaunchError> {
        if self.interpreter.exists() {
            return Ok(self.interpreter.clone());
        }
        which::which(&self.interpreter).map_err(|_| {
            LaunchError::InterpreterNotFound(self.interpreter.to_string_lossy().to_string())
        })
    }
}

/// Process state.
pub trait State {}

/// Process is running.
pub struct Installed;

impl State for Installed {}

/// Process prepare for instantiation.
pub struct Template;

impl State for Template {}

/// Pipes connected to a freshly spawned debugger.
pub struct ChildIo {
    pub stdin: ChildStdin,
    pub stdout: PipeReader,
    pub stderr: PipeReader,
}

/// Debugger child process.
pub struct Child<S: State> {
    spec: LaunchSpec,
    handle: Option<process::Child>,
    status: Option<ExitStatus>,
    _p: PhantomData<S>,
}

impl Child<Template> {
    /// Create new process, but dont start it.
    pub fn new(spec: LaunchSpec) -> Child<Template> {
        Self {
            spec,
            handle: None,
            status: None,
            _p: PhantomData,
        }
    }

    /// Spawn the debugger with redirected stdin, stdout and stderr.
    pub fn install(&self) -> Result<(Child<Installed>, ChildIo), LaunchError> {
        let spec = &self.spec;
        if !spec.cwd.is_dir() {
            return Err(LaunchError::WorkingDirNotFound(
                spec.cwd.to_string_lossy().to_string(),
            ));
        }
        let interpreter = spec.resolve_interpreter()?;
        if let Some(file) = spec.target_file() {
            if !file.exists() {
                return Err(LaunchError::TargetNotFound(
                    file.to_string_lossy().to_string(),
                ));
            }
        }

        let (stdout_reader, stdout_writer) = os_pipe::pipe().map_err(LaunchError::Spawn)?;
        let (stderr_reader, stderr_writer) = os_pipe::pipe().map_err(LaunchError::Spawn)?;

        let mut child = {
            // command owns the writer ends, it must be dropped right after spawn,
            // otherwise readers never observe EOF
            let mut cmd = Command::new(&interpreter);
            cmd.args(spec.command_args())
                .current_dir(&spec.cwd)
                .env("PYTHONUNBUFFERED", "1")
                .envs(&spec.env)
                .stdin(Stdio::piped())
                .stdout(stdout_writer)
                .stderr(stderr_writer);
            cmd.spawn().map_err(LaunchError::Spawn)?
        };

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| LaunchError::Spawn(io::Error::other("stdin is not captured")))?;

        mux_info!(
            target: "driver",
            "spawn {} {} (pid {})",
            interpreter.display(),
            spec.command_args().join(" "),
            child.id()
        );

        Ok((
            Child {
                spec: self.spec.clone(),
                handle: Some(child),
                status: None,
                _p: PhantomData,
            },
            ChildIo {
                stdin,
                stdout: stdout_reader,
                stderr: stderr_reader,
            },
        ))
    }
}

impl Child<Installed> {
    /// Return running process pid.
    pub fn pid(&self) -> u32 {
        self.handle.as_ref().map(|h| h.id()).unwrap_or_default()
    }

    /// Return exit status if process already exited, reaping it.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.status.is_some() {
            return Ok(self.status);
        }
        let Some(handle) = self.handle.as_mut() else {
            return Ok(None);
        };
        let status = handle.try_wait()?;
        if status.is_some() {
            self.status = status;
        }
        Ok(status)
    }

    /// Wait at most `timeout` for the process to exit by itself.
    pub fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(REAP_POLL_INTERVAL);
        }
    }

    /// Force kill and reap the process.
    pub fn kill(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = self.try_wait()? {
            return Ok(status);
        }
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| io::Error::other("process handle is missing"))?;
        mux_warn!(target: "driver", "kill debugger process {}", handle.id());
        handle.kill()?;
        let status = handle.wait()?;
        self.status = Some(status);
        Ok(status)
    }

    /// Send SIGTERM, wait `grace` time for a graceful exit and kill the process after that.
    /// Calling this on an already reaped process just return its status.
    pub fn terminate(&mut self, grace: Duration) -> io::Result<ExitStatus> {
        if let Some(status) = self.try_wait()? {
            return Ok(status);
        }
        let pid = Pid::from_raw(self.pid() as i32);
        mux_debug!(target: "driver", "send SIGTERM to {pid}");
        if let Err(e) = signal::kill(pid, Signal::SIGTERM) {
            mux_warn!(target: "driver", "SIGTERM {pid}: {e}");
        }
        match self.wait_timeout(grace)? {
            Some(status) => Ok(status),
            None => self.kill(),
        }
    }
}
