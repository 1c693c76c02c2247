use pdbmux::driver::{Config, SessionRegistry};
use std::path::PathBuf;
use std::sync::Arc;

/// Interpreter for debugger processes, tests are skipped without one.
pub fn python() -> Option<PathBuf> {
    which::which("python3").or_else(|_| which::which("python")).ok()
}

pub fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

pub fn config() -> Config {
    Config {
        python_path: python().map(|p| p.to_string_lossy().to_string()),
        working_directory: fixtures().to_string_lossy().to_string(),
        startup_timeout_ms: 10_000,
        command_timeout_ms: 5_000,
        terminate_timeout_ms: 2_000,
        ..Default::default()
    }
}

pub fn registry() -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(config()))
}

/// Absolute path of a fixture as the debugger reports it.
pub fn fixture(name: &str) -> String {
    fixtures().join(name).to_string_lossy().to_string()
}

/// Declare a registry for a test body, skip the test if python is missing.
#[macro_export]
macro_rules! session_env {
    ($registry:ident, $code:block) => {{
        if $crate::common::python().is_none() {
            eprintln!("python interpreter not found, skip test");
            return;
        }
        let $registry = $crate::common::registry();
        $code
    }};
}

#[macro_export]
macro_rules! assert_no_proc {
    ($pid:expr) => {
        let sys = sysinfo::System::new_with_specifics(
            sysinfo::RefreshKind::everything()
                .without_cpu()
                .without_memory(),
        );
        assert!(sysinfo::System::process(&sys, sysinfo::Pid::from_u32($pid)).is_none())
    };
}
