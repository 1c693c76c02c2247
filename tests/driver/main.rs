mod common;

mod breakpoints;
mod execution;
mod inspect;
mod tools;

use pdbmux::driver::{Error, Mode, ParserState};
use serial_test::serial;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const FACTORIAL_APP: &str = "factorial.py";
const HANG_APP: &str = "hang.py";
const UNCAUGHT_APP: &str = "uncaught.py";
const EXIT_CODE_APP: &str = "exit_code.py";
const OBJECTS_APP: &str = "objects.py";
const BANNER_APP: &str = "banner.py";

#[test]
#[serial]
fn test_start_reports_first_line() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        assert_eq!(session.state(), ParserState::AtPrompt);

        let info = session.info();
        assert_eq!(info.session_id, "session_1");
        let location = info.location.unwrap();
        assert_eq!(location.file, common::fixture(FACTORIAL_APP));
        assert_eq!(location.line, 1);
        assert_eq!(location.function, "<module>");
    });
}

#[test]
#[serial]
fn test_start_missing_target() {
    session_env!(registry, {
        let err = registry
            .start("no_such_script.py", Mode::Script, vec![])
            .err()
            .unwrap();
        assert_eq!(err.kind(), "launch_error");
        assert!(registry.list().is_empty());
    });
}

#[test]
#[serial]
fn test_double_stop() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        let id = session.id().to_string();
        let pid = session.pid();

        registry.stop(&id).unwrap();
        registry.stop(&id).unwrap();
        session.stop();

        assert!(session.is_stopped());
        assert_eq!(session.state(), ParserState::Exited);
        assert!(matches!(registry.get(&id), Err(Error::SessionNotFound(_))));
        assert!(matches!(
            session.backtrace(),
            Err(Error::SessionTerminated(_))
        ));
        assert_no_proc!(pid);
    });
}

#[test]
#[serial]
fn test_drop_registry_kills_children() {
    session_env!(registry, {
        let first = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        let second = registry.start(HANG_APP, Mode::Script, vec![]).unwrap();
        let pids = [first.pid(), second.pid()];
        drop(first);
        drop(second);
        drop(registry);

        for pid in pids {
            assert_no_proc!(pid);
        }
    });
}

#[test]
#[serial]
fn test_command_timeout_kills_process() {
    session_env!(registry, {
        let session = registry.start(HANG_APP, Mode::Script, vec![]).unwrap();
        let pid = session.pid();

        let now = Instant::now();
        let err = session
            .continue_execution(Some(Duration::from_millis(200)))
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(200)));
        assert!(err.is_terminal());
        assert!(now.elapsed() < Duration::from_secs(3));
        assert_eq!(session.state(), ParserState::Hung);

        let err = session.backtrace().unwrap_err();
        assert!(matches!(err, Error::SessionTerminated(ParserState::Hung)));
        assert_no_proc!(pid);
    });
}

#[test]
#[serial]
fn test_concurrent_callers_are_busy() {
    session_env!(registry, {
        let session = registry.start(HANG_APP, Mode::Script, vec![]).unwrap();

        let runner = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.continue_execution(Some(Duration::from_secs(30))))
        };

        // wait until the continue is in flight
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.state() != ParserState::Running {
            assert!(Instant::now() < deadline, "continue was not sent");
            thread::sleep(Duration::from_millis(10));
        }

        let callers: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                thread::spawn(move || session.evaluate("1 + 1", None))
            })
            .collect();
        for caller in callers {
            assert!(matches!(caller.join().unwrap(), Err(Error::Busy(_))));
        }

        let now = Instant::now();
        registry.stop(session.id()).unwrap();
        let result = runner.join().unwrap();
        assert!(matches!(result, Err(Error::SessionTerminated(_))));
        assert!(now.elapsed() < Duration::from_secs(5));
        assert_no_proc!(session.pid());
    });
}

#[test]
#[serial]
fn test_restart_gives_fresh_ids() {
    session_env!(registry, {
        let old = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        let first = old
            .set_breakpoint(FACTORIAL_APP, Some(2), None, None, false)
            .unwrap();
        let second = old
            .set_breakpoint(FACTORIAL_APP, Some(8), None, None, false)
            .unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let new = registry.restart(old.id()).unwrap();
        assert_ne!(new.id(), old.id());
        assert_eq!(new.id(), "session_2");
        assert!(matches!(registry.get(old.id()), Err(Error::SessionNotFound(_))));
        registry.stop(old.id()).unwrap();
        assert_no_proc!(old.pid());

        assert!(new.breakpoints().unwrap().is_empty());
        let brkpt = new
            .set_breakpoint(FACTORIAL_APP, Some(2), None, None, false)
            .unwrap();
        assert_eq!(brkpt.id, 3);
        assert_eq!(new.info().state, ParserState::AtPrompt);
    });
}
