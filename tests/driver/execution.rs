use crate::session_env;
use crate::{EXIT_CODE_APP, FACTORIAL_APP, UNCAUGHT_APP};
use pdbmux::driver::{Error, Mode, ParserState, StopReason};
use serial_test::serial;

#[test]
#[serial]
fn test_step_into_and_out() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        session
            .set_breakpoint(FACTORIAL_APP, Some(8), None, None, false)
            .unwrap();
        let report = session.continue_execution(None).unwrap();
        assert_eq!(report.location.unwrap().function, "main");

        let report = session.step_into(None).unwrap();
        assert_eq!(report.entered_function.as_deref(), Some("factorial"));
        assert_eq!(report.location.as_ref().unwrap().function, "factorial");

        let report = session.step_over(None).unwrap();
        assert_eq!(report.location.unwrap().line, 2);
        assert_eq!(report.entered_function, None);

        let report = session.step_out(None).unwrap();
        assert_eq!(report.reason, StopReason::Return);
        assert_eq!(report.return_value.as_deref(), Some("120"));
        assert_eq!(report.location.unwrap().function, "factorial");

        // leave factorial, back in main
        let report = session.step_over(None).unwrap();
        assert_eq!(report.location.unwrap().function, "main");
    });
}

#[test]
#[serial]
fn test_until_line() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        let report = session.until(Some(13), None).unwrap();
        let location = report.location.unwrap();
        assert_eq!(location.line, 13);
        assert_eq!(location.function, "<module>");
        assert_eq!(session.info().location.unwrap().line, 13);
    });
}

#[test]
#[serial]
fn test_program_end_and_restart_banner() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        let report = session.continue_execution(None).unwrap();
        assert_eq!(report.reason, StopReason::End);
        assert_eq!(report.state, ParserState::AtPrompt);
        assert!(report.output.iter().any(|l| l == "factorial(5) = 120"));
        // program is restarted by the debugger
        assert_eq!(report.location.unwrap().line, 1);
        assert_eq!(session.state(), ParserState::AtPrompt);
    });
}

#[test]
#[serial]
fn test_sys_exit_status() {
    session_env!(registry, {
        let session = registry.start(EXIT_CODE_APP, Mode::Script, vec![]).unwrap();
        let report = session.continue_execution(None).unwrap();
        assert_eq!(report.reason, StopReason::End);
        assert_eq!(report.exit_status, Some(3));
        assert!(report.output.iter().any(|l| l == "leaving"));
    });
}

#[test]
#[serial]
fn test_post_mortem() {
    session_env!(registry, {
        let session = registry.start(UNCAUGHT_APP, Mode::Script, vec![]).unwrap();
        let report = session.continue_execution(None).unwrap();
        assert_eq!(report.reason, StopReason::Exception);
        assert_eq!(report.state, ParserState::AtPrompt);
        assert_eq!(report.exception.as_deref(), Some("ValueError"));
        let location = report.location.unwrap();
        assert_eq!(location.function, "fail");
        assert_eq!(location.line, 2);

        // the dead frame is still inspectable
        let value = session.evaluate("value", None).unwrap();
        assert_eq!(serde_json::to_value(value).unwrap()["result"], "42");

        let report = session.continue_execution(None).unwrap();
        assert_eq!(report.reason, StopReason::End);
        assert_eq!(report.location.unwrap().line, 1);
    });
}

#[test]
#[serial]
fn test_commands_after_stop() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        registry.stop(session.id()).unwrap();
        for result in [
            session.step_into(None),
            session.step_over(None),
            session.continue_execution(None),
        ] {
            assert!(matches!(result, Err(Error::SessionTerminated(_))));
        }
    });
}
