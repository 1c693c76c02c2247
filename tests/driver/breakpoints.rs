use crate::common;
use crate::session_env;
use crate::{BANNER_APP, FACTORIAL_APP};
use pdbmux::driver::{paginate, Error, Mode, StopReason};
use serial_test::serial;

#[test]
#[serial]
fn test_breakpoint_hit_and_continue() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        let brkpt = session
            .set_breakpoint(FACTORIAL_APP, Some(2), None, None, false)
            .unwrap();
        assert_eq!(brkpt.id, 1);
        assert_eq!(brkpt.file, common::fixture(FACTORIAL_APP));
        assert_eq!(brkpt.line, Some(2));

        let report = session.continue_execution(None).unwrap();
        assert_eq!(report.reason, StopReason::Breakpoint);
        assert_eq!(report.breakpoint_id, Some(1));
        let location = report.location.unwrap();
        assert_eq!(location.line, 2);
        assert_eq!(location.function, "factorial");

        let report = session.continue_execution(None).unwrap();
        assert_eq!(report.reason, StopReason::Breakpoint);

        let breakpoints = session.breakpoints().unwrap();
        assert_eq!(breakpoints.len(), 1);
        assert_eq!(breakpoints[0].hit_count, 2);
        assert!(breakpoints[0].enabled);
    });
}

#[test]
#[serial]
fn test_disabled_breakpoint_is_skipped() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        let brkpt = session
            .set_breakpoint(FACTORIAL_APP, Some(2), None, None, false)
            .unwrap();
        let brkpt = session.disable_breakpoint(brkpt.id).unwrap();
        assert!(!brkpt.enabled);

        let report = session.continue_execution(None).unwrap();
        assert_eq!(report.reason, StopReason::End);
        assert!(report.output.iter().any(|l| l == "factorial(5) = 120"));

        let brkpt = session.enable_breakpoint(brkpt.id).unwrap();
        assert!(brkpt.enabled);
        let report = session.continue_execution(None).unwrap();
        assert_eq!(report.reason, StopReason::Breakpoint);
    });
}

#[test]
#[serial]
fn test_conditional_and_temporary_breakpoints() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        let cond = session
            .set_breakpoint(FACTORIAL_APP, Some(2), None, Some("n == 2"), false)
            .unwrap();
        assert_eq!(cond.condition.as_deref(), Some("n == 2"));
        let temp = session
            .set_breakpoint(FACTORIAL_APP, None, Some("main"), None, true)
            .unwrap();
        assert!(temp.temporary);

        let report = session.continue_execution(None).unwrap();
        assert_eq!(report.location.unwrap().function, "main");
        assert_eq!(report.breakpoint_id, Some(temp.id));

        let ids: Vec<u32> = session.breakpoints().unwrap().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![cond.id]);

        session.continue_execution(None).unwrap();
        let n = session.evaluate("n", None).unwrap();
        assert_eq!(serde_json::to_value(n).unwrap()["result"], "2");
    });
}

#[test]
#[serial]
fn test_breakpoint_errors() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();

        let err = session
            .set_breakpoint(FACTORIAL_APP, None, None, None, false)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = session.remove_breakpoint(7).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = session.enable_breakpoint(7).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // blank line
        let err = session
            .set_breakpoint(FACTORIAL_APP, Some(5), None, None, false)
            .unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));

        let brkpt = session
            .set_breakpoint(FACTORIAL_APP, Some(3), None, None, false)
            .unwrap();
        let removed = session.remove_breakpoint(brkpt.id).unwrap();
        assert_eq!(removed.id, brkpt.id);
        assert!(session.breakpoints().unwrap().is_empty());
    });
}

#[test]
#[serial]
fn test_breakpoint_pages() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        for i in 0..25 {
            let line = [2, 3, 4, 8, 9][i % 5];
            session
                .set_breakpoint(FACTORIAL_APP, Some(line), None, None, false)
                .unwrap();
        }

        let page = paginate(session.breakpoints().unwrap(), 20, Some(10));
        assert_eq!(page.pagination.total, 25);
        assert_eq!(page.pagination.returned, 5);
        let ids: Vec<u32> = page.items.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![21, 22, 23, 24, 25]);
    });
}

#[test]
#[serial]
fn test_program_prints_debugger_like_output() {
    session_env!(registry, {
        let session = registry.start(BANNER_APP, Mode::Script, vec![]).unwrap();
        let brkpt = session
            .set_breakpoint(BANNER_APP, Some(5), None, None, false)
            .unwrap();

        let report = session.continue_execution(None).unwrap();
        assert_eq!(report.reason, StopReason::Breakpoint);
        assert_eq!(report.breakpoint_id, Some(brkpt.id));
        assert!(report.output.iter().any(|l| l == "*** starting job ***"));
        assert_eq!(report.location.unwrap().line, 5);
        assert_eq!(session.info().location.unwrap().line, 5);

        let details = session.inspect_variable("title", None).unwrap();
        assert_eq!(details.value, "*** report ***");
        assert_eq!(details.repr, "'*** report ***'");

        session.continue_execution(None).unwrap();
        assert_eq!(session.breakpoints().unwrap()[0].hit_count, 2);
    });
}

#[test]
#[serial]
fn test_line_breakpoint_inside_function_breakpoint() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        let func = session
            .set_breakpoint(FACTORIAL_APP, None, Some("factorial"), None, false)
            .unwrap();
        let line = session
            .set_breakpoint(FACTORIAL_APP, Some(4), None, None, false)
            .unwrap();

        let report = session.continue_execution(None).unwrap();
        assert_eq!(report.location.unwrap().line, 2);
        assert_eq!(report.breakpoint_id, Some(func.id));

        let report = session.continue_execution(None).unwrap();
        assert_eq!(report.location.unwrap().line, 4);
        assert_eq!(report.breakpoint_id, Some(line.id));
    });
}
