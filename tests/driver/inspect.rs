use crate::session_env;
use crate::{FACTORIAL_APP, OBJECTS_APP};
use pdbmux::driver::extract;
use pdbmux::driver::session::Evaluation;
use pdbmux::driver::{DebugSession, Error, Mode, ParserState};
use serial_test::serial;

fn stop_at(session: &DebugSession, file: &str, line: u32) {
    session
        .set_breakpoint(file, Some(line), None, None, false)
        .unwrap();
    let report = session.continue_execution(None).unwrap();
    assert_eq!(report.location.unwrap().line, line);
}

#[test]
#[serial]
fn test_evaluate() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        stop_at(&session, FACTORIAL_APP, 2);

        assert_eq!(
            session.evaluate("n * 2", None).unwrap(),
            Evaluation::Value {
                result: "10".to_string(),
                type_name: "int".to_string()
            }
        );

        match session.evaluate("1/0", None).unwrap() {
            Evaluation::Error { error } => assert!(error.contains("ZeroDivisionError"), "{error}"),
            other => panic!("unexpected evaluation {other:?}"),
        }
        assert_eq!(session.state(), ParserState::AtPrompt);

        let outcome = session.send_command("p n + 1", extract::value, None).unwrap();
        assert_eq!(outcome.state, ParserState::AtPrompt);
        assert_eq!(outcome.value.as_deref(), Some("6"));

        let err = session.evaluate("1\nimport os", None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        // session still usable
        assert!(matches!(
            session.evaluate("n", None).unwrap(),
            Evaluation::Value { result, .. } if result == "5"
        ));
    });
}

#[test]
#[serial]
fn test_backtrace_and_frames() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        stop_at(&session, FACTORIAL_APP, 2);

        let frames = session.backtrace().unwrap();
        assert!(frames.len() >= 3);
        assert_eq!(frames[0].index, 0);
        assert_eq!(frames[0].function, "factorial");
        assert!(frames[0].current);
        assert_eq!(frames[1].function, "main");
        assert_eq!(frames[1].line, 8);

        let frame = session.frame_up(1).unwrap();
        assert_eq!(frame.index, 1);
        assert_eq!(frame.function, "main");
        assert_eq!(session.info().frame_index, 1);
        assert!(matches!(
            session.evaluate("n", None).unwrap(),
            Evaluation::Error { .. }
        ));

        let frame = session.frame_down(1).unwrap();
        assert_eq!(frame.index, 0);
        let err = session.frame_down(1).unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));

        // clamped to the outermost frame
        let frame = session.frame_up(100).unwrap();
        assert_eq!(frame.index, frames.len() - 1);
        session.frame_down(100).unwrap();
    });
}

#[test]
#[serial]
fn test_evaluate_in_frame() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        stop_at(&session, FACTORIAL_APP, 2);
        session.continue_execution(None).unwrap();

        // factorial(4) is called by factorial(5)
        assert!(matches!(
            session.evaluate("n", Some(1)).unwrap(),
            Evaluation::Value { result, .. } if result == "5"
        ));
        assert_eq!(session.info().frame_index, 0);
        assert!(matches!(
            session.evaluate("n", None).unwrap(),
            Evaluation::Value { result, .. } if result == "4"
        ));

        let err = session.evaluate("n", Some(100)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(session.info().frame_index, 0);
    });
}

#[test]
#[serial]
fn test_source_listing() {
    session_env!(registry, {
        let session = registry.start(FACTORIAL_APP, Mode::Script, vec![]).unwrap();
        stop_at(&session, FACTORIAL_APP, 2);

        let listing = session.source(None, 5).unwrap();
        assert_eq!(listing.current_line, Some(2));
        assert_eq!(listing.lines.first().unwrap().line, 1);
        assert_eq!(listing.lines.last().unwrap().line, 7);
        let current = listing.lines.iter().find(|l| l.current).unwrap();
        assert_eq!(current.line, 2);
        assert!(current.breakpoint);
        assert_eq!(current.text, "    if n <= 1:");

        let listing = session.source(Some(13), 1).unwrap();
        let lines: Vec<u32> = listing.lines.iter().map(|l| l.line).collect();
        assert_eq!(lines, vec![12, 13, 14]);

        let listing = session.source(None, u32::MAX).unwrap();
        assert_eq!(listing.lines.first().unwrap().line, 1);
        assert_eq!(listing.lines.last().unwrap().line, 14);
    });
}

#[test]
#[serial]
fn test_variables_and_inspect() {
    session_env!(registry, {
        let session = registry.start(OBJECTS_APP, Mode::Script, vec![]).unwrap();
        stop_at(&session, OBJECTS_APP, 17);

        let listing = session.variables(true, None).unwrap();
        let names: Vec<&str> = listing.locals.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["distance", "label", "point"]);
        assert_eq!(listing.locals[0].type_name, "float");
        assert_eq!(listing.locals[0].value, "5.0");
        assert_eq!(listing.locals[1].value, "'origin distance'");

        let globals = listing.globals.unwrap();
        assert!(globals.iter().all(|v| !v.name.starts_with("__")));
        let limit = globals.iter().find(|v| v.name == "LIMIT").unwrap();
        assert_eq!(limit.value, "10");

        let details = session.inspect_variable("point", None).unwrap();
        assert_eq!(details.type_name, "Point");
        assert!(details.repr.starts_with("<__main__.Point object"));
        let attrs: Vec<&str> = details.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(attrs, vec!["norm", "x", "y"]);
        assert_eq!(details.attributes[1].value, "3");

        let details = session.inspect_variable("label", None).unwrap();
        assert_eq!(details.value, "origin distance");
        assert_eq!(details.repr, "'origin distance'");

        let err = session.inspect_variable("missing", None).unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));
    });
}
