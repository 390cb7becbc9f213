//! End-to-end session scenarios: start a lab, stage it, judge submissions.
//!
//! Every test builds a throwaway [`TestWorld`] holding the lab catalog, the
//! staging root and the session store under one temp directory.

use std::fs;

use anyhow::{Result, anyhow};
use lab_engine::core::types::{ParamValue, SessionStatus};
use lab_engine::error::{ErrorKind, LabError};
use lab_engine::io::catalog::DirCatalog;
use lab_engine::io::store::{MemorySessionStore, SessionStore};
use lab_engine::io::terminal::{TerminalConnection, TerminalProvisioner, TerminalRequest};
use lab_engine::session::LabRunner;
use lab_engine::test_support::{SQLI_LAB_YAML, ScriptedValidator, TestWorld};
use lab_engine::validators::ValidatorRegistry;

fn is_hex(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_hexdigit())
}

fn sqli_world() -> TestWorld {
    let world = TestWorld::new().expect("world");
    world
        .write_lab("web-sqli-1", "lab.yaml", SQLI_LAB_YAML)
        .expect("write lab");
    world
}

/// Two sessions of `web-sqli-1` get different `OMNIHACK<8 hex>` flags; the
/// right flag passes and any other 8-hex flag fails.
#[test]
fn sqli_sessions_get_distinct_flags_and_judge_correctly() {
    let world = sqli_world();
    let runner = world.runner().expect("runner");

    let mut first = runner.start_lab("web-sqli-1", "alice").expect("start first");
    let mut second = runner.start_lab("web-sqli-1", "bob").expect("start second");
    assert_ne!(first.session_id, second.session_id);
    assert_ne!(first.seed, second.seed);

    let flag_a = first.artifacts["db_flag_template"].clone();
    let flag_b = second.artifacts["db_flag_template"].clone();
    assert_ne!(flag_a, flag_b);
    for flag in [&flag_a, &flag_b] {
        let suffix = flag.strip_prefix("OMNIHACK").expect("flag prefix");
        assert_eq!(suffix.len(), 8);
        assert!(is_hex(suffix), "non-hex flag suffix {suffix}");
    }

    let staged = fs::read_to_string(first.staging_dir.join("db_flag_template.txt"))
        .expect("staged artifact");
    assert_eq!(staged, flag_a);
    assert_eq!(first.status, SessionStatus::Running);
    assert_eq!(
        first.terminal.as_ref().map(|t| t.url.clone()),
        Some(format!("wss://mock-ttyd/{}", first.session_id))
    );

    assert!(runner.submit(&mut first, &flag_a).expect("submit correct"));
    assert_eq!(first.status, SessionStatus::Passed);

    let mut wrong = "OMNIHACK00000000".to_string();
    if wrong == flag_b {
        wrong = "OMNIHACKffffffff".to_string();
    }
    assert!(!runner.submit(&mut second, &wrong).expect("submit wrong"));
    assert_eq!(second.status, SessionStatus::Failed);

    let stored = runner
        .store()
        .get_session(&first.session_id)
        .expect("get")
        .expect("row");
    assert_eq!(stored.status, SessionStatus::Passed);
    assert_eq!(stored.user_id, "alice");
}

#[test]
fn submission_survives_restart() {
    let world = sqli_world();
    let (session_id, flag) = {
        let runner = world.runner().expect("runner");
        let session = runner.start_lab("web-sqli-1", "alice").expect("start");
        (session.session_id, session.artifacts["db_flag_template"].clone())
    };

    let restarted = world.runner().expect("runner after restart");
    let loaded = restarted.load_session(&session_id).expect("load");
    assert_eq!(loaded.status, SessionStatus::Running);
    assert_eq!(
        loaded.parameters.get("FLAG_ID"),
        Some(&ParamValue::Text(flag.trim_start_matches("OMNIHACK").to_string()))
    );

    let verdict = restarted
        .submit_by_id(&session_id, &format!("  {flag}\n"))
        .expect("submit");
    assert!(verdict.passed);
    assert_eq!(verdict.outcomes.len(), 2);
    assert_eq!(
        restarted.load_session(&session_id).expect("reload").status,
        SessionStatus::Passed
    );
}

#[test]
fn finished_session_cannot_be_judged_again() {
    let world = sqli_world();
    let runner = world.runner().expect("runner");
    let mut session = runner.start_lab("web-sqli-1", "alice").expect("start");
    assert!(!runner.submit(&mut session, "nope").expect("first submit"));

    let err = runner
        .submit_by_id(&session.session_id, "nope")
        .expect_err("second submit");
    assert!(matches!(err, LabError::SessionFinished { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[test]
fn unknown_lab_and_session_are_not_found() {
    let world = sqli_world();
    let runner = world.runner().expect("runner");

    let err = runner.start_lab("web-xss-9", "alice").expect_err("lab");
    assert!(matches!(err, LabError::LabNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = runner.submit_by_id("deadbeef", "x").expect_err("session");
    assert!(matches!(err, LabError::SessionNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn unknown_validator_fails_submission_but_keeps_session_running() {
    let world = TestWorld::new().expect("world");
    world
        .write_lab(
            "odd",
            "lab.yaml",
            "id: odd\ntitle: Odd\nvalidators:\n  - type: flag_contains\n    value: x\n  - type: regex_match\n    pattern: x\n",
        )
        .expect("write lab");
    let runner = world.runner().expect("runner");
    assert_eq!(runner.list_labs().expect("list").len(), 1);

    let mut session = runner.start_lab("odd", "alice").expect("start");
    let err = runner.submit(&mut session, "x").expect_err("unknown type");
    assert!(matches!(err, LabError::UnknownValidatorType { ref kind } if kind == "regex_match"));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(session.status, SessionStatus::Running);
    assert_eq!(
        runner.load_session(&session.session_id).expect("load").status,
        SessionStatus::Running
    );
}

#[test]
fn aggregate_verdict_uses_every_registered_validator() {
    let world = TestWorld::new().expect("world");
    world
        .write_lab(
            "scripted",
            "lab.yaml",
            "id: scripted\ntitle: Scripted\nvalidators:\n  - type: pass_a\n  - type: fail_b\n",
        )
        .expect("write lab");
    world
        .write_lab(
            "all-pass",
            "lab.yaml",
            "id: all-pass\ntitle: All pass\nvalidators:\n  - type: pass_a\n  - type: pass_a\n",
        )
        .expect("write lab");
    world
        .write_lab("empty", "lab.yaml", "id: empty\ntitle: Empty\n")
        .expect("write lab");

    let pass = ScriptedValidator::passing("pass_a");
    let fail = ScriptedValidator::failing("fail_b");
    let (pass_calls, fail_calls) = (pass.calls(), fail.calls());
    let mut registry = ValidatorRegistry::with_builtins();
    registry.register(pass).register(fail);
    let runner = world.memory_runner().expect("runner").with_registry(registry);

    let mut mixed = runner.start_lab("scripted", "u").expect("start");
    assert!(!runner.submit(&mut mixed, "x").expect("submit"));
    assert_eq!((pass_calls.get(), fail_calls.get()), (1, 1));

    let mut all = runner.start_lab("all-pass", "u").expect("start");
    assert!(runner.submit(&mut all, "x").expect("submit"));
    assert_eq!(pass_calls.get(), 3);

    let mut empty = runner.start_lab("empty", "u").expect("start");
    assert!(runner.submit(&mut empty, "").expect("submit"));
}

#[test]
fn file_exists_placeholders_stay_inside_staging() {
    let world = TestWorld::new().expect("world");
    world
        .write_lab(
            "carve",
            "lab.yaml",
            "id: carve\ntitle: Carve\nparameters:\n  - name: WHO\n    type: choice\n    choices: [alice, bob]\nvalidators:\n  - type: file_exists\n    path: /loot/{{WHO}}/flag.txt\n  - type: file_exists\n    path: /flag.txt\n",
        )
        .expect("write lab");
    let runner = world.runner().expect("runner");
    let mut session = runner.start_lab("carve", "u").expect("start");

    let who = session.parameters.get("WHO").expect("WHO").to_string();
    let nested = session.staging_dir.join("loot").join(&who).join("flag.txt");
    assert_eq!(
        fs::read_to_string(&nested).expect("placeholder"),
        format!("placeholder for loot/{who}/flag.txt")
    );
    assert!(session.staging_dir.join("flag.txt").is_file());
    assert!(!world.path().join("flag.txt").exists());
    assert!(!world.staging_root().join("flag.txt").exists());

    assert!(runner.submit(&mut session, "").expect("submit"));
}

#[test]
fn traversal_in_path_template_aborts_start() {
    let world = TestWorld::new().expect("world");
    world
        .write_lab(
            "escape",
            "lab.yaml",
            "id: escape\ntitle: Escape\nvalidators:\n  - type: file_exists\n    path: /../../escape.txt\n",
        )
        .expect("write lab");
    let runner = world.memory_runner().expect("runner");

    let err = runner.start_lab("escape", "u").expect_err("escape");
    assert!(matches!(err, LabError::PathEscapesStaging { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(runner.store().is_empty());
    assert!(!world.path().join("escape.txt").exists());
    let staged = fs::read_dir(world.staging_root()).expect("read staging").count();
    assert_eq!(staged, 0);
}

#[test]
fn bad_parameter_spec_records_nothing() {
    let world = TestWorld::new().expect("world");
    world
        .write_lab(
            "broken",
            "lab.yaml",
            "id: broken\ntitle: Broken\nparameters:\n  - name: X\n    type: random_uuid\n",
        )
        .expect("write lab");
    world
        .write_lab(
            "no-choices",
            "lab.yaml",
            "id: no-choices\ntitle: No choices\nparameters:\n  - name: X\n    type: choice\n    choices: []\n",
        )
        .expect("write lab");
    let runner = world.memory_runner().expect("runner");

    let err = runner.start_lab("broken", "u").expect_err("unsupported");
    assert!(matches!(err, LabError::UnsupportedParameterType { .. }));
    let err = runner.start_lab("no-choices", "u").expect_err("empty choices");
    assert!(matches!(err, LabError::InvalidChoiceSpec { .. }));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(runner.store().is_empty());
}

struct FailingTerminal;

impl TerminalProvisioner for FailingTerminal {
    fn provision(&self, _request: &TerminalRequest) -> Result<Option<TerminalConnection>> {
        Err(anyhow!("ttyd unavailable"))
    }
}

#[test]
fn terminal_failure_does_not_block_start() {
    let world = sqli_world();
    let runner = LabRunner::new(
        DirCatalog::new(world.labs_dir()),
        MemorySessionStore::new(),
        FailingTerminal,
        world.staging_root(),
    )
    .expect("runner");

    let session = runner.start_lab("web-sqli-1", "alice").expect("start");
    assert!(session.terminal.is_none());
    assert_eq!(runner.store().len(), 1);
}

#[test]
fn preview_matches_started_session_for_same_seed() {
    let world = sqli_world();
    let runner = world.runner().expect("runner");
    let session = runner.start_lab("web-sqli-1", "alice").expect("start");
    let preview = runner
        .preview("web-sqli-1", &session.seed)
        .expect("preview");
    assert_eq!(preview.parameters, session.parameters);
    assert_eq!(preview.artifacts, session.artifacts);
}
