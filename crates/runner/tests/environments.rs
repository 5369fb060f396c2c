use parking_lot::Mutex;
use serde_json::json;
use specenv_common::{
    Config, DefinitionStore, Done, EnvironmentDefinition, EnvironmentHandle, Error, Result,
    StepOutcome, LIB_METHOD,
};
use specenv_runner::{
    EnvironmentRunner, FileStatus, HookBridge, MethodRegistry, Reporter, RunCompletion,
    SkipReason, SpecFile, SpecResult,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// `jasmine` environment: a framework, a global, a timer-driven script and
/// a plain script, in that order
fn jasmine_store() -> DefinitionStore {
    let mut store = DefinitionStore::new();
    store.define(
        EnvironmentDefinition::builder("jasmine")
            .root("/specs/jasmineEnv")
            .use_frameworks(["jasmine"])
            .add_fn(|window| {
                window.set_global("lorem", "ipsum");
                Ok(())
            })
            .call(|done, env| {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    let outcome = env.add("anotherLib.js");
                    done.finish(outcome);
                });
                Ok(())
            })
            .add("sampleLib.js")
            .build(),
    );
    store
}

fn lib_registry(calls: Arc<Mutex<Vec<String>>>) -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    registry
        .register(LIB_METHOD, move |env, args, done| {
            calls.lock().push(args[0].clone());
            let outcome = env.add(args[0].as_str());
            done.finish(outcome);
            Ok(())
        })
        .unwrap();
    registry
}

fn scripts(runner: &EnvironmentRunner) -> Vec<PathBuf> {
    runner.context().lock().scripts().to_vec()
}

/// Jasmine Environment
///
/// A spec file without a banner inside the environment's root gets exactly
/// the four declared steps, and the script added by the timer lands before
/// the next step runs.
#[tokio::test(start_paused = true)]
async fn jasmine_environment_runs_in_declared_order() {
    init_tracing();
    let mut runner =
        EnvironmentRunner::new(Config::default(), jasmine_store(), MethodRegistry::new()).unwrap();
    let file = SpecFile::new("/specs/jasmineEnv/fooSpec.js", "describe('foo', () => {});");

    let resolved = runner.prepare(&file).unwrap();
    assert_eq!(resolved.kinds(), ["use", "add", "call", "add"]);
    assert_eq!(resolved.environments, ["jasmine"]);

    let start = tokio::time::Instant::now();
    let report = runner.run(&[file]).await;
    assert!(start.elapsed() >= Duration::from_millis(100));

    assert!(matches!(
        report.outcomes[0].status,
        FileStatus::Executed { steps: 4 }
    ));
    assert_eq!(
        scripts(&runner),
        [
            PathBuf::from("/specs/jasmineEnv/anotherLib.js"),
            PathBuf::from("/specs/jasmineEnv/sampleLib.js"),
        ]
    );
    let window = runner.context().lock();
    assert_eq!(window.frameworks(), ["jasmine"]);
    assert_eq!(window.global("lorem"), Some(&json!("ipsum")));
}

/// Header Banner
///
/// `active: false` wins over every other directive: the file is skipped
/// without a single step, and its focus does not narrow the run.
#[tokio::test(start_paused = true)]
async fn inactive_banner_skips_file() {
    init_tracing();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut runner = EnvironmentRunner::new(
        Config::default(),
        jasmine_store(),
        lib_registry(calls.clone()),
    )
    .unwrap();

    let header = SpecFile::new(
        "/specs/jasmineEnv/headerSpec.js",
        r#"/**
 * Karma environment
 *   active: false
 *   focus: true
 *   clean: true
 *   use: jasmine
 *   add: fooLib.js | qunit
 *   lib: another
 */
describe('header', () => {});
"#,
    );

    let resolved = runner.prepare(&header).unwrap();
    assert!(!resolved.active);
    assert!(resolved.focus);
    assert!(resolved.clean);
    assert!(resolved.is_empty());

    let report = runner.run(&[header]).await;
    assert!(!report.focused);
    assert!(matches!(
        report.outcomes[0].status,
        FileStatus::Skipped(SkipReason::Inactive)
    ));
    assert!(scripts(&runner).is_empty());
    assert!(calls.lock().is_empty());
}

/// Banner Overrides
///
/// Banner `add` and `lib` entries follow the base environment, and only the
/// first name of an alternation is used.
#[tokio::test(start_paused = true)]
async fn banner_steps_follow_base_environment() {
    init_tracing();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut runner = EnvironmentRunner::new(
        Config::default(),
        jasmine_store(),
        lib_registry(calls.clone()),
    )
    .unwrap();

    let file = SpecFile::new(
        "/specs/jasmineEnv/barSpec.js",
        "// Karma environment\n//   add: fooLib.js | qunit\n//   lib: another\n",
    );
    let report = runner.run(&[file]).await;
    assert!(matches!(
        report.outcomes[0].status,
        FileStatus::Executed { steps: 6 }
    ));
    assert_eq!(*calls.lock(), ["another"]);
    assert_eq!(
        scripts(&runner),
        [
            PathBuf::from("/specs/jasmineEnv/anotherLib.js"),
            PathBuf::from("/specs/jasmineEnv/sampleLib.js"),
            PathBuf::from("/specs/jasmineEnv/fooLib.js"),
            PathBuf::from("/specs/jasmineEnv/another"),
        ]
    );
}

/// Step Timeout
///
/// A step that never signals fails its own file at the bound; the next
/// file still runs.
#[tokio::test(start_paused = true)]
async fn hanging_step_fails_only_its_file() {
    init_tracing();
    let mut store = jasmine_store();
    store.define(
        EnvironmentDefinition::builder("hanging")
            .call_with_timeout(Duration::from_millis(200), |done, _| {
                tokio::spawn(async move {
                    let _done = done;
                    std::future::pending::<()>().await;
                });
                Ok(())
            })
            .build(),
    );
    let mut runner = EnvironmentRunner::new(Config::default(), store, MethodRegistry::new()).unwrap();

    let report = runner
        .run(&[
            SpecFile::new(
                "/specs/other/hangSpec.js",
                "/* Karma environment\n   use: hanging\n*/",
            ),
            SpecFile::new("/specs/jasmineEnv/fooSpec.js", ""),
        ])
        .await;

    assert!(matches!(
        report.outcome("/specs/other/hangSpec.js").unwrap().status,
        FileStatus::Failed(Error::StepTimeout {
            position: 1,
            timeout_ms: 200,
            ..
        })
    ));
    assert!(matches!(
        report.outcome("/specs/jasmineEnv/fooSpec.js").unwrap().status,
        FileStatus::Executed { steps: 4 }
    ));
    assert_eq!(report.failed(), 1);
}

#[derive(Default)]
struct Recording {
    events: Arc<Mutex<Vec<String>>>,
}

impl Reporter for Recording {
    fn result(&mut self, result: &SpecResult) {
        self.events.lock().push(format!("result:{}", result.description));
    }

    fn complete(&mut self, info: &RunCompletion) {
        self.events.lock().push(format!("complete:{}", info.total));
    }
}

fn fixture_html(runner: &EnvironmentRunner, id: &str) -> Option<String> {
    let window = runner.context().lock();
    let doc = window.document();
    doc.get_element_by_id(id)
        .and_then(|node| doc.inner_html(node))
        .map(str::to_string)
}

fn set_fixture_html(runner: &EnvironmentRunner, id: &str, html: &str) {
    let mut window = runner.context().lock();
    let doc = window.document_mut();
    let node = doc.get_element_by_id(id).unwrap();
    doc.set_inner_html(node, html);
}

/// Template Fixtures
///
/// Fixtures seeded by the pipeline are reset after every reported test,
/// before host listeners run, and listeners are gone once the run completes.
#[tokio::test]
async fn fixtures_reset_after_each_reported_test() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("my-template.html");
    std::fs::write(&template, "Hallo").unwrap();

    let mut config = Config::default();
    config.environments.templates = vec!["**/*.html".to_string()];
    let mut runner = EnvironmentRunner::new(config, jasmine_store(), MethodRegistry::new()).unwrap();
    let found = template.clone();
    runner
        .discover_templates(&move |_: &[String]| -> Result<Vec<PathBuf>> {
            Ok(vec![found.clone()])
        })
        .unwrap();

    runner
        .run(&[SpecFile::new("/specs/other/templateSpec.js", "")])
        .await;
    assert_eq!(fixture_html(&runner, "my-template").as_deref(), Some("Hallo"));

    let reporter = Recording::default();
    let events = reporter.events.clone();
    let mut bridge = HookBridge::new(reporter);
    let hooks = bridge.hooks();
    runner.attach_hooks(&hooks);
    {
        let events = events.clone();
        let context = runner.context().clone();
        hooks.on_test_done(move || {
            let window = context.lock();
            let doc = window.document();
            let html = doc
                .get_element_by_id("my-template")
                .and_then(|node| doc.inner_html(node))
                .unwrap_or_default()
                .to_string();
            events.lock().push(format!("listener:{}", html));
        });
    }

    for description in ["first", "second"] {
        set_fixture_html(&runner, "my-template", "Foo");
        bridge.result(&SpecResult {
            description: description.to_string(),
            success: true,
            ..Default::default()
        });
        assert_eq!(fixture_html(&runner, "my-template").as_deref(), Some("Hallo"));
    }

    bridge.complete(&RunCompletion {
        total: 2,
        ..Default::default()
    });
    assert!(hooks.is_empty());

    set_fixture_html(&runner, "my-template", "Foo");
    bridge.result(&SpecResult {
        description: "late".to_string(),
        ..Default::default()
    });
    assert_eq!(fixture_html(&runner, "my-template").as_deref(), Some("Foo"));

    assert_eq!(
        *events.lock(),
        [
            "result:first",
            "listener:Hallo",
            "result:second",
            "listener:Hallo",
            "complete:2",
            "result:late",
        ]
    );
}

const CONFIG: &str = r#"
environments:
  definitions: ["**/*.env.yaml"]
  stepTimeoutMs: 1000
  customPaths:
    another: /vendor/another.js
"#;

const JASMINE_ENV: &str = r#"
name: jasmine
clean: true
steps:
  - use: [jasmine]
  - globals: { lorem: ipsum }
  - add: sampleLib.js | qunit
  - lib: another
"#;

/// Definition Files
///
/// Configuration and definitions loaded from disk drive the same pipeline
/// as code-built definitions, with `customPaths` resolving bare lib names.
#[tokio::test]
async fn definitions_load_from_yaml_files() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let env_dir = dir.path().join("jasmineEnv");
    std::fs::create_dir_all(&env_dir).unwrap();

    let config_path = dir.path().join("specenv.yaml");
    std::fs::write(&config_path, CONFIG).unwrap();
    let definition = env_dir.join("jasmine.env.yaml");
    std::fs::write(&definition, JASMINE_ENV).unwrap();
    let spec_path = env_dir.join("fooSpec.js");
    std::fs::write(&spec_path, "describe('foo', () => {});").unwrap();

    let config = Config::load(&config_path).unwrap();
    assert_eq!(config.step_timeout(), Duration::from_secs(1));

    let calls = Arc::new(Mutex::new(Vec::new()));
    let mut runner =
        EnvironmentRunner::new(config, DefinitionStore::new(), lib_registry(calls.clone())).unwrap();
    let found = definition.clone();
    let loaded = runner
        .load_definitions(&move |_: &[String]| -> Result<Vec<PathBuf>> {
            Ok(vec![found.clone()])
        })
        .unwrap();
    assert_eq!(loaded, ["jasmine"]);

    let report = runner.run(&[SpecFile::read(&spec_path).unwrap()]).await;
    assert!(matches!(
        report.outcomes[0].status,
        FileStatus::Executed { steps: 4 }
    ));
    assert_eq!(
        scripts(&runner),
        [env_dir.join("sampleLib.js"), PathBuf::from("/vendor/another.js")]
    );
    assert_eq!(
        runner.context().lock().global("lorem"),
        Some(&json!("ipsum"))
    );

    let summary = runner.finish().unwrap();
    assert_eq!(summary.removed, ["lorem"]);
    assert!(!runner.context().lock().has_global("lorem"));
}

/// Custom Methods
///
/// A failing custom step aborts its pipeline with the step's identity.
#[tokio::test]
async fn failing_custom_step_reports_kind_and_position() {
    init_tracing();
    fn reject(_: EnvironmentHandle, args: &[String], done: Done) -> StepOutcome {
        done.fail(format!("cannot load {}", args.join(",")));
        Ok(())
    }

    let mut registry = MethodRegistry::new();
    registry.register("fixtureServer", reject).unwrap();
    let mut store = DefinitionStore::new();
    store.define(
        EnvironmentDefinition::builder("server")
            .root(Path::new("/specs/server"))
            .use_frameworks(["qunit"])
            .custom("fixtureServer", ["users.json"])
            .build(),
    );
    let mut runner = EnvironmentRunner::new(Config::default(), store, registry).unwrap();

    let report = runner
        .run(&[SpecFile::new("/specs/server/usersSpec.js", "")])
        .await;
    match &report.outcomes[0].status {
        FileStatus::Failed(Error::PipelineExecution {
            kind,
            position,
            reason,
        }) => {
            assert_eq!(kind, "fixtureServer");
            assert_eq!(*position, 2);
            assert_eq!(reason, "cannot load users.json");
        }
        other => panic!("unexpected status: {:?}", other),
    }
}

/// Spec Discovery
///
/// Spec files come from the `tests` patterns and run in discovery order.
#[tokio::test]
async fn specs_are_read_from_test_patterns() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let focused = dir.path().join("focusedSpec.js");
    let plain = dir.path().join("plainSpec.js");
    std::fs::write(&focused, "// Karma environment\n// focus: true\n").unwrap();
    std::fs::write(&plain, "describe('plain', () => {});").unwrap();

    let mut config = Config::default();
    config.environments.tests = vec!["**/*Spec.js".to_string()];
    let mut runner =
        EnvironmentRunner::new(config, DefinitionStore::new(), MethodRegistry::new()).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let discovery = {
        let seen = seen.clone();
        let found = vec![plain.clone(), focused.clone()];
        move |patterns: &[String]| -> Result<Vec<PathBuf>> {
            seen.lock().extend_from_slice(patterns);
            Ok(found.clone())
        }
    };
    let specs = runner.discover_specs(&discovery).unwrap();
    assert_eq!(*seen.lock(), ["**/*Spec.js"]);
    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].path, plain);
    assert_eq!(specs[0].source, "describe('plain', () => {});");

    let report = runner.run(&specs).await;
    assert!(report.focused);
    assert!(matches!(
        report.outcome(&plain).unwrap().status,
        FileStatus::Skipped(SkipReason::Unfocused)
    ));
    assert!(matches!(
        report.outcome(&focused).unwrap().status,
        FileStatus::Executed { steps: 0 }
    ));
}

#[test]
fn missing_spec_file_is_an_io_error() {
    let runner =
        EnvironmentRunner::new(Config::default(), DefinitionStore::new(), MethodRegistry::new())
            .unwrap();
    let err = runner
        .discover_specs(&|_: &[String]| -> Result<Vec<PathBuf>> {
            Ok(vec![PathBuf::from("/nowhere/goneSpec.js")])
        })
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}
