//! Drives one compile task from a detection result to a new baseline.

use std::collections::BTreeMap;
use std::path::PathBuf;

use stitch_cache::{
    detect, BuildRecord, ChangeSet, Decision, Detection, HistoryStore, PropertySnapshot,
};

use crate::compiler::{ChangedFile, CompileMode, CompileReport, CompileRequest, Compiler};
use crate::error::CompileError;
use crate::task::{CompileTask, SOURCES_PROPERTY};

/// What one task produced this run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOutcome {
    /// The mode the compiler ran in, or `None` when it was not invoked.
    pub mode: Option<CompileMode>,
    /// Source files handed to the compiler.
    pub compiled: Vec<ChangedFile>,
    /// Outputs produced for the compiled files.
    pub outputs: Vec<PathBuf>,
    /// Keys of compiled files whose output could not be located.
    pub unresolved: Vec<String>,
}

impl CompileOutcome {
    /// Returns `true` if the compiler was not invoked.
    pub fn is_skipped(&self) -> bool {
        self.mode.is_none()
    }
}

/// Runs compile tasks against a history store.
#[derive(Debug, Clone)]
pub struct CompileOrchestrator {
    store: HistoryStore,
}

impl CompileOrchestrator {
    /// Creates an orchestrator persisting baselines into `store`.
    pub fn new(store: HistoryStore) -> Self {
        Self { store }
    }

    /// The backing history store.
    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Detects changes for `task` and compiles accordingly.
    pub fn run(
        &self,
        task: &CompileTask,
        compiler: &dyn Compiler,
    ) -> Result<CompileOutcome, CompileError> {
        let detection = detect(&self.store, &task.inputs)?;
        self.compile_incrementally(task, detection, compiler)
    }

    /// Acts on a detection result.
    ///
    /// The baseline is written only after the compiler succeeds. On any error
    /// the stored record is left exactly as it was.
    pub fn compile_incrementally(
        &self,
        task: &CompileTask,
        detection: Detection,
        compiler: &dyn Compiler,
    ) -> Result<CompileOutcome, CompileError> {
        match detection.decision {
            Decision::Skip => Ok(CompileOutcome::default()),
            Decision::Full(_) => self.compile_full(task, &detection.current, compiler),
            Decision::Incremental(changes) => {
                self.compile_changes(task, &changes, detection.current, compiler)
            }
        }
    }

    fn compile_full(
        &self,
        task: &CompileTask,
        current: &BTreeMap<String, PropertySnapshot>,
        compiler: &dyn Compiler,
    ) -> Result<CompileOutcome, CompileError> {
        let key = task.key();
        let sources = current
            .get(SOURCES_PROPERTY)
            .map(|snapshot| task.relevant_sources(snapshot))
            .unwrap_or_default();
        if sources.is_empty() {
            tracing::info!("{key} empty source, skipped compile");
            return Ok(CompileOutcome::default());
        }

        let request = CompileRequest {
            mode: CompileMode::Full,
            sources,
            added: Vec::new(),
            modified: Vec::new(),
            removed: Vec::new(),
            output_dir: task.output_dir.clone(),
            classpath: task.classpath.clone(),
        };
        let report = compiler.compile(&request)?;

        let baseline = settle_baseline(key, current, task.inputs.snapshot()?);
        self.store.put(key, &BuildRecord::success(key, baseline))?;

        Ok(summarize(task, compiler, request, &report))
    }

    fn compile_changes(
        &self,
        task: &CompileTask,
        changes: &[ChangeSet],
        current: BTreeMap<String, PropertySnapshot>,
        compiler: &dyn Compiler,
    ) -> Result<CompileOutcome, CompileError> {
        let key = task.key();
        let (mut added, mut modified, mut removed) = (Vec::new(), Vec::new(), Vec::new());
        for set in changes {
            added.extend(set.added.iter().map(|k| task.changed_file(k)));
            modified.extend(set.modified.iter().map(|k| task.changed_file(k)));
            removed.extend(set.removed.iter().map(|k| task.changed_file(k)));
        }

        let request = CompileRequest {
            mode: CompileMode::Incremental,
            sources: added.iter().chain(&modified).cloned().collect(),
            added,
            modified,
            removed,
            output_dir: task.output_dir.clone(),
            classpath: task.classpath.clone(),
        };
        let report = compiler.compile(&request)?;
        self.store.put(key, &BuildRecord::success(key, current))?;

        Ok(summarize(task, compiler, request, &report))
    }
}

/// Picks the baseline to persist after a full compile.
///
/// A property whose fingerprint changed while the compiler ran keeps its
/// pre-compile snapshot, so the next run sees those edits as changes.
fn settle_baseline(
    key: &str,
    before: &BTreeMap<String, PropertySnapshot>,
    after: BTreeMap<String, PropertySnapshot>,
) -> BTreeMap<String, PropertySnapshot> {
    after
        .into_iter()
        .map(|(name, snapshot)| match before.get(&name) {
            Some(previous) if previous.aggregate != snapshot.aggregate => {
                tracing::warn!("{key} {name} changed during compile, keeping pre-compile baseline");
                (name, previous.clone())
            }
            _ => (name, snapshot),
        })
        .collect()
}

/// Maps compiled sources to outputs: explicit mapping first, then the
/// naming rule's primary and alternate names.
fn summarize(
    task: &CompileTask,
    compiler: &dyn Compiler,
    request: CompileRequest,
    report: &CompileReport,
) -> CompileOutcome {
    let key = task.key();
    let mut outputs = Vec::new();
    let mut unresolved = Vec::new();

    for file in &request.sources {
        let mapped = report.mapping.as_ref().and_then(|m| m.get(&file.path));
        if let Some(mapped) = mapped {
            outputs.extend(mapped.iter().cloned());
            continue;
        }
        match compiler.naming().resolve(&file.key, &task.output_dir) {
            Some(output) => outputs.push(output),
            None => {
                tracing::warn!("{key} unresolved output mapping for {}", file.key);
                unresolved.push(file.key.clone());
            }
        }
    }

    tracing::info!("{key} compiled {} file(s)", request.sources.len());
    for file in &request.sources {
        tracing::info!("  compiled {}", file.key);
    }

    CompileOutcome {
        mode: Some(request.mode),
        compiled: request.sources,
        outputs,
        unresolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use stitch_cache::{FullReason, InputProperty, Normalization, TaskInputs};
    use tracing_test::traced_test;

    use crate::naming::NamingRule;

    /// Writes one output per compiled source under a chosen name.
    struct FakeCompiler {
        naming: NamingRule,
        calls: Mutex<Vec<CompileRequest>>,
        fail: bool,
        write: fn(&NamingRule, &str, &Path) -> Option<PathBuf>,
        mapping: bool,
    }

    impl FakeCompiler {
        fn new() -> Self {
            Self {
                naming: NamingRule::SameStem {
                    extension: "class".to_string(),
                },
                calls: Mutex::new(Vec::new()),
                fail: false,
                write: |rule, key, out| Some(rule.primary(key, out)),
                mapping: false,
            }
        }

        fn calls(&self) -> Vec<CompileRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Compiler for FakeCompiler {
        fn compile(&self, request: &CompileRequest) -> Result<CompileReport, CompileError> {
            self.calls.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(CompileError::Tool {
                    program: "fake".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: "broken".to_string(),
                });
            }
            for removed in &request.removed {
                let _ = std::fs::remove_file(self.naming.primary(&removed.key, &request.output_dir));
            }
            let mut mapping = BTreeMap::new();
            for source in &request.sources {
                if let Some(out) = (self.write)(&self.naming, &source.key, &request.output_dir) {
                    std::fs::create_dir_all(out.parent().unwrap()).unwrap();
                    std::fs::write(&out, b"compiled").unwrap();
                    mapping.insert(source.path.clone(), vec![out]);
                }
            }
            Ok(CompileReport {
                mapping: self.mapping.then_some(mapping),
            })
        }

        fn naming(&self) -> &NamingRule {
            &self.naming
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        task: CompileTask,
        orchestrator: CompileOrchestrator,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().to_path_buf();
            let src = root.join("src");
            std::fs::create_dir_all(src.join("pkg")).unwrap();
            std::fs::write(src.join("pkg/A.java"), "class A {}").unwrap();
            std::fs::write(src.join("pkg/B.java"), "class B {}").unwrap();

            let output_dir = root.join("out");
            let task = CompileTask {
                module: "app".to_string(),
                inputs: TaskInputs {
                    task_key: ":app:compileJava".to_string(),
                    properties: vec![InputProperty {
                        name: SOURCES_PROPERTY.to_string(),
                        paths: vec![src.clone()],
                        roots: vec![src.clone()],
                        normalization: Normalization::RelativePath,
                        incremental: true,
                    }],
                    outputs: vec![output_dir.clone()],
                    source_extensions: vec!["java".to_string()],
                },
                output_dir,
                classpath: vec![],
                source_roots: vec![src],
            };
            let store = HistoryStore::open(&root.join("history"), "0.1.0");
            Self {
                _dir: dir,
                root,
                task,
                orchestrator: CompileOrchestrator::new(store),
            }
        }

        fn src(&self, rel: &str) -> PathBuf {
            self.root.join("src").join(rel)
        }

        fn record_bytes(&self) -> Vec<u8> {
            std::fs::read(self.orchestrator.store().record_path(self.task.key())).unwrap()
        }
    }

    #[test]
    fn first_run_is_full_and_records_baseline() {
        let fx = Fixture::new();
        let compiler = FakeCompiler::new();

        let outcome = fx.orchestrator.run(&fx.task, &compiler).unwrap();
        assert_eq!(outcome.mode, Some(CompileMode::Full));
        assert_eq!(outcome.compiled.len(), 2);
        assert_eq!(
            outcome.outputs,
            vec![fx.root.join("out/pkg/A.class"), fx.root.join("out/pkg/B.class")]
        );
        assert!(outcome.unresolved.is_empty());
        assert!(fx.orchestrator.store().get(fx.task.key()).unwrap().is_some());
    }

    #[test]
    fn unchanged_inputs_skip_compiler() {
        let fx = Fixture::new();
        let compiler = FakeCompiler::new();
        fx.orchestrator.run(&fx.task, &compiler).unwrap();

        let outcome = fx.orchestrator.run(&fx.task, &compiler).unwrap();
        assert!(outcome.is_skipped());
        assert_eq!(compiler.calls().len(), 1);
    }

    #[test]
    fn changes_are_passed_explicitly() {
        let fx = Fixture::new();
        let compiler = FakeCompiler::new();
        fx.orchestrator.run(&fx.task, &compiler).unwrap();

        std::fs::write(fx.src("pkg/A.java"), "class A { int x; }").unwrap();
        std::fs::write(fx.src("pkg/C.java"), "class C {}").unwrap();
        std::fs::remove_file(fx.src("pkg/B.java")).unwrap();

        let outcome = fx.orchestrator.run(&fx.task, &compiler).unwrap();
        assert_eq!(outcome.mode, Some(CompileMode::Incremental));

        let request = compiler.calls().pop().unwrap();
        let keys = |files: &[ChangedFile]| files.iter().map(|f| f.key.clone()).collect::<Vec<_>>();
        assert_eq!(keys(&request.added), vec!["pkg/C.java"]);
        assert_eq!(keys(&request.modified), vec!["pkg/A.java"]);
        assert_eq!(keys(&request.removed), vec!["pkg/B.java"]);
        assert_eq!(keys(&request.sources), vec!["pkg/C.java", "pkg/A.java"]);
        assert_eq!(request.added[0].path, fx.src("pkg/C.java"));
        assert!(!fx.root.join("out/pkg/B.class").exists());

        // The new baseline makes the next run a skip.
        assert!(fx.orchestrator.run(&fx.task, &compiler).unwrap().is_skipped());
    }

    #[test]
    fn failed_compile_leaves_baseline_untouched() {
        let fx = Fixture::new();
        fx.orchestrator.run(&fx.task, &FakeCompiler::new()).unwrap();
        let before = fx.record_bytes();

        std::fs::write(fx.src("pkg/A.java"), "class A { oops").unwrap();
        let failing = FakeCompiler {
            fail: true,
            ..FakeCompiler::new()
        };
        let err = fx.orchestrator.run(&fx.task, &failing).unwrap_err();
        assert!(matches!(err, CompileError::Tool { .. }));
        assert_eq!(fx.record_bytes(), before);

        // The same change is detected again on the next run.
        let retry = FakeCompiler::new();
        let outcome = fx.orchestrator.run(&fx.task, &retry).unwrap();
        assert_eq!(outcome.mode, Some(CompileMode::Incremental));
        assert_eq!(outcome.compiled[0].key, "pkg/A.java");
    }

    #[test]
    fn invalidated_baseline_forces_full() {
        let fx = Fixture::new();
        let compiler = FakeCompiler::new();
        fx.orchestrator.run(&fx.task, &compiler).unwrap();
        assert!(fx.orchestrator.store().invalidate(fx.task.key()).unwrap());

        let detection = detect(fx.orchestrator.store(), &fx.task.inputs).unwrap();
        assert_eq!(detection.decision, Decision::Full(FullReason::FailedBaseline));
        let outcome = fx
            .orchestrator
            .compile_incrementally(&fx.task, detection, &compiler)
            .unwrap();
        assert_eq!(outcome.mode, Some(CompileMode::Full));
        assert!(fx.orchestrator.run(&fx.task, &compiler).unwrap().is_skipped());
    }

    #[test]
    fn explicit_mapping_wins() {
        let fx = Fixture::new();
        let compiler = FakeCompiler {
            write: |_, key, out| Some(out.join(key.replace(".java", ".bin"))),
            mapping: true,
            ..FakeCompiler::new()
        };
        let outcome = fx.orchestrator.run(&fx.task, &compiler).unwrap();
        assert_eq!(
            outcome.outputs,
            vec![fx.root.join("out/pkg/A.bin"), fx.root.join("out/pkg/B.bin")]
        );
        assert!(outcome.unresolved.is_empty());
    }

    #[test]
    fn alternate_name_is_probed() {
        let fx = Fixture::new();
        let compiler = FakeCompiler {
            naming: NamingRule::FacadeSuffix {
                extension: "class".to_string(),
                suffix: "Kt".to_string(),
            },
            write: |rule, key, out| rule.alternate(key, out),
            ..FakeCompiler::new()
        };
        let outcome = fx.orchestrator.run(&fx.task, &compiler).unwrap();
        assert_eq!(
            outcome.outputs,
            vec![
                fx.root.join("out/pkg/AKt.class"),
                fx.root.join("out/pkg/BKt.class")
            ]
        );
    }

    #[traced_test]
    #[test]
    fn edits_during_full_compile_stay_pending() {
        let fx = Fixture::new();
        // Rewrites each source after "reading" it, as an editor saving mid-build would.
        let compiler = FakeCompiler {
            write: |rule, key, out| {
                let src = out.parent().unwrap().join("src").join(key);
                std::fs::write(src, "class Edited {}").unwrap();
                Some(rule.primary(key, out))
            },
            ..FakeCompiler::new()
        };
        let outcome = fx.orchestrator.run(&fx.task, &compiler).unwrap();
        assert_eq!(outcome.mode, Some(CompileMode::Full));
        assert!(logs_contain("sources changed during compile"));

        let detection = detect(fx.orchestrator.store(), &fx.task.inputs).unwrap();
        match detection.decision {
            Decision::Incremental(changes) => {
                let modified: Vec<_> = changes.iter().flat_map(|c| c.modified.iter()).collect();
                assert_eq!(modified, vec!["pkg/A.java", "pkg/B.java"]);
            }
            other => panic!("expected incremental, got {other:?}"),
        }
    }

    #[traced_test]
    #[test]
    fn unresolved_mapping_is_a_warning() {
        let fx = Fixture::new();
        // Produces an unrelated file so the output directory is not empty.
        let compiler = FakeCompiler {
            write: |_, _, out| Some(out.join("Other.class")),
            ..FakeCompiler::new()
        };
        let outcome = fx.orchestrator.run(&fx.task, &compiler).unwrap();
        assert_eq!(outcome.mode, Some(CompileMode::Full));
        assert_eq!(outcome.unresolved, vec!["pkg/A.java", "pkg/B.java"]);
        assert!(outcome.outputs.is_empty());
        assert!(logs_contain("unresolved output mapping for pkg/A.java"));
        assert!(fx.orchestrator.store().get(fx.task.key()).unwrap().is_some());
    }

    #[traced_test]
    #[test]
    fn empty_sources_skip_without_baseline() {
        let fx = Fixture::new();
        std::fs::remove_file(fx.src("pkg/A.java")).unwrap();
        std::fs::remove_file(fx.src("pkg/B.java")).unwrap();
        let compiler = FakeCompiler::new();

        let outcome = fx.orchestrator.run(&fx.task, &compiler).unwrap();
        assert!(outcome.is_skipped());
        assert!(compiler.calls().is_empty());
        assert!(fx.orchestrator.store().get(fx.task.key()).unwrap().is_none());
        assert!(logs_contain(":app:compileJava empty source, skipped compile"));
    }
}
