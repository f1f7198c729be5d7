use std::collections::{BTreeMap, HashSet};
use std::process::Command;

use anyhow::Context as _;
use console::style;
use glob::Pattern;
use rayon::prelude::*;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::config::EngineConfig;
use crate::core::Hash32;
use crate::engine::state::{Record, State};
use crate::engine::{Engine, Report, qualified};
use crate::error::EngineError;
use crate::generator::{Producer, TaskTable};
use crate::task::{Action, Task};
use crate::utils::{catch_panic, get_style_group};

/// A small sequential engine.
///
/// Selectors may be a group id (`build`), a single task qualified with its
/// group (`build:static:copy`), or a glob pattern over group ids
/// (`*build`). Before a group is enumerated, the group it waits on is run,
/// all the way back to the first group. Each task runs at most once per
/// invocation. A task declaring `file_dep` is skipped when those files
/// didn't change since its last successful run and all of its `targets`
/// still exist; pass `--always` to run it anyway. Tasks without `file_dep`
/// always run, whether or not their targets exist.
#[derive(Debug, Default)]
pub struct Runner;

impl Runner {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for Runner {
    fn run(
        &mut self,
        table: &TaskTable,
        config: &EngineConfig,
        args: &[String],
    ) -> Result<Report, EngineError> {
        let mut always = false;
        let mut selections = Vec::new();

        for arg in args {
            match arg.strip_prefix("--") {
                Some("always") => always = true,
                Some(_) => return Err(EngineError::UnknownFlag(arg.clone())),
                None => selections.extend(select(table, arg)?),
            }
        }

        let state = State::load(&config.dep_file, config.backend)?;

        let mut session = Session {
            table,
            config,
            state,
            always,
            done: HashSet::new(),
            active: HashSet::new(),
            finished: HashSet::new(),
            report: Report::default(),
        };

        let result = selections.iter().try_for_each(|selection| match selection {
            Selection::Group(id) => session.run_group(id),
            Selection::Task(group, name) => session.run_single(group, name),
        });

        // Successful tasks are remembered even if a later one failed.
        let saved = session.state.save(&config.dep_file, config.backend);
        result?;
        saved?;

        Ok(session.report)
    }
}

enum Selection<'t> {
    Group(&'t str),
    Task(&'t str, String),
}

fn select<'t>(table: &'t TaskTable, selector: &str) -> Result<Vec<Selection<'t>>, EngineError> {
    if let Some(producer) = table.get(selector) {
        return Ok(vec![Selection::Group(producer.id())]);
    }

    if let Some(group) = owning_group(table, selector) {
        return Ok(vec![Selection::Task(group, selector.to_owned())]);
    }

    if selector.contains(['*', '?', '['])
        && let Ok(pattern) = Pattern::new(selector)
    {
        let matched: Vec<_> = table
            .ids()
            .filter(|id| pattern.matches(id))
            .map(Selection::Group)
            .collect();

        if !matched.is_empty() {
            return Ok(matched);
        }
    }

    Err(EngineError::UnknownTask(selector.to_owned()))
}

/// Finds the group a qualified task name belongs to. The longest match wins,
/// since with a task prefix one group id may be a prefix of another.
fn owning_group<'t>(table: &'t TaskTable, name: &str) -> Option<&'t str> {
    table
        .ids()
        .filter(|id| {
            name.strip_prefix(id)
                .is_some_and(|rest| rest.starts_with(':'))
        })
        .max_by_key(|id| id.len())
}

struct Session<'t> {
    table: &'t TaskTable,
    config: &'t EngineConfig,
    state: State,
    always: bool,
    done: HashSet<&'t str>,
    /// Groups currently being run, used to detect `task_dep` loops.
    active: HashSet<&'t str>,
    /// Qualified names of tasks already run or found up to date.
    finished: HashSet<String>,
    report: Report,
}

impl<'t> Session<'t> {
    fn producer(&self, id: &str) -> Result<&'t Producer, EngineError> {
        self.table
            .get(id)
            .ok_or_else(|| EngineError::UnknownTask(id.to_owned()))
    }

    fn run_group(&mut self, id: &str) -> Result<(), EngineError> {
        let producer = self.producer(id)?;
        let id = producer.id();

        if self.done.contains(id) {
            return Ok(());
        }

        if !self.active.insert(id) {
            return Err(EngineError::Cycle(id.to_owned()));
        }

        let result = self.prepare(producer).and_then(|tasks| {
            for task in &tasks {
                self.execute(id, task)?;
            }
            Ok(())
        });

        self.active.remove(id);
        result?;
        self.done.insert(id);

        Ok(())
    }

    fn run_single(&mut self, group: &str, name: &str) -> Result<(), EngineError> {
        let producer = self.producer(group)?;
        let group = producer.id();

        // every task of a finished group is accounted for already
        if self.done.contains(group) {
            if !self.finished.contains(name) {
                return Err(EngineError::UnknownTask(name.to_owned()));
            }
            return Ok(());
        }

        if !self.active.insert(group) {
            return Err(EngineError::Cycle(group.to_owned()));
        }

        let result = self.prepare(producer).and_then(|tasks| {
            let task = tasks
                .iter()
                .find(|task| qualified(group, &task.name) == name)
                .ok_or_else(|| EngineError::UnknownTask(name.to_owned()))?;

            self.execute(group, task)
        });

        self.active.remove(group);
        result
    }

    /// Runs whatever the group waits on, then pulls its tasks.
    fn prepare(&mut self, producer: &'t Producer) -> Result<Vec<Task>, EngineError> {
        let table = self.table;
        let id = producer.id();

        if let Some(prev) = table.predecessor(id) {
            self.run_group(prev.id())?;
        }

        let span = tracing::info_span!("group", id);
        span.pb_set_style(&get_style_group());
        span.pb_set_message(&format!("Enumerating {id}"));
        let _enter = span.enter();

        let tasks = producer.enumerate().collect::<Result<Vec<_>, _>>()?;
        tracing::debug!("[{id}] {} task(s)", tasks.len());

        Ok(tasks)
    }

    fn execute(&mut self, group: &str, task: &Task) -> Result<(), EngineError> {
        let table = self.table;
        let name = qualified(group, &task.name);

        if self.finished.contains(&name) {
            return Ok(());
        }

        for dep in &task.task_dep {
            let target = match table.get(dep) {
                Some(producer) => producer.id(),
                None => owning_group(table, dep)
                    .ok_or_else(|| EngineError::UnknownTask(dep.clone()))?,
            };
            self.run_group(target)?;
        }

        let record = if task.file_dep.is_empty() {
            None
        } else {
            Some(fingerprint(&name, task)?)
        };

        if !self.always
            && let Some(record) = &record
            && self.state.is_up_to_date(&name, record, &task.targets)
        {
            self.announce(&name, false);
            self.finished.insert(name.clone());
            self.report.up_to_date.push(name);
            return Ok(());
        }

        self.announce(&name, true);

        for action in &task.actions {
            if let Err(err) = perform(action, self.config.verbosity) {
                self.state.forget(&name);
                return Err(EngineError::Action(name, err));
            }
        }

        if let Some(record) = record {
            self.state.record(name.clone(), record);
        }

        self.finished.insert(name.clone());
        self.report.executed.push(name);
        Ok(())
    }

    fn announce(&self, name: &str, running: bool) {
        if self.config.verbosity == 0 {
            return;
        }

        if running {
            tracing::info!("{} {name}", style(".").green());
        } else {
            tracing::info!("{} {name}", style("--").blue());
        }
    }
}

/// Hashes every `file_dep` of the task.
fn fingerprint(name: &str, task: &Task) -> Result<Record, EngineError> {
    let deps = task
        .file_dep
        .par_iter()
        .map(|path| match Hash32::hash_file(path) {
            Ok(hash) => Ok((path.clone(), hash.to_hex())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(
                EngineError::MissingDependency(name.to_owned(), path.clone()),
            ),
            Err(err) => Err(EngineError::Io(err)),
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(Record { deps })
}

fn perform(action: &Action, verbosity: u8) -> anyhow::Result<()> {
    match action {
        Action::Func(func) => catch_panic(|| func()),
        Action::Cmd(argv) => {
            let (program, args) = argv
                .split_first()
                .ok_or_else(|| anyhow::anyhow!("empty command"))?;

            let mut command = Command::new(program);
            command.args(args);

            if verbosity >= 2 {
                let status = command
                    .status()
                    .with_context(|| format!("couldn't spawn `{program}`"))?;

                anyhow::ensure!(status.success(), "`{}` exited with {status}", argv.join(" "));
            } else {
                let output = command
                    .output()
                    .with_context(|| format!("couldn't spawn `{program}`"))?;

                anyhow::ensure!(
                    output.status.success(),
                    "`{}` exited with {}\n{}",
                    argv.join(" "),
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                );
            }

            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::{Arc, Mutex};

    use camino::Utf8PathBuf;

    use super::*;
    use crate::addon::{Addon, FnAddon};
    use crate::config::ManagerConfig;
    use crate::generator::build_task_table;
    use crate::lattice::Lattice;
    use crate::registry::Addons;
    use crate::{Context, EngineError};

    type Log = Arc<Mutex<Vec<String>>>;

    fn scratch(name: &str) -> Utf8PathBuf {
        let dir = Utf8PathBuf::try_from(std::env::temp_dir())
            .unwrap()
            .join(format!("shikumi-runner-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config(dir: &Utf8PathBuf) -> EngineConfig {
        EngineConfig::default()
            .dep_file(dir.join(".state.db"))
            .verbosity(0)
    }

    fn logged(log: &Log, name: &str) -> Task {
        let log = log.clone();
        let entry = name.to_string();
        Task::new(name).action(Action::func(move || {
            log.lock().unwrap().push(entry.clone());
            Ok(())
        }))
    }

    fn table(lattice: &Lattice, strict: bool, addons: Vec<(&str, Arc<dyn Addon>)>) -> TaskTable {
        let addons: Addons<()> = addons
            .into_iter()
            .map(|(name, addon)| (name.to_string(), addon))
            .collect();
        let context = Arc::new(Context::new(ManagerConfig::default().strict(strict), ()));
        build_task_table(lattice, &addons, &context)
    }

    fn two_hooks() -> Lattice {
        Lattice::new(["init", "build"], [("build", "init")]).unwrap()
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// `static` seeds in `init` and prepares in `pre_build`, `content`
    /// copies in `build`.
    fn site(log: &Log) -> Vec<(&'static str, Arc<dyn Addon>)> {
        let (a, b, c) = (log.clone(), log.clone(), log.clone());

        let stat: Arc<dyn Addon> = Arc::new(
            FnAddon::<()>::new()
                .on("init", move |_| Ok(vec![logged(&a, "seed")]))
                .on("pre_build", move |_| Ok(vec![logged(&b, "prep")])),
        );
        let content: Arc<dyn Addon> =
            Arc::new(FnAddon::<()>::new().on("build", move |_| Ok(vec![logged(&c, "copy")])));

        vec![("static", stat), ("content", content)]
    }

    #[test]
    fn test_predecessors_run_first() {
        let dir = scratch("order");
        let log = Log::default();
        let table = table(&two_hooks(), true, site(&log));

        let report = Runner::new()
            .run(&table, &config(&dir), &args(&["build"]))
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["seed", "prep", "copy"]);
        assert_eq!(
            report.executed,
            vec!["init:static:seed", "pre_build:static:prep", "build:content:copy"]
        );
    }

    #[test]
    fn test_enumeration_waits_for_predecessor() {
        let dir = scratch("deferred");
        let marker = dir.join("seeded");

        let writer = marker.clone();
        let reader = marker.clone();
        let addon: Arc<dyn Addon> = Arc::new(
            FnAddon::<()>::new()
                .on("init", move |_| {
                    let writer = writer.clone();
                    Ok(vec![Task::new("seed").action(Action::func(move || {
                        fs::write(&writer, "x")?;
                        Ok(())
                    }))])
                })
                .on("build", move |_| {
                    // task list depends on what `init` left on disk
                    anyhow::ensure!(reader.exists(), "init didn't run yet");
                    Ok(vec![Task::new("copy")])
                }),
        );

        let table = table(&two_hooks(), true, vec![("static", addon)]);
        let report = Runner::new()
            .run(&table, &config(&dir), &args(&["build"]))
            .unwrap();

        assert!(report.executed.contains(&"build:static:copy".to_string()));
    }

    #[test]
    fn test_single_task_and_patterns() {
        let dir = scratch("select");
        let log = Log::default();
        let table = table(&two_hooks(), true, site(&log));

        let report = Runner::new()
            .run(&table, &config(&dir), &args(&["pre_build:static:prep"]))
            .unwrap();
        assert_eq!(report.executed, vec!["init:static:seed", "pre_build:static:prep"]);

        let report = Runner::new()
            .run(&table, &config(&dir), &args(&["*init"]))
            .unwrap();
        assert_eq!(report.executed, vec!["init:static:seed"]);
    }

    #[test]
    fn test_unknown_selectors_and_flags() {
        let dir = scratch("unknown");
        let table = table(&two_hooks(), true, vec![]);

        let err = Runner::new()
            .run(&table, &config(&dir), &args(&["deploy"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownTask(name) if name == "deploy"));

        let err = Runner::new()
            .run(&table, &config(&dir), &args(&["build:static:nothing"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownTask(_)));

        let err = Runner::new()
            .run(&table, &config(&dir), &args(&["build", "--fast"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownFlag(_)));
    }

    #[test]
    fn test_up_to_date_tasks_are_skipped() {
        let dir = scratch("stale");
        let source = dir.join("index.md");
        let target = dir.join("dist/index.html");
        fs::write(&source, "# hello").unwrap();

        let (src, dst) = (source.clone(), target.clone());
        let addon: Arc<dyn Addon> = Arc::new(FnAddon::<()>::new().on("build", move |_| {
            let (src, dst) = (src.clone(), dst.clone());
            Ok(vec![
                Task::new("render")
                    .file_dep(src.clone())
                    .target(dst.clone())
                    .action(Action::func(move || {
                        fs::create_dir_all(dst.parent().unwrap())?;
                        fs::copy(&src, &dst)?;
                        Ok(())
                    })),
            ])
        }));

        let table = table(&two_hooks(), true, vec![("content", addon)]);
        let config = config(&dir);
        let run = |extra: &[&str]| {
            let mut list = vec!["build"];
            list.extend(extra);
            Runner::new().run(&table, &config, &args(&list)).unwrap()
        };

        assert_eq!(run(&[]).executed, vec!["build:content:render"]);
        assert_eq!(run(&[]).up_to_date, vec!["build:content:render"]);
        assert_eq!(run(&["--always"]).executed, vec!["build:content:render"]);

        fs::write(&source, "# changed").unwrap();
        assert_eq!(run(&[]).executed, vec!["build:content:render"]);

        fs::remove_file(&target).unwrap();
        assert_eq!(run(&[]).executed, vec!["build:content:render"]);
    }

    #[test]
    fn test_group_and_its_task_run_once() {
        let dir = scratch("once");
        let log = Log::default();
        let table = table(&two_hooks(), true, site(&log));

        let report = Runner::new()
            .run(&table, &config(&dir), &args(&["build", "build:content:copy", "init"]))
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["seed", "prep", "copy"]);
        assert_eq!(
            report.executed,
            vec!["init:static:seed", "pre_build:static:prep", "build:content:copy"]
        );

        let err = Runner::new()
            .run(&table, &config(&dir), &args(&["build", "build:content:nothing"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownTask(name) if name == "build:content:nothing"));
    }

    #[test]
    fn test_single_task_then_group_runs_once() {
        let dir = scratch("once-reverse");
        let log = Log::default();
        let table = table(&two_hooks(), true, site(&log));

        let report = Runner::new()
            .run(&table, &config(&dir), &args(&["build:content:copy", "build"]))
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["seed", "prep", "copy"]);
        assert_eq!(report.executed.len(), 3);
    }

    #[test]
    fn test_targets_without_file_dep_always_run() {
        let dir = scratch("targets-only");
        let target = dir.join("dist");
        fs::create_dir_all(&target).unwrap();

        let log = Log::default();
        let (out, entry) = (target.clone(), log.clone());
        let addon: Arc<dyn Addon> = Arc::new(FnAddon::<()>::new().on("init", move |_| {
            Ok(vec![logged(&entry, "copy").target(out.clone())])
        }));

        let table = table(&two_hooks(), true, vec![("static", addon)]);
        let config = config(&dir);

        for _ in 0..2 {
            let report = Runner::new().run(&table, &config, &args(&["init"])).unwrap();
            assert_eq!(report.executed, vec!["init:static:copy"]);
            assert!(report.up_to_date.is_empty());
        }

        assert_eq!(*log.lock().unwrap(), vec!["copy", "copy"]);
    }

    #[test]
    fn test_missing_file_dep() {
        let dir = scratch("missing");
        let addon: Arc<dyn Addon> = Arc::new(
            FnAddon::<()>::new().on("build", |_| Ok(vec![Task::new("render").file_dep("no/such.md")])),
        );
        let table = table(&two_hooks(), true, vec![("content", addon)]);

        let err = Runner::new()
            .run(&table, &config(&dir), &args(&["build"]))
            .unwrap_err();

        assert!(matches!(err, EngineError::MissingDependency(task, _) if task == "build:content:render"));
    }

    #[test]
    fn test_strict_generation_error_aborts_run() {
        let dir = scratch("strict");
        let log = Log::default();
        let later = log.clone();

        let broken: Arc<dyn Addon> = Arc::new(FnAddon::<()>::new().on("init", |_| -> anyhow::Result<Vec<Task>> {
            anyhow::bail!("no site template")
        }));
        let content: Arc<dyn Addon> =
            Arc::new(FnAddon::<()>::new().on("build", move |_| Ok(vec![logged(&later, "copy")])));

        let table = table(&two_hooks(), true, vec![("static", broken), ("content", content)]);
        let err = Runner::new()
            .run(&table, &config(&dir), &args(&["build"]))
            .unwrap_err();

        assert!(matches!(err, EngineError::Generation(ref e) if e.attr == "init" && e.addon == "static"));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_lenient_generation_error_keeps_other_addons() {
        let dir = scratch("lenient");
        let log = Log::default();
        let report_log = log.clone();

        let settings: Arc<dyn Addon> = Arc::new(FnAddon::<()>::new().on(
            "post_build",
            |_| -> anyhow::Result<Vec<Task>> { anyhow::bail!("bad overrides.json") },
        ));
        let report: Arc<dyn Addon> = Arc::new(
            FnAddon::<()>::new().on("post_build", move |_| Ok(vec![logged(&report_log, "report")])),
        );

        let table = table(&two_hooks(), false, vec![("settings", settings), ("report", report)]);
        let result = Runner::new()
            .run(&table, &config(&dir), &args(&["post_build"]))
            .unwrap();

        assert_eq!(result.executed, vec!["post_build:report:report"]);
        assert_eq!(*log.lock().unwrap(), vec!["report"]);
    }

    #[test]
    fn test_failed_action_keeps_earlier_state() {
        let dir = scratch("failure");
        let source = dir.join("a.txt");
        fs::write(&source, "a").unwrap();

        let src = source.clone();
        let addon: Arc<dyn Addon> = Arc::new(
            FnAddon::<()>::new()
                .on("init", move |_| Ok(vec![Task::new("hash").file_dep(src.clone())]))
                .on("build", |_| {
                    Ok(vec![Task::new("explode").action(Action::func(|| anyhow::bail!("disk full")))])
                }),
        );

        let table = table(&two_hooks(), true, vec![("static", addon)]);
        let config = config(&dir);

        let err = Runner::new().run(&table, &config, &args(&["build"])).unwrap_err();
        assert!(matches!(err, EngineError::Action(name, _) if name == "build:static:explode"));

        let report = Runner::new().run(&table, &config, &args(&["init"])).unwrap();
        assert_eq!(report.up_to_date, vec!["init:static:hash"]);
    }

    #[test]
    fn test_task_dep_runs_other_group() {
        let dir = scratch("taskdep");
        let log = Log::default();
        let (a, b) = (log.clone(), log.clone());

        let serve: Arc<dyn Addon> =
            Arc::new(FnAddon::<()>::new().on("serve", move |_| Ok(vec![logged(&a, "serve")])));
        let archive: Arc<dyn Addon> = Arc::new(FnAddon::<()>::new().on("archive", move |_| {
            Ok(vec![logged(&b, "pack").task_dep("serve:serve:serve")])
        }));

        let table = table(&Lattice::lite(), true, vec![("serve", serve), ("archive", archive)]);
        Runner::new()
            .run(&table, &config(&dir), &args(&["archive"]))
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["serve", "pack"]);
    }

    #[test]
    fn test_task_dep_on_own_descendant_is_a_cycle() {
        let dir = scratch("cycle");
        let addon: Arc<dyn Addon> = Arc::new(
            FnAddon::<()>::new().on("build", |_| Ok(vec![Task::new("loop").task_dep("post_build")])),
        );

        let table = table(&two_hooks(), true, vec![("content", addon)]);
        let err = Runner::new()
            .run(&table, &config(&dir), &args(&["build"]))
            .unwrap_err();

        assert!(matches!(err, EngineError::Cycle(id) if id == "build"));
    }

    #[test]
    fn test_empty_command_fails() {
        let err = perform(&Action::Cmd(vec![]), 0).unwrap_err();
        assert_eq!(err.to_string(), "empty command");
    }
}
