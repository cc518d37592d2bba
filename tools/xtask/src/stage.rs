//! The web build: compile the game to wasm and stage it, with its assets, into `web/`.
//!
//! Staging is not atomic. If a step fails, whatever earlier steps wrote stays written,
//! and nothing is retried or rolled back. Re-running the whole build is always safe,
//! since every step only creates or overwrites.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use anyhow::Context as _;
use anyhow::Error as ActionError;
use strum::IntoEnumIterator as _;

use crate::context::Config;
use crate::fs_ops::{copy_file_with_context, copy_tree_contents, directory_tree_contents, ensure_dir};
use crate::layout::{ARTIFACT_NAME, AssetCategory, TARGET_WASM, WebLayout};
use crate::reporting::{CaptureTime, Timing, WithCommas};

// -------------------------------------------------------------------------------------------------

/// The steps of [`build_web()`], in the order they happen.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum Step {
    ResolveRoot,
    Compile,
    CreateOutputDir,
    CopyArtifact,
    CopyAssets,
    GenerateIndexes,
    CopyCategories,
}

/// Failure of a single filesystem operation or child process.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub(crate) enum StageError {
    #[error("could not find project directory {}", .path.display())]
    ResolveRoot {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("could not start `{command}`")]
    Spawn {
        command: String,
        #[source]
        error: io::Error,
    },

    #[error("`{command}` failed ({status})")]
    ProcessFailed { command: String, status: ExitStatus },

    #[error("could not create directory {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("could not copy {} to {}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("could not read directory tree {}", .path.display())]
    ReadTree {
        path: PathBuf,
        #[source]
        error: walkdir::Error,
    },
}

impl StageError {
    /// The exit code of the child process, if this is the failure of one that exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ProcessFailed { status, .. } => status.code(),
            _ => None,
        }
    }
}

/// [`build_web()`] stopped at `step`. Earlier steps' effects remain on disk.
#[derive(Debug, thiserror::Error)]
#[error("web build aborted at step “{step}”")]
pub(crate) struct Aborted {
    pub step: Step,
    #[source]
    pub error: StageError,
}

fn at(step: Step) -> impl FnOnce(StageError) -> Aborted {
    move |error| Aborted { step, error }
}

/// What a successful [`build_web()`] produced.
#[derive(Debug)]
pub(crate) struct Staged {
    pub output_dir: PathBuf,
    pub artifact_bytes: u64,
    /// Number of asset files copied, over all asset directories.
    pub asset_files: usize,
}

impl fmt::Display for Staged {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Web build staged in {}", self.output_dir.display())
    }
}

// -------------------------------------------------------------------------------------------------

/// Compile the game for wasm with the release profile, then copy the `.wasm` file and all
/// assets into the output directory of the project at `root`, and run the index generator.
pub(crate) fn build_web(
    config: &Config<'_>,
    root: &Path,
    time_log: &mut Vec<Timing>,
) -> Result<Staged, Aborted> {
    let layout = WebLayout::resolve(root).map_err(|error| Aborted {
        step: Step::ResolveRoot,
        error: StageError::ResolveRoot {
            path: root.to_owned(),
            error,
        },
    })?;
    // Child processes run in the project directory, wherever we were started.
    let _pushd = config.sh.push_dir(layout.root());

    {
        let _t = CaptureTime::new(time_log, format!("cargo build --release --target {TARGET_WASM}"));
        config
            .run(
                config
                    .cargo()
                    .arg("build")
                    .arg("--release")
                    .args(["--target", TARGET_WASM])
                    .arg("--manifest-path")
                    .arg(layout.manifest_path())
                    .args(config.cargo_build_args()),
            )
            .map_err(at(Step::Compile))?;
    }

    let output_dir = layout.output_dir();
    let artifact_bytes = {
        let _t = CaptureTime::new(time_log, "stage wasm");
        ensure_dir(&output_dir).map_err(at(Step::CreateOutputDir))?;
        let bytes = copy_file_with_context(&layout.compiled_artifact(), &layout.staged_artifact())
            .map_err(at(Step::CopyArtifact))?;
        log::info!(
            "{name:<30} {size} B",
            name = format!("{ARTIFACT_NAME}.wasm"),
            size = WithCommas(bytes)
        );
        bytes
    };

    let mut asset_files = {
        let _t = CaptureTime::new(time_log, "stage assets");
        stage_dir(&layout.assets_source(), &layout.assets_dest()).map_err(at(Step::CopyAssets))?
    };

    {
        let _t = CaptureTime::new(time_log, "generate asset indexes");
        config
            .run(config.sh.cmd(layout.index_generator()))
            .map_err(at(Step::GenerateIndexes))?;
    }

    {
        let _t = CaptureTime::new(time_log, "stage asset categories");
        for category in AssetCategory::iter() {
            asset_files += stage_dir(
                &layout.category_source(category),
                &layout.category_dest(category),
            )
            .map_err(at(Step::CopyCategories))?;
        }
    }

    Ok(Staged {
        output_dir,
        artifact_bytes,
        asset_files,
    })
}

/// Ensure `dst` exists and merge the contents of `src` into it.
fn stage_dir(src: &Path, dst: &Path) -> Result<usize, StageError> {
    ensure_dir(dst)?;
    let count = copy_tree_contents(src, dst)?;
    log::info!("copied {count} files into {}", dst.display());
    Ok(count)
}

// -------------------------------------------------------------------------------------------------

/// Delete the output directory. Returns the path removed, or [`None`] if there was none.
pub(crate) fn clean_web(layout: &WebLayout) -> Result<Option<PathBuf>, ActionError> {
    let output_dir = layout.output_dir();
    let metadata = match fs::symlink_metadata(&output_dir) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("checking {}", output_dir.display()));
        }
    };

    // Sanity checks before removing a whole tree.
    anyhow::ensure!(
        output_dir.parent() == Some(layout.root()),
        "refusing to remove {}: not directly inside {}",
        output_dir.display(),
        layout.root().display()
    );
    anyhow::ensure!(
        metadata.is_dir(),
        "refusing to remove {}: not a directory",
        output_dir.display()
    );

    fs::remove_dir_all(&output_dir)
        .with_context(|| format!("removing {}", output_dir.display()))?;
    Ok(Some(output_dir))
}

/// Paths in the output directory, relative to it, which [`build_web()`] would not have
/// copied there from the current sources.
///
/// Dot-files are not considered.
pub(crate) fn stale_web(layout: &WebLayout) -> Result<BTreeSet<PathBuf>, ActionError> {
    let output_dir = layout.output_dir();
    let staged = contents_if_exists(&output_dir)?;

    let assets = Path::new("assets");
    let mut expected = BTreeSet::from([
        PathBuf::from(format!("{ARTIFACT_NAME}.wasm")),
        assets.to_owned(),
    ]);
    expected.extend(
        contents_if_exists(&layout.assets_source())?
            .into_iter()
            .map(|path| assets.join(path)),
    );
    for category in AssetCategory::iter() {
        let category_dir = assets.join(category.dir_name());
        expected.extend(
            contents_if_exists(&layout.category_source(category))?
                .into_iter()
                .map(|path| category_dir.join(path)),
        );
        expected.insert(category_dir);
    }

    Ok(staged.difference(&expected).cloned().collect())
}

fn contents_if_exists(dir: &Path) -> Result<BTreeSet<PathBuf>, ActionError> {
    if !dir.exists() {
        return Ok(BTreeSet::new());
    }
    directory_tree_contents(dir, dir).with_context(|| format!("listing {}", dir.display()))
}

// -------------------------------------------------------------------------------------------------

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::os::unix::fs::PermissionsExt as _;
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use strum::IntoEnumIterator as _;
    use xshell::Shell;

    /// Held by every test that writes and runs scripts. Otherwise, a child forked by one test
    /// could inherit another test's still-open script file and make exec fail with ETXTBSY.
    static SCRIPTS: Mutex<()> = Mutex::new(());

    const FAKE_CARGO: &str = r#"
printf '%s\n' "$@" > cargo-args.txt
pwd -P > cargo-cwd.txt
mkdir -p target/wasm32-unknown-unknown/release
printf 'wasm' > target/wasm32-unknown-unknown/release/cropbots.wasm
"#;

    /// Lists what is in `web/assets` at the time it runs.
    const FAKE_INDEXER: &str = r#"
listing=$(ls web/assets)
printf '%s\n' "$listing" > web/assets/index.txt
"#;

    /// A project directory with an asset, empty category directories,
    /// and stand-ins for cargo and the index generator.
    pub(crate) struct Fixture {
        _guard: MutexGuard<'static, ()>,
        _temp: tempfile::TempDir,
        root: PathBuf,
        cargo: PathBuf,
    }

    impl Fixture {
        pub(crate) fn new() -> Self {
            let guard = SCRIPTS.lock().unwrap_or_else(PoisonError::into_inner);
            let temp = tempfile::tempdir().unwrap();
            let root = temp.path().join("cropbots");
            let cargo = temp.path().join("bin/cargo");

            fs::create_dir_all(root.join("src/assets")).unwrap();
            fs::write(root.join("Cargo.toml"), "[package]\nname = \"cropbots\"\n").unwrap();
            fs::write(root.join("src/assets/a.txt"), "a").unwrap();
            for category in AssetCategory::iter() {
                fs::create_dir(root.join("src").join(category.dir_name())).unwrap();
            }
            write_script(&cargo, FAKE_CARGO);
            write_script(&root.join("scripts/gen_indexes.sh"), FAKE_INDEXER);

            Self {
                _guard: guard,
                _temp: temp,
                root,
                cargo,
            }
        }

        pub(crate) fn root(&self) -> &Path {
            &self.root
        }

        pub(crate) fn config<'sh>(&self, sh: &'sh Shell) -> Config<'sh> {
            Config {
                sh,
                cargo_path: self.cargo.clone(),
                cargo_timings: false,
                cargo_quiet: false,
            }
        }

        /// Replace the stand-in for cargo with a script running `body`.
        pub(crate) fn set_cargo(&self, body: &str) {
            write_script(&self.cargo, body);
        }

        fn build(&self) -> Result<Staged, Aborted> {
            self.build_with(|_| {}, &mut Vec::new())
        }

        fn build_with(
            &self,
            f: impl FnOnce(&mut Config<'_>),
            time_log: &mut Vec<Timing>,
        ) -> Result<Staged, Aborted> {
            let sh = Shell::new().unwrap();
            let mut config = self.config(&sh);
            f(&mut config);
            build_web(&config, &self.root, time_log)
        }

        fn layout(&self) -> WebLayout {
            WebLayout::resolve(&self.root).unwrap()
        }
    }

    fn write_script(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("#!/bin/sh\nset -e\n{body}")).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Every path under `dir`, with file contents (directories have none).
    fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Option<String>> {
        walkdir::WalkDir::new(dir)
            .min_depth(1)
            .into_iter()
            .map(|entry| {
                let entry = entry.unwrap();
                let contents = entry
                    .file_type()
                    .is_file()
                    .then(|| fs::read_to_string(entry.path()).unwrap());
                (entry.path().strip_prefix(dir).unwrap().to_owned(), contents)
            })
            .collect()
    }

    fn expected_web(index: &str) -> BTreeMap<PathBuf, Option<String>> {
        BTreeMap::from([
            ("cropbots.wasm".into(), Some("wasm".to_owned())),
            ("assets".into(), None),
            ("assets/a.txt".into(), Some("a".to_owned())),
            ("assets/index.txt".into(), Some(index.to_owned())),
            ("assets/entity".into(), None),
            ("assets/particle".into(), None),
            ("assets/sound".into(), None),
            ("assets/structure".into(), None),
        ])
    }

    #[test]
    fn end_to_end() {
        let fixture = Fixture::new();
        let root = fixture.root.canonicalize().unwrap();

        let staged = fixture.build().unwrap();

        assert_eq!(staged.output_dir, root.join("web"));
        assert_eq!(staged.artifact_bytes, 4);
        assert_eq!(staged.asset_files, 1);
        assert_eq!(
            staged.to_string(),
            format!("Web build staged in {}", root.join("web").display())
        );
        // The index generator ran after the root assets were staged
        // but before the categories were.
        assert_eq!(snapshot(&root.join("web")), expected_web("a.txt\n"));
    }

    #[test]
    fn compiler_invocation() {
        let fixture = Fixture::new();
        let root = fixture.root.canonicalize().unwrap();

        fixture.build().unwrap();

        assert_eq!(
            fs::read_to_string(root.join("cargo-args.txt")).unwrap(),
            format!(
                "build\n--release\n--target\nwasm32-unknown-unknown\n--manifest-path\n{}\n",
                root.join("Cargo.toml").display()
            )
        );
        assert_eq!(
            fs::read_to_string(root.join("cargo-cwd.txt")).unwrap(),
            format!("{}\n", root.display())
        );
    }

    #[test]
    fn compiler_invocation_with_build_args() {
        let fixture = Fixture::new();

        fixture
            .build_with(
                |config| {
                    config.cargo_quiet = true;
                    config.cargo_timings = true;
                },
                &mut Vec::new(),
            )
            .unwrap();

        let args = fs::read_to_string(fixture.root.join("cargo-args.txt")).unwrap();
        assert!(args.ends_with("\n--timings\n--quiet\n"), "{args}");
    }

    #[test]
    fn idempotent() {
        let fixture = Fixture::new();
        let web = fixture.root.join("web");

        fixture.build().unwrap();
        let first = snapshot(&web);
        fixture.build().unwrap();

        // The second index sees the first one.
        let mut second = snapshot(&web);
        second.insert("assets/index.txt".into(), Some("a.txt\n".to_owned()));
        assert_eq!(first, second);
    }

    #[test]
    fn removed_sources_are_not_pruned() {
        let fixture = Fixture::new();
        let web = fixture.root.join("web");
        fixture.build().unwrap();

        fs::remove_file(fixture.root.join("src/assets/a.txt")).unwrap();
        fs::write(fixture.root.join("src/sound/step.yaml"), "id: step").unwrap();
        fs::write(web.join("cropbots.wasm"), "older").unwrap();
        fixture.build().unwrap();

        assert_eq!(fs::read_to_string(web.join("assets/a.txt")).unwrap(), "a");
        assert_eq!(
            fs::read_to_string(web.join("assets/sound/step.yaml")).unwrap(),
            "id: step"
        );
        assert_eq!(fs::read_to_string(web.join("cropbots.wasm")).unwrap(), "wasm");
    }

    #[test]
    fn compiler_failure_stops_before_output() {
        let fixture = Fixture::new();
        fixture.set_cargo("echo 'error: could not compile' >&2\nexit 3\n");

        let aborted = fixture.build().unwrap_err();

        assert_eq!(aborted.step, Step::Compile);
        assert_eq!(aborted.error.exit_code(), Some(3));
        assert!(matches!(aborted.error, StageError::ProcessFailed { .. }));
        assert!(!fixture.root.join("web").exists());
    }

    #[test]
    fn compiler_missing() {
        let fixture = Fixture::new();
        fs::remove_file(&fixture.cargo).unwrap();

        let aborted = fixture.build().unwrap_err();

        assert_eq!(aborted.step, Step::Compile);
        assert!(matches!(aborted.error, StageError::Spawn { .. }), "{aborted:?}");
        assert_eq!(aborted.error.exit_code(), None);
    }

    #[test]
    fn compiler_succeeds_without_artifact() {
        let fixture = Fixture::new();
        fixture.set_cargo("exit 0\n");

        let aborted = fixture.build().unwrap_err();

        assert_eq!(aborted.step, Step::CopyArtifact);
        assert!(matches!(aborted.error, StageError::Copy { .. }), "{aborted:?}");
        assert!(fixture.root.join("web").is_dir());
    }

    #[test]
    fn missing_assets_dir() {
        let fixture = Fixture::new();
        fs::remove_dir_all(fixture.root.join("src/assets")).unwrap();

        let aborted = fixture.build().unwrap_err();

        assert_eq!(aborted.step, Step::CopyAssets);
        assert!(fixture.root.join("web/cropbots.wasm").is_file());
    }

    #[test]
    fn index_failure_leaves_earlier_steps_applied() {
        let fixture = Fixture::new();
        write_script(&fixture.root.join("scripts/gen_indexes.sh"), "exit 7\n");

        let aborted = fixture.build().unwrap_err();

        assert_eq!(aborted.step, Step::GenerateIndexes);
        assert_eq!(aborted.error.exit_code(), Some(7));
        let web = fixture.root.join("web");
        assert_eq!(
            snapshot(&web),
            BTreeMap::from([
                ("cropbots.wasm".into(), Some("wasm".to_owned())),
                ("assets".into(), None),
                ("assets/a.txt".into(), Some("a".to_owned())),
            ])
        );
    }

    #[test]
    fn index_generator_missing() {
        let fixture = Fixture::new();
        fs::remove_file(fixture.root.join("scripts/gen_indexes.sh")).unwrap();

        let aborted = fixture.build().unwrap_err();

        assert_eq!(aborted.step, Step::GenerateIndexes);
        assert!(matches!(aborted.error, StageError::Spawn { .. }), "{aborted:?}");
    }

    #[test]
    fn category_failure_keeps_earlier_categories() {
        let fixture = Fixture::new();
        fs::write(fixture.root.join("src/entity/bot.yaml"), "id: bot").unwrap();
        fs::remove_dir(fixture.root.join("src/sound")).unwrap();

        let aborted = fixture.build().unwrap_err();

        assert_eq!(aborted.step, Step::CopyCategories);
        let assets = fixture.root.join("web/assets");
        assert_eq!(
            fs::read_to_string(assets.join("entity/bot.yaml")).unwrap(),
            "id: bot"
        );
        assert!(assets.join("particle").is_dir());
        assert!(!assets.join("structure").exists());
    }

    #[test]
    fn missing_root() {
        let fixture = Fixture::new();
        let sh = Shell::new().unwrap();

        let aborted = build_web(
            &fixture.config(&sh),
            &fixture.root.join("nonexistent"),
            &mut Vec::new(),
        )
        .unwrap_err();

        assert_eq!(aborted.step, Step::ResolveRoot);
        assert_eq!(
            aborted.to_string(),
            "web build aborted at step “resolve-root”"
        );
    }

    #[test]
    fn timing_spans_are_recorded() {
        let fixture = Fixture::new();
        let mut time_log = Vec::new();

        fixture.build_with(|_| {}, &mut time_log).unwrap();

        let labels: Vec<&str> = time_log.iter().map(Timing::label).collect();
        assert_eq!(
            labels,
            [
                "cargo build --release --target wasm32-unknown-unknown",
                "stage wasm",
                "stage assets",
                "generate asset indexes",
                "stage asset categories",
            ]
        );
    }

    #[test]
    fn timing_spans_end_at_failed_step() {
        let fixture = Fixture::new();
        write_script(&fixture.root.join("scripts/gen_indexes.sh"), "exit 1\n");
        let mut time_log = Vec::new();

        fixture.build_with(|_| {}, &mut time_log).unwrap_err();

        let labels: Vec<&str> = time_log.iter().map(Timing::label).collect();
        assert_eq!(
            labels,
            [
                "cargo build --release --target wasm32-unknown-unknown",
                "stage wasm",
                "stage assets",
                "generate asset indexes",
            ]
        );
    }

    #[test]
    fn clean_removes_output() {
        let fixture = Fixture::new();
        fixture.build().unwrap();
        let layout = fixture.layout();

        assert_eq!(clean_web(&layout).unwrap(), Some(layout.output_dir()));
        assert!(!layout.output_dir().exists());
        assert_eq!(clean_web(&layout).unwrap(), None);
        // Sources are untouched.
        assert!(fixture.root.join("src/assets/a.txt").is_file());
    }

    #[test]
    fn clean_refuses_symlink() {
        let fixture = Fixture::new();
        let elsewhere = fixture.root.join("elsewhere");
        fs::create_dir(&elsewhere).unwrap();
        std::os::unix::fs::symlink(&elsewhere, fixture.root.join("web")).unwrap();

        clean_web(&fixture.layout()).unwrap_err();

        assert!(elsewhere.is_dir());
    }

    #[test]
    fn stale_lists_unsourced_files() {
        let fixture = Fixture::new();
        let layout = fixture.layout();
        assert_eq!(stale_web(&layout).unwrap(), BTreeSet::new());

        fixture.build().unwrap();
        assert_eq!(
            stale_web(&layout).unwrap(),
            BTreeSet::from(["assets/index.txt".into()])
        );

        fs::remove_file(fixture.root.join("src/assets/a.txt")).unwrap();
        fs::write(layout.category_dest(AssetCategory::Particle).join("old.png"), "").unwrap();
        assert_eq!(
            stale_web(&layout).unwrap(),
            BTreeSet::from([
                "assets/a.txt".into(),
                "assets/index.txt".into(),
                "assets/particle/old.png".into(),
            ])
        );
    }

    #[test]
    fn steps_in_order() {
        let names: Vec<String> = Step::iter().map(|step| step.to_string()).collect();
        assert_eq!(
            names,
            [
                "resolve-root",
                "compile",
                "create-output-dir",
                "copy-artifact",
                "copy-assets",
                "generate-indexes",
                "copy-categories",
            ]
        );
    }
}
