//! Where everything `build-web` reads and writes is.
//!
//! Every path here is a fixed function of the project root; nothing consults the environment.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

// -------------------------------------------------------------------------------------------------

/// Target triple the game is compiled for.
pub(crate) const TARGET_WASM: &str = "wasm32-unknown-unknown";

/// Name of the game's package, and therefore of the `.wasm` file cargo produces.
pub(crate) const ARTIFACT_NAME: &str = "cropbots";

/// Path to the project directory, as determined when this binary was compiled.
static PROJECT_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    // Since we are the xtask binary, this is the path to the xtask package.
    // Pop `tools/xtask` to become the path to the main project directory.
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop();
    path.pop();
    path
});

/// The project directory this binary was built from. It may have moved since.
pub(crate) fn project_dir() -> &'static Path {
    &PROJECT_DIR
}

// -------------------------------------------------------------------------------------------------

/// Kinds of game data which are staged into their own subdirectory of `web/assets/`.
///
/// Natively, the game reads these from `src/<name>/`; on the web it finds them under
/// `assets/<name>/`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display, strum::EnumIter, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum AssetCategory {
    Entity,
    Particle,
    Sound,
    Structure,
}

impl AssetCategory {
    pub fn dir_name(self) -> &'static str {
        self.into()
    }
}

// -------------------------------------------------------------------------------------------------

/// Paths of the inputs and outputs of the web build, relative to one project root.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct WebLayout {
    root: PathBuf,
}

impl WebLayout {
    /// Layout rooted at the canonical form of `root`, which must exist.
    pub fn resolve(root: &Path) -> io::Result<Self> {
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The manifest cargo is asked to build.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("Cargo.toml")
    }

    /// Where cargo puts the release build of the game for [`TARGET_WASM`].
    pub fn compiled_artifact(&self) -> PathBuf {
        self.root
            .join("target")
            .join(TARGET_WASM)
            .join("release")
            .join(format!("{ARTIFACT_NAME}.wasm"))
    }

    /// The directory that is deployed to the web server.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join("web")
    }

    pub fn staged_artifact(&self) -> PathBuf {
        self.output_dir().join(format!("{ARTIFACT_NAME}.wasm"))
    }

    pub fn assets_source(&self) -> PathBuf {
        self.root.join("src/assets")
    }

    pub fn assets_dest(&self) -> PathBuf {
        self.output_dir().join("assets")
    }

    pub fn category_source(&self, category: AssetCategory) -> PathBuf {
        self.root.join("src").join(category.dir_name())
    }

    pub fn category_dest(&self, category: AssetCategory) -> PathBuf {
        self.assets_dest().join(category.dir_name())
    }

    /// External program which writes index files into the staged assets.
    /// It takes no arguments.
    pub fn index_generator(&self) -> PathBuf {
        self.root.join("scripts/gen_indexes.sh")
    }
}
