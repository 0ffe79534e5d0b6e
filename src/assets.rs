//! Resolution of bundled assets (fonts, templates, report definitions).
//!
//! Assets are opaque files below one root directory. Resolution happens while
//! engines are constructed; a missing file is reported as
//! [`Error::AssetMissing`] immediately instead of at first render.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Environment variable overriding the default asset root.
pub const ASSETS_ENV: &str = "LETTER_ASSETS_DIR";

pub const FONT_FILE: &str = "fonts/DejaVuSans.ttf";
pub const TEMPLATE_DIR: &str = "templates";
pub const TEMPLATE_SUFFIX: &str = "html";
pub const REPORT_FILE: &str = "reports/letter.rxml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDir {
    root: PathBuf,
}

impl AssetDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$LETTER_ASSETS_DIR` if set, `./assets` otherwise.
    pub fn from_env() -> Self {
        match std::env::var_os(ASSETS_ENV) {
            Some(dir) => Self::new(dir),
            None => Self::new("assets"),
        }
    }

    /// Assets shipped with this crate; used by tests and benches.
    pub fn bundled() -> Self {
        Self::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("assets"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a file below the root, failing if it does not exist.
    pub fn require_file(&self, relative: &str) -> Result<PathBuf> {
        let path = self.root.join(relative);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::AssetMissing(path))
        }
    }

    /// Resolve a directory below the root, failing if it does not exist.
    pub fn require_dir(&self, relative: &str) -> Result<PathBuf> {
        let path = self.root.join(relative);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(Error::AssetMissing(path))
        }
    }

    pub fn font(&self) -> Result<PathBuf> {
        self.require_file(FONT_FILE)
    }

    pub fn templates(&self) -> Result<PathBuf> {
        self.require_dir(TEMPLATE_DIR)
    }

    pub fn report_definition(&self) -> Result<PathBuf> {
        self.require_file(REPORT_FILE)
    }
}

impl Default for AssetDir {
    fn default() -> Self {
        Self::from_env()
    }
}
