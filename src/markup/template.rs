//! Template substitution: letter model + named template → markup string.
//!
//! All templates below the template directory are compiled once when the
//! renderer is built. Templates are addressed by their path relative to that
//! directory without the `.html` suffix (`template-a`). Output is always
//! HTML-escaped so model text cannot break the markup.

use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment};
use tracing::debug;
use walkdir::WalkDir;

use crate::assets::TEMPLATE_SUFFIX;
use crate::model::LetterModel;
use crate::{Error, Result};

pub struct TemplateRenderer {
    env: Environment<'static>,
    dir: PathBuf,
    names: Vec<String>,
}

impl TemplateRenderer {
    /// Compile every `*.html` file below `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::AssetMissing(dir.to_path_buf()));
        }

        let mut sources = Vec::new();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_SUFFIX)
            {
                continue;
            }
            let name = template_name(dir, path);
            sources.push((name, std::fs::read_to_string(path)?));
        }

        let mut renderer = Self::from_sources(sources)?;
        renderer.dir = dir.to_path_buf();
        Ok(renderer)
    }

    /// Build from in-memory `(name, source)` pairs.
    pub fn from_sources(
        sources: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);

        let mut names = Vec::new();
        for (name, source) in sources {
            env.add_template_owned(name.clone(), source)?;
            names.push(name);
        }
        debug!(templates = names.len(), "template environment ready");

        Ok(Self {
            env,
            dir: PathBuf::new(),
            names,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Fail with `AssetMissing` unless `name` was loaded.
    pub fn require(&self, name: &str) -> Result<()> {
        if self.names.iter().any(|n| n == name) {
            Ok(())
        } else {
            Err(Error::AssetMissing(
                self.dir.join(format!("{name}.{TEMPLATE_SUFFIX}")),
            ))
        }
    }

    pub fn render(&self, name: &str, model: &LetterModel) -> Result<String> {
        self.require(name)?;
        let template = self.env.get_template(name)?;
        let markup = template.render(model)?;
        debug!(template = name, bytes = markup.len(), "template rendered");
        Ok(markup)
    }
}

fn template_name(dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(dir).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
