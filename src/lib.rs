#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod cache;
mod clean;
pub mod cli;
mod deploy;
mod error;
mod hash;
mod images;
pub mod logging;
mod minify;
mod prefix;
mod serve;
mod styles;
mod task;
mod useref;
mod watch;

use std::fmt::Display;
use std::time::Instant;

use camino::Utf8PathBuf;
use console::{Style, style};

pub use crate::cache::Store;
pub use crate::error::*;
pub use crate::hash::Hash32;
pub use crate::images::Summary;
pub use crate::minify::{CssMinifier, JsMinifier, Minify, NoopMinifier};
pub use crate::task::{Orchestrator, Step, TaskResult};
pub use crate::useref::{Asset, AssetKind};
pub use crate::watch::{LiveReload, Reload};

pub const TASK_SASS: &str = "sass";
pub const TASK_USEREF: &str = "useref";
pub const TASK_IMAGES: &str = "images";
pub const TASK_CLEAN: &str = "clean";
pub const TASK_CLEAN_DIST: &str = "clean:dist";
pub const TASK_DEPLOY: &str = "deploy";

const ANSI_BLUE: Style = Style::new().blue();

pub(crate) fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

/// The fixed shape of a project tree: markup at the top level of `app/`,
/// styles, scripts and images under named subdirectories, `dist/` mirroring
/// images under a matching subdirectory.
#[derive(Debug, Clone)]
pub struct Paths {
    pub root: Utf8PathBuf,
    pub app: Utf8PathBuf,
    pub styles: Utf8PathBuf,
    pub style_entry: Utf8PathBuf,
    pub css: Utf8PathBuf,
    pub scripts: Utf8PathBuf,
    pub images: Utf8PathBuf,
    pub dist: Utf8PathBuf,
    pub dist_images: Utf8PathBuf,
    pub cache: Utf8PathBuf,
}

impl Paths {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        let root = root.into();
        let app = root.join("app");

        Self {
            styles: app.join("sass"),
            style_entry: app.join("sass/main.scss"),
            css: app.join("css"),
            scripts: app.join("js"),
            images: app.join("images"),
            dist: root.join("dist"),
            dist_images: root.join("dist/images"),
            cache: root.join(".cache"),
            app,
            root,
        }
    }
}

/// Everything a task body needs: the project layout and the persistent
/// build cache. Constructed explicitly per process, passed by reference to
/// every task; there are no ambient singletons.
pub struct Session {
    pub paths: Paths,
    pub cache: Store,
}

impl Session {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Result<Self, KarakuriError> {
        let paths = Paths::new(root);
        let cache = Store::open(paths.cache.clone())?;
        Ok(Self { paths, cache })
    }
}

/// One build session: the session state plus the task registry with the
/// standard pipeline tasks wired in.
pub struct Pipeline {
    session: Session,
    orchestrator: Orchestrator<Session>,
}

impl Pipeline {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Result<Self, KarakuriError> {
        let session = Session::new(root)?;
        let mut orchestrator = Orchestrator::new();

        orchestrator.register(TASK_SASS, &[], |s: &Session| {
            styles::build(&s.paths)?;
            Ok(())
        })?;
        orchestrator.register(TASK_USEREF, &[], |s: &Session| {
            useref::build(&s.paths, &CssMinifier, &JsMinifier)?;
            Ok(())
        })?;
        orchestrator.register(TASK_IMAGES, &[], |s: &Session| {
            images::build(&s.paths, &s.cache)?;
            Ok(())
        })?;
        orchestrator.register(TASK_CLEAN, &[], |s: &Session| {
            clean::full(&s.paths, &s.cache)?;
            Ok(())
        })?;
        orchestrator.register(TASK_CLEAN_DIST, &[], |s: &Session| {
            clean::partial(&s.paths)?;
            Ok(())
        })?;
        orchestrator.register(TASK_DEPLOY, &[], |s: &Session| {
            deploy::publish(&s.paths, deploy::DEFAULT_BRANCH)?;
            Ok(())
        })?;

        Ok(Self {
            session,
            orchestrator,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run a single registered task by name.
    pub fn run(&self, name: &str) -> Result<(), TaskError> {
        self.orchestrator.run(name, &self.session)
    }

    /// Full pipeline: partial clean, then styles, then concatenation and
    /// image optimization concurrently.
    pub fn build(&self) -> Result<(), TaskError> {
        eprintln!(
            "Running {} in {} mode.",
            style("Karakuri").red(),
            style("build").blue()
        );

        self.orchestrator.sequence(
            &[
                Step::One(TASK_CLEAN_DIST),
                Step::One(TASK_SASS),
                Step::Many(&[TASK_USEREF, TASK_IMAGES]),
            ],
            &self.session,
        )
    }

    /// Delete the output directory contents and clear the cache.
    pub fn clean(&self) -> Result<(), TaskError> {
        self.orchestrator.run(TASK_CLEAN, &self.session)
    }

    /// Push the output directory to the hosting branch.
    pub fn deploy(&self) -> Result<(), TaskError> {
        self.orchestrator.run(TASK_DEPLOY, &self.session)
    }

    /// Dev session: compile styles, serve the source tree and watch for
    /// changes until interrupted. Any startup failure is returned before
    /// the blocking watch loop begins.
    pub fn dev(&self, port: u16) -> Result<(), KarakuriError> {
        eprintln!(
            "Running {} in {} mode.",
            style("Karakuri").red(),
            style("watch").blue()
        );

        self.orchestrator.run(TASK_SASS, &self.session)?;

        let live = LiveReload::start()?;
        let _server = serve::start(self.session.paths.app.clone(), port, live.port)?;

        watch::watch(&self.session, &self.orchestrator, &live)?;

        Ok(())
    }
}
