//! The engine: tag registry, cache strategy and configuration in one context.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, warn};

use crate::cache::{self, CacheEntry, CacheStrategy, SourceStamp};
use crate::compile::Compiler;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::program::Program;
use crate::render::Renderer;
use crate::tags::{TagRegistry, TagSpec};
use crate::value::DataPool;

struct CacheState {
    strategy: Box<dyn CacheStrategy>,
    /// Programs already decoded in this process, with the entry they came from.
    programs: HashMap<PathBuf, (CacheEntry, Arc<Program>)>,
}

/// Compiles, caches and renders templates.
///
/// # Example
///
/// ```rust,no_run
/// use stencil::{DataPool, Engine, EngineConfig};
///
/// let engine = Engine::new(EngineConfig::default().with_template_dir("views"))?;
/// let pool = DataPool::new().with("title", "Inbox");
/// let html = engine.render_template("inbox.html", &pool)?;
/// engine.flush()?;
/// # Ok::<(), stencil::Error>(())
/// ```
pub struct Engine {
    config: EngineConfig,
    template_dir: PathBuf,
    compiler: Compiler,
    cache: Mutex<CacheState>,
    compiles: AtomicUsize,
}

impl Engine {
    /// An engine with the first-party tags and the cache strategy named in
    /// `config`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let template_dir = absolute(&config.template_dir);
        let strategy = cache::from_config(&config.cache, &template_dir)?;
        Self::build(config, template_dir, strategy)
    }

    /// An engine using a caller-supplied cache strategy.
    pub fn with_cache(config: EngineConfig, strategy: Box<dyn CacheStrategy>) -> Result<Self> {
        config.validate()?;
        let template_dir = absolute(&config.template_dir);
        Self::build(config, template_dir, strategy)
    }

    fn build(
        config: EngineConfig,
        template_dir: PathBuf,
        strategy: Box<dyn CacheStrategy>,
    ) -> Result<Self> {
        let compiler = Compiler::new(&config.namespace, TagRegistry::with_defaults())?;
        debug!(
            namespace = %config.namespace,
            template_dir = %template_dir.display(),
            strategy = strategy.name(),
            "engine ready"
        );
        Ok(Self {
            config,
            template_dir,
            compiler,
            cache: Mutex::new(CacheState {
                strategy,
                programs: HashMap::new(),
            }),
            compiles: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tags(&self) -> &TagRegistry {
        self.compiler.registry()
    }

    /// Adds or replaces a tag.
    pub fn register_tag(&mut self, spec: TagSpec) -> Result<Option<TagSpec>> {
        self.compiler.register(spec)
    }

    /// How many templates this engine has compiled (cache hits excluded).
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::Relaxed)
    }

    /// Absolute, canonical path of a template. Relative paths are taken
    /// from the template directory.
    pub fn template_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.template_dir.join(path)
        };
        match fs::canonicalize(&joined) {
            Ok(canonical) if canonical.is_file() => Ok(canonical),
            Ok(_) => Err(Error::TemplateNotFound(joined)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::TemplateNotFound(joined)),
            Err(source) => Err(Error::Io {
                path: joined,
                source,
            }),
        }
    }

    /// Returns the program for a template file, from cache when fresh.
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<Arc<Program>> {
        let source = self.template_path(path)?;
        let mut state = self.lock_cache();

        let fresh = match state.strategy.get(&source) {
            Ok(entry) => entry,
            Err(Error::CacheFormat { path, reason }) => {
                warn!(artifact = %path.display(), %reason, "ignoring corrupt cache artifact");
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(entry) = fresh {
            if let Some((known, program)) = state.programs.get(&source) {
                if *known == entry {
                    return Ok(Arc::clone(program));
                }
            }
            match state.strategy.load(&entry) {
                Ok(program) => {
                    debug!(template = %source.display(), key = %entry.cache_key, "cache hit");
                    let program = Arc::new(program);
                    state
                        .programs
                        .insert(source, (entry, Arc::clone(&program)));
                    return Ok(program);
                }
                Err(Error::CacheFormat { path, reason }) => {
                    warn!(artifact = %path.display(), %reason, "recompiling over corrupt cache artifact");
                }
                Err(e) => return Err(e),
            }
        }

        let previous = match state.strategy.entry(&source) {
            Ok(entry) => entry,
            Err(Error::CacheFormat { .. }) => None,
            Err(e) => return Err(e),
        };
        let stamp = SourceStamp::of(&source)?;
        let program = self.compile_source_file(&source)?;
        let entry = state.strategy.put(&source, &stamp, previous.as_ref(), &program)?;
        let program = Arc::new(program);
        state
            .programs
            .insert(source, (entry, Arc::clone(&program)));
        Ok(program)
    }

    fn compile_source_file(&self, source: &Path) -> Result<Program> {
        let text = fs::read_to_string(source).map_err(|e| Error::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        let started = Instant::now();
        let program = self.compiler.compile(source, &text)?;
        self.compiles.fetch_add(1, Ordering::Relaxed);
        debug!(
            template = %source.display(),
            instructions = program.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "compiled template"
        );
        Ok(program)
    }

    /// Compiles template text without touching the cache. `name` is used in
    /// diagnostics and as the base for includes.
    pub fn compile_str(&self, name: &str, source: &str) -> Result<Program> {
        let program = self.compiler.compile(Path::new(name), source)?;
        self.compiles.fetch_add(1, Ordering::Relaxed);
        Ok(program)
    }

    /// Renders a template file against `pool`.
    pub fn render_template(&self, path: impl AsRef<Path>, pool: &DataPool) -> Result<String> {
        let source = self.template_path(path)?;
        let program = self.compile_file(&source)?;
        Renderer::new(self, pool, source).render_to_string(&program)
    }

    /// Compiles and renders template text without caching. Includes resolve
    /// against the template directory.
    pub fn render_str(&self, name: &str, source: &str, pool: &DataPool) -> Result<String> {
        let program = self.compile_str(name, source)?;
        Renderer::new(self, pool, self.template_dir.join(name)).render_to_string(&program)
    }

    /// Persists pending cache bookkeeping.
    pub fn flush(&self) -> Result<()> {
        self.lock_cache().strategy.flush()
    }

    /// Path of an included template, relative to the including one.
    pub(crate) fn resolve_include(&self, from: &Path, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        from.parent()
            .unwrap_or(&self.template_dir)
            .join(path)
    }

    fn lock_cache(&self) -> MutexGuard<'_, CacheState> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("namespace", &self.config.namespace)
            .field("template_dir", &self.template_dir)
            .field("tags", self.compiler.registry())
            .field("compiles", &self.compile_count())
            .finish()
    }
}

fn absolute(dir: &Path) -> PathBuf {
    fs::canonicalize(dir).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| dir.to_path_buf())
    })
}
