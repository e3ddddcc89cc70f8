//! Cache behaviour observed through the engine.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde_json::json;
use serial_test::serial;
use stencil::cache::RegistryCache;
use stencil::{CacheKind, CacheStrategy, DataPool, Engine, EngineConfig, Error};

struct Site {
    _dir: tempfile::TempDir,
    views: PathBuf,
    cache: PathBuf,
}

impl Site {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let views = dir.path().join("views");
        let cache = dir.path().join("cache");
        fs::create_dir_all(&views).unwrap();
        Self {
            _dir: dir,
            views,
            cache,
        }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.views.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_template_dir(&self.views)
            .with_cache_dir(&self.cache)
    }

    fn engine(&self) -> Engine {
        Engine::new(self.config()).unwrap()
    }

    fn registry_engine(&self) -> Engine {
        Engine::new(self.config().with_strategy(CacheKind::Registry)).unwrap()
    }
}

fn pool() -> DataPool {
    DataPool::from_json(json!({ "name": "Ada" })).unwrap()
}

fn artifacts(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return found;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            found.extend(artifacts(&path));
        } else {
            found.push(path);
        }
    }
    found.sort();
    found
}

fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}

fn touch_future(path: &Path) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(3600))
        .unwrap();
}

// ============================================================================
// Directory strategy
// ============================================================================

#[test]
fn test_artifact_mirrors_template_tree() {
    let site = Site::new();
    site.write("users/list.html", "Hi <tpl:var name=\"name\"/>");

    let out = site.engine().render_template("users/list.html", &pool()).unwrap();

    assert_eq!(out, "Hi Ada");
    assert_eq!(
        artifacts(&site.cache),
        vec![site.cache.join("users").join("list.html.tpl.json")]
    );
}

#[test]
fn test_second_render_is_a_cache_hit() {
    let site = Site::new();
    site.write("page.html", "Hi <tpl:var name=\"name\"/>");
    let engine = site.engine();

    engine.render_template("page.html", &pool()).unwrap();
    let artifact = site.cache.join("page.html.tpl.json");
    let written = mtime(&artifact);

    let out = engine.render_template("page.html", &pool()).unwrap();
    assert_eq!(out, "Hi Ada");
    assert_eq!(engine.compile_count(), 1);
    assert_eq!(mtime(&artifact), written);
    assert_eq!(artifacts(&site.cache).len(), 1);
}

#[test]
fn test_cache_survives_a_new_engine() {
    let site = Site::new();
    site.write("page.html", "Hi <tpl:var name=\"name\"/>");
    site.engine().render_template("page.html", &pool()).unwrap();

    let engine = site.engine();
    assert_eq!(engine.render_template("page.html", &pool()).unwrap(), "Hi Ada");
    assert_eq!(engine.compile_count(), 0);
}

#[test]
fn test_newer_source_is_recompiled() {
    let site = Site::new();
    let source = site.write("page.html", "Hi <tpl:var name=\"name\"/>");
    let engine = site.engine();
    engine.render_template("page.html", &pool()).unwrap();

    touch_future(&source);

    engine.render_template("page.html", &pool()).unwrap();
    assert_eq!(engine.compile_count(), 2);
}

#[test]
fn test_size_change_is_recompiled() {
    let site = Site::new();
    site.write("page.html", "Hi <tpl:var name=\"name\"/>");
    let engine = site.engine();
    engine.render_template("page.html", &pool()).unwrap();

    site.write("page.html", "Hello there <tpl:var name=\"name\"/>!");

    let out = engine.render_template("page.html", &pool()).unwrap();
    assert_eq!(out, "Hello there Ada!");
    assert_eq!(engine.compile_count(), 2);
    assert_eq!(artifacts(&site.cache).len(), 1);
}

#[test]
fn test_corrupt_artifact_is_recompiled() {
    let site = Site::new();
    site.write("page.html", "Hi <tpl:var name=\"name\"/>");
    site.engine().render_template("page.html", &pool()).unwrap();

    fs::write(site.cache.join("page.html.tpl.json"), "not json at all").unwrap();

    let engine = site.engine();
    assert_eq!(engine.render_template("page.html", &pool()).unwrap(), "Hi Ada");
    assert_eq!(engine.compile_count(), 1);
}

#[test]
fn test_compile_error_writes_nothing() {
    let site = Site::new();
    site.write("broken.html", "<tpl:if test=\"a\">never closed");

    let err = site.engine().render_template("broken.html", &pool()).unwrap_err();

    assert!(err.is_compile_error(), "{err:?}");
    assert!(artifacts(&site.cache).is_empty());
}

#[test]
fn test_includes_are_cached_separately() {
    let site = Site::new();
    site.write("page.html", "[<tpl:include file=\"parts/nav.html\"/>]");
    site.write("parts/nav.html", "nav for <tpl:var name=\"name\"/>");
    let engine = site.engine();

    assert_eq!(engine.render_template("page.html", &pool()).unwrap(), "[nav for Ada]");
    engine.render_template("page.html", &pool()).unwrap();

    assert_eq!(engine.compile_count(), 2);
    assert_eq!(
        artifacts(&site.cache),
        vec![
            site.cache.join("page.html.tpl.json"),
            site.cache.join("parts").join("nav.html.tpl.json"),
        ]
    );
}

#[test]
fn test_same_size_siblings_keep_their_own_programs() {
    let site = Site::new();
    site.write("home.html", "HTML page");
    site.write("home.xml", "XML  feed");

    assert_eq!(site.engine().render_template("home.html", &pool()).unwrap(), "HTML page");
    assert_eq!(site.engine().render_template("home.xml", &pool()).unwrap(), "XML  feed");
    assert_eq!(site.engine().render_template("home.html", &pool()).unwrap(), "HTML page");

    assert_eq!(
        artifacts(&site.cache),
        vec![
            site.cache.join("home.html.tpl.json"),
            site.cache.join("home.xml.tpl.json"),
        ]
    );
}

#[test]
fn test_missing_template() {
    let site = Site::new();
    let err = site.engine().render_template("nope.html", &pool()).unwrap_err();
    assert!(matches!(err, Error::TemplateNotFound(_)));
}

// ============================================================================
// Registry strategy
// ============================================================================

#[test]
fn test_registry_round_trip_through_engine() {
    let site = Site::new();
    site.write("page.html", "Hi <tpl:var name=\"name\"/>");

    let engine = site.registry_engine();
    assert_eq!(engine.render_template("page.html", &pool()).unwrap(), "Hi Ada");
    engine.flush().unwrap();
    assert!(site.cache.join("registry.json").is_file());
    drop(engine);

    let engine = site.registry_engine();
    assert_eq!(engine.render_template("page.html", &pool()).unwrap(), "Hi Ada");
    assert_eq!(engine.compile_count(), 0);
}

#[test]
fn test_registry_reuses_artifact_name_on_recompile() {
    let site = Site::new();
    let source = site.write("page.html", "Hi <tpl:var name=\"name\"/>");
    let engine = site.registry_engine();
    engine.render_template("page.html", &pool()).unwrap();
    engine.flush().unwrap();
    let before = artifacts(&site.cache);

    touch_future(&source);
    engine.render_template("page.html", &pool()).unwrap();
    engine.flush().unwrap();

    assert_eq!(engine.compile_count(), 2);
    assert_eq!(artifacts(&site.cache), before);
}

#[test]
fn test_registry_records_every_template() {
    let site = Site::new();
    site.write("a.html", "a");
    site.write("b.html", "b");
    let engine = site.registry_engine();
    engine.render_template("a.html", &pool()).unwrap();
    engine.render_template("b.html", &pool()).unwrap();
    engine.flush().unwrap();

    let registry = RegistryCache::open(&site.cache, "registry.json").unwrap();
    assert_eq!(registry.len(), 2);
    assert!(!registry.is_dirty());
    assert_eq!(registry.name(), "registry");
}

#[test]
fn test_engine_with_supplied_strategy() {
    let site = Site::new();
    site.write("page.html", "Hi <tpl:var name=\"name\"/>");
    let strategy = RegistryCache::open(&site.cache, "index.json").unwrap();

    let engine = Engine::with_cache(site.config(), Box::new(strategy)).unwrap();
    assert_eq!(engine.render_template("page.html", &pool()).unwrap(), "Hi Ada");
    engine.flush().unwrap();

    assert!(site.cache.join("index.json").is_file());
    assert!(!site.cache.join("registry.json").exists());
}

// ============================================================================
// Default locations
// ============================================================================

struct CwdGuard(PathBuf);

impl Drop for CwdGuard {
    fn drop(&mut self) {
        std::env::set_current_dir(&self.0).unwrap();
    }
}

#[test]
#[serial]
fn test_default_dirs_are_relative_to_cwd() {
    let dir = tempfile::tempdir().unwrap();
    let _guard = CwdGuard(std::env::current_dir().unwrap());
    std::env::set_current_dir(dir.path()).unwrap();
    fs::write("page.html", "Hi <tpl:var name=\"name\"/>").unwrap();

    let engine = Engine::new(EngineConfig::default()).unwrap();
    assert_eq!(engine.render_template("page.html", &pool()).unwrap(), "Hi Ada");

    assert!(dir.path().join(".stencil-cache").join("page.html.tpl.json").is_file());
}
