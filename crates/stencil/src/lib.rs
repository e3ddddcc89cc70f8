//! Stencil - a compiling template engine for HTML with namespaced tags.
//!
//! Templates are ordinary markup with tags from one namespace (`tpl` by
//! default) mixed in:
//!
//! ```html
//! <h1><tpl:var name="page.title" escape="html"/></h1>
//! <tpl:if test="user.admin">
//!   <a href="/admin">Admin</a>
//! </tpl:if><tpl:else>
//!   <span>Hello {tpl:var name='user.name'}</span>
//! </tpl:else>
//! <ul>
//! <tpl:foreach in="items" as="item"><li>{tpl:var name='index'}: {tpl:var name='item.label'}</li></tpl:foreach>
//! </ul>
//! ```
//!
//! A template is compiled once into a [`Program`] (a small instruction list),
//! stored by a [`CacheStrategy`] and re-run against a fresh [`DataPool`] for
//! every render.
//!
//! # Quick Start
//!
//! ```rust
//! use stencil::{DataPool, Engine, EngineConfig};
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let pool = DataPool::new()
//!     .with("name", "Ada")
//!     .with("langs", vec!["en", "fr"]);
//!
//! let out = engine
//!     .render_str(
//!         "greeting.html",
//!         r#"Hi <tpl:var name="name"/>!<tpl:foreach in="langs" as="l"> [{tpl:var name='l'}]</tpl:foreach>"#,
//!         &pool,
//!     )
//!     .unwrap();
//! assert_eq!(out, "Hi Ada! [en] [fr]");
//! ```
//!
//! # Pipeline
//!
//! | Stage | Module |
//! |-------|--------|
//! | Parse to a node tree | `stencil_markup` |
//! | Chain else blocks, dispatch tags, expand inline tags | [`compile`] |
//! | Instruction set | [`program`] |
//! | Persist programs | [`cache`] |
//! | Resolve selectors, run programs | [`Renderer`] |
//!
//! Missing data is an error: a selector whose first segment is not in the
//! pool fails with [`Error::MissingDataKey`] rather than printing nothing.

pub mod cache;
pub mod compile;
mod config;
mod engine;
mod error;
pub mod program;
mod render;
mod resolve;
pub mod selector;
pub mod tags;
mod value;

pub use cache::{CacheEntry, CacheStrategy, DirectoryCache, RegistryCache};
pub use compile::{CompileContext, Compiler};
pub use config::{CacheConfig, CacheKind, EngineConfig};
pub use engine::Engine;
pub use error::{Error, Result};
pub use program::{Escape, Instruction, Program};
pub use render::{escape_html, Renderer};
pub use resolve::{Resolver, Scope};
pub use selector::{Condition, Selector};
pub use tags::{TagCall, TagRegistry, TagSpec};
pub use value::{DataObject, DataPool, Value, DATETIME_FORMAT};
