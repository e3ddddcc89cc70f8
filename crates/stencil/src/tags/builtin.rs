//! First-party tags.
//!
//! | Tag | Form | Instruction |
//! |-----|------|-------------|
//! | `if test="cond"` | block, else-compatible | `If` |
//! | `elseif test="cond"`, `else` | continuations | folded into the head |
//! | `foreach in="sel" as="x" [group="n"] [counter="i"]` | block, else-compatible | `ForEach` |
//! | `var name="sel" [escape="html"]` | self-closing, inline | `Interpolate` |
//! | `include file="path"` | self-closing, inline | `Include` |
//! | `date name="sel" [format="%d.%m.%Y"]` | self-closing, inline | `Raw` |
//! | `trim` | block | `Raw` |
//! | `literal` | block, raw body | `Literal` |

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Utc};
use indexmap::IndexMap;
use stencil_markup::NodeId;

use crate::compile::CompileContext;
use crate::error::Result;
use crate::program::{Escape, Instruction, Program};
use crate::render::Renderer;
use crate::selector::Selector;
use crate::tags::{TagCall, TagSpec};
use crate::value::{Value, DATETIME_FORMAT};

/// Loop counter name when `counter` is not given.
pub const DEFAULT_COUNTER: &str = "index";

pub static TAGS: &[TagSpec] = &[
    TagSpec::block("if", compile_if).else_compatible(),
    TagSpec::block("elseif", compile_continuation),
    TagSpec::block("else", compile_continuation),
    TagSpec::block("foreach", compile_foreach).else_compatible(),
    TagSpec::block("var", compile_var)
        .self_closing()
        .with_inline(inline_var),
    TagSpec::block("include", compile_include)
        .self_closing()
        .with_inline(inline_include),
    TagSpec::block("date", compile_date)
        .self_closing()
        .with_inline(inline_date)
        .with_runtime(run_date),
    TagSpec::block("trim", compile_trim).with_runtime(run_trim),
    TagSpec::block("literal", compile_literal).raw_body(),
];

// ============================================================================
// Control flow
// ============================================================================

pub fn compile_if(ctx: &mut CompileContext<'_>, id: NodeId, call: &TagCall) -> Result<Instruction> {
    let condition = call.condition("test")?;
    let then = ctx.body(id)?;

    let mut otherwise: Option<Program> = None;
    for cont in ctx.take_chain(id).into_iter().rev() {
        let cont_call = ctx.tag_call(cont)?;
        let body = ctx.body(cont)?;
        otherwise = Some(match cont_call.local_name() {
            "elseif" => Program::from_iter([Instruction::If {
                condition: cont_call.condition("test")?,
                then: body,
                otherwise: otherwise.take(),
            }]),
            _ => body,
        });
    }

    Ok(Instruction::If {
        condition,
        then,
        otherwise,
    })
}

pub fn compile_foreach(
    ctx: &mut CompileContext<'_>,
    id: NodeId,
    call: &TagCall,
) -> Result<Instruction> {
    let collection = call.selector("in")?;
    let binding = identifier(call, "as", call.require("as")?)?;
    let counter = match call.optional("counter") {
        Some(name) => identifier(call, "counter", name)?,
        None => DEFAULT_COUNTER.to_string(),
    };
    if counter == binding {
        return Err(call.invalid(
            "counter",
            format!("`{}` is already the loop variable", counter),
        ));
    }
    let group_size = match call.optional("group") {
        None => None,
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(n) if n >= 1 => Some(n),
            _ => return Err(call.invalid("group", format!("`{}` is not a positive integer", raw))),
        },
    };
    let body = ctx.body(id)?;

    let mut empty = None;
    for cont in ctx.take_chain(id) {
        let cont_call = ctx.tag_call(cont)?;
        if cont_call.local_name() != "else" {
            return Err(cont_call.error(format!(
                "<{}> cannot continue a foreach; only else can",
                cont_call.name
            )));
        }
        empty = Some(ctx.body(cont)?);
    }

    Ok(Instruction::ForEach {
        collection,
        binding,
        counter,
        group_size,
        body,
        empty,
    })
}

/// `elseif` / `else` reached on their own: the chain pass only leaves them in
/// the tree when no else-compatible tag precedes them.
pub fn compile_continuation(
    _ctx: &mut CompileContext<'_>,
    _id: NodeId,
    call: &TagCall,
) -> Result<Instruction> {
    Err(call.error(format!(
        "<{}> must directly follow an if, elseif or foreach block",
        call.name
    )))
}

fn identifier(call: &TagCall, attribute: &str, value: &str) -> Result<String> {
    let value = value.trim();
    let mut chars = value.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(value.to_string())
    } else {
        Err(call.invalid(attribute, format!("`{}` is not a valid variable name", value)))
    }
}

// ============================================================================
// Interpolation and includes
// ============================================================================

fn interpolate(call: &TagCall) -> Result<Instruction> {
    let selector = call.selector("name")?;
    let escape = match call.optional("escape") {
        None | Some("none") => Escape::None,
        Some("html") => Escape::Html,
        Some(other) => {
            return Err(call.invalid("escape", format!("unknown escape `{}`", other)));
        }
    };
    Ok(Instruction::Interpolate { selector, escape })
}

pub fn compile_var(_ctx: &mut CompileContext<'_>, _id: NodeId, call: &TagCall) -> Result<Instruction> {
    interpolate(call)
}

pub fn inline_var(_ctx: &CompileContext<'_>, call: &TagCall) -> Result<Instruction> {
    interpolate(call)
}

fn include(call: &TagCall) -> Result<Instruction> {
    let path = call.require("file")?.trim();
    if path.is_empty() {
        return Err(call.invalid("file", "path is empty"));
    }
    Ok(Instruction::Include {
        path: path.to_string(),
    })
}

pub fn compile_include(
    _ctx: &mut CompileContext<'_>,
    _id: NodeId,
    call: &TagCall,
) -> Result<Instruction> {
    include(call)
}

pub fn inline_include(_ctx: &CompileContext<'_>, call: &TagCall) -> Result<Instruction> {
    include(call)
}

// ============================================================================
// Dates
// ============================================================================

fn date(call: &TagCall) -> Result<Instruction> {
    let selector = call.selector("name")?;
    let format = call.optional("format").unwrap_or(DATETIME_FORMAT);
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(call.invalid("format", format!("`{}` is not a valid date format", format)));
    }

    let mut args = IndexMap::new();
    args.insert("name".to_string(), selector.to_string());
    args.insert("format".to_string(), format.to_string());
    Ok(Instruction::Raw {
        tag: "date".to_string(),
        args,
        body: None,
    })
}

pub fn compile_date(_ctx: &mut CompileContext<'_>, _id: NodeId, call: &TagCall) -> Result<Instruction> {
    date(call)
}

pub fn inline_date(_ctx: &CompileContext<'_>, call: &TagCall) -> Result<Instruction> {
    date(call)
}

/// Formats a datetime, an RFC 3339 string or a Unix timestamp in seconds.
/// Null renders as nothing.
pub fn run_date(
    renderer: &mut Renderer<'_>,
    args: &IndexMap<String, String>,
    _body: Option<&Program>,
) -> Result<String> {
    let name = args.get("name").map(String::as_str).unwrap_or_default();
    let format = args
        .get("format")
        .map(String::as_str)
        .unwrap_or(DATETIME_FORMAT);
    let selector =
        Selector::parse(name).map_err(|e| renderer.runtime_error("date", e.to_string()))?;

    let value = renderer.resolve(&selector)?;
    let datetime: DateTime<FixedOffset> = match &value {
        Value::Null => return Ok(String::new()),
        Value::DateTime(dt) => *dt,
        Value::String(s) => DateTime::parse_from_rfc3339(s).map_err(|e| {
            renderer.runtime_error("date", format!("`{}` is not an RFC 3339 date: {}", s, e))
        })?,
        Value::Int(secs) => DateTime::<Utc>::from_timestamp(*secs, 0)
            .ok_or_else(|| renderer.runtime_error("date", format!("timestamp {} out of range", secs)))?
            .fixed_offset(),
        other => {
            return Err(renderer.runtime_error(
                "date",
                format!("`{}` is a {}, not a date", selector, other.kind()),
            ))
        }
    };

    let mut out = String::new();
    write!(out, "{}", datetime.format(format))
        .map_err(|_| renderer.runtime_error("date", format!("cannot format with `{}`", format)))?;
    Ok(out)
}

// ============================================================================
// Body tags
// ============================================================================

pub fn compile_trim(ctx: &mut CompileContext<'_>, id: NodeId, _call: &TagCall) -> Result<Instruction> {
    Ok(Instruction::Raw {
        tag: "trim".to_string(),
        args: IndexMap::new(),
        body: Some(ctx.body(id)?),
    })
}

/// Renders the body and strips surrounding whitespace.
pub fn run_trim(
    renderer: &mut Renderer<'_>,
    _args: &IndexMap<String, String>,
    body: Option<&Program>,
) -> Result<String> {
    match body {
        Some(program) => Ok(renderer.render_to_string(program)?.trim().to_string()),
        None => Ok(String::new()),
    }
}

pub fn compile_literal(
    ctx: &mut CompileContext<'_>,
    id: NodeId,
    _call: &TagCall,
) -> Result<Instruction> {
    Ok(Instruction::literal(ctx.inner_source(id)))
}
