//! Promise bridge shell
//!
//! Interactive shell and script runner for driving promises by hand.
//!
//! ```text
//! > new
//! $0 = [object Promise]
//! > then $0 add 1
//! $1 = [object Promise]
//! > resolve $0 41
//! true
//! > run
//! ran 1 reaction(s)
//! > result $1
//! 42
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use promise_bridge::{
    ConfigError, Context, Function, Isolate, IsolateConfig, Promise, Resolver, Value,
};
use regex::Regex;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const HELP: &str = "\
commands:
  new                        create a resolver
  resolve $N <value>         fulfill the promise in slot N
  reject $N <value>          reject the promise in slot N
  state $N                   print the promise state
  result $N                  print the fulfillment value or rejection reason
  promise $N                 store the resolver's promise in a new slot
  then $N <op>               attach a fulfillment reaction
  catch $N <op>              attach a rejection reaction
  run                        perform a microtask checkpoint
  gc                         collect garbage
  stats                      print heap statistics
  terminate | resume         toggle execution termination
values: integers, true, false, null, undefined, \"text\", $N
ops: add <int>, mul <int>, id, throw";

#[derive(Debug, Error)]
enum ShellError {
    #[error("cannot parse `{0}`, type `help` for commands")]
    Syntax(String),
    #[error("no value in slot ${0}")]
    UnknownSlot(usize),
    #[error("slot ${0} does not hold a promise")]
    NotAPromise(usize),
    #[error("integer {0} does not fit in a small int")]
    IntRange(i64),
    #[error("{0} refused by the runtime")]
    Refused(&'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Readline(#[from] ReadlineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Op {
    Add(i32),
    Mul(i32),
    Id,
    Throw,
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Int(i32),
    Bool(bool),
    Null,
    Undefined,
    Text(String),
    Slot(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    New,
    Resolve(usize, Operand),
    Reject(usize, Operand),
    State(usize),
    Result(usize),
    Promise(usize),
    Then(usize, Op),
    Catch(usize, Op),
    Run,
    Gc,
    Stats,
    Terminate,
    Resume,
    Help,
}

struct Parser {
    bare: Regex,
    settle: Regex,
    query: Regex,
    reaction: Regex,
    int: Regex,
    text: Regex,
    slot: Regex,
}

impl Parser {
    fn new() -> Self {
        // The patterns are literals
        let re = |pattern: &str| Regex::new(pattern).unwrap_or_else(|e| panic!("{e}"));
        Parser {
            bare: re(r"^(new|run|gc|stats|terminate|resume|help)$"),
            settle: re(r"^(resolve|reject)\s+\$(\d+)\s+(.+)$"),
            query: re(r"^(state|result|promise)\s+\$(\d+)$"),
            reaction: re(r"^(then|catch)\s+\$(\d+)\s+(add|mul|id|throw)(?:\s+(-?\d+))?$"),
            int: re(r"^-?\d+$"),
            text: re(r#"^"(.*)"$"#),
            slot: re(r"^\$(\d+)$"),
        }
    }

    fn parse(&self, line: &str) -> Result<Command, ShellError> {
        let syntax = || ShellError::Syntax(line.to_string());

        if let Some(caps) = self.bare.captures(line) {
            return Ok(match &caps[1] {
                "new" => Command::New,
                "run" => Command::Run,
                "gc" => Command::Gc,
                "stats" => Command::Stats,
                "terminate" => Command::Terminate,
                "resume" => Command::Resume,
                _ => Command::Help,
            });
        }
        if let Some(caps) = self.settle.captures(line) {
            let slot = parse_slot(&caps[2]).ok_or_else(syntax)?;
            let operand = self.operand(caps[3].trim())?;
            return Ok(match &caps[1] {
                "resolve" => Command::Resolve(slot, operand),
                _ => Command::Reject(slot, operand),
            });
        }
        if let Some(caps) = self.query.captures(line) {
            let slot = parse_slot(&caps[2]).ok_or_else(syntax)?;
            return Ok(match &caps[1] {
                "state" => Command::State(slot),
                "result" => Command::Result(slot),
                _ => Command::Promise(slot),
            });
        }
        if let Some(caps) = self.reaction.captures(line) {
            let slot = parse_slot(&caps[2]).ok_or_else(syntax)?;
            let arg = caps.get(4).map(|m| parse_int(m.as_str())).transpose()?;
            let op = match (&caps[3], arg) {
                ("add", Some(n)) => Op::Add(n),
                ("mul", Some(n)) => Op::Mul(n),
                ("id", None) => Op::Id,
                ("throw", None) => Op::Throw,
                _ => return Err(syntax()),
            };
            return Ok(match &caps[1] {
                "then" => Command::Then(slot, op),
                _ => Command::Catch(slot, op),
            });
        }
        Err(syntax())
    }

    fn operand(&self, text: &str) -> Result<Operand, ShellError> {
        match text {
            "true" => return Ok(Operand::Bool(true)),
            "false" => return Ok(Operand::Bool(false)),
            "null" => return Ok(Operand::Null),
            "undefined" => return Ok(Operand::Undefined),
            _ => {}
        }
        if self.int.is_match(text) {
            return parse_int(text).map(Operand::Int);
        }
        if let Some(caps) = self.text.captures(text) {
            return Ok(Operand::Text(caps[1].to_string()));
        }
        if let Some(caps) = self.slot.captures(text) {
            if let Some(slot) = parse_slot(&caps[1]) {
                return Ok(Operand::Slot(slot));
            }
        }
        Err(ShellError::Syntax(text.to_string()))
    }
}

fn parse_slot(digits: &str) -> Option<usize> {
    digits.parse().ok()
}

fn parse_int(digits: &str) -> Result<i32, ShellError> {
    let wide: i64 = digits
        .parse()
        .map_err(|_| ShellError::Syntax(digits.to_string()))?;
    match i32::try_from(wide) {
        Ok(n) if promise_bridge::value::fits_in_short_int(n) => Ok(n),
        _ => Err(ShellError::IntRange(wide)),
    }
}

fn reaction(ctx: &mut Context<'_>, op: Op) -> Function {
    Function::new(ctx, move |_, value| match (op, value.to_i32()) {
        (Op::Id, _) => Ok(value),
        (Op::Throw, _) => Err(value),
        (Op::Add(n), Some(i)) => checked(i.checked_add(n), value),
        (Op::Mul(n), Some(i)) => checked(i.checked_mul(n), value),
        (_, None) => Err(value),
    })
}

fn checked(result: Option<i32>, original: Value) -> Result<Value, Value> {
    match result {
        Some(n) if promise_bridge::value::fits_in_short_int(n) => Ok(Value::int(n)),
        _ => Err(original),
    }
}

struct Shell {
    isolate: Isolate,
    /// Values bound to `$N`, rooted in the isolate's outermost scope
    slots: Vec<Value>,
    handlers: HashMap<Op, Function>,
    parser: Parser,
}

impl Shell {
    fn new(config: IsolateConfig) -> Self {
        Shell {
            isolate: Isolate::new(config),
            slots: Vec::new(),
            handlers: HashMap::new(),
            parser: Parser::new(),
        }
    }

    /// Execute one line, returning the text to print
    ///
    /// Every command runs in its own handle scope. Only values bound to a new
    /// slot escape it.
    fn exec(&mut self, line: &str) -> Result<Option<String>, ShellError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let command = self.parser.parse(line)?;
        tracing::trace!(?command, "exec");

        let slots = &mut self.slots;
        let handlers = &mut self.handlers;
        let mut ctx = self.isolate.context();
        let output = match command {
            Command::New => {
                let resolver = escape(&mut ctx, |ctx| {
                    let resolver = Resolver::new(ctx).ok_or(ShellError::Refused("new"))?;
                    Ok(resolver.into_value())
                })?;
                store(slots, &ctx, resolver)
            }
            Command::Resolve(slot, operand) => ctx.handle_scope(|ctx| {
                let resolver = resolver_at(slots, ctx, slot)?;
                let value = materialize(slots, ctx, operand)?;
                let settled = resolver.resolve(ctx, value);
                Ok::<_, ShellError>(settled.ok_or(ShellError::Refused("resolve"))?.to_string())
            })?,
            Command::Reject(slot, operand) => ctx.handle_scope(|ctx| {
                let resolver = resolver_at(slots, ctx, slot)?;
                let reason = materialize(slots, ctx, operand)?;
                let settled = resolver.reject(ctx, reason);
                Ok::<_, ShellError>(settled.ok_or(ShellError::Refused("reject"))?.to_string())
            })?,
            Command::State(slot) => promise_at(slots, &ctx, slot)?.state(&ctx).to_string(),
            Command::Result(slot) => ctx.handle_scope(|ctx| {
                let value = promise_at(slots, ctx, slot)?.result(ctx);
                Ok::<_, ShellError>(ctx.display(value))
            })?,
            Command::Promise(slot) => {
                let promise = escape(&mut ctx, |ctx| {
                    Ok(resolver_at(slots, ctx, slot)?.get_promise(ctx).into_value())
                })?;
                store(slots, &ctx, promise)
            }
            Command::Then(slot, op) | Command::Catch(slot, op) => {
                let on_fulfilled = matches!(command, Command::Then(..));
                let handler = handler_for(handlers, &mut ctx, op);
                let derived = escape(&mut ctx, |ctx| {
                    let promise = promise_at(slots, ctx, slot)?;
                    let derived = if on_fulfilled {
                        promise.then(ctx, handler).ok_or(ShellError::Refused("then"))?
                    } else {
                        promise.catch(ctx, handler).ok_or(ShellError::Refused("catch"))?
                    };
                    Ok(derived.into_value())
                })?;
                store(slots, &ctx, derived)
            }
            Command::Run => {
                let ran = ctx.perform_microtask_checkpoint();
                format!("ran {ran} reaction(s)")
            }
            Command::Gc => {
                let stats = ctx.isolate().collect_garbage();
                format!(
                    "collected {} of {} object(s), {} live",
                    stats.freed, stats.objects_before, stats.objects_after
                )
            }
            Command::Stats => {
                let stats = ctx.isolate().heap_stats();
                format!(
                    "live {}/{} rooted {} pending jobs {}",
                    stats.live, stats.limit, stats.rooted, stats.pending_jobs
                )
            }
            Command::Terminate => {
                ctx.isolate().terminate_execution();
                "terminating".to_string()
            }
            Command::Resume => {
                ctx.isolate().cancel_terminate_execution();
                "running".to_string()
            }
            Command::Help => HELP.to_string(),
        };
        Ok(Some(output))
    }
}

/// Run `f` in an escapable scope, keeping only the value it returns
fn escape(
    ctx: &mut Context<'_>,
    f: impl FnOnce(&mut Context<'_>) -> Result<Value, ShellError>,
) -> Result<Value, ShellError> {
    let mut failure = None;
    let value = ctx.escapable_handle_scope(|ctx| {
        f(ctx).unwrap_or_else(|err| {
            failure = Some(err);
            Value::undefined()
        })
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(value),
    }
}

/// One registered handler per distinct op
fn handler_for(handlers: &mut HashMap<Op, Function>, ctx: &mut Context<'_>, op: Op) -> Function {
    *handlers.entry(op).or_insert_with(|| reaction(ctx, op))
}

fn lookup(slots: &[Value], slot: usize) -> Result<Value, ShellError> {
    slots.get(slot).copied().ok_or(ShellError::UnknownSlot(slot))
}

fn promise_at(slots: &[Value], ctx: &Context<'_>, slot: usize) -> Result<Promise, ShellError> {
    Promise::cast(ctx, lookup(slots, slot)?).ok_or(ShellError::NotAPromise(slot))
}

fn resolver_at(slots: &[Value], ctx: &Context<'_>, slot: usize) -> Result<Resolver, ShellError> {
    Resolver::cast(ctx, lookup(slots, slot)?).ok_or(ShellError::NotAPromise(slot))
}

fn store(slots: &mut Vec<Value>, ctx: &Context<'_>, value: Value) -> String {
    slots.push(value);
    format!("${} = {}", slots.len() - 1, ctx.display(value))
}

fn materialize(slots: &[Value], ctx: &mut Context<'_>, operand: Operand) -> Result<Value, ShellError> {
    Ok(match operand {
        Operand::Int(n) => Value::int(n),
        Operand::Bool(b) => Value::bool(b),
        Operand::Null => Value::null(),
        Operand::Undefined => Value::undefined(),
        Operand::Text(s) => ctx.string(&s),
        Operand::Slot(slot) => lookup(slots, slot)?,
    })
}

struct Options {
    config: Option<PathBuf>,
    script: Option<PathBuf>,
}

fn parse_args() -> Result<Options, String> {
    let mut options = Options {
        config: None,
        script: None,
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                options.config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => return Err("usage: pbsh [--config <path>] [script]".to_string()),
            _ if options.script.is_none() => options.script = Some(PathBuf::from(arg)),
            _ => return Err(format!("unexpected argument `{arg}`")),
        }
    }
    Ok(options)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    init_tracing();

    let options = match parse_args() {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    let config = match options.config.as_deref().map(IsolateConfig::load).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let mut shell = Shell::new(config);
    let result = match options.script {
        Some(path) => run_file(&mut shell, &path),
        None => run_repl(&mut shell),
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run_file(shell: &mut Shell, path: &std::path::Path) -> Result<(), ShellError> {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", path.display(), e);
            std::process::exit(1);
        }
    };

    for line in source.lines() {
        if let Some(output) = shell.exec(line)? {
            println!("{output}");
        }
    }
    Ok(())
}

fn run_repl(shell: &mut Shell) -> Result<(), ShellError> {
    println!("promise-bridge shell");
    println!("Type `help` for commands, Ctrl+D to exit.\n");

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                match shell.exec(&line) {
                    Ok(Some(output)) => println!("{output}"),
                    Ok(None) => {}
                    Err(e) => println!("Error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
