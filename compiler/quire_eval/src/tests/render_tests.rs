//! Template rendering through `Engine` and `Renderer`.

use std::any::Any;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use quire_ir::{Location, NodeId, NodeKind, Tree};
use rayon::prelude::*;

use super::{bindings, Tpl};
use crate::{
    resource_not_found, Bindings, Engine, EventCartridge, Frame, HostObject, IntrospectionCache,
    Macro, MacroTable, MemoryLoader, MethodHandle, MethodResolver, MethodTable, RenderConfig,
    RenderEnv, RenderErrorKind, RenderState, Renderer, SharedState, Sink, Value,
};

fn render(engine: &Engine, tree: &Arc<Tree>, bindings: Bindings) -> String {
    engine.render_to_string("page.vm", tree, bindings).unwrap()
}

fn template(build: impl FnOnce(&mut Tpl) -> Vec<NodeId>) -> Arc<Tree> {
    let mut t = Tpl::new();
    let children = build(&mut t);
    t.finish(children)
}

fn macro_def(name: &str, params: &[&str], build: impl FnOnce(&mut Tpl) -> Vec<NodeId>) -> Macro {
    let params = params.iter().map(ToString::to_string).collect();
    Macro::new(name, params, template(build))
}

fn table(definitions: impl IntoIterator<Item = Macro>) -> MacroTable {
    let mut table = MacroTable::new();
    for definition in definitions {
        table.define(definition);
    }
    table
}

// Output

#[test]
fn test_text_and_references() {
    let tree = template(|t| {
        vec![
            t.text("Hello, "),
            t.var("name"),
            t.text("! "),
            t.op(NodeKind::Comment("note".into()), []),
            t.op(NodeKind::Escape("\\$name".into()), []),
        ]
    });
    let out = render(
        &Engine::builder().build(),
        &tree,
        bindings([("name", Value::from("ada"))]),
    );
    assert_eq!(out, "Hello, ada! \\$name");
}

#[test]
fn test_unresolved_reference_renders_as_written_unless_strict() {
    let tree = template(|t| {
        let p = t.prop("name");
        vec![t.text("["), t.reference("user", [p]), t.text("]")]
    });

    let lenient = Engine::builder().build();
    assert_eq!(render(&lenient, &tree, Bindings::default()), "[$user.name]");

    let strict = Engine::builder().config(RenderConfig::strict()).build();
    assert_eq!(render(&strict, &tree, Bindings::default()), "[]");
}

#[test]
fn test_set_assigns_and_null_removes() {
    let tree = template(|t| {
        let x = t.var("x");
        let one = t.int(1);
        let first = t.set(x, one);
        let x = t.var("x");
        let x2 = t.var("x");
        let nothing = t.var("nothing");
        let second = t.set(x2, nothing);
        let x3 = t.var("x");
        vec![first, x, t.text("|"), second, x3]
    });
    let engine = Engine::builder().build();
    assert_eq!(render(&engine, &tree, Bindings::default()), "1|$x");
}

#[test]
fn test_set_on_map_entry_copies_on_write() {
    let page = Value::map([("title", Value::from("Old"))]);
    let tree = template(|t| {
        let title = t.prop("title");
        let target = t.reference("page", [title]);
        let value = t.string("New");
        let set = t.set(target, value);
        let title = t.prop("title");
        vec![set, t.reference("page", [title])]
    });
    let engine = Engine::builder().build();

    assert_eq!(render(&engine, &tree, bindings([("page", page.clone())])), "New");
    assert_eq!(page.to_string(), "{title=Old}");
}

#[test]
fn test_if_elseif_else_chooses_one_block() {
    let tree = template(|t| {
        let n = t.var("n");
        let one = t.int(1);
        let cond = t.op(NodeKind::Eq, [n, one]);
        let text = t.text("one");
        let block = t.block([text]);

        let n = t.var("n");
        let two = t.int(2);
        let cond2 = t.op(NodeKind::Eq, [n, two]);
        let text = t.text("two");
        let block2 = t.block([text]);
        let elseif = t.else_if(cond2, block2);

        let text = t.text("many");
        let block3 = t.block([text]);
        let else_ = t.else_(block3);

        vec![t.if_(cond, block, [elseif, else_])]
    });
    let engine = Engine::builder().build();
    let run = |n: i64| render(&engine, &tree, bindings([("n", Value::Int(n))]));

    assert_eq!(run(1), "one");
    assert_eq!(run(2), "two");
    assert_eq!(run(3), "many");
}

// Loops

#[test]
fn test_foreach_binds_item_and_status() {
    let tree = template(|t| {
        let lo = t.int(1);
        let hi = t.int(3);
        let range = t.range(lo, hi);

        let item = t.var("i");
        let has_next = t.prop("hasNext");
        let cond = t.reference("foreach", [has_next]);
        let comma = t.text(",");
        let sep = t.block([comma]);
        let sep = t.if_(cond, sep, []);
        let body = t.block([item, sep]);

        let after = t.var("i");
        vec![t.foreach("i", range, body), t.text(" "), after]
    });
    let engine = Engine::builder().build();
    assert_eq!(render(&engine, &tree, Bindings::default()), "1,2,3 $i");
}

#[test]
fn test_set_inside_foreach_reaches_enclosing_scope() {
    let tree = template(|t| {
        let sum = t.var("sum");
        let zero = t.int(0);
        let init = t.set(sum, zero);

        let sum = t.var("sum");
        let n = t.var("n");
        let add = t.op(NodeKind::Add, [sum, n]);
        let target = t.var("sum");
        let step = t.set(target, add);
        let body = t.block([step]);
        let items = t.var("items");
        let each = t.foreach("n", items, body);

        vec![init, each, t.var("sum")]
    });
    let items = Value::list((1..=4).map(Value::Int));
    let engine = Engine::builder().build();
    assert_eq!(render(&engine, &tree, bindings([("items", items)])), "10");
}

#[test]
fn test_foreach_over_map_values_and_non_collections() {
    let tree = template(|t| {
        let v = t.var("v");
        let body = t.block([v]);
        let prices = t.var("prices");
        let each = t.foreach("v", prices, body);

        let v = t.var("v");
        let body = t.block([v]);
        let scalar = t.var("scalar");
        let skipped = t.foreach("v", scalar, body);
        vec![each, skipped]
    });
    let prices = Value::map([("b", Value::Int(2)), ("a", Value::Int(1))]);
    let engine = Engine::builder().build();
    let out = render(
        &engine,
        &tree,
        bindings([("prices", prices), ("scalar", Value::Int(7))]),
    );
    assert_eq!(out, "12");
}

// Includes

fn footer() -> Arc<Tree> {
    template(|t| {
        let seen = t.var("seen");
        let yes = t.boolean(true);
        vec![t.text("by "), t.var("author"), t.set(seen, yes)]
    })
}

fn include(t: &mut Tpl, name: &str) -> NodeId {
    let name = t.string(name);
    t.directive("parse", [name])
}

#[test]
fn test_parse_renders_in_forwarding_frame() {
    let mut loader = MemoryLoader::new();
    loader.insert_shared("footer.vm", footer());
    let engine = Engine::builder().loader(loader).build();

    let tree = template(|t| vec![include(t, "footer.vm"), t.text(" "), t.var("seen")]);
    let out = render(&engine, &tree, bindings([("author", Value::from("ada"))]));
    assert_eq!(out, "by ada true");
}

struct IncludePolicy;

impl EventCartridge for IncludePolicy {
    fn include_event(&self, requested: &str, current: Option<&str>) -> Option<String> {
        assert_eq!(current, Some("page.vm"));
        match requested {
            "secret.vm" => None,
            "old-footer.vm" => Some("footer.vm".to_string()),
            other => Some(other.to_string()),
        }
    }
}

#[test]
fn test_include_event_can_veto_or_rewrite() {
    let mut loader = MemoryLoader::new();
    loader.insert_shared("footer.vm", footer());
    let engine = Engine::builder()
        .loader(loader)
        .event_cartridge(IncludePolicy)
        .build();

    let tree = template(|t| {
        vec![
            include(t, "secret.vm"),
            t.text("|"),
            include(t, "old-footer.vm"),
        ]
    });
    let out = render(&engine, &tree, bindings([("author", Value::from("ada"))]));
    assert_eq!(out, "|by ada");
}

#[test]
fn test_parse_without_resource_fails_with_stacks() {
    let engine = Engine::builder().build();
    let tree = template(|t| vec![include(t, "missing.vm")]);

    let err = engine
        .render_to_string("page.vm", &tree, Bindings::default())
        .unwrap_err();
    assert_eq!(
        err,
        resource_not_found("missing.vm").with_stacks(vec!["page.vm".to_string()], vec![])
    );
}

#[test]
fn test_error_carries_innermost_location() {
    let engine = Engine::builder().build();
    let tree = template(|t| {
        let name = t.string("missing.vm");
        let parse = t.at(NodeKind::Directive("parse".into()), 3, 7, vec![name]);
        let block = t.at(NodeKind::Block, 1, 1, vec![parse]);
        vec![block]
    });

    let err = engine
        .render_to_string("page.vm", &tree, Bindings::default())
        .unwrap_err();
    assert_eq!(err.location, Some(Location::new(3, 7)));
    assert_eq!(
        err.to_string(),
        "resource not found: missing.vm in page.vm at line 3, column 7"
    );
}

#[test]
fn test_render_resource_goes_through_loader() {
    let mut loader = MemoryLoader::new();
    loader.insert_shared("footer.vm", footer());
    let engine = Engine::builder().loader(loader).build();

    let sink = Sink::buffer();
    engine
        .render_resource("footer.vm", bindings([("author", Value::from("ada"))]), &sink)
        .unwrap();
    assert_eq!(sink.output(), "by ada");

    let err = engine
        .render_resource("nope.vm", Bindings::default(), &sink)
        .unwrap_err();
    assert!(matches!(err.kind, RenderErrorKind::ResourceNotFound { .. }));
}

// Macros

#[test]
fn test_macro_arguments_bind_locally() {
    let greet = macro_def("greet", &["who"], |t| {
        let local = t.var("local");
        let one = t.int(1);
        vec![t.text("Hi "), t.var("who"), t.set(local, one)]
    });
    let engine = Engine::builder().macros(table([greet])).build();

    let tree = template(|t| {
        let arg = t.string("ada");
        vec![t.directive("greet", [arg]), t.var("local"), t.var("who")]
    });
    assert_eq!(render(&engine, &tree, Bindings::default()), "Hi ada$local$who");
}

#[test]
fn test_macro_arity_is_lenient() {
    let pair = macro_def("pair", &["a", "b"], |t| vec![t.var("a"), t.text("/"), t.var("b")]);
    let engine = Engine::builder()
        .config(RenderConfig::strict())
        .macros(table([pair]))
        .build();

    let tree = template(|t| {
        let one = t.int(1);
        let short = t.directive("pair", [one]);
        let x = t.int(1);
        let y = t.int(2);
        let z = t.int(3);
        let long = t.directive("pair", [x, y, z]);
        vec![short, t.text(" "), long]
    });
    assert_eq!(render(&engine, &tree, Bindings::default()), "1/ 1/2");
}

#[test]
fn test_unknown_directive_renders_literally() {
    let engine = Engine::builder().build();
    let tree = template(|t| {
        let one = t.int(1);
        let a = t.string("a");
        vec![t.directive("nosuch", [one, a]), t.directive("bare", [])]
    });
    assert_eq!(
        render(&engine, &tree, Bindings::default()),
        "#nosuch(1 \"a\")#bare"
    );
}

fn constant(name: &str, text: &str) -> Macro {
    let text = text.to_string();
    macro_def(name, &[], move |t| vec![t.text(&text)])
}

#[test]
fn test_inline_macros_win_then_libraries_in_order() {
    let calls = template(|t| vec![t.directive("greet", []), t.directive("bye", [])]);

    let libraries_only = Engine::builder()
        .macro_library("site", table([constant("greet", "A")]))
        .macro_library("common", table([constant("greet", "B"), constant("bye", "-b")]))
        .build();
    assert_eq!(render(&libraries_only, &calls, Bindings::default()), "A-b");

    let with_inline = Engine::builder()
        .macros(table([constant("greet", "inline")]))
        .macro_library("site", table([constant("greet", "A")]))
        .macro_library("common", table([constant("greet", "B"), constant("bye", "-b")]))
        .build();
    assert_eq!(render(&with_inline, &calls, Bindings::default()), "inline-b");
}

/// Counts how often its only method runs.
#[derive(Debug, Default)]
struct Counter(AtomicUsize);

impl HostObject for Counter {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn counter_table() -> MethodTable {
    let mut table = MethodTable::new();
    table.register_host::<Counter, _>("tick", |counter, _| {
        counter.0.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Bool(true))
    });
    table
}

fn tick(t: &mut Tpl) -> NodeId {
    let call = t.method("tick", []);
    t.reference("counter", [call])
}

#[test]
fn test_recursion_limit_stops_before_arguments() {
    let recurse = macro_def("recurse", &["flag"], |t| {
        let arg = tick(t);
        vec![t.text("x"), t.directive("recurse", [arg])]
    });
    let engine = Engine::builder()
        .config(RenderConfig::default().with_max_macro_depth(Some(3)))
        .resolver(Arc::new(counter_table()))
        .macros(table([recurse]))
        .build();

    let counter = Arc::new(Counter::default());
    let tree = template(|t| {
        let arg = tick(t);
        vec![t.directive("recurse", [arg])]
    });
    let sink = Sink::buffer();
    let bindings = bindings([("counter", Value::Host(counter.clone()))]);
    let err = engine.render("page.vm", &tree, bindings, &sink).unwrap_err();

    assert!(err.is_recursion_limit());
    assert_eq!(err.macro_stack, vec!["recurse"; 3]);
    assert_eq!(err.template_stack, vec!["page.vm"]);
    assert_eq!(sink.output(), "xxx");
    assert_eq!(counter.0.load(Ordering::SeqCst), 3);
}

#[test]
fn test_stacks_unwind_after_failure() {
    let wrap = macro_def("wrap", &[], |t| vec![t.text("<"), include(t, "missing.vm")]);
    let macros = table([wrap]);
    let libraries = rustc_hash::FxHashMap::default();
    let config = RenderConfig::default();
    let resolver = MethodTable::new();
    let sink = Sink::buffer();
    let env = RenderEnv {
        config: &config,
        loader: None,
        resolver: &resolver,
        macros: &macros,
        libraries: &libraries,
        sink: &sink,
    };

    let state = SharedState::new(RenderState::new(Some(5), IntrospectionCache::new()));
    let base = Frame::base(state, Bindings::default());
    let tree = template(|t| vec![t.directive("wrap", [])]);
    let err = {
        let _template = base.enter_template("page.vm");
        Renderer::new(&base, env).render(&tree).unwrap_err()
    };

    assert_eq!(err.macro_stack, vec!["wrap"]);
    assert_eq!(err.template_stack, vec!["page.vm"]);
    assert_eq!(base.macro_depth(), 0);
    assert!(base.template_stack().is_empty());
    assert_eq!(sink.output(), "<");
}

// Event cartridge

#[derive(Default)]
struct Decorate {
    invalid: Mutex<Vec<String>>,
}

impl EventCartridge for Decorate {
    fn reference_insert(&self, reference: &str, value: Value) -> Value {
        Value::from(format!("{reference}=<{value}>"))
    }

    fn invalid_reference(&self, reference: &str) {
        self.invalid.lock().push(reference.to_string());
    }
}

#[test]
fn test_reference_insert_rewrites_output() {
    let events = Arc::new(Decorate::default());
    let engine = Engine::builder()
        .shared_event_cartridge(events.clone())
        .build();
    let tree = template(|t| vec![t.var("name"), t.text(" "), t.var("missing")]);

    let out = render(&engine, &tree, bindings([("name", Value::from("ada"))]));
    assert_eq!(out, "$name=<ada> $missing");
    assert_eq!(*events.invalid.lock(), vec!["$missing".to_string()]);
}

// Introspection cache

/// Wraps the stock table and counts resolver calls.
#[derive(Default)]
struct CountingResolver {
    inner: MethodTable,
    calls: AtomicUsize,
}

impl MethodResolver for CountingResolver {
    fn resolve(&self, target: &Value, method: &str, arg_count: usize) -> Option<MethodHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(target, method, arg_count)
    }
}

fn sizes() -> Arc<Tree> {
    template(|t| {
        let size = t.method("size", []);
        let item = t.reference("item", [size]);
        let body = t.block([item]);
        let items = t.var("items");
        vec![t.foreach("item", items, body)]
    })
}

#[test]
fn test_resolution_is_cached_per_node_and_type() {
    let resolver = Arc::new(CountingResolver::default());
    let engine = Engine::builder().resolver(resolver.clone()).build();
    let tree = sizes();

    let same_type = Value::list([Value::from("a"), Value::from("bb"), Value::from("ccc")]);
    let out = render(&engine, &tree, bindings([("items", same_type)]));
    assert_eq!(out, "123");
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);

    resolver.calls.store(0, Ordering::SeqCst);
    let mixed = Value::list([
        Value::from("a"),
        Value::list([Value::Int(1), Value::Int(2)]),
        Value::from("bb"),
    ]);
    let out = render(&engine, &tree, bindings([("items", mixed)]));
    assert_eq!(out, "122");
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_shared_cache_survives_across_renders() {
    let resolver = Arc::new(CountingResolver::default());
    let engine = Engine::builder()
        .config(RenderConfig::default().with_shared_cache(true))
        .resolver(resolver.clone())
        .build();
    let tree = sizes();
    let items = || bindings([("items", Value::list([Value::from("abc")]))]);

    assert_eq!(render(&engine, &tree, items()), "3");
    assert_eq!(render(&engine, &tree, items()), "3");
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.shared_cache().map(IntrospectionCache::len), Some(1));
}

#[test]
fn test_concurrent_renders_share_one_cache() {
    let cache = IntrospectionCache::new();
    let engine = Engine::builder().introspection_cache(cache.clone()).build();
    let tree = sizes();

    let lengths: Vec<usize> = [1, 2, 3, 4].into_iter().cycle().take(16).collect();
    let outputs: Vec<String> = lengths
        .par_iter()
        .map(|&len| {
            let items = Value::list([Value::from("x".repeat(len))]);
            render(&engine, &tree, bindings([("items", items)]))
        })
        .collect();

    let expected: Vec<String> = lengths.iter().map(ToString::to_string).collect();
    assert_eq!(outputs, expected);
    assert_eq!(cache.len(), 1);
}

// Output failures

struct Closed;

impl Write for Closed {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_sink_failure_ends_render() {
    let engine = Engine::builder().build();
    let tree = template(|t| vec![t.text("never written")]);

    let err = engine
        .render("page.vm", &tree, Bindings::default(), &Sink::writer(Closed))
        .unwrap_err();
    assert!(matches!(err.kind, RenderErrorKind::Output { .. }));
    assert_eq!(err.template_stack, vec!["page.vm"]);
}
