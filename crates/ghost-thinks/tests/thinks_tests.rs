//! Reference thinks and commands driven through a real ghost

use ghost_core::*;
use ghost_kernel::storage::process_key;
use ghost_kernel::*;
use ghost_thinks::{commands, default_focus, default_mindset, ThinkCatalog};
use std::sync::Arc;

fn trace() -> Trace {
    Trace::new("c1", "s1")
}

fn texts(outputs: &[Output]) -> Vec<String> {
    outputs
        .iter()
        .filter_map(|o| o.text().map(str::to_string))
        .collect()
}

fn stored(storage: &MemoryStorage) -> Option<Process> {
    storage
        .get(&process_key("s1", "s1"))
        .unwrap()
        .map(|bytes| Process::decode(&bytes).unwrap())
}

fn ghost(mindset: Mindset, focus: Focus, root: &str, storage: Arc<MemoryStorage>) -> Ghost {
    let config = GhostConfig {
        root_url: Url::new(root),
        ..Default::default()
    };
    Ghost::builder(config)
        .mindset(mindset)
        .focus(focus)
        .storage(storage)
        .build()
        .unwrap()
}

fn hello(storage: Arc<MemoryStorage>) -> Ghost {
    ghost(default_mindset(), default_focus(), "helloworld", storage)
}

const WEATHER: &str = r#"
[[thinks]]
id = "weather"
kind = "scripted"

[thinks.config]
description = "asks for a city"

[[thinks.config.stages]]
name = ""
on_activating = ["Which city?"]
on_received = ["I did not get '{text}'"]

[[thinks.config.stages.reactions]]
name = "city"
intentions = [{ kind = "regex", pattern = "^(?P<city>[A-Z]\\w+)$" }]
replies = ["It is sunny in {city}."]
then = { op = "finish" }

[[thinks]]
id = "trip"
kind = "scripted"

[[thinks.config.stages]]
name = ""
on_activating = ["Planning a trip."]
on_callback = ["Got it: {callback}"]
then = { op = "depend_on", think = "weather" }
"#;

fn scripted_mindset() -> Mindset {
    let mut mindset = default_mindset();
    let count = ThinkCatalog::from_toml_str(WEATHER)
        .unwrap()
        .register(&mut mindset)
        .unwrap();
    assert_eq!(count, 2);
    mindset
}

// ===========================================================================
// helloworld
// ===========================================================================

#[test]
fn helloworld_greets_then_echoes() {
    let storage = Arc::new(MemoryStorage::new());
    let ghost = hello(storage.clone());

    let outputs = ghost.respond(Input::text(trace(), "hi"));
    assert_eq!(
        texts(&outputs),
        vec!["hello world!", "you said: hi", "I can only speak hello world!"]
    );

    let process = stored(&storage).unwrap();
    assert_eq!(process.len(), 1);
    assert_eq!(process.root_task().unwrap().status, TaskStatus::Waiting);

    let outputs = ghost.respond(Input::text(trace(), "again"));
    assert_eq!(
        texts(&outputs),
        vec!["you said: again", "I can only speak hello world!"]
    );
}

// ===========================================================================
// Commands
// ===========================================================================

#[test]
fn help_lists_commands_without_touching_the_process() {
    let storage = Arc::new(MemoryStorage::new());
    let ghost = hello(storage.clone());
    ghost.respond(Input::text(trace(), "hi"));
    let before = storage.get(&process_key("s1", "s1")).unwrap();

    let outputs = ghost.respond(Input::text(trace(), "/help"));
    assert_eq!(outputs.len(), 1);
    let text = outputs[0].payload.body.text.as_ref().unwrap();
    assert!(text.markdown);
    assert_eq!(
        text.content,
        "**Commands**\n\n\
         - `/help` list available commands\n\
         - `/cancel` cancel the current task\n\
         - `/quit` end the conversation"
    );
    assert_eq!(storage.get(&process_key("s1", "s1")).unwrap(), before);
}

#[test]
fn quit_ends_the_conversation() {
    let storage = Arc::new(MemoryStorage::new());
    let ghost = hello(storage.clone());
    ghost.respond(Input::text(trace(), "hi"));

    let outputs = ghost.respond(Input::text(trace(), "/quit"));
    assert!(outputs.last().unwrap().is_quit());
    assert!(stored(&storage).is_none());

    // the next message starts over
    let outputs = ghost.respond(Input::text(trace(), "hi"));
    assert_eq!(texts(&outputs)[0], "hello world!");
}

#[test]
fn routed_command_starts_a_task_and_cancel_returns_to_root() {
    let storage = Arc::new(MemoryStorage::new());
    let mut focus = default_focus();
    focus.register_global(commands::route(
        "weather",
        "ask for the weather",
        Url::new("weather"),
        "city",
    ));
    let ghost = ghost(scripted_mindset(), focus, "helloworld", storage.clone());
    ghost.respond(Input::text(trace(), "hi"));

    let outputs = ghost.respond(Input::text(trace(), "/weather"));
    assert_eq!(texts(&outputs), vec!["Which city?"]);
    let process = stored(&storage).unwrap();
    assert_eq!(process.len(), 2);
    assert_eq!(process.current_task().unwrap().url.think, "weather");

    let outputs = ghost.respond(Input::text(trace(), "/cancel"));
    assert!(!outputs.iter().any(Output::is_quit));
    let process = stored(&storage).unwrap();
    assert_eq!(process.current, process.root);
    assert_eq!(process.len(), 1);

    let outputs = ghost.respond(Input::text(trace(), "still there?"));
    assert_eq!(texts(&outputs)[0], "you said: still there?");
}

#[test]
fn help_lists_routed_commands_too() {
    let mut focus = default_focus();
    focus.register_global(commands::route("weather", "", Url::new("weather"), "city"));
    let ghost = ghost(
        scripted_mindset(),
        focus,
        "helloworld",
        Arc::new(MemoryStorage::new()),
    );
    ghost.respond(Input::text(trace(), "hi"));
    let outputs = ghost.respond(Input::text(trace(), "/help"));
    assert!(texts(&outputs)[0].ends_with("- `/weather`"));
}

// ===========================================================================
// Scripted thinks
// ===========================================================================

#[test]
fn scripted_reaction_finishes_with_params() {
    let storage = Arc::new(MemoryStorage::new());
    let mut focus = default_focus();
    focus.register_global(commands::route("weather", "", Url::new("weather"), "city"));
    let ghost = ghost(scripted_mindset(), focus, "helloworld", storage.clone());
    ghost.respond(Input::text(trace(), "hi"));
    ghost.respond(Input::text(trace(), "/weather"));

    let outputs = ghost.respond(Input::text(trace(), "lol"));
    assert_eq!(texts(&outputs), vec!["I did not get 'lol'"]);

    let outputs = ghost.respond(Input::text(trace(), "Paris"));
    assert_eq!(texts(&outputs), vec!["It is sunny in Paris."]);
    let process = stored(&storage).unwrap();
    assert_eq!(process.current, process.root);
    assert_eq!(process.len(), 1);
}

#[test]
fn scripted_dependency_calls_back_with_the_result() {
    let storage = Arc::new(MemoryStorage::new());
    let ghost = ghost(scripted_mindset(), default_focus(), "trip", storage.clone());

    let outputs = ghost.respond(Input::text(trace(), "go"));
    assert_eq!(
        texts(&outputs),
        vec!["Planning a trip.", "Which city?", "I did not get 'go'"]
    );
    let process = stored(&storage).unwrap();
    assert_eq!(process.root_task().unwrap().status, TaskStatus::Depending);

    let outputs = ghost.respond(Input::text(trace(), "Rome"));
    assert_eq!(
        texts(&outputs),
        vec!["It is sunny in Rome.", r#"Got it: {"city":"Rome"}"#]
    );
    let process = stored(&storage).unwrap();
    let root = process.root_task().unwrap();
    assert_eq!(root.status, TaskStatus::Waiting);
    assert!(root.depending.is_none());
}

#[test]
fn catalog_loads_from_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thinks.toml");
    std::fs::write(&path, WEATHER).unwrap();

    let mut mindset = default_mindset();
    let count = ThinkCatalog::load(&path).unwrap().register(&mut mindset).unwrap();
    assert_eq!(count, 2);
    assert!(mindset.contains("weather"));
    assert!(mindset.fetch("trip").is_ok());
}

#[test]
fn catalog_rejects_unknown_kinds() {
    let mut mindset = default_mindset();
    let catalog = ThinkCatalog::from_toml_str("[[thinks]]\nid = \"x\"\nkind = \"llm\"\n").unwrap();
    assert!(matches!(catalog.register(&mut mindset), Err(Error::Bootstrap(_))));

    assert!(matches!(
        ThinkCatalog::from_toml_str("thinks = 3"),
        Err(Error::Config(_))
    ));
}
