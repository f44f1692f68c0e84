//! Integration tests: the console shell end to end, in-process and as a binary.

use ghostkernel::console::{build_ghost, Console, ConsoleOptions};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

fn options(session: &str) -> ConsoleOptions {
    ConsoleOptions {
        session: session.into(),
        ..Default::default()
    }
}

#[test]
fn console_greets_and_quits() {
    let console = Console::new(Arc::new(build_ghost(&options("s1")).unwrap()), "s1");

    let turn = console.handle_line("hi");
    assert_eq!(
        turn.lines,
        vec!["hello world!", "you said: hi", "I can only speak hello world!"]
    );
    assert!(!turn.quit);

    let turn = console.handle_line("/quit");
    assert!(turn.quit);
}

#[test]
fn console_loads_scripted_thinks_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ghost.toml");
    std::fs::write(
        &path,
        r#"
root_url = { think = "greeter" }
on_error = "oops"

[[thinks]]
id = "greeter"
kind = "scripted"

[[thinks.config.stages]]
name = ""
on_activating = ["Hi! What is your name?"]
on_received = ["Nice to meet you, {text}."]
"#,
    )
    .unwrap();

    let options = ConsoleOptions {
        session: "s1".into(),
        config: Some(path),
        store: None,
    };
    assert_eq!(options.load_config().on_error, "oops");
    let console = Console::new(Arc::new(build_ghost(&options).unwrap()), "s1");
    let turn = console.handle_line("Ada");
    assert_eq!(turn.lines, vec!["Hi! What is your name?", "Nice to meet you, Ada."]);
}

#[test]
fn console_store_survives_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let options = ConsoleOptions {
        session: "s1".into(),
        config: None,
        store: Some(dir.path().to_path_buf()),
    };

    let first = Console::new(Arc::new(build_ghost(&options).unwrap()), "s1");
    assert_eq!(first.handle_line("hi").lines[0], "hello world!");
    drop(first);

    let second = Console::new(Arc::new(build_ghost(&options).unwrap()), "s1");
    assert_eq!(second.handle_line("back").lines[0], "you said: back");
}

#[test]
fn binary_chats_until_quit() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_ghost-console"))
        .args(["chat", "--session", "bin"])
        .env("RUST_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"hi\n/quit\nnever read\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("hello world!"));
    assert!(stdout.contains("you said: hi"));
    assert!(!stdout.contains("never read"));
}

#[test]
fn binary_prints_config() {
    let output = Command::new(env!("CARGO_BIN_EXE_ghost-console"))
        .arg("config")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("max_operators = 100"));
    assert!(stdout.contains("helloworld"));
}
