use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use stepwise_migrate::SEPARATOR;

struct Workspace {
    _root: tempfile::TempDir,
    dir: PathBuf,
    db: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("migrations");
        let db = root.path().join("app.db");
        Self {
            _root: root,
            dir,
            db,
        }
    }

    fn url(&self) -> String {
        format!("sqlite:{}", self.db.display())
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_stepwise"))
            .arg("--dir")
            .arg(&self.dir)
            .arg("--database-url")
            .arg(self.url())
            .args(args)
            .env_remove("STEPWISE_DIR")
            .env_remove("STEPWISE_DATABASE_URL")
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    }

    fn write(&self, name: &str, up: &str, down: &str) {
        fs::write(self.dir.join(name), format!("{up}{SEPARATOR}{down}")).unwrap();
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn migration_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".sql"))
        .collect();
    names.sort();
    names
}

#[test]
fn init_up_status_down() {
    let ws = Workspace::new();

    let init = ws.run(&["init"]);
    assert!(init.status.success(), "{init:?}");
    assert!(ws.dir.is_dir());
    assert!(ws.db.exists());

    ws.write(
        "20240101000000-init.sql",
        "CREATE TABLE t (id INTEGER);",
        "DROP TABLE t;",
    );
    ws.write(
        "20240102000000-addcol.sql",
        "ALTER TABLE t ADD COLUMN x INTEGER;",
        "ALTER TABLE t DROP COLUMN x;",
    );

    let up = ws.run(&["up"]);
    assert!(up.status.success(), "{up:?}");
    let out = stdout(&up);
    assert!(out.contains("20240101000000-init.sql"));
    assert!(out.contains("20240102000000-addcol.sql"));

    let again = ws.run(&["up"]);
    assert!(stdout(&again).contains("already up to date, with 2 migrations applied"));

    let status = ws.run(&["status", "--json"]);
    assert!(status.status.success(), "{status:?}");
    let json: serde_json::Value = serde_json::from_slice(&status.stdout).unwrap();
    assert_eq!(json["applied"].as_array().unwrap().len(), 2);
    assert_eq!(json["pending"].as_array().unwrap().len(), 0);

    let down = ws.run(&["down"]);
    assert!(stdout(&down).contains("undo: 20240102000000-addcol.sql"));

    let status = ws.run(&["status", "--json"]);
    let json: serde_json::Value = serde_json::from_slice(&status.stdout).unwrap();
    assert_eq!(json["applied"][0]["name"], "20240101000000-init.sql");
    assert_eq!(json["pending"][0], "20240102000000-addcol.sql");
}

#[test]
fn create_writes_template_that_cannot_run_unedited() {
    let ws = Workspace::new();
    assert!(!ws.run(&["create", "too", "early"]).status.success());

    assert!(ws.run(&["init"]).status.success());
    let create = ws.run(&["create", "add", "users!"]);
    assert!(create.status.success(), "{create:?}");

    let files = migration_files(&ws.dir);
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("-add-users.sql"), "{files:?}");

    let up = ws.run(&["up"]);
    assert_eq!(up.status.code(), Some(3));
}

#[test]
fn exit_codes_for_broken_definitions() {
    let ws = Workspace::new();
    assert!(ws.run(&["init"]).status.success());

    fs::write(
        ws.dir.join("20240101000000-twice.sql"),
        format!("SELECT 1;{SEPARATOR}SELECT 2;{SEPARATOR}SELECT 3;"),
    )
    .unwrap();
    assert_eq!(ws.run(&["up"]).status.code(), Some(2));

    fs::write(ws.dir.join("20240101000000-twice.sql"), "SELECT 1;").unwrap();
    let up = ws.run(&["up"]);
    assert_eq!(up.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&up.stderr).contains("UNDO (DOWN)"));
}

#[test]
fn missing_definition_is_a_divergence() {
    let ws = Workspace::new();
    assert!(ws.run(&["init"]).status.success());
    ws.write("20240101000000-a.sql", "CREATE TABLE a (id INTEGER);", "DROP TABLE a;");
    ws.write("20240103000000-c.sql", "CREATE TABLE c (id INTEGER);", "DROP TABLE c;");
    assert!(ws.run(&["up"]).status.success());

    // Renaming a past migration breaks the prefix
    fs::rename(
        ws.dir.join("20240103000000-c.sql"),
        ws.dir.join("20240102000000-b.sql"),
    )
    .unwrap();
    ws.write("20240104000000-c.sql", "CREATE TABLE c (id INTEGER);", "DROP TABLE c;");

    assert_eq!(ws.run(&["up"]).status.code(), Some(2));
    assert_eq!(ws.run(&["down"]).status.code(), Some(2));
}

#[test]
fn destroy_needs_confirmation_when_not_interactive() {
    let ws = Workspace::new();
    assert!(ws.run(&["init"]).status.success());
    ws.write("20240101000000-a.sql", "CREATE TABLE a (id INTEGER);", "DROP TABLE a;");
    ws.write("20240102000000-b.sql", "CREATE TABLE b (id INTEGER);", "DROP TABLE b;");
    assert!(ws.run(&["up"]).status.success());

    let refused = ws.run(&["destroy"]);
    assert_eq!(refused.status.code(), Some(1));

    let destroyed = ws.run(&["destroy", "--yes"]);
    assert!(destroyed.status.success(), "{destroyed:?}");
    let out = stdout(&destroyed);
    let b = out.find("undo: 20240102000000-b.sql").unwrap();
    let a = out.find("undo: 20240101000000-a.sql").unwrap();
    assert!(b < a);

    let down = ws.run(&["down"]);
    assert!(stdout(&down).contains("no further migrations"));
}

#[test]
fn failing_sql_is_printed() {
    let ws = Workspace::new();
    assert!(ws.run(&["init"]).status.success());
    ws.write("20240101000000-bad.sql", "INSERT INTO missing VALUES (1);", "SELECT 1;");

    let up = ws.run(&["up"]);
    assert_eq!(up.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&up.stderr);
    assert!(stderr.contains("20240101000000-bad.sql"), "{stderr}");
    assert!(stderr.contains("INSERT INTO missing VALUES (1);"), "{stderr}");
}
