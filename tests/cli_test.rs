use std::process::Command;

fn user_migration(dir: &std::path::Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_user-migration"));
    cmd.current_dir(dir)
        .env_remove("SOURCE_DATABASE_URL")
        .env_remove("DATABASE_URL")
        .env("RUST_LOG", "user_migration=info")
        .env("NO_COLOR", "1");
    cmd
}

fn printed(output: &std::process::Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[test]
fn fatal_errors_are_reported_once_and_exit_1() {
    let dir = tempfile::tempdir().unwrap();
    let output = user_migration(dir.path())
        .args(["migrate", "--emit-sql"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let printed = printed(&output);
    assert_eq!(printed.matches("no source: pass --artifact").count(), 1, "{printed}");
}

#[test]
fn missing_target_fails_before_reading_the_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let output = user_migration(dir.path())
        .args(["migrate", "--artifact", "absent.log"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let printed = printed(&output);
    assert_eq!(printed.matches("no target").count(), 1, "{printed}");
}
