use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
        }
    }

    /// Write `config.toml` where the binary looks for it by default
    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("swg-analytics");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str], stdin: Option<&str>) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("swg-analytics-relay"));

    let mut child = Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("failed to execute swg-analytics-relay: {e}"));

    {
        let mut child_stdin = child.stdin.take().expect("stdin piped");
        if let Some(input) = stdin {
            child_stdin
                .write_all(input.as_bytes())
                .expect("failed to write stdin");
        }
    }

    child
        .wait_with_output()
        .expect("failed to wait for swg-analytics-relay")
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "swg-analytics-relay {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn status_shows_defaults_without_config() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["status"], None);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("SwG Analytics Relay Configuration"));
    assert!(stdout.contains("Publication ID:  <not set>"));
    assert!(stdout.contains("Publisher events: false"));
    assert!(stdout.contains("Log File:"));
    assert!(stdout.contains("xdg-state"));
}

#[test]
fn status_reads_config_file() {
    let env = CliTestEnv::new();
    env.write_config(
        r#"
[runtime]
publication_id = "scenic"
experiments = "E1,E2"
"#,
    );

    let output = run_bin(&env, &["status"], None);
    assert_success(&["status"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Publication ID:  scenic"));
    assert!(stdout.contains("Experiments:     E1,E2"));
}

#[test]
fn txid_prints_uuid_shaped_id() {
    let env = CliTestEnv::new();

    let output = run_bin(&env, &["txid"], None);
    assert_success(&["txid"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let id = stdout.trim();
    let groups: Vec<usize> = id.split('-').map(str::len).collect();
    assert_eq!(groups, vec![8, 4, 4, 4, 12], "unexpected id: {id}");
}

#[test]
fn relay_reports_admission_and_failures() {
    let env = CliTestEnv::new();
    // Nothing listens on the discard port, so setup fails fast
    env.write_config(
        r#"
[runtime]
publication_id = "pub1"
frontend_url = "http://127.0.0.1:9"

[channel]
timeout_secs = 2
max_retries = 0
ready_attempts = 1
retry_base_ms = 1
"#,
    );

    let input = concat!(
        r#"{"eventType": 1, "eventOriginator": 1}"#,
        "\n",
        r#"{"eventType": 1, "eventOriginator": 5}"#,
        "\n",
        r#"{"eventType": 4000, "eventOriginator": 1}"#,
        "\n",
        "not json\n",
    );

    let output = run_bin(&env, &["relay"], Some(input));
    assert_success(&["relay"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Admitted:  1"), "stdout:\n{stdout}");
    assert!(stdout.contains("Dropped:   2"), "stdout:\n{stdout}");
    assert!(stdout.contains("Sent:      0"), "stdout:\n{stdout}");
    assert!(stdout.contains("Failed:    1"), "stdout:\n{stdout}");
    assert!(stdout.contains("Malformed: 1"), "stdout:\n{stdout}");
}
