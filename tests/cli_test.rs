use std::process::{Command, Output};

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_traffic_control"))
        .args(args)
        .env("RUST_LOG", "warn,traffic_control=info")
        .output()
        .expect("Failed to execute simulation")
}

/// Test that the headless runner completes and reports its summary
#[test]
fn test_headless_simulation_runs() {
    let output = run_cli(&["--ticks", "200", "--seed", "7"]);

    assert!(
        output.status.success(),
        "Simulation failed to run. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("SIMULATION COMPLETE"),
        "Simulation did not complete properly. stderr: {}",
        stderr
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("=== Final State ==="));
    assert!(stdout.contains("Vehicles:"));
}

/// Test the scenario flags together
#[test]
fn test_scenario_flags() {
    let output = run_cli(&[
        "--ticks",
        "300",
        "--seed",
        "3",
        "--cols",
        "3",
        "--rows",
        "3",
        "--weather",
        "snow",
        "--optimize-every",
        "10",
        "--emergency-at",
        "5",
        "--emergency-secs",
        "100",
        "--override",
        "0:EW_GREEN",
    ]);

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Weather: SNOW"));
    assert!(stdout.contains("Emergency: ACTIVE"));
    assert!(stdout.contains("I0 MANUAL: EW_GREEN"));
    // manual and preempted intersections on the map
    assert!(stdout.contains("[E]"));
    assert!(stdout.contains("!E!"));
}

/// Test that invalid input is rejected with an error exit
#[test]
fn test_invalid_arguments_fail() {
    for args in [
        vec!["--ticks", "10", "--speed=-1"],
        vec!["--ticks", "10", "--override", "99:NS_GREEN"],
        vec!["--ticks", "10", "--override", "0:PURPLE"],
        vec!["--ticks", "10", "--cols", "0"],
    ] {
        let output = run_cli(&args);
        assert!(!output.status.success(), "{:?} should have failed", args);
    }
}
