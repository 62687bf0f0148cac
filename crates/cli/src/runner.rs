// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::{
    build_bus, load_soc, write_snapshot, TestArgs, EXIT_ASSERT_FAIL, EXIT_CONFIG_ERROR, EXIT_PASS,
    EXIT_RUNTIME_ERROR,
};
use picoblink_config::{StopReason, Stimulus, TestAssertion, TestLimits, TestScript, Variant};
use picoblink_core::machine::{poll_config_for, Machine};
use picoblink_core::SimulationError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Serialize)]
struct TestResult {
    result_schema_version: String,
    status: String,
    iterations: u64,
    cycles: u64,
    elapsed_ms: u64,
    stop_reason: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    limits: Option<TestLimits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    led_value: u32,
    led_changes: u64,
    uart_bytes: u64,
    assertions: Vec<AssertionResult>,
    config: TestConfig,
}

#[derive(Debug, Serialize, Clone)]
struct AssertionResult {
    assertion: TestAssertion,
    passed: bool,
}

#[derive(Debug, Serialize)]
struct TestConfig {
    script: PathBuf,
    soc: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variant: Option<Variant>,
}

/// SoC path for a script run: the command line wins, then the script's
/// `inputs.soc` resolved against the script's directory.
fn resolve_soc_path(
    cli_soc: Option<&Path>,
    script_path: &Path,
    script: &TestScript,
) -> Option<PathBuf> {
    if let Some(path) = cli_soc {
        return Some(path.to_path_buf());
    }
    script.inputs.soc.as_ref().map(|soc| {
        script_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(soc)
    })
}

pub(crate) fn run_test(args: TestArgs, cli_soc: Option<&Path>, trace: bool) -> ExitCode {
    info!("Running test script: {:?}", args.script);

    let script = match TestScript::from_file(&args.script) {
        Ok(script) => script,
        Err(e) => return config_error(&args, None, None, format!("{:#}", e)),
    };

    let soc_path = resolve_soc_path(cli_soc, &args.script, &script);
    let loaded = load_soc(soc_path.as_deref()).and_then(|soc| {
        let bus = build_bus(&soc, trace)?;
        Ok((soc, bus))
    });
    let (soc, bus) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            return config_error(
                &args,
                soc_path,
                Some(script.limits.clone()),
                format!("{:#}", e),
            )
        }
    };

    let mut limits = script.limits.clone();
    if let Some(max_iterations) = args.max_iterations {
        limits.max_iterations = max_iterations;
    }

    let uart_tx = Arc::new(Mutex::new(Vec::new()));
    let mut machine = Machine::new(
        bus,
        poll_config_for(script.inputs.variant, soc.reference_clock_hz),
        script.timing.cycles_per_iteration,
    );
    machine
        .bus
        .attach_uart_tx_sink(uart_tx.clone(), !args.no_uart_stdout);

    let mut stimulus = script.stimulus.clone();
    stimulus.sort_by_key(|s| s.at_ms);

    let outcome = execute_test_loop(&mut machine, &limits, &stimulus, &uart_tx);

    let uart_bytes = uart_tx.lock().map(|g| g.clone()).unwrap_or_default();
    let uart_text = String::from_utf8_lossy(&uart_bytes).to_string();

    let mut assertion_results = Vec::new();
    let mut all_passed = true;
    let mut expected_stop_reason_matched = false;

    for assertion in &script.assertions {
        let passed = evaluate(assertion, &machine, &uart_text, outcome.stop_reason);

        if matches!(assertion, TestAssertion::ExpectedStopReason(_)) && passed {
            expected_stop_reason_matched = true;
        }

        if !passed {
            all_passed = false;
            error!(
                "Assertion failed: {:?} (captured len={}, led={})",
                assertion,
                uart_text.len(),
                machine.led_value()
            );
        }

        assertion_results.push(AssertionResult {
            assertion: assertion.clone(),
            passed,
        });
    }

    let stop_requires_assertion = matches!(outcome.stop_reason, StopReason::MaxUartBytes);

    let status = if !all_passed || (stop_requires_assertion && !expected_stop_reason_matched) {
        "fail"
    } else if outcome.error.is_some() && !expected_stop_reason_matched {
        "error"
    } else {
        "pass"
    };

    info!(
        "Test {} after {} iterations: stop reason {:?}",
        status,
        machine.iterations(),
        outcome.stop_reason
    );

    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        iterations: machine.iterations(),
        cycles: machine.total_cycles(),
        elapsed_ms: machine.elapsed_ms(),
        stop_reason: outcome.stop_reason,
        limits: Some(limits),
        message: outcome.error.map(|e| e.to_string()),
        led_value: machine.led_value(),
        led_changes: machine.led_changes(),
        uart_bytes: uart_bytes.len() as u64,
        assertions: assertion_results,
        config: TestConfig {
            script: args.script.clone(),
            soc: soc_path,
            variant: Some(script.inputs.variant),
        },
    };
    write_outputs(&args, &result, &uart_bytes, Some(&machine));

    match status {
        "pass" => ExitCode::from(EXIT_PASS),
        "fail" => ExitCode::from(EXIT_ASSERT_FAIL),
        _ => ExitCode::from(EXIT_RUNTIME_ERROR),
    }
}

struct LoopOutcome {
    stop_reason: StopReason,
    error: Option<SimulationError>,
}

fn execute_test_loop(
    machine: &mut Machine,
    limits: &TestLimits,
    stimulus: &[Stimulus],
    uart_tx: &Arc<Mutex<Vec<u8>>>,
) -> LoopOutcome {
    let mut pending = stimulus.iter().peekable();

    for iteration in 0..limits.max_iterations {
        // Stimulus is delivered between iterations, so `at_ms: 0` lands before boot.
        while let Some(s) = pending.next_if(|s| s.at_ms <= machine.elapsed_ms()) {
            info!(
                "Injecting {} UART RX bytes at {} ms",
                s.uart_rx.len(),
                machine.elapsed_ms()
            );
            machine.push_uart_rx(s.uart_rx.as_bytes());
        }

        if let Some(limit) = limits.max_cycles {
            if machine.total_cycles() >= limit {
                return LoopOutcome {
                    stop_reason: StopReason::MaxCycles,
                    error: None,
                };
            }
        }

        if let Some(limit) = limits.max_uart_bytes {
            let current_len = uart_tx.lock().map(|g| g.len() as u64).unwrap_or(0);
            if current_len >= limit {
                return LoopOutcome {
                    stop_reason: StopReason::MaxUartBytes,
                    error: None,
                };
            }
        }

        if let Err(e) = machine.step() {
            error!("Simulation error at iteration {}: {}", iteration, e);
            return LoopOutcome {
                stop_reason: StopReason::MemoryViolation,
                error: Some(e),
            };
        }
    }

    LoopOutcome {
        stop_reason: StopReason::MaxIterations,
        error: None,
    }
}

fn evaluate(
    assertion: &TestAssertion,
    machine: &Machine,
    uart_text: &str,
    stop_reason: StopReason,
) -> bool {
    match assertion {
        TestAssertion::UartContains(a) => uart_text.contains(&a.uart_contains),
        TestAssertion::UartEquals(a) => uart_text == a.uart_equals,
        TestAssertion::LedValue(a) => machine.led_value() == a.led_value,
        TestAssertion::ExpectedStopReason(a) => a.expected_stop_reason == stop_reason,
        TestAssertion::RegisterValue(a) => {
            let details = &a.register_value;
            let mask = details.mask.unwrap_or(u32::MAX);
            match machine.bus.peek_u32(details.address) {
                Ok(value) => value & mask == details.expected_value & mask,
                Err(e) => {
                    error!("Register assertion could not read {:#x}: {}", details.address, e);
                    false
                }
            }
        }
    }
}

fn config_error(
    args: &TestArgs,
    soc: Option<PathBuf>,
    limits: Option<TestLimits>,
    message: String,
) -> ExitCode {
    error!("{}", message);
    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        iterations: 0,
        cycles: 0,
        elapsed_ms: 0,
        stop_reason: StopReason::ConfigError,
        limits,
        message: Some(message),
        led_value: 0,
        led_changes: 0,
        uart_bytes: 0,
        assertions: Vec::new(),
        config: TestConfig {
            script: args.script.clone(),
            soc,
            variant: None,
        },
    };
    write_outputs(args, &result, &[], None);
    ExitCode::from(EXIT_CONFIG_ERROR)
}

fn write_outputs(
    args: &TestArgs,
    result: &TestResult,
    uart_bytes: &[u8],
    machine: Option<&Machine>,
) {
    let Some(output_dir) = &args.output_dir else {
        return;
    };
    if let Err(e) = std::fs::create_dir_all(output_dir) {
        error!("Failed to create output directory {:?}: {}", output_dir, e);
        return;
    }

    let result_path = output_dir.join("result.json");
    match std::fs::File::create(&result_path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, result) {
                error!("Failed to write result.json: {}", e);
            }
        }
        Err(e) => error!("Failed to create result.json: {}", e),
    }

    let uart_path = output_dir.join("uart.log");
    if let Err(e) = std::fs::write(&uart_path, uart_bytes) {
        error!("Failed to write uart.log: {}", e);
    }

    if let Some(machine) = machine {
        write_snapshot(&output_dir.join("snapshot.json"), machine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_soc_path_prefers_cli() {
        let script = TestScript::from_yaml(
            r#"
schema_version: "1.0"
inputs:
  soc: "soc.yaml"
limits:
  max_iterations: 1
"#,
        )
        .unwrap();

        let from_script = resolve_soc_path(None, Path::new("dir/script.yaml"), &script);
        assert_eq!(from_script, Some(PathBuf::from("dir/soc.yaml")));

        let from_cli = resolve_soc_path(
            Some(Path::new("other.yaml")),
            Path::new("dir/script.yaml"),
            &script,
        );
        assert_eq!(from_cli, Some(PathBuf::from("other.yaml")));
    }

    #[test]
    fn test_loop_delivers_stimulus_and_stops_on_limit() {
        let mut machine = Machine::new(
            picoblink_core::bus::SystemBus::new(),
            poll_config_for(Variant::Echo, 100_000_000),
            1_000,
        );
        let sink = Arc::new(Mutex::new(Vec::new()));
        machine.bus.attach_uart_tx_sink(sink.clone(), false);

        let limits = TestLimits {
            max_iterations: 1_000,
            max_cycles: None,
            max_uart_bytes: Some(2),
        };
        let stimulus = vec![Stimulus {
            at_ms: 1,
            uart_rx: "hey".to_string(),
        }];

        let outcome = execute_test_loop(&mut machine, &limits, &stimulus, &sink);
        assert_eq!(outcome.stop_reason, StopReason::MaxUartBytes);
        assert_eq!(sink.lock().unwrap().as_slice(), b"he");
    }

    #[test]
    fn test_register_assertion_applies_mask() {
        let mut machine = Machine::new(
            picoblink_core::bus::SystemBus::new(),
            poll_config_for(Variant::Echo, 100_000_000),
            1_000,
        );
        machine.boot().unwrap();

        let assertion: TestAssertion = serde_json::from_str(
            r#"{"register_value": {"address": 33554692, "expected_value": 100, "mask": 255}}"#,
        )
        .unwrap();
        // 868 & 0xFF == 0x64
        assert!(evaluate(&assertion, &machine, "", StopReason::MaxIterations));
    }
}
