// PicoBlink - Polling Firmware for PicoSoC
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_reference_clock_hz() -> u32 {
    100_000_000
}

/// Slowest clock that still yields a non-zero UART divisor at 115200 baud
/// (and so also a valid 1 kHz counter prescaler).
pub const MIN_REFERENCE_CLOCK_HZ: u32 = 115_200;

fn default_cycles_per_iteration() -> u32 {
    1_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PeripheralConfig {
    pub id: String,
    pub r#type: String, // "led", "counter", "uart"
    pub base_address: u64,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub config: HashMap<String, serde_yaml::Value>,
}

impl PeripheralConfig {
    fn new(id: &str, r#type: &str, base_address: u64) -> Self {
        Self {
            id: id.to_string(),
            r#type: r#type.to_string(),
            base_address,
            size: None,
            config: HashMap::new(),
        }
    }

    /// Integer option from the `config` map.
    pub fn config_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.config.get(key) {
            None => Ok(None),
            Some(v) => v.as_u64().map(Some).ok_or_else(|| {
                anyhow::anyhow!(
                    "Field '{}' in 'config' of peripheral '{}' must be an unsigned integer",
                    key,
                    self.id
                )
            }),
        }
    }
}

/// Register-level description of the SoC the firmware runs on.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SocDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    #[serde(default = "default_reference_clock_hz")]
    pub reference_clock_hz: u32,
    pub peripherals: Vec<PeripheralConfig>,
}

impl SocDescriptor {
    /// The stock PicoSoC register map.
    pub fn picosoc() -> Self {
        Self {
            schema_version: default_schema_version(),
            name: "picosoc".to_string(),
            reference_clock_hz: default_reference_clock_hz(),
            peripherals: vec![
                PeripheralConfig::new("leds", "led", 0x0300_0000),
                PeripheralConfig::new("counter", "counter", 0x0200_1000),
                PeripheralConfig::new("uart", "uart", 0x0200_0100),
            ],
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read SoC descriptor at {:?}", path))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let desc: Self =
            serde_yaml::from_str(yaml).context("Failed to parse SoC Descriptor YAML")?;
        desc.validate()?;
        Ok(desc)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }
        if self.reference_clock_hz < MIN_REFERENCE_CLOCK_HZ {
            anyhow::bail!(
                "'reference_clock_hz' {} is too low: the 1 kHz counter and 115200 baud UART need at least {} Hz",
                self.reference_clock_hz,
                MIN_REFERENCE_CLOCK_HZ
            );
        }
        let mut seen = std::collections::HashSet::new();
        for p in &self.peripherals {
            if !seen.insert(p.id.as_str()) {
                anyhow::bail!("Duplicate peripheral id '{}'", p.id);
            }
            if p.base_address % 4 != 0 {
                anyhow::bail!(
                    "Peripheral '{}' base address {:#x} is not word aligned",
                    p.id,
                    p.base_address
                );
            }
        }
        Ok(())
    }
}

/// Which of the two firmware behaviours to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// LED blink plus UART echo.
    #[default]
    Echo,
    /// LED blink after a 260-byte startup burst.
    Burst,
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "echo" | "a" => Ok(Self::Echo),
            "burst" | "b" | "startup-burst" => Ok(Self::Burst),
            _ => Err(format!(
                "unsupported variant '{}'; supported: echo, burst",
                value
            )),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Echo => f.write_str("echo"),
            Self::Burst => f.write_str("burst"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct TestInputs {
    /// SoC descriptor path, relative to the script. Built-in PicoSoC if absent.
    #[serde(default)]
    pub soc: Option<String>,
    #[serde(default)]
    pub variant: Variant,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestLimits {
    pub max_iterations: u64,
    #[serde(default)]
    pub max_cycles: Option<u64>,
    #[serde(default)]
    pub max_uart_bytes: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestTiming {
    /// Reference clock cycles that elapse per poll-loop iteration.
    #[serde(default = "default_cycles_per_iteration")]
    pub cycles_per_iteration: u32,
}

impl Default for TestTiming {
    fn default() -> Self {
        Self {
            cycles_per_iteration: default_cycles_per_iteration(),
        }
    }
}

/// Bytes pushed into the UART receiver once simulated time reaches `at_ms`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Stimulus {
    #[serde(default)]
    pub at_ms: u64,
    pub uart_rx: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Runner failed before simulation started (e.g. script parse/validation error).
    ConfigError,
    MaxIterations,
    MaxCycles,
    MaxUartBytes,
    MemoryViolation,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartContainsAssertion {
    pub uart_contains: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct UartEqualsAssertion {
    pub uart_equals: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct LedValueAssertion {
    pub led_value: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopReasonAssertion {
    pub expected_stop_reason: StopReason,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterValueDetails {
    pub address: u64,
    pub expected_value: u32,
    #[serde(default)]
    pub mask: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RegisterValueAssertion {
    pub register_value: RegisterValueDetails,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TestAssertion {
    UartContains(UartContainsAssertion),
    UartEquals(UartEqualsAssertion),
    LedValue(LedValueAssertion),
    ExpectedStopReason(StopReasonAssertion),
    RegisterValue(RegisterValueAssertion),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScript {
    pub schema_version: String,
    #[serde(default)]
    pub inputs: TestInputs,
    pub limits: TestLimits,
    #[serde(default)]
    pub timing: TestTiming,
    #[serde(default)]
    pub stimulus: Vec<Stimulus>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

impl TestScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read test script at {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let script: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Test Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.limits.max_iterations == 0 {
            anyhow::bail!("Limit 'max_iterations' must be greater than zero");
        }

        if self.timing.cycles_per_iteration == 0 {
            anyhow::bail!("Timing 'cycles_per_iteration' must be greater than zero");
        }

        if let Some(soc) = &self.inputs.soc {
            if soc.trim().is_empty() {
                anyhow::bail!("Input 'soc' path cannot be empty when given");
            }
        }

        Ok(())
    }
}

/// Parses a window size: plain byte count (`256`, `0x100`) or a human
/// readable size (`256 B`, `1 KiB`).
pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let trimmed = size_str.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16)
            .map_err(|e| anyhow::anyhow!("Invalid size '{}': {}", size_str, e));
    }
    if let Ok(bytes) = trimmed.parse::<u64>() {
        return Ok(bytes);
    }
    let s: Size = trimmed
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_script() {
        let yaml = r#"
schema_version: "1.0"
inputs:
  variant: echo
limits:
  max_iterations: 1000
  max_uart_bytes: 64
stimulus:
  - at_ms: 5
    uart_rx: "hi"
assertions:
  - uart_contains: "hi"
  - led_value: 3
  - expected_stop_reason: max_iterations
"#;
        let script = TestScript::from_yaml(yaml).unwrap();
        assert_eq!(script.inputs.variant, Variant::Echo);
        assert_eq!(script.limits.max_iterations, 1000);
        assert_eq!(script.timing.cycles_per_iteration, 1_000);
        assert_eq!(script.stimulus[0].uart_rx, "hi");
        assert_eq!(script.assertions.len(), 3);
        assert!(matches!(script.assertions[1], TestAssertion::LedValue(_)));
    }

    #[test]
    fn test_invalid_version() {
        let yaml = r#"
schema_version: "2.0"
limits:
  max_iterations: 100
"#;
        let err = TestScript::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("Unsupported schema_version"));
    }

    #[test]
    fn test_invalid_max_iterations() {
        let yaml = r#"
schema_version: "1.0"
limits:
  max_iterations: 0
"#;
        let err = TestScript::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn test_zero_cycles_per_iteration() {
        let yaml = r#"
schema_version: "1.0"
limits:
  max_iterations: 10
timing:
  cycles_per_iteration: 0
"#;
        let err = TestScript::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("cycles_per_iteration"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
schema_version: "1.0"
limits:
  max_iterations: 10
  max_steps: 10
"#;
        assert!(TestScript::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_variant_from_str() {
        assert_eq!("Echo".parse::<Variant>(), Ok(Variant::Echo));
        assert_eq!(" burst ".parse::<Variant>(), Ok(Variant::Burst));
        assert!("blink".parse::<Variant>().is_err());
        assert_eq!(Variant::Burst.to_string(), "burst");
    }

    #[test]
    fn test_picosoc_descriptor_is_valid() {
        let soc = SocDescriptor::picosoc();
        soc.validate().unwrap();
        assert_eq!(soc.reference_clock_hz, 100_000_000);
        let uart = soc.peripherals.iter().find(|p| p.r#type == "uart").unwrap();
        assert_eq!(uart.base_address, 0x0200_0100);
    }

    #[test]
    fn test_duplicate_peripheral_id() {
        let yaml = r#"
name: "dup"
peripherals:
  - id: "uart"
    type: "uart"
    base_address: 0x02000100
  - id: "uart"
    type: "uart"
    base_address: 0x02000200
"#;
        let err = SocDescriptor::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_config_u64() {
        let yaml = r#"
name: "soc"
peripherals:
  - id: "uart"
    type: "uart"
    base_address: 0x02000100
    config:
      rx_fifo_depth: 32
      label: "console"
"#;
        let soc = SocDescriptor::from_yaml(yaml).unwrap();
        let uart = &soc.peripherals[0];
        assert_eq!(uart.config_u64("rx_fifo_depth").unwrap(), Some(32));
        assert_eq!(uart.config_u64("missing").unwrap(), None);
        assert!(uart.config_u64("label").is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("256").unwrap(), 256);
        assert_eq!(parse_size("0x100").unwrap(), 256);
        assert_eq!(parse_size("256 B").unwrap(), 256);
        assert!(parse_size("lots").is_err());
        assert!(parse_size("0xZZ").is_err());
    }
}
