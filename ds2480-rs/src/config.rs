//! Configuration model: legal value tables, validation and the chip-level
//! encoding of every electrical and timing parameter.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::Ds2480;
use crate::adapter::{CMD_CONFIG, ChipMode};
use crate::transport::Transport;

/// Sentinel for settings the chip can hold indefinitely.
pub const DURATION_FOREVER: u32 = u32::MAX;

/// Bus timing generation, encoded into bits 3-2 of every command-mode opcode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Speed {
    /// Standard 1-Wire timing; every device supports it.
    #[default]
    Standard,
    /// Relaxed timing for long or heavily loaded lines.
    Flexible,
    /// Overdrive timing for devices that support the higher data rate.
    Overdrive,
}

impl Speed {
    pub(crate) const fn code(self) -> u8 {
        match self {
            Speed::Standard => 0,
            Speed::Flexible => 1,
            Speed::Overdrive => 2,
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Speed::Standard => "standard",
            Speed::Flexible => "flexible",
            Speed::Overdrive => "overdrive",
        })
    }
}

impl FromStr for Speed {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Speed::Standard),
            "flexible" => Ok(Speed::Flexible),
            "overdrive" => Ok(Speed::Overdrive),
            other => Err(ConfigError {
                field: "speed",
                value: other.to_string(),
                allowed: "standard, flexible, overdrive".to_string(),
            }),
        }
    }
}

/// Configuration sub-parameter ids, carried in bits 6-4 of a configuration
/// byte. Id 0 is the read-back request and has no stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Parameter {
    PulldownSlewRate = 1,
    ProgrammingPulse = 2,
    StrongPullupDuration = 3,
    WriteOneLowTime = 4,
    WriteZeroRecovery = 5,
    LoadCurrent = 6,
    Baud = 7,
}

// Value-to-code tables from the DS2480B datasheet (page 13). A zero keeps
// the chip's default code for the parameter.

/// Pull-down slew rate control, mV/µs.
const SLEW_RATE: &[(u32, u8)] = &[
    (0, 0),
    (15000, 0),
    (2200, 1),
    (1650, 2),
    (1370, 3),
    (1100, 4),
    (830, 5),
    (700, 6),
    (550, 7),
];

/// Programming pulse duration, µs.
const PROGRAMMING_PULSE: &[(u32, u8)] = &[
    (0, 4),
    (32, 0),
    (64, 1),
    (128, 2),
    (256, 3),
    (512, 4),
    (1024, 5),
    (2048, 6),
    (DURATION_FOREVER, 7),
];

/// Strong pull-up duration, µs.
const STRONG_PULLUP_DURATION: &[(u32, u8)] = &[
    (0, 4),
    (16_400, 0),
    (65_500, 1),
    (131_000, 2),
    (262_000, 3),
    (524_000, 4),
    (1_048_000, 5),
    (DURATION_FOREVER, 7),
];

/// Write-1 low time, µs.
const WRITE_ONE_LOW: &[(u32, u8)] = &[
    (0, 0),
    (8, 0),
    (9, 1),
    (10, 2),
    (11, 3),
    (12, 4),
    (13, 5),
    (14, 6),
    (15, 7),
];

/// Write-0 recovery time / data sample offset, µs.
const WRITE_ZERO_RECOVERY: &[(u32, u8)] = &[
    (0, 0),
    (3, 0),
    (4, 1),
    (5, 2),
    (6, 3),
    (7, 4),
    (8, 5),
    (9, 6),
    (10, 7),
];

/// Bus load current sensing, µA.
const LOAD_CURRENT: &[(u32, u8)] = &[
    (0, 0),
    (1800, 0),
    (2100, 1),
    (2400, 2),
    (2700, 3),
    (3000, 4),
    (3300, 5),
    (3600, 6),
    (3900, 7),
];

/// Bus baud rate, bit/s.
const BAUD: &[(u32, u8)] = &[(0, 0), (9600, 0), (19200, 1), (57600, 2), (115_200, 3)];

/// A configuration value outside the chip's discrete legal set.
///
/// Fatal to building the adapter; nothing is retried. The message names the
/// offending field, the rejected value and the complete legal set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {value} is not a supported setting (supported: {allowed})")]
pub struct ConfigError {
    field: &'static str,
    value: String,
    allowed: String,
}

impl ConfigError {
    /// The configuration field that failed validation.
    pub fn field(&self) -> &str {
        self.field
    }
}

fn show(value: u32) -> String {
    if value == DURATION_FOREVER {
        "forever".to_string()
    } else {
        value.to_string()
    }
}

fn lookup(field: &'static str, table: &[(u32, u8)], value: u32) -> Result<u8, ConfigError> {
    table
        .iter()
        .find(|(v, _)| *v == value)
        .map(|(_, code)| *code)
        .ok_or_else(|| ConfigError {
            field,
            value: show(value),
            allowed: table
                .iter()
                .map(|(v, _)| show(*v))
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// The validated, chip-encoded session configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EncodedConfig {
    /// 3-bit value code per parameter id; slot 0 (read-back) stays empty.
    codes: [u8; 8],
    speed: u8,
    spu: u8,
}

impl EncodedConfig {
    pub(crate) fn code(&self, parameter: Parameter) -> u8 {
        self.codes[parameter as usize]
    }

    /// Configuration byte that writes `parameter`'s stored value.
    pub(crate) fn config_write(&self, parameter: Parameter) -> u8 {
        CMD_CONFIG | (parameter as u8) << 4 | self.code(parameter) << 1
    }

    /// Configuration byte that asks the chip to read `parameter` back.
    pub(crate) fn config_read(parameter: Parameter) -> u8 {
        CMD_CONFIG | (parameter as u8) << 1
    }

    /// The speed code shifted into opcode position (bits 3-2).
    pub(crate) fn speed_bits(&self) -> u8 {
        self.speed << 2
    }

    /// The strong pull-up flag shifted into probe position (bit 1).
    pub(crate) fn spu_bit(&self) -> u8 {
        self.spu << 1
    }
}

/// Builder for a [`Ds2480`] adapter.
///
/// Parameters are plain engineering units: mV/µs for the slew rate, µs for
/// the pulse and slot timings, µA for the load current, bit/s for the baud
/// rate. Zero keeps the chip default; [`DURATION_FOREVER`] selects an
/// unbounded pulse where the chip supports one. The chip only accepts
/// discrete values for each parameter, so [`build`](Ds2480Builder::build)
/// validates everything up front and rejects the first value outside its
/// table.
#[derive(Debug, Clone, Default)]
pub struct Ds2480Builder {
    speed: Speed,
    slew_rate: u32,
    programming_pulse: u32,
    strong_pullup_duration: u32,
    write_one_low: u32,
    write_zero_recovery: u32,
    load_current: u32,
    baud: u32,
    strong_pullup: bool,
}

impl Ds2480Builder {
    /// Set the bus timing generation.
    pub fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    /// Set the pull-down slew rate in mV/µs.
    pub fn with_slew_rate(mut self, mv_per_us: u32) -> Self {
        self.slew_rate = mv_per_us;
        self
    }

    /// Set the programming pulse duration in µs.
    pub fn with_programming_pulse(mut self, us: u32) -> Self {
        self.programming_pulse = us;
        self
    }

    /// Set the strong pull-up duration in µs.
    pub fn with_strong_pullup_duration(mut self, us: u32) -> Self {
        self.strong_pullup_duration = us;
        self
    }

    /// Set the write-1 low time in µs.
    pub fn with_write_one_low(mut self, us: u32) -> Self {
        self.write_one_low = us;
        self
    }

    /// Set the write-0 recovery time in µs.
    pub fn with_write_zero_recovery(mut self, us: u32) -> Self {
        self.write_zero_recovery = us;
        self
    }

    /// Set the bus load current in µA.
    pub fn with_load_current(mut self, ua: u32) -> Self {
        self.load_current = ua;
        self
    }

    /// Set the desired bus baud rate in bit/s.
    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Arm the strong pull-up after bit transmissions.
    pub fn with_strong_pullup(mut self, enable: bool) -> Self {
        self.strong_pullup = enable;
        self
    }

    /// Validate the configuration and attach it to `transport`.
    ///
    /// # Errors
    /// [`ConfigError`] for the first parameter whose value is not in the
    /// chip's legal set, checked in datasheet order: slew rate, programming
    /// pulse, strong pull-up duration, write-1 low, write-0 recovery, load
    /// current, baud rate.
    pub fn build<T: Transport>(self, transport: T) -> Result<Ds2480<T>, ConfigError> {
        let mut codes = [0u8; 8];
        codes[Parameter::PulldownSlewRate as usize] =
            lookup("slew_rate", SLEW_RATE, self.slew_rate)?;
        codes[Parameter::ProgrammingPulse as usize] =
            lookup("programming_pulse", PROGRAMMING_PULSE, self.programming_pulse)?;
        codes[Parameter::StrongPullupDuration as usize] = lookup(
            "strong_pullup_duration",
            STRONG_PULLUP_DURATION,
            self.strong_pullup_duration,
        )?;
        codes[Parameter::WriteOneLowTime as usize] =
            lookup("write_one_low", WRITE_ONE_LOW, self.write_one_low)?;
        codes[Parameter::WriteZeroRecovery as usize] = lookup(
            "write_zero_recovery",
            WRITE_ZERO_RECOVERY,
            self.write_zero_recovery,
        )?;
        codes[Parameter::LoadCurrent as usize] =
            lookup("load_current", LOAD_CURRENT, self.load_current)?;
        codes[Parameter::Baud as usize] = lookup("baud", BAUD, self.baud)?;

        Ok(Ds2480 {
            transport,
            config: EncodedConfig {
                codes,
                speed: self.speed.code(),
                spu: self.strong_pullup as u8,
            },
            chip_mode: ChipMode::Command,
            chip_speed: Speed::Standard.code(),
            chip_baud: 0,
        })
    }
}
