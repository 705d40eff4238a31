//! SETTINGS parameters and per-endpoint settings tables
//!
//! This module implements the SETTINGS parameters of RFC 7540 Section 6.5
//! and the settings table a connection keeps for each endpoint.

use super::error::{Error, Result};
use super::{DEFAULT_HEADER_TABLE_SIZE, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE};
use std::collections::BTreeMap;
use std::fmt;

/// Largest legal SETTINGS_MAX_FRAME_SIZE (2^24 - 1)
pub const MAX_ALLOWED_FRAME_SIZE: u32 = 0x00FF_FFFF;

/// Largest legal SETTINGS_INITIAL_WINDOW_SIZE (2^31 - 1)
pub const MAX_WINDOW_SIZE: u32 = 0x7FFF_FFFF;

/// SETTINGS identifiers understood by this endpoint
///
/// RFC 7540 Section 6.5.2 plus the two later registrations from
/// RFC 8441 and RFC 9218.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum SettingsParameter {
    /// HPACK dynamic table size of the sender's decoder (0x1)
    HeaderTableSize = 0x1,
    /// Whether server push may be used, 0 or 1 (0x2)
    EnablePush = 0x2,
    /// Streams the sender lets its peer open at once; absent means unlimited (0x3)
    MaxConcurrentStreams = 0x3,
    /// Initial stream-level flow-control window (0x4)
    InitialWindowSize = 0x4,
    /// Largest frame payload the sender accepts (0x5)
    MaxFrameSize = 0x5,
    /// Advisory limit on decoded header list size; absent means unlimited (0x6)
    MaxHeaderListSize = 0x6,
    /// Extended CONNECT support, RFC 8441 (0x8)
    EnableConnectProtocol = 0x8,
    /// Opt out of RFC 7540 stream priorities, RFC 9218 (0x9)
    NoRfc7540Priorities = 0x9,
}

impl SettingsParameter {
    /// Wire identifier
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Map a wire identifier, `None` for identifiers we do not know
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1 => Some(SettingsParameter::HeaderTableSize),
            0x2 => Some(SettingsParameter::EnablePush),
            0x3 => Some(SettingsParameter::MaxConcurrentStreams),
            0x4 => Some(SettingsParameter::InitialWindowSize),
            0x5 => Some(SettingsParameter::MaxFrameSize),
            0x6 => Some(SettingsParameter::MaxHeaderListSize),
            0x8 => Some(SettingsParameter::EnableConnectProtocol),
            0x9 => Some(SettingsParameter::NoRfc7540Priorities),
            _ => None,
        }
    }

    /// Registered name without the `SETTINGS_` prefix
    pub fn name(&self) -> &'static str {
        match self {
            SettingsParameter::HeaderTableSize => "HEADER_TABLE_SIZE",
            SettingsParameter::EnablePush => "ENABLE_PUSH",
            SettingsParameter::MaxConcurrentStreams => "MAX_CONCURRENT_STREAMS",
            SettingsParameter::InitialWindowSize => "INITIAL_WINDOW_SIZE",
            SettingsParameter::MaxFrameSize => "MAX_FRAME_SIZE",
            SettingsParameter::MaxHeaderListSize => "MAX_HEADER_LIST_SIZE",
            SettingsParameter::EnableConnectProtocol => "ENABLE_CONNECT_PROTOCOL",
            SettingsParameter::NoRfc7540Priorities => "NO_RFC7540_PRIORITIES",
        }
    }
}

impl fmt::Display for SettingsParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SETTINGS_{}", self.name())
    }
}

/// One identifier/value pair carried by a SETTINGS frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    /// Identifier
    pub parameter: SettingsParameter,
    /// Value
    pub value: u32,
}

impl Setting {
    /// Create a new setting
    pub fn new(parameter: SettingsParameter, value: u32) -> Self {
        Setting { parameter, value }
    }

    /// Check the value against the ranges of RFC 7540 Section 6.5.2
    pub fn validate(&self) -> Result<()> {
        match self.parameter {
            SettingsParameter::EnablePush
            | SettingsParameter::EnableConnectProtocol
            | SettingsParameter::NoRfc7540Priorities
                if self.value > 1 =>
            {
                Err(Error::Protocol(format!(
                    "{} must be 0 or 1, got {}",
                    self.parameter, self.value
                )))
            }
            SettingsParameter::InitialWindowSize if self.value > MAX_WINDOW_SIZE => {
                Err(Error::FlowControl(format!(
                    "INITIAL_WINDOW_SIZE {} above 2^31-1",
                    self.value
                )))
            }
            SettingsParameter::MaxFrameSize
                if !(DEFAULT_MAX_FRAME_SIZE..=MAX_ALLOWED_FRAME_SIZE).contains(&self.value) =>
            {
                Err(Error::Protocol(format!(
                    "MAX_FRAME_SIZE {} not in 2^14..=2^24-1",
                    self.value
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Settings table of one endpoint
///
/// Maps each identifier to its current value. Identifiers that were never
/// set fall back to the RFC 7540 defaults through the typed getters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<SettingsParameter, u32>,
}

impl Settings {
    /// Create an empty table
    pub fn new() -> Self {
        Settings {
            values: BTreeMap::new(),
        }
    }

    /// Raw value of a parameter, if it has been set
    pub fn get(&self, parameter: SettingsParameter) -> Option<u32> {
        self.values.get(&parameter).copied()
    }

    /// Set a single parameter
    pub fn set(&mut self, parameter: SettingsParameter, value: u32) {
        self.values.insert(parameter, value);
    }

    /// Apply parameters in order; a later duplicate overwrites an earlier one
    pub fn apply(&mut self, params: &[Setting]) {
        for setting in params {
            self.values.insert(setting.parameter, setting.value);
        }
    }

    /// Number of parameters set
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no parameter is set
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parameters as a list, ordered by identifier
    pub fn to_params(&self) -> Vec<Setting> {
        self.values
            .iter()
            .map(|(parameter, value)| Setting::new(*parameter, *value))
            .collect()
    }

    /// HPACK table size, 4096 unless set
    pub fn header_table_size(&self) -> u32 {
        self.get(SettingsParameter::HeaderTableSize)
            .unwrap_or(DEFAULT_HEADER_TABLE_SIZE)
    }

    /// Server push allowed, true unless set to 0
    pub fn enable_push(&self) -> bool {
        self.get(SettingsParameter::EnablePush).map_or(true, |v| v != 0)
    }

    /// Stream limit, `None` when unlimited
    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.get(SettingsParameter::MaxConcurrentStreams)
    }

    /// Initial stream window, 65535 unless set
    pub fn initial_window_size(&self) -> u32 {
        self.get(SettingsParameter::InitialWindowSize)
            .unwrap_or(DEFAULT_INITIAL_WINDOW_SIZE)
    }

    /// Largest frame payload, 16384 unless set
    pub fn max_frame_size(&self) -> u32 {
        self.get(SettingsParameter::MaxFrameSize)
            .unwrap_or(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Header list limit, `None` when unlimited
    pub fn max_header_list_size(&self) -> Option<u32> {
        self.get(SettingsParameter::MaxHeaderListSize)
    }

    /// Validate every value in the table
    pub fn validate(&self) -> Result<()> {
        self.to_params().iter().try_for_each(Setting::validate)
    }
}

/// Builder for the settings an endpoint advertises
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    /// Start from an empty table
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings::new(),
        }
    }

    /// Set header table size
    pub fn header_table_size(mut self, size: u32) -> Self {
        self.settings.set(SettingsParameter::HeaderTableSize, size);
        self
    }

    /// Set enable push
    pub fn enable_push(mut self, enable: bool) -> Self {
        self.settings.set(SettingsParameter::EnablePush, enable as u32);
        self
    }

    /// Set max concurrent streams
    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.settings.set(SettingsParameter::MaxConcurrentStreams, max);
        self
    }

    /// Set initial window size
    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.settings.set(SettingsParameter::InitialWindowSize, size);
        self
    }

    /// Set max frame size
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.settings.set(SettingsParameter::MaxFrameSize, size);
        self
    }

    /// Set max header list size
    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.settings.set(SettingsParameter::MaxHeaderListSize, size);
        self
    }

    /// Build the settings
    pub fn build(self) -> Result<Settings> {
        self.settings
            .validate()
            .map_err(|e| Error::InvalidSettings(e.to_string()))?;
        Ok(self.settings)
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
