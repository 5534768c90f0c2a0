//! Hierarchical representation of points in time.
//!
//! Time is divided into six nested levels: year, month, five-day period
//! (always six per month, the last one absorbing the month's tail), day,
//! six-hour period, and hour. `16 Feb 2017 17:00 UTC` becomes
//! `2017/2/4/16/3/17`. Expressing timestamps this way lets a key for a
//! prefix (say, a whole month) decrypt every message sent within it.

use std::fmt;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

use crate::error::{Error, Result};
use crate::pattern::Slot;

/// The maximum length of a [`TimePath`].
pub const MAX_TIME_LENGTH: usize = 6;

pub const MIN_YEAR: u16 = 2015;
pub const MAX_YEAR: u16 = 2050;
pub const MIN_MONTH: u16 = 1;
pub const MAX_MONTH: u16 = 12;
pub const MIN_FIVE_DAYS: u16 = 1;
pub const MAX_FIVE_DAYS: u16 = 6;
pub const MIN_SIX_HOURS: u16 = 1;
pub const MAX_SIX_HOURS: u16 = 4;

/// The semantics of a [`TimeComponent`], given by its position in the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TimePosition {
    Year = 0,
    Month = 1,
    FiveDays = 2,
    Day = 3,
    SixHours = 4,
    Hour = 5,
}

impl TimePosition {
    pub fn from_index(index: usize) -> Option<TimePosition> {
        use TimePosition::*;
        Some(match index {
            0 => Year,
            1 => Month,
            2 => FiveDays,
            3 => Day,
            4 => SixHours,
            5 => Hour,
            _ => return None,
        })
    }
}

impl fmt::Display for TimePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimePosition::Year => "year",
            TimePosition::Month => "month",
            TimePosition::FiveDays => "fivedays",
            TimePosition::Day => "day",
            TimePosition::SixHours => "sixhours",
            TimePosition::Hour => "hour",
        })
    }
}

fn is_leap_year(year: u16) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Returns the inclusive bounds of the component at `position`, restricted
/// by the quantities of the components preceding it.
///
/// `prefix` holds the quantities of all components before `position`; it
/// must be long enough to contain the components the bounds depend on
/// (month and five-day period for days, six-hour period for hours).
pub fn component_bounds(prefix: &[u16], position: TimePosition) -> (u16, u16) {
    match position {
        TimePosition::Year => (MIN_YEAR, MAX_YEAR),
        TimePosition::Month => (MIN_MONTH, MAX_MONTH),
        TimePosition::FiveDays => (MIN_FIVE_DAYS, MAX_FIVE_DAYS),
        TimePosition::Day => {
            let fivedays = prefix[TimePosition::FiveDays as usize];
            if fivedays == 6 {
                let last = match prefix[TimePosition::Month as usize] {
                    1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
                    4 | 6 | 9 | 11 => 30,
                    2 if is_leap_year(prefix[TimePosition::Year as usize]) => 29,
                    2 => 28,
                    month => panic!("invalid month in time path prefix: {}", month),
                };
                (26, last)
            } else {
                (5 * (fivedays - 1) + 1, 5 * fivedays)
            }
        }
        TimePosition::SixHours => (MIN_SIX_HOURS, MAX_SIX_HOURS),
        TimePosition::Hour => {
            let sixhours = prefix[TimePosition::SixHours as usize];
            (6 * (sixhours - 1), 6 * sixhours - 1)
        }
    }
}

/// A single component of a [`TimePath`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeComponent {
    position: TimePosition,
    quantity: u16,
}

impl TimeComponent {
    pub fn new(quantity: u16, position: TimePosition) -> Self {
        TimeComponent { position, quantity }
    }

    pub fn quantity(&self) -> u16 {
        self.quantity
    }

    pub fn position(&self) -> TimePosition {
        self.position
    }

    /// The byte representation used in pattern slots: the position byte
    /// followed by the quantity in little-endian order.
    pub fn representation(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(3);
        bytes.push(self.position as u8);
        bytes.extend_from_slice(&self.quantity.to_le_bytes());
        bytes
    }

    pub(crate) fn from_representation(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 3 {
            return Err(Error::Marshal("time component must be three bytes"));
        }
        let position = TimePosition::from_index(bytes[0] as usize)
            .ok_or(Error::Marshal("invalid time component position"))?;
        let quantity = u16::from_le_bytes([bytes[1], bytes[2]]);
        Ok(TimeComponent { position, quantity })
    }
}

impl fmt::Display for TimeComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.quantity)
    }
}

/// A point in time, or a prefix standing for a whole span of time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct TimePath(Vec<TimeComponent>);

impl TimePath {
    /// Decomposes a timestamp into all six components. The timestamp is
    /// converted to UTC first.
    pub fn from_timestamp<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> Result<TimePath> {
        let utc = timestamp.with_timezone(&Utc);
        let mut quantities = [0u16; MAX_TIME_LENGTH];
        quantities[0] = u16::try_from(utc.year())
            .map_err(|_| Error::InvalidTime(format!("year {} out of range", utc.year())))?;
        quantities[1] = utc.month() as u16;
        quantities[3] = utc.day() as u16;
        quantities[2] = ((quantities[3] - 1) / 5 + 1).min(6);
        quantities[5] = utc.hour() as u16;
        quantities[4] = quantities[5] / 6 + 1;
        TimePath::from_quantities(&quantities)
    }

    /// Builds a (possibly partial) path from raw quantities, validating
    /// each against the bounds implied by its predecessors.
    pub fn from_quantities(quantities: &[u16]) -> Result<TimePath> {
        if quantities.len() > MAX_TIME_LENGTH {
            return Err(Error::InvalidTime("time path too long".to_owned()));
        }
        let mut components = Vec::with_capacity(quantities.len());
        for (i, &quantity) in quantities.iter().enumerate() {
            let position = TimePosition::from_index(i).expect("index bounded above");
            let (min, max) = component_bounds(&quantities[..i], position);
            if quantity < min || quantity > max {
                return Err(Error::InvalidTime(format!(
                    "'{}' is not a valid {}",
                    quantity, position
                )));
            }
            components.push(TimeComponent::new(quantity, position));
        }
        Ok(TimePath(components))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn components(&self) -> &[TimeComponent] {
        &self.0
    }

    /// Writes this path into the time portion of a pattern. Panics if
    /// `into` is shorter than the path.
    pub fn encode_into(&self, into: &mut [Slot]) {
        assert!(
            into.len() >= self.0.len(),
            "not enough space to encode time path"
        );
        for (slot, component) in into.iter_mut().zip(self.0.iter()) {
            *slot = Some(component.representation());
        }
        for slot in into.iter_mut().skip(self.0.len()) {
            *slot = None;
        }
    }

    /// Reads a path back out of the time portion of a pattern, trimming
    /// trailing free slots.
    pub fn decode_from(from: &[Slot]) -> Result<TimePath> {
        let len = from
            .iter()
            .rposition(|slot| slot.is_some())
            .map_or(0, |i| i + 1);
        let mut components = Vec::with_capacity(len);
        for slot in &from[..len] {
            let bytes = slot
                .as_ref()
                .ok_or(Error::Marshal("free slot inside time path"))?;
            components.push(TimeComponent::from_representation(bytes)?);
        }
        Ok(TimePath(components))
    }

    /// Marshals this path: a count byte, then three bytes per component.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + 3 * self.0.len());
        buf.push(self.0.len() as u8);
        for component in &self.0 {
            buf.extend_from_slice(&component.representation());
        }
        buf
    }

    /// Unmarshals a path previously produced by [`TimePath::to_bytes`].
    pub fn from_bytes(marshalled: &[u8]) -> Result<TimePath> {
        let &count = marshalled
            .first()
            .ok_or(Error::Marshal("time path is empty"))?;
        let count = count as usize;
        if marshalled.len() < 1 + 3 * count {
            return Err(Error::Marshal("time path is truncated"));
        }
        let mut components = Vec::with_capacity(count);
        for chunk in marshalled[1..1 + 3 * count].chunks_exact(3) {
            components.push(TimeComponent::from_representation(chunk)?);
        }
        Ok(TimePath(components))
    }
}

impl fmt::Display for TimePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let quantities: Vec<String> = self.0.iter().map(TimeComponent::to_string).collect();
        f.write_str(&quantities.join("/"))
    }
}
