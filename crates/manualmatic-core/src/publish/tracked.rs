//! Change-tracked values
//!
//! A tracked value remembers the last reading it saw and whether that reading
//! still has to reach the pendant. Sends that fail leave the value dirty so the
//! next pass retries it.

use thiserror::Error;

use super::fields::{AxisField, FieldError, Format, Reading, ScalarField, Shape};
use crate::machine::Stat;
use crate::protocol::{Connector, Transport};

/// Destination for encoded frames
pub trait FrameSink {
    /// Send one frame, returning whether the transport accepted it
    fn send(&mut self, code: &str, payload: &str) -> bool;
}

impl<C: Connector> FrameSink for Transport<C> {
    fn send(&mut self, code: &str, payload: &str) -> bool {
        Transport::send(self, code, payload)
    }
}

/// A field could not be read during a publish pass
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to read '{code}': {source}")]
pub struct PublishError {
    /// Wire code of the offending field
    pub code: String,
    /// Why the field could not be read
    #[source]
    pub source: FieldError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Scalar(ScalarField),
    Axis(AxisField, usize),
}

/// A single published field
#[derive(Debug, Clone)]
pub struct TrackedValue {
    code: String,
    probe: Probe,
    format: Format,
    shape: Shape,
    last_value: Option<Reading>,
    dirty: bool,
}

impl TrackedValue {
    /// Track a scalar field
    pub fn scalar(field: ScalarField) -> Self {
        Self {
            code: field.command().code(),
            probe: Probe::Scalar(field),
            format: Format::Plain,
            shape: field.shape(),
            last_value: None,
            dirty: true,
        }
    }

    /// Track one axis of a per-axis field; the code gets the axis index appended
    pub fn axis(field: AxisField, index: usize) -> Self {
        Self {
            code: field.command().with(index),
            probe: Probe::Axis(field, index),
            format: field.format(),
            shape: Shape::Value,
            last_value: None,
            dirty: true,
        }
    }

    /// Wire code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Whether the value still has to be sent
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Last reading seen (sent or pending)
    pub fn last_value(&self) -> Option<Reading> {
        self.last_value
    }

    /// Re-send on the next update even if unchanged
    pub fn force_refresh(&mut self) {
        self.dirty = true;
    }

    fn is_position(&self) -> bool {
        match self.probe {
            Probe::Scalar(field) => field.is_position(),
            Probe::Axis(field, _) => field.is_position(),
        }
    }

    fn read(&self, stat: &Stat) -> Result<Reading, FieldError> {
        match self.probe {
            Probe::Scalar(field) => field.read(stat),
            Probe::Axis(field, index) => field.read(stat, index),
        }
    }

    /// Read the field, and send it if it changed or was forced.
    ///
    /// Returns whether a frame was sent.
    pub fn update<S: FrameSink + ?Sized>(
        &mut self,
        stat: &Stat,
        sink: &mut S,
    ) -> Result<bool, PublishError> {
        let current = self.read(stat).map_err(|source| PublishError {
            code: self.code.clone(),
            source,
        })?;
        if !self.last_value.is_some_and(|last| last.same_as(current)) {
            self.last_value = Some(current);
            self.dirty = true;
        }
        if !self.dirty {
            return Ok(false);
        }
        let payload = self.format.render(current);
        let sent = match self.shape {
            Shape::Value => sink.send(&self.code, &payload),
            Shape::Inline => sink.send(&format!("{}{}", self.code, payload), ""),
        };
        if sent {
            self.dirty = false;
        }
        Ok(sent)
    }
}

/// One tracked value per configured axis
#[derive(Debug, Clone)]
pub struct TrackedArray {
    field: AxisField,
    values: Vec<TrackedValue>,
}

impl TrackedArray {
    /// Track `field` for each axis in `axes`
    pub fn new(field: AxisField, axes: &[usize]) -> Self {
        Self {
            field,
            values: axes.iter().map(|&i| TrackedValue::axis(field, i)).collect(),
        }
    }

    /// Field tracked for every axis
    pub fn field(&self) -> AxisField {
        self.field
    }

    /// Tracked values, one per axis
    pub fn values(&self) -> &[TrackedValue] {
        &self.values
    }

    /// Re-send everything on the next update
    pub fn force_refresh(&mut self) {
        for value in &mut self.values {
            value.force_refresh();
        }
    }

    /// Update every axis, stopping at the first unreadable one.
    ///
    /// Returns the number of frames sent.
    pub fn update<S: FrameSink + ?Sized>(
        &mut self,
        stat: &Stat,
        sink: &mut S,
    ) -> Result<usize, PublishError> {
        let mut sent = 0;
        for value in &mut self.values {
            if value.update(stat, sink)? {
                sent += 1;
            }
        }
        Ok(sent)
    }
}

/// An entry of the session's publish table
#[derive(Debug, Clone)]
pub enum Tracked {
    /// A single value
    Value(TrackedValue),
    /// One value per axis
    Array(TrackedArray),
}

impl Tracked {
    /// Update the entry, returning the number of frames sent
    pub fn update<S: FrameSink + ?Sized>(
        &mut self,
        stat: &Stat,
        sink: &mut S,
    ) -> Result<usize, PublishError> {
        match self {
            Tracked::Value(value) => value.update(stat, sink).map(usize::from),
            Tracked::Array(array) => array.update(stat, sink),
        }
    }

    /// Re-send everything on the next update
    pub fn force_refresh(&mut self) {
        match self {
            Tracked::Value(value) => value.force_refresh(),
            Tracked::Array(array) => array.force_refresh(),
        }
    }

    /// Offsets, absolute positions and the work coordinate index
    pub fn is_position(&self) -> bool {
        match self {
            Tracked::Value(value) => value.is_position(),
            Tracked::Array(array) => array.field.is_position(),
        }
    }
}
