mod common;

use common::RecordingSink;
use manualmatic_core::machine::{Stat, TaskMode};
use manualmatic_core::publish::{
    AxisField, FieldError, PublishError, Reading, ScalarField, Tracked, TrackedArray, TrackedValue,
};
use pretty_assertions::assert_eq;

fn frames(sink: &RecordingSink) -> Vec<(&str, &str)> {
    sink.frames
        .iter()
        .map(|(c, p)| (c.as_str(), p.as_str()))
        .collect()
}

#[test]
fn test_first_update_sends() {
    let stat = Stat::default();
    let mut value = TrackedValue::scalar(ScalarField::FeedOverride);
    let mut sink = RecordingSink::default();

    assert!(value.is_dirty());
    assert_eq!(value.update(&stat, &mut sink), Ok(true));
    assert!(!value.is_dirty());
    assert_eq!(frames(&sink), vec![("f", "1")]);
}

#[test]
fn test_unchanged_value_not_resent() {
    let mut stat = Stat::default();
    let mut value = TrackedValue::scalar(ScalarField::FeedOverride);
    let mut sink = RecordingSink::default();

    value.update(&stat, &mut sink).unwrap();
    assert_eq!(value.update(&stat, &mut sink), Ok(false));

    stat.feedrate = 1.2;
    assert_eq!(value.update(&stat, &mut sink), Ok(true));
    assert_eq!(value.update(&stat, &mut sink), Ok(false));
    assert_eq!(frames(&sink), vec![("f", "1"), ("f", "1.2")]);
}

#[test]
fn test_nan_reading_sent_once() {
    let mut stat = Stat::default();
    stat.current_vel = f64::NAN;
    let mut value = TrackedValue::scalar(ScalarField::CurrentVelocity);
    let mut sink = RecordingSink::default();

    assert_eq!(value.update(&stat, &mut sink), Ok(true));
    assert_eq!(value.update(&stat, &mut sink), Ok(false));
    assert_eq!(frames(&sink), vec![("v", "NaN")]);
}

#[test]
fn test_force_refresh_resends_cached_value() {
    let stat = Stat::default();
    let mut value = TrackedValue::scalar(ScalarField::RapidOverride);
    let mut sink = RecordingSink::default();

    value.update(&stat, &mut sink).unwrap();
    value.force_refresh();
    assert!(value.is_dirty());
    assert_eq!(value.last_value(), Some(Reading::Real(1.0)));
    assert_eq!(value.update(&stat, &mut sink), Ok(true));
    assert_eq!(frames(&sink), vec![("r", "1"), ("r", "1")]);
}

#[test]
fn test_failed_send_retried() {
    let stat = Stat::default();
    let mut value = TrackedValue::scalar(ScalarField::CurrentVelocity);
    let mut sink = RecordingSink {
        reject: true,
        ..RecordingSink::default()
    };

    assert_eq!(value.update(&stat, &mut sink), Ok(false));
    assert!(value.is_dirty());

    sink.reject = false;
    assert_eq!(value.update(&stat, &mut sink), Ok(true));
    assert!(!value.is_dirty());
    assert_eq!(frames(&sink), vec![("v", "0")]);
}

#[test]
fn test_inline_shape_appends_value_to_code() {
    let mut stat = Stat::default();
    stat.task_mode = TaskMode::Mdi;
    let mut value = TrackedValue::scalar(ScalarField::TaskMode);
    let mut sink = RecordingSink::default();

    value.update(&stat, &mut sink).unwrap();
    assert_eq!(frames(&sink), vec![("M3", "")]);
}

#[test]
fn test_array_fans_out_by_axis_index() {
    let mut stat = Stat::default();
    stat.actual_position[0] = 1.5;
    stat.actual_position[2] = -0.25;
    let mut array = TrackedArray::new(AxisField::AbsolutePosition, &[0, 2]);
    let mut sink = RecordingSink::default();

    assert_eq!(array.update(&stat, &mut sink), Ok(2));
    assert_eq!(
        frames(&sink),
        vec![("A0", "1.50000"), ("A2", "-0.25000")]
    );

    stat.actual_position[2] = 3.0;
    sink.frames.clear();
    assert_eq!(array.update(&stat, &mut sink), Ok(1));
    assert_eq!(frames(&sink), vec![("A2", "3.00000")]);
}

#[test]
fn test_homed_array_plain_format() {
    let mut stat = Stat::default();
    stat.homed[1] = true;
    let mut array = TrackedArray::new(AxisField::Homed, &[0, 1]);
    let mut sink = RecordingSink::default();

    array.update(&stat, &mut sink).unwrap();
    assert_eq!(frames(&sink), vec![("h0", "0"), ("h1", "1")]);
}

#[test]
fn test_unreadable_field_identifies_code() {
    let mut stat = Stat::default();
    stat.dtg.truncate(2);
    let mut entry = Tracked::Array(TrackedArray::new(AxisField::DistanceToGo, &[0, 1, 2, 3]));
    let mut sink = RecordingSink::default();

    let err = entry.update(&stat, &mut sink).unwrap_err();
    assert_eq!(
        err,
        PublishError {
            code: "D2".to_string(),
            source: FieldError::AxisMissing {
                field: "dtg",
                index: 2
            },
        }
    );
    // Axes before the failure were still published
    assert_eq!(sink.codes(), vec!["D0", "D1"]);
}

#[test]
fn test_missing_spindle_fails_pass() {
    let mut stat = Stat::default();
    stat.spindle.clear();
    let mut value = TrackedValue::scalar(ScalarField::SpindleDirection);
    let mut sink = RecordingSink::default();

    let err = value.update(&stat, &mut sink).unwrap_err();
    assert_eq!(err.code, "G");
    assert_eq!(err.source, FieldError::Missing("spindle"));
    assert!(sink.frames.is_empty());
}

#[test]
fn test_position_entries() {
    assert!(Tracked::Value(TrackedValue::scalar(ScalarField::G5xIndex)).is_position());
    assert!(Tracked::Array(TrackedArray::new(AxisField::G92Offset, &[0])).is_position());
    assert!(!Tracked::Array(TrackedArray::new(AxisField::DistanceToGo, &[0])).is_position());
    assert!(!Tracked::Value(TrackedValue::scalar(ScalarField::FeedOverride)).is_position());
}
