// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use yare::parameterized;

fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn next(expr: &str, after: DateTime<Utc>) -> DateTime<Utc> {
    CronExpression::parse(expr).unwrap().next_after(after).unwrap()
}

#[test]
fn every_minute_fires_on_next_whole_minute() {
    assert_eq!(
        next("* * * * *", at(2026, 3, 4, 10, 15, 30)),
        at(2026, 3, 4, 10, 16, 0)
    );
}

#[test]
fn next_is_strictly_after_a_matching_instant() {
    assert_eq!(
        next("* * * * *", at(2026, 3, 4, 10, 15, 0)),
        at(2026, 3, 4, 10, 16, 0)
    );
}

#[parameterized(
    quarter_hours = { "*/15 * * * *", (2026, 3, 4, 10, 16), (2026, 3, 4, 10, 30) },
    daily_at_six = { "0 6 * * *", (2026, 3, 4, 10, 16), (2026, 3, 5, 6, 0) },
    first_of_month = { "0 0 1 * *", (2026, 3, 4, 10, 16), (2026, 4, 1, 0, 0) },
    year_rollover = { "30 23 31 12 *", (2026, 12, 31, 23, 30), (2027, 12, 31, 23, 30) },
    weekdays_only = { "0 9 * * mon-fri", (2026, 3, 6, 9, 0), (2026, 3, 9, 9, 0) },
    named_month = { "0 0 1 jul *", (2026, 3, 4, 0, 0), (2026, 7, 1, 0, 0) },
    hour_list = { "5 1,13 * * *", (2026, 3, 4, 1, 5), (2026, 3, 4, 13, 5) },
    ranged_step = { "0 8-18/4 * * *", (2026, 3, 4, 12, 0), (2026, 3, 4, 16, 0) },
)]
fn computes_next_occurrence(expr: &str, after: (i32, u32, u32, u32, u32), expected: (i32, u32, u32, u32, u32)) {
    let after = at(after.0, after.1, after.2, after.3, after.4, 0);
    let expected = at(expected.0, expected.1, expected.2, expected.3, expected.4, 0);
    assert_eq!(next(expr, after), expected);
}

#[test]
fn sunday_accepts_zero_and_seven() {
    // 2026-03-08 is a Sunday
    let after = at(2026, 3, 4, 0, 0, 0);
    assert_eq!(next("0 0 * * 0", after), at(2026, 3, 8, 0, 0, 0));
    assert_eq!(next("0 0 * * 7", after), at(2026, 3, 8, 0, 0, 0));
}

#[test]
fn restricted_day_fields_match_either() {
    // 15th of the month or any Monday; 2026-03-09 is a Monday
    assert_eq!(
        next("0 0 15 * mon", at(2026, 3, 4, 0, 0, 0)),
        at(2026, 3, 9, 0, 0, 0)
    );
}

#[test]
fn leap_day_is_found() {
    assert_eq!(
        next("0 0 29 2 *", at(2026, 3, 1, 0, 0, 0)),
        at(2028, 2, 29, 0, 0, 0)
    );
}

#[test]
fn unsatisfiable_expression_has_no_next() {
    let expr = CronExpression::parse("0 0 30 2 *").unwrap();
    assert!(expr.next_after(at(2026, 1, 1, 0, 0, 0)).is_none());
}

#[parameterized(
    hourly = { "@hourly", "0 * * * *" },
    daily = { "@daily", "0 0 * * *" },
    weekly = { "@weekly", "0 0 * * 0" },
    monthly = { "@monthly", "0 0 1 * *" },
    yearly = { "@yearly", "0 0 1 1 *" },
)]
fn macros_expand_to_fields(macro_expr: &str, fields: &str) {
    let after = at(2026, 3, 4, 10, 15, 0);
    assert_eq!(next(macro_expr, after), next(fields, after));
}

#[parameterized(
    too_few_fields = { "* * * *" },
    too_many_fields = { "* * * * * *" },
    minute_out_of_range = { "60 * * * *" },
    zero_step = { "*/0 * * * *" },
    step_wider_than_field = { "*/60 * * * *" },
    step_near_u32_max = { "1/4294967295 * * * *" },
    backwards_range = { "30-10 * * * *" },
    unknown_name = { "0 0 * * funday" },
    unknown_macro = { "@fortnightly" },
)]
fn rejects_invalid_expressions(expr: &str) {
    assert!(CronExpression::parse(expr).is_err());
}

#[test]
fn field_errors_name_the_field() {
    let err = CronExpression::parse("0 25 * * *").unwrap_err();
    assert!(matches!(err, CronError::InvalidField { field: "hour", .. }));
}

#[test]
fn widest_step_selects_only_the_start() {
    let expr = CronExpression::parse("1/59 * * * *").unwrap();
    assert_eq!(expr.minutes, 1 << 1);
    assert_eq!(
        expr.next_after(at(2026, 3, 4, 10, 1, 0)),
        Some(at(2026, 3, 4, 11, 1, 0))
    );
}

#[test]
fn serializes_as_source_string() {
    let expr = CronExpression::parse("*/5 * * * *").unwrap();
    let json = serde_json::to_string(&expr).unwrap();
    assert_eq!(json, "\"*/5 * * * *\"");

    let back: CronExpression = serde_json::from_str(&json).unwrap();
    assert_eq!(back, expr);
}

#[test]
fn deserializing_invalid_expression_fails() {
    let result: Result<CronExpression, _> = serde_json::from_str("\"not cron\"");
    assert!(result.is_err());
}
