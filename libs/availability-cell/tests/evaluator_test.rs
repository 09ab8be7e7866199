use assert_matches::assert_matches;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use availability_cell::models::{
    AdjustedAvailability, Appointment, AppointmentStatus, EmploymentStatus, EmploymentType,
    Schedule, Therapist, UnavailableReason, WeeklyAvailability,
};
use availability_cell::services::evaluator::{
    available_slots_for_date, evaluate, EvaluationContext,
};

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn at(hhmm: &str) -> NaiveTime {
    NaiveTime::parse_from_str(hhmm, "%H:%M").unwrap()
}

// Monday morning, with the following Monday as the usual candidate day.
fn now() -> DateTime<Utc> {
    utc(2026, 3, 2, 8, 0)
}

fn base_schedule() -> Schedule {
    Schedule {
        id: Uuid::new_v4(),
        therapist_id: Uuid::new_v4(),
        appointment_duration_minutes: 60,
        buffer_minutes: 30,
        timezone: "UTC".to_string(),
        available_now: true,
        start_date: None,
        end_date: None,
        max_advance_booking_days: Some(30),
        min_booking_before_hours: 0,
        max_daily_appointments: Some(10),
        weekly_availabilities: Vec::new(),
        adjusted_availabilities: Vec::new(),
    }
}

fn weekly(day_of_week: i64, start: &str, end: &str) -> WeeklyAvailability {
    WeeklyAvailability {
        id: Uuid::new_v4(),
        day_of_week,
        start_time: at(start),
        end_time: at(end),
    }
}

fn all_week(start: &str, end: &str) -> Vec<WeeklyAvailability> {
    (0..7).map(|d| weekly(d, start, end)).collect()
}

fn adjusted(date: NaiveDate, start: Option<&str>, end: Option<&str>) -> AdjustedAvailability {
    AdjustedAvailability {
        id: Uuid::new_v4(),
        date,
        start_time: start.map(at),
        end_time: end.map(at),
        reason: Some("override".to_string()),
    }
}

fn make_therapist(schedule: Schedule) -> Therapist {
    Therapist {
        id: schedule.therapist_id,
        first_name: "Mara".to_string(),
        last_name: "Quinn".to_string(),
        gender: "female".to_string(),
        employment_type: EmploymentType::Flat,
        employment_status: EmploymentStatus::Active,
        latitude: None,
        longitude: None,
        location_rule: None,
        schedule: Some(schedule),
        address: None,
    }
}

fn appointment(therapist_id: Uuid, start: DateTime<Utc>) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        therapist_id,
        appointment_date_time: start,
        duration_minutes: None,
        status: AppointmentStatus::Confirmed,
        location_name: None,
    }
}

fn ctx(appointments: &[Appointment]) -> EvaluationContext<'_> {
    EvaluationContext {
        now: now(),
        same_day_appointments: appointments,
        exclude_appointment_id: None,
        all_of_day: false,
    }
}

fn first_reason_text(reasons: &[UnavailableReason]) -> String {
    reasons.first().map(ToString::to_string).unwrap_or_default()
}

#[test]
fn no_schedule_is_silently_unavailable() {
    let mut therapist = make_therapist(base_schedule());
    therapist.schedule = None;

    let decision = evaluate(&therapist, utc(2026, 3, 9, 10, 0), &ctx(&[]));
    assert!(!decision.available);
    assert!(decision.reasons.is_empty());
}

#[test]
fn unknown_timezone_is_silently_unavailable() {
    let mut schedule = base_schedule();
    schedule.timezone = "Nowhere/Invalid".to_string();
    schedule.weekly_availabilities = all_week("09:00", "18:00");
    let therapist = make_therapist(schedule);

    let decision = evaluate(&therapist, utc(2026, 3, 9, 10, 0), &ctx(&[]));
    assert!(!decision.available);
    assert!(decision.reasons.is_empty());
}

#[test]
fn past_candidate_is_rejected() {
    let mut schedule = base_schedule();
    schedule.weekly_availabilities = all_week("00:00", "23:00");
    let therapist = make_therapist(schedule);

    let decision = evaluate(&therapist, utc(2026, 3, 2, 7, 0), &ctx(&[]));
    assert!(!decision.available);
    assert_eq!(decision.reasons, vec![UnavailableReason::PastDate]);
    assert_eq!(
        first_reason_text(&decision.reasons),
        "Not available for past dates"
    );
}

#[test]
fn minimum_lead_time_is_enforced() {
    let mut schedule = base_schedule();
    schedule.min_booking_before_hours = 24;
    schedule.weekly_availabilities = all_week("00:00", "23:00");
    let therapist = make_therapist(schedule);

    let decision = evaluate(&therapist, utc(2026, 3, 2, 10, 0), &ctx(&[]));
    assert!(!decision.available);
    assert!(first_reason_text(&decision.reasons).contains("24 hours"));
}

#[test]
fn advance_booking_limit_is_inclusive() {
    let mut schedule = base_schedule();
    schedule.max_advance_booking_days = Some(14);
    schedule.weekly_availabilities = all_week("09:00", "18:00");
    let therapist = make_therapist(schedule);

    // Exactly 14 days out is allowed.
    let decision = evaluate(&therapist, utc(2026, 3, 16, 10, 0), &ctx(&[]));
    assert!(decision.available);

    // 15 days out is not.
    let decision = evaluate(&therapist, utc(2026, 3, 17, 10, 0), &ctx(&[]));
    assert!(!decision.available);
    assert_eq!(
        decision.reasons,
        vec![UnavailableReason::ExceedsAdvanceBooking { max_days: 14 }]
    );
    assert!(first_reason_text(&decision.reasons).contains("14 days"));
}

#[test]
fn date_window_applies_when_not_available_now() {
    let mut schedule = base_schedule();
    schedule.available_now = false;
    schedule.start_date = Some(day(2026, 3, 10));
    schedule.end_date = Some(day(2026, 3, 20));
    schedule.weekly_availabilities = all_week("09:00", "18:00");
    let therapist = make_therapist(schedule);

    let before = evaluate(&therapist, utc(2026, 3, 5, 10, 0), &ctx(&[]));
    assert!(!before.available);
    assert!(first_reason_text(&before.reasons).contains("before schedule start"));

    let after = evaluate(&therapist, utc(2026, 3, 25, 10, 0), &ctx(&[]));
    assert!(!after.available);
    assert!(first_reason_text(&after.reasons).contains("after schedule end"));

    let inside = evaluate(&therapist, utc(2026, 3, 15, 10, 0), &ctx(&[]));
    assert!(inside.available);
}

#[test]
fn available_now_ignores_date_window() {
    let mut schedule = base_schedule();
    schedule.available_now = true;
    schedule.start_date = Some(day(2026, 3, 10));
    schedule.weekly_availabilities = all_week("09:00", "18:00");
    let therapist = make_therapist(schedule);

    let decision = evaluate(&therapist, utc(2026, 3, 5, 10, 0), &ctx(&[]));
    assert!(decision.available);
}

#[test]
fn missing_weekday_windows_name_the_weekday() {
    let mut schedule = base_schedule();
    // Tuesdays only; candidate is a Monday.
    schedule.weekly_availabilities = vec![weekly(2, "09:00", "18:00")];
    let therapist = make_therapist(schedule);

    let decision = evaluate(&therapist, utc(2026, 3, 9, 10, 0), &ctx(&[]));
    assert!(!decision.available);
    assert_eq!(
        first_reason_text(&decision.reasons),
        "No weekly slots for Monday"
    );
}

#[test]
fn full_day_override_blocks_regardless_of_weekly_windows() {
    let mut schedule = base_schedule();
    schedule.weekly_availabilities = all_week("09:00", "18:00");
    schedule.adjusted_availabilities = vec![adjusted(day(2026, 3, 9), None, None)];
    let therapist = make_therapist(schedule);

    let decision = evaluate(&therapist, utc(2026, 3, 9, 10, 0), &ctx(&[]));
    assert!(!decision.available);
    assert_eq!(
        first_reason_text(&decision.reasons),
        "Unavailable on 2026-03-09"
    );
}

#[test]
fn timed_override_replaces_weekly_windows_for_that_date() {
    let mut schedule = base_schedule();
    schedule.weekly_availabilities = all_week("09:00", "12:00");
    schedule.adjusted_availabilities =
        vec![adjusted(day(2026, 3, 9), Some("14:00"), Some("16:00"))];
    let therapist = make_therapist(schedule);

    // Inside the weekly window but the override replaced it.
    let morning = evaluate(&therapist, utc(2026, 3, 9, 10, 0), &ctx(&[]));
    assert!(!morning.available);
    assert!(first_reason_text(&morning.reasons).contains("adjusted availability hours"));

    let afternoon = evaluate(&therapist, utc(2026, 3, 9, 14, 0), &ctx(&[]));
    assert!(afternoon.available);

    // Other dates keep their weekly windows.
    let next_day = evaluate(&therapist, utc(2026, 3, 10, 10, 0), &ctx(&[]));
    assert!(next_day.available);
}

#[test]
fn candidate_block_must_fit_inside_a_window() {
    let mut schedule = base_schedule();
    schedule.appointment_duration_minutes = 90;
    schedule.weekly_availabilities = all_week("09:00", "12:00");
    let therapist = make_therapist(schedule);

    let fitting = evaluate(&therapist, utc(2026, 3, 9, 10, 30), &ctx(&[]));
    assert!(fitting.available);

    let overflowing = evaluate(&therapist, utc(2026, 3, 9, 11, 0), &ctx(&[]));
    assert!(!overflowing.available);
    assert!(first_reason_text(&overflowing.reasons).contains("weekly availability for Monday"));
}

#[test]
fn buffered_blocks_reject_adjacent_candidates() {
    let mut schedule = base_schedule();
    schedule.weekly_availabilities = all_week("09:00", "18:00");
    let therapist = make_therapist(schedule);
    // 60 min + 30 min buffer: block runs 13:00-14:30.
    let existing = appointment(therapist.id, utc(2026, 3, 9, 13, 0));
    let appointments = vec![existing];

    let too_close_after = evaluate(&therapist, utc(2026, 3, 9, 14, 0), &ctx(&appointments));
    assert!(!too_close_after.available);
    assert_matches!(
        too_close_after.reasons[0],
        UnavailableReason::Conflict { .. }
    );

    let clear_after = evaluate(&therapist, utc(2026, 3, 9, 14, 30), &ctx(&appointments));
    assert!(clear_after.available);

    let too_close_before = evaluate(&therapist, utc(2026, 3, 9, 12, 30), &ctx(&appointments));
    assert!(!too_close_before.available);

    let clear_before = evaluate(&therapist, utc(2026, 3, 9, 11, 30), &ctx(&appointments));
    assert!(clear_before.available);
}

#[test]
fn cancelled_appointments_never_block() {
    let mut schedule = base_schedule();
    schedule.weekly_availabilities = all_week("09:00", "18:00");
    let therapist = make_therapist(schedule);
    let mut existing = appointment(therapist.id, utc(2026, 3, 9, 13, 0));
    existing.status = AppointmentStatus::Cancelled;
    let appointments = vec![existing];

    let decision = evaluate(&therapist, utc(2026, 3, 9, 14, 0), &ctx(&appointments));
    assert!(decision.available);
}

#[test]
fn excluded_appointment_is_ignored_for_conflicts_and_cap() {
    let mut schedule = base_schedule();
    schedule.max_daily_appointments = Some(1);
    schedule.weekly_availabilities = all_week("09:00", "18:00");
    let therapist = make_therapist(schedule);
    let existing = appointment(therapist.id, utc(2026, 3, 9, 13, 0));
    let excluded_id = existing.id;
    let appointments = vec![existing];

    let mut context = ctx(&appointments);
    context.exclude_appointment_id = Some(excluded_id);

    // Rescheduling over the old appointment's block is allowed and the old
    // appointment does not count toward the cap.
    let decision = evaluate(&therapist, utc(2026, 3, 9, 14, 0), &context);
    assert!(decision.available);
}

#[test]
fn daily_cap_blocks_that_day_only() {
    let mut schedule = base_schedule();
    schedule.max_daily_appointments = Some(4);
    schedule.weekly_availabilities = all_week("09:00", "18:00");
    let therapist = make_therapist(schedule);
    let appointments: Vec<Appointment> = (9..13)
        .map(|hour| appointment(therapist.id, utc(2026, 3, 9, hour, 0)))
        .collect();

    let capped = evaluate(&therapist, utc(2026, 3, 9, 16, 0), &ctx(&appointments));
    assert!(!capped.available);
    assert!(first_reason_text(&capped.reasons).contains("max daily appointments"));

    // A different day is unaffected.
    let next_day = evaluate(&therapist, utc(2026, 3, 10, 16, 0), &ctx(&appointments));
    assert!(next_day.available);
}

#[test]
fn all_of_day_waives_time_checks_but_not_the_cap() {
    let mut schedule = base_schedule();
    schedule.weekly_availabilities = all_week("09:00", "12:00");
    let therapist = make_therapist(schedule);
    let existing = appointment(therapist.id, utc(2026, 3, 9, 10, 0));
    let appointments = vec![existing];

    // 20:00 is outside every window and 10:00 conflicts, but the day itself
    // is bookable.
    let mut context = ctx(&appointments);
    context.all_of_day = true;
    let decision = evaluate(&therapist, utc(2026, 3, 9, 20, 0), &context);
    assert!(decision.available);

    let mut capped_schedule = base_schedule();
    capped_schedule.max_daily_appointments = Some(1);
    capped_schedule.weekly_availabilities = all_week("09:00", "12:00");
    let capped_therapist = make_therapist(capped_schedule);
    let booked = vec![appointment(capped_therapist.id, utc(2026, 3, 9, 10, 0))];
    let mut capped_context = ctx(&booked);
    capped_context.all_of_day = true;

    let capped = evaluate(&capped_therapist, utc(2026, 3, 9, 20, 0), &capped_context);
    assert!(!capped.available);
    assert!(first_reason_text(&capped.reasons).contains("max daily appointments"));
}

#[test]
fn weekday_is_resolved_in_the_schedule_timezone() {
    let mut schedule = base_schedule();
    schedule.timezone = "America/New_York".to_string();
    // Mondays only.
    schedule.weekly_availabilities = vec![weekly(1, "09:00", "18:00")];
    let therapist = make_therapist(schedule);

    // 01:00 UTC Tuesday is still Monday 21:00 in New York: the weekday
    // matches but the time is outside the window.
    let late = evaluate(&therapist, utc(2026, 3, 10, 1, 0), &ctx(&[]));
    assert!(!late.available);
    assert!(first_reason_text(&late.reasons).contains("Monday"));

    // 14:00 UTC Monday is 10:00 local, inside the window.
    let inside = evaluate(&therapist, utc(2026, 3, 9, 14, 0), &ctx(&[]));
    assert!(inside.available);
}

#[test]
fn slot_grid_keeps_only_fitting_starts() {
    let mut schedule = base_schedule();
    schedule.appointment_duration_minutes = 90;
    schedule.weekly_availabilities = vec![weekly(1, "09:00", "12:00")];
    let therapist = make_therapist(schedule);

    let slots = available_slots_for_date(&therapist, day(2026, 3, 9), &[]);
    assert_eq!(slots, vec!["09:00", "09:30", "10:00", "10:30"]);
}

#[test]
fn slots_clear_buffered_appointment_blocks() {
    let mut schedule = base_schedule();
    schedule.weekly_availabilities = all_week("09:00", "18:00");
    let therapist = make_therapist(schedule);
    let appointments = vec![appointment(therapist.id, utc(2026, 3, 9, 13, 0))];

    let slots = available_slots_for_date(&therapist, day(2026, 3, 9), &appointments);
    assert!(slots.contains(&"09:00".to_string()));
    assert!(slots.contains(&"11:30".to_string()));
    assert!(slots.contains(&"14:30".to_string()));
    for blocked in ["12:00", "12:30", "13:00", "13:30", "14:00"] {
        assert!(!slots.contains(&blocked.to_string()), "{} should be blocked", blocked);
    }
}

#[test]
fn slots_for_fully_blocked_date_are_empty() {
    let mut schedule = base_schedule();
    schedule.weekly_availabilities = all_week("09:00", "18:00");
    schedule.adjusted_availabilities = vec![adjusted(day(2026, 3, 9), None, None)];
    let therapist = make_therapist(schedule);

    let slots = available_slots_for_date(&therapist, day(2026, 3, 9), &[]);
    assert!(slots.is_empty());
}

#[test]
fn slots_follow_timed_overrides() {
    let mut schedule = base_schedule();
    schedule.weekly_availabilities = all_week("09:00", "12:00");
    schedule.adjusted_availabilities =
        vec![adjusted(day(2026, 3, 9), Some("14:00"), Some("16:00"))];
    let therapist = make_therapist(schedule);

    let slots = available_slots_for_date(&therapist, day(2026, 3, 9), &[]);
    assert_eq!(slots, vec!["14:00", "14:30", "15:00"]);
}

#[test]
fn slots_without_schedule_are_empty() {
    let mut therapist = make_therapist(base_schedule());
    therapist.schedule = None;

    let slots = available_slots_for_date(&therapist, day(2026, 3, 9), &[]);
    assert!(slots.is_empty());
}
