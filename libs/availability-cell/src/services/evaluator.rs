use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;
use uuid::Uuid;

use crate::models::{
    Appointment, AvailabilityDecision, Therapist, UnavailableReason, weekday_name,
};

/// Candidate start times are generated on a fixed 30-minute grid.
pub const SLOT_STEP_MINUTES: i64 = 30;

/// Inputs for one evaluation beyond the candidate time itself. `now` is
/// injected so callers (and tests) control the clock; preloaded same-day
/// appointments are passed explicitly rather than hung off the entity.
pub struct EvaluationContext<'a> {
    pub now: DateTime<Utc>,
    pub same_day_appointments: &'a [Appointment],
    pub exclude_appointment_id: Option<Uuid>,
    pub all_of_day: bool,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(same_day_appointments: &'a [Appointment]) -> Self {
        Self {
            now: Utc::now(),
            same_day_appointments,
            exclude_appointment_id: None,
            all_of_day: false,
        }
    }
}

/// Decide whether one therapist can take one candidate appointment time.
///
/// The pipeline short-circuits on the first blocking condition and reports
/// exactly that reason. It never errors: misconfiguration (no schedule, bad
/// timezone) is simply "not available". An all-of-day request skips the
/// exact-time checks (window fit and conflicts) but keeps every day-level
/// gate, including the daily cap.
pub fn evaluate(
    therapist: &Therapist,
    candidate_time: DateTime<Utc>,
    ctx: &EvaluationContext<'_>,
) -> AvailabilityDecision {
    let Some(schedule) = therapist.schedule.as_ref() else {
        return AvailabilityDecision::blocked_without_reason();
    };
    let Some(tz) = schedule.tz() else {
        warn!(
            "Therapist {} has unrecognized timezone {:?}, treating as unavailable",
            therapist.id, schedule.timezone
        );
        return AvailabilityDecision::blocked_without_reason();
    };

    let local_candidate = candidate_time.with_timezone(&tz);
    let local_now = ctx.now.with_timezone(&tz);

    if local_candidate < local_now {
        return AvailabilityDecision::blocked(UnavailableReason::PastDate);
    }

    if schedule.min_booking_before_hours > 0
        && local_candidate < local_now + Duration::hours(schedule.min_booking_before_hours)
    {
        return AvailabilityDecision::blocked(UnavailableReason::TooSoon {
            min_hours: schedule.min_booking_before_hours,
        });
    }

    let candidate_date = local_candidate.date_naive();

    if let Some(max_days) = schedule.max_advance_booking_days {
        let days_out = (candidate_date - local_now.date_naive()).num_days();
        if days_out > max_days {
            return AvailabilityDecision::blocked(UnavailableReason::ExceedsAdvanceBooking {
                max_days,
            });
        }
    }

    if !schedule.available_now {
        if let Some(start_date) = schedule.start_date {
            if candidate_date < start_date {
                return AvailabilityDecision::blocked(UnavailableReason::BeforeScheduleStart {
                    start_date,
                });
            }
        }
        if let Some(end_date) = schedule.end_date {
            if candidate_date > end_date {
                return AvailabilityDecision::blocked(UnavailableReason::AfterScheduleEnd {
                    end_date,
                });
            }
        }
    }

    let weekday = candidate_date.weekday();
    let weekly = schedule.weekly_windows_for(weekday);
    let adjusted = schedule.adjusted_for(candidate_date);

    if weekly.is_empty() && adjusted.is_empty() {
        return AvailabilityDecision::blocked(UnavailableReason::NoWeeklySlots {
            weekday: weekday_name(weekday).to_string(),
        });
    }

    // A full-day override wins unconditionally.
    if adjusted.iter().any(|entry| entry.blocks_whole_day()) {
        return AvailabilityDecision::blocked(UnavailableReason::UnavailableOnDate {
            date: candidate_date,
        });
    }

    let overridden = !adjusted.is_empty();
    let windows: Vec<(NaiveTime, NaiveTime)> = if overridden {
        adjusted
            .iter()
            .filter_map(|entry| Some((entry.start_time?, entry.end_time?)))
            .collect()
    } else {
        weekly
            .iter()
            .map(|window| (window.start_time, window.end_time))
            .collect()
    };

    let duration = Duration::minutes(schedule.appointment_duration_minutes);
    let buffer = Duration::minutes(schedule.buffer_minutes);

    if !ctx.all_of_day {
        let candidate_end = local_candidate + duration;
        let fits = candidate_end.date_naive() == candidate_date
            && windows.iter().any(|(start, end)| {
                local_candidate.time() >= *start && candidate_end.time() <= *end
            });
        if !fits {
            return AvailabilityDecision::blocked(if overridden {
                UnavailableReason::OutsideAdjustedHours {
                    date: candidate_date,
                }
            } else {
                UnavailableReason::OutsideWeeklyHours {
                    weekday: weekday_name(weekday).to_string(),
                }
            });
        }

        let candidate_block_end = candidate_time + duration + buffer;
        for appointment in counted_appointments(
            ctx.same_day_appointments,
            ctx.exclude_appointment_id,
            &tz,
            candidate_date,
        ) {
            let existing_start = appointment.appointment_date_time;
            let existing_end = existing_start
                + Duration::minutes(appointment.effective_duration_minutes(schedule))
                + buffer;
            if candidate_time < existing_end && candidate_block_end > existing_start {
                return AvailabilityDecision::blocked(UnavailableReason::Conflict {
                    appointment_id: appointment.id,
                });
            }
        }
    }

    if let Some(max) = schedule.max_daily_appointments {
        let booked = counted_appointments(
            ctx.same_day_appointments,
            ctx.exclude_appointment_id,
            &tz,
            candidate_date,
        )
        .count() as i64;
        if booked >= max {
            return AvailabilityDecision::blocked(UnavailableReason::DailyCapReached { max });
        }
    }

    AvailabilityDecision::bookable()
}

/// Generate the free start times for one date as "HH:MM" strings, in
/// chronological order. Starts are kept when the appointment fits its
/// effective window and the buffered block clears every existing same-day
/// appointment's buffered block.
pub fn available_slots_for_date(
    therapist: &Therapist,
    date: NaiveDate,
    appointments: &[Appointment],
) -> Vec<String> {
    let Some(schedule) = therapist.schedule.as_ref() else {
        return Vec::new();
    };
    let Some(tz) = schedule.tz() else {
        warn!(
            "Therapist {} has unrecognized timezone {:?}, no slots generated",
            therapist.id, schedule.timezone
        );
        return Vec::new();
    };

    let adjusted = schedule.adjusted_for(date);
    if adjusted.iter().any(|entry| entry.blocks_whole_day()) {
        return Vec::new();
    }

    let windows: Vec<(NaiveTime, NaiveTime)> = if adjusted.is_empty() {
        schedule
            .weekly_windows_for(date.weekday())
            .iter()
            .map(|window| (window.start_time, window.end_time))
            .collect()
    } else {
        adjusted
            .iter()
            .filter_map(|entry| Some((entry.start_time?, entry.end_time?)))
            .collect()
    };

    let duration_minutes = schedule.appointment_duration_minutes;
    let duration = Duration::minutes(duration_minutes);
    let buffer = Duration::minutes(schedule.buffer_minutes);

    let blocked: Vec<(DateTime<Utc>, DateTime<Utc>)> =
        counted_appointments(appointments, None, &tz, date)
            .map(|appointment| {
                let start = appointment.appointment_date_time;
                let end = start
                    + Duration::minutes(appointment.effective_duration_minutes(schedule))
                    + buffer;
                (start, end)
            })
            .collect();

    let mut starts: Vec<NaiveTime> = Vec::new();
    for (window_start, window_end) in windows {
        let mut offset = minutes_from_midnight(window_start);
        let window_close = minutes_from_midnight(window_end);

        while offset + duration_minutes <= window_close {
            let Some(slot_time) =
                NaiveTime::from_num_seconds_from_midnight_opt((offset * 60) as u32, 0)
            else {
                break;
            };

            // DST gaps have no local instant; such slots are skipped.
            // Ambiguous local times take the earlier instant.
            if let Some(local_start) = tz.from_local_datetime(&date.and_time(slot_time)).earliest()
            {
                let slot_start = local_start.with_timezone(&Utc);
                let slot_block_end = slot_start + duration + buffer;
                let conflict = blocked
                    .iter()
                    .any(|(start, end)| slot_start < *end && slot_block_end > *start);
                if !conflict {
                    starts.push(slot_time);
                }
            }

            offset += SLOT_STEP_MINUTES;
        }
    }

    starts.sort();
    starts.dedup();
    starts
        .iter()
        .map(|time| time.format("%H:%M").to_string())
        .collect()
}

fn counted_appointments<'a>(
    appointments: &'a [Appointment],
    exclude_appointment_id: Option<Uuid>,
    tz: &'a Tz,
    local_date: NaiveDate,
) -> impl Iterator<Item = &'a Appointment> {
    appointments.iter().filter(move |appointment| {
        appointment.status.counts_toward_availability()
            && Some(appointment.id) != exclude_appointment_id
            && appointment
                .appointment_date_time
                .with_timezone(tz)
                .date_naive()
                == local_date
    })
}

fn minutes_from_midnight(time: NaiveTime) -> i64 {
    (time.hour() * 60 + time.minute()) as i64
}
